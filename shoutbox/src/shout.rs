//! The shout record and its JSON codec.
//!
//! The same encoding is written to the store and returned over HTTP.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Failure to encode or decode a stored record.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("failed to encode shout {id}: {source}")]
    Encode { id: u64, source: serde_json::Error },
    #[error("failed to decode shout: {0}")]
    Decode(#[source] serde_json::Error),
}

/// A single message on the board.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Shout {
    pub id: u64,
    pub user: String,
    pub message: String,
    /// Set when the shout is created or last updated.
    #[serde(rename = "date", alias = "timestamp")]
    pub timestamp: DateTime<Utc>,
}

impl Shout {
    /// Builds a shout stamped with the current time.
    pub fn new(id: u64, user: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id,
            user: user.into(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(self).map_err(|source| CodecError::Encode {
            id: self.id,
            source,
        })
    }

    pub fn decode(raw: &[u8]) -> Result<Self, CodecError> {
        serde_json::from_slice(raw).map_err(CodecError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, Rng, SeedableRng};

    use super::*;

    /// Latest instant RFC3339 can express with a four-digit year.
    const MAX_RFC3339_SECS: i64 = 253_402_300_799;

    fn random_text(rng: &mut StdRng) -> String {
        let len = rng.gen_range(0..64);
        (0..len).map(|_| rng.gen::<char>()).collect()
    }

    #[test]
    fn codec_preserves_every_field() {
        let shout = Shout::new(42, "alice", "hello \"board\"\n✓");
        let decoded = Shout::decode(&shout.encode().expect("encode")).expect("decode");
        assert_eq!(decoded, shout);
    }

    #[test]
    fn codec_preserves_generated_shouts() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..2_000 {
            let secs = rng.gen_range(0..=MAX_RFC3339_SECS);
            let nanos = rng.gen_range(0..1_000_000_000);
            let shout = Shout {
                id: rng.gen(),
                user: random_text(&mut rng),
                message: random_text(&mut rng),
                timestamp: DateTime::<Utc>::from_timestamp(secs, nanos).expect("in range"),
            };
            let decoded = Shout::decode(&shout.encode().expect("encode")).expect("decode");
            assert_eq!(decoded, shout);
        }
    }

    #[test]
    fn encodes_wire_field_names() {
        let shout = Shout::new(7, "bob", "hi");
        let value: serde_json::Value =
            serde_json::from_slice(&shout.encode().expect("encode")).expect("json");
        assert_eq!(value["id"], 7);
        assert_eq!(value["user"], "bob");
        assert_eq!(value["message"], "hi");
        let date = value["date"].as_str().expect("date is a string");
        assert!(DateTime::parse_from_rfc3339(date).is_ok(), "{date}");
    }

    #[test]
    fn accepts_timestamp_alias() {
        let raw = br#"{"id":3,"user":"u","message":"m","timestamp":"2024-05-01T12:00:00Z"}"#;
        let shout = Shout::decode(raw).expect("decode");
        assert_eq!(shout.id, 3);
        assert_eq!(shout.timestamp.to_rfc3339(), "2024-05-01T12:00:00+00:00");
    }

    #[test]
    fn malformed_input_is_a_decode_error() {
        assert!(matches!(Shout::decode(b"not json"), Err(CodecError::Decode(_))));
        assert!(matches!(Shout::decode(b"{\"id\":1}"), Err(CodecError::Decode(_))));
    }
}
