//! Fixed-width key encoding for shout ids.
//!
//! Ids are stored as 8-byte big-endian keys so that the byte order the store
//! iterates in matches numeric order.

/// Width of an encoded id key in bytes.
pub const KEY_LEN: usize = 8;

/// Encoded form of a shout id.
pub type IdKey = [u8; KEY_LEN];

/// Encodes an id as its big-endian key.
pub fn id_to_key(id: u64) -> IdKey {
    id.to_be_bytes()
}

/// Decodes a big-endian key back into an id.
pub fn key_to_id(key: IdKey) -> u64 {
    u64::from_be_bytes(key)
}

/// Interprets a raw stored key as an id key.
///
/// Returns `None` when the slice is not exactly [`KEY_LEN`] bytes long.
pub fn id_from_slice(raw: &[u8]) -> Option<u64> {
    raw.try_into().ok().map(key_to_id)
}
