use crate::shout::CodecError;
use crate::store::StoreError;

/// Errors surfaced by [`ShoutRepository`](crate::repository::ShoutRepository).
#[derive(Debug, thiserror::Error)]
pub enum ShoutError {
    /// The caller supplied an id that cannot name a shout.
    #[error("invalid shout id {0:?}")]
    InvalidId(String),
    #[error("shout {0} does not exist")]
    NotFound(u64),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl ShoutError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Parses a decimal shout id as it appears in a request path.
pub fn parse_id(raw: &str) -> Result<u64, ShoutError> {
    raw.parse().map_err(|_| ShoutError::InvalidId(raw.to_string()))
}
