//! Error types shared across Courier crates.

/// Errors raised while constructing shared protocol types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("record id {0} exceeds the maximum of {max}", max = crate::MAX_RECORD_ID)]
    RecordIdOutOfRange(u64),

    #[error("invalid record id '{0}': expected a non-negative integer")]
    InvalidRecordId(String),
}

/// Convenience alias for results using the shared [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
