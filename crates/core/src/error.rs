//! Error types for docstore operations.
//!
//! Every fallible engine operation returns [`Result`]. Corruption found while
//! scanning on-disk data is deliberately absent from this enum: it is logged,
//! counted by a [`CorruptionCounter`](crate::CorruptionCounter) and downgraded
//! to skipped data rather than failing the operation.

use thiserror::Error;

/// All docstore errors.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O failure while opening, growing, mapping or syncing a file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Payload needs more room than a record may hold
    #[error("document too large: needs {requested} bytes of room, maximum is {max}")]
    DocTooLarge {
        /// Maximum room per record
        max: u64,
        /// Room the payload would need
        requested: u64,
    },

    /// Record id is out of range or refers to an invalidated record
    #[error("record not found: {0}")]
    NotFound(u64),

    /// Structure opened with unusable parameters
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Config file could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type for docstore operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this is a not-found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Check if this is an I/O error.
    pub fn is_io(&self) -> bool {
        matches!(self, Error::Io(_))
    }

    /// Check if the caller can recover from this error locally.
    ///
    /// Wrong-call errors (bad id, oversize payload) leave the structure
    /// untouched. Device and configuration failures do not.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::NotFound(_) | Error::DocTooLarge { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
