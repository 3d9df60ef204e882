//! Error types for the storage engine.

use record::ScanError;
use thiserror::Error;

/// Result type alias using [`StoreError`].
pub type Result<T> = std::result::Result<T, StoreError>;

/// Unified error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An underlying filesystem error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The key is not present. Returned by reads, never by deletes.
    #[error("key not found")]
    NotFound,

    /// Renaming the active segment failed during rotation. The store stays
    /// usable if the original active file could be reopened.
    #[error("rotation failed: {0}")]
    RotationFailed(String),

    /// Replay of an immutable segment hit an impossible record, or a hint
    /// entry pointed outside its segment. Surfaced at open.
    #[error("corrupt segment {segment} at offset {offset}: {detail}")]
    CorruptSegment {
        /// File name of the bad segment.
        segment: String,
        /// Offset of the first unusable byte.
        offset: u64,
        /// What went wrong.
        detail: String,
    },

    /// Invalid configuration: non-positive `max_file_size` or an unusable
    /// data directory.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Key length outside `1..=2147483647`.
    #[error("key length {0} out of range (1..=2147483647)")]
    InvalidKeySize(usize),

    /// Value length above `2147483647`.
    #[error("value length {0} exceeds 2147483647")]
    InvalidValueSize(usize),
}

impl StoreError {
    /// Maps a scan failure in `segment` to the store-level error: I/O passes
    /// through, everything else means the segment is corrupt.
    pub(crate) fn from_scan(segment: &str, err: ScanError) -> StoreError {
        match err {
            ScanError::Io(e) => StoreError::Io(e),
            other => StoreError::CorruptSegment {
                segment: segment.to_string(),
                offset: other.offset().unwrap_or_default(),
                detail: other.to_string(),
            },
        }
    }
}
