use thiserror::Error;

pub type Result<T> = std::result::Result<T, RecordError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    /// The key or value can't be stored: it is empty, or its length does not
    /// fit in the 32-bit length field.
    #[error("invalid record: {0}")]
    InvalidRecord(&'static str),

    /// The buffer ends before the header, or before the body the header
    /// declares. Usually a torn write at the tail of a log, or a read that
    /// did not start on a record boundary.
    #[error("truncated record: need {needed} bytes, have {available}")]
    TruncatedBuffer { needed: u64, available: u64 },

    /// The CRC-32 of the value does not match the stored checksum.
    #[error("checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { stored: u32, computed: u32 },

    /// A header declares a key or value longer than the reader accepts.
    #[error("{field} length {len} exceeds limit {limit}")]
    LengthLimitExceeded {
        field: &'static str,
        len: u32,
        limit: u32,
    },
}
