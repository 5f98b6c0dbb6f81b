//! Error types for the Sereal codec

use thiserror::Error;

/// Sereal error types
#[derive(Debug, Error)]
pub enum SerealError {
    #[error("Truncated input: need {needed} more bytes at position {position}")]
    Truncated {
        /// Byte position of the unsatisfied read
        position: usize,
        /// How many bytes past the end were requested
        needed: usize,
    },
    #[error("Invalid magic bytes")]
    BadMagic,
    #[error("Unsupported protocol version: {0}")]
    BadVersion(u8),
    #[error("Unsupported body encoding: {0}")]
    BadEncoding(u8),
    #[error("Invalid tag 0x{tag:02x} at body offset {offset}")]
    InvalidTag {
        /// The offending opcode, track bit stripped
        tag: u8,
        /// Body offset of the tag byte
        offset: u64,
    },
    #[error("Back-reference to unknown body offset {0}")]
    InvalidBackReference(u64),
    #[error("Invalid UTF-8 in string payload")]
    InvalidUtf8,
    #[error("Varint overflow: {0}")]
    Overflow(&'static str),
    #[error("Value out of range: {0}")]
    OutOfRange(String),
    #[error("Reached recursion limit ({0}) during (de)serialization")]
    RecursionLimit(usize),
    #[error("Got {kind} with {count} entries, but the configured maximum is {max}")]
    EntryLimit {
        /// "array" or "hash"
        kind: &'static str,
        /// Observed entry count
        count: usize,
        /// Configured maximum
        max: usize,
    },
    #[error("Got {kind} of {length} bytes, but the configured maximum is {max}")]
    LengthLimit {
        /// What was being measured
        kind: &'static str,
        /// Observed length
        length: usize,
        /// Configured maximum
        max: usize,
    },
    #[error("Compression error: {0}")]
    Compression(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, SerealError>;
