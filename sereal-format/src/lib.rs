//! Sereal Format - Core primitives for the Sereal wire format
//!
//! This crate provides the fundamental encoding/decoding utilities for the
//! Sereal format with no I/O dependencies. It includes:
//!
//! - Magic numbers and the tag byte alphabet
//! - Variable-length integer encoding (varint/ZigZag)
//! - Error types
//! - Security limits
//! - The host value model (scalars, strings, containers, references)

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod constants;
pub mod error;
pub mod limits;
pub mod value;
pub mod varint;

// Re-export commonly used types
pub use error::{Result, SerealError};
pub use limits::Limits;
pub use value::{ArrayRef, HashRef, ScalarRef, Value};

/// Compression codec options for the document body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// No compression
    None,
    /// Snappy (raw block format); legacy framing on protocol 1
    Snappy,
    /// Zlib with the specified level (0-9); protocol 3+
    Zlib(u32),
    /// Zstandard with the specified level; protocol 4
    Zstd(i32),
}

impl Compression {
    /// Wire encoding nibble for this codec under the given protocol version.
    ///
    /// Protocol 1 uses the legacy whole-document Snappy framing (encoding 1);
    /// later protocols frame Snappy with a length varint (encoding 2).
    pub fn encoding(&self, protocol_version: u8) -> u8 {
        match self {
            Compression::None => constants::ENCODING_RAW,
            Compression::Snappy if protocol_version == 1 => constants::ENCODING_SNAPPY_LEGACY,
            Compression::Snappy => constants::ENCODING_SNAPPY,
            Compression::Zlib(_) => constants::ENCODING_ZLIB,
            Compression::Zstd(_) => constants::ENCODING_ZSTD,
        }
    }

    /// Check whether this codec may appear in a document of the given
    /// protocol version
    pub fn supported_by(&self, protocol_version: u8) -> bool {
        match self {
            Compression::None | Compression::Snappy => true,
            Compression::Zlib(_) => protocol_version >= 3,
            Compression::Zstd(_) => protocol_version >= 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compression_encoding() {
        assert_eq!(Compression::None.encoding(2), constants::ENCODING_RAW);
        assert_eq!(Compression::Snappy.encoding(1), constants::ENCODING_SNAPPY_LEGACY);
        assert_eq!(Compression::Snappy.encoding(2), constants::ENCODING_SNAPPY);
        assert_eq!(Compression::Zlib(6).encoding(3), constants::ENCODING_ZLIB);
        assert_eq!(Compression::Zstd(3).encoding(4), constants::ENCODING_ZSTD);
    }

    #[test]
    fn test_compression_gating() {
        assert!(Compression::None.supported_by(1));
        assert!(Compression::Snappy.supported_by(1));
        assert!(!Compression::Zlib(6).supported_by(2));
        assert!(Compression::Zlib(6).supported_by(3));
        assert!(!Compression::Zstd(3).supported_by(3));
        assert!(Compression::Zstd(3).supported_by(4));
    }
}
