//! Sereal Codec - Encoder/decoder engines
//!
//! This crate provides the core encoding and decoding engines for the
//! Sereal format:
//!
//! - A recursive encoder with back-reference compression (COPY/REFP/ALIAS)
//! - A streaming-aware recursive decoder with a body-scoped offset index
//! - The framed compression layer (Snappy, Zlib, Zstd)
//! - Growable output and refillable input buffers

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod decoder;
pub mod encoder;
pub mod frame;
pub mod input;
pub mod output;
mod track;

// Re-export commonly used types
pub use sereal_format::{
    constants, Compression, Limits, Result, SerealError, Value,
};

pub use decoder::Decoder;
pub use encoder::Encoder;
pub use input::Input;

/// A decoded Sereal document: optional user header plus the body value
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// User header value, when the document carries one
    pub header: Option<Value>,
    /// Body value
    pub body: Value,
}

/// Encoder configuration
#[derive(Debug, Clone)]
pub struct EncoderOptions {
    /// Protocol version to emit (1-4)
    pub protocol_version: u8,
    /// Body compression codec
    pub compression: Compression,
    /// Bodies at or below this many bytes are never compressed
    pub compression_threshold: usize,
    /// Treat sequences and mappings as plain values instead of
    /// self-referential containers; explicit `Value::Ref` then drives all
    /// reference structure on the wire
    pub emit_refs: bool,
    /// Track values for ALIAS emission
    pub emit_aliases: bool,
    /// Security limits
    pub limits: Limits,
}

impl Default for EncoderOptions {
    fn default() -> Self {
        Self {
            protocol_version: 3,
            compression: Compression::None,
            compression_threshold: 1024,
            emit_refs: false,
            emit_aliases: false,
            limits: Limits::default(),
        }
    }
}

/// Decoder configuration
#[derive(Debug, Clone)]
pub struct DecoderOptions {
    /// Reject Snappy-encoded documents
    pub refuse_snappy: bool,
    /// Reject Zlib-encoded documents
    pub refuse_zlib: bool,
    /// Reject Zstd-encoded documents
    pub refuse_zstd: bool,
    /// Reject documents containing OBJECT/OBJECTV
    pub refuse_objects: bool,
    /// Decode object payloads without their class wrapper
    pub no_bless_objects: bool,
    /// Security limits
    pub limits: Limits,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            refuse_snappy: false,
            refuse_zlib: false,
            refuse_zstd: false,
            refuse_objects: false,
            no_bless_objects: false,
            limits: Limits::default(),
        }
    }
}
