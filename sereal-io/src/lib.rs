//! Sereal I/O - Streaming document I/O and high-level APIs
//!
//! This crate provides the byte-stream layer for the Sereal codec:
//!
//! - A streaming writer emitting one document per call
//! - An incremental reader decoding consecutive documents from one stream
//! - One-shot encode/decode convenience functions

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod reader;
pub mod writer;

// Re-export commonly used types
pub use sereal_codec::{
    Decoder, DecoderOptions, Document, Encoder, EncoderOptions,
};
pub use sereal_format::{Compression, Limits, Result, SerealError, Value};

pub use reader::SerealReader;
pub use writer::SerealWriter;

/// Encode a single value into a fresh Sereal document
pub fn encode_to_vec(value: &Value, opts: EncoderOptions) -> Result<Vec<u8>> {
    let mut encoder = Encoder::with_options(opts)?;
    encoder.write(value)?;
    Ok(encoder.to_vec())
}

/// Decode a single Sereal document from a byte slice
pub fn decode_from_slice(bytes: &[u8], opts: DecoderOptions) -> Result<Document> {
    Decoder::with_options(opts).decode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_shot_roundtrip() {
        let value = Value::array(vec![Value::Int(1), Value::from("two")]);
        let bytes = encode_to_vec(&value, EncoderOptions::default()).unwrap();
        let doc = decode_from_slice(&bytes, DecoderOptions::default()).unwrap();
        assert_eq!(doc.body, value);
        assert_eq!(doc.header, None);
    }
}
