//! Streaming writer for Sereal documents

use std::io::Write;

use sereal_codec::{Encoder, EncoderOptions};
use sereal_format::{Result, SerealError, Value};
use tracing::debug;

/// Sereal writer emitting one complete document per call.
///
/// The wrapped encoder is reused across documents, so trackers, output
/// buffer and compressor state are allocated once.
pub struct SerealWriter<W: Write> {
    writer: Option<W>,
    encoder: Encoder,
    documents: u64,
    finished: bool,
}

impl<W: Write> SerealWriter<W> {
    /// Create a new writer
    pub fn new(writer: W, opts: EncoderOptions) -> Result<Self> {
        Ok(Self {
            writer: Some(writer),
            encoder: Encoder::with_options(opts)?,
            documents: 0,
            finished: false,
        })
    }

    /// Encode `value` as a document and write it out
    pub fn write_document(&mut self, value: &Value) -> Result<()> {
        self.encoder.write(value)?;
        self.emit()
    }

    /// Encode a document with a user header and write it out
    pub fn write_document_with_header(&mut self, value: &Value, header: &Value) -> Result<()> {
        self.encoder.write_with_header(value, header)?;
        self.emit()
    }

    fn emit(&mut self) -> Result<()> {
        let writer = self.writer.as_mut().ok_or_else(|| {
            SerealError::Internal("SerealWriter internal writer missing".to_string())
        })?;
        writer.write_all(self.encoder.data())?;
        self.documents += 1;
        debug!(
            documents = self.documents,
            bytes = self.encoder.data().len(),
            "document written"
        );
        Ok(())
    }

    /// Number of documents written so far
    pub fn documents_written(&self) -> u64 {
        self.documents
    }

    /// Flush the underlying writer
    pub fn flush(&mut self) -> Result<()> {
        let writer = self.writer.as_mut().ok_or_else(|| {
            SerealError::Internal("SerealWriter internal writer missing".to_string())
        })?;
        writer.flush()?;
        Ok(())
    }

    /// Finish writing and return the underlying stream
    pub fn finish(mut self) -> Result<W> {
        self.flush()?;
        self.finished = true;
        self.writer.take().ok_or_else(|| {
            SerealError::Internal("SerealWriter internal writer missing".to_string())
        })
    }
}

impl<W: Write> Drop for SerealWriter<W> {
    fn drop(&mut self) {
        // In debug mode, warn if finish() wasn't called
        #[cfg(debug_assertions)]
        if !self.finished && self.documents > 0 {
            eprintln!("Warning: SerealWriter dropped without calling finish() - data may be lost");
        }
    }
}
