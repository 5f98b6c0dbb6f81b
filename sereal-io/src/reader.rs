//! Incremental reader for streams of Sereal documents

use std::io::Read;

use sereal_codec::{Decoder, DecoderOptions, Document, Input};
use sereal_format::Result;
use tracing::debug;

/// Incremental Sereal reader.
///
/// Decodes consecutive documents from one byte stream. Bytes read past the
/// end of a document are carried over to the next call, and consumed bytes
/// are compacted away between documents. A clean end-of-stream at a
/// document boundary ends iteration; end-of-stream inside a document is a
/// `Truncated` error.
pub struct SerealReader<R: Read> {
    reader: R,
    decoder: Decoder,
    carry: Vec<u8>,
    documents: u64,
}

impl<R: Read> SerealReader<R> {
    /// Create a new reader
    pub fn new(reader: R, opts: DecoderOptions) -> Self {
        Self {
            reader,
            decoder: Decoder::with_options(opts),
            carry: Vec::new(),
            documents: 0,
        }
    }

    /// Decode the next document, or `None` at a clean end of stream
    pub fn next_document(&mut self) -> Result<Option<Document>> {
        let carry = std::mem::take(&mut self.carry);
        let mut input = Input::stream(carry, &mut self.reader);

        if !input.try_fill(1)? {
            self.carry = input.into_bytes();
            return Ok(None);
        }

        match self.decoder.decode_document(&mut input) {
            Ok(document) => {
                input.shift_left();
                self.carry = input.into_bytes();
                self.documents += 1;
                debug!(
                    documents = self.documents,
                    carried = self.carry.len(),
                    "document decoded from stream"
                );
                Ok(Some(document))
            }
            Err(e) => {
                self.carry = input.into_bytes();
                Err(e)
            }
        }
    }

    /// Iterate over the remaining documents
    pub fn documents(&mut self) -> Documents<'_, R> {
        Documents {
            reader: self,
            done: false,
        }
    }

    /// Number of documents decoded so far
    pub fn documents_read(&self) -> u64 {
        self.documents
    }

    /// Consume the reader and return the underlying stream
    pub fn into_inner(self) -> R {
        self.reader
    }
}

/// Iterator over the documents of a [`SerealReader`]; stops after the
/// first error
pub struct Documents<'r, R: Read> {
    reader: &'r mut SerealReader<R>,
    done: bool,
}

impl<R: Read> Iterator for Documents<'_, R> {
    type Item = Result<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.next_document() {
            Ok(Some(document)) => Some(Ok(document)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
