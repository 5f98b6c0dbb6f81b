//! Position-tracked input window for the decoder
//!
//! The window either borrows the caller's bytes (slice decoding) or owns a
//! growable buffer fed lazily from a byte source (stream decoding). Bytes
//! before `pos` stay addressable for the duration of a document so that
//! COPY and OBJECTV can jump back to prior offsets; `shift_left` reclaims
//! them only between documents.

use std::borrow::Cow;
use std::io::{ErrorKind, Read};

use sereal_format::{Result, SerealError};
use tracing::trace;

// Upper bound on a single refill allocation; large requests loop.
const REFILL_CHUNK: usize = 64 * 1024;

/// Decoder input window over borrowed or owned bytes
pub struct Input<'a> {
    data: Cow<'a, [u8]>,
    pos: usize,
    reader: Option<&'a mut dyn Read>,
}

impl<'a> Input<'a> {
    /// Decode window borrowing the caller's bytes; no refill source
    pub fn from_slice(data: &'a [u8]) -> Self {
        Self {
            data: Cow::Borrowed(data),
            pos: 0,
            reader: None,
        }
    }

    /// Decode window over owned bytes; no refill source
    pub fn from_vec(data: Vec<u8>) -> Input<'static> {
        Input {
            data: Cow::Owned(data),
            pos: 0,
            reader: None,
        }
    }

    /// Stream-mode window: starts from `carry` (bytes left over from a
    /// previous document) and refills from `reader` on demand
    pub fn stream(carry: Vec<u8>, reader: &'a mut dyn Read) -> Self {
        Self {
            data: Cow::Owned(carry),
            pos: 0,
            reader: Some(reader),
        }
    }

    /// Current read position
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Reposition within the buffered bytes (COPY jumps)
    pub fn set_pos(&mut self, pos: usize) {
        debug_assert!(pos <= self.data.len());
        self.pos = pos;
    }

    /// Number of bytes buffered so far
    pub fn buffered_len(&self) -> usize {
        self.data.len()
    }

    /// Ensure `n` bytes are readable at the current position, refilling
    /// from the stream if one is attached; `Truncated` otherwise
    pub fn fill(&mut self, n: usize) -> Result<()> {
        if self.try_fill(n)? {
            Ok(())
        } else {
            Err(SerealError::Truncated {
                position: self.pos,
                needed: self.pos + n - self.data.len(),
            })
        }
    }

    /// Like `fill`, but a clean end-of-stream shortfall returns
    /// `Ok(false)` instead of an error; used to probe for a further
    /// document at a boundary
    pub fn try_fill(&mut self, n: usize) -> Result<bool> {
        let end = self
            .pos
            .checked_add(n)
            .ok_or(SerealError::Overflow("input request overflows"))?;
        if end <= self.data.len() {
            return Ok(true);
        }
        let Some(reader) = self.reader.as_deref_mut() else {
            return Ok(false);
        };

        let outstanding = end - self.data.len();
        trace!(outstanding, "refilling input window");
        let vec = self.data.to_mut();
        let mut remaining = outstanding;
        while remaining > 0 {
            let chunk = remaining.min(REFILL_CHUNK);
            let start = vec.len();
            vec.resize(start + chunk, 0);
            let mut filled = start;
            while filled < start + chunk {
                match reader.read(&mut vec[filled..start + chunk]) {
                    Ok(0) => {
                        vec.truncate(filled);
                        return Ok(false);
                    }
                    Ok(k) => filled += k,
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => {
                        vec.truncate(filled);
                        return Err(e.into());
                    }
                }
            }
            remaining -= chunk;
        }
        Ok(true)
    }

    /// Buffer everything the stream has left (legacy Snappy framing, whose
    /// compressed data runs to end-of-document)
    pub fn fill_to_eof(&mut self) -> Result<()> {
        if let Some(reader) = self.reader.as_deref_mut() {
            reader.read_to_end(self.data.to_mut())?;
        }
        Ok(())
    }

    /// View `n` bytes at the current position without consuming them
    pub fn peek(&mut self, n: usize) -> Result<&[u8]> {
        self.fill(n)?;
        Ok(&self.data[self.pos..self.pos + n])
    }

    /// Consume and return `n` bytes
    pub fn take(&mut self, n: usize) -> Result<&[u8]> {
        self.fill(n)?;
        let start = self.pos;
        self.pos += n;
        Ok(&self.data[start..start + n])
    }

    /// Consume and return one byte
    pub fn take_byte(&mut self) -> Result<u8> {
        self.fill(1)?;
        let byte = self.data[self.pos];
        self.pos += 1;
        Ok(byte)
    }

    /// Consume and return every buffered byte from the current position on
    pub fn take_rest(&mut self) -> &[u8] {
        let start = self.pos;
        self.pos = self.data.len();
        &self.data[start..]
    }

    /// Skip `n` bytes
    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.fill(n)?;
        self.pos += n;
        Ok(())
    }

    /// Discard consumed bytes, compacting the window; only meaningful
    /// between documents
    pub fn shift_left(&mut self) {
        if self.pos == 0 {
            return;
        }
        match &mut self.data {
            Cow::Owned(vec) => {
                vec.drain(..self.pos);
            }
            Cow::Borrowed(slice) => {
                let rest = *slice;
                *slice = &rest[self.pos..];
            }
        }
        self.pos = 0;
    }

    /// Give up the window, returning the buffered bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.data.into_owned()
    }
}

/// Read a varint from the window, byte by byte.
///
/// Accepts non-minimal encodings; fails with `Truncated` when a
/// continuation bit promises a byte past the end of input, and with
/// `Overflow` past 10 bytes or when the payload does not fit in 64 bits.
pub fn read_varint(input: &mut Input<'_>) -> Result<u64> {
    let mut result = 0u64;
    let mut shift = 0u32;

    for i in 0..=10 {
        if i == 10 {
            return Err(SerealError::Overflow("varint longer than 10 bytes"));
        }
        let byte = input.take_byte()?;
        let bits = (byte & 0x7F) as u64;
        if shift == 63 && bits > 1 {
            return Err(SerealError::Overflow("varint exceeds 64 bits"));
        }
        result |= bits << shift;

        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
    }

    Ok(result)
}
