//! Recursive Sereal encoder
//!
//! Walks a `Value` graph and emits the tagged body, tracking identities and
//! string contents so repeated values become COPY/REFP/ALIAS
//! back-references. Offsets recorded by the trackers are normalized by
//! `header_offset` at insertion time, so the wire varints and the
//! track-bit patch positions fall out by plain arithmetic.

use std::rc::Rc;

use tracing::debug;

use sereal_format::constants::{
    MAGIC, MAGIC_V3, MAX_PROTOCOL_VERSION, TAG_ALIAS, TAG_ARRAY, TAG_BINARY,
    TAG_CANONICAL_UNDEF, TAG_COPY, TAG_DOUBLE, TAG_FALSE, TAG_FLOAT, TAG_HASH, TAG_LONG_DOUBLE,
    TAG_NEG_LOW, TAG_OBJECT, TAG_OBJECTV, TAG_PAD, TAG_POS_LOW, TAG_REFN, TAG_REFP, TAG_REGEXP,
    TAG_SHORT_BINARY, TAG_STR_UTF8, TAG_TRUE, TAG_UNDEF, TAG_VARINT, TAG_WEAKEN, TAG_ZIGZAG,
    TRACK_BIT, is_ref_tag,
};
use sereal_format::value::{ArrayRef, HashRef, ScalarRef};
use sereal_format::varint::{encode_varint, varint_length, zigzag_encode};
use sereal_format::{Limits, Result, SerealError, Value};

use crate::frame::FrameCompressor;
use crate::output::OutputBuffer;
use crate::track::Trackers;
use crate::EncoderOptions;

/// Sereal document encoder.
///
/// An instance can be reused: each call to [`write`](Encoder::write)
/// overwrites the previous document while reusing the output buffer, the
/// trackers, and the compressor state.
pub struct Encoder {
    protocol_version: u8,
    encoding: u8,
    compression_threshold: usize,
    emit_refs: bool,
    limits: Limits,

    out: OutputBuffer,
    compressed: Vec<u8>,
    compressed_size: usize,
    header_size: usize,
    header_offset: usize,
    track: Trackers,
    recursion_depth: usize,
    frame: FrameCompressor,
}

impl Encoder {
    /// Create an encoder with default options
    pub fn new() -> Result<Self> {
        Self::with_options(EncoderOptions::default())
    }

    /// Create an encoder, validating the protocol/compression combination
    pub fn with_options(options: EncoderOptions) -> Result<Self> {
        if options.protocol_version == 0 || options.protocol_version > MAX_PROTOCOL_VERSION {
            return Err(SerealError::BadVersion(options.protocol_version));
        }
        if !options.compression.supported_by(options.protocol_version) {
            return Err(SerealError::BadEncoding(
                options.compression.encoding(options.protocol_version),
            ));
        }

        Ok(Self {
            protocol_version: options.protocol_version,
            encoding: options.compression.encoding(options.protocol_version),
            compression_threshold: options.compression_threshold,
            emit_refs: options.emit_refs,
            limits: options.limits,
            out: OutputBuffer::new(),
            compressed: Vec::new(),
            compressed_size: 0,
            header_size: 0,
            header_offset: 0,
            track: Trackers::new(options.emit_aliases),
            recursion_depth: 0,
            frame: FrameCompressor::new(&options.compression)?,
        })
    }

    /// Encode a new document containing `value` in the body, overwriting
    /// the previous document
    pub fn write(&mut self, value: &Value) -> Result<()> {
        self.write_document(value, None)
    }

    /// Encode a new document with a user header and a body
    pub fn write_with_header(&mut self, value: &Value, header: &Value) -> Result<()> {
        self.write_document(value, Some(header))
    }

    /// Borrow the last encoded document; empty until a `write` succeeds
    pub fn data(&self) -> &[u8] {
        if self.compressed_size > 0 {
            &self.compressed[..self.compressed_size]
        } else {
            self.out.as_slice()
        }
    }

    /// Copy the last encoded document out
    pub fn to_vec(&self) -> Vec<u8> {
        self.data().to_vec()
    }

    fn write_document(&mut self, value: &Value, header: Option<&Value>) -> Result<()> {
        if header.is_some() && self.protocol_version == 1 {
            return Err(SerealError::OutOfRange(
                "user header requires protocol version 2 or later".to_string(),
            ));
        }

        let result = self.write_inner(value, header);
        if result.is_err() {
            // a failed write must not be observable through the accessors
            self.out.clear();
            self.compressed_size = 0;
        }
        result
    }

    fn write_inner(&mut self, value: &Value, header: Option<&Value>) -> Result<()> {
        self.reset();
        self.init(header)?;
        self.encode_value(value)?;

        let body_len = self.out.len() - self.header_size;
        if self.encoding != 0 && body_len > self.compression_threshold {
            let kept = {
                let raw = self.out.as_slice();
                self.frame
                    .compress(raw, self.header_size, self.encoding, &mut self.compressed)?
            };
            if kept {
                self.compressed_size = self.compressed.len();
            } else {
                self.mark_not_compressed();
            }
        } else {
            self.mark_not_compressed();
        }

        debug!(
            bytes = self.data().len(),
            compressed = self.compressed_size > 0,
            "document encoded"
        );
        Ok(())
    }

    /// Emit magic, version/encoding byte, and the (possibly empty) header
    /// block; establish the body offset origin
    fn init(&mut self, header: Option<&Value>) -> Result<()> {
        if self.protocol_version >= 3 {
            self.out.append_bytes(&MAGIC_V3);
        } else {
            self.out.append_bytes(&MAGIC);
        }
        self.out
            .append_byte((self.encoding << 4) | self.protocol_version);

        match header {
            Some(value) => self.encode_user_header(value)?,
            None => self.out.append_byte(0x00),
        }

        self.header_size = self.out.len();
        self.header_offset = if self.protocol_version > 1 {
            // offsets are 1-based from the body start
            self.header_size - 1
        } else {
            0
        };
        Ok(())
    }

    /// Emit the user header block, optimistically reserving one byte for
    /// the suffix-size varint and shifting the emitted bytes when the
    /// suffix turns out to need a longer varint
    fn encode_user_header(&mut self, header: &Value) -> Result<()> {
        let original_size = self.out.len();
        self.out.append_byte(0x00); // suffix-size varint, patched below
        self.out.append_byte(0x01); // bitfield: header value follows

        // the header block is its own offset scope, 1-based at its first byte
        self.header_offset = self.out.len() - 1;
        self.encode_value(header)?;

        let suffix_size = self.out.len() - original_size - 1;
        if suffix_size < 128 {
            self.out.patch_byte(original_size, suffix_size as u8);
        } else {
            let size_length = varint_length(suffix_size as u64);
            self.out.shift_tail(original_size + 1, size_length - 1);
            self.out
                .write_at(original_size, &encode_varint(suffix_size as u64));
        }

        // header trackers must not leak into the body scope
        self.track.clear();
        Ok(())
    }

    fn reset(&mut self) {
        self.out.clear();
        self.compressed_size = 0;
        self.header_size = 0;
        self.header_offset = 0;
        self.recursion_depth = 0;
        self.track.clear();
    }

    fn mark_not_compressed(&mut self) {
        self.compressed_size = 0;
        // clear the encoding nibble of the version/encoding byte
        self.out.and_byte(4, 0x0F);
    }

    fn encode_value(&mut self, value: &Value) -> Result<()> {
        let location = self.out.len() as u64;

        let mut alias_hit = None;
        if let Some(alias) = self.track.alias.as_mut() {
            if let Some(id) = value.identity() {
                if let Some(&offset) = alias.confirmed.get(&id) {
                    alias_hit = Some(offset);
                } else {
                    alias
                        .speculative
                        .insert(id, location - self.header_offset as u64);
                }
            }
        }
        if let Some(offset) = alias_hit {
            self.append_alias(offset);
            return Ok(());
        }

        match value {
            Value::Undef => self.out.append_byte(TAG_UNDEF),
            Value::CanonicalUndef => {
                if self.protocol_version >= 3 {
                    self.out.append_byte(TAG_CANONICAL_UNDEF);
                } else {
                    self.out.append_byte(TAG_UNDEF);
                }
            }
            Value::Bool(true) => self.out.append_byte(TAG_TRUE),
            Value::Bool(false) => self.out.append_byte(TAG_FALSE),
            Value::Int(n) => self.append_number(*n),
            Value::UInt(n) => self.append_unsigned(*n),
            Value::Float(f) => {
                self.out.append_byte(TAG_FLOAT);
                self.out.append_bytes(&f.to_le_bytes());
            }
            Value::Double(d) => {
                self.out.append_byte(TAG_DOUBLE);
                self.out.append_bytes(&d.to_le_bytes());
            }
            Value::LongDouble(bits) => {
                self.out.append_byte(TAG_LONG_DOUBLE);
                self.out.append_bytes(bits);
            }
            Value::Bytes(bytes) => self.append_byte_string(bytes)?,
            Value::Str(string) => self.append_string(string)?,
            Value::Array(array) => {
                self.depth_increment()?;
                if self.emit_refs || !self.try_append_refp(value) {
                    self.append_array(array, location)?;
                }
                self.depth_decrement();
            }
            Value::Hash(hash) => {
                self.depth_increment()?;
                if self.emit_refs || !self.try_append_refp(value) {
                    self.append_hash(hash, location)?;
                }
                self.depth_decrement();
            }
            Value::Ref(slot) => self.append_ref(slot)?,
            Value::Weak(inner) => self.append_weak(inner)?,
            Value::Alias(inner) => self.append_alias_marker(inner, location)?,
            Value::Object { class, data } => self.append_object(class, data)?,
            Value::Regex { pattern, flags } => self.append_regex(pattern, flags)?,
        }
        Ok(())
    }

    fn append_number(&mut self, n: i64) {
        if n < 0 {
            if n > -17 {
                self.out.append_byte(TAG_NEG_LOW | ((n + 32) as u8));
            } else {
                self.out.append_byte(TAG_ZIGZAG);
                self.out.append_varint(zigzag_encode(n));
            }
        } else if n < 16 {
            self.out.append_byte(TAG_POS_LOW | (n as u8));
        } else {
            self.out.append_byte(TAG_VARINT);
            self.out.append_varint(n as u64);
        }
    }

    fn append_unsigned(&mut self, n: u64) {
        if n <= i64::MAX as u64 {
            self.append_number(n as i64);
        } else {
            self.out.append_byte(TAG_VARINT);
            self.out.append_varint(n);
        }
    }

    /// SHORT_BINARY/BINARY with COPY compression by byte-sequence equality
    fn append_byte_string(&mut self, bytes: &[u8]) -> Result<()> {
        self.check_string_length(bytes.len())?;
        if let Some(&offset) = self.track.byte_copy.get(bytes) {
            self.append_copy(offset);
            return Ok(());
        }

        let location = self.out.len() as u64;
        if bytes.len() < 32 {
            self.out
                .append_byte(TAG_SHORT_BINARY | (bytes.len() as u8));
        } else {
            self.out.append_byte(TAG_BINARY);
            self.out.append_varint(bytes.len() as u64);
        }
        self.out.append_bytes(bytes);

        self.track
            .byte_copy
            .insert(bytes.to_vec(), location - self.header_offset as u64);
        Ok(())
    }

    /// STR_UTF8 with COPY compression by string equality
    fn append_string(&mut self, string: &str) -> Result<()> {
        self.check_string_length(string.len())?;
        if let Some(&offset) = self.track.string_copy.get(string) {
            self.append_copy(offset);
            return Ok(());
        }

        let location = self.out.len() as u64;
        self.out.append_byte(TAG_STR_UTF8);
        self.out.append_varint(string.len() as u64);
        self.out.append_bytes(string.as_bytes());

        self.track
            .string_copy
            .insert(string.to_string(), location - self.header_offset as u64);
        Ok(())
    }

    fn append_copy(&mut self, offset: u64) {
        self.out.append_byte(TAG_COPY);
        self.out.append_varint(offset);
    }

    fn append_array(&mut self, array: &ArrayRef, location: u64) -> Result<()> {
        if !self.emit_refs {
            // the REFN wrapper is the REFP target: capture the offset
            // before its tag byte is appended
            self.track.tracked.insert(
                Rc::as_ptr(array) as *const () as usize,
                location - self.header_offset as u64,
            );
            self.out.append_byte(TAG_REFN);
        }
        self.append_array_body(array)
    }

    fn append_array_body(&mut self, array: &ArrayRef) -> Result<()> {
        let items = array.borrow();
        if Limits::exceeds(self.limits.max_num_array_entries, items.len()) {
            return Err(SerealError::EntryLimit {
                kind: "array",
                count: items.len(),
                max: self.limits.max_num_array_entries,
            });
        }

        self.out.append_byte(TAG_ARRAY);
        self.out.append_varint(items.len() as u64);
        for item in items.iter() {
            self.encode_value(item)?;
        }
        Ok(())
    }

    fn append_hash(&mut self, hash: &HashRef, location: u64) -> Result<()> {
        if !self.emit_refs {
            self.track.tracked.insert(
                Rc::as_ptr(hash) as *const () as usize,
                location - self.header_offset as u64,
            );
            self.out.append_byte(TAG_REFN);
        }
        self.append_hash_body(hash)
    }

    fn append_hash_body(&mut self, hash: &HashRef) -> Result<()> {
        let pairs = hash.borrow();
        if Limits::exceeds(self.limits.max_num_map_entries, pairs.len()) {
            return Err(SerealError::EntryLimit {
                kind: "hash",
                count: pairs.len(),
                max: self.limits.max_num_map_entries,
            });
        }

        self.out.append_byte(TAG_HASH);
        self.out.append_varint(pairs.len() as u64);
        for (key, value) in pairs.iter() {
            self.append_hash_key(key)?;
            self.encode_value(value)?;
        }
        Ok(())
    }

    /// Keys are stringified on the wire: strings directly, scalars by
    /// decimal formatting, anything else is not a usable key
    fn append_hash_key(&mut self, key: &Value) -> Result<()> {
        match key {
            Value::Bytes(bytes) => self.append_byte_string(bytes),
            Value::Str(string) => self.append_string(string),
            Value::Int(n) => self.append_byte_string(n.to_string().as_bytes()),
            Value::UInt(n) => self.append_byte_string(n.to_string().as_bytes()),
            other => Err(SerealError::OutOfRange(format!(
                "cannot stringify {other:?} as a hash key"
            ))),
        }
    }

    fn try_append_refp(&mut self, value: &Value) -> bool {
        let Some(id) = value.identity() else {
            return false;
        };
        if let Some(&offset) = self.track.tracked.get(&id) {
            self.append_refp(offset);
            return true;
        }
        false
    }

    fn append_refp(&mut self, offset: u64) {
        self.set_track_bit(offset);
        self.out.append_byte(TAG_REFP);
        self.out.append_varint(offset);
    }

    fn append_alias(&mut self, offset: u64) {
        self.set_track_bit(offset);
        self.out.append_byte(TAG_ALIAS);
        self.out.append_varint(offset);
    }

    /// Idempotent: the target byte keeps its opcode, gaining the track bit
    fn set_track_bit(&mut self, offset: u64) {
        self.out
            .or_byte(offset as usize + self.header_offset, TRACK_BIT);
    }

    fn append_ref(&mut self, slot: &ScalarRef) -> Result<()> {
        self.depth_increment()?;
        let referent = slot.borrow();
        let referent_id = referent
            .identity()
            .unwrap_or(Rc::as_ptr(slot) as *const () as usize);

        if let Some(&offset) = self.track.tracked.get(&referent_id) {
            self.append_refp(offset);
        } else {
            self.out.append_byte(TAG_REFN);
            let target = self.out.len() as u64 - self.header_offset as u64;
            self.track.tracked.insert(referent_id, target);
            match &*referent {
                // the REFN just emitted is already their wrapper
                Value::Array(array) => self.append_array_body(array)?,
                Value::Hash(hash) => self.append_hash_body(hash)?,
                other => self.encode_value(other)?,
            }
        }
        self.depth_decrement();
        Ok(())
    }

    /// WEAKEN must be followed by a reference tag on the wire. When the
    /// referent is not guaranteed to emit one, a PAD slot is reserved and
    /// rewritten to REFN after the recursive call, by inspecting the byte
    /// it produced.
    fn append_weak(&mut self, inner: &Value) -> Result<()> {
        self.depth_increment()?;
        let is_ref = match inner {
            Value::Ref(_) => true,
            Value::Array(_) | Value::Hash(_) => !self.emit_refs,
            _ => false,
        };
        let current = self.out.len();

        self.out.append_byte(TAG_WEAKEN);
        if !is_ref {
            self.out.append_byte(TAG_PAD);
        }
        self.encode_value(inner)?;

        if !is_ref {
            if !is_ref_tag(self.out.byte_at(current + 2)) {
                self.out.patch_byte(current + 1, TAG_REFN);
            }
        } else if !is_ref_tag(self.out.byte_at(current + 1)) {
            return Err(SerealError::Internal(
                "weak referent did not emit a reference tag".to_string(),
            ));
        }
        self.depth_decrement();
        Ok(())
    }

    /// Explicit alias marker: reuse a confirmed offset, promote a
    /// speculative one, or emit the value and confirm its own offset
    fn append_alias_marker(&mut self, inner: &Value, location: u64) -> Result<()> {
        self.depth_increment()?;
        if self.track.alias.is_none() {
            self.encode_value(inner)?;
            self.depth_decrement();
            return Ok(());
        }
        let Some(id) = inner.identity() else {
            self.encode_value(inner)?;
            self.depth_decrement();
            return Ok(());
        };

        let (confirmed, speculative) = match self.track.alias.as_ref() {
            Some(alias) => (
                alias.confirmed.get(&id).copied(),
                alias.speculative.get(&id).copied(),
            ),
            None => (None, None),
        };

        if let Some(offset) = confirmed {
            self.append_alias(offset);
        } else if let Some(offset) = speculative {
            self.append_alias(offset);
            if let Some(alias) = self.track.alias.as_mut() {
                alias.confirmed.insert(id, offset);
            }
        } else {
            self.encode_value(inner)?;
            let offset = location - self.header_offset as u64;
            if let Some(alias) = self.track.alias.as_mut() {
                alias.confirmed.insert(id, offset);
            }
        }
        self.depth_decrement();
        Ok(())
    }

    fn append_object(&mut self, class: &str, data: &Value) -> Result<()> {
        if let Some(&offset) = self.track.classnames.get(class) {
            self.out.append_byte(TAG_OBJECTV);
            self.out.append_varint(offset);
        } else {
            self.out.append_byte(TAG_OBJECT);
            let offset = self.out.len() as u64 - self.header_offset as u64;
            self.track.classnames.insert(class.to_string(), offset);
            self.append_string(class)?;
        }

        self.depth_increment()?;
        self.encode_value(data)?;
        self.depth_decrement();
        Ok(())
    }

    fn append_regex(&mut self, pattern: &Value, flags: &str) -> Result<()> {
        if flags.len() > 4 || flags.chars().any(|c| !"msix".contains(c)) {
            return Err(SerealError::OutOfRange(format!(
                "regex flags must be drawn from \"msix\", got {flags:?}"
            )));
        }

        self.out.append_byte(TAG_REGEXP);
        match pattern {
            Value::Bytes(bytes) => self.append_byte_string(bytes)?,
            Value::Str(string) => self.append_string(string)?,
            other => {
                return Err(SerealError::OutOfRange(format!(
                    "regex pattern must be a string, got {other:?}"
                )))
            }
        }
        self.out
            .append_byte(TAG_SHORT_BINARY | (flags.len() as u8));
        self.out.append_bytes(flags.as_bytes());
        Ok(())
    }

    fn check_string_length(&self, length: usize) -> Result<()> {
        if Limits::exceeds(self.limits.max_string_length, length) {
            return Err(SerealError::LengthLimit {
                kind: "string",
                length,
                max: self.limits.max_string_length,
            });
        }
        Ok(())
    }

    fn depth_increment(&mut self) -> Result<()> {
        self.recursion_depth += 1;
        if self.recursion_depth > self.limits.max_recursion_depth {
            return Err(SerealError::RecursionLimit(self.limits.max_recursion_depth));
        }
        Ok(())
    }

    fn depth_decrement(&mut self) {
        self.recursion_depth -= 1;
    }
}
