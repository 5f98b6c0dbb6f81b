//! Recursive Sereal decoder
//!
//! Rebuilds a `Value` graph from a tagged body. Every decoded tag is
//! registered in a body-scoped offset index; containers are registered
//! *before* they are populated (two-phase construction) so that REFP and
//! ALIAS can resolve cycles into the container being built. COPY targets
//! are re-decoded in a non-tracking sub-context so copies never pollute
//! the index, and only one hop of COPY indirection is followed.

use std::cell::RefCell;
use std::io::Read;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use tracing::debug;

use sereal_format::constants::{
    is_string_tag, strip_track_bit, ENCODING_RAW, ENCODING_SNAPPY, ENCODING_SNAPPY_LEGACY,
    ENCODING_ZLIB, ENCODING_ZSTD, MAGIC, MAGIC_V3, MASK_INLINE_COUNT, MASK_SHORT_BINARY_LEN,
    MAX_PROTOCOL_VERSION, TAG_ALIAS, TAG_ARRAY, TAG_ARRAYREF, TAG_BINARY, TAG_CANONICAL_UNDEF,
    TAG_COPY, TAG_DOUBLE, TAG_FALSE, TAG_FLOAT, TAG_HASH, TAG_HASHREF, TAG_LONG_DOUBLE,
    TAG_OBJECT, TAG_OBJECTV, TAG_PAD, TAG_REFN, TAG_REFP, TAG_REGEXP, TAG_SHORT_BINARY,
    TAG_STR_UTF8, TAG_TRUE, TAG_UNDEF, TAG_VARINT, TAG_WEAKEN, TAG_ZIGZAG,
};
use sereal_format::value::ArrayRef;
use sereal_format::varint::zigzag_decode;
use sereal_format::{Limits, Result, SerealError, Value};

use crate::frame;
use crate::input::{read_varint, Input};
use crate::{DecoderOptions, Document};

/// Sereal document decoder
#[derive(Debug, Default)]
pub struct Decoder {
    opts: DecoderOptions,
}

/// Back-reference state for one body (or header) decode
struct BodyScope {
    /// Wire offset of the first body byte (1 for protocol 2+, the
    /// document prefix length for protocol 1)
    base: u64,
    /// Input position of the first body byte
    origin: usize,
    index: FxHashMap<u64, Value>,
    depth: usize,
    in_copy: bool,
}

impl BodyScope {
    fn new(base: u64, origin: usize) -> Self {
        Self {
            base,
            origin,
            index: FxHashMap::default(),
            depth: 0,
            in_copy: false,
        }
    }

    fn offset_of(&self, pos: usize) -> u64 {
        (pos - self.origin) as u64 + self.base
    }

    fn pos_of(&self, offset: u64) -> Option<usize> {
        offset
            .checked_sub(self.base)
            .and_then(|rel| usize::try_from(rel).ok())
            .map(|rel| self.origin + rel)
    }

    fn register(&mut self, offset: u64, value: Value) {
        if !self.in_copy {
            self.index.insert(offset, value);
        }
    }

    fn lookup(&self, offset: u64) -> Result<Value> {
        self.index
            .get(&offset)
            .cloned()
            .ok_or(SerealError::InvalidBackReference(offset))
    }
}

impl Decoder {
    /// Create a decoder with default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a decoder with the given options
    pub fn with_options(opts: DecoderOptions) -> Self {
        Self { opts }
    }

    /// Decode one document from a byte slice
    pub fn decode(&self, data: &[u8]) -> Result<Document> {
        let mut input = Input::from_slice(data);
        self.decode_document(&mut input)
    }

    /// Decode one document from a byte stream, buffering lazily
    pub fn decode_from(&self, reader: &mut dyn Read) -> Result<Document> {
        let mut input = Input::stream(Vec::new(), reader);
        self.decode_document(&mut input)
    }

    /// Decode one document starting at the window's current position.
    ///
    /// Bytes after the document are left unconsumed, which is what
    /// incremental callers rely on.
    pub fn decode_document(&self, input: &mut Input<'_>) -> Result<Document> {
        let magic = {
            let m = input.take(4)?;
            [m[0], m[1], m[2], m[3]]
        };
        let legacy_magic = if magic == MAGIC {
            true
        } else if magic == MAGIC_V3 {
            false
        } else {
            return Err(SerealError::BadMagic);
        };

        let version_byte = input.take_byte()?;
        let version = version_byte & 0x0F;
        let encoding = version_byte >> 4;
        if version == 0 || version > MAX_PROTOCOL_VERSION {
            return Err(SerealError::BadVersion(version));
        }
        if legacy_magic != (version < 3) {
            return Err(SerealError::BadVersion(version));
        }
        self.check_encoding(encoding, version)?;

        let header = self.decode_header_block(input, version)?;

        let prefix_len = input.pos();
        let base = if version >= 2 { 1 } else { prefix_len as u64 };
        let body = if encoding == ENCODING_RAW {
            let mut scope = BodyScope::new(base, prefix_len);
            self.decode_value(input, &mut scope)?
        } else {
            let inflated = frame::decompress_body(encoding, input, &self.opts.limits)?;
            debug!(encoding, inflated = inflated.len(), "body decompressed");
            let mut window = Input::from_slice(&inflated);
            let mut scope = BodyScope::new(base, 0);
            self.decode_value(&mut window, &mut scope)?
        };

        Ok(Document { header, body })
    }

    fn check_encoding(&self, encoding: u8, version: u8) -> Result<()> {
        match encoding {
            ENCODING_RAW => Ok(()),
            ENCODING_SNAPPY_LEGACY | ENCODING_SNAPPY if self.opts.refuse_snappy => {
                Err(SerealError::BadEncoding(encoding))
            }
            ENCODING_SNAPPY_LEGACY | ENCODING_SNAPPY => Ok(()),
            ENCODING_ZLIB if version < 3 || self.opts.refuse_zlib => {
                Err(SerealError::BadEncoding(encoding))
            }
            ENCODING_ZLIB => Ok(()),
            ENCODING_ZSTD if version < 4 || self.opts.refuse_zstd => {
                Err(SerealError::BadEncoding(encoding))
            }
            ENCODING_ZSTD => Ok(()),
            other => Err(SerealError::BadEncoding(other)),
        }
    }

    /// Read the header block: varint suffix size, then (if bit 0 of the
    /// bitfield is set) a nested value in its own scope; any remaining
    /// suffix bytes are skipped for forward compatibility
    fn decode_header_block(&self, input: &mut Input<'_>, version: u8) -> Result<Option<Value>> {
        let suffix_size = read_varint(input)?;
        if suffix_size == 0 {
            return Ok(None);
        }
        let suffix_len = usize::try_from(suffix_size)
            .map_err(|_| SerealError::Overflow("header suffix exceeds addressable size"))?;

        let suffix_start = input.pos();
        let bitfield = input.take_byte()?;
        let mut header = None;
        if bitfield & 0x01 != 0 {
            let base = if version >= 2 { 1 } else { input.pos() as u64 };
            let mut scope = BodyScope::new(base, input.pos());
            header = Some(self.decode_value(input, &mut scope)?);
        }

        let consumed = input.pos() - suffix_start;
        if consumed > suffix_len {
            return Err(SerealError::OutOfRange(
                "header value overran the declared suffix size".to_string(),
            ));
        }
        input.skip(suffix_len - consumed)?;
        Ok(header)
    }

    fn decode_value(&self, input: &mut Input<'_>, scope: &mut BodyScope) -> Result<Value> {
        let mut tag = input.take_byte()?;
        while strip_track_bit(tag) == TAG_PAD {
            tag = input.take_byte()?;
        }
        let offset = scope.offset_of(input.pos() - 1);
        self.decode_tag(input, scope, strip_track_bit(tag), offset)
    }

    fn decode_tag(
        &self,
        input: &mut Input<'_>,
        scope: &mut BodyScope,
        tag: u8,
        offset: u64,
    ) -> Result<Value> {
        let value = match tag {
            t if t < 0x10 => Value::Int(t as i64),
            t if t < 0x20 => Value::Int(t as i64 - 32),
            TAG_VARINT => {
                let n = read_varint(input)?;
                if n > i64::MAX as u64 {
                    Value::UInt(n)
                } else {
                    Value::Int(n as i64)
                }
            }
            TAG_ZIGZAG => Value::Int(zigzag_decode(read_varint(input)?)),
            TAG_FLOAT => {
                let b = input.take(4)?;
                Value::Float(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            }
            TAG_DOUBLE => {
                let b = input.take(8)?;
                Value::Double(f64::from_le_bytes([
                    b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
                ]))
            }
            TAG_LONG_DOUBLE => {
                let b = input.take(16)?;
                let mut bits = [0u8; 16];
                bits.copy_from_slice(b);
                Value::LongDouble(bits)
            }
            TAG_UNDEF => Value::Undef,
            TAG_CANONICAL_UNDEF => Value::CanonicalUndef,
            TAG_TRUE => Value::Bool(true),
            TAG_FALSE => Value::Bool(false),
            t if t >= TAG_SHORT_BINARY => {
                let len = (t & MASK_SHORT_BINARY_LEN) as usize;
                self.check_string_length(len)?;
                Value::Bytes(Rc::new(input.take(len)?.to_vec()))
            }
            TAG_BINARY => {
                let len = self.read_string_length(input)?;
                Value::Bytes(Rc::new(input.take(len)?.to_vec()))
            }
            TAG_STR_UTF8 => {
                let len = self.read_string_length(input)?;
                let bytes = input.take(len)?.to_vec();
                let string = String::from_utf8(bytes).map_err(|_| SerealError::InvalidUtf8)?;
                Value::Str(Rc::new(string))
            }
            TAG_REFN => self.decode_refn(input, scope, offset)?,
            TAG_ARRAY => {
                let count = read_count(input)?;
                self.decode_array(input, scope, count, offset, None)?
            }
            TAG_HASH => {
                let count = read_count(input)?;
                self.decode_hash(input, scope, count, offset, None)?
            }
            t if (TAG_ARRAYREF..TAG_HASHREF).contains(&t) => {
                let count = (t & MASK_INLINE_COUNT) as usize;
                self.decode_array(input, scope, count, offset, None)?
            }
            t if (TAG_HASHREF..TAG_SHORT_BINARY).contains(&t) => {
                let count = (t & MASK_INLINE_COUNT) as usize;
                self.decode_hash(input, scope, count, offset, None)?
            }
            TAG_REFP => {
                let target = read_varint(input)?;
                match scope.lookup(target)? {
                    v @ (Value::Array(_) | Value::Hash(_) | Value::Ref(_)) => v,
                    scalar => Value::reference(scalar),
                }
            }
            TAG_ALIAS => {
                let target = read_varint(input)?;
                scope.lookup(target)?
            }
            TAG_COPY => self.decode_copy(input, scope, offset)?,
            TAG_WEAKEN => {
                self.depth_increment(scope)?;
                let inner = self.decode_value(input, scope)?;
                self.depth_decrement(scope);
                Value::Weak(Box::new(inner))
            }
            TAG_OBJECT => self.decode_object(input, scope)?,
            TAG_OBJECTV => self.decode_objectv(input, scope)?,
            TAG_REGEXP => self.decode_regex(input, scope)?,
            other => return Err(SerealError::InvalidTag { tag: other, offset }),
        };

        scope.register(offset, value.clone());
        Ok(value)
    }

    /// REFN: a reference wrapping the next item. Containers collapse into
    /// the reference, registering at both the wrapper and the container
    /// tag so either offset is a valid REFP/ALIAS target; scalars get an
    /// explicit `Ref` slot.
    fn decode_refn(
        &self,
        input: &mut Input<'_>,
        scope: &mut BodyScope,
        refn_offset: u64,
    ) -> Result<Value> {
        self.depth_increment(scope)?;

        let mut tag = input.take_byte()?;
        while strip_track_bit(tag) == TAG_PAD {
            tag = input.take_byte()?;
        }
        let inner_offset = scope.offset_of(input.pos() - 1);
        let tag = strip_track_bit(tag);

        let value = match tag {
            TAG_ARRAY => {
                let count = read_count(input)?;
                self.decode_array(input, scope, count, inner_offset, Some(refn_offset))?
            }
            TAG_HASH => {
                let count = read_count(input)?;
                self.decode_hash(input, scope, count, inner_offset, Some(refn_offset))?
            }
            t if (TAG_ARRAYREF..TAG_HASHREF).contains(&t) => {
                let count = (t & MASK_INLINE_COUNT) as usize;
                self.decode_array(input, scope, count, inner_offset, Some(refn_offset))?
            }
            t if (TAG_HASHREF..TAG_SHORT_BINARY).contains(&t) => {
                let count = (t & MASK_INLINE_COUNT) as usize;
                self.decode_hash(input, scope, count, inner_offset, Some(refn_offset))?
            }
            _ => match self.decode_tag(input, scope, tag, inner_offset)? {
                v @ (Value::Array(_) | Value::Hash(_)) => v,
                scalar => Value::reference(scalar),
            },
        };

        self.depth_decrement(scope);
        Ok(value)
    }

    fn decode_array(
        &self,
        input: &mut Input<'_>,
        scope: &mut BodyScope,
        count: usize,
        offset: u64,
        wrapper: Option<u64>,
    ) -> Result<Value> {
        if Limits::exceeds(self.opts.limits.max_num_array_entries, count) {
            return Err(SerealError::EntryLimit {
                kind: "array",
                count,
                max: self.opts.limits.max_num_array_entries,
            });
        }
        self.depth_increment(scope)?;

        // two-phase: the container is addressable before it is filled
        let array: ArrayRef = Rc::new(RefCell::new(Vec::new()));
        scope.register(offset, Value::Array(array.clone()));
        if let Some(wrapper_offset) = wrapper {
            scope.register(wrapper_offset, Value::Array(array.clone()));
        }

        for _ in 0..count {
            let item = self.decode_value(input, scope)?;
            array.borrow_mut().push(item);
        }

        self.depth_decrement(scope);
        Ok(Value::Array(array))
    }

    fn decode_hash(
        &self,
        input: &mut Input<'_>,
        scope: &mut BodyScope,
        count: usize,
        offset: u64,
        wrapper: Option<u64>,
    ) -> Result<Value> {
        if Limits::exceeds(self.opts.limits.max_num_map_entries, count) {
            return Err(SerealError::EntryLimit {
                kind: "hash",
                count,
                max: self.opts.limits.max_num_map_entries,
            });
        }
        self.depth_increment(scope)?;

        let hash = Rc::new(RefCell::new(Vec::new()));
        scope.register(offset, Value::Hash(hash.clone()));
        if let Some(wrapper_offset) = wrapper {
            scope.register(wrapper_offset, Value::Hash(hash.clone()));
        }

        for _ in 0..count {
            let key = self.decode_value(input, scope)?;
            if !key.is_string() {
                return Err(SerealError::OutOfRange(format!(
                    "hash key must be a string, got {key:?}"
                )));
            }
            let value = self.decode_value(input, scope)?;
            hash.borrow_mut().push((key, value));
        }

        self.depth_decrement(scope);
        Ok(Value::Hash(hash))
    }

    /// COPY: re-decode the single item at a prior offset in a
    /// non-tracking sub-context; exactly one hop is followed
    fn decode_copy(
        &self,
        input: &mut Input<'_>,
        scope: &mut BodyScope,
        copy_offset: u64,
    ) -> Result<Value> {
        let target = read_varint(input)?;
        if scope.in_copy || target >= copy_offset {
            return Err(SerealError::InvalidBackReference(target));
        }
        let target_pos = scope
            .pos_of(target)
            .ok_or(SerealError::InvalidBackReference(target))?;

        let saved = input.pos();
        input.set_pos(target_pos);
        scope.in_copy = true;
        let result = self.decode_value(input, scope);
        scope.in_copy = false;
        input.set_pos(saved);
        result
    }

    fn decode_object(&self, input: &mut Input<'_>, scope: &mut BodyScope) -> Result<Value> {
        if self.opts.refuse_objects {
            return Err(SerealError::OutOfRange(
                "OBJECT tag refused by decoder configuration".to_string(),
            ));
        }
        let class_value = self.decode_value(input, scope)?;
        let class = class_string(&class_value)?;
        self.finish_object(input, scope, class)
    }

    fn decode_objectv(&self, input: &mut Input<'_>, scope: &mut BodyScope) -> Result<Value> {
        if self.opts.refuse_objects {
            return Err(SerealError::OutOfRange(
                "OBJECTV tag refused by decoder configuration".to_string(),
            ));
        }
        let target = read_varint(input)?;
        let class_value = scope.lookup(target)?;
        let class =
            class_string(&class_value).map_err(|_| SerealError::InvalidBackReference(target))?;
        self.finish_object(input, scope, class)
    }

    fn finish_object(
        &self,
        input: &mut Input<'_>,
        scope: &mut BodyScope,
        class: String,
    ) -> Result<Value> {
        self.depth_increment(scope)?;
        let data = self.decode_value(input, scope)?;
        self.depth_decrement(scope);

        if self.opts.no_bless_objects {
            Ok(data)
        } else {
            Ok(Value::Object {
                class,
                data: Box::new(data),
            })
        }
    }

    fn decode_regex(&self, input: &mut Input<'_>, scope: &mut BodyScope) -> Result<Value> {
        let pattern = self.decode_value(input, scope)?;
        if !pattern.is_string() {
            return Err(SerealError::OutOfRange(format!(
                "regex pattern must be a string, got {pattern:?}"
            )));
        }

        let flag_tag = input.take_byte()?;
        let flag_offset = scope.offset_of(input.pos() - 1);
        let flag_tag = strip_track_bit(flag_tag);
        if !is_string_tag(flag_tag) || flag_tag < TAG_SHORT_BINARY {
            return Err(SerealError::InvalidTag {
                tag: flag_tag,
                offset: flag_offset,
            });
        }
        let len = (flag_tag & MASK_SHORT_BINARY_LEN) as usize;
        let flags = String::from_utf8(input.take(len)?.to_vec())
            .map_err(|_| SerealError::InvalidUtf8)?;
        if flags.len() > 4 || flags.chars().any(|c| !"msix".contains(c)) {
            return Err(SerealError::OutOfRange(format!(
                "regex flags must be drawn from \"msix\", got {flags:?}"
            )));
        }

        Ok(Value::Regex {
            pattern: Box::new(pattern),
            flags,
        })
    }

    fn read_string_length(&self, input: &mut Input<'_>) -> Result<usize> {
        let len = usize::try_from(read_varint(input)?)
            .map_err(|_| SerealError::Overflow("length exceeds addressable size"))?;
        self.check_string_length(len)?;
        Ok(len)
    }

    fn check_string_length(&self, length: usize) -> Result<()> {
        if Limits::exceeds(self.opts.limits.max_string_length, length) {
            return Err(SerealError::LengthLimit {
                kind: "string",
                length,
                max: self.opts.limits.max_string_length,
            });
        }
        Ok(())
    }

    fn depth_increment(&self, scope: &mut BodyScope) -> Result<()> {
        scope.depth += 1;
        if scope.depth > self.opts.limits.max_recursion_depth {
            return Err(SerealError::RecursionLimit(
                self.opts.limits.max_recursion_depth,
            ));
        }
        Ok(())
    }

    fn depth_decrement(&self, scope: &mut BodyScope) {
        scope.depth -= 1;
    }
}

fn read_count(input: &mut Input<'_>) -> Result<usize> {
    usize::try_from(read_varint(input)?)
        .map_err(|_| SerealError::Overflow("count exceeds addressable size"))
}

fn class_string(value: &Value) -> Result<String> {
    match value {
        Value::Str(s) => Ok(s.as_ref().clone()),
        Value::Bytes(b) => {
            String::from_utf8(b.as_ref().clone()).map_err(|_| SerealError::InvalidUtf8)
        }
        other => Err(SerealError::OutOfRange(format!(
            "class name must be a string, got {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(body: &[u8]) -> Vec<u8> {
        let mut bytes = vec![0x3D, 0x73, 0x72, 0x6C, 0x02, 0x00];
        bytes.extend_from_slice(body);
        bytes
    }

    #[test]
    fn test_bad_magic() {
        let decoder = Decoder::new();
        assert!(matches!(
            decoder.decode(b"nope\x02\x00\x07"),
            Err(SerealError::BadMagic)
        ));
    }

    #[test]
    fn test_magic_version_mismatch() {
        let decoder = Decoder::new();
        // legacy magic with a version-3 nibble
        assert!(matches!(
            decoder.decode(&[0x3D, 0x73, 0x72, 0x6C, 0x03, 0x00, 0x07]),
            Err(SerealError::BadVersion(3))
        ));
        // v3 magic with a version-2 nibble
        assert!(matches!(
            decoder.decode(&[0x3D, 0xF3, 0x72, 0x6C, 0x02, 0x00, 0x07]),
            Err(SerealError::BadVersion(2))
        ));
    }

    #[test]
    fn test_small_integers() {
        let decoder = Decoder::new();
        assert_eq!(decoder.decode(&doc(&[0x07])).unwrap().body, Value::Int(7));
        assert_eq!(decoder.decode(&doc(&[0x1D])).unwrap().body, Value::Int(-3));
    }

    #[test]
    fn test_pad_skipped_anywhere() {
        let decoder = Decoder::new();
        assert_eq!(
            decoder.decode(&doc(&[TAG_PAD, TAG_PAD, 0x07])).unwrap().body,
            Value::Int(7)
        );
    }

    #[test]
    fn test_refn_scalar_becomes_ref() {
        let decoder = Decoder::new();
        let body = decoder.decode(&doc(&[TAG_REFN, 0x05])).unwrap().body;
        assert_eq!(body, Value::reference(Value::Int(5)));
    }

    #[test]
    fn test_inline_arrayref() {
        let decoder = Decoder::new();
        let body = decoder
            .decode(&doc(&[TAG_ARRAYREF | 2, 0x01, 0x02]))
            .unwrap()
            .body;
        assert_eq!(body, Value::array(vec![Value::Int(1), Value::Int(2)]));
    }

    #[test]
    fn test_unknown_tag() {
        let decoder = Decoder::new();
        // 0x3C (reserved) is not part of the implemented alphabet
        assert!(matches!(
            decoder.decode(&doc(&[0x3C])),
            Err(SerealError::InvalidTag { tag: 0x3C, offset: 1 })
        ));
    }
}
