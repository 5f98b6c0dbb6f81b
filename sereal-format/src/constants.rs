//! Constants and magic numbers for the Sereal wire format

/// Document magic for protocol versions 1 and 2: "=srl"
pub const MAGIC: [u8; 4] = [0x3D, 0x73, 0x72, 0x6C];

/// Document magic for protocol version 3 and later: "=\xF3rl"
pub const MAGIC_V3: [u8; 4] = [0x3D, 0xF3, 0x72, 0x6C];

/// Highest protocol version this implementation understands
pub const MAX_PROTOCOL_VERSION: u8 = 4;

/// Body encoding nibbles (high nibble of the version/encoding byte)
pub const ENCODING_RAW: u8 = 0;
/// Legacy Snappy: compressed data runs to the end of the document
pub const ENCODING_SNAPPY_LEGACY: u8 = 1;
/// Snappy with a leading compressed-length varint
pub const ENCODING_SNAPPY: u8 = 2;
/// Zlib with uncompressed-length and compressed-length varints
pub const ENCODING_ZLIB: u8 = 3;
/// Zstandard with a leading compressed-length varint
pub const ENCODING_ZSTD: u8 = 4;

/// Track bit: set retroactively on a tag byte when a later REFP/ALIAS
/// points at it
pub const TRACK_BIT: u8 = 0x80;

/// Packed small positive integers 0..=15 (`POS_LOW | n`)
pub const TAG_POS_LOW: u8 = 0x00;
/// Packed small negative integers -16..=-1 (`NEG_LOW | (n + 32)`)
pub const TAG_NEG_LOW: u8 = 0x10;
/// Unsigned varint follows
pub const TAG_VARINT: u8 = 0x20;
/// ZigZag-mapped signed varint follows
pub const TAG_ZIGZAG: u8 = 0x21;
/// 4-byte little-endian IEEE-754 single
pub const TAG_FLOAT: u8 = 0x22;
/// 8-byte little-endian IEEE-754 double
pub const TAG_DOUBLE: u8 = 0x23;
/// 16-byte little-endian IEEE-754 binary128
pub const TAG_LONG_DOUBLE: u8 = 0x24;
/// Undefined value
pub const TAG_UNDEF: u8 = 0x25;
/// Byte string: varint length + bytes
pub const TAG_BINARY: u8 = 0x26;
/// Unicode string: varint length + UTF-8 bytes
pub const TAG_STR_UTF8: u8 = 0x27;
/// Reference to the next item
pub const TAG_REFN: u8 = 0x28;
/// Reference to a previously emitted item, by body offset
pub const TAG_REFP: u8 = 0x29;
/// Mapping: varint pair count + 2n items
pub const TAG_HASH: u8 = 0x2A;
/// Sequence: varint count + n items
pub const TAG_ARRAY: u8 = 0x2B;
/// Blessed object with inline class name
pub const TAG_OBJECT: u8 = 0x2C;
/// Blessed object with class name by body offset
pub const TAG_OBJECTV: u8 = 0x2D;
/// Alias of a previously emitted item, by body offset
pub const TAG_ALIAS: u8 = 0x2E;
/// Byte-identical reuse of a previous string-family item
pub const TAG_COPY: u8 = 0x2F;
/// The next item is weakly referenced
pub const TAG_WEAKEN: u8 = 0x30;
/// Regex: pattern string + flags short-binary
pub const TAG_REGEXP: u8 = 0x31;
/// Canonical undefined value (protocol 3+)
pub const TAG_CANONICAL_UNDEF: u8 = 0x39;
/// Boolean false
pub const TAG_FALSE: u8 = 0x3A;
/// Boolean true
pub const TAG_TRUE: u8 = 0x3B;
/// No-op filler, allowed wherever a tag is expected
pub const TAG_PAD: u8 = 0x3F;
/// Inline sequence of 0..=15 elements (`ARRAYREF | n`)
pub const TAG_ARRAYREF: u8 = 0x40;
/// Inline mapping of 0..=15 pairs (`HASHREF | n`)
pub const TAG_HASHREF: u8 = 0x50;
/// Byte string of 0..=31 bytes (`SHORT_BINARY | len`)
pub const TAG_SHORT_BINARY: u8 = 0x60;

/// Low-nibble mask for the ARRAYREF/HASHREF count
pub const MASK_INLINE_COUNT: u8 = 0x0F;
/// Length mask for SHORT_BINARY
pub const MASK_SHORT_BINARY_LEN: u8 = 0x1F;

/// Strip the track bit, leaving the 7-bit opcode
pub fn strip_track_bit(tag: u8) -> u8 {
    tag & !TRACK_BIT
}

/// Check whether the track bit is set
pub fn has_track_bit(tag: u8) -> bool {
    tag & TRACK_BIT != 0
}

/// Check whether the opcode denotes a reference (REFN, REFP, or an inline
/// ARRAYREF/HASHREF form)
pub fn is_ref_tag(tag: u8) -> bool {
    let tag = strip_track_bit(tag);
    tag == TAG_REFN || tag == TAG_REFP || (TAG_ARRAYREF..TAG_SHORT_BINARY).contains(&tag)
}

/// Check whether the opcode denotes a string-family item (SHORT_BINARY,
/// BINARY, or STR_UTF8)
pub fn is_string_tag(tag: u8) -> bool {
    let tag = strip_track_bit(tag);
    tag == TAG_BINARY || tag == TAG_STR_UTF8 || tag >= TAG_SHORT_BINARY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_bit() {
        assert!(has_track_bit(TAG_REFN | TRACK_BIT));
        assert!(!has_track_bit(TAG_REFN));
        assert_eq!(strip_track_bit(TAG_ARRAY | TRACK_BIT), TAG_ARRAY);
        assert_eq!(strip_track_bit(TAG_ARRAY), TAG_ARRAY);
    }

    #[test]
    fn test_ref_tags() {
        assert!(is_ref_tag(TAG_REFN));
        assert!(is_ref_tag(TAG_REFP));
        assert!(is_ref_tag(TAG_ARRAYREF | 3));
        assert!(is_ref_tag(TAG_HASHREF | 15));
        assert!(is_ref_tag(TAG_REFN | TRACK_BIT));
        assert!(!is_ref_tag(TAG_ARRAY));
        assert!(!is_ref_tag(TAG_SHORT_BINARY | 2));
        assert!(!is_ref_tag(TAG_WEAKEN));
    }

    #[test]
    fn test_string_tags() {
        assert!(is_string_tag(TAG_BINARY));
        assert!(is_string_tag(TAG_STR_UTF8));
        assert!(is_string_tag(TAG_SHORT_BINARY));
        assert!(is_string_tag(TAG_SHORT_BINARY | 31));
        assert!(!is_string_tag(TAG_ARRAY));
        assert!(!is_string_tag(TAG_HASHREF | 1));
    }
}
