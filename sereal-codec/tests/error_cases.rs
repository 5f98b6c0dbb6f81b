//! Decoder behavior on malformed, truncated, and refused documents

use sereal_codec::{
    Compression, Decoder, DecoderOptions, Encoder, EncoderOptions, Limits, SerealError, Value,
};

fn doc(body: &[u8]) -> Vec<u8> {
    let mut bytes = vec![0x3D, 0x73, 0x72, 0x6C, 0x02, 0x00];
    bytes.extend_from_slice(body);
    bytes
}

fn decode(bytes: &[u8]) -> Result<Value, SerealError> {
    Decoder::new().decode(bytes).map(|d| d.body)
}

#[test]
fn truncated_at_every_prefix() {
    let full = doc(&[0x28, 0x2B, 0x02, 0x61, b'a', 0x2F, 0x04]);
    for cut in 0..full.len() {
        let err = decode(&full[..cut]).unwrap_err();
        assert!(
            matches!(err, SerealError::Truncated { .. }),
            "cut at {cut} gave {err:?}"
        );
    }
    assert!(decode(&full).is_ok());
}

#[test]
fn bad_magic() {
    assert!(matches!(
        decode(b"srl=\x02\x00\x07"),
        Err(SerealError::BadMagic)
    ));
}

#[test]
fn bad_versions() {
    // version zero
    assert!(matches!(
        decode(&[0x3D, 0x73, 0x72, 0x6C, 0x00, 0x00, 0x07]),
        Err(SerealError::BadVersion(0))
    ));
    // above the implemented maximum
    assert!(matches!(
        decode(&[0x3D, 0xF3, 0x72, 0x6C, 0x05, 0x00, 0x07]),
        Err(SerealError::BadVersion(5))
    ));
}

#[test]
fn unknown_encoding_nibble() {
    assert!(matches!(
        decode(&[0x3D, 0x73, 0x72, 0x6C, 0x52, 0x00, 0x07]),
        Err(SerealError::BadEncoding(5))
    ));
}

#[test]
fn zlib_requires_protocol_3() {
    assert!(matches!(
        decode(&[0x3D, 0x73, 0x72, 0x6C, 0x32, 0x00, 0x07]),
        Err(SerealError::BadEncoding(3))
    ));
}

#[test]
fn zstd_requires_protocol_4() {
    assert!(matches!(
        decode(&[0x3D, 0xF3, 0x72, 0x6C, 0x43, 0x00, 0x07]),
        Err(SerealError::BadEncoding(4))
    ));
}

#[test]
fn refp_to_unknown_offset() {
    assert!(matches!(
        decode(&doc(&[0x29, 0x63])),
        Err(SerealError::InvalidBackReference(99))
    ));
}

#[test]
fn alias_to_unknown_offset() {
    assert!(matches!(
        decode(&doc(&[0x2E, 0x07])),
        Err(SerealError::InvalidBackReference(7))
    ));
}

#[test]
fn copy_may_not_point_forward() {
    assert!(matches!(
        decode(&doc(&[0x2F, 0x05])),
        Err(SerealError::InvalidBackReference(5))
    ));
}

#[test]
fn copy_follows_exactly_one_hop() {
    // [ "a", COPY("a"), COPY(first COPY) ] - the second hop is refused
    let body = [0x28, 0x2B, 0x03, 0x61, b'a', 0x2F, 0x04, 0x2F, 0x06];
    assert!(matches!(
        decode(&doc(&body)),
        Err(SerealError::InvalidBackReference(_))
    ));
}

#[test]
fn invalid_utf8_in_str() {
    assert!(matches!(
        decode(&doc(&[0x27, 0x02, 0xFF, 0xFE])),
        Err(SerealError::InvalidUtf8)
    ));
}

#[test]
fn varint_overflow_in_body() {
    // eleven continuation bytes
    let mut body = vec![0x20];
    body.extend([0x80u8; 11]);
    assert!(matches!(
        decode(&doc(&body)),
        Err(SerealError::Overflow(_))
    ));

    // ten bytes carrying more than 64 bits
    let body = [0x20, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x02];
    assert!(matches!(
        decode(&doc(&body)),
        Err(SerealError::Overflow(_))
    ));
}

#[test]
fn objectv_to_non_string_offset() {
    // OBJECTV pointing at an integer slot
    let body = [0x28, 0x2B, 0x02, 0x01, 0x2D, 0x04];
    assert!(matches!(
        decode(&doc(&body)),
        Err(SerealError::InvalidBackReference(4))
    ));
}

#[test]
fn hash_key_must_be_a_string() {
    // HASH with an integer key
    let body = [0x28, 0x2A, 0x01, 0x01, 0x02];
    assert!(decode(&doc(&body)).is_err());
}

#[test]
fn string_length_limit_enforced() {
    let decoder = Decoder::with_options(DecoderOptions {
        limits: Limits {
            max_string_length: 4,
            ..Limits::default()
        },
        ..DecoderOptions::default()
    });
    let document = doc(&[0x65, b'h', b'e', b'l', b'l', b'o']);
    assert!(matches!(
        decoder.decode(&document),
        Err(SerealError::LengthLimit { .. })
    ));
}

#[test]
fn array_entry_limit_enforced() {
    let decoder = Decoder::with_options(DecoderOptions {
        limits: Limits {
            max_num_array_entries: 2,
            ..Limits::default()
        },
        ..DecoderOptions::default()
    });
    let document = doc(&[0x28, 0x2B, 0x03, 0x01, 0x02, 0x03]);
    assert!(matches!(
        decoder.decode(&document),
        Err(SerealError::EntryLimit { kind: "array", .. })
    ));
}

#[test]
fn map_entry_limit_enforced() {
    let decoder = Decoder::with_options(DecoderOptions {
        limits: Limits {
            max_num_map_entries: 1,
            ..Limits::default()
        },
        ..DecoderOptions::default()
    });
    let document = doc(&[0x28, 0x2A, 0x02, 0x61, b'a', 0x01, 0x61, b'b', 0x02]);
    assert!(matches!(
        decoder.decode(&document),
        Err(SerealError::EntryLimit { kind: "hash", .. })
    ));
}

#[test]
fn refuse_snappy_rejects_compressed_documents() {
    let mut encoder = Encoder::with_options(EncoderOptions {
        protocol_version: 2,
        compression: Compression::Snappy,
        compression_threshold: 0,
        ..EncoderOptions::default()
    })
    .unwrap();
    encoder
        .write(&Value::array(
            (0..200).map(|n: i64| Value::Int(n % 7)).collect(),
        ))
        .unwrap();
    assert_eq!(encoder.data()[4] >> 4, 2);

    let decoder = Decoder::with_options(DecoderOptions {
        refuse_snappy: true,
        ..DecoderOptions::default()
    });
    assert!(matches!(
        decoder.decode(encoder.data()),
        Err(SerealError::BadEncoding(2))
    ));
}

#[test]
fn refuse_zlib_and_zstd() {
    let mut zlib = Encoder::with_options(EncoderOptions {
        protocol_version: 3,
        compression: Compression::Zlib(6),
        compression_threshold: 0,
        ..EncoderOptions::default()
    })
    .unwrap();
    zlib.write(&Value::array(
        (0..200).map(|n: i64| Value::Int(n % 7)).collect(),
    ))
    .unwrap();
    let decoder = Decoder::with_options(DecoderOptions {
        refuse_zlib: true,
        ..DecoderOptions::default()
    });
    assert!(matches!(
        decoder.decode(zlib.data()),
        Err(SerealError::BadEncoding(3))
    ));

    let mut zstd = Encoder::with_options(EncoderOptions {
        protocol_version: 4,
        compression: Compression::Zstd(3),
        compression_threshold: 0,
        ..EncoderOptions::default()
    })
    .unwrap();
    zstd.write(&Value::array(
        (0..200).map(|n: i64| Value::Int(n % 7)).collect(),
    ))
    .unwrap();
    let decoder = Decoder::with_options(DecoderOptions {
        refuse_zstd: true,
        ..DecoderOptions::default()
    });
    assert!(matches!(
        decoder.decode(zstd.data()),
        Err(SerealError::BadEncoding(4))
    ));
}

#[test]
fn uncompressed_body_size_limit_enforced() {
    let mut encoder = Encoder::with_options(EncoderOptions {
        protocol_version: 3,
        compression: Compression::Zlib(6),
        compression_threshold: 0,
        ..EncoderOptions::default()
    })
    .unwrap();
    encoder
        .write(&Value::array(
            (0..400).map(|n: i64| Value::Int(n % 7)).collect(),
        ))
        .unwrap();

    let decoder = Decoder::with_options(DecoderOptions {
        limits: Limits {
            max_uncompressed_body_size: 16,
            ..Limits::default()
        },
        ..DecoderOptions::default()
    });
    assert!(matches!(
        decoder.decode(encoder.data()),
        Err(SerealError::LengthLimit { .. })
    ));
}

#[test]
fn truncated_stream_reports_truncated() {
    let mut encoder = Encoder::with_options(EncoderOptions {
        protocol_version: 2,
        ..EncoderOptions::default()
    })
    .unwrap();
    encoder
        .write(&Value::array(vec![Value::from("streamed"), Value::Int(2)]))
        .unwrap();
    let document = encoder.to_vec();

    let mut cursor = std::io::Cursor::new(document[..document.len() - 3].to_vec());
    assert!(matches!(
        Decoder::new().decode_from(&mut cursor),
        Err(SerealError::Truncated { .. })
    ));
}

#[test]
fn declared_header_size_too_small() {
    // suffix claims 1 byte, but the header value is longer
    let document = vec![
        0x3D, 0x73, 0x72, 0x6C, 0x02, // magic + version
        0x01, // suffix size: 1
        0x01, // bitfield: header follows
        0x62, b'h', b'i', // SHORT_BINARY(2): three bytes, overrunning
        0x07, // body
    ];
    assert!(Decoder::new().decode(&document).is_err());
}

#[test]
fn unused_header_suffix_is_skipped() {
    // suffix declares two reserved bytes after the header value
    let document = vec![
        0x3D, 0x73, 0x72, 0x6C, 0x02, // magic + version
        0x04, // suffix size: bitfield + value + 2 reserved
        0x01, // bitfield: header follows
        0x05, // header value: small int 5
        0xAA, 0xBB, // reserved suffix bytes, skipped
        0x07, // body
    ];
    let document = Decoder::new().decode(&document).unwrap();
    assert_eq!(document.header, Some(Value::Int(5)));
    assert_eq!(document.body, Value::Int(7));
}
