//! Framed body compression
//!
//! The frame is built without a second copy of the compressed data: the
//! pre-body header is copied into the frame buffer, a varint-sized slot for
//! the compressed length is reserved and pre-filled as a non-minimal
//! encoding of zero (`0x80 … 0x00`), and the codec compresses straight into
//! the frame after the slot. Once the true size is known it is patched into
//! the slot; when the natural varint is shorter than the reservation, the
//! continuation bit is OR-ed into its last byte so the pre-filled run still
//! parses as one (non-minimal) varint.

use flate2::{Compress, FlushCompress, FlushDecompress, Status};
use tracing::debug;

use sereal_format::constants::{
    ENCODING_SNAPPY, ENCODING_SNAPPY_LEGACY, ENCODING_ZLIB, ENCODING_ZSTD,
};
use sereal_format::varint::{encode_varint, varint_length};
use sereal_format::{Compression, Limits, Result, SerealError};

use crate::input::{read_varint, Input};

/// Per-encoder compression state, reset per document
pub(crate) struct FrameCompressor {
    snappy: Option<snap::raw::Encoder>,
    zlib: Option<Compress>,
    zstd: Option<zstd::bulk::Compressor<'static>>,
}

impl FrameCompressor {
    pub fn new(compression: &Compression) -> Result<Self> {
        let mut this = Self {
            snappy: None,
            zlib: None,
            zstd: None,
        };
        match compression {
            Compression::None => {}
            Compression::Snappy => this.snappy = Some(snap::raw::Encoder::new()),
            Compression::Zlib(level) => {
                this.zlib = Some(Compress::new(flate2::Compression::new(*level), true));
            }
            Compression::Zstd(level) => {
                let compressor = zstd::bulk::Compressor::new(*level)
                    .map_err(|e| SerealError::Compression(format!("zstd init failed: {e}")))?;
                this.zstd = Some(compressor);
            }
        }
        Ok(this)
    }

    /// Build the compression frame for `raw` (a complete uncompressed
    /// document) into `out`. Returns `Ok(false)` when the frame would not
    /// be smaller than the raw document, in which case the caller keeps the
    /// raw bytes and clears the encoding nibble.
    pub fn compress(
        &mut self,
        raw: &[u8],
        header_size: usize,
        encoding: u8,
        out: &mut Vec<u8>,
    ) -> Result<bool> {
        let body = &raw[header_size..];
        let smaller = match encoding {
            ENCODING_SNAPPY_LEGACY | ENCODING_SNAPPY => {
                self.compress_snappy(raw, header_size, encoding, out)?
            }
            ENCODING_ZLIB => self.compress_zlib(raw, header_size, out)?,
            ENCODING_ZSTD => self.compress_zstd(raw, header_size, out)?,
            other => {
                return Err(SerealError::Internal(format!(
                    "no compressor for encoding {other}"
                )))
            }
        };
        debug!(
            body_len = body.len(),
            frame_len = out.len(),
            kept = smaller,
            "compression frame built"
        );
        Ok(smaller)
    }

    fn compress_snappy(
        &mut self,
        raw: &[u8],
        header_size: usize,
        encoding: u8,
        out: &mut Vec<u8>,
    ) -> Result<bool> {
        let body = &raw[header_size..];
        let max = snap::raw::max_compress_len(body.len());
        if max == 0 {
            return Err(SerealError::Compression(
                "body too large for snappy".to_string(),
            ));
        }
        // legacy framing has no length varint
        let size_len = if encoding == ENCODING_SNAPPY {
            varint_length(max as u64)
        } else {
            0
        };

        out.clear();
        out.extend_from_slice(&raw[..header_size]);
        if size_len > 0 {
            reserve_varint_slot(out, size_len);
        }
        let data_start = out.len();
        out.resize(data_start + max, 0);

        let encoder = self
            .snappy
            .as_mut()
            .ok_or_else(|| SerealError::Internal("snappy state missing".to_string()))?;
        let compressed = encoder
            .compress(body, &mut out[data_start..])
            .map_err(|e| SerealError::Compression(format!("snappy compression failed: {e}")))?;
        out.truncate(data_start + compressed);

        if out.len() >= raw.len() {
            return Ok(false);
        }
        if size_len > 0 {
            patch_varint_slot(out, header_size, size_len, compressed as u64);
        }
        Ok(true)
    }

    fn compress_zlib(&mut self, raw: &[u8], header_size: usize, out: &mut Vec<u8>) -> Result<bool> {
        let deflate = self
            .zlib
            .as_mut()
            .ok_or_else(|| SerealError::Internal("zlib state missing".to_string()))?;
        deflate.reset();

        let body = &raw[header_size..];
        let max = zlib_bound(body.len());

        out.clear();
        out.extend_from_slice(&raw[..header_size]);
        // uncompressed length first, then the patched compressed length
        out.extend_from_slice(&encode_varint(body.len() as u64));
        let slot_start = out.len();
        let slot_len = varint_length(max as u64);
        reserve_varint_slot(out, slot_len);
        let data_start = out.len();
        out.resize(data_start + max, 0);

        let status = deflate
            .compress(body, &mut out[data_start..], FlushCompress::Finish)
            .map_err(|e| SerealError::Compression(format!("zlib compression failed: {e}")))?;
        if status != Status::StreamEnd {
            return Err(SerealError::Compression(
                "zlib did not reach stream end".to_string(),
            ));
        }
        let compressed = deflate.total_out() as usize;
        out.truncate(data_start + compressed);

        if out.len() >= raw.len() {
            return Ok(false);
        }
        patch_varint_slot(out, slot_start, slot_len, compressed as u64);
        Ok(true)
    }

    fn compress_zstd(&mut self, raw: &[u8], header_size: usize, out: &mut Vec<u8>) -> Result<bool> {
        let body = &raw[header_size..];
        let max = zstd::zstd_safe::compress_bound(body.len());
        let slot_len = varint_length(max as u64);

        out.clear();
        out.extend_from_slice(&raw[..header_size]);
        let slot_start = out.len();
        reserve_varint_slot(out, slot_len);
        let data_start = out.len();
        out.resize(data_start + max, 0);

        let compressor = self
            .zstd
            .as_mut()
            .ok_or_else(|| SerealError::Internal("zstd state missing".to_string()))?;
        let compressed = compressor
            .compress_to_buffer(body, &mut out[data_start..])
            .map_err(|e| SerealError::Compression(format!("zstd compression failed: {e}")))?;
        out.truncate(data_start + compressed);

        if out.len() >= raw.len() {
            return Ok(false);
        }
        patch_varint_slot(out, slot_start, slot_len, compressed as u64);
        Ok(true)
    }
}

/// Inflate a compressed body, consuming its length varint(s) from `input`.
/// The returned bytes become the decoder's body window.
pub(crate) fn decompress_body(
    encoding: u8,
    input: &mut Input<'_>,
    limits: &Limits,
) -> Result<Vec<u8>> {
    match encoding {
        ENCODING_SNAPPY_LEGACY => {
            // compressed data runs to the end of the document
            input.fill_to_eof()?;
            let compressed = input.take_rest();
            let uncompressed_len = snap::raw::decompress_len(compressed)
                .map_err(|e| SerealError::Compression(format!("snappy length: {e}")))?;
            check_body_limit(limits, uncompressed_len)?;
            snap::raw::Decoder::new()
                .decompress_vec(compressed)
                .map_err(|e| SerealError::Compression(format!("snappy decompression failed: {e}")))
        }
        ENCODING_SNAPPY => {
            let compressed_len = usize_from(read_varint(input)?)?;
            let compressed = input.take(compressed_len)?;
            let uncompressed_len = snap::raw::decompress_len(compressed)
                .map_err(|e| SerealError::Compression(format!("snappy length: {e}")))?;
            check_body_limit(limits, uncompressed_len)?;
            snap::raw::Decoder::new()
                .decompress_vec(compressed)
                .map_err(|e| SerealError::Compression(format!("snappy decompression failed: {e}")))
        }
        ENCODING_ZLIB => {
            let uncompressed_len = usize_from(read_varint(input)?)?;
            check_body_limit(limits, uncompressed_len)?;
            let compressed_len = usize_from(read_varint(input)?)?;
            let compressed = input.take(compressed_len)?;

            let mut inflate = flate2::Decompress::new(true);
            let mut body = Vec::with_capacity(uncompressed_len);
            let status = inflate
                .decompress_vec(compressed, &mut body, FlushDecompress::Finish)
                .map_err(|e| SerealError::Compression(format!("zlib decompression failed: {e}")))?;
            if status != Status::StreamEnd || body.len() != uncompressed_len {
                return Err(SerealError::Compression(
                    "zlib body length mismatch".to_string(),
                ));
            }
            Ok(body)
        }
        ENCODING_ZSTD => {
            let compressed_len = usize_from(read_varint(input)?)?;
            let compressed = input.take(compressed_len)?;
            if limits.max_uncompressed_body_size != 0 {
                zstd::bulk::decompress(compressed, limits.max_uncompressed_body_size).map_err(
                    |e| SerealError::Compression(format!("zstd decompression failed: {e}")),
                )
            } else {
                zstd::stream::decode_all(compressed).map_err(|e| {
                    SerealError::Compression(format!("zstd decompression failed: {e}"))
                })
            }
        }
        other => Err(SerealError::BadEncoding(other)),
    }
}

/// Worst-case zlib output size, per the miniz bound
fn zlib_bound(source_len: usize) -> usize {
    (128 + source_len * 110 / 100).max(128 + source_len + (source_len / (31 * 1024) + 1) * 5)
}

/// Pre-fill a length slot as a varint-encoded zero occupying all the space
fn reserve_varint_slot(out: &mut Vec<u8>, slot_len: usize) {
    for _ in 1..slot_len {
        out.push(0x80);
    }
    out.push(0x00);
}

/// Write the true value into a reserved slot, keeping the encoding valid
/// (if non-minimal) when it is shorter than the reservation
fn patch_varint_slot(out: &mut [u8], slot_start: usize, slot_len: usize, value: u64) {
    let encoded = encode_varint(value);
    debug_assert!(encoded.len() <= slot_len);
    out[slot_start..slot_start + encoded.len()].copy_from_slice(&encoded);
    if encoded.len() < slot_len {
        out[slot_start + encoded.len() - 1] |= 0x80;
    }
}

fn usize_from(val: u64) -> Result<usize> {
    usize::try_from(val).map_err(|_| SerealError::Overflow("length exceeds addressable size"))
}

fn check_body_limit(limits: &Limits, len: usize) -> Result<()> {
    if Limits::exceeds(limits.max_uncompressed_body_size, len) {
        return Err(SerealError::LengthLimit {
            kind: "uncompressed body",
            length: len,
            max: limits.max_uncompressed_body_size,
        });
    }
    Ok(())
}
