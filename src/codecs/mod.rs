//! Uniform adapters around the backend entropy codecs.
//!
//! Every backend exposes the same three operations: a compressed-size bound,
//! `compress` (returning 0 when the codec declines, which routes the split to
//! the stored-raw path) and `decompress`. Backends with reusable state (zstd
//! contexts, snappy coders) keep it in a per-worker [`CodecState`].

pub mod blosclz;

use std::io::Write;

use crate::constants::*;
use crate::error::{Error, Result};

/// The compressors shipped with this crate, in wire-code order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    BloscLz,
    Lz4,
    Lz4hc,
    Snappy,
    Zlib,
    Zstd,
}

impl Codec {
    pub fn from_code(code: u8) -> Option<Codec> {
        match code {
            BLOSC_BLOSCLZ => Some(Codec::BloscLz),
            BLOSC_LZ4 => Some(Codec::Lz4),
            BLOSC_LZ4HC => Some(Codec::Lz4hc),
            BLOSC_SNAPPY => Some(Codec::Snappy),
            BLOSC_ZLIB => Some(Codec::Zlib),
            BLOSC_ZSTD => Some(Codec::Zstd),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Codec::BloscLz => BLOSC_BLOSCLZ,
            Codec::Lz4 => BLOSC_LZ4,
            Codec::Lz4hc => BLOSC_LZ4HC,
            Codec::Snappy => BLOSC_SNAPPY,
            Codec::Zlib => BLOSC_ZLIB,
            Codec::Zstd => BLOSC_ZSTD,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Codec::BloscLz => BLOSC_BLOSCLZ_COMPNAME,
            Codec::Lz4 => BLOSC_LZ4_COMPNAME,
            Codec::Lz4hc => BLOSC_LZ4HC_COMPNAME,
            Codec::Snappy => BLOSC_SNAPPY_COMPNAME,
            Codec::Zlib => BLOSC_ZLIB_COMPNAME,
            Codec::Zstd => BLOSC_ZSTD_COMPNAME,
        }
    }

    pub fn from_name(name: &str) -> Option<Codec> {
        match name {
            BLOSC_BLOSCLZ_COMPNAME => Some(Codec::BloscLz),
            BLOSC_LZ4_COMPNAME => Some(Codec::Lz4),
            BLOSC_LZ4HC_COMPNAME => Some(Codec::Lz4hc),
            BLOSC_SNAPPY_COMPNAME => Some(Codec::Snappy),
            BLOSC_ZLIB_COMPNAME => Some(Codec::Zlib),
            BLOSC_ZSTD_COMPNAME => Some(Codec::Zstd),
            _ => None,
        }
    }

    /// The compressor-format (library) code stored in bits 5-7 of the header
    /// flags byte. LZ4HC shares the LZ4 format.
    pub fn format(self) -> u8 {
        match self {
            Codec::BloscLz => BLOSC_BLOSCLZ_LIB,
            Codec::Lz4 | Codec::Lz4hc => BLOSC_LZ4_LIB,
            Codec::Snappy => BLOSC_SNAPPY_LIB,
            Codec::Zlib => BLOSC_ZLIB_LIB,
            Codec::Zstd => BLOSC_ZSTD_LIB,
        }
    }

    /// Map a format code read back from a header to a decompressor.
    pub fn from_format(format: u8) -> Option<Codec> {
        match format {
            BLOSC_BLOSCLZ_LIB => Some(Codec::BloscLz),
            BLOSC_LZ4_LIB => Some(Codec::Lz4),
            BLOSC_SNAPPY_LIB => Some(Codec::Snappy),
            BLOSC_ZLIB_LIB => Some(Codec::Zlib),
            BLOSC_ZSTD_LIB => Some(Codec::Zstd),
            _ => None,
        }
    }

    pub fn lib_name(self) -> &'static str {
        match self {
            Codec::BloscLz => BLOSC_BLOSCLZ_LIBNAME,
            Codec::Lz4 | Codec::Lz4hc => BLOSC_LZ4_LIBNAME,
            Codec::Snappy => BLOSC_SNAPPY_LIBNAME,
            Codec::Zlib => BLOSC_ZLIB_LIBNAME,
            Codec::Zstd => BLOSC_ZSTD_LIBNAME,
        }
    }

    pub fn lib_version(self) -> &'static str {
        match self {
            Codec::BloscLz => BLOSCLZ_VERSION_STRING,
            _ => "unknown",
        }
    }

    /// Version byte of the codec's own payload format (header byte 1).
    pub fn version_format(self) -> u8 {
        match self {
            Codec::BloscLz => BLOSC_BLOSCLZ_VERSION_FORMAT,
            Codec::Lz4 => BLOSC_LZ4_VERSION_FORMAT,
            Codec::Lz4hc => BLOSC_LZ4HC_VERSION_FORMAT,
            Codec::Snappy => BLOSC_SNAPPY_VERSION_FORMAT,
            Codec::Zlib => BLOSC_ZLIB_VERSION_FORMAT,
            Codec::Zstd => BLOSC_ZSTD_VERSION_FORMAT,
        }
    }

    /// Upper bound for the compressed size of `nbytes` input. Backends other
    /// than snappy simply decline when they cannot shrink the data, so the
    /// bound equals the input size for them.
    pub fn max_compressed(self, nbytes: usize) -> usize {
        match self {
            Codec::Snappy => snap::raw::max_compress_len(nbytes),
            _ => nbytes,
        }
    }

    /// Whether the codec is meant for high compression ratios, which doubles
    /// the block size. LZ4 joins the club when paired with bit-shuffle;
    /// BloscLZ with bit-shuffle does not work well with larger blocks.
    pub fn is_high_ratio(self, filtercode: u8) -> bool {
        match self {
            Codec::Lz4 => filtercode == BLOSC_BITSHUFFLE,
            Codec::Lz4hc | Codec::Zlib | Codec::Zstd => true,
            Codec::BloscLz | Codec::Snappy => false,
        }
    }
}

/// Comma-separated list of the compressors in this build.
pub fn list_compressors() -> &'static str {
    "blosclz,lz4,lz4hc,snappy,zlib,zstd"
}

/// Compute the acceleration hint for a codec.
///
/// BloscLZ runs accelerated for power-of-two typesizes below 32, which are
/// the shapes byte-shuffle produces; LZ4's `10 - clevel` mapping is kept for
/// parity although the `lz4_flex` backend exposes no acceleration parameter.
pub fn accel_for(codec: Codec, clevel: i32, typesize: usize) -> i32 {
    match codec {
        Codec::BloscLz => {
            if typesize.is_power_of_two() && typesize < 32 {
                32
            } else {
                1
            }
        }
        Codec::Lz4 => 10 - clevel,
        _ => 1,
    }
}

fn zstd_level(clevel: i32) -> i32 {
    if clevel < 9 {
        2 * clevel - 1
    } else {
        *zstd::compression_level_range().end()
    }
}

/// Per-worker codec state, created on first use and dropped with the worker.
#[derive(Default)]
pub struct CodecState {
    zstd_cctx: Option<(i32, zstd::bulk::Compressor<'static>)>,
    zstd_dctx: Option<zstd::bulk::Decompressor<'static>>,
    snappy_enc: Option<snap::raw::Encoder>,
    snappy_dec: Option<snap::raw::Decoder>,
}

impl CodecState {
    pub fn new() -> CodecState {
        CodecState::default()
    }
}

/// Compress `src` into `dst` with the given backend.
///
/// Returns the number of bytes written, or `Ok(0)` when the codec declined
/// (output would not fit, or the backend reported an error that only means
/// "not compressible here"). Real failures come back as `Err`.
pub fn compress(
    codec: Codec,
    state: &mut CodecState,
    clevel: i32,
    accel: i32,
    src: &[u8],
    dst: &mut [u8],
) -> Result<usize> {
    match codec {
        Codec::BloscLz => Ok(blosclz::compress(clevel, src, dst, accel)),
        // lz4_flex only ships the fast compressor; the lz4hc code still
        // produces the shared LZ4 block format through it.
        Codec::Lz4 | Codec::Lz4hc => Ok(lz4_flex::block::compress_into(src, dst).unwrap_or(0)),
        Codec::Snappy => {
            let enc = state.snappy_enc.get_or_insert_with(snap::raw::Encoder::new);
            Ok(enc.compress(src, dst).unwrap_or(0))
        }
        Codec::Zlib => {
            let cursor = std::io::Cursor::new(dst);
            let mut enc = flate2::write::ZlibEncoder::new(
                cursor,
                flate2::Compression::new(clevel.clamp(0, 9) as u32),
            );
            if enc.write_all(src).is_err() {
                return Ok(0);
            }
            match enc.finish() {
                Ok(cursor) => Ok(cursor.position() as usize),
                Err(_) => Ok(0),
            }
        }
        Codec::Zstd => {
            let level = zstd_level(clevel);
            let stale = !matches!(&state.zstd_cctx, Some((l, _)) if *l == level);
            if stale {
                let cctx = zstd::bulk::Compressor::new(level).map_err(|_| Error::Stream)?;
                state.zstd_cctx = Some((level, cctx));
            }
            let (_, cctx) = state.zstd_cctx.as_mut().unwrap();
            Ok(cctx.compress_to_buffer(src, dst).unwrap_or(0))
        }
    }
}

/// Decompress `src` into `dst`, returning the number of bytes produced.
/// The caller checks the count against the expected split size.
pub fn decompress(
    codec: Codec,
    state: &mut CodecState,
    src: &[u8],
    dst: &mut [u8],
) -> Result<usize> {
    match codec {
        Codec::BloscLz => {
            let n = blosclz::decompress(src, dst);
            if n == 0 {
                return Err(Error::Stream);
            }
            Ok(n)
        }
        Codec::Lz4 | Codec::Lz4hc => {
            lz4_flex::block::decompress_into(src, dst).map_err(|_| Error::Stream)
        }
        Codec::Snappy => {
            let dec = state.snappy_dec.get_or_insert_with(snap::raw::Decoder::new);
            dec.decompress(src, dst).map_err(|_| Error::Stream)
        }
        Codec::Zlib => {
            let mut dec = flate2::read::ZlibDecoder::new(src);
            let mut writer = std::io::Cursor::new(dst);
            let n = std::io::copy(&mut dec, &mut writer).map_err(|_| Error::Stream)?;
            Ok(n as usize)
        }
        Codec::Zstd => {
            if state.zstd_dctx.is_none() {
                let dctx = zstd::bulk::Decompressor::new().map_err(|_| Error::Stream)?;
                state.zstd_dctx = Some(dctx);
            }
            let dctx = state.zstd_dctx.as_mut().unwrap();
            dctx.decompress_to_buffer(src, dst).map_err(|_| Error::Stream)
        }
    }
}
