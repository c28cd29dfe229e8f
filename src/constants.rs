//! Format constants, codes and numeric bounds shared across the crate.

/* The version format should be 1-byte long.
   1 -> pre-1.0 era
   2 -> 1.x stable series
   3 -> 2.x series (this crate) */
pub const BLOSC_VERSION_FORMAT: u8 = 3;

/// Minimum (and only) header length.
pub const BLOSC_MIN_HEADER_LENGTH: usize = 16;

/// The maximum overhead during compression in bytes. This equals
/// BLOSC_MIN_HEADER_LENGTH now, but can be higher in future implementations.
pub const BLOSC_MAX_OVERHEAD: usize = BLOSC_MIN_HEADER_LENGTH;

/// Maximum source buffer size to be compressed.
pub const BLOSC_MAX_BUFFERSIZE: usize = i32::MAX as usize - BLOSC_MAX_OVERHEAD;

/// Maximum typesize before considering the source buffer as a stream of bytes.
pub const BLOSC_MAX_TYPESIZE: usize = 255; /* Cannot be larger than 255 */

/// Minimum buffer size to be compressed. Cannot be smaller than 66.
pub const BLOSC_MIN_BUFFERSIZE: usize = 128;

/// The maximum number of splits in a block for compression.
pub const BLOSC_MAX_SPLITS: usize = 16; /* Cannot be larger than 128 */

/// Maximum number of simultaneous filters in a super-chunk pipeline.
pub const BLOSC_MAX_FILTERS: usize = 8;

/// The size of the L1 cache. 32 KB is quite common nowadays.
pub const L1: usize = 32 * 1024;

/* Codes for filters */
pub const BLOSC_NOSHUFFLE: u8 = 0; /* no shuffle */
pub const BLOSC_NOFILTER: u8 = 0; /* no filter */
pub const BLOSC_SHUFFLE: u8 = 1; /* byte-wise shuffle */
pub const BLOSC_BITSHUFFLE: u8 = 2; /* bit-wise shuffle */
pub const BLOSC_DELTA: u8 = 3; /* delta filter */
pub const BLOSC_TRUNC_PREC: u8 = 4; /* truncate precision filter */
pub const BLOSC_LAST_FILTER: u8 = 5; /* sentinel */

/* Codes for internal flags (see blosc_cbuffer_metainfo) */
pub const BLOSC_DOSHUFFLE: u8 = 0x1; /* byte-wise shuffle */
pub const BLOSC_MEMCPYED: u8 = 0x2; /* plain copy */
pub const BLOSC_DOBITSHUFFLE: u8 = 0x4; /* bit-wise shuffle */
pub const BLOSC_FILTER_SCHUNK: u8 = 0x8; /* filter defined in super-chunk */
pub const BLOSC_DONT_SPLIT: u8 = 0x10; /* blocks are not split per lane */

/* Codes for the different compressors shipped with the crate */
pub const BLOSC_BLOSCLZ: u8 = 0;
pub const BLOSC_LZ4: u8 = 1;
pub const BLOSC_LZ4HC: u8 = 2;
pub const BLOSC_SNAPPY: u8 = 3;
pub const BLOSC_ZLIB: u8 = 4;
pub const BLOSC_ZSTD: u8 = 5;

/* Names for the different compressors */
pub const BLOSC_BLOSCLZ_COMPNAME: &str = "blosclz";
pub const BLOSC_LZ4_COMPNAME: &str = "lz4";
pub const BLOSC_LZ4HC_COMPNAME: &str = "lz4hc";
pub const BLOSC_SNAPPY_COMPNAME: &str = "snappy";
pub const BLOSC_ZLIB_COMPNAME: &str = "zlib";
pub const BLOSC_ZSTD_COMPNAME: &str = "zstd";

/* Codes for compression libraries (code must be < 8; stored in flags bits 5-7) */
pub const BLOSC_BLOSCLZ_LIB: u8 = 0;
pub const BLOSC_LZ4_LIB: u8 = 1;
pub const BLOSC_SNAPPY_LIB: u8 = 2;
pub const BLOSC_ZLIB_LIB: u8 = 3;
pub const BLOSC_ZSTD_LIB: u8 = 4;
pub const BLOSC_SCHUNK_LIB: u8 = 7; /* compressor library in super-chunk header */

/* Names for the different compression libraries */
pub const BLOSC_BLOSCLZ_LIBNAME: &str = "BloscLZ";
pub const BLOSC_LZ4_LIBNAME: &str = "LZ4";
pub const BLOSC_SNAPPY_LIBNAME: &str = "Snappy";
pub const BLOSC_ZLIB_LIBNAME: &str = "Zlib";
pub const BLOSC_ZSTD_LIBNAME: &str = "Zstd";

/* The version formats for the compressor payloads. All start at 1. */
pub const BLOSC_BLOSCLZ_VERSION_FORMAT: u8 = 1;
pub const BLOSC_LZ4_VERSION_FORMAT: u8 = 1;
pub const BLOSC_LZ4HC_VERSION_FORMAT: u8 = 1; /* LZ4HC and LZ4 share the same format */
pub const BLOSC_SNAPPY_VERSION_FORMAT: u8 = 1;
pub const BLOSC_ZLIB_VERSION_FORMAT: u8 = 1;
pub const BLOSC_ZSTD_VERSION_FORMAT: u8 = 1;

/// The internal LZ codec version, reported by `blosc_get_complib_info`.
pub const BLOSCLZ_VERSION_STRING: &str = "1.0.6";
