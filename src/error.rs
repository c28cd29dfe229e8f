use thiserror::Error;

/// Errors produced by the compression pipeline.
///
/// The public entry points of the locked API report these as negative `i32`
/// codes (see [`Error::code`]); 0 is reserved for "output does not fit" at
/// compression and "empty range" at getitem, neither of which is an error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A codec wrote past the bound it reported. Should not happen.
    #[error("codec overran its output bound")]
    CodecOverrun,

    /// A decompressor produced a different number of bytes than expected,
    /// returned a failure, or the compressed stream is truncated.
    #[error("compressed stream is corrupt or truncated")]
    Stream,

    /// The requested compressor is not part of this build.
    #[error("compression support for '{0}' is not part of this build")]
    UnsupportedCodec(&'static str),

    /// Truncate-precision only handles 4- and 8-byte floating point types.
    #[error("unsupported typesize {0} for the truncate-precision filter")]
    TruncPrecTypesize(usize),

    /// The truncation request would zero the whole mantissa.
    #[error("precision of {prec} bits not representable with a {mantissa}-bit mantissa")]
    TruncPrecBits { prec: i8, mantissa: i8 },

    /// `start`/`nitems` fall outside the decompressed buffer.
    #[error("item range out of bounds")]
    OutOfBounds,

    /// An invalid parameter was supplied (clevel, filter code, chunk index,
    /// typesize change across super-chunk appends, ...).
    #[error("invalid parameter: {0}")]
    InvalidParam(&'static str),

    /// The destination buffer cannot hold the decompressed payload.
    #[error("destination buffer too small")]
    DestTooSmall,
}

impl Error {
    /// The negative code reported through the C-like public surface.
    pub fn code(&self) -> i32 {
        match self {
            Error::CodecOverrun => -1,
            Error::OutOfBounds => -1,
            Error::DestTooSmall => -1,
            Error::Stream => -2,
            Error::UnsupportedCodec(_) => -5,
            Error::TruncPrecTypesize(_) => -6,
            Error::TruncPrecBits { .. } => -6,
            Error::InvalidParam(_) => -10,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
