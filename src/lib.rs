//! A blocked shuffling and compression engine for binary data and numerical
//! arrays.
//!
//! Buffers are partitioned into cache-sized blocks; each block runs through
//! reversible pre-conditioning filters (byte/bit shuffle, delta,
//! truncate-precision), gets split per element lane when that pays off, and
//! is handed to a backend codec (the built-in LZ, LZ4, Zstd, Zlib or
//! Snappy). Blocks compress independently, in parallel across a persistent
//! worker pool, into a self-contained frame with a 16-byte header. Many
//! frames compose into a super-chunk with a shared filter pipeline, an
//! optional delta reference and random chunk access.
//!
//! Three surfaces are exposed: the locked global API ([`blosc_compress`]
//! and friends), the lock-free context API ([`blosc2_compress_ctx`]), and
//! the super-chunk API ([`Schunk`]).

pub mod api;
pub mod codecs;
pub mod constants;
pub mod context;
pub mod error;
pub mod filters;
pub mod header;
pub mod schunk;

mod block;
mod pool;

pub use api::*;
pub use block::SchunkPipeline;
pub use codecs::Codec;
pub use constants::*;
pub use context::{Context, Cparams, Dparams};
pub use error::Error;
pub use schunk::{packed_append_buffer, packed_decompress_chunk, Schunk, Sparams};
