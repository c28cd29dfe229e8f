//! Reversible (and one deliberately lossy) pre-conditioning filters applied
//! to a block before it reaches the entropy codec.

pub mod bitshuffle;
pub mod delta;
pub mod shuffle;
pub mod trunc_prec;

pub use self::bitshuffle::{bitshuffle, bitunshuffle};
pub use self::shuffle::{shuffle, unshuffle};
pub use self::trunc_prec::truncate_precision;
