//! Truncate-precision: a lossy preconditioner that zeroes low mantissa bits
//! of IEEE-754 floats so the remaining bits compress better.

use crate::error::{Error, Result};

const BITS_MANTISSA_FLOAT: i8 = 23;
const BITS_MANTISSA_DOUBLE: i8 = 52;

fn zeroed_bits(prec_bits: i8, mantissa_bits: i8) -> Result<i8> {
    // Refuse to clear the whole mantissa so that NaN and Inf encodings
    // stay distinguishable.
    if prec_bits.abs() > mantissa_bits {
        eprintln!(
            "precision cannot exceed {} bits (asking for {})",
            mantissa_bits, prec_bits
        );
        return Err(Error::TruncPrecBits { prec: prec_bits, mantissa: mantissa_bits });
    }
    let zeroed = if prec_bits >= 0 { mantissa_bits - prec_bits } else { -prec_bits };
    if zeroed >= mantissa_bits {
        eprintln!(
            "precision reduction cannot reach {} bits (asking for {})",
            mantissa_bits, zeroed
        );
        return Err(Error::TruncPrecBits { prec: prec_bits, mantissa: mantissa_bits });
    }
    Ok(zeroed)
}

fn truncate32(prec_bits: i8, src: &[u8], dest: &mut [u8]) -> Result<()> {
    let zeroed = zeroed_bits(prec_bits, BITS_MANTISSA_FLOAT)?;
    let mask: u32 = !((1u32 << zeroed) - 1);
    for (s, d) in src.chunks_exact(4).zip(dest.chunks_exact_mut(4)) {
        let v = u32::from_ne_bytes(s.try_into().unwrap()) & mask;
        d.copy_from_slice(&v.to_ne_bytes());
    }
    Ok(())
}

fn truncate64(prec_bits: i8, src: &[u8], dest: &mut [u8]) -> Result<()> {
    let zeroed = zeroed_bits(prec_bits, BITS_MANTISSA_DOUBLE)?;
    let mask: u64 = !((1u64 << zeroed) - 1);
    for (s, d) in src.chunks_exact(8).zip(dest.chunks_exact_mut(8)) {
        let v = u64::from_ne_bytes(s.try_into().unwrap()) & mask;
        d.copy_from_slice(&v.to_ne_bytes());
    }
    Ok(())
}

/// Apply the truncate-precision filter to `src`, writing into `dest`.
///
/// Positive `prec_bits` keeps that many mantissa bits; negative values zero
/// the lowest `|prec_bits|` bits (Python slicing convention). Only typesizes
/// 4 and 8 are handled; anything else fails the block.
pub fn truncate_precision(
    prec_bits: i8,
    typesize: usize,
    src: &[u8],
    dest: &mut [u8],
) -> Result<()> {
    match typesize {
        4 => truncate32(prec_bits, src, dest),
        8 => truncate64(prec_bits, src, dest),
        _ => {
            eprintln!("truncate-precision does not handle typesize {}", typesize);
            Err(Error::TruncPrecTypesize(typesize))
        }
    }
}
