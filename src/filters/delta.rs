//! XOR delta coding against a reference, used by the super-chunk pipeline.
//!
//! Two shapes exist. The reference block itself is coded against its own
//! lane-wise predecessor: element `i` is XORed with element `i - 1`, which
//! turns slowly-varying data into low-entropy residuals. Every other block
//! is XORed element-by-element against the co-indexed bytes of the reference
//! buffer, which collapses repeated chunks to zeros. XOR is its own inverse,
//! so encode and decode are the same operation applied in opposite order.
//!
//! The lane width follows the element size for 1/2/4/8; other typesizes
//! degrade to the 8-byte lane when divisible by 8, else to the byte lane.
//! Since XOR never crosses byte boundaries the kernels work on raw bytes
//! with a lane-sized shift, which keeps them independent of host endianness
//! and alignment.

#[inline]
fn lane_width(typesize: usize) -> usize {
    match typesize {
        1 | 2 | 4 | 8 => typesize,
        t if t % 8 == 0 => 8,
        _ => 1,
    }
}

/// Encode the reference block: predecessor XOR within the block itself.
/// The first element is stored verbatim.
pub fn encode_ref_block(typesize: usize, src: &[u8], dest: &mut [u8]) {
    let w = lane_width(typesize).min(src.len());
    dest[..w].copy_from_slice(&src[..w]);
    for i in w..src.len() {
        dest[i] = src[i] ^ src[i - w];
    }
}

/// Undo [`encode_ref_block`] in place. The prefix scan restores each element
/// from its already-decoded predecessor.
pub fn decode_ref_block(typesize: usize, dest: &mut [u8]) {
    let w = lane_width(typesize).min(dest.len());
    for i in w..dest.len() {
        dest[i] ^= dest[i - w];
    }
}

/// Encode a block against the co-indexed slice of the reference buffer.
pub fn encode_with_ref(dref: &[u8], src: &[u8], dest: &mut [u8]) {
    for i in 0..src.len() {
        dest[i] = src[i] ^ dref[i];
    }
}

/// Undo [`encode_with_ref`] in place.
pub fn decode_with_ref(dref: &[u8], dest: &mut [u8]) {
    for (d, r) in dest.iter_mut().zip(dref) {
        *d ^= *r;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(n: usize) -> Vec<u8> {
        (0..n).map(|i| (i * 31 % 253) as u8).collect()
    }

    #[test]
    fn ref_block_involution() {
        for typesize in [1usize, 2, 4, 8, 3, 16, 24] {
            let src = data(typesize * 50);
            let mut enc = vec![0u8; src.len()];
            encode_ref_block(typesize, &src, &mut enc);
            decode_ref_block(typesize, &mut enc);
            assert_eq!(src, enc, "typesize {}", typesize);
        }
    }

    #[test]
    fn with_ref_involution() {
        let src = data(512);
        let dref = data(1024);
        let mut enc = vec![0u8; src.len()];
        encode_with_ref(&dref[256..768], &src, &mut enc);
        decode_with_ref(&dref[256..768], &mut enc);
        assert_eq!(src, enc);
    }

    #[test]
    fn identical_data_yields_zeros() {
        let src = data(256);
        let mut enc = vec![0u8; 256];
        encode_with_ref(&src, &src, &mut enc);
        assert!(enc.iter().all(|&b| b == 0));
    }

    #[test]
    fn ref_block_shorter_than_one_element() {
        // A 3-byte tail with typesize 8 must still roundtrip.
        let src = data(3);
        let mut enc = vec![0u8; 3];
        encode_ref_block(8, &src, &mut enc);
        decode_ref_block(8, &mut enc);
        assert_eq!(src, enc);
    }
}
