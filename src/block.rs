//! The per-block engine: filters, per-lane splitting and codec dispatch for
//! one block, in both directions. Blocks are independent; everything a block
//! needs travels in as arguments so the same code runs on the serial path
//! and inside pool workers.

use std::sync::Arc;

use crate::codecs::{self, Codec, CodecState};
use crate::constants::*;
use crate::error::{Error, Result};
use crate::filters;
use crate::header::{read_u32_le, write_u32_le};

/// Filter pipeline attached from a super-chunk.
///
/// The engine acts on slot 0 when it holds a data-transforming filter (delta
/// or truncate-precision); shuffle-class filters are picked up from any slot
/// by the context. The remaining slots are reserved.
#[derive(Debug, Clone, Default)]
pub struct SchunkPipeline {
    pub filters: [u8; BLOSC_MAX_FILTERS],
    pub filters_meta: [u8; BLOSC_MAX_FILTERS],
    /// Uncompressed delta reference buffer, once one is established.
    pub delta_ref: Option<Arc<Vec<u8>>>,
}

impl SchunkPipeline {
    pub fn has_filter(&self, code: u8) -> bool {
        self.filters.contains(&code)
    }

    /// The shuffle-class filter requested by the pipeline.
    pub fn shuffle_filter(&self) -> u8 {
        if self.has_filter(BLOSC_SHUFFLE) {
            BLOSC_SHUFFLE
        } else if self.has_filter(BLOSC_BITSHUFFLE) {
            BLOSC_BITSHUFFLE
        } else {
            BLOSC_NOFILTER
        }
    }
}

/// How delta decode resolves its reference for a given frame.
#[derive(Clone)]
pub(crate) enum DeltaMode {
    /// No delta filter in play.
    Off,
    /// The frame is its own reference: block 0 is predecessor-coded and the
    /// other blocks are coded against it. Decode needs block 0 first.
    Intra,
    /// Blocks are coded against the co-indexed bytes of this buffer.
    External(Arc<Vec<u8>>),
}

impl DeltaMode {
    pub(crate) fn for_pipeline(pipeline: Option<&SchunkPipeline>) -> DeltaMode {
        match pipeline {
            Some(p) if p.filters[0] == BLOSC_DELTA => match &p.delta_ref {
                Some(dref) => DeltaMode::External(dref.clone()),
                None => DeltaMode::Intra,
            },
            _ => DeltaMode::Off,
        }
    }
}

/// Per-thread scratch: three buffers sized off the current blocksize, only
/// reallocated when the blocksize changes.
pub(crate) struct Scratch {
    pub tmp: Vec<u8>,
    pub tmp2: Vec<u8>,
    pub tmp3: Vec<u8>,
    blocksize: usize,
    typesize: usize,
}

impl Scratch {
    pub fn new() -> Scratch {
        Scratch { tmp: Vec::new(), tmp2: Vec::new(), tmp3: Vec::new(), blocksize: 0, typesize: 0 }
    }

    pub fn resize(&mut self, blocksize: usize, typesize: usize) {
        if self.blocksize == blocksize && self.typesize == typesize {
            return;
        }
        let ebsize = blocksize + typesize * 4;
        self.tmp.resize(blocksize, 0);
        self.tmp2.resize(ebsize, 0);
        self.tmp3.resize(blocksize, 0);
        self.blocksize = blocksize;
        self.typesize = typesize;
    }
}

/// Shuffle & compress a single block into `out`; `out.len()` is the budget.
///
/// Returns the number of bytes written (split length prefixes included), or
/// `Ok(0)` when the block does not fit the budget, which the caller treats
/// as "non-compressible" and resolves with the frame-level MEMCPY path.
#[allow(clippy::too_many_arguments)]
pub(crate) fn compress_block(
    codec: Codec,
    clevel: i32,
    typesize: usize,
    filtercode: u8,
    dont_split: bool,
    pipeline: Option<&SchunkPipeline>,
    src: &[u8],
    offset: usize,
    bsize: usize,
    leftoverblock: bool,
    scratch: &mut Scratch,
    state: &mut CodecState,
    out: &mut [u8],
) -> Result<usize> {
    let Scratch { tmp, tmp2, tmp3, .. } = scratch;
    let block = &src[offset..offset + bsize];
    let mut cur: &[u8] = block;

    // Slot-0 filter from the super-chunk pipeline, ahead of the shuffle.
    if let Some(p) = pipeline {
        match p.filters[0] {
            BLOSC_DELTA => {
                let dest = &mut tmp2[..bsize];
                match &p.delta_ref {
                    Some(dref) => {
                        if offset + bsize > dref.len() {
                            return Err(Error::InvalidParam(
                                "delta reference shorter than the chunk",
                            ));
                        }
                        filters::delta::encode_with_ref(&dref[offset..offset + bsize], block, dest);
                    }
                    None => {
                        // The chunk is its own reference.
                        if offset == 0 {
                            filters::delta::encode_ref_block(typesize, block, dest);
                        } else {
                            filters::delta::encode_with_ref(&src[..bsize], block, dest);
                        }
                    }
                }
                cur = &tmp2[..bsize];
            }
            BLOSC_TRUNC_PREC => {
                let prec = p.filters_meta[0] as i8;
                filters::truncate_precision(prec, typesize, block, &mut tmp2[..bsize])?;
                cur = &tmp2[..bsize];
            }
            _ => {}
        }
    }

    // Shuffle-class filter.
    if filtercode == BLOSC_SHUFFLE && typesize > 1 {
        filters::shuffle(typesize, bsize, cur, &mut tmp[..bsize]);
        cur = &tmp[..bsize];
    } else if filtercode == BLOSC_BITSHUFFLE {
        filters::bitshuffle(typesize, bsize, cur, &mut tmp[..bsize], &mut tmp3[..bsize])?;
        cur = &tmp[..bsize];
    }

    let accel = codecs::accel_for(codec, clevel, typesize);

    // The number of splits for this block.
    let nsplits = if !dont_split && !leftoverblock { typesize } else { 1 };
    let neblock = bsize / nsplits;
    let mut ntbytes = 0usize;

    for j in 0..nsplits {
        // Four bytes are reserved for the split length, written last.
        if ntbytes + 4 > out.len() {
            return Ok(0);
        }
        let bound = codec.max_compressed(neblock);
        let maxout = bound.min(out.len() - ntbytes - 4);
        if maxout == 0 {
            return Ok(0); // non-compressible block
        }

        let split = &cur[j * neblock..(j + 1) * neblock];
        let mut cbytes =
            codecs::compress(codec, state, clevel, accel, split, &mut out[ntbytes + 4..ntbytes + 4 + maxout])?;

        if cbytes > maxout {
            // Buffer overrun caused by the codec (should never happen).
            return Err(Error::CodecOverrun);
        }
        if cbytes == 0 || cbytes == neblock {
            // The codec could not shrink this split: store it raw, budget
            // permitting.
            if ntbytes + 4 + neblock > out.len() {
                return Ok(0);
            }
            out[ntbytes + 4..ntbytes + 4 + neblock].copy_from_slice(split);
            cbytes = neblock;
        }
        write_u32_le(out, ntbytes, cbytes as u32);
        ntbytes += 4 + cbytes;
    }

    Ok(ntbytes)
}

/// Decompress & unshuffle a single block into `out` (exactly `bsize` bytes).
/// Delta decode is a separate step because its ordering is orchestrated by
/// the caller (see the pool's reference gate).
#[allow(clippy::too_many_arguments)]
pub(crate) fn decompress_block(
    codec: Codec,
    typesize: usize,
    filtercode: u8,
    dont_split: bool,
    block_src: &[u8],
    bsize: usize,
    leftoverblock: bool,
    scratch: &mut Scratch,
    state: &mut CodecState,
    out: &mut [u8],
) -> Result<()> {
    let Scratch { tmp, tmp2: _, tmp3, .. } = scratch;
    let use_tmp = filtercode != BLOSC_NOFILTER;

    let nsplits = if !dont_split && !leftoverblock { typesize } else { 1 };
    let neblock = bsize / nsplits;

    {
        let target: &mut [u8] = if use_tmp { &mut tmp[..bsize] } else { &mut out[..bsize] };
        let mut coff = 0usize;
        let mut doff = 0usize;

        for _ in 0..nsplits {
            if coff + 4 > block_src.len() {
                return Err(Error::Stream);
            }
            let cbytes = read_u32_le(block_src, coff) as usize;
            coff += 4;
            if coff + cbytes > block_src.len() {
                return Err(Error::Stream);
            }

            if cbytes == neblock {
                // Stored raw.
                target[doff..doff + neblock]
                    .copy_from_slice(&block_src[coff..coff + neblock]);
            } else {
                let n = codecs::decompress(
                    codec,
                    state,
                    &block_src[coff..coff + cbytes],
                    &mut target[doff..doff + neblock],
                )?;
                if n != neblock {
                    return Err(Error::Stream);
                }
            }
            coff += cbytes;
            doff += neblock;
        }
    }

    if filtercode == BLOSC_SHUFFLE {
        filters::unshuffle(typesize, bsize, &tmp[..bsize], &mut out[..bsize]);
    } else if filtercode == BLOSC_BITSHUFFLE {
        filters::bitunshuffle(typesize, bsize, &tmp[..bsize], &mut out[..bsize], &mut tmp3[..bsize])?;
    }

    Ok(())
}

/// Undo the delta step for one decoded block.
///
/// `dref` carries the reference bytes this block was coded against: the
/// decoded reference block for intra frames, or the co-indexed slice of the
/// external reference. Intra block 0 passes `None` and is prefix-scanned in
/// place.
pub(crate) fn delta_decode_block(
    typesize: usize,
    dref: Option<&[u8]>,
    block: &mut [u8],
) {
    match dref {
        None => filters::delta::decode_ref_block(typesize, block),
        Some(dref) => filters::delta::decode_with_ref(dref, block),
    }
}
