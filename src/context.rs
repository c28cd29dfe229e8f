//! Compression and decompression contexts: parameter structs, the blocksize
//! policy, and the serial / pooled execution paths that drive the block
//! engine over a whole buffer.

use std::sync::Arc;

use crossbeam_channel::{select, unbounded};

use crate::block::{self, DeltaMode, Scratch, SchunkPipeline};
use crate::codecs::{Codec, CodecState};
use crate::constants::*;
use crate::error::{Error, Result};
use crate::header::{self, write_u32_le, Header};
use crate::pool::{BlockOut, Job, ThreadPool, GIVEUP_INCOMPRESSIBLE, GIVEUP_OK};

/// Parameters for creating a compression context.
#[derive(Debug, Clone)]
pub struct Cparams {
    /// Element width in bytes (1..=255).
    pub typesize: usize,
    /// Compressor code (`BLOSC_BLOSCLZ`, `BLOSC_LZ4`, ...).
    pub compcode: u8,
    /// Compression level, 0 (plain copy) to 9.
    pub clevel: i32,
    /// Shuffle-class filter code (`BLOSC_NOSHUFFLE`/`BLOSC_SHUFFLE`/`BLOSC_BITSHUFFLE`).
    pub filtercode: u8,
    /// Number of worker threads; 1 selects the serial path.
    pub nthreads: usize,
    /// Requested block size in bytes; 0 means automatic.
    pub blocksize: usize,
    /// Filter pipeline of the associated super-chunk, if any.
    pub schunk: Option<SchunkPipeline>,
}

impl Default for Cparams {
    fn default() -> Cparams {
        Cparams {
            typesize: 8,
            compcode: BLOSC_BLOSCLZ,
            clevel: 5,
            filtercode: BLOSC_SHUFFLE,
            nthreads: 1,
            blocksize: 0,
            schunk: None,
        }
    }
}

/// Parameters for creating a decompression context.
#[derive(Debug, Clone, Default)]
pub struct Dparams {
    /// Number of worker threads; 0 or 1 selects the serial path.
    pub nthreads: usize,
    /// Filter pipeline of the associated super-chunk, if any.
    pub schunk: Option<SchunkPipeline>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Compress,
    Decompress,
    Either, // the process-wide context serves both
}

/// A compression/decompression context. Owns the worker pool (spawned on
/// first parallel use, torn down on drop or when the thread count changes)
/// and the scratch buffers of the serial path.
pub struct Context {
    direction: Direction,
    typesize: usize,
    compcode: u8,
    clevel: i32,
    filtercode: u8,
    nthreads: usize,
    force_blocksize: usize,
    schunk: Option<SchunkPipeline>,
    pool: Option<ThreadPool>,
    serial: Scratch,
    serial_state: CodecState,
}

/// Whether a codec wants the block split into one lane per byte of the
/// element. The compressors designed for speed benefit from a split; LZ4
/// surprisingly runs faster unsplit. The `typesize` guard doubles as the
/// explicit cap keeping `nsplits` within `BLOSC_MAX_SPLITS`.
fn split_block(codec: Codec, typesize: usize, blocksize: usize) -> bool {
    matches!(codec, Codec::BloscLz | Codec::Snappy)
        && typesize <= BLOSC_MAX_SPLITS
        && blocksize / typesize >= BLOSC_MIN_BUFFERSIZE
}

/// Select the block size: start from L1, scale by compression level, double
/// for high-compression-ratio codecs, clamp to the buffer, and round down to
/// a whole number of elements.
fn compute_blocksize(
    clevel: i32,
    typesize: usize,
    nbytes: usize,
    forced_blocksize: usize,
    codec: Codec,
    filtercode: u8,
) -> usize {
    // Protection against very small buffers.
    if nbytes < typesize {
        return 1;
    }

    let mut blocksize = nbytes;
    let hcr = codec.is_high_ratio(filtercode);

    if forced_blocksize > 0 {
        blocksize = forced_blocksize.max(BLOSC_MIN_BUFFERSIZE);
    } else if nbytes >= L1 {
        blocksize = L1;
        if hcr {
            blocksize *= 2;
        }
        match clevel {
            0 => blocksize /= 4, // plain copy
            1..=4 => {}
            5 => blocksize *= 2,
            6 => blocksize *= 4,
            7 | 8 => blocksize *= 8,
            _ => {
                blocksize *= 8;
                if hcr {
                    blocksize *= 2;
                }
            }
        }
    }

    if blocksize > nbytes {
        blocksize = nbytes;
    }
    // The blocksize must absolutely be a multiple of the typesize.
    if blocksize > typesize {
        blocksize = blocksize / typesize * typesize;
    }

    blocksize
}

struct FrameShape {
    blocksize: usize,
    nblocks: usize,
    leftover: usize,
}

fn frame_shape(nbytes: usize, blocksize: usize) -> FrameShape {
    let nblocks = if nbytes == 0 { 0 } else { (nbytes + blocksize - 1) / blocksize };
    let leftover = if blocksize == 0 { 0 } else { nbytes % blocksize };
    FrameShape { blocksize, nblocks, leftover }
}

impl Context {
    /// Create a context for compression (`blosc2_create_cctx`).
    pub fn new_cctx(cparams: Cparams) -> Context {
        Context {
            direction: Direction::Compress,
            typesize: cparams.typesize,
            compcode: cparams.compcode,
            clevel: cparams.clevel,
            filtercode: cparams.filtercode,
            nthreads: cparams.nthreads.max(1),
            force_blocksize: cparams.blocksize,
            schunk: cparams.schunk,
            pool: None,
            serial: Scratch::new(),
            serial_state: CodecState::new(),
        }
    }

    /// Create a context for decompression (`blosc2_create_dctx`).
    pub fn new_dctx(dparams: Dparams) -> Context {
        Context {
            direction: Direction::Decompress,
            typesize: 0,
            compcode: BLOSC_BLOSCLZ,
            clevel: 0,
            filtercode: BLOSC_NOFILTER,
            nthreads: dparams.nthreads.max(1),
            force_blocksize: 0,
            schunk: dparams.schunk,
            pool: None,
            serial: Scratch::new(),
            serial_state: CodecState::new(),
        }
    }

    /// The process-wide context behind the locked API: serves both
    /// directions and is reconfigured before every call.
    pub(crate) fn new_global() -> Context {
        let mut ctx = Context::new_cctx(Cparams::default());
        ctx.direction = Direction::Either;
        ctx
    }

    pub(crate) fn configure(
        &mut self,
        clevel: i32,
        filtercode: u8,
        typesize: usize,
        compcode: u8,
        force_blocksize: usize,
        nthreads: usize,
        schunk: Option<SchunkPipeline>,
    ) {
        self.clevel = clevel;
        self.filtercode = filtercode;
        self.typesize = typesize;
        self.compcode = compcode;
        self.force_blocksize = force_blocksize;
        self.nthreads = nthreads.max(1);
        self.schunk = schunk;
    }

    pub(crate) fn set_nthreads(&mut self, nthreads: usize) {
        self.nthreads = nthreads.max(1);
    }

    /// Tear down the worker pool; it is re-spawned on the next parallel call.
    pub(crate) fn release_pool(&mut self) {
        self.pool = None;
    }

    fn ensure_pool(&mut self) -> &ThreadPool {
        let stale = self.pool.as_ref().map(|p| p.nthreads()) != Some(self.nthreads);
        if stale {
            self.pool = Some(ThreadPool::new(self.nthreads));
        }
        self.pool.as_ref().unwrap()
    }

    /// Compress `src` into `dest`, returning the compressed size including
    /// the 16-byte header. `Ok(0)` means the output did not fit `dest`; a
    /// capacity of `src.len() + BLOSC_MAX_OVERHEAD` always succeeds.
    pub fn compress(&mut self, src: &[u8], dest: &mut [u8]) -> Result<usize> {
        if self.direction == Direction::Decompress {
            eprintln!("context is not meant for compression, giving up");
            return Err(Error::InvalidParam("decompression context"));
        }

        let nbytes = src.len();
        if nbytes > BLOSC_MAX_BUFFERSIZE {
            eprintln!("input buffer size cannot exceed {} bytes", BLOSC_MAX_BUFFERSIZE);
            return Err(Error::InvalidParam("buffer too large"));
        }
        if !(0..=9).contains(&self.clevel) {
            eprintln!("`clevel` parameter must be between 0 and 9");
            return Err(Error::InvalidParam("clevel out of range"));
        }
        if self.filtercode >= BLOSC_LAST_FILTER {
            eprintln!("`filtercode` parameter value {} not allowed", self.filtercode);
            return Err(Error::InvalidParam("bad filter code"));
        }
        let codec = match Codec::from_code(self.compcode) {
            Some(c) => c,
            None => {
                eprintln!(
                    "compressor code {} is not available in this build",
                    self.compcode
                );
                return Err(Error::UnsupportedCodec("unknown compressor code"));
            }
        };

        // Oversized element widths degrade to a stream of bytes.
        let mut typesize = self.typesize.max(1);
        if typesize > BLOSC_MAX_TYPESIZE {
            typesize = 1;
        }

        if dest.len() < BLOSC_MAX_OVERHEAD {
            return Ok(0);
        }

        let blocksize = compute_blocksize(
            self.clevel,
            typesize,
            nbytes,
            self.force_blocksize,
            codec,
            self.filtercode,
        );
        let shape = frame_shape(nbytes, blocksize);

        let mut flags = 0u8;
        if self.clevel == 0 || nbytes < BLOSC_MIN_BUFFERSIZE {
            // Buffer is a plain copy, or too small to bother.
            flags |= BLOSC_MEMCPYED;
        }
        if self.filtercode == BLOSC_SHUFFLE {
            flags |= BLOSC_DOSHUFFLE;
        }
        if self.filtercode == BLOSC_BITSHUFFLE {
            flags |= BLOSC_DOBITSHUFFLE;
        }
        let dont_split = !split_block(codec, typesize, blocksize);
        if dont_split {
            flags |= BLOSC_DONT_SPLIT;
        }
        if matches!(&self.schunk, Some(p) if matches!(p.filters[0], BLOSC_DELTA | BLOSC_TRUNC_PREC))
        {
            flags |= BLOSC_FILTER_SCHUNK;
        }

        header::write_header(dest, codec, flags, typesize, nbytes, blocksize);

        let mut ntbytes = 0usize;

        if flags & BLOSC_MEMCPYED == 0 {
            let result = self.compress_payload(codec, typesize, dont_split, src, &shape, dest)?;
            if result == 0 {
                if nbytes + BLOSC_MAX_OVERHEAD <= dest.len() {
                    // Last chance for fitting the buffer: flag a plain copy.
                    flags |= BLOSC_MEMCPYED;
                    dest[2] = flags | (codec.format() << 5);
                } else {
                    return Ok(0);
                }
            } else {
                ntbytes = result;
            }
        }

        if flags & BLOSC_MEMCPYED != 0 {
            if nbytes + BLOSC_MAX_OVERHEAD > dest.len() {
                // We are exceeding the maximum output size.
                return Ok(0);
            }
            dest[BLOSC_MAX_OVERHEAD..BLOSC_MAX_OVERHEAD + nbytes].copy_from_slice(src);
            ntbytes = nbytes + BLOSC_MAX_OVERHEAD;
        }

        write_u32_le(dest, 12, ntbytes as u32);
        debug_assert!(ntbytes <= dest.len());
        Ok(ntbytes)
    }

    fn compress_payload(
        &mut self,
        codec: Codec,
        typesize: usize,
        dont_split: bool,
        src: &[u8],
        shape: &FrameShape,
        dest: &mut [u8],
    ) -> Result<usize> {
        let first = BLOSC_MAX_OVERHEAD + 4 * shape.nblocks;
        if dest.len() < first {
            return Ok(0);
        }

        if self.nthreads == 1 || shape.nblocks <= 1 {
            self.serial_compress(codec, typesize, dont_split, src, shape, dest, first)
        } else {
            self.parallel_compress(codec, typesize, dont_split, src, shape, dest, first)
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn serial_compress(
        &mut self,
        codec: Codec,
        typesize: usize,
        dont_split: bool,
        src: &[u8],
        shape: &FrameShape,
        dest: &mut [u8],
        first: usize,
    ) -> Result<usize> {
        self.serial.resize(shape.blocksize, typesize);
        let mut ntbytes = first;

        for j in 0..shape.nblocks {
            header::write_bstart(dest, j, ntbytes);
            let (bsize, leftoverblock) = shape_of(shape, j);
            let out = &mut dest[ntbytes..];
            let n = block::compress_block(
                codec,
                self.clevel,
                typesize,
                self.filtercode,
                dont_split,
                self.schunk.as_ref(),
                src,
                j * shape.blocksize,
                bsize,
                leftoverblock,
                &mut self.serial,
                &mut self.serial_state,
                out,
            )?;
            if n == 0 {
                return Ok(0); // uncompressible data
            }
            ntbytes += n;
        }

        Ok(ntbytes)
    }

    #[allow(clippy::too_many_arguments)]
    fn parallel_compress(
        &mut self,
        codec: Codec,
        typesize: usize,
        dont_split: bool,
        src: &[u8],
        shape: &FrameShape,
        dest: &mut [u8],
        first: usize,
    ) -> Result<usize> {
        let nsplits = if dont_split { 1 } else { typesize };
        let neblock = shape.blocksize / nsplits;
        // Worst case staging for a fully split block or a stored-raw one.
        let staging = (nsplits * (4 + codec.max_compressed(neblock)))
            .max(4 + codec.max_compressed(shape.blocksize));

        let (res_tx, res_rx) = unbounded::<BlockOut>();
        let job = Arc::new(Job::new(
            true,
            src,
            typesize,
            shape.blocksize,
            shape.nblocks,
            shape.leftover,
            codec,
            self.clevel,
            self.filtercode,
            dont_split,
            staging,
            self.schunk.clone(),
            Vec::new(),
            0,
            res_tx,
        ));

        let nthreads = self.nthreads;
        let pool = self.ensure_pool();
        pool.dispatch(&job);

        // Commit blocks to the frame strictly in index order so the layout
        // is identical for every worker count.
        let mut staged: Vec<Option<Vec<u8>>> = vec![None; shape.nblocks];
        let mut next = 0usize;
        let mut ntbytes = first;
        let mut acks = 0usize;

        let mut commit_ready =
            |staged: &mut Vec<Option<Vec<u8>>>, next: &mut usize, ntbytes: &mut usize| {
                while *next < staged.len() {
                    let Some(data) = staged[*next].take() else { break };
                    if *ntbytes + data.len() > dest.len() {
                        job.set_giveup(GIVEUP_INCOMPRESSIBLE, None);
                        return;
                    }
                    header::write_bstart(dest, *next, *ntbytes);
                    dest[*ntbytes..*ntbytes + data.len()].copy_from_slice(&data);
                    *ntbytes += data.len();
                    *next += 1;
                }
            };

        while acks < nthreads {
            select! {
                recv(res_rx) -> msg => {
                    if let Ok(out) = msg {
                        staged[out.index] = Some(out.data);
                        commit_ready(&mut staged, &mut next, &mut ntbytes);
                    }
                }
                recv(pool.done_rx()) -> _ => {
                    acks += 1;
                }
            }
        }
        // Results sent just before the final acknowledgements.
        while let Ok(out) = res_rx.try_recv() {
            staged[out.index] = Some(out.data);
        }
        commit_ready(&mut staged, &mut next, &mut ntbytes);

        match job.giveup_code() {
            GIVEUP_OK => {
                if next != shape.nblocks {
                    return Err(Error::Stream);
                }
                Ok(ntbytes)
            }
            GIVEUP_INCOMPRESSIBLE => Ok(0),
            _ => Err(job.giveup_error().unwrap_or(Error::Stream)),
        }
    }

    /// Decompress the frame in `src` into `dest`, returning the number of
    /// bytes written.
    pub fn decompress(&mut self, src: &[u8], dest: &mut [u8]) -> Result<usize> {
        if self.direction == Direction::Compress {
            eprintln!("context is not meant for decompression, giving up");
            return Err(Error::InvalidParam("compression context"));
        }

        let h = Header::parse(src)?;
        let codec = h.codec()?;
        if h.cbytes > src.len() || h.cbytes < BLOSC_MIN_HEADER_LENGTH {
            return Err(Error::Stream);
        }
        if h.nbytes > dest.len() {
            return Err(Error::DestTooSmall);
        }

        if h.memcpyed() {
            if BLOSC_MAX_OVERHEAD + h.nbytes > src.len() {
                return Err(Error::Stream);
            }
            dest[..h.nbytes]
                .copy_from_slice(&src[BLOSC_MAX_OVERHEAD..BLOSC_MAX_OVERHEAD + h.nbytes]);
            return Ok(h.nbytes);
        }

        let shape = frame_shape(h.nbytes, h.blocksize);
        let first = BLOSC_MIN_HEADER_LENGTH + 4 * shape.nblocks;
        if h.cbytes < first {
            return Err(Error::Stream);
        }

        // Read and validate the block-starts table up front.
        let mut bstarts = Vec::with_capacity(shape.nblocks);
        for i in 0..shape.nblocks {
            let bstart = header::read_bstart(src, i);
            if bstart < first || bstart >= h.cbytes {
                return Err(Error::Stream);
            }
            bstarts.push(bstart);
        }

        let filtercode = h.filtercode();
        let typesize = h.typesize.max(1);

        if self.nthreads == 1 || shape.nblocks <= 1 {
            self.serial_decompress(codec, typesize, filtercode, &h, src, &shape, &bstarts, dest)?;
        } else {
            self.parallel_decompress(codec, typesize, filtercode, &h, src, &shape, &bstarts, dest)?;
        }
        Ok(h.nbytes)
    }

    #[allow(clippy::too_many_arguments)]
    fn serial_decompress(
        &mut self,
        codec: Codec,
        typesize: usize,
        filtercode: u8,
        h: &Header,
        src: &[u8],
        shape: &FrameShape,
        bstarts: &[usize],
        dest: &mut [u8],
    ) -> Result<()> {
        self.serial.resize(shape.blocksize, typesize);
        let delta = DeltaMode::for_pipeline(self.schunk.as_ref());

        for j in 0..shape.nblocks {
            let (bsize, leftoverblock) = shape_of(shape, j);
            let offset = j * shape.blocksize;
            block::decompress_block(
                codec,
                typesize,
                filtercode,
                h.dont_split(),
                &src[bstarts[j]..h.cbytes],
                bsize,
                leftoverblock,
                &mut self.serial,
                &mut self.serial_state,
                &mut dest[offset..offset + bsize],
            )?;

            match &delta {
                DeltaMode::Off => {}
                DeltaMode::External(dref) => {
                    if offset + bsize > dref.len() {
                        return Err(Error::InvalidParam("delta reference shorter than the chunk"));
                    }
                    block::delta_decode_block(
                        typesize,
                        Some(&dref[offset..offset + bsize]),
                        &mut dest[offset..offset + bsize],
                    );
                }
                DeltaMode::Intra => {
                    if j == 0 {
                        block::delta_decode_block(typesize, None, &mut dest[..bsize]);
                    } else {
                        // The reference block is already decoded in place.
                        let (head, tail) = dest.split_at_mut(offset);
                        block::delta_decode_block(
                            typesize,
                            Some(&head[..bsize]),
                            &mut tail[..bsize],
                        );
                    }
                }
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn parallel_decompress(
        &mut self,
        codec: Codec,
        typesize: usize,
        filtercode: u8,
        h: &Header,
        src: &[u8],
        shape: &FrameShape,
        bstarts: &[usize],
        dest: &mut [u8],
    ) -> Result<()> {
        let (res_tx, res_rx) = unbounded::<BlockOut>();
        let job = Arc::new(Job::new(
            false,
            src,
            typesize,
            shape.blocksize,
            shape.nblocks,
            shape.leftover,
            codec,
            0,
            filtercode,
            h.dont_split(),
            0,
            self.schunk.clone(),
            bstarts.to_vec(),
            h.cbytes,
            res_tx,
        ));

        let nthreads = self.nthreads;
        let pool = self.ensure_pool();
        pool.dispatch(&job);

        let mut received = 0usize;
        let mut acks = 0usize;
        let mut store = |out: BlockOut, received: &mut usize| {
            let offset = out.index * shape.blocksize;
            dest[offset..offset + out.data.len()].copy_from_slice(&out.data);
            *received += 1;
        };

        while acks < nthreads {
            select! {
                recv(res_rx) -> msg => {
                    if let Ok(out) = msg {
                        store(out, &mut received);
                    }
                }
                recv(pool.done_rx()) -> _ => {
                    acks += 1;
                }
            }
        }
        while let Ok(out) = res_rx.try_recv() {
            store(out, &mut received);
        }

        if job.giveup_code() != GIVEUP_OK {
            return Err(job.giveup_error().unwrap_or(Error::Stream));
        }
        if received != shape.nblocks {
            return Err(Error::Stream);
        }
        Ok(())
    }

    /// Decompress `nitems` elements starting at element `start` straight out
    /// of a frame, touching only the blocks that intersect the range. Always
    /// runs on the serial path.
    pub fn getitem(
        &mut self,
        src: &[u8],
        start: usize,
        nitems: usize,
        dest: &mut [u8],
    ) -> Result<usize> {
        let h = Header::parse(src)?;
        let codec = h.codec()?;
        let typesize = h.typesize.max(1);

        let stop_byte = start
            .checked_add(nitems)
            .and_then(|stop| stop.checked_mul(typesize))
            .ok_or(Error::OutOfBounds)?;
        if stop_byte > h.nbytes {
            return Err(Error::OutOfBounds);
        }
        let start_byte = start * typesize;
        if dest.len() < stop_byte - start_byte {
            return Err(Error::OutOfBounds);
        }
        if nitems == 0 {
            return Ok(0);
        }
        if h.cbytes > src.len() {
            return Err(Error::Stream);
        }

        if h.memcpyed() {
            let from = BLOSC_MAX_OVERHEAD + start_byte;
            if from + (stop_byte - start_byte) > src.len() {
                return Err(Error::Stream);
            }
            dest[..stop_byte - start_byte]
                .copy_from_slice(&src[from..from + (stop_byte - start_byte)]);
            return Ok(stop_byte - start_byte);
        }

        let shape = frame_shape(h.nbytes, h.blocksize);
        let first = BLOSC_MIN_HEADER_LENGTH + 4 * shape.nblocks;
        if h.cbytes < first {
            return Err(Error::Stream);
        }
        let mut bstarts = Vec::with_capacity(shape.nblocks);
        for i in 0..shape.nblocks {
            let bstart = header::read_bstart(src, i);
            if bstart < first || bstart >= h.cbytes {
                return Err(Error::Stream);
            }
            bstarts.push(bstart);
        }

        let filtercode = h.filtercode();
        self.serial.resize(shape.blocksize, typesize);

        let delta = DeltaMode::for_pipeline(self.schunk.as_ref());

        // Intra-frame delta codes every block against block 0, so that one
        // is needed regardless of the requested range.
        let ref0: Option<Vec<u8>> = match &delta {
            DeltaMode::Intra => {
                let (bsize, leftoverblock) = shape_of(&shape, 0);
                let mut block0 = vec![0u8; bsize];
                block::decompress_block(
                    codec,
                    typesize,
                    filtercode,
                    h.dont_split(),
                    &src[bstarts[0]..h.cbytes],
                    bsize,
                    leftoverblock,
                    &mut self.serial,
                    &mut self.serial_state,
                    &mut block0,
                )?;
                block::delta_decode_block(typesize, None, &mut block0);
                Some(block0)
            }
            _ => None,
        };

        let start_block = start_byte / shape.blocksize;
        let end_block = (stop_byte - 1) / shape.blocksize;
        let mut block_buf = vec![0u8; shape.blocksize];
        let mut ntbytes = 0usize;

        for j in start_block..=end_block {
            let (bsize, leftoverblock) = shape_of(&shape, j);
            let offset = j * shape.blocksize;

            let buf = &mut block_buf[..bsize];
            if matches!(&delta, DeltaMode::Intra) && j == 0 {
                buf.copy_from_slice(ref0.as_ref().unwrap());
            } else {
                block::decompress_block(
                    codec,
                    typesize,
                    filtercode,
                    h.dont_split(),
                    &src[bstarts[j]..h.cbytes],
                    bsize,
                    leftoverblock,
                    &mut self.serial,
                    &mut self.serial_state,
                    buf,
                )?;
                match &delta {
                    DeltaMode::Off => {}
                    DeltaMode::External(dref) => {
                        if offset + bsize > dref.len() {
                            return Err(Error::InvalidParam(
                                "delta reference shorter than the chunk",
                            ));
                        }
                        block::delta_decode_block(
                            typesize,
                            Some(&dref[offset..offset + bsize]),
                            buf,
                        );
                    }
                    DeltaMode::Intra => {
                        let dref = ref0.as_ref().unwrap();
                        block::delta_decode_block(typesize, Some(&dref[..bsize]), buf);
                    }
                }
            }

            // Copy the intersection of the block with the requested range.
            let copy_start = start_byte.max(offset);
            let copy_stop = stop_byte.min(offset + bsize);
            let len = copy_stop - copy_start;
            dest[ntbytes..ntbytes + len]
                .copy_from_slice(&block_buf[copy_start - offset..copy_stop - offset]);
            ntbytes += len;
        }

        Ok(ntbytes)
    }
}

fn shape_of(shape: &FrameShape, index: usize) -> (usize, bool) {
    if index == shape.nblocks - 1 && shape.leftover > 0 {
        (shape.leftover, true)
    } else {
        (shape.blocksize, false)
    }
}
