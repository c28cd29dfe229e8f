//! Persistent worker pool owned by a compression context.
//!
//! A job is dispatched by sending the same `Arc<Job>` once per worker (the
//! init rendezvous); workers claim block indices from a shared counter,
//! stage each finished block in an owned buffer and hand it to the caller
//! thread over a channel. The caller commits compressed blocks in index
//! order, which makes the frame layout independent of the worker count, and
//! then collects one acknowledgement per worker (the finish rendezvous)
//! before returning. A latched give-up code makes every worker abandon the
//! remaining blocks as soon as one of them fails.

use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::block::{self, DeltaMode, Scratch, SchunkPipeline};
use crate::codecs::{Codec, CodecState};
use crate::error::{Error, Result};

/// Sentinel stored in the give-up slot while everything is healthy.
pub(crate) const GIVEUP_OK: i32 = 1;
/// Stored when a block does not fit its budget: not an error, the caller
/// falls back to the MEMCPY path.
pub(crate) const GIVEUP_INCOMPRESSIBLE: i32 = 0;

/// Borrowed byte range handed to the persistent workers.
///
/// Safety: the job protocol guarantees the referent outlives every access.
/// The dispatching call keeps the source slice borrowed until all workers
/// have acknowledged the job, and workers drop the job before acking, so
/// the pointer is never dereferenced after the caller resumes.
#[derive(Clone, Copy)]
struct SendSlice {
    ptr: *const u8,
    len: usize,
}

unsafe impl Send for SendSlice {}
unsafe impl Sync for SendSlice {}

impl SendSlice {
    fn new(slice: &[u8]) -> SendSlice {
        SendSlice { ptr: slice.as_ptr(), len: slice.len() }
    }

    unsafe fn as_slice<'a>(&self) -> &'a [u8] {
        std::slice::from_raw_parts(self.ptr, self.len)
    }
}

/// One-shot gate that publishes the decoded reference block to the workers
/// waiting on it. The first publish wins; it happens on success *and* on
/// failure, so a dying block-0 worker can never strand the others.
pub(crate) struct RefGate {
    state: Mutex<Option<std::result::Result<Arc<Vec<u8>>, ()>>>,
    cond: Condvar,
}

impl RefGate {
    fn new() -> RefGate {
        RefGate { state: Mutex::new(None), cond: Condvar::new() }
    }

    fn publish(&self, value: std::result::Result<Arc<Vec<u8>>, ()>) {
        let mut state = self.state.lock().unwrap();
        if state.is_none() {
            *state = Some(value);
            self.cond.notify_all();
        }
    }

    fn poison(&self) {
        self.publish(Err(()));
    }

    fn wait(&self) -> std::result::Result<Arc<Vec<u8>>, ()> {
        let mut state = self.state.lock().unwrap();
        while state.is_none() {
            state = self.cond.wait(state).unwrap();
        }
        state.as_ref().unwrap().clone()
    }
}

/// A finished block travelling from a worker to the committing thread.
pub(crate) struct BlockOut {
    pub index: usize,
    pub data: Vec<u8>,
}

/// Everything the workers need for one compress or decompress call.
pub(crate) struct Job {
    pub compress: bool,
    src: SendSlice,
    pub typesize: usize,
    pub blocksize: usize,
    pub nblocks: usize,
    pub leftover: usize,
    pub codec: Codec,
    pub clevel: i32,
    pub filtercode: u8,
    pub dont_split: bool,
    /// Staging buffer size per compressed block.
    pub staging: usize,
    pub pipeline: Option<SchunkPipeline>,
    pub delta: DeltaMode,
    /// Decompression only: block start offsets and total frame size.
    pub bstarts: Vec<usize>,
    pub cbytes: usize,
    counter: AtomicUsize,
    giveup: AtomicI32,
    error: Mutex<Option<Error>>,
    results: Sender<BlockOut>,
    gate: Option<RefGate>,
}

impl Job {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        compress: bool,
        src: &[u8],
        typesize: usize,
        blocksize: usize,
        nblocks: usize,
        leftover: usize,
        codec: Codec,
        clevel: i32,
        filtercode: u8,
        dont_split: bool,
        staging: usize,
        pipeline: Option<SchunkPipeline>,
        bstarts: Vec<usize>,
        cbytes: usize,
        results: Sender<BlockOut>,
    ) -> Job {
        let delta = DeltaMode::for_pipeline(pipeline.as_ref());
        let gate = match (&delta, compress) {
            (DeltaMode::Intra, false) => Some(RefGate::new()),
            _ => None,
        };
        Job {
            compress,
            src: SendSlice::new(src),
            typesize,
            blocksize,
            nblocks,
            leftover,
            codec,
            clevel,
            filtercode,
            dont_split,
            staging,
            pipeline,
            delta,
            bstarts,
            cbytes,
            counter: AtomicUsize::new(0),
            giveup: AtomicI32::new(GIVEUP_OK),
            error: Mutex::new(None),
            results,
            gate,
        }
    }

    /// Latch a give-up code; the first one wins so the outcome does not
    /// depend on scheduling. Waiters on the delta gate are released too,
    /// which keeps an erroring block-0 worker from stranding the others.
    pub(crate) fn set_giveup(&self, code: i32, error: Option<Error>) {
        if self
            .giveup
            .compare_exchange(GIVEUP_OK, code, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            *self.error.lock().unwrap() = error;
        }
        if let Some(gate) = &self.gate {
            gate.poison();
        }
    }

    pub(crate) fn giveup_code(&self) -> i32 {
        self.giveup.load(Ordering::Acquire)
    }

    pub(crate) fn giveup_error(&self) -> Option<Error> {
        self.error.lock().unwrap().clone()
    }

    fn block_shape(&self, index: usize) -> (usize, bool) {
        if index == self.nblocks - 1 && self.leftover > 0 {
            (self.leftover, true)
        } else {
            (self.blocksize, false)
        }
    }
}

fn compress_one(job: &Job, index: usize, scratch: &mut Scratch, state: &mut CodecState) -> Result<Option<Vec<u8>>> {
    let src = unsafe { job.src.as_slice() };
    let (bsize, leftoverblock) = job.block_shape(index);
    let mut out = vec![0u8; job.staging];
    let n = block::compress_block(
        job.codec,
        job.clevel,
        job.typesize,
        job.filtercode,
        job.dont_split,
        job.pipeline.as_ref(),
        src,
        index * job.blocksize,
        bsize,
        leftoverblock,
        scratch,
        state,
        &mut out,
    )?;
    if n == 0 {
        return Ok(None);
    }
    out.truncate(n);
    Ok(Some(out))
}

fn decompress_one(job: &Job, index: usize, scratch: &mut Scratch, state: &mut CodecState) -> Result<Option<Vec<u8>>> {
    let src = unsafe { job.src.as_slice() };
    let (bsize, leftoverblock) = job.block_shape(index);
    let block_src = &src[job.bstarts[index]..job.cbytes];
    let mut out = vec![0u8; bsize];
    block::decompress_block(
        job.codec,
        job.typesize,
        job.filtercode,
        job.dont_split,
        block_src,
        bsize,
        leftoverblock,
        scratch,
        state,
        &mut out,
    )?;

    match &job.delta {
        DeltaMode::Off => {}
        DeltaMode::External(dref) => {
            let offset = index * job.blocksize;
            if offset + bsize > dref.len() {
                return Err(Error::InvalidParam("delta reference shorter than the chunk"));
            }
            block::delta_decode_block(job.typesize, Some(&dref[offset..offset + bsize]), &mut out);
        }
        DeltaMode::Intra => {
            let gate = job.gate.as_ref().expect("intra delta decode without a gate");
            if index == 0 {
                block::delta_decode_block(job.typesize, None, &mut out);
                gate.publish(Ok(Arc::new(out.clone())));
            } else {
                // Block 0 must finish its delta step first.
                let dref = gate.wait().map_err(|_| Error::Stream)?;
                block::delta_decode_block(job.typesize, Some(&dref[..bsize]), &mut out);
            }
        }
    }
    Ok(Some(out))
}

fn run_job(job: &Job, scratch: &mut Scratch, state: &mut CodecState) {
    scratch.resize(job.blocksize, job.typesize);
    loop {
        // Another thread may have given up already.
        if job.giveup_code() != GIVEUP_OK {
            break;
        }
        let index = job.counter.fetch_add(1, Ordering::Relaxed);
        if index >= job.nblocks {
            break;
        }

        let result = if job.compress {
            compress_one(job, index, scratch, state)
        } else {
            decompress_one(job, index, scratch, state)
        };

        match result {
            Ok(Some(data)) => {
                let _ = job.results.send(BlockOut { index, data });
            }
            Ok(None) => {
                job.set_giveup(GIVEUP_INCOMPRESSIBLE, None);
                break;
            }
            Err(e) => {
                job.set_giveup(e.code(), Some(e));
                break;
            }
        }
    }
}

pub(crate) struct ThreadPool {
    nthreads: usize,
    job_tx: Sender<Arc<Job>>,
    done_rx: Receiver<()>,
    handles: Vec<JoinHandle<()>>,
}

impl ThreadPool {
    pub fn new(nthreads: usize) -> ThreadPool {
        let (job_tx, job_rx) = unbounded::<Arc<Job>>();
        let (done_tx, done_rx) = unbounded::<()>();

        let handles = (0..nthreads)
            .map(|_| {
                let job_rx = job_rx.clone();
                let done_tx = done_tx.clone();
                std::thread::spawn(move || {
                    // Scratch and codec contexts live as long as the worker.
                    let mut scratch = Scratch::new();
                    let mut state = CodecState::new();
                    while let Ok(job) = job_rx.recv() {
                        run_job(&job, &mut scratch, &mut state);
                        drop(job);
                        let _ = done_tx.send(());
                    }
                })
            })
            .collect();

        ThreadPool { nthreads, job_tx, done_rx, handles }
    }

    pub fn nthreads(&self) -> usize {
        self.nthreads
    }

    /// Hand the job to every worker. The caller must then collect exactly
    /// `nthreads` acknowledgements via [`ThreadPool::done_rx`].
    pub fn dispatch(&self, job: &Arc<Job>) {
        for _ in 0..self.nthreads {
            // A send can only fail if every worker died; the ack collection
            // below would then hang, so panic loudly instead.
            self.job_tx.send(job.clone()).expect("worker pool is gone");
        }
    }

    pub fn done_rx(&self) -> &Receiver<()> {
        &self.done_rx
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        // Cooperative teardown: closing the job channel releases the
        // workers, then join them.
        let (dummy_tx, _) = unbounded();
        self.job_tx = dummy_tx;
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}
