//! The legacy locked surface and the context wrappers.
//!
//! The process-wide defaults (compressor, thread count, forced blocksize,
//! attached super-chunk) and one shared context live behind a single mutex;
//! every `blosc_*` entry point takes it. The `blosc2_*_ctx` family works on
//! an explicit [`Context`] instead and takes no lock at all.

use std::env;
use std::sync::Mutex;

use crate::block::SchunkPipeline;
use crate::codecs::{self, Codec};
use crate::constants::*;
use crate::context::{Context, Cparams, Dparams};
use crate::error::Result;
use crate::schunk::Schunk;

pub use crate::header::cbuffer_complib as blosc_cbuffer_complib;
pub use crate::header::cbuffer_metainfo as blosc_cbuffer_metainfo;
pub use crate::header::cbuffer_sizes as blosc_cbuffer_sizes;
pub use crate::header::cbuffer_versions as blosc_cbuffer_versions;

struct GlobalEngine {
    context: Context,
    compressor: u8,
    nthreads: usize,
    force_blocksize: usize,
    schunk: Option<SchunkPipeline>,
}

impl GlobalEngine {
    fn new() -> GlobalEngine {
        GlobalEngine {
            context: Context::new_global(),
            compressor: BLOSC_BLOSCLZ,
            nthreads: 1,
            force_blocksize: 0,
            schunk: None,
        }
    }
}

static GLOBAL: Mutex<Option<GlobalEngine>> = Mutex::new(None);

fn with_engine<R>(f: impl FnOnce(&mut GlobalEngine) -> R) -> R {
    let mut guard = GLOBAL.lock().unwrap_or_else(|e| e.into_inner());
    let engine = guard.get_or_insert_with(GlobalEngine::new);
    f(engine)
}

fn result_to_i32(result: Result<usize>) -> i32 {
    match result {
        Ok(n) => n as i32,
        Err(e) => e.code(),
    }
}

/// Initialize the library environment. Optional: every locked entry point
/// initializes on demand, like the context API needs no init at all.
pub fn blosc_init() {
    with_engine(|_| ());
}

/// Tear down the library environment, joining any worker threads.
pub fn blosc_destroy() {
    let mut guard = GLOBAL.lock().unwrap_or_else(|e| e.into_inner());
    *guard = None;
}

/// Release thread resources without forgetting the configured defaults.
/// Returns 0, or -1 when the library was never initialized.
pub fn blosc_free_resources() -> i32 {
    let mut guard = GLOBAL.lock().unwrap_or_else(|e| e.into_inner());
    match guard.as_mut() {
        Some(engine) => {
            engine.context.release_pool();
            0
        }
        None => -1,
    }
}

/// Set the number of worker threads, returning the previous count.
pub fn blosc_set_nthreads(nthreads: usize) -> usize {
    with_engine(|engine| {
        let previous = engine.nthreads;
        if nthreads >= 1 {
            engine.nthreads = nthreads;
        }
        previous
    })
}

pub fn blosc_get_nthreads() -> usize {
    with_engine(|engine| engine.nthreads)
}

/// Select the compressor by name. Returns its code, or -1 when the name is
/// not recognized in this build.
pub fn blosc_set_compressor(compname: &str) -> i32 {
    match Codec::from_name(compname) {
        Some(codec) => {
            with_engine(|engine| engine.compressor = codec.code());
            codec.code() as i32
        }
        None => -1,
    }
}

pub fn blosc_get_compressor() -> &'static str {
    with_engine(|engine| {
        Codec::from_code(engine.compressor)
            .map(|c| c.name())
            .unwrap_or(BLOSC_BLOSCLZ_COMPNAME)
    })
}

/// Force a specific block size; 0 restores the automatic policy.
pub fn blosc_set_blocksize(blocksize: usize) {
    with_engine(|engine| engine.force_blocksize = blocksize);
}

pub fn blosc_get_blocksize() -> usize {
    with_engine(|engine| engine.force_blocksize)
}

/// Attach (or detach, with `None`) a super-chunk whose filter pipeline the
/// locked entry points will apply.
pub fn blosc_set_schunk(schunk: Option<&Schunk>) {
    with_engine(|engine| engine.schunk = schunk.map(|s| s.pipeline().clone()));
}

fn env_shuffle(current: u8) -> u8 {
    match env::var("BLOSC_SHUFFLE").as_deref() {
        Ok("NOSHUFFLE") => BLOSC_NOSHUFFLE,
        Ok("SHUFFLE") => BLOSC_SHUFFLE,
        Ok("BITSHUFFLE") => BLOSC_BITSHUFFLE,
        _ => current,
    }
}

fn env_number(name: &str) -> Option<i64> {
    // Unparsable values count as unset.
    env::var(name).ok()?.trim().parse::<i64>().ok()
}

/// Compress `src` into `dest` through the locked path.
///
/// Returns the compressed size, 0 when the output cannot fit `dest` (a
/// capacity of `src.len() + BLOSC_MAX_OVERHEAD` always fits), or a negative
/// error code. Honors the `BLOSC_CLEVEL`, `BLOSC_SHUFFLE`, `BLOSC_TYPESIZE`,
/// `BLOSC_COMPRESSOR`, `BLOSC_BLOCKSIZE`, `BLOSC_NTHREADS` and
/// `BLOSC_NOLOCK` environment variables, in that order; invalid values are
/// ignored.
pub fn blosc_compress(
    clevel: i32,
    doshuffle: u8,
    typesize: usize,
    src: &[u8],
    dest: &mut [u8],
) -> i32 {
    let mut clevel = clevel;
    let mut doshuffle = doshuffle;
    let mut typesize = typesize;

    if let Some(value) = env_number("BLOSC_CLEVEL") {
        if value >= 0 {
            clevel = value as i32;
        }
    }
    doshuffle = env_shuffle(doshuffle);
    if let Some(value) = env_number("BLOSC_TYPESIZE") {
        if value > 0 {
            typesize = value as usize;
        }
    }
    if let Ok(name) = env::var("BLOSC_COMPRESSOR") {
        let _ = blosc_set_compressor(&name);
    }
    if let Some(value) = env_number("BLOSC_BLOCKSIZE") {
        if value > 0 {
            blosc_set_blocksize(value as usize);
        }
    }
    if let Some(value) = env_number("BLOSC_NTHREADS") {
        if value > 0 {
            blosc_set_nthreads(value as usize);
        }
    }

    // NOLOCK must come last so it picks up the other overrides.
    if env::var("BLOSC_NOLOCK").is_ok() {
        let (compcode, nthreads, blocksize) =
            with_engine(|e| (e.compressor, e.nthreads, e.force_blocksize));
        let mut ctx = Context::new_cctx(Cparams {
            typesize,
            compcode,
            clevel,
            filtercode: doshuffle,
            nthreads,
            blocksize,
            schunk: None,
        });
        return result_to_i32(ctx.compress(src, dest));
    }

    with_engine(|engine| {
        let schunk = engine.schunk.clone();
        engine.context.configure(
            clevel,
            doshuffle,
            typesize,
            engine.compressor,
            engine.force_blocksize,
            engine.nthreads,
            schunk,
        );
        result_to_i32(engine.context.compress(src, dest))
    })
}

/// Decompress `src` into `dest` through the locked path. Honors
/// `BLOSC_NTHREADS` and `BLOSC_NOLOCK`.
pub fn blosc_decompress(src: &[u8], dest: &mut [u8]) -> i32 {
    if let Some(value) = env_number("BLOSC_NTHREADS") {
        if value > 0 {
            blosc_set_nthreads(value as usize);
        }
    }

    if env::var("BLOSC_NOLOCK").is_ok() {
        let (nthreads, schunk) = with_engine(|e| (e.nthreads, e.schunk.clone()));
        let mut ctx = Context::new_dctx(Dparams { nthreads, schunk });
        return result_to_i32(ctx.decompress(src, dest));
    }

    with_engine(|engine| {
        let schunk = engine.schunk.clone();
        // Only the thread count and the attached pipeline matter here.
        engine.context.configure(
            5,
            BLOSC_NOSHUFFLE,
            1,
            engine.compressor,
            engine.force_blocksize,
            engine.nthreads,
            schunk,
        );
        result_to_i32(engine.context.decompress(src, dest))
    })
}

/// Extract `nitems` elements starting at `start` from the frame in `src`.
/// Returns the number of bytes copied into `dest`, or a negative code.
pub fn blosc_getitem(src: &[u8], start: usize, nitems: usize, dest: &mut [u8]) -> i32 {
    with_engine(|engine| {
        let schunk = engine.schunk.clone();
        engine.context.configure(
            5,
            BLOSC_NOSHUFFLE,
            1,
            engine.compressor,
            engine.force_blocksize,
            1,
            schunk,
        );
        result_to_i32(engine.context.getitem(src, start, nitems, dest))
    })
}

/// Comma-separated list of the compressors supported in this build.
pub fn blosc_list_compressors() -> &'static str {
    codecs::list_compressors()
}

/// The library version in "major.minor.patch" form.
pub fn blosc_get_version_string() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Name for a compressor code, or `None` when the code is unknown.
pub fn blosc_compcode_to_compname(compcode: u8) -> Option<&'static str> {
    Codec::from_code(compcode).map(|c| c.name())
}

/// Code for a compressor name, or -1 when the name is unknown.
pub fn blosc_compname_to_compcode(compname: &str) -> i32 {
    Codec::from_name(compname)
        .map(|c| c.code() as i32)
        .unwrap_or(-1)
}

/// `(library name, library version)` behind a compressor name, or `None`
/// when the compressor is not supported.
pub fn blosc_get_complib_info(compname: &str) -> Option<(&'static str, &'static str)> {
    Codec::from_name(compname).map(|c| (c.lib_name(), c.lib_version()))
}

/* Context API wrappers */

/// Create a context for the `*_ctx` compression functions.
pub fn blosc2_create_cctx(cparams: Cparams) -> Context {
    Context::new_cctx(cparams)
}

/// Create a context for the `*_ctx` decompression functions.
pub fn blosc2_create_dctx(dparams: Dparams) -> Context {
    Context::new_dctx(dparams)
}

/// Context interface to compression: no global lock is taken, so several
/// contexts can run concurrently.
pub fn blosc2_compress_ctx(context: &mut Context, src: &[u8], dest: &mut [u8]) -> i32 {
    result_to_i32(context.compress(src, dest))
}

/// Context interface to decompression.
pub fn blosc2_decompress_ctx(context: &mut Context, src: &[u8], dest: &mut [u8]) -> i32 {
    result_to_i32(context.decompress(src, dest))
}

/// Context counterpart of [`blosc_getitem`].
pub fn blosc2_getitem_ctx(
    context: &mut Context,
    src: &[u8],
    start: usize,
    nitems: usize,
    dest: &mut [u8],
) -> i32 {
    result_to_i32(context.getitem(src, start, nitems, dest))
}
