//! Super-chunk container: an append-only sequence of compressed frames that
//! share a filter pipeline, a default codec/level and an optional delta
//! reference. Exists in-memory ([`Schunk`]) and as a single packed buffer
//! with random chunk access.

use std::sync::Arc;

use crate::block::SchunkPipeline;
use crate::constants::*;
use crate::context::{Context, Cparams, Dparams};
use crate::error::{Error, Result};
use crate::header::Header;

/// Parameters for creating a super-chunk.
#[derive(Debug, Clone)]
pub struct Sparams {
    pub compressor: u8,
    pub clevel: i32,
    /// Ordered filter slots: slot 0 may hold a data-transforming filter
    /// (delta, truncate-precision), the shuffle-class filter can sit in any
    /// slot. Unused slots stay 0.
    pub filters: [u8; BLOSC_MAX_FILTERS],
    pub filters_meta: [u8; BLOSC_MAX_FILTERS],
}

impl Default for Sparams {
    fn default() -> Sparams {
        let mut filters = [0u8; BLOSC_MAX_FILTERS];
        filters[0] = BLOSC_SHUFFLE;
        Sparams {
            compressor: BLOSC_ZSTD,
            clevel: 5,
            filters,
            filters_meta: [0u8; BLOSC_MAX_FILTERS],
        }
    }
}

/// Layout of the packed super-chunk header (all fields little-endian):
///
/// | Offset | Size | Field                              |
/// |--------|------|------------------------------------|
/// | 0      | 1    | version                            |
/// | 1      | 1    | flags1 (bit0: external delta ref)  |
/// | 2      | 2    | flags2, flags3 (reserved)          |
/// | 4      | 2    | compressor                         |
/// | 6      | 2    | clevel                             |
/// | 8      | 4    | chunksize (0 when variable)        |
/// | 12     | 4    | typesize                           |
/// | 16     | 8    | nchunks                            |
/// | 24     | 8    | nbytes                             |
/// | 32     | 8    | cbytes                             |
/// | 40     | 8    | filters                            |
/// | 48     | 8    | filters_meta                       |
/// | 56     | 8    | chunk-table offset                 |
///
/// Chunk payloads follow (the delta-reference chunk first when flags1 bit0
/// is set), and the chunk table sits at the very end so an append only has
/// to rewrite the table and the counters. The packed form is single-writer.
/// Optional sections (metadata, user data) sit between the header and the
/// chunk area as `u32 length + bytes` runs, announced by flags1 bits.
const PACKED_HEADER_LEN: usize = 64;
const PACKED_EXTERNAL_DREF: u8 = 0x1;
const PACKED_METADATA: u8 = 0x2;
const PACKED_USERDATA: u8 = 0x4;

const SCHUNK_VERSION: u8 = 0;

fn read_u64_le(buf: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes(buf[offset..offset + 8].try_into().unwrap())
}

fn write_u64_le(buf: &mut [u8], offset: usize, value: u64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

fn read_u32_le(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(buf[offset..offset + 4].try_into().unwrap())
}

fn write_u32_le(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// An in-memory super-chunk.
pub struct Schunk {
    version: u8,
    compressor: u8,
    clevel: i32,
    typesize: usize,  // 0 until the first append fixes it
    chunksize: usize, // 0 when chunks have different sizes
    pipeline: SchunkPipeline,
    /// Index of the chunk serving as delta reference; `None` when the
    /// reference was supplied externally via [`Schunk::set_delta_ref`].
    ref_chunk: Option<usize>,
    data: Vec<Vec<u8>>,
    nbytes: u64,
    cbytes: u64,
    metadata_chunk: Option<Vec<u8>>,
    userdata_chunk: Option<Vec<u8>>,
    cctx: Context,
    dctx: Context,
}

impl Schunk {
    /// Create a new super-chunk (`blosc2_new_schunk`).
    pub fn new(sparams: Sparams) -> Schunk {
        Schunk {
            version: SCHUNK_VERSION,
            compressor: sparams.compressor,
            clevel: sparams.clevel,
            typesize: 0,
            chunksize: 0,
            pipeline: SchunkPipeline {
                filters: sparams.filters,
                filters_meta: sparams.filters_meta,
                delta_ref: None,
            },
            ref_chunk: None,
            data: Vec::new(),
            nbytes: 0,
            cbytes: 0,
            metadata_chunk: None,
            userdata_chunk: None,
            cctx: Context::new_cctx(Cparams::default()),
            dctx: Context::new_dctx(Dparams::default()),
        }
    }

    /// Attach free-form metadata carried alongside the chunks.
    pub fn set_metadata(&mut self, metadata: &[u8]) {
        self.metadata_chunk = Some(metadata.to_vec());
    }

    pub fn metadata(&self) -> Option<&[u8]> {
        self.metadata_chunk.as_deref()
    }

    /// Attach a free-form user-data section.
    pub fn set_userdata(&mut self, userdata: &[u8]) {
        self.userdata_chunk = Some(userdata.to_vec());
    }

    pub fn userdata(&self) -> Option<&[u8]> {
        self.userdata_chunk.as_deref()
    }

    pub fn nchunks(&self) -> usize {
        self.data.len()
    }

    /// Cumulative uncompressed bytes across chunks.
    pub fn nbytes(&self) -> u64 {
        self.nbytes
    }

    /// Cumulative compressed bytes across chunk frames.
    pub fn cbytes(&self) -> u64 {
        self.cbytes
    }

    pub fn typesize(&self) -> usize {
        self.typesize
    }

    /// Compressed size of one chunk's frame.
    pub fn chunk_cbytes(&self, nchunk: usize) -> Result<usize> {
        self.data.get(nchunk).map(|c| c.len()).ok_or(Error::OutOfBounds)
    }

    /// Uncompressed size of one chunk.
    pub fn chunk_nbytes(&self, nchunk: usize) -> Result<usize> {
        let chunk = self.data.get(nchunk).ok_or(Error::OutOfBounds)?;
        Ok(Header::parse(chunk)?.nbytes)
    }

    pub(crate) fn pipeline(&self) -> &SchunkPipeline {
        &self.pipeline
    }

    /// Install an explicit delta reference (`blosc2_set_delta_ref`). Chunks
    /// appended afterwards are delta-coded against this buffer.
    pub fn set_delta_ref(&mut self, typesize: usize, dref: &[u8]) -> Result<()> {
        if self.typesize != 0 && typesize != self.typesize {
            return Err(Error::InvalidParam("typesize differs from the super-chunk's"));
        }
        if self.typesize == 0 {
            self.typesize = typesize;
        }
        self.pipeline.delta_ref = Some(Arc::new(dref.to_vec()));
        self.ref_chunk = None;
        Ok(())
    }

    /// Compress `src` and append it as a new chunk, returning the new chunk
    /// count. The first appended chunk becomes the delta reference when the
    /// filter list asks for delta and no reference is set yet.
    pub fn append_buffer(&mut self, typesize: usize, src: &[u8]) -> Result<usize> {
        if typesize == 0 || typesize > BLOSC_MAX_TYPESIZE {
            return Err(Error::InvalidParam("bad typesize"));
        }
        if self.typesize != 0 && typesize != self.typesize {
            return Err(Error::InvalidParam("typesize cannot change across chunks"));
        }
        self.typesize = typesize;

        self.cctx.configure(
            self.clevel,
            self.pipeline.shuffle_filter(),
            typesize,
            self.compressor,
            0,
            1,
            Some(self.pipeline.clone()),
        );
        let mut frame = vec![0u8; src.len() + BLOSC_MAX_OVERHEAD];
        let cbytes = self.cctx.compress(src, &mut frame)?;
        if cbytes == 0 {
            return Err(Error::DestTooSmall);
        }
        frame.truncate(cbytes);

        self.nbytes += src.len() as u64;
        self.cbytes += cbytes as u64;
        self.chunksize = if self.data.is_empty() || self.chunksize == src.len() {
            src.len()
        } else {
            0
        };
        self.data.push(frame);

        if self.pipeline.has_filter(BLOSC_DELTA) && self.pipeline.delta_ref.is_none() {
            self.pipeline.delta_ref = Some(Arc::new(src.to_vec()));
            self.ref_chunk = Some(self.data.len() - 1);
        }

        Ok(self.data.len())
    }

    /// Decompress chunk `nchunk` into `dest`, returning its size.
    pub fn decompress_chunk(&mut self, nchunk: usize, dest: &mut [u8]) -> Result<usize> {
        if nchunk >= self.data.len() {
            return Err(Error::OutOfBounds);
        }
        // The reference chunk was compressed before a reference existed, so
        // it decodes against itself.
        let mut pipeline = self.pipeline.clone();
        if self.ref_chunk == Some(nchunk) {
            pipeline.delta_ref = None;
        }
        self.dctx.configure(5, BLOSC_NOSHUFFLE, 1, self.compressor, 0, 1, Some(pipeline));
        self.dctx.decompress(&self.data[nchunk], dest)
    }

    /// Decompress chunk `nchunk` into a freshly allocated buffer.
    pub fn decompress_chunk_vec(&mut self, nchunk: usize) -> Result<Vec<u8>> {
        let nbytes = self.chunk_nbytes(nchunk)?;
        let mut dest = vec![0u8; nbytes];
        self.decompress_chunk(nchunk, &mut dest)?;
        Ok(dest)
    }

    /// Serialise the super-chunk into a single contiguous buffer
    /// (`blosc2_pack_schunk`).
    pub fn pack(&self) -> Result<Vec<u8>> {
        // An external delta reference travels as its own compressed frame,
        // placed ahead of the data chunks.
        let external_ref: Option<Vec<u8>> = match (&self.pipeline.delta_ref, self.ref_chunk) {
            (Some(dref), None) => {
                let mut ctx = Context::new_cctx(Cparams {
                    typesize: self.typesize.max(1),
                    compcode: self.compressor,
                    clevel: self.clevel,
                    filtercode: self.pipeline.shuffle_filter(),
                    nthreads: 1,
                    blocksize: 0,
                    schunk: None,
                });
                let mut frame = vec![0u8; dref.len() + BLOSC_MAX_OVERHEAD];
                let n = ctx.compress(dref, &mut frame)?;
                if n == 0 {
                    return Err(Error::DestTooSmall);
                }
                frame.truncate(n);
                Some(frame)
            }
            _ => None,
        };

        let mut packed = vec![0u8; PACKED_HEADER_LEN];
        packed[0] = self.version;
        if external_ref.is_some() {
            packed[1] |= PACKED_EXTERNAL_DREF;
        }
        if self.metadata_chunk.is_some() {
            packed[1] |= PACKED_METADATA;
        }
        if self.userdata_chunk.is_some() {
            packed[1] |= PACKED_USERDATA;
        }
        packed[4..6].copy_from_slice(&(self.compressor as u16).to_le_bytes());
        packed[6..8].copy_from_slice(&(self.clevel as u16).to_le_bytes());
        write_u32_le(&mut packed, 8, self.chunksize as u32);
        write_u32_le(&mut packed, 12, self.typesize as u32);
        write_u64_le(&mut packed, 16, self.data.len() as u64);
        write_u64_le(&mut packed, 24, self.nbytes);
        write_u64_le(&mut packed, 32, self.cbytes);
        packed[40..48].copy_from_slice(&self.pipeline.filters);
        packed[48..56].copy_from_slice(&self.pipeline.filters_meta);

        for section in [&self.metadata_chunk, &self.userdata_chunk].into_iter().flatten() {
            let len = section.len() as u32;
            packed.extend_from_slice(&len.to_le_bytes());
            packed.extend_from_slice(section);
        }

        let mut offsets: Vec<u64> = Vec::with_capacity(self.data.len() + 1);
        if let Some(frame) = &external_ref {
            offsets.push(packed.len() as u64);
            packed.extend_from_slice(frame);
        }
        for chunk in &self.data {
            offsets.push(packed.len() as u64);
            packed.extend_from_slice(chunk);
        }

        let table_offset = packed.len() as u64;
        write_u64_le(&mut packed, 56, table_offset);
        for offset in offsets {
            packed.extend_from_slice(&offset.to_le_bytes());
        }
        Ok(packed)
    }

    /// Rebuild a super-chunk from its packed form (`blosc2_unpack_schunk`).
    pub fn unpack(packed: &[u8]) -> Result<Schunk> {
        let view = PackedView::parse(packed)?;
        let (pipeline, ref_chunk) = view.resolve_pipeline()?;

        let mut schunk = Schunk::new(Sparams {
            compressor: view.compressor,
            clevel: view.clevel,
            filters: view.filters,
            filters_meta: view.filters_meta,
        });
        schunk.version = view.version;
        schunk.typesize = view.typesize;
        schunk.chunksize = view.chunksize;
        schunk.nbytes = view.nbytes;
        schunk.cbytes = view.cbytes;
        schunk.pipeline = pipeline;
        schunk.ref_chunk = ref_chunk;
        schunk.metadata_chunk = view.metadata.map(|m| m.to_vec());
        schunk.userdata_chunk = view.userdata.map(|u| u.to_vec());
        schunk.data = view.chunks.iter().map(|c| c.to_vec()).collect();
        Ok(schunk)
    }
}

/// Borrowed view over a packed super-chunk.
struct PackedView<'a> {
    version: u8,
    compressor: u8,
    clevel: i32,
    chunksize: usize,
    typesize: usize,
    nbytes: u64,
    cbytes: u64,
    filters: [u8; BLOSC_MAX_FILTERS],
    filters_meta: [u8; BLOSC_MAX_FILTERS],
    metadata: Option<&'a [u8]>,
    userdata: Option<&'a [u8]>,
    external_ref: Option<&'a [u8]>,
    chunks: Vec<&'a [u8]>,
    /// Where the chunk payload area ends (the table begins here).
    table_offset: usize,
}

fn read_section<'a>(packed: &'a [u8], cursor: &mut usize) -> Result<&'a [u8]> {
    if *cursor + 4 > packed.len() {
        return Err(Error::Stream);
    }
    let len = read_u32_le(packed, *cursor) as usize;
    *cursor += 4;
    if *cursor + len > packed.len() {
        return Err(Error::Stream);
    }
    let section = &packed[*cursor..*cursor + len];
    *cursor += len;
    Ok(section)
}

impl<'a> PackedView<'a> {
    fn parse(packed: &'a [u8]) -> Result<PackedView<'a>> {
        if packed.len() < PACKED_HEADER_LEN {
            return Err(Error::Stream);
        }
        let nchunks = read_u64_le(packed, 16) as usize;
        let table_offset = read_u64_le(packed, 56) as usize;
        let has_external = packed[1] & PACKED_EXTERNAL_DREF != 0;
        let nentries = nchunks + has_external as usize;
        if table_offset < PACKED_HEADER_LEN || table_offset + 8 * nentries > packed.len() {
            return Err(Error::Stream);
        }

        let mut cursor = PACKED_HEADER_LEN;
        let metadata = if packed[1] & PACKED_METADATA != 0 {
            Some(read_section(packed, &mut cursor)?)
        } else {
            None
        };
        let userdata = if packed[1] & PACKED_USERDATA != 0 {
            Some(read_section(packed, &mut cursor)?)
        } else {
            None
        };

        // Each table entry points at a frame; its length comes out of the
        // frame's own header.
        let mut entries = Vec::with_capacity(nentries);
        for i in 0..nentries {
            let offset = read_u64_le(packed, table_offset + 8 * i) as usize;
            if offset < PACKED_HEADER_LEN || offset + BLOSC_MIN_HEADER_LENGTH > table_offset {
                return Err(Error::Stream);
            }
            let cbytes = Header::parse(&packed[offset..])?.cbytes;
            if offset + cbytes > table_offset {
                return Err(Error::Stream);
            }
            entries.push(&packed[offset..offset + cbytes]);
        }
        let external_ref = if has_external { Some(entries.remove(0)) } else { None };

        Ok(PackedView {
            version: packed[0],
            compressor: u16::from_le_bytes(packed[4..6].try_into().unwrap()) as u8,
            clevel: u16::from_le_bytes(packed[6..8].try_into().unwrap()) as i32,
            chunksize: read_u32_le(packed, 8) as usize,
            typesize: read_u32_le(packed, 12) as usize,
            nbytes: read_u64_le(packed, 24),
            cbytes: read_u64_le(packed, 32),
            filters: packed[40..48].try_into().unwrap(),
            filters_meta: packed[48..56].try_into().unwrap(),
            metadata,
            userdata,
            external_ref,
            chunks: entries,
            table_offset,
        })
    }

    /// Reconstruct the filter pipeline, decompressing the delta reference
    /// (the external frame, or chunk 0) when the filter list needs one.
    fn resolve_pipeline(&self) -> Result<(SchunkPipeline, Option<usize>)> {
        let mut pipeline = SchunkPipeline {
            filters: self.filters,
            filters_meta: self.filters_meta,
            delta_ref: None,
        };
        let mut ref_chunk = None;

        if let Some(frame) = self.external_ref {
            let nbytes = Header::parse(frame)?.nbytes;
            let mut dref = vec![0u8; nbytes];
            let mut dctx = Context::new_dctx(Dparams::default());
            dctx.decompress(frame, &mut dref)?;
            pipeline.delta_ref = Some(Arc::new(dref));
        } else if pipeline.has_filter(BLOSC_DELTA) && !self.chunks.is_empty() {
            let chunk0 = self.chunks[0];
            let nbytes = Header::parse(chunk0)?.nbytes;
            let mut dref = vec![0u8; nbytes];
            let mut dctx = Context::new_dctx(Dparams {
                nthreads: 1,
                schunk: Some(pipeline.clone()), // no reference yet: intra decode
            });
            dctx.decompress(chunk0, &mut dref)?;
            pipeline.delta_ref = Some(Arc::new(dref));
            ref_chunk = Some(0);
        }

        Ok((pipeline, ref_chunk))
    }
}

/// Decompress chunk `nchunk` straight out of a packed super-chunk
/// (`blosc2_packed_decompress_chunk`); allocates the output on behalf of
/// the caller.
pub fn packed_decompress_chunk(packed: &[u8], nchunk: usize) -> Result<Vec<u8>> {
    let view = PackedView::parse(packed)?;
    let chunk = *view.chunks.get(nchunk).ok_or(Error::OutOfBounds)?;
    let (mut pipeline, ref_chunk) = view.resolve_pipeline()?;
    if ref_chunk == Some(nchunk) {
        pipeline.delta_ref = None;
    }

    let nbytes = Header::parse(chunk)?.nbytes;
    let mut dest = vec![0u8; nbytes];
    let mut dctx = Context::new_dctx(Dparams { nthreads: 1, schunk: Some(pipeline) });
    dctx.decompress(chunk, &mut dest)?;
    Ok(dest)
}

/// Append a buffer to a packed super-chunk without unpacking it
/// (`blosc2_packed_append_buffer`). The chunk area grows in place; only the
/// trailing table and the header counters are rewritten. The packed form is
/// single-writer: no concurrent readers while this runs.
pub fn packed_append_buffer(mut packed: Vec<u8>, typesize: usize, src: &[u8]) -> Result<Vec<u8>> {
    let (pipeline, compressor, clevel, table_offset, mut offsets, has_external, chunksize) = {
        let view = PackedView::parse(&packed)?;
        if view.typesize != 0 && typesize != view.typesize {
            return Err(Error::InvalidParam("typesize cannot change across chunks"));
        }
        let (pipeline, _) = view.resolve_pipeline()?;
        let nentries = view.chunks.len() + view.external_ref.is_some() as usize;
        let offsets: Vec<u64> = (0..nentries)
            .map(|i| read_u64_le(&packed, view.table_offset + 8 * i))
            .collect();
        (
            pipeline,
            view.compressor,
            view.clevel,
            view.table_offset,
            offsets,
            view.external_ref.is_some(),
            view.chunksize,
        )
    };

    let mut cctx = Context::new_cctx(Cparams {
        typesize,
        compcode: compressor,
        clevel,
        filtercode: pipeline.shuffle_filter(),
        nthreads: 1,
        blocksize: 0,
        schunk: Some(pipeline),
    });
    let mut frame = vec![0u8; src.len() + BLOSC_MAX_OVERHEAD];
    let cbytes = cctx.compress(src, &mut frame)?;
    if cbytes == 0 {
        return Err(Error::DestTooSmall);
    }
    frame.truncate(cbytes);

    // Drop the old table, splice the chunk in, rebuild the table behind it.
    packed.truncate(table_offset);
    offsets.push(packed.len() as u64);
    packed.extend_from_slice(&frame);
    let new_table_offset = packed.len() as u64;
    for offset in &offsets {
        packed.extend_from_slice(&offset.to_le_bytes());
    }

    let nchunks = offsets.len() - has_external as usize;
    let nbytes = read_u64_le(&packed, 24) + src.len() as u64;
    let cbytes_total = read_u64_le(&packed, 32) + cbytes as u64;
    write_u32_le(&mut packed, 8, if chunksize == src.len() || nchunks == 1 { src.len() as u32 } else { 0 });
    write_u32_le(&mut packed, 12, typesize as u32);
    write_u64_le(&mut packed, 16, nchunks as u64);
    write_u64_le(&mut packed, 24, nbytes);
    write_u64_le(&mut packed, 32, cbytes_total);
    write_u64_le(&mut packed, 56, new_table_offset);

    Ok(packed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_sparams_match_the_documented_defaults() {
        let sparams = Sparams::default();
        assert_eq!(sparams.compressor, BLOSC_ZSTD);
        assert_eq!(sparams.clevel, 5);
        assert_eq!(sparams.filters[0], BLOSC_SHUFFLE);
    }

    #[test]
    fn append_rejects_typesize_changes() {
        let mut schunk = Schunk::new(Sparams {
            compressor: BLOSC_BLOSCLZ,
            ..Sparams::default()
        });
        let data = vec![1u8; 1024];
        schunk.append_buffer(4, &data).unwrap();
        let err = schunk.append_buffer(8, &data).unwrap_err();
        assert_eq!(err.code(), -10);
    }

    #[test]
    fn chunk_index_out_of_range() {
        let mut schunk = Schunk::new(Sparams::default());
        let mut out = vec![0u8; 16];
        assert!(schunk.decompress_chunk(0, &mut out).is_err());
    }
}
