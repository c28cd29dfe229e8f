//! Wire-format guarantees: header fields, the block-starts table, the
//! MEMCPY path, tiny buffers and corrupt-frame rejection.

use rblosc::{
    blosc2_compress_ctx, blosc2_create_cctx, blosc2_create_dctx, blosc2_decompress_ctx,
    blosc_cbuffer_complib, blosc_cbuffer_metainfo, blosc_cbuffer_sizes, blosc_cbuffer_versions,
    Cparams, Dparams, BLOSC_BLOSCLZ, BLOSC_DOSHUFFLE, BLOSC_MAX_OVERHEAD, BLOSC_MEMCPYED,
    BLOSC_MIN_HEADER_LENGTH, BLOSC_SHUFFLE, BLOSC_VERSION_FORMAT, BLOSC_ZSTD,
};

fn compress(cparams: Cparams, src: &[u8]) -> Vec<u8> {
    let mut cctx = blosc2_create_cctx(cparams);
    let mut compressed = vec![0u8; src.len() + BLOSC_MAX_OVERHEAD];
    let csize = blosc2_compress_ctx(&mut cctx, src, &mut compressed);
    assert!(csize > 0);
    compressed.truncate(csize as usize);
    compressed
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(buf[offset..offset + 4].try_into().unwrap())
}

#[test]
fn header_and_block_starts_are_valid() {
    let src: Vec<i32> = (0..500_000).collect();
    let src_bytes: &[u8] = bytemuck::cast_slice(&src);
    let frame = compress(
        Cparams { typesize: 4, compcode: BLOSC_BLOSCLZ, clevel: 5, ..Cparams::default() },
        src_bytes,
    );

    let (nbytes, cbytes, blocksize) = blosc_cbuffer_sizes(&frame).unwrap();
    assert_eq!(nbytes, src_bytes.len());
    assert_eq!(cbytes, frame.len());
    assert!(blocksize > 0 && blocksize % 4 == 0);

    let nblocks = (nbytes + blocksize - 1) / blocksize;
    let first = BLOSC_MIN_HEADER_LENGTH + 4 * nblocks;
    assert!(cbytes >= first);
    for i in 0..nblocks {
        let bstart = read_u32(&frame, BLOSC_MIN_HEADER_LENGTH + 4 * i) as usize;
        assert!(
            (first..cbytes).contains(&bstart),
            "bstart[{}] = {} outside [{}, {})",
            i,
            bstart,
            first,
            cbytes
        );
    }
}

#[test]
fn clevel_zero_is_a_tagged_plain_copy() {
    let src: Vec<u8> = (0..100_000).map(|i| (i % 251) as u8).collect();
    let frame = compress(
        Cparams { typesize: 1, clevel: 0, ..Cparams::default() },
        &src,
    );

    assert_eq!(frame.len(), src.len() + BLOSC_MAX_OVERHEAD);
    let (typesize, flags) = blosc_cbuffer_metainfo(&frame).unwrap();
    assert_eq!(typesize, 1);
    assert!(flags & BLOSC_MEMCPYED != 0);
    assert_eq!(&frame[BLOSC_MAX_OVERHEAD..], &src[..]);

    let mut dctx = blosc2_create_dctx(Dparams::default());
    let mut back = vec![0u8; src.len()];
    assert_eq!(blosc2_decompress_ctx(&mut dctx, &frame, &mut back) as usize, src.len());
    assert_eq!(src, back);
}

#[test]
fn introspection_reports_the_frame_metadata() {
    let src: Vec<f64> = (0..50_000).map(|i| i as f64 * 0.5).collect();
    let src_bytes: &[u8] = bytemuck::cast_slice(&src);
    let frame = compress(
        Cparams {
            typesize: 8,
            compcode: BLOSC_ZSTD,
            clevel: 7,
            filtercode: BLOSC_SHUFFLE,
            ..Cparams::default()
        },
        src_bytes,
    );

    let (version, version_codec) = blosc_cbuffer_versions(&frame).unwrap();
    assert_eq!(version, BLOSC_VERSION_FORMAT);
    assert_eq!(version_codec, 1);

    let (typesize, flags) = blosc_cbuffer_metainfo(&frame).unwrap();
    assert_eq!(typesize, 8);
    assert!(flags & BLOSC_DOSHUFFLE != 0);

    assert_eq!(blosc_cbuffer_complib(&frame).unwrap(), "Zstd");
}

#[test]
fn seven_bytes_with_typesize_eight_roundtrips() {
    // Fewer bytes than one element: the engine degrades to a byte stream
    // and the tiny buffer rides the plain-copy path.
    let src = [1u8, 2, 3, 4, 5, 6, 7];
    let frame = compress(Cparams { typesize: 8, ..Cparams::default() }, &src);

    let (nbytes, cbytes, _) = blosc_cbuffer_sizes(&frame).unwrap();
    assert_eq!(nbytes, 7);
    assert_eq!(cbytes, frame.len());

    let mut dctx = blosc2_create_dctx(Dparams::default());
    let mut back = [0u8; 7];
    assert_eq!(blosc2_decompress_ctx(&mut dctx, &frame, &mut back), 7);
    assert_eq!(src, back);
}

#[test]
fn empty_buffer_roundtrips() {
    let frame = compress(Cparams::default(), &[]);
    assert_eq!(frame.len(), BLOSC_MAX_OVERHEAD);

    let mut dctx = blosc2_create_dctx(Dparams::default());
    let mut back = [0u8; 0];
    assert_eq!(blosc2_decompress_ctx(&mut dctx, &frame, &mut back), 0);
}

#[test]
fn corrupt_cbytes_is_rejected() {
    let src: Vec<i32> = (0..500_000).collect();
    let src_bytes: &[u8] = bytemuck::cast_slice(&src);
    let mut frame = compress(
        Cparams { typesize: 4, compcode: BLOSC_BLOSCLZ, clevel: 5, ..Cparams::default() },
        src_bytes,
    );

    // Shrink the declared frame size below the block table.
    let (nbytes, _, blocksize) = blosc_cbuffer_sizes(&frame).unwrap();
    let nblocks = (nbytes + blocksize - 1) / blocksize;
    let bogus = (BLOSC_MIN_HEADER_LENGTH + 4 * nblocks) as u32 - 3;
    frame[12..16].copy_from_slice(&bogus.to_le_bytes());

    let mut dctx = blosc2_create_dctx(Dparams::default());
    let mut back = vec![0xA5u8; src_bytes.len()];
    let rc = blosc2_decompress_ctx(&mut dctx, &frame, &mut back);
    assert!(rc < 0, "corrupt frame accepted: {}", rc);
}

#[test]
fn truncated_frame_is_rejected() {
    let src: Vec<i32> = (0..500_000).collect();
    let src_bytes: &[u8] = bytemuck::cast_slice(&src);
    let frame = compress(
        Cparams { typesize: 4, compcode: BLOSC_BLOSCLZ, clevel: 5, ..Cparams::default() },
        src_bytes,
    );

    let mut dctx = blosc2_create_dctx(Dparams::default());
    let mut back = vec![0u8; src_bytes.len()];
    assert!(blosc2_decompress_ctx(&mut dctx, &frame[..frame.len() / 2], &mut back) < 0);
    assert!(blosc2_decompress_ctx(&mut dctx, &frame[..8], &mut back) < 0);
}

#[test]
fn undersized_destination_is_rejected() {
    let src: Vec<i32> = (0..100_000).collect();
    let src_bytes: &[u8] = bytemuck::cast_slice(&src);
    let frame = compress(Cparams { typesize: 4, ..Cparams::default() }, src_bytes);

    let mut dctx = blosc2_create_dctx(Dparams::default());
    let mut back = vec![0u8; src_bytes.len() - 1];
    assert!(blosc2_decompress_ctx(&mut dctx, &frame, &mut back) < 0);
}

#[test]
fn compression_into_a_tight_buffer_returns_zero() {
    use rand::{rngs::StdRng, Rng, SeedableRng};
    let mut rng = StdRng::seed_from_u64(7);
    let src: Vec<u8> = (0..100_000).map(|_| rng.random()).collect();

    let mut cctx = blosc2_create_cctx(Cparams { typesize: 1, ..Cparams::default() });
    // Random data cannot shrink and the buffer cannot hold a plain copy.
    let mut dest = vec![0u8; src.len() / 2];
    assert_eq!(blosc2_compress_ctx(&mut cctx, &src, &mut dest), 0);
}
