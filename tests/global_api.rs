//! The process-wide surface: defaults, setters, introspection queries and
//! lifecycle. A single test keeps the shared state deterministic.

use rblosc::*;

#[test]
fn global_surface() {
    blosc_init();

    // Version string: "major.minor.patch".
    let version = blosc_get_version_string();
    assert_eq!(version.split('.').count(), 3);

    // Compressor list and name/code conversions.
    let list = blosc_list_compressors();
    for name in ["blosclz", "lz4", "lz4hc", "snappy", "zlib", "zstd"] {
        assert!(list.contains(name), "{} missing from {}", name, list);
        let code = blosc_compname_to_compcode(name);
        assert!(code >= 0);
        assert_eq!(blosc_compcode_to_compname(code as u8), Some(name));
    }
    assert_eq!(blosc_compname_to_compcode("lzma"), -1);
    assert_eq!(blosc_compcode_to_compname(77), None);

    let (lib, _version) = blosc_get_complib_info("lz4hc").unwrap();
    assert_eq!(lib, "LZ4");
    assert!(blosc_get_complib_info("nope").is_none());

    // Setters return/report the previous state.
    assert_eq!(blosc_get_nthreads(), 1);
    assert_eq!(blosc_set_nthreads(4), 1);
    assert_eq!(blosc_get_nthreads(), 4);

    assert_eq!(blosc_get_compressor(), "blosclz");
    assert!(blosc_set_compressor("zstd") >= 0);
    assert_eq!(blosc_get_compressor(), "zstd");
    assert_eq!(blosc_set_compressor("nope"), -1);

    assert_eq!(blosc_get_blocksize(), 0);
    blosc_set_blocksize(131_072);
    assert_eq!(blosc_get_blocksize(), 131_072);

    // A locked compress/decompress pass under the configured defaults
    // (zstd, 4 threads, forced blocksize).
    let src: Vec<i64> = (0..400_000).collect();
    let src_bytes: &[u8] = bytemuck::cast_slice(&src);
    let mut compressed = vec![0u8; src_bytes.len() + BLOSC_MAX_OVERHEAD];
    let csize = blosc_compress(7, BLOSC_SHUFFLE, 8, src_bytes, &mut compressed);
    assert!(csize > 0);
    compressed.truncate(csize as usize);

    let (nbytes, cbytes, blocksize) = blosc_cbuffer_sizes(&compressed).unwrap();
    assert_eq!(nbytes, src_bytes.len());
    assert_eq!(cbytes, compressed.len());
    assert_eq!(blocksize, 131_072);
    assert_eq!(blosc_cbuffer_complib(&compressed).unwrap(), "Zstd");

    let mut back = vec![0u8; src_bytes.len()];
    assert_eq!(blosc_decompress(&compressed, &mut back) as usize, src_bytes.len());
    assert_eq!(src_bytes, &back[..]);

    let mut items = vec![0u8; 8 * 10];
    assert_eq!(blosc_getitem(&compressed, 1_000, 10, &mut items), 80);
    assert_eq!(&items[..], bytemuck::cast_slice(&src[1_000..1_010]));

    // A super-chunk attached to the global engine drives the delta filter
    // through the locked entry points.
    let mut sparams = Sparams { compressor: BLOSC_BLOSCLZ, clevel: 5, ..Sparams::default() };
    sparams.filters = [0; 8];
    sparams.filters[0] = BLOSC_DELTA;
    sparams.filters[1] = BLOSC_SHUFFLE;
    let mut schunk = Schunk::new(sparams);
    schunk.append_buffer(8, src_bytes).unwrap();

    blosc_set_schunk(Some(&schunk));
    let mut delta_frame = vec![0u8; src_bytes.len() + BLOSC_MAX_OVERHEAD];
    let csize = blosc_compress(5, BLOSC_SHUFFLE, 8, src_bytes, &mut delta_frame);
    assert!(csize > 0);
    delta_frame.truncate(csize as usize);
    // Identical to the reference chunk: the residual is all zeros.
    assert!(delta_frame.len() * 50 < src_bytes.len());

    let mut back = vec![0u8; src_bytes.len()];
    assert_eq!(blosc_decompress(&delta_frame, &mut back) as usize, src_bytes.len());
    assert_eq!(src_bytes, &back[..]);
    blosc_set_schunk(None);

    // Restore defaults, release resources, shut down.
    blosc_set_blocksize(0);
    blosc_set_compressor("blosclz");
    blosc_set_nthreads(1);
    assert_eq!(blosc_free_resources(), 0);
    blosc_destroy();
    assert_eq!(blosc_free_resources(), -1);
}
