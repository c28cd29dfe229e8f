//! Super-chunk behaviour: appends, delta reference, packed form.

use rand::{rngs::StdRng, Rng, SeedableRng};
use rblosc::{
    packed_append_buffer, packed_decompress_chunk, Schunk, Sparams, BLOSC_BLOSCLZ, BLOSC_DELTA,
    BLOSC_SHUFFLE,
};

fn delta_sparams(compressor: u8, clevel: i32) -> Sparams {
    let mut sparams = Sparams { compressor, clevel, ..Sparams::default() };
    sparams.filters = [0; 8];
    sparams.filters[0] = BLOSC_DELTA;
    sparams.filters[1] = BLOSC_SHUFFLE;
    sparams
}

fn random_i32(n: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let values: Vec<i32> = (0..n).map(|_| rng.random()).collect();
    bytemuck::cast_slice(&values).to_vec()
}

#[test]
fn append_and_decompress_chunks() {
    let mut schunk = Schunk::new(Sparams::default());
    let chunks: Vec<Vec<u8>> = (0..4)
        .map(|k: i32| {
            let values: Vec<i32> = (0..250_000).map(|i| i * (k + 1)).collect();
            bytemuck::cast_slice(&values).to_vec()
        })
        .collect();

    for (k, chunk) in chunks.iter().enumerate() {
        let nchunks = schunk.append_buffer(4, chunk).unwrap();
        assert_eq!(nchunks, k + 1);
    }
    assert_eq!(schunk.nchunks(), 4);
    assert_eq!(schunk.nbytes(), 4 * 1_000_000);
    assert!(schunk.cbytes() < schunk.nbytes());

    for (k, chunk) in chunks.iter().enumerate() {
        let mut dest = vec![0u8; chunk.len()];
        let dsize = schunk.decompress_chunk(k, &mut dest).unwrap();
        assert_eq!(dsize, chunk.len());
        assert_eq!(&dest, chunk, "chunk {}", k);
    }
}

#[test]
fn delta_collapses_a_repeated_chunk() {
    // Random integers do not compress at all, so chunk 0 stays around its
    // input size. Chunk 1 is byte-identical, and with chunk 0 as the delta
    // reference its residual is all zeros.
    let data = random_i32(1 << 20, 42); // 4 MiB
    let mut schunk = Schunk::new(delta_sparams(BLOSC_BLOSCLZ, 5));

    schunk.append_buffer(4, &data).unwrap();
    schunk.append_buffer(4, &data).unwrap();

    let cbytes0 = schunk.chunk_cbytes(0).unwrap();
    let cbytes1 = schunk.chunk_cbytes(1).unwrap();
    assert!(
        cbytes1 * 100 < cbytes0,
        "delta chunk did not collapse: {} vs {}",
        cbytes1,
        cbytes0
    );

    for k in 0..2 {
        let back = schunk.decompress_chunk_vec(k).unwrap();
        assert_eq!(back, data, "chunk {}", k);
    }
}

#[test]
fn delta_roundtrip_with_distinct_chunks() {
    let mut schunk = Schunk::new(delta_sparams(BLOSC_BLOSCLZ, 5));
    let chunks: Vec<Vec<u8>> = (0..3).map(|k| random_i32(200_000, 100 + k)).collect();

    for chunk in &chunks {
        schunk.append_buffer(4, chunk).unwrap();
    }
    for (k, chunk) in chunks.iter().enumerate() {
        let back = schunk.decompress_chunk_vec(k).unwrap();
        assert_eq!(&back, chunk, "chunk {}", k);
    }
}

#[test]
fn explicit_delta_reference() {
    let reference = random_i32(100_000, 7);
    let mut schunk = Schunk::new(delta_sparams(BLOSC_BLOSCLZ, 5));
    schunk.set_delta_ref(4, &reference).unwrap();

    // Every chunk is delta-coded against the explicit reference, including
    // the first one.
    schunk.append_buffer(4, &reference).unwrap();
    schunk.append_buffer(4, &reference).unwrap();
    assert!(schunk.chunk_cbytes(0).unwrap() * 50 < reference.len());
    assert!(schunk.chunk_cbytes(1).unwrap() * 50 < reference.len());

    for k in 0..2 {
        let back = schunk.decompress_chunk_vec(k).unwrap();
        assert_eq!(back, reference, "chunk {}", k);
    }
}

#[test]
fn pack_and_unpack_roundtrip() {
    let mut schunk = Schunk::new(delta_sparams(BLOSC_BLOSCLZ, 5));
    let chunks: Vec<Vec<u8>> = (0..3).map(|k| random_i32(150_000, 31 + k)).collect();
    for chunk in &chunks {
        schunk.append_buffer(4, chunk).unwrap();
    }

    let packed = schunk.pack().unwrap();

    // Counters sit at fixed offsets in the packed header.
    assert_eq!(u64::from_le_bytes(packed[16..24].try_into().unwrap()), 3);
    assert_eq!(
        u64::from_le_bytes(packed[24..32].try_into().unwrap()),
        schunk.nbytes()
    );
    assert_eq!(
        u64::from_le_bytes(packed[32..40].try_into().unwrap()),
        schunk.cbytes()
    );

    let mut unpacked = Schunk::unpack(&packed).unwrap();
    assert_eq!(unpacked.nchunks(), 3);
    assert_eq!(unpacked.typesize(), 4);
    assert_eq!(unpacked.nbytes(), schunk.nbytes());
    for (k, chunk) in chunks.iter().enumerate() {
        let back = unpacked.decompress_chunk_vec(k).unwrap();
        assert_eq!(&back, chunk, "chunk {}", k);
    }
}

#[test]
fn packed_append_and_decompress() {
    // The packed-schunk flow: build, pack, append in packed form, read back.
    let data = random_i32(500_000, 99);
    let mut schunk = Schunk::new(delta_sparams(BLOSC_BLOSCLZ, 5));
    schunk.append_buffer(4, &data).unwrap();

    let mut packed = schunk.pack().unwrap();
    packed = packed_append_buffer(packed, 4, &data).unwrap();

    assert_eq!(u64::from_le_bytes(packed[16..24].try_into().unwrap()), 2);
    assert_eq!(
        u64::from_le_bytes(packed[24..32].try_into().unwrap()),
        2 * data.len() as u64
    );

    // The appended twin collapses against the delta reference.
    let mut unpacked = Schunk::unpack(&packed).unwrap();
    assert!(unpacked.chunk_cbytes(1).unwrap() * 100 < unpacked.chunk_cbytes(0).unwrap());

    for k in 0..2 {
        let back = packed_decompress_chunk(&packed, k).unwrap();
        assert_eq!(back, data, "chunk {}", k);
        let via_unpack = unpacked.decompress_chunk_vec(k).unwrap();
        assert_eq!(via_unpack, data, "chunk {} via unpack", k);
    }
}

#[test]
fn packed_form_with_external_reference() {
    let reference = random_i32(100_000, 5);
    let mut schunk = Schunk::new(delta_sparams(BLOSC_BLOSCLZ, 5));
    schunk.set_delta_ref(4, &reference).unwrap();
    schunk.append_buffer(4, &reference).unwrap();

    let packed = schunk.pack().unwrap();
    assert_eq!(packed[1] & 0x1, 0x1, "external reference flag missing");

    let back = packed_decompress_chunk(&packed, 0).unwrap();
    assert_eq!(back, reference);

    let mut unpacked = Schunk::unpack(&packed).unwrap();
    let back = unpacked.decompress_chunk_vec(0).unwrap();
    assert_eq!(back, reference);
}

#[test]
fn metadata_and_userdata_survive_the_packed_form() {
    let mut schunk = Schunk::new(Sparams { compressor: BLOSC_BLOSCLZ, ..Sparams::default() });
    schunk.set_metadata(b"dtype=<i4;shape=100,100");
    schunk.set_userdata(b"produced by the acceptance suite");
    schunk.append_buffer(4, &random_i32(50_000, 3)).unwrap();

    let packed = schunk.pack().unwrap();
    let unpacked = Schunk::unpack(&packed).unwrap();
    assert_eq!(unpacked.metadata(), Some(&b"dtype=<i4;shape=100,100"[..]));
    assert_eq!(unpacked.userdata(), Some(&b"produced by the acceptance suite"[..]));

    // And the packed form still appends and reads correctly around them.
    let data = random_i32(50_000, 4);
    let packed = packed_append_buffer(packed, 4, &data).unwrap();
    assert_eq!(packed_decompress_chunk(&packed, 1).unwrap(), data);
}

#[test]
fn packed_chunk_index_out_of_range() {
    let mut schunk = Schunk::new(Sparams::default());
    schunk.append_buffer(4, &random_i32(10_000, 1)).unwrap();
    let packed = schunk.pack().unwrap();
    assert!(packed_decompress_chunk(&packed, 5).is_err());
}
