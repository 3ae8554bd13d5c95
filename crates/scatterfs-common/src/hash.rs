//! Placement hash
//!
//! Every host must map a path to the same owner, so the hash is fixed here
//! rather than borrowed from `std::hash` (whose output may change between
//! Rust releases). It is the 64-bit MurmurHash2 variant with seed
//! `0xc70f6907` that the GNU C++ runtime uses for string hashing, which keeps
//! placements stable and reproducible across builds and platforms.

const SEED: u64 = 0xc70f_6907;
const MUL: u64 = 0xc6a4_a793_5bd1_e995;

#[inline]
const fn shift_mix(v: u64) -> u64 {
    v ^ (v >> 47)
}

/// Load up to 8 trailing bytes as a little-endian integer
#[inline]
fn load_tail(tail: &[u8]) -> u64 {
    tail.iter()
        .rev()
        .fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}

/// Hash a byte string for placement decisions.
#[must_use]
pub fn placement_hash(bytes: &[u8]) -> u64 {
    let len = bytes.len() as u64;
    let mut hash = SEED ^ len.wrapping_mul(MUL);

    let mut blocks = bytes.chunks_exact(8);
    for block in &mut blocks {
        let mut word = [0u8; 8];
        word.copy_from_slice(block);
        let data = shift_mix(u64::from_le_bytes(word).wrapping_mul(MUL)).wrapping_mul(MUL);
        hash ^= data;
        hash = hash.wrapping_mul(MUL);
    }

    let tail = blocks.remainder();
    if !tail.is_empty() {
        hash ^= load_tail(tail);
        hash = hash.wrapping_mul(MUL);
    }

    hash = shift_mix(hash).wrapping_mul(MUL);
    shift_mix(hash)
}

/// Hash of a path string
#[must_use]
pub fn path_hash(path: &str) -> u64 {
    placement_hash(path.as_bytes())
}

/// Hash of a `(path, chunk_id)` pair, keyed as the path immediately
/// followed by the decimal chunk index.
#[must_use]
pub fn chunk_hash(path: &str, chunk_id: u64) -> u64 {
    let mut key = String::with_capacity(path.len() + 20);
    key.push_str(path);
    key.push_str(&chunk_id.to_string());
    placement_hash(key.as_bytes())
}
