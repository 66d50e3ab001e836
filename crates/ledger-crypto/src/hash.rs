/// Compute BLAKE3 hash of arbitrary bytes → 32-byte array.
pub fn blake3_hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// `H(H(child_1) || H(child_2) || ...)` — the Merkle-style summary root used
/// by rollup records. `child_hashes` must already be in the tier's canonical
/// child order (record ids sorted by `created_at`, ties broken by id).
pub fn merkle_summary_root(child_hashes: &[[u8; 32]]) -> [u8; 32] {
    let mut buf = Vec::with_capacity(child_hashes.len() * 32);
    for h in child_hashes {
        buf.extend_from_slice(h);
    }
    blake3_hash(&buf)
}
