//! FNV-1a hashing shared by bucket routing and server id derivation

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 64-bit FNV-1a over the UTF-8 bytes of `key`
#[must_use]
pub fn fnv1a64(key: &str) -> u64 {
    key.bytes().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
    })
}

/// Index of the shard `key` belongs to
///
/// Stable for a fixed `shards`, which never changes for the process lifetime.
#[must_use]
pub fn shard_index(key: &str, shards: usize) -> usize {
    debug_assert!(shards > 0);
    (fnv1a64(key) % shards as u64) as usize
}
