//! Key-to-partition routing.

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// 32-bit FNV-1a hash. Stable across processes and releases.
fn fnv1a(bytes: &[u8]) -> u32 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u32::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

/// Returns the partition a key is routed to.
///
/// All records sharing a key land on the same partition, which is what gives
/// per-key ordering. `partitions` must be non-zero.
pub fn partition_for(key: &str, partitions: u32) -> u32 {
    debug_assert!(partitions > 0, "topic must have at least one partition");
    fnv1a(key.as_bytes()) % partitions.max(1)
}
