//! Partition Locator
//!
//! Maps a key to the two partition indices that may hold it. Datasets were
//! written by two generations of writers that disagree for exactly one hash
//! value, so readers must be prepared to look in both places.

/// Maps `(key, partition_count)` to `(primary, alternate)`.
///
/// Implementations must be pure and deterministic. `alternate == primary` is
/// the common outcome and means there is no real alternate.
pub trait Locator: Send + Sync {
    fn locate(&self, key: &[u8], partition_count: u32) -> (u32, u32);
}

/// The production locator, hashing keys with CRC-32.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashLocator;

impl HashLocator {
    pub fn new() -> Self {
        Self
    }

    fn hash(key: &[u8]) -> i32 {
        crc32fast::hash(key) as i32
    }

    /// Partition used by current writers: magnitude of the hash modulo the
    /// partition count.
    fn primary(hash: i32, partition_count: u32) -> u32 {
        hash.unsigned_abs() % partition_count
    }

    /// Partition used by legacy writers, which took a signed absolute value.
    /// For `i32::MIN` that stays negative, and the negative remainder was
    /// folded back into range by adding the partition count.
    fn legacy(hash: i32, partition_count: u32) -> u32 {
        let n = partition_count as i64;
        let rem = (hash.wrapping_abs() as i64) % n;
        (if rem < 0 { rem + n } else { rem }) as u32
    }

    /// Returns both candidates for an already computed hash.
    pub fn locate_hash(hash: i32, partition_count: u32) -> (u32, u32) {
        (
            Self::primary(hash, partition_count),
            Self::legacy(hash, partition_count),
        )
    }
}

impl Locator for HashLocator {
    fn locate(&self, key: &[u8], partition_count: u32) -> (u32, u32) {
        debug_assert!(partition_count > 0, "locate called without partitions");
        Self::locate_hash(Self::hash(key), partition_count)
    }
}
