/// Heap-backed region: a `Vec<u8>` standing in for a memory-mapped file.
///
/// No durability. The region vanishes with the process. Used for tests
/// and for volatile, in-process caches that want the ring's index/ring-log
/// semantics without a filesystem.
use crate::config::RingConfig;
use crate::error::Result;
use crate::ring::HashRing;

/// Open a fresh, zeroed hash ring sized by `config`, entirely in process
/// memory.
pub fn open(config: &RingConfig) -> Result<HashRing<Vec<u8>>> {
    config.validate()?;
    let region = vec![0u8; config.region_size as usize];
    HashRing::new(region, config.index_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_an_empty_ring() {
        let config = RingConfig::new().with_region_size(4096).with_index_size(16);
        let ring = open(&config).unwrap();
        assert!(ring.head().is_none());
        assert_eq!(ring.live_record_count(), 0);
        assert_eq!(ring.total_record_count(), 0);
    }

    #[test]
    fn rejects_undersized_region() {
        let config = RingConfig::new().with_region_size(4).with_index_size(16);
        let result = open(&config);
        assert!(result.is_err());
    }
}
