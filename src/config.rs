/// Knobs for sizing a new hash ring region before `heap::open`/`mapped::open`.
///
/// The original C++ took three bare constructor arguments; every other
/// backing config surface in this crate's teacher (`DatabaseConfig`,
/// `CompactionConfig`) instead exposes a builder + `validate()`, so this
/// crate follows suit rather than handing a caller three unlabeled u32s.
use crate::error::{Error, Result};
use crate::layout;

#[derive(Debug, Clone, Copy)]
pub struct RingConfig {
    /// Total region size in bytes.
    pub region_size: u32,
    /// Number of hash index buckets.
    pub index_size: u32,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            region_size: 1 << 20,
            index_size: 4096,
        }
    }
}

impl RingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_region_size(mut self, region_size: u32) -> Self {
        self.region_size = region_size;
        self
    }

    pub fn with_index_size(mut self, index_size: u32) -> Self {
        self.index_size = index_size;
        self
    }

    /// Reject configurations `HashRing::new` would reject anyway, so
    /// callers can fail fast before touching a file or allocation.
    pub fn validate(&self) -> Result<()> {
        if self.index_size == 0 {
            return Err(Error::IntegrityViolation(
                "index_size must be greater than zero".to_string(),
            ));
        }
        layout::check_region_capacity(self.region_size, self.index_size)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(RingConfig::default().validate().is_ok());
    }

    #[test]
    fn builder_methods_set_fields() {
        let config = RingConfig::new().with_region_size(8192).with_index_size(64);
        assert_eq!(config.region_size, 8192);
        assert_eq!(config.index_size, 64);
    }

    #[test]
    fn zero_index_size_is_invalid() {
        let config = RingConfig::new().with_index_size(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn undersized_region_is_invalid() {
        let config = RingConfig::new().with_region_size(8).with_index_size(4096);
        assert!(config.validate().is_err());
    }
}
