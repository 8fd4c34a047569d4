/// Memory-mapped region backing: a single file, taken under an exclusive
/// advisory lock and mapped read/write for the lifetime of the ring.
///
/// Mirrors the open/flush/close lifecycle of `kstone-core`'s `mmap.rs` and
/// `wal_ring.rs`, but owns a single read-write mapping rather than a pool of
/// read-only ones, since the hash ring mutates its region in place.
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use fs2::FileExt;
use memmap2::MmapMut;

use crate::config::RingConfig;
use crate::error::{Error, Result};
use crate::ring::HashRing;

/// A file mapped read/write, held under an exclusive advisory lock.
pub struct MappedRegion {
    file: File,
    mmap: MmapMut,
    locked: bool,
}

impl MappedRegion {
    fn create_or_open(path: &Path, region_size: u32) -> Result<File> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;

        let len = file.metadata()?.len();
        if len == 0 {
            // Extend to exactly region_size by writing a single zero byte
            // at the last offset; the filesystem backfills the rest as a
            // hole (or zeros, on filesystems without sparse support).
            let mut file = file;
            file.seek(SeekFrom::Start(region_size as u64 - 1))?;
            file.write_all(&[0u8])?;
            file.flush()?;
            file.seek(SeekFrom::Start(0))?;
            Ok(file)
        } else if len != region_size as u64 {
            Err(Error::IntegrityViolation(format!(
                "existing file is {len} bytes, caller requested region_size {region_size}"
            )))
        } else {
            Ok(file)
        }
    }

    fn open(path: &Path, region_size: u32) -> Result<Self> {
        let file = Self::create_or_open(path, region_size)?;

        file.try_lock_exclusive().map_err(|_| {
            Error::ResourceBusy(format!(
                "{} is locked by another process",
                path.display()
            ))
        })?;

        // SAFETY: the file is exclusively locked for the lifetime of this
        // mapping, and nothing else in this process maps it concurrently.
        let mmap = unsafe { MmapMut::map_mut(&file)? };

        Ok(Self {
            file,
            mmap,
            locked: true,
        })
    }

    fn flush(&mut self) -> Result<()> {
        self.mmap.flush()?;
        self.file.sync_all()?;
        Ok(())
    }

    fn unlock(&mut self) {
        if self.locked {
            let _ = self.file.unlock();
            self.locked = false;
        }
    }
}

impl AsRef<[u8]> for MappedRegion {
    fn as_ref(&self) -> &[u8] {
        &self.mmap
    }
}

impl AsMut<[u8]> for MappedRegion {
    fn as_mut(&mut self) -> &mut [u8] {
        &mut self.mmap
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        // An unclean drop leaves `state = ACTIVE` on disk (see
        // `HashRing::close`); the lock is released regardless so a later
        // process can reopen the file.
        self.unlock();
    }
}

/// Open (creating if absent) a mapped hash ring at `path`, sized by `config`.
pub fn open(path: impl AsRef<Path>, config: &RingConfig) -> Result<HashRing<MappedRegion>> {
    config.validate()?;
    let path = path.as_ref();
    let region = MappedRegion::open(path, config.region_size)?;
    tracing::info!(
        path = %path.display(),
        region_size = config.region_size,
        index_size = config.index_size,
        "opening mapped rolling-hash region"
    );
    HashRing::new(region, config.index_size)
}

impl HashRing<MappedRegion> {
    /// Clean close: freeze the header, flush the mapping to disk, then
    /// release the mapping and the advisory lock. This is the only
    /// durability boundary the store offers (spec §5, §7): a process that
    /// terminates without calling `close` leaves `state = ACTIVE`, and the
    /// next open treats the region as lost.
    pub fn close(mut self) -> Result<()> {
        self.freeze();
        let region = self.region_mut();
        region.flush()?;
        tracing::info!("closed mapped rolling-hash region");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config(region_size: u32, index_size: u32) -> RingConfig {
        RingConfig::new().with_region_size(region_size).with_index_size(index_size)
    }

    #[test]
    fn creates_and_closes_a_fresh_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ring.db");

        let ring = open(&path, &config(4096, 16)).unwrap();
        assert!(ring.head().is_none());
        ring.close().unwrap();

        assert_eq!(std::fs::metadata(&path).unwrap().len(), 4096);
    }

    #[test]
    fn second_open_while_locked_is_resource_busy() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ring.db");

        let _ring = open(&path, &config(4096, 16)).unwrap();
        let result = open(&path, &config(4096, 16));
        assert!(matches!(result, Err(Error::ResourceBusy(_))));
    }

    // Scenario 6: reopen.
    #[test]
    fn reopen_preserves_surviving_keys() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ring.db");
        let config = config(1 << 20, 4096);

        {
            let mut ring = open(&path, &config).unwrap();
            for i in 0..1000u32 {
                let key = format!("key-{i}");
                ring.insert(key.as_bytes(), b"value").unwrap();
            }
            for i in 0..1000u32 {
                if i % 2 == 0 {
                    let key = format!("key-{i}");
                    ring.drop_key(key.as_bytes(), None).unwrap();
                }
            }
            assert_eq!(ring.live_record_count(), 500);
            ring.close().unwrap();
        }

        let ring = open(&path, &config).unwrap();
        assert_eq!(ring.live_record_count(), 500);
        for i in 0..1000u32 {
            let key = format!("key-{i}");
            let found = ring.get(key.as_bytes());
            if i % 2 == 0 {
                assert!(found.is_none(), "key-{i} should have been dropped");
            } else {
                let rec = found.unwrap_or_else(|| panic!("key-{i} missing on reopen"));
                assert_eq!(ring.value_of(rec), &b"value"[..]);
            }
        }
    }

    #[test]
    fn reopen_with_mismatched_region_size_is_integrity_violation() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ring.db");

        {
            let ring = open(&path, &config(4096, 16)).unwrap();
            ring.close().unwrap();
        }

        let result = open(&path, &config(8192, 16));
        assert!(matches!(result, Err(Error::IntegrityViolation(_))));
    }

    #[test]
    fn unclean_drop_reopens_as_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ring.db");

        {
            let mut ring = open(&path, &config(4096, 16)).unwrap();
            ring.insert(b"alpha", b"AAA").unwrap();
            // Dropped without calling close(): state stays ACTIVE.
        }

        let ring = open(&path, &config(4096, 16)).unwrap();
        assert!(ring.get(b"alpha").is_none());
        assert_eq!(ring.live_record_count(), 0);
    }
}
