//! Per-disk advisory locker.
//!
//! Cooperating supervisor processes on the same host serialize access to a
//! rotational disk by holding an exclusive `flock(2)` on
//! `<runtime_dir>/<diskname>.lock` for the duration of the helper's run.
//! The lock is advisory only: it does nothing against a non-cooperating
//! caller, which is why every failure path here is a warning, never fatal.

use std::fs::{DirBuilder, OpenOptions};
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::os::unix::io::{AsRawFd, OwnedFd};
use std::path::{Path, PathBuf};

use log::{debug, warn};
use nix::fcntl::{Flock, FlockArg};

use crate::disk::{DeviceResolver, DiskId};
use crate::types::Policy;

/// A held advisory lock. Dropping it releases the lock and closes the file
/// descriptor.
#[derive(Debug)]
pub struct DiskLock {
    path: PathBuf,
    // Kept only for its Drop impl; the lock itself is released by closing
    // the descriptor.
    _flock: Flock<OwnedFd>,
}

impl DiskLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Attempts to acquire the per-disk lock for `id`, if locking is enabled
/// and the disk is rotational. Returns `None` (not an error) whenever
/// locking doesn't apply or can't be obtained; the caller proceeds
/// lock-free in every such case.
pub fn acquire(policy: &Policy, resolver: &dyn DeviceResolver, id: DiskId) -> Option<DiskLock> {
    if !policy.lock_disk {
        return None;
    }
    if !resolver.rotational(id) {
        debug!("{id}: not rotational, skipping disk lock");
        return None;
    }
    let name = resolver.disk_name(id).unwrap_or_else(|| id.to_string());

    if !policy.runtime_dir.is_dir() {
        if let Err(e) = DirBuilder::new()
            .recursive(true)
            .mode(0o755)
            .create(&policy.runtime_dir)
        {
            warn!(
                "could not create runtime directory {}: {e}",
                policy.runtime_dir.display()
            );
            return None;
        }
    }
    let path = policy.runtime_dir.join(format!("{name}.lock"));

    let file = match OpenOptions::new()
        .create(true)
        .write(true)
        .mode(0o644)
        .open(&path)
    {
        Ok(f) => f,
        Err(e) => {
            warn!("could not open lock file {}: {e}", path.display());
            return None;
        }
    };
    let fd: OwnedFd = file.into();

    // Non-blocking attempt first, purely to print a "waiting" message;
    // then fall back to a blocking acquisition.
    match Flock::lock(fd, FlockArg::LockExclusiveNonblock) {
        Ok(flock) => Some(DiskLock {
            path,
            _flock: flock,
        }),
        Err((fd, _)) => {
            debug!("{}: waiting for disk lock", path.display());
            match Flock::lock(fd, FlockArg::LockExclusive) {
                Ok(flock) => Some(DiskLock {
                    path,
                    _flock: flock,
                }),
                Err((_, e)) => {
                    warn!("could not lock {}: {e}", path.display());
                    None
                }
            }
        }
    }
}

impl AsRawFd for DiskLock {
    fn as_raw_fd(&self) -> std::os::unix::io::RawFd {
        self._flock.as_raw_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::DeviceResolver;
    use std::path::Path;

    struct RotatingResolver;
    impl DeviceResolver for RotatingResolver {
        fn resolve(&self, spec: &str) -> PathBuf {
            PathBuf::from(spec)
        }
        fn whole_disk_of(&self, _path: &Path) -> Option<DiskId> {
            Some(DiskId { major: 8, minor: 0 })
        }
        fn disk_name(&self, _id: DiskId) -> Option<String> {
            Some("sda".to_string())
        }
        fn slaves_of(&self, _id: DiskId) -> usize {
            0
        }
        fn rotational(&self, _id: DiskId) -> bool {
            true
        }
    }

    struct SolidStateResolver;
    impl DeviceResolver for SolidStateResolver {
        fn resolve(&self, spec: &str) -> PathBuf {
            PathBuf::from(spec)
        }
        fn whole_disk_of(&self, _path: &Path) -> Option<DiskId> {
            Some(DiskId { major: 8, minor: 0 })
        }
        fn disk_name(&self, _id: DiskId) -> Option<String> {
            Some("nvme0n1".to_string())
        }
        fn slaves_of(&self, _id: DiskId) -> usize {
            0
        }
        fn rotational(&self, _id: DiskId) -> bool {
            false
        }
    }

    #[test]
    fn acquires_and_creates_runtime_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut policy = Policy::default();
        policy.lock_disk = true;
        policy.runtime_dir = dir.path().join("nested");

        let id = DiskId { major: 8, minor: 0 };
        let lock = acquire(&policy, &RotatingResolver, id).expect("should lock");
        assert!(lock.path().exists());
        assert_eq!(lock.path(), policy.runtime_dir.join("sda.lock"));
    }

    #[test]
    fn skips_solid_state_disks() {
        let dir = tempfile::tempdir().unwrap();
        let mut policy = Policy::default();
        policy.lock_disk = true;
        policy.runtime_dir = dir.path().to_path_buf();

        let id = DiskId { major: 8, minor: 0 };
        assert!(acquire(&policy, &SolidStateResolver, id).is_none());
    }

    #[test]
    fn disabled_by_policy() {
        let dir = tempfile::tempdir().unwrap();
        let mut policy = Policy::default();
        policy.lock_disk = false;
        policy.runtime_dir = dir.path().to_path_buf();

        let id = DiskId { major: 8, minor: 0 };
        assert!(acquire(&policy, &RotatingResolver, id).is_none());
    }
}
