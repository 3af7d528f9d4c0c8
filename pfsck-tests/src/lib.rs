//! Test harness for `pfsck`: builds disposable shell-script stand-ins for
//! `fsck.<type>` helpers and a fake device topology, then drives
//! [`pfsck::check_all`] against them, the way `fuser-tests` drives
//! `fuser`'s mount/unmount entry points against a real kernel.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use pfsck::disk::{DeviceResolver, DiskId};
use pfsck::mount_table::MountedTable;
use pfsck::prober::TypeProber;
use pfsck::stats::NullStats;
use pfsck::types::{MountEntry, Policy};
use pfsck::GlobalState;

/// Writes a fake `fsck.<type>` helper at `dir/fsck.<type>` that runs
/// `body` (a POSIX shell script) and returns its path.
pub fn write_fake_helper(dir: &Path, fs_type: &str, body: &str) -> PathBuf {
    let path = dir.join(format!("fsck.{fs_type}"));
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// A fake device topology: every device path maps to a whole-disk id, a
/// stacked flag and a rotational flag, fully under test control (spec.md
/// §8 "classifier determinism" relies on exactly this kind of fake).
#[derive(Debug, Default)]
pub struct FakeTopology {
    disks: RefCell<HashMap<PathBuf, (DiskId, bool, bool)>>,
}

impl FakeTopology {
    pub fn new() -> Self {
        FakeTopology::default()
    }

    /// Registers `path` as living on whole disk `id`. `stacked`/`rotational`
    /// describe that whole disk.
    pub fn register(&self, path: impl Into<PathBuf>, id: DiskId, stacked: bool, rotational: bool) {
        self.disks
            .borrow_mut()
            .insert(path.into(), (id, stacked, rotational));
    }
}

impl DeviceResolver for FakeTopology {
    fn resolve(&self, spec: &str) -> PathBuf {
        PathBuf::from(spec)
    }

    fn whole_disk_of(&self, path: &Path) -> Option<DiskId> {
        self.disks.borrow().get(path).map(|(id, ..)| *id)
    }

    fn disk_name(&self, id: DiskId) -> Option<String> {
        self.disks
            .borrow()
            .iter()
            .find(|(_, (disk_id, ..))| *disk_id == id)
            .map(|(path, _)| path.file_name().unwrap().to_string_lossy().into_owned())
    }

    fn slaves_of(&self, id: DiskId) -> usize {
        self.disks
            .borrow()
            .values()
            .find(|(disk_id, stacked, _)| *disk_id == id && *stacked)
            .map(|_| 2)
            .unwrap_or(0)
    }

    fn rotational(&self, id: DiskId) -> bool {
        self.disks
            .borrow()
            .values()
            .any(|(disk_id, _, rotational)| *disk_id == id && *rotational)
    }
}

/// Every device exists and probes to `ext4`.
#[derive(Debug, Default)]
pub struct AlwaysExt4;

impl TypeProber for AlwaysExt4 {
    fn probe_type(&self, _device: &Path) -> (Option<String>, bool) {
        (Some("ext4".to_string()), false)
    }
}

/// Nothing is ever mounted (so `ignore_mounted` never skips an entry).
#[derive(Debug, Default)]
pub struct NothingMounted;

impl MountedTable for NothingMounted {
    fn is_mounted(&self, _source: &str) -> bool {
        false
    }
}

/// Builds a [`GlobalState`] wired to the fakes above, with
/// `lock_disk`/`ignore_mounted` off by default so scenario tests only pay
/// for the behavior they're exercising.
pub fn fake_global_state(topology: FakeTopology) -> GlobalState {
    let mut policy = Policy::default();
    policy.ignore_mounted = false;
    GlobalState {
        instances: Vec::new(),
        policy,
        kill_sent: false,
        user_type_arg: None,
        extra_args: Vec::new(),
        resolver: Box::new(topology),
        prober: Box::new(AlwaysExt4),
        mounted: Box::new(NothingMounted),
        stats: Box::new(NullStats),
    }
}

/// A mount-table entry whose device already exists on disk (a regular file
/// under `dir`), so the classifier's existence check passes.
pub fn entry_for(dir: &Path, name: &str, target: Option<&str>, fs_type: &str, pass_no: u32) -> (Rc<MountEntry>, PathBuf) {
    let device = dir.join(name);
    fs::write(&device, b"").unwrap();
    let entry = Rc::new(MountEntry::new(
        device.to_string_lossy().into_owned(),
        target.map(PathBuf::from),
        fs_type,
        "defaults",
        pass_no,
    ));
    (entry, device)
}
