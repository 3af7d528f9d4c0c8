//! The data model shared by every component: mount-table entries, running
//! helper instances, and the supervisor's process-wide state.
//!
//! The supervisor is single-threaded and cooperative, so the
//! memoized, lazily-computed fields on [`MountEntry`] use `Cell`/`RefCell`
//! rather than atomics or a mutex, and [`Instance`] shares its entry through
//! an `Rc`, not an `Arc`.

use std::cell::{Cell, RefCell};
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Instant;

use bitflags::bitflags;

use crate::disk::DiskId;

bitflags! {
    /// Normalized helper exit status, following fsck(8) convention.
    ///
    /// The supervisor aggregates these with bitwise OR (spec.md §4.9, §8
    /// property 4); the individual bits never interact beyond that.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ExitStatus: u32 {
        /// Non-destructive errors were corrected.
        const NONDESTRUCT = 0b0000_0001;
        /// The system should be rebooted.
        const REBOOT       = 0b0000_0010;
        /// Errors were left uncorrected (also used when a helper dies to SIGINT).
        const UNCORRECTED  = 0b0000_0100;
        /// An operational error occurred (fork failure, missing helper, ...).
        const OPERATIONAL  = 0b0000_1000;
        /// A usage or argument error occurred.
        const USAGE        = 0b0001_0000;
        /// The run was canceled by the user.
        const CANCELED     = 0b0010_0000;
        /// A shared-library error occurred.
        const LIBRARY      = 0b1000_0000;
    }
}

impl ExitStatus {
    /// `true` iff this status is worse than a merely-corrected filesystem,
    /// i.e. root-stage failures at or above this level abort the run.
    pub fn exceeds_nondestruct(self) -> bool {
        self.bits() > Self::NONDESTRUCT.bits()
    }
}

/// Resource usage recorded for one completed [`Instance`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceUsage {
    pub wall: std::time::Duration,
    pub user: std::time::Duration,
    pub system: std::time::Duration,
    pub max_rss_kb: i64,
}

/// One filesystem declared in the mount table.
///
/// `resolved_device`, `whole_disk_id`, `is_stacked` and `done` are derived
/// lazily by the classifier/resolver and memoized here so repeated lookups
/// (e.g. the scheduler checking every live instance on every candidate
/// launch) don't re-resolve a device each time.
#[derive(Debug)]
pub struct MountEntry {
    pub source_spec: String,
    pub target: Option<PathBuf>,
    /// `"auto"` means "let probing decide"; see [`crate::classifier::is_ignored`].
    pub fs_type: String,
    pub options: String,
    pub pass_no: u32,

    resolved_device: RefCell<Option<PathBuf>>,
    whole_disk_id: RefCell<Option<DiskId>>,
    is_stacked: Cell<Option<bool>>,
    /// Filesystem type after probing/filtering has resolved `"auto"`, if any.
    resolved_type: RefCell<Option<String>>,
    done: Cell<bool>,
}

impl MountEntry {
    pub fn new(
        source_spec: impl Into<String>,
        target: Option<PathBuf>,
        fs_type: impl Into<String>,
        options: impl Into<String>,
        pass_no: u32,
    ) -> Self {
        MountEntry {
            source_spec: source_spec.into(),
            target,
            fs_type: fs_type.into(),
            options: options.into(),
            pass_no,
            resolved_device: RefCell::new(None),
            whole_disk_id: RefCell::new(None),
            is_stacked: Cell::new(None),
            resolved_type: RefCell::new(None),
            done: Cell::new(false),
        }
    }

    pub fn has_option(&self, name: &str) -> bool {
        self.options.split(',').any(|o| o == name)
    }

    pub fn is_done(&self) -> bool {
        self.done.get()
    }

    /// Marks the entry done. Invariant: once set, never unset within a run.
    pub fn mark_done(&self) {
        self.done.set(true);
    }

    pub fn resolved_device(&self) -> Option<PathBuf> {
        self.resolved_device.borrow().clone()
    }

    pub fn set_resolved_device(&self, path: PathBuf) {
        *self.resolved_device.borrow_mut() = Some(path);
    }

    pub fn whole_disk_id(&self) -> Option<DiskId> {
        self.whole_disk_id.borrow().clone()
    }

    pub fn set_whole_disk_id(&self, id: DiskId) {
        *self.whole_disk_id.borrow_mut() = Some(id);
    }

    pub fn is_stacked(&self) -> Option<bool> {
        self.is_stacked.get()
    }

    pub fn set_is_stacked(&self, stacked: bool) {
        self.is_stacked.set(Some(stacked));
    }

    /// The type after `"auto"` has been resolved by probing, if that has
    /// happened yet. `None` means "not probed / still ambiguous".
    pub fn resolved_type(&self) -> Option<String> {
        self.resolved_type.borrow().clone()
    }

    pub fn set_resolved_type(&self, fs_type: impl Into<String>) {
        *self.resolved_type.borrow_mut() = Some(fs_type.into());
    }

    /// The type to classify/launch with: the resolved type if probing has
    /// settled one, otherwise the table's own type unless it's `"auto"`.
    pub fn effective_type(&self) -> Option<String> {
        if let Some(t) = self.resolved_type() {
            return Some(t);
        }
        if self.fs_type != "auto" {
            return Some(self.fs_type.clone());
        }
        None
    }
}

bitflags! {
    /// Per-[`Instance`] runtime flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct InstanceFlags: u8 {
        /// The helper has exited and been reaped.
        const DONE     = 0b01;
        /// This instance currently owns the shared progress bar.
        const PROGRESS = 0b10;
    }
}

/// A running (or just-completed, pre-aggregation) helper.
#[derive(Debug)]
pub struct Instance {
    pub pid: Option<nix::unistd::Pid>,
    pub flags: InstanceFlags,
    pub lock: Option<crate::locker::DiskLock>,
    pub program_name: String,
    pub program_path: Option<PathBuf>,
    pub fs_type: String,
    pub start_time: Instant,
    pub end_time: Option<Instant>,
    pub exit_code: Option<ExitStatus>,
    pub resource_usage: Option<ResourceUsage>,
    pub entry: Rc<MountEntry>,
}

impl Instance {
    pub fn is_done(&self) -> bool {
        self.flags.contains(InstanceFlags::DONE)
    }

    pub fn has_progress(&self) -> bool {
        self.flags.contains(InstanceFlags::PROGRESS)
    }
}

/// The set of filesystem types for which the progress-bar flag (`-C`) is
/// meaningful.
pub fn is_progress_capable(fs_type: &str) -> bool {
    matches!(fs_type, "ext2" | "ext3" | "ext4" | "ext4dev")
}

/// Filesystem types whose missing helper is an error rather than a silent
/// skip.
pub fn is_strongly_wanted(fs_type: &str) -> bool {
    matches!(
        fs_type,
        "minix" | "ext2" | "ext3" | "ext4" | "ext4dev" | "jfs" | "reiserfs"
    )
}

/// Types that are always ignored regardless of the user's `-t` filter.
pub fn is_always_ignored(fs_type: &str) -> bool {
    matches!(fs_type, "ignore" | "iso9660" | "sw")
}

/// Policy flags controlling the supervisor's behavior (spec.md §3
/// `GlobalState`). Constructed from CLI/environment input in
/// [`crate::config`].
#[derive(Debug, Clone)]
pub struct Policy {
    pub serialize: bool,
    pub force_all_parallel: bool,
    pub lock_disk: bool,
    pub ignore_mounted: bool,
    pub parallel_root: bool,
    pub skip_root: bool,
    pub noexecute: bool,
    pub progress_enabled: bool,
    pub progress_fd: i32,
    pub report_stats: bool,
    pub max_running: usize,
    pub helper_search_path: Vec<PathBuf>,
    pub default_type: String,
    pub runtime_dir: PathBuf,
}

impl Default for Policy {
    fn default() -> Self {
        Policy {
            serialize: false,
            force_all_parallel: false,
            lock_disk: false,
            ignore_mounted: true,
            parallel_root: false,
            skip_root: false,
            noexecute: false,
            progress_enabled: false,
            progress_fd: 1,
            report_stats: false,
            max_running: 0,
            helper_search_path: vec![
                PathBuf::from("/sbin"),
                PathBuf::from("/usr/sbin"),
                PathBuf::from("/bin"),
            ],
            default_type: "ext2".to_string(),
            runtime_dir: PathBuf::from("/run/pfsck"),
        }
    }
}
