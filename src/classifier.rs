//! Entry classifier: decides whether a mount-table entry is
//! eligible for checking at all, before the pass driver ever considers
//! scheduling it.

use log::{debug, warn};

use crate::disk::DeviceResolver;
use crate::launcher;
use crate::mount_table::is_network_pseudo_or_swap;
use crate::prober::TypeProber;
use crate::type_filter::TypeFilter;
use crate::types::{self, MountEntry, Policy};

/// `true` iff `entry` must be skipped, per the ordered procedure in
/// spec.md §4.1. Pure given its inputs (spec.md §8 "classifier
/// determinism"): the same entry, filter, and collaborator answers always
/// produce the same verdict.
pub fn is_ignored(
    entry: &MountEntry,
    filter: &TypeFilter,
    resolver: &dyn DeviceResolver,
    prober: &dyn TypeProber,
    policy: &Policy,
) -> bool {
    // 1. pass_no == 0 disables checking outright.
    if entry.pass_no == 0 {
        return true;
    }

    // 2. a bind mount with a non-zero pass is malformed.
    if entry.has_option("bind") {
        warn!(
            "{}: bind mount has non-zero pass, ignoring",
            entry.source_spec
        );
        return true;
    }

    // 3. resolve the device; missing device is only ignored if `nofail`.
    let resolved = resolver.resolve(&entry.source_spec);
    let device_exists = resolved.exists();
    entry.set_resolved_device(resolved.clone());
    if !device_exists {
        if entry.has_option("nofail") {
            debug!(
                "{}: device does not exist, ignoring (nofail)",
                entry.source_spec
            );
            return true;
        }
        warn!("{}: device does not exist", entry.source_spec);
    }

    // 4. interpret the type, probing when it's absent/"auto".
    if entry.effective_type().is_none() && device_exists {
        let (probed, ambiguous) = prober.probe_type(&resolved);
        if !ambiguous {
            if let Some(t) = probed {
                entry.set_resolved_type(t);
            }
        }
    }

    // 5. apply the compiled type filter.
    let type_for_filter = entry.effective_type().unwrap_or_else(|| entry.fs_type.clone());
    if !filter.matches(&type_for_filter, &entry.options) {
        return true;
    }

    // 6. type still unset after probing: nothing to run.
    let Some(fs_type) = entry.effective_type() else {
        debug!("{}: filesystem type is unset, ignoring", entry.source_spec);
        return true;
    };

    // 7. always-ignored types, and network/pseudo/swap filesystems.
    if types::is_always_ignored(&fs_type) || is_network_pseudo_or_swap(&fs_type) {
        return true;
    }

    // 8. the helper must be locatable on the search path.
    if launcher::locate_helper(&policy.helper_search_path, &fs_type).is_none() {
        if types::is_strongly_wanted(&fs_type) {
            warn!(
                "{}: cannot find helper fsck.{fs_type}",
                entry.source_spec
            );
        }
        return true;
    }

    // 9. otherwise it's eligible.
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::path::{Path, PathBuf};

    use crate::disk::DiskId;

    struct FakeResolver;
    impl DeviceResolver for FakeResolver {
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

    struct FixedProber(RefCell<Option<String>>);
    impl TypeProber for FixedProber {
        fn probe_type(&self, _device: &Path) -> (Option<String>, bool) {
            (self.0.borrow().clone(), self.0.borrow().is_none())
        }
    }

    fn policy_with_helper(dir: &Path) -> Policy {
        let mut p = Policy::default();
        p.helper_search_path = vec![dir.to_path_buf()];
        p
    }

    fn make_fake_helper(dir: &Path, fs_type: &str) {
        let path = dir.join(format!("fsck.{fs_type}"));
        std::fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
        std::fs::set_permissions(&path, std::os::unix::fs::PermissionsExt::from_mode(0o755))
            .unwrap();
    }

    #[test]
    fn pass_zero_is_ignored() {
        let entry = MountEntry::new("/dev/sda1", None, "ext4", "defaults", 0);
        let filter = TypeFilter::accept_all();
        let policy = Policy::default();
        assert!(is_ignored(
            &entry,
            &filter,
            &FakeResolver,
            &FixedProber(RefCell::new(Some("ext4".into()))),
            &policy
        ));
    }

    #[test]
    fn bind_mount_with_pass_is_ignored() {
        let entry = MountEntry::new("/a", None, "ext4", "bind", 1);
        let filter = TypeFilter::accept_all();
        let policy = Policy::default();
        assert!(is_ignored(
            &entry,
            &filter,
            &FakeResolver,
            &FixedProber(RefCell::new(Some("ext4".into()))),
            &policy
        ));
    }

    #[test]
    fn missing_device_with_nofail_is_ignored() {
        let entry = MountEntry::new("/dev/doesnotexist", None, "ext4", "nofail", 1);
        let filter = TypeFilter::accept_all();
        let policy = Policy::default();
        assert!(is_ignored(
            &entry,
            &filter,
            &FakeResolver,
            &FixedProber(RefCell::new(Some("ext4".into()))),
            &policy
        ));
    }

    #[test]
    fn network_fs_is_ignored() {
        let entry = MountEntry::new("server:/export", None, "nfs", "defaults", 1);
        let filter = TypeFilter::accept_all();
        let policy = Policy::default();
        assert!(is_ignored(
            &entry,
            &filter,
            &FakeResolver,
            &FixedProber(RefCell::new(Some("nfs".into()))),
            &policy
        ));
    }

    #[test]
    fn eligible_entry_with_helper_present_is_not_ignored() {
        let dir = tempfile::tempdir().unwrap();
        make_fake_helper(dir.path(), "ext4");
        // use a real, existing path so step 3's existence check passes.
        let entry = MountEntry::new(dir.path().to_str().unwrap(), None, "ext4", "defaults", 1);
        let filter = TypeFilter::accept_all();
        let policy = policy_with_helper(dir.path());
        assert!(!is_ignored(
            &entry,
            &filter,
            &FakeResolver,
            &FixedProber(RefCell::new(Some("ext4".into()))),
            &policy
        ));
    }

    #[test]
    fn missing_helper_for_strongly_wanted_type_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let entry = MountEntry::new(dir.path().to_str().unwrap(), None, "ext4", "defaults", 1);
        let filter = TypeFilter::accept_all();
        let policy = policy_with_helper(dir.path());
        assert!(is_ignored(
            &entry,
            &filter,
            &FakeResolver,
            &FixedProber(RefCell::new(Some("ext4".into()))),
            &policy
        ));
    }
}
