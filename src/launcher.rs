//! Helper launcher: resolves `fsck.<type>` on the search
//! path, builds its argument vector, and spawns it.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::rc::Rc;
use std::time::Instant;

use log::{debug, warn};
use nix::unistd::{AccessFlags, access};

use crate::disk::DeviceResolver;
use crate::locker;
use crate::types::{self, Instance, InstanceFlags, MountEntry, Policy};

/// Finds `fsck.<type>` (or `<type>` itself, if it already starts with
/// `fsck.`) on `search_path`, returning the first executable match.
pub fn locate_helper(search_path: &[PathBuf], fs_type: &str) -> Option<PathBuf> {
    let program = if fs_type.starts_with("fsck.") {
        fs_type.to_string()
    } else {
        format!("fsck.{fs_type}")
    };
    for dir in search_path {
        let candidate = dir.join(&program);
        if access(&candidate, AccessFlags::X_OK).is_ok() {
            return Some(candidate);
        }
    }
    None
}

/// The type to launch with: the entry's own
/// interpreted type if settled and not `"auto"`; else the user's `-t`
/// selector iff it names exactly one non-negated, non-option type; else the
/// policy default.
pub fn effective_type<'a>(entry: &'a MountEntry, user_type_arg: Option<&'a str>, policy: &'a Policy) -> String {
    if let Some(t) = entry.effective_type() {
        if t != "auto" {
            if let Some(arg) = user_type_arg {
                if arg != t && !arg.contains(',') && !arg.starts_with('!') && !arg.starts_with("no") {
                    debug!(
                        "{}: entry type '{t}' overrides -t argument '{arg}'",
                        entry.source_spec
                    );
                }
            }
            return t;
        }
    }
    if let Some(arg) = user_type_arg {
        if !arg.contains(',') && !arg.starts_with('!') && !arg.starts_with("no") {
            return arg.to_string();
        }
    }
    policy.default_type.clone()
}

/// Outcome of [`execute`]: either a new instance was appended to `instances`,
/// or the launch failed in a way the pass driver must fold into the
/// aggregate status.
pub enum LaunchOutcome {
    Launched,
    /// The type is strongly-wanted and no helper exists for it (spec.md
    /// §4.6 step 3) or the fork itself failed.
    Failed,
    /// Nothing to run and it's not an error (unwanted type, missing
    /// helper for a type nobody strongly wants).
    Skipped,
}

/// Launches a helper for `entry`, appending a new [`Instance`] to
/// `instances` on success.
///
/// `interactive` controls whether the child retains the supervisor's
/// standard input (spec.md §4.6: single-filesystem invocations stay
/// interactive; the full-table run closes it so helpers don't fight over a
/// shared terminal).
#[allow(clippy::too_many_arguments)]
pub fn execute(
    entry: &Rc<MountEntry>,
    user_type_arg: Option<&str>,
    policy: &Policy,
    resolver: &dyn DeviceResolver,
    instances: &mut Vec<Instance>,
    interactive: bool,
    extra_args: &[String],
) -> LaunchOutcome {
    let fs_type = effective_type(entry, user_type_arg, policy);

    let Some(program_path) = locate_helper(&policy.helper_search_path, &fs_type) else {
        if types::is_strongly_wanted(&fs_type) {
            warn!("{}: cannot find helper fsck.{fs_type}", entry.source_spec);
            return LaunchOutcome::Failed;
        }
        return LaunchOutcome::Skipped;
    };

    let device = entry
        .resolved_device()
        .unwrap_or_else(|| PathBuf::from(&entry.source_spec));

    let mut args: Vec<String> = extra_args.to_vec();
    let mut flags = InstanceFlags::empty();
    if policy.progress_enabled && types::is_progress_capable(&fs_type) {
        if instances.iter().any(|i| i.has_progress()) {
            args.push(format!("-C-{}", policy.progress_fd));
        } else {
            args.push(format!("-C{}", policy.progress_fd));
            flags |= InstanceFlags::PROGRESS;
        }
    }
    args.push(device.to_string_lossy().into_owned());

    let lock = entry
        .whole_disk_id()
        .and_then(|id| locker::acquire(policy, resolver, id));

    if policy.noexecute {
        debug!(
            "would run: fsck.{fs_type} {} {}",
            args.join(" "),
            device.display()
        );
        instances.push(Instance {
            pid: None,
            flags: flags | InstanceFlags::DONE,
            lock,
            program_name: format!("fsck.{fs_type}"),
            program_path: Some(program_path),
            fs_type,
            start_time: Instant::now(),
            end_time: Some(Instant::now()),
            exit_code: Some(types::ExitStatus::empty()),
            resource_usage: Some(types::ResourceUsage::default()),
            entry: Rc::clone(entry),
        });
        return LaunchOutcome::Launched;
    }

    let mut command = Command::new(&program_path);
    command.args(&args);
    if !interactive {
        command.stdin(Stdio::null());
    }

    match command.spawn() {
        Ok(child) => {
            let pid = nix::unistd::Pid::from_raw(child.id() as i32);
            // `Child` is dropped here without calling `wait()`; the
            // reaper reaps by pid through `libc::wait4` directly, so the
            // child sits as a zombie until then, same as any other
            // fork/exec supervisor.
            drop(child);
            debug!("launched fsck.{fs_type} on {} (pid {pid})", device.display());
            instances.push(Instance {
                pid: Some(pid),
                flags,
                lock,
                program_name: format!("fsck.{fs_type}"),
                program_path: Some(program_path),
                fs_type,
                start_time: Instant::now(),
                end_time: None,
                exit_code: None,
                resource_usage: None,
                entry: Rc::clone(entry),
            });
            LaunchOutcome::Launched
        }
        Err(e) => {
            warn!("fork/exec of fsck.{fs_type} failed: {e}");
            LaunchOutcome::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn make_fake_helper(dir: &Path, fs_type: &str, body: &str) -> PathBuf {
        let path = dir.join(format!("fsck.{fs_type}"));
        std::fs::write(&path, body).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn locates_first_match_on_search_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = make_fake_helper(dir.path(), "ext4", "#!/bin/sh\nexit 0\n");
        let search = vec![PathBuf::from("/nonexistent"), dir.path().to_path_buf()];
        assert_eq!(locate_helper(&search, "ext4"), Some(path));
    }

    #[test]
    fn missing_helper_returns_none() {
        let search = vec![PathBuf::from("/nonexistent")];
        assert_eq!(locate_helper(&search, "ext4"), None);
    }

    #[test]
    fn effective_type_prefers_entrys_own_type() {
        let entry = MountEntry::new("/dev/sda1", None, "xfs", "defaults", 1);
        let policy = Policy::default();
        assert_eq!(effective_type(&entry, Some("ext4"), &policy), "xfs");
    }

    #[test]
    fn effective_type_falls_back_to_single_user_type() {
        let entry = MountEntry::new("/dev/sda1", None, "auto", "defaults", 1);
        let policy = Policy::default();
        assert_eq!(effective_type(&entry, Some("ext4"), &policy), "ext4");
    }

    #[test]
    fn effective_type_ignores_comma_or_negated_selector() {
        let entry = MountEntry::new("/dev/sda1", None, "auto", "defaults", 1);
        let policy = Policy::default();
        assert_eq!(
            effective_type(&entry, Some("ext4,xfs"), &policy),
            policy.default_type
        );
        assert_eq!(effective_type(&entry, Some("noext4"), &policy), policy.default_type);
    }

    #[test]
    fn noexecute_records_a_zero_exit_instance_without_spawning() {
        let dir = tempfile::tempdir().unwrap();
        make_fake_helper(dir.path(), "ext4", "#!/bin/sh\nexit 7\n");
        let mut policy = Policy::default();
        policy.helper_search_path = vec![dir.path().to_path_buf()];
        policy.noexecute = true;

        let entry = Rc::new(MountEntry::new("/dev/sda1", None, "ext4", "defaults", 1));
        entry.set_resolved_device(PathBuf::from("/dev/sda1"));

        struct NoDisk;
        impl DeviceResolver for NoDisk {
            fn resolve(&self, spec: &str) -> PathBuf {
                PathBuf::from(spec)
            }
            fn whole_disk_of(&self, _path: &Path) -> Option<crate::disk::DiskId> {
                None
            }
            fn disk_name(&self, _id: crate::disk::DiskId) -> Option<String> {
                None
            }
            fn slaves_of(&self, _id: crate::disk::DiskId) -> usize {
                0
            }
            fn rotational(&self, _id: crate::disk::DiskId) -> bool {
                false
            }
        }

        let mut instances = Vec::new();
        let outcome = execute(&entry, None, &policy, &NoDisk, &mut instances, false, &[]);
        assert!(matches!(outcome, LaunchOutcome::Launched));
        assert_eq!(instances.len(), 1);
        assert!(instances[0].is_done());
        assert_eq!(instances[0].exit_code, Some(types::ExitStatus::empty()));
    }
}
