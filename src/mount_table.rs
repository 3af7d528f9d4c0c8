//! The mount-table and mounted-table collaborators.
//!
//! spec.md treats these as external, already-built components the core only
//! consumes through a narrow interface. This module supplies that interface
//! as traits plus one concrete implementation each, reading the classic
//! `/etc/fstab` line format and `/proc/mounts`, so the crate is runnable on
//! its own. Parse errors are soft: a malformed line is warned
//! and skipped, never fatal.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use log::warn;

use crate::types::MountEntry;

/// Source of mount-table entries.
pub trait MountTableSource {
    /// Reads every entry, in file order. Parse errors on individual lines
    /// are warned and the line is skipped; only a wholesale read failure
    /// is propagated.
    fn entries(&self) -> io::Result<Vec<Rc<MountEntry>>>;
}

/// Reads an `/etc/fstab`-style table: six whitespace-separated fields
/// `source target fstype options dump pass`, `#` comments, blank lines
/// skipped. An entry missing its `pass` field defaults to pass 0 (ignored).
pub struct FstabSource {
    path: PathBuf,
}

impl FstabSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FstabSource { path: path.into() }
    }

    /// The conventional system mount table, unless overridden.
    pub fn system_default() -> Self {
        FstabSource::new("/etc/fstab")
    }
}

impl MountTableSource for FstabSource {
    fn entries(&self) -> io::Result<Vec<Rc<MountEntry>>> {
        let contents = fs::read_to_string(&self.path)?;
        let mut out = Vec::new();
        for (lineno, raw_line) in contents.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 3 {
                warn!(
                    "{}:{}: malformed mount table line, skipping: {raw_line:?}",
                    self.path.display(),
                    lineno + 1
                );
                continue;
            }
            let source = fields[0].to_string();
            let target = if fields[1] == "none" {
                None
            } else {
                Some(PathBuf::from(fields[1]))
            };
            let fs_type = fields.get(2).copied().unwrap_or("auto").to_string();
            let options = fields.get(3).copied().unwrap_or("defaults").to_string();
            let pass_no: u32 = fields
                .get(5)
                .and_then(|s| s.parse().ok())
                .unwrap_or(0);
            out.push(Rc::new(MountEntry::new(
                source, target, fs_type, options, pass_no,
            )));
        }
        Ok(out)
    }
}

/// The mounted-table collaborator: answers "is this source currently
/// mounted".
pub trait MountedTable {
    fn is_mounted(&self, source: &str) -> bool;
}

/// Reads `/proc/mounts` fresh on every call: the set of live mounts can
/// change between passes, so this deliberately doesn't cache.
#[derive(Debug, Default)]
pub struct ProcMounts;

impl MountedTable for ProcMounts {
    fn is_mounted(&self, source: &str) -> bool {
        let Ok(contents) = fs::read_to_string("/proc/mounts") else {
            return false;
        };
        let resolved = fs::canonicalize(source).ok();
        contents.lines().any(|line| {
            let Some(mounted_source) = line.split_whitespace().next() else {
                return false;
            };
            if mounted_source == source {
                return true;
            }
            match (&resolved, fs::canonicalize(mounted_source)) {
                (Some(a), Ok(b)) => *a == b,
                _ => false,
            }
        })
    }
}

/// Network filesystem types the classifier always ignores (spec.md §4.1
/// step 7).
pub fn is_network_fs(fs_type: &str) -> bool {
    matches!(
        fs_type,
        "nfs" | "nfs4" | "smbfs" | "cifs" | "afs" | "ncpfs" | "9p"
    )
}

/// Pseudo filesystem types the classifier always ignores.
pub fn is_pseudo_fs(fs_type: &str) -> bool {
    matches!(
        fs_type,
        "proc" | "sysfs" | "devtmpfs" | "devpts" | "tmpfs" | "cgroup" | "cgroup2" | "overlay"
    )
}

/// Swap isn't a filesystem to check at all.
pub fn is_swap_fs(fs_type: &str) -> bool {
    fs_type == "swap"
}

pub fn is_network_pseudo_or_swap(fs_type: &str) -> bool {
    is_network_fs(fs_type) || is_pseudo_fs(fs_type) || is_swap_fs(fs_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_basic_fstab() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# a comment").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "/dev/sda1 / ext4 defaults 0 1").unwrap();
        writeln!(file, "/dev/sda2 /home ext4 defaults 0 2").unwrap();
        writeln!(file, "tmpfs /tmp tmpfs defaults 0 0").unwrap();
        writeln!(file, "garbage line").unwrap();

        let source = FstabSource::new(file.path());
        let entries = source.entries().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].pass_no, 1);
        assert_eq!(entries[1].target, Some(PathBuf::from("/home")));
        assert_eq!(entries[2].pass_no, 0);
    }

    #[test]
    fn none_target_parses_as_absent() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "/dev/sda3 none swap sw 0 0").unwrap();
        let entries = FstabSource::new(file.path()).entries().unwrap();
        assert_eq!(entries[0].target, None);
    }
}
