//! Disk-identity resolution.
//!
//! Maps a resolved device path to the whole disk it lives on and answers
//! the two questions the scheduler and locker need about that whole disk:
//! is it a stacked (composed-over-slaves) device, and is it rotational.
//!
//! Grounded on `examples/other_examples/...rsturla-bootc__crates-blockdev-
//! src-blockdev.rs`: shell out to `lsblk`/`sysfs` and parse with `serde`
//! rather than hand-rolling ioctls, the same tradeoff that file makes.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, warn};
use serde::Deserialize;

/// Opaque whole-disk identifier: the device's `(major, minor)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiskId {
    pub major: u64,
    pub minor: u64,
}

impl std::fmt::Display for DiskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.major, self.minor)
    }
}

/// The device-resolver collaborator. Implemented as a trait so
/// the scheduler/classifier can be exercised against a fake in tests without
/// touching a real block layer.
pub trait DeviceResolver {
    /// Resolves a source specifier (symlink, `LABEL=`/`UUID=` tag, or a real
    /// device path) to a canonical block-device path. Falls back to
    /// returning the original spec unchanged if resolution fails.
    fn resolve(&self, spec: &str) -> PathBuf;

    /// The whole disk containing `path`, or `None` for network/pseudo/
    /// unresolvable entries.
    fn whole_disk_of(&self, path: &Path) -> Option<DiskId>;

    /// Name of the whole disk (e.g. `"sda"`, `"md0"`) backing `id`, if known.
    fn disk_name(&self, id: DiskId) -> Option<String>;

    /// Number of slave devices composing `id` (RAID/LVM members). Zero for
    /// an ordinary disk.
    fn slaves_of(&self, id: DiskId) -> usize;

    /// `true` if `id` is a rotational (mechanical) disk. Solid-state and
    /// unknown devices return `false`.
    fn rotational(&self, id: DiskId) -> bool;
}

/// Default Linux implementation, backed by `lsblk` and `/sys/class/block`.
#[derive(Debug, Default)]
pub struct LinuxDeviceResolver;

#[derive(Debug, Deserialize)]
struct LsblkOutput {
    blockdevices: Vec<LsblkDevice>,
}

#[derive(Debug, Deserialize)]
struct LsblkDevice {
    name: String,
    #[serde(rename = "maj:min")]
    maj_min: Option<String>,
}

fn parse_maj_min(s: &str) -> Option<DiskId> {
    let (maj, min) = s.split_once(':')?;
    Some(DiskId {
        major: maj.parse().ok()?,
        minor: min.parse().ok()?,
    })
}

impl LinuxDeviceResolver {
    /// Parent-hierarchy walk equivalent to `find_parent_devices` in the
    /// grounding file: `lsblk --inverse` lists `path`'s own ancestry, first
    /// "disk"/"loop"/"mpath" entry encountered going up is the whole disk.
    fn whole_disk_name(&self, path: &Path) -> Option<String> {
        let output = Command::new("lsblk")
            .arg("--pairs")
            .arg("--paths")
            .arg("--inverse")
            .arg("--output")
            .arg("NAME,TYPE")
            .arg(path)
            .output()
            .ok()?;
        if !output.status.success() {
            return None;
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let re_name = regex_pairs(&stdout);
        // skip the device itself (first line), walk its ancestors.
        for fields in re_name.into_iter().skip(1) {
            let name = fields.get("NAME")?;
            let kind = fields.get("TYPE")?;
            if kind == "disk" || kind == "loop" || kind == "mpath" {
                return Some(name.trim_start_matches("/dev/").to_string());
            }
        }
        None
    }

    fn lsblk_device(&self, path: &Path) -> Option<LsblkDevice> {
        let output = Command::new("lsblk")
            .args(["-J", "-b", "-O"])
            .arg(path)
            .output()
            .ok()?;
        if !output.status.success() {
            debug!("lsblk failed for {}", path.display());
            return None;
        }
        let parsed: LsblkOutput = serde_json::from_slice(&output.stdout).ok()?;
        parsed.blockdevices.into_iter().next()
    }
}

/// Parses `lsblk --pairs` output (`KEY="value" KEY="value" ...`) one line
/// per device, oldest lsblk-compatible format (matches
/// `split_lsblk_line`/`find_parent_devices` in the grounding file).
fn regex_pairs(text: &str) -> Vec<HashMap<String, String>> {
    let mut lines = Vec::new();
    for line in text.lines() {
        let mut fields = HashMap::new();
        let mut rest = line;
        while let Some(eq) = rest.find('=') {
            let key = rest[..eq].trim().to_string();
            rest = &rest[eq + 1..];
            let Some(quoted) = rest.strip_prefix('"') else {
                break;
            };
            let Some(end) = quoted.find('"') else {
                break;
            };
            fields.insert(key, quoted[..end].to_string());
            rest = &quoted[end + 1..];
        }
        if !fields.is_empty() {
            lines.push(fields);
        }
    }
    lines
}

impl DeviceResolver for LinuxDeviceResolver {
    fn resolve(&self, spec: &str) -> PathBuf {
        if let Some(label) = spec.strip_prefix("LABEL=") {
            let candidate = PathBuf::from("/dev/disk/by-label").join(label);
            if let Ok(real) = fs::canonicalize(&candidate) {
                return real;
            }
        }
        if let Some(uuid) = spec.strip_prefix("UUID=") {
            let candidate = PathBuf::from("/dev/disk/by-uuid").join(uuid);
            if let Ok(real) = fs::canonicalize(&candidate) {
                return real;
            }
        }
        match fs::canonicalize(spec) {
            Ok(real) => real,
            Err(e) => {
                warn!("could not resolve device {spec}: {e}");
                PathBuf::from(spec)
            }
        }
    }

    fn whole_disk_of(&self, path: &Path) -> Option<DiskId> {
        let name = self.whole_disk_name(path)?;
        let dev = self.lsblk_device(Path::new(&format!("/dev/{name}")))?;
        parse_maj_min(dev.maj_min.as_deref()?)
    }

    fn disk_name(&self, id: DiskId) -> Option<String> {
        for entry in fs::read_dir("/sys/class/block").ok()? {
            let entry = entry.ok()?;
            let dev_file = entry.path().join("dev");
            if let Ok(contents) = fs::read_to_string(&dev_file) {
                if parse_maj_min(contents.trim()) == Some(id) {
                    return entry.file_name().into_string().ok();
                }
            }
        }
        None
    }

    fn slaves_of(&self, id: DiskId) -> usize {
        let Some(name) = self.disk_name(id) else {
            return 0;
        };
        fs::read_dir(format!("/sys/class/block/{name}/slaves"))
            .map(|it| it.count())
            .unwrap_or(0)
    }

    fn rotational(&self, id: DiskId) -> bool {
        let Some(name) = self.disk_name(id) else {
            return false;
        };
        fs::read_to_string(format!("/sys/class/block/{name}/queue/rotational"))
            .map(|s| s.trim() == "1")
            .unwrap_or(false)
    }
}

/// Memoizes `whole_disk_id`/`is_stacked` on `entry` (spec.md §3: "derived
/// lazily and memoized on the entry"), resolving through `resolver` only the
/// first time this entry is looked at.
pub fn ensure_resolved(entry: &crate::types::MountEntry, resolver: &dyn DeviceResolver) {
    if entry.whole_disk_id().is_some() {
        return;
    }
    let Some(device) = entry.resolved_device() else {
        return;
    };
    match resolver.whole_disk_of(&device) {
        Some(id) => {
            entry.set_whole_disk_id(id);
            entry.set_is_stacked(resolver.slaves_of(id) > 0);
        }
        None => {
            entry.set_is_stacked(false);
        }
    }
}
