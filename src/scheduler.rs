//! Spindle scheduler: decides whether launching a helper for
//! a candidate entry right now would violate the same-spindle exclusion
//! rule, the stacked-device rule, or the serialize policy.

use crate::types::{MountEntry, Policy};

/// `true` iff launching a helper for `entry` now would violate the
/// concurrency policy. `live` is the set of entries backing
/// currently-running (`!DONE`) instances.
pub fn disk_already_active<'a>(
    entry: &MountEntry,
    live: impl Iterator<Item = &'a MountEntry> + Clone,
    policy: &Policy,
) -> bool {
    if policy.force_all_parallel {
        return false;
    }

    if live.clone().any(|e| e.is_stacked().unwrap_or(false)) {
        return true;
    }

    if entry.is_stacked().unwrap_or(false) || entry.whole_disk_id().is_none() {
        return live.clone().next().is_some();
    }

    let disk = entry.whole_disk_id();
    live.clone().any(|e| e.whole_disk_id() == disk)
}

/// `true` iff the pass driver's concurrency cap (`-t`-independent
/// `max_running`, or the `serialize` flag forcing one-at-a-time) would be
/// exceeded by adding one more running instance.
pub fn at_concurrency_cap(num_running: usize, policy: &Policy) -> bool {
    if policy.serialize {
        return num_running >= 1;
    }
    policy.max_running != 0 && num_running >= policy.max_running
}
