//! `GlobalState`: the supervisor's single process-wide state,
//! owned by `check_all` and threaded explicitly through every internal
//! call — the only other writer is the signal handler in
//! [`crate::signals`], which touches one atomic flag outside this struct.

use crate::disk::DeviceResolver;
use crate::mount_table::MountedTable;
use crate::prober::TypeProber;
use crate::stats::StatsSink;
use crate::types::{ExitStatus, Instance, Policy};

/// Everything the pass driver, scheduler, launcher and reaper share.
///
/// Holds trait objects for its collaborators, so it doesn't derive `Debug`.
#[allow(missing_debug_implementations)]
pub struct GlobalState {
    /// Live and just-completed helper instances.
    pub instances: Vec<Instance>,
    /// Policy flags this run was configured with.
    pub policy: Policy,
    /// Set after the first propagation of SIGTERM to all live instances,
    /// so propagation happens at most once per run.
    pub kill_sent: bool,
    /// The raw `-t` selector string, used only by [`crate::launcher`] to
    /// pick a fallback type.
    pub user_type_arg: Option<String>,
    /// Arguments forwarded verbatim to every helper invocation.
    pub extra_args: Vec<String>,
    /// The device-resolver collaborator.
    pub resolver: Box<dyn DeviceResolver>,
    /// The type-probing collaborator.
    pub prober: Box<dyn TypeProber>,
    /// The mounted-table collaborator, consulted when `ignore_mounted` is
    /// set.
    pub mounted: Box<dyn MountedTable>,
    /// Where completed-instance statistics go, if `report_stats` is set.
    pub stats: Box<dyn StatsSink>,
}

impl GlobalState {
    /// Number of instances not yet `DONE` (spec.md §3 `num_running`,
    /// computed rather than hand-maintained so it can never drift from the
    /// instance list it describes).
    pub fn num_running(&self) -> usize {
        self.instances.iter().filter(|i| !i.is_done()).count()
    }

    pub fn live_instances(&self) -> impl Iterator<Item = &Instance> {
        self.instances.iter().filter(|i| !i.is_done())
    }
}

/// Bitwise-ORs `status` into `total` (spec.md §4.9 "Aggregation", §8
/// property 4). A tiny free function rather than a method so call sites
/// that only have an `ExitStatus` accumulator (not a whole `GlobalState`)
/// can use it too.
pub fn accumulate(total: &mut ExitStatus, status: ExitStatus) {
    *total |= status;
}
