//! Pass driver: iterates the mount table in ascending
//! pass-number order, launching eligible entries under the scheduler and
//! concurrency constraints, synchronizing between passes, and finally
//! aggregating every observed exit code.

use std::rc::Rc;

use log::debug;

use crate::classifier;
use crate::disk;
use crate::launcher::{self, LaunchOutcome};
use crate::reaper::{self, WaitMode};
use crate::scheduler;
use crate::signals;
use crate::state::GlobalState;
use crate::type_filter::TypeFilter;
use crate::types::{ExitStatus, MountEntry};

/// Runs the whole supervised check: classifies every entry, runs the root
/// stage (unless `parallel_root`), then the ascending pass loop, then
/// drains any remaining cancellation. Returns the bitwise-OR'd aggregate
/// status.
pub fn check_all(global: &mut GlobalState, entries: &[Rc<MountEntry>], filter: &TypeFilter) -> ExitStatus {
    let mut total = ExitStatus::empty();

    // Step 1: first sweep, classify every entry up front. The classifier
    // resolves (and memoizes) each entry's device path as a side effect of
    // its existence check, so the disk-identity resolution that the
    // scheduler depends on only runs afterward.
    for entry in entries {
        if classifier::is_ignored(entry, filter, global.resolver.as_ref(), global.prober.as_ref(), &global.policy) {
            entry.mark_done();
        } else {
            disk::ensure_resolved(entry, global.resolver.as_ref());
        }
    }

    // Step 2: root stage.
    if !global.policy.parallel_root {
        if let Some(root) = entries.iter().find(|e| e.target.as_deref() == Some(std::path::Path::new("/"))) {
            if !root.is_done() {
                let mounted = global.policy.ignore_mounted && global.mounted.is_mounted(&root.source_spec);
                if !mounted {
                    if launch_one(global, root) {
                        total |= ExitStatus::OPERATIONAL;
                    }
                    root.mark_done();
                    let status = reaper::wait_many(global, WaitMode::All);
                    total |= status;
                    if status.exceeds_nondestruct() {
                        return total;
                    }
                }
            }
        }
    }

    // Step 3: skip_root marks every "/" entry done without running it.
    if global.policy.skip_root {
        for entry in entries {
            if entry.target.as_deref() == Some(std::path::Path::new("/")) {
                entry.mark_done();
            }
        }
    }

    // Step 4: ascending pass loop. `blocked_by_later_pass` and
    // `blocked_by_scheduler` are kept separate (spec.md §4.9 step 4 names
    // them as distinct reasons a scan leaves work behind): an entry whose
    // own pass_no is higher than the current pass is simply not in scope
    // yet, but an entry held back by same-spindle exclusion *is* in scope
    // and must be retried at the *same* pass_no next round. Conflating the
    // two would let pass_no advance while a same-pass entry still sits
    // behind spindle contention, so a higher-pass entry could launch
    // before that lower-pass entry ever runs — violating the ascending
    // pass-order guarantee.
    let mut pass_no = 1u32;
    loop {
        if signals::cancel_requested() {
            break;
        }
        let mut blocked_by_later_pass = false;
        let mut blocked_by_scheduler = false;
        let mut interrupted_for_concurrency = false;

        for entry in entries {
            if signals::cancel_requested() {
                break;
            }
            if entry.is_done() {
                continue;
            }
            if entry.pass_no > pass_no {
                blocked_by_later_pass = true;
                continue;
            }
            if global.policy.ignore_mounted && global.mounted.is_mounted(&entry.source_spec) {
                entry.mark_done();
                continue;
            }
            let live_entries: Vec<&MountEntry> =
                global.live_instances().map(|i| i.entry.as_ref()).collect();
            if scheduler::disk_already_active(entry, live_entries.into_iter(), &global.policy) {
                blocked_by_scheduler = true;
                continue;
            }

            let failed = launch_one(global, entry);
            entry.mark_done();
            if failed {
                total |= ExitStatus::OPERATIONAL;
            }

            if scheduler::at_concurrency_cap(global.num_running(), &global.policy) {
                interrupted_for_concurrency = true;
                break;
            }
        }

        let status = if interrupted_for_concurrency {
            reaper::wait_many(global, WaitMode::AtLeastOne)
        } else {
            reaper::wait_many(global, WaitMode::All)
        };
        total |= status;

        if !blocked_by_later_pass && !blocked_by_scheduler && !interrupted_for_concurrency {
            break;
        }
        // Only advance to the next pass once nothing in the current pass
        // remains blocked purely by spindle exclusion or by an
        // interrupted scan (both mean this pass isn't finished yet); a
        // pending higher-pass entry never gates the advance on its own.
        if !interrupted_for_concurrency && !blocked_by_scheduler {
            pass_no += 1;
        }
    }

    // Step 5: drain on cancellation.
    if signals::cancel_requested() {
        total |= ExitStatus::CANCELED;
        let status = reaper::wait_many(global, WaitMode::All);
        total |= status;
    }

    total
}

/// Launches `entry`, returning `true` iff the launch failed in a way that
/// must be folded into the aggregate (spec.md §4.9 "OR the launch-failure
/// status into the running total").
fn launch_one(global: &mut GlobalState, entry: &Rc<MountEntry>) -> bool {
    debug!("launching {}", entry.source_spec);
    let outcome = launcher::execute(
        entry,
        global.user_type_arg.as_deref(),
        &global.policy,
        global.resolver.as_ref(),
        &mut global.instances,
        false,
        &global.extra_args,
    );
    matches!(outcome, LaunchOutcome::Failed)
}
