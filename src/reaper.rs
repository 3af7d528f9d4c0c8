//! Child reaper: waits for helper exits, normalizes their
//! wait-status into an [`ExitStatus`], maintains the live instance list,
//! and drives progress-bar hand-off.

use std::mem::MaybeUninit;
use std::process::Command;
use std::time::{Duration, Instant};

use log::{debug, warn};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

use crate::signals;
use crate::state::GlobalState;
use crate::stats;
use crate::types::{ExitStatus, Instance, InstanceFlags, ResourceUsage, is_progress_capable};

/// Whether to keep reaping until the live list is empty, or stop after the
/// first successful reap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitMode {
    All,
    AtLeastOne,
}

fn decode_status(status: i32) -> ExitStatus {
    let wifexited = status & 0x7f == 0;
    if wifexited {
        let code = (status >> 8) & 0xff;
        return normalize_exit_code(code as u32);
    }
    let wifsignaled = ((((status & 0x7f) + 1) as i8) >> 1) > 0;
    if wifsignaled {
        let sig = status & 0x7f;
        if sig == Signal::SIGINT as i32 {
            return ExitStatus::UNCORRECTED;
        }
        let name = Signal::try_from(sig)
            .map(|s| s.to_string())
            .unwrap_or_else(|_| sig.to_string());
        warn!("helper terminated by signal {name}");
        return ExitStatus::OPERATIONAL;
    }
    warn!("helper wait-status {status} should never happen");
    ExitStatus::OPERATIONAL
}

/// Maps a raw helper exit code onto the normalized `fsck(8)` bit taxonomy.
/// Helpers are expected to already return values in this
/// convention; anything outside the known bits is folded into
/// `OPERATIONAL` so it still shows up in the aggregate.
fn normalize_exit_code(code: u32) -> ExitStatus {
    ExitStatus::from_bits(code).unwrap_or(ExitStatus::OPERATIONAL)
}

fn usage_from_rusage(start: Instant, rusage: &libc::rusage) -> ResourceUsage {
    ResourceUsage {
        wall: start.elapsed(),
        user: Duration::new(rusage.ru_utime.tv_sec as u64, (rusage.ru_utime.tv_usec * 1000) as u32),
        system: Duration::new(rusage.ru_stime.tv_sec as u64, (rusage.ru_stime.tv_usec * 1000) as u32),
        max_rss_kb: rusage.ru_maxrss as i64,
    }
}

/// Sends SIGTERM to every live instance, idempotently (spec.md §4.7 step 1,
/// §4.8).
fn propagate_cancellation(global: &mut GlobalState) {
    if global.kill_sent {
        return;
    }
    for instance in global.instances.iter().filter(|i| !i.is_done()) {
        if let Some(pid) = instance.pid {
            debug!("sending SIGTERM to pid {pid}");
            let _ = signal::kill(pid, Signal::SIGTERM);
        }
    }
    global.kill_sent = true;
}

/// Picks the next instance to own the progress bar and sends it the
/// hand-off signal. Helpers younger than ~2 seconds
/// get a ~1 second deferred signal via a short-lived `sh -c sleep` helper
/// so their SIGUSR1 handler has time to install (spec.md §9 design note:
/// this deferral mechanism is a pragmatic tolerance, not load-bearing for
/// correctness, and may be swapped for any equivalent timer).
fn hand_off_progress(global: &mut GlobalState) {
    if global.live_instances().any(|i| i.has_progress()) {
        return;
    }
    let Some(idx) = global
        .instances
        .iter()
        .position(|i| !i.is_done() && is_progress_capable(&i.fs_type))
    else {
        return;
    };
    let Some(pid) = global.instances[idx].pid else {
        return;
    };
    let young = global.instances[idx].start_time.elapsed() < Duration::from_secs(2);
    if young {
        let _ = Command::new("sh")
            .arg("-c")
            .arg(format!("sleep 1; kill -USR1 {pid}"))
            .spawn();
    } else {
        let _ = signal::kill(pid, Signal::SIGUSR1);
    }
    global.instances[idx].flags |= InstanceFlags::PROGRESS;
}

/// Waits for at most one live instance to complete. In `nonblocking` mode,
/// returns `None` immediately if none is ready yet. Returns the completed,
/// already-removed instance otherwise.
pub fn wait_one(global: &mut GlobalState, nonblocking: bool) -> Option<Instance> {
    loop {
        if signals::cancel_requested() {
            propagate_cancellation(global);
        }
        if global.instances.iter().all(|i| i.is_done()) {
            return None;
        }

        let mut status: i32 = 0;
        let mut rusage = MaybeUninit::<libc::rusage>::zeroed();
        let flags = if nonblocking { libc::WNOHANG } else { 0 };
        // SAFETY: `status`/`rusage` are valid, appropriately-sized
        // out-params for `wait4`; `-1` waits for any child of this process.
        let pid = unsafe { libc::wait4(-1, &mut status, flags, rusage.as_mut_ptr()) };
        if pid == 0 {
            return None; // nonblocking, nothing ready yet
        }
        if pid < 0 {
            let errno = std::io::Error::last_os_error();
            match errno.raw_os_error() {
                Some(libc::ECHILD) => return None,
                // Our own SIGINT/SIGTERM handler (no SA_RESTART) interrupted
                // a blocking wait4; re-check cancellation and retry rather
                // than abandoning children still unreaped.
                Some(libc::EINTR) => continue,
                _ => {
                    warn!("wait4 failed: {errno}");
                    return None;
                }
            }
        }
        let rusage = unsafe { rusage.assume_init() };

        let Some(idx) = global
            .instances
            .iter()
            .position(|i| i.pid == Some(Pid::from_raw(pid)))
        else {
            // Not one of ours (e.g. the deferred progress-signal helper).
            continue;
        };

        let exit_code = decode_status(status);
        let instance = &mut global.instances[idx];
        instance.flags |= InstanceFlags::DONE;
        instance.end_time = Some(Instant::now());
        instance.exit_code = Some(exit_code);
        instance.resource_usage = Some(usage_from_rusage(instance.start_time, &rusage));
        instance.lock = None; // dropping releases the flock

        let had_progress = instance.has_progress();
        if had_progress {
            global.instances[idx].flags.remove(InstanceFlags::PROGRESS);
        }

        debug!(
            "reaped {} for {} (exit {:?})",
            global.instances[idx].program_name,
            global.instances[idx].entry.source_spec,
            global.instances[idx].exit_code
        );

        if global.policy.report_stats {
            stats::emit(global.stats.as_mut(), &global.instances[idx]);
        }
        if had_progress {
            hand_off_progress(global);
        }

        let instance = global.instances.remove(idx);
        return Some(instance);
    }
}

/// Reaps until the live list is empty (`All`) or one completion has been
/// observed and nothing more is immediately ready (`AtLeastOne`). Returns
/// the bitwise OR of every normalized exit code seen.
pub fn wait_many(global: &mut GlobalState, mode: WaitMode) -> ExitStatus {
    let mut total = ExitStatus::empty();
    match mode {
        WaitMode::All => {
            while let Some(instance) = wait_one(global, false) {
                if let Some(code) = instance.exit_code {
                    total |= code;
                }
            }
        }
        WaitMode::AtLeastOne => {
            if let Some(instance) = wait_one(global, false) {
                if let Some(code) = instance.exit_code {
                    total |= code;
                }
                while let Some(instance) = wait_one(global, true) {
                    if let Some(code) = instance.exit_code {
                        total |= code;
                    }
                }
            }
        }
    }
    total
}
