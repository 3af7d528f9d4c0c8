//! CLI configuration (spec.md §3 `GlobalState` policy flags; out of scope
//! per spec.md §1, but required for a runnable program).
//!
//! Mirrors the way the teacher's example harness builds a `clap::Parser`
//! struct and converts it into the library's own policy type: `CliArgs`
//! here plays the role `fuser::Config`/`examples/common/args.rs` plays for
//! the teacher, except `clap` is a normal dependency of this crate (its
//! whole external surface is a CLI) rather than a dev/example-only one.

use std::path::PathBuf;

use clap::Parser;

use crate::error::{Error, Result};
use crate::type_filter::TypeFilter;
use crate::types::Policy;

/// A parallel filesystem-check supervisor: schedules and runs
/// `fsck.<type>` helpers across a mount table.
#[derive(Debug, Parser)]
#[command(name = "pfsck", version, about)]
pub struct CliArgs {
    /// Check all filesystems mentioned in the mount table.
    #[arg(short = 'A', long)]
    pub all: bool,

    /// Filter by filesystem type/option selector (comma list of `type`,
    /// `notype`, `!type`, `opts=X`, `noopts=X`, or `loop`).
    #[arg(short = 't', long = "type")]
    pub type_selector: Option<String>,

    /// Don't actually execute the checks, just show what would be done.
    #[arg(short = 'N', long)]
    pub noexecute: bool,

    /// Run the checks serially, one at a time.
    #[arg(short = 's', long)]
    pub serialize: bool,

    /// Run all filesystems in parallel, ignoring spindle exclusion.
    #[arg(short = 'P', long = "force-all-parallel")]
    pub force_all_parallel: bool,

    /// Acquire an advisory per-disk lock before running each check.
    #[arg(short = 'l', long = "lock")]
    pub lock_disk: bool,

    /// Do not try to check mounted filesystems.
    #[arg(short = 'M', long)]
    pub ignore_mounted: bool,

    /// Check the root filesystem in parallel with the others.
    #[arg(long)]
    pub parallel_root: bool,

    /// Skip the root filesystem (assume a separate tool already checked it).
    #[arg(short = 'R', long)]
    pub skip_root: bool,

    /// Maximum number of filesystems to check concurrently (0 = uncapped).
    #[arg(short = 'r', long = "max-running", default_value_t = 0)]
    pub max_running: usize,

    /// File descriptor for ext[234] progress-bar output.
    #[arg(short = 'C', long = "progress-fd")]
    pub progress_fd: Option<i32>,

    /// Record per-instance statistics (device, exit code, rusage).
    #[arg(long = "stats-to", num_args = 0..=1, default_missing_value = "-")]
    pub stats_to: Option<String>,

    /// Override the system mount table.
    #[arg(short = 'T', long = "fstab")]
    pub fstab: Option<PathBuf>,

    /// Default filesystem type to assume when none can be determined.
    #[arg(long = "default-type", default_value = "ext2", hide = true)]
    pub default_type: String,

    /// Increase verbosity (may be repeated).
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Decrease verbosity.
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Arguments forwarded verbatim to every helper invocation.
    #[arg(last = true)]
    pub helper_args: Vec<String>,
}

impl CliArgs {
    /// Converts the parsed CLI into the policy struct `check_all` consumes.
    /// An unlimited-parallelism or a concurrency-cap environment variable
    /// overrides the corresponding CLI flag when set (spec.md §6
    /// "Environment inputs").
    pub fn to_policy(&self) -> Policy {
        let mut policy = Policy {
            serialize: self.serialize,
            force_all_parallel: self.force_all_parallel,
            lock_disk: self.lock_disk,
            ignore_mounted: self.ignore_mounted,
            parallel_root: self.parallel_root,
            skip_root: self.skip_root,
            noexecute: self.noexecute,
            progress_enabled: self.progress_fd.is_some(),
            progress_fd: self.progress_fd.unwrap_or(1),
            report_stats: self.stats_to.is_some(),
            max_running: self.max_running,
            default_type: self.default_type.clone(),
            ..Policy::default()
        };

        if std::env::var_os("FSCK_FORCE_ALL_PARALLEL").is_some() {
            policy.force_all_parallel = true;
        }
        if let Some(cap) = std::env::var("FSCK_MAX_INST")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            policy.max_running = cap;
        }

        policy
    }

    /// Compiles this run's `-t` selector, if any.
    pub fn compile_type_filter(&self) -> Result<TypeFilter> {
        match &self.type_selector {
            Some(selector) => TypeFilter::compile(selector),
            None => Ok(TypeFilter::accept_all()),
        }
    }

    /// The log filter level implied by `-v`/`-q`, used to seed `env_logger`
    /// when `RUST_LOG` isn't set.
    pub fn default_log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else {
            match self.verbose {
                0 => "warn",
                1 => "info",
                _ => "debug",
            }
        }
    }
}

impl TryFrom<&CliArgs> for TypeFilter {
    type Error = Error;

    fn try_from(args: &CliArgs) -> Result<TypeFilter> {
        args.compile_type_filter()
    }
}
