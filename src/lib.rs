//! Parallel filesystem-check supervisor.
//!
//! A scheduler and executor for per-filesystem check helpers
//! (`fsck.<type>`) across the block devices declared in a system mount
//! table. The core is a single-threaded, cooperative state machine: it
//! launches and reaps child processes while enforcing a passno-ordered
//! staged execution model, a same-spindle exclusion rule, cooperative
//! inter-process advisory locking, progress-bar hand-off among helpers that
//! support it, and cancellation propagation on user interrupt — then
//! aggregates every helper's exit status with bitwise OR.
//!
//! This crate does not itself read or repair any filesystem; all real work
//! is delegated to external `fsck.<type>` helper programs. The mount-table
//! parser, device resolver and filesystem-type prober are modeled as
//! traits ([`mount_table::MountTableSource`], [`disk::DeviceResolver`],
//! [`prober::TypeProber`]) with a runnable Linux default implementation
//! each, so the crate is usable standalone; callers that already have
//! better collaborators for these (a system's own mount database, a real
//! `libblkid` binding) can substitute their own.

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod classifier;
pub mod config;
pub mod disk;
pub mod error;
pub mod launcher;
pub mod locker;
pub mod mount_table;
pub mod pass_driver;
pub mod prober;
pub mod reaper;
pub mod scheduler;
pub mod signals;
pub mod state;
pub mod stats;
pub mod type_filter;
pub mod types;

pub use crate::error::{Error, Result};
pub use crate::pass_driver::check_all;
pub use crate::state::GlobalState;
pub use crate::type_filter::TypeFilter;
pub use crate::types::{ExitStatus, Instance, MountEntry, Policy};
