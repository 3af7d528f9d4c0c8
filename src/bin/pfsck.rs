//! CLI entry point: wires CLI parsing, logging, the mount-table/device/
//! prober collaborators, and the supervisor core together, the same split
//! `fuser-tests`' `main.rs` draws between argument parsing and library use:
//! this binary only turns flags into entries and a policy, the core never
//! touches `std::env` or `clap` itself.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::error;

use pfsck::config::CliArgs;
use pfsck::disk::LinuxDeviceResolver;
use pfsck::mount_table::{FstabSource, MountTableSource, ProcMounts};
use pfsck::pass_driver::check_all;
use pfsck::prober::MagicBytesProber;
use pfsck::signals;
use pfsck::stats;
use pfsck::state::GlobalState;

fn main() -> ExitCode {
    let args = CliArgs::parse();

    let mut builder = env_logger::Builder::new();
    builder.parse_filters(args.default_log_level());
    if let Ok(spec) = std::env::var("RUST_LOG") {
        builder.parse_filters(&spec);
    }
    builder.init();

    match run(&args) {
        Ok(status) => ExitCode::from((status.bits() & 0xff) as u8),
        Err(e) => {
            error!("{e}");
            // Usage/argument errors use the "usage or syntax error" bit
            // (16) as their process exit status, same as fsck(8) itself.
            ExitCode::from(16)
        }
    }
}

fn run(args: &CliArgs) -> pfsck::error::Result<pfsck::types::ExitStatus> {
    signals::install();

    let filter = args.compile_type_filter()?;
    let policy = args.to_policy();

    let table = match &args.fstab {
        Some(path) => FstabSource::new(path.clone()),
        None => FstabSource::system_default(),
    };
    let entries = table
        .entries()
        .map_err(pfsck::error::Error::MountTableUnreadable)?;

    let stats_sink = stats::from_cli(
        policy.report_stats,
        args.stats_to
            .as_deref()
            .filter(|s| *s != "-")
            .map(PathBuf::from),
    )?;

    let mut global = GlobalState {
        instances: Vec::new(),
        policy,
        kill_sent: false,
        user_type_arg: args.type_selector.clone(),
        extra_args: args.helper_args.clone(),
        resolver: Box::new(LinuxDeviceResolver),
        prober: Box::new(MagicBytesProber),
        mounted: Box::new(ProcMounts),
        stats: stats_sink,
    };

    Ok(check_all(&mut global, &entries, &filter))
}
