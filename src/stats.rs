//! Statistics sink: one line per completed instance,
//! emitted only when `report_stats` is set.
//!
//! Format: `<device> <exit_code> <max_rss_kb> <wall_sec>.<wall_usec>
//! <user_sec>.<user_usec> <sys_sec>.<sys_usec>`.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::types::{Instance, ResourceUsage};

/// Where completed-instance statistics records go.
pub trait StatsSink {
    fn record(&mut self, device: &str, exit_code: u32, usage: &ResourceUsage);
}

fn format_record(device: &str, exit_code: u32, usage: &ResourceUsage) -> String {
    format!(
        "{device} {exit_code} {} {}.{:06} {}.{:06} {}.{:06}",
        usage.max_rss_kb,
        usage.wall.as_secs(),
        usage.wall.subsec_micros(),
        usage.user.as_secs(),
        usage.user.subsec_micros(),
        usage.system.as_secs(),
        usage.system.subsec_micros(),
    )
}

/// Writes each record to stdout (the default when `-s` has no argument).
#[derive(Debug, Default)]
pub struct StdoutStats;

impl StatsSink for StdoutStats {
    fn record(&mut self, device: &str, exit_code: u32, usage: &ResourceUsage) {
        println!("{}", format_record(device, exit_code, usage));
    }
}

/// Writes each record to an arbitrary [`Write`] destination (e.g. a file
/// selected by `-s <path>`).
pub struct WriterStats<W: Write> {
    writer: W,
}

impl<W: Write> WriterStats<W> {
    pub fn new(writer: W) -> Self {
        WriterStats { writer }
    }
}

impl WriterStats<File> {
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(WriterStats::new(File::create(path)?))
    }
}

impl<W: Write> StatsSink for WriterStats<W> {
    fn record(&mut self, device: &str, exit_code: u32, usage: &ResourceUsage) {
        let _ = writeln!(self.writer, "{}", format_record(device, exit_code, usage));
    }
}

/// A no-op sink used when `report_stats` is off.
#[derive(Debug, Default)]
pub struct NullStats;

impl StatsSink for NullStats {
    fn record(&mut self, _device: &str, _exit_code: u32, _usage: &ResourceUsage) {}
}

/// Builds a sink from the `-s`/`--stats-to` CLI value: `None` means
/// disabled, `Some(None)` means stdout, `Some(Some(path))` means that file.
pub fn from_cli(enabled: bool, path: Option<PathBuf>) -> io::Result<Box<dyn StatsSink>> {
    if !enabled {
        return Ok(Box::new(NullStats));
    }
    match path {
        None => Ok(Box::new(StdoutStats)),
        Some(p) => Ok(Box::new(WriterStats::create(p)?)),
    }
}

/// Records `instance`'s usage through `sink`, once it's `DONE` (spec.md
/// §4.7 step 6).
pub fn emit(sink: &mut dyn StatsSink, instance: &Instance) {
    let Some(usage) = instance.resource_usage else {
        return;
    };
    let exit_code = instance.exit_code.map(|e| e.bits()).unwrap_or(0);
    let device = instance
        .entry
        .resolved_device()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|| instance.entry.source_spec.clone());
    sink.record(&device, exit_code, &usage);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn formats_record_fields_in_order() {
        let usage = ResourceUsage {
            wall: Duration::new(2, 500_000),
            user: Duration::new(1, 0),
            system: Duration::new(0, 250_000),
            max_rss_kb: 4096,
        };
        let line = format_record("/dev/sda1", 0, &usage);
        assert_eq!(line, "/dev/sda1 0 4096 2.000500 1.000000 0.000250");
    }
}
