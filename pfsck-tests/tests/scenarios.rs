//! End-to-end scenarios from spec.md §8 (S1, S2, S4, S5, S6), driven against
//! real child processes (disposable shell-script `fsck.<type>` stand-ins)
//! the same way `fuser-tests` drives real mount/unmount syscalls against a
//! throwaway fixture.

use std::rc::Rc;
use std::sync::Mutex;
use std::time::Instant;

use anyhow::Result;
use pfsck::disk::DiskId;
use pfsck::pass_driver::check_all;
use pfsck::type_filter::TypeFilter;
use pfsck_tests::{entry_for, fake_global_state, write_fake_helper, FakeTopology};

/// `pfsck::signals` latches cancellation into a single process-global
/// atomic, and `cancel_requested()` is consulted by every `check_all` call
/// regardless of which test's `GlobalState` it's driving. Cargo runs
/// `#[test]` functions on a shared thread pool within one process, so
/// without serialization a cancellation test could flip the flag out from
/// under an unrelated scenario running concurrently. Every test here holds
/// this lock for its whole body.
static SERIAL: Mutex<()> = Mutex::new(());

fn serial_guard() -> std::sync::MutexGuard<'static, ()> {
    SERIAL.lock().unwrap_or_else(|e| e.into_inner())
}

/// S1: a single clean disk. One launch, final status 0.
#[test]
fn single_clean_disk() -> Result<()> {
    let _guard = serial_guard();
    let dir = tempfile::tempdir()?;
    write_fake_helper(dir.path(), "ext4", "exit 0");

    let topology = FakeTopology::new();
    let sda = DiskId { major: 8, minor: 1 };
    let (entry, device) = entry_for(dir.path(), "sda1", Some("/"), "ext4", 1);
    topology.register(&device, sda, false, false);

    let mut global = fake_global_state(topology);
    global.policy.helper_search_path = vec![dir.path().to_path_buf()];
    global.policy.parallel_root = true; // keep this scenario to a single pass

    let status = check_all(&mut global, &[entry], &TypeFilter::accept_all());
    assert!(status.is_empty(), "expected status 0, got {status:?}");
    Ok(())
}

/// S2: two partitions on the same disk never run concurrently; both
/// complete; final status 0.
#[test]
fn two_partitions_same_disk_run_sequentially() -> Result<()> {
    let _guard = serial_guard();
    let dir = tempfile::tempdir()?;
    let marker = dir.path().join("running");
    write_fake_helper(
        dir.path(),
        "ext4",
        &format!(
            "if [ -e {marker} ]; then exit 8; fi\n\
             touch {marker}\n\
             sleep 0.2\n\
             rm -f {marker}\n\
             exit 0",
            marker = marker.display()
        ),
    );

    let topology = FakeTopology::new();
    let sda = DiskId { major: 8, minor: 1 };
    let (e1, d1) = entry_for(dir.path(), "sda1", Some("/"), "ext4", 1);
    let (e2, d2) = entry_for(dir.path(), "sda2", Some("/home"), "ext4", 2);
    topology.register(&d1, sda, false, false);
    topology.register(&d2, sda, false, false);

    let mut global = fake_global_state(topology);
    global.policy.helper_search_path = vec![dir.path().to_path_buf()];
    global.policy.parallel_root = true;

    let status = check_all(&mut global, &[e1, e2], &TypeFilter::accept_all());
    assert!(
        status.is_empty(),
        "a concurrent second launch would have seen the marker and exited 8: {status:?}"
    );
    Ok(())
}

/// S4: three entries on three different disks with mixed exit codes
/// aggregate via bitwise OR.
#[test]
fn mixed_exit_codes_aggregate_with_bitwise_or() -> Result<()> {
    let _guard = serial_guard();
    let dir = tempfile::tempdir()?;
    write_fake_helper(dir.path(), "ext2", "exit 0");
    write_fake_helper(dir.path(), "ext3", "exit 1");
    write_fake_helper(dir.path(), "ext4", "exit 4");

    let topology = FakeTopology::new();
    let (e1, d1) = entry_for(dir.path(), "sda1", Some("/"), "ext2", 1);
    let (e2, d2) = entry_for(dir.path(), "sdb1", Some("/a"), "ext3", 1);
    let (e3, d3) = entry_for(dir.path(), "sdc1", Some("/b"), "ext4", 1);
    topology.register(&d1, DiskId { major: 8, minor: 1 }, false, false);
    topology.register(&d2, DiskId { major: 8, minor: 17 }, false, false);
    topology.register(&d3, DiskId { major: 8, minor: 33 }, false, false);

    let mut global = fake_global_state(topology);
    global.policy.helper_search_path = vec![dir.path().to_path_buf()];
    global.policy.parallel_root = true;

    let status = check_all(&mut global, &[e1, e2, e3], &TypeFilter::accept_all());
    assert_eq!(status.bits(), 0 | 1 | 4);
    Ok(())
}

/// S6: a stacked device reserves the whole supervisor while it runs; an
/// unrelated disk's launch is deferred until it finishes.
#[test]
fn stacked_device_excludes_unrelated_disk() -> Result<()> {
    let _guard = serial_guard();
    let dir = tempfile::tempdir()?;
    let order_log = dir.path().join("order.log");
    write_fake_helper(
        dir.path(),
        "ext4",
        &format!(
            "sleep 0.3\n\
             echo $$ >> {log}\n\
             exit 0",
            log = order_log.display()
        ),
    );

    let topology = FakeTopology::new();
    let md0 = DiskId { major: 9, minor: 0 };
    let sdc = DiskId { major: 8, minor: 33 };
    let (stacked, d_stacked) = entry_for(dir.path(), "md0", Some("/"), "ext4", 1);
    let (plain, d_plain) = entry_for(dir.path(), "sdc1", Some("/x"), "ext4", 1);
    topology.register(&d_stacked, md0, true, false);
    topology.register(&d_plain, sdc, false, false);

    let mut global = fake_global_state(topology);
    global.policy.helper_search_path = vec![dir.path().to_path_buf()];
    global.policy.parallel_root = true;

    let start = Instant::now();
    let status = check_all(&mut global, &[stacked, plain], &TypeFilter::accept_all());
    let elapsed = start.elapsed();

    assert!(status.is_empty());
    // Both helpers sleep 0.3s; if they ran sequentially (as the stacked
    // exclusion requires) the whole run takes close to 0.6s, not ~0.3s.
    assert!(
        elapsed.as_secs_f64() > 0.5,
        "expected sequential execution behind the stacked device, took {elapsed:?}"
    );
    Ok(())
}

/// A root-priority entry finishes before a non-root entry launches, unless
/// `parallel_root` is set.
#[test]
fn root_runs_before_other_entries() -> Result<()> {
    let _guard = serial_guard();
    let dir = tempfile::tempdir()?;
    let log = dir.path().join("order.log");
    write_fake_helper(
        dir.path(),
        "ext4",
        &format!("echo $(basename $0) $1 >> {log}\nexit 0", log = log.display()),
    );

    let topology = FakeTopology::new();
    let (root, d_root) = entry_for(dir.path(), "sda1", Some("/"), "ext4", 1);
    let (other, d_other) = entry_for(dir.path(), "sdb1", Some("/data"), "ext4", 1);
    topology.register(&d_root, DiskId { major: 8, minor: 1 }, false, false);
    topology.register(&d_other, DiskId { major: 8, minor: 17 }, false, false);

    let mut global = fake_global_state(topology);
    global.policy.helper_search_path = vec![dir.path().to_path_buf()];
    // parallel_root defaults to false: root must run first.

    let status = check_all(&mut global, &[Rc::clone(&root), other], &TypeFilter::accept_all());
    assert!(status.is_empty());

    let recorded = std::fs::read_to_string(&log)?;
    let first_line = recorded.lines().next().unwrap();
    assert!(
        first_line.contains(&root.resolved_device().unwrap().to_string_lossy().to_string())
            || first_line.contains("sda1"),
        "expected root's device to appear first in {recorded:?}"
    );
    Ok(())
}

/// S5: cancellation mid-run. Two entries on two different disks are
/// launched and are still running when SIGINT arrives. Each live helper
/// must receive SIGTERM exactly once; a helper that turns that into its own
/// SIGINT death scores `UNCORRECTED`; the supervisor waits for every child
/// before returning; the final status carries `CANCELED`.
///
/// The signal is delivered with `pthread_kill` against the test thread's
/// own id, not `kill`/`raise`, so it's guaranteed to land on — and
/// interrupt the blocking `wait4` in — this thread rather than some other
/// idle thread in cargo's test-runner pool.
#[test]
fn cancellation_interrupts_and_drains_all_children() -> Result<()> {
    let _guard = serial_guard();
    pfsck::signals::reset_for_test();
    pfsck::signals::install();

    let dir = tempfile::tempdir()?;
    let term_log = dir.path().join("term.log");
    write_fake_helper(
        dir.path(),
        "ext4",
        &format!(
            "trap 'echo $$ >> {log}; kill -INT $$' TERM\n\
             sleep 5",
            log = term_log.display()
        ),
    );

    let topology = FakeTopology::new();
    let (e1, d1) = entry_for(dir.path(), "sda1", Some("/a"), "ext4", 1);
    let (e2, d2) = entry_for(dir.path(), "sdb1", Some("/b"), "ext4", 1);
    topology.register(&d1, DiskId { major: 8, minor: 1 }, false, false);
    topology.register(&d2, DiskId { major: 8, minor: 17 }, false, false);

    let mut global = fake_global_state(topology);
    global.policy.helper_search_path = vec![dir.path().to_path_buf()];
    global.policy.parallel_root = true;

    let this_thread = nix::sys::pthread::pthread_self();
    let canceller = std::thread::spawn(move || {
        std::thread::sleep(std::time::Duration::from_millis(200));
        nix::sys::pthread::pthread_kill(this_thread, nix::sys::signal::Signal::SIGINT)
            .expect("failed to deliver SIGINT to the waiting thread");
    });

    let status = check_all(&mut global, &[e1, e2], &TypeFilter::accept_all());
    canceller.join().unwrap();
    pfsck::signals::reset_for_test();

    assert!(
        status.contains(pfsck::ExitStatus::CANCELED),
        "expected CANCELED in the aggregate: {status:?}"
    );
    assert!(
        status.contains(pfsck::ExitStatus::UNCORRECTED),
        "expected UNCORRECTED from a helper that died via SIGINT: {status:?}"
    );

    let terms = std::fs::read_to_string(&term_log)?;
    assert_eq!(
        terms.lines().count(),
        2,
        "each of the two live helpers must receive SIGTERM exactly once: {terms:?}"
    );
    Ok(())
}
