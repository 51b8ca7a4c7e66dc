//! Integration tests for the recorder
//!
//! These drive session control and the event pipeline end to end against
//! in-memory kernel, cluster and host implementations.

mod common;

use bpfrecorder::btf::{BtfKey, BtfTable};
use std::time::{Duration, Instant};

use bpfrecorder::RecorderError;
use common::{container_id, FakeHost, Harness};

// x86_64 syscall numbers
const READ: usize = 0;
const WRITE: usize = 1;
const OPEN: usize = 2;
const CLOSE: usize = 3;
const MMAP: usize = 9;
const EXECVE: usize = 59;
// Unassigned on x86_64, between rseq and io_uring_setup.
const UNASSIGNED: usize = 335;

/// Loads happen only on 0→1 and unloads only on 1→0
#[tokio::test]
async fn test_start_stop_reference_counting() {
    let h = Harness::new();

    h.recorder.start().await.unwrap();
    h.recorder.start().await.unwrap();
    h.recorder.start().await.unwrap();
    assert_eq!(h.backend.loads(), 1);
    assert_eq!(h.recorder.session_count(), 3);

    h.recorder.stop().await;
    h.recorder.stop().await;
    assert_eq!(h.backend.unloads(), 0);
    assert!(h.recorder.is_loaded().await);

    h.recorder.stop().await;
    assert_eq!(h.backend.unloads(), 1);
    assert!(!h.recorder.is_loaded().await);
    assert!(h.backend.program().is_closed());

    // Stop below zero is a no-op.
    h.recorder.stop().await;
    assert_eq!(h.backend.unloads(), 1);
    assert_eq!(h.recorder.session_count(), 0);

    h.recorder.start().await.unwrap();
    assert_eq!(h.backend.loads(), 2);
    h.recorder.shutdown().await;
}

/// Concurrent start and stop calls never double-load or double-unload
#[tokio::test]
async fn test_concurrent_start_stop() {
    let h = Harness::new();

    let starts = (0..16).map(|_| h.recorder.start());
    for result in futures_util::future::join_all(starts).await {
        result.unwrap();
    }
    assert_eq!(h.backend.loads(), 1);
    assert_eq!(h.recorder.session_count(), 16);

    futures_util::future::join_all((0..16).map(|_| h.recorder.stop())).await;
    assert_eq!(h.backend.unloads(), 1);
    assert_eq!(h.recorder.session_count(), 0);
}

/// A failed load leaves the session count untouched
#[tokio::test]
async fn test_failed_load_keeps_count() {
    let h = Harness::new();
    h.backend.set_failing(true);

    let err = h.recorder.start().await.unwrap_err();
    assert!(matches!(err, RecorderError::Bpf(_)));
    assert_eq!(h.recorder.session_count(), 0);
    assert!(!h.recorder.is_loaded().await);

    h.backend.set_failing(false);
    h.recorder.start().await.unwrap();
    assert_eq!(h.recorder.session_count(), 1);
    assert_eq!(h.backend.loads(), 1);
    h.recorder.shutdown().await;
}

/// The end-to-end scenario: record, extract once, then "no PID found"
#[tokio::test]
async fn test_profile_is_extracted_exactly_once() {
    let h = Harness::new();
    let id = container_id("abcd1234");
    h.host.place(100, &id);
    h.pods.add("app", &id, Some("foo"));

    h.recorder.start().await.unwrap();
    let program = h.backend.program();
    program.run_process(100, "app", &[OPEN, READ]);
    program.announce(100).await;
    h.wait_for_profile("foo").await;

    let syscalls = h.recorder.syscalls_for_profile("foo").await.unwrap();
    assert_eq!(syscalls, vec!["open", "read"]);
    assert_eq!(program.removed(), vec![100]);

    let err = h.recorder.syscalls_for_profile("foo").await.unwrap_err();
    assert!(matches!(err, RecorderError::NoPidFound));
    assert_eq!(err.to_string(), "no PID found for container");

    h.recorder.stop().await;
}

#[tokio::test]
async fn test_not_running() {
    let h = Harness::new();
    let err = h.recorder.syscalls_for_profile("foo").await.unwrap_err();
    assert!(matches!(err, RecorderError::NotRunning));
    assert_eq!(err.to_string(), "bpf recorder not running");
}

/// Infrastructure processes never contribute syscalls
#[tokio::test]
async fn test_excluded_commands_are_filtered() {
    let h = Harness::new();
    let app = container_id("aaaa0001");
    let monitor = container_id("bbbb0002");
    h.host.place(100, &app);
    h.host.place(200, &monitor);
    h.pods.add("app", &app, Some("foo"));
    h.pods.add("monitor", &monitor, Some("foo"));

    h.recorder.start().await.unwrap();
    let program = h.backend.program();
    program.run_process(100, "app", &[READ]);
    program.run_process(200, "conmon", &[EXECVE, MMAP]);
    program.announce(200).await;
    program.announce(100).await;

    h.wait_for_records("foo", 2).await;
    let syscalls = h.recorder.syscalls_for_profile("foo").await.unwrap();
    assert_eq!(syscalls, vec!["read"]);

    // Excluded processes are still cleaned up.
    let mut removed = program.removed();
    removed.sort_unstable();
    assert_eq!(removed, vec![100, 200]);
    h.recorder.shutdown().await;
}

/// Overlapping syscalls of several processes come back sorted and unique
#[tokio::test]
async fn test_result_is_sorted_and_unique() {
    let h = Harness::new();
    let id = container_id("cafe0003");
    h.host.place(100, &id);
    h.host.place(101, &id);
    h.pods.add("app", &id, Some("foo"));

    h.recorder.start().await.unwrap();
    let program = h.backend.program();
    program.run_process(100, "app", &[WRITE, READ, CLOSE]);
    program.run_process(101, "app", &[CLOSE, MMAP, READ]);
    program.announce(100).await;
    h.wait_for_profile("foo").await;

    // The pending association was consumed by pid 100; the next process of
    // the same container triggers a fresh search.
    program.announce(101).await;
    h.wait_for_records("foo", 2).await;
    assert_eq!(h.pods.calls(), 2);

    let syscalls = h.recorder.syscalls_for_profile("foo").await.unwrap();
    assert_eq!(syscalls, vec!["close", "mmap", "read", "write"]);
    h.recorder.shutdown().await;
}

/// A container that never shows up in the cluster leaves no state behind
#[tokio::test]
async fn test_search_timeout_leaks_nothing() {
    let h = Harness::new();
    let ghost = container_id("dead0004");
    let app = container_id("beef0005");
    h.host.place(300, &ghost);
    h.host.place(100, &app);
    h.pods.add("app", &app, Some("foo"));

    h.recorder.start().await.unwrap();
    let program = h.backend.program();
    program.run_process(300, "ghost", &[READ]);
    program.run_process(100, "app", &[WRITE]);
    program.announce(300).await;
    program.announce(100).await;
    h.wait_for_profile("foo").await;

    assert_eq!(h.recorder.store().pending_len(), 0);
    assert_eq!(h.recorder.store().profile_len(), 1);
    assert_eq!(h.recorder.syscalls_for_profile("foo").await.unwrap(), vec!["write"]);
    h.recorder.shutdown().await;
}

/// Stop does not wait for queued events whose containers are never found
#[tokio::test]
async fn test_stop_is_prompt_with_unresolved_backlog() {
    let h = Harness::new();
    let ghost = container_id("0bad0007");
    for pid in 300..310 {
        h.host.place(pid, &ghost);
    }

    h.recorder.start().await.unwrap();
    let program = h.backend.program();
    for pid in 300..310 {
        program.announce(pid).await;
    }

    let started = Instant::now();
    h.recorder.stop().await;
    // One full search alone takes 300ms.
    assert!(started.elapsed() < Duration::from_millis(250), "stop took {:?}", started.elapsed());
    assert!(program.is_closed());

    let calls = h.pods.calls();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.pods.calls(), calls);
}

/// Events still queued at stop never reach the next session
#[tokio::test]
async fn test_queued_events_do_not_survive_stop() {
    let h = Harness::new();
    let ghost = container_id("dead0008");
    let app = container_id("beef0009");
    h.host.place(300, &ghost);
    h.host.place(100, &app);
    h.pods.add("app", &app, Some("foo"));

    h.recorder.start().await.unwrap();
    let program = h.backend.program();
    program.run_process(100, "app", &[READ]);
    // pid 100 waits behind the search for the ghost container.
    program.announce(300).await;
    program.announce(100).await;
    h.recorder.stop().await;

    assert_eq!(h.recorder.store().record_count("foo"), 0);

    h.recorder.start().await.unwrap();
    let err = h.recorder.syscalls_for_profile("foo").await.unwrap_err();
    assert!(matches!(err, RecorderError::NoPidFound));
    h.recorder.shutdown().await;
}

/// A recorded process without a bitset contributes nothing
#[tokio::test]
async fn test_process_without_bitset_is_skipped() {
    let h = Harness::new();
    let id = container_id("abba0010");
    h.host.place(100, &id);
    h.host.place(101, &id);
    h.pods.add("app", &id, Some("foo"));

    h.recorder.start().await.unwrap();
    let program = h.backend.program();
    program.run_process(101, "app", &[WRITE]);
    program.announce(100).await;
    h.wait_for_profile("foo").await;
    program.announce(101).await;
    h.wait_for_records("foo", 2).await;

    let syscalls = h.recorder.syscalls_for_profile("foo").await.unwrap();
    assert_eq!(syscalls, vec!["write"]);
    h.recorder.shutdown().await;
}

/// Ids without a name are left out instead of failing the extraction
#[tokio::test]
async fn test_unresolvable_syscall_ids_are_omitted() {
    let h = Harness::new();
    let id = container_id("acdc0011");
    h.host.place(100, &id);
    h.pods.add("app", &id, Some("foo"));

    h.recorder.start().await.unwrap();
    let program = h.backend.program();
    program.run_process(100, "app", &[READ, UNASSIGNED]);
    program.announce(100).await;
    h.wait_for_profile("foo").await;

    let syscalls = h.recorder.syscalls_for_profile("foo").await.unwrap();
    assert_eq!(syscalls, vec!["read"]);
    h.recorder.shutdown().await;
}

/// Processes outside any container are dropped without a cluster search
#[tokio::test]
async fn test_host_processes_are_ignored() {
    let h = Harness::new();
    let app = container_id("f00d0006");
    h.host.place(100, &app);
    h.pods.add("app", &app, Some("foo"));

    h.recorder.start().await.unwrap();
    let program = h.backend.program();
    program.announce(1).await;
    program.announce(100).await;
    h.wait_for_profile("foo").await;

    assert_eq!(h.pods.calls(), 1);
    h.recorder.shutdown().await;
}

/// A BTF blob written for the load is removed again on unload
#[tokio::test]
async fn test_materialized_btf_is_removed_on_unload() {
    let mut table = BtfTable::default();
    table.insert(
        BtfKey {
            os: "ubuntu".to_string(),
            os_version: "18.04".to_string(),
            arch: "x86_64".to_string(),
            kernel: "4.15.0-20-generic".to_string(),
        },
        b"BTF".to_vec(),
    );
    let host = FakeHost {
        system_btf: false,
        ..FakeHost::default()
    };
    let h = Harness::build(host, table);

    h.recorder.start().await.unwrap();
    let path = h.backend.last_btf().expect("custom BTF passed to the loader");
    assert_eq!(std::fs::read(&path).unwrap(), b"BTF");

    h.recorder.stop().await;
    assert!(!path.exists());

    // Also cleaned up when the load itself fails.
    h.backend.set_failing(true);
    assert!(h.recorder.start().await.is_err());
    let path = h.backend.last_btf().expect("custom BTF passed to the loader");
    assert!(!path.exists());
}
