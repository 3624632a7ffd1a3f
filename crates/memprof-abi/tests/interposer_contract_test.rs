//! Contract tests for the exported heap and control functions, run against
//! the real C allocator.
//!
//! Only meaningful in builds where the heap functions are not exported
//! (debug): otherwise every allocation of the test harness would be tracked.
#![cfg(debug_assertions)]

use std::ffi::c_void;
use std::ptr;
use std::sync::{Mutex, MutexGuard};
use std::thread;

use memprof_abi::UsageSnapshot;
use memprof_abi::control_abi::{
    enable_memory_logging, print_memory_usage, print_tracked_allocations, profiler_reset,
    usage_snapshot, usage_snapshot_into,
};
use memprof_abi::malloc_abi::{calloc, free, malloc, realloc};

static TEST_LOCK: Mutex<()> = Mutex::new(());

/// Serialize tests and start each from a clean, enabled profiler.
fn fresh_session() -> MutexGuard<'static, ()> {
    let guard = TEST_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    profiler_reset();
    enable_memory_logging(true);
    guard
}

fn totals(snapshot: UsageSnapshot) -> (usize, usize, usize) {
    (
        snapshot.total_allocated,
        snapshot.total_freed,
        snapshot.currently_allocated,
    )
}

#[test]
fn end_to_end_scenario_balances() {
    let _session = fresh_session();
    unsafe {
        let first = malloc(40);
        assert!(!first.is_null());
        assert_eq!(totals(usage_snapshot()), (40, 0, 40));

        let second = calloc(5, 20);
        assert!(!second.is_null());
        assert_eq!(*second.cast::<[u8; 100]>(), [0u8; 100]);
        assert_eq!(totals(usage_snapshot()), (140, 0, 140));

        let first = realloc(first, 80);
        assert!(!first.is_null());
        assert_eq!(totals(usage_snapshot()), (220, 40, 180));

        free(first);
        free(second);
    }
    let snapshot = usage_snapshot();
    assert_eq!(totals(snapshot), (220, 220, 0));
    assert_eq!(snapshot.live_allocations, 0);
    assert!(snapshot.is_exact());
    print_memory_usage();
    profiler_reset();
}

#[test]
fn realloc_preserves_contents_and_moves_the_record() {
    let _session = fresh_session();
    unsafe {
        let block = malloc(16).cast::<u8>();
        assert!(!block.is_null());
        for i in 0..16 {
            block.add(i).write(i as u8);
        }
        let grown = realloc(block.cast(), 4096).cast::<u8>();
        assert!(!grown.is_null());
        for i in 0..16 {
            assert_eq!(grown.add(i).read(), i as u8);
        }
        let snapshot = usage_snapshot();
        assert_eq!(snapshot.live_allocations, 1);
        assert_eq!(snapshot.currently_allocated, 4096);
        free(grown.cast());
    }
    assert_eq!(usage_snapshot().currently_allocated, 0);
    profiler_reset();
}

#[test]
fn realloc_null_zero_is_answered_locally_while_logging() {
    let _session = fresh_session();
    let result = unsafe { realloc(ptr::null_mut(), 0) };
    assert!(result.is_null());
    assert_eq!(totals(usage_snapshot()), (0, 0, 0));
    profiler_reset();
}

#[test]
fn realloc_to_zero_drops_the_record() {
    let _session = fresh_session();
    unsafe {
        let block = malloc(24);
        assert!(!block.is_null());
        let after = realloc(block, 0);
        // glibc frees and returns null; either way the record is gone.
        if !after.is_null() {
            free(after);
        }
    }
    let snapshot = usage_snapshot();
    assert_eq!(snapshot.live_allocations, 0);
    assert_eq!(snapshot.total_allocated, 24);
    profiler_reset();
}

#[test]
fn null_free_and_overflowing_calloc_change_nothing() {
    let _session = fresh_session();
    unsafe {
        free(ptr::null_mut());
        assert!(calloc(usize::MAX, 2).is_null());
    }
    let snapshot = usage_snapshot();
    assert_eq!(totals(snapshot), (0, 0, 0));
    assert_eq!(snapshot.live_allocations, 0);
    profiler_reset();
}

#[test]
fn disabled_logging_forwards_without_tracking() {
    let _session = fresh_session();
    let tracked = unsafe { malloc(8) };
    enable_memory_logging(false);
    let untracked = unsafe { malloc(8) };
    unsafe {
        free(untracked);
        free(tracked);
    }
    assert_eq!(totals(usage_snapshot()), (8, 0, 8));

    enable_memory_logging(true);
    print_tracked_allocations();
    assert_eq!(usage_snapshot().live_allocations, 1);
    profiler_reset();
    assert_eq!(usage_snapshot(), UsageSnapshot {
        capacity: usage_snapshot().capacity,
        ..UsageSnapshot::default()
    });
}

#[test]
fn overflow_is_reported_and_cleared_by_reset() {
    let _session = fresh_session();
    let capacity = usage_snapshot().capacity;
    let blocks: Vec<*mut c_void> = (0..=capacity).map(|_| unsafe { malloc(1) }).collect();
    let snapshot = usage_snapshot();
    assert!(snapshot.overflowed);
    assert_eq!(snapshot.live_allocations, capacity);
    assert_eq!(snapshot.total_allocated, capacity + 1);
    print_memory_usage();

    for block in blocks {
        unsafe { free(block) };
    }
    assert!(usage_snapshot().overflowed);
    profiler_reset();
    assert!(!usage_snapshot().overflowed);
}

#[test]
fn concurrent_callers_keep_totals_consistent() {
    let _session = fresh_session();
    let workers: Vec<_> = (0..4)
        .map(|worker| {
            thread::spawn(move || {
                for round in 0..200usize {
                    let size = 1 + (worker * 31 + round) % 64;
                    unsafe {
                        let single = malloc(size);
                        let array = calloc(size, 2);
                        assert!(!single.is_null() && !array.is_null());
                        free(array);
                        free(single);
                    }
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }
    let snapshot = usage_snapshot();
    assert_eq!(snapshot.live_allocations, 0);
    assert_eq!(snapshot.total_allocated, snapshot.total_freed);
    assert!(!snapshot.overflowed);
    profiler_reset();
}

#[test]
fn snapshot_export_matches_rust_view() {
    let _session = fresh_session();
    let block = unsafe { malloc(12) };

    let mut out = UsageSnapshot::default();
    assert_eq!(unsafe { usage_snapshot_into(&mut out) }, 0);
    assert_eq!(out, usage_snapshot());
    assert_eq!(unsafe { usage_snapshot_into(ptr::null_mut()) }, -1);

    let json = serde_json::to_value(out).unwrap();
    assert_eq!(json["currently_allocated"], 12);
    assert_eq!(json["logging_enabled"], true);

    unsafe { free(block) };
    profiler_reset();
}
