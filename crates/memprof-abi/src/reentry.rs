//! Per-thread reentry guard for the heap entry points.
//!
//! Anything memprof itself does while handling a heap call (symbol
//! resolution, lock parking, diagnostics) may allocate. Those nested calls
//! must reach the real allocator directly instead of being tracked again.

use std::cell::Cell;

thread_local! {
    static INTERPOSER_REENTRY_DEPTH: Cell<u32> = const { Cell::new(0) };
}

pub(crate) struct ReentryGuard;

impl Drop for ReentryGuard {
    fn drop(&mut self) {
        let _ = INTERPOSER_REENTRY_DEPTH.try_with(|depth| {
            depth.set(depth.get().saturating_sub(1));
        });
    }
}

/// `None` when this thread is already inside memprof, or when its
/// thread-locals are no longer reachable (thread teardown).
#[inline]
pub(crate) fn enter() -> Option<ReentryGuard> {
    INTERPOSER_REENTRY_DEPTH
        .try_with(|depth| {
            let current = depth.get();
            if current > 0 {
                None
            } else {
                depth.set(current + 1);
                Some(ReentryGuard)
            }
        })
        .ok()
        .flatten()
}
