//! Control surface: toggling, reporting and resetting the profiler.
//!
//! Each function is exported under its C name and is also callable from Rust.
//! All of them hold the reentry guard while they run, so anything they
//! allocate is never tracked.

use std::ffi::c_int;

use memprof_core::UsageSnapshot;

use crate::profiler_state::PROFILER;
use crate::reentry;

/// Start (`true`) or stop (`false`) tracking heap events. Tracked records and
/// totals are kept across toggles.
#[unsafe(export_name = "enableMemoryLogging")]
pub extern "C" fn enable_memory_logging(enable: bool) {
    let _reentry_guard = reentry::enter();
    PROFILER.enable_logging(enable);
}

/// Print the usage summary to stderr.
#[unsafe(export_name = "printMemoryUsage")]
pub extern "C" fn print_memory_usage() {
    let _reentry_guard = reentry::enter();
    PROFILER.print_usage_summary();
}

/// Print every tracked allocation to stderr.
#[unsafe(export_name = "printTrackedAllocations")]
pub extern "C" fn print_tracked_allocations() {
    let _reentry_guard = reentry::enter();
    PROFILER.print_tracked_allocations();
}

/// Disable logging and forget every record, both totals and the overflow
/// flag.
#[unsafe(export_name = "profilerReset")]
pub extern "C" fn profiler_reset() {
    let _reentry_guard = reentry::enter();
    PROFILER.reset();
}

/// Current counters.
#[must_use]
pub fn usage_snapshot() -> UsageSnapshot {
    let _reentry_guard = reentry::enter();
    PROFILER.snapshot()
}

/// Copy the current counters into `*out`. Returns 0, or -1 if `out` is null.
///
/// # Safety
///
/// `out` must be null or valid for writing one `MemprofUsageSnapshot`.
#[unsafe(export_name = "memprofUsageSnapshot")]
pub unsafe extern "C" fn usage_snapshot_into(out: *mut UsageSnapshot) -> c_int {
    if out.is_null() {
        return -1;
    }
    let snapshot = usage_snapshot();
    // SAFETY: caller guarantees `out` is writable; checked non-null above.
    unsafe { out.write(snapshot) };
    0
}
