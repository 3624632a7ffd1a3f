//! Point-in-time view of the profiler counters.

use serde::{Deserialize, Serialize};

/// Counters copied out of the registry under its lock.
///
/// `#[repr(C)]` so the ABI crate can hand it to C callers unchanged.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    /// Bytes of every allocation observed while logging was enabled.
    pub total_allocated: usize,
    /// Bytes of every tracked allocation later observed being freed.
    pub total_freed: usize,
    /// `total_allocated - total_freed`.
    pub currently_allocated: usize,
    /// Live records in the registry.
    pub live_allocations: usize,
    /// Registry capacity (`CAP`).
    pub capacity: usize,
    /// When set, `total_freed` and `currently_allocated` are unreliable.
    pub overflowed: bool,
    pub logging_enabled: bool,
}

impl UsageSnapshot {
    /// `true` if the freed and current figures can be trusted.
    #[must_use]
    pub fn is_exact(&self) -> bool {
        !self.overflowed
    }
}
