//! Bounded table of live allocations.
//!
//! A fixed array of `CAP` records plus a live count. Lookup is a linear scan
//! and removal swaps the last live record into the vacated slot, so the table
//! never allocates and the time spent under the registry lock is bounded by
//! `CAP`. Record order carries no meaning.

use crate::report::UsageSnapshot;

/// One live allocation observed while logging was enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AllocationRecord {
    /// Address returned by the real allocator.
    pub address: usize,
    /// Requested size in bytes.
    pub size: usize,
}

impl AllocationRecord {
    const EMPTY: Self = Self {
        address: 0,
        size: 0,
    };
}

/// Result of [`AllocationRegistry::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new record was added.
    Tracked,
    /// A stale record for the same address was overwritten in place.
    Replaced,
    /// The table was full; the record was dropped and the registry is now
    /// overflowed.
    Dropped,
}

/// Fixed-capacity allocation registry with running byte totals.
#[derive(Debug, Clone)]
pub struct AllocationRegistry<const CAP: usize> {
    records: [AllocationRecord; CAP],
    live: usize,
    overflowed: bool,
    total_allocated: usize,
    total_freed: usize,
}

impl<const CAP: usize> Default for AllocationRegistry<CAP> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const CAP: usize> AllocationRegistry<CAP> {
    /// Create an empty registry. Usable in `static` initializers.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            records: [AllocationRecord::EMPTY; CAP],
            live: 0,
            overflowed: false,
            total_allocated: 0,
            total_freed: 0,
        }
    }

    /// Record a logical allocation of `size` bytes at `address`.
    ///
    /// `size` is always added to the allocated total, even when the table is
    /// full and the record itself has to be dropped.
    pub fn insert(&mut self, address: usize, size: usize) -> InsertOutcome {
        self.total_allocated = self.total_allocated.saturating_add(size);

        // The address was freed while logging was off and has been handed out
        // again. Its old free was never observed, so it is not counted now.
        if let Some(slot) = self.position(address) {
            self.records[slot].size = size;
            return InsertOutcome::Replaced;
        }

        if self.live < CAP {
            self.records[self.live] = AllocationRecord { address, size };
            self.live += 1;
            InsertOutcome::Tracked
        } else {
            self.overflowed = true;
            InsertOutcome::Dropped
        }
    }

    /// Remove the record for `address`, adding its size to the freed total.
    ///
    /// Returns the recorded size, or `None` if the address is not tracked
    /// (never seen, allocated before logging was enabled, or dropped on
    /// overflow).
    pub fn remove_by_address(&mut self, address: usize) -> Option<usize> {
        let slot = self.position(address)?;
        let size = self.records[slot].size;
        self.total_freed = self.total_freed.saturating_add(size);

        let last = self.live - 1;
        self.records[slot] = self.records[last];
        self.records[last] = AllocationRecord::EMPTY;
        self.live = last;
        Some(size)
    }

    fn position(&self, address: usize) -> Option<usize> {
        self.records[..self.live]
            .iter()
            .position(|record| record.address == address)
    }

    /// Bytes allocated minus bytes freed. Not reliable once overflowed.
    #[must_use]
    pub fn currently_allocated(&self) -> usize {
        self.total_allocated.saturating_sub(self.total_freed)
    }

    #[must_use]
    pub fn total_allocated(&self) -> usize {
        self.total_allocated
    }

    #[must_use]
    pub fn total_freed(&self) -> usize {
        self.total_freed
    }

    /// Number of live records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        CAP
    }

    /// Sticky: stays set until [`reset`](Self::reset).
    #[must_use]
    pub fn is_overflowed(&self) -> bool {
        self.overflowed
    }

    /// Live records, in unspecified order.
    #[must_use]
    pub fn records(&self) -> &[AllocationRecord] {
        &self.records[..self.live]
    }

    /// Drop every record and zero all counters and the overflow flag.
    pub fn reset(&mut self) {
        self.records = [AllocationRecord::EMPTY; CAP];
        self.live = 0;
        self.overflowed = false;
        self.total_allocated = 0;
        self.total_freed = 0;
    }

    /// Copy the counters out. `logging_enabled` is owned by the caller.
    #[must_use]
    pub fn snapshot(&self, logging_enabled: bool) -> UsageSnapshot {
        UsageSnapshot {
            total_allocated: self.total_allocated,
            total_freed: self.total_freed,
            currently_allocated: self.currently_allocated(),
            live_allocations: self.live,
            capacity: CAP,
            overflowed: self.overflowed,
            logging_enabled,
        }
    }
}
