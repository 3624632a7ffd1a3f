//! Process-wide profiler context: logging switch, registry and diagnostic
//! stream behind one explicitly locked object.
//!
//! Lock order is fixed: `session` (logging flag + registry), then `sink`.
//! Every logged event holds both for the registry update plus the line write.
//! Toggling logging and resetting take only `session`, so an event already
//! in flight may still see the previous value of the flag.

use parking_lot::{Mutex, const_mutex};

use crate::config::MAX_TRACKED_ALLOCATIONS;
use crate::diagnostics::{Address, DiagnosticSink, HeapEvent, LineBuffer};
use crate::registry::{AllocationRegistry, InsertOutcome};
use crate::report::UsageSnapshot;

const BANNER: &[u8] = b"****************************************";

#[derive(Debug)]
struct Session<const CAP: usize> {
    enabled: bool,
    registry: AllocationRegistry<CAP>,
}

/// Allocation profiler state shared by every interception entry point.
pub struct Profiler<S, const CAP: usize = MAX_TRACKED_ALLOCATIONS> {
    session: Mutex<Session<CAP>>,
    sink: Mutex<S>,
}

impl<S, const CAP: usize> Profiler<S, CAP> {
    /// Create a profiler with logging disabled and an empty registry.
    /// Usable in `static` initializers.
    #[must_use]
    pub const fn new(sink: S) -> Self {
        Self {
            session: const_mutex(Session {
                enabled: false,
                registry: AllocationRegistry::new(),
            }),
            sink: const_mutex(sink),
        }
    }

    /// Turn event tracking on or off. Registry contents are left alone.
    pub fn enable_logging(&self, enable: bool) {
        self.session.lock().enabled = enable;
    }

    #[must_use]
    pub fn is_logging_enabled(&self) -> bool {
        self.session.lock().enabled
    }

    /// Disable logging and clear every record, counter and the overflow flag.
    pub fn reset(&self) {
        let mut session = self.session.lock();
        session.enabled = false;
        session.registry.reset();
    }

    /// Counters as of now.
    #[must_use]
    pub fn snapshot(&self) -> UsageSnapshot {
        let session = self.session.lock();
        session.registry.snapshot(session.enabled)
    }

    /// Run `f` with exclusive access to the diagnostic sink.
    pub fn with_sink<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        f(&mut self.sink.lock())
    }
}

impl<S: DiagnosticSink, const CAP: usize> Profiler<S, CAP> {
    /// Apply `f` to the registry and write the event it returns, but only
    /// while logging is enabled. `f` returns the event and whether an insert
    /// was dropped for lack of room.
    fn logged(&self, f: impl FnOnce(&mut AllocationRegistry<CAP>) -> (HeapEvent, bool)) {
        let mut session = self.session.lock();
        if !session.enabled {
            return;
        }
        let mut sink = self.sink.lock();
        let (event, dropped) = f(&mut session.registry);
        sink.write_line(event.to_line(dropped).as_bytes());
    }

    /// Record the outcome of a real `malloc(size)` that returned `address`.
    pub fn observe_allocate(&self, address: usize, size: usize) {
        self.logged(|registry| {
            if address == 0 {
                return (HeapEvent::AllocationFailed { size }, false);
            }
            let outcome = registry.insert(address, size);
            (
                HeapEvent::Allocated { size, address },
                outcome == InsertOutcome::Dropped,
            )
        });
    }

    /// Record the outcome of a real `calloc(count, elem_size)`.
    pub fn observe_zero_allocate(&self, address: usize, count: usize, elem_size: usize) {
        let size = count.saturating_mul(elem_size);
        self.logged(|registry| {
            if address == 0 {
                return (HeapEvent::ZeroAllocationFailed { size, count }, false);
            }
            let outcome = registry.insert(address, size);
            (
                HeapEvent::ZeroAllocated {
                    size,
                    count,
                    address,
                },
                outcome == InsertOutcome::Dropped,
            )
        });
    }

    /// Record a `free(address)` that is about to be forwarded.
    pub fn observe_deallocate(&self, address: usize) {
        self.logged(|registry| {
            if address == 0 {
                return (HeapEvent::FreedNull, false);
            }
            let event = match registry.remove_by_address(address) {
                Some(size) => HeapEvent::Freed { size, address },
                None => HeapEvent::FreedUnknown { address },
            };
            (event, false)
        });
    }

    /// Handle `realloc(NULL, 0)` ahead of forwarding.
    ///
    /// Returns `true` when logging is enabled: the call has been logged and
    /// must not reach the real allocator. Returns `false` when logging is off
    /// and the call is forwarded as is.
    pub fn observe_null_to_zero_resize(&self) -> bool {
        let session = self.session.lock();
        if !session.enabled {
            return false;
        }
        let mut sink = self.sink.lock();
        sink.write_line(HeapEvent::ResizeNullToZero.to_line(false).as_bytes());
        true
    }

    /// Record the outcome of a real `realloc(old, new_size)` that returned
    /// `result`.
    pub fn observe_resize(&self, old: usize, new_size: usize, result: usize) {
        self.logged(|registry| {
            // realloc(ptr, 0) releases `ptr`; whatever it returns is not tracked.
            if old != 0 && new_size == 0 {
                let freed = registry.remove_by_address(old);
                let event = HeapEvent::ResizedToZero {
                    old,
                    new: result,
                    freed,
                };
                return (event, false);
            }
            if result == 0 {
                let event = HeapEvent::ResizeFailed {
                    old,
                    size: new_size,
                };
                return (event, false);
            }
            let old_tracked = old == 0 || registry.remove_by_address(old).is_some();
            let outcome = registry.insert(result, new_size);
            (
                HeapEvent::Resized {
                    old,
                    size: new_size,
                    new: result,
                    old_tracked,
                },
                outcome == InsertOutcome::Dropped,
            )
        });
    }

    /// Write the totals, plus a caveat if the registry ever overflowed.
    pub fn print_usage_summary(&self) {
        let session = self.session.lock();
        let mut sink = self.sink.lock();
        let snap = session.registry.snapshot(session.enabled);

        sink.write_line(BANNER);
        write_fmt(
            &mut *sink,
            format_args!("**** Total allocated: {} bytes", snap.total_allocated),
        );
        write_fmt(
            &mut *sink,
            format_args!("**** Total freed: {} bytes", snap.total_freed),
        );
        write_fmt(
            &mut *sink,
            format_args!(
                "**** Currently allocated: {} bytes",
                snap.currently_allocated
            ),
        );
        if snap.overflowed {
            write_fmt(
                &mut *sink,
                format_args!(
                    "**** IMPORTANT: more than {} allocations were live at once:",
                    snap.capacity
                ),
            );
            sink.write_line(
                b"**** \"Total freed\" and \"Currently allocated\" are likely to be wrong.",
            );
        }
        sink.write_line(BANNER);
    }

    /// Write every live record, one line each.
    pub fn print_tracked_allocations(&self) {
        let session = self.session.lock();
        let mut sink = self.sink.lock();
        let records = session.registry.records();

        write_fmt(
            &mut *sink,
            format_args!("---- Tracked allocations: {}", records.len()),
        );
        for (slot, record) in records.iter().enumerate() {
            write_fmt(
                &mut *sink,
                format_args!(
                    "---- slot {slot}: {} {} bytes",
                    Address(record.address),
                    record.size
                ),
            );
        }
        sink.write_line(b"----");
    }
}

fn write_fmt<S: DiagnosticSink + ?Sized>(sink: &mut S, args: std::fmt::Arguments<'_>) {
    let line: LineBuffer = LineBuffer::format(args);
    sink.write_line(line.as_bytes());
}
