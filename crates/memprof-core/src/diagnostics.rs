//! Diagnostic lines and the sinks they are written to.
//!
//! Lines are formatted into a [`LineBuffer`] on the stack: this code runs
//! inside `malloc`, so it must never allocate.

use std::fmt::{self, Write as _};

use crate::config::DIAGNOSTIC_LINE_CAPACITY;
use crate::resolver::HeapOp;

/// Destination of diagnostic lines. Always called with the diagnostic lock
/// held, so implementations never see interleaved writes.
pub trait DiagnosticSink {
    /// Write one line. `line` carries no trailing newline.
    fn write_line(&mut self, line: &[u8]);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn write_line(&mut self, _line: &[u8]) {}
}

/// Keeps lines in memory. Allocates, so only for use outside an interposed
/// allocator (tests, embedding).
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    lines: Vec<String>,
}

impl MemorySink {
    #[must_use]
    pub const fn new() -> Self {
        Self { lines: Vec::new() }
    }

    #[must_use]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn take(&mut self) -> Vec<String> {
        std::mem::take(&mut self.lines)
    }
}

impl DiagnosticSink for MemorySink {
    fn write_line(&mut self, line: &[u8]) {
        self.lines.push(String::from_utf8_lossy(line).into_owned());
    }
}

/// Fixed-capacity formatting buffer. Output past `N` bytes is dropped.
pub struct LineBuffer<const N: usize = DIAGNOSTIC_LINE_CAPACITY> {
    buf: [u8; N],
    len: usize,
    truncated: bool,
}

impl<const N: usize> Default for LineBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> LineBuffer<N> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buf: [0; N],
            len: 0,
            truncated: false,
        }
    }

    /// Format `args` into a fresh buffer.
    #[must_use]
    pub fn format(args: fmt::Arguments<'_>) -> Self {
        let mut line = Self::new();
        // Our `write_str` never fails; truncation is tracked separately.
        let _ = line.write_fmt(args);
        line
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

impl<const N: usize> fmt::Write for LineBuffer<N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if self.truncated {
            return Ok(());
        }
        let room = N - self.len;
        let take = if s.len() <= room {
            s.len()
        } else {
            self.truncated = true;
            // Cut on a char boundary so the buffer stays valid UTF-8.
            let mut cut = room;
            while !s.is_char_boundary(cut) {
                cut -= 1;
            }
            cut
        };
        self.buf[self.len..self.len + take].copy_from_slice(&s.as_bytes()[..take]);
        self.len += take;
        Ok(())
    }
}

/// Pointer value as printed in diagnostics: hex, or `(nil)` for null.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Address(pub usize);

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            f.write_str("(nil)")
        } else {
            write!(f, "{:#x}", self.0)
        }
    }
}

/// One observed heap event, as reported on the diagnostic stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapEvent {
    Allocated {
        size: usize,
        address: usize,
    },
    AllocationFailed {
        size: usize,
    },
    ZeroAllocated {
        size: usize,
        count: usize,
        address: usize,
    },
    ZeroAllocationFailed {
        size: usize,
        count: usize,
    },
    Freed {
        size: usize,
        address: usize,
    },
    FreedUnknown {
        address: usize,
    },
    FreedNull,
    /// `old` is null for `realloc(NULL, size)`. `old_tracked` is false when
    /// a non-null `old` had no record.
    Resized {
        old: usize,
        size: usize,
        new: usize,
        old_tracked: bool,
    },
    /// `realloc(ptr, 0)`: the block at `old` was released. `new` is whatever
    /// the real allocator returned, usually null.
    ResizedToZero {
        old: usize,
        new: usize,
        freed: Option<usize>,
    },
    ResizeFailed {
        old: usize,
        size: usize,
    },
    /// `realloc(NULL, 0)`.
    ResizeNullToZero,
}

impl HeapEvent {
    /// The C operation that produced this event.
    #[must_use]
    pub const fn op(&self) -> HeapOp {
        match self {
            Self::Allocated { .. } | Self::AllocationFailed { .. } => HeapOp::Allocate,
            Self::ZeroAllocated { .. } | Self::ZeroAllocationFailed { .. } => {
                HeapOp::ZeroAllocate
            }
            Self::Freed { .. } | Self::FreedUnknown { .. } | Self::FreedNull => {
                HeapOp::Deallocate
            }
            Self::Resized { .. }
            | Self::ResizedToZero { .. }
            | Self::ResizeFailed { .. }
            | Self::ResizeNullToZero => HeapOp::Resize,
        }
    }

    /// `true` for events carrying the `WARNING` marker: the address being
    /// released or resized was not tracked.
    #[must_use]
    pub const fn is_warning(&self) -> bool {
        matches!(
            self,
            Self::FreedUnknown { .. }
                | Self::ResizedToZero { freed: None, .. }
                | Self::Resized {
                    old_tracked: false,
                    ..
                }
        )
    }

    /// Format the event as a diagnostic line. `dropped` appends the note that
    /// the registry was full and the record could not be kept.
    #[must_use]
    pub fn to_line(&self, dropped: bool) -> LineBuffer {
        let mut line = LineBuffer::format(format_args!("{self}"));
        if dropped {
            let _ = line.write_str(
                " (registry full: \"Total freed\" and \"Currently allocated\" are now unreliable)",
            );
        }
        line
    }
}

impl fmt::Display for HeapEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[memprof {}] ", self.op().name())?;
        if self.is_warning() {
            f.write_str("WARNING ")?;
        }
        match *self {
            Self::Allocated { size, address } => {
                write!(f, "Allocated {size} bytes at {}", Address(address))
            }
            Self::AllocationFailed { size } => write!(f, "FAILED allocating {size} bytes"),
            Self::ZeroAllocated {
                size,
                count,
                address,
            } => write!(
                f,
                "Allocated {size} bytes (array of {count} elements) at {}",
                Address(address)
            ),
            Self::ZeroAllocationFailed { size, count } => {
                write!(f, "FAILED allocating {size} bytes (array of {count} elements)")
            }
            Self::Freed { size, address } => {
                write!(f, "Freed {size} bytes at {}", Address(address))
            }
            Self::FreedUnknown { address } => {
                write!(f, "freed unknown address {}", Address(address))
            }
            Self::FreedNull => f.write_str("Freed (nil), nothing to do"),
            Self::Resized {
                old,
                size,
                new,
                old_tracked: true,
            } => write!(
                f,
                "Reallocated {size} bytes from {} to {}",
                Address(old),
                Address(new)
            ),
            Self::Resized {
                old,
                size,
                new,
                old_tracked: false,
            } => write!(
                f,
                "reallocated {size} bytes from unknown address {} to {}",
                Address(old),
                Address(new)
            ),
            Self::ResizedToZero {
                old,
                new,
                freed: Some(bytes),
            } => write!(
                f,
                "Reallocated 0 bytes from {} to {}, released {bytes} bytes",
                Address(old),
                Address(new)
            ),
            Self::ResizedToZero {
                old,
                new,
                freed: None,
            } => write!(
                f,
                "reallocated 0 bytes from unknown address {} to {}",
                Address(old),
                Address(new)
            ),
            Self::ResizeFailed { old, size } => write!(
                f,
                "FAILED reallocating {size} bytes from {}",
                Address(old)
            ),
            Self::ResizeNullToZero => {
                f.write_str("Reallocated 0 bytes from (nil), nothing to do")
            }
        }
    }
}
