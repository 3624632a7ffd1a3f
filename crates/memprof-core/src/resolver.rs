//! Lazily bound entry points of the real allocator.
//!
//! The host supplies a [`SymbolResolver`] (in practice `dlsym(RTLD_NEXT, ..)`)
//! and [`ResolverCache`] calls it at most until each slot is filled. Slots
//! hold plain addresses; turning them back into callable function pointers is
//! the ABI crate's job.
//!
//! No lock guards the cache. Two threads racing on an empty slot both resolve
//! the same symbol and store the same address, so repeated resolution is
//! harmless and the only requirement is that every read re-checks the slot.

use std::ffi::CStr;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};

use thiserror::Error;

/// The four heap operations memprof stands in for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeapOp {
    Allocate,
    Deallocate,
    ZeroAllocate,
    Resize,
}

impl HeapOp {
    /// Resolution order.
    pub const ALL: [Self; 4] = [
        Self::Allocate,
        Self::Deallocate,
        Self::ZeroAllocate,
        Self::Resize,
    ];

    /// Well-known C symbol the real implementation is registered under.
    #[must_use]
    pub const fn symbol(self) -> &'static CStr {
        match self {
            Self::Allocate => c"malloc",
            Self::Deallocate => c"free",
            Self::ZeroAllocate => c"calloc",
            Self::Resize => c"realloc",
        }
    }

    /// Symbol name without the trailing NUL.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Allocate => "malloc",
            Self::Deallocate => "free",
            Self::ZeroAllocate => "calloc",
            Self::Resize => "realloc",
        }
    }

    const fn slot(self) -> usize {
        match self {
            Self::Allocate => 0,
            Self::Deallocate => 1,
            Self::ZeroAllocate => 2,
            Self::Resize => 3,
        }
    }
}

/// Host capability: look up the pre-existing implementation of `op`.
pub trait SymbolResolver {
    /// Address of the real implementation, or `None` if it cannot be found.
    fn resolve(&self, op: HeapOp) -> Option<NonZeroUsize>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("unable to resolve the real `{}`", .0.name())]
    Unresolved(HeapOp),
}

/// Resolved addresses of all four real entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryPoints {
    pub allocate: NonZeroUsize,
    pub deallocate: NonZeroUsize,
    pub zero_allocate: NonZeroUsize,
    pub resize: NonZeroUsize,
}

/// Four write-once address slots, `0` meaning unresolved.
#[derive(Debug, Default)]
pub struct ResolverCache {
    slots: [AtomicUsize; 4],
}

impl ResolverCache {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: [
                AtomicUsize::new(0),
                AtomicUsize::new(0),
                AtomicUsize::new(0),
                AtomicUsize::new(0),
            ],
        }
    }

    /// Bind every unresolved slot through `resolver`; no-op once all are bound.
    ///
    /// Stops at the first symbol that cannot be found. Slots resolved before
    /// the failure stay cached.
    pub fn ensure_resolved<R: SymbolResolver + ?Sized>(
        &self,
        resolver: &R,
    ) -> Result<EntryPoints, ResolveError> {
        if let Some(entry_points) = self.entry_points() {
            return Ok(entry_points);
        }

        for op in HeapOp::ALL {
            let slot = &self.slots[op.slot()];
            if slot.load(Ordering::Acquire) != 0 {
                continue;
            }
            let addr = resolver.resolve(op).ok_or(ResolveError::Unresolved(op))?;
            slot.store(addr.get(), Ordering::Release);
        }

        self.entry_points()
            .ok_or(ResolveError::Unresolved(HeapOp::Allocate))
    }

    /// Cached address for `op`, if resolved.
    #[must_use]
    pub fn get(&self, op: HeapOp) -> Option<NonZeroUsize> {
        NonZeroUsize::new(self.slots[op.slot()].load(Ordering::Acquire))
    }

    /// All four addresses, or `None` while any slot is still empty.
    #[must_use]
    pub fn entry_points(&self) -> Option<EntryPoints> {
        Some(EntryPoints {
            allocate: self.get(HeapOp::Allocate)?,
            deallocate: self.get(HeapOp::Deallocate)?,
            zero_allocate: self.get(HeapOp::ZeroAllocate)?,
            resize: self.get(HeapOp::Resize)?,
        })
    }
}
