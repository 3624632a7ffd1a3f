//! Static bump arena for allocations made before the real allocator is
//! resolved.
//!
//! `dlsym` may itself call `calloc`/`malloc` (glibc allocates its error
//! buffer that way) while memprof is still looking up those very symbols.
//! Such nested requests are served from here. Blocks are never reused, so
//! every block starts zeroed, and `free` of a bootstrap block is a no-op.

use std::cell::UnsafeCell;
use std::ffi::c_void;
use std::sync::atomic::{AtomicUsize, Ordering};

pub(crate) const BOOTSTRAP_ARENA_BYTES: usize = 16 * 1024;

/// Alignment of every block; also the size of the header holding the
/// requested size in front of it.
const BLOCK_ALIGN: usize = 16;

#[repr(C, align(16))]
struct ArenaStorage(UnsafeCell<[u8; BOOTSTRAP_ARENA_BYTES]>);

// SAFETY: disjoint regions are handed out through the atomic bump cursor;
// nothing reads a region before its owner wrote it.
unsafe impl Sync for ArenaStorage {}

pub(crate) struct BootstrapArena {
    storage: ArenaStorage,
    cursor: AtomicUsize,
}

pub(crate) static BOOTSTRAP_ARENA: BootstrapArena = BootstrapArena::new();

impl BootstrapArena {
    pub(crate) const fn new() -> Self {
        Self {
            storage: ArenaStorage(UnsafeCell::new([0; BOOTSTRAP_ARENA_BYTES])),
            cursor: AtomicUsize::new(0),
        }
    }

    fn base(&self) -> *mut u8 {
        self.storage.0.get().cast::<u8>()
    }

    /// Zeroed, 16-byte aligned block of `size` bytes, or null once the arena
    /// is exhausted.
    pub(crate) fn allocate(&self, size: usize) -> *mut c_void {
        let Some(span) = size
            .checked_next_multiple_of(BLOCK_ALIGN)
            .and_then(|rounded| rounded.checked_add(BLOCK_ALIGN))
        else {
            return std::ptr::null_mut();
        };
        let mut start = self.cursor.load(Ordering::Relaxed);
        loop {
            let Some(end) = start.checked_add(span).filter(|&end| end <= BOOTSTRAP_ARENA_BYTES)
            else {
                return std::ptr::null_mut();
            };
            match self
                .cursor
                .compare_exchange_weak(start, end, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => break,
                Err(current) => start = current,
            }
        }
        // SAFETY: [start, start + span) lies inside the storage and was
        // reserved exclusively by the CAS above; `start` is a multiple of
        // BLOCK_ALIGN so the header write is aligned.
        unsafe {
            let header = self.base().add(start);
            header.cast::<usize>().write(size);
            header.add(BLOCK_ALIGN).cast::<c_void>()
        }
    }

    pub(crate) fn owns(&self, ptr: *const c_void) -> bool {
        let start = self.base() as usize;
        (start..start + BOOTSTRAP_ARENA_BYTES).contains(&(ptr as usize))
    }

    /// Size requested for the block at `ptr`.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by [`BootstrapArena::allocate`] on this
    /// arena.
    pub(crate) unsafe fn block_size(&self, ptr: *const c_void) -> usize {
        // SAFETY: every block is preceded by its header.
        unsafe { ptr.cast::<u8>().sub(BLOCK_ALIGN).cast::<usize>().read() }
    }
}
