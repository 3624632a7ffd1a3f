//! The real allocator: whatever `malloc`/`free`/`calloc`/`realloc` come after
//! this library in the dynamic lookup order.

use std::ffi::c_void;
use std::num::NonZeroUsize;

use memprof_core::{
    DiagnosticSink, EntryPoints, HeapBackend, HeapOp, LineBuffer, ResolveError, SymbolResolver,
};

use crate::profiler_state::RESOLVER_CACHE;
use crate::stderr_sink::StderrSink;

type MallocFn = unsafe extern "C" fn(usize) -> *mut c_void;
type FreeFn = unsafe extern "C" fn(*mut c_void);
type CallocFn = unsafe extern "C" fn(usize, usize) -> *mut c_void;
type ReallocFn = unsafe extern "C" fn(*mut c_void, usize) -> *mut c_void;

/// Looks symbols up with `dlsym(RTLD_NEXT, ..)`.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct DlsymResolver;

impl SymbolResolver for DlsymResolver {
    fn resolve(&self, op: HeapOp) -> Option<NonZeroUsize> {
        // SAFETY: RTLD_NEXT pseudo-handle with a static NUL-terminated name.
        let sym = unsafe { libc::dlsym(libc::RTLD_NEXT, op.symbol().as_ptr()) };
        NonZeroUsize::new(sym as usize)
    }
}

/// Callable view of resolved [`EntryPoints`].
#[derive(Clone, Copy)]
pub(crate) struct RealAllocator {
    malloc: MallocFn,
    free: FreeFn,
    calloc: CallocFn,
    realloc: ReallocFn,
}

impl RealAllocator {
    pub(crate) fn from_entry_points(entry: EntryPoints) -> Self {
        // SAFETY: each address came from dlsym for the symbol of the same
        // name, whose C signature is the one named by the target type.
        unsafe {
            Self {
                malloc: std::mem::transmute::<usize, MallocFn>(entry.allocate.get()),
                free: std::mem::transmute::<usize, FreeFn>(entry.deallocate.get()),
                calloc: std::mem::transmute::<usize, CallocFn>(entry.zero_allocate.get()),
                realloc: std::mem::transmute::<usize, ReallocFn>(entry.resize.get()),
            }
        }
    }
}

impl HeapBackend for RealAllocator {
    unsafe fn allocate(&self, size: usize) -> *mut c_void {
        // SAFETY: forwarded under the caller's `malloc` contract.
        unsafe { (self.malloc)(size) }
    }

    unsafe fn zero_allocate(&self, count: usize, elem_size: usize) -> *mut c_void {
        // SAFETY: forwarded under the caller's `calloc` contract.
        unsafe { (self.calloc)(count, elem_size) }
    }

    unsafe fn resize(&self, ptr: *mut c_void, new_size: usize) -> *mut c_void {
        // SAFETY: forwarded under the caller's `realloc` contract.
        unsafe { (self.realloc)(ptr, new_size) }
    }

    unsafe fn deallocate(&self, ptr: *mut c_void) {
        // SAFETY: forwarded under the caller's `free` contract.
        unsafe { (self.free)(ptr) }
    }
}

/// Real allocator if it has already been resolved. Never resolves.
pub(crate) fn resolved_real_allocator() -> Option<RealAllocator> {
    RESOLVER_CACHE
        .entry_points()
        .map(RealAllocator::from_entry_points)
}

/// Real allocator, resolving all four functions on first use. Terminates the
/// process if any of them cannot be found: nothing could be forwarded.
pub(crate) fn real_allocator() -> RealAllocator {
    match RESOLVER_CACHE.ensure_resolved(&DlsymResolver) {
        Ok(entry) => RealAllocator::from_entry_points(entry),
        Err(err) => resolution_failed(err),
    }
}

fn resolution_failed(err: ResolveError) -> ! {
    let ResolveError::Unresolved(op) = err;
    let line: LineBuffer =
        LineBuffer::format(format_args!("memprof: ERROR loading `{}`", op.name()));
    StderrSink.write_line(line.as_bytes());
    // SAFETY: _exit skips atexit handlers and stdio flushing, both of which
    // could call back into the heap we failed to set up.
    unsafe { libc::_exit(1) }
}
