//! Heap entry points: `malloc`, `calloc`, `realloc`, `free`.
//!
//! Every call is forwarded to the real allocator. While logging is enabled
//! the outcome is also recorded and reported by the shared profiler.
//! Calls made by memprof itself while handling one of these (detected by the
//! per-thread reentry guard) go straight to the real allocator, or to the
//! bootstrap arena if the real allocator is still being resolved.

use std::ffi::c_void;

use memprof_core::HeapBackend;

use crate::bootstrap::BOOTSTRAP_ARENA;
use crate::profiler_state::PROFILER;
use crate::real_alloc::{real_allocator, resolved_real_allocator};
use crate::reentry;

// ---------------------------------------------------------------------------
// Untracked paths
// ---------------------------------------------------------------------------

unsafe fn passthrough_malloc(size: usize) -> *mut c_void {
    match resolved_real_allocator() {
        // SAFETY: forwarded under the caller's `malloc` contract.
        Some(real) => unsafe { real.allocate(size) },
        None => BOOTSTRAP_ARENA.allocate(size),
    }
}

unsafe fn passthrough_calloc(count: usize, elem_size: usize) -> *mut c_void {
    match resolved_real_allocator() {
        // SAFETY: forwarded under the caller's `calloc` contract.
        Some(real) => unsafe { real.zero_allocate(count, elem_size) },
        None => match count.checked_mul(elem_size) {
            Some(total) => BOOTSTRAP_ARENA.allocate(total),
            None => std::ptr::null_mut(),
        },
    }
}

unsafe fn passthrough_realloc(ptr: *mut c_void, size: usize) -> *mut c_void {
    match resolved_real_allocator() {
        // SAFETY: forwarded under the caller's `realloc` contract.
        Some(real) => unsafe { real.resize(ptr, size) },
        // Before resolution the only blocks in existence are bootstrap
        // blocks, handled by the caller.
        None if ptr.is_null() => BOOTSTRAP_ARENA.allocate(size),
        None => std::ptr::null_mut(),
    }
}

unsafe fn passthrough_free(ptr: *mut c_void) {
    if let Some(real) = resolved_real_allocator() {
        // SAFETY: forwarded under the caller's `free` contract.
        unsafe { real.deallocate(ptr) };
    }
}

/// `realloc` of a bootstrap block: move it into a regular block. The arena
/// never takes blocks back, so the old one is simply abandoned. Outside of
/// memprof's own calls the move is reported as the `realloc` it is.
unsafe fn resize_bootstrap_block(ptr: *mut c_void, size: usize) -> *mut c_void {
    let reentry_guard = reentry::enter();
    let fresh = if size == 0 {
        std::ptr::null_mut()
    } else if reentry_guard.is_some() {
        // SAFETY: plain allocation request.
        unsafe { real_allocator().allocate(size) }
    } else {
        // SAFETY: plain allocation request.
        unsafe { passthrough_malloc(size) }
    };
    if !fresh.is_null() {
        // SAFETY: `ptr` is a bootstrap block (checked by the caller) and
        // `fresh` holds at least `size` bytes; the regions cannot overlap.
        unsafe {
            let keep = BOOTSTRAP_ARENA.block_size(ptr).min(size);
            std::ptr::copy_nonoverlapping(ptr.cast::<u8>(), fresh.cast::<u8>(), keep);
        }
    }
    if reentry_guard.is_some() {
        PROFILER.observe_resize(ptr as usize, size, fresh as usize);
    }
    fresh
}

// ---------------------------------------------------------------------------
// malloc
// ---------------------------------------------------------------------------

/// Allocate `size` bytes through the real allocator.
///
/// # Safety
///
/// Same contract as C `malloc`.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn malloc(size: usize) -> *mut c_void {
    let Some(_reentry_guard) = reentry::enter() else {
        // SAFETY: nested call from inside memprof; bypasses tracking.
        return unsafe { passthrough_malloc(size) };
    };
    let real = real_allocator();
    // SAFETY: forwarded under the caller's `malloc` contract.
    unsafe { PROFILER.allocate(&real, size) }
}

// ---------------------------------------------------------------------------
// calloc
// ---------------------------------------------------------------------------

/// Allocate a zeroed array of `count` elements of `elem_size` bytes.
///
/// # Safety
///
/// Same contract as C `calloc`.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn calloc(count: usize, elem_size: usize) -> *mut c_void {
    let Some(_reentry_guard) = reentry::enter() else {
        // SAFETY: nested call from inside memprof; bypasses tracking.
        return unsafe { passthrough_calloc(count, elem_size) };
    };
    let real = real_allocator();
    // SAFETY: forwarded under the caller's `calloc` contract.
    unsafe { PROFILER.zero_allocate(&real, count, elem_size) }
}

// ---------------------------------------------------------------------------
// realloc
// ---------------------------------------------------------------------------

/// Resize the block at `ptr` to `size` bytes.
///
/// While logging is enabled `realloc(NULL, 0)` returns null without calling
/// the real allocator.
///
/// # Safety
///
/// Same contract as C `realloc`.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn realloc(ptr: *mut c_void, size: usize) -> *mut c_void {
    if BOOTSTRAP_ARENA.owns(ptr) {
        // SAFETY: `ptr` is a bootstrap block.
        return unsafe { resize_bootstrap_block(ptr, size) };
    }
    let Some(_reentry_guard) = reentry::enter() else {
        // SAFETY: nested call from inside memprof; bypasses tracking.
        return unsafe { passthrough_realloc(ptr, size) };
    };
    let real = real_allocator();
    // SAFETY: forwarded under the caller's `realloc` contract.
    unsafe { PROFILER.resize(&real, ptr, size) }
}

// ---------------------------------------------------------------------------
// free
// ---------------------------------------------------------------------------

/// Release the block at `ptr`. Null is accepted and does nothing.
///
/// # Safety
///
/// Same contract as C `free`.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn free(ptr: *mut c_void) {
    if BOOTSTRAP_ARENA.owns(ptr) {
        return;
    }
    let Some(_reentry_guard) = reentry::enter() else {
        // SAFETY: nested call from inside memprof; bypasses tracking.
        unsafe { passthrough_free(ptr) };
        return;
    };
    let real = real_allocator();
    // SAFETY: forwarded under the caller's `free` contract.
    unsafe { PROFILER.deallocate(&real, ptr) }
}
