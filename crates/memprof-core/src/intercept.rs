//! The four interception entry points, generic over the real allocator.
//!
//! Each entry point forwards to a [`HeapBackend`] and reports the outcome to
//! the [`Profiler`]. Ordering matters for `deallocate`: the record is removed
//! before the block is handed back, so another thread cannot be given the same
//! address and insert it while the stale record still exists.

#![allow(unsafe_code)]

use std::ffi::c_void;

use crate::diagnostics::DiagnosticSink;
use crate::profiler::Profiler;

/// The real allocator: the pre-existing `malloc`/`free`/`calloc`/`realloc`.
///
/// # Safety
///
/// Each method carries the contract of the C function it stands for.
pub trait HeapBackend {
    /// `malloc(size)`.
    unsafe fn allocate(&self, size: usize) -> *mut c_void;
    /// `calloc(count, elem_size)`.
    unsafe fn zero_allocate(&self, count: usize, elem_size: usize) -> *mut c_void;
    /// `realloc(ptr, new_size)`.
    unsafe fn resize(&self, ptr: *mut c_void, new_size: usize) -> *mut c_void;
    /// `free(ptr)`.
    unsafe fn deallocate(&self, ptr: *mut c_void);
}

impl<S: DiagnosticSink, const CAP: usize> Profiler<S, CAP> {
    /// Intercepted `malloc`.
    ///
    /// # Safety
    ///
    /// Same as `malloc`: the caller owns the returned block and must release
    /// it through this layer or the same backend.
    pub unsafe fn allocate<B: HeapBackend + ?Sized>(
        &self,
        backend: &B,
        size: usize,
    ) -> *mut c_void {
        // SAFETY: forwarded unchanged under the caller's `malloc` contract.
        let ptr = unsafe { backend.allocate(size) };
        self.observe_allocate(ptr as usize, size);
        ptr
    }

    /// Intercepted `calloc`.
    ///
    /// # Safety
    ///
    /// Same as `calloc`.
    pub unsafe fn zero_allocate<B: HeapBackend + ?Sized>(
        &self,
        backend: &B,
        count: usize,
        elem_size: usize,
    ) -> *mut c_void {
        // SAFETY: forwarded unchanged; the backend reports multiplication
        // overflow by returning null.
        let ptr = unsafe { backend.zero_allocate(count, elem_size) };
        self.observe_zero_allocate(ptr as usize, count, elem_size);
        ptr
    }

    /// Intercepted `free`. Null is forwarded too; the backend treats it as a
    /// no-op.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a live block from the same backend.
    pub unsafe fn deallocate<B: HeapBackend + ?Sized>(&self, backend: &B, ptr: *mut c_void) {
        self.observe_deallocate(ptr as usize);
        // SAFETY: caller guarantees `ptr` is null or live.
        unsafe { backend.deallocate(ptr) };
    }

    /// Intercepted `realloc`.
    ///
    /// `realloc(NULL, 0)` is answered with null without reaching the backend
    /// while logging is enabled; with logging disabled every call is forwarded.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a live block from the same backend.
    pub unsafe fn resize<B: HeapBackend + ?Sized>(
        &self,
        backend: &B,
        ptr: *mut c_void,
        new_size: usize,
    ) -> *mut c_void {
        if ptr.is_null() && new_size == 0 && self.observe_null_to_zero_resize() {
            return std::ptr::null_mut();
        }
        // SAFETY: caller guarantees `ptr` is null or live.
        let result = unsafe { backend.resize(ptr, new_size) };
        self.observe_resize(ptr as usize, new_size, result as usize);
        result
    }
}
