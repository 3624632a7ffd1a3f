// Every extern "C" entry point here carries the contract of the C function it
// replaces; restating it per function would be boilerplate.
#![allow(clippy::missing_safety_doc)]
//! # memprof-abi
//!
//! `extern "C"` boundary of memprof. Builds `libmemprof_abi.so`, which
//! replaces `malloc`, `calloc`, `realloc` and `free` and exposes a small
//! control surface (`enableMemoryLogging`, `printMemoryUsage`,
//! `printTrackedAllocations`, `profilerReset`, `memprofUsageSnapshot`).
//!
//! ```text
//! C caller -> ABI entry (this crate) -> real allocator (dlsym RTLD_NEXT)
//!                                    `-> memprof_core::Profiler (when logging)
//! ```
//!
//! The heap entry points are exported unmangled only in builds without debug
//! assertions. Debug and test builds keep them as ordinary Rust functions so
//! the test binary's own allocations never pass through the profiler.
//!
//! ```bash
//! cargo build --release -p memprof-abi
//! LD_PRELOAD=target/release/libmemprof_abi.so ./your_program
//! ```

mod bootstrap;
mod profiler_state;
mod real_alloc;
mod reentry;
mod stderr_sink;

pub mod control_abi;
pub mod malloc_abi;

pub use memprof_core::UsageSnapshot;
