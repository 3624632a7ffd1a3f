//! # memprof-core
//!
//! Safe bookkeeping behind the memprof allocation interposer.
//!
//! The interposer (`memprof-abi`) forwards every `malloc`/`calloc`/`realloc`/`free`
//! to the real allocator and, while logging is enabled, reports each event to a
//! process-wide [`Profiler`]. This crate owns everything that does not need to
//! touch the C ABI:
//!
//! ```text
//! C caller -> ABI entry (memprof-abi) -> real allocator -> Profiler (this crate)
//!                                                            |-> AllocationRegistry
//!                                                            `-> DiagnosticSink
//! ```
//!
//! Registry state and the diagnostic stream sit behind two separate
//! `parking_lot::Mutex`es that every logged event takes together, registry
//! first, so a printed line always agrees with the counters it describes.

pub mod config;
pub mod diagnostics;
pub mod intercept;
pub mod profiler;
pub mod registry;
pub mod report;
pub mod resolver;

pub use config::{DIAGNOSTIC_LINE_CAPACITY, MAX_TRACKED_ALLOCATIONS};
pub use diagnostics::{Address, DiagnosticSink, HeapEvent, LineBuffer, MemorySink, NullSink};
pub use intercept::HeapBackend;
pub use profiler::Profiler;
pub use registry::{AllocationRecord, AllocationRegistry, InsertOutcome};
pub use report::UsageSnapshot;
pub use resolver::{EntryPoints, HeapOp, ResolveError, ResolverCache, SymbolResolver};
