//! Process-wide profiler state shared by every entry point.

use memprof_core::{Profiler, ResolverCache};

use crate::stderr_sink::StderrSink;

pub(crate) static PROFILER: Profiler<StderrSink> = Profiler::new(StderrSink);

/// Addresses of the real heap functions, filled on first use.
pub(crate) static RESOLVER_CACHE: ResolverCache = ResolverCache::new();
