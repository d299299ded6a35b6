//! Frame instrumentation: stack-disciplined named timers with periodic top-N
//! reports, and heap allocation sampling through a tracking global allocator.

pub mod memory;
pub mod profiler;

pub use memory::{
    GlobalCounters, LARGE_ALLOCATION_BYTES, MemorySample, MemorySampler, MemorySource,
    MemoryStats, TrackingAllocator,
};
pub use profiler::{
    DEFAULT_REPORT_INTERVAL, DEFAULT_TOP_N, HISTORY_CAPACITY, ProfileReport, ProfileSample,
    ProfileScope, Profiler, ReportEntry,
};
