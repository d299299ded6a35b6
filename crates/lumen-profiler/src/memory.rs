//! Heap allocation tracking.
//!
//! [`TrackingAllocator`] wraps a [`GlobalAlloc`] and bumps process-wide
//! atomic counters on every allocation. [`MemorySampler`] reads those counters
//! every few frames, keeps a bounded history of deltas, and logs whenever the
//! number of large allocations changes. Sampling is read-only: nothing else in
//! the frame depends on it.
//!
//! ```rust,ignore
//! #[global_allocator]
//! static GLOBAL: lumen_profiler::TrackingAllocator = lumen_profiler::TrackingAllocator::new(std::alloc::System);
//! ```

use std::alloc::{GlobalAlloc, Layout, System};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Allocations of at least this many bytes count as large.
pub const LARGE_ALLOCATION_BYTES: usize = 64 * 1024;

/// Samples retained by a [`MemorySampler`].
const SAMPLE_HISTORY: usize = 120;

static CURRENT_BYTES: AtomicU64 = AtomicU64::new(0);
static PEAK_BYTES: AtomicU64 = AtomicU64::new(0);
static TOTAL_ALLOCATED_BYTES: AtomicU64 = AtomicU64::new(0);
static ALLOCATIONS: AtomicU64 = AtomicU64::new(0);
static DEALLOCATIONS: AtomicU64 = AtomicU64::new(0);
static LARGE_ALLOCATIONS: AtomicU64 = AtomicU64::new(0);

fn on_alloc(size: usize) {
    let size = size as u64;
    let current = CURRENT_BYTES.fetch_add(size, Ordering::Relaxed) + size;
    PEAK_BYTES.fetch_max(current, Ordering::Relaxed);
    TOTAL_ALLOCATED_BYTES.fetch_add(size, Ordering::Relaxed);
    ALLOCATIONS.fetch_add(1, Ordering::Relaxed);
    if size >= LARGE_ALLOCATION_BYTES as u64 {
        LARGE_ALLOCATIONS.fetch_add(1, Ordering::Relaxed);
    }
}

fn on_dealloc(size: usize) {
    // Allocations made before the counters were live can be freed through us.
    let _ = CURRENT_BYTES.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |c| {
        Some(c.saturating_sub(size as u64))
    });
    DEALLOCATIONS.fetch_add(1, Ordering::Relaxed);
}

// ---------------------------------------------------------------------------
// TrackingAllocator
// ---------------------------------------------------------------------------

/// `GlobalAlloc` wrapper that feeds the counters read by [`MemoryStats::snapshot`].
///
/// Must not log or allocate while handling a request.
#[derive(Debug, Default, Clone, Copy)]
pub struct TrackingAllocator<A = System> {
    inner: A,
}

impl<A> TrackingAllocator<A> {
    pub const fn new(inner: A) -> Self {
        Self { inner }
    }
}

unsafe impl<A: GlobalAlloc> GlobalAlloc for TrackingAllocator<A> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { self.inner.alloc(layout) };
        if !ptr.is_null() {
            on_alloc(layout.size());
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { self.inner.dealloc(ptr, layout) };
        on_dealloc(layout.size());
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { self.inner.alloc_zeroed(layout) };
        if !ptr.is_null() {
            on_alloc(layout.size());
        }
        ptr
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = unsafe { self.inner.realloc(ptr, layout, new_size) };
        if !new_ptr.is_null() {
            on_dealloc(layout.size());
            on_alloc(new_size);
        }
        new_ptr
    }
}

// ---------------------------------------------------------------------------
// MemoryStats / MemorySource
// ---------------------------------------------------------------------------

/// Point-in-time view of the allocation counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub current_bytes: u64,
    pub peak_bytes: u64,
    /// Bytes allocated over the process lifetime.
    pub total_allocated_bytes: u64,
    pub allocations: u64,
    pub deallocations: u64,
    pub large_allocations: u64,
}

impl MemoryStats {
    /// Read the global counters. All zero unless [`TrackingAllocator`] is
    /// the global allocator.
    pub fn snapshot() -> Self {
        Self {
            current_bytes: CURRENT_BYTES.load(Ordering::Relaxed),
            peak_bytes: PEAK_BYTES.load(Ordering::Relaxed),
            total_allocated_bytes: TOTAL_ALLOCATED_BYTES.load(Ordering::Relaxed),
            allocations: ALLOCATIONS.load(Ordering::Relaxed),
            deallocations: DEALLOCATIONS.load(Ordering::Relaxed),
            large_allocations: LARGE_ALLOCATIONS.load(Ordering::Relaxed),
        }
    }
}

/// Where a [`MemorySampler`] reads its counters from.
pub trait MemorySource {
    fn stats(&self) -> MemoryStats;
}

/// The process-wide counters fed by [`TrackingAllocator`].
#[derive(Clone, Copy, Debug, Default)]
pub struct GlobalCounters;

impl MemorySource for GlobalCounters {
    fn stats(&self) -> MemoryStats {
        MemoryStats::snapshot()
    }
}

// ---------------------------------------------------------------------------
// MemorySampler
// ---------------------------------------------------------------------------

/// One reading taken by [`MemorySampler::end_frame`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemorySample {
    pub frame: u64,
    /// Bytes allocated since the previous sample.
    pub allocated_delta: u64,
    pub current_bytes: u64,
    /// Lifetime count of large allocations.
    pub large_allocations: u64,
}

/// Samples a [`MemorySource`] every `interval` frames.
pub struct MemorySampler<S: MemorySource = GlobalCounters> {
    source: S,
    interval: u64,
    frame: u64,
    last: MemoryStats,
    history: VecDeque<MemorySample>,
}

impl<S: MemorySource> MemorySampler<S> {
    /// An `interval` of zero disables sampling.
    pub fn new(source: S, interval: u64) -> Self {
        let last = source.stats();
        Self {
            source,
            interval,
            frame: 0,
            last,
            history: VecDeque::with_capacity(SAMPLE_HISTORY),
        }
    }

    /// Advance one frame, taking a sample when the interval elapses.
    pub fn end_frame(&mut self) -> Option<MemorySample> {
        self.frame += 1;
        if self.interval == 0 || self.frame % self.interval != 0 {
            return None;
        }

        let stats = self.source.stats();
        let sample = MemorySample {
            frame: self.frame,
            allocated_delta: stats
                .total_allocated_bytes
                .saturating_sub(self.last.total_allocated_bytes),
            current_bytes: stats.current_bytes,
            large_allocations: stats.large_allocations,
        };
        if stats.large_allocations != self.last.large_allocations {
            tracing::info!(
                frame = self.frame,
                "Large allocations {} -> {} ({} bytes live)",
                self.last.large_allocations,
                stats.large_allocations,
                stats.current_bytes
            );
        }
        self.last = stats;

        if self.history.len() == SAMPLE_HISTORY {
            self.history.pop_front();
        }
        self.history.push_back(sample);
        Some(sample)
    }

    /// Retained samples, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &MemorySample> {
        self.history.iter()
    }

    pub fn latest(&self) -> Option<&MemorySample> {
        self.history.back()
    }

    /// Counters as of the most recent sample.
    pub fn last_stats(&self) -> MemoryStats {
        self.last
    }

    pub fn interval(&self) -> u64 {
        self.interval
    }

    /// Change the sampling cadence. The baseline and history are kept.
    pub fn set_interval(&mut self, interval: u64) {
        self.interval = interval;
    }
}

impl Default for MemorySampler<GlobalCounters> {
    fn default() -> Self {
        Self::new(GlobalCounters, 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct FakeSource(Rc<Cell<MemoryStats>>);

    impl FakeSource {
        fn allocate(&self, bytes: u64, large: bool) {
            let mut stats = self.0.get();
            stats.total_allocated_bytes += bytes;
            stats.current_bytes += bytes;
            stats.allocations += 1;
            if large {
                stats.large_allocations += 1;
            }
            self.0.set(stats);
        }
    }

    impl MemorySource for FakeSource {
        fn stats(&self) -> MemoryStats {
            self.0.get()
        }
    }

    #[test]
    fn test_samples_on_interval() {
        let source = FakeSource::default();
        let mut sampler = MemorySampler::new(source.clone(), 3);
        source.allocate(100, false);
        assert!(sampler.end_frame().is_none());
        assert!(sampler.end_frame().is_none());
        let sample = sampler.end_frame().unwrap();
        assert_eq!(sample.frame, 3);
        assert_eq!(sample.allocated_delta, 100);
        assert_eq!(sample.current_bytes, 100);
    }

    #[test]
    fn test_delta_is_since_previous_sample() {
        let source = FakeSource::default();
        source.allocate(1_000, false);
        let mut sampler = MemorySampler::new(source.clone(), 1);
        // Allocations before construction are the baseline.
        assert_eq!(sampler.end_frame().unwrap().allocated_delta, 0);
        source.allocate(250, false);
        source.allocate(50, false);
        assert_eq!(sampler.end_frame().unwrap().allocated_delta, 300);
        assert_eq!(sampler.end_frame().unwrap().allocated_delta, 0);
    }

    #[test]
    fn test_large_allocation_transitions_are_recorded() {
        let source = FakeSource::default();
        let mut sampler = MemorySampler::new(source.clone(), 1);
        sampler.end_frame();
        source.allocate(1 << 20, true);
        let sample = sampler.end_frame().unwrap();
        assert_eq!(sample.large_allocations, 1);
        assert_eq!(sampler.last_stats().large_allocations, 1);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut sampler = MemorySampler::new(FakeSource::default(), 1);
        for _ in 0..(SAMPLE_HISTORY + 10) {
            sampler.end_frame();
        }
        assert_eq!(sampler.history().count(), SAMPLE_HISTORY);
        assert_eq!(sampler.history().next().unwrap().frame, 11);
        assert_eq!(sampler.latest().unwrap().frame, SAMPLE_HISTORY as u64 + 10);
    }

    #[test]
    fn test_zero_interval_disables_sampling() {
        let mut sampler = MemorySampler::new(FakeSource::default(), 0);
        for _ in 0..10 {
            assert!(sampler.end_frame().is_none());
        }
        assert!(sampler.latest().is_none());
    }

    #[test]
    fn test_interval_change_keeps_baseline() {
        let source = FakeSource::default();
        let mut sampler = MemorySampler::new(source.clone(), 10);
        source.allocate(64, false);
        sampler.end_frame();
        sampler.set_interval(2);
        let sample = sampler.end_frame().unwrap();
        assert_eq!(sample.frame, 2);
        assert_eq!(sample.allocated_delta, 64);
    }

    #[test]
    fn test_tracking_allocator_updates_counters() {
        let allocator = TrackingAllocator::new(System);
        let layout = Layout::from_size_align(LARGE_ALLOCATION_BYTES * 2, 8).unwrap();
        let before = MemoryStats::snapshot();

        let ptr = unsafe { allocator.alloc(layout) };
        assert!(!ptr.is_null());
        let during = MemoryStats::snapshot();
        unsafe { allocator.dealloc(ptr, layout) };
        let after = MemoryStats::snapshot();

        assert!(during.allocations > before.allocations);
        assert!(during.large_allocations > before.large_allocations);
        assert!(during.total_allocated_bytes >= before.total_allocated_bytes + layout.size() as u64);
        assert!(during.peak_bytes >= layout.size() as u64);
        assert!(after.deallocations > during.deallocations);
    }
}
