//! Named section timers.
//!
//! Sections nest on an explicit stack: [`Profiler::end`] must close the most
//! recently opened section. A mismatched close is logged and counted, and the
//! offending stack entry is discarded; it never panics.

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Recent durations retained per section.
pub const HISTORY_CAPACITY: usize = 1000;

/// Frames between automatic reports.
pub const DEFAULT_REPORT_INTERVAL: u64 = 300;

/// Sections listed in each report.
pub const DEFAULT_TOP_N: usize = 10;

// ---------------------------------------------------------------------------
// ProfileSample
// ---------------------------------------------------------------------------

/// Aggregated timings for one named section.
#[derive(Clone, Debug)]
pub struct ProfileSample {
    name: String,
    count: u64,
    total: Duration,
    min: Duration,
    max: Duration,
    history: VecDeque<Duration>,
}

impl ProfileSample {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            count: 0,
            total: Duration::ZERO,
            min: Duration::MAX,
            max: Duration::ZERO,
            history: VecDeque::new(),
        }
    }

    fn record(&mut self, elapsed: Duration) {
        self.count += 1;
        self.total += elapsed;
        self.min = self.min.min(elapsed);
        self.max = self.max.max(elapsed);
        if self.history.len() == HISTORY_CAPACITY {
            self.history.pop_front();
        }
        self.history.push_back(elapsed);
    }

    fn clear_aggregates(&mut self) {
        self.count = 0;
        self.total = Duration::ZERO;
        self.min = Duration::MAX;
        self.max = Duration::ZERO;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Completed sections since the last report.
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn total(&self) -> Duration {
        self.total
    }

    /// Shortest duration since the last report, or zero if none.
    pub fn min(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            self.min
        }
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Mean duration since the last report.
    pub fn average(&self) -> Duration {
        if self.count == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos((self.total.as_nanos() / u128::from(self.count)) as u64)
    }

    /// Nearest-rank percentile over the retained history. `p` is in `[0, 100]`.
    pub fn percentile(&self, p: f64) -> Option<Duration> {
        if self.history.is_empty() {
            return None;
        }
        let mut sorted: Vec<Duration> = self.history.iter().copied().collect();
        sorted.sort_unstable();
        let rank = (p.clamp(0.0, 100.0) * sorted.len() as f64 / 100.0).ceil() as usize;
        Some(sorted[rank.saturating_sub(1).min(sorted.len() - 1)])
    }

    /// Durations retained across reports, oldest first.
    pub fn history(&self) -> impl Iterator<Item = Duration> + '_ {
        self.history.iter().copied()
    }
}

// ---------------------------------------------------------------------------
// ProfileReport
// ---------------------------------------------------------------------------

/// One row of a [`ProfileReport`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub name: String,
    pub count: u64,
    pub total_ms: f64,
    pub average_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
}

/// Sections ordered by total time, heaviest first.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileReport {
    pub frame: u64,
    pub entries: Vec<ReportEntry>,
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

// ---------------------------------------------------------------------------
// Profiler
// ---------------------------------------------------------------------------

/// Collects section timings and emits a report every `report_interval` frames.
pub struct Profiler {
    samples: FxHashMap<String, ProfileSample>,
    stack: Vec<(String, Instant)>,
    enabled: bool,
    frame: u64,
    report_interval: u64,
    top_n: usize,
    misuse_count: u64,
}

impl Profiler {
    /// `report_interval` of zero disables automatic reports.
    pub fn new(report_interval: u64, top_n: usize) -> Self {
        Self {
            samples: FxHashMap::default(),
            stack: Vec::new(),
            enabled: true,
            frame: 0,
            report_interval,
            top_n,
            misuse_count: 0,
        }
    }

    /// Open a section.
    pub fn begin(&mut self, name: &str) {
        if !self.enabled {
            return;
        }
        if !self.samples.contains_key(name) {
            self.samples.insert(name.to_string(), ProfileSample::new(name));
        }
        self.stack.push((name.to_string(), Instant::now()));
    }

    /// Close the innermost section, which must be `name`.
    ///
    /// Returns the elapsed time, or `None` if the stack was empty or its top
    /// was a different section (that entry is dropped).
    pub fn end(&mut self, name: &str) -> Option<Duration> {
        if !self.enabled {
            return None;
        }
        let Some((open, started)) = self.stack.pop() else {
            tracing::warn!(section = name, "Profiler end without a matching begin");
            self.misuse_count += 1;
            return None;
        };
        if open != name {
            tracing::warn!(
                expected = %open,
                got = name,
                "Profiler sections closed out of order"
            );
            self.misuse_count += 1;
            return None;
        }
        let elapsed = started.elapsed();
        self.record(name, elapsed);
        Some(elapsed)
    }

    /// Open `name` and close it when the returned guard drops.
    ///
    /// The guard derefs to the profiler, so nested scopes open through it.
    pub fn scope(&mut self, name: &str) -> ProfileScope<'_> {
        self.begin(name);
        ProfileScope {
            profiler: self,
            name: name.to_string(),
        }
    }

    /// Add an externally measured duration to `name`'s aggregates.
    pub fn record(&mut self, name: &str, elapsed: Duration) {
        if !self.enabled {
            return;
        }
        self.samples
            .entry(name.to_string())
            .or_insert_with(|| ProfileSample::new(name))
            .record(elapsed);
    }

    /// Mark the end of a frame. Every `report_interval` frames this logs and
    /// returns a report, then clears the aggregates (history is kept).
    pub fn end_frame(&mut self) -> Option<ProfileReport> {
        self.frame += 1;
        if !self.enabled || self.report_interval == 0 || self.frame % self.report_interval != 0 {
            return None;
        }
        let report = self.report();
        for entry in &report.entries {
            tracing::info!(
                "{:<24} {:>6} calls  total {:>9.3} ms  avg {:>7.3} ms  min {:>7.3} ms  max {:>7.3} ms",
                entry.name,
                entry.count,
                entry.total_ms,
                entry.average_ms,
                entry.min_ms,
                entry.max_ms
            );
        }
        for sample in self.samples.values_mut() {
            sample.clear_aggregates();
        }
        Some(report)
    }

    /// The current top-N sections by total time, without clearing anything.
    pub fn report(&self) -> ProfileReport {
        ProfileReport {
            frame: self.frame,
            entries: self
                .top_n(self.top_n)
                .into_iter()
                .map(|s| ReportEntry {
                    name: s.name.clone(),
                    count: s.count,
                    total_ms: millis(s.total),
                    average_ms: millis(s.average()),
                    min_ms: millis(s.min()),
                    max_ms: millis(s.max),
                })
                .collect(),
        }
    }

    /// Up to `n` sections with recorded time, heaviest first. Ties are
    /// broken by name.
    pub fn top_n(&self, n: usize) -> Vec<&ProfileSample> {
        let mut active: Vec<&ProfileSample> =
            self.samples.values().filter(|s| s.count > 0).collect();
        active.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.name.cmp(&b.name)));
        active.truncate(n);
        active
    }

    pub fn sample(&self, name: &str) -> Option<&ProfileSample> {
        self.samples.get(name)
    }

    /// Open sections, innermost last.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Mismatched or unmatched `end` calls so far.
    pub fn misuse_count(&self) -> u64 {
        self.misuse_count
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Change the report cadence. Zero disables automatic reports.
    pub fn set_report_interval(&mut self, report_interval: u64) {
        self.report_interval = report_interval;
    }

    pub fn report_interval(&self) -> u64 {
        self.report_interval
    }

    /// Change how many sections each report lists.
    pub fn set_top_n(&mut self, top_n: usize) {
        self.top_n = top_n;
    }

    /// Disabling drops any open sections.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.stack.clear();
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Forget every section and all history.
    pub fn reset(&mut self) {
        self.samples.clear();
        self.stack.clear();
    }
}

impl Default for Profiler {
    fn default() -> Self {
        Self::new(DEFAULT_REPORT_INTERVAL, DEFAULT_TOP_N)
    }
}

// ---------------------------------------------------------------------------
// ProfileScope
// ---------------------------------------------------------------------------

/// Guard returned by [`Profiler::scope`]. Closes its section on drop.
pub struct ProfileScope<'a> {
    profiler: &'a mut Profiler,
    name: String,
}

impl Deref for ProfileScope<'_> {
    type Target = Profiler;

    fn deref(&self) -> &Profiler {
        &*self.profiler
    }
}

impl DerefMut for ProfileScope<'_> {
    fn deref_mut(&mut self) -> &mut Profiler {
        &mut *self.profiler
    }
}

impl Drop for ProfileScope<'_> {
    fn drop(&mut self) {
        self.profiler.end(&self.name);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
