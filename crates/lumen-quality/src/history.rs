//! Bounded window of recent frame times.

use std::collections::VecDeque;

/// Fixed-capacity queue of frame time samples in milliseconds.
///
/// Pushing beyond capacity drops the oldest sample.
#[derive(Clone, Debug)]
pub struct FrameTimeHistory {
    samples: VecDeque<f32>,
    capacity: usize,
}

impl FrameTimeHistory {
    /// Create an empty history holding at most `capacity` samples (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record a sample, evicting the oldest one if full.
    pub fn push(&mut self, frame_time_ms: f32) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(frame_time_ms);
    }

    /// Drop every sample.
    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Mean of the retained samples, or `None` if empty.
    pub fn mean(&self) -> Option<f32> {
        if self.samples.is_empty() {
            return None;
        }
        let sum: f64 = self.samples.iter().map(|&ms| ms as f64).sum();
        Some((sum / self.samples.len() as f64) as f32)
    }

    /// Number of retained samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether no samples are retained.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Maximum number of retained samples.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Retained samples, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = f32> + '_ {
        self.samples.iter().copied()
    }
}
