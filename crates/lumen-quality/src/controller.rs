//! Frame-time driven quality controller with asymmetric hysteresis.
//!
//! The controller only reconsiders its level after a minimum number of
//! stable frames, and requires twice that before spending more detail. Any
//! change (automatic or explicit) clears the history and restarts the count.

use serde::{Deserialize, Serialize};

use crate::history::FrameTimeHistory;
use crate::profile::{QualityLevel, QualityProfile};

/// Samples kept in the frame time window.
pub const DEFAULT_HISTORY_CAPACITY: usize = 60;

/// Stable frames required before any level change.
pub const DEFAULT_MIN_FRAMES_BEFORE_CHANGE: u32 = 60;

/// Frame time bounds that trigger a level change.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct QualityThresholds {
    /// Downgrade when the mean frame time exceeds this (ms).
    pub max_frame_time_ms: f32,
    /// Upgrade when the mean frame time is below this (ms).
    pub min_frame_time_ms: f32,
    /// Stable frames before a downgrade; an upgrade needs twice as many.
    pub min_frames_before_change: u32,
    /// Frame time window size.
    pub history_capacity: usize,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            max_frame_time_ms: 20.0,
            min_frame_time_ms: 12.0,
            min_frames_before_change: DEFAULT_MIN_FRAMES_BEFORE_CHANGE,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

impl QualityThresholds {
    /// Downgrades sooner and upgrades only on a comfortable margin.
    pub fn aggressive() -> Self {
        Self {
            max_frame_time_ms: 17.5,
            min_frame_time_ms: 10.0,
            ..Self::default()
        }
    }

    /// Tolerates slower frames before giving up detail.
    pub fn relaxed() -> Self {
        Self {
            max_frame_time_ms: 25.0,
            min_frame_time_ms: 14.0,
            ..Self::default()
        }
    }
}

/// A level transition made by [`QualityController::tick`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QualityChange {
    pub from: QualityLevel,
    pub to: QualityLevel,
    /// Mean frame time that triggered the change.
    pub mean_frame_time_ms: f32,
}

/// Adjusts the global quality level from measured frame times.
#[derive(Clone, Debug)]
pub struct QualityController {
    level: QualityLevel,
    thresholds: QualityThresholds,
    history: FrameTimeHistory,
    frames_since_change: u32,
    adaptive: bool,
}

impl QualityController {
    /// Create a controller at the default level.
    pub fn new(thresholds: QualityThresholds) -> Self {
        Self::with_level(thresholds, QualityLevel::default())
    }

    /// Create a controller starting at `level`.
    pub fn with_level(thresholds: QualityThresholds, level: QualityLevel) -> Self {
        Self {
            level,
            history: FrameTimeHistory::new(thresholds.history_capacity),
            thresholds,
            frames_since_change: 0,
            adaptive: true,
        }
    }

    /// Feed one frame's duration. Returns the change if the level moved.
    ///
    /// Non-finite or negative frame times are discarded without counting
    /// as a frame.
    pub fn tick(&mut self, frame_time_ms: f32) -> Option<QualityChange> {
        if !frame_time_ms.is_finite() || frame_time_ms < 0.0 {
            log::warn!("Ignoring invalid frame time {frame_time_ms}");
            return None;
        }
        self.history.push(frame_time_ms);
        self.frames_since_change = self.frames_since_change.saturating_add(1);

        if !self.adaptive {
            return None;
        }
        let min_frames = self.thresholds.min_frames_before_change;
        if self.frames_since_change < min_frames {
            return None;
        }
        if self.history.len() < self.history.capacity() / 2 {
            return None;
        }
        let mean = self.history.mean()?;

        let candidate = if mean > self.thresholds.max_frame_time_ms {
            self.level.lower()
        } else if mean < self.thresholds.min_frame_time_ms
            && self.frames_since_change > min_frames.saturating_mul(2)
        {
            self.level.higher()
        } else {
            None
        };
        let target = candidate?;

        let change = QualityChange {
            from: self.level,
            to: target,
            mean_frame_time_ms: mean,
        };
        log::info!(
            "Quality {:?} -> {:?} (mean frame time {:.2} ms)",
            change.from,
            change.to,
            mean
        );
        self.apply(target);
        Some(change)
    }

    /// Force a level, clearing the history and stable-frame count.
    pub fn set_level(&mut self, level: QualityLevel) {
        if level != self.level {
            log::info!("Quality {:?} -> {:?} (explicit)", self.level, level);
        }
        self.apply(level);
    }

    /// Enable or disable automatic adjustment. Samples are still recorded.
    pub fn set_adaptive(&mut self, adaptive: bool) {
        self.adaptive = adaptive;
    }

    /// Whether automatic adjustment is enabled.
    pub fn is_adaptive(&self) -> bool {
        self.adaptive
    }

    /// Current level.
    pub fn level(&self) -> QualityLevel {
        self.level
    }

    /// Capability row for the current level.
    pub fn profile(&self) -> &'static QualityProfile {
        self.level.profile()
    }

    /// Mean of the retained frame times.
    pub fn average_frame_time_ms(&self) -> Option<f32> {
        self.history.mean()
    }

    /// Frames since the last level change.
    pub fn frames_since_change(&self) -> u32 {
        self.frames_since_change
    }

    /// Active thresholds.
    pub fn thresholds(&self) -> &QualityThresholds {
        &self.thresholds
    }

    /// Recent frame times.
    pub fn history(&self) -> &FrameTimeHistory {
        &self.history
    }

    fn apply(&mut self, level: QualityLevel) {
        self.level = level;
        self.history.clear();
        self.frames_since_change = 0;
    }
}

impl Default for QualityController {
    fn default() -> Self {
        Self::new(QualityThresholds::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SLOW: f32 = 33.0;
    const FAST: f32 = 5.0;
    const STEADY: f32 = 16.0;

    fn feed(controller: &mut QualityController, ms: f32, frames: u32) -> Vec<QualityChange> {
        (0..frames).filter_map(|_| controller.tick(ms)).collect()
    }

    #[test]
    fn test_starts_at_default_level() {
        let controller = QualityController::default();
        assert_eq!(controller.level(), QualityLevel::High);
        assert_eq!(controller.average_frame_time_ms(), None);
    }

    #[test]
    fn test_downgrade_waits_for_min_frames() {
        let mut controller = QualityController::default();
        assert!(feed(&mut controller, SLOW, 59).is_empty());
        assert_eq!(controller.level(), QualityLevel::High);

        let change = controller.tick(SLOW).expect("60th slow frame downgrades");
        assert_eq!(change.from, QualityLevel::High);
        assert_eq!(change.to, QualityLevel::Medium);
        assert_eq!(controller.level(), QualityLevel::Medium);
        assert_eq!(controller.frames_since_change(), 0);
        assert!(controller.history().is_empty());
    }

    #[test]
    fn test_upgrade_needs_twice_the_stable_frames() {
        let mut controller = QualityController::default();
        assert!(feed(&mut controller, FAST, 120).is_empty());
        assert_eq!(controller.level(), QualityLevel::High);

        let change = controller.tick(FAST).expect("121st fast frame upgrades");
        assert_eq!(change.to, QualityLevel::Ultra);
    }

    #[test]
    fn test_level_saturates_at_bounds() {
        let mut controller =
            QualityController::with_level(QualityThresholds::default(), QualityLevel::Ultra);
        assert!(feed(&mut controller, FAST, 500).is_empty());
        assert_eq!(controller.level(), QualityLevel::Ultra);

        controller.set_level(QualityLevel::Minimal);
        assert!(feed(&mut controller, SLOW, 500).is_empty());
        assert_eq!(controller.level(), QualityLevel::Minimal);
    }

    #[test]
    fn test_sustained_load_steps_down_one_level_per_window() {
        let mut controller = QualityController::default();
        let changes = feed(&mut controller, SLOW, 180);
        let levels: Vec<_> = changes.iter().map(|c| c.to).collect();
        assert_eq!(
            levels,
            vec![QualityLevel::Medium, QualityLevel::Low, QualityLevel::Minimal]
        );
    }

    #[test]
    fn test_steady_frames_inside_band_never_change() {
        let mut controller = QualityController::default();
        assert!(feed(&mut controller, STEADY, 1000).is_empty());
        assert_eq!(controller.level(), QualityLevel::High);
    }

    #[test]
    fn test_spike_is_absorbed_by_the_mean() {
        let mut controller = QualityController::default();
        feed(&mut controller, STEADY, 59);
        // One 50 ms hitch raises the 60-frame mean to ~16.6 ms, well under 20.
        assert!(controller.tick(50.0).is_none());
        assert_eq!(controller.level(), QualityLevel::High);
    }

    #[test]
    fn test_invalid_frame_times_are_ignored() {
        let mut controller = QualityController::default();
        for ms in [f32::NAN, f32::INFINITY, -1.0] {
            assert!(controller.tick(ms).is_none());
        }
        assert!(controller.history().is_empty());
        assert_eq!(controller.frames_since_change(), 0);

        let changes = feed(&mut controller, SLOW, 60);
        assert_eq!(changes.len(), 1);
        assert_eq!(controller.level(), QualityLevel::Medium);
    }

    #[test]
    fn test_set_level_resets_history() {
        let mut controller = QualityController::default();
        feed(&mut controller, SLOW, 59);
        controller.set_level(QualityLevel::Low);
        assert_eq!(controller.level(), QualityLevel::Low);
        assert_eq!(controller.frames_since_change(), 0);
        // A full window is needed again before the next downgrade.
        assert!(feed(&mut controller, SLOW, 59).is_empty());
        assert_eq!(controller.level(), QualityLevel::Low);
    }

    #[test]
    fn test_non_adaptive_controller_holds_level() {
        let mut controller = QualityController::default();
        controller.set_adaptive(false);
        assert!(feed(&mut controller, SLOW, 300).is_empty());
        assert_eq!(controller.level(), QualityLevel::High);
        assert!((controller.average_frame_time_ms().unwrap() - SLOW).abs() < 1e-3);
    }

    #[test]
    fn test_presets_order() {
        let aggressive = QualityThresholds::aggressive();
        let default = QualityThresholds::default();
        let relaxed = QualityThresholds::relaxed();
        assert!(aggressive.max_frame_time_ms < default.max_frame_time_ms);
        assert!(default.max_frame_time_ms < relaxed.max_frame_time_ms);
        for t in [aggressive, default, relaxed] {
            assert!(t.min_frame_time_ms < t.max_frame_time_ms);
        }
    }

    #[test]
    fn test_thresholds_ron_roundtrip() {
        let thresholds = QualityThresholds::relaxed();
        let text = ron::to_string(&thresholds).unwrap();
        let parsed: QualityThresholds = ron::from_str(&text).unwrap();
        assert_eq!(parsed, thresholds);
    }
}
