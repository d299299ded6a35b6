//! Closed-loop quality control: frame time sampling, hysteresis-guarded
//! quality level changes, and the per-level capability table content queries.

mod controller;
mod history;
mod profile;

pub use controller::{
    DEFAULT_HISTORY_CAPACITY, DEFAULT_MIN_FRAMES_BEFORE_CHANGE, QualityChange, QualityController,
    QualityThresholds,
};
pub use history::FrameTimeHistory;
pub use profile::{EffectFlags, QUALITY_PROFILES, QualityLevel, QualityProfile};
