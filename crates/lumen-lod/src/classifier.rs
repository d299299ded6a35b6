//! Distance-based LOD classification with configurable thresholds.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::level::LodLevel;

/// Errors returned when constructing [`LodSettings`] from custom values.
#[derive(Debug, Error, PartialEq)]
pub enum LodSettingsError {
    /// A threshold was zero, negative, or not finite.
    #[error("threshold {index} is not a positive finite distance: {value}")]
    NonPositive {
        /// Index of the offending threshold.
        index: usize,
        /// The rejected value.
        value: f32,
    },
    /// Thresholds were not strictly increasing.
    #[error("thresholds must be strictly increasing (index {index}: {value} <= {previous})")]
    NotIncreasing {
        /// Index of the offending threshold.
        index: usize,
        /// The rejected value.
        value: f32,
        /// The preceding threshold.
        previous: f32,
    },
}

/// Distance breakpoints between LOD levels.
///
/// `thresholds[i]` is the exclusive upper bound for level `i`; anything at or
/// beyond `thresholds[3]` is culled.
///
/// Serialized as the bare threshold array; deserialization validates it
/// through [`LodSettings::new`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[f32; 4]", into = "[f32; 4]")]
pub struct LodSettings {
    thresholds: [f32; 4],
}

impl TryFrom<[f32; 4]> for LodSettings {
    type Error = LodSettingsError;

    fn try_from(thresholds: [f32; 4]) -> Result<Self, Self::Error> {
        Self::new(thresholds)
    }
}

impl From<LodSettings> for [f32; 4] {
    fn from(settings: LodSettings) -> Self {
        settings.thresholds
    }
}

impl Default for LodSettings {
    /// High < 400, Medium < 800, Low < 1200, VeryLow < 1600.
    fn default() -> Self {
        Self {
            thresholds: [400.0, 800.0, 1200.0, 1600.0],
        }
    }
}

impl LodSettings {
    /// Create settings from custom thresholds.
    pub fn new(thresholds: [f32; 4]) -> Result<Self, LodSettingsError> {
        for (index, &value) in thresholds.iter().enumerate() {
            if !(value.is_finite() && value > 0.0) {
                return Err(LodSettingsError::NonPositive { index, value });
            }
            if index > 0 && value <= thresholds[index - 1] {
                return Err(LodSettingsError::NotIncreasing {
                    index,
                    value,
                    previous: thresholds[index - 1],
                });
            }
        }
        Ok(Self { thresholds })
    }

    /// Tighter distances for constrained hardware.
    pub fn aggressive() -> Self {
        Self {
            thresholds: [250.0, 500.0, 750.0, 1000.0],
        }
    }

    /// Wider distances for fast machines.
    pub fn relaxed() -> Self {
        Self {
            thresholds: [600.0, 1200.0, 1800.0, 2400.0],
        }
    }

    /// Return a copy with every threshold multiplied by `factor`.
    ///
    /// Non-positive or non-finite factors leave the settings unchanged.
    pub fn scaled(&self, factor: f32) -> Self {
        if !(factor.is_finite() && factor > 0.0) {
            return *self;
        }
        Self {
            thresholds: self.thresholds.map(|t| t * factor),
        }
    }

    /// The raw thresholds.
    pub fn thresholds(&self) -> [f32; 4] {
        self.thresholds
    }

    /// Distance at and beyond which objects are culled.
    pub fn cull_distance(&self) -> f32 {
        self.thresholds[3]
    }

    /// Classify a precomputed distance.
    pub fn classify_distance(&self, distance: f32) -> LodLevel {
        self.thresholds
            .iter()
            .position(|&t| distance < t)
            .and_then(LodLevel::from_ordinal)
            .unwrap_or(LodLevel::Culled)
    }
}

/// Euclidean distance between a position and the viewpoint.
pub fn distance(position: Vec3, viewpoint: Vec3) -> f32 {
    position.distance(viewpoint)
}

/// Classify `position` relative to `viewpoint`.
pub fn classify(position: Vec3, viewpoint: Vec3, settings: &LodSettings) -> LodLevel {
    settings.classify_distance(distance(position, viewpoint))
}

/// Continuous detail factor: `0.0` at the viewpoint, `1.0` at or past the cull distance.
pub fn blend_factor(position: Vec3, viewpoint: Vec3, settings: &LodSettings) -> f32 {
    (distance(position, viewpoint) / settings.cull_distance()).clamp(0.0, 1.0)
}
