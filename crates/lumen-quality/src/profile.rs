//! Global quality tiers and what each tier allows content to spend.

use serde::{Deserialize, Serialize};

/// Ordinal global quality tier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum QualityLevel {
    Minimal = 0,
    Low = 1,
    Medium = 2,
    /// Second-highest tier, used until the controller has evidence to move.
    #[default]
    High = 3,
    Ultra = 4,
}

impl QualityLevel {
    /// Number of tiers.
    pub const COUNT: usize = 5;

    /// All tiers, lowest first.
    pub const ALL: [QualityLevel; Self::COUNT] = [
        QualityLevel::Minimal,
        QualityLevel::Low,
        QualityLevel::Medium,
        QualityLevel::High,
        QualityLevel::Ultra,
    ];

    /// Lowest tier.
    pub const LOWEST: QualityLevel = QualityLevel::Minimal;

    /// Highest tier.
    pub const HIGHEST: QualityLevel = QualityLevel::Ultra;

    /// Ordinal in `0..COUNT`.
    pub fn ordinal(self) -> usize {
        self as usize
    }

    /// Tier for an ordinal, or `None` if out of range.
    pub fn from_ordinal(ordinal: usize) -> Option<Self> {
        Self::ALL.get(ordinal).copied()
    }

    /// One tier down, or `None` at the lowest tier.
    pub fn lower(self) -> Option<Self> {
        self.ordinal().checked_sub(1).and_then(Self::from_ordinal)
    }

    /// One tier up, or `None` at the highest tier.
    pub fn higher(self) -> Option<Self> {
        Self::from_ordinal(self.ordinal() + 1)
    }

    /// Capability row for this tier.
    pub fn profile(self) -> &'static QualityProfile {
        &QUALITY_PROFILES[self.ordinal()]
    }
}

/// Per-effect enable switches derived from a quality tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct EffectFlags {
    pub bloom: bool,
    pub trails: bool,
    pub distortion: bool,
    pub soft_particles: bool,
}

/// Budgets and multipliers content reads to scale its own detail.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct QualityProfile {
    /// Upper bound on live particles.
    pub max_particles: u32,
    /// Number of bloom blur layers (`0` disables bloom).
    pub bloom_layers: u32,
    /// Multiplier applied to emitter spawn rates.
    pub particle_density: f32,
    /// Multiplier applied to LOD distance thresholds.
    pub lod_distance_scale: f32,
    /// Effect switches.
    pub effects: EffectFlags,
}

/// Capability table indexed by [`QualityLevel::ordinal`].
pub const QUALITY_PROFILES: [QualityProfile; QualityLevel::COUNT] = [
    QualityProfile {
        max_particles: 500,
        bloom_layers: 0,
        particle_density: 0.25,
        lod_distance_scale: 0.5,
        effects: EffectFlags {
            bloom: false,
            trails: false,
            distortion: false,
            soft_particles: false,
        },
    },
    QualityProfile {
        max_particles: 1000,
        bloom_layers: 1,
        particle_density: 0.5,
        lod_distance_scale: 0.7,
        effects: EffectFlags {
            bloom: true,
            trails: true,
            distortion: false,
            soft_particles: false,
        },
    },
    QualityProfile {
        max_particles: 2000,
        bloom_layers: 2,
        particle_density: 0.75,
        lod_distance_scale: 0.85,
        effects: EffectFlags {
            bloom: true,
            trails: true,
            distortion: true,
            soft_particles: false,
        },
    },
    QualityProfile {
        max_particles: 4000,
        bloom_layers: 3,
        particle_density: 1.0,
        lod_distance_scale: 1.0,
        effects: EffectFlags {
            bloom: true,
            trails: true,
            distortion: true,
            soft_particles: true,
        },
    },
    QualityProfile {
        max_particles: 8000,
        bloom_layers: 4,
        particle_density: 1.0,
        lod_distance_scale: 1.25,
        effects: EffectFlags {
            bloom: true,
            trails: true,
            distortion: true,
            soft_particles: true,
        },
    },
];
