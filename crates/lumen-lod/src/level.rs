//! Discrete detail tiers and the fixed per-tier lookup tables.

use serde::{Deserialize, Serialize};

/// Ordinal detail tier, from full detail to not drawn at all.
///
/// Ordering follows the ordinal: `High < Medium < Low < VeryLow < Culled`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LodLevel {
    /// Full detail.
    #[default]
    High = 0,
    /// Reduced detail.
    Medium = 1,
    /// Low detail, throttled updates.
    Low = 2,
    /// Minimal detail, heavily throttled updates.
    VeryLow = 3,
    /// Beyond the cull distance. Not drawn, not updated unless opted in.
    Culled = 4,
}

impl LodLevel {
    /// Number of levels.
    pub const COUNT: usize = 5;

    /// All levels in ordinal order.
    pub const ALL: [LodLevel; Self::COUNT] = [
        LodLevel::High,
        LodLevel::Medium,
        LodLevel::Low,
        LodLevel::VeryLow,
        LodLevel::Culled,
    ];

    /// Ordinal index in `0..COUNT`.
    pub fn ordinal(self) -> usize {
        self as usize
    }

    /// Level for an ordinal, or `None` if out of range.
    pub fn from_ordinal(ordinal: usize) -> Option<Self> {
        Self::ALL.get(ordinal).copied()
    }

    /// The lookup table row for this level.
    pub fn table(self) -> &'static LevelTable {
        &LEVEL_TABLE[self.ordinal()]
    }

    /// How many frames pass between updates at this level. `0` means never.
    pub fn update_frequency(self) -> u32 {
        self.table().update_frequency
    }

    /// Detail multiplier in `[0.0, 1.0]`.
    pub fn quality_multiplier(self) -> f32 {
        self.table().quality_multiplier
    }

    /// Suggested segment count for procedural geometry (trails, beams, rings).
    pub fn segment_count(self) -> u32 {
        self.table().segment_count
    }

    /// Suggested particle count for an emitter at this level.
    pub fn particle_count(self) -> u32 {
        self.table().particle_count
    }

    /// Whether anything should be drawn at this level.
    pub fn is_visible(self) -> bool {
        self != LodLevel::Culled
    }
}

/// Fixed per-level values derived from an [`LodLevel`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LevelTable {
    /// Frames between updates (`0` = never unless the object opts in).
    pub update_frequency: u32,
    /// Detail multiplier, `1.0` at `High` down to `0.0` at `Culled`.
    pub quality_multiplier: f32,
    /// Suggested segment count.
    pub segment_count: u32,
    /// Suggested particle count.
    pub particle_count: u32,
}

/// Lookup table indexed by [`LodLevel::ordinal`].
pub const LEVEL_TABLE: [LevelTable; LodLevel::COUNT] = [
    LevelTable {
        update_frequency: 1,
        quality_multiplier: 1.0,
        segment_count: 32,
        particle_count: 100,
    },
    LevelTable {
        update_frequency: 2,
        quality_multiplier: 0.75,
        segment_count: 16,
        particle_count: 60,
    },
    LevelTable {
        update_frequency: 3,
        quality_multiplier: 0.5,
        segment_count: 8,
        particle_count: 30,
    },
    LevelTable {
        update_frequency: 6,
        quality_multiplier: 0.25,
        segment_count: 4,
        particle_count: 10,
    },
    LevelTable {
        update_frequency: 0,
        quality_multiplier: 0.0,
        segment_count: 0,
        particle_count: 0,
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordinals_are_sequential() {
        for (i, level) in LodLevel::ALL.iter().enumerate() {
            assert_eq!(level.ordinal(), i);
            assert_eq!(LodLevel::from_ordinal(i), Some(*level));
        }
        assert_eq!(LodLevel::from_ordinal(5), None);
    }

    #[test]
    fn test_ordering_matches_ordinal() {
        assert!(LodLevel::High < LodLevel::Medium);
        assert!(LodLevel::VeryLow < LodLevel::Culled);
    }

    #[test]
    fn test_culled_is_never_updated() {
        assert_eq!(LodLevel::Culled.update_frequency(), 0);
        assert_eq!(LodLevel::Culled.quality_multiplier(), 0.0);
        assert!(!LodLevel::Culled.is_visible());
    }

    #[test]
    fn test_low_updates_every_third_frame() {
        assert_eq!(LodLevel::Low.update_frequency(), 3);
    }

    /// Detail values must never increase as the level gets coarser.
    #[test]
    fn test_tables_are_monotone() {
        for pair in LEVEL_TABLE.windows(2) {
            assert!(pair[0].quality_multiplier >= pair[1].quality_multiplier);
            assert!(pair[0].segment_count >= pair[1].segment_count);
            assert!(pair[0].particle_count >= pair[1].particle_count);
        }
        assert_eq!(LodLevel::High.quality_multiplier(), 1.0);
    }
}
