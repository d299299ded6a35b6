//! Level-of-detail management: distance-based classification, per-level detail
//! tables, and a throttling scheduler for updatable objects.

mod classifier;
mod level;
mod registry;

pub use classifier::{LodSettings, LodSettingsError, blend_factor, classify, distance};
pub use level::{LEVEL_TABLE, LevelTable, LodLevel};
pub use registry::{LodRegistry, LodStats, SharedUpdatable, Updatable};
