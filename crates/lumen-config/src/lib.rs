//! Runtime configuration for the performance layer.
//!
//! Settings persist to disk as `perf.ron`, accept clap CLI overrides, and can
//! be hot-reloaded. Every section uses `#[serde(default)]` so older or partial
//! files keep loading.

mod cli;
mod config;
mod error;

pub use cli::{CliArgs, DEFAULT_FRAMES};
pub use config::{
    BatchingConfig, CONFIG_FILE_NAME, DebugConfig, LodConfig, PerfConfig, PoolConfig, Preset,
    ProfilerConfig, QualityConfig,
};
pub use error::ConfigError;
