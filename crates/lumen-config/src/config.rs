//! Configuration structs with sensible defaults and RON persistence.

use std::path::Path;

use lumen_lod::LodSettings;
use lumen_quality::{QualityLevel, QualityThresholds};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// File name used inside the config directory.
pub const CONFIG_FILE_NAME: &str = "perf.ron";

/// Named tuning presets shared by the LOD and quality sections.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
pub enum Preset {
    #[default]
    Default,
    /// Trade detail for frame time early.
    Aggressive,
    /// Keep detail longer under load.
    Relaxed,
}

/// Top-level performance configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PerfConfig {
    /// Level-of-detail distances.
    pub lod: LodConfig,
    /// Adaptive quality controller.
    pub quality: QualityConfig,
    /// Buffer pool eviction.
    pub pool: PoolConfig,
    /// Draw batching.
    pub batching: BatchingConfig,
    /// Frame profiler and memory sampler.
    pub profiler: ProfilerConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// LOD distance configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LodConfig {
    /// Preset used when no custom thresholds are given.
    pub preset: Preset,
    /// High/Medium/Low/VeryLow breakpoints in world units, strictly increasing.
    pub custom_thresholds: Option<[f32; 4]>,
}

/// Quality controller configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QualityConfig {
    /// Preset supplying the frame time bounds.
    pub preset: Preset,
    /// Let the controller change levels from measured frame times.
    pub adaptive: bool,
    /// Starting level ordinal, 0 (Minimal) to 4 (Ultra).
    pub initial_level: Option<u8>,
    /// Override for the downgrade bound (ms).
    pub max_frame_time_ms: Option<f32>,
    /// Override for the upgrade bound (ms).
    pub min_frame_time_ms: Option<f32>,
}

/// Buffer pool eviction configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PoolConfig {
    /// Smallest idle buffers always kept by a trim.
    pub keep_count: usize,
    /// Frames a buffer may sit idle before it can be trimmed.
    pub max_idle_frames: u64,
    /// Frames between trims (0 = never).
    pub trim_interval_frames: u64,
}

/// Draw batching configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BatchingConfig {
    /// Requests a single draw queue holds before it must be flushed.
    pub queue_capacity: usize,
}

/// Profiler configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProfilerConfig {
    /// Record section timings.
    pub enabled: bool,
    /// Frames between logged reports (0 = never).
    pub report_interval_frames: u64,
    /// Sections listed per report.
    pub top_n: usize,
    /// Frames between memory samples (0 = never).
    pub memory_sample_interval_frames: u64,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
}

// --- Default implementations ---

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            preset: Preset::Default,
            adaptive: true,
            initial_level: None,
            max_frame_time_ms: None,
            min_frame_time_ms: None,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            keep_count: 4,
            max_idle_frames: 300,
            trim_interval_frames: 120,
        }
    }
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
        }
    }
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            report_interval_frames: 300,
            top_n: 10,
            memory_sample_interval_frames: 60,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

// --- Conversions ---

impl LodConfig {
    /// Resolve to classifier settings. Custom thresholds win over the preset.
    pub fn settings(&self) -> Result<LodSettings, ConfigError> {
        if let Some(thresholds) = self.custom_thresholds {
            return Ok(LodSettings::new(thresholds)?);
        }
        Ok(match self.preset {
            Preset::Default => LodSettings::default(),
            Preset::Aggressive => LodSettings::aggressive(),
            Preset::Relaxed => LodSettings::relaxed(),
        })
    }
}

impl QualityConfig {
    /// Resolve to controller thresholds, applying any per-bound overrides.
    pub fn thresholds(&self) -> QualityThresholds {
        let mut thresholds = match self.preset {
            Preset::Default => QualityThresholds::default(),
            Preset::Aggressive => QualityThresholds::aggressive(),
            Preset::Relaxed => QualityThresholds::relaxed(),
        };
        if let Some(max) = self.max_frame_time_ms {
            thresholds.max_frame_time_ms = max;
        }
        if let Some(min) = self.min_frame_time_ms {
            thresholds.min_frame_time_ms = min;
        }
        thresholds
    }

    /// Starting level, defaulting to the controller's default.
    pub fn initial_level(&self) -> Result<QualityLevel, ConfigError> {
        match self.initial_level {
            None => Ok(QualityLevel::default()),
            Some(ordinal) => QualityLevel::from_ordinal(ordinal as usize).ok_or_else(|| {
                ConfigError::Invalid(format!("quality.initial_level {ordinal} is not in 0..=4"))
            }),
        }
    }
}

// --- Load / Save / Reload ---

impl PerfConfig {
    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.lod.settings()?;
        self.quality.initial_level()?;

        let thresholds = self.quality.thresholds();
        if !(thresholds.min_frame_time_ms > 0.0
            && thresholds.min_frame_time_ms < thresholds.max_frame_time_ms)
        {
            return Err(ConfigError::Invalid(format!(
                "quality frame time bounds must satisfy 0 < min < max, got {} / {}",
                thresholds.min_frame_time_ms, thresholds.max_frame_time_ms
            )));
        }
        if self.batching.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "batching.queue_capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: PerfConfig = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            config.validate()?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = PerfConfig::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `perf.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join(CONFIG_FILE_NAME);
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    ///
    /// A changed file that fails validation is an error; the caller keeps the
    /// current config.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);
        let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
        let new_config: PerfConfig = ron::from_str(&contents).map_err(ConfigError::ParseError)?;

        if &new_config == self {
            return Ok(None);
        }
        new_config.validate()?;
        log::info!("Config reloaded with changes");
        Ok(Some(new_config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = PerfConfig::default();
        let ron_str =
            ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::new().depth_limit(3))
                .unwrap();
        assert!(ron_str.contains("queue_capacity: 1024"));
        assert!(ron_str.contains("preset: Default"));
    }

    #[test]
    fn test_config_roundtrip() {
        let mut config = PerfConfig::default();
        config.lod.custom_thresholds = Some([100.0, 200.0, 300.0, 400.0]);
        config.quality.initial_level = Some(2);
        let ron_str = ron::to_string(&config).unwrap();
        let deserialized: PerfConfig = ron::from_str(&ron_str).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let config: PerfConfig = ron::from_str("(lod: (preset: Relaxed))").unwrap();
        assert_eq!(config.lod.preset, Preset::Relaxed);
        assert_eq!(config.quality, QualityConfig::default());
        assert_eq!(config.pool, PoolConfig::default());
    }

    #[test]
    fn test_extra_field_ignored() {
        let result: Result<PerfConfig, _> = ron::from_str("(future_setting: true)");
        assert!(result.is_ok());
    }

    #[test]
    fn test_invalid_ron_produces_error() {
        let result: Result<PerfConfig, _> = ron::from_str("{{not valid}}");
        assert!(result.is_err());
    }

    #[test]
    fn test_lod_presets_resolve() {
        let mut lod = LodConfig::default();
        assert_eq!(lod.settings().unwrap().thresholds(), [400.0, 800.0, 1200.0, 1600.0]);
        lod.preset = Preset::Aggressive;
        assert_eq!(lod.settings().unwrap().thresholds(), [250.0, 500.0, 750.0, 1000.0]);
        lod.preset = Preset::Relaxed;
        assert_eq!(lod.settings().unwrap().thresholds(), [600.0, 1200.0, 1800.0, 2400.0]);
    }

    #[test]
    fn test_custom_thresholds_override_preset() {
        let lod = LodConfig {
            preset: Preset::Aggressive,
            custom_thresholds: Some([10.0, 20.0, 30.0, 40.0]),
        };
        assert_eq!(lod.settings().unwrap().cull_distance(), 40.0);
    }

    #[test]
    fn test_decreasing_custom_thresholds_rejected() {
        let mut config = PerfConfig::default();
        config.lod.custom_thresholds = Some([400.0, 300.0, 500.0, 600.0]);
        assert!(matches!(config.validate(), Err(ConfigError::LodThresholds(_))));
    }

    #[test]
    fn test_quality_overrides_apply() {
        let quality = QualityConfig {
            preset: Preset::Relaxed,
            max_frame_time_ms: Some(30.0),
            ..QualityConfig::default()
        };
        let thresholds = quality.thresholds();
        assert_eq!(thresholds.max_frame_time_ms, 30.0);
        assert_eq!(thresholds.min_frame_time_ms, 14.0);
    }

    #[test]
    fn test_inverted_frame_time_bounds_rejected() {
        let mut config = PerfConfig::default();
        config.quality.min_frame_time_ms = Some(25.0);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_initial_level_out_of_range_rejected() {
        let mut config = PerfConfig::default();
        config.quality.initial_level = Some(4);
        assert_eq!(config.quality.initial_level().unwrap(), QualityLevel::Ultra);
        config.quality.initial_level = Some(5);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_zero_queue_capacity_rejected() {
        let mut config = PerfConfig::default();
        config.batching.queue_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = PerfConfig::default();
        config.quality.preset = Preset::Aggressive;
        config.pool.keep_count = 8;
        config.debug.log_level = "debug".to_string();

        config.save(dir.path()).unwrap();
        let loaded = PerfConfig::load_or_create(dir.path()).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_load_or_create_writes_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = PerfConfig::load_or_create(dir.path()).unwrap();
        assert_eq!(config, PerfConfig::default());
        assert!(dir.path().join(CONFIG_FILE_NAME).exists());
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "(batching: (queue_capacity: 0))",
        )
        .unwrap();
        assert!(PerfConfig::load_or_create(dir.path()).is_err());
    }

    #[test]
    fn test_reload_detects_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = PerfConfig::default();
        config.save(dir.path()).unwrap();

        let mut modified = config.clone();
        modified.profiler.top_n = 3;
        modified.save(dir.path()).unwrap();

        let result = config.reload(dir.path()).unwrap();
        assert_eq!(result.unwrap().profiler.top_n, 3);
    }

    #[test]
    fn test_reload_no_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = PerfConfig::default();
        config.save(dir.path()).unwrap();
        assert!(config.reload(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_ron_comments_accepted() {
        let ron_str = "// perf tuning\n(\n  // nothing overridden\n)";
        let config: PerfConfig = ron::from_str(ron_str).unwrap();
        assert_eq!(config, PerfConfig::default());
    }
}
