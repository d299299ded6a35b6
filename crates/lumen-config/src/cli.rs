//! Command-line argument parsing for the benchmark binary.

use std::path::PathBuf;

use clap::Parser;

use crate::{PerfConfig, Preset};

/// Frames simulated when `--frames` is not given.
pub const DEFAULT_FRAMES: u64 = 600;

/// Lumen performance harness command-line arguments.
///
/// CLI values override settings loaded from `perf.ron`.
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "lumen-bench", about = "Headless frame pipeline benchmark")]
pub struct CliArgs {
    /// Preset applied to both LOD distances and quality thresholds.
    #[arg(long, value_enum)]
    pub preset: Option<Preset>,

    /// Starting quality level, 0 (Minimal) to 4 (Ultra).
    #[arg(long)]
    pub quality_level: Option<u8>,

    /// Hold the starting quality level instead of adapting.
    #[arg(long)]
    pub no_adaptive: bool,

    /// Number of frames to simulate.
    #[arg(long, default_value_t = DEFAULT_FRAMES)]
    pub frames: u64,

    /// Print the final profiler report as JSON.
    #[arg(long)]
    pub json: bool,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Default for CliArgs {
    /// Matches parsing an empty command line.
    fn default() -> Self {
        Self {
            preset: None,
            quality_level: None,
            no_adaptive: false,
            frames: DEFAULT_FRAMES,
            json: false,
            log_level: None,
            config: None,
        }
    }
}

impl PerfConfig {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(preset) = args.preset {
            self.lod.preset = preset;
            self.lod.custom_thresholds = None;
            self.quality.preset = preset;
        }
        if let Some(level) = args.quality_level {
            self.quality.initial_level = Some(level);
        }
        if args.no_adaptive {
            self.quality.adaptive = false;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_override() {
        let mut config = PerfConfig::default();
        config.lod.custom_thresholds = Some([1.0, 2.0, 3.0, 4.0]);
        let args = CliArgs {
            preset: Some(Preset::Aggressive),
            quality_level: Some(1),
            no_adaptive: true,
            ..CliArgs::default()
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.lod.preset, Preset::Aggressive);
        assert_eq!(config.lod.custom_thresholds, None);
        assert_eq!(config.quality.preset, Preset::Aggressive);
        assert_eq!(config.quality.initial_level, Some(1));
        assert!(!config.quality.adaptive);
        // Non-overridden fields retain defaults
        assert_eq!(config.debug.log_level, "info");
    }

    #[test]
    fn test_cli_no_override() {
        let defaults = PerfConfig::default();
        let mut config = PerfConfig::default();
        config.apply_cli_overrides(&CliArgs::default());
        assert_eq!(config, defaults);
    }

    #[test]
    fn test_parse_flags() {
        let args = CliArgs::try_parse_from([
            "lumen-bench",
            "--preset",
            "relaxed",
            "--frames",
            "120",
            "--no-adaptive",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(args.preset, Some(Preset::Relaxed));
        assert_eq!(args.frames, 120);
        assert!(args.no_adaptive);
        assert!(!args.json);
        assert_eq!(args.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_frames_default() {
        let args = CliArgs::try_parse_from(["lumen-bench"]).unwrap();
        assert_eq!(args.frames, 600);
        assert!(args.preset.is_none());
        assert_eq!(args, CliArgs::default());
    }
}
