//! The per-process performance context.
//!
//! Frame order: [`PerfContext::begin_frame`] feeds the measured frame time to
//! the quality controller, rescales LOD distances when the level moves, and
//! ticks the registry. Content then queries detail hints, emits draws, and
//! rents buffers. [`PerfContext::end_frame`] closes the profiler frame, samples
//! memory, and recycles pooled buffers.

use glam::Vec3;
use lumen_config::{ConfigError, PerfConfig, PoolConfig};
use lumen_lod::{LodLevel, LodRegistry, LodSettings, blend_factor};
use lumen_profiler::{GlobalCounters, MemorySampler, ProfileReport, Profiler};
use lumen_quality::{EffectFlags, QualityChange, QualityController, QualityLevel, QualityProfile};
use lumen_render::{BufferBackend, BufferPool, DrawQueue, RenderState};
use tracing::{debug, info};

/// What content should spend on one object this frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetailHint {
    pub level: LodLevel,
    /// `0.0` at the viewpoint, `1.0` at the cull distance.
    pub blend: f32,
    /// Level multiplier, `1.0` (High) to `0.0` (Culled).
    pub quality_multiplier: f32,
    pub segment_count: u32,
    /// Level particle count scaled by the quality profile's density.
    pub particle_count: u32,
}

impl DetailHint {
    pub fn is_visible(&self) -> bool {
        self.level.is_visible()
    }
}

/// Owns the optimization subsystems and sequences them per frame.
pub struct PerfContext<B: BufferBackend> {
    quality: QualityController,
    base_lod: LodSettings,
    registry: LodRegistry,
    pool: BufferPool<B>,
    pool_config: PoolConfig,
    queue_capacity: usize,
    profiler: Profiler,
    memory: MemorySampler<GlobalCounters>,
    frame: u64,
}

impl<B: BufferBackend> PerfContext<B> {
    /// Build every subsystem from `config`, with pooled buffers created by `backend`.
    pub fn new(config: &PerfConfig, backend: B) -> Result<Self, ConfigError> {
        config.validate()?;
        let base_lod = config.lod.settings()?;
        let level = config.quality.initial_level()?;

        let mut quality = QualityController::with_level(config.quality.thresholds(), level);
        quality.set_adaptive(config.quality.adaptive);

        let mut profiler = Profiler::new(
            config.profiler.report_interval_frames,
            config.profiler.top_n,
        );
        profiler.set_enabled(config.profiler.enabled);

        info!(
            "Perf context ready: quality {:?} (adaptive: {}), LOD thresholds {:?}",
            level,
            config.quality.adaptive,
            base_lod.thresholds()
        );

        Ok(Self {
            quality,
            registry: LodRegistry::new(scaled_lod(&base_lod, level)),
            base_lod,
            pool: BufferPool::new(backend),
            pool_config: config.pool.clone(),
            queue_capacity: config.batching.queue_capacity,
            profiler,
            memory: MemorySampler::new(
                GlobalCounters,
                config.profiler.memory_sample_interval_frames,
            ),
            frame: 0,
        })
    }

    /// Apply a reloaded config, keeping the current quality level, registered
    /// objects, and pooled buffers.
    pub fn apply_config(&mut self, config: &PerfConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.base_lod = config.lod.settings()?;

        let level = self.quality.level();
        self.quality = QualityController::with_level(config.quality.thresholds(), level);
        self.quality.set_adaptive(config.quality.adaptive);
        self.registry.set_settings(scaled_lod(&self.base_lod, level));

        self.profiler.set_enabled(config.profiler.enabled);
        self.profiler
            .set_report_interval(config.profiler.report_interval_frames);
        self.profiler.set_top_n(config.profiler.top_n);
        self.memory
            .set_interval(config.profiler.memory_sample_interval_frames);
        self.pool_config = config.pool.clone();
        self.queue_capacity = config.batching.queue_capacity;
        info!("Perf config applied");
        Ok(())
    }

    /// Start a frame that followed `frame_time_ms` of work, observed from `viewpoint`.
    ///
    /// Returns the quality change this frame caused, if any.
    pub fn begin_frame(&mut self, frame_time_ms: f32, viewpoint: Vec3) -> Option<QualityChange> {
        let _scope = self.profiler.scope("perf.begin_frame");

        let change = self.quality.tick(frame_time_ms);
        if let Some(change) = change {
            self.registry.set_settings(scaled_lod(&self.base_lod, change.to));
        }

        self.registry.set_viewpoint(viewpoint);
        let updated = self.registry.tick();
        if updated > 0 {
            debug!(updated, "Registry tick");
        }
        change
    }

    /// Finish the frame. Returns the profiler report when one is due.
    ///
    /// Every pooled buffer is marked idle here, so handles rented this frame
    /// must not be used after this call.
    pub fn end_frame(&mut self) -> Option<ProfileReport> {
        self.frame += 1;
        self.memory.end_frame();

        self.pool.reset_all();
        let interval = self.pool_config.trim_interval_frames;
        if interval > 0 && self.frame % interval == 0 {
            self.pool
                .trim_excess(self.pool_config.keep_count, self.pool_config.max_idle_frames);
        }

        self.profiler.end_frame()
    }

    /// Force a quality level, rescaling LOD distances to match.
    pub fn set_quality_level(&mut self, level: QualityLevel) {
        self.quality.set_level(level);
        self.registry.set_settings(scaled_lod(&self.base_lod, level));
    }

    // --- Content queries ---

    pub fn current_quality_level(&self) -> QualityLevel {
        self.quality.level()
    }

    pub fn quality_profile(&self) -> &'static QualityProfile {
        self.quality.profile()
    }

    /// Effect switches for the current quality level.
    pub fn effects(&self) -> EffectFlags {
        self.quality.profile().effects
    }

    /// Quality-adjusted LOD settings currently in use.
    pub fn lod_settings(&self) -> &LodSettings {
        self.registry.settings()
    }

    /// Detail hint for an object at `position` relative to the current viewpoint.
    pub fn detail_for(&self, position: Vec3) -> DetailHint {
        let settings = self.registry.settings();
        let viewpoint = self.registry.viewpoint();
        let level = lumen_lod::classify(position, viewpoint, settings);
        let density = self.quality.profile().particle_density;
        DetailHint {
            level,
            blend: blend_factor(position, viewpoint, settings),
            quality_multiplier: level.quality_multiplier(),
            segment_count: level.segment_count(),
            particle_count: (level.particle_count() as f32 * density).round() as u32,
        }
    }

    /// A draw queue sized from the batching config.
    pub fn draw_queue(&self, state: RenderState) -> DrawQueue {
        DrawQueue::new(state, self.queue_capacity)
    }

    // --- Subsystem access ---

    pub fn quality(&self) -> &QualityController {
        &self.quality
    }

    pub fn registry(&self) -> &LodRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut LodRegistry {
        &mut self.registry
    }

    pub fn pool(&self) -> &BufferPool<B> {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut BufferPool<B> {
        &mut self.pool
    }

    pub fn profiler(&self) -> &Profiler {
        &self.profiler
    }

    pub fn profiler_mut(&mut self) -> &mut Profiler {
        &mut self.profiler
    }

    pub fn memory(&self) -> &MemorySampler<GlobalCounters> {
        &self.memory
    }

    /// Frames completed with [`end_frame`](Self::end_frame).
    pub fn frame(&self) -> u64 {
        self.frame
    }
}

fn scaled_lod(base: &LodSettings, level: QualityLevel) -> LodSettings {
    base.scaled(level.profile().lod_distance_scale)
}
