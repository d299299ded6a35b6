//! `lumen-bench`: drives the frame pipeline headlessly under a synthetic load
//! and prints what the quality controller, batcher, and pool did.

use std::cell::RefCell;
use std::rc::Rc;

use clap::Parser;
use glam::{Vec2, Vec3};
use image::{Rgba, RgbaImage};
use lumen_app::PerfContext;
use lumen_app::platform::PlatformDirs;
use lumen_atlas::{AtlasBuilder, AtlasRect, TextureAtlas};
use lumen_config::{CliArgs, PerfConfig};
use lumen_lod::Updatable;
use lumen_profiler::TrackingAllocator;
use lumen_render::{
    BlendMode, DrawPrimitive, DrawRequest, HostBufferBackend, HostRingStorage, RenderState,
    RingBuffer, ShaderId, SpriteTransform, StateSortedBatcher, TextureId,
};
use tracing::{info, warn};

#[global_allocator]
static GLOBAL: TrackingAllocator = TrackingAllocator::new(std::alloc::System);

const EMITTER_COUNT: usize = 400;
const SPRITES: [(&str, u32, [u8; 4]); 3] = [
    ("spark", 8, [255, 220, 120, 255]),
    ("ember", 16, [255, 120, 40, 255]),
    ("smoke", 32, [90, 90, 90, 180]),
];
/// Per-instance data: position.xy, rotation, scale.
type Instance = [f32; 4];
const INSTANCE_BYTES: u64 = std::mem::size_of::<Instance>() as u64;

struct Emitter {
    position: Vec3,
    sprite: usize,
    updates: u64,
}

impl Updatable for Emitter {
    fn update(&mut self) {
        self.updates += 1;
    }

    fn position(&self) -> Vec3 {
        self.position
    }
}

#[derive(Default)]
struct CountingPrimitive {
    passes: u64,
    draws: u64,
}

impl DrawPrimitive for CountingPrimitive {
    fn begin_pass(&mut self, _state: &RenderState) {
        self.passes += 1;
    }

    fn draw_one(&mut self, _: TextureId, _: AtlasRect, _: &SpriteTransform, _: [f32; 4]) {
        self.draws += 1;
    }

    fn end_pass(&mut self) {}
}

fn build_atlas() -> Option<TextureAtlas> {
    let mut builder = AtlasBuilder::new(2);
    for (name, size, color) in SPRITES {
        builder.add_image(name, RgbaImage::from_pixel(size, size, Rgba(color)));
    }
    match builder.build() {
        Ok(atlas) => atlas,
        Err(e) => {
            warn!("Atlas build failed: {e}");
            None
        }
    }
}

fn spawn_emitters() -> Vec<Rc<RefCell<Emitter>>> {
    (0..EMITTER_COUNT)
        .map(|i| {
            let angle = i as f32 * 0.61;
            let radius = 50.0 + (i as f32 * 7.3) % 2400.0;
            Rc::new(RefCell::new(Emitter {
                position: Vec3::new(angle.cos() * radius, 0.0, angle.sin() * radius),
                sprite: i % SPRITES.len(),
                updates: 0,
            }))
        })
        .collect()
}

/// Synthetic frame cost: a fixed base, a heavy middle third, and a per-draw cost.
fn simulated_frame_time(frame: u64, total: u64, draws: usize) -> f32 {
    let heavy = (total / 3..2 * total / 3).contains(&frame);
    let base = if heavy { 24.0 } else { 7.0 };
    base + draws as f32 * 0.004
}

fn main() {
    let args = CliArgs::parse();

    let dirs = match &args.config {
        Some(root) => PlatformDirs::resolve_with_root(root),
        None => match PlatformDirs::resolve() {
            Ok(dirs) => dirs,
            Err(e) => {
                eprintln!("Failed to resolve platform directories: {e}");
                std::process::exit(1);
            }
        },
    };
    if let Err(e) = dirs.create() {
        eprintln!("Failed to create platform directories: {e}");
        std::process::exit(1);
    }

    let mut config = match PerfConfig::load_or_create(&dirs.config_dir) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            std::process::exit(1);
        }
    };
    config.apply_cli_overrides(&args);
    lumen_log::init_logging(Some(&dirs.log_dir), cfg!(debug_assertions), Some(&config));

    let mut ctx = match PerfContext::new(&config, HostBufferBackend::new()) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    let atlas = build_atlas();
    let emitters = spawn_emitters();
    for emitter in &emitters {
        ctx.registry_mut().register(emitter);
    }

    let mut batcher = StateSortedBatcher::new();
    let mut primitive = CountingPrimitive::default();
    let mut ring = RingBuffer::new(HostRingStorage::new(256 * 1024));
    let mut instances: Vec<Instance> = Vec::new();
    let mut changes = 0;
    let mut last_draws = 0;

    info!(frames = args.frames, emitters = EMITTER_COUNT, "Benchmark started");

    for frame in 0..args.frames {
        let frame_time = simulated_frame_time(frame, args.frames, last_draws);
        let viewpoint = Vec3::new((frame as f32 * 3.0) % 1200.0, 0.0, 0.0);
        if ctx.begin_frame(frame_time, viewpoint).is_some() {
            changes += 1;
        }

        ctx.profiler_mut().begin("emit");
        instances.clear();
        for emitter in &emitters {
            let emitter = emitter.borrow();
            let hint = ctx.detail_for(emitter.position);
            if !hint.is_visible() {
                continue;
            }
            let (name, _, _) = SPRITES[emitter.sprite];
            let region = atlas.as_ref().map(|a| a.region(name)).unwrap_or_default();
            let blend = if emitter.sprite == 2 {
                BlendMode::Alpha
            } else {
                BlendMode::Additive
            };
            let state = RenderState::new(TextureId(0), blend, ShaderId(emitter.sprite as u64));
            for i in 0..(hint.particle_count / 10).max(1) {
                let origin = Vec2::new(emitter.position.x, emitter.position.z);
                let transform = SpriteTransform::at(origin + Vec2::new(i as f32, hint.blend));
                batcher.enqueue(
                    state,
                    DrawRequest {
                        texture: TextureId(0),
                        region,
                        transform,
                        color: [1.0, 1.0, 1.0, hint.quality_multiplier],
                    },
                );
                instances.push([transform.position.x, transform.position.y, 0.0, 1.0]);
            }
        }
        ctx.profiler_mut().end("emit");

        ctx.profiler_mut().begin("upload");
        let required = instances.len() as u64 * INSTANCE_BYTES;
        let handle = ctx.pool_mut().rent(required);
        if let Err(e) = ring.write_slice(&instances) {
            warn!("Instance upload skipped: {e}");
        }
        ctx.pool_mut().release(handle);
        ctx.profiler_mut().end("upload");

        ctx.profiler_mut().begin("flush");
        last_draws = batcher.flush(&mut primitive).draws;
        ctx.profiler_mut().end("flush");

        ctx.end_frame();
    }

    let updates: u64 = emitters.iter().map(|e| e.borrow().updates).sum();
    let stats = ctx.registry().stats();
    let pool = ctx.pool().stats();
    println!("Lumen bench: {} frames", args.frames);
    println!("  quality:   {:?} after {} changes", ctx.current_quality_level(), changes);
    println!("  lod:       {:?} (per level)", stats.per_level);
    println!("  updates:   {updates} across {} emitters", emitters.len());
    println!("  batching:  {} passes, {} draws", primitive.passes, primitive.draws);
    println!(
        "  pool:      {} buffers, {} bytes; ring wrapped {} times",
        pool.buffers,
        pool.allocated_bytes,
        ring.wrap_count()
    );
    if let Some(sample) = ctx.memory().latest() {
        println!(
            "  memory:    {} bytes live, {} allocated in the last window, {} large allocations",
            sample.current_bytes, sample.allocated_delta, sample.large_allocations
        );
    }
    println!("  misuse:    {}", ctx.profiler().misuse_count());

    if args.json {
        match serde_json::to_string_pretty(&ctx.profiler().report()) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("Failed to serialize report: {e}"),
        }
    }
}
