//! Draw request batching: accumulate sprite draws, group them by render state,
//! and flush each group inside a single begin/end pass.
//!
//! Two flavours are provided. [`DrawQueue`] is a bounded list for draws known
//! to share one state. [`StateSortedBatcher`] keys batches by
//! `(texture, blend, shader)` and keeps the batch objects alive across frames
//! so their allocations are reused.

use glam::Vec2;
use lumen_atlas::AtlasRect;
use rustc_hash::FxHashMap;

/// Opaque texture key supplied by the caller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u64);

/// Opaque shader key supplied by the caller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderId(pub u64);

/// How a pass blends into the target.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BlendMode {
    /// Premultiplied alpha.
    #[default]
    Alpha,
    Additive,
    Opaque,
    NonPremultiplied,
}

/// Everything a pass needs configured before drawing.
///
/// Two requests with equal states always land in the same batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct RenderState {
    pub texture: TextureId,
    pub blend: BlendMode,
    pub shader: ShaderId,
}

impl RenderState {
    pub fn new(texture: TextureId, blend: BlendMode, shader: ShaderId) -> Self {
        Self {
            texture,
            blend,
            shader,
        }
    }
}

/// 2D placement of a sprite.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpriteTransform {
    pub position: Vec2,
    /// Rotation in radians.
    pub rotation: f32,
    pub scale: Vec2,
    /// Pivot in source pixels.
    pub origin: Vec2,
    /// Layer depth in `[0.0, 1.0]`.
    pub depth: f32,
}

impl Default for SpriteTransform {
    fn default() -> Self {
        Self {
            position: Vec2::ZERO,
            rotation: 0.0,
            scale: Vec2::ONE,
            origin: Vec2::ZERO,
            depth: 0.0,
        }
    }
}

impl SpriteTransform {
    /// Unrotated, unscaled sprite at `position`.
    pub fn at(position: Vec2) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }
}

/// One queued sprite draw.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawRequest {
    pub texture: TextureId,
    /// Source region within the texture (usually an atlas region).
    pub region: AtlasRect,
    pub transform: SpriteTransform,
    /// Linear RGBA tint.
    pub color: [f32; 4],
}

/// Caller-supplied drawing backend. Batchers never touch a device directly.
pub trait DrawPrimitive {
    /// Configure the pipeline for `state` and start recording draws.
    fn begin_pass(&mut self, state: &RenderState);

    /// Record one sprite.
    fn draw_one(
        &mut self,
        texture: TextureId,
        region: AtlasRect,
        transform: &SpriteTransform,
        color: [f32; 4],
    );

    /// Finish the pass started by [`begin_pass`](Self::begin_pass).
    fn end_pass(&mut self);
}

/// What a flush submitted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlushStats {
    /// Begin/end pairs issued.
    pub passes: usize,
    /// Sprites drawn.
    pub draws: usize,
}

// ---------------------------------------------------------------------------
// DrawQueue
// ---------------------------------------------------------------------------

/// Bounded, ordered draw list sharing a single render state.
pub struct DrawQueue {
    state: RenderState,
    requests: Vec<DrawRequest>,
    capacity: usize,
}

impl DrawQueue {
    /// Create a queue holding at most `capacity` requests.
    pub fn new(state: RenderState, capacity: usize) -> Self {
        Self {
            state,
            requests: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a request. Returns `false` when the queue is full; the caller
    /// decides whether to flush early or drop the draw.
    pub fn enqueue(&mut self, request: DrawRequest) -> bool {
        if self.requests.len() >= self.capacity {
            return false;
        }
        self.requests.push(request);
        true
    }

    /// Draw everything in insertion order inside one pass, then empty the queue.
    ///
    /// An empty queue issues no pass.
    pub fn flush(&mut self, primitive: &mut impl DrawPrimitive) -> FlushStats {
        if self.requests.is_empty() {
            return FlushStats::default();
        }
        primitive.begin_pass(&self.state);
        for r in &self.requests {
            primitive.draw_one(r.texture, r.region, &r.transform, r.color);
        }
        primitive.end_pass();

        let stats = FlushStats {
            passes: 1,
            draws: self.requests.len(),
        };
        self.requests.clear();
        stats
    }

    /// Discard queued requests without drawing.
    pub fn clear(&mut self) {
        self.requests.clear();
    }

    /// The state every pass is configured with.
    pub fn state(&self) -> &RenderState {
        &self.state
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.requests.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

// ---------------------------------------------------------------------------
// StateSortedBatcher
// ---------------------------------------------------------------------------

/// Requests sharing one render state.
#[derive(Debug)]
pub struct RenderBatch {
    state: RenderState,
    requests: Vec<DrawRequest>,
}

impl RenderBatch {
    pub fn state(&self) -> &RenderState {
        &self.state
    }

    pub fn requests(&self) -> &[DrawRequest] {
        &self.requests
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

/// Groups requests by render state and flushes one pass per non-empty group.
///
/// Batches are flushed in the order their state was first used. Nothing is
/// sorted by depth; correct back-to-front blending across batches is the
/// caller's responsibility.
#[derive(Default)]
pub struct StateSortedBatcher {
    batches: Vec<RenderBatch>,
    index: FxHashMap<RenderState, usize>,
}

impl StateSortedBatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `request` to the batch for `state`, creating it on first use.
    pub fn enqueue(&mut self, state: RenderState, request: DrawRequest) {
        let slot = match self.index.get(&state) {
            Some(&slot) => slot,
            None => {
                let slot = self.batches.len();
                self.batches.push(RenderBatch {
                    state,
                    requests: Vec::new(),
                });
                self.index.insert(state, slot);
                slot
            }
        };
        self.batches[slot].requests.push(request);
    }

    /// Issue one pass per non-empty batch, then clear every batch's requests.
    ///
    /// Batch objects survive the flush so the next frame reuses their storage.
    pub fn flush(&mut self, primitive: &mut impl DrawPrimitive) -> FlushStats {
        let mut stats = FlushStats::default();
        for batch in &mut self.batches {
            if batch.requests.is_empty() {
                continue;
            }
            primitive.begin_pass(&batch.state);
            for r in &batch.requests {
                primitive.draw_one(r.texture, r.region, &r.transform, r.color);
            }
            primitive.end_pass();

            stats.passes += 1;
            stats.draws += batch.requests.len();
            batch.requests.clear();
        }
        stats
    }

    /// Drop pending requests without drawing. Batches are retained.
    pub fn clear(&mut self) {
        for batch in &mut self.batches {
            batch.requests.clear();
        }
    }

    /// Number of batch objects ever created (empty ones included).
    pub fn batch_count(&self) -> usize {
        self.batches.len()
    }

    /// Requests waiting for the next flush.
    pub fn pending_draws(&self) -> usize {
        self.batches.iter().map(RenderBatch::len).sum()
    }

    /// Batches in flush order.
    pub fn batches(&self) -> &[RenderBatch] {
        &self.batches
    }

    /// The batch for `state`, if one was ever created.
    pub fn batch(&self, state: &RenderState) -> Option<&RenderBatch> {
        self.index.get(state).map(|&slot| &self.batches[slot])
    }
}
