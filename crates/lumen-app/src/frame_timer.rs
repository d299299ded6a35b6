//! Wall-clock frame time measurement feeding the quality controller.

use std::time::{Duration, Instant};

use tracing::warn;

/// Longest frame time reported (4 FPS). Longer frames are clamped.
pub const MAX_FRAME_TIME: Duration = Duration::from_millis(250);

/// Measures the time between successive [`tick`](Self::tick) calls.
pub struct FrameTimer {
    previous: Instant,
    frame_count: u64,
    clamped_frames: u64,
}

impl FrameTimer {
    /// Start timing from now.
    pub fn new() -> Self {
        Self {
            previous: Instant::now(),
            frame_count: 0,
            clamped_frames: 0,
        }
    }

    /// Milliseconds since the previous tick (or construction), clamped to
    /// [`MAX_FRAME_TIME`].
    pub fn tick(&mut self) -> f32 {
        let now = Instant::now();
        let raw = now.duration_since(self.previous);
        self.previous = now;
        self.record(raw)
    }

    fn record(&mut self, raw: Duration) -> f32 {
        self.frame_count += 1;
        let frame_time = if raw > MAX_FRAME_TIME {
            warn!(
                "Frame time {:.1}ms exceeds maximum, clamping to {:.1}ms",
                raw.as_secs_f64() * 1000.0,
                MAX_FRAME_TIME.as_secs_f64() * 1000.0
            );
            self.clamped_frames += 1;
            MAX_FRAME_TIME
        } else {
            raw
        };
        (frame_time.as_secs_f64() * 1000.0) as f32
    }

    /// Ticks so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Ticks whose duration exceeded [`MAX_FRAME_TIME`].
    pub fn clamped_frames(&self) -> u64 {
        self.clamped_frames
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new()
    }
}
