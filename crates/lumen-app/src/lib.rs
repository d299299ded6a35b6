//! Lumen performance layer wiring.
//!
//! [`PerfContext`] is created once at startup and passed to content systems;
//! it owns the quality controller, LOD registry, buffer pool, and profiler and
//! sequences them once per frame.

pub mod context;
pub mod frame_timer;
pub mod platform;

pub use context::{DetailHint, PerfContext};
pub use frame_timer::{FrameTimer, MAX_FRAME_TIME};
