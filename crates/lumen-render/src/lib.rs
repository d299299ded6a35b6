//! Draw submission and GPU buffer lifecycle: state-sorted draw batching, a
//! reusable buffer pool, and a streaming ring buffer, all independent of any
//! particular graphics device behind small backend traits.

pub mod batching;
pub mod buffer_pool;
pub mod gpu;
pub mod ring_buffer;

pub use batching::{
    BlendMode, DrawPrimitive, DrawQueue, DrawRequest, FlushStats, RenderBatch, RenderState,
    ShaderId, SpriteTransform, StateSortedBatcher, TextureId,
};
pub use buffer_pool::{
    BufferBackend, BufferHandle, BufferPool, HostBufferBackend, MIN_POOLED_CAPACITY, PoolStats,
    pooled_capacity,
};
pub use gpu::{WgpuBufferBackend, WgpuRingStorage};
pub use ring_buffer::{HostRingStorage, RingBuffer, RingBufferError, RingStorage};
