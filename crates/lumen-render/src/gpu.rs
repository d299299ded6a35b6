//! wgpu implementations of the buffer pool and ring buffer backends.

use crate::buffer_pool::BufferBackend;
use crate::ring_buffer::RingStorage;

/// Creates pooled buffers on a wgpu device.
pub struct WgpuBufferBackend<'a> {
    device: &'a wgpu::Device,
    usage: wgpu::BufferUsages,
    label: &'static str,
    total_allocated: u64,
}

impl<'a> WgpuBufferBackend<'a> {
    /// Pool buffers with the given `usage`. `COPY_DST` is always added so
    /// rented buffers can be filled with `Queue::write_buffer`.
    pub fn new(device: &'a wgpu::Device, usage: wgpu::BufferUsages, label: &'static str) -> Self {
        Self {
            device,
            usage: usage | wgpu::BufferUsages::COPY_DST,
            label,
            total_allocated: 0,
        }
    }

    /// Vertex buffers.
    pub fn vertex(device: &'a wgpu::Device) -> Self {
        Self::new(device, wgpu::BufferUsages::VERTEX, "pooled_vertex_buffer")
    }

    /// Index buffers.
    pub fn index(device: &'a wgpu::Device) -> Self {
        Self::new(device, wgpu::BufferUsages::INDEX, "pooled_index_buffer")
    }

    /// Bytes currently held by buffers this backend created.
    pub fn total_allocated(&self) -> u64 {
        self.total_allocated
    }
}

impl BufferBackend for WgpuBufferBackend<'_> {
    type Buffer = wgpu::Buffer;

    fn create_buffer(&mut self, capacity: u64) -> wgpu::Buffer {
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(self.label),
            size: capacity,
            usage: self.usage,
            mapped_at_creation: false,
        });
        self.total_allocated += capacity;
        buffer
    }

    fn destroy_buffer(&mut self, buffer: wgpu::Buffer) {
        self.total_allocated = self.total_allocated.saturating_sub(buffer.size());
        buffer.destroy();
    }
}

/// Ring storage backed by a wgpu buffer. Invalidation orphans the current
/// buffer and allocates a fresh one of the same size.
pub struct WgpuRingStorage<'a> {
    device: &'a wgpu::Device,
    queue: &'a wgpu::Queue,
    buffer: wgpu::Buffer,
    usage: wgpu::BufferUsages,
    generation: u64,
}

impl<'a> WgpuRingStorage<'a> {
    pub fn new(
        device: &'a wgpu::Device,
        queue: &'a wgpu::Queue,
        capacity: u64,
        usage: wgpu::BufferUsages,
    ) -> Self {
        let capacity = capacity.next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);
        let usage = usage | wgpu::BufferUsages::COPY_DST;
        Self {
            device,
            queue,
            buffer: Self::allocate(device, capacity, usage),
            usage,
            generation: 0,
        }
    }

    fn allocate(device: &wgpu::Device, capacity: u64, usage: wgpu::BufferUsages) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("ring_buffer"),
            size: capacity,
            usage,
            mapped_at_creation: false,
        })
    }

    /// The buffer currently receiving writes. Changes after invalidation.
    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    /// Number of times the buffer has been orphaned.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl RingStorage for WgpuRingStorage<'_> {
    fn capacity(&self) -> u64 {
        self.buffer.size()
    }

    fn write(&mut self, offset: u64, data: &[u8]) {
        let align = wgpu::COPY_BUFFER_ALIGNMENT as usize;
        if data.len() % align == 0 {
            self.queue.write_buffer(&self.buffer, offset, data);
        } else {
            // Copy sizes must be aligned; pad the tail with zeros.
            let mut padded = data.to_vec();
            padded.resize(data.len().next_multiple_of(align), 0);
            self.queue.write_buffer(&self.buffer, offset, &padded);
        }
    }

    fn invalidate(&mut self) {
        let fresh = Self::allocate(self.device, self.buffer.size(), self.usage);
        // Dropping the old handle leaves it alive until in-flight commands finish.
        drop(std::mem::replace(&mut self.buffer, fresh));
        self.generation += 1;
    }

    fn alignment(&self) -> u64 {
        wgpu::COPY_BUFFER_ALIGNMENT
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer_pool::BufferPool;
    use crate::ring_buffer::RingBuffer;

    fn test_device() -> Option<(wgpu::Device, wgpu::Queue)> {
        pollster::block_on(async {
            let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
                backends: wgpu::Backends::all(),
                ..Default::default()
            });
            let adapter = instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: wgpu::PowerPreference::default(),
                    compatible_surface: None,
                    force_fallback_adapter: false,
                })
                .await
                .ok()?;
            adapter
                .request_device(&wgpu::DeviceDescriptor::default())
                .await
                .ok()
        })
    }

    #[test]
    fn test_pool_reuses_device_buffers() {
        let Some((device, _queue)) = test_device() else {
            return;
        };
        let mut pool = BufferPool::new(WgpuBufferBackend::vertex(&device));
        let first = pool.rent(100);
        assert_eq!(pool.buffer(first).map(wgpu::Buffer::size), Some(128));
        assert_eq!(pool.backend().total_allocated(), 128);

        pool.release(first);
        let second = pool.rent(64);
        assert_eq!(second, first);
        assert_eq!(pool.backend().total_allocated(), 128);
    }

    #[test]
    fn test_trim_frees_device_memory() {
        let Some((device, _queue)) = test_device() else {
            return;
        };
        let mut pool = BufferPool::new(WgpuBufferBackend::index(&device));
        let a = pool.rent(256);
        let b = pool.rent(1024);
        pool.release(a);
        pool.release(b);
        pool.reset_all();
        pool.reset_all();
        assert_eq!(pool.trim_excess(1, 1), 1);
        assert_eq!(pool.backend().total_allocated(), 256);
    }

    #[test]
    fn test_ring_wrap_orphans_buffer() {
        let Some((device, queue)) = test_device() else {
            return;
        };
        let storage = WgpuRingStorage::new(&device, &queue, 64, wgpu::BufferUsages::VERTEX);
        let mut ring = RingBuffer::new(storage);
        assert_eq!(ring.write(&[1; 40]), Ok(0));
        // Unaligned writes land on aligned offsets.
        assert_eq!(ring.write(&[2; 3]), Ok(40));
        assert_eq!(ring.write(&[3; 4]), Ok(44));
        assert_eq!(ring.storage().generation(), 0);

        assert_eq!(ring.write(&[4; 32]), Ok(0));
        assert_eq!(ring.storage().generation(), 1);
        assert_eq!(ring.storage().buffer().size(), 64);
    }
}
