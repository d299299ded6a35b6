//! Reusable GPU buffer pool.
//!
//! Instead of creating and destroying buffers every time a system needs
//! scratch vertex or instance storage, [`BufferPool`] keeps previously created
//! buffers around and hands them back out when a request fits. Capacities are
//! rounded up to powers of two (minimum [`MIN_POOLED_CAPACITY`]) so buffers of
//! similar sizes are interchangeable.
//!
//! [`BufferPool::rent`] returns a [`BufferHandle`]; releasing through the
//! handle is O(1) and a stale handle is rejected instead of freeing someone
//! else's buffer.

/// Smallest capacity the pool will allocate, in bytes.
pub const MIN_POOLED_CAPACITY: u64 = 64;

/// Capacity actually allocated for a request of `required` bytes.
pub fn pooled_capacity(required: u64) -> u64 {
    required.max(MIN_POOLED_CAPACITY).next_power_of_two()
}

/// Creates and destroys the buffers a [`BufferPool`] manages.
pub trait BufferBackend {
    /// The buffer type handed out to callers.
    type Buffer;

    /// Allocate a buffer of exactly `capacity` bytes.
    fn create_buffer(&mut self, capacity: u64) -> Self::Buffer;

    /// Release a buffer's storage.
    fn destroy_buffer(&mut self, buffer: Self::Buffer);
}

/// CPU-side backend storing buffers as zeroed byte vectors.
///
/// Useful for staging data and for exercising pool policy without a device.
#[derive(Debug, Default)]
pub struct HostBufferBackend {
    created: u64,
    destroyed: u64,
}

impl HostBufferBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffers created over the backend's lifetime.
    pub fn created(&self) -> u64 {
        self.created
    }

    /// Buffers destroyed over the backend's lifetime.
    pub fn destroyed(&self) -> u64 {
        self.destroyed
    }
}

impl BufferBackend for HostBufferBackend {
    type Buffer = Vec<u8>;

    fn create_buffer(&mut self, capacity: u64) -> Vec<u8> {
        self.created += 1;
        vec![0; capacity as usize]
    }

    fn destroy_buffer(&mut self, _buffer: Vec<u8>) {
        self.destroyed += 1;
    }
}

/// Identifies a rented buffer. Invalidated when the buffer is trimmed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferHandle {
    index: u32,
    generation: u32,
}

impl BufferHandle {
    /// Slot index inside the pool.
    pub fn index(&self) -> u32 {
        self.index
    }
}

struct PooledBuffer<T> {
    buffer: T,
    capacity: u64,
    in_use: bool,
    last_used_frame: u64,
}

struct Slot<T> {
    generation: u32,
    entry: Option<PooledBuffer<T>>,
}

/// Occupancy snapshot of a [`BufferPool`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Live buffers, rented or idle.
    pub buffers: usize,
    /// Buffers currently rented.
    pub in_use: usize,
    /// Bytes across all live buffers.
    pub allocated_bytes: u64,
    /// Bytes across rented buffers.
    pub in_use_bytes: u64,
}

/// Pool of reusable buffers created through a [`BufferBackend`].
pub struct BufferPool<B: BufferBackend> {
    backend: B,
    slots: Vec<Slot<B::Buffer>>,
    free_slots: Vec<u32>,
    frame: u64,
}

impl<B: BufferBackend> BufferPool<B> {
    /// Create an empty pool.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            slots: Vec::new(),
            free_slots: Vec::new(),
            frame: 0,
        }
    }

    /// Rent a buffer holding at least `required` bytes.
    ///
    /// Reuses the first idle buffer that is large enough; otherwise allocates
    /// a new one of [`pooled_capacity`]`(required)` bytes.
    pub fn rent(&mut self, required: u64) -> BufferHandle {
        let frame = self.frame;
        let reusable = self.slots.iter_mut().enumerate().find_map(|(i, slot)| {
            let entry = slot.entry.as_mut()?;
            (!entry.in_use && entry.capacity >= required).then(|| {
                entry.in_use = true;
                entry.last_used_frame = frame;
                BufferHandle {
                    index: i as u32,
                    generation: slot.generation,
                }
            })
        });
        if let Some(handle) = reusable {
            return handle;
        }

        let capacity = pooled_capacity(required);
        let entry = PooledBuffer {
            buffer: self.backend.create_buffer(capacity),
            capacity,
            in_use: true,
            last_used_frame: frame,
        };
        log::trace!("Buffer pool: allocated {} bytes (requested {})", capacity, required);

        if let Some(index) = self.free_slots.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entry = Some(entry);
            BufferHandle {
                index,
                generation: slot.generation,
            }
        } else {
            self.slots.push(Slot {
                generation: 0,
                entry: Some(entry),
            });
            BufferHandle {
                index: (self.slots.len() - 1) as u32,
                generation: 0,
            }
        }
    }

    /// Mark a rented buffer idle so it can be reused.
    ///
    /// Returns `false` for a stale handle or a buffer that is already idle.
    pub fn release(&mut self, handle: BufferHandle) -> bool {
        let frame = self.frame;
        match self.entry_mut(handle) {
            Some(entry) if entry.in_use => {
                entry.in_use = false;
                entry.last_used_frame = frame;
                true
            }
            Some(_) => {
                log::warn!("Buffer pool: slot {} released twice", handle.index);
                false
            }
            None => {
                log::warn!("Buffer pool: stale handle for slot {}", handle.index);
                false
            }
        }
    }

    /// The buffer behind `handle`, if the handle is still valid.
    pub fn buffer(&self, handle: BufferHandle) -> Option<&B::Buffer> {
        self.entry(handle).map(|e| &e.buffer)
    }

    /// Mutable access to the buffer behind `handle`.
    pub fn buffer_mut(&mut self, handle: BufferHandle) -> Option<&mut B::Buffer> {
        self.entry_mut(handle).map(|e| &mut e.buffer)
    }

    /// Capacity of the buffer behind `handle`.
    pub fn capacity_of(&self, handle: BufferHandle) -> Option<u64> {
        self.entry(handle).map(|e| e.capacity)
    }

    /// Whether `handle` refers to a currently rented buffer.
    pub fn is_rented(&self, handle: BufferHandle) -> bool {
        self.entry(handle).is_some_and(|e| e.in_use)
    }

    /// Advance the frame counter and mark every buffer idle.
    ///
    /// This ignores outstanding handles: a caller still holding one after the
    /// reset shares the buffer with whoever rents it next.
    pub fn reset_all(&mut self) {
        self.frame += 1;
        for entry in self.slots.iter_mut().filter_map(|s| s.entry.as_mut()) {
            entry.in_use = false;
        }
    }

    /// Destroy idle buffers unused for more than `max_idle_frames` frames,
    /// sparing the `keep_count` smallest. Returns how many were destroyed.
    pub fn trim_excess(&mut self, keep_count: usize, max_idle_frames: u64) -> usize {
        let frame = self.frame;
        let mut candidates: Vec<(u64, usize)> = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| {
                let entry = slot.entry.as_ref()?;
                let idle_for = frame.saturating_sub(entry.last_used_frame);
                (!entry.in_use && idle_for > max_idle_frames).then_some((entry.capacity, i))
            })
            .collect();
        candidates.sort_unstable();

        let mut trimmed = 0;
        for &(_, i) in candidates.iter().skip(keep_count) {
            let slot = &mut self.slots[i];
            if let Some(entry) = slot.entry.take() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free_slots.push(i as u32);
                self.backend.destroy_buffer(entry.buffer);
                trimmed += 1;
            }
        }
        if trimmed > 0 {
            log::debug!("Buffer pool: trimmed {} idle buffers", trimmed);
        }
        trimmed
    }

    /// Destroy every buffer, rented or not. All handles become stale.
    pub fn dispose(&mut self) {
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if let Some(entry) = slot.entry.take() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free_slots.push(i as u32);
                self.backend.destroy_buffer(entry.buffer);
            }
        }
    }

    /// Frames elapsed, advanced by [`reset_all`](Self::reset_all).
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Occupancy snapshot.
    pub fn stats(&self) -> PoolStats {
        self.slots
            .iter()
            .filter_map(|s| s.entry.as_ref())
            .fold(PoolStats::default(), |mut stats, e| {
                stats.buffers += 1;
                stats.allocated_bytes += e.capacity;
                if e.in_use {
                    stats.in_use += 1;
                    stats.in_use_bytes += e.capacity;
                }
                stats
            })
    }

    /// The backend that creates this pool's buffers.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn entry(&self, handle: BufferHandle) -> Option<&PooledBuffer<B::Buffer>> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.entry.as_ref()
    }

    fn entry_mut(&mut self, handle: BufferHandle) -> Option<&mut PooledBuffer<B::Buffer>> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.entry.as_mut()
    }
}

impl<B: BufferBackend> Drop for BufferPool<B> {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> BufferPool<HostBufferBackend> {
        BufferPool::new(HostBufferBackend::new())
    }

    #[test]
    fn test_capacity_rounding() {
        assert_eq!(pooled_capacity(0), 64);
        assert_eq!(pooled_capacity(1), 64);
        assert_eq!(pooled_capacity(64), 64);
        assert_eq!(pooled_capacity(65), 128);
        assert_eq!(pooled_capacity(1000), 1024);
        assert_eq!(pooled_capacity(4096), 4096);
    }

    #[test]
    fn test_rent_allocates_rounded_buffer() {
        let mut pool = pool();
        let handle = pool.rent(100);
        assert_eq!(pool.capacity_of(handle), Some(128));
        assert_eq!(pool.buffer(handle).map(Vec::len), Some(128));
        assert!(pool.is_rented(handle));
    }

    #[test]
    fn test_released_buffer_is_reused() {
        let mut pool = pool();
        let first = pool.rent(1000);
        assert!(pool.release(first));

        let second = pool.rent(600);
        assert_eq!(second, first);
        assert_eq!(pool.backend().created(), 1);
    }

    #[test]
    fn test_rented_buffers_are_not_shared() {
        let mut pool = pool();
        let a = pool.rent(64);
        let b = pool.rent(64);
        assert_ne!(a, b);
        assert_eq!(pool.backend().created(), 2);
    }

    #[test]
    fn test_too_small_idle_buffer_is_skipped() {
        let mut pool = pool();
        let small = pool.rent(64);
        pool.release(small);
        let big = pool.rent(1024);
        assert_ne!(small, big);
        assert_eq!(pool.capacity_of(big), Some(1024));
        assert_eq!(pool.backend().created(), 2);
    }

    #[test]
    fn test_double_release_is_rejected() {
        let mut pool = pool();
        let handle = pool.rent(64);
        assert!(pool.release(handle));
        assert!(!pool.release(handle));
    }

    #[test]
    fn test_reset_all_marks_everything_idle() {
        let mut pool = pool();
        let a = pool.rent(64);
        let b = pool.rent(128);
        pool.reset_all();
        assert_eq!(pool.frame(), 1);
        assert!(!pool.is_rented(a));
        assert!(!pool.is_rented(b));
        assert_eq!(pool.stats().in_use, 0);
        // The outstanding handle is now handed to a new renter.
        assert_eq!(pool.rent(64), a);
    }

    #[test]
    fn test_trim_keeps_smallest_and_recent() {
        let mut pool = pool();
        let recent = pool.rent(128);
        let handles: Vec<_> = [64, 256, 1024, 4096].into_iter().map(|c| pool.rent(c)).collect();
        pool.release(recent);
        for &h in &handles {
            pool.release(h);
        }
        for _ in 0..10 {
            pool.reset_all();
        }
        // Touch one buffer so it is recent again.
        let touched = pool.rent(128);
        assert_eq!(touched, recent);
        pool.release(touched);

        let trimmed = pool.trim_excess(1, 5);
        assert_eq!(trimmed, 3);
        assert_eq!(pool.backend().destroyed(), 3);

        // The smallest stale buffer and the recently used one survive.
        assert_eq!(pool.capacity_of(handles[0]), Some(64));
        assert_eq!(pool.capacity_of(recent), Some(128));
        for &h in &handles[1..] {
            assert_eq!(pool.capacity_of(h), None);
            assert!(!pool.release(h));
        }
        assert_eq!(pool.stats().buffers, 2);
    }

    #[test]
    fn test_trimmed_slot_is_reused_with_new_generation() {
        let mut pool = pool();
        let old = pool.rent(64);
        pool.release(old);
        pool.reset_all();
        pool.reset_all();
        assert_eq!(pool.trim_excess(0, 1), 1);

        let fresh = pool.rent(64);
        assert_eq!(fresh.index(), old.index());
        assert_ne!(fresh, old);
        assert!(pool.buffer(old).is_none());
        assert!(pool.buffer(fresh).is_some());
    }

    #[test]
    fn test_rented_buffers_are_never_trimmed() {
        let mut pool = pool();
        let handle = pool.rent(64);
        for _ in 0..5 {
            pool.frame += 1;
        }
        assert_eq!(pool.trim_excess(0, 0), 0);
        assert!(pool.is_rented(handle));
    }

    #[test]
    fn test_stats_track_bytes() {
        let mut pool = pool();
        let a = pool.rent(100);
        let _b = pool.rent(1000);
        pool.release(a);
        let stats = pool.stats();
        assert_eq!(stats.buffers, 2);
        assert_eq!(stats.in_use, 1);
        assert_eq!(stats.allocated_bytes, 128 + 1024);
        assert_eq!(stats.in_use_bytes, 1024);
    }

    #[test]
    fn test_dispose_destroys_everything() {
        let mut pool = pool();
        let a = pool.rent(64);
        pool.rent(64);
        pool.dispose();
        assert_eq!(pool.backend().destroyed(), 2);
        assert_eq!(pool.stats(), PoolStats::default());
        assert!(pool.buffer(a).is_none());
    }

    #[test]
    fn test_buffer_mut_writes_through() {
        let mut pool = pool();
        let handle = pool.rent(64);
        pool.buffer_mut(handle).unwrap()[0] = 42;
        assert_eq!(pool.buffer(handle).unwrap()[0], 42);
    }
}
