//! Streaming ring buffer for per-frame dynamic data.
//!
//! Writes are appended at a moving cursor. When a write would run past the
//! end, the storage is invalidated (orphaned, for GPU storage) and the write
//! restarts at offset zero, so in-flight readers of the old contents are never
//! overwritten in place.

use thiserror::Error;

/// Backing store for a [`RingBuffer`].
pub trait RingStorage {
    /// Usable size in bytes.
    fn capacity(&self) -> u64;

    /// Copy `data` to `offset`. The caller guarantees it fits.
    fn write(&mut self, offset: u64, data: &[u8]);

    /// Discard current contents before the cursor wraps to zero.
    fn invalidate(&mut self);

    /// Required alignment of write offsets, in bytes.
    fn alignment(&self) -> u64 {
        1
    }
}

/// Host-memory ring storage.
#[derive(Debug)]
pub struct HostRingStorage {
    bytes: Vec<u8>,
    invalidations: u64,
}

impl HostRingStorage {
    pub fn new(capacity: u64) -> Self {
        Self {
            bytes: vec![0; capacity as usize],
            invalidations: 0,
        }
    }

    /// Current contents.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Times the storage has been invalidated.
    pub fn invalidations(&self) -> u64 {
        self.invalidations
    }
}

impl RingStorage for HostRingStorage {
    fn capacity(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn write(&mut self, offset: u64, data: &[u8]) {
        let start = offset as usize;
        self.bytes[start..start + data.len()].copy_from_slice(data);
    }

    fn invalidate(&mut self) {
        self.bytes.fill(0);
        self.invalidations += 1;
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RingBufferError {
    #[error("write of {len} bytes exceeds ring capacity {capacity}")]
    DataTooLarge { len: u64, capacity: u64 },
}

/// Append-only ring over a [`RingStorage`].
#[derive(Debug)]
pub struct RingBuffer<S: RingStorage> {
    storage: S,
    cursor: u64,
    wraps: u64,
}

impl<S: RingStorage> RingBuffer<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            cursor: 0,
            wraps: 0,
        }
    }

    /// Append `data`, returning the offset it was written at.
    pub fn write(&mut self, data: &[u8]) -> Result<u64, RingBufferError> {
        let len = data.len() as u64;
        let capacity = self.storage.capacity();
        if len > capacity {
            return Err(RingBufferError::DataTooLarge { len, capacity });
        }

        let align = self.storage.alignment().max(1);
        self.cursor = self.cursor.div_ceil(align) * align;
        if self.cursor + len > capacity {
            self.storage.invalidate();
            self.cursor = 0;
            self.wraps += 1;
            log::debug!("Ring buffer wrapped ({} total)", self.wraps);
        }

        let offset = self.cursor;
        self.storage.write(offset, data);
        self.cursor += len;
        Ok(offset)
    }

    /// Append a slice of plain-old-data values.
    pub fn write_slice<T: bytemuck::Pod>(&mut self, values: &[T]) -> Result<u64, RingBufferError> {
        self.write(bytemuck::cast_slice(values))
    }

    /// Next write offset.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Times the cursor wrapped back to zero.
    pub fn wrap_count(&self) -> u64 {
        self.wraps
    }

    pub fn capacity(&self) -> u64 {
        self.storage.capacity()
    }

    /// Discard all contents and move the cursor to zero.
    pub fn reset(&mut self) {
        self.storage.invalidate();
        self.cursor = 0;
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(capacity: u64) -> RingBuffer<HostRingStorage> {
        RingBuffer::new(HostRingStorage::new(capacity))
    }

    #[test]
    fn test_sequential_writes_advance_cursor() {
        let mut ring = ring(16);
        assert_eq!(ring.write(&[1, 2, 3, 4]), Ok(0));
        assert_eq!(ring.write(&[5, 6]), Ok(4));
        assert_eq!(ring.cursor(), 6);
        assert_eq!(&ring.storage().bytes()[..6], &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_exact_fill_does_not_wrap() {
        let mut ring = ring(8);
        ring.write(&[0; 4]).unwrap();
        assert_eq!(ring.write(&[0; 4]), Ok(4));
        assert_eq!(ring.wrap_count(), 0);
        assert_eq!(ring.cursor(), 8);
    }

    #[test]
    fn test_overflowing_write_wraps_to_zero() {
        let mut ring = ring(8);
        ring.write(&[1; 6]).unwrap();
        assert_eq!(ring.write(&[2; 4]), Ok(0));
        assert_eq!(ring.wrap_count(), 1);
        assert_eq!(ring.storage().invalidations(), 1);
        assert_eq!(ring.cursor(), 4);
        // Stale bytes past the new write were discarded.
        assert_eq!(ring.storage().bytes(), &[2, 2, 2, 2, 0, 0, 0, 0]);
    }

    #[test]
    fn test_oversized_write_is_rejected() {
        let mut ring = ring(8);
        ring.write(&[1; 3]).unwrap();
        assert_eq!(
            ring.write(&[0; 9]),
            Err(RingBufferError::DataTooLarge {
                len: 9,
                capacity: 8
            })
        );
        assert_eq!(ring.cursor(), 3);
        assert_eq!(ring.wrap_count(), 0);
    }

    #[test]
    fn test_write_slice_casts_pod() {
        let mut ring = ring(32);
        let offset = ring.write_slice(&[1.0f32, 2.0, 3.0]).unwrap();
        assert_eq!(offset, 0);
        assert_eq!(ring.cursor(), 12);
        let expected: &[u8] = bytemuck::cast_slice(&[1.0f32, 2.0, 3.0]);
        assert_eq!(&ring.storage().bytes()[..12], expected);
    }

    struct Aligned(HostRingStorage);

    impl RingStorage for Aligned {
        fn capacity(&self) -> u64 {
            self.0.capacity()
        }
        fn write(&mut self, offset: u64, data: &[u8]) {
            self.0.write(offset, data);
        }
        fn invalidate(&mut self) {
            self.0.invalidate();
        }
        fn alignment(&self) -> u64 {
            4
        }
    }

    #[test]
    fn test_offsets_respect_storage_alignment() {
        let mut ring = RingBuffer::new(Aligned(HostRingStorage::new(16)));
        assert_eq!(ring.write(&[1; 3]), Ok(0));
        assert_eq!(ring.write(&[2; 5]), Ok(4));
        assert_eq!(ring.write(&[3; 4]), Ok(12));
        // 16 is full; the next write wraps.
        assert_eq!(ring.write(&[4; 1]), Ok(0));
        assert_eq!(ring.wrap_count(), 1);
    }

    #[test]
    fn test_reset_invalidates_before_rewinding() {
        let mut ring = ring(8);
        ring.write(&[7; 4]).unwrap();
        ring.reset();
        assert_eq!(ring.cursor(), 0);
        assert_eq!(ring.storage().invalidations(), 1);
        assert_eq!(ring.storage().bytes()[0], 0);
        assert_eq!(ring.wrap_count(), 0);
        assert_eq!(ring.write(&[9; 2]), Ok(0));
    }
}
