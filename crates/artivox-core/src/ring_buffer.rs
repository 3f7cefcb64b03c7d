//! Lock-free byte ring buffer for crossing the control/audio boundary
//!
//! A fixed-capacity single-producer/single-consumer queue with separate
//! read/write cursors. The two ends are distinct owning types, so a second
//! writer or reader is unconstructible. That discipline is what makes the
//! design lock-free, not an optimization detail.
//!
//! # Real-Time Safety
//!
//! - **No allocations**: the arena is allocated once at construction
//! - **Wait-free**: `read`/`write` are O(n) copies that never block
//! - **No partial-record surprises**: callers move fixed-size records with
//!   [`Producer::write_record`]/[`Consumer::read_record`], which pre-check
//!   the available space against the record size before touching the arena
//!
//! The capacity is rounded up to the next power of two and one slot is
//! always kept empty to disambiguate full from empty, so
//! `read_space() + write_space() == capacity - 1` holds at all times.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};

/// Shared arena behind one producer/consumer pair.
struct Inner {
    data: UnsafeCell<Box<[u8]>>,
    /// Next byte the consumer will read. Written only by the consumer.
    read_pos: AtomicUsize,
    /// Next byte the producer will write. Written only by the producer.
    write_pos: AtomicUsize,
    /// Arena size in bytes; always a power of two.
    size: usize,
}

// SAFETY: the producer writes only bytes the consumer cannot yet see (they
// become visible through the Release store of `write_pos`), and the consumer
// reads only bytes the producer has published. Each cursor has exactly one
// writing thread.
unsafe impl Send for Inner {}
unsafe impl Sync for Inner {}

/// Factory for producer/consumer pairs.
pub struct RingBuffer;

impl RingBuffer {
    /// Allocate a ring able to hold at least `min_capacity - 1` unread bytes
    /// and split it into its two ends.
    ///
    /// The arena is rounded up to the next power of two; one byte is always
    /// kept open, so the usable capacity is `capacity() - 1`.
    pub fn with_capacity(min_capacity: usize) -> (Producer, Consumer) {
        let size = min_capacity.max(2).next_power_of_two();
        let inner = Arc::new(Inner {
            data: UnsafeCell::new(vec![0u8; size].into_boxed_slice()),
            read_pos: AtomicUsize::new(0),
            write_pos: AtomicUsize::new(0),
            size,
        });
        (
            Producer {
                inner: Arc::clone(&inner),
            },
            Consumer { inner },
        )
    }
}

/// Write end of the ring buffer. Exactly one per ring, owned by exactly one
/// thread at a time.
pub struct Producer {
    inner: Arc<Inner>,
}

impl Producer {
    /// Copy as many bytes of `src` as fit into the ring.
    ///
    /// Never blocks and never overwrites unread bytes; returns the number of
    /// bytes actually moved, which is less than `src.len()` when the ring is
    /// (nearly) full.
    pub fn write(&mut self, src: &[u8]) -> usize {
        let mask = self.inner.size - 1;
        let wp = self.inner.write_pos.load(Ordering::Relaxed);
        let rp = self.inner.read_pos.load(Ordering::Acquire);
        let space = rp.wrapping_sub(wp).wrapping_sub(1) & mask;
        let n = src.len().min(space);
        if n == 0 {
            return 0;
        }

        let first = n.min(self.inner.size - wp);
        // SAFETY: the region [wp, wp + n) (mod size) is unread space: the
        // consumer will not touch it until the Release store below publishes
        // it, and this producer is the only writer.
        unsafe {
            let base = (*self.inner.data.get()).as_mut_ptr();
            std::ptr::copy_nonoverlapping(src.as_ptr(), base.add(wp), first);
            if n > first {
                std::ptr::copy_nonoverlapping(src.as_ptr().add(first), base, n - first);
            }
        }
        self.inner
            .write_pos
            .store((wp + n) & mask, Ordering::Release);
        n
    }

    /// Bytes that can currently be written without overwriting unread data.
    pub fn write_space(&self) -> usize {
        let mask = self.inner.size - 1;
        let wp = self.inner.write_pos.load(Ordering::Relaxed);
        let rp = self.inner.read_pos.load(Ordering::Acquire);
        rp.wrapping_sub(wp).wrapping_sub(1) & mask
    }

    /// Total arena size in bytes (one byte of which is always kept open).
    pub fn capacity(&self) -> usize {
        self.inner.size
    }

    /// Queue one fixed-size record, whole or not at all.
    ///
    /// Returns `false` when the ring does not have room for the complete
    /// record. Partial transfers are unreachable thanks to the space
    /// pre-check; the debug assertion guards the contract.
    pub fn write_record<T: Pod>(&mut self, record: &T) -> bool {
        let bytes = bytemuck::bytes_of(record);
        if self.write_space() < bytes.len() {
            return false;
        }
        let written = self.write(bytes);
        debug_assert_eq!(written, bytes.len());
        true
    }
}

/// Read end of the ring buffer. Exactly one per ring, owned by exactly one
/// thread at a time.
pub struct Consumer {
    inner: Arc<Inner>,
}

impl Consumer {
    /// Copy up to `dst.len()` unread bytes out of the ring.
    ///
    /// Never blocks; returns the number of bytes actually moved, which is
    /// less than `dst.len()` when fewer bytes have been written.
    pub fn read(&mut self, dst: &mut [u8]) -> usize {
        let mask = self.inner.size - 1;
        let rp = self.inner.read_pos.load(Ordering::Relaxed);
        let wp = self.inner.write_pos.load(Ordering::Acquire);
        let available = wp.wrapping_sub(rp) & mask;
        let n = dst.len().min(available);
        if n == 0 {
            return 0;
        }

        let first = n.min(self.inner.size - rp);
        // SAFETY: the region [rp, rp + n) (mod size) was published by the
        // producer's Release store and will not be rewritten until the
        // Release store below frees it; this consumer is the only reader.
        unsafe {
            let base = (*self.inner.data.get()).as_ptr();
            std::ptr::copy_nonoverlapping(base.add(rp), dst.as_mut_ptr(), first);
            if n > first {
                std::ptr::copy_nonoverlapping(base, dst.as_mut_ptr().add(first), n - first);
            }
        }
        self.inner.read_pos.store((rp + n) & mask, Ordering::Release);
        n
    }

    /// Bytes currently available to read.
    pub fn read_space(&self) -> usize {
        let mask = self.inner.size - 1;
        let rp = self.inner.read_pos.load(Ordering::Relaxed);
        let wp = self.inner.write_pos.load(Ordering::Acquire);
        wp.wrapping_sub(rp) & mask
    }

    /// Total arena size in bytes (one byte of which is always kept open).
    pub fn capacity(&self) -> usize {
        self.inner.size
    }

    /// Dequeue one fixed-size record, whole or not at all.
    pub fn read_record<T: Pod>(&mut self) -> Option<T> {
        if self.read_space() < std::mem::size_of::<T>() {
            return None;
        }
        let mut record = T::zeroed();
        let read = self.read(bytemuck::bytes_of_mut(&mut record));
        debug_assert_eq!(read, std::mem::size_of::<T>());
        Some(record)
    }

    /// Dequeue as many whole records as fit into `dst`.
    ///
    /// Bulk variant of [`read_record`](Self::read_record) for drain-style
    /// consumers (e.g. the analysis thread). Returns the record count.
    pub fn read_records_into<T: Pod>(&mut self, dst: &mut [T]) -> usize {
        let record_size = std::mem::size_of::<T>();
        if record_size == 0 {
            return 0;
        }
        let n = (self.read_space() / record_size).min(dst.len());
        if n == 0 {
            return 0;
        }
        let read = self.read(bytemuck::cast_slice_mut(&mut dst[..n]));
        debug_assert_eq!(read, n * record_size);
        n
    }
}
