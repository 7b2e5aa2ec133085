//! Session buffer pool
//!
//! Pre-allocated `BytesMut` buffers with lock-free acquire/release. Each
//! stats session takes one buffer for the request and one for the response
//! and gives both back when it is torn down.

use bytes::BytesMut;
use crossbeam::queue::ArrayQueue;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Default capacity of a pooled buffer
pub const DEFAULT_BUFFER_SIZE: usize = 16 * 1024;

/// Buffers that grew past this are not returned to the pool
const MAX_RETAINED_FACTOR: usize = 8;

/// A buffer from the pool
pub struct Buffer {
    data: BytesMut,
    pool: Arc<BufferPoolInner>,
}

impl Buffer {
    /// Get the buffer's capacity
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }
}

impl Deref for Buffer {
    type Target = BytesMut;

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

impl DerefMut for Buffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.data
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        // Return buffer to pool
        let data = std::mem::take(&mut self.data);
        self.pool.return_buffer(data);
    }
}

/// Inner pool state (shared across clones)
struct BufferPoolInner {
    buffers: ArrayQueue<BytesMut>,
    buffer_size: usize,

    // Metrics
    allocated: AtomicUsize,
    in_use: AtomicUsize,
    misses: AtomicUsize,
}

impl BufferPoolInner {
    fn return_buffer(&self, mut data: BytesMut) {
        self.in_use.fetch_sub(1, Ordering::Relaxed);
        if data.capacity() > self.buffer_size * MAX_RETAINED_FACTOR {
            return;
        }
        data.clear();
        let _ = self.buffers.push(data);
    }
}

/// Lock-free buffer pool with pre-allocated buffers
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<BufferPoolInner>,
}

impl BufferPool {
    /// Create a pool of `count` buffers of `buffer_size` bytes each
    pub fn new(count: usize, buffer_size: usize) -> Self {
        let inner = BufferPoolInner {
            buffers: ArrayQueue::new(count.max(1)),
            buffer_size,
            allocated: AtomicUsize::new(0),
            in_use: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        };

        // Pre-allocate buffers
        for _ in 0..count {
            let _ = inner.buffers.push(BytesMut::with_capacity(buffer_size));
            inner.allocated.fetch_add(1, Ordering::Relaxed);
        }

        Self {
            inner: Arc::new(inner),
        }
    }

    /// Acquire a buffer
    /// Returns None if pool is exhausted (caller should retry or allocate)
    pub fn acquire(&self) -> Option<Buffer> {
        self.inner.buffers.pop().map(|mut data| {
            self.inner.in_use.fetch_add(1, Ordering::Relaxed);
            // Writers may have split off part of the capacity.
            if data.capacity() < self.inner.buffer_size {
                data.reserve(self.inner.buffer_size);
            }
            Buffer {
                data,
                pool: self.inner.clone(),
            }
        })
    }

    /// Acquire a buffer, allocating a new one if pool is exhausted
    pub fn acquire_or_alloc(&self) -> Buffer {
        self.acquire().unwrap_or_else(|| {
            self.inner.misses.fetch_add(1, Ordering::Relaxed);
            self.inner.allocated.fetch_add(1, Ordering::Relaxed);
            self.inner.in_use.fetch_add(1, Ordering::Relaxed);
            Buffer {
                data: BytesMut::with_capacity(self.inner.buffer_size),
                pool: self.inner.clone(),
            }
        })
    }

    /// Get pool statistics
    pub fn stats(&self) -> BufferPoolStats {
        BufferPoolStats {
            allocated: self.inner.allocated.load(Ordering::Relaxed),
            in_use: self.inner.in_use.load(Ordering::Relaxed),
            available: self.inner.buffers.len(),
            misses: self.inner.misses.load(Ordering::Relaxed),
        }
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(64, DEFAULT_BUFFER_SIZE)
    }
}

/// Buffer pool statistics
#[derive(Debug, Clone)]
pub struct BufferPoolStats {
    pub allocated: usize,
    pub in_use: usize,
    pub available: usize,
    pub misses: usize,
}
