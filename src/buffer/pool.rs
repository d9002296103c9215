//! Buffer allocation strategies.
//!
//! The serializer asks a [`BufferAllocator`] for output buffers. Three kinds
//! exist:
//!
//! - `UnpooledHeap`: every buffer owns a fresh allocation.
//! - `PooledHeap`: buffers draw fixed-size segments from a shared free list
//!   and return them when the buffer is dropped.
//! - `PooledDirect`: same as pooled heap, but the buffers are flagged direct
//!   so the writer can hand their segments straight to vectored socket I/O.
//!
//! Segments returned to the pool are zeroed before reuse.

use std::sync::{Arc, Mutex};

use bytes::BytesMut;

use super::{Buffer, DEFAULT_INITIAL_CAPACITY, DEFAULT_MAX_CAPACITY};

/// Default segment size for pooled buffers.
pub const DEFAULT_POOL_SEGMENT_SIZE: usize = 8 * 1024;

/// Default number of idle segments a pool keeps.
pub const DEFAULT_MAX_POOLED_SEGMENTS: usize = 64;

#[derive(Debug)]
struct PoolInner {
    free: Mutex<Vec<BytesMut>>,
    segment_size: usize,
    max_pooled: usize,
    direct: bool,
}

/// Shared free list of equally sized segments.
///
/// Cloning is cheap; clones share the same free list.
#[derive(Debug, Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

impl BufferPool {
    /// Create a pool handing out segments of `segment_size` bytes.
    pub fn new(segment_size: usize, max_pooled: usize, direct: bool) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                free: Mutex::new(Vec::with_capacity(max_pooled)),
                segment_size: segment_size.max(1),
                max_pooled,
                direct,
            }),
        }
    }

    /// Segment size of this pool.
    pub fn segment_size(&self) -> usize {
        self.inner.segment_size
    }

    /// Whether buffers from this pool are flagged direct.
    pub fn is_direct(&self) -> bool {
        self.inner.direct
    }

    /// Number of idle segments waiting for reuse.
    pub fn idle_segments(&self) -> usize {
        self.inner.free.lock().map(|free| free.len()).unwrap_or(0)
    }

    /// Take a segment large enough for `min_len` bytes.
    ///
    /// Requests larger than the segment size get a dedicated allocation
    /// that is never pooled.
    pub(crate) fn acquire(&self, min_len: usize) -> BytesMut {
        if min_len > self.inner.segment_size {
            return BytesMut::zeroed(min_len);
        }
        let recycled = self.inner.free.lock().ok().and_then(|mut free| free.pop());
        recycled.unwrap_or_else(|| BytesMut::zeroed(self.inner.segment_size))
    }

    /// Return segments to the free list.
    pub(crate) fn recycle(&self, segments: Vec<BytesMut>) {
        let Ok(mut free) = self.inner.free.lock() else {
            return;
        };
        for mut segment in segments {
            if free.len() >= self.inner.max_pooled {
                break;
            }
            if segment.len() != self.inner.segment_size {
                continue;
            }
            segment.fill(0);
            free.push(segment);
        }
    }

    /// Allocate a pooled, growable buffer.
    pub fn buffer(&self, max_capacity: usize) -> Buffer {
        Buffer::pooled(vec![self.acquire(1)], max_capacity, self.clone())
    }
}

/// Allocation strategy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocatorKind {
    /// Fresh heap allocation per buffer.
    UnpooledHeap,
    /// Heap segments recycled through a pool.
    #[default]
    PooledHeap,
    /// Pooled segments flagged for zero-copy transport I/O.
    PooledDirect,
}

/// Hands out [`Buffer`]s according to an [`AllocatorKind`].
#[derive(Debug, Clone)]
pub struct BufferAllocator {
    kind: AllocatorKind,
    pool: Option<BufferPool>,
    max_capacity: usize,
}

impl BufferAllocator {
    /// Create an allocator with default segment size and capacity limit.
    pub fn new(kind: AllocatorKind) -> Self {
        Self::with_limits(kind, DEFAULT_POOL_SEGMENT_SIZE, DEFAULT_MAX_CAPACITY)
    }

    /// Create an allocator with explicit segment size and capacity limit.
    pub fn with_limits(kind: AllocatorKind, segment_size: usize, max_capacity: usize) -> Self {
        let pool = match kind {
            AllocatorKind::UnpooledHeap => None,
            AllocatorKind::PooledHeap => Some(BufferPool::new(
                segment_size,
                DEFAULT_MAX_POOLED_SEGMENTS,
                false,
            )),
            AllocatorKind::PooledDirect => Some(BufferPool::new(
                segment_size,
                DEFAULT_MAX_POOLED_SEGMENTS,
                true,
            )),
        };
        Self {
            kind,
            pool,
            max_capacity,
        }
    }

    /// Allocation strategy in use.
    pub fn kind(&self) -> AllocatorKind {
        self.kind
    }

    /// Pool backing this allocator, if pooled.
    pub fn pool(&self) -> Option<&BufferPool> {
        self.pool.as_ref()
    }

    /// Allocate an empty growable buffer.
    pub fn allocate(&self) -> Buffer {
        match &self.pool {
            Some(pool) => pool.buffer(self.max_capacity),
            None => Buffer::growable(DEFAULT_INITIAL_CAPACITY, self.max_capacity),
        }
    }
}

impl Default for BufferAllocator {
    fn default() -> Self {
        Self::new(AllocatorKind::default())
    }
}
