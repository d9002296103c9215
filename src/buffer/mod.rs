//! Reference-counted, dual-cursor byte buffer.
//!
//! A [`Buffer`] is an octet container with independent reader and writer
//! cursors laid over one or more contiguous `BytesMut` segments:
//!
//! ```text
//! +-------------------+------------------+------------------+
//! | discardable bytes |  readable bytes  |  writable bytes  |
//! +-------------------+------------------+------------------+
//! 0      <=      readerIndex   <=   writerIndex    <=    capacity
//! ```
//!
//! All multi-byte primitives are big-endian. Floats are written as their
//! IEEE-754 bit patterns, so NaN payloads and signed zero survive a round
//! trip.
//!
//! # Growth
//!
//! A buffer is either *fixed* (writing past `capacity` fails with
//! [`BufferError::OutOfBounds`]) or *growable* up to a maximum capacity, in
//! which case a new segment is appended. The policy is chosen at
//! construction and never changes for an instance.
//!
//! # Lifetime
//!
//! Every buffer starts with a reference count of 1. [`Buffer::retain`] and
//! [`Buffer::release`] adjust it atomically and both take `&self`, so a
//! buffer shared between threads can be retained and released from either.
//! After the release that reaches zero every operation fails with
//! [`BufferError::Released`]; pooled segments return to their pool when the
//! buffer is dropped.
//!
//! # Example
//!
//! ```
//! use graphwire::buffer::Buffer;
//!
//! let mut buf = Buffer::fixed(16);
//! buf.write_int(42).unwrap();
//! buf.write_bool(true).unwrap();
//!
//! assert_eq!(buf.readable_bytes(), 5);
//! assert_eq!(buf.read_int().unwrap(), 42);
//! assert!(buf.read_bool().unwrap());
//! ```

mod pool;

use std::borrow::Cow;
use std::io::{IoSlice, Write};
use std::sync::atomic::{fence, AtomicUsize, Ordering};

use bytes::{Bytes, BytesMut};
use thiserror::Error;

pub use pool::{AllocatorKind, BufferAllocator, BufferPool, DEFAULT_POOL_SEGMENT_SIZE};

/// Default initial capacity for growable heap buffers.
pub const DEFAULT_INITIAL_CAPACITY: usize = 256;

/// Default maximum capacity for growable heap buffers (i32::MAX, the largest
/// length a GraphBinary length prefix can express).
pub const DEFAULT_MAX_CAPACITY: usize = i32::MAX as usize;

/// Errors raised by buffer operations.
#[derive(Debug, Error)]
pub enum BufferError {
    /// Access outside the permitted region.
    #[error("index out of bounds: {op} at index {index} with length {length} exceeds {limit}")]
    OutOfBounds {
        /// Operation that failed.
        op: &'static str,
        /// Starting index of the access.
        index: usize,
        /// Number of bytes requested.
        length: usize,
        /// Upper bound that was violated.
        limit: usize,
    },

    /// The buffer was used after its final release.
    #[error("buffer has already been released")]
    Released,

    /// `release` was called with a reference count of zero.
    #[error("illegal reference count decrement")]
    IllegalReferenceCount,

    /// The sink passed to [`Buffer::read_bytes_to`] failed.
    #[error("sink I/O error: {0}")]
    Io(#[from] std::io::Error),
}

type BufResult<T> = std::result::Result<T, BufferError>;

/// Check that `[index, index + length)` ends within `limit`, overflow included.
fn check_span(op: &'static str, index: usize, length: usize, limit: usize) -> BufResult<usize> {
    match index.checked_add(length) {
        Some(end) if end <= limit => Ok(end),
        _ => Err(BufferError::OutOfBounds {
            op,
            index,
            length,
            limit,
        }),
    }
}

/// Growth policy for writes past the current capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Growth {
    /// Writing past capacity fails.
    Fixed,
    /// Capacity may grow by appending segments, up to the given maximum.
    Growable {
        /// Hard upper bound for capacity.
        max_capacity: usize,
    },
}

/// Reference-counted octet container with independent read/write cursors.
///
/// Buffers are not thread-safe for reads and writes; only the reference
/// count may be touched concurrently. Move a buffer to another thread to
/// hand over the right to read and write it.
#[derive(Debug)]
pub struct Buffer {
    /// Underlying contiguous regions. Each segment's `len()` is its size.
    segments: Vec<BytesMut>,
    capacity: usize,
    reader_index: usize,
    writer_index: usize,
    marked_writer_index: Option<usize>,
    growth: Growth,
    direct: bool,
    ref_count: AtomicUsize,
    /// Pool that owns the segments, if any.
    pool: Option<BufferPool>,
}

impl Buffer {
    fn from_parts(
        segments: Vec<BytesMut>,
        writer_index: usize,
        growth: Growth,
        direct: bool,
        pool: Option<BufferPool>,
    ) -> Self {
        let capacity = segments.iter().map(|s| s.len()).sum();
        Self {
            segments,
            capacity,
            reader_index: 0,
            writer_index,
            marked_writer_index: None,
            growth,
            direct,
            ref_count: AtomicUsize::new(1),
            pool,
        }
    }

    /// Create an unpooled heap buffer that cannot grow past `capacity`.
    pub fn fixed(capacity: usize) -> Self {
        Self::from_parts(vec![BytesMut::zeroed(capacity)], 0, Growth::Fixed, false, None)
    }

    /// Create an unpooled heap buffer that grows on demand.
    pub fn growable(initial_capacity: usize, max_capacity: usize) -> Self {
        let initial = initial_capacity.min(max_capacity);
        Self::from_parts(
            vec![BytesMut::zeroed(initial)],
            0,
            Growth::Growable { max_capacity },
            false,
            None,
        )
    }

    /// Create a growable heap buffer with default sizing.
    pub fn new() -> Self {
        Self::growable(DEFAULT_INITIAL_CAPACITY, DEFAULT_MAX_CAPACITY)
    }

    /// Wrap existing bytes as a fixed, fully readable buffer (copies once).
    pub fn wrap(data: &[u8]) -> Self {
        Self::from_parts(
            vec![BytesMut::from(data)],
            data.len(),
            Growth::Fixed,
            false,
            None,
        )
    }

    /// Build a composite buffer whose readable region spans all `segments`.
    ///
    /// Empty segments are dropped; at least one segment is always kept.
    pub fn from_segments(segments: Vec<BytesMut>) -> Self {
        let mut segments: Vec<BytesMut> = segments.into_iter().filter(|s| !s.is_empty()).collect();
        if segments.is_empty() {
            segments.push(BytesMut::new());
        }
        let total = segments.iter().map(|s| s.len()).sum();
        Self::from_parts(segments, total, Growth::Fixed, false, None)
    }

    pub(crate) fn pooled(segments: Vec<BytesMut>, max_capacity: usize, pool: BufferPool) -> Self {
        let direct = pool.is_direct();
        Self::from_parts(
            segments,
            0,
            Growth::Growable { max_capacity },
            direct,
            Some(pool),
        )
    }

    // ------------------------------------------------------------------
    // Cursors
    // ------------------------------------------------------------------

    /// Number of bytes between the reader and writer cursors.
    #[inline]
    pub fn readable_bytes(&self) -> usize {
        self.writer_index - self.reader_index
    }

    /// Number of bytes that can be written without growing.
    #[inline]
    pub fn writable_bytes(&self) -> usize {
        self.capacity - self.writer_index
    }

    /// Current reader cursor.
    #[inline]
    pub fn reader_index(&self) -> usize {
        self.reader_index
    }

    /// Move the reader cursor. Must lie in `[0, writer_index]`.
    pub fn set_reader_index(&mut self, index: usize) -> BufResult<&mut Self> {
        self.ensure_live()?;
        if index > self.writer_index {
            return Err(BufferError::OutOfBounds {
                op: "set_reader_index",
                index,
                length: 0,
                limit: self.writer_index,
            });
        }
        self.reader_index = index;
        Ok(self)
    }

    /// Current writer cursor.
    #[inline]
    pub fn writer_index(&self) -> usize {
        self.writer_index
    }

    /// Move the writer cursor. Must lie in `[reader_index, capacity]`.
    pub fn set_writer_index(&mut self, index: usize) -> BufResult<&mut Self> {
        self.ensure_live()?;
        if index < self.reader_index || index > self.capacity {
            return Err(BufferError::OutOfBounds {
                op: "set_writer_index",
                index,
                length: 0,
                limit: self.capacity,
            });
        }
        self.writer_index = index;
        Ok(self)
    }

    /// Remember the current writer cursor.
    pub fn mark_writer_index(&mut self) -> &mut Self {
        self.marked_writer_index = Some(self.writer_index);
        self
    }

    /// Restore the writer cursor saved by [`mark_writer_index`](Self::mark_writer_index).
    ///
    /// Without a prior mark the cursor resets to 0, clamped to the reader
    /// cursor so `reader_index <= writer_index` still holds.
    pub fn reset_writer_index(&mut self) -> &mut Self {
        let target = self.marked_writer_index.unwrap_or(0);
        self.writer_index = target.max(self.reader_index);
        self
    }

    /// Total bytes this buffer can currently hold.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Growth policy of this instance.
    #[inline]
    pub fn growth(&self) -> Growth {
        self.growth
    }

    /// Whether this buffer was allocated for zero-copy transport I/O.
    #[inline]
    pub fn is_direct(&self) -> bool {
        self.direct
    }

    /// Whether this buffer's segments came from a pool.
    #[inline]
    pub fn is_pooled(&self) -> bool {
        self.pool.is_some()
    }

    /// Number of underlying contiguous segments.
    #[inline]
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    // ------------------------------------------------------------------
    // Reference counting
    // ------------------------------------------------------------------

    /// Current reference count (0 once released).
    pub fn reference_count(&self) -> usize {
        self.ref_count.load(Ordering::Acquire)
    }

    /// Increase the reference count by one.
    pub fn retain(&self) -> BufResult<&Self> {
        let mut current = self.ref_count.load(Ordering::Relaxed);
        loop {
            if current == 0 {
                return Err(BufferError::Released);
            }
            match self.ref_count.compare_exchange_weak(
                current,
                current + 1,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Ok(self),
                Err(actual) => current = actual,
            }
        }
    }

    /// Decrease the reference count by one.
    ///
    /// Safe to call concurrently with [`retain`](Self::retain) and other
    /// releases. Returns `true` for the one call that brought the count to
    /// zero; from then on every operation fails with
    /// [`BufferError::Released`]. Pooled segments go back to their pool
    /// when the released buffer is dropped.
    pub fn release(&self) -> BufResult<bool> {
        let mut current = self.ref_count.load(Ordering::Relaxed);
        loop {
            if current == 0 {
                return Err(BufferError::IllegalReferenceCount);
            }
            match self.ref_count.compare_exchange_weak(
                current,
                current - 1,
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        if current != 1 {
            return Ok(false);
        }
        fence(Ordering::Acquire);
        Ok(true)
    }

    #[inline]
    fn ensure_live(&self) -> BufResult<()> {
        if self.ref_count.load(Ordering::Acquire) == 0 {
            return Err(BufferError::Released);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Segment addressing
    // ------------------------------------------------------------------

    /// Visit the `(segment, start, end)` pieces covering `[index, index + length)`.
    fn for_each_piece(&self, index: usize, length: usize, mut f: impl FnMut(usize, usize, usize)) {
        let mut base = 0;
        let end = index.saturating_add(length);
        for (seg_idx, seg) in self.segments.iter().enumerate() {
            let seg_end = base + seg.len();
            if seg_end > index && base < end {
                let start = index.max(base) - base;
                let stop = end.min(seg_end) - base;
                f(seg_idx, start, stop);
            }
            if seg_end >= end {
                break;
            }
            base = seg_end;
        }
    }

    fn copy_out(&self, index: usize, dst: &mut [u8]) {
        let mut written = 0;
        self.for_each_piece(index, dst.len(), |seg, start, stop| {
            let n = stop - start;
            dst[written..written + n].copy_from_slice(&self.segments[seg][start..stop]);
            written += n;
        });
    }

    fn copy_in(&mut self, index: usize, src: &[u8]) {
        let mut pieces = Vec::with_capacity(2);
        self.for_each_piece(index, src.len(), |seg, start, stop| {
            pieces.push((seg, start, stop));
        });
        let mut consumed = 0;
        for (seg, start, stop) in pieces {
            let n = stop - start;
            self.segments[seg][start..stop].copy_from_slice(&src[consumed..consumed + n]);
            consumed += n;
        }
    }

    fn ensure_writable(&mut self, length: usize) -> BufResult<()> {
        self.ensure_live()?;
        let Some(required) = self.writer_index.checked_add(length) else {
            return Err(BufferError::OutOfBounds {
                op: "write",
                index: self.writer_index,
                length,
                limit: self.capacity,
            });
        };
        if required <= self.capacity {
            return Ok(());
        }
        match self.growth {
            Growth::Fixed => Err(BufferError::OutOfBounds {
                op: "write",
                index: self.writer_index,
                length,
                limit: self.capacity,
            }),
            Growth::Growable { max_capacity } => {
                if required > max_capacity {
                    return Err(BufferError::OutOfBounds {
                        op: "write",
                        index: self.writer_index,
                        length,
                        limit: max_capacity,
                    });
                }
                let missing = required - self.capacity;
                let segment = match &self.pool {
                    Some(pool) => pool.acquire(missing),
                    None => {
                        // Double the capacity, at least covering the request.
                        let wanted = self.capacity.max(missing).min(max_capacity - self.capacity);
                        BytesMut::zeroed(wanted.max(missing))
                    }
                };
                self.capacity += segment.len();
                self.segments.push(segment);
                Ok(())
            }
        }
    }

    fn ensure_readable(&self, op: &'static str, length: usize) -> BufResult<()> {
        self.ensure_live()?;
        if length > self.readable_bytes() {
            return Err(BufferError::OutOfBounds {
                op,
                index: self.reader_index,
                length,
                limit: self.writer_index,
            });
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Primitive reads
    // ------------------------------------------------------------------

    #[inline]
    fn read_array<const N: usize>(&mut self, op: &'static str) -> BufResult<[u8; N]> {
        self.ensure_readable(op, N)?;
        let mut out = [0u8; N];
        self.copy_out(self.reader_index, &mut out);
        self.reader_index += N;
        Ok(out)
    }

    /// Read a boolean (any non-zero byte is `true`).
    pub fn read_bool(&mut self) -> BufResult<bool> {
        Ok(self.read_array::<1>("read_bool")?[0] != 0)
    }

    /// Read a signed byte.
    pub fn read_byte(&mut self) -> BufResult<i8> {
        Ok(self.read_array::<1>("read_byte")?[0] as i8)
    }

    /// Read an unsigned byte.
    pub fn read_u8(&mut self) -> BufResult<u8> {
        Ok(self.read_array::<1>("read_u8")?[0])
    }

    /// Read a big-endian 16-bit integer.
    pub fn read_short(&mut self) -> BufResult<i16> {
        Ok(i16::from_be_bytes(self.read_array("read_short")?))
    }

    /// Read a big-endian 32-bit integer.
    pub fn read_int(&mut self) -> BufResult<i32> {
        Ok(i32::from_be_bytes(self.read_array("read_int")?))
    }

    /// Read a big-endian 64-bit integer.
    pub fn read_long(&mut self) -> BufResult<i64> {
        Ok(i64::from_be_bytes(self.read_array("read_long")?))
    }

    /// Read a 32-bit IEEE-754 float.
    pub fn read_float(&mut self) -> BufResult<f32> {
        Ok(f32::from_bits(u32::from_be_bytes(self.read_array("read_float")?)))
    }

    /// Read a 64-bit IEEE-754 float.
    pub fn read_double(&mut self) -> BufResult<f64> {
        Ok(f64::from_bits(u64::from_be_bytes(self.read_array("read_double")?)))
    }

    /// Fill `dst` from the reader cursor.
    pub fn read_bytes(&mut self, dst: &mut [u8]) -> BufResult<&mut Self> {
        self.ensure_readable("read_bytes", dst.len())?;
        self.copy_out(self.reader_index, dst);
        self.reader_index += dst.len();
        Ok(self)
    }

    /// Fill `dst[dst_index..dst_index + length]` from the reader cursor.
    pub fn read_bytes_into(
        &mut self,
        dst: &mut [u8],
        dst_index: usize,
        length: usize,
    ) -> BufResult<&mut Self> {
        let end = check_span("read_bytes_into", dst_index, length, dst.len())?;
        self.read_bytes(&mut dst[dst_index..end])
    }

    /// Read `length` bytes into a fresh vector.
    pub fn read_vec(&mut self, length: usize) -> BufResult<Vec<u8>> {
        self.ensure_readable("read_vec", length)?;
        let mut out = vec![0u8; length];
        self.copy_out(self.reader_index, &mut out);
        self.reader_index += length;
        Ok(out)
    }

    /// Copy `length` readable bytes into `sink`.
    ///
    /// The reader cursor only advances by what the sink accepted, so a
    /// failing sink leaves the unconsumed bytes readable.
    pub fn read_bytes_to<W: Write>(&mut self, sink: &mut W, length: usize) -> BufResult<&mut Self> {
        self.ensure_readable("read_bytes_to", length)?;
        let mut pieces = Vec::with_capacity(self.segments.len());
        self.for_each_piece(self.reader_index, length, |seg, start, stop| {
            pieces.push((seg, start, stop));
        });
        for (seg, start, stop) in pieces {
            sink.write_all(&self.segments[seg][start..stop])?;
            self.reader_index += stop - start;
        }
        Ok(self)
    }

    /// Skip `length` readable bytes.
    pub fn skip_bytes(&mut self, length: usize) -> BufResult<&mut Self> {
        self.ensure_readable("skip_bytes", length)?;
        self.reader_index += length;
        Ok(self)
    }

    // ------------------------------------------------------------------
    // Primitive writes
    // ------------------------------------------------------------------

    #[inline]
    fn write_array(&mut self, bytes: &[u8]) -> BufResult<&mut Self> {
        self.ensure_writable(bytes.len())?;
        self.copy_in(self.writer_index, bytes);
        self.writer_index += bytes.len();
        Ok(self)
    }

    /// Write a boolean as `0` or `1`.
    pub fn write_bool(&mut self, value: bool) -> BufResult<&mut Self> {
        self.write_array(&[value as u8])
    }

    /// Write a signed byte.
    pub fn write_byte(&mut self, value: i8) -> BufResult<&mut Self> {
        self.write_array(&[value as u8])
    }

    /// Write an unsigned byte.
    pub fn write_u8(&mut self, value: u8) -> BufResult<&mut Self> {
        self.write_array(&[value])
    }

    /// Write a big-endian 16-bit integer.
    pub fn write_short(&mut self, value: i16) -> BufResult<&mut Self> {
        self.write_array(&value.to_be_bytes())
    }

    /// Write a big-endian 32-bit integer.
    pub fn write_int(&mut self, value: i32) -> BufResult<&mut Self> {
        self.write_array(&value.to_be_bytes())
    }

    /// Write a big-endian 64-bit integer.
    pub fn write_long(&mut self, value: i64) -> BufResult<&mut Self> {
        self.write_array(&value.to_be_bytes())
    }

    /// Write a 32-bit IEEE-754 float.
    pub fn write_float(&mut self, value: f32) -> BufResult<&mut Self> {
        self.write_array(&value.to_bits().to_be_bytes())
    }

    /// Write a 64-bit IEEE-754 float.
    pub fn write_double(&mut self, value: f64) -> BufResult<&mut Self> {
        self.write_array(&value.to_bits().to_be_bytes())
    }

    /// Write all of `src`.
    pub fn write_bytes(&mut self, src: &[u8]) -> BufResult<&mut Self> {
        self.write_array(src)
    }

    /// Write `src[src_index..src_index + length]`.
    pub fn write_bytes_from(
        &mut self,
        src: &[u8],
        src_index: usize,
        length: usize,
    ) -> BufResult<&mut Self> {
        let end = check_span("write_bytes_from", src_index, length, src.len())?;
        self.write_array(&src[src_index..end])
    }

    // ------------------------------------------------------------------
    // Absolute access and views
    // ------------------------------------------------------------------

    /// Copy bytes starting at absolute `index` without moving any cursor.
    pub fn get_bytes(&self, index: usize, dst: &mut [u8]) -> BufResult<&Self> {
        self.ensure_live()?;
        check_span("get_bytes", index, dst.len(), self.capacity)?;
        self.copy_out(index, dst);
        Ok(self)
    }

    fn check_written(&self, op: &'static str, index: usize, length: usize) -> BufResult<()> {
        self.ensure_live()?;
        check_span(op, index, length, self.writer_index)?;
        Ok(())
    }

    /// Number of views [`nio_buffers`](Self::nio_buffers) may return at most.
    pub fn nio_buffer_count(&self) -> usize {
        self.segments.len()
    }

    /// Readable bytes as read-only slices sharing this buffer's memory.
    pub fn nio_buffers(&self) -> BufResult<Vec<&[u8]>> {
        self.nio_buffers_range(self.reader_index, self.readable_bytes())
    }

    /// `[index, index + length)` as read-only slices sharing this buffer's memory.
    pub fn nio_buffers_range(&self, index: usize, length: usize) -> BufResult<Vec<&[u8]>> {
        self.check_written("nio_buffers", index, length)?;
        let segments = &self.segments;
        let mut views: Vec<&[u8]> = Vec::with_capacity(segments.len());
        self.for_each_piece(index, length, |seg, start, stop| {
            views.push(&segments[seg][start..stop]);
        });
        if views.is_empty() {
            views.push(&[][..]);
        }
        Ok(views)
    }

    /// Readable bytes as one view, borrowed when contiguous and copied otherwise.
    pub fn nio_buffer(&self) -> BufResult<Cow<'_, [u8]>> {
        self.nio_buffer_range(self.reader_index, self.readable_bytes())
    }

    /// `[index, index + length)` as one view, borrowed when contiguous.
    pub fn nio_buffer_range(&self, index: usize, length: usize) -> BufResult<Cow<'_, [u8]>> {
        let views = self.nio_buffers_range(index, length)?;
        if views.len() == 1 {
            return Ok(Cow::Borrowed(views[0]));
        }
        Ok(Cow::Owned(views.concat()))
    }

    /// Readable bytes as `IoSlice`s for vectored writes.
    pub fn io_slices(&self) -> BufResult<Vec<IoSlice<'_>>> {
        Ok(self.nio_buffers()?.into_iter().map(IoSlice::new).collect())
    }

    /// Copy the readable bytes into an immutable `Bytes` without moving cursors.
    pub fn to_bytes(&self) -> BufResult<Bytes> {
        Ok(Bytes::from(self.nio_buffer()?.into_owned()))
    }
}

impl Default for Buffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        let Some(pool) = &self.pool else {
            return;
        };
        if self.ref_count.load(Ordering::Acquire) > 0 {
            tracing::debug!(
                capacity = self.capacity,
                "pooled buffer dropped without final release"
            );
        }
        pool.recycle(std::mem::take(&mut self.segments));
    }
}
