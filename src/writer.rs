//! Dedicated writer task for outbound frames.
//!
//! Every connection owns one writer task that receives frames via an mpsc
//! channel and writes them length-prefixed to the transport. Producers never
//! share a lock around the socket, and frames that are ready together go out
//! in a single vectored write.
//!
//! # Architecture
//!
//! ```text
//! Session task 1 ─┐
//! Session task 2 ─┼─► mpsc::Sender<WriterMessage> ─► Writer Task ─► Socket
//! Read loop      ─┘
//! ```
//!
//! Frames from one producer are written in the order they were sent. A
//! [`WriterMessage::Close`] is processed after every frame queued before it,
//! then the transport is shut down.

use std::collections::VecDeque;
use std::io::IoSlice;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{Result, WireError};
use crate::protocol::{encode_length_prefix, LENGTH_PREFIX_SIZE};

/// Default maximum pending frames before backpressure kicks in.
pub const DEFAULT_MAX_PENDING_FRAMES: usize = 1024;

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Default backpressure timeout.
pub const DEFAULT_BACKPRESSURE_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum frames to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 64;

/// A frame ready to be written to the transport.
#[derive(Debug)]
pub struct OutboundFrame {
    /// Pre-encoded length prefix.
    pub prefix: [u8; LENGTH_PREFIX_SIZE],
    /// Frame bytes.
    pub body: Bytes,
}

impl OutboundFrame {
    /// Create a new outbound frame.
    #[inline]
    pub fn new(body: Bytes) -> Result<Self> {
        Ok(Self {
            prefix: encode_length_prefix(body.len())?,
            body,
        })
    }

    /// Total size of this frame (prefix + body).
    #[inline]
    pub fn size(&self) -> usize {
        LENGTH_PREFIX_SIZE + self.body.len()
    }
}

/// Message consumed by the writer task.
#[derive(Debug)]
pub enum WriterMessage {
    Frame(OutboundFrame),
    /// Flush what came before, then shut the transport down.
    Close,
}

/// Configuration for the writer task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Maximum pending frames before backpressure kicks in.
    pub max_pending_frames: usize,
    /// Channel capacity for frame queue.
    pub channel_capacity: usize,
    /// Timeout when waiting for backpressure to clear.
    #[serde(with = "duration_millis")]
    pub backpressure_timeout: Duration,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_pending_frames: DEFAULT_MAX_PENDING_FRAMES,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            backpressure_timeout: DEFAULT_BACKPRESSURE_TIMEOUT,
        }
    }
}

/// Serde adapter writing a `Duration` as integer milliseconds.
pub(crate) mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

/// Handle for sending frames to the writer task.
///
/// This is cheaply cloneable and can be shared across sessions.
#[derive(Clone)]
pub struct WriterHandle {
    /// Channel sender for frames.
    tx: mpsc::Sender<WriterMessage>,
    /// Pending frame count (for backpressure).
    pending: Arc<AtomicUsize>,
    /// Maximum pending frames.
    max_pending: usize,
    /// Backpressure timeout.
    timeout: Duration,
}

impl WriterHandle {
    fn new(
        tx: mpsc::Sender<WriterMessage>,
        pending: Arc<AtomicUsize>,
        max_pending: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            tx,
            pending,
            max_pending,
            timeout,
        }
    }

    /// Send a frame to the writer task.
    ///
    /// Waits while backpressure is active, timing out after the configured
    /// duration.
    pub async fn send(&self, frame: OutboundFrame) -> Result<()> {
        if self.pending.load(Ordering::Acquire) >= self.max_pending {
            self.wait_for_backpressure().await?;
        }

        // Increment pending count BEFORE sending
        self.pending.fetch_add(1, Ordering::AcqRel);

        self.tx.send(WriterMessage::Frame(frame)).await.map_err(|_| {
            self.pending.fetch_sub(1, Ordering::Release);
            WireError::ConnectionClosed
        })
    }

    /// Ask the writer task to flush and shut the transport down.
    ///
    /// Frames sent before this call are still written.
    pub async fn close(&self) -> Result<()> {
        self.tx
            .send(WriterMessage::Close)
            .await
            .map_err(|_| WireError::ConnectionClosed)
    }

    /// Whether the writer task has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn wait_for_backpressure(&self) -> Result<()> {
        let start = Instant::now();
        let check_interval = Duration::from_micros(100);

        loop {
            if self.pending.load(Ordering::Acquire) < self.max_pending {
                return Ok(());
            }

            if start.elapsed() > self.timeout {
                return Err(WireError::BackpressureTimeout);
            }

            tokio::time::sleep(check_interval).await;
        }
    }

    /// Check if backpressure is currently active.
    #[inline]
    pub fn is_backpressure_active(&self) -> bool {
        self.pending.load(Ordering::Acquire) >= self.max_pending
    }

    /// Get current pending frame count.
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Try to send a frame without waiting for backpressure.
    ///
    /// Returns `Err(BackpressureTimeout)` immediately if at capacity.
    pub fn try_send(&self, frame: OutboundFrame) -> Result<()> {
        if self.pending.load(Ordering::Acquire) >= self.max_pending {
            return Err(WireError::BackpressureTimeout);
        }

        self.pending.fetch_add(1, Ordering::AcqRel);

        self.tx.try_send(WriterMessage::Frame(frame)).map_err(|e| {
            self.pending.fetch_sub(1, Ordering::Release);
            match e {
                mpsc::error::TrySendError::Full(_) => WireError::BackpressureTimeout,
                mpsc::error::TrySendError::Closed(_) => WireError::ConnectionClosed,
            }
        })
    }
}

/// Spawn the writer task and return a handle for sending frames.
///
/// The JoinHandle resolves when the channel closes, a `Close` message is
/// processed, or a write fails.
pub fn spawn_writer_task<W>(
    writer: W,
    config: WriterConfig,
) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
    let pending = Arc::new(AtomicUsize::new(0));

    let handle = WriterHandle::new(
        tx,
        pending.clone(),
        config.max_pending_frames,
        config.backpressure_timeout,
    );

    let task = tokio::spawn(writer_loop(rx, writer, pending));

    (handle, task)
}

/// Spawn the writer task with default configuration.
pub fn spawn_writer_task_default<W>(writer: W) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    spawn_writer_task(writer, WriterConfig::default())
}

/// Receives frames and writes each ready batch with vectored I/O.
async fn writer_loop<W>(
    mut rx: mpsc::Receiver<WriterMessage>,
    mut writer: W,
    pending: Arc<AtomicUsize>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
    let mut closing = false;

    while !closing {
        match rx.recv().await {
            Some(WriterMessage::Frame(frame)) => batch.push(frame),
            Some(WriterMessage::Close) => closing = true,
            None => {
                debug!("Writer channel closed");
                return Ok(());
            }
        }
        while !closing && batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(WriterMessage::Frame(frame)) => batch.push(frame),
                Ok(WriterMessage::Close) => closing = true,
                Err(_) => break,
            }
        }
        if batch.is_empty() {
            continue;
        }

        write_batch(&mut writer, &batch).await?;
        pending.fetch_sub(batch.len(), Ordering::Release);
        batch.clear();
    }

    debug!("Writer closing transport");
    rx.close();
    writer.shutdown().await?;
    Ok(())
}

/// Write every frame of `batch`, resuming after short writes.
async fn write_batch<W>(writer: &mut W, batch: &[OutboundFrame]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut unwritten = Unwritten::new(batch);
    while !unwritten.is_empty() {
        let written = writer.write_vectored(&unwritten.io_slices()).await?;
        if written == 0 {
            return Err(WireError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "transport accepted no bytes",
            )));
        }
        unwritten.advance(written);
    }
    writer.flush().await?;
    Ok(())
}

/// The not yet written tail of a batch: length prefixes and bodies in
/// wire order.
struct Unwritten<'a> {
    chunks: VecDeque<&'a [u8]>,
}

impl<'a> Unwritten<'a> {
    fn new(batch: &'a [OutboundFrame]) -> Self {
        let chunks = batch
            .iter()
            .flat_map(|frame| [&frame.prefix[..], &frame.body[..]])
            .filter(|chunk| !chunk.is_empty())
            .collect();
        Self { chunks }
    }

    fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    fn io_slices(&self) -> Vec<IoSlice<'a>> {
        self.chunks.iter().map(|&chunk| IoSlice::new(chunk)).collect()
    }

    /// Drop the first `written` bytes.
    fn advance(&mut self, mut written: usize) {
        while let Some(front) = self.chunks.pop_front() {
            if written < front.len() {
                self.chunks.push_front(&front[written..]);
                return;
            }
            written -= front.len();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tokio::io::{duplex, AsyncReadExt};

    fn frame(body: &'static [u8]) -> OutboundFrame {
        OutboundFrame::new(Bytes::from_static(body)).unwrap()
    }

    #[test]
    fn test_outbound_frame_creation() {
        let f = frame(b"hello");
        assert_eq!(f.prefix, [0, 0, 0, 5]);
        assert_eq!(f.size(), LENGTH_PREFIX_SIZE + 5);
    }

    #[test]
    fn test_writer_config_default() {
        let config = WriterConfig::default();
        assert_eq!(config.max_pending_frames, DEFAULT_MAX_PENDING_FRAMES);
        assert_eq!(config.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
        assert_eq!(config.backpressure_timeout, DEFAULT_BACKPRESSURE_TIMEOUT);
    }

    #[test]
    fn test_writer_config_serde() {
        let json = serde_json::to_value(WriterConfig::default()).unwrap();
        assert_eq!(json["backpressure_timeout"], 5000);

        let parsed: WriterConfig =
            serde_json::from_str(r#"{"max_pending_frames": 8}"#).unwrap();
        assert_eq!(parsed.max_pending_frames, 8);
        assert_eq!(parsed.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
    }

    #[tokio::test]
    async fn test_writer_handle_send() {
        let (client, mut server) = duplex(4096);
        let (handle, _task) = spawn_writer_task_default(client);

        handle.send(frame(b"hello")).await.unwrap();

        let mut buf = [0u8; LENGTH_PREFIX_SIZE + 5];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf[..4], &[0, 0, 0, 5]);
        assert_eq!(&buf[4..], b"hello");
    }

    #[tokio::test]
    async fn test_writer_batching_preserves_order() {
        let (client, mut server) = duplex(4096);
        let (handle, _task) = spawn_writer_task_default(client);

        for i in 0..10u8 {
            let f = OutboundFrame::new(Bytes::copy_from_slice(&[i])).unwrap();
            handle.send(f).await.unwrap();
        }

        let mut buf = vec![0u8; 10 * (LENGTH_PREFIX_SIZE + 1)];
        server.read_exact(&mut buf).await.unwrap();
        for i in 0..10usize {
            assert_eq!(buf[i * 5 + 4], i as u8);
        }
    }

    #[tokio::test]
    async fn test_close_flushes_then_shuts_down() {
        let (client, mut server) = duplex(4096);
        let (handle, task) = spawn_writer_task_default(client);

        handle.send(frame(b"last")).await.unwrap();
        handle.close().await.unwrap();
        task.await.unwrap().unwrap();

        let mut out = Vec::new();
        server.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, [0, 0, 0, 4, b'l', b'a', b's', b't']);
        assert!(handle.send(frame(b"late")).await.is_err());
    }

    #[tokio::test]
    async fn test_writer_handle_pending_count() {
        let (client, _server) = duplex(4096);
        let config = WriterConfig {
            max_pending_frames: 1000,
            channel_capacity: 100,
            backpressure_timeout: Duration::from_secs(1),
        };
        let (handle, _task) = spawn_writer_task(client, config);

        assert_eq!(handle.pending_count(), 0);
        assert!(!handle.is_backpressure_active());
    }

    #[tokio::test]
    async fn test_try_send_at_capacity() {
        let (tx, _rx) = mpsc::channel::<WriterMessage>(10);
        let pending = Arc::new(AtomicUsize::new(100));
        let handle = WriterHandle::new(tx, pending, 100, Duration::from_secs(1));

        let result = handle.try_send(frame(b""));
        assert!(matches!(result, Err(WireError::BackpressureTimeout)));
    }

    #[test]
    fn test_unwritten_advances_across_chunks() {
        let batch = vec![frame(b"hello"), frame(b"")];
        let mut unwritten = Unwritten::new(&batch);
        assert_eq!(unwritten.io_slices().len(), 3);

        unwritten.advance(2);
        let lens: Vec<_> = unwritten.io_slices().iter().map(|s| s.len()).collect();
        assert_eq!(lens, [LENGTH_PREFIX_SIZE - 2, 5, LENGTH_PREFIX_SIZE]);

        unwritten.advance(LENGTH_PREFIX_SIZE - 2 + 1);
        assert_eq!(&*unwritten.io_slices()[0], b"ello");

        unwritten.advance(4 + LENGTH_PREFIX_SIZE);
        assert!(unwritten.is_empty());
    }

    /// Sink that accepts at most three bytes per write.
    struct Trickle(Vec<u8>);

    impl AsyncWrite for Trickle {
        fn poll_write(
            mut self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            buf: &[u8],
        ) -> std::task::Poll<std::io::Result<usize>> {
            let n = buf.len().min(3);
            self.0.extend_from_slice(&buf[..n]);
            std::task::Poll::Ready(Ok(n))
        }

        fn poll_flush(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Ok(()))
        }

        fn poll_shutdown(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_write_batch_survives_short_writes() {
        let mut sink = Trickle(Vec::new());
        let batch = vec![frame(b"ab"), frame(b"cdefg")];

        write_batch(&mut sink, &batch).await.unwrap();

        assert_eq!(sink.0, b"\0\0\0\x02ab\0\0\0\x05cdefg");
    }

    #[tokio::test]
    async fn test_write_batch_multiple() {
        let mut buf = Cursor::new(Vec::new());
        let batch: Vec<_> = (0..5).map(|_| frame(b"abc")).collect();

        write_batch(&mut buf, &batch).await.unwrap();

        assert_eq!(buf.into_inner().len(), 5 * (LENGTH_PREFIX_SIZE + 3));
    }

    #[tokio::test]
    async fn test_writer_shutdown_on_channel_close() {
        let (client, _server) = duplex(4096);
        let (handle, task) = spawn_writer_task_default(client);

        drop(handle);

        assert!(task.await.unwrap().is_ok());
    }
}
