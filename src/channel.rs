//! Outbound half of a client connection.
//!
//! A [`Channel`] serializes responses and hands the frames to the
//! connection's writer task. Sessions are bound to the channel that opened
//! them; identity is the channel id, not the transport.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::AsyncWrite;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{Result, WireError};
use crate::protocol::{MessageSerializer, ResponseMessage};
use crate::writer::{spawn_writer_task, OutboundFrame, WriterConfig, WriterHandle};

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

/// Cloneable handle to a connection's outbound side.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

struct ChannelInner {
    id: u64,
    writer: WriterHandle,
    serializer: Arc<MessageSerializer>,
    closed: AtomicBool,
}

impl Channel {
    /// Wrap an existing writer handle.
    pub fn new(writer: WriterHandle, serializer: Arc<MessageSerializer>) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                id: NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed),
                writer,
                serializer,
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Spawn a writer task over `transport` and return a channel feeding it.
    pub fn spawn<W>(
        transport: W,
        serializer: Arc<MessageSerializer>,
        config: WriterConfig,
    ) -> (Self, JoinHandle<Result<()>>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (writer, task) = spawn_writer_task(transport, config);
        (Self::new(writer, serializer), task)
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Whether both handles refer to the same connection.
    #[inline]
    pub fn same_channel(&self, other: &Channel) -> bool {
        self.inner.id == other.inner.id
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire) || self.inner.writer.is_closed()
    }

    /// Serialize `response` and queue it for writing.
    pub async fn send_response(&self, response: &ResponseMessage) -> Result<()> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(WireError::ConnectionClosed);
        }
        let body = self.inner.serializer.serialize_response(response)?;
        self.inner.writer.send(OutboundFrame::new(body)?).await
    }

    /// Close after every response queued so far has been written.
    ///
    /// Closing twice is a no-op.
    pub async fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        debug!(channel_id = self.inner.id, "Closing channel");
        match self.inner.writer.close().await {
            Ok(()) | Err(WireError::ConnectionClosed) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Writer backpressure state, for callers that want to shed load.
    pub fn pending_frames(&self) -> usize {
        self.inner.writer.pending_count()
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.inner.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}
