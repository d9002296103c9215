//! Server builder and per-connection read loop.
//!
//! The [`ServerBuilder`] registers op handlers and settings. The [`Server`]
//! runs one read loop per connection:
//! 1. Split the stream; spawn the writer task behind a [`Channel`]
//! 2. Cut the byte stream into length-prefixed frames
//! 3. Strip the content-type envelope from the first frame
//! 4. Decode each request and submit it to its session
//! 5. On EOF or framing error, tear down the connection's sessions
//!
//! # Example
//!
//! ```no_run
//! use graphwire::{Server, Value};
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::builder()
//!         .handle("eval", |request, ctx| async move {
//!             let script = request.arg_str("gremlin").unwrap_or_default().to_string();
//!             ctx.complete(Value::from(script)).await
//!         })
//!         .build()?;
//!
//!     server.serve(TcpListener::bind("127.0.0.1:8182").await?).await?;
//!     Ok(())
//! }
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::buffer::{AllocatorKind, BufferAllocator};
use crate::channel::Channel;
use crate::codec::{TypeRegistry, DEFAULT_MAX_DEPTH};
use crate::error::{Result, WireError};
use crate::handler::{HandlerResult, OpRegistry, TaskContext};
use crate::protocol::{
    ops, FrameBuffer, HandshakeDecoder, MessageSerializer, RequestMessage, ResponseMessage,
    ResponseStatusCode, DEFAULT_CONTENT_TYPE, DEFAULT_MAX_FRAME_SIZE, MAX_CONTENT_TYPE_LEN,
};
use crate::session::{Session, SessionLimits, SessionManager, SessionTask, TaskExecutor};
use crate::writer::{duration_millis, WriterConfig};

/// Size of the socket read buffer.
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Server configuration.
///
/// Plain data; the host decides where it comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Per-request time budget; zero disables it.
    #[serde(with = "duration_millis")]
    pub evaluation_timeout: Duration,
    /// Lifetime of a multi-task session; zero disables it.
    #[serde(with = "duration_millis")]
    pub session_lifetime_timeout: Duration,
    pub max_queued_tasks_per_session: usize,
    pub max_concurrent_sessions: usize,
    /// Content type expected in the first frame of each connection.
    pub content_type: String,
    pub max_frame_size: u32,
    /// Deepest nesting accepted in a decoded value.
    pub max_value_depth: usize,
    pub allocator: AllocatorKind,
    pub writer: WriterConfig,
}

impl Default for ServerSettings {
    fn default() -> Self {
        let limits = SessionLimits::default();
        Self {
            evaluation_timeout: Duration::from_secs(30),
            session_lifetime_timeout: limits.session_lifetime_timeout,
            max_queued_tasks_per_session: limits.max_queued_tasks_per_session,
            max_concurrent_sessions: limits.max_concurrent_sessions,
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            max_value_depth: DEFAULT_MAX_DEPTH,
            allocator: AllocatorKind::default(),
            writer: WriterConfig::default(),
        }
    }
}

impl ServerSettings {
    fn session_limits(&self) -> SessionLimits {
        SessionLimits {
            max_concurrent_sessions: self.max_concurrent_sessions,
            max_queued_tasks_per_session: self.max_queued_tasks_per_session,
            session_lifetime_timeout: self.session_lifetime_timeout,
        }
    }
}

/// Builder for configuring and creating a [`Server`].
pub struct ServerBuilder {
    ops: OpRegistry,
    types: TypeRegistry,
    settings: ServerSettings,
}

impl ServerBuilder {
    /// Create a new server builder.
    pub fn new() -> Self {
        Self {
            ops: OpRegistry::new(),
            types: TypeRegistry::with_defaults(),
            settings: ServerSettings::default(),
        }
    }

    /// Register a handler for `op` on the default processor.
    pub fn handle<F, Fut>(mut self, op: &str, handler: F) -> Self
    where
        F: Fn(RequestMessage, TaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.ops.register(op, handler);
        self
    }

    /// Register a handler for `op` on a named processor.
    pub fn handle_for<F, Fut>(mut self, processor: &str, op: &str, handler: F) -> Self
    where
        F: Fn(RequestMessage, TaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.ops.register_for(processor, op, handler);
        self
    }

    /// Replace the value serializers (for custom types).
    pub fn types(mut self, types: TypeRegistry) -> Self {
        self.types = types;
        self
    }

    /// Replace all settings at once.
    pub fn settings(mut self, settings: ServerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Default: 30 seconds
    pub fn evaluation_timeout(mut self, timeout: Duration) -> Self {
        self.settings.evaluation_timeout = timeout;
        self
    }

    /// Default: 10 minutes
    pub fn session_lifetime_timeout(mut self, timeout: Duration) -> Self {
        self.settings.session_lifetime_timeout = timeout;
        self
    }

    pub fn max_queued_tasks_per_session(mut self, limit: usize) -> Self {
        self.settings.max_queued_tasks_per_session = limit;
        self
    }

    pub fn max_concurrent_sessions(mut self, limit: usize) -> Self {
        self.settings.max_concurrent_sessions = limit;
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.settings.content_type = content_type.into();
        self
    }

    pub fn max_frame_size(mut self, limit: u32) -> Self {
        self.settings.max_frame_size = limit;
        self
    }

    pub fn max_value_depth(mut self, limit: usize) -> Self {
        self.settings.max_value_depth = limit;
        self
    }

    pub fn allocator(mut self, kind: AllocatorKind) -> Self {
        self.settings.allocator = kind;
        self
    }

    /// Set the maximum pending frames for backpressure.
    ///
    /// Default: 1024
    pub fn max_pending_frames(mut self, limit: usize) -> Self {
        self.settings.writer.max_pending_frames = limit;
        self
    }

    /// Set the backpressure timeout.
    ///
    /// Default: 5 seconds
    pub fn backpressure_timeout(mut self, timeout: Duration) -> Self {
        self.settings.writer.backpressure_timeout = timeout;
        self
    }

    /// Build the server.
    ///
    /// Fails when the content type does not fit the one-byte length prefix.
    pub fn build(self) -> Result<Server> {
        let ct_len = self.settings.content_type.len();
        if ct_len == 0 || ct_len > MAX_CONTENT_TYPE_LEN {
            return Err(WireError::Protocol(format!(
                "content type length {ct_len} is outside 1..={MAX_CONTENT_TYPE_LEN}"
            )));
        }

        let serializer = MessageSerializer::new(
            Arc::new(self.types),
            BufferAllocator::new(self.settings.allocator),
        )
        .with_max_depth(self.settings.max_value_depth);
        let executor = TaskExecutor::new(Arc::new(self.ops), self.settings.evaluation_timeout);
        let sessions = SessionManager::new(executor, self.settings.session_limits());

        Ok(Server {
            settings: Arc::new(self.settings),
            serializer: Arc::new(serializer),
            sessions: Arc::new(sessions),
        })
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A configured server. Cheap to clone; clones share sessions.
#[derive(Clone)]
pub struct Server {
    settings: Arc<ServerSettings>,
    serializer: Arc<MessageSerializer>,
    sessions: Arc<SessionManager>,
}

impl Server {
    /// Create a new server builder.
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn serializer(&self) -> &Arc<MessageSerializer> {
        &self.serializer
    }

    /// Accept TCP connections until the listener fails.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        info!(addr = ?listener.local_addr().ok(), "Server listening");
        loop {
            let (stream, peer) = listener.accept().await?;
            stream.set_nodelay(true)?;
            let server = self.clone();
            tokio::spawn(async move {
                debug!(%peer, "Connection accepted");
                if let Err(e) = server.serve_connection(stream).await {
                    warn!(%peer, error = %e, "Connection ended with error");
                }
            });
        }
    }

    /// Run the read loop for one connection until EOF or a framing error.
    pub async fn serve_connection<S>(&self, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (mut reader, write_half) = tokio::io::split(stream);
        let (channel, _writer_task) = Channel::spawn(
            write_half,
            self.serializer.clone(),
            self.settings.writer.clone(),
        );

        let result = self.read_loop(&mut reader, &channel).await;

        self.sessions.close_bound_to(&channel);
        channel.close().await?;
        debug!(channel_id = channel.id(), "Connection closed");
        result
    }

    /// Main read loop - reads frames and routes requests.
    async fn read_loop<R>(&self, reader: &mut R, channel: &Channel) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        let mut frames = FrameBuffer::with_max_frame_size(self.settings.max_frame_size);
        let mut handshake = HandshakeDecoder::new();
        let mut buf = vec![0u8; READ_BUFFER_SIZE];

        loop {
            let n = match reader.read(&mut buf).await? {
                0 => return Ok(()),
                n => n,
            };

            let complete = match frames.push(&buf[..n]) {
                Ok(complete) => complete,
                Err(e) => {
                    warn!(channel_id = channel.id(), error = %e, "Unreadable frame, closing");
                    return Err(e);
                }
            };

            for frame in complete {
                let body = match self.open_envelope(&mut handshake, frame) {
                    Ok(body) => body,
                    Err(e) => {
                        self.reply_invalid(channel, &e).await;
                        return Err(e);
                    }
                };
                self.handle_body(channel, &body).await?;
            }
        }
    }

    fn open_envelope(&self, handshake: &mut HandshakeDecoder, frame: Bytes) -> Result<Bytes> {
        let envelope = handshake.decode(frame)?;
        if let Some(content_type) = &envelope.content_type {
            if *content_type != self.settings.content_type {
                return Err(WireError::Protocol(format!(
                    "unsupported content type '{content_type}'"
                )));
            }
            debug!(content_type = %content_type, "Handshake accepted");
        }
        Ok(envelope.body)
    }

    /// Decode one message body and route it. Only transport errors escape.
    async fn handle_body(&self, channel: &Channel, body: &[u8]) -> Result<()> {
        let request = match self.serializer.deserialize_request(body) {
            Ok(request) => request,
            Err(e) => {
                warn!(channel_id = channel.id(), error = %e, "Request could not be decoded");
                self.reply_invalid(channel, &e).await;
                return Ok(());
            }
        };
        self.route(channel, request).await
    }

    async fn route(&self, channel: &Channel, request: RequestMessage) -> Result<()> {
        let request_id = request.request_id;
        let session_id = request.session_id();

        if request.op == ops::CLOSE {
            if let Some(id) = &session_id {
                let response = if self.sessions.close_session(id) {
                    ResponseMessage::new(Some(request_id), ResponseStatusCode::NoContent)
                } else {
                    ResponseMessage::new(Some(request_id), ResponseStatusCode::ServerError)
                        .with_message(format!("there is no session named {id}"))
                };
                return self.reply(channel, response).await;
            }
        }

        let session = match &session_id {
            Some(id) => match self.sessions.get_or_create(id, channel) {
                Ok(session) => session,
                Err(e) => return self.refuse(channel, request_id, &e).await,
            },
            None => self.sessions.single(channel),
        };

        self.submit(channel, &session, request).await
    }

    /// Submit `request` to `session`, answering 429 if it is refused.
    pub async fn submit(
        &self,
        channel: &Channel,
        session: &Session,
        request: RequestMessage,
    ) -> Result<()> {
        let request_id = request.request_id;
        match session.submit_task(SessionTask::new(request, channel.clone())) {
            Ok(true) => Ok(()),
            Ok(false) => {
                let busy = WireError::Rejected(format!(
                    "session {} is not accepting tasks",
                    session.session_id()
                ));
                self.refuse(channel, request_id, &busy).await
            }
            Err(e) => self.refuse(channel, request_id, &e).await,
        }
    }

    async fn refuse(&self, channel: &Channel, request_id: Uuid, error: &WireError) -> Result<()> {
        debug!(%request_id, error = %error, "Task refused");
        let response =
            ResponseMessage::new(Some(request_id), error.status_code()).with_message(error.to_string());
        self.reply(channel, response).await
    }

    /// Answer input that could not be turned into a request.
    async fn reply_invalid(&self, channel: &Channel, error: &WireError) {
        let invalid = RequestMessage::invalid();
        let response = ResponseMessage::new(
            Some(invalid.request_id),
            ResponseStatusCode::SerializationError,
        )
        .with_message(format!("Error during deserialization: {error}"));
        if let Err(e) = channel.send_response(&response).await {
            debug!(error = %e, "Invalid-request reply not delivered");
        }
    }

    async fn reply(&self, channel: &Channel, response: ResponseMessage) -> Result<()> {
        match channel.send_response(&response).await {
            Ok(()) => Ok(()),
            Err(WireError::BackpressureTimeout) => {
                warn!(request_id = ?response.request_id, "Reply dropped under backpressure");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_configuration() {
        let builder = Server::builder()
            .evaluation_timeout(Duration::from_millis(100))
            .session_lifetime_timeout(Duration::ZERO)
            .max_queued_tasks_per_session(8)
            .max_concurrent_sessions(2)
            .content_type("graph-bin")
            .max_pending_frames(16)
            .backpressure_timeout(Duration::from_secs(1));

        assert_eq!(builder.settings.evaluation_timeout, Duration::from_millis(100));
        assert_eq!(builder.settings.max_queued_tasks_per_session, 8);
        assert_eq!(builder.settings.content_type, "graph-bin");
        assert_eq!(builder.settings.writer.max_pending_frames, 16);
    }

    #[test]
    fn test_builder_registers_ops() {
        let builder = Server::builder()
            .handle(ops::EVAL, |_request, _ctx| async { Ok(()) })
            .handle_for("session", ops::BYTECODE, |_request, _ctx| async { Ok(()) });

        assert!(builder.ops.contains("", ops::EVAL));
        assert!(builder.ops.contains("session", ops::BYTECODE));
    }

    #[test]
    fn test_build_rejects_bad_content_type() {
        assert!(Server::builder().content_type("").build().is_err());
        assert!(Server::builder().content_type("x".repeat(256)).build().is_err());
    }

    #[test]
    fn test_settings_serde() {
        let settings: ServerSettings = serde_json::from_str(
            r#"{"evaluation_timeout": 250, "allocator": "unpooled_heap", "writer": {"channel_capacity": 4}}"#,
        )
        .unwrap();

        assert_eq!(settings.evaluation_timeout, Duration::from_millis(250));
        assert_eq!(settings.allocator, AllocatorKind::UnpooledHeap);
        assert_eq!(settings.writer.channel_capacity, 4);
        assert_eq!(settings.content_type, DEFAULT_CONTENT_TYPE);

        let json = serde_json::to_value(ServerSettings::default()).unwrap();
        assert_eq!(json["evaluation_timeout"], 30_000);
    }
}
