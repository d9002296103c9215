//! Task context for op handlers.
//!
//! Provides methods for answering a request:
//! - `write_partial` - stream a batch of results (206)
//! - `complete` - final result (200, or 204 for null)
//! - `fail` - final error with a status code of choice
//! - `fail_with_error` - final 500 carrying the error chain as attributes
//!
//! Every request gets exactly one terminal (non-206) response. Once one has
//! been sent, further writes are refused.
//!
//! # Example
//!
//! ```ignore
//! async fn count(request: RequestMessage, ctx: TaskContext) -> Result<()> {
//!     for i in 0..3i32 {
//!         ctx.write_partial(i).await?;
//!     }
//!     ctx.complete(Value::Null).await
//! }
//! ```

use std::error::Error as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use uuid::Uuid;

use crate::channel::Channel;
use crate::error::{Result, WireError};
use crate::protocol::{attributes, ResponseMessage, ResponseStatusCode};
use crate::structure::Value;

/// Context passed to op handlers.
///
/// `TaskContext` is `Clone`; all clones share the terminal-response state.
#[derive(Clone)]
pub struct TaskContext {
    inner: Arc<TaskInner>,
}

struct TaskInner {
    request_id: Uuid,
    /// Reply sink. `None` in tests that only exercise handler logic.
    channel: Option<Channel>,
    finished: AtomicBool,
}

impl TaskContext {
    /// Create a context without a channel (for testing).
    pub fn new(request_id: Uuid) -> Self {
        Self::build(request_id, None)
    }

    /// Create a context replying on `channel`.
    pub fn with_channel(request_id: Uuid, channel: Channel) -> Self {
        Self::build(request_id, Some(channel))
    }

    fn build(request_id: Uuid, channel: Option<Channel>) -> Self {
        Self {
            inner: Arc::new(TaskInner {
                request_id,
                channel,
                finished: AtomicBool::new(false),
            }),
        }
    }

    #[inline]
    pub fn request_id(&self) -> Uuid {
        self.inner.request_id
    }

    pub fn channel(&self) -> Option<&Channel> {
        self.inner.channel.as_ref()
    }

    /// Whether a terminal response has been sent.
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.inner.finished.load(Ordering::Acquire)
    }

    /// Stream one batch of results.
    pub async fn write_partial(&self, data: impl Into<Value>) -> Result<()> {
        if self.is_finished() {
            return Err(self.already_finished());
        }
        let response = self
            .response(ResponseStatusCode::PartialContent)
            .with_data(data);
        self.send(&response).await
    }

    /// Send the final result: 200 with `data`, or 204 when `data` is null.
    pub async fn complete(&self, data: impl Into<Value>) -> Result<()> {
        let data = data.into();
        let response = if data.is_null() {
            self.response(ResponseStatusCode::NoContent)
        } else {
            self.response(ResponseStatusCode::Success).with_data(data)
        };
        self.finish_or_refuse(response).await
    }

    /// Send a terminal error response.
    pub async fn fail(&self, code: ResponseStatusCode, message: impl Into<String>) -> Result<()> {
        let response = self.response(code).with_message(message);
        self.finish_or_refuse(response).await
    }

    /// Report `error` as a terminal response.
    ///
    /// The status comes from [`WireError::status_code`]. The status
    /// attributes carry the error chain (`exceptions`) and the formatted
    /// error (`stackTrace`).
    pub async fn fail_with_error(&self, error: &WireError) -> Result<()> {
        self.finish_or_refuse(self.error_response(error)).await
    }

    /// Build the terminal response reporting `error`.
    pub fn error_response(&self, error: &WireError) -> ResponseMessage {
        let mut chain = vec![Value::from(error.to_string())];
        let mut source = error.source();
        while let Some(cause) = source {
            chain.push(Value::from(cause.to_string()));
            source = cause.source();
        }
        self.response(error.status_code())
            .with_message(error.to_string())
            .with_attribute(attributes::EXCEPTIONS, Value::List(chain))
            .with_attribute(attributes::STACK_TRACE, format!("{error:?}"))
    }

    /// Send `response` as the terminal frame unless one was already sent.
    ///
    /// Returns whether this call sent it.
    pub(crate) async fn try_finish(&self, response: ResponseMessage) -> Result<bool> {
        if self.inner.finished.swap(true, Ordering::AcqRel) {
            return Ok(false);
        }
        self.send(&response).await?;
        Ok(true)
    }

    async fn finish_or_refuse(&self, response: ResponseMessage) -> Result<()> {
        if self.try_finish(response).await? {
            Ok(())
        } else {
            Err(self.already_finished())
        }
    }

    fn response(&self, code: ResponseStatusCode) -> ResponseMessage {
        ResponseMessage::new(Some(self.inner.request_id), code)
    }

    fn already_finished(&self) -> WireError {
        WireError::Protocol(format!(
            "request {} already has a terminal response",
            self.inner.request_id
        ))
    }

    async fn send(&self, response: &ResponseMessage) -> Result<()> {
        match &self.inner.channel {
            Some(channel) => channel.send_response(response).await,
            // No channel configured (testing mode)
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskContext")
            .field("request_id", &self.inner.request_id)
            .field("finished", &self.is_finished())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferError;
    use crate::channel::test_support::channel_pair;

    #[tokio::test]
    async fn test_context_without_channel() {
        let ctx = TaskContext::new(Uuid::from_u128(42));
        assert_eq!(ctx.request_id(), Uuid::from_u128(42));

        assert!(ctx.write_partial(1i32).await.is_ok());
        assert!(!ctx.is_finished());
        assert!(ctx.complete(2i32).await.is_ok());
        assert!(ctx.is_finished());
    }

    #[tokio::test]
    async fn test_terminal_response_only_once() {
        let ctx = TaskContext::new(Uuid::from_u128(1));
        let clone = ctx.clone();

        ctx.complete(Value::Null).await.unwrap();
        assert!(clone.is_finished());
        assert!(matches!(clone.complete(1i32).await, Err(WireError::Protocol(_))));
        assert!(ctx.write_partial(1i32).await.is_err());
        assert!(!ctx
            .try_finish(ctx.response(ResponseStatusCode::ServerError))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_streaming_then_complete() {
        let (channel, mut reader) = channel_pair();
        let id = Uuid::from_u128(9);
        let ctx = TaskContext::with_channel(id, channel);

        ctx.write_partial(vec![1i32, 2]).await.unwrap();
        ctx.write_partial(vec![3i32]).await.unwrap();
        ctx.complete(Value::Null).await.unwrap();

        let first = reader.next().await.unwrap();
        assert_eq!(first.request_id, Some(id));
        assert_eq!(first.code(), ResponseStatusCode::PartialContent);
        assert_eq!(first.result.data, Value::from(vec![1i32, 2]));
        assert_eq!(
            reader.next().await.unwrap().code(),
            ResponseStatusCode::PartialContent
        );
        assert_eq!(reader.next().await.unwrap().code(), ResponseStatusCode::NoContent);
    }

    #[tokio::test]
    async fn test_complete_with_data_is_success() {
        let (channel, mut reader) = channel_pair();
        let ctx = TaskContext::with_channel(Uuid::from_u128(3), channel);

        ctx.complete("done").await.unwrap();

        let response = reader.next().await.unwrap();
        assert_eq!(response.code(), ResponseStatusCode::Success);
        assert_eq!(response.result.data, Value::from("done"));
    }

    #[tokio::test]
    async fn test_fail_with_error_attributes() {
        let (channel, mut reader) = channel_pair();
        let ctx = TaskContext::with_channel(Uuid::from_u128(4), channel);

        let error = WireError::Buffer(BufferError::Released);
        ctx.fail_with_error(&error).await.unwrap();

        let response = reader.next().await.unwrap();
        assert_eq!(response.code(), ResponseStatusCode::SerializationError);
        let Value::List(chain) = &response.status.attributes[attributes::EXCEPTIONS] else {
            panic!("exceptions should be a list");
        };
        assert_eq!(chain.len(), 2);
        assert!(response
            .status
            .attributes
            .contains_key(attributes::STACK_TRACE));
    }

    #[tokio::test]
    async fn test_execution_error_is_server_error() {
        let ctx = TaskContext::new(Uuid::from_u128(5));
        let response = ctx.error_response(&WireError::Execution("boom".into()));

        assert_eq!(response.code(), ResponseStatusCode::ServerError);
        assert_eq!(
            response.status.message.as_deref(),
            Some("execution failed: boom")
        );
    }
}
