//! Session that runs exactly one task.
//!
//! Requests without a `session` argument each get a fresh single-task
//! session. It accepts its first task, refuses every later one, and ends
//! when that task reaches its terminal response.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};
use uuid::Uuid;

use super::executor::TaskExecutor;
use super::state::SessionState;
use super::SessionTask;
use crate::channel::Channel;
use crate::error::Result;

pub struct SingleTaskSession {
    state: SessionState,
    executor: TaskExecutor,
}

impl SingleTaskSession {
    /// Create a session with a random id, bound to `channel`.
    pub fn new(channel: Channel, executor: TaskExecutor) -> Arc<Self> {
        Self::with_id(Uuid::new_v4().to_string(), channel, executor)
    }

    pub fn with_id(id: String, channel: Channel, executor: TaskExecutor) -> Arc<Self> {
        Arc::new(Self {
            state: SessionState::new(id, channel),
            executor,
        })
    }

    pub(crate) fn state(&self) -> &SessionState {
        &self.state
    }

    /// Start `task` unless a task was already accepted.
    pub fn submit_task(self: &Arc<Self>, task: SessionTask) -> Result<bool> {
        if !self.state.claim() {
            debug!(
                session_id = %self.state.id(),
                request_id = %task.request.request_id,
                "Single-task session busy"
            );
            return Ok(false);
        }

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            this.executor.run(&this.state, task).await;
            this.state.finish();
        });
        if let Err(e) = self.state.set_session_hook(handle.abort_handle()) {
            warn!(session_id = %self.state.id(), error = %e, "Session future not recorded");
        }
        Ok(true)
    }

    /// Abort the task without replying; its channel is gone.
    pub(crate) fn kill(&self) {
        debug!(session_id = %self.state.id(), "Killing single-task session");
        self.state.kill();
    }

    /// Interrupt the task. A session-caused timeout also closes the channel.
    pub async fn trigger_timeout(&self, elapsed: Duration, caused_by_session: bool) {
        if !caused_by_session {
            self.state.interrupt_in_flight(elapsed, false).await;
            return;
        }
        if !self.state.mark_session_timeout(elapsed) {
            return;
        }
        self.state.interrupt_in_flight(elapsed, true).await;
        self.state.close_channel().await;
        self.state.abort_cancel_hook();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::test_support::channel_pair;
    use crate::handler::{OpRegistry, TaskContext};
    use crate::protocol::{ops, RequestMessage, ResponseStatusCode};

    fn task(channel: &Channel) -> SessionTask {
        SessionTask::new(RequestMessage::build(ops::EVAL).create(), channel.clone())
    }

    fn executor(registry: OpRegistry) -> TaskExecutor {
        TaskExecutor::new(Arc::new(registry), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_accepts_exactly_one_task() {
        let (channel, mut reader) = channel_pair();
        let mut registry = OpRegistry::new();
        registry.register(ops::EVAL, |_request, ctx| async move { ctx.complete(1i32).await });
        let session = SingleTaskSession::new(channel.clone(), executor(registry));

        let first = task(&channel);
        let first_id = first.request.request_id;
        assert!(session.submit_task(first).unwrap());
        assert!(!session.submit_task(task(&channel)).unwrap());
        assert!(!session.state().is_accepting());

        let response = reader.next().await.unwrap();
        assert_eq!(response.request_id, Some(first_id));
        assert_eq!(response.code(), ResponseStatusCode::Success);
    }

    #[tokio::test]
    async fn test_missing_terminal_frame_becomes_no_content() {
        let (channel, mut reader) = channel_pair();
        let mut registry = OpRegistry::new();
        registry.register(ops::EVAL, |_request, ctx: TaskContext| async move {
            ctx.write_partial(1i32).await
        });
        let session = SingleTaskSession::new(channel.clone(), executor(registry));

        session.submit_task(task(&channel)).unwrap();

        assert_eq!(
            reader.next().await.unwrap().code(),
            ResponseStatusCode::PartialContent
        );
        assert_eq!(reader.next().await.unwrap().code(), ResponseStatusCode::NoContent);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_timeout_replies_and_closes() {
        let (channel, mut reader) = channel_pair();
        let mut registry = OpRegistry::new();
        registry.register(ops::EVAL, |_request, _ctx| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        });
        let session = SingleTaskSession::new(channel.clone(), executor(registry));
        session.submit_task(task(&channel)).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        session.trigger_timeout(Duration::from_millis(10), true).await;
        session.trigger_timeout(Duration::from_millis(10), true).await;

        assert_eq!(
            reader.next().await.unwrap().code(),
            ResponseStatusCode::SessionTimeout
        );
        assert!(reader.next().await.is_none());
    }
}
