//! Session that runs a queue of tasks in submission order.
//!
//! ```text
//! submit_task ─► queue (bounded) ─► worker ─► TaskExecutor ─► Channel
//!                                     ▲
//!                  trigger_timeout ───┘ (interrupt, drain with 499, close)
//! ```
//!
//! One worker per session executes tasks sequentially, so tasks sharing a
//! session observe each other's effects in order.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{debug, info, warn};

use super::executor::TaskExecutor;
use super::lock;
use super::state::SessionState;
use super::SessionTask;
use crate::channel::Channel;
use crate::error::{Result, WireError};

pub struct MultiTaskSession {
    state: SessionState,
    executor: TaskExecutor,
    queue: Mutex<VecDeque<SessionTask>>,
    max_queued: usize,
    wakeup: Notify,
}

impl MultiTaskSession {
    /// Create the session and start its worker.
    pub fn spawn(
        id: String,
        channel: Channel,
        executor: TaskExecutor,
        max_queued: usize,
    ) -> Arc<Self> {
        let session = Arc::new(Self {
            state: SessionState::new(id, channel),
            executor,
            queue: Mutex::new(VecDeque::new()),
            max_queued: max_queued.max(1),
            wakeup: Notify::new(),
        });

        let worker = Arc::clone(&session);
        let handle = tokio::spawn(async move { worker.run_worker().await });
        if let Err(e) = session.state.set_session_hook(handle.abort_handle()) {
            warn!(session_id = %session.state.id(), error = %e, "Session future not recorded");
        }
        info!(session_id = %session.state.id(), "Session opened");
        session
    }

    pub(crate) fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn queued(&self) -> usize {
        lock(&self.queue).len()
    }

    /// Queue `task`.
    ///
    /// Returns `Ok(false)` once the session stopped accepting tasks and
    /// [`WireError::Rejected`] when the queue is full.
    pub fn submit_task(&self, task: SessionTask) -> Result<bool> {
        if !self.state.is_accepting() {
            return Ok(false);
        }
        {
            let mut queue = lock(&self.queue);
            if queue.len() >= self.max_queued {
                debug!(
                    session_id = %self.state.id(),
                    request_id = %task.request.request_id,
                    queued = queue.len(),
                    "Session queue full"
                );
                return Err(WireError::Rejected(format!(
                    "session {} already has {} queued tasks",
                    self.state.id(),
                    queue.len()
                )));
            }
            queue.push_back(task);
        }
        self.wakeup.notify_one();
        Ok(true)
    }

    /// Interrupt the in-flight task.
    ///
    /// A session-caused timeout also answers every queued task with 499,
    /// stops accepting, and closes the channel after those replies.
    pub async fn trigger_timeout(&self, elapsed: Duration, caused_by_session: bool) {
        if !caused_by_session {
            self.state.interrupt_in_flight(elapsed, false).await;
            return;
        }
        if !self.state.mark_session_timeout(elapsed) {
            return;
        }
        info!(
            session_id = %self.state.id(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Session timed out"
        );

        self.state.interrupt_in_flight(elapsed, true).await;
        let drained: Vec<SessionTask> = lock(&self.queue).drain(..).collect();
        for task in &drained {
            self.state.reply_timeout(&task.context, elapsed, true).await;
        }
        self.wakeup.notify_one();
        self.state.close_channel().await;
        self.state.abort_cancel_hook();
    }

    /// Stop accepting; queued tasks still run.
    pub fn close(&self) {
        debug!(session_id = %self.state.id(), "Session closing");
        self.state.stop_accepting();
        self.wakeup.notify_one();
    }

    /// Drop everything without replying. Used when the channel is gone.
    pub(crate) fn kill(&self) {
        lock(&self.queue).clear();
        self.state.kill();
    }

    async fn run_worker(&self) {
        loop {
            let next = lock(&self.queue).pop_front();
            match next {
                Some(task) => self.executor.run(&self.state, task).await,
                None if !self.state.is_accepting() => break,
                None => self.wakeup.notified().await,
            }
        }
        self.state.finish();
        info!(session_id = %self.state.id(), "Session closed");
    }
}
