//! Session boundary between the framing layer and task execution.
//!
//! A decoded request becomes a [`SessionTask`] and is submitted to a
//! [`Session`]:
//!
//! - [`SingleTaskSession`] - one task, then done (requests without a
//!   `session` argument)
//! - [`MultiTaskSession`] - a queue of tasks run in order under one session id
//!
//! Two timeouts apply. The request timeout aborts the in-flight task with
//! 498 and leaves the session usable. The session timeout answers the
//! in-flight and all queued tasks with 499, stops accepting, and closes the
//! channel once those replies are flushed.

mod executor;
mod manager;
mod multi;
mod single;
mod state;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::AbortHandle;

use crate::channel::Channel;
use crate::error::Result;
use crate::handler::TaskContext;
use crate::protocol::RequestMessage;

pub use executor::TaskExecutor;
pub use manager::{SessionLimits, SessionManager};
pub use multi::MultiTaskSession;
pub use single::SingleTaskSession;

/// A decoded request plus the sink its responses go to.
#[derive(Debug, Clone)]
pub struct SessionTask {
    pub request: RequestMessage,
    pub context: TaskContext,
}

impl SessionTask {
    /// Task replying on `channel`.
    pub fn new(request: RequestMessage, channel: Channel) -> Self {
        let context = TaskContext::with_channel(request.request_id, channel);
        Self { request, context }
    }
}

/// A session of either kind.
#[derive(Clone)]
pub enum Session {
    Single(Arc<SingleTaskSession>),
    Multi(Arc<MultiTaskSession>),
}

impl Session {
    pub fn session_id(&self) -> &str {
        match self {
            Session::Single(s) => s.state().id(),
            Session::Multi(s) => s.state().id(),
        }
    }

    /// Submit a task.
    ///
    /// `Ok(true)` when accepted, `Ok(false)` when the session is not
    /// accepting tasks, and [`WireError::Rejected`](crate::error::WireError::Rejected)
    /// when its queue is full. Callers answer both refusals with 429.
    pub fn submit_task(&self, task: SessionTask) -> Result<bool> {
        match self {
            Session::Single(s) => s.submit_task(task),
            Session::Multi(s) => s.submit_task(task),
        }
    }

    /// Record the future that cancels this session (its lifetime timer).
    ///
    /// May be set once; a second call fails with `HookAlreadySet`.
    pub fn set_session_cancel_future(&self, handle: AbortHandle) -> Result<()> {
        self.state().set_cancel_hook(handle)
    }

    /// Record the future running this session's work.
    ///
    /// Sessions record their own worker when they start it, so this fails
    /// with `HookAlreadySet` once work is underway.
    pub fn set_session_future(&self, handle: AbortHandle) -> Result<()> {
        self.state().set_session_hook(handle)
    }

    /// Cancel on timeout. Repeated calls have no further effect.
    pub async fn trigger_timeout(&self, elapsed: Duration, caused_by_session: bool) {
        match self {
            Session::Single(s) => s.trigger_timeout(elapsed, caused_by_session).await,
            Session::Multi(s) => s.trigger_timeout(elapsed, caused_by_session).await,
        }
    }

    pub fn is_bound_to(&self, channel: &Channel) -> bool {
        self.state().channel().same_channel(channel)
    }

    pub fn is_accepting_tasks(&self) -> bool {
        self.state().is_accepting()
    }

    /// Whether the session's work is over.
    pub fn is_terminated(&self) -> bool {
        self.state().is_terminated()
    }

    /// Tear down without replying, aborting the in-flight task.
    pub(crate) fn kill(&self) {
        match self {
            Session::Single(s) => s.kill(),
            Session::Multi(s) => s.kill(),
        }
    }

    fn state(&self) -> &state::SessionState {
        match self {
            Session::Single(s) => s.state(),
            Session::Multi(s) => s.state(),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Session::Single(_) => "single",
            Session::Multi(_) => "multi",
        };
        f.debug_struct("Session")
            .field("id", &self.session_id())
            .field("kind", &kind)
            .field("accepting", &self.is_accepting_tasks())
            .finish()
    }
}

/// Lock ignoring poisoning; the guarded data stays consistent across panics.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
