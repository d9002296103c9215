//! State shared by every session variant.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use tokio::task::AbortHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use super::lock;
use crate::channel::Channel;
use crate::error::{Result, WireError};
use crate::handler::TaskContext;
use crate::protocol::ResponseMessage;

/// The task currently executing in a session.
struct InFlight {
    context: TaskContext,
    abort: AbortHandle,
}

#[derive(Default)]
struct Slots {
    in_flight: Option<InFlight>,
    /// Set once the session lifetime expired.
    session_timeout: Option<Duration>,
    /// Set once the session was torn down with its channel.
    killed: bool,
}

/// Why a session refused to start a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Refusal {
    /// The session lifetime expired after this long.
    TimedOut(Duration),
    /// The session was killed; nobody is left to answer.
    Killed,
}

pub(crate) struct SessionState {
    id: String,
    channel: Channel,
    accepting: AtomicBool,
    terminated: AtomicBool,
    slots: Mutex<Slots>,
    cancel_hook: OnceLock<AbortHandle>,
    session_hook: OnceLock<AbortHandle>,
}

impl SessionState {
    pub(crate) fn new(id: String, channel: Channel) -> Self {
        Self {
            id,
            channel,
            accepting: AtomicBool::new(true),
            terminated: AtomicBool::new(false),
            slots: Mutex::new(Slots::default()),
            cancel_hook: OnceLock::new(),
            session_hook: OnceLock::new(),
        }
    }

    #[inline]
    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    #[inline]
    pub(crate) fn channel(&self) -> &Channel {
        &self.channel
    }

    #[inline]
    pub(crate) fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    /// Whether the session finished or was killed.
    #[inline]
    pub(crate) fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    pub(crate) fn stop_accepting(&self) {
        self.accepting.store(false, Ordering::Release);
    }

    /// Atomically take the only slot of a single-shot session.
    pub(crate) fn claim(&self) -> bool {
        self.accepting.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn set_cancel_hook(&self, handle: AbortHandle) -> Result<()> {
        self.cancel_hook
            .set(handle)
            .map_err(|_| WireError::HookAlreadySet("session_cancel_future"))
    }

    pub(crate) fn set_session_hook(&self, handle: AbortHandle) -> Result<()> {
        self.session_hook
            .set(handle)
            .map_err(|_| WireError::HookAlreadySet("session_future"))
    }

    pub(crate) fn abort_cancel_hook(&self) {
        if let Some(handle) = self.cancel_hook.get() {
            handle.abort();
        }
    }

    pub(crate) fn abort_session_hook(&self) {
        if let Some(handle) = self.session_hook.get() {
            handle.abort();
        }
    }

    /// Record the task now executing.
    ///
    /// Fails when the session already timed out or was killed; the caller
    /// must then abort the task, answering it only on timeout.
    pub(crate) fn begin(
        &self,
        context: TaskContext,
        abort: AbortHandle,
    ) -> std::result::Result<(), Refusal> {
        let mut slots = lock(&self.slots);
        if slots.killed {
            return Err(Refusal::Killed);
        }
        if let Some(elapsed) = slots.session_timeout {
            return Err(Refusal::TimedOut(elapsed));
        }
        slots.in_flight = Some(InFlight { context, abort });
        Ok(())
    }

    /// Forget the in-flight task if it is still `request_id`.
    pub(crate) fn end(&self, request_id: Uuid) {
        let mut slots = lock(&self.slots);
        if slots
            .in_flight
            .as_ref()
            .is_some_and(|f| f.context.request_id() == request_id)
        {
            slots.in_flight = None;
        }
    }

    /// Mark the session as timed out. Returns `false` if it already was.
    pub(crate) fn mark_session_timeout(&self, elapsed: Duration) -> bool {
        let mut slots = lock(&self.slots);
        if slots.session_timeout.is_some() {
            return false;
        }
        slots.session_timeout = Some(elapsed);
        self.stop_accepting();
        true
    }

    /// Abort the in-flight task and send its timeout response.
    ///
    /// Returns whether a task was interrupted.
    pub(crate) async fn interrupt_in_flight(&self, elapsed: Duration, caused_by_session: bool) -> bool {
        let taken = lock(&self.slots).in_flight.take();
        let Some(in_flight) = taken else {
            return false;
        };
        in_flight.abort.abort();
        warn!(
            session_id = %self.id,
            request_id = %in_flight.context.request_id(),
            elapsed_ms = elapsed.as_millis() as u64,
            caused_by_session,
            "Interrupting task on timeout"
        );
        self.reply_timeout(&in_flight.context, elapsed, caused_by_session)
            .await;
        true
    }

    /// Send the timeout response for `context` unless it already finished.
    pub(crate) async fn reply_timeout(
        &self,
        context: &TaskContext,
        elapsed: Duration,
        caused_by_session: bool,
    ) {
        let response = timeout_response(context.request_id(), elapsed, caused_by_session);
        if let Err(e) = context.try_finish(response).await {
            debug!(session_id = %self.id, error = %e, "Timeout response not delivered");
        }
    }

    /// Close the bound channel once queued responses are flushed.
    pub(crate) async fn close_channel(&self) {
        if let Err(e) = self.channel.close().await {
            debug!(session_id = %self.id, error = %e, "Channel close failed");
        }
    }

    /// Session work is over: stop accepting and disarm the lifetime timer.
    pub(crate) fn finish(&self) {
        self.stop_accepting();
        self.terminated.store(true, Ordering::Release);
        self.abort_cancel_hook();
        debug!(session_id = %self.id, "Session finished");
    }

    /// Tear down without replying; the channel is already gone.
    pub(crate) fn kill(&self) {
        self.stop_accepting();
        self.terminated.store(true, Ordering::Release);
        let taken = {
            let mut slots = lock(&self.slots);
            slots.killed = true;
            slots.in_flight.take()
        };
        if let Some(in_flight) = taken {
            debug!(
                session_id = %self.id,
                request_id = %in_flight.context.request_id(),
                "Aborting task of killed session"
            );
            in_flight.abort.abort();
        }
        self.abort_session_hook();
        self.abort_cancel_hook();
    }
}

pub(crate) fn timeout_response(
    request_id: Uuid,
    elapsed: Duration,
    caused_by_session: bool,
) -> ResponseMessage {
    let error = WireError::Timeout {
        elapsed_ms: elapsed.as_millis() as u64,
        caused_by_session,
    };
    ResponseMessage::new(Some(request_id), error.status_code()).with_message(error.to_string())
}
