//! Registry of live multi-task sessions.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{lock, MultiTaskSession, Session, SingleTaskSession, TaskExecutor};
use crate::channel::Channel;
use crate::error::{Result, WireError};

/// Limits applied to sessions the manager creates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionLimits {
    /// Maximum live multi-task sessions.
    pub max_concurrent_sessions: usize,
    /// Maximum tasks waiting in one session's queue.
    pub max_queued_tasks_per_session: usize,
    /// Session lifetime; zero disables the timer.
    #[serde(with = "crate::writer::duration_millis")]
    pub session_lifetime_timeout: Duration,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            max_concurrent_sessions: 1024,
            max_queued_tasks_per_session: 256,
            session_lifetime_timeout: Duration::from_secs(600),
        }
    }
}

/// Owns multi-task sessions keyed by session id, and tracks the
/// single-task sessions still running so they die with their channel.
pub struct SessionManager {
    sessions: Mutex<HashMap<String, Session>>,
    singles: Mutex<HashMap<String, Session>>,
    executor: TaskExecutor,
    limits: SessionLimits,
}

impl SessionManager {
    pub fn new(executor: TaskExecutor, limits: SessionLimits) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            singles: Mutex::new(HashMap::new()),
            executor,
            limits,
        }
    }

    pub fn executor(&self) -> &TaskExecutor {
        &self.executor
    }

    pub fn limits(&self) -> &SessionLimits {
        &self.limits
    }

    /// Fresh single-task session for a sessionless request.
    ///
    /// The session is tracked until it terminates.
    pub fn single(&self, channel: &Channel) -> Session {
        let session = Session::Single(SingleTaskSession::new(
            channel.clone(),
            self.executor.clone(),
        ));
        let mut singles = lock(&self.singles);
        singles.retain(|_, s| !s.is_terminated());
        singles.insert(session.session_id().to_string(), session.clone());
        session
    }

    /// Number of single-task sessions not yet terminated.
    pub fn running_singles(&self) -> usize {
        let mut singles = lock(&self.singles);
        singles.retain(|_, s| !s.is_terminated());
        singles.len()
    }

    /// Look up session `id`, creating it bound to `channel` if absent.
    ///
    /// # Errors
    ///
    /// [`WireError::Rejected`] when the session is bound to another channel
    /// or the session limit is reached.
    pub fn get_or_create(&self, id: &str, channel: &Channel) -> Result<Session> {
        let mut sessions = lock(&self.sessions);
        sessions.retain(|_, s| s.is_accepting_tasks());

        if let Some(session) = sessions.get(id) {
            if !session.is_bound_to(channel) {
                return Err(WireError::Rejected(format!(
                    "session {id} is bound to another connection"
                )));
            }
            return Ok(session.clone());
        }

        if sessions.len() >= self.limits.max_concurrent_sessions {
            return Err(WireError::Rejected(format!(
                "maximum of {} concurrent sessions reached",
                self.limits.max_concurrent_sessions
            )));
        }

        let session = Session::Multi(MultiTaskSession::spawn(
            id.to_string(),
            channel.clone(),
            self.executor.clone(),
            self.limits.max_queued_tasks_per_session,
        ));
        self.arm_lifetime_timer(&session)?;
        sessions.insert(id.to_string(), session.clone());
        Ok(session)
    }

    fn arm_lifetime_timer(&self, session: &Session) -> Result<()> {
        let lifetime = self.limits.session_lifetime_timeout;
        if lifetime.is_zero() {
            return Ok(());
        }
        let target = session.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(lifetime).await;
            target.trigger_timeout(lifetime, true).await;
        });
        session.set_session_cancel_future(timer.abort_handle())
    }

    /// Live session `id`, if any.
    pub fn get(&self, id: &str) -> Option<Session> {
        lock(&self.sessions)
            .get(id)
            .filter(|s| s.is_accepting_tasks())
            .cloned()
    }

    /// Close session `id`; its queued tasks still run. Returns whether it existed.
    pub fn close_session(&self, id: &str) -> bool {
        let removed = lock(&self.sessions).remove(id);
        match removed {
            Some(Session::Multi(session)) => {
                session.close();
                true
            }
            Some(Session::Single(_)) | None => false,
        }
    }

    /// Tear down every session bound to `channel`, sessionless ones included.
    pub fn close_bound_to(&self, channel: &Channel) {
        for registry in [&self.sessions, &self.singles] {
            lock(registry).retain(|id, session| {
                if !session.is_bound_to(channel) {
                    return !session.is_terminated();
                }
                debug!(session_id = %id, channel_id = channel.id(), "Killing session of closed channel");
                session.kill();
                false
            });
        }
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        let mut sessions = lock(&self.sessions);
        sessions.retain(|_, s| s.is_accepting_tasks());
        sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        let sessions = lock(&self.sessions);
        if !sessions.is_empty() {
            info!(live = sessions.len(), "Session manager dropped with live sessions");
        }
        let singles = lock(&self.singles);
        for session in sessions.values().chain(singles.values()) {
            session.kill();
        }
    }
}
