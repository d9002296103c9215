//! Runs one task under its request timeout.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};

use super::state::{Refusal, SessionState};
use super::SessionTask;
use crate::error::WireError;
use crate::handler::{OpRegistry, TaskContext};
use crate::protocol::{args, RequestMessage, ResponseMessage, ResponseStatusCode};

/// Executes session tasks against an op registry.
#[derive(Clone, Debug)]
pub struct TaskExecutor {
    registry: Arc<OpRegistry>,
    evaluation_timeout: Duration,
}

impl TaskExecutor {
    /// `evaluation_timeout` of zero disables the request timeout.
    pub fn new(registry: Arc<OpRegistry>, evaluation_timeout: Duration) -> Self {
        Self {
            registry,
            evaluation_timeout,
        }
    }

    pub fn registry(&self) -> &Arc<OpRegistry> {
        &self.registry
    }

    /// Time budget for `request`; `None` means unbounded.
    ///
    /// A non-negative `evaluationTimeout` argument overrides the default.
    pub fn budget_for(&self, request: &RequestMessage) -> Option<Duration> {
        let budget = match request.arg_i64(args::EVALUATION_TIMEOUT) {
            Some(ms) if ms >= 0 => Duration::from_millis(ms as u64),
            _ => self.evaluation_timeout,
        };
        (!budget.is_zero()).then_some(budget)
    }

    /// Run `task` to its terminal response.
    ///
    /// The handler runs on its own tokio task so a timeout can abort it.
    /// If the handler returns without a terminal response, 204 is sent.
    pub(crate) async fn run(&self, state: &SessionState, task: SessionTask) {
        let SessionTask { request, context } = task;
        let request_id = request.request_id;
        let budget = self.budget_for(&request);

        let registry = self.registry.clone();
        let handler_ctx = context.clone();
        let handle = tokio::spawn(async move { registry.dispatch(request, handler_ctx).await });

        match state.begin(context.clone(), handle.abort_handle()) {
            Ok(()) => {}
            Err(Refusal::TimedOut(elapsed)) => {
                handle.abort();
                state.reply_timeout(&context, elapsed, true).await;
                return;
            }
            Err(Refusal::Killed) => {
                handle.abort();
                return;
            }
        }

        let joined = match budget {
            Some(budget) => match tokio::time::timeout(budget, handle).await {
                Ok(joined) => Some(joined),
                Err(_) => {
                    state.interrupt_in_flight(budget, false).await;
                    None
                }
            },
            None => Some(handle.await),
        };
        state.end(request_id);

        let response = match joined {
            // Timed out; the timeout reply was already sent
            None => return,
            Some(Ok(Ok(()))) => {
                ResponseMessage::new(Some(request_id), ResponseStatusCode::NoContent)
            }
            Some(Ok(Err(e))) => {
                debug!(session_id = %state.id(), %request_id, error = %e, "Task failed");
                context.error_response(&e)
            }
            // Aborted by an external timeout trigger
            Some(Err(join)) if join.is_cancelled() => return,
            Some(Err(join)) => {
                error!(session_id = %state.id(), %request_id, "Task panicked: {join}");
                context.error_response(&WireError::Execution(format!("task panicked: {join}")))
            }
        };
        finish(state, &context, response).await;
    }
}

async fn finish(state: &SessionState, context: &TaskContext, response: ResponseMessage) {
    if let Err(e) = context.try_finish(response).await {
        warn!(
            session_id = %state.id(),
            request_id = %context.request_id(),
            error = %e,
            "Terminal response not delivered"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ops;

    fn executor(ms: u64) -> TaskExecutor {
        TaskExecutor::new(Arc::new(OpRegistry::new()), Duration::from_millis(ms))
    }

    #[test]
    fn test_budget_default_and_override() {
        let exec = executor(30_000);
        let plain = RequestMessage::build(ops::EVAL).create();
        assert_eq!(exec.budget_for(&plain), Some(Duration::from_secs(30)));

        let overridden = RequestMessage::build(ops::EVAL)
            .arg(args::EVALUATION_TIMEOUT, 100i64)
            .create();
        assert_eq!(exec.budget_for(&overridden), Some(Duration::from_millis(100)));

        let as_int = RequestMessage::build(ops::EVAL)
            .arg(args::EVALUATION_TIMEOUT, 250i32)
            .create();
        assert_eq!(exec.budget_for(&as_int), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_zero_budget_is_unbounded() {
        assert_eq!(
            executor(0).budget_for(&RequestMessage::build(ops::EVAL).create()),
            None
        );

        let disabled = RequestMessage::build(ops::EVAL)
            .arg(args::EVALUATION_TIMEOUT, 0i64)
            .create();
        assert_eq!(executor(1000).budget_for(&disabled), None);

        let negative = RequestMessage::build(ops::EVAL)
            .arg(args::EVALUATION_TIMEOUT, -5i64)
            .create();
        assert_eq!(
            executor(1000).budget_for(&negative),
            Some(Duration::from_secs(1))
        );
    }
}
