//! Op registry for dispatching requests by processor and op name.
//!
//! The registry is filled before the server starts and read-only afterwards,
//! so it is shared behind an `Arc` without locking.
//!
//! # Example
//!
//! ```
//! use graphwire::handler::OpRegistry;
//! use graphwire::protocol::ops;
//!
//! let mut registry = OpRegistry::new();
//! registry.register(ops::EVAL, |request, ctx| async move {
//!     let script = request.arg_str("gremlin").unwrap_or_default().to_string();
//!     ctx.complete(script).await
//! });
//!
//! assert!(registry.contains("", ops::EVAL));
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use super::TaskContext;
use crate::error::{Result, WireError};
use crate::protocol::RequestMessage;

/// Result type for handler functions.
pub type HandlerResult = Result<()>;

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Trait for op handlers.
pub trait OpHandler: Send + Sync + 'static {
    /// Execute a request, answering through `ctx`.
    fn call(&self, request: RequestMessage, ctx: TaskContext) -> BoxFuture<'static, HandlerResult>;
}

/// Adapter turning an async closure into an [`OpHandler`].
pub struct FnHandler<F, Fut>
where
    F: Fn(RequestMessage, TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    handler: F,
    _phantom: PhantomData<fn() -> Fut>,
}

impl<F, Fut> FnHandler<F, Fut>
where
    F: Fn(RequestMessage, TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, Fut> OpHandler for FnHandler<F, Fut>
where
    F: Fn(RequestMessage, TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, request: RequestMessage, ctx: TaskContext) -> BoxFuture<'static, HandlerResult> {
        Box::pin((self.handler)(request, ctx))
    }
}

/// Registry mapping `(processor, op)` to handlers.
#[derive(Default, Clone)]
pub struct OpRegistry {
    handlers: HashMap<(String, String), Arc<dyn OpHandler>>,
}

impl OpRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `op` on the default (empty) processor.
    pub fn register<F, Fut>(&mut self, op: &str, handler: F)
    where
        F: Fn(RequestMessage, TaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.register_for("", op, handler);
    }

    /// Register a handler for `op` on a named processor.
    pub fn register_for<F, Fut>(&mut self, processor: &str, op: &str, handler: F)
    where
        F: Fn(RequestMessage, TaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.register_handler(processor, op, Arc::new(FnHandler::new(handler)));
    }

    /// Register a prebuilt handler, replacing any previous one.
    pub fn register_handler(&mut self, processor: &str, op: &str, handler: Arc<dyn OpHandler>) {
        self.handlers
            .insert((processor.to_string(), op.to_string()), handler);
    }

    /// Get a handler by processor and op.
    pub fn get(&self, processor: &str, op: &str) -> Option<Arc<dyn OpHandler>> {
        self.handlers
            .get(&(processor.to_string(), op.to_string()))
            .cloned()
    }

    pub fn contains(&self, processor: &str, op: &str) -> bool {
        self.get(processor, op).is_some()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Dispatch a request to the appropriate handler.
    ///
    /// # Errors
    ///
    /// [`WireError::UnknownOp`] when nothing is registered for the request's
    /// processor and op; otherwise whatever the handler returns.
    pub async fn dispatch(&self, request: RequestMessage, ctx: TaskContext) -> HandlerResult {
        let handler = self.get(&request.processor, &request.op).ok_or_else(|| {
            WireError::UnknownOp {
                processor: request.processor.clone(),
                op: request.op.clone(),
            }
        })?;

        handler.call(request, ctx).await
    }
}

impl std::fmt::Debug for OpRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpRegistry")
            .field("ops", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}
