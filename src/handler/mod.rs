//! Handler module - op handling and dispatch.
//!
//! Provides:
//! - [`OpRegistry`] - maps `(processor, op)` to handlers
//! - [`TaskContext`] - lets handlers stream partial results and finish
//!
//! # Example
//!
//! ```
//! use graphwire::handler::OpRegistry;
//! use graphwire::structure::Value;
//!
//! let mut registry = OpRegistry::new();
//!
//! // Streaming handler: two partial batches, then 204
//! registry.register("count", |_request, ctx| async move {
//!     ctx.write_partial(vec![0i32, 1]).await?;
//!     ctx.write_partial(vec![2i32]).await?;
//!     ctx.complete(Value::Null).await
//! });
//! ```

mod context;
mod registry;

pub use context::TaskContext;
pub use registry::{BoxFuture, FnHandler, HandlerResult, OpHandler, OpRegistry};
