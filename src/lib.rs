//! # graphwire
//!
//! Binary graph wire codec and request/session plumbing for graph servers.
//!
//! This crate encodes graph values (vertices, edges, properties, paths)
//! and containers in the type-tagged GraphBinary format. It frames
//! request/response messages over byte streams and runs decoded requests
//! inside sessions with request and session timeouts.
//!
//! ## Architecture
//!
//! - **Buffer**: reference-counted byte buffer with reader/writer cursors
//! - **Codec**: `<type code><flags><payload>` values via a serializer registry
//! - **Protocol**: versioned message bodies, content-type envelope, framing
//! - **Session**: single-task and multi-task sessions with timeouts
//! - **Server**: per-connection read loop and dedicated writer task
//!
//! ## Example
//!
//! ```
//! use graphwire::codec::GraphBinary;
//! use graphwire::buffer::Buffer;
//! use graphwire::Value;
//!
//! let codec = GraphBinary::default();
//! let mut buf = Buffer::new();
//!
//! let value = Value::from(vec![Value::from("héllo"), Value::Int(1)]);
//! codec.writer.write(&value, &mut buf).unwrap();
//! assert_eq!(codec.reader.read(&mut buf).unwrap(), value);
//! assert_eq!(buf.readable_bytes(), 0);
//! ```

pub mod buffer;
pub mod channel;
pub mod codec;
pub mod error;
pub mod handler;
pub mod predicate;
pub mod protocol;
pub mod session;
pub mod structure;
pub mod writer;

mod server;

pub use channel::Channel;
pub use error::{Result, WireError};
pub use handler::{OpRegistry, TaskContext};
pub use server::{Server, ServerBuilder, ServerSettings};
pub use session::{Session, SessionTask};
pub use structure::Value;
