//! Error types for graphwire.

use thiserror::Error;

use crate::buffer::BufferError;
use crate::protocol::ResponseStatusCode;

/// Main error type for codec, framing and session operations.
#[derive(Debug, Error)]
pub enum WireError {
    /// I/O error on the transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Buffer bounds or lifetime violation while encoding or decoding.
    #[error("buffer error: {0}")]
    Buffer(#[from] BufferError),

    /// A type code with no known value kind was read.
    #[error("unknown type code 0x{0:02x}")]
    UnknownTypeCode(u8),

    /// A value kind is known but has no serializer registered.
    #[error("no serializer registered for {0}")]
    SerializerNotFound(&'static str),

    /// Malformed value payload (negative length, bad UTF-8, type mismatch).
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A container-only serializer was asked to read or write a standalone value.
    #[error("{0}")]
    ContainerOnly(&'static str),

    /// Framing violation: bad content-type prefix, oversized or truncated frame.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// No handler is registered for the requested op.
    #[error("no handler registered for op '{op}' on processor '{processor}'")]
    UnknownOp {
        /// Processor named by the request.
        processor: String,
        /// Op named by the request.
        op: String,
    },

    /// The session refused the task (queue full or shutting down).
    #[error("task rejected: {0}")]
    Rejected(String),

    /// The request or session exceeded its time budget.
    #[error("{} timed out after {elapsed_ms} ms", timeout_scope(.caused_by_session))]
    Timeout {
        /// Elapsed budget in milliseconds.
        elapsed_ms: u64,
        /// Whether the session lifetime (rather than the request) expired.
        caused_by_session: bool,
    },

    /// Handler reported a failure while executing a task.
    #[error("execution failed: {0}")]
    Execution(String),

    /// Session plumbing hook was called more than once.
    #[error("session hook '{0}' already set")]
    HookAlreadySet(&'static str),

    /// Connection closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Writer queue stayed full past the backpressure timeout.
    #[error("Backpressure timeout")]
    BackpressureTimeout,
}

impl WireError {
    /// Shorthand for a serialization error with a formatted message.
    pub fn serialization(msg: impl Into<String>) -> Self {
        WireError::Serialization(msg.into())
    }

    /// Status code used when this error is reported to a client.
    pub fn status_code(&self) -> ResponseStatusCode {
        match self {
            WireError::Buffer(_)
            | WireError::UnknownTypeCode(_)
            | WireError::SerializerNotFound(_)
            | WireError::Serialization(_)
            | WireError::ContainerOnly(_) => ResponseStatusCode::SerializationError,
            WireError::Rejected(_) | WireError::BackpressureTimeout => {
                ResponseStatusCode::TooManyRequests
            }
            WireError::Timeout {
                caused_by_session: false,
                ..
            } => ResponseStatusCode::RequestTimeout,
            WireError::Timeout {
                caused_by_session: true,
                ..
            } => ResponseStatusCode::SessionTimeout,
            _ => ResponseStatusCode::ServerError,
        }
    }
}

fn timeout_scope(caused_by_session: &bool) -> &'static str {
    if *caused_by_session {
        "session"
    } else {
        "request"
    }
}

/// Result type alias using WireError.
pub type Result<T> = std::result::Result<T, WireError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_mapping() {
        assert_eq!(
            WireError::UnknownTypeCode(0x7f).status_code(),
            ResponseStatusCode::SerializationError
        );
        assert_eq!(
            WireError::Rejected("full".into()).status_code(),
            ResponseStatusCode::TooManyRequests
        );
        assert_eq!(
            WireError::Timeout {
                elapsed_ms: 100,
                caused_by_session: false
            }
            .status_code(),
            ResponseStatusCode::RequestTimeout
        );
        assert_eq!(
            WireError::Timeout {
                elapsed_ms: 100,
                caused_by_session: true
            }
            .status_code(),
            ResponseStatusCode::SessionTimeout
        );
        assert_eq!(
            WireError::Execution("boom".into()).status_code(),
            ResponseStatusCode::ServerError
        );
    }

    #[test]
    fn test_display_messages() {
        assert_eq!(
            WireError::UnknownTypeCode(0x7f).to_string(),
            "unknown type code 0x7f"
        );
        let timeout = WireError::Timeout {
            elapsed_ms: 250,
            caused_by_session: true,
        };
        assert_eq!(timeout.to_string(), "session timed out after 250 ms");
    }
}
