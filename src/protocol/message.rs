//! Request and response messages.

use std::collections::BTreeMap;
use std::fmt;

use uuid::Uuid;

use crate::structure::Value;

/// Standard op names.
pub mod ops {
    /// Evaluate a script.
    pub const EVAL: &str = "eval";
    /// Execute a serialized traversal.
    pub const BYTECODE: &str = "bytecode";
    /// Close the session named by the `session` argument.
    pub const CLOSE: &str = "close";
    /// Answer an authentication challenge.
    pub const AUTHENTICATION: &str = "authentication";
    /// Op name of the sentinel request produced for undecodable input.
    pub const INVALID: &str = "invalid";
}

/// Standard request argument keys.
pub mod args {
    /// Session id; routes the request to a multi-task session.
    pub const SESSION: &str = "session";
    /// Script to evaluate.
    pub const GREMLIN: &str = "gremlin";
    /// Per-request timeout override in milliseconds.
    pub const EVALUATION_TIMEOUT: &str = "evaluationTimeout";
    /// Number of results per partial response.
    pub const BATCH_SIZE: &str = "batchSize";
}

/// Status attribute keys.
pub mod attributes {
    /// Error chain, outermost first.
    pub const EXCEPTIONS: &str = "exceptions";
    /// Formatted error.
    pub const STACK_TRACE: &str = "stackTrace";
}

/// A decoded client request.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestMessage {
    pub request_id: Uuid,
    pub op: String,
    /// Op namespace. Empty for the default processor.
    pub processor: String,
    pub args: BTreeMap<String, Value>,
}

impl RequestMessage {
    /// Start building a request for `op` with a random id.
    ///
    /// # Example
    ///
    /// ```
    /// use graphwire::protocol::{ops, RequestMessage};
    ///
    /// let req = RequestMessage::build(ops::EVAL)
    ///     .arg("gremlin", "g.V()")
    ///     .create();
    /// assert_eq!(req.arg_str("gremlin"), Some("g.V()"));
    /// ```
    pub fn build(op: impl Into<String>) -> RequestMessageBuilder {
        RequestMessageBuilder {
            message: RequestMessage {
                request_id: Uuid::new_v4(),
                op: op.into(),
                processor: String::new(),
                args: BTreeMap::new(),
            },
        }
    }

    /// Sentinel standing in for a request that could not be decoded.
    pub fn invalid() -> Self {
        Self {
            request_id: Uuid::nil(),
            op: ops::INVALID.to_string(),
            processor: String::new(),
            args: BTreeMap::new(),
        }
    }

    /// Whether this is the [`invalid`](Self::invalid) sentinel.
    pub fn is_invalid(&self) -> bool {
        self.request_id.is_nil() && self.op == ops::INVALID
    }

    pub fn arg(&self, key: &str) -> Option<&Value> {
        self.args.get(key)
    }

    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.arg(key).and_then(Value::as_str)
    }

    pub fn arg_i64(&self, key: &str) -> Option<i64> {
        self.arg(key).and_then(Value::as_i64)
    }

    /// Session id from the `session` argument.
    pub fn session_id(&self) -> Option<String> {
        match self.arg(args::SESSION)? {
            Value::String(s) => Some(s.clone()),
            Value::Uuid(id) => Some(id.to_string()),
            _ => None,
        }
    }
}

/// Fluent builder for [`RequestMessage`].
#[derive(Debug, Clone)]
pub struct RequestMessageBuilder {
    message: RequestMessage,
}

impl RequestMessageBuilder {
    pub fn request_id(mut self, id: Uuid) -> Self {
        self.message.request_id = id;
        self
    }

    pub fn processor(mut self, processor: impl Into<String>) -> Self {
        self.message.processor = processor.into();
        self
    }

    pub fn arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.message.args.insert(key.into(), value.into());
        self
    }

    pub fn create(self) -> RequestMessage {
        self.message
    }
}

/// Closed set of response status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ResponseStatusCode {
    Success = 200,
    NoContent = 204,
    PartialContent = 206,
    Unauthorized = 401,
    Forbidden = 403,
    /// Server busy; the session is not accepting tasks.
    TooManyRequests = 429,
    /// Request cancelled by its timeout.
    RequestTimeout = 498,
    /// Request cancelled by the session timeout.
    SessionTimeout = 499,
    ServerError = 500,
    ScriptEvaluationError = 597,
    ServerTimeout = 598,
    SerializationError = 599,
}

impl ResponseStatusCode {
    /// Numeric wire value.
    #[inline]
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Look up a wire value.
    pub fn from_code(code: i32) -> Option<Self> {
        use ResponseStatusCode::*;
        [
            Success,
            NoContent,
            PartialContent,
            Unauthorized,
            Forbidden,
            TooManyRequests,
            RequestTimeout,
            SessionTimeout,
            ServerError,
            ScriptEvaluationError,
            ServerTimeout,
            SerializationError,
        ]
        .into_iter()
        .find(|c| c.code() == code)
    }

    /// Whether no further frames follow for the same request id.
    #[inline]
    pub fn is_final(self) -> bool {
        self != ResponseStatusCode::PartialContent
    }

    /// 2xx codes.
    #[inline]
    pub fn is_success(self) -> bool {
        (200..300).contains(&self.code())
    }
}

impl fmt::Display for ResponseStatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Status block of a response.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseStatus {
    pub code: ResponseStatusCode,
    pub message: Option<String>,
    pub attributes: BTreeMap<String, Value>,
}

/// Result block of a response.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseResult {
    pub data: Value,
    pub meta: BTreeMap<String, Value>,
}

/// A server reply. Several may share one request id when streaming.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseMessage {
    /// `None` only when the request could not be identified.
    pub request_id: Option<Uuid>,
    pub status: ResponseStatus,
    pub result: ResponseResult,
}

impl ResponseMessage {
    /// Empty response with the given status.
    pub fn new(request_id: Option<Uuid>, code: ResponseStatusCode) -> Self {
        Self {
            request_id,
            status: ResponseStatus {
                code,
                message: None,
                attributes: BTreeMap::new(),
            },
            result: ResponseResult {
                data: Value::Null,
                meta: BTreeMap::new(),
            },
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.status.message = Some(message.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.status.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_data(mut self, data: impl Into<Value>) -> Self {
        self.result.data = data.into();
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.result.meta.insert(key.into(), value.into());
        self
    }

    #[inline]
    pub fn code(&self) -> ResponseStatusCode {
        self.status.code
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ResponseStatusCode::TooManyRequests.code(), 429);
        assert_eq!(
            ResponseStatusCode::from_code(498),
            Some(ResponseStatusCode::RequestTimeout)
        );
        assert_eq!(ResponseStatusCode::from_code(418), None);
        assert!(!ResponseStatusCode::PartialContent.is_final());
        assert!(ResponseStatusCode::NoContent.is_final());
        assert!(ResponseStatusCode::NoContent.is_success());
        assert!(!ResponseStatusCode::SessionTimeout.is_success());
    }

    #[test]
    fn test_request_builder() {
        let id = Uuid::from_u128(7);
        let req = RequestMessage::build(ops::EVAL)
            .request_id(id)
            .processor("session")
            .arg(args::SESSION, "abc")
            .arg(args::EVALUATION_TIMEOUT, 100i64)
            .create();

        assert_eq!(req.request_id, id);
        assert_eq!(req.processor, "session");
        assert_eq!(req.session_id().as_deref(), Some("abc"));
        assert_eq!(req.arg_i64(args::EVALUATION_TIMEOUT), Some(100));
        assert!(!req.is_invalid());
    }

    #[test]
    fn test_invalid_sentinel() {
        let req = RequestMessage::invalid();
        assert!(req.is_invalid());
        assert!(req.request_id.is_nil());
    }

    #[test]
    fn test_response_builder() {
        let res = ResponseMessage::new(None, ResponseStatusCode::ServerError)
            .with_message("boom")
            .with_attribute(attributes::EXCEPTIONS, vec!["boom"])
            .with_data(1i32)
            .with_meta("host", "local");
        assert_eq!(res.code(), ResponseStatusCode::ServerError);
        assert_eq!(res.status.message.as_deref(), Some("boom"));
        assert_eq!(res.result.data, Value::Int(1));
        assert_eq!(res.result.meta["host"], Value::from("local"));
    }
}
