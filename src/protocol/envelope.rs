//! Content-type envelope carried by the first frame of a connection.
//!
//! ```text
//! first frame:  <u8 ctLen><ctLen bytes content type><body>
//! later frames: <body>
//! ```
//!
//! A zero `ctLen` is invalid.

use bytes::{BufMut, Bytes, BytesMut};

use super::wire_format::MAX_CONTENT_TYPE_LEN;
use crate::error::{Result, WireError};

/// Prefixes the first outgoing body with the content type.
#[derive(Debug, Clone)]
pub struct HandshakeEncoder {
    content_type: String,
    sent: bool,
}

impl HandshakeEncoder {
    /// Create an encoder announcing `content_type`.
    ///
    /// Fails when the content type is empty or longer than 255 bytes.
    pub fn new(content_type: impl Into<String>) -> Result<Self> {
        let content_type = content_type.into();
        if content_type.is_empty() || content_type.len() > MAX_CONTENT_TYPE_LEN {
            return Err(WireError::Protocol(format!(
                "content type length {} is outside 1..={MAX_CONTENT_TYPE_LEN}",
                content_type.len()
            )));
        }
        Ok(Self {
            content_type,
            sent: false,
        })
    }

    /// Whether the prefix has been emitted.
    pub fn is_handshake_sent(&self) -> bool {
        self.sent
    }

    /// Frame `body`, adding the prefix the first time only.
    ///
    /// # Example
    ///
    /// ```
    /// use graphwire::protocol::HandshakeEncoder;
    ///
    /// let mut enc = HandshakeEncoder::new("graph-bin").unwrap();
    /// let first = enc.encode(b"body");
    /// assert_eq!(first[0], 9);
    /// assert_eq!(&first[1..10], b"graph-bin");
    /// assert_eq!(&enc.encode(b"body")[..], b"body");
    /// ```
    pub fn encode(&mut self, body: &[u8]) -> Bytes {
        if self.sent {
            return Bytes::copy_from_slice(body);
        }
        self.sent = true;
        let mut out = BytesMut::with_capacity(1 + self.content_type.len() + body.len());
        out.put_u8(self.content_type.len() as u8);
        out.put_slice(self.content_type.as_bytes());
        out.put_slice(body);
        out.freeze()
    }
}

/// One inbound frame split into its envelope parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Content type; present on the first frame only.
    pub content_type: Option<String>,
    pub body: Bytes,
}

/// Strips the content-type prefix from the first inbound frame.
#[derive(Debug, Clone, Default)]
pub struct HandshakeDecoder {
    content_type: Option<String>,
}

impl HandshakeDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Content type announced by the peer, once seen.
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Split `frame` into its envelope parts.
    ///
    /// # Errors
    ///
    /// Fails on the first frame when `ctLen` is zero, the prefix is
    /// truncated, or the content type is not UTF-8. These errors are not
    /// recoverable for the connection.
    pub fn decode(&mut self, frame: Bytes) -> Result<Envelope> {
        if self.content_type.is_some() {
            return Ok(Envelope {
                content_type: None,
                body: frame,
            });
        }

        let Some(&ct_len) = frame.first() else {
            return Err(WireError::Protocol("empty handshake frame".to_string()));
        };
        let ct_len = ct_len as usize;
        if ct_len == 0 {
            return Err(WireError::Protocol(
                "content type length must not be zero".to_string(),
            ));
        }
        if frame.len() < 1 + ct_len {
            return Err(WireError::Protocol(format!(
                "content type of {ct_len} bytes truncated at {}",
                frame.len() - 1
            )));
        }
        let content_type = std::str::from_utf8(&frame[1..1 + ct_len])
            .map_err(|_| WireError::Protocol("content type is not valid UTF-8".to_string()))?
            .to_string();

        self.content_type = Some(content_type.clone());
        Ok(Envelope {
            content_type: Some(content_type),
            body: frame.slice(1 + ct_len..),
        })
    }
}
