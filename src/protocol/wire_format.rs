//! Framing constants and the length prefix of the stream profile.
//!
//! On byte-stream transports every frame travels as:
//! ```text
//! ┌──────────────┬───────────────────────────────┐
//! │ Length       │ Frame                         │
//! │ 4 bytes      │ Length bytes                  │
//! │ uint32 BE    │ [envelope prefix] + message   │
//! └──────────────┴───────────────────────────────┘
//! ```
//!
//! The first frame a client sends carries the content-type envelope
//! `<u8 ctLen><ctLen bytes>` before the message body; later frames carry the
//! body only.

use crate::error::{Result, WireError};

/// Length prefix size in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Default maximum frame size (64 MB).
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 64 * 1024 * 1024;

/// Absolute maximum frame size (max i32).
pub const ABSOLUTE_MAX_FRAME_SIZE: u32 = i32::MAX as u32;

/// Version byte leading every request and response body.
pub const MESSAGE_VERSION: u8 = 0x81;

/// Content type announced by the handshake.
pub const DEFAULT_CONTENT_TYPE: &str = "application/vnd.graphbinary-v1.0";

/// Longest content type the one-byte envelope prefix can carry.
pub const MAX_CONTENT_TYPE_LEN: usize = u8::MAX as usize;

/// Encode a frame length (Big Endian).
///
/// # Example
///
/// ```
/// use graphwire::protocol::encode_length_prefix;
///
/// assert_eq!(encode_length_prefix(258).unwrap(), [0, 0, 1, 2]);
/// ```
pub fn encode_length_prefix(length: usize) -> Result<[u8; LENGTH_PREFIX_SIZE]> {
    let length = u32::try_from(length)
        .ok()
        .filter(|l| *l <= ABSOLUTE_MAX_FRAME_SIZE)
        .ok_or_else(|| {
            WireError::Protocol(format!(
                "Frame size {length} exceeds maximum {ABSOLUTE_MAX_FRAME_SIZE}"
            ))
        })?;
    Ok(length.to_be_bytes())
}

/// Decode a frame length (Big Endian).
///
/// Returns `None` if the buffer is too short.
#[inline]
pub fn decode_length_prefix(buf: &[u8]) -> Option<u32> {
    let prefix: [u8; LENGTH_PREFIX_SIZE] = buf.get(..LENGTH_PREFIX_SIZE)?.try_into().ok()?;
    Some(u32::from_be_bytes(prefix))
}
