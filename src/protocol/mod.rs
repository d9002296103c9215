//! Protocol module - messages, envelope, and stream framing.
//!
//! This module implements the message layer above the value codec:
//! - Request/response message types and status codes
//! - Binary message bodies with the version byte
//! - Content-type envelope on the first frame of a connection
//! - Length-prefixed frame buffer for byte-stream transports

mod envelope;
mod frame_buffer;
mod message;
mod message_codec;
mod wire_format;

pub use envelope::{Envelope, HandshakeDecoder, HandshakeEncoder};
pub use frame_buffer::FrameBuffer;
pub use message::{
    args, attributes, ops, RequestMessage, RequestMessageBuilder, ResponseMessage,
    ResponseResult, ResponseStatus, ResponseStatusCode,
};
pub use message_codec::MessageSerializer;
pub use wire_format::{
    decode_length_prefix, encode_length_prefix, ABSOLUTE_MAX_FRAME_SIZE, DEFAULT_CONTENT_TYPE,
    DEFAULT_MAX_FRAME_SIZE, LENGTH_PREFIX_SIZE, MAX_CONTENT_TYPE_LEN, MESSAGE_VERSION,
};
