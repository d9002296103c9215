//! Binary encoding of request and response bodies.
//!
//! Request body:
//! ```text
//! <0x81><bare UUID requestId><bare String op><bare String processor><bare Map args>
//! ```
//!
//! Response body:
//! ```text
//! <0x81><nullable UUID requestId><bare Int code><nullable String message>
//! <bare Map attributes><bare Map meta><fq data>
//! ```
//!
//! "Nullable" means a flags byte followed by the bare value when not null.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use tracing::warn;

use super::message::{RequestMessage, ResponseMessage, ResponseStatusCode};
use super::wire_format::MESSAGE_VERSION;
use crate::buffer::{Buffer, BufferAllocator};
use crate::codec::{
    read_string, read_uuid, value_flags, write_string, write_uuid, GraphBinary, TypeCode,
    TypeRegistry,
};
use crate::error::{Result, WireError};
use crate::structure::Value;

/// Serializes messages with a shared registry and allocator.
#[derive(Debug, Clone)]
pub struct MessageSerializer {
    codec: GraphBinary,
    allocator: BufferAllocator,
}

impl MessageSerializer {
    pub fn new(registry: Arc<TypeRegistry>, allocator: BufferAllocator) -> Self {
        Self {
            codec: GraphBinary::new(registry),
            allocator,
        }
    }

    /// Limit how deeply decoded values may nest.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.codec = self.codec.with_max_depth(max_depth);
        self
    }

    pub fn codec(&self) -> &GraphBinary {
        &self.codec
    }

    pub fn allocator(&self) -> &BufferAllocator {
        &self.allocator
    }

    /// Encode a request body.
    pub fn serialize_request(&self, request: &RequestMessage) -> Result<Bytes> {
        let mut buf = self.allocator.allocate();
        buf.write_u8(MESSAGE_VERSION)?;
        write_uuid(&mut buf, &request.request_id)?;
        write_string(&mut buf, &request.op)?;
        write_string(&mut buf, &request.processor)?;
        self.write_string_map(&request.args, &mut buf)?;
        finish(buf)
    }

    /// Decode a request body.
    pub fn deserialize_request(&self, body: &[u8]) -> Result<RequestMessage> {
        let mut buf = Buffer::wrap(body);
        read_version(&mut buf)?;
        let request_id = read_uuid(&mut buf)?;
        let op = read_string(&mut buf)?;
        let processor = read_string(&mut buf)?;
        let args = self.read_string_map(&mut buf)?;
        ensure_consumed(&buf)?;
        Ok(RequestMessage {
            request_id,
            op,
            processor,
            args,
        })
    }

    /// Encode a response body.
    ///
    /// If part of the response cannot be encoded, the partial output is
    /// discarded and a serialization error response for the same request id
    /// is encoded instead.
    pub fn serialize_response(&self, response: &ResponseMessage) -> Result<Bytes> {
        let mut buf = self.allocator.allocate();
        buf.mark_writer_index();
        if let Err(e) = self.write_response(response, &mut buf) {
            warn!(
                request_id = ?response.request_id,
                error = %e,
                "Response could not be serialized, replying with serialization error"
            );
            buf.reset_writer_index();
            let fallback = ResponseMessage::new(
                response.request_id,
                ResponseStatusCode::SerializationError,
            )
            .with_message(format!("Error during serialization: {e}"));
            self.write_response(&fallback, &mut buf)?;
        }
        finish(buf)
    }

    fn write_response(&self, response: &ResponseMessage, buf: &mut Buffer) -> Result<()> {
        buf.write_u8(MESSAGE_VERSION)?;
        match &response.request_id {
            Some(id) => {
                buf.write_u8(value_flags::NONE)?;
                write_uuid(buf, id)?;
            }
            None => {
                buf.write_u8(value_flags::NULL)?;
            }
        }
        buf.write_int(response.status.code.code())?;
        match &response.status.message {
            Some(message) => {
                buf.write_u8(value_flags::NONE)?;
                write_string(buf, message)?;
            }
            None => {
                buf.write_u8(value_flags::NULL)?;
            }
        }
        self.write_string_map(&response.status.attributes, buf)?;
        self.write_string_map(&response.result.meta, buf)?;
        self.codec.writer.write(&response.result.data, buf)
    }

    /// Decode a response body.
    pub fn deserialize_response(&self, body: &[u8]) -> Result<ResponseMessage> {
        let mut buf = Buffer::wrap(body);
        read_version(&mut buf)?;
        let request_id = if value_flags::is_null(buf.read_u8()?) {
            None
        } else {
            Some(read_uuid(&mut buf)?)
        };
        let raw_code = buf.read_int()?;
        let code = ResponseStatusCode::from_code(raw_code)
            .ok_or_else(|| WireError::serialization(format!("unknown status code {raw_code}")))?;
        let message = if value_flags::is_null(buf.read_u8()?) {
            None
        } else {
            Some(read_string(&mut buf)?)
        };
        let attributes = self.read_string_map(&mut buf)?;
        let meta = self.read_string_map(&mut buf)?;
        let data = self.codec.reader.read(&mut buf)?;
        ensure_consumed(&buf)?;

        let mut response = ResponseMessage::new(request_id, code);
        response.status.message = message;
        response.status.attributes = attributes;
        response.result.meta = meta;
        response.result.data = data;
        Ok(response)
    }

    /// Bare map whose keys are fully-qualified strings.
    fn write_string_map(&self, map: &BTreeMap<String, Value>, buf: &mut Buffer) -> Result<()> {
        let length = i32::try_from(map.len())
            .map_err(|_| WireError::serialization("map too large"))?;
        buf.write_int(length)?;
        for (key, value) in map {
            buf.write_u8(TypeCode::String.as_u8())?;
            buf.write_u8(value_flags::NONE)?;
            write_string(buf, key)?;
            self.codec.writer.write(value, buf)?;
        }
        Ok(())
    }

    fn read_string_map(&self, buf: &mut Buffer) -> Result<BTreeMap<String, Value>> {
        let Value::Map(entries) = self.codec.reader.read_value(buf, TypeCode::Map, false)? else {
            return Err(WireError::serialization("expected a map"));
        };
        entries
            .into_iter()
            .map(|(key, value)| match key {
                Value::String(key) => Ok((key, value)),
                other => Err(WireError::serialization(format!(
                    "map key must be a String, found {}",
                    other.type_code().name()
                ))),
            })
            .collect()
    }
}

impl Default for MessageSerializer {
    fn default() -> Self {
        Self::new(
            Arc::new(TypeRegistry::with_defaults()),
            BufferAllocator::default(),
        )
    }
}

fn read_version(buf: &mut Buffer) -> Result<()> {
    let version = buf.read_u8()?;
    if version != MESSAGE_VERSION {
        return Err(WireError::serialization(format!(
            "unsupported message version 0x{version:02x}"
        )));
    }
    Ok(())
}

fn ensure_consumed(buf: &Buffer) -> Result<()> {
    if buf.readable_bytes() > 0 {
        return Err(WireError::serialization(format!(
            "{} trailing bytes after message",
            buf.readable_bytes()
        )));
    }
    Ok(())
}

/// Copy the encoded bytes out and hand the buffer back to its allocator.
fn finish(buf: Buffer) -> Result<Bytes> {
    let bytes = buf.to_bytes()?;
    buf.release()?;
    Ok(bytes)
}
