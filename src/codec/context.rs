//! Generic read/write entry points that dispatch through the registry.

use std::sync::Arc;

use super::registry::TypeRegistry;
use super::type_code::{value_flags, TypeCode};
use crate::buffer::Buffer;
use crate::error::{Result, WireError};
use crate::structure::Value;

/// Longest chain of transforms followed before giving up.
const MAX_TRANSFORM_CHAIN: usize = 8;

/// Default limit on nested containers and elements in one decoded value.
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Decodes values from a [`Buffer`].
///
/// Each nested value is read through a child reader one level deeper, so
/// the depth bound holds no matter which serializer recurses.
#[derive(Debug, Clone)]
pub struct GraphBinaryReader {
    registry: Arc<TypeRegistry>,
    max_depth: usize,
    depth: usize,
}

impl GraphBinaryReader {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self {
            registry,
            max_depth: DEFAULT_MAX_DEPTH,
            depth: 0,
        }
    }

    /// Set the nesting limit; values nested deeper fail to decode.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Current nesting level; zero at the top-level value.
    pub fn depth(&self) -> usize {
        self.depth
    }

    fn descend(&self) -> Result<GraphBinaryReader> {
        if self.depth >= self.max_depth {
            return Err(WireError::serialization(format!(
                "value nested deeper than {} levels",
                self.max_depth
            )));
        }
        Ok(Self {
            registry: self.registry.clone(),
            max_depth: self.max_depth,
            depth: self.depth + 1,
        })
    }

    /// Read a fully-qualified value `<TypeCode><ValueFlags><payload>`.
    ///
    /// A set null flag yields [`Value::Null`] whatever the type code.
    pub fn read(&self, buf: &mut Buffer) -> Result<Value> {
        let code = buf.read_u8()?;
        let flags = buf.read_u8()?;
        if value_flags::is_null(flags) {
            return Ok(Value::Null);
        }
        let code = TypeCode::try_from(code)?;
        if code == TypeCode::UnspecifiedNull {
            return Err(WireError::serialization(
                "unspecified null type code without the null flag",
            ));
        }
        let serializer = self.registry.get(code)?;
        serializer.read_value(buf, &self.descend()?)
    }

    /// Read a bare value of a kind known from context.
    ///
    /// With `nullable` set, a flags byte precedes the payload.
    pub fn read_value(&self, buf: &mut Buffer, code: TypeCode, nullable: bool) -> Result<Value> {
        let serializer = self.registry.get(code)?;
        let nested = self.descend()?;
        if nullable {
            serializer.read_nullable_value(buf, &nested)
        } else {
            serializer.read_value(buf, &nested)
        }
    }
}

/// Encodes values into a [`Buffer`].
#[derive(Debug, Clone)]
pub struct GraphBinaryWriter {
    registry: Arc<TypeRegistry>,
}

impl GraphBinaryWriter {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Write a fully-qualified value.
    ///
    /// Null is written as `<UnspecifiedNull><NULL>`. Kinds without a
    /// standalone encoding are replaced by their serializer's transform.
    pub fn write(&self, value: &Value, buf: &mut Buffer) -> Result<()> {
        self.write_at_depth(value, buf, 0)
    }

    fn write_at_depth(&self, value: &Value, buf: &mut Buffer, depth: usize) -> Result<()> {
        if value.is_null() {
            buf.write_u8(TypeCode::UnspecifiedNull.as_u8())?;
            buf.write_u8(value_flags::NULL)?;
            return Ok(());
        }
        let serializer = self.registry.get(value.type_code())?;
        if let Some(proxy) = serializer.transform(value) {
            if depth >= MAX_TRANSFORM_CHAIN {
                return Err(WireError::serialization("transform did not converge"));
            }
            return self.write_at_depth(&proxy, buf, depth + 1);
        }
        serializer.write(value, buf, self)
    }

    /// Write a bare value of a kind known from context.
    ///
    /// With `nullable` set, a flags byte precedes the payload; without it a
    /// null value is an error.
    pub fn write_value(
        &self,
        value: &Value,
        buf: &mut Buffer,
        code: TypeCode,
        nullable: bool,
    ) -> Result<()> {
        let serializer = self.registry.get(code)?;
        if nullable {
            return serializer.write_nullable_value(value, buf, self);
        }
        if value.is_null() {
            return Err(WireError::serialization(format!(
                "null is not allowed for a non-nullable {}",
                code.name()
            )));
        }
        serializer.write_value(value, buf, self)
    }
}

/// Reader and writer sharing one registry.
#[derive(Debug, Clone)]
pub struct GraphBinary {
    pub reader: GraphBinaryReader,
    pub writer: GraphBinaryWriter,
}

impl GraphBinary {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self {
            reader: GraphBinaryReader::new(registry.clone()),
            writer: GraphBinaryWriter::new(registry),
        }
    }

    /// Limit how deeply decoded values may nest.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.reader = self.reader.with_max_depth(max_depth);
        self
    }
}

impl Default for GraphBinary {
    fn default() -> Self {
        Self::new(Arc::new(TypeRegistry::with_defaults()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `depth` nested single-element Lists around an Int.
    fn nested_lists(depth: usize) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(depth * 6 + 6);
        for _ in 0..depth {
            bytes.extend_from_slice(&[0x09, 0x00, 0x00, 0x00, 0x00, 0x01]);
        }
        bytes.extend_from_slice(&[0x01, 0x00, 0x00, 0x00, 0x00, 0x01]);
        bytes
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let codec = GraphBinary::default();
        let mut buf = Buffer::wrap(&nested_lists(100_000));

        let err = codec.reader.read(&mut buf).unwrap_err();
        assert!(matches!(err, WireError::Serialization(_)));
        assert_eq!(err.status_code(), crate::protocol::ResponseStatusCode::SerializationError);
    }

    #[test]
    fn test_nesting_within_limit() {
        let codec = GraphBinary::default().with_max_depth(4);

        let mut buf = Buffer::wrap(&nested_lists(3));
        let mut value = codec.reader.read(&mut buf).unwrap();
        for _ in 0..3 {
            let Value::List(mut items) = value else {
                panic!("expected a list");
            };
            value = items.remove(0);
        }
        assert_eq!(value, Value::Int(1));

        let mut buf = Buffer::wrap(&nested_lists(4));
        assert!(codec.reader.read(&mut buf).is_err());
        assert_eq!(codec.reader.depth(), 0);
    }
}
