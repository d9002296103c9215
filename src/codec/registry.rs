//! Serializer trait and the code-keyed serializer table.
//!
//! Each value kind has one [`TypeSerializer`]. Serializers implement the
//! *bare* encoding (`read_value`/`write_value`) and inherit the
//! fully-qualified wrappers, which add the `<TypeCode><ValueFlags>` prefix.
//!
//! The [`TypeRegistry`] is populated before first use and then shared
//! immutably behind an `Arc`.

use std::fmt;
use std::sync::Arc;

use super::context::{GraphBinaryReader, GraphBinaryWriter};
use super::serializers;
use super::type_code::{value_flags, TypeCode};
use crate::buffer::Buffer;
use crate::error::{Result, WireError};
use crate::structure::Value;

/// Reads and writes one value kind.
pub trait TypeSerializer: Send + Sync {
    /// Code this serializer is registered under.
    fn type_code(&self) -> TypeCode;

    /// Read the bare payload.
    fn read_value(&self, buf: &mut Buffer, reader: &GraphBinaryReader) -> Result<Value>;

    /// Write the bare payload.
    fn write_value(&self, value: &Value, buf: &mut Buffer, writer: &GraphBinaryWriter)
        -> Result<()>;

    /// Proxy value to write instead of `value`, for kinds without a
    /// standalone encoding.
    fn transform(&self, _value: &Value) -> Option<Value> {
        None
    }

    /// Read `<TypeCode><ValueFlags><payload>`, checking the code matches.
    fn read(&self, buf: &mut Buffer, reader: &GraphBinaryReader) -> Result<Value> {
        let code = buf.read_u8()?;
        if code != self.type_code().as_u8() {
            return Err(WireError::serialization(format!(
                "expected type code {} but found 0x{code:02x}",
                self.type_code()
            )));
        }
        self.read_nullable_value(buf, reader)
    }

    /// Write `<TypeCode><ValueFlags><payload>`.
    fn write(&self, value: &Value, buf: &mut Buffer, writer: &GraphBinaryWriter) -> Result<()> {
        buf.write_u8(self.type_code().as_u8())?;
        self.write_nullable_value(value, buf, writer)
    }

    /// Read `<ValueFlags><payload>`, where the payload is absent when null.
    fn read_nullable_value(&self, buf: &mut Buffer, reader: &GraphBinaryReader) -> Result<Value> {
        let flags = buf.read_u8()?;
        if value_flags::is_null(flags) {
            return Ok(Value::Null);
        }
        self.read_value(buf, reader)
    }

    /// Write `<ValueFlags><payload>`.
    fn write_nullable_value(
        &self,
        value: &Value,
        buf: &mut Buffer,
        writer: &GraphBinaryWriter,
    ) -> Result<()> {
        if value.is_null() {
            buf.write_u8(value_flags::NULL)?;
            return Ok(());
        }
        buf.write_u8(value_flags::NONE)?;
        self.write_value(value, buf, writer)
    }
}

/// Error for a serializer handed a value of another kind.
pub(crate) fn mismatch(expected: TypeCode, found: &Value) -> WireError {
    WireError::serialization(format!(
        "{} serializer cannot write a {} value",
        expected.name(),
        found.type_code().name()
    ))
}

/// Table of serializers keyed by type code.
pub struct TypeRegistry {
    slots: Vec<Option<Arc<dyn TypeSerializer>>>,
}

impl TypeRegistry {
    /// Empty registry.
    pub fn empty() -> Self {
        Self {
            slots: (0..=u8::MAX).map(|_| None).collect(),
        }
    }

    /// Registry with every built-in serializer.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        for serializer in serializers::defaults() {
            registry.register(serializer);
        }
        registry
    }

    /// Add or replace the serializer for its code.
    pub fn register(&mut self, serializer: Arc<dyn TypeSerializer>) -> &mut Self {
        let code = serializer.type_code().as_u8() as usize;
        self.slots[code] = Some(serializer);
        self
    }

    /// Serializer for `code`.
    pub fn get(&self, code: TypeCode) -> Result<&Arc<dyn TypeSerializer>> {
        self.slots[code.as_u8() as usize]
            .as_ref()
            .ok_or(WireError::SerializerNotFound(code.name()))
    }

    /// Whether a serializer is registered for `code`.
    pub fn contains(&self, code: TypeCode) -> bool {
        self.slots[code.as_u8() as usize].is_some()
    }

    /// Number of registered serializers.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let codes: Vec<TypeCode> = self
            .slots
            .iter()
            .flatten()
            .map(|s| s.type_code())
            .collect();
        f.debug_struct("TypeRegistry").field("codes", &codes).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_every_concrete_kind() {
        let registry = TypeRegistry::with_defaults();
        for code in TypeCode::ALL {
            if code == TypeCode::UnspecifiedNull {
                assert!(!registry.contains(code));
            } else {
                assert!(registry.contains(code), "missing {code}");
            }
        }
        assert_eq!(registry.len(), TypeCode::ALL.len() - 1);
    }

    #[test]
    fn test_empty_registry_lookup_fails() {
        let registry = TypeRegistry::empty();
        assert!(registry.is_empty());
        let err = registry.get(TypeCode::Int).err().unwrap();
        assert!(matches!(err, WireError::SerializerNotFound("Int")));
    }

    #[test]
    fn test_register_replaces() {
        struct Shouting;
        impl TypeSerializer for Shouting {
            fn type_code(&self) -> TypeCode {
                TypeCode::String
            }
            fn read_value(&self, buf: &mut Buffer, _: &GraphBinaryReader) -> Result<Value> {
                Ok(Value::String(
                    super::super::primitive::read_string(buf)?.to_uppercase(),
                ))
            }
            fn write_value(
                &self,
                value: &Value,
                buf: &mut Buffer,
                _: &GraphBinaryWriter,
            ) -> Result<()> {
                let s = value.as_str().ok_or_else(|| mismatch(TypeCode::String, value))?;
                super::super::primitive::write_string(buf, s)
            }
        }

        let mut registry = TypeRegistry::with_defaults();
        let before = registry.len();
        registry.register(Arc::new(Shouting));
        assert_eq!(registry.len(), before);

        let registry = Arc::new(registry);
        let writer = GraphBinaryWriter::new(registry.clone());
        let reader = GraphBinaryReader::new(registry);
        let mut buf = Buffer::new();
        writer.write(&Value::from("quiet"), &mut buf).unwrap();
        assert_eq!(reader.read(&mut buf).unwrap(), Value::from("QUIET"));
    }
}
