//! Scalar kinds: fixed-width numbers, strings, and other leaf values.

use bytes::Bytes;

use crate::buffer::Buffer;
use crate::codec::context::{GraphBinaryReader, GraphBinaryWriter};
use crate::codec::primitive::{
    read_char, read_length, read_string, read_uuid, write_char, write_length, write_string,
    write_uuid,
};
use crate::codec::registry::{mismatch, TypeSerializer};
use crate::codec::type_code::TypeCode;
use crate::error::Result;
use crate::structure::Value;

macro_rules! fixed_width_serializer {
    ($(#[$doc:meta])* $name:ident, $code:ident, $variant:ident, $read:ident, $write:ident) => {
        $(#[$doc])*
        #[derive(Debug, Default, Clone, Copy)]
        pub struct $name;

        impl TypeSerializer for $name {
            fn type_code(&self) -> TypeCode {
                TypeCode::$code
            }

            fn read_value(&self, buf: &mut Buffer, _: &GraphBinaryReader) -> Result<Value> {
                Ok(Value::$variant(buf.$read()?))
            }

            fn write_value(
                &self,
                value: &Value,
                buf: &mut Buffer,
                _: &GraphBinaryWriter,
            ) -> Result<()> {
                match value {
                    Value::$variant(v) => {
                        buf.$write(*v)?;
                        Ok(())
                    }
                    other => Err(mismatch(TypeCode::$code, other)),
                }
            }
        }
    };
}

fixed_width_serializer!(
    /// `<i32>`
    IntSerializer, Int, Int, read_int, write_int
);
fixed_width_serializer!(
    /// `<i64>`
    LongSerializer, Long, Long, read_long, write_long
);
fixed_width_serializer!(
    /// `<i16>`
    ShortSerializer, Short, Short, read_short, write_short
);
fixed_width_serializer!(
    /// `<i8>`
    ByteSerializer, Byte, Byte, read_byte, write_byte
);
fixed_width_serializer!(
    /// `<u8>`, 0 is false.
    BooleanSerializer, Boolean, Boolean, read_bool, write_bool
);
fixed_width_serializer!(
    /// IEEE-754 single precision bits.
    FloatSerializer, Float, Float, read_float, write_float
);
fixed_width_serializer!(
    /// IEEE-754 double precision bits.
    DoubleSerializer, Double, Double, read_double, write_double
);
fixed_width_serializer!(
    /// Epoch millis as `<i64>`.
    DateSerializer, Date, Date, read_long, write_long
);
fixed_width_serializer!(
    /// Epoch millis as `<i64>`.
    TimestampSerializer, Timestamp, Timestamp, read_long, write_long
);

/// `<i32 byteLen><utf8>`
#[derive(Debug, Default, Clone, Copy)]
pub struct StringSerializer;

impl TypeSerializer for StringSerializer {
    fn type_code(&self) -> TypeCode {
        TypeCode::String
    }

    fn read_value(&self, buf: &mut Buffer, _: &GraphBinaryReader) -> Result<Value> {
        Ok(Value::String(read_string(buf)?))
    }

    fn write_value(&self, value: &Value, buf: &mut Buffer, _: &GraphBinaryWriter) -> Result<()> {
        match value {
            Value::String(s) => write_string(buf, s),
            other => Err(mismatch(TypeCode::String, other)),
        }
    }
}

/// Class name as a bare string.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClassSerializer;

impl TypeSerializer for ClassSerializer {
    fn type_code(&self) -> TypeCode {
        TypeCode::Class
    }

    fn read_value(&self, buf: &mut Buffer, _: &GraphBinaryReader) -> Result<Value> {
        Ok(Value::Class(read_string(buf)?))
    }

    fn write_value(&self, value: &Value, buf: &mut Buffer, _: &GraphBinaryWriter) -> Result<()> {
        match value {
            Value::Class(s) => write_string(buf, s),
            other => Err(mismatch(TypeCode::Class, other)),
        }
    }
}

/// 16 bytes, most significant half first.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidSerializer;

impl TypeSerializer for UuidSerializer {
    fn type_code(&self) -> TypeCode {
        TypeCode::Uuid
    }

    fn read_value(&self, buf: &mut Buffer, _: &GraphBinaryReader) -> Result<Value> {
        Ok(Value::Uuid(read_uuid(buf)?))
    }

    fn write_value(&self, value: &Value, buf: &mut Buffer, _: &GraphBinaryWriter) -> Result<()> {
        match value {
            Value::Uuid(id) => write_uuid(buf, id),
            other => Err(mismatch(TypeCode::Uuid, other)),
        }
    }
}

/// One UTF-8 encoded scalar value.
#[derive(Debug, Default, Clone, Copy)]
pub struct CharSerializer;

impl TypeSerializer for CharSerializer {
    fn type_code(&self) -> TypeCode {
        TypeCode::Char
    }

    fn read_value(&self, buf: &mut Buffer, _: &GraphBinaryReader) -> Result<Value> {
        Ok(Value::Char(read_char(buf)?))
    }

    fn write_value(&self, value: &Value, buf: &mut Buffer, _: &GraphBinaryWriter) -> Result<()> {
        match value {
            Value::Char(c) => write_char(buf, *c),
            other => Err(mismatch(TypeCode::Char, other)),
        }
    }
}

/// `<i64 seconds><i32 nanos>`
#[derive(Debug, Default, Clone, Copy)]
pub struct DurationSerializer;

impl TypeSerializer for DurationSerializer {
    fn type_code(&self) -> TypeCode {
        TypeCode::Duration
    }

    fn read_value(&self, buf: &mut Buffer, _: &GraphBinaryReader) -> Result<Value> {
        let seconds = buf.read_long()?;
        let nanos = buf.read_int()?;
        Ok(Value::Duration { seconds, nanos })
    }

    fn write_value(&self, value: &Value, buf: &mut Buffer, _: &GraphBinaryWriter) -> Result<()> {
        match value {
            Value::Duration { seconds, nanos } => {
                buf.write_long(*seconds)?;
                buf.write_int(*nanos)?;
                Ok(())
            }
            other => Err(mismatch(TypeCode::Duration, other)),
        }
    }
}

/// `<i32 len><bytes>`
#[derive(Debug, Default, Clone, Copy)]
pub struct ByteBufferSerializer;

impl TypeSerializer for ByteBufferSerializer {
    fn type_code(&self) -> TypeCode {
        TypeCode::ByteBuffer
    }

    fn read_value(&self, buf: &mut Buffer, _: &GraphBinaryReader) -> Result<Value> {
        let length = read_length(buf, "byte buffer", 1)?;
        Ok(Value::ByteBuffer(Bytes::from(buf.read_vec(length)?)))
    }

    fn write_value(&self, value: &Value, buf: &mut Buffer, _: &GraphBinaryWriter) -> Result<()> {
        match value {
            Value::ByteBuffer(bytes) => {
                write_length(buf, bytes.len())?;
                buf.write_bytes(bytes)?;
                Ok(())
            }
            other => Err(mismatch(TypeCode::ByteBuffer, other)),
        }
    }
}
