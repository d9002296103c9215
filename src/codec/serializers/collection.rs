//! Container kinds. Elements are always fully qualified.

use crate::buffer::Buffer;
use crate::codec::context::{GraphBinaryReader, GraphBinaryWriter};
use crate::codec::primitive::{read_length, write_length};
use crate::codec::registry::{mismatch, TypeSerializer};
use crate::codec::type_code::TypeCode;
use crate::error::Result;
use crate::structure::Value;

/// Smallest encoded size of a fully-qualified value (code + flags).
const MIN_VALUE_WIDTH: usize = 2;

fn read_items(buf: &mut Buffer, reader: &GraphBinaryReader, what: &str) -> Result<Vec<Value>> {
    let count = read_length(buf, what, MIN_VALUE_WIDTH)?;
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        items.push(reader.read(buf)?);
    }
    Ok(items)
}

fn write_items(buf: &mut Buffer, writer: &GraphBinaryWriter, items: &[Value]) -> Result<()> {
    write_length(buf, items.len())?;
    for item in items {
        writer.write(item, buf)?;
    }
    Ok(())
}

/// `<i32 n><value>*`
#[derive(Debug, Default, Clone, Copy)]
pub struct ListSerializer;

impl TypeSerializer for ListSerializer {
    fn type_code(&self) -> TypeCode {
        TypeCode::List
    }

    fn read_value(&self, buf: &mut Buffer, reader: &GraphBinaryReader) -> Result<Value> {
        Ok(Value::List(read_items(buf, reader, "list")?))
    }

    fn write_value(&self, value: &Value, buf: &mut Buffer, writer: &GraphBinaryWriter) -> Result<()> {
        match value {
            Value::List(items) => write_items(buf, writer, items),
            other => Err(mismatch(TypeCode::List, other)),
        }
    }
}

/// `<i32 n><value>*`
#[derive(Debug, Default, Clone, Copy)]
pub struct SetSerializer;

impl TypeSerializer for SetSerializer {
    fn type_code(&self) -> TypeCode {
        TypeCode::Set
    }

    fn read_value(&self, buf: &mut Buffer, reader: &GraphBinaryReader) -> Result<Value> {
        Ok(Value::Set(read_items(buf, reader, "set")?))
    }

    fn write_value(&self, value: &Value, buf: &mut Buffer, writer: &GraphBinaryWriter) -> Result<()> {
        match value {
            Value::Set(items) => write_items(buf, writer, items),
            other => Err(mismatch(TypeCode::Set, other)),
        }
    }
}

/// `<i32 n>(<key><value>)*` in insertion order.
#[derive(Debug, Default, Clone, Copy)]
pub struct MapSerializer;

impl TypeSerializer for MapSerializer {
    fn type_code(&self) -> TypeCode {
        TypeCode::Map
    }

    fn read_value(&self, buf: &mut Buffer, reader: &GraphBinaryReader) -> Result<Value> {
        let count = read_length(buf, "map", 2 * MIN_VALUE_WIDTH)?;
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let key = reader.read(buf)?;
            let value = reader.read(buf)?;
            entries.push((key, value));
        }
        Ok(Value::Map(entries))
    }

    fn write_value(&self, value: &Value, buf: &mut Buffer, writer: &GraphBinaryWriter) -> Result<()> {
        match value {
            Value::Map(entries) => {
                write_length(buf, entries.len())?;
                for (key, value) in entries {
                    writer.write(key, buf)?;
                    writer.write(value, buf)?;
                }
                Ok(())
            }
            other => Err(mismatch(TypeCode::Map, other)),
        }
    }
}

/// `<i32 n>(<value><bare Long bulk>)*`
#[derive(Debug, Default, Clone, Copy)]
pub struct BulkSetSerializer;

impl TypeSerializer for BulkSetSerializer {
    fn type_code(&self) -> TypeCode {
        TypeCode::BulkSet
    }

    fn read_value(&self, buf: &mut Buffer, reader: &GraphBinaryReader) -> Result<Value> {
        let count = read_length(buf, "bulk set", MIN_VALUE_WIDTH + 8)?;
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            let item = reader.read(buf)?;
            let bulk = buf.read_long()?;
            items.push((item, bulk));
        }
        Ok(Value::BulkSet(items))
    }

    fn write_value(&self, value: &Value, buf: &mut Buffer, writer: &GraphBinaryWriter) -> Result<()> {
        match value {
            Value::BulkSet(items) => {
                write_length(buf, items.len())?;
                for (item, bulk) in items {
                    writer.write(item, buf)?;
                    buf.write_long(*bulk)?;
                }
                Ok(())
            }
            other => Err(mismatch(TypeCode::BulkSet, other)),
        }
    }
}
