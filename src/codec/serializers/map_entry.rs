//! Map entries only exist inside maps. A lone entry is written as a
//! single-entry map, and reading one standalone is a framing bug.

use crate::buffer::Buffer;
use crate::codec::context::{GraphBinaryReader, GraphBinaryWriter};
use crate::codec::registry::TypeSerializer;
use crate::codec::type_code::TypeCode;
use crate::error::{Result, WireError};
use crate::structure::Value;

#[derive(Debug, Default, Clone, Copy)]
pub struct MapEntrySerializer;

impl TypeSerializer for MapEntrySerializer {
    fn type_code(&self) -> TypeCode {
        TypeCode::MapEntry
    }

    fn read_value(&self, _: &mut Buffer, _: &GraphBinaryReader) -> Result<Value> {
        Err(WireError::ContainerOnly(
            "A map entry should not be read individually",
        ))
    }

    fn write_value(&self, _: &Value, _: &mut Buffer, _: &GraphBinaryWriter) -> Result<()> {
        Err(WireError::ContainerOnly(
            "A map entry should not be written individually",
        ))
    }

    fn transform(&self, value: &Value) -> Option<Value> {
        match value {
            Value::MapEntry(entry) => {
                let (key, value) = entry.as_ref().clone();
                Some(Value::Map(vec![(key, value)]))
            }
            _ => None,
        }
    }
}
