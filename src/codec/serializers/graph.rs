//! Graph structural kinds, written reference-style.
//!
//! Elements carry their identifier, label, and attached property subset.
//! Slots that would hold an owner element are written as null and skipped
//! on read, whatever they contain.

use crate::buffer::Buffer;
use crate::codec::context::{GraphBinaryReader, GraphBinaryWriter};
use crate::codec::primitive::{read_string, write_length, write_string};
use crate::codec::registry::{mismatch, TypeSerializer};
use crate::codec::type_code::{value_flags, TypeCode};
use crate::error::{Result, WireError};
use crate::structure::{
    Edge, ElementRef, Path, Property, Traverser, Value, Vertex, VertexProperty,
};

fn write_null(buf: &mut Buffer) -> Result<()> {
    buf.write_u8(TypeCode::UnspecifiedNull.as_u8())?;
    buf.write_u8(value_flags::NULL)?;
    Ok(())
}

/// Consume the owner placeholder.
fn skip_parent(buf: &mut Buffer, reader: &GraphBinaryReader) -> Result<()> {
    reader.read(buf)?;
    Ok(())
}

/// Write `items` as a fully-qualified list of `code` elements, or null when empty.
fn write_element_list<T>(
    buf: &mut Buffer,
    items: &[T],
    code: TypeCode,
    mut write_item: impl FnMut(&T, &mut Buffer) -> Result<()>,
) -> Result<()> {
    if items.is_empty() {
        return write_null(buf);
    }
    buf.write_u8(TypeCode::List.as_u8())?;
    buf.write_u8(value_flags::NONE)?;
    write_length(buf, items.len())?;
    for item in items {
        buf.write_u8(code.as_u8())?;
        buf.write_u8(value_flags::NONE)?;
        write_item(item, buf)?;
    }
    Ok(())
}

/// Read a fully-qualified list (or null) and unwrap each element.
fn read_element_list<T>(
    buf: &mut Buffer,
    reader: &GraphBinaryReader,
    what: &str,
    mut unwrap_item: impl FnMut(Value) -> Option<T>,
) -> Result<Vec<T>> {
    match reader.read(buf)? {
        Value::Null => Ok(Vec::new()),
        Value::List(items) => items
            .into_iter()
            .map(|item| {
                let kind = item.type_code();
                unwrap_item(item).ok_or_else(|| {
                    WireError::serialization(format!("expected {what} but found {}", kind.name()))
                })
            })
            .collect(),
        other => Err(WireError::serialization(format!(
            "expected a list of {what} but found {}",
            other.type_code().name()
        ))),
    }
}

fn read_properties(buf: &mut Buffer, reader: &GraphBinaryReader) -> Result<Vec<Property>> {
    read_element_list(buf, reader, "Property", |item| match item {
        Value::Property(p) => Some(*p),
        _ => None,
    })
}

fn write_properties(buf: &mut Buffer, writer: &GraphBinaryWriter, props: &[Property]) -> Result<()> {
    write_element_list(buf, props, TypeCode::Property, |p, buf| {
        write_property(p, buf, writer)
    })
}

fn write_property(property: &Property, buf: &mut Buffer, writer: &GraphBinaryWriter) -> Result<()> {
    write_string(buf, &property.key)?;
    writer.write(&property.value, buf)?;
    write_null(buf)
}

fn write_vertex_property(
    vp: &VertexProperty,
    buf: &mut Buffer,
    writer: &GraphBinaryWriter,
) -> Result<()> {
    writer.write(&vp.id, buf)?;
    write_string(buf, &vp.label)?;
    writer.write(&vp.value, buf)?;
    write_null(buf)?;
    write_properties(buf, writer, &vp.properties)
}

/// `<bare String key><value><null parent>`
#[derive(Debug, Default, Clone, Copy)]
pub struct PropertySerializer;

impl TypeSerializer for PropertySerializer {
    fn type_code(&self) -> TypeCode {
        TypeCode::Property
    }

    fn read_value(&self, buf: &mut Buffer, reader: &GraphBinaryReader) -> Result<Value> {
        let key = read_string(buf)?;
        let value = reader.read(buf)?;
        skip_parent(buf, reader)?;
        Ok(Property { key, value }.into())
    }

    fn write_value(&self, value: &Value, buf: &mut Buffer, writer: &GraphBinaryWriter) -> Result<()> {
        match value {
            Value::Property(p) => write_property(p, buf, writer),
            other => Err(mismatch(TypeCode::Property, other)),
        }
    }
}

/// `<id><bare String label><value><null parent><List<Property> or null>`
#[derive(Debug, Default, Clone, Copy)]
pub struct VertexPropertySerializer;

impl TypeSerializer for VertexPropertySerializer {
    fn type_code(&self) -> TypeCode {
        TypeCode::VertexProperty
    }

    fn read_value(&self, buf: &mut Buffer, reader: &GraphBinaryReader) -> Result<Value> {
        let id = reader.read(buf)?;
        let label = read_string(buf)?;
        let value = reader.read(buf)?;
        skip_parent(buf, reader)?;
        let properties = read_properties(buf, reader)?;
        Ok(VertexProperty {
            id,
            label,
            value,
            properties,
        }
        .into())
    }

    fn write_value(&self, value: &Value, buf: &mut Buffer, writer: &GraphBinaryWriter) -> Result<()> {
        match value {
            Value::VertexProperty(vp) => write_vertex_property(vp, buf, writer),
            other => Err(mismatch(TypeCode::VertexProperty, other)),
        }
    }
}

/// `<id><bare String label><List<VertexProperty> or null>`
#[derive(Debug, Default, Clone, Copy)]
pub struct VertexSerializer;

impl TypeSerializer for VertexSerializer {
    fn type_code(&self) -> TypeCode {
        TypeCode::Vertex
    }

    fn read_value(&self, buf: &mut Buffer, reader: &GraphBinaryReader) -> Result<Value> {
        let id = reader.read(buf)?;
        let label = read_string(buf)?;
        let properties = read_element_list(buf, reader, "VertexProperty", |item| match item {
            Value::VertexProperty(vp) => Some(*vp),
            _ => None,
        })?;
        Ok(Vertex {
            id,
            label,
            properties,
        }
        .into())
    }

    fn write_value(&self, value: &Value, buf: &mut Buffer, writer: &GraphBinaryWriter) -> Result<()> {
        let Value::Vertex(vertex) = value else {
            return Err(mismatch(TypeCode::Vertex, value));
        };
        writer.write(&vertex.id, buf)?;
        write_string(buf, &vertex.label)?;
        write_element_list(buf, &vertex.properties, TypeCode::VertexProperty, |vp, buf| {
            write_vertex_property(vp, buf, writer)
        })
    }
}

/// `<id><bare String label><inV id><bare String inV label><outV id>
/// <bare String outV label><null parent><List<Property> or null>`
#[derive(Debug, Default, Clone, Copy)]
pub struct EdgeSerializer;

impl TypeSerializer for EdgeSerializer {
    fn type_code(&self) -> TypeCode {
        TypeCode::Edge
    }

    fn read_value(&self, buf: &mut Buffer, reader: &GraphBinaryReader) -> Result<Value> {
        let id = reader.read(buf)?;
        let label = read_string(buf)?;
        let in_v = ElementRef {
            id: reader.read(buf)?,
            label: read_string(buf)?,
        };
        let out_v = ElementRef {
            id: reader.read(buf)?,
            label: read_string(buf)?,
        };
        skip_parent(buf, reader)?;
        let properties = read_properties(buf, reader)?;
        Ok(Edge {
            id,
            label,
            in_v,
            out_v,
            properties,
        }
        .into())
    }

    fn write_value(&self, value: &Value, buf: &mut Buffer, writer: &GraphBinaryWriter) -> Result<()> {
        let Value::Edge(edge) = value else {
            return Err(mismatch(TypeCode::Edge, value));
        };
        writer.write(&edge.id, buf)?;
        write_string(buf, &edge.label)?;
        writer.write(&edge.in_v.id, buf)?;
        write_string(buf, &edge.in_v.label)?;
        writer.write(&edge.out_v.id, buf)?;
        write_string(buf, &edge.out_v.label)?;
        write_null(buf)?;
        write_properties(buf, writer, &edge.properties)
    }
}

/// `<List<Set<String>> labels><List objects>`
#[derive(Debug, Default, Clone, Copy)]
pub struct PathSerializer;

impl TypeSerializer for PathSerializer {
    fn type_code(&self) -> TypeCode {
        TypeCode::Path
    }

    fn read_value(&self, buf: &mut Buffer, reader: &GraphBinaryReader) -> Result<Value> {
        let labels = read_element_list(buf, reader, "Set", |item| match item {
            Value::Set(labels) => labels
                .into_iter()
                .map(|l| match l {
                    Value::String(s) => Some(s),
                    _ => None,
                })
                .collect(),
            _ => None,
        })?;
        let objects = match reader.read(buf)? {
            Value::List(objects) => objects,
            Value::Null => Vec::new(),
            other => return Err(mismatch(TypeCode::List, &other)),
        };
        if labels.len() != objects.len() {
            return Err(WireError::serialization(format!(
                "path has {} label sets for {} objects",
                labels.len(),
                objects.len()
            )));
        }
        Ok(Path { labels, objects }.into())
    }

    fn write_value(&self, value: &Value, buf: &mut Buffer, writer: &GraphBinaryWriter) -> Result<()> {
        let Value::Path(path) = value else {
            return Err(mismatch(TypeCode::Path, value));
        };
        // Labels always go out as a list, even when empty.
        buf.write_u8(TypeCode::List.as_u8())?;
        buf.write_u8(value_flags::NONE)?;
        write_length(buf, path.labels.len())?;
        for step in &path.labels {
            buf.write_u8(TypeCode::Set.as_u8())?;
            buf.write_u8(value_flags::NONE)?;
            write_length(buf, step.len())?;
            for label in step {
                buf.write_u8(TypeCode::String.as_u8())?;
                buf.write_u8(value_flags::NONE)?;
                write_string(buf, label)?;
            }
        }
        buf.write_u8(TypeCode::List.as_u8())?;
        buf.write_u8(value_flags::NONE)?;
        write_length(buf, path.objects.len())?;
        for object in &path.objects {
            writer.write(object, buf)?;
        }
        Ok(())
    }
}

/// `<bare Long bulk><value>`
#[derive(Debug, Default, Clone, Copy)]
pub struct TraverserSerializer;

impl TypeSerializer for TraverserSerializer {
    fn type_code(&self) -> TypeCode {
        TypeCode::Traverser
    }

    fn read_value(&self, buf: &mut Buffer, reader: &GraphBinaryReader) -> Result<Value> {
        let bulk = buf.read_long()?;
        let value = reader.read(buf)?;
        Ok(Traverser { bulk, value }.into())
    }

    fn write_value(&self, value: &Value, buf: &mut Buffer, writer: &GraphBinaryWriter) -> Result<()> {
        match value {
            Value::Traverser(t) => {
                buf.write_long(t.bulk)?;
                writer.write(&t.value, buf)
            }
            other => Err(mismatch(TypeCode::Traverser, other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::context::GraphBinary;

    fn round_trip(value: &Value) -> Value {
        let codec = GraphBinary::default();
        let mut buf = Buffer::new();
        codec.writer.write(value, &mut buf).unwrap();
        let back = codec.reader.read(&mut buf).unwrap();
        assert_eq!(buf.readable_bytes(), 0);
        back
    }

    #[test]
    fn test_property_layout() {
        let codec = GraphBinary::default();
        let mut buf = Buffer::new();
        codec
            .writer
            .write(&Property::new("w", 1i32).into(), &mut buf)
            .unwrap();
        assert_eq!(
            &buf.nio_buffer().unwrap()[..],
            &[
                0x0F, 0x00, // property
                0x00, 0x00, 0x00, 0x01, b'w', // bare key
                0x01, 0x00, 0x00, 0x00, 0x00, 0x01, // value
                0xFE, 0x01, // parent
            ]
        );
    }

    #[test]
    fn test_property_parent_is_discarded() {
        let codec = GraphBinary::default();
        let mut buf = Buffer::wrap(&[
            0x0F, 0x00, 0x00, 0x00, 0x00, 0x01, b'w', 0x01, 0x00, 0x00, 0x00, 0x00, 0x01,
            // a non-null parent placeholder still gets consumed
            0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x07,
        ]);
        let value = codec.reader.read(&mut buf).unwrap();
        assert_eq!(value, Property::new("w", 1i32).into());
        assert_eq!(buf.readable_bytes(), 0);
    }

    #[test]
    fn test_vertex_round_trip() {
        let bare = Vertex::new(1i64, "person");
        assert_eq!(round_trip(&bare.clone().into()), bare.into());

        let mut name = VertexProperty::new(10i64, "name", "marko");
        name.properties.push(Property::new("since", 2006i32));
        let full = Vertex::new(1i64, "person").with_property(name);
        assert_eq!(round_trip(&full.clone().into()), full.into());
    }

    #[test]
    fn test_edge_round_trip() {
        let edge = Edge::new(
            7i32,
            "knows",
            ElementRef::new(1i64, "person"),
            ElementRef::new(2i64, "person"),
        )
        .with_property(Property::new("weight", 0.5f64));
        assert_eq!(round_trip(&edge.clone().into()), edge.into());
    }

    #[test]
    fn test_path_round_trip() {
        let path = Path::new()
            .extend(Vertex::new(1i64, "person"), &["a", "b"])
            .extend("marko", &[]);
        assert_eq!(round_trip(&path.clone().into()), path.into());
        assert_eq!(round_trip(&Path::new().into()), Path::new().into());
    }

    #[test]
    fn test_traverser_round_trip() {
        let t = Traverser::new("x", 3);
        assert_eq!(round_trip(&t.clone().into()), t.into());
    }

    #[test]
    fn test_vertex_with_wrong_property_kind_rejected() {
        let codec = GraphBinary::default();
        let mut buf = Buffer::new();
        buf.write_u8(TypeCode::Vertex.as_u8()).unwrap();
        buf.write_u8(0).unwrap();
        codec.writer.write(&Value::Int(1), &mut buf).unwrap();
        write_string(&mut buf, "v").unwrap();
        codec
            .writer
            .write(&Value::List(vec![Value::Int(5)]), &mut buf)
            .unwrap();
        let err = codec.reader.read(&mut buf).unwrap_err();
        assert!(err.to_string().contains("expected VertexProperty"));
    }
}
