//! Values carried by the binary codec.
//!
//! [`Value`] is the dynamic value model: scalars, containers, and graph
//! structural types. Graph elements are reference-style, meaning they carry an
//! identifier, a label, and whatever property subset the producer chose to
//! attach. Owner elements are never carried on the wire.

use bytes::Bytes;
use uuid::Uuid;

use crate::codec::TypeCode;

/// A dynamically typed value.
///
/// Equality is structural. Floats compare with IEEE semantics, so a value
/// holding NaN is not equal to itself; compare bit patterns when that
/// matters.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absent value of unspecified type.
    Null,
    Boolean(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    /// A single Unicode scalar value.
    Char(char),
    String(String),
    Uuid(Uuid),
    /// Milliseconds since the Unix epoch.
    Date(i64),
    /// Milliseconds since the Unix epoch.
    Timestamp(i64),
    /// Signed duration split into whole seconds and a nanosecond adjustment.
    Duration {
        seconds: i64,
        nanos: i32,
    },
    /// Fully qualified class name of a host-language type.
    Class(String),
    ByteBuffer(Bytes),
    List(Vec<Value>),
    /// Set semantics are the producer's concern; order is preserved as received.
    Set(Vec<Value>),
    /// Key/value pairs in insertion order.
    Map(Vec<(Value, Value)>),
    /// A lone map entry. Has no standalone encoding and is written as a
    /// single-entry map.
    MapEntry(Box<(Value, Value)>),
    Vertex(Box<Vertex>),
    Edge(Box<Edge>),
    VertexProperty(Box<VertexProperty>),
    Property(Box<Property>),
    Path(Box<Path>),
    Traverser(Box<Traverser>),
    /// Items paired with their multiplicity.
    BulkSet(Vec<(Value, i64)>),
}

impl Value {
    /// Wire type code for this value's kind.
    pub fn type_code(&self) -> TypeCode {
        match self {
            Value::Null => TypeCode::UnspecifiedNull,
            Value::Boolean(_) => TypeCode::Boolean,
            Value::Byte(_) => TypeCode::Byte,
            Value::Short(_) => TypeCode::Short,
            Value::Int(_) => TypeCode::Int,
            Value::Long(_) => TypeCode::Long,
            Value::Float(_) => TypeCode::Float,
            Value::Double(_) => TypeCode::Double,
            Value::Char(_) => TypeCode::Char,
            Value::String(_) => TypeCode::String,
            Value::Uuid(_) => TypeCode::Uuid,
            Value::Date(_) => TypeCode::Date,
            Value::Timestamp(_) => TypeCode::Timestamp,
            Value::Duration { .. } => TypeCode::Duration,
            Value::Class(_) => TypeCode::Class,
            Value::ByteBuffer(_) => TypeCode::ByteBuffer,
            Value::List(_) => TypeCode::List,
            Value::Set(_) => TypeCode::Set,
            Value::Map(_) => TypeCode::Map,
            Value::MapEntry(_) => TypeCode::MapEntry,
            Value::Vertex(_) => TypeCode::Vertex,
            Value::Edge(_) => TypeCode::Edge,
            Value::VertexProperty(_) => TypeCode::VertexProperty,
            Value::Property(_) => TypeCode::Property,
            Value::Path(_) => TypeCode::Path,
            Value::Traverser(_) => TypeCode::Traverser,
            Value::BulkSet(_) => TypeCode::BulkSet,
        }
    }

    /// Whether this is [`Value::Null`].
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Borrow the string payload, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integral value widened to `i64`, if this is an integral kind.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Byte(v) => Some(i64::from(*v)),
            Value::Short(v) => Some(i64::from(*v)),
            Value::Int(v) => Some(i64::from(*v)),
            Value::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric value widened to `f64`, if this is a numeric kind.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(f64::from(*v)),
            Value::Double(v) => Some(*v),
            other => other.as_i64().map(|v| v as f64),
        }
    }

    /// Build a map entry value.
    pub fn entry(key: impl Into<Value>, value: impl Into<Value>) -> Self {
        Value::MapEntry(Box::new((key.into(), value.into())))
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_from! {
    bool => Boolean,
    i8 => Byte,
    i16 => Short,
    i32 => Int,
    i64 => Long,
    f32 => Float,
    f64 => Double,
    char => Char,
    String => String,
    Uuid => Uuid,
    Bytes => ByteBuffer,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl From<Vertex> for Value {
    fn from(v: Vertex) -> Self {
        Value::Vertex(Box::new(v))
    }
}

impl From<Edge> for Value {
    fn from(v: Edge) -> Self {
        Value::Edge(Box::new(v))
    }
}

impl From<VertexProperty> for Value {
    fn from(v: VertexProperty) -> Self {
        Value::VertexProperty(Box::new(v))
    }
}

impl From<Property> for Value {
    fn from(v: Property) -> Self {
        Value::Property(Box::new(v))
    }
}

impl From<Path> for Value {
    fn from(v: Path) -> Self {
        Value::Path(Box::new(v))
    }
}

impl From<Traverser> for Value {
    fn from(v: Traverser) -> Self {
        Value::Traverser(Box::new(v))
    }
}

/// Identifier and label of an element referenced by another element.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementRef {
    pub id: Value,
    pub label: String,
}

impl ElementRef {
    pub fn new(id: impl Into<Value>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

/// Reference vertex.
#[derive(Debug, Clone, PartialEq)]
pub struct Vertex {
    pub id: Value,
    pub label: String,
    /// Attached property subset. Empty is written as null.
    pub properties: Vec<VertexProperty>,
}

impl Vertex {
    pub fn new(id: impl Into<Value>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            properties: Vec::new(),
        }
    }

    pub fn with_property(mut self, property: VertexProperty) -> Self {
        self.properties.push(property);
        self
    }
}

/// Reference edge.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub id: Value,
    pub label: String,
    pub in_v: ElementRef,
    pub out_v: ElementRef,
    /// Attached property subset. Empty is written as null.
    pub properties: Vec<Property>,
}

impl Edge {
    pub fn new(
        id: impl Into<Value>,
        label: impl Into<String>,
        out_v: ElementRef,
        in_v: ElementRef,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            in_v,
            out_v,
            properties: Vec::new(),
        }
    }

    pub fn with_property(mut self, property: Property) -> Self {
        self.properties.push(property);
        self
    }
}

/// Vertex property with optional meta-properties.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexProperty {
    pub id: Value,
    pub label: String,
    pub value: Value,
    /// Meta-properties. Empty is written as null.
    pub properties: Vec<Property>,
}

impl VertexProperty {
    pub fn new(id: impl Into<Value>, label: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            value: value.into(),
            properties: Vec::new(),
        }
    }
}

/// Key/value property of an edge or vertex property.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub key: String,
    pub value: Value,
}

impl Property {
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Walk through the graph: one label set per step, one object per step.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Path {
    pub labels: Vec<Vec<String>>,
    pub objects: Vec<Value>,
}

impl Path {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step.
    pub fn extend(mut self, object: impl Into<Value>, labels: &[&str]) -> Self {
        self.objects.push(object.into());
        self.labels
            .push(labels.iter().map(|l| (*l).to_owned()).collect());
        self
    }
}

/// A value with its bulk count.
#[derive(Debug, Clone, PartialEq)]
pub struct Traverser {
    pub bulk: i64,
    pub value: Value,
}

impl Traverser {
    pub fn new(value: impl Into<Value>, bulk: i64) -> Self {
        Self {
            bulk,
            value: value.into(),
        }
    }
}
