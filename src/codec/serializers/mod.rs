//! Built-in serializers for every value kind.

mod collection;
mod graph;
mod map_entry;
mod scalar;

use std::sync::Arc;

use super::registry::TypeSerializer;

pub use collection::{BulkSetSerializer, ListSerializer, MapSerializer, SetSerializer};
pub use graph::{
    EdgeSerializer, PathSerializer, PropertySerializer, TraverserSerializer,
    VertexPropertySerializer, VertexSerializer,
};
pub use map_entry::MapEntrySerializer;
pub use scalar::{
    BooleanSerializer, ByteBufferSerializer, ByteSerializer, CharSerializer, ClassSerializer,
    DateSerializer, DoubleSerializer, DurationSerializer, FloatSerializer, IntSerializer,
    LongSerializer, ShortSerializer, StringSerializer, TimestampSerializer, UuidSerializer,
};

/// One instance of every built-in serializer.
pub(crate) fn defaults() -> Vec<Arc<dyn TypeSerializer>> {
    vec![
        Arc::new(IntSerializer),
        Arc::new(LongSerializer),
        Arc::new(StringSerializer),
        Arc::new(DateSerializer),
        Arc::new(TimestampSerializer),
        Arc::new(ClassSerializer),
        Arc::new(DoubleSerializer),
        Arc::new(FloatSerializer),
        Arc::new(ListSerializer),
        Arc::new(MapSerializer),
        Arc::new(SetSerializer),
        Arc::new(UuidSerializer),
        Arc::new(EdgeSerializer),
        Arc::new(PathSerializer),
        Arc::new(PropertySerializer),
        Arc::new(VertexSerializer),
        Arc::new(VertexPropertySerializer),
        Arc::new(TraverserSerializer),
        Arc::new(ByteSerializer),
        Arc::new(ByteBufferSerializer),
        Arc::new(ShortSerializer),
        Arc::new(BooleanSerializer),
        Arc::new(BulkSetSerializer),
        Arc::new(CharSerializer),
        Arc::new(DurationSerializer),
        Arc::new(MapEntrySerializer),
    ]
}
