//! Stable wire identifiers of value kinds.
//!
//! Every fully-qualified value starts with one of these codes followed by a
//! [`value_flags`] byte:
//!
//! ```text
//! ┌──────────┬────────────┬──────────────────┐
//! │ TypeCode │ ValueFlags │ payload          │
//! │ 1 byte   │ 1 byte     │ kind-specific    │
//! └──────────┴────────────┴──────────────────┘
//! ```

use crate::error::WireError;

/// 8-bit type code of a value kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TypeCode {
    Int = 0x01,
    Long = 0x02,
    String = 0x03,
    Date = 0x04,
    Timestamp = 0x05,
    Class = 0x06,
    Double = 0x07,
    Float = 0x08,
    List = 0x09,
    Map = 0x0A,
    Set = 0x0B,
    Uuid = 0x0C,
    Edge = 0x0D,
    Path = 0x0E,
    Property = 0x0F,
    Vertex = 0x11,
    VertexProperty = 0x12,
    Traverser = 0x21,
    Byte = 0x24,
    ByteBuffer = 0x25,
    Short = 0x26,
    Boolean = 0x27,
    BulkSet = 0x2A,
    Char = 0x80,
    Duration = 0x81,
    /// Private code of the container-only map entry. Never emitted.
    MapEntry = 0xF0,
    /// Null whose kind is not known to the writer.
    UnspecifiedNull = 0xFE,
}

impl TypeCode {
    /// All known codes.
    pub const ALL: [TypeCode; 27] = [
        TypeCode::Int,
        TypeCode::Long,
        TypeCode::String,
        TypeCode::Date,
        TypeCode::Timestamp,
        TypeCode::Class,
        TypeCode::Double,
        TypeCode::Float,
        TypeCode::List,
        TypeCode::Map,
        TypeCode::Set,
        TypeCode::Uuid,
        TypeCode::Edge,
        TypeCode::Path,
        TypeCode::Property,
        TypeCode::Vertex,
        TypeCode::VertexProperty,
        TypeCode::Traverser,
        TypeCode::Byte,
        TypeCode::ByteBuffer,
        TypeCode::Short,
        TypeCode::Boolean,
        TypeCode::BulkSet,
        TypeCode::Char,
        TypeCode::Duration,
        TypeCode::MapEntry,
        TypeCode::UnspecifiedNull,
    ];

    /// Look up a code read from the wire.
    pub fn from_u8(code: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| *c as u8 == code)
    }

    /// Raw byte value.
    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Human-readable kind name, used in error messages.
    pub fn name(self) -> &'static str {
        match self {
            TypeCode::Int => "Int",
            TypeCode::Long => "Long",
            TypeCode::String => "String",
            TypeCode::Date => "Date",
            TypeCode::Timestamp => "Timestamp",
            TypeCode::Class => "Class",
            TypeCode::Double => "Double",
            TypeCode::Float => "Float",
            TypeCode::List => "List",
            TypeCode::Map => "Map",
            TypeCode::Set => "Set",
            TypeCode::Uuid => "UUID",
            TypeCode::Edge => "Edge",
            TypeCode::Path => "Path",
            TypeCode::Property => "Property",
            TypeCode::Vertex => "Vertex",
            TypeCode::VertexProperty => "VertexProperty",
            TypeCode::Traverser => "Traverser",
            TypeCode::Byte => "Byte",
            TypeCode::ByteBuffer => "ByteBuffer",
            TypeCode::Short => "Short",
            TypeCode::Boolean => "Boolean",
            TypeCode::BulkSet => "BulkSet",
            TypeCode::Char => "Char",
            TypeCode::Duration => "Duration",
            TypeCode::MapEntry => "MapEntry",
            TypeCode::UnspecifiedNull => "UnspecifiedNull",
        }
    }
}

impl TryFrom<u8> for TypeCode {
    type Error = WireError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::from_u8(code).ok_or(WireError::UnknownTypeCode(code))
    }
}

impl std::fmt::Display for TypeCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}(0x{:02x})", self.name(), self.as_u8())
    }
}

/// ValueFlags bits.
///
/// Bit 0 marks null. Bit 1 is reserved for ordered collections and never
/// written. Readers look at bit 0 only.
pub mod value_flags {
    /// Flags byte of a present value.
    pub const NONE: u8 = 0x00;
    /// The value is null and its payload is omitted.
    pub const NULL: u8 = 0x01;
    /// Reserved: collection preserves insertion order.
    pub const ORDERED: u8 = 0x02;

    /// Check the null bit.
    #[inline]
    pub fn is_null(flags: u8) -> bool {
        flags & NULL != 0
    }
}
