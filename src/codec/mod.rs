//! Codec module - the type-tagged binary value format.
//!
//! Every value is written as `<TypeCode:1><ValueFlags:1><payload>`:
//!
//! - [`TypeCode`] identifies the value kind.
//! - [`value_flags`] carries the null bit; a null value has no payload.
//! - The payload layout belongs to the kind's [`TypeSerializer`].
//!
//! Container serializers that already know their element kind use the
//! *bare* form (payload only) via [`GraphBinaryReader::read_value`] and
//! [`GraphBinaryWriter::write_value`].
//!
//! # Example
//!
//! ```
//! use graphwire::buffer::Buffer;
//! use graphwire::codec::GraphBinary;
//! use graphwire::structure::Value;
//!
//! let codec = GraphBinary::default();
//! let mut buf = Buffer::new();
//!
//! codec.writer.write(&Value::Null, &mut buf).unwrap();
//! assert_eq!(&buf.nio_buffer().unwrap()[..], &[0xFE, 0x01]);
//!
//! assert_eq!(codec.reader.read(&mut buf).unwrap(), Value::Null);
//! ```

mod context;
mod primitive;
mod registry;
pub mod serializers;
mod type_code;

pub use context::{GraphBinary, GraphBinaryReader, GraphBinaryWriter, DEFAULT_MAX_DEPTH};
pub use primitive::{read_string, read_uuid, write_string, write_uuid};
pub use registry::{TypeRegistry, TypeSerializer};
pub use type_code::{value_flags, TypeCode};
