//! Protobuf-like schema language and dynamic wire codec.
//!
//! The registry holds message definitions parsed from a restricted proto3
//! subset; the encoder and decoder walk a dynamic tagged-value tree against
//! those definitions at runtime, so no code generation is involved.

pub mod decoder;
pub mod encoder;
pub mod parser;
pub mod schema;
pub mod value;
pub mod wire;

pub use decoder::{decode_message, DecodeError};
pub use encoder::{encode_message, EncodeError};
pub use parser::{parse_schema, ParseError};
pub use schema::{FieldDef, Label, MessageDef, ScalarType, TypeResolver};
pub use value::Value;
pub use wire::{WireError, WireType};
