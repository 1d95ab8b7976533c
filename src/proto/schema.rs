//! Message and field definitions produced by the schema parser.

use std::collections::BTreeMap;

use crate::proto::wire::WireType;

/// Scalar field types of the schema language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    Double,
    Float,
    Int32,
    Int64,
    Uint32,
    Uint64,
    Fixed32,
    Fixed64,
    Bool,
    String,
    Bytes,
    /// Reference to another message type; the referenced name lives in
    /// [`FieldDef::type_name`].
    Message,
    Enum,
    Sfixed32,
    Sfixed64,
    Sint32,
    Sint64,
}

impl ScalarType {
    /// Map a type keyword to its scalar type. Unknown identifiers are user
    /// message types and handled by the parser.
    pub fn from_keyword(keyword: &str) -> Option<ScalarType> {
        match keyword {
            "double" => Some(ScalarType::Double),
            "float" => Some(ScalarType::Float),
            "int32" => Some(ScalarType::Int32),
            "int64" => Some(ScalarType::Int64),
            "uint32" => Some(ScalarType::Uint32),
            "uint64" => Some(ScalarType::Uint64),
            "fixed32" => Some(ScalarType::Fixed32),
            "fixed64" => Some(ScalarType::Fixed64),
            "bool" => Some(ScalarType::Bool),
            "string" => Some(ScalarType::String),
            "bytes" => Some(ScalarType::Bytes),
            "enum" => Some(ScalarType::Enum),
            "sfixed32" => Some(ScalarType::Sfixed32),
            "sfixed64" => Some(ScalarType::Sfixed64),
            "sint32" => Some(ScalarType::Sint32),
            "sint64" => Some(ScalarType::Sint64),
            _ => None,
        }
    }

    /// The wire type records of this scalar type use.
    pub fn wire_type(&self) -> WireType {
        match self {
            ScalarType::Double | ScalarType::Fixed64 | ScalarType::Sfixed64 => WireType::Fixed64,
            ScalarType::Float | ScalarType::Fixed32 | ScalarType::Sfixed32 => WireType::Fixed32,
            ScalarType::String | ScalarType::Bytes | ScalarType::Message => {
                WireType::LengthDelimited
            }
            _ => WireType::Varint,
        }
    }
}

/// Field label. Fields without an explicit label are optional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Label {
    #[default]
    Optional,
    Required,
    Repeated,
}

/// A single field of a message definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub name: String,
    pub tag: u32,
    pub scalar: ScalarType,
    pub label: Label,
    /// Referenced type name when `scalar` is `Message`, kept verbatim for
    /// resolution against the registry at encode/decode time.
    pub type_name: Option<String>,
}

/// A message definition: named, with fields ordered by tag, carrying the
/// verbatim source text of the file it was parsed from (needed for the
/// service discovery reply).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDef {
    pub name: String,
    pub fields: BTreeMap<u32, FieldDef>,
    pub source: String,
}

impl MessageDef {
    pub fn field(&self, tag: u32) -> Option<&FieldDef> {
        self.fields.get(&tag)
    }
}

/// Name-based lookup of message definitions. Message-typed fields are
/// resolved through this at encode/decode time, not at parse time, so
/// forward and self references work naturally.
pub trait TypeResolver {
    fn resolve(&self, name: &str) -> Option<&MessageDef>;
}

