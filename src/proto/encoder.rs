//! Schema-driven encoding of a tagged value tree.

use thiserror::Error;

use crate::proto::schema::{FieldDef, MessageDef, ScalarType, TypeResolver};
use crate::proto::value::Value;
use crate::proto::wire::{self, WireType};

/// Errors fatal to a single encode attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("top-level value must be a message")]
    InvalidTopLevelType,

    #[error("value for field '{field}' (tag {tag}) does not match its declared type")]
    TypeMismatch { field: String, tag: u32 },

    #[error("unknown message type '{0}'")]
    UnknownMessageType(String),

    #[error("field '{0}' has message type but no type name")]
    MissingTypeName(String),
}

/// Encode `value` against `def`, appending to `buf`. Returns bytes written.
///
/// Tags present in the value tree but absent from the schema are silently
/// dropped. Repeated fields emit one tag/value record per element.
pub fn encode_message(
    value: &Value,
    def: &MessageDef,
    resolver: &dyn TypeResolver,
    buf: &mut Vec<u8>,
) -> Result<usize, EncodeError> {
    let Value::Message(fields) = value else {
        return Err(EncodeError::InvalidTopLevelType);
    };

    let start = buf.len();
    for (tag, field_value) in fields {
        let Some(field) = def.field(*tag) else {
            continue;
        };

        match field_value {
            Value::Repeated(elements) => {
                for element in elements {
                    encode_field(element, field, resolver, buf)?;
                }
            }
            single => encode_field(single, field, resolver, buf)?,
        }
    }

    Ok(buf.len() - start)
}

fn put_key(tag: u32, wire: WireType, buf: &mut Vec<u8>) {
    wire::put_varint(u64::from(tag) << 3 | wire as u64, buf);
}

fn encode_field(
    value: &Value,
    field: &FieldDef,
    resolver: &dyn TypeResolver,
    buf: &mut Vec<u8>,
) -> Result<(), EncodeError> {
    let mismatch = || EncodeError::TypeMismatch {
        field: field.name.clone(),
        tag: field.tag,
    };

    match field.scalar.wire_type() {
        WireType::Varint => {
            let v = value.as_varint().ok_or_else(mismatch)?;
            put_key(field.tag, WireType::Varint, buf);
            wire::put_varint(v, buf);
        }
        WireType::Fixed64 => {
            let v = value.as_fixed64().ok_or_else(mismatch)?;
            put_key(field.tag, WireType::Fixed64, buf);
            wire::put_fixed64(v, buf);
        }
        WireType::Fixed32 => {
            let v = value.as_fixed32().ok_or_else(mismatch)?;
            put_key(field.tag, WireType::Fixed32, buf);
            wire::put_fixed32(v, buf);
        }
        WireType::LengthDelimited => {
            if field.scalar == ScalarType::Message {
                let type_name = field
                    .type_name
                    .as_deref()
                    .ok_or_else(|| EncodeError::MissingTypeName(field.name.clone()))?;
                let nested_def = resolver
                    .resolve(type_name)
                    .ok_or_else(|| EncodeError::UnknownMessageType(type_name.to_string()))?;

                // Nested messages go through a scratch buffer so the length
                // prefix can be written before the body.
                let mut scratch = Vec::new();
                encode_message(value, nested_def, resolver, &mut scratch)?;

                put_key(field.tag, WireType::LengthDelimited, buf);
                wire::put_len_prefixed(&scratch, buf);
            } else {
                let bytes = value.as_bytes().ok_or_else(mismatch)?;
                put_key(field.tag, WireType::LengthDelimited, buf);
                wire::put_len_prefixed(bytes, buf);
            }
        }
    }

    Ok(())
}
