//! Schema-driven decoding of a wire stream into a tagged value tree.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::proto::schema::{Label, MessageDef, ScalarType, TypeResolver};
use crate::proto::value::Value;
use crate::proto::wire::{self, WireError, WireType};

/// Recursion limit for nested messages. Cyclic schemas resolve by name at
/// decode time, so runaway nesting must be cut off explicitly.
pub const MAX_DEPTH: usize = 100;

/// Decode errors. Reported per PUBLISH and logged by the broker; they never
/// stop message routing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("truncated input")]
    Truncated,

    #[error("varint overflow")]
    VarintOverflow,

    #[error("unsupported wire type {0}")]
    UnsupportedWireType(u8),

    #[error("unknown message type '{0}'")]
    UnknownMessageType(String),

    #[error("field '{0}' has message type but no type name")]
    MissingTypeName(String),

    #[error("nesting depth exceeds {MAX_DEPTH}")]
    DepthExceeded,
}

impl From<WireError> for DecodeError {
    fn from(err: WireError) -> Self {
        match err {
            WireError::Truncated(_) => DecodeError::Truncated,
            WireError::Overflow => DecodeError::VarintOverflow,
        }
    }
}

/// Decode `buf` as a message of type `def`.
///
/// Unknown tags are skipped according to their wire type. A known tag whose
/// wire type disagrees with the schema is skipped the same way, so a
/// mismatched field can never desynchronize the stream.
pub fn decode_message(
    buf: &[u8],
    def: &MessageDef,
    resolver: &dyn TypeResolver,
) -> Result<Value, DecodeError> {
    decode_at(buf, def, resolver, 0)
}

fn decode_at(
    buf: &[u8],
    def: &MessageDef,
    resolver: &dyn TypeResolver,
    depth: usize,
) -> Result<Value, DecodeError> {
    if depth > MAX_DEPTH {
        return Err(DecodeError::DepthExceeded);
    }

    let mut fields: BTreeMap<u32, Value> = BTreeMap::new();
    let mut pos = 0usize;

    while pos < buf.len() {
        let (key, key_len) = wire::get_varint(&buf[pos..])?;
        pos += key_len;

        let tag = (key >> 3) as u32;
        let wire_bits = (key & 0x07) as u8;
        let wire_type = WireType::from_tag_byte(wire_bits)
            .ok_or(DecodeError::UnsupportedWireType(wire_bits))?;

        let field = match def.field(tag) {
            Some(field) if field.scalar.wire_type() == wire_type => field,
            // Unknown tag, or declared type disagrees with the wire: skip.
            _ => {
                pos += skip_len(&buf[pos..], wire_type)?;
                continue;
            }
        };

        let value = match wire_type {
            WireType::Varint => {
                let (v, n) = wire::get_varint(&buf[pos..])?;
                pos += n;
                Value::Varint(v)
            }
            WireType::Fixed64 => {
                let v = wire::get_fixed64(&buf[pos..])?;
                pos += 8;
                Value::Fixed64(v)
            }
            WireType::Fixed32 => {
                let v = wire::get_fixed32(&buf[pos..])?;
                pos += 4;
                Value::Fixed32(v)
            }
            WireType::LengthDelimited => {
                let (bytes, n) = wire::get_len_prefixed(&buf[pos..])?;
                pos += n;
                if field.scalar == ScalarType::Message {
                    let type_name = field
                        .type_name
                        .as_deref()
                        .ok_or_else(|| DecodeError::MissingTypeName(field.name.clone()))?;
                    let nested_def = resolver
                        .resolve(type_name)
                        .ok_or_else(|| DecodeError::UnknownMessageType(type_name.to_string()))?;
                    decode_at(bytes, nested_def, resolver, depth + 1)?
                } else {
                    Value::Bytes(bytes.to_vec())
                }
            }
        };

        if field.label == Label::Repeated {
            match fields.get_mut(&tag) {
                Some(Value::Repeated(elements)) => elements.push(value),
                _ => {
                    fields.insert(tag, Value::Repeated(vec![value]));
                }
            }
        } else {
            // Non-repeated: last occurrence wins.
            fields.insert(tag, value);
        }
    }

    Ok(Value::Message(fields))
}

/// Size of an unknown record's payload, by wire type.
fn skip_len(buf: &[u8], wire_type: WireType) -> Result<usize, DecodeError> {
    match wire_type {
        WireType::Varint => {
            let (_, n) = wire::get_varint(buf)?;
            Ok(n)
        }
        WireType::Fixed64 => {
            if buf.len() < 8 {
                return Err(DecodeError::Truncated);
            }
            Ok(8)
        }
        WireType::Fixed32 => {
            if buf.len() < 4 {
                return Err(DecodeError::Truncated);
            }
            Ok(4)
        }
        WireType::LengthDelimited => {
            let (_, n) = wire::get_len_prefixed(buf)?;
            Ok(n)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::proto::encoder::{encode_message, EncodeError};
    use crate::proto::parser::parse_schema;

    /// Minimal resolver over parsed definitions.
    struct Defs(HashMap<String, MessageDef>);

    impl Defs {
        fn parse(source: &str) -> Defs {
            let mut map = HashMap::new();
            for def in parse_schema(source).unwrap() {
                map.insert(def.name.clone(), def);
            }
            Defs(map)
        }

        fn get(&self, name: &str) -> &MessageDef {
            &self.0[name]
        }
    }

    impl TypeResolver for Defs {
        fn resolve(&self, name: &str) -> Option<&MessageDef> {
            self.0.get(name)
        }
    }

    fn person_value() -> Value {
        let mut person = Value::message();
        person.set(1, Value::string("Alice"));
        person.set(2, Value::Varint(101));
        person.set(
            3,
            Value::Repeated(vec![Value::string("a@b.com"), Value::string("c@d.com")]),
        );
        person
    }

    const PERSON: &str =
        "message Person { string name = 1; int32 id = 2; repeated string emails = 3; }";

    #[test]
    fn person_wire_bytes() {
        let defs = Defs::parse(PERSON);
        let mut buf = Vec::new();
        encode_message(&person_value(), defs.get("Person"), &defs, &mut buf).unwrap();

        // field 1: key 0x0A, len 5, "Alice"; field 2: key 0x10, varint 101.
        assert_eq!(
            &buf[..9],
            &[0x0A, 0x05, b'A', b'l', b'i', b'c', b'e', 0x10, 0x65]
        );
    }

    #[test]
    fn person_roundtrip() {
        let defs = Defs::parse(PERSON);
        let value = person_value();

        let mut buf = Vec::new();
        encode_message(&value, defs.get("Person"), &defs, &mut buf).unwrap();
        let decoded = decode_message(&buf, defs.get("Person"), &defs).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn nested_message_roundtrip() {
        let defs = Defs::parse(
            "message Point { sint32 x = 1; sint32 y = 2; }
             message Line { Point from = 1; Point to = 2; string label = 3; }",
        );

        let mut from = Value::message();
        from.set(1, Value::Varint(3));
        from.set(2, Value::Varint(4));
        let mut to = Value::message();
        to.set(1, Value::Varint(30));
        to.set(2, Value::Varint(40));
        let mut line = Value::message();
        line.set(1, from);
        line.set(2, to);
        line.set(3, Value::string("diagonal"));

        let mut buf = Vec::new();
        encode_message(&line, defs.get("Line"), &defs, &mut buf).unwrap();
        let decoded = decode_message(&buf, defs.get("Line"), &defs).unwrap();
        assert_eq!(decoded, line);
    }

    #[test]
    fn fixed_width_fields_roundtrip() {
        let defs = Defs::parse(
            "message Mixed { double d = 1; float f = 2; fixed64 u = 3; sfixed32 s = 4; }",
        );
        let mut value = Value::message();
        value.set(1, Value::Fixed64(22.5f64.to_bits()));
        value.set(2, Value::Fixed32(1.25f32.to_bits()));
        value.set(3, Value::Fixed64(u64::MAX));
        value.set(4, Value::Fixed32(7));

        let mut buf = Vec::new();
        encode_message(&value, defs.get("Mixed"), &defs, &mut buf).unwrap();
        let decoded = decode_message(&buf, defs.get("Mixed"), &defs).unwrap();
        assert_eq!(decoded, value);
        assert_eq!(decoded.get(1).and_then(Value::as_f64), Some(22.5));
    }

    #[test]
    fn unknown_tags_are_skipped_on_decode() {
        // Writer schema has an extra field 4 the reader does not know.
        let writer = Defs::parse(
            "message Person { string name = 1; int32 id = 2; repeated string emails = 3; uint64 extra = 4; }",
        );
        let reader = Defs::parse(PERSON);

        let mut value = person_value();
        value.set(4, Value::Varint(99));

        let mut buf = Vec::new();
        encode_message(&value, writer.get("Person"), &writer, &mut buf).unwrap();

        let decoded = decode_message(&buf, reader.get("Person"), &reader).unwrap();
        assert_eq!(decoded, person_value());
    }

    #[test]
    fn unknown_tags_are_dropped_on_encode() {
        let defs = Defs::parse(PERSON);
        let mut value = person_value();
        value.set(9, Value::Varint(1));

        let mut with_unknown = Vec::new();
        encode_message(&value, defs.get("Person"), &defs, &mut with_unknown).unwrap();
        let mut without = Vec::new();
        encode_message(&person_value(), defs.get("Person"), &defs, &mut without).unwrap();
        assert_eq!(with_unknown, without);
    }

    #[test]
    fn top_level_must_be_message() {
        let defs = Defs::parse(PERSON);
        let mut buf = Vec::new();
        assert_eq!(
            encode_message(&Value::Varint(1), defs.get("Person"), &defs, &mut buf),
            Err(EncodeError::InvalidTopLevelType)
        );
    }

    #[test]
    fn type_mismatch_is_fatal_to_encode() {
        let defs = Defs::parse(PERSON);
        let mut value = Value::message();
        value.set(2, Value::string("not a number"));

        let mut buf = Vec::new();
        let err = encode_message(&value, defs.get("Person"), &defs, &mut buf).unwrap_err();
        assert!(matches!(err, EncodeError::TypeMismatch { tag: 2, .. }));
    }

    #[test]
    fn unresolved_reference_fails() {
        let defs = Defs::parse("message Holder { Missing inner = 1; }");
        let mut value = Value::message();
        value.set(1, Value::message());

        let mut buf = Vec::new();
        let err = encode_message(&value, defs.get("Holder"), &defs, &mut buf).unwrap_err();
        assert_eq!(err, EncodeError::UnknownMessageType("Missing".into()));
    }

    #[test]
    fn self_reference_hits_depth_limit() {
        let defs = Defs::parse("message Node { Node next = 1; uint32 id = 2; }");

        // Hand-build a wire stream nested past the limit: each level is
        // `key 0x0A, len, <nested>`.
        let mut buf = vec![0x10, 0x01]; // innermost: id = 1
        for _ in 0..(MAX_DEPTH + 2) {
            let mut outer = vec![0x0A];
            wire::put_varint(buf.len() as u64, &mut outer);
            outer.extend_from_slice(&buf);
            buf = outer;
        }

        assert_eq!(
            decode_message(&buf, defs.get("Node"), &defs),
            Err(DecodeError::DepthExceeded)
        );
    }

    #[test]
    fn shallow_self_reference_roundtrips() {
        let defs = Defs::parse("message Node { Node next = 1; uint32 id = 2; }");
        let mut inner = Value::message();
        inner.set(2, Value::Varint(2));
        let mut outer = Value::message();
        outer.set(1, inner);
        outer.set(2, Value::Varint(1));

        let mut buf = Vec::new();
        encode_message(&outer, defs.get("Node"), &defs, &mut buf).unwrap();
        let decoded = decode_message(&buf, defs.get("Node"), &defs).unwrap();
        assert_eq!(decoded, outer);
    }

    #[test]
    fn truncated_input_reports_truncation() {
        let defs = Defs::parse(PERSON);
        let mut buf = Vec::new();
        encode_message(&person_value(), defs.get("Person"), &defs, &mut buf).unwrap();

        let err = decode_message(&buf[..buf.len() - 2], defs.get("Person"), &defs).unwrap_err();
        assert_eq!(err, DecodeError::Truncated);
    }

    #[test]
    fn deprecated_group_wire_type_rejected() {
        let defs = Defs::parse(PERSON);
        // key with wire type 3 (group start).
        let buf = [0x0B];
        assert_eq!(
            decode_message(&buf, defs.get("Person"), &defs),
            Err(DecodeError::UnsupportedWireType(3))
        );
    }

    #[test]
    fn packed_numeric_field_is_skipped() {
        let defs = Defs::parse("message P { repeated uint32 values = 1; string tail = 2; }");
        // Length-delimited record at tag 1 (packed encoding) followed by a
        // normal string at tag 2: the packed record is skipped, the string
        // survives.
        let mut buf = Vec::new();
        wire::put_varint(1 << 3 | WireType::LengthDelimited as u64, &mut buf);
        wire::put_len_prefixed(&[0x01, 0x02, 0x03], &mut buf);
        wire::put_varint(2 << 3 | WireType::LengthDelimited as u64, &mut buf);
        wire::put_len_prefixed(b"ok", &mut buf);

        let decoded = decode_message(&buf, defs.get("P"), &defs).unwrap();
        assert!(decoded.get(1).is_none());
        assert_eq!(decoded.get(2).and_then(Value::as_str), Some("ok"));
    }
}
