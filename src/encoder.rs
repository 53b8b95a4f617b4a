//! The DER encoder — the inverse of the schema interpreter (spec.md §4.8).
//!
//! Grounded on `der/src/encoder.rs`'s `Encoder` (tag, then length, then
//! value) for the basic TLV framing, and on
//! `der/src/asn1/context_specific.rs` for EXPLICIT/IMPLICIT re-tagging;
//! generalized the same way `map.rs` generalizes `der`'s compile-time
//! `Encode` trait dispatch into a runtime walk over [`crate::schema::Schema`]
//! and [`crate::map::Mapped`].

use crate::context::EncodeConfig;
use crate::error::{Error, ErrorKind, Result};
use crate::length::encode_length;
use crate::map::{join_path, AnyValue, Mapped, MappedNode};
use crate::node;
use crate::oid::Oid;
use crate::schema::{DefaultValue, Schema, SchemaKind};
use crate::tag::{encode_tag, universal, Class, Tag};
use crate::value::{self, Value};
use num_bigint::BigInt;
use std::cmp::Ordering;

/// Encode a mapped semantic value back to DER bytes against `schema`, using
/// the process-wide ambient configuration (spec.md §6.2's `encode_der`).
pub fn encode_der(mapped: &Mapped, schema: &Schema) -> Result<Vec<u8>> {
    encode_der_with_config(mapped, schema, EncodeConfig::from_global())
}

/// Encode a mapped semantic value back to DER bytes under an explicit
/// configuration.
pub fn encode_der_with_config(mapped: &Mapped, schema: &Schema, config: EncodeConfig) -> Result<Vec<u8>> {
    encode_node(mapped, schema, "", "", &config)
}

fn frame(tag: Tag, content: &[u8]) -> Vec<u8> {
    let mut out = encode_tag(tag);
    out.extend(encode_length(content.len() as u32));
    out.extend_from_slice(content);
    out
}

/// Apply a schema's tagging modifiers around an already-framed content
/// value (spec.md §4.8's CHOICE/tag-re-classing bullets).
///
/// - EXPLICIT: the natural encoding is wrapped whole in a new constructed
///   TLV under the context/cast tag.
/// - IMPLICIT (including a bare `class`+`cast` override with neither flag
///   set, per [`Schema::effective_implicit`]): the leading identifier octet
///   is rewritten, preserving the constructed bit.
/// - Neither: the natural universal tag is used unchanged.
fn apply_tagging(schema: &Schema, natural_tag: Tag, content: Vec<u8>) -> Vec<u8> {
    if schema.explicit {
        let inner = frame(natural_tag, &content);
        let outer = override_tag(schema, true);
        frame(outer, &inner)
    } else if schema.effective_implicit() && schema.has_context_tag() {
        let outer = override_tag(schema, natural_tag.constructed);
        frame(outer, &content)
    } else {
        frame(natural_tag, &content)
    }
}

fn override_tag(schema: &Schema, constructed: bool) -> Tag {
    let class = schema.class.unwrap_or(Class::ContextSpecific);
    let number = schema.cast.or(schema.constant).unwrap_or(0);
    Tag::new(class, constructed, number)
}

/// Encode one node, attaching `field` to any error that unwinds through it
/// (spec.md §4.8 "breadcrumb path"), mirroring [`crate::map::map_at`].
fn encode_node(mapped: &Mapped, schema: &Schema, path: &str, field: &str, config: &EncodeConfig) -> Result<Vec<u8>> {
    encode_inner(mapped, schema, path, config)
        .map_err(|e| if field.is_empty() { e } else { e.in_field(field) })
}

fn encode_inner(mapped: &Mapped, schema: &Schema, path: &str, config: &EncodeConfig) -> Result<Vec<u8>> {
    if config.use_encoded_cache {
        if let Some(handle) = &mapped.source {
            if handle.borrow().cache_valid() {
                return node::re_emit(handle);
            }
        }
    }

    match &mapped.node {
        MappedNode::Primitive(value) => encode_primitive(value, schema),
        MappedNode::Sequence(fields) => encode_sequence(fields, schema, path, config),
        MappedNode::SequenceOf(items) => encode_sequence_of(items, schema, path, config),
        MappedNode::Choice(name, inner) => encode_choice(name, inner, schema, path, config),
        MappedNode::NamedBits(names) => encode_named_bits(names, schema),
        MappedNode::EnumeratedName(name) => encode_enumerated_name(name, schema),
        MappedNode::Any(any) => encode_any(any, schema),
    }
}

fn mismatch(detail: &str) -> Error {
    Error::from(ErrorKind::MappingMismatch {
        detail: detail.to_string(),
    })
}

fn encode_primitive(value: &Value, schema: &Schema) -> Result<Vec<u8>> {
    let tag_number = schema
        .inner_universal_tag()
        .ok_or_else(|| mismatch("primitive mapped value against a non-universal schema"))?;
    let content = value::encode_primitive_content(value)?;
    let natural = Tag::universal(false, tag_number);
    Ok(apply_tagging(schema, natural, content))
}

fn encode_sequence(
    fields: &[(String, Mapped)],
    schema: &Schema,
    path: &str,
    config: &EncodeConfig,
) -> Result<Vec<u8>> {
    let schema_fields = match &schema.kind {
        SchemaKind::Sequence(f) | SchemaKind::Set(f) => f,
        _ => return Err(mismatch("mapped SEQUENCE/SET against a non-structural schema")),
    };

    let mut content = Vec::new();
    let mut cursor = 0usize;

    for (name, field_schema) in schema_fields {
        let present = fields.get(cursor).map(|(n, _)| n == name).unwrap_or(false);

        if present {
            let (_, child) = &fields[cursor];
            cursor += 1;
            if matches_default(child, field_schema) {
                continue;
            }
            let child_path = join_path(path, name);
            content.extend(encode_node(child, field_schema, &child_path, name, config)?);
        } else if field_schema.optional || field_schema.default.is_some() {
            continue;
        } else {
            return Err(ErrorKind::MissingRequiredField {
                field: name.clone(),
            }
            .into());
        }
    }

    if cursor != fields.len() {
        return Err(ErrorKind::UnmappedValue.into());
    }

    let natural = Tag::universal(
        true,
        schema
            .inner_universal_tag()
            .ok_or_else(|| mismatch("SEQUENCE/SET schema with no universal tag"))?,
    );
    Ok(apply_tagging(schema, natural, content))
}

/// Does `mapped` equal the schema-declared DEFAULT, and so should be
/// omitted from the re-encoded output (spec.md §4.7 rule 7)?
fn matches_default(mapped: &Mapped, schema: &Schema) -> bool {
    let Some(default) = &schema.default else {
        return false;
    };
    match (default, &mapped.node) {
        (DefaultValue::Boolean(want), MappedNode::Primitive(Value::Boolean(got))) => want == got,
        (DefaultValue::Integer(want), MappedNode::Primitive(Value::Integer(got)))
        | (DefaultValue::Integer(want), MappedNode::Primitive(Value::Enumerated(got))) => want == got,
        (DefaultValue::OctetString(want), MappedNode::Primitive(Value::OctetString(got))) => want == got,
        (DefaultValue::Oid(want), MappedNode::Primitive(Value::ObjectIdentifier(got))) => {
            Oid::from_dotted(want).map(|o| &o == got).unwrap_or(false)
        }
        (DefaultValue::NamedBits(want), MappedNode::NamedBits(got)) => want == got,
        _ => false,
    }
}

fn encode_sequence_of(
    items: &[Mapped],
    schema: &Schema,
    path: &str,
    config: &EncodeConfig,
) -> Result<Vec<u8>> {
    let (element, is_set_of) = match &schema.kind {
        SchemaKind::SequenceOf { element, .. } => (element.as_ref(), false),
        SchemaKind::SetOf { element, .. } => (element.as_ref(), true),
        _ => return Err(mismatch("mapped SEQUENCE OF/SET OF against a non-repeating schema")),
    };

    let mut encoded: Vec<Vec<u8>> = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let idx = i.to_string();
        let child_path = join_path(path, &idx);
        encoded.push(encode_node(item, element, &child_path, &idx, config)?);
    }

    if is_set_of {
        encoded.sort_by(|a, b| compare_set_of_encodings(a, b));
    }

    let content: Vec<u8> = encoded.concat();
    let natural = Tag::universal(
        true,
        schema
            .inner_universal_tag()
            .ok_or_else(|| mismatch("SEQUENCE OF/SET OF schema with no universal tag"))?,
    );
    Ok(apply_tagging(schema, natural, content))
}

/// Canonical SET-OF ordering (X.690 §11.6): compare encoded element byte
/// strings, treating a shorter string as though it were zero-padded to the
/// longer one's length for comparison purposes.
fn compare_set_of_encodings(a: &[u8], b: &[u8]) -> Ordering {
    let min_len = a.len().min(b.len());
    for i in 0..min_len {
        match a[i].cmp(&b[i]) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    a.len().cmp(&b.len())
}

fn encode_choice(
    name: &str,
    inner: &Mapped,
    schema: &Schema,
    path: &str,
    config: &EncodeConfig,
) -> Result<Vec<u8>> {
    let alternatives = match &schema.kind {
        SchemaKind::Choice(alts) => alts,
        _ => return Err(mismatch("mapped CHOICE against a non-CHOICE schema")),
    };
    let alt_schema = alternatives
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, s)| s)
        .ok_or_else(|| mismatch(&format!("CHOICE alternative '{}' is not declared", name)))?;
    let child_path = join_path(path, name);
    encode_node(inner, alt_schema, &child_path, name, config)
}

fn encode_named_bits(names: &[String], schema: &Schema) -> Result<Vec<u8>> {
    let mapping = schema
        .mapping
        .as_ref()
        .ok_or_else(|| mismatch("NamedBits mapped value against a schema with no mapping table"))?;

    let highest_set = names
        .iter()
        .filter_map(|n| mapping.iter().position(|m| m == n))
        .max();

    let content = match highest_set {
        None => value::encode_bit_string(0, &[]),
        Some(highest) => {
            let total_bits = highest + 1;
            let total_bytes = (total_bits + 7) / 8;
            let mut bytes = vec![0u8; total_bytes];
            for name in names {
                if let Some(bit_index) = mapping.iter().position(|m| m == name) {
                    bytes[bit_index / 8] |= 1 << (7 - (bit_index % 8));
                }
            }
            let unused_bits = (total_bytes * 8 - total_bits) as u8;
            value::encode_bit_string(unused_bits, &bytes)
        }
    };

    let natural = Tag::universal(false, universal::BIT_STRING);
    Ok(apply_tagging(schema, natural, content))
}

fn encode_enumerated_name(name: &str, schema: &Schema) -> Result<Vec<u8>> {
    let mapping = schema
        .mapping
        .as_ref()
        .ok_or_else(|| mismatch("EnumeratedName mapped value against a schema with no mapping table"))?;
    let index = mapping
        .iter()
        .position(|m| m == name)
        .ok_or_else(|| mismatch(&format!("enumerated name '{}' is not in the mapping table", name)))?;
    let tag_number = schema.inner_universal_tag().unwrap_or(universal::INTEGER);
    let content = value::encode_integer(&BigInt::from(index));
    let natural = Tag::universal(false, tag_number);
    Ok(apply_tagging(schema, natural, content))
}

fn encode_any(any: &AnyValue, schema: &Schema) -> Result<Vec<u8>> {
    match any {
        AnyValue::Opaque(bytes) => Ok(bytes.clone()),
        AnyValue::Node(handle) => node::re_emit(handle),
        AnyValue::Primitive(value) => {
            let tag_number = any_value_tag_number(value);
            let content = value::encode_primitive_content(value)?;
            let natural = Tag::universal(false, tag_number);
            Ok(apply_tagging(schema, natural, content))
        }
    }
}

/// Dispatch a TYPE_ANY primitive value's runtime kind to its universal tag
/// (spec.md §4.8: "dispatch by runtime value kind").
fn any_value_tag_number(value: &Value) -> u64 {
    match value {
        Value::Boolean(_) => universal::BOOLEAN,
        Value::Integer(_) => universal::INTEGER,
        Value::BitString { .. } => universal::BIT_STRING,
        Value::OctetString(_) => universal::OCTET_STRING,
        Value::Null => universal::NULL,
        Value::ObjectIdentifier(_) => universal::OBJECT_IDENTIFIER,
        Value::String(st, _) => st.tag_number(),
        Value::UtcTime(_) => universal::UTC_TIME,
        Value::GeneralizedTime(_) => universal::GENERALIZED_TIME,
        Value::Enumerated(_) => universal::ENUMERATED,
        Value::MalformedData(_) => universal::OCTET_STRING,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::decode_and_map;
    use crate::schema::Schema;

    #[test]
    fn sequence_of_one_integer_round_trips() {
        let bytes = [0x30, 0x03, 0x02, 0x01, 0x07];
        let schema = Schema::sequence(vec![("value", Schema::integer())]);
        let mapped = decode_and_map(&bytes, &schema).unwrap();
        assert_eq!(encode_der(&mapped, &schema).unwrap(), bytes);
    }

    #[test]
    fn explicit_context_tag_round_trips() {
        let bytes = [0xA0, 0x03, 0x02, 0x01, 0x2A];
        let schema = Schema::integer().explicit().constant(0);
        let mapped = decode_and_map(&bytes, &schema).unwrap();
        assert_eq!(encode_der(&mapped, &schema).unwrap(), bytes);
    }

    #[test]
    fn named_bits_round_trip_after_rebuild() {
        // 03 02 05 A0: unused=5, bits {0,2} set.
        let bytes = [0x03, 0x02, 0x05, 0xA0];
        let schema = Schema::bit_string().mapping(vec!["a", "b", "c", "d"]);
        let mapped = decode_and_map(&bytes, &schema).unwrap();
        let config = EncodeConfig {
            use_encoded_cache: false,
            ..EncodeConfig::default()
        };
        let re_encoded = encode_der_with_config(&mapped, &schema, config).unwrap();
        assert_eq!(re_encoded, bytes);
    }

    #[test]
    fn default_boolean_field_omitted_when_equal() {
        let schema = Schema::sequence(vec![(
            "flag",
            Schema::boolean().default(DefaultValue::Boolean(false)),
        )]);
        let bytes = [0x30, 0x03, 0x01, 0x01, 0x00];
        let mapped = decode_and_map(&bytes, &schema).unwrap();
        let config = EncodeConfig {
            use_encoded_cache: false,
            ..EncodeConfig::default()
        };
        let re_encoded = encode_der_with_config(&mapped, &schema, config).unwrap();
        assert_eq!(re_encoded, vec![0x30, 0x00]);
    }

    #[test]
    fn missing_required_field_fails_to_encode() {
        let schema = Schema::sequence(vec![("a", Schema::integer()), ("b", Schema::integer())]);
        let fields = vec![("a".to_string(), Mapped {
            node: MappedNode::Primitive(Value::Integer(BigInt::from(1))),
            source: None,
        })];
        let mapped = Mapped {
            node: MappedNode::Sequence(fields),
            source: None,
        };
        assert!(encode_der(&mapped, &schema).is_err());
    }

    #[test]
    fn set_of_sorts_canonically_on_encode() {
        let schema = Schema::set_of(Schema::octet_string());
        let items = vec![
            Mapped {
                node: MappedNode::Primitive(Value::OctetString(vec![0x02])),
                source: None,
            },
            Mapped {
                node: MappedNode::Primitive(Value::OctetString(vec![0x01])),
                source: None,
            },
        ];
        let mapped = Mapped {
            node: MappedNode::SequenceOf(items),
            source: None,
        };
        let encoded = encode_der(&mapped, &schema).unwrap();
        // Both elements are `04 01 xx`; sorted, 0x01 precedes 0x02.
        assert_eq!(
            encoded,
            vec![0x31, 0x06, 0x04, 0x01, 0x01, 0x04, 0x01, 0x02]
        );
    }

    #[test]
    fn choice_applies_alternative_context_tag() {
        let schema = Schema::choice(vec![("tagged", Schema::integer().implicit().constant(3))]);
        let mapped = Mapped {
            node: MappedNode::Choice(
                "tagged".to_string(),
                Box::new(Mapped {
                    node: MappedNode::Primitive(Value::Integer(BigInt::from(9))),
                    source: None,
                }),
            ),
            source: None,
        };
        let encoded = encode_der(&mapped, &schema).unwrap();
        assert_eq!(encoded, vec![0x83, 0x01, 0x09]);
    }
}
