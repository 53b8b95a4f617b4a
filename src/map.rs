//! Schema interpreter — the map phase (spec.md §4.7).
//!
//! Grounded on `der/src/asn1/any.rs`'s `Any::decode_as`/`Choice::can_decode`
//! dispatch pattern, generalized from compile-time trait resolution to a
//! runtime walk driven by [`crate::schema::Schema`], since one schema value
//! must describe several different ASN.1 modules (X.509, CSR, CRL, PKCS#10,
//! SPKAC) without a distinct Rust type per module.

use crate::context::DecodeConfig;
use crate::decoder::concatenate_constructed_string;
use crate::error::{Error, ErrorKind, Result};
use crate::node::{self, children, DecodedNode, LazyHandle, NodeContent};
use crate::schema::{self, Schema, SchemaKind, SchemaType};
use crate::tag::{universal, Class, Tag};
use crate::value::Value;
use num_bigint::BigInt;
use num_traits::ToPrimitive;
use std::collections::HashMap;

/// A callback invoked after a node's basic mapping completes, keyed by its
/// dotted schema path (spec.md §6.2's `map(node, schema, rules)`).
pub type MapCallback<'a> = dyn Fn(&mut Mapped) -> Result<()> + 'a;

/// A table of post-mapping callbacks, keyed by dotted path.
#[derive(Default)]
pub struct MapRules<'a> {
    callbacks: HashMap<String, Box<MapCallback<'a>>>,
}

impl<'a> MapRules<'a> {
    /// An empty rule set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for the given dotted path.
    pub fn on(mut self, path: &str, callback: impl Fn(&mut Mapped) -> Result<()> + 'a) -> Self {
        self.callbacks.insert(path.to_string(), Box::new(callback));
        self
    }

    fn invoke(&self, path: &str, value: &mut Mapped) -> Result<()> {
        if let Some(cb) = self.callbacks.get(path) {
            cb(value)?;
        }
        Ok(())
    }
}

/// Where a TYPE_ANY value's bytes came from, since no schema can describe
/// its real structure (spec.md §4.7 rule 3).
#[derive(Clone, Debug)]
pub enum AnyValue {
    /// Opaque original TLV bytes (header + content), kept verbatim.
    Opaque(Vec<u8>),
    /// A decoded primitive value passed straight through.
    Primitive(Value),
    /// A constructed body passed straight through, still lazily backed.
    Node(LazyHandle),
}

impl AnyValue {
    /// Re-derive the original encoded bytes of this ANY value, where
    /// possible (spec.md §4.8 TYPE_ANY dispatch; `EncodedDataUnavailable`
    /// otherwise).
    pub fn encoded_bytes(&self) -> Result<Vec<u8>> {
        match self {
            AnyValue::Opaque(bytes) => Ok(bytes.clone()),
            AnyValue::Node(handle) => node::re_emit(handle),
            AnyValue::Primitive(_) => Err(ErrorKind::EncodedDataUnavailable.into()),
        }
    }
}

/// The semantic tree produced by the map phase (spec.md §4.7's "semantic
/// tree"), paired with an optional link back to the originating Lazy
/// Constructed node so the encoder can short-circuit re-encoding
/// unmutated structure (spec.md §4.8 "cache short-circuit").
#[derive(Clone, Debug)]
pub struct Mapped {
    pub node: MappedNode,
    pub source: Option<LazyHandle>,
}

/// The shape of a mapped semantic value.
#[derive(Clone, Debug)]
pub enum MappedNode {
    Primitive(Value),
    Sequence(Vec<(String, Mapped)>),
    SequenceOf(Vec<Mapped>),
    Choice(String, Box<Mapped>),
    NamedBits(Vec<String>),
    EnumeratedName(String),
    Any(AnyValue),
}

impl Mapped {
    fn leaf(value: Value) -> Self {
        Mapped {
            node: MappedNode::Primitive(value),
            source: None,
        }
    }

    /// Borrow this value's primitive [`Value`], if it mapped to one
    /// directly (no CHOICE/SEQUENCE/mapping wrapper).
    pub fn as_value(&self) -> Option<&Value> {
        match &self.node {
            MappedNode::Primitive(v) => Some(v),
            _ => None,
        }
    }

    /// Borrow this value's SEQUENCE/SET fields, if it is one.
    pub fn as_sequence(&self) -> Option<&[(String, Mapped)]> {
        match &self.node {
            MappedNode::Sequence(fields) => Some(fields),
            _ => None,
        }
    }

    /// Look up a named SEQUENCE/SET field.
    pub fn field(&self, name: &str) -> Option<&Mapped> {
        self.as_sequence()?.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

/// Run the map phase: walk `node` against `schema`, producing a semantic
/// tree. `rules` callbacks fire after each node's basic mapping, keyed by
/// dotted path (spec.md §6.2).
pub fn map(node: &DecodedNode, schema: &Schema, rules: &MapRules<'_>) -> Result<Mapped> {
    map_at(node, schema, "", "", rules)
}

/// Map with no post-mapping callbacks.
pub fn map_simple(node: &DecodedNode, schema: &Schema) -> Result<Mapped> {
    map(node, schema, &MapRules::new())
}

pub(crate) fn join_path(base: &str, field: &str) -> String {
    if base.is_empty() {
        field.to_string()
    } else {
        format!("{}.{}", base, field)
    }
}

/// Map one node, attaching `field` (this level's own name, empty at the
/// root) to any error that unwinds through it and invoking any rule
/// registered under the full dotted `path` on success. Errors accumulate
/// their dotted breadcrumb one field at a time as they bubble outward
/// (spec.md §4.8 "breadcrumb path"), mirroring [`Error::in_field`]'s
/// documented outer-to-inner construction.
fn map_at(node: &DecodedNode, schema: &Schema, path: &str, field: &str, rules: &MapRules<'_>) -> Result<Mapped> {
    let mut mapped = map_inner(node, schema, path, rules)
        .map_err(|e| if field.is_empty() { e } else { e.in_field(field) })?;
    rules.invoke(path, &mut mapped)?;
    Ok(mapped)
}

fn map_inner(node: &DecodedNode, schema: &Schema, path: &str, rules: &MapRules<'_>) -> Result<Mapped> {
    // Rule 1: EXPLICIT tagging unwraps one constructed layer.
    if schema.explicit {
        let handle = node.as_constructed().ok_or_else(|| {
            Error::from(ErrorKind::MappingMismatch {
                detail: "EXPLICIT tag requires a constructed wrapper".to_string(),
            })
        })?;
        let kids = children(handle)?;
        let inner = kids
            .first()
            .ok_or_else(|| Error::from(ErrorKind::MappingMismatch {
                detail: "EXPLICIT wrapper has no inner value".to_string(),
            }))?;
        let unwrapped = schema_without_tagging(schema);
        return map_inner(inner, &unwrapped, path, rules);
    }

    // Rule 2: CHOICE resolution, first-declared-wins (spec.md §9).
    if let SchemaKind::Choice(alternatives) = &schema.kind {
        for (name, alt) in alternatives {
            if choice_alternative_matches(alt, node) {
                let child_path = join_path(path, name);
                let inner = map_at(node, alt, &child_path, name, rules)?;
                return Ok(Mapped {
                    source: inner.source.clone(),
                    node: MappedNode::Choice(name.clone(), Box::new(inner)),
                });
            }
        }
        return Err(ErrorKind::NoChoiceAlternative.into());
    }

    // Rule 3: ANY with a context tag present is opaque; without, pass
    // the decoded value straight through.
    if matches!(schema.kind, SchemaKind::Primitive(SchemaType::Any)) {
        return map_any(node, schema);
    }

    // Rule 4: IMPLICIT tagging over a primitive-byte slice synthesizes a
    // header for the schema's declared type and re-decodes.
    if schema.effective_implicit() && matches!(node.content, NodeContent::Opaque(_)) {
        return map_implicit_primitive(node, schema);
    }

    // IMPLICIT tagging over a constructed body: the node already carries
    // its content as a Lazy Constructed handle; re-describe its tag as
    // the schema's real universal type (without dirtying the cache) and
    // continue structurally.
    if schema.effective_implicit() && node.as_constructed().is_some() && schema.is_structural() {
        if let Some(handle) = node.as_constructed() {
            if let Some(universal_tag) = schema.inner_universal_tag() {
                node::replace_tag(handle, Tag::universal(true, universal_tag));
            }
        }
    }

    map_typed(node, schema, path, rules)
}

/// Build a copy of `schema` with all tagging modifiers cleared, used once
/// EXPLICIT unwrapping has consumed the outer layer: the inner element's
/// own universal tag governs the rest of resolution.
fn schema_without_tagging(schema: &Schema) -> Schema {
    let mut inner = schema.clone();
    inner.explicit = false;
    inner.implicit = false;
    inner.constant = None;
    inner.class = None;
    inner.cast = None;
    inner
}

fn choice_alternative_matches(alt: &Schema, node: &DecodedNode) -> bool {
    if let Some(constant) = alt.constant {
        let class = alt.class.unwrap_or(Class::ContextSpecific);
        return node.tag.class == class && node.tag.number == constant;
    }
    if let (Some(class), Some(cast)) = (alt.class, alt.cast) {
        return node.tag.class == class && node.tag.number == cast;
    }
    type_matches(alt, node)
}

fn type_matches(schema: &Schema, node: &DecodedNode) -> bool {
    match &schema.kind {
        SchemaKind::Primitive(SchemaType::Any) => true,
        SchemaKind::Primitive(SchemaType::Universal(t)) => {
            if node.tag.class != Class::Universal {
                return false;
            }
            node.tag.number == *t
                || (schema::is_tolerant_string_range(*t)
                    && schema::is_tolerant_string_range(node.tag.number))
        }
        SchemaKind::Sequence(_) | SchemaKind::SequenceOf { .. } => node.tag.is_sequence(),
        SchemaKind::Set(_) | SchemaKind::SetOf { .. } => node.tag.is_set(),
        SchemaKind::Choice(_) => false,
    }
}

fn map_any(node: &DecodedNode, schema: &Schema) -> Result<Mapped> {
    let opaque = schema.constant.is_some() || schema.cast.is_some();
    if opaque {
        return Ok(Mapped {
            node: MappedNode::Any(AnyValue::Opaque(node.reencode()?)),
            source: None,
        });
    }
    match &node.content {
        NodeContent::Primitive(v) => Ok(Mapped {
            node: MappedNode::Any(AnyValue::Primitive(v.clone())),
            source: None,
        }),
        NodeContent::Constructed(handle) => Ok(Mapped {
            node: MappedNode::Any(AnyValue::Node(handle.clone())),
            source: Some(handle.clone()),
        }),
        NodeContent::Opaque(_) => Ok(Mapped {
            node: MappedNode::Any(AnyValue::Opaque(node.reencode()?)),
            source: None,
        }),
    }
}

fn map_implicit_primitive(node: &DecodedNode, schema: &Schema) -> Result<Mapped> {
    let bytes = match &node.content {
        NodeContent::Opaque(bytes) => bytes,
        _ => unreachable!("caller checked content is Opaque"),
    };
    let universal_tag = schema.inner_universal_tag().ok_or_else(|| {
        Error::from(ErrorKind::MappingMismatch {
            detail: "IMPLICIT tag on a schema with no concrete universal type".to_string(),
        })
    })?;
    let synthetic = Tag::universal(false, universal_tag);
    let value = crate::value::decode_primitive_value(synthetic, bytes)?;

    if let Some(names) = &schema.mapping {
        return map_with_mapping(value, names);
    }

    Ok(Mapped::leaf(value))
}

fn map_typed(node: &DecodedNode, schema: &Schema, path: &str, rules: &MapRules<'_>) -> Result<Mapped> {
    match &schema.kind {
        SchemaKind::Primitive(_) => map_primitive(node, schema),
        SchemaKind::Sequence(fields) | SchemaKind::Set(fields) => {
            if !type_matches(schema, node) {
                return Err(ErrorKind::MappingMismatch {
                    detail: format!("expected SEQUENCE/SET, found {}", node.tag),
                }
                .into());
            }
            let handle = node.as_constructed().ok_or_else(|| {
                Error::from(ErrorKind::UnexpectedPrimitive { tag: node.tag })
            })?;
            let kids = children(handle)?;
            let mapped_fields = map_ordered_children(&kids, fields, path, rules)?;
            Ok(Mapped {
                node: MappedNode::Sequence(mapped_fields),
                source: Some(handle.clone()),
            })
        }
        SchemaKind::SequenceOf { min, max, element } | SchemaKind::SetOf { min, max, element } => {
            if !type_matches(schema, node) {
                return Err(ErrorKind::MappingMismatch {
                    detail: format!("expected SEQUENCE OF/SET OF, found {}", node.tag),
                }
                .into());
            }
            let handle = node.as_constructed().ok_or_else(|| {
                Error::from(ErrorKind::UnexpectedPrimitive { tag: node.tag })
            })?;
            let kids = children(handle)?;
            if kids.len() < *min || max.map(|m| kids.len() > m).unwrap_or(false) {
                return Err(ErrorKind::MappingMismatch {
                    detail: format!(
                        "SEQUENCE/SET OF cardinality {} outside [{}, {:?}]",
                        kids.len(),
                        min,
                        max
                    ),
                }
                .into());
            }
            let mut out = Vec::with_capacity(kids.len());
            for (i, kid) in kids.iter().enumerate() {
                let idx = i.to_string();
                out.push(map_at(kid, element, &join_path(path, &idx), &idx, rules)?);
            }
            Ok(Mapped {
                node: MappedNode::SequenceOf(out),
                source: Some(handle.clone()),
            })
        }
        SchemaKind::Choice(_) => unreachable!("handled in map_inner"),
    }
}

fn map_primitive(node: &DecodedNode, schema: &Schema) -> Result<Mapped> {
    if !type_matches(schema, node) {
        return Err(ErrorKind::MappingMismatch {
            detail: format!("schema/decoded type mismatch at {}", node.tag),
        }
        .into());
    }

    let value = resolve_primitive_value(node)?;

    if let Some(names) = &schema.mapping {
        return map_with_mapping(value, names);
    }

    Ok(Mapped::leaf(value))
}

/// Resolve a node's effective primitive [`Value`], concatenating
/// constructed BitString/OctetString children per spec.md §4.5/§8
/// scenario 6 when the BER relaxation produced one.
fn resolve_primitive_value(node: &DecodedNode) -> Result<Value> {
    match &node.content {
        NodeContent::Primitive(v) => Ok(v.clone()),
        NodeContent::Constructed(_) => {
            let bytes = concatenate_constructed_string(node)?;
            match node.tag.number {
                universal::BIT_STRING => {
                    let (unused_bits, bytes) = crate::value::decode_bit_string(&bytes)?;
                    Ok(Value::BitString { unused_bits, bytes })
                }
                universal::OCTET_STRING => Ok(Value::OctetString(bytes)),
                _ => Err(ErrorKind::MappingMismatch {
                    detail: "unexpected constructed primitive type".to_string(),
                }
                .into()),
            }
        }
        NodeContent::Opaque(bytes) => Ok(Value::MalformedData(bytes.clone())),
    }
}

fn map_with_mapping(value: Value, names: &[String]) -> Result<Mapped> {
    match value {
        Value::Integer(n) | Value::Enumerated(n) => {
            let index = n
                .to_usize()
                .ok_or_else(|| Error::from(ErrorKind::MappingMismatch {
                    detail: "enumerated index out of range".to_string(),
                }))?;
            let name = names
                .get(index)
                .ok_or_else(|| Error::from(ErrorKind::MappingMismatch {
                    detail: format!("enumerated index {} has no mapped name", index),
                }))?;
            Ok(Mapped {
                node: MappedNode::EnumeratedName(name.clone()),
                source: None,
            })
        }
        Value::BitString { unused_bits, bytes } => {
            let names_set = named_bits_from_bit_string(unused_bits, &bytes, names)?;
            Ok(Mapped {
                node: MappedNode::NamedBits(names_set),
                source: None,
            })
        }
        other => Err(ErrorKind::MappingMismatch {
            detail: format!("mapping table applies only to Integer/BitString, found {:?}", other),
        }
        .into()),
    }
}

/// Reverse the bit order per X.680 §21.7 (bit 0 is the MSB of the first
/// octet) and collect the names of set bits, per spec.md §4.7 rule 6.
fn named_bits_from_bit_string(unused_bits: u8, bytes: &[u8], names: &[String]) -> Result<Vec<String>> {
    let total_bits = bytes.len() * 8 - unused_bits as usize;
    let mut set = Vec::new();
    for bit_index in 0..total_bits {
        let byte = bytes[bit_index / 8];
        let shift = 7 - (bit_index % 8);
        if (byte >> shift) & 1 == 1 {
            if let Some(name) = names.get(bit_index) {
                set.push(name.clone());
            }
        }
    }
    Ok(set)
}

/// Ordered SEQUENCE/SET child-cursor matching (spec.md §4.7, trailing
/// paragraph): each schema child either matches the next decoded child
/// and advances both cursors, or — if `optional`/`default` — is skipped,
/// advancing only the schema cursor.
fn map_ordered_children(
    decoded: &[DecodedNode],
    schema_fields: &[(String, Schema)],
    path: &str,
    rules: &MapRules<'_>,
) -> Result<Vec<(String, Mapped)>> {
    let mut out = Vec::with_capacity(schema_fields.len());
    let mut cursor = 0usize;

    for (name, field_schema) in schema_fields {
        let child_path = join_path(path, name);
        let candidate = decoded.get(cursor);
        let matches = candidate
            .map(|c| child_matches(field_schema, c))
            .unwrap_or(false);

        if matches {
            let mapped = map_at(&decoded[cursor], field_schema, &child_path, name, rules)?;
            out.push((name.clone(), mapped));
            cursor += 1;
        } else if field_schema.optional || field_schema.default.is_some() {
            // Absent: per spec.md §4.7 rule 7, DEFAULTs are not
            // re-injected on decode.
            continue;
        } else {
            return Err(ErrorKind::MissingRequiredField {
                field: name.clone(),
            }
            .into());
        }
    }

    if cursor != decoded.len() {
        return Err(ErrorKind::UnmappedValue.into());
    }

    Ok(out)
}

fn child_matches(schema: &Schema, node: &DecodedNode) -> bool {
    if schema.explicit {
        return node.tag.class == schema.class.unwrap_or(Class::ContextSpecific)
            && node.tag.constructed
            && schema
                .constant
                .or(schema.cast)
                .map(|n| n == node.tag.number)
                .unwrap_or(false);
    }
    if schema.effective_implicit() && schema.has_context_tag() {
        let class = schema.class.unwrap_or(Class::ContextSpecific);
        let number = schema.cast.or(schema.constant).unwrap();
        return node.tag.class == class && node.tag.number == number;
    }
    if let SchemaKind::Choice(alternatives) = &schema.kind {
        return alternatives
            .iter()
            .any(|(_, alt)| choice_alternative_matches(alt, node));
    }
    type_matches(schema, node)
}

/// Convenience re-decode helper: decode BER bytes and map them against a
/// schema in one call, using the ambient decode configuration (spec.md
/// §6.2's conceptual pairing of `decode_ber` with `map`).
pub fn decode_and_map(bytes: &[u8], schema: &Schema) -> Result<Mapped> {
    let node = crate::decoder::decode_ber_with_config(bytes, DecodeConfig::from_global())?;
    map_simple(&node, schema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;

    #[test]
    fn maps_sequence_of_one_integer() {
        let schema = Schema::sequence(vec![("value", Schema::integer())]);
        let mapped = decode_and_map(&[0x30, 0x03, 0x02, 0x01, 0x07], &schema).unwrap();
        let fields = mapped.as_sequence().unwrap();
        assert_eq!(fields[0].0, "value");
        assert_eq!(
            fields[0].1.as_value(),
            Some(&Value::Integer(BigInt::from(7)))
        );
    }

    #[test]
    fn explicit_context_tag_unwraps() {
        let schema = Schema::integer().explicit().constant(0);
        let mapped = decode_and_map(&[0xA0, 0x03, 0x02, 0x01, 0x2A], &schema).unwrap();
        assert_eq!(mapped.as_value(), Some(&Value::Integer(BigInt::from(42))));
    }

    #[test]
    fn optional_field_absent_is_skipped() {
        let schema = Schema::sequence(vec![
            ("a", Schema::integer()),
            ("b", Schema::boolean().optional()),
            ("c", Schema::octet_string()),
        ]);
        let bytes = [
            0x30, 0x08, 0x02, 0x01, 0x01, 0x04, 0x03, 0xAA, 0xBB, 0xCC,
        ];
        let mapped = decode_and_map(&bytes, &schema).unwrap();
        let fields = mapped.as_sequence().unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].0, "a");
        assert_eq!(fields[1].0, "c");
    }

    #[test]
    fn missing_required_field_fails() {
        let schema = Schema::sequence(vec![("a", Schema::integer()), ("b", Schema::integer())]);
        let bytes = [0x30, 0x03, 0x02, 0x01, 0x01];
        assert!(decode_and_map(&bytes, &schema).is_err());
    }

    #[test]
    fn bit_string_named_bits() {
        // 03 02 05 A0: unused=5, bits 10100000 -> bit0, bit2 set.
        let schema = Schema::bit_string().mapping(vec!["a", "b", "c", "d"]);
        let mapped = decode_and_map(&[0x03, 0x02, 0x05, 0xA0], &schema).unwrap();
        match &mapped.node {
            MappedNode::NamedBits(names) => {
                assert_eq!(names, &vec!["a".to_string(), "c".to_string()]);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn implicit_tagged_bit_string_still_resolves_named_bits() {
        // [1] IMPLICIT BIT STRING named "a".."d", e.g. CRL DistributionPoint's
        // `reasons [1] IMPLICIT ReasonFlags`.
        let schema = Schema::bit_string()
            .implicit()
            .constant(1)
            .mapping(vec!["a", "b", "c", "d"]);
        let bytes = [0x81, 0x02, 0x05, 0xA0];
        let mapped = decode_and_map(&bytes, &schema).unwrap();
        match &mapped.node {
            MappedNode::NamedBits(names) => {
                assert_eq!(names, &vec!["a".to_string(), "c".to_string()]);
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(crate::encoder::encode_der(&mapped, &schema).unwrap(), bytes);
    }

    #[test]
    fn choice_resolves_first_match() {
        let schema = Schema::choice(vec![
            ("asInt", Schema::integer()),
            ("asBool", Schema::boolean()),
        ]);
        let mapped = decode_and_map(&[0x02, 0x01, 0x05], &schema).unwrap();
        match &mapped.node {
            MappedNode::Choice(name, inner) => {
                assert_eq!(name, "asInt");
                assert_eq!(inner.as_value(), Some(&Value::Integer(BigInt::from(5))));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn sequence_of_integers() {
        let schema = Schema::sequence_of(Schema::integer());
        let bytes = [0x30, 0x06, 0x02, 0x01, 0x01, 0x02, 0x01, 0x02];
        let mapped = decode_and_map(&bytes, &schema).unwrap();
        match &mapped.node {
            MappedNode::SequenceOf(items) => assert_eq!(items.len(), 2),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
