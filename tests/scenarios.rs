//! Crate-level round-trip scenarios (spec.md §8 "Concrete scenarios").
//!
//! Exercises the decoder, schema interpreter, and encoder together, the
//! way `const-oid/tests/lib.rs` and `pkcs8/tests/*.rs` test multi-module
//! interaction once a crate grows past a single file.

use asn1der::{
    concatenate_constructed_string, decode_and_map, decode_ber, encode_der, Class, MappedNode,
    Schema,
};
use hex_literal::hex;

#[test]
fn scenario_1_sequence_of_one_integer() {
    let der = hex!("30 03 02 01 07");
    let schema = Schema::sequence(vec![("value", Schema::integer())]);
    let mapped = decode_and_map(&der, &schema).unwrap();
    assert_eq!(encode_der(&mapped, &schema).unwrap(), der);
}

#[test]
fn scenario_2_utc_time() {
    let der = hex!("17 0D 39 39 31 32 33 31 32 33 35 39 35 39 5A");
    let schema = Schema::utc_time();
    let mapped = decode_and_map(&der, &schema).unwrap();
    let ts = match mapped.as_value().unwrap() {
        asn1der::Value::UtcTime(ts) => *ts,
        other => panic!("expected UtcTime, got {:?}", other),
    };
    assert_eq!((ts.year, ts.month, ts.day), (1999, 12, 31));
    assert_eq!((ts.hour, ts.minute, ts.second), (23, 59, 59));
    assert_eq!(encode_der(&mapped, &schema).unwrap(), der);
}

#[test]
fn scenario_3_sha256_with_rsa_encryption_oid() {
    let der = hex!("06 09 2A 86 48 86 F7 0D 01 01 0B");
    let schema = Schema::oid();
    let mapped = decode_and_map(&der, &schema).unwrap();
    match mapped.as_value().unwrap() {
        asn1der::Value::ObjectIdentifier(oid) => {
            assert_eq!(oid.to_string(), "1.2.840.113549.1.1.11");
        }
        other => panic!("expected ObjectIdentifier, got {:?}", other),
    }
    assert_eq!(encode_der(&mapped, &schema).unwrap(), der);
}

#[test]
fn scenario_4_named_bit_string() {
    let der = hex!("03 02 05 A0");
    let schema = Schema::bit_string().mapping(vec!["a", "b", "c", "d"]);
    let mapped = decode_and_map(&der, &schema).unwrap();
    match &mapped.node {
        MappedNode::NamedBits(names) => {
            assert_eq!(names, &vec!["a".to_string(), "c".to_string()]);
        }
        other => panic!("unexpected: {:?}", other),
    }
    assert_eq!(encode_der(&mapped, &schema).unwrap(), der);
}

#[test]
fn scenario_5_explicit_context_wrapper() {
    let der = hex!("A0 03 02 01 2A");
    let schema = Schema::integer().explicit().constant(0);
    let mapped = decode_and_map(&der, &schema).unwrap();
    assert_eq!(
        mapped.as_value(),
        Some(&asn1der::Value::Integer(42.into()))
    );
    assert_eq!(encode_der(&mapped, &schema).unwrap(), der);
}

#[test]
fn scenario_6_indefinite_length_constructed_octet_string() {
    let der = hex!("24 80 04 02 AA BB 04 02 CC DD 00 00");
    let node = decode_ber(&der).unwrap();
    assert_eq!(node.tag.class, Class::Universal);
    assert!(node.tag.constructed);
    let concatenated = concatenate_constructed_string(&node).unwrap();
    assert_eq!(concatenated, vec![0xAA, 0xBB, 0xCC, 0xDD]);
}

#[test]
fn nested_explicit_and_implicit_tags_in_a_sequence() {
    // SEQUENCE { [0] EXPLICIT INTEGER, [1] IMPLICIT OCTET STRING }
    let schema = Schema::sequence(vec![
        ("version", Schema::integer().explicit().constant(0)),
        (
            "serial",
            Schema::octet_string().implicit().constant(1),
        ),
    ]);
    let der = hex!("30 0A A0 03 02 01 05 81 03 01 02 03");
    let mapped = decode_and_map(&der, &schema).unwrap();
    let fields = mapped.as_sequence().unwrap();
    assert_eq!(fields[0].0, "version");
    assert_eq!(fields[1].0, "serial");
    assert_eq!(encode_der(&mapped, &schema).unwrap(), der);
}

#[test]
fn optional_and_default_fields_round_trip_through_absence() {
    let schema = Schema::sequence(vec![
        ("a", Schema::integer()),
        ("b", Schema::boolean().optional()),
        ("c", Schema::octet_string()),
    ]);
    let der = hex!("30 08 02 01 01 04 03 AA BB CC");
    let mapped = decode_and_map(&der, &schema).unwrap();
    assert_eq!(mapped.as_sequence().unwrap().len(), 2);
    assert_eq!(encode_der(&mapped, &schema).unwrap(), der);
}

#[test]
fn malformed_long_form_tag_is_rejected() {
    // class/constructed bits + 0b11111 (long form marker), first
    // subsequent septet has the continuation bit clear but value zero.
    let bytes = [0b0001_1111u8, 0x00];
    assert!(decode_ber(&bytes).is_err());
}

#[test]
fn length_too_large_is_rejected() {
    let bytes = [0x85, 0, 0, 0, 0, 0];
    assert!(decode_ber(&bytes).is_err());
}

#[test]
fn deeply_nested_sequence_exceeds_default_recursion_cap() {
    let mut nested = vec![0x30u8, 0x00];
    for _ in 0..129 {
        let mut outer = vec![0x30u8, nested.len() as u8];
        outer.extend_from_slice(&nested);
        nested = outer;
    }
    let schema_for_depth = |depth: usize| -> Schema {
        let mut s = Schema::sequence(vec![]);
        for _ in 0..depth {
            s = Schema::sequence(vec![("inner", s)]);
        }
        s
    };
    // Build a schema exactly matching the nesting (129 wrapping levels
    // plus the innermost empty SEQUENCE) so the map phase is forced to
    // materialize every level and hits the depth cap rather than a
    // structural mismatch.
    let schema = schema_for_depth(129);
    let node = decode_ber(&nested).unwrap();
    let result = asn1der::map_simple(&node, &schema);
    assert!(result.is_err());
}

#[test]
fn explicit_wrapper_rejects_a_primitive_node() {
    // INTEGER presented directly where the schema expects an EXPLICIT
    // [0] wrapper around it must fail, not silently unwrap nothing.
    let schema = Schema::integer().explicit().constant(0);
    let der = hex!("02 01 2A");
    assert!(decode_and_map(&der, &schema).is_err());
}
