//! Primitive value decoders and the decoded-value tagged union (spec.md
//! §3 "Primitive value variants", §4.4).
//!
//! Grounded on `der/src/asn1/*.rs`'s one-module-per-universal-type layout
//! (`boolean.rs`, `bit_string.rs`, `octet_string.rs`, `ia5_string.rs`, …),
//! collapsed here into a single tagged union since the schema interpreter
//! (`map.rs`) needs to match on "some decoded universal value" generically
//! rather than through per-type traits.

use crate::error::{Error, ErrorKind, Result};
use crate::oid::{self, Oid};
use crate::tag::{universal, Tag};
use crate::time::{self, Timestamp};
use num_bigint::BigInt;
use num_traits::Zero;

/// The character-size class a string type's raw bytes are declared under.
/// Validation of the actual encoding is left to callers (spec.md §4.4:
/// "character-set validation is deferred to callers").
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CharsetClass {
    /// One byte per character (ASCII-range string types).
    OneByte,
    /// Two bytes per character (`BMPString`).
    TwoByte,
    /// Four bytes per character (`UniversalString`).
    FourByte,
}

/// The eleven string-like universal types the schemas reference.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StringType {
    Utf8,
    Numeric,
    Printable,
    Teletex,
    Videotex,
    Ia5,
    Graphic,
    Visible,
    General,
    Universal,
    Bmp,
}

impl StringType {
    /// The universal tag number this string type is encoded under.
    pub fn tag_number(self) -> u64 {
        match self {
            StringType::Utf8 => universal::UTF8_STRING,
            StringType::Numeric => universal::NUMERIC_STRING,
            StringType::Printable => universal::PRINTABLE_STRING,
            StringType::Teletex => universal::T61_STRING,
            StringType::Videotex => universal::VIDEOTEX_STRING,
            StringType::Ia5 => universal::IA5_STRING,
            StringType::Graphic => universal::GRAPHIC_STRING,
            StringType::Visible => universal::VISIBLE_STRING,
            StringType::General => universal::GENERAL_STRING,
            StringType::Universal => universal::UNIVERSAL_STRING,
            StringType::Bmp => universal::BMP_STRING,
        }
    }

    /// This string type's declared character-size class.
    pub fn charset_class(self) -> CharsetClass {
        match self {
            StringType::Universal => CharsetClass::FourByte,
            StringType::Bmp => CharsetClass::TwoByte,
            _ => CharsetClass::OneByte,
        }
    }

    /// Look up the string type corresponding to a universal tag number.
    pub fn from_tag_number(number: u64) -> Option<Self> {
        Some(match number {
            universal::UTF8_STRING => StringType::Utf8,
            universal::NUMERIC_STRING => StringType::Numeric,
            universal::PRINTABLE_STRING => StringType::Printable,
            universal::T61_STRING => StringType::Teletex,
            universal::VIDEOTEX_STRING => StringType::Videotex,
            universal::IA5_STRING => StringType::Ia5,
            universal::GRAPHIC_STRING => StringType::Graphic,
            universal::VISIBLE_STRING => StringType::Visible,
            universal::GENERAL_STRING => StringType::General,
            universal::UNIVERSAL_STRING => StringType::Universal,
            universal::BMP_STRING => StringType::Bmp,
            _ => return None,
        })
    }
}

/// A decoded universal-type value (spec.md §3).
///
/// `MalformedData` is produced in place of any of the other variants when
/// the "blobs-on-bad-decode" relaxation is enabled and the content fails
/// its type-specific constraints; it carries the header+content bytes
/// verbatim so the node can still be re-emitted unmodified.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Boolean(bool),
    Integer(BigInt),
    BitString { unused_bits: u8, bytes: Vec<u8> },
    OctetString(Vec<u8>),
    Null,
    ObjectIdentifier(Oid),
    String(StringType, Vec<u8>),
    UtcTime(Timestamp),
    GeneralizedTime(Timestamp),
    Enumerated(BigInt),
    MalformedData(Vec<u8>),
}

/// Decode a `BOOLEAN` value. Content length MUST be 1; any non-zero byte
/// is `true` (DER requires `0xFF`, but decoding is permissive).
pub fn decode_boolean(content: &[u8]) -> Result<bool> {
    match content {
        [b] => Ok(*b != 0),
        _ => Err(ErrorKind::InvalidValue {
            tag: Tag::universal(false, universal::BOOLEAN),
        }
        .into()),
    }
}

/// Decode an `INTEGER`/`ENUMERATED` value from its signed big-endian
/// content bytes. Empty content decodes to zero (spec.md §8).
pub fn decode_integer(content: &[u8]) -> Result<BigInt> {
    if content.is_empty() {
        return Ok(BigInt::zero());
    }
    Ok(BigInt::from_signed_bytes_be(content))
}

/// Encode an `INTEGER`/`ENUMERATED` value as minimal two's-complement
/// signed big-endian bytes. Zero encodes as a single zero byte.
pub fn encode_integer(value: &BigInt) -> Vec<u8> {
    let bytes = value.to_signed_bytes_be();
    if bytes.is_empty() {
        vec![0]
    } else {
        bytes
    }
}

/// Decode a `BIT STRING` value: the first content octet is the
/// unused-bit count (0..=7); the remaining octets carry the bits.
pub fn decode_bit_string(content: &[u8]) -> Result<(u8, Vec<u8>)> {
    let (unused, rest) = content.split_first().ok_or_else(|| {
        Error::from(ErrorKind::InvalidValue {
            tag: Tag::universal(false, universal::BIT_STRING),
        })
    })?;
    if *unused > 7 || (*unused > 0 && rest.is_empty()) {
        return Err(ErrorKind::InvalidValue {
            tag: Tag::universal(false, universal::BIT_STRING),
        }
        .into());
    }
    Ok((*unused, rest.to_vec()))
}

/// Encode a `BIT STRING` value: unused-bit count followed by the packed
/// bits.
pub fn encode_bit_string(unused_bits: u8, bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() + 1);
    out.push(unused_bits);
    out.extend_from_slice(bytes);
    out
}

/// Decode a `NULL` value. Content length MUST be 0.
pub fn decode_null(content: &[u8]) -> Result<()> {
    if content.is_empty() {
        Ok(())
    } else {
        Err(ErrorKind::InvalidValue {
            tag: Tag::universal(false, universal::NULL),
        }
        .into())
    }
}

/// Dispatch a primitive universal-type decode by tag number, per spec.md
/// §4.4. SEQUENCE/SET are not handled here — they are always constructed
/// and are materialized as Lazy Constructed nodes by the BER decoder.
pub fn decode_primitive_value(tag: Tag, content: &[u8]) -> Result<Value> {
    match tag.number {
        universal::BOOLEAN => decode_boolean(content).map(Value::Boolean),
        universal::INTEGER => decode_integer(content).map(Value::Integer),
        universal::BIT_STRING => {
            let (unused_bits, bytes) = decode_bit_string(content)?;
            Ok(Value::BitString { unused_bits, bytes })
        }
        universal::OCTET_STRING => Ok(Value::OctetString(content.to_vec())),
        universal::NULL => decode_null(content).map(|_| Value::Null),
        universal::OBJECT_IDENTIFIER => oid::decode_oid(content).map(Value::ObjectIdentifier),
        universal::REAL => Ok(Value::MalformedData(content.to_vec())),
        universal::ENUMERATED => decode_integer(content).map(Value::Enumerated),
        universal::UTC_TIME => time::parse_utc_time(content).map(Value::UtcTime),
        universal::GENERALIZED_TIME => {
            time::parse_generalized_time(content).map(Value::GeneralizedTime)
        }
        n => match StringType::from_tag_number(n) {
            Some(st) => Ok(Value::String(st, content.to_vec())),
            None => Err(ErrorKind::NoValidTag {
                byte: n as u8,
            }
            .into()),
        },
    }
}

/// Encode a decoded value's content bytes (sans tag/length), the inverse
/// of [`decode_primitive_value`]. Used when a node's bytes must be
/// rebuilt structurally rather than returned from cache (spec.md §4.6).
pub fn encode_primitive_content(value: &Value) -> Result<Vec<u8>> {
    Ok(match value {
        Value::Boolean(b) => vec![if *b { 0xFF } else { 0x00 }],
        Value::Integer(n) => encode_integer(n),
        Value::BitString { unused_bits, bytes } => encode_bit_string(*unused_bits, bytes),
        Value::OctetString(bytes) => bytes.clone(),
        Value::Null => Vec::new(),
        Value::ObjectIdentifier(oid) => oid::encode_oid(oid)?,
        Value::String(_, bytes) => bytes.clone(),
        Value::UtcTime(ts) => time::format_utc_time(*ts).into_bytes(),
        Value::GeneralizedTime(ts) => time::format_generalized_time(*ts).into_bytes(),
        Value::Enumerated(n) => encode_integer(n),
        Value::MalformedData(bytes) => bytes.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boolean_is_permissive_on_read() {
        assert!(!decode_boolean(&[0x00]).unwrap());
        assert!(decode_boolean(&[0x01]).unwrap());
        assert!(decode_boolean(&[0x7F]).unwrap());
        assert!(decode_boolean(&[0x00, 0x00]).is_err());
    }

    #[test]
    fn empty_integer_is_zero() {
        assert_eq!(decode_integer(&[]).unwrap(), BigInt::zero());
        assert_eq!(encode_integer(&BigInt::zero()), vec![0]);
    }

    #[test]
    fn integer_round_trip() {
        for n in [-129i64, -1, 0, 1, 127, 128, 300] {
            let big = BigInt::from(n);
            let encoded = encode_integer(&big);
            assert_eq!(decode_integer(&encoded).unwrap(), big);
        }
    }

    #[test]
    fn bit_string_round_trip() {
        let (unused, bytes) = decode_bit_string(&[0x04, 0b1010_0000]).unwrap();
        assert_eq!(unused, 4);
        assert_eq!(bytes, vec![0b1010_0000]);
        assert_eq!(encode_bit_string(unused, &bytes), vec![0x04, 0b1010_0000]);
    }

    #[test]
    fn null_requires_empty_content() {
        assert!(decode_null(&[]).is_ok());
        assert!(decode_null(&[0x00]).is_err());
    }

    #[test]
    fn dispatches_by_tag_number() {
        let tag = Tag::universal(false, universal::INTEGER);
        assert_eq!(
            decode_primitive_value(tag, &[0x07]).unwrap(),
            Value::Integer(BigInt::from(7))
        );
    }

    #[test]
    fn unknown_universal_tag_fails() {
        let tag = Tag::universal(false, 99);
        assert!(decode_primitive_value(tag, &[]).is_err());
    }
}
