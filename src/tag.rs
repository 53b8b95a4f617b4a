//! ASN.1 tag identity and the identifier-octet codec (X.690 §8.1).
//!
//! Grounded on `der/src/tag.rs` and `der/src/tag/number.rs`, generalized
//! from the teacher's fixed 0-30 short-form-only tag number to the
//! arbitrary-precision long-form tag numbers spec.md §4.1 requires.

use crate::error::{Error, ErrorKind, Result};
use crate::reader::ByteReader;
use std::fmt;

/// Indicator bit for constructed-form encoding.
const CONSTRUCTED_FLAG: u8 = 0b0010_0000;

/// ASN.1 tag class (X.690 §8.1.2.2).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum Class {
    /// Universal class: built-in ASN.1 types.
    Universal,
    /// Application class.
    Application,
    /// Context-specific class.
    ContextSpecific,
    /// Private class.
    Private,
}

impl Class {
    pub(crate) fn from_bits(bits: u8) -> Self {
        match (bits >> 6) & 0b11 {
            0 => Class::Universal,
            1 => Class::Application,
            2 => Class::ContextSpecific,
            _ => Class::Private,
        }
    }

    pub(crate) fn to_bits(self) -> u8 {
        match self {
            Class::Universal => 0b0000_0000,
            Class::Application => 0b0100_0000,
            Class::ContextSpecific => 0b1000_0000,
            Class::Private => 0b1100_0000,
        }
    }
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Class::Universal => "UNIVERSAL",
            Class::Application => "APPLICATION",
            Class::ContextSpecific => "CONTEXT",
            Class::Private => "PRIVATE",
        };
        f.write_str(s)
    }
}

/// An ASN.1 tag: `{class, constructed, number}` (X.690 §8.1.2).
///
/// Tag numbers 0-30 use the single-octet short form; tag numbers >= 31 use
/// the long form, a chain of base-128 septets with the continuation bit
/// (bit 7) set on every octet but the last.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Tag {
    /// Tag class.
    pub class: Class,
    /// Whether the value is constructed (vs. primitive).
    pub constructed: bool,
    /// Tag number.
    pub number: u64,
}

impl Tag {
    /// Construct a new tag.
    pub const fn new(class: Class, constructed: bool, number: u64) -> Self {
        Self {
            class,
            constructed,
            number,
        }
    }

    /// Construct a UNIVERSAL-class tag.
    pub const fn universal(constructed: bool, number: u64) -> Self {
        Self::new(Class::Universal, constructed, number)
    }

    /// Construct a CONTEXT-class tag.
    pub const fn context(constructed: bool, number: u64) -> Self {
        Self::new(Class::ContextSpecific, constructed, number)
    }

    /// Is this tag UNIVERSAL-class SEQUENCE?
    pub fn is_sequence(self) -> bool {
        self.class == Class::Universal && self.number == universal::SEQUENCE
    }

    /// Is this tag UNIVERSAL-class SET?
    pub fn is_set(self) -> bool {
        self.class == Class::Universal && self.number == universal::SET
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.class == Class::Universal {
            match universal::name(self.number) {
                Some(name) => write!(f, "{}", name),
                None => write!(f, "UNIVERSAL {}", self.number),
            }
        } else {
            write!(
                f,
                "[{} {}{}]",
                self.class,
                self.number,
                if self.constructed { " constructed" } else { "" }
            )
        }
    }
}

/// Decode a tag's identifier octet(s) starting at the reader's cursor.
///
/// Returns `ErrorKind::Truncated` if the buffer ends mid-tag and
/// `ErrorKind::MalformedTag` if a long-form tag's first septet is zero
/// (X.690 §8.1.2.4.2(c)).
pub fn decode_tag(r: &mut ByteReader<'_>) -> Result<Tag> {
    let start = r.position();
    let first = r.read_u8()?;
    let class = Class::from_bits(first);
    let constructed = first & CONSTRUCTED_FLAG != 0;
    let low = first & 0b0001_1111;

    if low < 31 {
        return Ok(Tag::new(class, constructed, low as u64));
    }

    let mut number: u64 = 0;
    let mut first_septet = true;
    loop {
        let byte = r.read_u8()?;
        if first_septet {
            if byte & 0x7F == 0 {
                return Err(Error::from(ErrorKind::MalformedTag).at(start));
            }
            first_septet = false;
        }
        number = number
            .checked_shl(7)
            .ok_or_else(|| Error::from(ErrorKind::Overflow).at(start))?
            | (byte & 0x7F) as u64;

        if byte & 0x80 == 0 {
            break;
        }
    }

    Ok(Tag::new(class, constructed, number))
}

/// Encode a tag's identifier octet(s).
pub fn encode_tag(tag: Tag) -> Vec<u8> {
    let mut out = Vec::new();
    let constructed_bit = if tag.constructed {
        CONSTRUCTED_FLAG
    } else {
        0
    };
    let class_bits = tag.class.to_bits();

    if tag.number < 31 {
        out.push(class_bits | constructed_bit | tag.number as u8);
        return out;
    }

    out.push(class_bits | constructed_bit | 0b0001_1111);

    let mut septets = Vec::new();
    let mut n = tag.number;
    loop {
        septets.push((n & 0x7F) as u8);
        n >>= 7;
        if n == 0 {
            break;
        }
    }

    for (i, septet) in septets.iter().rev().enumerate() {
        if i + 1 < septets.len() {
            out.push(septet | 0x80);
        } else {
            out.push(*septet);
        }
    }

    out
}

/// Universal tag number constants (X.690 §8.4) plus the two pseudo-tags
/// the schema layer uses (`CHOICE`/`ANY`), per spec.md §6.3.
pub mod universal {
    /// `BOOLEAN`
    pub const BOOLEAN: u64 = 1;
    /// `INTEGER`
    pub const INTEGER: u64 = 2;
    /// `BIT STRING`
    pub const BIT_STRING: u64 = 3;
    /// `OCTET STRING`
    pub const OCTET_STRING: u64 = 4;
    /// `NULL`
    pub const NULL: u64 = 5;
    /// `OBJECT IDENTIFIER`
    pub const OBJECT_IDENTIFIER: u64 = 6;
    /// `REAL` (not decoded, see spec.md Non-goals)
    pub const REAL: u64 = 9;
    /// `ENUMERATED`
    pub const ENUMERATED: u64 = 10;
    /// `UTF8String`
    pub const UTF8_STRING: u64 = 12;
    /// `SEQUENCE` / `SEQUENCE OF`
    pub const SEQUENCE: u64 = 16;
    /// `SET` / `SET OF`
    pub const SET: u64 = 17;
    /// `NumericString`
    pub const NUMERIC_STRING: u64 = 18;
    /// `PrintableString`
    pub const PRINTABLE_STRING: u64 = 19;
    /// `TeletexString` (a.k.a. T61String)
    pub const T61_STRING: u64 = 20;
    /// `VideotexString`
    pub const VIDEOTEX_STRING: u64 = 21;
    /// `IA5String`
    pub const IA5_STRING: u64 = 22;
    /// `UTCTime`
    pub const UTC_TIME: u64 = 23;
    /// `GeneralizedTime`
    pub const GENERALIZED_TIME: u64 = 24;
    /// `GraphicString`
    pub const GRAPHIC_STRING: u64 = 25;
    /// `VisibleString`
    pub const VISIBLE_STRING: u64 = 26;
    /// `GeneralString`
    pub const GENERAL_STRING: u64 = 27;
    /// `UniversalString`
    pub const UNIVERSAL_STRING: u64 = 28;
    /// `BMPString`
    pub const BMP_STRING: u64 = 30;

    /// Pseudo-tag used by the schema layer for `CHOICE` nodes.
    pub const CHOICE: i64 = -1;
    /// Pseudo-tag used by the schema layer for `ANY` nodes.
    pub const ANY: i64 = -2;

    /// Human-readable name for a universal tag number, if known.
    pub fn name(number: u64) -> Option<&'static str> {
        Some(match number {
            BOOLEAN => "BOOLEAN",
            INTEGER => "INTEGER",
            BIT_STRING => "BIT STRING",
            OCTET_STRING => "OCTET STRING",
            NULL => "NULL",
            OBJECT_IDENTIFIER => "OBJECT IDENTIFIER",
            REAL => "REAL",
            ENUMERATED => "ENUMERATED",
            UTF8_STRING => "UTF8String",
            SEQUENCE => "SEQUENCE",
            SET => "SET",
            NUMERIC_STRING => "NumericString",
            PRINTABLE_STRING => "PrintableString",
            T61_STRING => "TeletexString",
            VIDEOTEX_STRING => "VideotexString",
            IA5_STRING => "IA5String",
            UTC_TIME => "UTCTime",
            GENERALIZED_TIME => "GeneralizedTime",
            GRAPHIC_STRING => "GraphicString",
            VISIBLE_STRING => "VisibleString",
            GENERAL_STRING => "GeneralString",
            UNIVERSAL_STRING => "UniversalString",
            BMP_STRING => "BMPString",
            _ => return None,
        })
    }

    /// May this universal tag legally appear with the constructed bit set
    /// under the BER relaxation (spec.md §4.4)? SEQUENCE/SET always must;
    /// these four string-ish types additionally may, for indefinite-length
    /// constructed encodings.
    pub fn allows_constructed_relaxation(number: u64) -> bool {
        matches!(
            number,
            BIT_STRING | OCTET_STRING | UTC_TIME | GENERALIZED_TIME
        )
    }

    /// Must this universal tag always be constructed?
    pub fn must_be_constructed(number: u64) -> bool {
        matches!(number, SEQUENCE | SET)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_form_round_trip() {
        let tag = Tag::universal(false, universal::INTEGER);
        let bytes = encode_tag(tag);
        assert_eq!(bytes, vec![0x02]);
        let mut r = ByteReader::new(&bytes);
        assert_eq!(decode_tag(&mut r).unwrap(), tag);
    }

    #[test]
    fn long_form_round_trip() {
        let tag = Tag::context(true, 1000);
        let bytes = encode_tag(tag);
        assert!(bytes.len() > 1);
        let mut r = ByteReader::new(&bytes);
        assert_eq!(decode_tag(&mut r).unwrap(), tag);
    }

    #[test]
    fn long_form_leading_zero_septet_is_malformed() {
        // class/constructed bits + 0b11111 (long form marker), then a
        // continuation-free zero septet as the first subsequent octet.
        let bytes = [0b0001_1111, 0x00];
        let mut r = ByteReader::new(&bytes);
        let err = decode_tag(&mut r).unwrap_err();
        assert_eq!(*err.kind(), ErrorKind::MalformedTag);
    }

    #[test]
    fn sequence_tag_constant() {
        let tag = Tag::universal(true, universal::SEQUENCE);
        assert_eq!(encode_tag(tag), vec![0x30]);
    }
}
