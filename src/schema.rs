//! Declarative ASN.1 schema description (spec.md §4.7, §6.4).
//!
//! Grounded on `der/src/asn1/context_specific.rs` and `der/src/tag/mod.rs`
//! for the tagging vocabulary (class/constructed/constant), generalized
//! from the teacher's compile-time `Decode`/`Encode` trait dispatch to a
//! runtime tree so one schema value can describe X.509, CSR, CRL, PKCS#10
//! and SPKAC shapes without a distinct Rust type per ASN.1 module.

use crate::tag::{universal, Class};
use num_bigint::BigInt;

/// The declared type of a schema leaf or composite node.
#[derive(Clone, Debug, PartialEq)]
pub enum SchemaType {
    /// A specific universal-class tag number (spec.md §6.3).
    Universal(u64),
    /// `TYPE_ANY`: the decoded value's runtime kind drives interpretation.
    Any,
}

/// The shape of a schema node (spec.md §4.7).
#[derive(Clone, Debug)]
pub enum SchemaKind {
    /// A leaf primitive type.
    Primitive(SchemaType),
    /// `SEQUENCE { ... }`: fixed, ordered, named children.
    Sequence(Vec<(String, Schema)>),
    /// `SET { ... }`: fixed named children (order on the wire is not
    /// significant for input, but is for the declared schema order on
    /// output — this crate applies the same ordered-cursor matching to
    /// SET as to SEQUENCE, see DESIGN.md).
    Set(Vec<(String, Schema)>),
    /// `SEQUENCE OF`: repeated elements of one child schema.
    SequenceOf {
        min: usize,
        max: Option<usize>,
        element: Box<Schema>,
    },
    /// `SET OF`: repeated elements of one child schema, canonically
    /// sorted by encoded byte string on output (spec.md §4.8).
    SetOf {
        min: usize,
        max: Option<usize>,
        element: Box<Schema>,
    },
    /// `CHOICE { ... }`: exactly one of the named alternatives is present.
    Choice(Vec<(String, Schema)>),
}

/// A DEFAULT value declared on a schema child, compared against the
/// decoded/semantic value to decide whether to omit it on re-encode
/// (spec.md §4.7 rule 7, §4.8).
#[derive(Clone, Debug, PartialEq)]
pub enum DefaultValue {
    Boolean(bool),
    Integer(BigInt),
    OctetString(Vec<u8>),
    Oid(String),
    NamedBits(Vec<String>),
}

/// One node of a declarative ASN.1 schema (spec.md §4.7).
#[derive(Clone, Debug)]
pub struct Schema {
    pub kind: SchemaKind,
    /// Child may be absent entirely at decode time and is simply skipped
    /// (never synthesized) rather than failing `MissingRequiredField`.
    pub optional: bool,
    /// Child may be absent; when present at encode time and equal to this
    /// value, it is omitted from the DER output (spec.md §4.8).
    pub default: Option<DefaultValue>,
    /// Context-specific (or `class`-overridden) tag number for this child.
    pub constant: Option<u64>,
    /// Non-default tag class, used together with `cast` (spec.md §4.8
    /// "tag re-classing").
    pub class: Option<Class>,
    /// The re-classed tag number, paired with `class`.
    pub cast: Option<u64>,
    /// IMPLICIT tagging: the inner tag is replaced by `constant`/`cast`.
    pub implicit: bool,
    /// EXPLICIT tagging: the inner TLV is wrapped in a new constructed TLV.
    pub explicit: bool,
    /// Named-bit list (BitString) or enumerated-name table (Integer),
    /// interpreted per spec.md §4.7 rule 6.
    pub mapping: Option<Vec<String>>,
}

impl Schema {
    fn leaf(kind: SchemaKind) -> Self {
        Self {
            kind,
            optional: false,
            default: None,
            constant: None,
            class: None,
            cast: None,
            implicit: false,
            explicit: false,
            mapping: None,
        }
    }

    /// A leaf schema for the given universal tag number.
    pub fn universal(tag_number: u64) -> Self {
        Self::leaf(SchemaKind::Primitive(SchemaType::Universal(tag_number)))
    }

    /// `BOOLEAN`.
    pub fn boolean() -> Self {
        Self::universal(universal::BOOLEAN)
    }

    /// `INTEGER`.
    pub fn integer() -> Self {
        Self::universal(universal::INTEGER)
    }

    /// `BIT STRING`.
    pub fn bit_string() -> Self {
        Self::universal(universal::BIT_STRING)
    }

    /// `OCTET STRING`.
    pub fn octet_string() -> Self {
        Self::universal(universal::OCTET_STRING)
    }

    /// `NULL`.
    pub fn null() -> Self {
        Self::universal(universal::NULL)
    }

    /// `OBJECT IDENTIFIER`.
    pub fn oid() -> Self {
        Self::universal(universal::OBJECT_IDENTIFIER)
    }

    /// `ENUMERATED`.
    pub fn enumerated() -> Self {
        Self::universal(universal::ENUMERATED)
    }

    /// `UTCTime`.
    pub fn utc_time() -> Self {
        Self::universal(universal::UTC_TIME)
    }

    /// `GeneralizedTime`.
    pub fn generalized_time() -> Self {
        Self::universal(universal::GENERALIZED_TIME)
    }

    /// A string-valued universal type, by its tag number (spec.md §6.3).
    pub fn string(tag_number: u64) -> Self {
        Self::universal(tag_number)
    }

    /// `TYPE_ANY`.
    pub fn any() -> Self {
        Self::leaf(SchemaKind::Primitive(SchemaType::Any))
    }

    /// `SEQUENCE { ... }` with the given ordered named children.
    pub fn sequence(children: Vec<(&str, Schema)>) -> Self {
        Self::leaf(SchemaKind::Sequence(
            children.into_iter().map(|(n, s)| (n.to_string(), s)).collect(),
        ))
    }

    /// `SET { ... }` with the given named children.
    pub fn set(children: Vec<(&str, Schema)>) -> Self {
        Self::leaf(SchemaKind::Set(
            children.into_iter().map(|(n, s)| (n.to_string(), s)).collect(),
        ))
    }

    /// `SEQUENCE OF element`.
    pub fn sequence_of(element: Schema) -> Self {
        Self::leaf(SchemaKind::SequenceOf {
            min: 0,
            max: None,
            element: Box::new(element),
        })
    }

    /// `SET OF element`.
    pub fn set_of(element: Schema) -> Self {
        Self::leaf(SchemaKind::SetOf {
            min: 0,
            max: None,
            element: Box::new(element),
        })
    }

    /// `CHOICE { ... }` with the given named alternatives.
    pub fn choice(alternatives: Vec<(&str, Schema)>) -> Self {
        Self::leaf(SchemaKind::Choice(
            alternatives
                .into_iter()
                .map(|(n, s)| (n.to_string(), s))
                .collect(),
        ))
    }

    /// Mark this schema child `OPTIONAL`.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Give this schema child a `DEFAULT` value.
    pub fn default(mut self, value: DefaultValue) -> Self {
        self.default = Some(value);
        self
    }

    /// Apply a context-specific tag `[n]` to this schema child.
    pub fn constant(mut self, n: u64) -> Self {
        self.constant = Some(n);
        self
    }

    /// Apply a non-default tag class `[class n]` to this schema child.
    pub fn class_cast(mut self, class: Class, n: u64) -> Self {
        self.class = Some(class);
        self.cast = Some(n);
        self
    }

    /// Tag this child IMPLICIT (the default when `constant`/`cast` is set
    /// without an explicit choice, see DESIGN.md).
    pub fn implicit(mut self) -> Self {
        self.implicit = true;
        self.explicit = false;
        self
    }

    /// Tag this child EXPLICIT.
    pub fn explicit(mut self) -> Self {
        self.explicit = true;
        self.implicit = false;
        self
    }

    /// Attach a named-bit / enumerated-name mapping table.
    pub fn mapping(mut self, names: Vec<&str>) -> Self {
        self.mapping = Some(names.into_iter().map(str::to_string).collect());
        self
    }

    /// Whether this schema's decoded/synthesized tag uses context tagging
    /// at all (constant set, with or without an explicit class/cast).
    pub fn has_context_tag(&self) -> bool {
        self.constant.is_some() || self.cast.is_some()
    }

    /// Whether, absent an explicit `implicit()`/`explicit()` call, this
    /// schema should be treated as IMPLICIT. Per DESIGN.md's resolution of
    /// an open question: a context/cast tag with neither flag set defaults
    /// to IMPLICIT, the common case for PKIX-style modules compiled with
    /// `DEFINITIONS IMPLICIT TAGS`.
    pub fn effective_implicit(&self) -> bool {
        if self.explicit {
            false
        } else {
            self.implicit || self.has_context_tag()
        }
    }

    /// The tag number this schema's content is framed under once any
    /// context/cast tagging is stripped away (i.e. the "real" universal
    /// type), used when synthesizing a header for IMPLICIT re-decoding
    /// and when picking the inner tag for SEQUENCE/SET/SEQUENCE-OF kinds.
    pub fn inner_universal_tag(&self) -> Option<u64> {
        match &self.kind {
            SchemaKind::Primitive(SchemaType::Universal(t)) => Some(*t),
            SchemaKind::Sequence(_) | SchemaKind::SequenceOf { .. } => Some(universal::SEQUENCE),
            SchemaKind::Set(_) | SchemaKind::SetOf { .. } => Some(universal::SET),
            SchemaKind::Primitive(SchemaType::Any) | SchemaKind::Choice(_) => None,
        }
    }

    /// Is this schema's underlying universal type a constructed one
    /// (SEQUENCE/SET/SEQUENCE-OF/SET-OF)?
    pub fn is_structural(&self) -> bool {
        matches!(
            self.kind,
            SchemaKind::Sequence(_)
                | SchemaKind::Set(_)
                | SchemaKind::SequenceOf { .. }
                | SchemaKind::SetOf { .. }
        )
    }
}

/// Is `tag_number` one of the eleven string-like universal types (plus,
/// per spec.md §4.7 rule 5's literal tag range, UTCTime/GeneralizedTime)
/// that this crate tolerates cross-matching during CHOICE/type resolution?
pub fn is_tolerant_string_range(tag_number: u64) -> bool {
    (18..=30).contains(&tag_number)
}
