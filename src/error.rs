//! Error types.

use crate::tag::Tag;
use std::fmt;

/// Result type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type.
///
/// Wraps an [`ErrorKind`] together with the byte offset (relative to the
/// buffer the failing operation was reading or writing) at which it
/// occurred, and, for mapping/encoding failures, a dotted breadcrumb
/// identifying the schema field being processed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Error {
    kind: ErrorKind,
    position: Option<usize>,
    path: Option<String>,
}

impl Error {
    /// Create a new [`Error`] with no position/path context.
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            position: None,
            path: None,
        }
    }

    /// Get the [`ErrorKind`] which occurred.
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Get the byte offset at which this error occurred, if known.
    pub fn position(&self) -> Option<usize> {
        self.position
    }

    /// Get the dotted schema breadcrumb for this error, if known.
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Annotate this error with the byte offset it occurred at, unless one
    /// is already set (innermost offset wins).
    pub fn at(mut self, position: usize) -> Self {
        if self.position.is_none() {
            self.position = Some(position);
        }
        self
    }

    /// Prepend a field name to this error's dotted breadcrumb.
    ///
    /// Called as errors unwind through [`crate::map`] and [`crate::encoder`]
    /// so that the final path reads outer-to-inner, e.g. `tbsCertificate.serialNumber`.
    pub fn in_field(mut self, field: &str) -> Self {
        self.path = Some(match self.path.take() {
            Some(rest) => format!("{}.{}", field, rest),
            None => field.to_string(),
        });
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;

        if let Some(path) = &self.path {
            write!(f, " (at {})", path)?;
        }

        if let Some(pos) = self.position {
            write!(f, " (byte offset {})", pos)?;
        }

        Ok(())
    }
}

impl std::error::Error for Error {}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Error {
        Error::new(kind)
    }
}

/// Error kind. Each variant corresponds to one of the error kinds
/// enumerated in the specification's error-handling section.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Buffer ended before a tag/length/value completed.
    Truncated,

    /// Long-form tag with a leading zero septet (X.690 §8.1.2.4.2(c)).
    MalformedTag,

    /// Long-form length exceeds 4 bytes.
    LengthTooLarge,

    /// Declared length exceeds the remaining bytes in the buffer.
    LengthExceedsBuffer,

    /// Recursion depth exceeded the configured cap.
    RecursionDepthExceeded {
        /// The cap that was exceeded.
        limit: usize,
    },

    /// A universal type that must be primitive was encoded as constructed.
    UnexpectedConstructed {
        /// The tag which was unexpectedly constructed.
        tag: Tag,
    },

    /// A universal type that must be constructed (SEQUENCE/SET) was primitive.
    UnexpectedPrimitive {
        /// The tag which was unexpectedly primitive.
        tag: Tag,
    },

    /// Malformed OBJECT IDENTIFIER content.
    MalformedOid,

    /// Decoded primitive tag is not in the known universal set.
    NoValidTag {
        /// Raw tag byte encountered.
        byte: u8,
    },

    /// End-of-contents marker encountered where none was expected.
    UnexpectedEoc,

    /// Schema type and decoded type are incompatible.
    MappingMismatch {
        /// Human-readable description of the mismatch.
        detail: String,
    },

    /// CHOICE resolution failed: no alternative matched.
    NoChoiceAlternative,

    /// A required schema field was absent at decode time.
    MissingRequiredField {
        /// Name of the missing field.
        field: String,
    },

    /// A value was present that the schema does not describe.
    UnmappedValue,

    /// Name-to-OID lookup failed during encoding.
    UnknownOid {
        /// The name that failed to resolve.
        name: String,
    },

    /// A TYPE_ANY value was encountered with no original byte backing.
    EncodedDataUnavailable,

    /// Malformed UTCTime/GeneralizedTime content.
    MalformedTime,

    /// Malformed PEM armor.
    MalformedPem {
        /// Human-readable description.
        detail: String,
    },

    /// Arithmetic overflow while computing a length or offset.
    Overflow,

    /// Generic value-level constraint violation for the named tag.
    InvalidValue {
        /// Tag of the offending value.
        tag: Tag,
    },
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Truncated => write!(f, "buffer truncated"),
            ErrorKind::MalformedTag => write!(f, "malformed tag: leading zero septet"),
            ErrorKind::LengthTooLarge => write!(f, "long-form length exceeds 4 bytes"),
            ErrorKind::LengthExceedsBuffer => {
                write!(f, "declared length exceeds remaining buffer")
            }
            ErrorKind::RecursionDepthExceeded { limit } => {
                write!(f, "recursion depth exceeded (limit {})", limit)
            }
            ErrorKind::UnexpectedConstructed { tag } => {
                write!(f, "unexpected constructed encoding for {}", tag)
            }
            ErrorKind::UnexpectedPrimitive { tag } => {
                write!(f, "unexpected primitive encoding for {}", tag)
            }
            ErrorKind::MalformedOid => write!(f, "malformed OBJECT IDENTIFIER"),
            ErrorKind::NoValidTag { byte } => {
                write!(f, "unknown universal tag: 0x{:02x}", byte)
            }
            ErrorKind::UnexpectedEoc => write!(f, "unexpected end-of-contents marker"),
            ErrorKind::MappingMismatch { detail } => write!(f, "schema mismatch: {}", detail),
            ErrorKind::NoChoiceAlternative => write!(f, "no CHOICE alternative matched"),
            ErrorKind::MissingRequiredField { field } => {
                write!(f, "missing required field: {}", field)
            }
            ErrorKind::UnmappedValue => write!(f, "value has no corresponding schema field"),
            ErrorKind::UnknownOid { name } => write!(f, "unknown OID name: {}", name),
            ErrorKind::EncodedDataUnavailable => {
                write!(f, "ANY value has no original encoding to re-emit")
            }
            ErrorKind::MalformedTime => write!(f, "malformed UTCTime/GeneralizedTime"),
            ErrorKind::MalformedPem { detail } => write!(f, "malformed PEM: {}", detail),
            ErrorKind::Overflow => write!(f, "integer overflow"),
            ErrorKind::InvalidValue { tag } => write!(f, "invalid value for {}", tag),
        }
    }
}
