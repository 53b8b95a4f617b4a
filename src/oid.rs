//! OBJECT IDENTIFIER arithmetic and the mutable name↔OID registry.
//!
//! Grounded on `const-oid/src/lib.rs` and `const-oid/src/arcs.rs` for the
//! overall shape (an arc sequence, dotted-decimal `Display`, root-arc
//! merging), generalized to arbitrary-precision arcs via `num-bigint`
//! since `const-oid`'s fixed `u32` arcs cannot represent UUID-derived OIDs
//! under arc 2.25 (spec.md §4.2). The registry itself (`OidRegistry`,
//! `load_oids`) has no teacher counterpart — `const-oid` is const-context
//! only and carries no runtime name table — and is grounded instead on
//! `once_cell`'s global-lazy-state pattern as used in `dennisss-dacha`.

use crate::error::{Error, ErrorKind, Result};
use num_bigint::BigInt;
use num_traits::{ToPrimitive, Zero};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

/// Maximum content length accepted when decoding an OID (spec.md §4.2),
/// matching the conservative bound used by mainstream JVMs.
pub const MAX_OID_CONTENT_LEN: usize = 4096;

/// An OBJECT IDENTIFIER: a sequence of arbitrary-precision arcs.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Oid {
    arcs: Vec<BigInt>,
}

impl Oid {
    /// Construct an OID from its arcs. Does not validate arc constraints;
    /// use [`Oid::from_dotted`] or [`decode_oid`] for validated construction.
    pub fn from_arcs(arcs: Vec<BigInt>) -> Self {
        Self { arcs }
    }

    /// Borrow this OID's arcs.
    pub fn arcs(&self) -> &[BigInt] {
        &self.arcs
    }

    /// Parse a dotted-decimal string, e.g. `"1.2.840.113549.1.1.11"`.
    pub fn from_dotted(s: &str) -> Result<Self> {
        let mut arcs = Vec::new();
        for part in s.split('.') {
            let arc: BigInt = part
                .parse()
                .map_err(|_| Error::from(ErrorKind::MalformedOid))?;
            arcs.push(arc);
        }
        validate_arcs(&arcs)?;
        Ok(Self { arcs })
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, arc) in self.arcs.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{}", arc)?;
        }
        Ok(())
    }
}

fn validate_arcs(arcs: &[BigInt]) -> Result<()> {
    if arcs.len() < 2 {
        return Err(Error::from(ErrorKind::MalformedOid));
    }
    let first = arcs[0]
        .to_u8()
        .ok_or_else(|| Error::from(ErrorKind::MalformedOid))?;
    if first > 2 {
        return Err(Error::from(ErrorKind::MalformedOid));
    }
    if first < 2 && arcs[1] >= BigInt::from(40) {
        return Err(Error::from(ErrorKind::MalformedOid));
    }
    Ok(())
}

/// Decode an OBJECT IDENTIFIER's content octets (sans tag/length) into an
/// [`Oid`], per spec.md §4.2.
///
/// The first content octet encodes `first_arc * 40 + second_arc`. Each
/// subsequent arc is a base-128 big-endian sequence terminated by an octet
/// with bit 7 clear; the content's final octet must have bit 7 clear.
pub fn decode_oid(content: &[u8]) -> Result<Oid> {
    if content.is_empty() || content.len() > MAX_OID_CONTENT_LEN {
        return Err(Error::from(ErrorKind::MalformedOid));
    }
    if content.last().map(|b| b & 0x80 != 0).unwrap_or(true) {
        return Err(Error::from(ErrorKind::MalformedOid));
    }

    let mut arcs = Vec::new();
    let mut iter = content.iter().peekable();

    let mut first_value = BigInt::zero();
    loop {
        let byte = *iter
            .next()
            .ok_or_else(|| Error::from(ErrorKind::MalformedOid))?;
        first_value = (first_value << 7) | BigInt::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            break;
        }
    }

    let (first_arc, second_arc) = if first_value <= BigInt::from(79) {
        let first_small = first_value.to_u64().unwrap();
        (BigInt::from(first_small / 40), BigInt::from(first_small % 40))
    } else {
        (BigInt::from(2), first_value - BigInt::from(80))
    };
    arcs.push(first_arc);
    arcs.push(second_arc);

    while iter.peek().is_some() {
        let mut value = BigInt::zero();
        loop {
            let byte = *iter
                .next()
                .ok_or_else(|| Error::from(ErrorKind::MalformedOid))?;
            value = (value << 7) | BigInt::from(byte & 0x7F);
            if byte & 0x80 == 0 {
                break;
            }
        }
        arcs.push(value);
    }

    Ok(Oid { arcs })
}

/// Encode an [`Oid`]'s content octets (sans tag/length), per spec.md §4.2.
///
/// The first arc must be in `{0, 1, 2}`; if it is `0` or `1`, the second
/// arc must be `<= 39`. The first two arcs are merged as `first * 40 +
/// second` (computed as a big integer, since when `first == 2` the merged
/// value can exceed 127).
pub fn encode_oid(oid: &Oid) -> Result<Vec<u8>> {
    validate_arcs(&oid.arcs)?;

    let merged = &oid.arcs[0] * 40 + &oid.arcs[1];
    let mut out = write_base128(&merged);

    for arc in &oid.arcs[2..] {
        out.extend(write_base128(arc));
    }

    Ok(out)
}

fn write_base128(value: &BigInt) -> Vec<u8> {
    if value.is_zero() {
        return vec![0];
    }

    let mut septets = Vec::new();
    let mut n = value.clone();
    let mask = BigInt::from(0x7F);
    while !n.is_zero() {
        let septet = (&n & &mask).to_u8().unwrap();
        septets.push(septet);
        n >>= 7;
    }

    let mut out = Vec::with_capacity(septets.len());
    for (i, septet) in septets.iter().rev().enumerate() {
        if i + 1 < septets.len() {
            out.push(septet | 0x80);
        } else {
            out.push(*septet);
        }
    }
    out
}

/// Mutable, process-wide name↔OID registry.
///
/// Reads are lock-free after the writer releases the lock (standard
/// `RwLock` semantics); writes (`load_oids`) require taking the write lock
/// and are expected to be rare (startup-time table loading), matching
/// spec.md §5's description of the registry as "append-only; concurrent
/// reads safe, writes require external synchronization."
pub struct OidRegistry {
    by_name: RwLock<HashMap<String, Oid>>,
}

impl OidRegistry {
    fn new() -> Self {
        Self {
            by_name: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve a name to its OID, if registered.
    pub fn resolve(&self, name: &str) -> Option<Oid> {
        self.by_name.read().unwrap().get(name).cloned()
    }

    /// Merge a name→dotted-decimal table into the registry.
    pub fn load(&self, table: impl IntoIterator<Item = (String, String)>) -> Result<()> {
        let mut guard = self.by_name.write().unwrap();
        for (name, dotted) in table {
            guard.insert(name, Oid::from_dotted(&dotted)?);
        }
        Ok(())
    }

    /// Number of names currently registered.
    pub fn len(&self) -> usize {
        self.by_name.read().unwrap().len()
    }

    /// Is the registry empty?
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Process-wide OID name registry singleton, per spec.md §5/§6.2
/// (`load_oids`). Internal code should prefer taking a `&OidRegistry`
/// explicitly where practical; this is the ambient-configuration
/// convenience wrapper described in design note §9.
pub static REGISTRY: Lazy<OidRegistry> = Lazy::new(OidRegistry::new);

/// Load a name→dotted-decimal OID table into the process-wide registry.
/// Returns `true` on success, per spec.md §6.2's `load_oids` signature.
pub fn load_oids(table: impl IntoIterator<Item = (String, String)>) -> bool {
    REGISTRY.load(table).is_ok()
}

/// Resolve a string to an [`Oid`]: if it parses as dotted-decimal, use that
/// directly; otherwise consult the name registry.
pub fn resolve_oid(s: &str) -> Result<Oid> {
    if s.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(false) {
        return Oid::from_dotted(s);
    }
    REGISTRY
        .resolve(s)
        .ok_or_else(|| ErrorKind::UnknownOid { name: s.to_string() }.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_rsa_sha256_with_rsa_encryption() {
        // 1.2.840.113549.1.1.11 (sha256WithRSAEncryption)
        let content = [
            0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x01, 0x0B,
        ];
        let oid = decode_oid(&content).unwrap();
        assert_eq!(oid.to_string(), "1.2.840.113549.1.1.11");
    }

    #[test]
    fn round_trip_encode_decode() {
        let oid = Oid::from_dotted("1.2.840.113549.1.1.11").unwrap();
        let encoded = encode_oid(&oid).unwrap();
        let decoded = decode_oid(&encoded).unwrap();
        assert_eq!(oid, decoded);
    }

    #[test]
    fn round_trip_decode_encode_bytes() {
        let content = [0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x01, 0x0B];
        let oid = decode_oid(&content).unwrap();
        let re_encoded = encode_oid(&oid).unwrap();
        assert_eq!(&re_encoded[..], &content[..]);
    }

    #[test]
    fn arc_under_uuid_node_is_arbitrary_precision() {
        // 2.25.<uuid-as-128-bit-integer> style OID: exceeds u64.
        let big = "2.25.329800735698586629295641978511506172918";
        let oid = Oid::from_dotted(big).unwrap();
        let encoded = encode_oid(&oid).unwrap();
        let decoded = decode_oid(&encoded).unwrap();
        assert_eq!(oid, decoded);
    }

    #[test]
    fn second_arc_bounded_when_first_arc_small() {
        assert!(Oid::from_dotted("1.40.1").is_err());
        assert!(Oid::from_dotted("0.39.1").is_ok());
    }

    #[test]
    fn registry_resolves_loaded_names() {
        let registry = OidRegistry::new();
        registry
            .load([(
                "sha256WithRSAEncryption".to_string(),
                "1.2.840.113549.1.1.11".to_string(),
            )])
            .unwrap();
        assert_eq!(
            registry.resolve("sha256WithRSAEncryption").unwrap(),
            Oid::from_dotted("1.2.840.113549.1.1.11").unwrap()
        );
        assert!(registry.resolve("nonexistent").is_none());
    }
}
