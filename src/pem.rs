//! PEM armor extraction (spec.md §6.1).
//!
//! Grounded on `pem-rfc7468/src/decoder.rs`'s `Encapsulation` parser (locate
//! the `-----BEGIN <label>-----` / `-----END <label>-----` boundaries, then
//! base64-decode the text between them via `base64ct`), relaxed from the
//! teacher's RFC 7468 "Strict" grammar — which requires the body to already
//! be wrapped at a fixed column and forbids any text outside the boundaries
//! — to the looser tolerance spec.md §6.1 requires: arbitrary leading/
//! trailing non-armor text, and interior CR/LF/space/tab anywhere in the
//! base64 body rather than only at line breaks.

use crate::error::{Error, ErrorKind, Result};
use base64ct::{Base64, Encoding};

const BEGIN_MARKER: &str = "-----BEGIN ";
const LABEL_TERMINATOR: &str = "-----";
const END_MARKER: &str = "-----END ";

/// Extract DER bytes from `input`, which may be PEM-armored or already raw
/// DER (spec.md §6.1 "auto-detect"). If `-----BEGIN ` armor is found, its
/// base64 body is decoded; otherwise (no armor, or the input is not valid
/// UTF-8 text at all) `input` is returned unchanged on the assumption it is
/// already DER.
pub fn extract_ber(input: &[u8]) -> Result<Vec<u8>> {
    let text = match std::str::from_utf8(input) {
        Ok(text) => text,
        Err(_) => return Ok(input.to_vec()),
    };
    match find_armor(text) {
        Some((_, body)) => decode_base64_body(body),
        None => Ok(input.to_vec()),
    }
}

/// Extract both the type label and the decoded DER bytes from a PEM
/// document, failing if no armor is present (unlike [`extract_ber`], which
/// falls back to treating unarmored input as DER).
pub fn decode_pem(input: &[u8]) -> Result<(String, Vec<u8>)> {
    let text = std::str::from_utf8(input).map_err(|_| {
        Error::from(ErrorKind::MalformedPem {
            detail: "input is not valid UTF-8 text".to_string(),
        })
    })?;
    let (label, body) = find_armor(text).ok_or_else(|| {
        Error::from(ErrorKind::MalformedPem {
            detail: "no PEM armor found".to_string(),
        })
    })?;
    Ok((label.to_string(), decode_base64_body(body)?))
}

/// Locate the first `-----BEGIN <label>-----` / `-----END `-delimited
/// region in `text`, tolerating arbitrary text before, after, and (per
/// RFC 7468 §2, "Parsers MAY disregard the label in the post-encapsulation
/// boundary") a mismatched label on the closing boundary.
fn find_armor(text: &str) -> Option<(&str, &str)> {
    let begin_at = text.find(BEGIN_MARKER)?;
    let after_begin = &text[begin_at + BEGIN_MARKER.len()..];
    let label_end = after_begin.find(LABEL_TERMINATOR)?;
    let label = after_begin[..label_end].trim();

    let body_region = &after_begin[label_end + LABEL_TERMINATOR.len()..];
    let end_at = body_region.find(END_MARKER)?;
    let body = &body_region[..end_at];

    Some((label, body))
}

/// Strip interior whitespace and base64-decode the remainder.
fn decode_base64_body(body: &str) -> Result<Vec<u8>> {
    let clean: Vec<u8> = body
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    let mut buf = vec![0u8; clean.len()];
    let decoded_len = Base64::decode(&clean, &mut buf)
        .map_err(|_| {
            Error::from(ErrorKind::MalformedPem {
                detail: "invalid base64 in PEM body".to_string(),
            })
        })?
        .len();
    buf.truncate(decoded_len);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CERT_PEM: &str = "leading garbage, not armor\n\
-----BEGIN CERTIFICATE-----\n\
MAMCAQc=\n\
-----END CERTIFICATE-----\n\
trailing garbage";

    #[test]
    fn extracts_body_ignoring_surrounding_text() {
        let der = extract_ber(CERT_PEM.as_bytes()).unwrap();
        assert_eq!(der, vec![0x30, 0x03, 0x02, 0x01, 0x07]);
    }

    #[test]
    fn tolerates_interior_whitespace_mid_line() {
        let pem = "-----BEGIN CERTIFICATE-----\nMA MC AQ c=\n-----END CERTIFICATE-----";
        let der = extract_ber(pem.as_bytes()).unwrap();
        assert_eq!(der, vec![0x30, 0x03, 0x02, 0x01, 0x07]);
    }

    #[test]
    fn falls_back_to_der_when_no_armor_present() {
        let raw = [0x30, 0x03, 0x02, 0x01, 0x07];
        assert_eq!(extract_ber(&raw).unwrap(), raw.to_vec());
    }

    #[test]
    fn decode_pem_returns_label() {
        let (label, der) = decode_pem(CERT_PEM.as_bytes()).unwrap();
        assert_eq!(label, "CERTIFICATE");
        assert_eq!(der, vec![0x30, 0x03, 0x02, 0x01, 0x07]);
    }

    #[test]
    fn decode_pem_without_armor_fails() {
        assert!(decode_pem(b"not pem at all").is_err());
    }
}
