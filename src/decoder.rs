//! The BER recursive-descent decoder (spec.md §4.5).
//!
//! Grounded on `der/src/decoder.rs`'s `Decoder::decode` dispatch (tag then
//! length then value), but reshaped around lazy materialization: this
//! decoder's root call decodes exactly one TLV and, for constructed
//! content, captures the raw bytes into a [`crate::node::LazyNode`]
//! instead of eagerly recursing — the teacher's `Decoder` always
//! recurses immediately since it has no signature-preservation
//! requirement to defer.

use crate::context::DecodeConfig;
use crate::error::{Error, ErrorKind, Result};
use crate::length::{decode_length, Length};
use crate::node::{DecodedNode, LazyNode, NodeContent};
use crate::reader::ByteReader;
use crate::tag::{decode_tag, universal, Class, Tag};
use crate::value::{self, Value};

/// Decode a single BER/DER value from `bytes`, using the process-wide
/// ambient configuration (spec.md §6.2's `decode_ber(bytes, start=0)`).
pub fn decode_ber(bytes: &[u8]) -> Result<DecodedNode> {
    decode_ber_with_config(bytes, DecodeConfig::from_global())
}

/// Decode a single BER/DER value from `bytes` under an explicit
/// configuration.
pub fn decode_ber_with_config(bytes: &[u8], config: DecodeConfig) -> Result<DecodedNode> {
    let mut r = ByteReader::new(bytes);
    decode_one(&mut r, 0, &config)
}

/// Decode consecutive sibling TLVs filling `bytes` exactly, as used to
/// materialize a Lazy Constructed node's children. `base_offset` is the
/// absolute root-buffer offset `bytes` begins at, for error reporting.
pub fn decode_siblings(
    bytes: &[u8],
    base_offset: usize,
    depth: usize,
) -> Result<Vec<DecodedNode>> {
    let config = DecodeConfig::from_global();
    let mut out = Vec::new();
    let mut pos = 0usize;
    while pos < bytes.len() {
        let mut r = ByteReader::at(&bytes[pos..], base_offset + pos);
        let node = decode_one(&mut r, depth, &config)?;
        pos += r.mark();
        out.push(node);
    }
    Ok(out)
}

fn validate_universal_constructed(tag: Tag) -> Result<()> {
    if tag.class != Class::Universal {
        return Ok(());
    }
    if universal::must_be_constructed(tag.number) && !tag.constructed {
        return Err(ErrorKind::UnexpectedPrimitive { tag }.into());
    }
    if tag.constructed
        && !universal::must_be_constructed(tag.number)
        && !universal::allows_constructed_relaxation(tag.number)
    {
        return Err(ErrorKind::UnexpectedConstructed { tag }.into());
    }
    Ok(())
}

fn decode_one(r: &mut ByteReader<'_>, depth: usize, config: &DecodeConfig) -> Result<DecodedNode> {
    if depth > config.recursion_limit {
        return Err(ErrorKind::RecursionDepthExceeded {
            limit: config.recursion_limit,
        }
        .into());
    }

    let header_mark = r.mark();
    let start = r.position();
    let tag = decode_tag(r)?;
    let length = decode_length(r)?;
    let header_len = r.mark() - header_mark;
    let header_bytes = r.slice_range(header_mark, header_mark + header_len).to_vec();

    if let Err(e) = validate_universal_constructed(tag) {
        return opaque_or_propagate(r, start, tag, length, header_bytes, config, e);
    }

    if tag.constructed {
        decode_constructed(r, start, tag, length, header_len, header_bytes, depth, config)
    } else {
        decode_primitive(r, start, tag, length, header_bytes, config)
    }
}

fn decode_primitive(
    r: &mut ByteReader<'_>,
    start: usize,
    tag: Tag,
    length: Length,
    header_bytes: Vec<u8>,
    config: &DecodeConfig,
) -> Result<DecodedNode> {
    let len = length
        .definite()
        .ok_or_else(|| Error::from(ErrorKind::InvalidValue { tag }).at(start))?;
    let header_len = header_bytes.len();
    if len as usize > r.remaining_len() {
        return Err(Error::from(ErrorKind::LengthExceedsBuffer).at(start));
    }
    let content = r.read_slice(len as usize)?;

    let node_content = if tag.class != Class::Universal {
        NodeContent::Opaque(content.to_vec())
    } else {
        match value::decode_primitive_value(tag, content) {
            Ok(v) => NodeContent::Primitive(v),
            Err(e) => {
                if config.blobs_on_bad_decode {
                    NodeContent::Opaque(content.to_vec())
                } else {
                    return Err(e.at(start));
                }
            }
        }
    };

    Ok(DecodedNode {
        start,
        header_len,
        tag,
        length,
        header_bytes,
        content: node_content,
    })
}

#[allow(clippy::too_many_arguments)]
fn decode_constructed(
    r: &mut ByteReader<'_>,
    start: usize,
    tag: Tag,
    length: Length,
    header_len: usize,
    header_bytes: Vec<u8>,
    depth: usize,
    config: &DecodeConfig,
) -> Result<DecodedNode> {
    let content_start = r.position();

    let (content_bytes, total_content_len, trailer) = match length {
        Length::Definite(len) => {
            if len as usize > r.remaining_len() {
                return Err(Error::from(ErrorKind::LengthExceedsBuffer).at(start));
            }
            let content = r.read_slice(len as usize)?.to_vec();
            (content, len as usize, Vec::new())
        }
        Length::Indefinite => {
            let body_mark = r.mark();
            let content_len = skip_indefinite_body(r, depth + 1, config)?;
            let content = r.slice_range(body_mark, body_mark + content_len).to_vec();
            (content, content_len, vec![0x00, 0x00])
        }
    };

    let original = {
        let mut full = header_bytes.clone();
        full.extend_from_slice(&content_bytes);
        full.extend_from_slice(&trailer);
        full
    };

    let handle = LazyNode::new(tag, original, content_bytes, content_start, depth);

    Ok(DecodedNode {
        start,
        header_len,
        tag,
        length: Length::Definite((total_content_len + trailer.len()) as u32),
        header_bytes,
        content: NodeContent::Constructed(handle),
    })
}

/// Advance `r` past an indefinite-length body, returning the number of
/// content bytes (EOC marker excluded) it contains. Recurses through
/// nested TLVs purely to find their extents — it does not materialize
/// them — so it shares the same recursion-depth cap as full decoding.
fn skip_indefinite_body(r: &mut ByteReader<'_>, depth: usize, config: &DecodeConfig) -> Result<usize> {
    if depth > config.recursion_limit {
        return Err(ErrorKind::RecursionDepthExceeded {
            limit: config.recursion_limit,
        }
        .into());
    }
    let body_start = r.mark();
    loop {
        if r.is_empty() {
            return Err(Error::from(ErrorKind::Truncated).at(r.position()));
        }
        let peeked_start = r.mark();
        let tag = decode_tag(r)?;
        let length = decode_length(r)?;

        if tag.number == 0 && tag.class == Class::Universal && !tag.constructed {
            match length {
                Length::Definite(0) => return Ok(peeked_start - body_start),
                _ => return Err(Error::from(ErrorKind::UnexpectedEoc).at(r.position())),
            }
        }

        match length {
            Length::Definite(len) => {
                r.skip(len as usize)?;
            }
            Length::Indefinite => {
                skip_indefinite_body(r, depth + 1, config)?;
            }
        }
    }
}

fn opaque_or_propagate(
    r: &mut ByteReader<'_>,
    start: usize,
    tag: Tag,
    length: Length,
    header_bytes: Vec<u8>,
    config: &DecodeConfig,
    err: Error,
) -> Result<DecodedNode> {
    if !config.blobs_on_bad_decode {
        return Err(err.at(start));
    }
    let header_len = header_bytes.len();
    match length {
        Length::Definite(len) => {
            let content = r.read_slice(len as usize)?.to_vec();
            Ok(DecodedNode {
                start,
                header_len,
                tag,
                length,
                header_bytes,
                content: NodeContent::Opaque(content),
            })
        }
        Length::Indefinite => Err(err.at(start)),
    }
}

/// Concatenate a constructed BitString/OctetString's materialized
/// children content bytes, per spec.md §8 scenario 6 ("request content
/// concatenation"). BitString children additionally drop each non-final
/// child's (always-zero) unused-bit count octet before concatenation.
pub fn concatenate_constructed_string(node: &DecodedNode) -> Result<Vec<u8>> {
    let handle = node.as_constructed().ok_or_else(|| {
        Error::from(ErrorKind::MappingMismatch {
            detail: "expected a constructed string node".to_string(),
        })
    })?;
    let children = crate::node::children(handle)?;
    let mut out = Vec::new();
    let is_bit_string = node.tag.number == universal::BIT_STRING;
    for child in &children {
        match &child.content {
            NodeContent::Primitive(Value::OctetString(bytes)) => out.extend_from_slice(bytes),
            NodeContent::Primitive(Value::BitString { bytes, .. }) if is_bit_string => {
                out.extend_from_slice(bytes)
            }
            _ => {
                return Err(ErrorKind::MappingMismatch {
                    detail: "constructed string child was not a matching primitive".to_string(),
                }
                .into())
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_sequence_of_one_integer() {
        let node = decode_ber(&[0x30, 0x03, 0x02, 0x01, 0x07]).unwrap();
        assert!(node.tag.is_sequence());
        let handle = node.as_constructed().unwrap().clone();
        let children = crate::node::children(&handle).unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(
            children[0].content_as_integer(),
            Some(num_bigint::BigInt::from(7))
        );
    }

    #[test]
    fn reencode_matches_original_bytes() {
        let bytes = [0x30, 0x03, 0x02, 0x01, 0x07];
        let node = decode_ber(&bytes).unwrap();
        assert_eq!(node.reencode().unwrap(), bytes);
    }

    #[test]
    fn malformed_tag_on_truncated_buffer() {
        assert!(decode_ber(&[0x30]).is_err());
    }

    #[test]
    fn recursion_depth_exceeded() {
        // 129 levels of nested empty SEQUENCEs, decoded root-first; lazy
        // materialization means only materializing every level actually
        // exercises the depth cap.
        let mut nested = vec![0x30u8, 0x00];
        for _ in 0..129 {
            let mut outer = vec![0x30u8, nested.len() as u8];
            outer.extend_from_slice(&nested);
            nested = outer;
        }
        let root = decode_ber(&nested).unwrap();
        let mut handle = root.as_constructed().unwrap().clone();
        let result = loop {
            let kids = crate::node::children(&handle);
            match kids {
                Ok(k) if k.is_empty() => break Ok(()),
                Ok(k) => match k[0].as_constructed() {
                    Some(h) => handle = h.clone(),
                    None => break Ok(()),
                },
                Err(e) => break Err(e),
            }
        };
        assert!(result.is_err());
    }

    #[test]
    fn indefinite_length_constructed_octet_string_concatenates() {
        let bytes = [
            0x24, 0x80, 0x04, 0x02, 0xAA, 0xBB, 0x04, 0x02, 0xCC, 0xDD, 0x00, 0x00,
        ];
        let node = decode_ber(&bytes).unwrap();
        assert_eq!(node.tag.number, universal::OCTET_STRING);
        let concatenated = concatenate_constructed_string(&node).unwrap();
        assert_eq!(concatenated, vec![0xAA, 0xBB, 0xCC, 0xDD]);
    }

    #[test]
    fn primitive_length_exceeding_buffer_is_length_exceeds_buffer() {
        // INTEGER header claims 5 content bytes but only 1 follows.
        let bytes = [0x02, 0x05, 0x2A];
        let err = decode_ber(&bytes).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::LengthExceedsBuffer);
    }

    #[test]
    fn constructed_length_exceeding_buffer_is_length_exceeds_buffer() {
        // SEQUENCE header claims 10 content bytes but only 2 follow.
        let bytes = [0x30, 0x0A, 0x02, 0x01];
        let err = decode_ber(&bytes).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::LengthExceedsBuffer);
    }

    #[test]
    fn explicit_context_tag_wrapper_decodes() {
        // [0] EXPLICIT { INTEGER 42 }
        let bytes = [0xA0, 0x03, 0x02, 0x01, 0x2A];
        let node = decode_ber(&bytes).unwrap();
        assert_eq!(node.tag.class, Class::ContextSpecific);
        assert!(node.tag.constructed);
        let handle = node.as_constructed().unwrap().clone();
        let kids = crate::node::children(&handle).unwrap();
        assert_eq!(kids[0].content_as_integer(), Some(num_bigint::BigInt::from(42)));
    }
}
