//! The decoded node tree and the Lazy Constructed node (spec.md §3 "Decoded
//! node" / "Lazy Constructed node", §4.6).
//!
//! Grounded on `der/src/asn1/any.rs`'s `AnyRef` (a tag plus a borrowed byte
//! range, decoded further on demand) generalized to own its bytes and to
//! support in-place mutation with cache invalidation, since the teacher's
//! `AnyRef` is immutable and lifetime-scoped to the input buffer — this
//! crate's signature-preservation requirement (spec.md §1) needs a node
//! that outlives the decode call and can be edited by the map phase
//! without forcing a full re-decode. The `Rc<RefCell<_>>`/`Weak` shape for
//! shared, mutable, parent-aware nodes has no direct teacher counterpart;
//! it follows the conventional pattern for tree types that need upward
//! cache invalidation (every child keeps a weak pointer to its parent).

use crate::error::Result;
use crate::length::{encode_length, Length};
use crate::tag::{encode_tag, Tag};
use crate::value::{self, Value};
use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// Shared handle to a [`LazyNode`]. Cloning is cheap (reference count
/// bump); all clones observe the same mutable state.
pub type LazyHandle = Rc<RefCell<LazyNode>>;

/// The content a [`DecodedNode`] carries, per spec.md §3.
#[derive(Clone, Debug)]
pub enum NodeContent {
    /// A decoded primitive universal-type value.
    Primitive(Value),
    /// A constructed body, materialized lazily and mutable in place.
    Constructed(LazyHandle),
    /// Raw content bytes kept verbatim: used for class != Universal
    /// primitive content, or in place of any of the above when
    /// blobs-on-bad-decode substitutes an opaque blob for a decode failure.
    Opaque(Vec<u8>),
}

/// A single decoded TLV, as produced by the BER decoder.
#[derive(Clone, Debug)]
pub struct DecodedNode {
    /// Absolute offset of this node's header within the root buffer.
    pub start: usize,
    /// Length of the header (identifier + length octets) in bytes.
    pub header_len: usize,
    /// This node's tag triple.
    pub tag: Tag,
    /// The node's definite content length, or `Indefinite` if the
    /// original encoding used the BER indefinite form (content is always
    /// fully materialized internally regardless).
    pub length: Length,
    /// The raw header bytes as originally decoded.
    pub header_bytes: Vec<u8>,
    /// This node's content.
    pub content: NodeContent,
}

impl DecodedNode {
    /// Borrow this node's decoded primitive value, if it is one (neither a
    /// constructed body nor an opaque blob).
    pub fn as_value(&self) -> Option<&Value> {
        match &self.content {
            NodeContent::Primitive(v) => Some(v),
            _ => None,
        }
    }

    /// This node's value as an `INTEGER`/`ENUMERATED`, if it decoded as one.
    pub fn content_as_integer(&self) -> Option<num_bigint::BigInt> {
        match self.as_value()? {
            Value::Integer(n) | Value::Enumerated(n) => Some(n.clone()),
            _ => None,
        }
    }

    /// This node's constructed-body handle, if it has one.
    pub fn as_constructed(&self) -> Option<&LazyHandle> {
        match &self.content {
            NodeContent::Constructed(h) => Some(h),
            _ => None,
        }
    }

    /// Re-encode this node to bytes. For [`NodeContent::Constructed`] this
    /// defers to [`LazyNode`]'s cache short-circuit; for the other two
    /// variants the header is always recomputed from the current tag,
    /// which reproduces the original bytes exactly when nothing has
    /// changed (tag/content are immutable for those variants).
    pub fn reencode(&self) -> Result<Vec<u8>> {
        match &self.content {
            NodeContent::Primitive(v) => {
                let content = value::encode_primitive_content(v)?;
                Ok(frame(self.tag, &content))
            }
            NodeContent::Constructed(handle) => re_emit(handle),
            NodeContent::Opaque(bytes) => {
                let mut out = self.header_bytes.clone();
                out.extend_from_slice(bytes);
                Ok(out)
            }
        }
    }
}

fn frame(tag: Tag, content: &[u8]) -> Vec<u8> {
    let mut out = encode_tag(tag);
    out.extend(encode_length(content.len() as u32));
    out.extend_from_slice(content);
    out
}

/// The Lazy Constructed node's state machine (spec.md §4.6).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum NodeState {
    /// Just produced by the decoder; nothing has linked a schema to it yet.
    FreshFromDecode,
    /// A schema mapping has been linked via [`link_mapping`].
    Mapped,
    /// A structural mutation occurred since the cache was last valid.
    Dirty,
    /// The cache was just recomputed and is valid again.
    Clean,
}

/// A constructed node's interior-mutable state: original bytes, lazily
/// materialized children, the schema-mapping pointer, the wrapping
/// prefix, and the encoded-cache-valid flag (spec.md §4.6).
pub struct LazyNode {
    tag: Tag,
    raw_content: Vec<u8>,
    content_start: usize,
    depth: usize,
    children: Option<Vec<DecodedNode>>,
    state: NodeState,
    cache: Vec<u8>,
    cache_valid: bool,
    mapping: Option<String>,
    wrapping: Option<Vec<u8>>,
    parent: Option<Weak<RefCell<LazyNode>>>,
}

impl LazyNode {
    /// Wrap a freshly decoded constructed body. `original` is the full
    /// header+content bytes as decoded; `raw_content` is the content
    /// bytes alone (EOC markers stripped for indefinite-length bodies),
    /// used to materialize children on demand. `content_start` is the
    /// root-buffer offset the content begins at and `depth` is this
    /// node's nesting depth, both used to report
    /// [`crate::error::ErrorKind::RecursionDepthExceeded`] accurately
    /// when children are later materialized.
    pub fn new(
        tag: Tag,
        original: Vec<u8>,
        raw_content: Vec<u8>,
        content_start: usize,
        depth: usize,
    ) -> LazyHandle {
        Rc::new(RefCell::new(LazyNode {
            tag,
            raw_content,
            content_start,
            depth,
            children: None,
            state: NodeState::FreshFromDecode,
            cache: original,
            cache_valid: true,
            mapping: None,
            wrapping: None,
            parent: None,
        }))
    }

    /// This node's current tag (possibly rewritten by [`replace_tag`]).
    pub fn tag(&self) -> Tag {
        self.tag
    }

    /// Current state-machine state.
    pub fn state(&self) -> NodeState {
        self.state
    }

    /// Is the encoded cache currently valid (would re-emit return bytes
    /// identical to what was originally decoded, modulo wrapping)?
    pub fn cache_valid(&self) -> bool {
        self.cache_valid
    }

    /// The schema breadcrumb installed by [`link_mapping`], if any.
    pub fn mapping(&self) -> Option<&str> {
        self.mapping.as_deref()
    }
}

/// Materialize (and cache) this node's children by decoding its raw
/// content range as a sequence of sibling TLVs. Bounded by the same
/// recursion-depth cap as the initial decode (spec.md §4.5): each level
/// of lazy materialization counts as one more level of nesting.
pub fn children(handle: &LazyHandle) -> Result<Vec<DecodedNode>> {
    {
        let node = handle.borrow();
        if let Some(children) = &node.children {
            return Ok(children.clone());
        }
    }
    let (raw, content_start, depth) = {
        let node = handle.borrow();
        (node.raw_content.clone(), node.content_start, node.depth)
    };
    let decoded = crate::decoder::decode_siblings(&raw, content_start, depth + 1)?;
    for child in &decoded {
        if let NodeContent::Constructed(child_handle) = &child.content {
            child_handle.borrow_mut().parent = Some(Rc::downgrade(handle));
        }
    }
    handle.borrow_mut().children = Some(decoded.clone());
    Ok(decoded)
}

/// Install a schema-mapping breadcrumb on this node. Transitions
/// `FreshFromDecode -> Mapped`. Does not invalidate the encoded cache:
/// the bytes underneath are unchanged, only their schema interpretation
/// is now known (spec.md §4.6).
pub fn link_mapping(handle: &LazyHandle, path: String) {
    let mut node = handle.borrow_mut();
    node.mapping = Some(path);
    if node.state == NodeState::FreshFromDecode {
        node.state = NodeState::Mapped;
    }
}

/// Rewrite this node's universal tag, as applied when the schema declares
/// IMPLICIT tagging. Does not invalidate the cache for the same reason as
/// [`link_mapping`]: the bytes are not being changed, only re-described.
pub fn replace_tag(handle: &LazyHandle, tag: Tag) {
    handle.borrow_mut().tag = tag;
}

/// Install a wrapping byte prefix, emitted ahead of this node's own bytes
/// on every re-emit (used when an OCTET STRING wraps an inner structured
/// value whose natural encoding omits that wrapper).
pub fn set_wrapping(handle: &LazyHandle, prefix: Vec<u8>) {
    handle.borrow_mut().wrapping = Some(prefix);
}

/// Mark this node dirty and, unless `propagate` is false (cache
/// invalidation suppressed, spec.md §5), propagate dirtiness up the
/// parent chain.
pub fn mark_dirty(handle: &LazyHandle, propagate: bool) {
    {
        let mut node = handle.borrow_mut();
        node.state = NodeState::Dirty;
        node.cache_valid = false;
    }
    if !propagate {
        return;
    }
    let parent = handle.borrow().parent.clone();
    if let Some(weak) = parent {
        if let Some(parent_handle) = weak.upgrade() {
            mark_dirty(&parent_handle, true);
        }
    }
}

/// Replace this node's child list wholesale (used by the map phase when
/// a mutation changes cardinality, e.g. appending/removing an element of
/// a SEQUENCE OF). The replacement is automatically compacted to a dense
/// index sequence since it is already a `Vec`.
pub fn set_children(handle: &LazyHandle, children: Vec<DecodedNode>, propagate_dirty: bool) {
    for child in &children {
        if let NodeContent::Constructed(child_handle) = &child.content {
            child_handle.borrow_mut().parent = Some(Rc::downgrade(handle));
        }
    }
    handle.borrow_mut().children = Some(children);
    mark_dirty(handle, propagate_dirty);
}

/// Re-emit this node's bytes. If the cache is valid, returns the cached
/// bytes (with the wrapping prefix prepended, if any) unchanged. If
/// dirty, recomputes bytes from the current children, transitioning the
/// state back to `Clean` (spec.md §4.6).
pub fn re_emit(handle: &LazyHandle) -> Result<Vec<u8>> {
    let cached = {
        let node = handle.borrow();
        if node.cache_valid {
            Some((node.wrapping.clone(), node.cache.clone()))
        } else {
            None
        }
    };
    if let Some((wrapping, cache)) = cached {
        let mut out = wrapping.unwrap_or_default();
        out.extend_from_slice(&cache);
        return Ok(out);
    }

    let kids = children(handle)?;
    let mut content = Vec::new();
    for child in &kids {
        content.extend(child.reencode()?);
    }

    let (tag, wrapping) = {
        let node = handle.borrow();
        (node.tag, node.wrapping.clone())
    };
    let bytes = frame(tag, &content);

    {
        let mut node = handle.borrow_mut();
        node.cache = bytes.clone();
        node.cache_valid = true;
        node.state = NodeState::Clean;
    }

    let mut out = wrapping.unwrap_or_default();
    out.extend_from_slice(&bytes);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::universal;

    fn int_node(start: usize, value: i64) -> DecodedNode {
        DecodedNode {
            start,
            header_len: 2,
            tag: Tag::universal(false, universal::INTEGER),
            length: Length::Definite(1),
            header_bytes: vec![0x02, 0x01],
            content: NodeContent::Primitive(Value::Integer(value.into())),
        }
    }

    #[test]
    fn fresh_node_cache_is_valid() {
        let handle = LazyNode::new(
            Tag::universal(true, universal::SEQUENCE),
            vec![0x30, 0x03, 0x02, 0x01, 0x07],
            vec![0x02, 0x01, 0x07],
        0,
        0,
    );
        assert!(handle.borrow().cache_valid());
        assert_eq!(re_emit(&handle).unwrap(), vec![0x30, 0x03, 0x02, 0x01, 0x07]);
    }

    #[test]
    fn mutation_invalidates_cache_and_recomputes() {
        let handle = LazyNode::new(
            Tag::universal(true, universal::SEQUENCE),
            vec![0x30, 0x03, 0x02, 0x01, 0x07],
            vec![0x02, 0x01, 0x07],
        0,
        0,
    );
        set_children(&handle, vec![int_node(2, 9)], true);
        assert_eq!(handle.borrow().state(), NodeState::Dirty);
        let bytes = re_emit(&handle).unwrap();
        assert_eq!(bytes, vec![0x30, 0x03, 0x02, 0x01, 0x09]);
        assert_eq!(handle.borrow().state(), NodeState::Clean);
    }

    #[test]
    fn link_mapping_does_not_invalidate_cache() {
        let handle = LazyNode::new(
            Tag::universal(true, universal::SEQUENCE),
            vec![0x30, 0x03, 0x02, 0x01, 0x07],
            vec![0x02, 0x01, 0x07],
        0,
        0,
    );
        link_mapping(&handle, "tbsCertificate".to_string());
        assert!(handle.borrow().cache_valid());
        assert_eq!(handle.borrow().state(), NodeState::Mapped);
    }

    #[test]
    fn dirty_propagates_to_parent_unless_suppressed() {
        let parent = LazyNode::new(
            Tag::universal(true, universal::SEQUENCE),
            vec![0x30, 0x05, 0x30, 0x03, 0x02, 0x01, 0x07],
            vec![0x30, 0x03, 0x02, 0x01, 0x07],
        0,
        0,
    );
        let kids = children(&parent).unwrap();
        let child_handle = match &kids[0].content {
            NodeContent::Constructed(h) => h.clone(),
            _ => panic!("expected constructed child"),
        };
        set_children(&child_handle, vec![int_node(0, 1)], true);
        assert_eq!(parent.borrow().state(), NodeState::Dirty);
    }
}
