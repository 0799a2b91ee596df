//! Adapter Capability Set
//!
//! The patch engine never assumes a concrete presentation technology; it
//! drives whatever implements this trait. A DOM embedding maps these straight
//! onto document calls, a terminal embedding onto its own node arena, and
//! the test suite onto an in-memory document that records every call.

use crate::value::Value;

/// The capabilities the reconciler needs from the presentation layer.
///
/// `Node` is the adapter's handle type — compared by identity-like equality
/// (`PartialEq`) when the engine needs to recognize a container it has seen.
pub trait RendererOps {
    type Node: Clone + PartialEq + Send + Sync + 'static;

    /// Create a host element for `tag`.
    fn create_element(&self, tag: &str) -> Self::Node;

    /// Create a standalone text node.
    fn create_text(&self, text: &str) -> Self::Node;

    /// Insert `node` into `parent`, before `anchor` when given, else append.
    fn insert(&self, node: &Self::Node, parent: &Self::Node, anchor: Option<&Self::Node>);

    /// Detach `node` from its parent.
    fn remove(&self, node: &Self::Node);

    /// Replace the text content of a text node.
    fn set_text(&self, node: &Self::Node, text: &str);

    /// Replace an element's entire text content.
    fn set_element_text(&self, node: &Self::Node, text: &str);

    /// The node's current parent, if attached.
    fn parent_node(&self, node: &Self::Node) -> Option<Self::Node>;

    /// The node's next sibling, if any.
    fn next_sibling(&self, node: &Self::Node) -> Option<Self::Node>;

    /// Apply one property transition. `old`/`new` follow the diff contract:
    /// `new = None` removes the property.
    fn patch_prop(&self, node: &Self::Node, key: &str, old: Option<&Value>, new: Option<&Value>);
}
