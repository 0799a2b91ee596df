//! Virtual Nodes
//!
//! A virtual node is one version of a declarative tree description: a kind
//! (text, fragment, host element, component), a property bag, children, and
//! an optional reconciliation key. Nodes are built fresh on every render
//! pass; the patch engine compares the previous version against the next and
//! stores the backing adapter node on whichever version is current.
//!
//! Two nodes are reconcilable in place iff their kind and key both match —
//! see [`same_vnode`]. Everything else is a teardown-and-remount.

use std::sync::Arc;

use bitflags::bitflags;
use indexmap::IndexMap;
use parking_lot::Mutex;

use super::renderer::ComponentInstance;
use crate::value::{Obj, Value};

bitflags! {
    /// Kind and child-kind bits, set once at construction.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct ShapeFlags: u32 {
        const ELEMENT = 1;
        const STATEFUL_COMPONENT = 1 << 2;
        const TEXT_CHILDREN = 1 << 3;
        const ARRAY_CHILDREN = 1 << 4;
    }
}

/// Reconciliation key. Explicit on list children that may reorder; absent
/// keys compare equal to each other.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Key {
    Int(i64),
    Str(String),
}

impl From<i64> for Key {
    fn from(n: i64) -> Self {
        Key::Int(n)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Str(s.to_owned())
    }
}

/// The node-kind discriminator.
pub enum NodeKind<N> {
    Text,
    Fragment,
    Element(String),
    Component(Arc<ComponentDef<N>>),
}

/// Children bag: absent, text, or an ordered node list. Scalars normalize
/// to text at construction time.
pub enum Children<N> {
    None,
    Text(String),
    Nodes(Vec<VNode<N>>),
}

impl<N> From<()> for Children<N> {
    fn from(_: ()) -> Self {
        Children::None
    }
}

impl<N> From<&str> for Children<N> {
    fn from(s: &str) -> Self {
        Children::Text(s.to_owned())
    }
}

impl<N> From<String> for Children<N> {
    fn from(s: String) -> Self {
        Children::Text(s)
    }
}

impl<N> From<Value> for Children<N> {
    fn from(v: Value) -> Self {
        Children::Text(v.to_text())
    }
}

impl<N> From<Vec<VNode<N>>> for Children<N> {
    fn from(nodes: Vec<VNode<N>>) -> Self {
        Children::Nodes(nodes)
    }
}

/// A stateful component description: declared prop names, a state
/// initializer, and the render function producing the component's subtree
/// from `(state, props)`.
pub struct ComponentDef<N> {
    pub name: String,
    pub props: Vec<String>,
    pub data: Box<dyn Fn() -> Obj + Send + Sync>,
    pub render: Box<dyn Fn(&Obj, &Obj) -> VNode<N> + Send + Sync>,
}

impl<N> ComponentDef<N> {
    pub fn new<D, R>(name: impl Into<String>, props: Vec<String>, data: D, render: R) -> Arc<Self>
    where
        D: Fn() -> Obj + Send + Sync + 'static,
        R: Fn(&Obj, &Obj) -> VNode<N> + Send + Sync + 'static,
    {
        Arc::new(Self {
            name: name.into(),
            props,
            data: Box::new(data),
            render: Box::new(render),
        })
    }
}

/// One immutable-per-version tree node. Cloning shares the version.
pub struct VNode<N> {
    inner: Arc<VNodeInner<N>>,
}

struct VNodeInner<N> {
    kind: NodeKind<N>,
    props: IndexMap<String, Value>,
    key: Option<Key>,
    children: Children<N>,
    shape: ShapeFlags,
    /// Backing adapter node once mounted.
    el: Mutex<Option<N>>,
    /// Component runtime state, attached at mount.
    component: Mutex<Option<Arc<ComponentInstance<N>>>>,
}

impl<N: Clone> VNode<N> {
    fn build(
        kind: NodeKind<N>,
        props: IndexMap<String, Value>,
        key: Option<Key>,
        children: Children<N>,
        mut shape: ShapeFlags,
    ) -> Self {
        match &children {
            Children::Text(_) => shape |= ShapeFlags::TEXT_CHILDREN,
            Children::Nodes(_) => shape |= ShapeFlags::ARRAY_CHILDREN,
            Children::None => {}
        }
        Self {
            inner: Arc::new(VNodeInner {
                kind,
                props,
                key,
                children,
                shape,
                el: Mutex::new(None),
                component: Mutex::new(None),
            }),
        }
    }

    /// A standalone text node.
    pub fn text(text: impl Into<String>) -> Self {
        Self::build(
            NodeKind::Text,
            IndexMap::new(),
            None,
            Children::Text(text.into()),
            ShapeFlags::empty(),
        )
    }

    /// A container-less grouping node; children mount into the parent.
    pub fn fragment(children: Vec<VNode<N>>) -> Self {
        Self::build(
            NodeKind::Fragment,
            IndexMap::new(),
            None,
            Children::Nodes(children),
            ShapeFlags::empty(),
        )
    }

    /// A host element.
    pub fn element(tag: impl Into<String>, children: impl Into<Children<N>>) -> Self {
        Self::build(
            NodeKind::Element(tag.into()),
            IndexMap::new(),
            None,
            children.into(),
            ShapeFlags::ELEMENT,
        )
    }

    /// A component node.
    pub fn component(def: Arc<ComponentDef<N>>, children: impl Into<Children<N>>) -> Self {
        Self::build(
            NodeKind::Component(def),
            IndexMap::new(),
            None,
            children.into(),
            ShapeFlags::STATEFUL_COMPONENT,
        )
    }

    /// Attach a reconciliation key.
    pub fn with_key(self, key: impl Into<Key>) -> Self {
        self.rebuild(|inner| inner.key = Some(key.into()))
    }

    /// Attach one property.
    pub fn with_prop(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.rebuild(|inner| {
            inner.props.insert(key.into(), value.into());
        })
    }

    /// Attach a whole property bag.
    pub fn with_props<K, V, I>(self, props: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.rebuild(|inner| {
            for (k, v) in props {
                inner.props.insert(k.into(), v.into());
            }
        })
    }

    /// Builder steps run before the node is shared, so the inner record can
    /// still be reshaped.
    fn rebuild(mut self, f: impl FnOnce(&mut VNodeInner<N>)) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            f(inner);
            self
        } else {
            // Shared already: clone the description into a fresh version.
            let mut inner = VNodeInner {
                kind: self.inner.kind.clone_kind(),
                props: self.inner.props.clone(),
                key: self.inner.key.clone(),
                children: self.inner.children.clone_children(),
                shape: self.inner.shape,
                el: Mutex::new(None),
                component: Mutex::new(None),
            };
            f(&mut inner);
            Self {
                inner: Arc::new(inner),
            }
        }
    }

    pub fn kind(&self) -> &NodeKind<N> {
        &self.inner.kind
    }

    pub fn key(&self) -> Option<&Key> {
        self.inner.key.as_ref()
    }

    pub fn props(&self) -> &IndexMap<String, Value> {
        &self.inner.props
    }

    pub fn children(&self) -> &Children<N> {
        &self.inner.children
    }

    pub fn shape(&self) -> ShapeFlags {
        self.inner.shape
    }

    /// The backing adapter node, once mounted.
    pub fn el(&self) -> Option<N> {
        self.inner.el.lock().clone()
    }

    pub(crate) fn set_el(&self, node: N) {
        *self.inner.el.lock() = Some(node);
    }

    /// The component instance attached at mount, for component nodes.
    pub fn instance(&self) -> Option<Arc<ComponentInstance<N>>> {
        self.inner.component.lock().clone()
    }

    pub(crate) fn set_component(&self, instance: Arc<ComponentInstance<N>>) {
        *self.inner.component.lock() = Some(instance);
    }

    /// Same version (reference identity), not same description.
    pub fn ptr_eq(a: &VNode<N>, b: &VNode<N>) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }
}

impl<N> NodeKind<N> {
    fn clone_kind(&self) -> Self {
        match self {
            NodeKind::Text => NodeKind::Text,
            NodeKind::Fragment => NodeKind::Fragment,
            NodeKind::Element(tag) => NodeKind::Element(tag.clone()),
            NodeKind::Component(def) => NodeKind::Component(Arc::clone(def)),
        }
    }
}

impl<N: Clone> Children<N> {
    fn clone_children(&self) -> Self {
        match self {
            Children::None => Children::None,
            Children::Text(s) => Children::Text(s.clone()),
            Children::Nodes(nodes) => Children::Nodes(nodes.clone()),
        }
    }
}

impl<N> Clone for VNode<N> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<N> std::fmt::Debug for VNode<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.inner.kind {
            NodeKind::Text => "text".to_owned(),
            NodeKind::Fragment => "fragment".to_owned(),
            NodeKind::Element(tag) => format!("element <{tag}>"),
            NodeKind::Component(def) => format!("component {}", def.name),
        };
        f.debug_struct("VNode")
            .field("kind", &kind)
            .field("key", &self.inner.key)
            .finish()
    }
}

/// Reconcilable in place: kind equality (tags by content, component
/// definitions by identity) and key equality, both strict.
pub fn same_vnode<N>(a: &VNode<N>, b: &VNode<N>) -> bool {
    let kinds_match = match (&a.inner.kind, &b.inner.kind) {
        (NodeKind::Text, NodeKind::Text) => true,
        (NodeKind::Fragment, NodeKind::Fragment) => true,
        (NodeKind::Element(t1), NodeKind::Element(t2)) => t1 == t2,
        (NodeKind::Component(d1), NodeKind::Component(d2)) => Arc::ptr_eq(d1, d2),
        _ => false,
    };
    kinds_match && a.inner.key == b.inner.key
}
