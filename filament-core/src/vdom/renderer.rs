//! Diff / Patch Engine
//!
//! The reconciler: given the previous tree description and the next one, it
//! computes and applies the minimal mutation sequence through the injected
//! [`RendererOps`](super::ops::RendererOps) adapter.
//!
//! # Dispatch
//!
//! `patch` short-circuits identical versions, tears down and remounts when
//! the nodes are not reconcilable (kind or key differ), and otherwise
//! dispatches on kind: text, fragment (container-less, children patch into
//! the parent), host element, component.
//!
//! # Keyed children
//!
//! Child lists reconcile with head/tail trimming, pure insert/remove fast
//! paths, and an LIS-guided middle pass: matched old nodes patch in place
//! and record their old position, the longest increasing run of those
//! positions stays put, and everything else mounts or moves in reverse
//! order so each anchor is the already-settled next sibling.
//!
//! # Components
//!
//! A component mounts by wrapping "render the subtree, patch it against the
//! previous one" in a [`ReactiveEffect`] whose scheduler enqueues the update
//! on the job queue — the protocol that turns a burst of state writes into
//! one re-render per flush. A patch failure inside that deferred update is a
//! tree-producer bug and fails fast (panics); see the crate error taxonomy.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::{debug, trace};

use super::ops::RendererOps;
use super::seq::longest_increasing_subsequence;
use super::vnode::{same_vnode, Children, ComponentDef, Key, NodeKind, VNode};
use crate::error::PatchError;
use crate::reactive::effect::{EffectInner, ReactiveEffect};
use crate::reactive::scheduler::{queue_job, Job};
use crate::value::{Obj, Value};

/// Runtime state attached to a mounted component vnode.
pub struct ComponentInstance<N> {
    /// Reactive component state from the definition's initializer.
    pub state: Obj,
    /// Declared props, reactive.
    pub props: Obj,
    /// Props not declared by the component; passed through untouched.
    pub attrs: IndexMap<String, Value>,
    /// The subtree produced by the latest render.
    sub_tree: Mutex<Option<VNode<N>>>,
    /// The render effect driving updates.
    effect: Mutex<Option<ReactiveEffect>>,
}

struct Root<N> {
    container: N,
    vnode: VNode<N>,
}

struct RendererInner<R: RendererOps> {
    ops: R,
    /// Previous tree per container, for top-level re-renders.
    roots: Mutex<Vec<Root<R::Node>>>,
}

/// The reconciliation entry point, parameterized by the adapter.
pub struct Renderer<R: RendererOps> {
    inner: Arc<RendererInner<R>>,
}

impl<R: RendererOps> Clone for Renderer<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R> Renderer<R>
where
    R: RendererOps + Send + Sync + 'static,
{
    pub fn new(ops: R) -> Self {
        Self {
            inner: Arc::new(RendererInner {
                ops,
                roots: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn ops(&self) -> &R {
        &self.inner.ops
    }

    /// Render `vnode` into `container`, diffing against whatever this
    /// renderer previously rendered there. `None` unmounts the container's
    /// current tree.
    pub fn render(
        &self,
        vnode: Option<VNode<R::Node>>,
        container: &R::Node,
    ) -> Result<(), PatchError> {
        match vnode {
            None => {
                let previous = {
                    let mut roots = self.inner.roots.lock();
                    roots
                        .iter()
                        .position(|root| root.container == *container)
                        .map(|index| roots.remove(index))
                };
                if let Some(root) = previous {
                    self.unmount(&root.vnode)?;
                }
                Ok(())
            }
            Some(next) => {
                let previous = self
                    .inner
                    .roots
                    .lock()
                    .iter()
                    .find(|root| root.container == *container)
                    .map(|root| root.vnode.clone());

                self.patch(previous.as_ref(), &next, container, None)?;

                let mut roots = self.inner.roots.lock();
                match roots.iter_mut().find(|root| root.container == *container) {
                    Some(root) => root.vnode = next,
                    None => roots.push(Root {
                        container: container.clone(),
                        vnode: next,
                    }),
                }
                Ok(())
            }
        }
    }

    /// Diff `n1` against `n2` and apply the difference into `container`.
    ///
    /// Identical versions are a no-op. A previous node that is not
    /// reconcilable with the next one is unmounted, and the next mounts
    /// fresh in its place (anchored at the old node's next sibling).
    pub fn patch(
        &self,
        n1: Option<&VNode<R::Node>>,
        n2: &VNode<R::Node>,
        container: &R::Node,
        anchor: Option<&R::Node>,
    ) -> Result<(), PatchError> {
        if let Some(previous) = n1 {
            if VNode::ptr_eq(previous, n2) {
                return Ok(());
            }
        }

        let mut anchor = anchor.cloned();
        let n1 = match n1 {
            Some(previous) if !same_vnode(previous, n2) => {
                trace!(old = ?previous, new = ?n2, "replace");
                if let Some(el) = previous.el() {
                    anchor = self.ops().next_sibling(&el).or(anchor);
                }
                self.unmount(previous)?;
                None
            }
            other => other,
        };
        let anchor = anchor.as_ref();

        match n2.kind() {
            NodeKind::Text => self.process_text(n1, n2, container, anchor),
            NodeKind::Fragment => self.process_fragment(n1, n2, container),
            NodeKind::Element(_) => self.process_element(n1, n2, container, anchor),
            NodeKind::Component(def) => {
                let def = Arc::clone(def);
                self.process_component(n1, n2, &def, container, anchor)
            }
        }
    }

    // ------------------------------------------------------------------
    // Text nodes
    // ------------------------------------------------------------------

    fn process_text(
        &self,
        n1: Option<&VNode<R::Node>>,
        n2: &VNode<R::Node>,
        container: &R::Node,
        anchor: Option<&R::Node>,
    ) -> Result<(), PatchError> {
        let Children::Text(new_text) = n2.children() else {
            return Err(PatchError::MalformedChildren("text"));
        };

        match n1 {
            None => {
                let node = self.ops().create_text(new_text);
                n2.set_el(node.clone());
                self.ops().insert(&node, container, anchor);
                Ok(())
            }
            Some(n1) => {
                let el = n1.el().ok_or(PatchError::Unmounted("text"))?;
                n2.set_el(el.clone());
                let Children::Text(old_text) = n1.children() else {
                    return Err(PatchError::MalformedChildren("text"));
                };
                if old_text != new_text {
                    self.ops().set_text(&el, new_text);
                }
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------
    // Fragments
    // ------------------------------------------------------------------

    fn process_fragment(
        &self,
        n1: Option<&VNode<R::Node>>,
        n2: &VNode<R::Node>,
        container: &R::Node,
    ) -> Result<(), PatchError> {
        let Children::Nodes(new_children) = n2.children() else {
            return Err(PatchError::MalformedChildren("fragment"));
        };

        match n1 {
            // No container node of its own: children mount straight into
            // the parent's container.
            None => self.mount_children(new_children, container),
            Some(n1) => self.patch_children(n1, n2, container),
        }
    }

    // ------------------------------------------------------------------
    // Host elements
    // ------------------------------------------------------------------

    fn process_element(
        &self,
        n1: Option<&VNode<R::Node>>,
        n2: &VNode<R::Node>,
        container: &R::Node,
        anchor: Option<&R::Node>,
    ) -> Result<(), PatchError> {
        match n1 {
            None => {
                let NodeKind::Element(tag) = n2.kind() else {
                    return Err(PatchError::MalformedChildren("element"));
                };
                self.mount_element(n2, tag, container, anchor)
            }
            Some(n1) => self.patch_element(n1, n2),
        }
    }

    fn mount_element(
        &self,
        vnode: &VNode<R::Node>,
        tag: &str,
        container: &R::Node,
        anchor: Option<&R::Node>,
    ) -> Result<(), PatchError> {
        let el = self.ops().create_element(tag);
        vnode.set_el(el.clone());

        for (key, value) in vnode.props() {
            self.ops().patch_prop(&el, key, None, Some(value));
        }

        match vnode.children() {
            Children::Text(text) => self.ops().set_element_text(&el, text),
            Children::Nodes(children) => self.mount_children(children, &el)?,
            Children::None => {}
        }

        self.ops().insert(&el, container, anchor);
        Ok(())
    }

    fn mount_children(
        &self,
        children: &[VNode<R::Node>],
        container: &R::Node,
    ) -> Result<(), PatchError> {
        for child in children {
            self.patch(None, child, container, None)?;
        }
        Ok(())
    }

    fn patch_element(
        &self,
        n1: &VNode<R::Node>,
        n2: &VNode<R::Node>,
    ) -> Result<(), PatchError> {
        // Reconcilable nodes reuse the backing element.
        let el = n1.el().ok_or(PatchError::Unmounted("element"))?;
        n2.set_el(el.clone());

        self.patch_props(n1.props(), n2.props(), &el);
        self.patch_children(n1, n2, &el)
    }

    /// Set everything in the new bag, remove anything only the old bag had.
    fn patch_props(
        &self,
        old_props: &IndexMap<String, Value>,
        new_props: &IndexMap<String, Value>,
        el: &R::Node,
    ) {
        for (key, new_value) in new_props {
            self.ops()
                .patch_prop(el, key, old_props.get(key), Some(new_value));
        }
        for (key, old_value) in old_props {
            if !new_props.contains_key(key) {
                self.ops().patch_prop(el, key, Some(old_value), None);
            }
        }
    }

    // ------------------------------------------------------------------
    // Children reconciliation
    // ------------------------------------------------------------------

    /// The old-kind × new-kind decision table.
    fn patch_children(
        &self,
        n1: &VNode<R::Node>,
        n2: &VNode<R::Node>,
        el: &R::Node,
    ) -> Result<(), PatchError> {
        match (n1.children(), n2.children()) {
            // New is text: any old array is unmounted, then the text is set
            // if it changed.
            (old, Children::Text(new_text)) => {
                if let Children::Nodes(old_children) = old {
                    self.unmount_children(old_children)?;
                }
                let unchanged = matches!(old, Children::Text(old_text) if old_text == new_text);
                if !unchanged {
                    self.ops().set_element_text(el, new_text);
                }
                Ok(())
            }
            // Array to array: the full keyed diff.
            (Children::Nodes(old_children), Children::Nodes(new_children)) => {
                self.patch_keyed_children(old_children, new_children, el)
            }
            // Array replaced by nothing.
            (Children::Nodes(old_children), Children::None) => {
                self.unmount_children(old_children)
            }
            // Text replaced by nothing or by an array.
            (Children::Text(_), new) => {
                self.ops().set_element_text(el, "");
                if let Children::Nodes(new_children) = new {
                    self.mount_children(new_children, el)?;
                }
                Ok(())
            }
            // Nothing to array.
            (Children::None, Children::Nodes(new_children)) => {
                self.mount_children(new_children, el)
            }
            (Children::None, Children::None) => Ok(()),
        }
    }

    fn unmount_children(&self, children: &[VNode<R::Node>]) -> Result<(), PatchError> {
        for child in children {
            self.unmount(child)?;
        }
        Ok(())
    }

    /// Keyed list reconciliation.
    ///
    /// 1. Trim matching head pairs, patching in place.
    /// 2. Trim matching tail pairs likewise.
    /// 3. Old range exhausted → mount the remaining new items before the
    ///    node that follows the insertion point.
    /// 4. New range exhausted → unmount the remaining old items.
    /// 5. Otherwise reconcile the unordered middle: map keys to new
    ///    positions, unmount unmatched old nodes, patch matched ones while
    ///    recording old positions (+1; 0 marks a fresh node), then walk the
    ///    new middle in reverse, mounting fresh nodes and moving only those
    ///    outside the longest increasing run of recorded positions. The
    ///    reverse order guarantees each move's anchor — the next sibling —
    ///    is already in its final position.
    fn patch_keyed_children(
        &self,
        c1: &[VNode<R::Node>],
        c2: &[VNode<R::Node>],
        container: &R::Node,
    ) -> Result<(), PatchError> {
        let mut i: isize = 0;
        let mut e1: isize = c1.len() as isize - 1;
        let mut e2: isize = c2.len() as isize - 1;

        // Head.
        while i <= e1 && i <= e2 {
            let n1 = &c1[i as usize];
            let n2 = &c2[i as usize];
            if !same_vnode(n1, n2) {
                break;
            }
            self.patch(Some(n1), n2, container, None)?;
            i += 1;
        }

        // Tail.
        while i <= e1 && i <= e2 {
            let n1 = &c1[e1 as usize];
            let n2 = &c2[e2 as usize];
            if !same_vnode(n1, n2) {
                break;
            }
            self.patch(Some(n1), n2, container, None)?;
            e1 -= 1;
            e2 -= 1;
        }

        if i > e1 {
            // Only new items remain.
            if i <= e2 {
                // Anchor at whatever follows the insertion gap: present for
                // a head/middle insertion, absent for an append.
                let next_pos = (e2 + 1) as usize;
                let anchor = c2.get(next_pos).and_then(|node| node.el());
                while i <= e2 {
                    self.patch(None, &c2[i as usize], container, anchor.as_ref())?;
                    i += 1;
                }
            }
            return Ok(());
        }

        if i > e2 {
            // Only old items remain.
            while i <= e1 {
                self.unmount(&c1[i as usize])?;
                i += 1;
            }
            return Ok(());
        }

        // Unordered middle: c1[s1..=e1] vs c2[s2..=e2].
        let s1 = i as usize;
        let s2 = i as usize;
        let e1 = e1 as usize;
        let e2 = e2 as usize;
        let to_patch = e2 - s2 + 1;
        debug!(old = e1 - s1 + 1, new = to_patch, "keyed middle diff");

        let mut key_to_new: HashMap<Option<Key>, usize> = HashMap::with_capacity(to_patch);
        for (new_index, node) in c2.iter().enumerate().take(e2 + 1).skip(s2) {
            key_to_new.insert(node.key().cloned(), new_index);
        }

        // Backreference array: new-middle position → old index + 1, with 0
        // marking "no old match".
        let mut backrefs = vec![0usize; to_patch];

        for (old_index, old) in c1.iter().enumerate().take(e1 + 1).skip(s1) {
            match key_to_new.get(&old.key().cloned()) {
                None => self.unmount(old)?,
                Some(&new_index) => {
                    backrefs[new_index - s2] = old_index + 1;
                    self.patch(Some(old), &c2[new_index], container, None)?;
                }
            }
        }

        // Positions already in relative order need no move.
        let stable = longest_increasing_subsequence(&backrefs);
        let mut stable_tail = stable.len();

        for offset in (0..to_patch).rev() {
            let new_index = s2 + offset;
            let node = &c2[new_index];
            let anchor = c2.get(new_index + 1).and_then(|next| next.el());

            match node.el() {
                // Never matched an old node: mount fresh at its slot.
                None => self.patch(None, node, container, anchor.as_ref())?,
                Some(el) => {
                    if stable_tail > 0 && offset == stable[stable_tail - 1] {
                        stable_tail -= 1;
                    } else {
                        self.ops().insert(&el, container, anchor.as_ref());
                    }
                }
            }
        }

        Ok(())
    }

    // ------------------------------------------------------------------
    // Components
    // ------------------------------------------------------------------

    fn process_component(
        &self,
        n1: Option<&VNode<R::Node>>,
        n2: &VNode<R::Node>,
        def: &Arc<ComponentDef<R::Node>>,
        container: &R::Node,
        anchor: Option<&R::Node>,
    ) -> Result<(), PatchError> {
        match n1 {
            None => self.mount_component(n2, def, container, anchor),
            Some(n1) => {
                // The instance carries over; its render effect keeps driving
                // updates. Prop rewiring across versions is host plumbing
                // outside the reconciler.
                let instance = n1.instance().ok_or(PatchError::MissingInstance)?;
                n2.set_component(instance);
                Ok(())
            }
        }
    }

    fn mount_component(
        &self,
        vnode: &VNode<R::Node>,
        def: &Arc<ComponentDef<R::Node>>,
        container: &R::Node,
        anchor: Option<&R::Node>,
    ) -> Result<(), PatchError> {
        let state = (def.data)();
        state.mark_reactive();

        // Split incoming props: declared names become reactive props, the
        // rest pass through as attrs.
        let props = Obj::new();
        let mut attrs = IndexMap::new();
        for (key, value) in vnode.props() {
            if def.props.iter().any(|declared| declared == key) {
                props.insert(key.clone(), value.clone());
            } else {
                attrs.insert(key.clone(), value.clone());
            }
        }
        props.mark_reactive();

        let instance = Arc::new(ComponentInstance {
            state,
            props,
            attrs,
            sub_tree: Mutex::new(None),
            effect: Mutex::new(None),
        });
        vnode.set_component(Arc::clone(&instance));

        // Render-and-patch as a reactive computation: state reads inside
        // `render` subscribe this effect.
        let update_fn = {
            let renderer = Arc::downgrade(&self.inner);
            let instance = Arc::downgrade(&instance);
            let def = Arc::clone(def);
            let container = container.clone();
            let anchor = anchor.cloned();
            move || {
                let (Some(renderer), Some(instance)) = (renderer.upgrade(), instance.upgrade())
                else {
                    return;
                };
                let renderer = Renderer { inner: renderer };

                let next = (def.render)(&instance.state, &instance.props);
                let previous = instance.sub_tree.lock().clone();
                let patched = match &previous {
                    None => renderer.patch(None, &next, &container, anchor.as_ref()),
                    Some(previous) => {
                        renderer.patch(Some(previous), &next, &container, anchor.as_ref())
                    }
                };
                if let Err(err) = patched {
                    // A malformed subtree is a bug in the render function.
                    panic!("component '{}' produced an unpatchable tree: {err}", def.name);
                }
                *instance.sub_tree.lock() = Some(next);
            }
        };

        // The scheduler enqueues one stable job per component, so any burst
        // of writes within a tick collapses into a single re-render at the
        // next flush.
        let inner = Arc::new_cyclic(|weak: &Weak<EffectInner>| {
            let job: Job = {
                let weak = weak.clone();
                Arc::new(move || {
                    if let Some(effect) = weak.upgrade() {
                        EffectInner::run(&effect);
                    }
                })
            };
            EffectInner::new(Box::new(update_fn), Some(Box::new(move || queue_job(&job))))
        });

        let effect = ReactiveEffect::from_inner(inner);
        *instance.effect.lock() = Some(effect.clone());

        // Initial render, synchronous.
        effect.run();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------

    /// Recursive teardown: fragments unmount their children, components
    /// their rendered subtree, everything else its backing element.
    fn unmount(&self, vnode: &VNode<R::Node>) -> Result<(), PatchError> {
        match vnode.kind() {
            NodeKind::Fragment => {
                let Children::Nodes(children) = vnode.children() else {
                    return Err(PatchError::MalformedChildren("fragment"));
                };
                self.unmount_children(children)
            }
            NodeKind::Component(_) => {
                let instance = vnode.instance().ok_or(PatchError::MissingInstance)?;
                if let Some(effect) = instance.effect.lock().take() {
                    effect.stop();
                }
                let sub_tree = instance.sub_tree.lock().take();
                match sub_tree {
                    Some(sub_tree) => self.unmount(&sub_tree),
                    None => Ok(()),
                }
            }
            NodeKind::Text => {
                let el = vnode.el().ok_or(PatchError::Unmounted("text"))?;
                self.ops().remove(&el);
                Ok(())
            }
            NodeKind::Element(_) => {
                let el = vnode.el().ok_or(PatchError::Unmounted("element"))?;
                self.ops().remove(&el);
                Ok(())
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
