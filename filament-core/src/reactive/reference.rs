//! Refs
//!
//! A `Ref` is a single-slot reactive container built on the same
//! subscriber/notify primitive as the store: one lazily created dependency
//! entry guards `.value`. Writing a value strictly equal to the stored raw
//! value is a no-op; otherwise the slot is updated (object values come back
//! wrapped) and subscribers are notified.
//!
//! `ObjectRef` is the storage-free variant: a `.value` view over one field
//! of one object, delegating reads and writes.

use std::sync::Arc;

use parking_lot::Mutex;

use super::context::EffectContext;
use super::dep::{track_effect, trigger_effects, Dep};
use super::store::to_reactive;
use crate::value::{Obj, Value};

/// Single reactive value slot.
pub struct Ref {
    inner: Arc<RefInner>,
}

struct RefInner {
    /// The raw value as last written, used for the equality check.
    raw: Mutex<Value>,
    /// The exposed value: `raw` with object values wrapped.
    value: Mutex<Value>,
    /// Lazily created dependency entry for `.value`.
    dep: Mutex<Option<Dep>>,
}

impl Ref {
    pub fn new(value: impl Into<Value>) -> Self {
        let raw = value.into();
        Self {
            inner: Arc::new(RefInner {
                value: Mutex::new(to_reactive(raw.clone())),
                raw: Mutex::new(raw),
                dep: Mutex::new(None),
            }),
        }
    }

    /// Tracked read of the slot.
    pub fn get(&self) -> Value {
        track_slot(&self.inner.dep, {
            let weak = Arc::downgrade(&self.inner);
            move || {
                if let Some(inner) = weak.upgrade() {
                    *inner.dep.lock() = None;
                }
            }
        });
        self.inner.value.lock().clone()
    }

    /// Read without establishing a dependency.
    pub fn get_untracked(&self) -> Value {
        self.inner.value.lock().clone()
    }

    /// Write the slot; equal values (strict equality) are suppressed.
    pub fn set(&self, value: impl Into<Value>) {
        let value = value.into();
        {
            let mut raw = self.inner.raw.lock();
            if *raw == value {
                return;
            }
            *raw = value.clone();
            *self.inner.value.lock() = to_reactive(value);
        }
        trigger_slot(&self.inner.dep);
    }
}

impl Clone for Ref {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl std::fmt::Debug for Ref {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ref")
            .field("value", &*self.inner.value.lock())
            .finish()
    }
}

/// Build a ref around `value`.
pub fn ref_value(value: impl Into<Value>) -> Ref {
    Ref::new(value)
}

// ----------------------------------------------------------------------------
// Slot-level tracking shared with computeds
// ----------------------------------------------------------------------------

/// Associate the running effect with a container's single dependency entry,
/// creating the entry on first tracked read. `cleanup` clears the
/// container's slot when the entry's subscriber set empties.
pub(crate) fn track_slot(
    slot: &Mutex<Option<Dep>>,
    cleanup: impl Fn() + Send + Sync + 'static,
) {
    let Some(effect) = EffectContext::current() else {
        return;
    };

    let dep = {
        let mut guard = slot.lock();
        match &*guard {
            Some(dep) => dep.clone(),
            None => {
                let dep = Dep::new("value", cleanup);
                *guard = Some(dep.clone());
                dep
            }
        }
    };

    track_effect(&effect, &dep);
}

/// Notify a container's subscribers, if it has any.
pub(crate) fn trigger_slot(slot: &Mutex<Option<Dep>>) {
    let dep = slot.lock().clone();
    if let Some(dep) = dep {
        trigger_effects(&dep);
    }
}

// ----------------------------------------------------------------------------
// Object-backed refs
// ----------------------------------------------------------------------------

/// A `.value` view over one field of one object. No storage of its own;
/// reads and writes delegate, so tracking/notification happen in the store.
pub struct ObjectRef {
    object: Obj,
    key: String,
}

impl ObjectRef {
    pub fn get(&self) -> Value {
        self.object.get(&self.key)
    }

    pub fn set(&self, value: impl Into<Value>) {
        self.object.set(self.key.clone(), value);
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Clone for ObjectRef {
    fn clone(&self) -> Self {
        Self {
            object: self.object.clone(),
            key: self.key.clone(),
        }
    }
}

/// Bind a field of `object` as a ref-shaped view.
pub fn to_ref(object: &Obj, key: impl Into<String>) -> ObjectRef {
    ObjectRef {
        object: object.clone(),
        key: key.into(),
    }
}

/// Explode every current field of `object` into a bound view.
pub fn to_refs(object: &Obj) -> Vec<ObjectRef> {
    object
        .keys()
        .into_iter()
        .map(|key| to_ref(object, key))
        .collect()
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
