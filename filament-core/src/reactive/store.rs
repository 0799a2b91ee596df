//! Reactive Store
//!
//! The interception layer over plain objects: reads register the running
//! effect as a subscriber, writes locate the subscribers for that field and
//! notify them. This is the explicit-wrapper rendition of a property-access
//! proxy — `Obj::get`/`Obj::set` delegate to the underlying property bag and
//! perform tracking/notification around the delegation.
//!
//! Wrapping rules:
//!
//! - wrapping a non-object value returns it unchanged,
//! - wrapping is idempotent (the reactive flag on the shared record is the
//!   hidden marker),
//! - the same source object always yields the same wrapper, because the
//!   wrapper *is* the shared handle,
//! - object-valued fields come back wrapped, lazily, at read time.

use tracing::debug;

use super::dep::{track, trigger};
use crate::value::{Obj, Value};

/// Mark a value's object handle reactive.
///
/// Scalars and lists pass through untouched. An already-reactive object is
/// returned as-is, and every handle to the same record observes the flag, so
/// repeated wrapping cannot produce distinct wrappers.
pub fn make_reactive(value: Value) -> Value {
    if let Value::Object(obj) = &value {
        obj.mark_reactive();
    }
    value
}

/// Did `value` pass through [`make_reactive`] (directly or by being read out
/// of a reactive parent)?
pub fn is_reactive(value: &Value) -> bool {
    match value {
        Value::Object(obj) => obj.is_reactive_flag(),
        _ => false,
    }
}

/// Convenience: build a reactive object from field pairs.
pub fn reactive<K, V, I>(fields: I) -> Obj
where
    K: Into<String>,
    V: Into<Value>,
    I: IntoIterator<Item = (K, V)>,
{
    let obj: Obj = fields.into_iter().collect();
    obj.mark_reactive();
    obj
}

/// Wrap object values, pass scalars through.
pub(crate) fn to_reactive(value: Value) -> Value {
    make_reactive(value)
}

impl Obj {
    /// Tracked read.
    ///
    /// While an effect is running, the `(object, field)` pair is recorded as
    /// one of its dependencies. Object-valued results are wrapped on the way
    /// out, so nested state is reactive by the time anyone can read through
    /// it. Reads through a non-reactive handle are plain reads.
    pub fn get(&self, key: &str) -> Value {
        if self.is_reactive_flag() {
            track(self.id(), key);
            to_reactive(self.get_untracked(key))
        } else {
            self.get_untracked(key)
        }
    }

    /// Tracked write.
    ///
    /// Writing a value equal (by strict equality — handle identity for
    /// objects and lists) to the current one is a complete no-op: no
    /// mutation signal, no notification. Otherwise the field is updated and
    /// every subscriber of the field is notified.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();

        let old = self.with_fields(|fields| {
            let old = fields.get(&key).cloned();
            if old.as_ref() == Some(&value) {
                return None;
            }
            fields.insert(key.clone(), value.clone());
            Some(old)
        });

        let Some(old) = old else {
            debug!(target_id = self.id(), key, "write suppressed (unchanged)");
            return;
        };

        if self.is_reactive_flag() {
            trigger(self.id(), &key, &value, old.as_ref());
        }
    }

    /// Remove a field, notifying subscribers when it existed.
    pub fn remove(&self, key: &str) {
        let old = self.with_fields(|fields| fields.shift_remove(key));
        if let Some(old) = old {
            if self.is_reactive_flag() {
                trigger(self.id(), key, &Value::Null, Some(&old));
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::effect::create_effect;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn wrapping_a_scalar_is_a_no_op() {
        assert_eq!(make_reactive(Value::Int(3)), Value::Int(3));
        assert!(!is_reactive(&Value::Int(3)));
    }

    #[test]
    fn wrapping_is_idempotent() {
        let obj = Obj::new();
        let once = make_reactive(Value::Object(obj.clone()));
        let twice = make_reactive(once.clone());
        assert_eq!(once, twice);
        assert!(is_reactive(&twice));
    }

    #[test]
    fn wrapping_the_same_source_yields_the_same_wrapper() {
        let source = Obj::new();
        let a = make_reactive(Value::Object(source.clone()));
        let b = make_reactive(Value::Object(source));
        // Identity equality: both wrappers share the record.
        assert_eq!(a, b);
    }

    #[test]
    fn nested_objects_are_wrapped_lazily_on_read() {
        let inner = Obj::new();
        let state = reactive([("inner", Value::Object(inner.clone()))]);

        // Not reactive until read through the reactive parent.
        assert!(!inner.is_reactive_flag());

        let read = state.get("inner");
        assert!(is_reactive(&read));
        assert!(inner.is_reactive_flag());
    }

    #[test]
    fn effect_reruns_on_write() {
        let state = reactive([("count", 0)]);
        let runs = Arc::new(AtomicUsize::new(0));

        let runs_clone = runs.clone();
        let state_clone = state.clone();
        let _effect = create_effect(move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
            let _ = state_clone.get("count");
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        state.set("count", 1);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn equal_write_is_suppressed() {
        let state = reactive([("count", 7)]);
        let runs = Arc::new(AtomicUsize::new(0));

        let runs_clone = runs.clone();
        let state_clone = state.clone();
        let _effect = create_effect(move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
            let _ = state_clone.get("count");
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        state.set("count", 7);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn untracked_read_establishes_no_dependency() {
        let state = reactive([("count", 0)]);
        let runs = Arc::new(AtomicUsize::new(0));

        let runs_clone = runs.clone();
        let state_clone = state.clone();
        let _effect = create_effect(move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
            let _ = state_clone.get_untracked("count");
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        state.set("count", 1);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn removing_a_field_notifies_subscribers() {
        let state = reactive([("tag", "x")]);
        let runs = Arc::new(AtomicUsize::new(0));

        let runs_clone = runs.clone();
        let state_clone = state.clone();
        let _effect = create_effect(move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
            let _ = state_clone.get("tag");
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        state.remove("tag");
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(state.get_untracked("tag"), Value::Null);

        // Removing what is already gone stays quiet.
        state.remove("tag");
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn self_mutating_effect_does_not_recurse() {
        let state = reactive([("count", 0)]);

        let state_clone = state.clone();
        let _effect = create_effect(move || {
            let current = state_clone.get("count").as_int().unwrap_or(0);
            // Writing what was just read would notify this very effect; the
            // re-entrancy counter keeps this from looping.
            state_clone.set("count", current + 1);
        });

        assert_eq!(state.get_untracked("count"), Value::Int(1));
        state.set("count", 10);
        assert_eq!(state.get_untracked("count"), Value::Int(11));
    }

    #[test]
    fn conditional_dependencies_are_retracked() {
        let state = reactive([
            ("flag", Value::Bool(true)),
            ("a", Value::Int(1)),
            ("b", Value::Int(2)),
        ]);
        let runs = Arc::new(AtomicUsize::new(0));

        let runs_clone = runs.clone();
        let state_clone = state.clone();
        let _effect = create_effect(move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
            if state_clone.get("flag").as_bool().unwrap_or(false) {
                let _ = state_clone.get("a");
            } else {
                let _ = state_clone.get("b");
            }
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        // Tracked branch is `a`; `b` must not notify.
        state.set("b", 20);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        // Flip: rerun, now tracking `b` instead.
        state.set("flag", false);
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        // The abandoned branch no longer notifies…
        state.set("a", 10);
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        // …and the fresh branch does.
        state.set("b", 21);
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }
}
