//! Computed Values
//!
//! A computed is a cached derived value. Its getter runs inside an internal
//! effect whose scheduler does exactly one thing on dependency change: leave
//! the effect marked dirty and notify whoever reads the computed. The
//! recomputation itself is deferred to the next `.get()` — a computed that
//! nobody reads again never recomputes.
//!
//! Reading while clean returns the cache without touching the getter.
//! Reading while dirty re-runs the getter (re-tracking its dependencies),
//! caches the result and clears the dirty level. Either way the computed
//! registers itself as a dependency source of the effect doing the reading,
//! so change propagation chains: upstream field → computed dirty → outer
//! effect notified.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::debug;

use super::effect::ReactiveEffect;
use super::reference::{track_slot, trigger_slot};
use crate::reactive::dep::Dep;
use crate::value::Value;

type Setter = Box<dyn Fn(Value) + Send + Sync>;

/// Cached derived value handle.
pub struct Computed {
    inner: Arc<ComputedInner>,
}

struct ComputedInner {
    /// Last computed result; `None` until the first read.
    value: Mutex<Option<Value>>,
    /// Dependency entry registering *readers of this computed*.
    dep: Mutex<Option<Dep>>,
    /// Getter wrapper; stays dirty between a dependency change and the next
    /// read.
    effect: ReactiveEffect,
    setter: Option<Setter>,
}

impl Computed {
    /// Build a computed from a getter. The getter receives the previously
    /// cached value (`None` on the first run). Nothing is computed until the
    /// first read.
    pub fn new<G>(getter: G) -> Self
    where
        G: Fn(Option<Value>) -> Value + Send + Sync + 'static,
    {
        Self::build(getter, None)
    }

    /// Build a writable computed. The setter receives the written value and
    /// is expected to mutate upstream state; it does not touch the cache.
    pub fn with_setter<G, S>(getter: G, setter: S) -> Self
    where
        G: Fn(Option<Value>) -> Value + Send + Sync + 'static,
        S: Fn(Value) + Send + Sync + 'static,
    {
        Self::build(getter, Some(Box::new(setter)))
    }

    fn build<G>(getter: G, setter: Option<Setter>) -> Self
    where
        G: Fn(Option<Value>) -> Value + Send + Sync + 'static,
    {
        let inner = Arc::new_cyclic(|weak: &Weak<ComputedInner>| {
            let compute = {
                let weak = weak.clone();
                move || {
                    if let Some(inner) = weak.upgrade() {
                        let previous = inner.value.lock().clone();
                        let next = getter(previous);
                        *inner.value.lock() = Some(next);
                    }
                }
            };

            // On upstream change the effect is already marked dirty by the
            // trigger; the scheduler's job is to pass the notification on to
            // whoever reads this computed.
            let notify = {
                let weak = weak.clone();
                move || {
                    if let Some(inner) = weak.upgrade() {
                        trigger_slot(&inner.dep);
                    }
                }
            };

            ComputedInner {
                value: Mutex::new(None),
                dep: Mutex::new(None),
                effect: ReactiveEffect::new(compute, Some(Box::new(notify))),
                setter,
            }
        });

        Self { inner }
    }

    /// Read the computed, recomputing only when dirty.
    pub fn get(&self) -> Value {
        if self.inner.effect.is_dirty() {
            self.inner.effect.run();
        }
        self.track_readers();
        self.inner
            .value
            .lock()
            .clone()
            .unwrap_or(Value::Null)
    }

    /// Read the cache without registering the calling effect as a reader.
    pub fn get_untracked(&self) -> Value {
        if self.inner.effect.is_dirty() {
            self.inner.effect.run();
        }
        self.inner
            .value
            .lock()
            .clone()
            .unwrap_or(Value::Null)
    }

    /// Write through the user-supplied setter. Without one, the write is a
    /// documented no-op.
    pub fn set(&self, value: impl Into<Value>) {
        match &self.inner.setter {
            Some(setter) => setter(value.into()),
            None => debug!("write to computed without setter ignored"),
        }
    }

    /// Detach the internal effect from its dependencies; subsequent reads
    /// recompute without tracking.
    pub fn stop(&self) {
        self.inner.effect.stop();
    }

    fn track_readers(&self) {
        let weak = Arc::downgrade(&self.inner);
        track_slot(&self.inner.dep, move || {
            if let Some(inner) = weak.upgrade() {
                *inner.dep.lock() = None;
            }
        });
    }
}

impl Clone for Computed {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl std::fmt::Debug for Computed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("dirty", &self.inner.effect.is_dirty())
            .field("value", &*self.inner.value.lock())
            .finish()
    }
}

/// Build a read-only computed from a getter closure.
pub fn computed<G>(getter: G) -> Computed
where
    G: Fn(Option<Value>) -> Value + Send + Sync + 'static,
{
    Computed::new(getter)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::effect::create_effect;
    use crate::reactive::store::reactive;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn computed_is_lazy_and_cached() {
        let state = reactive([("n", 2)]);
        let calls = Arc::new(AtomicUsize::new(0));

        let calls_clone = calls.clone();
        let state_clone = state.clone();
        let doubled = computed(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            Value::Int(state_clone.get("n").as_int().unwrap_or(0) * 2)
        });

        // Nothing computed yet.
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        // One computation serves any number of consecutive reads.
        assert_eq!(doubled.get(), Value::Int(4));
        assert_eq!(doubled.get(), Value::Int(4));
        assert_eq!(doubled.get(), Value::Int(4));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // A dependency change costs exactly one more computation.
        state.set("n", 5);
        assert_eq!(doubled.get(), Value::Int(10));
        assert_eq!(doubled.get(), Value::Int(10));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn computed_propagates_to_outer_effects() {
        let state = reactive([("n", 1)]);
        let runs = Arc::new(AtomicUsize::new(0));

        let state_clone = state.clone();
        let doubled = computed(move |_| {
            Value::Int(state_clone.get("n").as_int().unwrap_or(0) * 2)
        });

        let runs_clone = runs.clone();
        let doubled_clone = doubled.clone();
        let _effect = create_effect(move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
            let _ = doubled_clone.get();
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        state.set("n", 3);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(doubled.get_untracked(), Value::Int(6));
    }

    #[test]
    fn getter_receives_the_previous_value() {
        let state = reactive([("n", 1)]);
        let seen_previous = Arc::new(Mutex::new(Vec::new()));

        let state_clone = state.clone();
        let seen_clone = seen_previous.clone();
        let tracker = computed(move |previous| {
            seen_clone.lock().push(previous);
            state_clone.get("n")
        });

        let _ = tracker.get();
        state.set("n", 2);
        let _ = tracker.get();

        let seen = seen_previous.lock();
        assert_eq!(seen[0], None);
        assert_eq!(seen[1], Some(Value::Int(1)));
    }

    #[test]
    fn setter_writes_reach_upstream_state() {
        let state = reactive([("n", 1)]);

        let getter_state = state.clone();
        let setter_state = state.clone();
        let n = Computed::with_setter(
            move |_| getter_state.get("n"),
            move |value| setter_state.set("n", value),
        );

        assert_eq!(n.get(), Value::Int(1));
        n.set(9);
        assert_eq!(state.get_untracked("n"), Value::Int(9));
        // The write dirtied the computed through its own tracking.
        assert_eq!(n.get(), Value::Int(9));
    }

    #[test]
    fn setterless_write_is_ignored() {
        let n = computed(|_| Value::Int(1));
        assert_eq!(n.get(), Value::Int(1));
        n.set(5);
        assert_eq!(n.get(), Value::Int(1));
    }
}
