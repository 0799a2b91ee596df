//! Watchers
//!
//! `watch` is a declarative subscription built entirely on the effect
//! primitive: a source (reactive object, ref, or getter closure) becomes a
//! trackable getter, and a user callback observes `(old, new)` transitions.
//! Deep mode walks the whole object graph through tracked reads, so any
//! nested mutation notifies the watcher; a seen-set guards against cycles
//! and an optional depth bound caps the walk.
//!
//! The callback's third argument registers a cleanup closure; it runs
//! immediately before the *next* callback invocation, never after it —
//! the hook for cancelling whatever the previous invocation started.
//!
//! `watch_effect` drops the diff machinery: the closure is both getter and
//! side effect, re-run whenever anything it read changes.

use std::collections::HashSet;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::trace;

use super::effect::{create_effect, EffectInner, ReactiveEffect};
use crate::value::{Obj, Value};

/// What a watcher observes.
pub enum WatchSource {
    /// A reactive object; traversed (deep by default) so every reachable
    /// field is tracked.
    Object(Obj),
    /// A ref; tracked through its `.value`.
    Ref(super::reference::Ref),
    /// An arbitrary getter, invoked directly.
    Getter(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl WatchSource {
    pub fn getter<F>(f: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        WatchSource::Getter(Arc::new(f))
    }
}

impl From<Obj> for WatchSource {
    fn from(obj: Obj) -> Self {
        WatchSource::Object(obj)
    }
}

impl From<&Obj> for WatchSource {
    fn from(obj: &Obj) -> Self {
        WatchSource::Object(obj.clone())
    }
}

impl From<super::reference::Ref> for WatchSource {
    fn from(r: super::reference::Ref) -> Self {
        WatchSource::Ref(r)
    }
}

impl From<&super::reference::Ref> for WatchSource {
    fn from(r: &super::reference::Ref) -> Self {
        WatchSource::Ref(r.clone())
    }
}

#[derive(Default)]
pub struct WatchOptions {
    /// Traverse the full object graph. Defaults to true for object sources,
    /// false otherwise.
    pub deep: Option<bool>,
    /// Invoke the callback once, synchronously, with `(None, initial)`.
    pub immediate: bool,
    /// Bound on the deep traversal. `None` walks the whole graph.
    pub depth: Option<usize>,
}

/// Registers the cleanup to run before the next callback invocation.
pub struct OnCleanup {
    slot: Arc<Mutex<Option<Box<dyn FnOnce() + Send>>>>,
}

impl OnCleanup {
    pub fn register<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        *self.slot.lock() = Some(Box::new(f));
    }
}

/// Keeps the watcher alive; call [`stop`](WatchHandle::stop) to unsubscribe
/// deterministically. Dropping the last handle also silences the watcher,
/// since subscriptions hold it weakly.
pub struct WatchHandle {
    effect: ReactiveEffect,
}

impl WatchHandle {
    /// Detach from every dependency; the callback never fires again.
    pub fn stop(&self) {
        self.effect.stop();
    }
}

/// Watch `source`, invoking `callback(old, new, on_cleanup)` on change.
pub fn watch<S, C>(source: S, callback: C, options: WatchOptions) -> WatchHandle
where
    S: Into<WatchSource>,
    C: Fn(Option<Value>, Value, &OnCleanup) + Send + Sync + 'static,
{
    let source = source.into();
    let deep = options
        .deep
        .unwrap_or(matches!(source, WatchSource::Object(_)));

    let getter: Arc<dyn Fn() -> Value + Send + Sync> = match source {
        WatchSource::Object(obj) => {
            // A shallow object watch still reads the top-level fields; deep
            // mode keeps walking.
            let depth = if deep { options.depth } else { Some(1) };
            Arc::new(move || {
                let value = Value::Object(obj.clone());
                traverse(&value, depth, &mut HashSet::new());
                value
            })
        }
        WatchSource::Ref(r) => Arc::new(move || r.get()),
        WatchSource::Getter(f) => f,
    };

    let latest: Arc<Mutex<Value>> = Arc::new(Mutex::new(Value::Null));
    let old: Arc<Mutex<Option<Value>>> = Arc::new(Mutex::new(None));
    let cleanup: Arc<Mutex<Option<Box<dyn FnOnce() + Send>>>> = Arc::new(Mutex::new(None));
    let callback = Arc::new(callback);

    let inner = Arc::new_cyclic(|weak: &Weak<EffectInner>| {
        let compute = {
            let latest = latest.clone();
            let getter = getter.clone();
            move || {
                *latest.lock() = getter();
            }
        };

        let on_trigger = {
            let weak = weak.clone();
            let latest = latest.clone();
            let old = old.clone();
            let cleanup = cleanup.clone();
            let callback = callback.clone();
            move || {
                let Some(effect) = weak.upgrade() else {
                    return;
                };
                EffectInner::run(&effect);
                let new_value = latest.lock().clone();
                // The previous invocation's cleanup runs first.
                if let Some(cleanup_fn) = cleanup.lock().take() {
                    trace!("watch cleanup");
                    cleanup_fn();
                }
                let old_value = old.lock().replace(new_value.clone());
                callback(
                    old_value,
                    new_value,
                    &OnCleanup {
                        slot: cleanup.clone(),
                    },
                );
            }
        };

        EffectInner::new(Box::new(compute), Some(Box::new(on_trigger)))
    });

    let effect = ReactiveEffect::from_inner(inner);

    // Establish tracking and capture the initial value.
    effect.run();
    let initial = latest.lock().clone();
    *old.lock() = Some(initial.clone());

    if options.immediate {
        callback(
            None,
            initial,
            &OnCleanup {
                slot: cleanup.clone(),
            },
        );
    }

    WatchHandle { effect }
}

/// Run `f` once and re-run it whenever any reactive state it read changes.
pub fn watch_effect<F>(f: F) -> WatchHandle
where
    F: Fn() + Send + Sync + 'static,
{
    WatchHandle {
        effect: create_effect(f),
    }
}

/// Tracked no-op walk of every reachable field. Reading each field is the
/// point: it subscribes the running effect to that field.
fn traverse(value: &Value, depth: Option<usize>, seen: &mut HashSet<u64>) {
    match value {
        Value::Object(obj) => {
            if !seen.insert(obj.id()) {
                return;
            }
            if depth == Some(0) {
                return;
            }
            let next_depth = depth.map(|d| d - 1);
            for key in obj.keys() {
                let child = obj.get(&key);
                traverse(&child, next_depth, seen);
            }
        }
        Value::List(items) => {
            for item in items.iter() {
                traverse(item, depth, seen);
            }
        }
        _ => {}
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
