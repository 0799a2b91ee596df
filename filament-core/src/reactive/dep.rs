//! Dependency Entries & the Dependency Map
//!
//! A dependency entry ties one observed `(object, field)` pair to the
//! ordered set of effects that read it during their latest run. The
//! process-wide dependency map holds these entries keyed by object id and
//! field name, creating them lazily on first tracked read and dropping them
//! once their last subscriber detaches.
//!
//! # Subscription bookkeeping
//!
//! Each subscription records the effect's *run generation* at the time of
//! tracking. An effect re-reading the same field within one run is a cheap
//! no-op (the generation matches), and a stale subscription from a previous
//! run is detected without a set difference. Effects additionally keep their
//! entries in read order, so a rerun that reads the same fields in the same
//! order only advances a counter — see [`track_effect`].

use std::collections::hash_map::RandomState;
use std::sync::{Arc, OnceLock, Weak};

use dashmap::DashMap;
use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::trace;

use super::context::EffectContext;
use super::effect::EffectInner;
use crate::value::Value;

/// One `(object, field)` → subscribers record.
///
/// Cheap to clone; identity-compared. The cleanup callback detaches the
/// entry from wherever it is registered (the dependency map, a ref's slot)
/// once the subscriber set empties.
#[derive(Clone)]
pub(crate) struct Dep {
    inner: Arc<DepInner>,
}

struct DepInner {
    /// Field name, for diagnostics only.
    key: String,
    /// effect id → (run generation, effect), in subscription order.
    subs: Mutex<IndexMap<u64, SubEntry>>,
    cleanup: Box<dyn Fn() + Send + Sync>,
}

struct SubEntry {
    generation: u64,
    effect: Weak<EffectInner>,
}

impl Dep {
    pub(crate) fn new(key: &str, cleanup: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(DepInner {
                key: key.to_owned(),
                subs: Mutex::new(IndexMap::new()),
                cleanup: Box::new(cleanup),
            }),
        }
    }

    pub(crate) fn same(&self, other: &Dep) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn key(&self) -> &str {
        &self.inner.key
    }

    /// The run generation recorded for `effect_id`, if subscribed.
    fn generation_of(&self, effect_id: u64) -> Option<u64> {
        self.inner
            .subs
            .lock()
            .get(&effect_id)
            .map(|entry| entry.generation)
    }

    fn subscribe(&self, effect: &Arc<EffectInner>, generation: u64) {
        self.inner.subs.lock().insert(
            effect.id(),
            SubEntry {
                generation,
                effect: Arc::downgrade(effect),
            },
        );
    }

    /// Remove `effect_id`; returns true when the entry is now empty.
    fn unsubscribe(&self, effect_id: u64) -> bool {
        let mut subs = self.inner.subs.lock();
        subs.shift_remove(&effect_id);
        subs.is_empty()
    }

    /// Snapshot of the live subscribers, in subscription order.
    fn subscribers(&self) -> Vec<Arc<EffectInner>> {
        self.inner
            .subs
            .lock()
            .values()
            .filter_map(|entry| entry.effect.upgrade())
            .collect()
    }
}

// ----------------------------------------------------------------------------
// Process-wide dependency map
// ----------------------------------------------------------------------------

type TargetMap = DashMap<u64, IndexMap<String, Dep>, RandomState>;

static TARGET_MAP: OnceLock<TargetMap> = OnceLock::new();

fn target_map() -> &'static TargetMap {
    TARGET_MAP.get_or_init(DashMap::default)
}

/// Associate the currently running effect with `(target, key)`.
///
/// No-op when no effect is running.
pub(crate) fn track(target: u64, key: &str) {
    let Some(effect) = EffectContext::current() else {
        return;
    };

    // Locate or create the entry. The map guard must not be held while the
    // effect bookkeeping runs, so the entry is cloned out first.
    let dep = {
        let mut entry = target_map().entry(target).or_default();
        match entry.get(key) {
            Some(dep) => dep.clone(),
            None => {
                let owned_key = key.to_owned();
                let dep = Dep::new(key, move || {
                    if let Some(mut fields) = target_map().get_mut(&target) {
                        fields.swap_remove(&owned_key);
                    }
                });
                entry.insert(key.to_owned(), dep.clone());
                dep
            }
        }
    };

    trace!(target_id = target, key, effect = effect.id(), "track");
    track_effect(&effect, &dep);
}

/// Notify every effect subscribed to `(target, key)`.
///
/// No-op when the key was never tracked. `new`/`old` are carried for
/// diagnostics; consumers that need the previous value (watchers) re-read
/// through their own getter.
pub(crate) fn trigger(target: u64, key: &str, new: &Value, old: Option<&Value>) {
    let Some(dep) = target_map()
        .get(&target)
        .and_then(|fields| fields.get(key).cloned())
    else {
        return;
    };

    trace!(target_id = target, key, ?new, ?old, "trigger");
    trigger_effects(&dep);
}

/// Drop every entry registered under `target`.
///
/// Called when the observed object's last handle is released; the explicit
/// stand-in for weak-keyed map collection.
pub(crate) fn purge_target(target: u64) {
    target_map().remove(&target);
}

// ----------------------------------------------------------------------------
// Effect <-> entry association
// ----------------------------------------------------------------------------

/// Subscribe the running effect to `dep`, maintaining the effect's
/// positionally ordered dependency list.
///
/// Dependencies read in the same order as the previous run only advance the
/// effect's valid-prefix counter. A mismatch at the current position replaces
/// the stale entry (detaching the effect from it) with the new one. The tail
/// left over after the run is trimmed by [`post_clean_effect`].
pub(crate) fn track_effect(effect: &Arc<EffectInner>, dep: &Dep) {
    let generation = effect.generation();
    if dep.generation_of(effect.id()) == Some(generation) {
        // Already collected during this run.
        return;
    }

    dep.subscribe(effect, generation);

    let position = effect.valid_deps();
    match effect.dep_at(position) {
        Some(previous) if previous.same(dep) => {}
        previous => {
            if let Some(previous) = previous {
                clean_dep_effect(&previous, effect.id());
            }
            effect.put_dep(position, dep.clone());
        }
    }
    effect.advance_valid_deps();
}

/// Notify all of `dep`'s subscribers.
///
/// Derived values are marked dirty first. An effect that is currently
/// running is only marked — never re-entered — which breaks the loop where a
/// computation writes state it also reads. Effects with a scheduler defer to
/// it; the rest re-run inline.
pub(crate) fn trigger_effects(dep: &Dep) {
    for effect in dep.subscribers() {
        if !effect.is_dirty() {
            effect.set_dirty(true);
        }

        if effect.running() == 0 {
            match effect.scheduler() {
                Some(scheduler) => scheduler(),
                None => EffectInner::run(&effect),
            }
        }
    }
}

/// Detach `effect_id` from `dep`, retiring the entry if it emptied.
pub(crate) fn clean_dep_effect(dep: &Dep, effect_id: u64) {
    if dep.unsubscribe(effect_id) {
        trace!(key = dep.key(), "dependency entry retired");
        (dep.inner.cleanup)();
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
