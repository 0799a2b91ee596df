//! Reactive Effects
//!
//! An effect wraps a computation and the bookkeeping needed to re-run it
//! when the reactive state it read changes.
//!
//! # Lifecycle
//!
//! idle → running → idle, with `stop()` as the terminal transition. While
//! running, the effect is ambient (see [`super::context`]) so tracked reads
//! attach to it. Each run bumps a generation counter and rebuilds the
//! dependency list positionally: fields re-read in the same order as the
//! previous run cost one counter increment, anything left over is detached
//! afterwards. Cleanup is guard-based, so it happens even when the
//! computation panics.
//!
//! # Scheduling
//!
//! Triggering an effect invokes its scheduler instead of re-running it
//! inline when one is present. Render and watch effects route their
//! scheduler through the job queue to batch bursts of writes; effects built
//! with [`create_effect`] install a scheduler that simply re-runs them.
//!
//! # Re-entrancy
//!
//! A computation that writes a field it also read would otherwise notify
//! itself mid-run forever. A running counter suppresses notification
//! delivery to an effect that is currently executing.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::trace;

use super::context::EffectContext;
use super::dep::{clean_dep_effect, Dep};

/// Counter for generating unique effect IDs.
static EFFECT_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_effect_id() -> u64 {
    EFFECT_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// The wrapped computation of an effect.
pub type EffectFn = Box<dyn Fn() + Send + Sync>;
/// Callback invoked on trigger in place of an inline re-run.
pub type SchedulerFn = Box<dyn Fn() + Send + Sync>;

pub(crate) struct EffectInner {
    id: u64,

    /// The wrapped computation.
    f: EffectFn,

    /// Invoked on trigger instead of re-running inline, when present.
    scheduler: Option<SchedulerFn>,

    /// Cleared by `stop()`; an inactive effect runs without tracking.
    active: AtomicBool,

    /// Run generation, bumped at the start of every tracked run. A
    /// dependency entry holding an older generation for this effect is
    /// stale.
    generation: AtomicU64,

    /// Dependency entries in the order they were read, most recent run's
    /// prefix first.
    deps: Mutex<SmallVec<[Dep; 4]>>,

    /// How many of `deps` have been confirmed by the current run.
    valid_deps: AtomicUsize,

    /// Re-entrancy counter; non-zero while the computation executes.
    running: AtomicU32,

    /// Dirty level for derived values: dirty means the cached result can no
    /// longer be trusted. Fresh effects start dirty so a first read always
    /// computes.
    dirty: AtomicBool,
}

impl EffectInner {
    pub(crate) fn new(f: EffectFn, scheduler: Option<SchedulerFn>) -> Self {
        Self {
            id: next_effect_id(),
            f,
            scheduler,
            active: AtomicBool::new(true),
            generation: AtomicU64::new(0),
            deps: Mutex::new(SmallVec::new()),
            valid_deps: AtomicUsize::new(0),
            running: AtomicU32::new(0),
            dirty: AtomicBool::new(true),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    pub(crate) fn set_dirty(&self, dirty: bool) {
        self.dirty.store(dirty, Ordering::Release);
    }

    pub(crate) fn running(&self) -> u32 {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn scheduler(&self) -> Option<&SchedulerFn> {
        self.scheduler.as_ref()
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub(crate) fn valid_deps(&self) -> usize {
        self.valid_deps.load(Ordering::Acquire)
    }

    pub(crate) fn advance_valid_deps(&self) {
        self.valid_deps.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn dep_at(&self, position: usize) -> Option<Dep> {
        self.deps.lock().get(position).cloned()
    }

    /// Install `dep` at `position`, which is either an in-place replacement
    /// of a stale entry or the next free slot.
    pub(crate) fn put_dep(&self, position: usize, dep: Dep) {
        let mut deps = self.deps.lock();
        if position < deps.len() {
            deps[position] = dep;
        } else {
            debug_assert_eq!(position, deps.len());
            deps.push(dep);
        }
    }

    /// Execute the computation.
    ///
    /// A stopped effect runs its function directly with no tracking. An
    /// active effect becomes ambient for the duration, and both the
    /// stale-dependency trim and the ambient restore are guaranteed on every
    /// exit path.
    pub(crate) fn run(self: &Arc<Self>) {
        // A run always yields a trustworthy result, so clear the dirty level
        // up front (derived values rely on this ordering).
        self.set_dirty(false);

        if !self.is_active() {
            (self.f)();
            return;
        }

        trace!(effect = self.id, "effect run");
        let _ctx = EffectContext::enter(Arc::clone(self));
        pre_clean_effect(self);
        self.running.fetch_add(1, Ordering::AcqRel);
        // Dropped before `_ctx`, so the trim happens while unwinding too.
        let _finish = RunGuard { effect: self };
        (self.f)();
    }

    /// Detach from every dependency entry and refuse future tracking.
    pub(crate) fn stop(self: &Arc<Self>) {
        if self.active.swap(false, Ordering::AcqRel) {
            trace!(effect = self.id, "effect stopped");
            pre_clean_effect(self);
            post_clean_effect(self);
        }
    }
}

struct RunGuard<'a> {
    effect: &'a Arc<EffectInner>,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        post_clean_effect(self.effect);
        self.effect.running.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Reset per-run bookkeeping before the computation executes.
fn pre_clean_effect(effect: &Arc<EffectInner>) {
    effect.generation.fetch_add(1, Ordering::AcqRel);
    effect.valid_deps.store(0, Ordering::Release);
}

/// Detach the dependency tail the current run did not confirm.
fn post_clean_effect(effect: &Arc<EffectInner>) {
    let valid = effect.valid_deps();
    let stale: Vec<Dep> = {
        let mut deps = effect.deps.lock();
        if deps.len() <= valid {
            return;
        }
        deps.drain(valid..).collect()
    };
    for dep in stale {
        clean_dep_effect(&dep, effect.id());
    }
}

/// A tracked computation that re-runs when its recorded dependencies change.
///
/// The raw building block under refs, computeds, watchers and render
/// effects. Construction does not run the computation; call
/// [`run`](ReactiveEffect::run) once to establish initial dependencies, or
/// use [`create_effect`] which does so for you.
pub struct ReactiveEffect {
    inner: Arc<EffectInner>,
}

impl ReactiveEffect {
    /// Wrap `f`, optionally with a scheduler invoked in place of inline
    /// re-runs when a dependency changes.
    pub fn new<F>(f: F, scheduler: Option<SchedulerFn>) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(EffectInner::new(Box::new(f), scheduler)),
        }
    }

    pub(crate) fn from_inner(inner: Arc<EffectInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn inner(&self) -> &Arc<EffectInner> {
        &self.inner
    }

    pub fn id(&self) -> u64 {
        self.inner.id()
    }

    /// Execute the computation, tracking dependencies while active.
    pub fn run(&self) {
        EffectInner::run(&self.inner);
    }

    /// Permanently deactivate: detaches from all dependencies now, and
    /// future `run()` calls execute without tracking. Idempotent.
    pub fn stop(&self) {
        EffectInner::stop(&self.inner);
    }

    pub fn is_active(&self) -> bool {
        self.inner.is_active()
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.inner.is_dirty()
    }

    #[cfg(test)]
    pub(crate) fn dependency_count(&self) -> usize {
        self.inner.deps.lock().len()
    }
}

impl Clone for ReactiveEffect {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl std::fmt::Debug for ReactiveEffect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactiveEffect")
            .field("id", &self.inner.id())
            .field("active", &self.inner.is_active())
            .field("dirty", &self.inner.is_dirty())
            .finish()
    }
}

/// Wrap `f` in an effect that re-runs itself whenever a dependency changes,
/// run it once to collect dependencies, and return the handle.
pub fn create_effect<F>(f: F) -> ReactiveEffect
where
    F: Fn() + Send + Sync + 'static,
{
    let inner = Arc::new_cyclic(|weak: &Weak<EffectInner>| {
        let weak = weak.clone();
        EffectInner::new(
            Box::new(f),
            Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    EffectInner::run(&inner);
                }
            })),
        )
    });

    let effect = ReactiveEffect::from_inner(inner);
    effect.run();
    effect
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
