//! Tracking Context
//!
//! The tracking context records which effect is currently running. This is
//! what makes dependency collection transparent: when a reactive field is
//! read, the store asks the context for the active effect and associates the
//! two.
//!
//! # Implementation
//!
//! A thread-local stack holds the currently executing effect. Entering a
//! context (running an effect) pushes onto the stack, and the returned guard
//! pops on drop — including during unwinding, so a panicking computation
//! cannot leave a stale ambient effect behind. The stack supports nested
//! runs (an effect whose computation runs another effect) with strict
//! save/restore discipline.

use std::cell::RefCell;
use std::sync::Arc;

use super::effect::EffectInner;

thread_local! {
    static EFFECT_STACK: RefCell<Vec<Arc<EffectInner>>> = const { RefCell::new(Vec::new()) };
}

/// Guard marking an effect as the currently running one.
///
/// The effect stays ambient until the guard drops.
pub(crate) struct EffectContext {
    entered: u64,
}

impl EffectContext {
    /// Push `effect` as the active effect for this thread.
    pub(crate) fn enter(effect: Arc<EffectInner>) -> Self {
        let entered = effect.id();
        EFFECT_STACK.with(|stack| stack.borrow_mut().push(effect));
        Self { entered }
    }

    /// Is any effect currently running on this thread?
    pub(crate) fn is_active() -> bool {
        EFFECT_STACK.with(|stack| !stack.borrow().is_empty())
    }

    /// The innermost running effect, if any.
    pub(crate) fn current() -> Option<Arc<EffectInner>> {
        EFFECT_STACK.with(|stack| stack.borrow().last().cloned())
    }
}

impl Drop for EffectContext {
    fn drop(&mut self) {
        EFFECT_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();
            // Catch mismatched enter/exit pairs early in debug builds.
            if let Some(effect) = popped {
                debug_assert_eq!(
                    effect.id(),
                    self.entered,
                    "effect context mismatch: expected {}, got {}",
                    self.entered,
                    effect.id()
                );
            }
        });
    }
}
