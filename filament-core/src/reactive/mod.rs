//! Reactive Primitives
//!
//! This module implements the state-propagation half of the runtime:
//! transparent dependency tracking and the containers built on it.
//!
//! # Concepts
//!
//! ## Effects
//!
//! An [`ReactiveEffect`] wraps a computation. While it runs it is ambient,
//! and every reactive read performed inside registers the effect as a
//! subscriber of that field. When a subscribed field changes, the effect
//! re-runs — either inline or through its scheduler.
//!
//! ## The store
//!
//! [`make_reactive`] opts a plain object into interception: reads track,
//! writes compare-and-notify. Nested objects become reactive lazily as they
//! are read.
//!
//! ## Refs and computeds
//!
//! [`Ref`] is a single reactive slot. [`Computed`] adds caching: its getter
//! re-runs only after a transitive dependency changed, and the computed is
//! itself a dependency source for whoever reads it.
//!
//! ## Watchers
//!
//! [`watch`] diffs a source across reruns and hands `(old, new)` to a
//! callback; [`watch_effect`] re-runs a side-effecting closure.
//!
//! ## Scheduling
//!
//! The [`scheduler`] job queue batches effect re-runs: many synchronous
//! writes, one deferred execution per job.

mod computed;
mod context;
pub(crate) mod dep;
pub(crate) mod effect;
mod reference;
pub mod scheduler;
mod store;
mod watch;

pub use computed::{computed, Computed};
pub use effect::{create_effect, ReactiveEffect, SchedulerFn};
pub use reference::{ref_value, to_ref, to_refs, ObjectRef, Ref};
pub use scheduler::{flush_jobs, has_pending_jobs, queue_job, Job};
pub use store::{is_reactive, make_reactive, reactive};
pub use watch::{watch, watch_effect, OnCleanup, WatchHandle, WatchOptions, WatchSource};
