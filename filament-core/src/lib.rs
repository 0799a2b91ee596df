//! Filament Core
//!
//! This crate provides the core runtime for the Filament reactive UI
//! framework. It implements:
//!
//! - Reactive primitives (stores, refs, computeds, watchers, effects)
//! - Transparent dependency tracking with batched re-execution
//! - Virtual tree descriptions and keyed reconciliation
//!
//! # Architecture
//!
//! The crate is organized into two halves and a shared value model:
//!
//! - `reactive`: dependency tracking, effects, derived values, the job queue
//! - `vdom`: virtual nodes and the diff/patch engine over an adapter trait
//! - `value`: the dynamic `Value`/`Obj` model both halves operate on
//!
//! # Example
//!
//! ```rust,ignore
//! use filament_core::reactive::{create_effect, flush_jobs, reactive};
//!
//! let state = reactive([("count", 0)]);
//!
//! let snapshot = state.clone();
//! create_effect(move || {
//!     println!("count is {:?}", snapshot.get("count"));
//! });
//!
//! state.set("count", 5);
//! // Effect re-runs, printing: count is Int(5)
//! ```
//!
//! The render path composes the two halves: a component's render effect
//! recomputes its subtree when state changes, the scheduler batches those
//! recomputations, and the patch engine emits the minimal adapter calls.

pub mod error;
pub mod reactive;
pub mod value;
pub mod vdom;

pub use error::PatchError;
pub use value::{Obj, Value};
