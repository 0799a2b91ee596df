//! Error Types
//!
//! The reactivity half has no recoverable errors: tracking a non-reactive
//! value is silently not tracked, and user computations that panic unwind
//! through `run()` to whoever invoked it. The patch engine, by contrast,
//! validates the trees it is handed — an inconsistent tree is a bug in the
//! tree producer and fails fast instead of producing a corrupt mount.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PatchError {
    /// An operation needed a node's backing element before it was mounted.
    #[error("{0} node has no backing element")]
    Unmounted(&'static str),

    /// A node's children bag does not fit its kind (e.g. a text node whose
    /// children are an array).
    #[error("malformed children for {0} node")]
    MalformedChildren(&'static str),

    /// A component vnode reached the update/unmount path without an
    /// instance attached.
    #[error("component instance missing")]
    MissingInstance,
}
