//! Virtual Tree & Reconciliation
//!
//! Declarative tree descriptions ([`VNode`]) and the engine that reconciles
//! one version against the next ([`Renderer`]), applying the minimal
//! mutation sequence through an injected [`RendererOps`] adapter. The
//! adapter is the only boundary to the presentation layer; the engine never
//! assumes a specific one.

mod ops;
mod renderer;
mod seq;
mod vnode;

pub use ops::RendererOps;
pub use renderer::{ComponentInstance, Renderer};
pub use vnode::{same_vnode, Children, ComponentDef, Key, NodeKind, ShapeFlags, VNode};
