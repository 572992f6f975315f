//! Dependency Graph
//!
//! This module implements the dependency graph that links observables to the
//! derivations reading them.
//!
//! # Overview
//!
//! - Nodes are cells, collection atoms, computeds and reactions. They live in
//!   a slot-map arena and are addressed by [`NodeId`].
//! - Edges are kept in both directions: an observable knows its observers and
//!   a derivation knows its dependencies in first-read order.
//!
//! When an observable changes the scheduler walks the observer edges with the
//! stale/ready protocol, so every derivation downstream runs at most once per
//! transaction and only after all of its inputs settled.
//!
//! # Design Decisions
//!
//! 1. The graph is centralized in one arena owned by the runtime. Handles
//!    hold ids, never references into it.
//!
//! 2. The graph never runs user code. Anything that must call back into a
//!    derivation is returned to the runtime, which releases its borrow first.

mod node;
mod scheduler;

pub use node::{NodeId, NodeKind};
pub(crate) use node::{Behavior, Derivation, Node};
pub(crate) use scheduler::{Scheduler, Step};
