//! Reactive Primitives
//!
//! This module implements the core reactive system: observable values,
//! computeds, reactions and actions. Collections are built on top of these
//! in [`crate::collections`].
//!
//! # Concepts
//!
//! ## Observable values
//!
//! An [`ObservableValue`] is a container for mutable state. Reading it inside
//! a tracked run (a computed or a reaction) records a dependency; writing it
//! notifies every derivation that read it.
//!
//! ## Computeds
//!
//! A [`Computed`] is a derived value. While observed it caches its result and
//! re-evaluates only when an input changed. Without observers it is
//! suspended: it holds no edges and recomputes on every read.
//!
//! ## Reactions
//!
//! A [`Reaction`] is a side-effecting derivation. [`Runtime::autorun`] and
//! [`Runtime::reaction`] are the common ways to create one.
//!
//! ## Actions and batches
//!
//! Writes inside [`Runtime::run_in_action`] or [`Runtime::batch`] are
//! collected into one transaction. Reactions run once, after the outermost
//! batch ends, and never see a half-applied update.
//!
//! # Implementation Notes
//!
//! Dependency tracking is explicit: every handle carries its [`Runtime`],
//! and the runtime keeps a stack of context frames recording which
//! derivation is running. Propagation follows a two-phase stale/ready
//! protocol implemented in [`crate::graph`], which is what keeps diamonds
//! glitch-free.

mod action;
mod comparer;
mod computed;
mod context;
mod flow;
mod listeners;
mod observable_value;
mod reaction;
mod runtime;
mod when;

pub use action::Action;
pub use comparer::Comparer;
pub use computed::{Computed, ComputedChange, ComputedOptions};
pub use flow::{Flow, FlowCanceller};
pub use listeners::Disposer;
pub use observable_value::{
    Enhancer, ObservableOptions, ObservableValue, ValueChange, ValueWillChange,
};
pub use reaction::{Reaction, ReactionOptions};
pub use runtime::{Runtime, MAX_REACTION_ITERATIONS};
pub use when::{AbortController, AbortSignal, WhenCanceller, WhenFuture, WhenOptions};

pub(crate) use listeners::{Interceptors, Listeners};
pub(crate) use observable_value::Atom;
