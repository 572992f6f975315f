//! Graph Nodes
//!
//! This module defines the admin records that live in the dependency graph.
//! Every tracked entity (cell, collection atom, computed, reaction) owns
//! exactly one node. Typed values never live here: a node only carries the
//! bookkeeping the propagation protocol needs, plus a callback into the typed
//! owner when the node is a derivation.

use std::rc::{Rc, Weak};

use indexmap::IndexSet;
use smallvec::SmallVec;

slotmap::new_key_type! {
    /// Stable handle of a node in the runtime arena.
    pub struct NodeId;
}

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A source node (cell or collection atom). It has observers but never
    /// dependencies.
    Observable,

    /// A derived node. It observes its inputs and is observable itself.
    Computed,

    /// An effect node. It has dependencies but no observers.
    Reaction,
}

impl NodeKind {
    pub fn is_derivation(self) -> bool {
        matches!(self, NodeKind::Computed | NodeKind::Reaction)
    }

    pub fn is_observable(self) -> bool {
        matches!(self, NodeKind::Observable | NodeKind::Computed)
    }
}

/// Messages exchanged between an observable and its observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    /// The sender may change; wait for its `Ready`.
    Stale,
    /// The sender settled. `changed` reports whether its value differs.
    Ready { changed: bool },
    /// A cell changed. Cells have no inputs to wait for, so this skips the
    /// two-phase exchange.
    Change,
}

/// Callback from a derivation node back into its typed owner.
pub(crate) trait Derivation {
    /// Run a pending reaction.
    fn execute(&self);

    /// Recompute a computed value. Returns whether the value changed.
    fn recompute(&self) -> bool {
        false
    }

    /// Bring a computed up to date without registering a read.
    fn refresh(&self) {}

    /// The computed lost its last observer and its edges were severed.
    fn on_suspend(&self) {}

    /// Stop an arena-owned derivation for good.
    fn dispose(&self) {}
}

/// How a node refers to its owner.
///
/// Reactions are owned by the arena so an autorun whose handle was dropped
/// keeps running until disposed. Computeds are owned by their handles.
pub(crate) enum Behavior {
    Owned(Rc<dyn Derivation>),
    Borrowed(Weak<dyn Derivation>),
}

impl Behavior {
    pub fn upgrade(&self) -> Option<Rc<dyn Derivation>> {
        match self {
            Behavior::Owned(rc) => Some(Rc::clone(rc)),
            Behavior::Borrowed(weak) => weak.upgrade(),
        }
    }
}

pub(crate) type DependencyList = SmallVec<[NodeId; 4]>;

/// A node in the dependency graph.
pub(crate) struct Node {
    pub name: String,
    pub kind: NodeKind,

    // Observable role.
    /// Derivations that read this node during their last run.
    pub observers: IndexSet<NodeId>,
    /// Epoch of the last value change.
    pub changed_at: u64,
    /// Transient marker used while diffing dependency lists.
    pub seen: bool,

    // Derivation role.
    /// Observables read during the last run, in first-read order.
    pub dependencies: DependencyList,
    /// Scratch list filled during the current run.
    pub new_dependencies: DependencyList,
    pub stale_count: u32,
    pub ready_count: u32,
    pub dependencies_changed: bool,
    /// Epoch at the end of the last run.
    pub ran_at: u64,
    pub is_pending: bool,
    pub is_disposed: bool,

    // Computed role.
    /// Whether the node has live dependency edges (the computed is active
    /// or kept for the remainder of a batch).
    pub is_tracking: bool,
    /// Whether `Stale` was sent to observers in the current wave.
    pub announced: bool,
    pub changed_in_wave: bool,
    pub has_computed_before: bool,
    pub last_action_computed_in: Option<u64>,
    pub pending_unobservation: bool,
    pub keep_alive: bool,

    pub behavior: Option<Behavior>,
}

impl Node {
    /// Create a new node with the given kind.
    pub fn new(kind: NodeKind, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            observers: IndexSet::new(),
            changed_at: 0,
            seen: false,
            dependencies: DependencyList::new(),
            new_dependencies: DependencyList::new(),
            stale_count: 0,
            ready_count: 0,
            dependencies_changed: false,
            ran_at: 0,
            is_pending: false,
            is_disposed: false,
            is_tracking: false,
            announced: false,
            changed_in_wave: false,
            has_computed_before: false,
            last_action_computed_in: None,
            pending_unobservation: false,
            keep_alive: false,
            behavior: None,
        }
    }

    pub fn observable(name: impl Into<String>) -> Self {
        Self::new(NodeKind::Observable, name)
    }

    pub fn computed(name: impl Into<String>) -> Self {
        Self::new(NodeKind::Computed, name)
    }

    pub fn reaction(name: impl Into<String>) -> Self {
        Self::new(NodeKind::Reaction, name)
    }

    /// A derivation may run only once every announced change resolved.
    pub fn can_run(&self) -> bool {
        self.stale_count == self.ready_count
    }

    pub fn has_observers(&self) -> bool {
        !self.observers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_have_the_expected_roles() {
        assert!(NodeKind::Computed.is_derivation());
        assert!(NodeKind::Computed.is_observable());
        assert!(NodeKind::Reaction.is_derivation());
        assert!(!NodeKind::Reaction.is_observable());
        assert!(!NodeKind::Observable.is_derivation());
    }

    #[test]
    fn new_nodes_are_settled() {
        let node = Node::reaction("r");
        assert!(node.can_run());
        assert!(!node.is_pending);
        assert!(!node.has_observers());
    }

    #[test]
    fn unbalanced_counters_block_running() {
        let mut node = Node::computed("c");
        node.stale_count = 2;
        node.ready_count = 1;
        assert!(!node.can_run());

        node.ready_count = 2;
        assert!(node.can_run());
    }
}
