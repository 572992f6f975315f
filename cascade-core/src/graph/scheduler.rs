//! Update Scheduler
//!
//! The scheduler owns the arena of nodes, the symmetric observer/dependency
//! edges, the pending queue and the stale/ready propagation protocol. It never
//! calls user code: operations that need a derivation to run hand back the
//! derivation callback and let the runtime invoke it with no borrow held.
//!
//! # Algorithm
//!
//! 1. A cell write sends `Change` to each observer. A computed that receives
//!    `Change` (or its first `Stale`) announces `Stale` to its own observers.
//! 2. Every derivation whose input changed enqueues itself once.
//! 3. At the end of the outermost batch the runtime sweeps the queue. A node
//!    whose `stale_count` has not caught up with `ready_count` is deferred to
//!    the front of the queue; the others run (reactions) or settle
//!    (computeds).
//! 4. Settling a computed sends exactly one `Ready { changed }` to each
//!    observer, which may settle further computeds synchronously.
//!
//! A diamond therefore runs its shared sink once: it is only runnable after
//! every branch reported `Ready`.

use std::collections::VecDeque;
use std::rc::Rc;

use slotmap::SlotMap;
use tracing::trace;

use super::node::{Behavior, DependencyList, Derivation, Node, NodeId, NodeKind, Notification};

/// What the runtime should do with a node taken off the queue.
pub(crate) enum Step {
    Skip,
    Defer,
    Run(NodeKind, Rc<dyn Derivation>),
}

/// Snapshot of the fields a computed consults on read.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ComputedState {
    pub is_tracking: bool,
    pub dependencies_changed: bool,
    pub stale: bool,
}

/// The update scheduler manages the dependency graph and coordinates updates.
pub(crate) struct Scheduler {
    /// All nodes in the graph.
    nodes: SlotMap<NodeId, Node>,
    pending: VecDeque<NodeId>,
    pending_unobservations: Vec<NodeId>,
    /// Incremented on every value change.
    epoch: u64,
}

impl Scheduler {
    /// Create a new empty scheduler.
    pub fn new() -> Self {
        Self {
            nodes: SlotMap::with_key(),
            pending: VecDeque::new(),
            pending_unobservations: Vec::new(),
            epoch: 0,
        }
    }

    /// Add a node to the graph.
    pub fn add_node(&mut self, node: Node) -> NodeId {
        self.nodes.insert(node)
    }

    /// Remove a node from the graph together with every edge touching it.
    ///
    /// Returns the removed node and the computeds left without observers.
    pub fn remove_node(&mut self, id: NodeId) -> (Option<Node>, Vec<NodeId>) {
        if !self.nodes.contains_key(id) {
            return (None, Vec::new());
        }
        // Observers waiting on this node's wave must not stay blocked.
        self.finish_wave(id);
        let Some(node) = self.nodes.remove(id) else {
            return (None, Vec::new());
        };

        for observer in &node.observers {
            if let Some(observer) = self.nodes.get_mut(*observer) {
                observer.dependencies.retain(|dep| *dep != id);
                observer.new_dependencies.retain(|dep| *dep != id);
            }
        }

        let lost = self.detach(id, &node.dependencies);
        self.pending.retain(|pending| *pending != id);
        self.pending_unobservations.retain(|pending| *pending != id);
        (Some(node), lost)
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    pub fn name(&self, id: NodeId) -> String {
        self.nodes
            .get(id)
            .map(|node| node.name.clone())
            .unwrap_or_else(|| "<removed>".to_string())
    }

    pub fn has_observers(&self, id: NodeId) -> bool {
        self.nodes.get(id).is_some_and(Node::has_observers)
    }

    pub fn dependencies(&self, id: NodeId) -> DependencyList {
        self.nodes
            .get(id)
            .map(|node| node.dependencies.clone())
            .unwrap_or_default()
    }

    pub fn observers(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes
            .get(id)
            .map(|node| node.observers.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Derivations kept alive by the arena itself.
    pub fn owned(&self) -> Vec<Rc<dyn Derivation>> {
        self.nodes
            .values()
            .filter_map(|node| match &node.behavior {
                Some(Behavior::Owned(owner)) => Some(Rc::clone(owner)),
                _ => None,
            })
            .collect()
    }

    /// Get the total number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Add a dependency edge: `observer` depends on `dependency`.
    pub fn add_edge(&mut self, dependency: NodeId, observer: NodeId) {
        if let Some(dep) = self.nodes.get_mut(dependency) {
            dep.observers.insert(observer);
        }
        if let Some(node) = self.nodes.get_mut(observer) {
            if !node.dependencies.contains(&dependency) {
                node.dependencies.push(dependency);
            }
        }
    }

    /// Remove a dependency edge. Returns whether `dependency` is a computed
    /// that lost its last observer.
    pub fn remove_edge(&mut self, dependency: NodeId, observer: NodeId) -> bool {
        if let Some(node) = self.nodes.get_mut(observer) {
            node.dependencies.retain(|dep| *dep != dependency);
        }
        !self.detach(observer, &[dependency]).is_empty()
    }

    fn detach(&mut self, observer: NodeId, dependencies: &[NodeId]) -> Vec<NodeId> {
        let mut lost = Vec::new();
        let mut released = 0;
        for dep_id in dependencies {
            if let Some(dep) = self.nodes.get_mut(*dep_id) {
                dep.observers.shift_remove(&observer);
                if dep.announced {
                    released += 1;
                }
                if dep.observers.is_empty() && dep.kind == NodeKind::Computed {
                    lost.push(*dep_id);
                }
            }
        }
        self.release(observer, released);
        lost
    }

    /// Count a `Ready` for each dropped edge whose source announced `Stale`
    /// but will no longer report back to `observer`.
    fn release(&mut self, observer: NodeId, released: u32) {
        if released == 0 {
            return;
        }
        if let Some(node) = self.nodes.get_mut(observer) {
            node.ready_count = (node.ready_count + released).min(node.stale_count);
        }
    }

    // ------------------------------------------------------------------
    // Dependency tracking
    // ------------------------------------------------------------------

    /// Prepare a derivation for a tracked run.
    pub fn begin_run(&mut self, id: NodeId) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.new_dependencies.clear();
            node.dependencies_changed = false;
        }
    }

    /// Record that the running derivation read `observable`.
    pub fn record_read(&mut self, derivation: NodeId, observable: NodeId) {
        if let Some(node) = self.nodes.get_mut(derivation) {
            node.new_dependencies.push(observable);
        }
    }

    /// Close a tracked run: rewire edges and stamp the run epoch.
    ///
    /// Returns the computeds that lost their last observer.
    pub fn finish_run(&mut self, id: NodeId) -> Vec<NodeId> {
        let epoch = self.epoch;
        let Some(node) = self.nodes.get_mut(id) else {
            return Vec::new();
        };
        node.ran_at = epoch;

        if node.is_disposed {
            node.new_dependencies.clear();
            return self.clear_dependencies(id);
        }
        if node.kind == NodeKind::Computed {
            node.is_tracking = true;
            node.has_computed_before = true;
        }
        self.bind_dependencies(id)
    }

    /// Diff the previous dependency list against the one observed during the
    /// run that just finished.
    fn bind_dependencies(&mut self, id: NodeId) -> Vec<NodeId> {
        let (observed, previous) = match self.nodes.get_mut(id) {
            Some(node) => (
                std::mem::take(&mut node.new_dependencies),
                std::mem::take(&mut node.dependencies),
            ),
            None => return Vec::new(),
        };

        // Deduplicate the reads, marking every observable still in use.
        let mut unique = DependencyList::new();
        for dep_id in observed {
            if let Some(dep) = self.nodes.get_mut(dep_id) {
                if !dep.seen {
                    dep.seen = true;
                    unique.push(dep_id);
                }
            }
        }

        // Unmarked previous dependencies are gone.
        let mut lost = Vec::new();
        let mut released = 0;
        for dep_id in previous {
            if let Some(dep) = self.nodes.get_mut(dep_id) {
                if !dep.seen {
                    dep.observers.shift_remove(&id);
                    if dep.announced {
                        released += 1;
                    }
                    if dep.observers.is_empty() && dep.kind == NodeKind::Computed {
                        lost.push(dep_id);
                    }
                }
            }
        }
        self.release(id, released);

        for dep_id in &unique {
            if let Some(dep) = self.nodes.get_mut(*dep_id) {
                dep.seen = false;
                dep.observers.insert(id);
            }
        }

        if let Some(node) = self.nodes.get_mut(id) {
            node.dependencies = unique;
        }
        lost
    }

    /// Sever every dependency edge of a derivation.
    pub fn clear_dependencies(&mut self, id: NodeId) -> Vec<NodeId> {
        let previous = match self.nodes.get_mut(id) {
            Some(node) => std::mem::take(&mut node.dependencies),
            None => return Vec::new(),
        };
        self.detach(id, &previous)
    }

    // ------------------------------------------------------------------
    // Propagation
    // ------------------------------------------------------------------

    /// A cell or collection atom changed.
    pub fn report_changed(&mut self, id: NodeId) {
        self.epoch += 1;
        let epoch = self.epoch;
        let observers = match self.nodes.get_mut(id) {
            Some(node) => {
                node.changed_at = epoch;
                node.observers.iter().copied().collect::<Vec<_>>()
            }
            None => return,
        };
        for observer in observers {
            self.deliver(observer, id, Notification::Change);
        }
    }

    /// A computed stored a value that differs from the previous one.
    pub fn mark_value_changed(&mut self, id: NodeId) {
        self.epoch += 1;
        let epoch = self.epoch;
        if let Some(node) = self.nodes.get_mut(id) {
            node.changed_at = epoch;
            node.changed_in_wave = true;
        }
    }

    pub fn set_computed_in(&mut self, id: NodeId, transaction: u64) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.last_action_computed_in = Some(transaction);
        }
    }

    /// Deliver one notification from `source` to `target`.
    pub fn deliver(&mut self, target: NodeId, source: NodeId, notification: Notification) {
        let source_changed_at = self.nodes.get(source).map_or(0, |node| node.changed_at);
        let Some(node) = self.nodes.get_mut(target) else {
            return;
        };
        if node.is_disposed {
            return;
        }
        let kind = node.kind;

        match notification {
            Notification::Stale => {
                node.stale_count += 1;
                if kind == NodeKind::Computed {
                    self.announce_stale(target);
                }
            }
            Notification::Ready { changed } => {
                // A `Ready` without a matching `Stale` comes from an edge that
                // was bound mid-wave; it only carries the change bit.
                if node.ready_count < node.stale_count {
                    node.ready_count += 1;
                }
                if changed && source_changed_at > node.ran_at {
                    node.dependencies_changed = true;
                }

                if node.dependencies_changed {
                    self.enqueue(target);
                } else if node.can_run() && !node.is_pending {
                    node.stale_count = 0;
                    node.ready_count = 0;
                    if kind == NodeKind::Computed {
                        self.finish_wave(target);
                    }
                }
            }
            Notification::Change => {
                node.dependencies_changed = true;
                if kind == NodeKind::Computed {
                    self.announce_stale(target);
                }
                self.enqueue(target);
            }
        }
    }

    fn announce_stale(&mut self, id: NodeId) {
        let observers = match self.nodes.get_mut(id) {
            Some(node) if !node.announced => {
                node.announced = true;
                node.changed_in_wave = false;
                node.observers.iter().copied().collect::<Vec<_>>()
            }
            _ => return,
        };
        for observer in observers {
            self.deliver(observer, id, Notification::Stale);
        }
    }

    /// Close the current wave of a computed and tell its observers.
    pub fn finish_wave(&mut self, id: NodeId) {
        let (announced, changed, observers) = match self.nodes.get_mut(id) {
            Some(node) => {
                let announced = std::mem::replace(&mut node.announced, false);
                let changed = std::mem::replace(&mut node.changed_in_wave, false);
                node.stale_count = 0;
                node.ready_count = 0;
                (announced, changed, node.observers.iter().copied().collect::<Vec<_>>())
            }
            None => return,
        };

        let notification = if announced {
            Notification::Ready { changed }
        } else if changed {
            Notification::Change
        } else {
            return;
        };
        for observer in observers {
            self.deliver(observer, id, notification);
        }
    }

    /// Close the wave of a computed that was recomputed by a pull while its
    /// observers were waiting on it, once nothing upstream is outstanding.
    pub fn settle_if_ready(&mut self, id: NodeId) {
        let ready = self
            .nodes
            .get(id)
            .is_some_and(|node| node.announced && node.can_run() && !node.is_pending);
        if ready {
            self.finish_wave(id);
        }
    }

    /// Force a derivation to run at the next drain.
    pub fn schedule(&mut self, id: NodeId) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.dependencies_changed = true;
        }
        self.enqueue(id);
    }

    fn enqueue(&mut self, id: NodeId) {
        if let Some(node) = self.nodes.get_mut(id) {
            if !node.is_pending && !node.is_disposed {
                node.is_pending = true;
                self.pending.push_back(id);
                trace!(node = %node.name, "enqueued");
            }
        }
    }

    // ------------------------------------------------------------------
    // Draining
    // ------------------------------------------------------------------

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn take_sweep(&mut self) -> Vec<NodeId> {
        self.pending.drain(..).collect()
    }

    /// Decide what to do with a node taken off the queue.
    pub fn begin_step(&mut self, id: NodeId) -> Step {
        let Some(node) = self.nodes.get_mut(id) else {
            return Step::Skip;
        };
        if node.is_disposed || !node.is_pending {
            return Step::Skip;
        }
        if !node.can_run() {
            return Step::Defer;
        }

        node.is_pending = false;
        node.stale_count = 0;
        node.ready_count = 0;

        if node.kind == NodeKind::Reaction && !node.dependencies_changed {
            return Step::Skip;
        }
        match node.behavior.as_ref().and_then(Behavior::upgrade) {
            Some(behavior) => Step::Run(node.kind, behavior),
            None => Step::Skip,
        }
    }

    /// Put nodes that could not run yet back at the front of the queue.
    pub fn defer(&mut self, deferred: Vec<NodeId>) {
        for id in deferred.into_iter().rev() {
            self.pending.push_front(id);
        }
    }

    /// Drop every queued node after the iteration cap was hit.
    pub fn clear_pending(&mut self, sweep: &[NodeId]) {
        let queued: Vec<NodeId> = self.pending.drain(..).collect();
        for id in queued.iter().chain(sweep) {
            if let Some(node) = self.nodes.get_mut(*id) {
                node.is_pending = false;
                node.stale_count = 0;
                node.ready_count = 0;
                node.announced = false;
            }
        }
    }

    /// Re-queue pending nodes that fell out of the queue when a drain was
    /// unwound by a panic.
    pub fn requeue_orphans(&mut self) {
        let orphans: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|(id, node)| node.is_pending && !self.pending.contains(id))
            .map(|(id, _)| id)
            .collect();
        self.pending.extend(orphans);
    }

    /// Whether a settling computed has to recompute before reporting.
    pub fn needs_recompute(&self, id: NodeId) -> bool {
        self.nodes.get(id).is_some_and(|node| {
            node.is_tracking && node.dependencies_changed && node.has_observers()
        })
    }

    pub fn computed_state(&self, id: NodeId) -> Option<ComputedState> {
        self.nodes.get(id).map(|node| ComputedState {
            is_tracking: node.is_tracking,
            dependencies_changed: node.dependencies_changed,
            stale: node.stale_count > node.ready_count,
        })
    }

    /// Dispose a derivation: remove it from the queue and sever its edges.
    ///
    /// Returns the owned behavior (to be dropped by the caller once no borrow
    /// is held) and the computeds left without observers.
    pub fn dispose(&mut self, id: NodeId) -> (Option<Behavior>, Vec<NodeId>) {
        let behavior = match self.nodes.get_mut(id) {
            Some(node) => {
                node.is_disposed = true;
                node.is_pending = false;
                node.behavior.take()
            }
            None => return (None, Vec::new()),
        };
        self.pending.retain(|pending| *pending != id);
        (behavior, self.clear_dependencies(id))
    }

    /// Mark a derivation as disposed while it is still running; its edges are
    /// cleared when the run finishes.
    pub fn mark_disposed(&mut self, id: NodeId) -> Option<Behavior> {
        let node = self.nodes.get_mut(id)?;
        node.is_disposed = true;
        node.is_pending = false;
        self.pending.retain(|pending| *pending != id);
        self.nodes.get_mut(id).and_then(|node| node.behavior.take())
    }

    // ------------------------------------------------------------------
    // Suspension
    // ------------------------------------------------------------------

    pub fn queue_unobservation(&mut self, id: NodeId) {
        if let Some(node) = self.nodes.get_mut(id) {
            if !node.pending_unobservation {
                node.pending_unobservation = true;
                self.pending_unobservations.push(id);
            }
        }
    }

    pub fn take_unobservations(&mut self) -> Vec<NodeId> {
        std::mem::take(&mut self.pending_unobservations)
    }

    /// Suspend a computed that is still unobserved: sever its dependency
    /// edges and forget its wave state.
    ///
    /// Returns the owner to notify and the upstream computeds that lost
    /// their last observer in turn, or `None` if the node stays active.
    pub fn suspend(&mut self, id: NodeId) -> Option<(Option<Rc<dyn Derivation>>, Vec<NodeId>)> {
        let node = self.nodes.get_mut(id)?;
        node.pending_unobservation = false;
        if node.has_observers() || node.keep_alive || !node.is_tracking {
            return None;
        }

        node.is_tracking = false;
        node.is_pending = false;
        node.announced = false;
        node.changed_in_wave = false;
        node.stale_count = 0;
        node.ready_count = 0;
        node.dependencies_changed = false;
        let behavior = node.behavior.as_ref().and_then(Behavior::upgrade);

        self.pending.retain(|pending| *pending != id);
        let lost = self.clear_dependencies(id);
        Some((behavior, lost))
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observed_by(scheduler: &mut Scheduler, observable: NodeId, derivation: NodeId) {
        scheduler.begin_run(derivation);
        scheduler.record_read(derivation, observable);
        scheduler.finish_run(derivation);
    }

    #[test]
    fn add_and_remove_nodes() {
        let mut scheduler = Scheduler::new();

        let id1 = scheduler.add_node(Node::observable("a"));
        let id2 = scheduler.add_node(Node::computed("b"));

        assert_eq!(scheduler.node_count(), 2);

        scheduler.remove_node(id1);
        assert_eq!(scheduler.node_count(), 1);
        assert!(scheduler.get(id1).is_none());
        assert!(scheduler.get(id2).is_some());
    }

    #[test]
    fn add_and_remove_edges() {
        let mut scheduler = Scheduler::new();

        let source_id = scheduler.add_node(Node::observable("source"));
        let derived_id = scheduler.add_node(Node::computed("derived"));

        scheduler.add_edge(source_id, derived_id);

        assert!(scheduler.get(source_id).unwrap().observers.contains(&derived_id));
        assert!(scheduler.get(derived_id).unwrap().dependencies.contains(&source_id));

        scheduler.remove_edge(source_id, derived_id);

        assert!(!scheduler.get(source_id).unwrap().observers.contains(&derived_id));
        assert!(!scheduler.get(derived_id).unwrap().dependencies.contains(&source_id));
    }

    #[test]
    fn binding_diffs_dependency_lists() {
        let mut scheduler = Scheduler::new();
        let a = scheduler.add_node(Node::observable("a"));
        let b = scheduler.add_node(Node::observable("b"));
        let r = scheduler.add_node(Node::reaction("r"));

        scheduler.begin_run(r);
        scheduler.record_read(r, a);
        scheduler.record_read(r, a);
        scheduler.record_read(r, b);
        scheduler.finish_run(r);

        assert_eq!(scheduler.dependencies(r).as_slice(), &[a, b]);
        assert_eq!(scheduler.observers(a), vec![r]);

        observed_by(&mut scheduler, b, r);

        assert_eq!(scheduler.dependencies(r).as_slice(), &[b]);
        assert!(scheduler.observers(a).is_empty());
        assert!(!scheduler.get(a).unwrap().seen);
        assert!(!scheduler.get(b).unwrap().seen);
    }

    #[test]
    fn binding_reports_lost_computeds() {
        let mut scheduler = Scheduler::new();
        let c = scheduler.add_node(Node::computed("c"));
        let r = scheduler.add_node(Node::reaction("r"));

        observed_by(&mut scheduler, c, r);
        scheduler.begin_run(r);
        let lost = scheduler.finish_run(r);

        assert_eq!(lost, vec![c]);
    }

    #[test]
    fn change_enqueues_observers_once() {
        let mut scheduler = Scheduler::new();
        let a = scheduler.add_node(Node::observable("a"));
        let r = scheduler.add_node(Node::reaction("r"));
        observed_by(&mut scheduler, a, r);

        scheduler.report_changed(a);
        scheduler.report_changed(a);

        assert_eq!(scheduler.take_sweep(), vec![r]);
        assert!(scheduler.get(r).unwrap().dependencies_changed);
    }

    #[test]
    fn diamond_sink_waits_for_both_branches() {
        let mut scheduler = Scheduler::new();
        let base = scheduler.add_node(Node::observable("base"));
        let c1 = scheduler.add_node(Node::computed("c1"));
        let c2 = scheduler.add_node(Node::computed("c2"));
        let r = scheduler.add_node(Node::reaction("r"));
        observed_by(&mut scheduler, base, c1);
        observed_by(&mut scheduler, base, c2);
        scheduler.begin_run(r);
        scheduler.record_read(r, c1);
        scheduler.record_read(r, c2);
        scheduler.finish_run(r);

        scheduler.report_changed(base);
        assert_eq!(scheduler.get(r).unwrap().stale_count, 2);

        // First branch settles with a change: the sink is queued but blocked.
        scheduler.mark_value_changed(c1);
        scheduler.finish_wave(c1);
        let r_node = scheduler.get(r).unwrap();
        assert!(r_node.is_pending);
        assert!(!r_node.can_run());

        // Second branch settles: the sink becomes runnable.
        scheduler.finish_wave(c2);
        assert!(scheduler.get(r).unwrap().can_run());
    }

    #[test]
    fn unchanged_branch_reports_ready_false() {
        let mut scheduler = Scheduler::new();
        let base = scheduler.add_node(Node::observable("base"));
        let c = scheduler.add_node(Node::computed("c"));
        let r = scheduler.add_node(Node::reaction("r"));
        observed_by(&mut scheduler, base, c);
        observed_by(&mut scheduler, c, r);

        scheduler.report_changed(base);
        scheduler.finish_wave(c);

        let r_node = scheduler.get(r).unwrap();
        assert!(!r_node.is_pending);
        assert!(!r_node.dependencies_changed);
        assert_eq!(r_node.stale_count, 0);
    }

    #[test]
    fn dropping_an_announced_edge_unblocks_the_observer() {
        let mut scheduler = Scheduler::new();
        let base = scheduler.add_node(Node::observable("base"));
        let c = scheduler.add_node(Node::computed("c"));
        let d = scheduler.add_node(Node::computed("d"));
        observed_by(&mut scheduler, base, c);
        observed_by(&mut scheduler, c, d);

        scheduler.report_changed(base);
        assert!(!scheduler.get(d).unwrap().can_run());

        // `d` recomputes and stops reading `c` before `c` settles.
        scheduler.begin_run(d);
        scheduler.finish_run(d);

        assert!(scheduler.get(d).unwrap().can_run());
    }

    #[test]
    fn blocked_nodes_are_deferred_to_the_front() {
        let mut scheduler = Scheduler::new();
        let a = scheduler.add_node(Node::reaction("a"));
        let b = scheduler.add_node(Node::reaction("b"));
        scheduler.schedule(b);
        scheduler.defer(vec![a]);

        assert_eq!(scheduler.take_sweep(), vec![a, b]);
    }

    #[test]
    fn removing_a_node_severs_both_directions() {
        let mut scheduler = Scheduler::new();
        let a = scheduler.add_node(Node::observable("a"));
        let c = scheduler.add_node(Node::computed("c"));
        let r = scheduler.add_node(Node::reaction("r"));
        observed_by(&mut scheduler, a, c);
        observed_by(&mut scheduler, c, r);

        let (removed, lost) = scheduler.remove_node(c);

        assert!(removed.is_some());
        assert!(lost.is_empty());
        assert!(scheduler.observers(a).is_empty());
        assert!(scheduler.dependencies(r).is_empty());
    }

    #[test]
    fn suspend_clears_edges_of_unobserved_computeds() {
        let mut scheduler = Scheduler::new();
        let a = scheduler.add_node(Node::observable("a"));
        let upstream = scheduler.add_node(Node::computed("upstream"));
        let c = scheduler.add_node(Node::computed("c"));
        observed_by(&mut scheduler, a, upstream);
        observed_by(&mut scheduler, upstream, c);

        let (_, lost) = scheduler.suspend(c).expect("c is unobserved");

        assert_eq!(lost, vec![upstream]);
        assert!(!scheduler.get(c).unwrap().is_tracking);
        assert!(scheduler.observers(upstream).is_empty());
    }
}
