//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects cells, computeds and
//! reactions. It owns the dependency graph, the context stack, the batch
//! counter and the configuration, and it drains the pending queue when the
//! outermost batch ends.
//!
//! # How It Works
//!
//! 1. When a cell or computed is read inside a tracked run, the runtime
//!    records the read on the running derivation.
//!
//! 2. When a cell is written, the runtime opens a batch, lets the graph
//!    propagate the change and closes the batch again.
//!
//! 3. When the outermost batch closes, the runtime:
//!    a. Sweeps the pending queue, deferring nodes still waiting on a stale
//!       input
//!    b. Runs reactions and settles computeds whose inputs resolved
//!    c. Repeats until the queue is empty or the iteration cap is hit
//!    d. Suspends computeds that ended the batch without observers
//!
//! # Threading
//!
//! A runtime is single-threaded: `Runtime` is a cheap `Rc` handle and is
//! neither `Send` nor `Sync`. Independent runtimes share nothing.

use std::any::Any;
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use tracing::{debug, error, trace, warn};

use super::context::{Frame, ReactiveContext};
use super::reaction::Reaction;
use crate::config::{Config, ConfigOptions, EnforceActions};
use crate::error::Error;
use crate::graph::{Derivation, NodeId, NodeKind, Scheduler, Step};

/// Number of sweeps over the pending queue before the drain gives up.
pub const MAX_REACTION_ITERATIONS: usize = 100;

/// Handle to one reactive runtime.
///
/// Every cell, computed and reaction belongs to exactly one runtime. Cloning
/// the handle is cheap and all clones refer to the same state.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

struct RuntimeInner {
    graph: RefCell<Scheduler>,
    config: RefCell<Config>,
    frames: RefCell<Vec<Frame>>,
    batch_depth: Cell<u32>,
    transaction_counter: Cell<u64>,
    current_transaction: Cell<u64>,
    running_reactions: Cell<bool>,
    suppress_reaction_errors: Cell<bool>,
    next_id: Cell<u64>,
}

impl Runtime {
    /// Create a runtime with the default configuration.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RuntimeInner {
                graph: RefCell::new(Scheduler::new()),
                config: RefCell::new(Config::default()),
                frames: RefCell::new(Vec::new()),
                batch_depth: Cell::new(0),
                transaction_counter: Cell::new(0),
                current_transaction: Cell::new(0),
                running_reactions: Cell::new(false),
                suppress_reaction_errors: Cell::new(false),
                next_id: Cell::new(0),
            }),
        }
    }

    /// Create a runtime and apply `options` to its configuration.
    pub fn with_config(options: ConfigOptions) -> Self {
        let runtime = Self::new();
        runtime.configure(options);
        runtime
    }

    /// Update the configuration. Unset options keep their current value.
    pub fn configure(&self, options: ConfigOptions) {
        debug!(?options, "configure");
        self.inner.config.borrow_mut().apply(options);
    }

    pub fn config(&self) -> Ref<'_, Config> {
        self.inner.config.borrow()
    }

    /// Whether two handles refer to the same runtime.
    pub fn ptr_eq(&self, other: &Runtime) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn graph(&self) -> Ref<'_, Scheduler> {
        self.inner.graph.borrow()
    }

    pub(crate) fn graph_mut(&self) -> RefMut<'_, Scheduler> {
        self.inner.graph.borrow_mut()
    }

    pub(crate) fn try_graph_mut(&self) -> Option<RefMut<'_, Scheduler>> {
        self.inner.graph.try_borrow_mut().ok()
    }

    pub(crate) fn frames_mut(&self) -> RefMut<'_, Vec<Frame>> {
        self.inner.frames.borrow_mut()
    }

    /// Generate a diagnostic name such as `Autorun@3`.
    pub(crate) fn next_name(&self, prefix: &str) -> String {
        let id = self.inner.next_id.get() + 1;
        self.inner.next_id.set(id);
        format!("{prefix}@{id}")
    }

    // ------------------------------------------------------------------
    // Context
    // ------------------------------------------------------------------

    pub(crate) fn current_derivation(&self) -> Option<NodeId> {
        self.inner.frames.borrow().last().and_then(|frame| frame.derivation)
    }

    pub(crate) fn state_changes_allowed(&self) -> bool {
        self.inner
            .frames
            .borrow()
            .last()
            .map_or(true, |frame| frame.allow_state_changes)
    }

    /// Whether a tracked run is active (reads will create edges).
    pub fn is_tracking(&self) -> bool {
        self.current_derivation().is_some()
    }

    /// Run `f` as a tracked run of `derivation`.
    pub(crate) fn track<R>(
        &self,
        derivation: NodeId,
        allow_state_changes: bool,
        f: impl FnOnce() -> R,
    ) -> R {
        let _context = ReactiveContext::tracking(self, derivation, allow_state_changes);
        f()
    }

    /// Rewire the edges of `derivation` after a tracked run.
    pub(crate) fn bind_dependencies(&self, derivation: NodeId) {
        let Some(mut graph) = self.try_graph_mut() else {
            return;
        };
        let lost = graph.finish_run(derivation);
        for id in lost {
            graph.queue_unobservation(id);
        }
    }

    /// Run `f` without tracking reads.
    pub fn untracked<R>(&self, f: impl FnOnce() -> R) -> R {
        let allow = self.state_changes_allowed();
        let _context = ReactiveContext::untracked(self, allow);
        f()
    }

    /// Run `f` with writes to observed state allowed or forbidden.
    pub fn allow_state_changes<R>(&self, allow: bool, f: impl FnOnce() -> R) -> R {
        let _context = ReactiveContext::allowing(self, allow);
        f()
    }

    // ------------------------------------------------------------------
    // Batches
    // ------------------------------------------------------------------

    pub fn in_batch(&self) -> bool {
        self.inner.batch_depth.get() > 0
    }

    /// The id of the running transaction, if a batch is open.
    pub fn current_transaction(&self) -> Option<u64> {
        self.in_batch().then(|| self.inner.current_transaction.get())
    }

    pub(crate) fn start_batch(&self) {
        let depth = self.inner.batch_depth.get();
        if depth == 0 {
            let transaction = self.inner.transaction_counter.get() + 1;
            self.inner.transaction_counter.set(transaction);
            self.inner.current_transaction.set(transaction);
            trace!(transaction, "transaction started");
        }
        self.inner.batch_depth.set(depth + 1);
    }

    pub(crate) fn end_batch(&self) {
        let depth = self.inner.batch_depth.get().saturating_sub(1);
        self.inner.batch_depth.set(depth);
        if depth == 0 && !std::thread::panicking() {
            self.run_reactions();
            self.process_unobservations();
        }
    }

    pub(crate) fn batch_guard(&self) -> BatchGuard {
        self.start_batch();
        BatchGuard {
            runtime: self.clone(),
        }
    }

    /// Run `f` inside a batch. Reactions run once, when the outermost batch
    /// ends. Reads stay tracked.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        let _batch = self.batch_guard();
        f()
    }

    pub(crate) fn set_suppress_reaction_errors(&self, suppress: bool) {
        self.inner.suppress_reaction_errors.set(suppress);
    }

    // ------------------------------------------------------------------
    // Observables
    // ------------------------------------------------------------------

    /// Record a read of `id` on the running derivation.
    pub(crate) fn report_observed(&self, id: NodeId) -> bool {
        if let Some(derivation) = self.current_derivation() {
            self.graph_mut().record_read(derivation, id);
            return true;
        }

        let mut graph = self.graph_mut();
        let unobserved_computed = graph
            .get(id)
            .is_some_and(|node| node.kind == NodeKind::Computed && !node.has_observers());
        if unobserved_computed && self.in_batch() {
            graph.queue_unobservation(id);
        }
        drop(graph);

        if self.inner.frames.borrow().is_empty() && self.config().observable_requires_reaction {
            warn!(
                "[cascade] Observable '{}' being read outside a reactive context.",
                self.graph().name(id)
            );
        }
        false
    }

    /// Propagate a change of `id` to its observers.
    pub(crate) fn report_changed(&self, id: NodeId) {
        let _batch = self.batch_guard();
        self.graph_mut().report_changed(id);
    }

    /// Diagnose a write to `id` happening outside an action or inside a
    /// computed. The write itself is never refused.
    pub(crate) fn check_state_change(&self, id: NodeId) {
        let observed = self.graph().has_observers(id);

        if !self.state_changes_allowed() {
            if observed {
                error!(
                    "[cascade] Computed values are not allowed to cause side effects by changing observables that are already being observed: '{}'",
                    self.graph().name(id)
                );
            }
            return;
        }

        if self.in_batch() {
            return;
        }
        let enforced = match self.config().enforce_actions {
            EnforceActions::Never => false,
            EnforceActions::Observed => observed,
            EnforceActions::Always => true,
        };
        if enforced {
            warn!(
                "[cascade] Since strict-mode is enabled, changing (observed) observable values without using an action is not allowed. Tried to modify: {}",
                self.graph().name(id)
            );
        }
    }

    /// Decide whether the cached value of a computed is out of date.
    ///
    /// A computed that only received `Stale` pulls its computed inputs first
    /// and recomputes if one of them changed after its last run.
    pub(crate) fn should_compute(&self, id: NodeId) -> bool {
        let Some(state) = self.graph().computed_state(id) else {
            return true;
        };
        if !state.is_tracking || state.dependencies_changed {
            return true;
        }
        if !state.stale {
            return false;
        }

        let dependencies = self.graph().dependencies(id);
        for dep in dependencies {
            let behavior = {
                let graph = self.graph();
                match graph.get(dep) {
                    Some(node) if node.kind == NodeKind::Computed => {
                        node.behavior.as_ref().and_then(|b| b.upgrade())
                    }
                    _ => None,
                }
            };
            let Some(behavior) = behavior else {
                continue;
            };
            self.untracked(|| behavior.refresh());

            let graph = self.graph();
            let changed_at = graph.get(dep).map_or(0, |node| node.changed_at);
            let ran_at = graph.get(id).map_or(0, |node| node.ran_at);
            if changed_at > ran_at {
                return true;
            }
        }
        false
    }

    // ------------------------------------------------------------------
    // Draining
    // ------------------------------------------------------------------

    /// Drain the pending queue to a fixed point.
    pub(crate) fn run_reactions(&self) {
        if self.in_batch() || self.inner.running_reactions.get() {
            return;
        }
        self.inner.running_reactions.set(true);
        let _guard = DrainGuard {
            runtime: self.clone(),
        };

        let mut iterations = 0;
        loop {
            let sweep = {
                let mut graph = self.graph_mut();
                if !graph.has_pending() {
                    break;
                }
                graph.take_sweep()
            };

            iterations += 1;
            if iterations == MAX_REACTION_ITERATIONS {
                let name = sweep
                    .first()
                    .map(|id| self.graph().name(*id))
                    .unwrap_or_default();
                self.graph_mut().clear_pending(&sweep);
                let err = Error::CircularReaction { name, iterations };
                error!(error = %err, "drain aborted");
                break;
            }

            let mut deferred = Vec::new();
            for id in sweep {
                let step = self.graph_mut().begin_step(id);
                match step {
                    Step::Skip => {}
                    Step::Defer => deferred.push(id),
                    Step::Run(NodeKind::Computed, behavior) => self.settle_computed(id, behavior),
                    Step::Run(_, behavior) => behavior.execute(),
                }
            }
            self.graph_mut().defer(deferred);
        }
    }

    fn settle_computed(&self, id: NodeId, behavior: Rc<dyn Derivation>) {
        if self.graph().needs_recompute(id) {
            behavior.recompute();
        }
        self.graph_mut().finish_wave(id);
    }

    /// Suspend computeds that ended the batch without observers.
    pub(crate) fn process_unobservations(&self) {
        loop {
            let pending = self.graph_mut().take_unobservations();
            if pending.is_empty() {
                break;
            }
            for id in pending {
                let suspended = self.graph_mut().suspend(id);
                let Some((behavior, lost)) = suspended else {
                    continue;
                };
                {
                    let mut graph = self.graph_mut();
                    debug!(computed = %graph.name(id), "suspended");
                    for upstream in lost {
                        graph.queue_unobservation(upstream);
                    }
                }
                if let Some(behavior) = behavior {
                    behavior.on_suspend();
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Errors
    // ------------------------------------------------------------------

    /// Report a reaction failure through the configured hook, or log it.
    ///
    /// Failures caused by an action that already failed are downgraded to a
    /// warning; the hook still sees them, flagged as suppressed.
    pub(crate) fn report_reaction_error(&self, reaction: &Reaction, message: String) {
        let suppressed = self.inner.suppress_reaction_errors.get();
        let err = Error::Reaction {
            name: reaction.name().to_string(),
            message,
            suppressed,
        };

        let handler = self.config().reaction_error_handler();
        if suppressed {
            warn!(
                "[cascade] (error in reaction '{}' suppressed, fix error of causing action below)",
                reaction.name()
            );
        } else if handler.is_none() {
            error!(error = %err, "reaction failed");
        }
        if let Some(handler) = handler {
            handler(&err, reaction);
        }
    }

    /// Dispose every reaction the runtime still owns.
    ///
    /// A live reaction holds the runtime it belongs to, so a runtime with
    /// undisposed reactions is never freed. After `teardown` it is freed
    /// with its last handle. Cells and computeds stay usable.
    pub fn teardown(&self) {
        let owned = self.graph().owned();
        debug!(reactions = owned.len(), "teardown");
        let _batch = self.batch_guard();
        for derivation in &owned {
            derivation.dispose();
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("nodes", &self.inner.graph.try_borrow().map(|g| g.node_count()).ok())
            .field("batch_depth", &self.inner.batch_depth.get())
            .finish_non_exhaustive()
    }
}

/// Closes a batch when dropped.
pub(crate) struct BatchGuard {
    runtime: Runtime,
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        self.runtime.end_batch();
    }
}

/// Restores the drain flag if a reaction panicked through the drain.
struct DrainGuard {
    runtime: Runtime,
}

impl Drop for DrainGuard {
    fn drop(&mut self) {
        self.runtime.inner.running_reactions.set(false);
        if std::thread::panicking() {
            if let Some(mut graph) = self.runtime.try_graph_mut() {
                graph.requeue_orphans();
            }
        }
    }
}

/// Extract a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else if let Some(err) = payload.downcast_ref::<Error>() {
        err.to_string()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use tracing_test::traced_test;

    #[test]
    fn transactions_are_assigned_on_the_outermost_batch() {
        let runtime = Runtime::new();
        assert_eq!(runtime.current_transaction(), None);

        runtime.batch(|| {
            let outer = runtime.current_transaction();
            runtime.batch(|| assert_eq!(runtime.current_transaction(), outer));
            assert!(outer.is_some());
        });

        let first = runtime.batch(|| runtime.current_transaction());
        let second = runtime.batch(|| runtime.current_transaction());
        assert_ne!(first, second);
    }

    #[test]
    fn reactions_run_once_at_the_end_of_the_outer_batch() {
        let runtime = Runtime::new();
        let cell = runtime.observable_box(0);
        let runs = Rc::new(Cell::new(0));

        let reader = cell.clone();
        let counter = runs.clone();
        let _autorun = runtime.autorun(move || {
            reader.get();
            counter.set(counter.get() + 1);
        });
        assert_eq!(runs.get(), 1);

        runtime.batch(|| {
            cell.set(1);
            cell.set(2);
            runtime.batch(|| cell.set(3));
            assert_eq!(runs.get(), 1);
        });

        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn names_are_unique() {
        let runtime = Runtime::new();
        let a = runtime.next_name("Autorun");
        let b = runtime.next_name("Autorun");
        assert_ne!(a, b);
        assert!(a.starts_with("Autorun@"));
    }

    #[test]
    #[traced_test]
    fn observed_writes_outside_actions_are_diagnosed() {
        let runtime = Runtime::new();
        let cell = runtime.observable_box(0);
        let reader = cell.clone();
        let _autorun = runtime.autorun(move || {
            reader.get();
        });

        cell.set(1);

        assert!(logs_contain("strict-mode is enabled"));
    }

    #[test]
    #[traced_test]
    fn unobserved_writes_pass_silently_by_default() {
        let runtime = Runtime::new();
        let cell = runtime.observable_box(0);

        cell.set(1);

        assert!(!logs_contain("strict-mode is enabled"));
    }

    #[test]
    #[traced_test]
    fn enforce_always_diagnoses_every_bare_write() {
        let runtime =
            Runtime::with_config(ConfigOptions::new().enforce_actions(EnforceActions::Always));
        let cell = runtime.observable_box(0);

        cell.set(1);
        assert!(logs_contain("strict-mode is enabled"));
    }

    #[test]
    #[traced_test]
    fn reads_outside_reactive_context_can_be_diagnosed() {
        let runtime =
            Runtime::with_config(ConfigOptions::new().observable_requires_reaction(true));
        let cell = runtime.observable_box(0);

        cell.get();
        assert!(logs_contain("being read outside a reactive context"));
    }

    #[test]
    #[traced_test]
    fn circular_reactions_stop_at_the_iteration_cap() {
        let runtime = Runtime::new();
        let cell = runtime.observable_box(0);
        let runs = Rc::new(Cell::new(0));

        let writer = cell.clone();
        let counter = runs.clone();
        let _autorun = runtime.autorun(move || {
            counter.set(counter.get() + 1);
            writer.set(writer.get() + 1);
        });
        assert_eq!(runs.get(), 1);

        runtime.run_in_action(|| cell.set(100));

        assert!(logs_contain("doesn't converge to a stable state"));
        assert_eq!(runs.get(), MAX_REACTION_ITERATIONS);
        assert!(!runtime.in_batch());

        // Other reactions keep working afterwards.
        let other = runtime.observable_box(0);
        let seen = Rc::new(Cell::new(0));
        let reader = other.clone();
        let sink = seen.clone();
        let _second = runtime.autorun(move || sink.set(reader.get()));
        runtime.run_in_action(|| other.set(7));
        assert_eq!(seen.get(), 7);
    }

    #[test]
    fn teardown_releases_a_runtime_held_by_its_reactions() {
        let runtime = Runtime::new();
        let cell = runtime.observable_box(0);
        let runs = Rc::new(Cell::new(0));

        let (reader, counter) = (cell.clone(), runs.clone());
        let autorun = runtime.autorun(move || {
            reader.get();
            counter.set(counter.get() + 1);
        });
        let _detached = runtime.autorun(|| {});
        let weak = Rc::downgrade(&runtime.inner);

        runtime.teardown();
        assert!(autorun.is_disposed());
        runtime.run_in_action(|| cell.set(1));
        assert_eq!(runs.get(), 1);
        assert_eq!(cell.get(), 1);

        drop((runtime, cell, autorun, _detached));
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn panic_messages_are_extracted() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");

        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");

        let payload: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
