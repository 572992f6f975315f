//! Reaction Implementation
//!
//! A reaction is a side-effecting derivation that re-runs whenever one of the
//! observables it read during its last tracked run changes.
//!
//! # How Reactions Work
//!
//! 1. `schedule()` marks the reaction as changed and queues it. The runtime
//!    drains the queue when the outermost batch ends.
//!
//! 2. When the drain reaches the reaction and all of its inputs settled, it
//!    invokes `on_invalidate`. That callback decides what to track: it calls
//!    [`Reaction::track`], which records every read as a dependency and
//!    rewires the edges when the run ends.
//!
//! 3. A panicking `on_invalidate` is caught and reported through the
//!    configured error hook. The reaction stays alive and runs again on the
//!    next change.
//!
//! # Lifetime
//!
//! The runtime owns a reaction until it is disposed. Dropping the returned
//! handle does not stop an autorun; call [`Reaction::dispose`], or
//! [`Runtime::teardown`] to stop all of them.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use tracing::{debug, trace, warn};

use super::comparer::Comparer;
use super::runtime::{panic_message, Runtime};
use crate::graph::{Behavior, Derivation, Node, NodeId};

struct ReactionInner {
    runtime: Runtime,
    id: NodeId,
    name: String,
    on_invalidate: RefCell<Box<dyn FnMut(&Reaction)>>,
    disposed: Cell<bool>,
    /// Set while `track` runs.
    tracking: Cell<bool>,
}

/// A scheduled effect.
#[derive(Clone)]
pub struct Reaction {
    inner: Rc<ReactionInner>,
}

/// The arena-owned half of a reaction.
struct ReactionDriver(Reaction);

impl Derivation for ReactionDriver {
    fn execute(&self) {
        self.0.run();
    }

    fn dispose(&self) {
        self.0.dispose();
    }
}

impl Reaction {
    /// Create a reaction. It does nothing until [`schedule`](Self::schedule)
    /// is called.
    pub fn new(
        runtime: &Runtime,
        name: impl Into<String>,
        on_invalidate: impl FnMut(&Reaction) + 'static,
    ) -> Self {
        let name = name.into();
        let id = runtime.graph_mut().add_node(Node::reaction(name.clone()));
        let reaction = Self {
            inner: Rc::new(ReactionInner {
                runtime: runtime.clone(),
                id,
                name,
                on_invalidate: RefCell::new(Box::new(on_invalidate)),
                disposed: Cell::new(false),
                tracking: Cell::new(false),
            }),
        };

        let driver: Rc<dyn Derivation> = Rc::new(ReactionDriver(reaction.clone()));
        if let Some(node) = runtime.graph_mut().get_mut(id) {
            node.behavior = Some(Behavior::Owned(driver));
        }
        debug!(reaction = %reaction.inner.name, "created");
        reaction
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn runtime(&self) -> &Runtime {
        &self.inner.runtime
    }

    pub(crate) fn id(&self) -> NodeId {
        self.inner.id
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Queue the reaction and drain the queue unless a batch is open.
    pub fn schedule(&self) {
        if self.is_disposed() {
            return;
        }
        let runtime = &self.inner.runtime;
        runtime.graph_mut().schedule(self.inner.id);
        runtime.run_reactions();
    }

    /// Invoke `on_invalidate` under the error boundary.
    fn run(&self) {
        if self.is_disposed() {
            return;
        }
        let runtime = &self.inner.runtime;
        let _batch = runtime.batch_guard();
        trace!(reaction = %self.inner.name, "run");

        let Ok(mut on_invalidate) = self.inner.on_invalidate.try_borrow_mut() else {
            trace!(reaction = %self.inner.name, "already running");
            return;
        };

        if runtime.config().disable_error_boundaries {
            on_invalidate(self);
            return;
        }
        let result = panic::catch_unwind(AssertUnwindSafe(|| on_invalidate(self)));
        drop(on_invalidate);
        if let Err(payload) = result {
            runtime.report_reaction_error(self, panic_message(payload.as_ref()));
        }
    }

    /// Run `f` as a tracked run of this reaction. Every observable read by
    /// `f` becomes a dependency; observables no longer read are released.
    pub fn track(&self, f: impl FnOnce()) {
        if self.is_disposed() {
            return;
        }
        let runtime = &self.inner.runtime;
        let _batch = runtime.batch_guard();

        self.inner.tracking.set(true);
        let _tracking = TrackingGuard(&self.inner.tracking);
        runtime.track(self.inner.id, true, f);

        if self.is_disposed() {
            return;
        }
        let observes_nothing = runtime.graph().dependencies(self.inner.id).is_empty();
        if observes_nothing && runtime.config().reaction_requires_observable {
            warn!(
                "[cascade] Derivation '{}' is created/updated without reading any observable value.",
                self.inner.name
            );
        }
    }

    /// Stop the reaction and release its dependencies. Disposing twice is a
    /// no-op.
    pub fn dispose(&self) {
        if self.inner.disposed.replace(true) {
            return;
        }
        let runtime = &self.inner.runtime;
        let _batch = runtime.batch_guard();

        // While tracking, the edges are released when the run ends.
        let behavior = if self.inner.tracking.get() {
            runtime.graph_mut().mark_disposed(self.inner.id)
        } else {
            let (behavior, lost) = runtime.graph_mut().dispose(self.inner.id);
            let mut graph = runtime.graph_mut();
            for id in lost {
                graph.queue_unobservation(id);
            }
            behavior
        };
        drop(behavior);
        debug!(reaction = %self.inner.name, "disposed");
    }
}

struct TrackingGuard<'a>(&'a Cell<bool>);

impl Drop for TrackingGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl Drop for ReactionInner {
    fn drop(&mut self) {
        let removed = match self.runtime.try_graph_mut() {
            Some(mut graph) => {
                let (node, lost) = graph.remove_node(self.id);
                for id in lost {
                    graph.queue_unobservation(id);
                }
                node
            }
            None => None,
        };
        drop(removed);
    }
}

impl fmt::Debug for Reaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reaction")
            .field("name", &self.inner.name)
            .field("disposed", &self.inner.disposed.get())
            .finish()
    }
}

/// Options for [`Runtime::reaction`].
pub struct ReactionOptions<T> {
    pub name: Option<String>,
    /// Run the effect right after the first evaluation of the expression.
    pub fire_immediately: bool,
    pub equals: Comparer<T>,
}

impl<T> Default for ReactionOptions<T> {
    fn default() -> Self {
        Self {
            name: None,
            fire_immediately: false,
            equals: Comparer::Default,
        }
    }
}

impl<T> ReactionOptions<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn fire_immediately(mut self, fire_immediately: bool) -> Self {
        self.fire_immediately = fire_immediately;
        self
    }

    pub fn equals(mut self, equals: Comparer<T>) -> Self {
        self.equals = equals;
        self
    }
}

impl Runtime {
    /// Run `view` now and whenever anything it read changes.
    pub fn autorun(&self, view: impl FnMut() + 'static) -> Reaction {
        self.autorun_named(self.next_name("Autorun"), view)
    }

    pub fn autorun_named(&self, name: impl Into<String>, mut view: impl FnMut() + 'static) -> Reaction {
        let reaction = Reaction::new(self, name, move |reaction: &Reaction| {
            reaction.track(|| view());
        });
        reaction.schedule();
        reaction
    }

    /// Track `expression` and run `effect` whenever its result changes.
    ///
    /// The effect receives the new value, the previous value (`None` when
    /// fired immediately) and the reaction. It runs inside an action, so its
    /// reads are not tracked.
    pub fn reaction<T, E, F>(&self, mut expression: E, mut effect: F, options: ReactionOptions<T>) -> Reaction
    where
        T: Clone + PartialEq + 'static,
        E: FnMut() -> T + 'static,
        F: FnMut(&T, Option<&T>, &Reaction) + 'static,
    {
        let name = options.name.unwrap_or_else(|| self.next_name("Reaction"));
        let fire_immediately = options.fire_immediately;
        let equals = options.equals;
        let mut value: Option<T> = None;
        let mut first = true;

        let reaction = Reaction::new(self, name, move |reaction: &Reaction| {
            let mut next = None;
            reaction.track(|| next = Some(expression()));
            let Some(next) = next else {
                return;
            };

            let runtime = reaction.runtime();
            let changed = value
                .as_ref()
                .map_or(true, |previous| !equals.equals(runtime, previous, &next));
            let old = value.replace(next.clone());
            let was_first = std::mem::replace(&mut first, false);

            if (was_first && fire_immediately) || (!was_first && changed) {
                runtime.run_in_action(|| effect(&next, old.as_ref(), reaction));
            }
        });
        reaction.schedule();
        reaction
    }
}
