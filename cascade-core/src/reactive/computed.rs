//! Computed Implementation
//!
//! A computed is a derived value that caches its result while something
//! observes it. It is a derivation over its inputs and an observable for its
//! readers at the same time.
//!
//! # How Computeds Work
//!
//! A computed is either suspended or active:
//!
//! - **Suspended** (no observers, not kept alive): outside a batch every read
//!   recomputes without caching, because nothing would tell the cache it went
//!   stale. Inside a batch the first read tracks temporarily, later reads in
//!   the same transaction hit the cache, and the computed is suspended again
//!   when the outermost batch ends.
//!
//! - **Active** (at least one observer): the first tracked read computes once
//!   and binds the edges to its inputs. Later reads return the cache until an
//!   input reports a change.
//!
//! When an input changes, the computed announces `Stale` downstream, is
//! recomputed by the drain once its own inputs settled, and reports exactly
//! one `Ready { changed }`. Readers that pull it earlier in the same
//! transaction recompute it at most once.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic;
use std::rc::{Rc, Weak};

use tracing::{debug, warn};

use super::comparer::Comparer;
use super::listeners::Disposer;
use super::runtime::Runtime;
use crate::error::{Error, Result};
use crate::graph::{Behavior, Derivation, Node, NodeId};

/// A change of a computed value, passed to `observe` listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputedChange<T> {
    /// `None` on the first report.
    pub old_value: Option<T>,
    pub new_value: T,
}

/// Options for [`Runtime::computed_with`].
pub struct ComputedOptions<T> {
    pub name: Option<String>,
    pub equals: Comparer<T>,
    /// Keep the cache and edges alive without observers.
    pub keep_alive: bool,
    /// Diagnose reads outside a reactive context. Falls back to the runtime
    /// configuration when unset.
    pub requires_reaction: Option<bool>,
    pub setter: Option<Rc<dyn Fn(T)>>,
}

impl<T> Default for ComputedOptions<T> {
    fn default() -> Self {
        Self {
            name: None,
            equals: Comparer::Default,
            keep_alive: false,
            requires_reaction: None,
            setter: None,
        }
    }
}

impl<T> ComputedOptions<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn equals(mut self, equals: Comparer<T>) -> Self {
        self.equals = equals;
        self
    }

    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn requires_reaction(mut self, requires_reaction: bool) -> Self {
        self.requires_reaction = Some(requires_reaction);
        self
    }

    pub fn setter(mut self, setter: impl Fn(T) + 'static) -> Self {
        self.setter = Some(Rc::new(setter));
        self
    }
}

struct ComputedInner<T> {
    runtime: Runtime,
    id: NodeId,
    name: String,
    getter: Box<dyn Fn() -> T>,
    setter: Option<Rc<dyn Fn(T)>>,
    value: RefCell<Option<T>>,
    comparer: Comparer<T>,
    keep_alive: bool,
    requires_reaction: Option<bool>,
    /// Set while the getter runs.
    computing: Cell<bool>,
    /// Set while the setter runs.
    in_setter: Cell<bool>,
    setter_cycle: Cell<bool>,
}

/// A cached derived value.
///
/// # Example
///
/// ```rust
/// use cascade_core::Runtime;
///
/// let runtime = Runtime::new();
/// let count = runtime.observable_box(2);
/// let source = count.clone();
/// let doubled = runtime.computed(move || source.get() * 2);
///
/// assert_eq!(doubled.get(), 4);
/// count.set(5);
/// assert_eq!(doubled.get(), 10);
/// ```
pub struct Computed<T> {
    inner: Rc<ComputedInner<T>>,
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

/// Resets a flag when dropped, so a panicking getter does not leave the
/// computed marked as running.
struct FlagGuard<'a>(&'a Cell<bool>);

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl<T: Clone + PartialEq + 'static> ComputedInner<T> {
    fn try_get(&self) -> Result<T> {
        if self.computing.get() {
            return Err(Error::ComputedCycle {
                name: self.name.clone(),
            });
        }
        let runtime = &self.runtime;

        let suspended = !runtime.in_batch()
            && !runtime.graph().has_observers(self.id)
            && !self.keep_alive;

        if suspended {
            runtime.report_observed(self.id);
            if runtime.should_compute(self.id) {
                self.warn_about_untracked_read();
                return self.compute_untracked();
            }
        } else {
            runtime.report_observed(self.id);
            self.refresh_tracked();
        }

        match &*self.value.borrow() {
            Some(value) => Ok(value.clone()),
            None => self.compute_untracked(),
        }
    }

    fn refresh_tracked(&self) {
        if !self.runtime.should_compute(self.id) {
            return;
        }
        self.track_and_compute();
        self.runtime.graph_mut().settle_if_ready(self.id);
    }

    /// Evaluate the getter without binding edges and without caching.
    fn compute_untracked(&self) -> Result<T> {
        let runtime = &self.runtime;
        let _batch = runtime.batch_guard();
        self.computing.set(true);
        let _computing = FlagGuard(&self.computing);
        let value = runtime.untracked(|| runtime.allow_state_changes(false, || (self.getter)()));
        Ok(value)
    }

    /// Recompute while tracking and store the result. Returns whether the
    /// value changed.
    fn track_and_compute(&self) -> bool {
        let runtime = &self.runtime;
        let observed = runtime.graph().has_observers(self.id);
        let _batch = observed.then(|| runtime.batch_guard());

        let value = {
            self.computing.set(true);
            let _computing = FlagGuard(&self.computing);
            runtime.track(self.id, false, || (self.getter)())
        };

        if let Some(transaction) = runtime.current_transaction() {
            runtime.graph_mut().set_computed_in(self.id, transaction);
        }

        let changed = match &*self.value.borrow() {
            Some(old) => !self.comparer.equals(runtime, old, &value),
            None => true,
        };
        if changed {
            let old = self.value.replace(Some(value));
            runtime.graph_mut().mark_value_changed(self.id);
            drop(old);
        }
        changed
    }

    fn warn_about_untracked_read(&self) {
        let required = self
            .requires_reaction
            .unwrap_or_else(|| self.runtime.config().computed_requires_reaction);
        if required {
            warn!(
                "[cascade] Computed value '{}' is being read outside a reactive context. Doing a full recompute.",
                self.name
            );
        }
    }

    fn set(&self, value: T) -> Result<()> {
        let Some(setter) = self.setter.clone() else {
            warn!(
                "[cascade] It is not possible to assign a new value to a computed value: '{}'",
                self.name
            );
            return Ok(());
        };

        if self.in_setter.get() {
            self.setter_cycle.set(true);
            return Err(Error::ComputedSetterCycle {
                name: self.name.clone(),
            });
        }

        self.in_setter.set(true);
        let _in_setter = FlagGuard(&self.in_setter);
        self.runtime.run_in_action(|| setter(value));

        if self.setter_cycle.replace(false) {
            return Err(Error::ComputedSetterCycle {
                name: self.name.clone(),
            });
        }
        Ok(())
    }
}

impl<T: Clone + PartialEq + 'static> Derivation for ComputedInner<T> {
    fn execute(&self) {}

    fn recompute(&self) -> bool {
        self.track_and_compute()
    }

    fn refresh(&self) {
        if self.runtime.graph().get(self.id).is_some_and(|node| node.is_tracking) {
            self.refresh_tracked();
        }
    }

    fn on_suspend(&self) {
        let stale = self.value.borrow_mut().take();
        drop(stale);
    }
}

impl<T> Drop for ComputedInner<T> {
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

impl<T: Clone + PartialEq + 'static> Computed<T> {
    pub(crate) fn new(
        runtime: &Runtime,
        getter: impl Fn() -> T + 'static,
        options: ComputedOptions<T>,
    ) -> Self {
        let name = options.name.unwrap_or_else(|| runtime.next_name("ComputedValue"));
        let mut node = Node::computed(name.clone());
        node.keep_alive = options.keep_alive;
        let id = runtime.graph_mut().add_node(node);

        let inner = Rc::new(ComputedInner {
            runtime: runtime.clone(),
            id,
            name,
            getter: Box::new(getter),
            setter: options.setter,
            value: RefCell::new(None),
            comparer: options.equals,
            keep_alive: options.keep_alive,
            requires_reaction: options.requires_reaction,
            computing: Cell::new(false),
            in_setter: Cell::new(false),
            setter_cycle: Cell::new(false),
        });

        let weak: Weak<dyn Derivation> = Rc::downgrade(&inner) as Weak<ComputedInner<T>>;
        if let Some(node) = runtime.graph_mut().get_mut(id) {
            node.behavior = Some(Behavior::Borrowed(weak));
        }
        debug!(computed = %inner.name, "created");

        Self { inner }
    }

    /// Get the value.
    ///
    /// # Panics
    ///
    /// Panics with [`Error::ComputedCycle`] if the computed reads itself
    /// while computing. Use [`try_get`](Self::try_get) to handle it.
    pub fn get(&self) -> T {
        match self.inner.try_get() {
            Ok(value) => value,
            Err(err) => panic::panic_any(err),
        }
    }

    /// Get the value, reporting a cycle as an error.
    pub fn try_get(&self) -> Result<T> {
        self.inner.try_get()
    }

    /// Run the setter inside an action.
    ///
    /// Without a setter the write is diagnosed and ignored. Assigning the same
    /// computed from within its setter fails with
    /// [`Error::ComputedSetterCycle`].
    pub fn set(&self, value: T) -> Result<()> {
        self.inner.set(value)
    }

    /// Whether a cached value is held (the computed is active or kept alive).
    pub fn is_cached(&self) -> bool {
        self.inner.value.borrow().is_some()
    }

    /// The transaction in which the value was last recomputed.
    pub fn last_computed_in(&self) -> Option<u64> {
        let graph = self.inner.runtime.graph();
        graph
            .get(self.inner.id)
            .and_then(|node| node.last_action_computed_in)
    }

    /// Listen to value changes. The computed stays active while the listener
    /// is registered.
    pub fn observe(
        &self,
        listener: impl Fn(&ComputedChange<T>) + 'static,
        fire_immediately: bool,
    ) -> Disposer {
        let runtime = self.inner.runtime.clone();
        let computed = self.clone();
        let previous: RefCell<Option<T>> = RefCell::new(None);
        let first = Cell::new(true);

        let reaction = self.inner.runtime.autorun_named(
            format!("{}#observe", self.inner.name),
            move || {
                let new_value = computed.get();
                let old_value = previous.replace(Some(new_value.clone()));
                let is_first = first.replace(false);
                if is_first && !fire_immediately {
                    return;
                }
                let change = ComputedChange {
                    old_value,
                    new_value,
                };
                runtime.untracked(|| listener(&change));
            },
        );
        Disposer::new(move || reaction.dispose())
    }
}

impl<T> Computed<T> {
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn runtime(&self) -> &Runtime {
        &self.inner.runtime
    }

    pub(crate) fn id(&self) -> NodeId {
        self.inner.id
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("name", &self.inner.name)
            .field("cached", &self.inner.value.try_borrow().map_or(false, |v| v.is_some()))
            .finish()
    }
}

impl Runtime {
    /// Create a computed value.
    pub fn computed<T: Clone + PartialEq + 'static>(
        &self,
        getter: impl Fn() -> T + 'static,
    ) -> Computed<T> {
        Computed::new(self, getter, ComputedOptions::default())
    }

    /// Create a computed value with a name, comparer, setter or keep-alive.
    pub fn computed_with<T: Clone + PartialEq + 'static>(
        &self,
        getter: impl Fn() -> T + 'static,
        options: ComputedOptions<T>,
    ) -> Computed<T> {
        Computed::new(self, getter, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigOptions;
    use crate::reactive::runtime::panic_message;
    use tracing_test::traced_test;

    fn counted<T: Clone + PartialEq + 'static>(
        runtime: &Runtime,
        f: impl Fn() -> T + 'static,
    ) -> (Computed<T>, Rc<Cell<u32>>) {
        let count = Rc::new(Cell::new(0));
        let counter = count.clone();
        let computed = runtime.computed(move || {
            counter.set(counter.get() + 1);
            f()
        });
        (computed, count)
    }

    #[test]
    fn suspended_computed_recomputes_on_every_read() {
        let runtime = Runtime::new();
        let cell = runtime.observable_box(1);
        let source = cell.clone();
        let (doubled, count) = counted(&runtime, move || source.get() * 2);

        assert_eq!(doubled.get(), 2);
        assert_eq!(doubled.get(), 2);
        assert_eq!(count.get(), 2);
        assert!(!doubled.is_cached());
    }

    #[test]
    fn first_observer_computes_once_and_caches() {
        let runtime = Runtime::new();
        let cell = runtime.observable_box(1);
        let source = cell.clone();
        let (doubled, count) = counted(&runtime, move || source.get() * 2);

        let reader = doubled.clone();
        let reaction = runtime.autorun(move || {
            reader.get();
        });
        assert_eq!(count.get(), 1);

        assert_eq!(doubled.get(), 2);
        assert_eq!(count.get(), 1);

        runtime.run_in_action(|| cell.set(2));
        assert_eq!(count.get(), 2);
        assert_eq!(doubled.get(), 4);
        assert_eq!(count.get(), 2);

        reaction.dispose();
        assert!(!doubled.is_cached());
        assert!(runtime.graph().observers(cell.id()).is_empty());
    }

    #[test]
    fn at_most_once_per_transaction() {
        let runtime = Runtime::new();
        let cell = runtime.observable_box(1);
        let source = cell.clone();
        let (doubled, count) = counted(&runtime, move || source.get() * 2);

        runtime.run_in_action(|| {
            cell.set(5);
            assert_eq!(doubled.get(), 10);
            assert_eq!(doubled.get(), 10);
            assert_eq!(doubled.get(), 10);
            assert_eq!(doubled.last_computed_in(), runtime.current_transaction());
        });
        assert_eq!(count.get(), 1);

        // Suspended again once the batch ended.
        assert!(!doubled.is_cached());
    }

    #[test]
    fn pulled_mid_transaction_after_second_write() {
        let runtime = Runtime::new();
        let cell = runtime.observable_box(1);
        let source = cell.clone();
        let doubled = runtime.computed(move || source.get() * 2);
        let inner = doubled.clone();
        let plus_one = runtime.computed(move || inner.get() + 1);
        let reader = plus_one.clone();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let _reaction = runtime.autorun(move || sink.borrow_mut().push(reader.get()));

        runtime.run_in_action(|| {
            cell.set(2);
            assert_eq!(plus_one.get(), 5);
            cell.set(3);
            assert_eq!(plus_one.get(), 7);
        });

        assert_eq!(*seen.borrow(), vec![3, 7]);
    }

    #[test]
    fn unchanged_result_stops_propagation() {
        let runtime = Runtime::new();
        let cell = runtime.observable_box(1);
        let source = cell.clone();
        let parity = runtime.computed(move || source.get() % 2);
        let reader = parity.clone();
        let runs = Rc::new(Cell::new(0));
        let counter = runs.clone();
        let _reaction = runtime.autorun(move || {
            reader.get();
            counter.set(counter.get() + 1);
        });

        runtime.run_in_action(|| cell.set(3));
        assert_eq!(runs.get(), 1);

        runtime.run_in_action(|| cell.set(4));
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn self_reference_is_a_cycle() {
        let runtime = Runtime::new();
        let slot: Rc<RefCell<Option<Computed<bool>>>> = Rc::new(RefCell::new(None));
        let this = slot.clone();
        let computed = runtime.computed(move || {
            let this = this.borrow().clone();
            this.map_or(false, |c| matches!(c.try_get(), Err(Error::ComputedCycle { .. })))
        });
        *slot.borrow_mut() = Some(computed.clone());

        assert!(computed.get());
        slot.borrow_mut().take();
    }

    #[test]
    fn get_panics_on_a_cycle() {
        let runtime = Runtime::new();
        let slot: Rc<RefCell<Option<Computed<i32>>>> = Rc::new(RefCell::new(None));
        let this = slot.clone();
        let computed = runtime.computed(move || {
            let this = this.borrow().clone();
            this.map_or(0, |c| c.get() + 1)
        });
        *slot.borrow_mut() = Some(computed.clone());

        let payload = panic::catch_unwind(panic::AssertUnwindSafe(|| computed.get())).unwrap_err();
        assert!(panic_message(payload.as_ref()).contains("Cycle detected"));
        slot.borrow_mut().take();
    }

    #[test]
    fn setter_runs_in_an_action() {
        let runtime = Runtime::new();
        let cell = runtime.observable_box(1);
        let source = cell.clone();
        let target = cell.clone();
        let doubled = runtime.computed_with(
            move || source.get() * 2,
            ComputedOptions::new().setter(move |value: i32| target.set(value / 2)),
        );

        doubled.set(10).unwrap();
        assert_eq!(cell.get(), 5);
        assert_eq!(doubled.get(), 10);
    }

    #[test]
    #[traced_test]
    fn missing_setter_is_a_diagnosed_no_op() {
        let runtime = Runtime::new();
        let computed = runtime.computed(|| 1);

        assert!(computed.set(2).is_ok());
        assert_eq!(computed.get(), 1);
        assert!(logs_contain("not possible to assign a new value to a computed value"));
    }

    #[test]
    fn reentrant_setter_is_an_error() {
        let runtime = Runtime::new();
        let slot: Rc<RefCell<Option<Computed<i32>>>> = Rc::new(RefCell::new(None));
        let this = slot.clone();
        let computed = runtime.computed_with(
            || 0,
            ComputedOptions::new().setter(move |value: i32| {
                if let Some(c) = this.borrow().clone() {
                    let _ = c.set(value);
                }
            }),
        );
        *slot.borrow_mut() = Some(computed.clone());

        let err = computed.set(1).unwrap_err();
        assert_eq!(
            err,
            Error::ComputedSetterCycle {
                name: computed.name().to_string()
            }
        );
        slot.borrow_mut().take();
    }

    #[test]
    fn keep_alive_caches_without_observers() {
        let runtime = Runtime::new();
        let cell = runtime.observable_box(1);
        let source = cell.clone();
        let count = Rc::new(Cell::new(0));
        let counter = count.clone();
        let computed = runtime.computed_with(
            move || {
                counter.set(counter.get() + 1);
                source.get() + 1
            },
            ComputedOptions::new().keep_alive(true),
        );

        assert_eq!(computed.get(), 2);
        assert_eq!(computed.get(), 2);
        assert_eq!(count.get(), 1);

        cell.set(2);
        assert_eq!(computed.get(), 3);
        assert_eq!(count.get(), 2);
    }

    #[test]
    #[traced_test]
    fn untracked_reads_can_be_diagnosed() {
        let runtime = Runtime::with_config(ConfigOptions::new().computed_requires_reaction(true));
        let computed = runtime.computed(|| 1);

        computed.get();
        assert!(logs_contain("being read outside a reactive context"));
    }

    #[test]
    fn observe_reports_old_and_new() {
        let runtime = Runtime::new();
        let cell = runtime.observable_box(1);
        let source = cell.clone();
        let doubled = runtime.computed(move || source.get() * 2);
        let changes = Rc::new(RefCell::new(Vec::new()));

        let sink = changes.clone();
        let disposer = doubled.observe(move |change| sink.borrow_mut().push(change.clone()), true);
        runtime.run_in_action(|| cell.set(3));
        disposer.dispose();
        runtime.run_in_action(|| cell.set(4));

        assert_eq!(
            *changes.borrow(),
            vec![
                ComputedChange { old_value: None, new_value: 2 },
                ComputedChange { old_value: Some(2), new_value: 6 },
            ]
        );
    }
}
