//! Observable Cell
//!
//! An `ObservableValue` is a container for one mutable value. Reading it
//! inside a tracked run registers the running derivation as an observer;
//! writing a different value notifies every observer.
//!
//! # Write Pipeline
//!
//! 1. Interceptors may rewrite or cancel the incoming value.
//! 2. The enhancer (if any) transforms it, e.g. making nested plain
//!    containers observable.
//! 3. The comparer decides whether the value changed. Equal values stop here.
//! 4. Inside an implicit batch the value is stored, observers receive
//!    `Change`, and `observe` listeners are called.

use std::cell::{Ref, RefCell};
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use super::comparer::Comparer;
use super::listeners::{Disposer, Interceptors, Listeners};
use super::runtime::Runtime;
use crate::graph::{Node, NodeId};

/// Transforms values before they are stored.
pub type Enhancer<T> = Rc<dyn Fn(&Runtime, T) -> T>;

/// A change applied to a cell, passed to `observe` listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueChange<T> {
    /// `None` for the immediate call made by `observe(.., true)`.
    pub old_value: Option<T>,
    pub new_value: T,
}

/// A pending change, passed to interceptors.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueWillChange<T> {
    pub new_value: T,
}

/// Options for [`Runtime::observable_box_with`].
pub struct ObservableOptions<T> {
    pub name: Option<String>,
    pub equals: Comparer<T>,
    pub enhancer: Option<Enhancer<T>>,
}

impl<T> Default for ObservableOptions<T> {
    fn default() -> Self {
        Self {
            name: None,
            equals: Comparer::Default,
            enhancer: None,
        }
    }
}

impl<T> ObservableOptions<T> {
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

    pub fn enhancer(mut self, enhancer: impl Fn(&Runtime, T) -> T + 'static) -> Self {
        self.enhancer = Some(Rc::new(enhancer));
        self
    }
}

/// Owns one node of the graph and removes it when dropped.
///
/// Collections use atoms directly: they keep their data themselves and only
/// need the observe/notify half of a cell.
pub(crate) struct Atom {
    runtime: Runtime,
    id: NodeId,
}

impl Atom {
    pub fn new(runtime: &Runtime, name: impl Into<String>) -> Self {
        let id = runtime.graph_mut().add_node(Node::observable(name));
        Self {
            runtime: runtime.clone(),
            id,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn report_observed(&self) -> bool {
        self.runtime.report_observed(self.id)
    }

    pub fn report_changed(&self) {
        self.runtime.report_changed(self.id);
    }

    pub fn check_state_change(&self) {
        self.runtime.check_state_change(self.id);
    }

    pub fn name(&self) -> String {
        self.runtime.graph().name(self.id)
    }
}

impl Drop for Atom {
    fn drop(&mut self) {
        let removed = match self.runtime.try_graph_mut() {
            Some(mut graph) => {
                let (node, lost) = graph.remove_node(self.id);
                for id in lost {
                    graph.queue_unobservation(id);
                }
                node
            }
            None => {
                trace!("graph busy, node leaked");
                None
            }
        };
        drop(removed);
    }
}

struct CellInner<T> {
    atom: Atom,
    value: RefCell<T>,
    comparer: Comparer<T>,
    enhancer: Option<Enhancer<T>>,
    listeners: Listeners<ValueChange<T>>,
    interceptors: Interceptors<ValueWillChange<T>>,
}

/// An atomic observable value holder.
///
/// # Example
///
/// ```rust
/// use cascade_core::Runtime;
///
/// let runtime = Runtime::new();
/// let count = runtime.observable_box(0);
/// count.set(5);
/// assert_eq!(count.get(), 5);
/// ```
pub struct ObservableValue<T> {
    inner: Rc<CellInner<T>>,
}

impl<T> Clone for ObservableValue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + PartialEq + 'static> ObservableValue<T> {
    pub(crate) fn new(runtime: &Runtime, value: T, options: ObservableOptions<T>) -> Self {
        let name = options
            .name
            .unwrap_or_else(|| runtime.next_name("ObservableValue"));
        let value = match &options.enhancer {
            Some(enhancer) => enhancer(runtime, value),
            None => value,
        };
        Self {
            inner: Rc::new(CellInner {
                atom: Atom::new(runtime, name),
                value: RefCell::new(value),
                comparer: options.equals,
                enhancer: options.enhancer,
                listeners: Listeners::new(),
                interceptors: Interceptors::new(),
            }),
        }
    }

    /// Get the current value, registering the running derivation.
    pub fn get(&self) -> T {
        self.inner.atom.report_observed();
        self.inner.value.borrow().clone()
    }

    /// Get the current value without tracking.
    pub fn get_untracked(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Borrow the current value, registering the running derivation.
    ///
    /// The cell must not be written while the borrow is alive.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.inner.atom.report_observed();
        f(&self.inner.value.borrow())
    }

    pub(crate) fn borrow_untracked(&self) -> Ref<'_, T> {
        self.inner.value.borrow()
    }

    /// Set a new value.
    pub fn set(&self, value: T) {
        self.replace(value);
    }

    /// Update the value with a function of the current one.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = f(&self.inner.value.borrow());
        self.set(next);
    }

    /// Write `value` and return the previous value if it changed.
    pub(crate) fn replace(&self, value: T) -> Option<T> {
        self.inner.atom.check_state_change();
        self.write(value)
    }

    /// `replace` without the state change diagnostic. Collections run it
    /// once against their own atom instead.
    pub(crate) fn write(&self, value: T) -> Option<T> {
        let inner = &self.inner;
        let runtime = inner.atom.runtime();

        let value = if inner.interceptors.is_empty() {
            value
        } else {
            match inner.interceptors.intercept(ValueWillChange { new_value: value }) {
                Some(change) => change.new_value,
                None => return None,
            }
        };
        let value = match &inner.enhancer {
            Some(enhancer) => enhancer(runtime, value),
            None => value,
        };

        let unchanged = {
            let current = inner.value.borrow();
            inner.comparer.equals(runtime, &current, &value)
        };
        if unchanged {
            return None;
        }

        let _batch = runtime.batch_guard();
        let old = inner.value.replace(value);
        inner.atom.report_changed();
        if !inner.listeners.is_empty() {
            let change = ValueChange {
                old_value: Some(old.clone()),
                new_value: inner.value.borrow().clone(),
            };
            inner.listeners.notify(&change);
        }
        Some(old)
    }

    /// Listen to changes. With `fire_immediately` the listener is called
    /// right away with the current value.
    pub fn observe(
        &self,
        listener: impl Fn(&ValueChange<T>) + 'static,
        fire_immediately: bool,
    ) -> Disposer {
        if fire_immediately {
            listener(&ValueChange {
                old_value: None,
                new_value: self.get_untracked(),
            });
        }
        self.inner.listeners.add(listener)
    }

    /// Intercept writes before they are applied. Returning `None` cancels the
    /// write.
    pub fn intercept(
        &self,
        interceptor: impl Fn(ValueWillChange<T>) -> Option<ValueWillChange<T>> + 'static,
    ) -> Disposer {
        self.inner.interceptors.add(interceptor)
    }
}

impl<T> ObservableValue<T> {
    pub fn name(&self) -> String {
        self.inner.atom.name()
    }

    pub fn runtime(&self) -> &Runtime {
        self.inner.atom.runtime()
    }

    pub(crate) fn id(&self) -> NodeId {
        self.inner.atom.id()
    }

    /// Whether both handles refer to the same cell.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: fmt::Debug> fmt::Debug for ObservableValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.value.try_borrow() {
            Ok(value) => f
                .debug_tuple("ObservableValue")
                .field(&*value)
                .finish(),
            Err(_) => f.write_str("ObservableValue(<borrowed>)"),
        }
    }
}

impl Runtime {
    /// Create an observable cell.
    pub fn observable_box<T: Clone + PartialEq + 'static>(&self, value: T) -> ObservableValue<T> {
        ObservableValue::new(self, value, ObservableOptions::default())
    }

    /// Create an observable cell with a name, comparer or enhancer.
    pub fn observable_box_with<T: Clone + PartialEq + 'static>(
        &self,
        value: T,
        options: ObservableOptions<T>,
    ) -> ObservableValue<T> {
        ObservableValue::new(self, value, options)
    }
}
