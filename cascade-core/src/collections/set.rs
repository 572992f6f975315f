//! Observable set.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexSet;

use super::{enhance, CollectionOptions, MapKey};
use crate::reactive::{Atom, Disposer, Enhancer, Interceptors, Listeners, Runtime};

/// A change applied to a set.
#[derive(Debug, Clone, PartialEq)]
pub enum SetChange<T> {
    Add { new_value: T },
    Delete { old_value: T },
}

/// A pending change, passed to interceptors.
#[derive(Debug, Clone, PartialEq)]
pub enum SetWillChange<T> {
    Add { new_value: T },
    Delete { old_value: T },
}

struct SetInner<T> {
    atom: Atom,
    values: RefCell<IndexSet<T>>,
    enhancer: Option<Enhancer<T>>,
    listeners: Listeners<SetChange<T>>,
    interceptors: Interceptors<SetWillChange<T>>,
}

/// An observable, insertion-ordered set.
pub struct ObservableSet<T> {
    inner: Rc<SetInner<T>>,
}

impl<T> Clone for ObservableSet<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: MapKey> ObservableSet<T> {
    pub(crate) fn new(
        runtime: &Runtime,
        items: impl IntoIterator<Item = T>,
        options: CollectionOptions<T>,
    ) -> Self {
        let name = options
            .name
            .unwrap_or_else(|| runtime.next_name("ObservableSet"));
        let values = items
            .into_iter()
            .map(|item| enhance(&options.enhancer, runtime, item.normalize()))
            .collect();
        Self {
            inner: Rc::new(SetInner {
                atom: Atom::new(runtime, name),
                values: RefCell::new(values),
                enhancer: options.enhancer,
                listeners: Listeners::new(),
                interceptors: Interceptors::new(),
            }),
        }
    }

    fn observed(&self) -> std::cell::Ref<'_, IndexSet<T>> {
        self.inner.atom.report_observed();
        self.inner.values.borrow()
    }

    pub fn has(&self, value: &T) -> bool {
        let value = value.clone().normalize();
        self.observed().contains(&value)
    }

    pub fn len(&self) -> usize {
        self.observed().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over a copy of the contents.
    pub fn iter(&self) -> indexmap::set::IntoIter<T> {
        self.to_index_set().into_iter()
    }

    pub fn for_each(&self, mut f: impl FnMut(&T)) {
        for value in self.iter() {
            f(&value);
        }
    }

    /// Plain copy of the contents.
    pub fn to_index_set(&self) -> IndexSet<T> {
        self.observed().clone()
    }

    pub(crate) fn to_index_set_untracked(&self) -> IndexSet<T> {
        self.inner.values.borrow().clone()
    }

    pub fn to_string_tag(&self) -> &'static str {
        "Set"
    }

    /// Insert `value`. Returns whether it was absent.
    pub fn add(&self, value: T) -> bool {
        let inner = &self.inner;
        inner.atom.check_state_change();
        let value = value.normalize();
        if inner.values.borrow().contains(&value) {
            return false;
        }

        let value = if inner.interceptors.is_empty() {
            value
        } else {
            match inner.interceptors.intercept(SetWillChange::Add { new_value: value }) {
                Some(SetWillChange::Add { new_value }) => new_value.normalize(),
                _ => return false,
            }
        };
        let runtime = inner.atom.runtime();
        let value = enhance(&inner.enhancer, runtime, value);

        let _batch = runtime.batch_guard();
        if !inner.values.borrow_mut().insert(value.clone()) {
            return false;
        }
        inner.atom.report_changed();
        if !inner.listeners.is_empty() {
            inner.listeners.notify(&SetChange::Add { new_value: value });
        }
        true
    }

    /// Remove `value`. Returns whether it was present.
    pub fn delete(&self, value: &T) -> bool {
        let inner = &self.inner;
        inner.atom.check_state_change();
        let value = value.clone().normalize();
        if !inner.values.borrow().contains(&value) {
            return false;
        }

        let value = if inner.interceptors.is_empty() {
            value
        } else {
            match inner.interceptors.intercept(SetWillChange::Delete { old_value: value }) {
                Some(SetWillChange::Delete { old_value }) => old_value.normalize(),
                _ => return false,
            }
        };

        let _batch = inner.atom.runtime().batch_guard();
        let Some(old_value) = inner.values.borrow_mut().shift_take(&value) else {
            return false;
        };
        inner.atom.report_changed();
        if !inner.listeners.is_empty() {
            inner.listeners.notify(&SetChange::Delete { old_value });
        }
        true
    }

    pub fn clear(&self) {
        let runtime = self.inner.atom.runtime().clone();
        runtime.batch(|| {
            for value in self.to_index_set_untracked() {
                self.delete(&value);
            }
        });
    }

    /// Make the set equal to `items`.
    pub fn replace(&self, items: impl IntoIterator<Item = T>) {
        let runtime = self.inner.atom.runtime().clone();
        let _batch = runtime.batch_guard();
        self.clear();
        for item in items {
            self.add(item);
        }
    }

    pub fn union(&self, other: &IndexSet<T>) -> IndexSet<T> {
        let mut result = self.to_index_set();
        result.extend(other.iter().cloned().map(MapKey::normalize));
        result
    }

    pub fn intersection(&self, other: &IndexSet<T>) -> IndexSet<T> {
        self.to_index_set()
            .into_iter()
            .filter(|value| other.contains(value))
            .collect()
    }

    pub fn difference(&self, other: &IndexSet<T>) -> IndexSet<T> {
        self.to_index_set()
            .into_iter()
            .filter(|value| !other.contains(value))
            .collect()
    }

    pub fn symmetric_difference(&self, other: &IndexSet<T>) -> IndexSet<T> {
        let values = self.to_index_set();
        let mut result: IndexSet<T> = values
            .iter()
            .filter(|value| !other.contains(*value))
            .cloned()
            .collect();
        result.extend(other.iter().filter(|value| !values.contains(*value)).cloned());
        result
    }

    pub fn is_subset_of(&self, other: &IndexSet<T>) -> bool {
        self.observed().iter().all(|value| other.contains(value))
    }

    pub fn is_superset_of(&self, other: &IndexSet<T>) -> bool {
        let values = self.observed();
        other.iter().all(|value| values.contains(value))
    }

    pub fn is_disjoint_from(&self, other: &IndexSet<T>) -> bool {
        self.observed().iter().all(|value| !other.contains(value))
    }

    /// Listen to changes. With `fire_immediately` every current member is
    /// reported as added.
    pub fn observe(&self, listener: impl Fn(&SetChange<T>) + 'static, fire_immediately: bool) -> Disposer {
        if fire_immediately {
            for value in self.to_index_set_untracked() {
                listener(&SetChange::Add { new_value: value });
            }
        }
        self.inner.listeners.add(listener)
    }

    pub fn intercept(
        &self,
        interceptor: impl Fn(SetWillChange<T>) -> Option<SetWillChange<T>> + 'static,
    ) -> Disposer {
        self.inner.interceptors.add(interceptor)
    }
}

impl<T> ObservableSet<T> {
    pub fn name(&self) -> String {
        self.inner.atom.name()
    }

    pub fn runtime(&self) -> &Runtime {
        self.inner.atom.runtime()
    }

    pub(crate) fn id(&self) -> crate::graph::NodeId {
        self.inner.atom.id()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.inner) as *const u8 as usize
    }
}

impl<T: MapKey> PartialEq<IndexSet<T>> for ObservableSet<T> {
    fn eq(&self, other: &IndexSet<T>) -> bool {
        *self.inner.values.borrow() == *other
    }
}

impl<T: fmt::Debug> fmt::Debug for ObservableSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.values.try_borrow() {
            Ok(values) => f.debug_set().entries(values.iter()).finish(),
            Err(_) => f.write_str("{<borrowed>}"),
        }
    }
}

impl Runtime {
    pub fn observable_set<T: MapKey>(&self, items: impl IntoIterator<Item = T>) -> ObservableSet<T> {
        ObservableSet::new(self, items, CollectionOptions::default())
    }

    pub fn observable_set_with<T: MapKey>(
        &self,
        items: impl IntoIterator<Item = T>,
        options: CollectionOptions<T>,
    ) -> ObservableSet<T> {
        ObservableSet::new(self, items, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use std::cell::Cell;

    #[test]
    fn add_and_delete_report_membership_changes() {
        let runtime = Runtime::new();
        let set = runtime.observable_set([1, 2]);
        let runs = Rc::new(Cell::new(0));

        let (reader, counter) = (set.clone(), runs.clone());
        let _autorun = runtime.autorun(move || {
            reader.has(&3);
            counter.set(counter.get() + 1);
        });

        assert!(!runtime.run_in_action(|| set.add(2)));
        assert_eq!(runs.get(), 1);
        assert!(runtime.run_in_action(|| set.add(3)));
        assert!(runtime.run_in_action(|| set.delete(&1)));
        assert!(!runtime.run_in_action(|| set.delete(&1)));
        assert_eq!(runs.get(), 3);
        assert_eq!(set, IndexSet::from([2, 3]));
    }

    #[test]
    fn dynamic_members_use_same_value_zero() {
        let runtime = Runtime::new();
        let set = runtime.observable_set([Value::from(f64::NAN), Value::from(-0.0)]);

        assert_eq!(set.len(), 2);
        assert!(set.has(&Value::from(f64::NAN)));
        assert!(set.has(&Value::from(0.0)));
        assert!(!set.add(Value::from(0.0)));
    }

    #[test]
    fn algebra_returns_plain_sets() {
        let runtime = Runtime::new();
        let set = runtime.observable_set([1, 2, 3]);
        let other = IndexSet::from([2, 3, 4]);

        assert_eq!(set.union(&other), IndexSet::from([1, 2, 3, 4]));
        assert_eq!(set.intersection(&other), IndexSet::from([2, 3]));
        assert_eq!(set.difference(&other), IndexSet::from([1]));
        assert_eq!(set.symmetric_difference(&other), IndexSet::from([1, 4]));
        assert!(set.is_subset_of(&IndexSet::from([0, 1, 2, 3])));
        assert!(set.is_superset_of(&IndexSet::from([1, 3])));
        assert!(set.is_disjoint_from(&IndexSet::from([7])));
    }

    #[test]
    fn replace_and_observe() {
        let runtime = Runtime::new();
        let set = runtime.observable_set(["a", "b"]);
        let changes = Rc::new(RefCell::new(Vec::new()));

        let sink = changes.clone();
        let _listener = set.observe(move |change| sink.borrow_mut().push(change.clone()), false);
        set.replace(["c"]);

        assert_eq!(set.to_index_set(), IndexSet::from(["c"]));
        assert_eq!(
            *changes.borrow(),
            vec![
                SetChange::Delete { old_value: "a" },
                SetChange::Delete { old_value: "b" },
                SetChange::Add { new_value: "c" },
            ]
        );
        assert_eq!(set.to_string_tag(), "Set");
        assert_eq!(format!("{set:?}"), r#"{"c"}"#);
    }
}
