//! Observable array.
//!
//! The whole array is one atom: any read subscribes to every write. Index
//! arithmetic for `splice` and `slice` follows the native array rules, so
//! negative positions count from the end and out-of-range arguments clamp.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use super::{enhance, ArrayElement, CollectionOptions};
use crate::error::{Error, Result};
use crate::reactive::{Atom, Disposer, Enhancer, Interceptors, Listeners, Runtime};

/// A change applied to an array.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayChange<T> {
    Splice {
        index: usize,
        removed: Vec<T>,
        added: Vec<T>,
    },
    Update {
        index: usize,
        old_value: T,
        new_value: T,
    },
}

/// A pending change, passed to interceptors.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayWillChange<T> {
    Splice {
        index: usize,
        removed_count: usize,
        added: Vec<T>,
    },
    Update {
        index: usize,
        new_value: T,
    },
}

struct ArrayInner<T> {
    atom: Atom,
    values: RefCell<Vec<T>>,
    enhancer: Option<Enhancer<T>>,
    listeners: Listeners<ArrayChange<T>>,
    interceptors: Interceptors<ArrayWillChange<T>>,
}

/// An observable, growable array.
pub struct ObservableArray<T> {
    inner: Rc<ArrayInner<T>>,
}

impl<T> Clone for ObservableArray<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

/// Resolve a possibly negative position against `len`.
fn resolve_index(index: isize, len: usize) -> usize {
    if index < 0 {
        len.saturating_sub(index.unsigned_abs())
    } else {
        (index as usize).min(len)
    }
}

impl<T: ArrayElement> ObservableArray<T> {
    pub(crate) fn new(runtime: &Runtime, items: Vec<T>, options: CollectionOptions<T>) -> Self {
        let name = options
            .name
            .unwrap_or_else(|| runtime.next_name("ObservableArray"));
        let items = items
            .into_iter()
            .map(|item| enhance(&options.enhancer, runtime, item))
            .collect();
        Self {
            inner: Rc::new(ArrayInner {
                atom: Atom::new(runtime, name),
                values: RefCell::new(items),
                enhancer: options.enhancer,
                listeners: Listeners::new(),
                interceptors: Interceptors::new(),
            }),
        }
    }

    fn observed(&self) -> std::cell::Ref<'_, Vec<T>> {
        self.inner.atom.report_observed();
        self.inner.values.borrow()
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn len(&self) -> usize {
        self.observed().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The element at `index`, or `None` when out of bounds.
    pub fn get(&self, index: usize) -> Option<T> {
        self.observed().get(index).cloned()
    }

    /// Copy of `start..end`, with native index rules.
    pub fn slice(&self, start: isize, end: Option<isize>) -> Vec<T> {
        let values = self.observed();
        let len = values.len();
        let start = resolve_index(start, len);
        let end = end.map_or(len, |end| resolve_index(end, len));
        if start >= end {
            return Vec::new();
        }
        values[start..end].to_vec()
    }

    pub fn concat(&self, other: &[T]) -> Vec<T> {
        let mut items = self.to_vec();
        items.extend_from_slice(other);
        items
    }

    pub fn map<R>(&self, f: impl FnMut(&T) -> R) -> Vec<R> {
        self.to_vec().iter().map(f).collect()
    }

    pub fn filter(&self, mut f: impl FnMut(&T) -> bool) -> Vec<T> {
        self.to_vec().into_iter().filter(|item| f(item)).collect()
    }

    pub fn find(&self, mut f: impl FnMut(&T) -> bool) -> Option<T> {
        self.to_vec().into_iter().find(|item| f(item))
    }

    /// First index holding `value` under strict equality, so `NaN` is
    /// never found and `-0` finds `0`.
    pub fn index_of(&self, value: &T) -> Option<usize> {
        self.observed().iter().position(|item| item.strict_eq(value))
    }

    /// Membership under same-value-zero: unlike `index_of`, `NaN` is found.
    pub fn includes(&self, value: &T) -> bool {
        self.observed().iter().any(|item| item.same_value_zero(value))
    }

    /// Plain copy of the contents.
    pub fn to_vec(&self) -> Vec<T> {
        self.observed().clone()
    }

    /// Iterate over a copy of the contents.
    pub fn iter(&self) -> std::vec::IntoIter<T> {
        self.to_vec().into_iter()
    }

    pub(crate) fn to_vec_untracked(&self) -> Vec<T> {
        self.inner.values.borrow().clone()
    }

    pub fn to_reversed(&self) -> Vec<T> {
        let mut items = self.to_vec();
        items.reverse();
        items
    }

    pub fn to_sorted_by(&self, compare: impl FnMut(&T, &T) -> Ordering) -> Vec<T> {
        let mut items = self.to_vec();
        items.sort_by(compare);
        items
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Remove `delete_count` elements at `start` and insert `items` there.
    /// `None` deletes through the end. Returns the removed elements.
    pub fn splice(&self, start: isize, delete_count: Option<isize>, items: Vec<T>) -> Vec<T> {
        let len = self.inner.values.borrow().len();
        let start = resolve_index(start, len);
        let delete_count = match delete_count {
            None => len - start,
            Some(count) => (count.max(0) as usize).min(len - start),
        };
        self.splice_at(start, delete_count, items)
    }

    fn splice_at(&self, index: usize, delete_count: usize, items: Vec<T>) -> Vec<T> {
        let inner = &self.inner;
        inner.atom.check_state_change();

        let (index, delete_count, items) = if inner.interceptors.is_empty() {
            (index, delete_count, items)
        } else {
            let change = ArrayWillChange::Splice {
                index,
                removed_count: delete_count,
                added: items,
            };
            match inner.interceptors.intercept(change) {
                Some(ArrayWillChange::Splice {
                    index,
                    removed_count,
                    added,
                }) => {
                    let len = inner.values.borrow().len();
                    let index = index.min(len);
                    (index, removed_count.min(len - index), added)
                }
                _ => return Vec::new(),
            }
        };
        if delete_count == 0 && items.is_empty() {
            return Vec::new();
        }

        let runtime = self.runtime();
        let added: Vec<T> = items
            .into_iter()
            .map(|item| enhance(&inner.enhancer, runtime, item))
            .collect();

        let _batch = runtime.batch_guard();
        let removed: Vec<T> = inner
            .values
            .borrow_mut()
            .splice(index..index + delete_count, added.iter().cloned())
            .collect();
        inner.atom.report_changed();

        if !inner.listeners.is_empty() {
            inner.listeners.notify(&ArrayChange::Splice {
                index,
                removed: removed.clone(),
                added,
            });
        }
        removed
    }

    /// Overwrite an existing element. Returns the old value if it changed.
    fn update_at(&self, index: usize, value: T) -> Option<T> {
        let inner = &self.inner;
        inner.atom.check_state_change();

        let value = if inner.interceptors.is_empty() {
            value
        } else {
            match inner.interceptors.intercept(ArrayWillChange::Update {
                index,
                new_value: value,
            }) {
                Some(ArrayWillChange::Update { new_value, .. }) => new_value,
                _ => return None,
            }
        };
        let runtime = self.runtime();
        let value = enhance(&inner.enhancer, runtime, value);

        let old = {
            let mut values = inner.values.borrow_mut();
            let slot = values.get_mut(index)?;
            if *slot == value {
                return None;
            }
            std::mem::replace(slot, value.clone())
        };

        let _batch = runtime.batch_guard();
        inner.atom.report_changed();
        if !inner.listeners.is_empty() {
            inner.listeners.notify(&ArrayChange::Update {
                index,
                old_value: old.clone(),
                new_value: value,
            });
        }
        Some(old)
    }

    /// Append an element. Returns the new length.
    pub fn push(&self, value: T) -> usize {
        self.push_all(vec![value])
    }

    pub fn push_all(&self, items: Vec<T>) -> usize {
        let len = self.inner.values.borrow().len();
        self.splice_at(len, 0, items);
        self.inner.values.borrow().len()
    }

    pub fn pop(&self) -> Option<T> {
        let len = self.inner.values.borrow().len();
        if len == 0 {
            return None;
        }
        self.splice_at(len - 1, 1, Vec::new()).pop()
    }

    pub fn shift(&self) -> Option<T> {
        if self.inner.values.borrow().is_empty() {
            return None;
        }
        self.splice_at(0, 1, Vec::new()).pop()
    }

    /// Prepend elements. Returns the new length.
    pub fn unshift(&self, items: Vec<T>) -> usize {
        self.splice_at(0, 0, items);
        self.inner.values.borrow().len()
    }

    pub fn clear(&self) -> Vec<T> {
        let len = self.inner.values.borrow().len();
        self.splice_at(0, len, Vec::new())
    }

    /// Remove the first element equal to `value`, compared like `index_of`.
    pub fn remove(&self, value: &T) -> bool {
        let index = self
            .inner
            .values
            .borrow()
            .iter()
            .position(|item| item.strict_eq(value));
        match index {
            Some(index) => {
                self.splice_at(index, 1, Vec::new());
                true
            }
            None => false,
        }
    }

    /// Replace the contents with `items`, writing only the indices that
    /// differ and then truncating or extending the tail. Returns the
    /// overwritten and removed elements.
    pub fn replace(&self, items: Vec<T>) -> Vec<T> {
        let runtime = self.runtime().clone();
        let _batch = runtime.batch_guard();

        let len = self.inner.values.borrow().len();
        let shared = len.min(items.len());
        let mut items = items.into_iter();
        let mut replaced = Vec::new();

        for index in 0..shared {
            let Some(item) = items.next() else { break };
            if let Some(old) = self.update_at(index, item) {
                replaced.push(old);
            }
        }
        let tail: Vec<T> = items.collect();
        replaced.extend(self.splice_at(shared, len - shared, tail));
        replaced
    }

    fn check_in_place(&self, method: &'static str, alternative: &'static str) -> Result<()> {
        if self.runtime().is_tracking() {
            return Err(Error::MutationInDerivation {
                collection: "ObservableArray",
                method,
                alternative,
            });
        }
        Ok(())
    }

    /// Sort in place. Fails when called from a derivation.
    pub fn sort_by(&self, compare: impl FnMut(&T, &T) -> Ordering) -> Result<()> {
        self.check_in_place("sort", "to_sorted")?;
        let mut items = self.to_vec_untracked();
        items.sort_by(compare);
        self.replace(items);
        Ok(())
    }

    /// Reverse in place. Fails when called from a derivation.
    pub fn reverse(&self) -> Result<()> {
        self.check_in_place("reverse", "to_reversed")?;
        let mut items = self.to_vec_untracked();
        items.reverse();
        self.replace(items);
        Ok(())
    }

    /// Listen to changes. With `fire_immediately` the listener first receives
    /// the current contents as one splice.
    pub fn observe(
        &self,
        listener: impl Fn(&ArrayChange<T>) + 'static,
        fire_immediately: bool,
    ) -> Disposer {
        if fire_immediately {
            listener(&ArrayChange::Splice {
                index: 0,
                removed: Vec::new(),
                added: self.to_vec_untracked(),
            });
        }
        self.inner.listeners.add(listener)
    }

    /// Intercept changes before they are applied. Returning `None` cancels
    /// the change.
    pub fn intercept(
        &self,
        interceptor: impl Fn(ArrayWillChange<T>) -> Option<ArrayWillChange<T>> + 'static,
    ) -> Disposer {
        self.inner.interceptors.add(interceptor)
    }
}

impl<T: ArrayElement + Ord> ObservableArray<T> {
    pub fn sort(&self) -> Result<()> {
        self.sort_by(Ord::cmp)
    }

    pub fn to_sorted(&self) -> Vec<T> {
        self.to_sorted_by(Ord::cmp)
    }
}

impl<T: ArrayElement + Default> ObservableArray<T> {
    /// Write `value` at `index`. Writing past the end grows the array and
    /// fills the gap with `T::default()`.
    pub fn set(&self, index: usize, value: T) {
        let len = self.inner.values.borrow().len();
        if index < len {
            self.update_at(index, value);
        } else {
            let mut items = vec![T::default(); index - len];
            items.push(value);
            self.splice_at(len, 0, items);
        }
    }

    /// Truncate, or grow with `T::default()`.
    pub fn set_length(&self, new_len: usize) {
        let len = self.inner.values.borrow().len();
        if new_len < len {
            self.splice_at(new_len, len - new_len, Vec::new());
        } else if new_len > len {
            self.splice_at(len, 0, vec![T::default(); new_len - len]);
        }
    }
}

impl<T> ObservableArray<T> {
    pub fn name(&self) -> String {
        self.inner.atom.name()
    }

    pub(crate) fn id(&self) -> crate::graph::NodeId {
        self.inner.atom.id()
    }

    pub fn runtime(&self) -> &Runtime {
        self.inner.atom.runtime()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.inner) as *const u8 as usize
    }
}

impl<T: fmt::Debug> fmt::Debug for ObservableArray<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.values.try_borrow() {
            Ok(values) => f.debug_list().entries(values.iter()).finish(),
            Err(_) => f.write_str("[<borrowed>]"),
        }
    }
}

impl Runtime {
    pub fn observable_array<T: ArrayElement>(&self, items: Vec<T>) -> ObservableArray<T> {
        ObservableArray::new(self, items, CollectionOptions::default())
    }

    pub fn observable_array_with<T: ArrayElement>(
        &self,
        items: Vec<T>,
        options: CollectionOptions<T>,
    ) -> ObservableArray<T> {
        ObservableArray::new(self, items, options)
    }
}
