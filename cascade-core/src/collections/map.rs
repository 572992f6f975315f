//! Observable map.
//!
//! Each key has its own cell, so `get(key)` only subscribes to that key.
//! Everything that depends on which keys exist (`has`, `len`, iteration,
//! reads of absent keys) subscribes to a separate keys atom.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use super::{enhance, CollectionOptions, MapKey};
use crate::reactive::{
    Atom, Disposer, Enhancer, Interceptors, Listeners, ObservableOptions, ObservableValue, Runtime,
};

/// A change applied to a map.
#[derive(Debug, Clone, PartialEq)]
pub enum MapChange<K, V> {
    Add { key: K, new_value: V },
    Update { key: K, old_value: V, new_value: V },
    Delete { key: K, old_value: V },
}

/// A pending change, passed to interceptors.
#[derive(Debug, Clone, PartialEq)]
pub enum MapWillChange<K, V> {
    Add { key: K, new_value: V },
    Update { key: K, new_value: V },
    Delete { key: K },
}

type Slot<V> = ObservableValue<Option<V>>;

struct MapInner<K, V> {
    runtime: Runtime,
    name: String,
    data: RefCell<IndexMap<K, Slot<V>>>,
    keys_atom: Atom,
    enhancer: Option<Enhancer<V>>,
    listeners: Listeners<MapChange<K, V>>,
    interceptors: Interceptors<MapWillChange<K, V>>,
}

/// An observable, insertion-ordered map.
pub struct ObservableMap<K, V> {
    inner: Rc<MapInner<K, V>>,
}

impl<K, V> Clone for ObservableMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<K: MapKey, V: Clone + PartialEq + 'static> ObservableMap<K, V> {
    pub(crate) fn new(
        runtime: &Runtime,
        entries: impl IntoIterator<Item = (K, V)>,
        options: CollectionOptions<V>,
    ) -> Self {
        let name = options
            .name
            .unwrap_or_else(|| runtime.next_name("ObservableMap"));
        let map = Self {
            inner: Rc::new(MapInner {
                runtime: runtime.clone(),
                keys_atom: Atom::new(runtime, format!("{name}.keys()")),
                name,
                data: RefCell::new(IndexMap::new()),
                enhancer: options.enhancer,
                listeners: Listeners::new(),
                interceptors: Interceptors::new(),
            }),
        };
        for (key, value) in entries {
            let key = key.normalize();
            let value = enhance(&map.inner.enhancer, runtime, value);
            let slot = map.new_slot(&key, value);
            map.inner.data.borrow_mut().insert(key, slot);
        }
        map
    }

    fn new_slot(&self, key: &K, value: V) -> Slot<V> {
        let options = ObservableOptions::new().name(format!("{}.{:?}", self.inner.name, key));
        ObservableValue::new(&self.inner.runtime, Some(value), options)
    }

    fn slot(&self, key: &K) -> Option<Slot<V>> {
        self.inner.data.borrow().get(key).cloned()
    }

    fn keys_untracked(&self) -> Vec<K> {
        self.inner.data.borrow().keys().cloned().collect()
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// The value stored under `key`. Subscribes to that key only.
    pub fn get(&self, key: &K) -> Option<V> {
        let key = key.clone().normalize();
        match self.slot(&key) {
            Some(slot) => slot.get(),
            None => {
                self.inner.keys_atom.report_observed();
                None
            }
        }
    }

    pub fn has(&self, key: &K) -> bool {
        let key = key.clone().normalize();
        self.inner.keys_atom.report_observed();
        self.inner.data.borrow().contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.inner.keys_atom.report_observed();
        self.inner.data.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<K> {
        self.inner.keys_atom.report_observed();
        self.keys_untracked()
    }

    pub fn values(&self) -> Vec<V> {
        self.entries().into_iter().map(|(_, value)| value).collect()
    }

    pub fn entries(&self) -> Vec<(K, V)> {
        self.inner.keys_atom.report_observed();
        let slots: Vec<(K, Slot<V>)> = self
            .inner
            .data
            .borrow()
            .iter()
            .map(|(key, slot)| (key.clone(), slot.clone()))
            .collect();
        slots
            .into_iter()
            .filter_map(|(key, slot)| slot.get().map(|value| (key, value)))
            .collect()
    }

    pub fn for_each(&self, mut f: impl FnMut(&V, &K)) {
        for (key, value) in self.entries() {
            f(&value, &key);
        }
    }

    /// Plain copy of the contents.
    pub fn to_index_map(&self) -> IndexMap<K, V> {
        self.entries().into_iter().collect()
    }

    pub(crate) fn entries_untracked(&self) -> Vec<(K, V)> {
        self.inner
            .data
            .borrow()
            .iter()
            .filter_map(|(key, slot)| slot.get_untracked().map(|value| (key.clone(), value)))
            .collect()
    }

    pub fn to_string_tag(&self) -> &'static str {
        "Map"
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    pub fn set(&self, key: K, value: V) {
        let inner = &self.inner;
        inner.keys_atom.check_state_change();
        let key = key.normalize();

        let (key, value) = if inner.interceptors.is_empty() {
            (key, value)
        } else {
            let change = if inner.data.borrow().contains_key(&key) {
                MapWillChange::Update { key, new_value: value }
            } else {
                MapWillChange::Add { key, new_value: value }
            };
            match inner.interceptors.intercept(change) {
                Some(MapWillChange::Update { key, new_value })
                | Some(MapWillChange::Add { key, new_value }) => (key.normalize(), new_value),
                _ => return,
            }
        };
        let runtime = &inner.runtime;
        let value = enhance(&inner.enhancer, runtime, value);

        let _batch = runtime.batch_guard();
        match self.slot(&key) {
            Some(slot) => {
                if let Some(Some(old_value)) = slot.write(Some(value.clone())) {
                    if !inner.listeners.is_empty() {
                        inner.listeners.notify(&MapChange::Update {
                            key,
                            old_value,
                            new_value: value,
                        });
                    }
                }
            }
            None => {
                let slot = self.new_slot(&key, value.clone());
                inner.data.borrow_mut().insert(key.clone(), slot);
                inner.keys_atom.report_changed();
                if !inner.listeners.is_empty() {
                    inner.listeners.notify(&MapChange::Add {
                        key,
                        new_value: value,
                    });
                }
            }
        }
    }

    /// Remove `key`. Returns whether it was present.
    pub fn delete(&self, key: &K) -> bool {
        let inner = &self.inner;
        inner.keys_atom.check_state_change();
        let key = key.clone().normalize();

        let key = if inner.interceptors.is_empty() {
            key
        } else {
            match inner.interceptors.intercept(MapWillChange::Delete { key }) {
                Some(MapWillChange::Delete { key }) => key.normalize(),
                _ => return false,
            }
        };
        let Some(slot) = self.slot(&key) else {
            return false;
        };

        let _batch = inner.runtime.batch_guard();
        let old = slot.write(None);
        let removed = inner.data.borrow_mut().shift_remove(&key);
        drop(removed);
        inner.keys_atom.report_changed();
        if let (Some(Some(old_value)), false) = (old, inner.listeners.is_empty()) {
            inner.listeners.notify(&MapChange::Delete { key, old_value });
        }
        true
    }

    /// Delete every key. The key enumeration is not tracked, so a reaction
    /// clearing the map does not subscribe to it.
    pub fn clear(&self) {
        let runtime = self.inner.runtime.clone();
        runtime.batch(|| {
            runtime.untracked(|| {
                for key in self.keys_untracked() {
                    self.delete(&key);
                }
            })
        });
    }

    /// Set every entry of `entries`.
    pub fn merge(&self, entries: impl IntoIterator<Item = (K, V)>) {
        let _batch = self.inner.runtime.batch_guard();
        for (key, value) in entries {
            self.set(key, value);
        }
    }

    /// Make the map equal to `entries`, in that order. Cells of keys that
    /// survive are reused.
    pub fn replace(&self, entries: impl IntoIterator<Item = (K, V)>) {
        let inner = &self.inner;
        let _batch = inner.runtime.batch_guard();
        let entries: IndexMap<K, V> = entries
            .into_iter()
            .map(|(key, value)| (key.normalize(), value))
            .collect();

        let stale: Vec<K> = self
            .keys_untracked()
            .into_iter()
            .filter(|key| !entries.contains_key(key))
            .collect();
        for key in stale {
            self.delete(&key);
        }
        for (key, value) in &entries {
            self.set(key.clone(), value.clone());
        }

        let reordered = {
            let mut data = inner.data.borrow_mut();
            if data.keys().eq(entries.keys()) {
                false
            } else {
                let mut previous = std::mem::take(&mut *data);
                for key in entries.keys() {
                    if let Some(slot) = previous.shift_remove(key) {
                        data.insert(key.clone(), slot);
                    }
                }
                data.extend(previous);
                true
            }
        };
        if reordered {
            inner.keys_atom.report_changed();
        }
    }

    pub fn observe(&self, listener: impl Fn(&MapChange<K, V>) + 'static) -> Disposer {
        self.inner.listeners.add(listener)
    }

    /// Intercept changes before they are applied. Returning `None` cancels
    /// the change.
    pub fn intercept(
        &self,
        interceptor: impl Fn(MapWillChange<K, V>) -> Option<MapWillChange<K, V>> + 'static,
    ) -> Disposer {
        self.inner.interceptors.add(interceptor)
    }
}

impl<K, V> ObservableMap<K, V> {
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn runtime(&self) -> &Runtime {
        &self.inner.runtime
    }

    pub(crate) fn id(&self) -> crate::graph::NodeId {
        self.inner.keys_atom.id()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.inner) as *const u8 as usize
    }
}

impl<K: MapKey, V: Clone + PartialEq + 'static> PartialEq<IndexMap<K, V>> for ObservableMap<K, V> {
    fn eq(&self, other: &IndexMap<K, V>) -> bool {
        let entries = self.entries_untracked();
        entries.len() == other.len()
            && entries
                .iter()
                .all(|(key, value)| other.get(key) == Some(value))
    }
}

impl<K: MapKey, V: Clone + PartialEq + fmt::Debug + 'static> fmt::Debug for ObservableMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.data.try_borrow() {
            Ok(_) => {}
            Err(_) => return f.write_str("{<borrowed>}"),
        }
        f.debug_map().entries(self.entries_untracked()).finish()
    }
}

impl Runtime {
    pub fn observable_map<K: MapKey, V: Clone + PartialEq + 'static>(
        &self,
        entries: impl IntoIterator<Item = (K, V)>,
    ) -> ObservableMap<K, V> {
        ObservableMap::new(self, entries, CollectionOptions::default())
    }

    pub fn observable_map_with<K: MapKey, V: Clone + PartialEq + 'static>(
        &self,
        entries: impl IntoIterator<Item = (K, V)>,
        options: CollectionOptions<V>,
    ) -> ObservableMap<K, V> {
        ObservableMap::new(self, entries, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn counting_autorun<K: MapKey, V: Clone + PartialEq + 'static>(
        runtime: &Runtime,
        map: &ObservableMap<K, V>,
        read: impl Fn(&ObservableMap<K, V>) + 'static,
    ) -> (crate::reactive::Reaction, Rc<Cell<u32>>) {
        let runs = Rc::new(Cell::new(0));
        let counter = runs.clone();
        let map = map.clone();
        let autorun = runtime.autorun(move || {
            read(&map);
            counter.set(counter.get() + 1);
        });
        (autorun, runs)
    }

    #[test]
    fn get_subscribes_to_one_key() {
        let runtime = Runtime::new();
        let map = runtime.observable_map([("a", 1), ("b", 2)]);
        let (_autorun, runs) = counting_autorun(&runtime, &map, |map| {
            map.get(&"a");
        });

        runtime.run_in_action(|| map.set("b", 20));
        runtime.run_in_action(|| map.set("c", 3));
        assert_eq!(runs.get(), 1);

        runtime.run_in_action(|| map.set("a", 10));
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn reading_an_absent_key_waits_for_it() {
        let runtime = Runtime::new();
        let map = runtime.observable_map::<&str, i32>([]);
        let seen = Rc::new(RefCell::new(Vec::new()));

        let reader = map.clone();
        let sink = seen.clone();
        let _autorun = runtime.autorun(move || sink.borrow_mut().push(reader.get(&"x")));

        runtime.run_in_action(|| map.set("x", 1));
        runtime.run_in_action(|| {
            map.delete(&"x");
        });

        assert_eq!(*seen.borrow(), vec![None, Some(1), None]);
    }

    #[test]
    fn iteration_tracks_keys_and_values() {
        let runtime = Runtime::new();
        let map = runtime.observable_map([("a", 1)]);
        let (_autorun, runs) = counting_autorun(&runtime, &map, |map| {
            map.values();
        });

        runtime.run_in_action(|| map.set("a", 2));
        runtime.run_in_action(|| map.set("b", 1));
        assert_eq!(runs.get(), 3);
    }

    #[test]
    fn clear_inside_a_reaction_does_not_subscribe() {
        let runtime = Runtime::new();
        let map = runtime.observable_map([(1, "one")]);
        let trigger = runtime.observable_box(0);

        let (clearer, watcher) = (map.clone(), trigger.clone());
        let runs = Rc::new(Cell::new(0));
        let counter = runs.clone();
        let _autorun = runtime.autorun(move || {
            watcher.get();
            clearer.clear();
            counter.set(counter.get() + 1);
        });

        runtime.run_in_action(|| map.set(2, "two"));
        assert_eq!(runs.get(), 1);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn merge_and_replace() {
        let runtime = Runtime::new();
        let map = runtime.observable_map([("a", 1), ("b", 2)]);

        map.merge([("b", 20), ("c", 30)]);
        assert_eq!(map.entries(), vec![("a", 1), ("b", 20), ("c", 30)]);

        map.replace([("c", 3), ("a", 1)]);
        assert_eq!(map.keys(), vec!["c", "a"]);
        assert_eq!(map, IndexMap::from([("a", 1), ("c", 3)]));
    }

    #[test]
    fn replace_keeps_cells_of_surviving_keys() {
        let runtime = Runtime::new();
        let map = runtime.observable_map([("a", 1), ("b", 2)]);
        let (_autorun, runs) = counting_autorun(&runtime, &map, |map| {
            map.get(&"a");
        });

        runtime.run_in_action(|| map.replace([("a", 1), ("z", 26)]));
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn observe_reports_changes() {
        let runtime = Runtime::new();
        let map = runtime.observable_map::<String, i32>([]);
        let changes = Rc::new(RefCell::new(Vec::new()));

        let sink = changes.clone();
        let _listener = map.observe(move |change| sink.borrow_mut().push(change.clone()));
        map.set("k".into(), 1);
        map.set("k".into(), 1);
        map.set("k".into(), 2);
        map.delete(&"k".into());

        assert_eq!(
            *changes.borrow(),
            vec![
                MapChange::Add { key: "k".to_string(), new_value: 1 },
                MapChange::Update { key: "k".to_string(), old_value: 1, new_value: 2 },
                MapChange::Delete { key: "k".to_string(), old_value: 2 },
            ]
        );
    }

    #[test]
    fn interceptors_can_veto_deletes() {
        let runtime = Runtime::new();
        let map = runtime.observable_map([("keep", 1)]);
        let _veto = map.intercept(|change| match change {
            MapWillChange::Delete { .. } => None,
            other => Some(other),
        });

        assert!(!map.delete(&"keep"));
        assert!(map.has(&"keep"));
    }

    #[test]
    fn native_identity() {
        let runtime = Runtime::new();
        let map = runtime.observable_map([("a", 1)]);
        assert_eq!(map.to_string_tag(), "Map");
        assert_eq!(format!("{map:?}"), r#"{"a": 1}"#);
    }
}
