//! Observable objects.
//!
//! An [`ObservableObject`] is built from a [`PlainObject`] holding its own
//! members and an optional [`Prototype`] chain holding shared getters and
//! methods. Annotating a member turns it into its reactive counterpart:
//!
//! - `Observable`: a data member becomes a cell, enhanced deep, shallow, by
//!   reference or structurally
//! - `Computed`: an accessor becomes a [`Computed`] bound to the object
//! - `Action`/`ActionBound`: a method runs inside an action when called
//! - `None`: the member is kept as is
//!
//! Annotations are applied once per member. Applying the same annotation
//! again is a no-op, so a derived prototype may re-annotate members its
//! parent already made observable without disconnecting their cells.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::reactive::{
    Atom, Comparer, Computed, ComputedOptions, Disposer, Interceptors, Listeners,
    ObservableOptions, ObservableValue, Runtime,
};
use crate::value::{Enhancement, Function, Value};

pub type Getter = Rc<dyn Fn(&ObservableObject) -> Value>;
pub type Setter = Rc<dyn Fn(&ObservableObject, Value)>;
pub type Method = Rc<dyn Fn(&ObservableObject, &[Value]) -> Value>;

/// A member definition.
#[derive(Clone)]
pub enum Descriptor {
    Data(Value),
    Accessor { get: Getter, set: Option<Setter> },
    Method(Method),
}

impl Descriptor {
    fn kind(&self) -> &'static str {
        match self {
            Descriptor::Data(_) => "a data member",
            Descriptor::Accessor { .. } => "an accessor",
            Descriptor::Method(_) => "a method",
        }
    }
}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Descriptor::Data(value) => fmt::Debug::fmt(value, f),
            Descriptor::Accessor { set: None, .. } => f.write_str("[Getter]"),
            Descriptor::Accessor { .. } => f.write_str("[Getter/Setter]"),
            Descriptor::Method(_) => f.write_str("[Function]"),
        }
    }
}

/// How a member is made reactive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Annotation {
    Observable(Enhancement),
    Computed,
    /// A computed that ignores structurally equal results.
    ComputedStruct,
    Action,
    /// An action that keeps the object it was read from.
    ActionBound,
    None,
}

impl Annotation {
    fn infer(descriptor: &Descriptor, enhancement: Enhancement) -> Self {
        match descriptor {
            Descriptor::Data(_) => Annotation::Observable(enhancement),
            Descriptor::Accessor { .. } => Annotation::Computed,
            Descriptor::Method(_) => Annotation::Action,
        }
    }
}

/// A plain, non-reactive object.
#[derive(Clone, Default)]
pub struct PlainObject {
    members: IndexMap<String, Descriptor>,
    prototype: Option<Rc<Prototype>>,
}

impl PlainObject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.members.insert(key.into(), Descriptor::Data(value.into()));
        self
    }

    pub fn with_getter(
        mut self,
        key: impl Into<String>,
        get: impl Fn(&ObservableObject) -> Value + 'static,
    ) -> Self {
        self.members.insert(
            key.into(),
            Descriptor::Accessor {
                get: Rc::new(get),
                set: None,
            },
        );
        self
    }

    pub fn with_accessor(
        mut self,
        key: impl Into<String>,
        get: impl Fn(&ObservableObject) -> Value + 'static,
        set: impl Fn(&ObservableObject, Value) + 'static,
    ) -> Self {
        self.members.insert(
            key.into(),
            Descriptor::Accessor {
                get: Rc::new(get),
                set: Some(Rc::new(set)),
            },
        );
        self
    }

    pub fn with_method(
        mut self,
        key: impl Into<String>,
        method: impl Fn(&ObservableObject, &[Value]) -> Value + 'static,
    ) -> Self {
        self.members
            .insert(key.into(), Descriptor::Method(Rc::new(method)));
        self
    }

    pub fn with_prototype(mut self, prototype: &Rc<Prototype>) -> Self {
        self.prototype = Some(Rc::clone(prototype));
        self
    }

    pub fn get(&self, key: &str) -> Option<&Descriptor> {
        self.members.get(key)
    }

    /// Data members, in insertion order.
    pub fn data(&self) -> impl Iterator<Item = (&String, &Value)> + '_ {
        self.members.iter().filter_map(|(key, descriptor)| match descriptor {
            Descriptor::Data(value) => Some((key, value)),
            _ => None,
        })
    }
}

impl fmt::Debug for PlainObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.members.iter()).finish()
    }
}

/// Members shared by every object built on it.
pub struct Prototype {
    name: String,
    members: IndexMap<String, Descriptor>,
    parent: Option<Rc<Prototype>>,
    /// Methods already annotated as actions by some instance.
    actions: RefCell<HashMap<String, Annotation>>,
}

impl Prototype {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: IndexMap::new(),
            parent: None,
            actions: RefCell::new(HashMap::new()),
        }
    }

    pub fn with_getter(
        mut self,
        key: impl Into<String>,
        get: impl Fn(&ObservableObject) -> Value + 'static,
    ) -> Self {
        self.members.insert(
            key.into(),
            Descriptor::Accessor {
                get: Rc::new(get),
                set: None,
            },
        );
        self
    }

    pub fn with_accessor(
        mut self,
        key: impl Into<String>,
        get: impl Fn(&ObservableObject) -> Value + 'static,
        set: impl Fn(&ObservableObject, Value) + 'static,
    ) -> Self {
        self.members.insert(
            key.into(),
            Descriptor::Accessor {
                get: Rc::new(get),
                set: Some(Rc::new(set)),
            },
        );
        self
    }

    pub fn with_method(
        mut self,
        key: impl Into<String>,
        method: impl Fn(&ObservableObject, &[Value]) -> Value + 'static,
    ) -> Self {
        self.members
            .insert(key.into(), Descriptor::Method(Rc::new(method)));
        self
    }

    pub fn with_parent(mut self, parent: &Rc<Prototype>) -> Self {
        self.parent = Some(Rc::clone(parent));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Find `key` on this prototype or an ancestor.
    fn find(self: &Rc<Self>, key: &str) -> Option<(Rc<Prototype>, Descriptor)> {
        let mut current = Some(Rc::clone(self));
        while let Some(prototype) = current {
            if let Some(descriptor) = prototype.members.get(key) {
                let descriptor = descriptor.clone();
                return Some((prototype, descriptor));
            }
            current = prototype.parent.clone();
        }
        None
    }

    /// Every key on the chain, nearest first, without duplicates.
    fn keys(self: &Rc<Self>) -> Vec<String> {
        let mut keys: Vec<String> = Vec::new();
        let mut current = Some(Rc::clone(self));
        while let Some(prototype) = current {
            for key in prototype.members.keys() {
                if !keys.contains(key) {
                    keys.push(key.clone());
                }
            }
            current = prototype.parent.clone();
        }
        keys
    }

    fn is_action(&self, key: &str) -> bool {
        self.actions.borrow().contains_key(key)
    }
}

impl fmt::Debug for Prototype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Prototype")
            .field("name", &self.name)
            .field("members", &self.members)
            .field("parent", &self.parent.as_ref().map(|parent| parent.name()))
            .finish()
    }
}

/// A change applied to an object.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectChange {
    Add {
        key: String,
        new_value: Value,
    },
    Update {
        key: String,
        old_value: Value,
        new_value: Value,
    },
    Remove {
        key: String,
        old_value: Value,
    },
}

/// A pending change, passed to interceptors.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectWillChange {
    Add { key: String, new_value: Value },
    Update { key: String, new_value: Value },
    Remove { key: String },
}

#[derive(Clone)]
enum Member {
    Plain(Descriptor),
    Observable(ObservableValue<Value>),
    Computed(Computed<Value>),
    Action { method: Method, bound: bool },
}

struct ObjectInner {
    runtime: Runtime,
    name: String,
    members: RefCell<IndexMap<String, Member>>,
    annotations: RefCell<HashMap<String, Annotation>>,
    prototype: Option<Rc<Prototype>>,
    keys_atom: Atom,
    /// Used for members added after construction.
    enhancement: Enhancement,
    listeners: Listeners<ObjectChange>,
    interceptors: Interceptors<ObjectWillChange>,
}

/// An object whose annotated members are observable.
#[derive(Clone)]
pub struct ObservableObject {
    inner: Rc<ObjectInner>,
}

impl ObservableObject {
    fn new(runtime: &Runtime, object: PlainObject, enhancement: Enhancement) -> Self {
        let name = runtime.next_name("ObservableObject");
        let members = object
            .members
            .into_iter()
            .map(|(key, descriptor)| (key, Member::Plain(descriptor)))
            .collect();
        Self {
            inner: Rc::new(ObjectInner {
                runtime: runtime.clone(),
                keys_atom: Atom::new(runtime, format!("{name}.keys()")),
                name,
                members: RefCell::new(members),
                annotations: RefCell::new(HashMap::new()),
                prototype: object.prototype,
                enhancement,
                listeners: Listeners::new(),
                interceptors: Interceptors::new(),
            }),
        }
    }

    /// Apply explicit annotations.
    ///
    /// Fails with [`Error::Annotation`] when a key is not a member, when an
    /// annotation does not fit the member, or when the member already has a
    /// different annotation.
    pub fn make_observable<K: Into<String>>(
        &self,
        annotations: impl IntoIterator<Item = (K, Annotation)>,
    ) -> Result<()> {
        for (key, annotation) in annotations {
            self.annotate(&key.into(), annotation)?;
        }
        Ok(())
    }

    /// Annotate every member, inferring what `overrides` leaves out.
    ///
    /// Own data members become observable, accessors become computed and
    /// methods become actions, on the object and along its prototype chain.
    pub fn make_auto_observable<K: Into<String>>(
        &self,
        overrides: impl IntoIterator<Item = (K, Annotation)>,
    ) -> Result<()> {
        let overrides: IndexMap<String, Annotation> = overrides
            .into_iter()
            .map(|(key, annotation)| (key.into(), annotation))
            .collect();

        let mut keys: Vec<String> = self.inner.members.borrow().keys().cloned().collect();
        if let Some(prototype) = &self.inner.prototype {
            for key in prototype.keys() {
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }
        for key in overrides.keys() {
            if !keys.contains(key) {
                keys.push(key.clone());
            }
        }

        for key in keys {
            let annotation = match overrides.get(&key) {
                Some(annotation) => *annotation,
                None => match self.descriptor(&key) {
                    Some(descriptor) => Annotation::infer(&descriptor, self.inner.enhancement),
                    None => continue,
                },
            };
            let existing = self.inner.annotations.borrow().get(&key).copied();
            if existing.is_some() && !overrides.contains_key(&key) {
                continue;
            }
            self.annotate(&key, annotation)?;
        }
        Ok(())
    }

    /// The unannotated definition of `key`, own or inherited.
    fn descriptor(&self, key: &str) -> Option<Descriptor> {
        match self.inner.members.borrow().get(key) {
            Some(Member::Plain(descriptor)) => return Some(descriptor.clone()),
            Some(_) => return None,
            None => {}
        }
        self.inner
            .prototype
            .as_ref()
            .and_then(|prototype| prototype.find(key))
            .map(|(_, descriptor)| descriptor)
    }

    fn annotate(&self, key: &str, annotation: Annotation) -> Result<()> {
        let annotation_error = |message: String| Error::Annotation {
            key: key.to_string(),
            message,
        };

        if let Some(existing) = self.inner.annotations.borrow().get(key).copied() {
            return if existing == annotation {
                Ok(())
            } else {
                Err(annotation_error(format!(
                    "it is already annotated as {existing:?}"
                )))
            };
        }

        let own = match self.inner.members.borrow().get(key) {
            Some(Member::Plain(descriptor)) => Some(descriptor.clone()),
            Some(_) => None,
            None => None,
        };

        let member = match own {
            Some(descriptor) => match (annotation, descriptor) {
                (Annotation::None, _) => None,
                (Annotation::Observable(enhancement), Descriptor::Data(value)) => {
                    Some(Member::Observable(self.cell(key, value, enhancement)))
                }
                (Annotation::Computed, Descriptor::Accessor { get, set }) => {
                    Some(Member::Computed(self.computed_member(key, get, set, false)))
                }
                (Annotation::ComputedStruct, Descriptor::Accessor { get, set }) => {
                    Some(Member::Computed(self.computed_member(key, get, set, true)))
                }
                (Annotation::Action, Descriptor::Method(method)) => Some(Member::Action {
                    method,
                    bound: false,
                }),
                (Annotation::ActionBound, Descriptor::Method(method)) => Some(Member::Action {
                    method,
                    bound: true,
                }),
                (
                    Annotation::Action | Annotation::ActionBound,
                    Descriptor::Data(Value::Function(function)),
                ) => {
                    let wrapped = function.clone();
                    Some(Member::Plain(Descriptor::Data(Value::Function(
                        Function::action(&self.inner.runtime, function.name(), move |args| {
                            wrapped.call(args)
                        }),
                    ))))
                }
                (annotation, descriptor) => {
                    return Err(annotation_error(format!(
                        "{annotation:?} cannot be applied to {}",
                        descriptor.kind()
                    )))
                }
            },
            None => {
                let Some((prototype, descriptor)) = self
                    .inner
                    .prototype
                    .as_ref()
                    .and_then(|prototype| prototype.find(key))
                else {
                    return Err(annotation_error("no such member".to_string()));
                };
                match (annotation, descriptor) {
                    (Annotation::None, _) => None,
                    (Annotation::Action, Descriptor::Method(_)) => {
                        prototype
                            .actions
                            .borrow_mut()
                            .entry(key.to_string())
                            .or_insert(Annotation::Action);
                        None
                    }
                    (Annotation::ActionBound, Descriptor::Method(method)) => {
                        Some(Member::Action {
                            method,
                            bound: true,
                        })
                    }
                    (Annotation::Computed, Descriptor::Accessor { get, set }) => {
                        Some(Member::Computed(self.computed_member(key, get, set, false)))
                    }
                    (Annotation::ComputedStruct, Descriptor::Accessor { get, set }) => {
                        Some(Member::Computed(self.computed_member(key, get, set, true)))
                    }
                    (annotation, descriptor) => {
                        return Err(annotation_error(format!(
                            "{annotation:?} cannot be applied to {} of prototype '{}'",
                            descriptor.kind(),
                            prototype.name()
                        )))
                    }
                }
            }
        };

        if let Some(member) = member {
            self.inner
                .members
                .borrow_mut()
                .insert(key.to_string(), member);
        }
        self.inner
            .annotations
            .borrow_mut()
            .insert(key.to_string(), annotation);
        debug!(object = %self.inner.name, key, ?annotation, "annotated");
        Ok(())
    }

    fn cell(&self, key: &str, value: Value, enhancement: Enhancement) -> ObservableValue<Value> {
        let mut options = ObservableOptions::new().name(format!("{}.{key}", self.inner.name));
        if enhancement == Enhancement::Struct {
            options = options.equals(Comparer::Structural);
        }
        if enhancement != Enhancement::Ref {
            options = options.enhancer(move |runtime, value: Value| value.enhance(runtime, enhancement));
        }
        self.inner.runtime.observable_box_with(value, options)
    }

    fn computed_member(
        &self,
        key: &str,
        get: Getter,
        set: Option<Setter>,
        structural: bool,
    ) -> Computed<Value> {
        let mut options = ComputedOptions::new().name(format!("{}.{key}", self.inner.name));
        if structural {
            options = options.equals(Comparer::Structural);
        }
        if let Some(set) = set {
            let weak = Rc::downgrade(&self.inner);
            options = options.setter(move |value| {
                if let Some(object) = ObservableObject::upgrade(&weak) {
                    set(&object, value);
                }
            });
        }
        let weak = Rc::downgrade(&self.inner);
        self.inner.runtime.computed_with(
            move || match ObservableObject::upgrade(&weak) {
                Some(object) => get(&object),
                None => Value::Undefined,
            },
            options,
        )
    }

    fn upgrade(weak: &Weak<ObjectInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    fn member(&self, key: &str) -> Option<Member> {
        self.inner.members.borrow().get(key).cloned()
    }

    fn bind(&self, key: &str, method: Method, action: bool) -> Value {
        let this = self.clone();
        let call = move |args: &[Value]| method(&this, args);
        let function = if action {
            Function::action(&self.inner.runtime, key, call)
        } else {
            Function::new(key, call)
        };
        Value::Function(function)
    }

    /// Read `key`. Reading a missing key tracks the key set, so the reader
    /// re-runs once the key is added.
    pub fn get(&self, key: &str) -> Value {
        match self.member(key) {
            Some(Member::Observable(cell)) => cell.get(),
            Some(Member::Computed(computed)) => computed.get(),
            Some(Member::Plain(Descriptor::Data(value))) => value,
            Some(Member::Plain(Descriptor::Accessor { get, .. })) => get(self),
            Some(Member::Plain(Descriptor::Method(method))) => self.bind(key, method, false),
            Some(Member::Action { method, .. }) => self.bind(key, method, true),
            None => {
                self.inner.keys_atom.report_observed();
                match self.inherited(key) {
                    Some((prototype, Descriptor::Method(method))) => {
                        self.bind(key, method, prototype.is_action(key))
                    }
                    Some((_, Descriptor::Accessor { get, .. })) => get(self),
                    Some((_, Descriptor::Data(value))) => value,
                    None => Value::Undefined,
                }
            }
        }
    }

    fn inherited(&self, key: &str) -> Option<(Rc<Prototype>, Descriptor)> {
        self.inner
            .prototype
            .as_ref()
            .and_then(|prototype| prototype.find(key))
    }

    /// Write `key`. A missing key is added as an observable member.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        match self.member(key) {
            Some(Member::Observable(cell)) => {
                let value = if self.inner.interceptors.is_empty() {
                    value
                } else {
                    match self.inner.interceptors.intercept(ObjectWillChange::Update {
                        key: key.to_string(),
                        new_value: value,
                    }) {
                        Some(ObjectWillChange::Update { new_value, .. }) => new_value,
                        _ => return Ok(()),
                    }
                };
                let _batch = self.inner.runtime.batch_guard();
                if let Some(old_value) = cell.replace(value) {
                    if !self.inner.listeners.is_empty() {
                        self.inner.listeners.notify(&ObjectChange::Update {
                            key: key.to_string(),
                            old_value,
                            new_value: cell.get_untracked(),
                        });
                    }
                }
                Ok(())
            }
            Some(Member::Computed(computed)) => computed.set(value),
            Some(Member::Plain(Descriptor::Data(_))) => {
                self.inner
                    .members
                    .borrow_mut()
                    .insert(key.to_string(), Member::Plain(Descriptor::Data(value)));
                Ok(())
            }
            Some(Member::Plain(Descriptor::Accessor { set: Some(set), .. })) => {
                set(self, value);
                Ok(())
            }
            Some(Member::Plain(_) | Member::Action { .. }) => {
                warn!(object = %self.inner.name, key, "member is not writable");
                Ok(())
            }
            None => match self.inherited(key) {
                Some((_, Descriptor::Accessor { set: Some(set), .. })) => {
                    set(self, value);
                    Ok(())
                }
                Some((_, Descriptor::Accessor { .. } | Descriptor::Method(_))) => {
                    warn!(object = %self.inner.name, key, "member is not writable");
                    Ok(())
                }
                _ => {
                    self.add(key, value);
                    Ok(())
                }
            },
        }
    }

    fn add(&self, key: &str, value: Value) {
        let inner = &self.inner;
        inner.keys_atom.check_state_change();
        let value = if inner.interceptors.is_empty() {
            value
        } else {
            match inner.interceptors.intercept(ObjectWillChange::Add {
                key: key.to_string(),
                new_value: value,
            }) {
                Some(ObjectWillChange::Add { new_value, .. }) => new_value,
                _ => return,
            }
        };

        let _batch = inner.runtime.batch_guard();
        let cell = self.cell(key, value, inner.enhancement);
        let new_value = cell.get_untracked();
        inner
            .members
            .borrow_mut()
            .insert(key.to_string(), Member::Observable(cell));
        inner
            .annotations
            .borrow_mut()
            .insert(key.to_string(), Annotation::Observable(inner.enhancement));
        inner.keys_atom.report_changed();
        if !inner.listeners.is_empty() {
            inner.listeners.notify(&ObjectChange::Add {
                key: key.to_string(),
                new_value,
            });
        }
    }

    /// Remove an own data member. Returns whether it was present.
    pub fn delete(&self, key: &str) -> bool {
        let inner = &self.inner;
        let cell = match self.member(key) {
            Some(Member::Observable(cell)) => Some(cell),
            Some(Member::Plain(Descriptor::Data(_))) => None,
            _ => return false,
        };
        inner.keys_atom.check_state_change();
        if !inner.interceptors.is_empty()
            && inner
                .interceptors
                .intercept(ObjectWillChange::Remove {
                    key: key.to_string(),
                })
                .is_none()
        {
            return false;
        }

        let _batch = inner.runtime.batch_guard();
        let removed = inner.members.borrow_mut().shift_remove(key);
        inner.annotations.borrow_mut().remove(key);
        let old_value = match (cell, removed) {
            (Some(cell), _) => {
                let old_value = cell.get_untracked();
                cell.write(Value::Undefined);
                old_value
            }
            (None, Some(Member::Plain(Descriptor::Data(value)))) => value,
            (None, _) => Value::Undefined,
        };
        inner.keys_atom.report_changed();
        if !inner.listeners.is_empty() {
            inner.listeners.notify(&ObjectChange::Remove {
                key: key.to_string(),
                old_value,
            });
        }
        true
    }

    /// Whether `key` is an own or inherited member. Tracks the key set.
    pub fn has(&self, key: &str) -> bool {
        self.inner.keys_atom.report_observed();
        self.inner.members.borrow().contains_key(key) || self.inherited(key).is_some()
    }

    /// Own data keys, in insertion order. Tracks the key set.
    pub fn keys(&self) -> Vec<String> {
        self.inner.keys_atom.report_observed();
        self.data_keys()
    }

    pub fn values(&self) -> Vec<Value> {
        self.keys().iter().map(|key| self.get(key)).collect()
    }

    fn data_keys(&self) -> Vec<String> {
        self.inner
            .members
            .borrow()
            .iter()
            .filter(|(_, member)| {
                matches!(
                    member,
                    Member::Observable(_) | Member::Plain(Descriptor::Data(_))
                )
            })
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub(crate) fn data_untracked(&self) -> Vec<(String, Value)> {
        self.inner
            .members
            .borrow()
            .iter()
            .filter_map(|(key, member)| match member {
                Member::Observable(cell) => Some((key.clone(), cell.get_untracked())),
                Member::Plain(Descriptor::Data(value)) => Some((key.clone(), value.clone())),
                _ => None,
            })
            .collect()
    }

    /// Call the method `key`. Returns `None` when `key` is not callable.
    pub fn call(&self, key: &str, args: &[Value]) -> Option<Value> {
        match self.member(key) {
            Some(Member::Action { method, .. }) => {
                Some(self.inner.runtime.run_in_action(|| method(self, args)))
            }
            Some(Member::Plain(Descriptor::Method(method))) => Some(method(self, args)),
            Some(_) => self.get(key).as_function().map(|function| function.call(args)),
            None => match self.inherited(key) {
                Some((prototype, Descriptor::Method(method))) => {
                    if prototype.is_action(key) {
                        Some(self.inner.runtime.run_in_action(|| method(self, args)))
                    } else {
                        Some(method(self, args))
                    }
                }
                _ => None,
            },
        }
    }

    /// The annotation applied to `key`, if any.
    pub fn annotation(&self, key: &str) -> Option<Annotation> {
        self.inner.annotations.borrow().get(key).copied()
    }

    pub fn is_computed(&self, key: &str) -> bool {
        matches!(self.member(key), Some(Member::Computed(_)))
    }

    pub fn is_action(&self, key: &str) -> bool {
        match self.member(key) {
            Some(Member::Action { .. }) => true,
            Some(Member::Plain(Descriptor::Data(value))) => value.is_action(),
            Some(_) => false,
            None => self
                .inherited(key)
                .map_or(false, |(prototype, _)| prototype.is_action(key)),
        }
    }

    /// Whether `key` is an action bound to this object.
    pub fn is_bound(&self, key: &str) -> bool {
        matches!(self.member(key), Some(Member::Action { bound: true, .. }))
    }

    /// The computed backing `key`.
    pub fn computed(&self, key: &str) -> Option<Computed<Value>> {
        match self.member(key) {
            Some(Member::Computed(computed)) => Some(computed),
            _ => None,
        }
    }

    /// The cell backing `key`.
    pub fn observable_value(&self, key: &str) -> Option<ObservableValue<Value>> {
        match self.member(key) {
            Some(Member::Observable(cell)) => Some(cell),
            _ => None,
        }
    }

    /// Listen to changes of observable members and of the key set.
    pub fn observe(&self, listener: impl Fn(&ObjectChange) + 'static) -> Disposer {
        self.inner.listeners.add(listener)
    }

    pub fn intercept(
        &self,
        interceptor: impl Fn(ObjectWillChange) -> Option<ObjectWillChange> + 'static,
    ) -> Disposer {
        self.inner.interceptors.add(interceptor)
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn runtime(&self) -> &Runtime {
        &self.inner.runtime
    }

    pub fn prototype(&self) -> Option<&Rc<Prototype>> {
        self.inner.prototype.as_ref()
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

impl fmt::Debug for ObservableObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Ok(members) = self.inner.members.try_borrow() else {
            return f.write_str("{<borrowed>}");
        };
        let mut map = f.debug_map();
        for (key, member) in members.iter() {
            match member {
                Member::Observable(cell) => map.entry(key, cell),
                Member::Plain(descriptor) => map.entry(key, descriptor),
                Member::Computed(computed) => map.entry(key, computed),
                Member::Action { .. } => map.entry(key, &format_args!("[Action]")),
            };
        }
        map.finish()
    }
}

impl Runtime {
    /// Wrap `object` without annotating anything.
    pub fn object(&self, object: PlainObject) -> ObservableObject {
        ObservableObject::new(self, object, Enhancement::Deep)
    }

    /// Wrap `object` and annotate every member by inference.
    pub fn observable_object(&self, object: PlainObject) -> ObservableObject {
        self.observable_object_with(object, Enhancement::Deep)
    }

    /// Like [`observable_object`](Self::observable_object), with the
    /// enhancement used for data members.
    pub fn observable_object_with(
        &self,
        object: PlainObject,
        enhancement: Enhancement,
    ) -> ObservableObject {
        let enhancement = match enhancement {
            Enhancement::Struct => Enhancement::Deep,
            other => other,
        };
        let observable = ObservableObject::new(self, object, enhancement);
        if let Err(err) = observable.make_auto_observable(std::iter::empty::<(String, Annotation)>())
        {
            debug!(error = %err, "skipped member during inference");
        }
        observable
    }
}
