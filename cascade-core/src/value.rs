//! Dynamic values.
//!
//! [`Value`] is the untyped side of the engine: it is what deep observability
//! operates on, the key type of dynamic maps and sets, and the member type of
//! [`ObservableObject`].
//!
//! Equality (`PartialEq`, `Eq`, `Hash`) follows identity semantics:
//!
//! - numbers compare like `Object.is`: `NaN` equals `NaN`, `0.0` and `-0.0`
//!   differ
//! - strings compare by content
//! - symbols, functions and every container compare by identity
//!
//! [`Value::deep_eq`] is the structural alternative.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};

use crate::collections::{
    ArrayElement, CollectionOptions, MapKey, ObservableArray, ObservableMap, ObservableObject,
    ObservableSet, PlainObject,
};
use crate::reactive::Runtime;

/// How a value is made observable when stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Enhancement {
    /// Plain containers become observable, and so does everything inside.
    #[default]
    Deep,
    /// Plain containers become observable collections of plain values.
    Shallow,
    /// Stored as is.
    Ref,
    /// Like `Deep`, but writes that are structurally equal are ignored.
    Struct,
}

/// A symbol. Every `Symbol::new` is distinct, whatever its description.
#[derive(Clone)]
pub struct Symbol {
    description: Rc<str>,
}

impl Symbol {
    pub fn new(description: impl Into<Rc<str>>) -> Self {
        Self {
            description: description.into(),
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    fn addr(&self) -> usize {
        Rc::as_ptr(&self.description) as *const u8 as usize
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.description, &other.description)
    }
}

impl Eq for Symbol {}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.description)
    }
}

struct FunctionInner {
    name: String,
    call: Box<dyn Fn(&[Value]) -> Value>,
    is_action: bool,
}

/// A callable value.
#[derive(Clone)]
pub struct Function {
    inner: Rc<FunctionInner>,
}

impl Function {
    pub fn new(name: impl Into<String>, call: impl Fn(&[Value]) -> Value + 'static) -> Self {
        Self {
            inner: Rc::new(FunctionInner {
                name: name.into(),
                call: Box::new(call),
                is_action: false,
            }),
        }
    }

    /// A function whose calls run as actions on `runtime`.
    pub fn action(
        runtime: &Runtime,
        name: impl Into<String>,
        call: impl Fn(&[Value]) -> Value + 'static,
    ) -> Self {
        let runtime = runtime.clone();
        Self {
            inner: Rc::new(FunctionInner {
                name: name.into(),
                call: Box::new(move |args| runtime.run_in_action(|| call(args))),
                is_action: true,
            }),
        }
    }

    pub fn call(&self, args: &[Value]) -> Value {
        (self.inner.call)(args)
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn is_action(&self) -> bool {
        self.inner.is_action
    }

    fn addr(&self) -> usize {
        Rc::as_ptr(&self.inner) as usize
    }
}

impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Function {}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[Function {}]", self.inner.name)
    }
}

/// A dynamically typed value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Symbol(Symbol),
    Function(Function),

    // Plain containers. Shared, never observed.
    PlainArray(Rc<Vec<Value>>),
    PlainMap(Rc<IndexMap<Value, Value>>),
    PlainSet(Rc<IndexSet<Value>>),
    PlainObject(Rc<PlainObject>),

    // Observable containers.
    Array(ObservableArray<Value>),
    Map(ObservableMap<Value, Value>),
    Set(ObservableSet<Value>),
    Object(ObservableObject),
}

impl Value {
    pub fn array(items: impl IntoIterator<Item = Value>) -> Self {
        Value::PlainArray(Rc::new(items.into_iter().collect()))
    }

    pub fn map(entries: impl IntoIterator<Item = (Value, Value)>) -> Self {
        Value::PlainMap(Rc::new(
            entries
                .into_iter()
                .map(|(key, value)| (key.normalize(), value))
                .collect(),
        ))
    }

    pub fn set(items: impl IntoIterator<Item = Value>) -> Self {
        Value::PlainSet(Rc::new(items.into_iter().map(MapKey::normalize).collect()))
    }

    pub fn object(object: PlainObject) -> Self {
        Value::PlainObject(Rc::new(object))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ObservableArray<Value>> {
        match self {
            Value::Array(array) => Some(array),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&ObservableMap<Value, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&ObservableSet<Value>> {
        match self {
            Value::Set(set) => Some(set),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObservableObject> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn is_observable(&self) -> bool {
        matches!(
            self,
            Value::Array(_) | Value::Map(_) | Value::Set(_) | Value::Object(_)
        )
    }

    pub fn is_observable_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    pub fn is_observable_map(&self) -> bool {
        matches!(self, Value::Map(_))
    }

    pub fn is_observable_set(&self) -> bool {
        matches!(self, Value::Set(_))
    }

    pub fn is_observable_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    pub fn is_action(&self) -> bool {
        matches!(self, Value::Function(f) if f.is_action())
    }

    /// Convert plain containers into observable ones.
    ///
    /// Values that are already observable, and scalars, are returned as is.
    pub fn enhance(self, runtime: &Runtime, enhancement: Enhancement) -> Value {
        let element: fn() -> CollectionOptions<Value> = match enhancement {
            Enhancement::Ref => return self,
            Enhancement::Shallow => CollectionOptions::new,
            Enhancement::Deep | Enhancement::Struct => CollectionOptions::deep,
        };

        match self {
            Value::PlainArray(items) => {
                let items = Rc::try_unwrap(items).unwrap_or_else(|shared| (*shared).clone());
                Value::Array(runtime.observable_array_with(items, element()))
            }
            Value::PlainMap(entries) => {
                let entries = Rc::try_unwrap(entries).unwrap_or_else(|shared| (*shared).clone());
                Value::Map(runtime.observable_map_with(entries, element()))
            }
            Value::PlainSet(items) => {
                let items = Rc::try_unwrap(items).unwrap_or_else(|shared| (*shared).clone());
                Value::Set(runtime.observable_set_with(items, element()))
            }
            Value::PlainObject(object) => {
                let object = Rc::try_unwrap(object).unwrap_or_else(|shared| (*shared).clone());
                Value::Object(runtime.observable_object_with(object, enhancement))
            }
            other => other,
        }
    }

    /// Structural equality.
    ///
    /// Containers are equal when their contents are, regardless of whether
    /// they are plain or observable. Maps, sets and objects ignore order.
    /// Observable contents are read without tracking.
    pub fn deep_eq(a: &Value, b: &Value) -> bool {
        if a == b {
            return true;
        }
        match (Shape::of(a), Shape::of(b)) {
            (Some(Shape::List(a)), Some(Shape::List(b))) => {
                a.len() == b.len() && a.iter().zip(&b).all(|(x, y)| Value::deep_eq(x, y))
            }
            (Some(Shape::Entries(a)), Some(Shape::Entries(b)))
            | (Some(Shape::Fields(a)), Some(Shape::Fields(b))) => {
                a.len() == b.len()
                    && a.iter().all(|(key, x)| {
                        b.iter()
                            .find(|(other, _)| other == key)
                            .is_some_and(|(_, y)| Value::deep_eq(x, y))
                    })
            }
            (Some(Shape::Members(a)), Some(Shape::Members(b))) => {
                a.len() == b.len() && a.iter().all(|x| b.contains(x))
            }
            _ => false,
        }
    }

    fn addr(&self) -> Option<usize> {
        Some(match self {
            Value::Symbol(s) => s.addr(),
            Value::Function(f) => f.addr(),
            Value::PlainArray(rc) => Rc::as_ptr(rc) as usize,
            Value::PlainMap(rc) => Rc::as_ptr(rc) as usize,
            Value::PlainSet(rc) => Rc::as_ptr(rc) as usize,
            Value::PlainObject(rc) => Rc::as_ptr(rc) as usize,
            Value::Array(array) => array.addr(),
            Value::Map(map) => map.addr(),
            Value::Set(set) => set.addr(),
            Value::Object(object) => object.addr(),
            _ => return None,
        })
    }
}

/// Untracked snapshot of a container, used by `deep_eq`.
enum Shape {
    List(Vec<Value>),
    Entries(Vec<(Value, Value)>),
    Members(IndexSet<Value>),
    Fields(Vec<(Value, Value)>),
}

impl Shape {
    fn of(value: &Value) -> Option<Shape> {
        Some(match value {
            Value::PlainArray(items) => Shape::List(items.to_vec()),
            Value::Array(array) => Shape::List(array.to_vec_untracked()),
            Value::PlainMap(entries) => {
                Shape::Entries(entries.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            }
            Value::Map(map) => Shape::Entries(map.entries_untracked()),
            Value::PlainSet(items) => Shape::Members((**items).clone()),
            Value::Set(set) => Shape::Members(set.to_index_set_untracked()),
            Value::PlainObject(object) => Shape::Fields(
                object
                    .data()
                    .map(|(key, value)| (Value::from(key), value.clone()))
                    .collect(),
            ),
            Value::Object(object) => Shape::Fields(
                object
                    .data_untracked()
                    .into_iter()
                    .map(|(key, value)| (Value::from(key), value))
                    .collect(),
            ),
            _ => return None,
        })
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => {
                (a.is_nan() && b.is_nan()) || a.to_bits() == b.to_bits()
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => a == b,
            (Value::PlainArray(a), Value::PlainArray(b)) => Rc::ptr_eq(a, b),
            (Value::PlainMap(a), Value::PlainMap(b)) => Rc::ptr_eq(a, b),
            (Value::PlainSet(a), Value::PlainSet(b)) => Rc::ptr_eq(a, b),
            (Value::PlainObject(a), Value::PlainObject(b)) => Rc::ptr_eq(a, b),
            (Value::Array(a), Value::Array(b)) => a.ptr_eq(b),
            (Value::Map(a), Value::Map(b)) => a.ptr_eq(b),
            (Value::Set(a), Value::Set(b)) => a.ptr_eq(b),
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Undefined | Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Number(n) if n.is_nan() => f64::NAN.to_bits().hash(state),
            Value::Number(n) => n.to_bits().hash(state),
            Value::String(s) => s.hash(state),
            other => other.addr().hash(state),
        }
    }
}

impl ArrayElement for Value {
    /// Numbers compare as IEEE doubles; everything else as in `==`.
    fn strict_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            _ => self == other,
        }
    }

    fn same_value_zero(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            _ => self == other,
        }
    }
}

impl MapKey for Value {
    /// Same-value-zero: `-0` is stored as `0`. `NaN` is already one key.
    fn normalize(self) -> Self {
        match self {
            Value::Number(n) if n == 0.0 => Value::Number(0.0),
            other => other,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Symbol(s) => write!(f, "{s:?}"),
            Value::Function(func) => write!(f, "{func:?}"),
            Value::PlainArray(items) => f.debug_list().entries(items.iter()).finish(),
            Value::PlainMap(entries) => f.debug_map().entries(entries.iter()).finish(),
            Value::PlainSet(items) => f.debug_set().entries(items.iter()).finish(),
            Value::PlainObject(object) => fmt::Debug::fmt(object, f),
            Value::Array(array) => fmt::Debug::fmt(array, f),
            Value::Map(map) => fmt::Debug::fmt(map, f),
            Value::Set(set) => fmt::Debug::fmt(set, f),
            Value::Object(object) => fmt::Debug::fmt(object, f),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Value::String(Rc::from(s.as_str()))
    }
}

impl From<Function> for Value {
    fn from(f: Function) -> Self {
        Value::Function(f)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Undefined, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::array(items.into_iter().map(Into::into))
    }
}

impl From<ObservableArray<Value>> for Value {
    fn from(array: ObservableArray<Value>) -> Self {
        Value::Array(array)
    }
}

impl From<ObservableMap<Value, Value>> for Value {
    fn from(map: ObservableMap<Value, Value>) -> Self {
        Value::Map(map)
    }
}

impl From<ObservableSet<Value>> for Value {
    fn from(set: ObservableSet<Value>) -> Self {
        Value::Set(set)
    }
}

impl From<ObservableObject> for Value {
    fn from(object: ObservableObject) -> Self {
        Value::Object(object)
    }
}

impl Runtime {
    /// Make a value deeply observable.
    ///
    /// Plain arrays, maps, sets and objects are converted recursively; any
    /// other value is returned unchanged.
    pub fn observable(&self, value: impl Into<Value>) -> Value {
        value.into().enhance(self, Enhancement::Deep)
    }
}
