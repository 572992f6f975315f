//! Observable Collections
//!
//! Arrays, maps, sets and objects that report reads and writes to the
//! runtime. They are explicit wrapper types: every operation is a method,
//! and plain copies (`to_vec`, `to_index_map`, ...) are never reactive.
//!
//! Each collection keeps its data itself and owns one atom in the graph. Maps
//! and objects also keep one cell per key, so a reader of one key is not
//! woken by writes to another.

mod array;
mod map;
mod object;
mod set;

use std::fmt::Debug;
use std::hash::Hash;
use std::rc::Rc;

pub use array::{ArrayChange, ArrayWillChange, ObservableArray};
pub use map::{MapChange, MapWillChange, ObservableMap};
pub use object::{
    Annotation, Descriptor, Getter, Method, ObjectChange, ObjectWillChange, ObservableObject,
    PlainObject, Prototype, Setter,
};
pub use set::{ObservableSet, SetChange, SetWillChange};

use crate::reactive::{Enhancer, Runtime};
use crate::value::{Enhancement, Value};

/// Keys of observable maps and members of observable sets.
///
/// `normalize` maps every key to its canonical form before it is hashed, so
/// keys that the collection considers the same land in one slot.
pub trait MapKey: Clone + Eq + Hash + Debug + 'static {
    fn normalize(self) -> Self {
        self
    }
}

macro_rules! impl_map_key {
    ($($ty:ty),* $(,)?) => {
        $(impl MapKey for $ty {})*
    };
}

impl_map_key!(
    bool, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, String,
    &'static str, Rc<str>
);

/// Elements of observable arrays.
///
/// `strict_eq` backs `index_of` and `remove`; `same_value_zero` backs
/// `includes`. Both default to `==`, which is right for every type without
/// a signed zero or `NaN`.
pub trait ArrayElement: Clone + PartialEq + 'static {
    fn strict_eq(&self, other: &Self) -> bool {
        self == other
    }

    fn same_value_zero(&self, other: &Self) -> bool {
        self == other
    }
}

macro_rules! impl_array_element {
    ($($ty:ty),* $(,)?) => {
        $(impl ArrayElement for $ty {})*
    };
}

impl_array_element!(
    (), bool, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, String,
    &'static str, Rc<str>
);

macro_rules! impl_float_element {
    ($($ty:ty),*) => {
        $(impl ArrayElement for $ty {
            fn same_value_zero(&self, other: &Self) -> bool {
                self == other || (self.is_nan() && other.is_nan())
            }
        })*
    };
}

impl_float_element!(f32, f64);

impl<T: ArrayElement> ArrayElement for Vec<T> {}
impl<T: ArrayElement> ArrayElement for Option<T> {}

/// Options shared by the collection constructors.
pub struct CollectionOptions<T> {
    pub name: Option<String>,
    /// Applied to every inserted value.
    pub enhancer: Option<Enhancer<T>>,
}

impl<T> Default for CollectionOptions<T> {
    fn default() -> Self {
        Self {
            name: None,
            enhancer: None,
        }
    }
}

impl<T> CollectionOptions<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn enhancer(mut self, enhancer: impl Fn(&Runtime, T) -> T + 'static) -> Self {
        self.enhancer = Some(Rc::new(enhancer));
        self
    }
}

impl CollectionOptions<Value> {
    /// Make inserted plain containers observable, recursively.
    pub fn deep() -> Self {
        Self::new().enhancement(Enhancement::Deep)
    }

    /// Make inserted plain containers observable, one level deep.
    pub fn shallow() -> Self {
        Self::new().enhancement(Enhancement::Shallow)
    }

    pub fn enhancement(self, enhancement: Enhancement) -> Self {
        match enhancement {
            Enhancement::Ref => self,
            _ => self.enhancer(move |runtime, value: Value| value.enhance(runtime, enhancement)),
        }
    }
}

fn enhance<T>(enhancer: &Option<Enhancer<T>>, runtime: &Runtime, value: T) -> T {
    match enhancer {
        Some(enhancer) => enhancer(runtime, value),
        None => value,
    }
}
