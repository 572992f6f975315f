//! Cascade Core
//!
//! This crate provides the runtime of the Cascade reactive state engine.
//! It implements:
//!
//! - Observable cells, computed values and reactions
//! - Transactions and actions that batch writes
//! - Observable arrays, maps, sets and objects
//! - `when` and `flow` for asynchronous code
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `graph`: the node arena and the propagation protocol
//! - `reactive`: the runtime and the typed reactive primitives
//! - `collections`: observable collection adapters
//! - `value`: dynamic values used by deep observability
//! - `introspection`: dependency and observer trees
//!
//! # Example
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use cascade_core::Runtime;
//!
//! let runtime = Runtime::new();
//! let count = runtime.observable_box(0);
//!
//! let source = count.clone();
//! let doubled = runtime.computed(move || source.get() * 2);
//!
//! let log = Rc::new(RefCell::new(Vec::new()));
//! let sink = log.clone();
//! let _autorun = runtime.autorun(move || sink.borrow_mut().push(doubled.get()));
//!
//! runtime.run_in_action(|| count.set(5));
//! assert_eq!(*log.borrow(), vec![0, 10]);
//! ```

pub mod collections;
pub mod config;
pub mod error;
pub mod graph;
pub mod introspection;
pub mod reactive;
pub mod value;

pub use collections::{
    Annotation, ArrayElement, CollectionOptions, ObservableArray, ObservableMap, ObservableObject,
    ObservableSet, PlainObject, Prototype,
};
pub use config::{ConfigOptions, EnforceActions};
pub use error::{Error, Result};
pub use introspection::{DependencyTree, ObserverTree, Tracked};
pub use reactive::{
    AbortController, AbortSignal, Action, Comparer, Computed, ComputedOptions, Disposer, Flow,
    ObservableOptions, ObservableValue, Reaction, ReactionOptions, Runtime, WhenOptions,
};
pub use value::{Enhancement, Function, Symbol, Value};
