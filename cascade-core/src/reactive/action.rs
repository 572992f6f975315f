//! Actions
//!
//! An action is a unit of mutation. Its body runs inside a batch with
//! dependency tracking suspended and state changes allowed, so:
//!
//! - reactions observe all of its writes at once, when the outermost batch
//!   ends
//! - reads inside the body never subscribe the surrounding derivation
//! - writes never trigger the enforce-actions diagnostic
//!
//! A panic inside the body closes the batch, flags reaction failures caused
//! by the partial update as suppressed and continues unwinding to the
//! caller.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use tracing::trace;

use super::context::ReactiveContext;
use super::runtime::Runtime;

impl Runtime {
    /// Run `f` as an action.
    pub fn run_in_action<R>(&self, f: impl FnOnce() -> R) -> R {
        self.start_batch();
        let result = {
            let _context = ReactiveContext::untracked(self, true);
            panic::catch_unwind(AssertUnwindSafe(f))
        };

        match result {
            Ok(value) => {
                self.end_batch();
                value
            }
            Err(payload) => {
                self.end_failed_action();
                panic::resume_unwind(payload)
            }
        }
    }

    /// Run a fallible action. An `Err` is treated like a panic in
    /// [`run_in_action`](Self::run_in_action): writes made before it stay
    /// applied and reaction failures they cause are flagged as suppressed.
    pub fn try_run_in_action<R, E>(&self, f: impl FnOnce() -> Result<R, E>) -> Result<R, E> {
        self.start_batch();
        let result = {
            let _context = ReactiveContext::untracked(self, true);
            panic::catch_unwind(AssertUnwindSafe(f))
        };

        match result {
            Ok(Ok(value)) => {
                self.end_batch();
                Ok(value)
            }
            Ok(Err(err)) => {
                self.end_failed_action();
                Err(err)
            }
            Err(payload) => {
                self.end_failed_action();
                panic::resume_unwind(payload)
            }
        }
    }

    fn end_failed_action(&self) {
        trace!("action failed");
        self.set_suppress_reaction_errors(true);
        self.end_batch();
        self.set_suppress_reaction_errors(false);
    }

    /// Wrap `f` so every call runs as an action.
    pub fn action<A, R>(&self, name: impl Into<String>, f: impl Fn(A) -> R + 'static) -> Action<A, R> {
        Action {
            runtime: self.clone(),
            name: Rc::from(name.into()),
            f: Rc::new(f),
        }
    }
}

/// A function whose calls run as actions.
pub struct Action<A, R> {
    runtime: Runtime,
    name: Rc<str>,
    f: Rc<dyn Fn(A) -> R>,
}

impl<A, R> Action<A, R> {
    pub fn call(&self, args: A) -> R {
        let f = &self.f;
        self.runtime.run_in_action(|| f(args))
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<A, R> Clone for Action<A, R> {
    fn clone(&self) -> Self {
        Self {
            runtime: self.runtime.clone(),
            name: Rc::clone(&self.name),
            f: Rc::clone(&self.f),
        }
    }
}

impl<A, R> fmt::Debug for Action<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action").field("name", &self.name).finish()
    }
}
