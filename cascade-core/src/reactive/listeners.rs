//! Change listeners and interceptors shared by cells and collections.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

type Entries<F> = Rc<RefCell<Vec<(u64, Rc<F>)>>>;

fn register<F: ?Sized + 'static>(entries: &Entries<F>, next_id: &Cell<u64>, f: Rc<F>) -> Disposer {
    let id = next_id.get();
    next_id.set(id + 1);
    entries.borrow_mut().push((id, f));

    let weak: Weak<RefCell<Vec<(u64, Rc<F>)>>> = Rc::downgrade(entries);
    Disposer::new(move || {
        if let Some(entries) = weak.upgrade() {
            let removed = {
                let mut entries = entries.borrow_mut();
                entries
                    .iter()
                    .position(|(entry_id, _)| *entry_id == id)
                    .map(|index| entries.remove(index))
            };
            drop(removed);
        }
    })
}

/// Callbacks notified after a change was applied.
pub(crate) struct Listeners<C> {
    entries: Entries<dyn Fn(&C)>,
    next_id: Cell<u64>,
}

impl<C: 'static> Listeners<C> {
    pub fn new() -> Self {
        Self {
            entries: Rc::new(RefCell::new(Vec::new())),
            next_id: Cell::new(0),
        }
    }

    pub fn add(&self, listener: impl Fn(&C) + 'static) -> Disposer {
        register(&self.entries, &self.next_id, Rc::new(listener) as Rc<dyn Fn(&C)>)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn notify(&self, change: &C) {
        // Listeners may register or dispose listeners while running.
        let listeners: Vec<_> = self.entries.borrow().iter().map(|(_, f)| f.clone()).collect();
        for listener in listeners {
            listener(change);
        }
    }
}

/// Callbacks that may rewrite or cancel a change before it is applied.
pub(crate) struct Interceptors<C> {
    entries: Entries<dyn Fn(C) -> Option<C>>,
    next_id: Cell<u64>,
}

impl<C: 'static> Interceptors<C> {
    pub fn new() -> Self {
        Self {
            entries: Rc::new(RefCell::new(Vec::new())),
            next_id: Cell::new(0),
        }
    }

    pub fn add(&self, interceptor: impl Fn(C) -> Option<C> + 'static) -> Disposer {
        register(
            &self.entries,
            &self.next_id,
            Rc::new(interceptor) as Rc<dyn Fn(C) -> Option<C>>,
        )
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Pass `change` through every interceptor. `None` cancels the change.
    pub fn intercept(&self, change: C) -> Option<C> {
        let interceptors: Vec<_> = self.entries.borrow().iter().map(|(_, f)| f.clone()).collect();
        interceptors
            .into_iter()
            .try_fold(change, |change, interceptor| interceptor(change))
    }
}

/// Handle returned by `observe`, `intercept` and friends.
///
/// Dropping a disposer does not unregister anything; call
/// [`dispose`](Disposer::dispose).
#[must_use = "dropping a Disposer keeps the registration alive"]
pub struct Disposer {
    dispose: Option<Box<dyn FnOnce()>>,
}

impl Disposer {
    pub(crate) fn new(dispose: impl FnOnce() + 'static) -> Self {
        Self {
            dispose: Some(Box::new(dispose)),
        }
    }

    pub fn dispose(mut self) {
        if let Some(dispose) = self.dispose.take() {
            dispose();
        }
    }
}

impl fmt::Debug for Disposer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposer")
            .field("disposed", &self.dispose.is_none())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listeners_are_notified_until_disposed() {
        let listeners = Listeners::<i32>::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let sink = seen.clone();
        let disposer = listeners.add(move |change| sink.borrow_mut().push(*change));

        listeners.notify(&1);
        disposer.dispose();
        listeners.notify(&2);

        assert_eq!(*seen.borrow(), vec![1]);
        assert!(listeners.is_empty());
    }

    #[test]
    fn interceptors_chain_and_cancel() {
        let interceptors = Interceptors::<i32>::new();
        let _double = interceptors.add(|change| Some(change * 2));
        let _drop_large = interceptors.add(|change| (change < 10).then_some(change));

        assert_eq!(interceptors.intercept(2), Some(4));
        assert_eq!(interceptors.intercept(6), None);
    }

    #[test]
    fn disposing_after_the_owner_is_gone_is_a_no_op() {
        let listeners = Listeners::<i32>::new();
        let disposer = listeners.add(|_| {});
        drop(listeners);
        disposer.dispose();
    }
}
