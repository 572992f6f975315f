//! `when`: wait for a condition.
//!
//! [`Runtime::when`] runs an effect once, the first time a predicate holds.
//! [`Runtime::when_async`] exposes the same wait as a future that can time
//! out, be cancelled or be aborted through an [`AbortSignal`].
//!
//! The predicate runs as a tracked reaction with state changes forbidden.
//! Whatever ends the wait disposes that reaction first.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, Sleep};
use tracing::{debug, error};

use super::listeners::Disposer;
use super::reaction::Reaction;
use super::runtime::Runtime;
use crate::error::{Error, Result};

// ----------------------------------------------------------------------
// Abort signals
// ----------------------------------------------------------------------

type AbortCallbacks = RefCell<Vec<(u64, Box<dyn FnOnce()>)>>;

struct SignalInner {
    aborted: Cell<bool>,
    callbacks: AbortCallbacks,
    next_id: Cell<u64>,
}

/// Observes an [`AbortController`].
#[derive(Clone)]
pub struct AbortSignal {
    inner: Rc<SignalInner>,
}

impl AbortSignal {
    pub fn is_aborted(&self) -> bool {
        self.inner.aborted.get()
    }

    /// Run `f` when the controller aborts, or right away if it already did.
    ///
    /// The returned disposer unregisters `f` if it has not run yet.
    pub fn on_abort(&self, f: impl FnOnce() + 'static) -> Disposer {
        if self.is_aborted() {
            f();
            return Disposer::new(|| {});
        }
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        self.inner.callbacks.borrow_mut().push((id, Box::new(f)));

        let weak: Weak<SignalInner> = Rc::downgrade(&self.inner);
        Disposer::new(move || {
            if let Some(inner) = weak.upgrade() {
                let removed = {
                    let mut callbacks = inner.callbacks.borrow_mut();
                    callbacks
                        .iter()
                        .position(|(entry, _)| *entry == id)
                        .map(|index| callbacks.remove(index))
                };
                drop(removed);
            }
        })
    }

    pub(crate) fn pending_callbacks(&self) -> usize {
        self.inner.callbacks.borrow().len()
    }
}

impl fmt::Debug for AbortSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbortSignal")
            .field("aborted", &self.is_aborted())
            .finish()
    }
}

/// Owner side of an [`AbortSignal`].
#[derive(Debug, Clone)]
pub struct AbortController {
    signal: AbortSignal,
}

impl AbortController {
    pub fn new() -> Self {
        Self {
            signal: AbortSignal {
                inner: Rc::new(SignalInner {
                    aborted: Cell::new(false),
                    callbacks: RefCell::new(Vec::new()),
                    next_id: Cell::new(0),
                }),
            },
        }
    }

    pub fn signal(&self) -> AbortSignal {
        self.signal.clone()
    }

    /// Abort. Only the first call runs the registered callbacks.
    pub fn abort(&self) {
        let inner = &self.signal.inner;
        if inner.aborted.replace(true) {
            return;
        }
        let callbacks = std::mem::take(&mut *inner.callbacks.borrow_mut());
        for (_, callback) in callbacks {
            callback();
        }
    }
}

impl Default for AbortController {
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------
// Options
// ----------------------------------------------------------------------

/// Options for [`Runtime::when`] and [`Runtime::when_async`].
#[derive(Default, Clone)]
pub struct WhenOptions {
    pub name: Option<String>,
    /// Give up after this long.
    pub timeout: Option<Duration>,
    /// Receives [`Error::WhenTimeout`] from the callback form. Without it the
    /// timeout is logged.
    pub on_error: Option<Rc<dyn Fn(&Error)>>,
    pub signal: Option<AbortSignal>,
}

impl WhenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn on_error(mut self, on_error: impl Fn(&Error) + 'static) -> Self {
        self.on_error = Some(Rc::new(on_error));
        self
    }

    pub fn signal(mut self, signal: AbortSignal) -> Self {
        self.signal = Some(signal);
        self
    }
}

impl fmt::Debug for WhenOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WhenOptions")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .field("on_error", &self.on_error.is_some())
            .field("signal", &self.signal)
            .finish()
    }
}

/// Build the reaction that evaluates `predicate` and calls `on_true` once.
fn predicate_reaction(
    runtime: &Runtime,
    name: String,
    mut predicate: impl FnMut() -> bool + 'static,
    mut on_true: impl FnMut(&Reaction) + 'static,
) -> Reaction {
    Reaction::new(runtime, name, move |reaction: &Reaction| {
        let mut holds = false;
        reaction.track(|| {
            holds = reaction.runtime().allow_state_changes(false, &mut predicate);
        });
        if holds && !reaction.is_disposed() {
            reaction.dispose();
            on_true(reaction);
        }
    })
}

/// What the callback form of `when` releases once it settles.
#[derive(Default)]
struct WhenCleanup {
    timer: RefCell<Option<JoinHandle<()>>>,
    registration: RefCell<Option<Disposer>>,
}

impl WhenCleanup {
    fn run(&self) {
        if let Some(timer) = self.timer.borrow_mut().take() {
            timer.abort();
        }
        let registration = self.registration.borrow_mut().take();
        if let Some(registration) = registration {
            registration.dispose();
        }
    }
}

/// Start `timer` on the current `LocalSet`.
fn spawn_timer(timer: impl Future<Output = ()> + 'static) -> Result<JoinHandle<()>> {
    let missing = || Error::InvalidConfig("`when` with a timeout needs a Tokio LocalSet".into());
    if tokio::runtime::Handle::try_current().is_err() {
        return Err(missing());
    }
    // Inside a runtime but outside a LocalSet `spawn_local` panics.
    panic::catch_unwind(AssertUnwindSafe(|| tokio::task::spawn_local(timer)))
        .map_err(|_| missing())
}

fn report_when_error(reaction: &Reaction, on_error: Option<&dyn Fn(&Error)>, err: &Error) {
    match on_error {
        Some(on_error) => on_error(err),
        None => error!(error = %err, when = %reaction.name(), "when failed"),
    }
}

impl Runtime {
    /// Run `effect` once, as an action, the first time `predicate` holds.
    ///
    /// Returns the reaction evaluating the predicate; disposing it cancels
    /// the wait.
    ///
    /// The timeout timer is a task on the current Tokio
    /// [`LocalSet`](tokio::task::LocalSet). Outside one, the wait is
    /// disposed before the predicate runs and [`Error::InvalidConfig`] goes
    /// to `on_error`.
    pub fn when(
        &self,
        predicate: impl FnMut() -> bool + 'static,
        effect: impl FnOnce() + 'static,
        options: WhenOptions,
    ) -> Reaction {
        let WhenOptions {
            name,
            timeout,
            on_error,
            signal,
        } = options;
        let name = name.unwrap_or_else(|| self.next_name("When"));
        let settled = Rc::new(WhenCleanup::default());

        let mut effect = Some(effect);
        let on_settle = settled.clone();
        let reaction = predicate_reaction(self, name, predicate, move |reaction| {
            on_settle.run();
            if let Some(effect) = effect.take() {
                reaction.runtime().run_in_action(effect);
            }
        });

        if signal.as_ref().is_some_and(AbortSignal::is_aborted) {
            reaction.dispose();
            return reaction;
        }

        if let Some(timeout) = timeout {
            let expired = reaction.clone();
            let on_expiry = settled.clone();
            let report = on_error.clone();
            let timer = spawn_timer(async move {
                tokio::time::sleep(timeout).await;
                if expired.is_disposed() {
                    return;
                }
                expired.dispose();
                // This task is the timer; release it without aborting itself.
                drop(on_expiry.timer.borrow_mut().take());
                on_expiry.run();
                report_when_error(&expired, report.as_deref(), &Error::WhenTimeout);
            });
            match timer {
                Ok(handle) => *settled.timer.borrow_mut() = Some(handle),
                Err(err) => {
                    reaction.dispose();
                    report_when_error(&reaction, on_error.as_deref(), &err);
                    return reaction;
                }
            }
        }

        if let Some(signal) = &signal {
            let aborted = reaction.clone();
            let on_abort = settled.clone();
            let registration = signal.on_abort(move || {
                debug!(when = %aborted.name(), "aborted");
                aborted.dispose();
                on_abort.run();
            });
            *settled.registration.borrow_mut() = Some(registration);
        }

        reaction.schedule();
        reaction
    }

    /// Wait until `predicate` holds.
    ///
    /// The future resolves to `Ok(())`, or to [`Error::WhenTimeout`],
    /// [`Error::WhenCancelled`] or [`Error::WhenAborted`]. `on_error` is not
    /// used. Dropping the future disposes the underlying reaction.
    pub fn when_async(
        &self,
        predicate: impl FnMut() -> bool + 'static,
        options: WhenOptions,
    ) -> WhenFuture {
        let name = options.name.unwrap_or_else(|| self.next_name("When"));
        let shared = Rc::new(RefCell::new(WhenShared::default()));

        let resolved = shared.clone();
        let reaction = predicate_reaction(self, name, predicate, move |_| {
            settle(&resolved, Ok(()));
        });

        if let Some(signal) = &options.signal {
            let aborted = reaction.clone();
            let rejected = shared.clone();
            let registration = signal.on_abort(move || {
                aborted.dispose();
                settle(&rejected, Err(Error::WhenAborted));
            });
            // Settled already when the signal was aborted before the call.
            if shared.borrow().settled {
                registration.dispose();
            } else {
                shared.borrow_mut().registration = Some(registration);
            }
        }
        if !reaction.is_disposed() {
            reaction.schedule();
        }

        WhenFuture {
            reaction,
            shared,
            deadline: options.timeout.map(|timeout| Instant::now() + timeout),
            sleep: None,
        }
    }
}

// ----------------------------------------------------------------------
// WhenFuture
// ----------------------------------------------------------------------

#[derive(Default)]
struct WhenShared {
    outcome: Option<Result<()>>,
    waker: Option<Waker>,
    settled: bool,
    /// Abort callback, released once the wait settles.
    registration: Option<Disposer>,
}

/// Record the first outcome and wake the waiting task.
fn settle(shared: &RefCell<WhenShared>, outcome: Result<()>) {
    let (waker, registration) = {
        let mut shared = shared.borrow_mut();
        if shared.settled {
            return;
        }
        shared.settled = true;
        shared.outcome = Some(outcome);
        (shared.waker.take(), shared.registration.take())
    };
    if let Some(registration) = registration {
        registration.dispose();
    }
    if let Some(waker) = waker {
        waker.wake();
    }
}

/// Future returned by [`Runtime::when_async`].
#[must_use = "futures do nothing unless polled"]
pub struct WhenFuture {
    reaction: Reaction,
    shared: Rc<RefCell<WhenShared>>,
    deadline: Option<Instant>,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl WhenFuture {
    /// A handle that cancels this wait from elsewhere.
    pub fn canceller(&self) -> WhenCanceller {
        WhenCanceller {
            reaction: self.reaction.clone(),
            shared: self.shared.clone(),
        }
    }

    pub fn cancel(&self) {
        self.canceller().cancel();
    }

    pub fn reaction(&self) -> &Reaction {
        &self.reaction
    }
}

impl Future for WhenFuture {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Some(outcome) = this.shared.borrow_mut().outcome.take() {
            return Poll::Ready(outcome);
        }

        if let Some(deadline) = this.deadline {
            let sleep = this
                .sleep
                .get_or_insert_with(|| Box::pin(tokio::time::sleep_until(deadline)));
            if sleep.as_mut().poll(cx).is_ready() {
                this.reaction.dispose();
                settle(&this.shared, Err(Error::WhenTimeout));
                let outcome = this.shared.borrow_mut().outcome.take();
                return Poll::Ready(outcome.unwrap_or(Err(Error::WhenTimeout)));
            }
        }

        this.shared.borrow_mut().waker = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl Drop for WhenFuture {
    fn drop(&mut self) {
        self.reaction.dispose();
        let registration = self.shared.borrow_mut().registration.take();
        if let Some(registration) = registration {
            registration.dispose();
        }
    }
}

impl fmt::Debug for WhenFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WhenFuture")
            .field("reaction", &self.reaction)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

/// Cancels a [`WhenFuture`] with [`Error::WhenCancelled`].
#[derive(Clone)]
pub struct WhenCanceller {
    reaction: Reaction,
    shared: Rc<RefCell<WhenShared>>,
}

impl WhenCanceller {
    pub fn cancel(&self) {
        self.reaction.dispose();
        settle(&self.shared, Err(Error::WhenCancelled));
    }
}

impl fmt::Debug for WhenCanceller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WhenCanceller")
            .field("reaction", &self.reaction)
            .finish()
    }
}
