//! Asynchronous actions.
//!
//! A [`Flow`] wraps a future so that every resumption runs as its own
//! action: writes made between two `.await` points are committed together,
//! and reactions see the intermediate state while the flow is suspended.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use tracing::debug;

use super::runtime::Runtime;
use crate::error::{Error, Result};

#[derive(Default)]
struct FlowState {
    cancelled: Cell<bool>,
    waker: RefCell<Option<Waker>>,
}

/// Future returned by [`Runtime::flow`].
///
/// Resolves to the wrapped future's output, or to [`Error::FlowCancelled`]
/// once a [`FlowCanceller`] fired. Cancelling drops the wrapped future at
/// its current suspension point.
#[must_use = "futures do nothing unless polled"]
pub struct Flow<F> {
    runtime: Runtime,
    name: String,
    future: Option<Pin<Box<F>>>,
    state: Rc<FlowState>,
}

impl<F: Future> Flow<F> {
    pub fn canceller(&self) -> FlowCanceller {
        FlowCanceller {
            state: self.state.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<F: Future> Future for Flow<F> {
    type Output = Result<F::Output>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if this.state.cancelled.get() {
            if this.future.take().is_some() {
                debug!(flow = %this.name, "cancelled");
            }
            return Poll::Ready(Err(Error::FlowCancelled));
        }
        let Some(future) = this.future.as_mut() else {
            return Poll::Ready(Err(Error::FlowCancelled));
        };

        *this.state.waker.borrow_mut() = Some(cx.waker().clone());
        let poll = this.runtime.run_in_action(|| future.as_mut().poll(cx));
        match poll {
            Poll::Ready(output) => {
                this.future = None;
                Poll::Ready(Ok(output))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<F> fmt::Debug for Flow<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Flow")
            .field("name", &self.name)
            .field("done", &self.future.is_none())
            .field("cancelled", &self.state.cancelled.get())
            .finish()
    }
}

/// Cancels a [`Flow`].
#[derive(Clone)]
pub struct FlowCanceller {
    state: Rc<FlowState>,
}

impl FlowCanceller {
    pub fn cancel(&self) {
        if self.state.cancelled.replace(true) {
            return;
        }
        if let Some(waker) = self.state.waker.borrow_mut().take() {
            waker.wake();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.get()
    }
}

impl fmt::Debug for FlowCanceller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowCanceller")
            .field("cancelled", &self.state.cancelled.get())
            .finish()
    }
}

impl Runtime {
    /// Turn `future` into a flow whose resumptions run as actions.
    pub fn flow<F: Future>(&self, future: F) -> Flow<F> {
        Flow {
            runtime: self.clone(),
            name: self.next_name("Flow"),
            future: Some(Box::pin(future)),
            state: Rc::new(FlowState::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn each_resumption_commits_as_one_action() {
        let runtime = Runtime::new();
        let a = runtime.observable_box(0);
        let b = runtime.observable_box(0);
        let seen = Rc::new(RefCell::new(Vec::new()));

        let (ra, rb, sink) = (a.clone(), b.clone(), seen.clone());
        let _autorun = runtime.autorun(move || sink.borrow_mut().push((ra.get(), rb.get())));

        let (wa, wb) = (a.clone(), b.clone());
        let result = runtime
            .flow(async move {
                wa.set(1);
                wb.set(1);
                tokio::task::yield_now().await;
                wa.set(2);
                wb.set(2);
                "done"
            })
            .await;

        assert_eq!(result, Ok("done"));
        assert_eq!(*seen.borrow(), vec![(0, 0), (1, 1), (2, 2)]);
    }

    #[tokio::test]
    async fn cancelled_flows_stop_at_the_current_await() {
        let runtime = Runtime::new();
        let cell = runtime.observable_box(0);

        let writer = cell.clone();
        let flow = runtime.flow(async move {
            writer.set(1);
            tokio::time::sleep(Duration::from_secs(60)).await;
            writer.set(2);
        });
        let canceller = flow.canceller();
        assert!(flow.name().starts_with("Flow@"));

        let handle = async {
            tokio::task::yield_now().await;
            canceller.cancel();
        };
        let (result, ()) = tokio::join!(flow, handle);

        assert_eq!(result, Err(Error::FlowCancelled));
        assert_eq!(cell.get_untracked(), 1);
    }

    #[tokio::test]
    async fn cancelling_before_the_first_poll() {
        let runtime = Runtime::new();
        let flow = runtime.flow(async { 1 });
        let canceller = flow.canceller();
        canceller.cancel();
        canceller.cancel();

        assert!(canceller.is_cancelled());
        assert_eq!(flow.await, Err(Error::FlowCancelled));
    }
}
