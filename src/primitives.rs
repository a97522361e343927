//! Labelled asynchronous primitives
//!
//! Thin wrappers over tokio building blocks that report their own lifecycle
//! to the trace facade. Each one gets a fresh [`TaskId`], announces itself
//! with a CREATE and a LABEL, and records how it resolved.
//!
//! ```rust
//! use tasktrace::primitives::{named_task, named_wait};
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let (ready, resolver) = named_wait::<u32>("config loaded");
//! let (task, _cancel) = named_task("worker", async move { ready.await });
//!
//! resolver.fulfill(7);
//! assert_eq!(task.await, Some(Some(7)));
//! # });
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::ready;
use pin_project_lite::pin_project;
use tokio::sync::oneshot;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

use crate::global;
use crate::types::{TaskId, TaskKind};

fn announce(kind: TaskKind, label: &str) -> TaskId {
    let id = TaskId::fresh();
    global::note_created(global::current_task(), id, kind);
    global::note_label(id, label);
    id
}

/// Create a labelled one-shot wait point.
///
/// The [`Resolver`] settles it once; awaiting the [`WaitPoint`] yields the
/// value, or `None` if the resolver failed or was dropped.
pub fn named_wait<T>(label: &str) -> (WaitPoint<T>, Resolver<T>) {
    let id = announce(TaskKind::Wait, label);
    let (tx, rx) = oneshot::channel();
    (WaitPoint { id, rx }, Resolver { id, tx })
}

/// Receiving half of [`named_wait`].
#[derive(Debug)]
pub struct WaitPoint<T> {
    id: TaskId,
    rx: oneshot::Receiver<T>,
}

impl<T> WaitPoint<T> {
    pub fn id(&self) -> TaskId {
        self.id
    }
}

impl<T> Future for WaitPoint<T> {
    type Output = Option<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let result = ready!(Pin::new(&mut self.rx).poll(cx));
        global::note_read(self.id);
        Poll::Ready(result.ok())
    }
}

/// Settling half of [`named_wait`].
#[derive(Debug)]
pub struct Resolver<T> {
    id: TaskId,
    tx: oneshot::Sender<T>,
}

impl<T> Resolver<T> {
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Settle successfully with `value`.
    pub fn fulfill(self, value: T) {
        global::note_resolved(self.id, None);
        // The waiter may have given up; the event is still recorded.
        let _ = self.tx.send(value);
    }

    /// Settle with a failure described by `reason`. The waiter sees `None`.
    pub fn fail(self, reason: &dyn fmt::Display) {
        global::note_resolved(self.id, Some(reason));
    }
}

/// Wrap `future` as a labelled task that can be cancelled.
///
/// While the task is polled it is the current task, so events its body
/// records are attributed to it.
pub fn named_task<F: Future>(label: &str, future: F) -> (NamedTask<F>, CancellationToken) {
    let id = announce(TaskKind::Task, label);
    let cancel = CancellationToken::new();
    let task = NamedTask { id, future, cancelled: cancel.clone().cancelled_owned() };
    (task, cancel)
}

pin_project! {
    /// Future returned by [`named_task`].
    ///
    /// Resolves to `Some(output)` when the body completes, or `None` when the
    /// task is cancelled first.
    pub struct NamedTask<F> {
        id: TaskId,
        #[pin]
        future: F,
        #[pin]
        cancelled: WaitForCancellationFutureOwned,
    }
}

impl<F> NamedTask<F> {
    pub fn id(&self) -> TaskId {
        self.id
    }
}

struct Cancelled;

impl fmt::Display for Cancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("task cancelled")
    }
}

impl<F: Future> Future for NamedTask<F> {
    type Output = Option<F::Output>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let id = *this.id;
        let previous = global::current_task();
        global::note_switch(id);

        let result = match this.future.poll(cx) {
            Poll::Ready(output) => {
                global::note_resolved(id, None);
                Poll::Ready(Some(output))
            }
            Poll::Pending => match this.cancelled.poll(cx) {
                Poll::Ready(()) => {
                    global::note_resolved(id, Some(&Cancelled));
                    Poll::Ready(None)
                }
                Poll::Pending => Poll::Pending,
            },
        };

        global::note_switch(previous);
        result
    }
}
