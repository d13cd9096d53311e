use super::Task;
use super::state::COMPLETED;

use std::fmt;
use std::future::Future;
use std::panic;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::task::{Context, Poll};

/// A handle to a spawned task; awaiting it yields the task's output.
///
/// Dropping the handle detaches the task, which keeps running.
pub struct JoinHandle<T> {
    pub(crate) task: Arc<Task<T>>,
}

impl<T> JoinHandle<T> {
    /// Returns `true` once the task has finished.
    pub fn is_finished(&self) -> bool {
        self.task.state.load(Ordering::Acquire) == COMPLETED
    }

    fn take_output(&self) -> T {
        match self.task.result.lock().take() {
            Some(Ok(value)) => value,
            Some(Err(payload)) => panic::resume_unwind(payload),
            None => panic!("JoinHandle polled after completion"),
        }
    }
}

impl<T> Future for JoinHandle<T> {
    type Output = T;

    /// Resolves to the task's output.
    ///
    /// The waker is registered before the state is checked again, so a
    /// completion in between is not missed.
    ///
    /// # Panics
    ///
    /// Resumes the task's panic if it panicked.
    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        if self.is_finished() {
            return Poll::Ready(self.take_output());
        }

        self.task.waiters.lock().push(cx.waker().clone());

        if self.is_finished() {
            return Poll::Ready(self.take_output());
        }

        Poll::Pending
    }
}

impl<T> fmt::Debug for JoinHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinHandle")
            .field("finished", &self.is_finished())
            .finish()
    }
}
