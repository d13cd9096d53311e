//! Work-stealing queues.
//!
//! - [`injector`]: the global queue fed by spawns, task wake-ups and
//!   continuations handed over by [`Scheduler`](crate::Scheduler) callers.
//! - [`queue`]: per-worker local queues, popped LIFO by their owner and
//!   stolen FIFO by everyone else.

pub(crate) mod injector;
pub(crate) mod queue;

use crate::runtime::task::Runnable;

use std::sync::Arc;
use std::task::Waker;

/// A unit of work for a worker thread.
pub(crate) enum Job {
    /// Poll a spawned task.
    Task(Arc<dyn Runnable>),
    /// Run a continuation submitted through the scheduler.
    Wake(Waker),
}

impl Job {
    pub(crate) fn run(self) {
        match self {
            Job::Task(task) => task.run(),
            Job::Wake(waker) => waker.wake(),
        }
    }
}
