use super::Scheduler;
use super::executor::core::Executor;
use super::task::{JoinHandle, spawn_on};
use super::work_stealing::Job;
use super::work_stealing::injector::Injector;

use std::fmt;
use std::future::Future;
use std::pin::pin;
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};
use std::thread::{self, Thread};

/// A multi-threaded work-stealing runtime.
///
/// Runs spawned tasks and, as a [`Scheduler`], continuations handed over
/// by the mutex. Dropping the runtime stops its workers; jobs still queued
/// are dropped.
pub struct Runtime {
    executor: Executor,
    handle: Handle,
}

impl Runtime {
    pub(crate) fn new(worker_threads: usize, thread_name: &str) -> Self {
        let executor = Executor::new(worker_threads, thread_name);
        let handle = Handle {
            injector: executor.injector().clone(),
        };

        Self { executor, handle }
    }

    /// Spawns a future onto the runtime.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let handle = runtime.spawn(async { 42 });
    /// ```
    pub fn spawn<F, T>(&self, future: F) -> JoinHandle<T>
    where
        T: Send + 'static,
        F: Future<Output = T> + Send + 'static,
    {
        self.handle.spawn(future)
    }

    /// Runs a future to completion on the runtime, blocking the current
    /// thread until it finishes.
    ///
    /// Must not be called from one of this runtime's own workers.
    ///
    /// # Panics
    ///
    /// Resumes the future's panic if it panicked.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let result = runtime.block_on(async { 42 });
    /// assert_eq!(result, 42);
    /// ```
    pub fn block_on<F>(&self, future: F) -> F::Output
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let handle = self.spawn(future);
        park_on(handle)
    }

    /// Returns a cloneable handle to this runtime.
    pub fn handle(&self) -> Handle {
        self.handle.clone()
    }
}

impl Scheduler for Runtime {
    fn schedule(&self, continuation: Waker) {
        self.handle.schedule(continuation);
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.executor.shutdown();
        self.executor.join();
        tracing::debug!("runtime shut down");
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime").finish_non_exhaustive()
    }
}

/// A cheap, cloneable reference to a [`Runtime`].
///
/// Outlives the runtime safely: once the runtime is gone, spawned tasks
/// are dropped and scheduled continuations go to the [`shared`] runtime.
///
/// [`shared`]: super::shared
#[derive(Clone)]
pub struct Handle {
    injector: Arc<Injector>,
}

impl Handle {
    pub fn spawn<F, T>(&self, future: F) -> JoinHandle<T>
    where
        T: Send + 'static,
        F: Future<Output = T> + Send + 'static,
    {
        spawn_on(&self.injector, future)
    }
}

impl Scheduler for Handle {
    fn schedule(&self, continuation: Waker) {
        if let Err(Job::Wake(continuation)) = self.injector.push(Job::Wake(continuation)) {
            tracing::debug!("runtime shut down, forwarding continuation to the shared runtime");
            super::shared().schedule(continuation);
        }
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("shutdown", &self.injector.is_shutdown())
            .finish()
    }
}

/// Blocks the current thread until `future` completes.
fn park_on<F: Future>(future: F) -> F::Output {
    let waker = Waker::from(Arc::new(Unpark(thread::current())));
    let mut cx = Context::from_waker(&waker);
    let mut future = pin!(future);

    loop {
        if let Poll::Ready(output) = future.as_mut().poll(&mut cx) {
            return output;
        }
        thread::park();
    }
}

struct Unpark(Thread);

impl Wake for Unpark {
    fn wake(self: Arc<Self>) {
        self.0.unpark();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.0.unpark();
    }
}
