use crate::runtime::context::{WorkerContext, enter_context};
use crate::runtime::executor::worker::Worker;
use crate::runtime::work_stealing::injector::Injector;
use crate::runtime::work_stealing::queue::LocalQueue;

use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Multi-threaded work-stealing executor.
///
/// Owns the worker threads; the injector they share is handed out through
/// [`Handle`](crate::Handle)s.
pub(crate) struct Executor {
    injector: Arc<Injector>,
    handles: Vec<JoinHandle<()>>,
}

impl Executor {
    /// Starts `threads` workers named `{name}-{index}`.
    ///
    /// # Panics
    ///
    /// Panics if a worker thread cannot be spawned.
    pub(crate) fn new(threads: usize, name: &str) -> Self {
        let injector = Arc::new(Injector::new());

        let locals: Arc<Vec<_>> = Arc::new(
            (0..threads)
                .map(|_| Arc::new(LocalQueue::new()))
                .collect(),
        );

        let handles = (0..threads)
            .map(|id| {
                let worker = Worker::new(id, locals.clone(), injector.clone());
                let context = WorkerContext {
                    injector: injector.clone(),
                    locals: locals.clone(),
                    id,
                };

                thread::Builder::new()
                    .name(format!("{name}-{id}"))
                    .spawn(move || enter_context(context, || worker.run()))
                    .unwrap_or_else(|err| panic!("failed to spawn worker thread {id}: {err}"))
            })
            .collect();

        tracing::debug!(threads, name, "executor started");

        Self { injector, handles }
    }

    pub(crate) fn injector(&self) -> &Arc<Injector> {
        &self.injector
    }

    pub(crate) fn shutdown(&self) {
        self.injector.shutdown();
    }

    /// Waits for every worker to exit. Call after [`shutdown`](Self::shutdown).
    ///
    /// A worker cannot join itself; if the runtime is dropped from one of
    /// its own workers, that worker is detached instead.
    pub(crate) fn join(&mut self) {
        let current = thread::current().id();

        for handle in self.handles.drain(..) {
            if handle.thread().id() == current {
                continue;
            }
            let _ = handle.join();
        }
    }
}
