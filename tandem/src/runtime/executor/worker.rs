use crate::runtime::work_stealing::Job;
use crate::runtime::work_stealing::injector::Injector;
use crate::runtime::work_stealing::queue::LocalQueue;

use std::sync::Arc;

/// A worker thread of the executor.
///
/// Looks for work in this order:
/// 1. its own local queue,
/// 2. the global injector,
/// 3. other workers' local queues, round-robin,
///
/// and parks on the injector when all three are empty.
pub(crate) struct Worker {
    id: usize,
    locals: Arc<Vec<Arc<LocalQueue>>>,
    injector: Arc<Injector>,
}

impl Worker {
    pub(crate) fn new(
        id: usize,
        locals: Arc<Vec<Arc<LocalQueue>>>,
        injector: Arc<Injector>,
    ) -> Self {
        Self {
            id,
            locals,
            injector,
        }
    }

    /// Runs jobs until the injector shuts down.
    pub(crate) fn run(&self) {
        tracing::trace!(worker = self.id, "worker started");

        while !self.injector.is_shutdown() {
            if let Some(job) = self.next_job() {
                job.run();
                continue;
            }

            self.injector.park();
        }

        let dropped = self.locals[self.id].clear();
        tracing::trace!(worker = self.id, dropped, "worker stopped");
    }

    fn next_job(&self) -> Option<Job> {
        self.locals[self.id]
            .pop()
            .or_else(|| self.injector.steal())
            .or_else(|| self.try_steal())
    }

    fn try_steal(&self) -> Option<Job> {
        let len = self.locals.len();

        if len <= 1 {
            return None;
        }

        (1..len)
            .map(|offset| (self.id + offset) % len)
            .find_map(|victim| self.locals[victim].steal())
    }
}
