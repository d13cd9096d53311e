use crate::runtime::work_stealing::injector::Injector;
use crate::runtime::work_stealing::queue::LocalQueue;

use std::cell::RefCell;
use std::sync::Arc;

thread_local! {
    /// Injector of the runtime that owns the current thread, if any.
    ///
    /// Lets [`spawn`](crate::task::spawn) find its runtime without a
    /// handle being passed around.
    pub(crate) static CURRENT_INJECTOR: RefCell<Option<Arc<Injector>>> =
        const { RefCell::new(None) };

    /// Index of the current worker thread.
    pub(crate) static CURRENT_WORKER_ID: RefCell<Option<usize>> =
        const { RefCell::new(None) };

    /// Local queues of every worker of the current runtime.
    pub(crate) static CURRENT_LOCALS: RefCell<Option<Arc<Vec<Arc<LocalQueue>>>>> =
        const { RefCell::new(None) };
}

/// Context installed on a worker thread.
pub(crate) struct WorkerContext {
    pub(crate) injector: Arc<Injector>,
    pub(crate) locals: Arc<Vec<Arc<LocalQueue>>>,
    pub(crate) id: usize,
}

/// Runs `f` with the worker's context installed, restoring the previous
/// context afterwards.
pub(crate) fn enter_context<R>(context: WorkerContext, f: impl FnOnce() -> R) -> R {
    let prev_injector = CURRENT_INJECTOR.with(|cell| cell.replace(Some(context.injector)));
    let prev_locals = CURRENT_LOCALS.with(|cell| cell.replace(Some(context.locals)));
    let prev_id = CURRENT_WORKER_ID.with(|cell| cell.replace(Some(context.id)));

    let out = f();

    CURRENT_WORKER_ID.with(|cell| cell.replace(prev_id));
    CURRENT_LOCALS.with(|cell| cell.replace(prev_locals));
    CURRENT_INJECTOR.with(|cell| cell.replace(prev_injector));

    out
}

/// Returns the current thread's injector, if it belongs to a runtime.
pub(crate) fn current_injector() -> Option<Arc<Injector>> {
    CURRENT_INJECTOR.with(|cell| cell.borrow().clone())
}
