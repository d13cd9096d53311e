use super::JoinHandle;
use super::state::{COMPLETED, IDLE, NOTIFIED, QUEUED, RUNNING};
use crate::runtime::context::{CURRENT_LOCALS, CURRENT_WORKER_ID, current_injector};
use crate::runtime::work_stealing::Job;
use crate::runtime::work_stealing::injector::Injector;

use parking_lot::Mutex;

use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll, Wake, Waker};
use std::thread;

/// A task the executor can run without knowing its output type.
pub(crate) trait Runnable: Send + Sync {
    fn run(self: Arc<Self>);
}

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// A spawned future and its lifecycle state.
///
/// The `RUNNING` state gives one worker exclusive use of the future, so
/// its lock is never contended. A panic while polling completes the task
/// with the panic payload, which its [`JoinHandle`] resumes.
pub(crate) struct Task<T> {
    future: Mutex<Option<BoxFuture<T>>>,
    pub(crate) result: Mutex<Option<thread::Result<T>>>,
    pub(crate) state: AtomicUsize,
    injector: Arc<Injector>,
    /// Wakers of `JoinHandle`s awaiting this task.
    pub(crate) waiters: Mutex<Vec<Waker>>,
}

impl<T: Send + 'static> Task<T> {
    pub(crate) fn new<F>(future: F, injector: Arc<Injector>) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        Self {
            future: Mutex::new(Some(Box::pin(future))),
            result: Mutex::new(None),
            state: AtomicUsize::new(QUEUED),
            injector,
            waiters: Mutex::new(Vec::new()),
        }
    }

    /// Polls the future once.
    ///
    /// On `Pending` the task goes back to `IDLE`, or straight back to the
    /// injector if it was woken while running.
    fn poll_once(self: Arc<Self>) {
        let current = self.state.load(Ordering::Acquire);

        if current != QUEUED && current != NOTIFIED {
            return;
        }

        if self
            .state
            .compare_exchange(current, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let waker = Waker::from(self.clone());
        let mut cx = Context::from_waker(&waker);

        let outcome = {
            let mut slot = self.future.lock();
            let Some(future) = slot.as_mut() else {
                return;
            };

            match catch_unwind(AssertUnwindSafe(|| future.as_mut().poll(&mut cx))) {
                Ok(Poll::Pending) => None,
                Ok(Poll::Ready(value)) => Some(Ok(value)),
                Err(panic) => Some(Err(panic)),
            }
        };

        let Some(outcome) = outcome else {
            if self
                .state
                .compare_exchange(RUNNING, IDLE, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                self.state.store(QUEUED, Ordering::Release);
                self.push();
            }
            return;
        };

        if outcome.is_err() {
            tracing::debug!("task panicked");
        }

        // Drop the future before publishing completion.
        self.future.lock().take();
        *self.result.lock() = Some(outcome);
        self.state.store(COMPLETED, Ordering::Release);

        let waiters = std::mem::take(&mut *self.waiters.lock());
        for waiter in waiters {
            waiter.wake();
        }
    }

    /// Reschedules the task.
    ///
    /// An `IDLE` task is queued; a `RUNNING` one is marked `NOTIFIED` so the
    /// worker re-queues it once the current poll returns.
    fn notify(self: &Arc<Self>) {
        loop {
            match self.state.load(Ordering::Acquire) {
                IDLE => {
                    if self
                        .state
                        .compare_exchange(IDLE, QUEUED, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        self.clone().push();
                        return;
                    }
                }
                RUNNING => {
                    if self
                        .state
                        .compare_exchange(RUNNING, NOTIFIED, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        return;
                    }
                }
                _ => return,
            }
        }
    }

    fn push(self: Arc<Self>) {
        let injector = self.injector.clone();
        if injector.push(Job::Task(self)).is_err() {
            tracing::trace!("runtime shut down, task dropped");
        }
    }
}

impl<T: Send + 'static> Runnable for Task<T> {
    fn run(self: Arc<Self>) {
        self.poll_once();
    }
}

impl<T: Send + 'static> Wake for Task<T> {
    fn wake(self: Arc<Self>) {
        self.notify();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.notify();
    }
}

/// Spawns a future onto `injector`'s runtime.
///
/// On one of that runtime's workers the task goes to the worker's local
/// queue first.
pub(crate) fn spawn_on<F, T>(injector: &Arc<Injector>, future: F) -> JoinHandle<T>
where
    T: Send + 'static,
    F: Future<Output = T> + Send + 'static,
{
    let task = Arc::new(Task::new(future, injector.clone()));

    let local = current_injector().is_some_and(|current| Arc::ptr_eq(&current, injector));
    let job = Job::Task(task.clone());

    let job = if local {
        push_local(job)
    } else {
        Some(job)
    };

    if let Some(job) = job {
        if injector.push(job).is_err() {
            tracing::debug!("spawn after shutdown, task dropped");
        }
    }

    JoinHandle { task }
}

/// Pushes onto the current worker's local queue; hands the job back when
/// not on a worker.
fn push_local(job: Job) -> Option<Job> {
    let id = CURRENT_WORKER_ID.with(|cell| *cell.borrow());
    let Some(id) = id else {
        return Some(job);
    };

    CURRENT_LOCALS.with(|cell| match cell.borrow().as_ref() {
        Some(locals) => {
            locals[id].push(job);
            None
        }
        None => Some(job),
    })
}

/// Spawns a future as a new task.
///
/// Inside a runtime the task joins that runtime, favoring the current
/// worker's local queue. Elsewhere it goes to the
/// [`shared`](crate::runtime::shared) runtime.
///
/// # Examples
///
/// ```rust,ignore
/// let handle = tandem::task::spawn(async { 40 + 2 });
/// assert_eq!(handle.await, 42);
/// ```
pub fn spawn<F, T>(future: F) -> JoinHandle<T>
where
    T: Send + 'static,
    F: Future<Output = T> + Send + 'static,
{
    match current_injector() {
        Some(injector) => spawn_on(&injector, future),
        None => crate::runtime::shared().spawn(future),
    }
}
