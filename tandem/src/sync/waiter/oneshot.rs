use super::{Handoff, dispatch};
use crate::runtime::Scheduler;
use crate::sync::state::{AtomicLockState, LockState, Status};

use parking_lot::Mutex;
use tracing::Span;

use std::fmt;
use std::sync::Arc;
use std::task::{Wake, Waker};

/// A single-use async waiter.
///
/// The result cell is assigned exactly once. The continuation always goes
/// through the scheduler, and runs inside the span that was current when
/// the wait started.
pub(crate) struct OneShotWaiter {
    state: AtomicLockState,
    continuation: Mutex<Option<Waker>>,
    span: Span,
    scheduler: Arc<dyn Scheduler>,
}

impl OneShotWaiter {
    pub(crate) fn new(scheduler: Arc<dyn Scheduler>) -> Arc<Self> {
        Arc::new(Self {
            state: AtomicLockState::new(LockState::PENDING),
            continuation: Mutex::new(None),
            span: Span::current(),
            scheduler,
        })
    }

    pub(crate) fn result(&self) -> LockState {
        self.state.load()
    }

    /// Stores the task's waker, replacing any earlier one from the same task.
    pub(crate) fn register(&self, waker: &Waker) {
        let mut continuation = self.continuation.lock();
        match continuation.as_ref() {
            Some(current) if current.will_wake(waker) => {}
            _ => *continuation = Some(waker.clone()),
        }
    }

    pub(crate) fn try_complete(&self, outcome: LockState) -> bool {
        if !self.state.try_resolve(LockState::PENDING, outcome) {
            return false;
        }

        let continuation = self.continuation.lock().take();
        if let Some(waker) = continuation {
            let waker = if self.span.is_none() {
                waker
            } else {
                Waker::from(Arc::new(InSpan {
                    waker,
                    span: self.span.clone(),
                }))
            };
            dispatch(waker, &*self.scheduler, Handoff::Schedule);
        }

        true
    }

    /// Resolves the waiter as canceled. Returns `false` if it already
    /// resolved.
    pub(crate) fn cancel(&self) -> bool {
        self.try_complete(LockState::PENDING.with_status(Status::Canceled))
    }
}

/// Cancellation hook: waking the waiter cancels it.
impl Wake for OneShotWaiter {
    fn wake(self: Arc<Self>) {
        self.cancel();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.cancel();
    }
}

impl fmt::Debug for OneShotWaiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OneShotWaiter")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Wakes the wrapped waker inside the captured span.
struct InSpan {
    waker: Waker,
    span: Span,
}

impl Wake for InSpan {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        let _entered = self.span.enter();
        self.waker.wake_by_ref();
    }
}
