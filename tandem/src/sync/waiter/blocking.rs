use crate::sync::state::{AtomicLockState, LockState};

use parking_lot::{Condvar, Mutex};

use std::cell::RefCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

thread_local! {
    /// The calling thread's reusable blocking waiter.
    ///
    /// A thread blocks on at most one mutex at a time, so a single cached
    /// waiter serves every mutex the thread touches.
    static CACHED: RefCell<Option<Arc<BlockingWaiter>>> = const { RefCell::new(None) };
}

/// A waiter for a thread that parks until the lock is handed to it.
///
/// The resolved word lives in an atomic cell; the mutex and condition
/// variable are only used to sleep and to deliver the wake-up.
#[derive(Debug)]
pub(crate) struct BlockingWaiter {
    state: AtomicLockState,
    lock: Mutex<()>,
    condvar: Condvar,
    tainted: AtomicBool,
}

impl BlockingWaiter {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            state: AtomicLockState::new(LockState::PENDING),
            lock: Mutex::new(()),
            condvar: Condvar::new(),
            tainted: AtomicBool::new(false),
        })
    }

    /// Takes the thread's cached waiter, or creates one, reset to pending.
    pub(crate) fn checkout() -> Arc<Self> {
        let waiter = CACHED
            .with(|cached| cached.borrow_mut().take())
            .unwrap_or_else(Self::new);

        waiter.state.store(LockState::PENDING);
        waiter
    }

    /// Returns the waiter to the thread cache unless it is tainted.
    pub(crate) fn checkin(waiter: Arc<Self>) {
        if waiter.is_tainted() {
            tracing::debug!("discarding tainted blocking waiter");
            return;
        }

        CACHED.with(|cached| *cached.borrow_mut() = Some(waiter));
    }

    pub(crate) fn result(&self) -> LockState {
        self.state.load()
    }

    /// Resolves the waiter and wakes its thread. Returns `false` if the
    /// waiter was already resolved.
    pub(crate) fn try_complete(&self, outcome: LockState) -> bool {
        if !self.state.try_resolve(LockState::PENDING, outcome) {
            return false;
        }

        // Taking the lock orders the notification after the waiter's
        // check-then-sleep.
        let _guard = self.lock.lock();
        self.condvar.notify_one();

        true
    }

    /// Resolves the waiter from its own thread, without notifying.
    pub(crate) fn try_resolve_self(&self, outcome: LockState) -> bool {
        self.state.try_resolve(LockState::PENDING, outcome)
    }

    /// Parks until the waiter is resolved or `deadline` passes.
    ///
    /// Returns the current word, which is still pending on timeout.
    pub(crate) fn wait(&self, deadline: Option<Instant>) -> LockState {
        let mut guard = self.lock.lock();

        loop {
            let state = self.state.load();
            if state.is_terminal() {
                return state;
            }

            match deadline {
                Some(deadline) => {
                    if self.condvar.wait_until(&mut guard, deadline).timed_out() {
                        return self.state.load();
                    }
                }
                None => self.condvar.wait(&mut guard),
            }
        }
    }

    /// Marks the waiter as unsafe to reuse.
    ///
    /// Set when the waiter gave up but could not find its own record in the
    /// queue: someone else popped it and may still be holding on to it.
    pub(crate) fn taint(&self) {
        self.tainted.store(true, Ordering::Release);
    }

    pub(crate) fn is_tainted(&self) -> bool {
        self.tainted.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::state::Status;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn checkout_reuses_clean_waiters() {
        let first = BlockingWaiter::checkout();
        let ptr = Arc::as_ptr(&first);
        first.try_resolve_self(LockState::PENDING.with_status(Status::Timeout));
        BlockingWaiter::checkin(first);

        let second = BlockingWaiter::checkout();
        assert_eq!(Arc::as_ptr(&second), ptr);
        assert_eq!(second.result(), LockState::PENDING);
    }

    #[test]
    fn tainted_waiters_are_discarded() {
        let first = BlockingWaiter::checkout();
        let ptr = Arc::as_ptr(&first);
        let keep_alive = first.clone();
        first.taint();
        BlockingWaiter::checkin(first);

        let second = BlockingWaiter::checkout();
        assert_ne!(Arc::as_ptr(&second), ptr);
        assert!(!second.is_tainted());
        drop(keep_alive);
    }

    #[test]
    fn wait_returns_granted_word() {
        let waiter = BlockingWaiter::checkout();
        let granted = LockState::PENDING.next_success();

        let remote = waiter.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            assert!(remote.try_complete(granted));
        });

        let deadline = Instant::now() + Duration::from_secs(5);
        assert_eq!(waiter.wait(Some(deadline)), granted);
        handle.join().unwrap();
    }

    #[test]
    fn wait_times_out_pending() {
        let waiter = BlockingWaiter::checkout();
        let deadline = Instant::now() + Duration::from_millis(10);

        assert_eq!(waiter.wait(Some(deadline)).status(), Status::Pending);
    }
}
