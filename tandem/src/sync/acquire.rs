use super::cancel::CancelRegistration;
use super::core::Core;
use super::error::MutexError;
use super::state::LockState;
use super::token::LockToken;
use super::waiter::{Handoff, OneShotWaiter, SlotTicket, WaiterSlab};

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

/// Future returned by [`Mutex::try_acquire_async`](super::Mutex::try_acquire_async).
///
/// Resolves to a [`LockToken`] whose status tells whether the lock was
/// granted, timed out or canceled. Dropping the future while it waits
/// withdraws from the queue; if the lock was granted in the meantime it is
/// released on the spot.
#[must_use = "futures do nothing unless polled"]
pub struct Acquire {
    inner: Inner,
}

enum Inner {
    Ready(LockToken),
    Waiting {
        core: Arc<Core>,
        handle: WaitHandle,
        _registration: Option<CancelRegistration>,
    },
    Done,
}

/// The waiter an [`Acquire`] is parked on.
pub(crate) enum WaitHandle {
    OneShot(Arc<OneShotWaiter>),
    Slot {
        slab: Arc<WaiterSlab>,
        ticket: SlotTicket,
    },
}

impl WaitHandle {
    fn result(&self) -> LockState {
        match self {
            WaitHandle::OneShot(waiter) => waiter.result(),
            WaitHandle::Slot { slab, ticket } => slab.result(*ticket),
        }
    }

    fn register(&self, waker: &Waker) -> Result<(), MutexError> {
        match self {
            WaitHandle::OneShot(waiter) => {
                waiter.register(waker);
                Ok(())
            }
            WaitHandle::Slot { slab, ticket } => slab.register(*ticket, waker),
        }
    }

    /// Resolves the waiter as canceled; `false` if it already resolved.
    pub(crate) fn cancel(&self) -> bool {
        match self {
            WaitHandle::OneShot(waiter) => waiter.cancel(),
            WaitHandle::Slot { slab, ticket } => slab.cancel(*ticket),
        }
    }

    pub(crate) fn cancel_hook(&self) -> Waker {
        match self {
            WaitHandle::OneShot(waiter) => Waker::from(waiter.clone()),
            WaitHandle::Slot { slab, ticket } => slab.cancel_hook(*ticket),
        }
    }

    /// Returns a slab slot to its pool. The waiter must be resolved.
    fn finish(self) {
        if let WaitHandle::Slot { slab, ticket } = self {
            slab.give_back(ticket);
        }
    }

    /// Drops a waiter that was never queued.
    pub(crate) fn abandon(self) {
        self.cancel();
        self.finish();
    }
}

impl Acquire {
    pub(crate) fn ready(token: LockToken) -> Self {
        Self {
            inner: Inner::Ready(token),
        }
    }

    pub(crate) fn waiting(
        core: Arc<Core>,
        handle: WaitHandle,
        registration: Option<CancelRegistration>,
    ) -> Self {
        Self {
            inner: Inner::Waiting {
                core,
                handle,
                _registration: registration,
            },
        }
    }

    /// Returns `true` if the outcome is already known without polling.
    pub fn is_ready(&self) -> bool {
        match &self.inner {
            Inner::Ready(_) => true,
            Inner::Waiting { handle, .. } => handle.result().is_terminal(),
            Inner::Done => false,
        }
    }

    fn complete(&mut self) -> LockToken {
        match std::mem::replace(&mut self.inner, Inner::Done) {
            Inner::Ready(token) => token,
            Inner::Waiting { core, handle, .. } => {
                let outcome = handle.result();
                handle.finish();
                LockToken::new(core, outcome)
            }
            Inner::Done => panic!("{}", MutexError::MultipleContinuations),
        }
    }
}

impl Future for Acquire {
    type Output = LockToken;

    /// Polls for the outcome.
    ///
    /// The waker is registered before the outcome is checked again, so a
    /// resolution racing with this poll is never missed.
    ///
    /// # Panics
    ///
    /// Panics if polled again after returning `Poll::Ready`.
    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<LockToken> {
        let this = self.get_mut();

        let Inner::Waiting { handle, .. } = &this.inner else {
            return Poll::Ready(this.complete());
        };

        if handle.result().is_terminal() {
            return Poll::Ready(this.complete());
        }

        if let Err(err) = handle.register(cx.waker()) {
            panic!("{err}");
        }

        if handle.result().is_terminal() {
            return Poll::Ready(this.complete());
        }

        Poll::Pending
    }
}

impl Drop for Acquire {
    fn drop(&mut self) {
        let Inner::Waiting { core, handle, .. } = std::mem::replace(&mut self.inner, Inner::Done)
        else {
            return;
        };

        if !handle.cancel() {
            let outcome = handle.result();
            if outcome.is_success() {
                tracing::trace!("lock granted to a dropped waiter, releasing");
                let _ = core.release(outcome, false, Handoff::Schedule);
            }
        }

        handle.finish();
    }
}

impl fmt::Debug for Acquire {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.inner {
            Inner::Ready(token) => token.state(),
            Inner::Waiting { handle, .. } => handle.result(),
            Inner::Done => return f.write_str("Acquire(done)"),
        };
        f.debug_tuple("Acquire").field(&state).finish()
    }
}
