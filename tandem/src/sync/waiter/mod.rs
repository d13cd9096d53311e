//! Waiters: the queued representation of a pending acquisition.
//!
//! Every variant runs the same state machine, `Pending` to one of
//! `Success`, `Canceled` or `Timeout`, guarded by a compare-and-swap on its
//! lock-state word. Whoever wins the swap decides the outcome; everyone
//! else's attempt is a no-op.
//!
//! - [`BlockingWaiter`]: a parked thread, cached per thread.
//! - [`OneShotWaiter`]: a fresh result cell per async wait, carrying the
//!   caller's tracing span into the continuation.
//! - [`WaiterSlab`]: pooled slots for async waits that opt out of context.

mod blocking;
mod oneshot;
mod slab;

pub(crate) use blocking::BlockingWaiter;
pub(crate) use oneshot::OneShotWaiter;
pub(crate) use slab::{SlotTicket, WaiterSlab};

use crate::runtime::Scheduler;
use crate::sync::state::{LockState, Status};

use bitflags::bitflags;

use std::cell::Cell;
use std::sync::Arc;
use std::task::Waker;
use std::time::Instant;

thread_local! {
    /// Depth of inline continuations currently running on this thread.
    static INLINE_DEPTH: Cell<usize> = const { Cell::new(0) };
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct PendingFlags: u8 {
        /// The waiter is resumed through a continuation, not a parked thread.
        const ASYNC = 1 << 0;
        /// The continuation may run on the releasing thread.
        const INLINE = 1 << 1;
    }
}

/// How a granted waiter's continuation is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Handoff {
    /// Always through the scheduler.
    Schedule,
    /// Inline for waiters flagged [`PendingFlags::INLINE`], while fewer than
    /// `budget` inline continuations are nested on this thread.
    Inline { budget: usize },
}

/// A waiter of any kind.
#[derive(Debug, Clone)]
pub(crate) enum Waiter {
    Blocking(Arc<BlockingWaiter>),
    OneShot(Arc<OneShotWaiter>),
    Slot(Arc<WaiterSlab>),
}

/// A queued acquisition attempt. Never modified once queued.
#[derive(Debug)]
pub(crate) struct PendingLock {
    pub(crate) arrival: Instant,
    pub(crate) deadline: Option<Instant>,
    /// Slot index for slab waiters, zero otherwise.
    pub(crate) key: usize,
    /// The unresolved word the waiter must still hold for an offer to land.
    pub(crate) expected: LockState,
    pub(crate) waiter: Waiter,
    pub(crate) flags: PendingFlags,
}

impl PendingLock {
    pub(crate) fn is_async(&self) -> bool {
        self.flags.contains(PendingFlags::ASYNC)
    }

    pub(crate) fn is_expired(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| deadline <= now)
    }

    /// Returns `true` if this record belongs to `waiter`.
    pub(crate) fn is_blocking(&self, waiter: &Arc<BlockingWaiter>) -> bool {
        matches!(&self.waiter, Waiter::Blocking(w) if Arc::ptr_eq(w, waiter))
    }

    /// Offers `outcome` to the waiter.
    ///
    /// Returns `false` if the waiter already resolved some other way, in
    /// which case the caller moves on to the next record.
    pub(crate) fn try_complete(&self, outcome: LockState, handoff: Handoff) -> bool {
        match &self.waiter {
            Waiter::Blocking(waiter) => waiter.try_complete(outcome),
            Waiter::OneShot(waiter) => waiter.try_complete(outcome),
            Waiter::Slot(slab) => {
                let handoff = if self.flags.contains(PendingFlags::INLINE) {
                    handoff
                } else {
                    Handoff::Schedule
                };
                slab.try_complete(self.key, self.expected, outcome, handoff)
            }
        }
    }

    /// Fails the waiter with a timeout.
    pub(crate) fn expire(&self) -> bool {
        self.try_complete(self.expected.with_status(Status::Timeout), Handoff::Schedule)
    }
}

/// Delivers a continuation, inline when the handoff and depth allow it.
pub(crate) fn dispatch(continuation: Waker, scheduler: &dyn Scheduler, handoff: Handoff) {
    let Handoff::Inline { budget } = handoff else {
        scheduler.schedule(continuation);
        return;
    };

    let depth = INLINE_DEPTH.with(Cell::get);
    if depth >= budget {
        tracing::trace!(depth, "inline budget exhausted, scheduling continuation");
        scheduler.schedule(continuation);
        return;
    }

    let _depth = DepthGuard::enter(depth);
    continuation.wake();
}

/// Restores the inline depth when the continuation returns or unwinds.
struct DepthGuard(usize);

impl DepthGuard {
    fn enter(depth: usize) -> Self {
        INLINE_DEPTH.with(|cell| cell.set(depth + 1));
        DepthGuard(depth)
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        INLINE_DEPTH.with(|cell| cell.set(self.0));
    }
}
