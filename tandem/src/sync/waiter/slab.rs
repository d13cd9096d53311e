use super::{Handoff, dispatch};
use crate::runtime::Scheduler;
use crate::sync::error::MutexError;
use crate::sync::state::{AtomicLockState, LockState, Status};

use parking_lot::Mutex;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::task::{Wake, Waker};

/// Number of slots sharing one backing allocation.
pub(crate) const SLAB_SIZE: usize = 32;

/// A fixed pool of reusable async waiter slots.
///
/// All slots live in one allocation and are handed out by index from a
/// stack of free indices. A slot is rented for one wait and given back when
/// the wait's future finishes, so steady-state waits allocate nothing.
///
/// Each rental bumps the slot's round, and the slot's pending word carries
/// that round as its generation. Queue records remember the pending word
/// they were created with, so a stale record left behind by an earlier
/// rental can never resolve the slot's current occupant.
pub(crate) struct WaiterSlab {
    slots: Box<[Slot]>,
    /// Stack of free indices that can be rented.
    free: Mutex<Vec<usize>>,
    scheduler: Arc<dyn Scheduler>,
}

struct Slot {
    state: AtomicLockState,
    /// Rental counter; only moved by `rent`, while the slot is free.
    round: AtomicU32,
    continuation: Mutex<Option<Waker>>,
}

/// Proof of renting one slot for one wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SlotTicket {
    pub(crate) index: usize,
    pub(crate) expected: LockState,
}

impl WaiterSlab {
    pub(crate) fn new(scheduler: Arc<dyn Scheduler>) -> Arc<Self> {
        let slots = (0..SLAB_SIZE)
            .map(|_| Slot {
                state: AtomicLockState::new(LockState::PENDING),
                round: AtomicU32::new(0),
                continuation: Mutex::new(None),
            })
            .collect();
        let free = (0..SLAB_SIZE).rev().collect();

        Arc::new(Self {
            slots,
            free: Mutex::new(free),
            scheduler,
        })
    }

    /// Rents a free slot, or returns `None` if every slot is in use.
    pub(crate) fn rent(&self) -> Option<SlotTicket> {
        let index = self.free.lock().pop()?;
        let slot = &self.slots[index];

        let round = slot.round.load(Ordering::Relaxed).wrapping_add(1);
        slot.round.store(round, Ordering::Relaxed);

        let expected = LockState::new(Status::Pending, round);
        slot.state.store(expected);

        Some(SlotTicket { index, expected })
    }

    /// Gives a slot back once its wait is over.
    ///
    /// The slot must be resolved; any stale record still offering it a
    /// result is rejected by the pending-word check.
    pub(crate) fn give_back(&self, ticket: SlotTicket) {
        let slot = &self.slots[ticket.index];
        debug_assert!(slot.state.load().is_terminal());

        slot.continuation.lock().take();
        self.free.lock().push(ticket.index);
    }

    pub(crate) fn result(&self, ticket: SlotTicket) -> LockState {
        self.slots[ticket.index].state.load()
    }

    /// Stores the task's waker for the slot's current rental.
    pub(crate) fn register(&self, ticket: SlotTicket, waker: &Waker) -> Result<(), MutexError> {
        let slot = &self.slots[ticket.index];
        let round = slot.round.load(Ordering::Relaxed);

        if LockState::new(Status::Pending, round) != ticket.expected {
            return Err(MutexError::MultipleContinuations);
        }

        let mut continuation = slot.continuation.lock();
        match continuation.as_ref() {
            Some(current) if current.will_wake(waker) => {}
            _ => *continuation = Some(waker.clone()),
        }

        Ok(())
    }

    pub(crate) fn try_complete(
        &self,
        index: usize,
        expected: LockState,
        outcome: LockState,
        handoff: Handoff,
    ) -> bool {
        let slot = &self.slots[index];

        if !slot.state.try_resolve(expected, outcome) {
            return false;
        }

        let continuation = slot.continuation.lock().take();
        if let Some(waker) = continuation {
            dispatch(waker, &*self.scheduler, handoff);
        }

        true
    }

    pub(crate) fn cancel(&self, ticket: SlotTicket) -> bool {
        self.try_complete(
            ticket.index,
            ticket.expected,
            ticket.expected.with_status(Status::Canceled),
            Handoff::Schedule,
        )
    }

    /// Builds a cancellation hook for one rental.
    pub(crate) fn cancel_hook(self: &Arc<Self>, ticket: SlotTicket) -> Waker {
        Waker::from(Arc::new(CancelSlot {
            slab: self.clone(),
            ticket,
        }))
    }

    #[cfg(test)]
    pub(crate) fn available(&self) -> usize {
        self.free.lock().len()
    }
}

impl fmt::Debug for WaiterSlab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaiterSlab")
            .field("free", &self.free.lock().len())
            .finish_non_exhaustive()
    }
}

struct CancelSlot {
    slab: Arc<WaiterSlab>,
    ticket: SlotTicket,
}

impl Wake for CancelSlot {
    fn wake(self: Arc<Self>) {
        self.slab.cancel(self.ticket);
    }
}
