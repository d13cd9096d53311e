use super::acquire::{Acquire, WaitHandle};
use super::cancel::CancellationToken;
use super::error::MutexError;
use super::options::WaitOptions;
use super::spin::SpinWait;
use super::state::{AtomicLockState, LockState, Status};
use super::token::LockToken;
use super::waiter::{
    BlockingWaiter, Handoff, OneShotWaiter, PendingFlags, PendingLock, SlotTicket, Waiter,
    WaiterSlab,
};
use crate::runtime::Scheduler;
use crate::time::driver::{self, Timer};

use parking_lot::Mutex;

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Wake, Waker};
use std::time::{Duration, Instant};

/// Shared state behind a [`Mutex`](super::Mutex) handle.
///
/// The lock word is the single source of truth for ownership and is only
/// changed by compare-and-swap. The waiter queue has its own lock, which is
/// held for O(1) queue operations only: never while a thread sleeps and
/// never while a continuation runs.
pub(crate) struct Core {
    state: AtomicLockState,
    queue: Mutex<Queue>,
    /// Shadow of the queue length, readable without the queue lock.
    ///
    /// Only changed under the queue lock. Acquirers bump it before their
    /// last attempt on the lock word and releasers read it after freeing
    /// the word, so one of the two always notices the other.
    queued: AtomicUsize,
    timeout: Duration,
    scheduler: Arc<dyn Scheduler>,
    inline_budget: usize,
    /// Slab that async waits opting out of context rent their slots from.
    slab: Mutex<Arc<WaiterSlab>>,
    /// Wakes [`Core::sweep`]; armed on the timer driver.
    sweeper: Arc<Sweeper>,
}

struct Queue {
    items: VecDeque<PendingLock>,
    /// Async records in `items`. Blocking waiters time themselves out, so
    /// the sweep timer is only needed while this is non-zero.
    async_waiters: usize,
    timer: Option<Timer>,
}

impl Core {
    pub(crate) fn new(
        timeout: Duration,
        scheduler: Arc<dyn Scheduler>,
        inline_budget: usize,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Core>| Self {
            state: AtomicLockState::new(LockState::PENDING),
            queue: Mutex::new(Queue {
                items: VecDeque::new(),
                async_waiters: 0,
                timer: None,
            }),
            queued: AtomicUsize::new(0),
            timeout,
            slab: Mutex::new(WaiterSlab::new(scheduler.clone())),
            scheduler,
            inline_budget,
            sweeper: Arc::new(Sweeper(weak.clone())),
        })
    }

    pub(crate) fn timeout(&self) -> Duration {
        self.timeout
    }

    pub(crate) fn current(&self) -> LockState {
        self.state.load()
    }

    pub(crate) fn queued(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    /// Takes the lock without queuing.
    ///
    /// Spins with backoff for a short while, but never overtakes waiters
    /// that are already queued.
    fn try_acquire_fast(&self, options: WaitOptions) -> Option<LockState> {
        if !options.fast_path_enabled() {
            return None;
        }

        let mut spin = SpinWait::new();
        loop {
            if self.queued.load(Ordering::SeqCst) != 0 {
                return None;
            }

            if let Some(granted) = self.state.try_take() {
                tracing::trace!(generation = granted.generation(), "lock taken on fast path");
                return Some(granted);
            }

            if !spin.spin() {
                return None;
            }
        }
    }

    /// Single attempt on the lock word for callers that will not queue, so
    /// a free mutex is taken even when the fast path is disabled.
    fn try_acquire_once(&self) -> Option<LockState> {
        if self.queued.load(Ordering::SeqCst) != 0 {
            return None;
        }

        self.state.try_take()
    }

    fn deadline_from(&self, arrival: Instant) -> Option<Instant> {
        arrival.checked_add(self.timeout)
    }

    /// Blocking acquisition.
    pub(crate) fn acquire(self: &Arc<Self>, options: WaitOptions) -> LockToken {
        if let Some(granted) = self.try_acquire_fast(options) {
            return LockToken::new(self.clone(), granted);
        }

        if self.timeout.is_zero() || options.contains(WaitOptions::NO_DELAY) {
            let outcome = self
                .try_acquire_once()
                .unwrap_or(LockState::PENDING.with_status(Status::Timeout));
            return LockToken::new(self.clone(), outcome);
        }

        let waiter = BlockingWaiter::checkout();
        let arrival = Instant::now();
        let deadline = self.deadline_from(arrival);

        {
            let mut queue = self.queue.lock();

            if let Some(granted) = self.take_if_idle(&queue) {
                drop(queue);
                BlockingWaiter::checkin(waiter);
                return LockToken::new(self.clone(), granted);
            }

            queue.items.push_back(PendingLock {
                arrival,
                deadline,
                key: 0,
                expected: LockState::PENDING,
                waiter: Waiter::Blocking(waiter.clone()),
                flags: PendingFlags::empty(),
            });
        }

        tracing::trace!(queued = self.queued(), "blocking waiter queued");

        let mut outcome = waiter.wait(deadline);

        if !outcome.is_terminal() {
            let expired = LockState::PENDING.with_status(Status::Timeout);

            if waiter.try_resolve_self(expired) {
                if !self.remove_blocking(&waiter) {
                    waiter.taint();
                }
                tracing::debug!("blocking acquisition timed out");
            }

            outcome = waiter.result();
        }

        BlockingWaiter::checkin(waiter);
        LockToken::new(self.clone(), outcome)
    }

    /// Non-blocking acquisition; the returned future resolves to the token.
    pub(crate) fn acquire_async(
        self: &Arc<Self>,
        cancel: Option<&CancellationToken>,
        options: WaitOptions,
    ) -> Acquire {
        if let Some(granted) = self.try_acquire_fast(options) {
            return Acquire::ready(LockToken::new(self.clone(), granted));
        }

        if self.timeout.is_zero() || options.contains(WaitOptions::NO_DELAY) {
            let outcome = self
                .try_acquire_once()
                .unwrap_or(LockState::PENDING.with_status(Status::Timeout));
            return Acquire::ready(LockToken::new(self.clone(), outcome));
        }

        if cancel.is_some_and(CancellationToken::is_cancelled) {
            let failed = LockState::PENDING.with_status(Status::Canceled);
            return Acquire::ready(LockToken::new(self.clone(), failed));
        }

        let (handle, record) = if options.uses_slab() {
            let (slab, ticket) = self.rent_slot();
            let mut flags = PendingFlags::ASYNC;
            if options.contains(WaitOptions::ALLOW_INLINE) {
                flags |= PendingFlags::INLINE;
            }

            (
                WaitHandle::Slot {
                    slab: slab.clone(),
                    ticket,
                },
                (ticket.index, ticket.expected, Waiter::Slot(slab), flags),
            )
        } else {
            let waiter = OneShotWaiter::new(self.scheduler.clone());
            (
                WaitHandle::OneShot(waiter.clone()),
                (
                    0,
                    LockState::PENDING,
                    Waiter::OneShot(waiter),
                    PendingFlags::ASYNC,
                ),
            )
        };

        let (key, expected, waiter, flags) = record;
        let arrival = Instant::now();

        {
            let mut queue = self.queue.lock();

            if let Some(granted) = self.take_if_idle(&queue) {
                drop(queue);
                handle.abandon();
                return Acquire::ready(LockToken::new(self.clone(), granted));
            }

            queue.items.push_back(PendingLock {
                arrival,
                deadline: self.deadline_from(arrival),
                key,
                expected,
                waiter,
                flags,
            });
            queue.async_waiters += 1;
            self.rearm(&mut queue);
        }

        tracing::trace!(queued = self.queued(), slab = options.uses_slab(), "async waiter queued");

        let registration = match cancel {
            Some(token) => {
                let registration = token.register(handle.cancel_hook());
                if registration.is_none() {
                    handle.cancel();
                }
                registration
            }
            None => None,
        };

        Acquire::waiting(self.clone(), handle, registration)
    }

    /// Counts a new arrival and, if nobody is queued, retries the lock word.
    ///
    /// Must be called with the queue lock held. When it returns `None` the
    /// caller must enqueue its record, which the count already includes.
    fn take_if_idle(&self, queue: &Queue) -> Option<LockState> {
        self.queued.fetch_add(1, Ordering::SeqCst);

        if !queue.items.is_empty() {
            return None;
        }

        let granted = self.state.try_take();
        if granted.is_some() {
            self.queued.fetch_sub(1, Ordering::SeqCst);
        }

        granted
    }

    fn rent_slot(&self) -> (Arc<WaiterSlab>, SlotTicket) {
        let mut slab = self.slab.lock();

        loop {
            if let Some(ticket) = slab.rent() {
                return (slab.clone(), ticket);
            }

            // Slots still rented from the old slab keep it alive until
            // their waits finish.
            tracing::debug!("waiter slab exhausted, starting a new one");
            *slab = WaiterSlab::new(self.scheduler.clone());
        }
    }

    /// Releases `held` and hands the lock to the next waiter, if any.
    ///
    /// With `demand_match` a stale word is reported as
    /// [`MutexError::InvalidLockHolder`]; without it the call is a no-op.
    pub(crate) fn release(
        &self,
        held: LockState,
        demand_match: bool,
        handoff: Handoff,
    ) -> Result<(), MutexError> {
        match self.state.try_release(held) {
            Ok(()) => {
                if self.queued.load(Ordering::SeqCst) != 0 {
                    self.activate_next(handoff);
                }
                Ok(())
            }
            Err(actual) if demand_match => Err(MutexError::InvalidLockHolder {
                expected: held,
                actual,
            }),
            Err(_) => Ok(()),
        }
    }

    /// Mints one `Success` word and offers it to queued waiters in order.
    ///
    /// Offers are made outside the queue lock, so an inline continuation may
    /// release re-entrantly. If every waiter refuses, the word goes back to
    /// free under the queue lock, where no new arrival can slip in between.
    fn activate_next(&self, handoff: Handoff) {
        let handoff = match handoff {
            Handoff::Inline { .. } => Handoff::Inline {
                budget: self.inline_budget,
            },
            Handoff::Schedule => Handoff::Schedule,
        };

        let mut granted = None;

        loop {
            let (item, offer) = {
                let mut queue = self.queue.lock();

                let Some(item) = queue.items.pop_front() else {
                    if let Some(word) = granted {
                        let _ = self.state.try_release(word);
                        tracing::trace!("no waiter accepted the lock, now free");
                    }
                    self.rearm(&mut queue);
                    return;
                };

                let offer = match granted {
                    Some(word) => word,
                    None => match self.state.try_take() {
                        Some(word) => {
                            granted = Some(word);
                            word
                        }
                        None => {
                            // Someone else owns the lock; its release will
                            // come back here.
                            queue.items.push_front(item);
                            return;
                        }
                    },
                };

                self.queued.fetch_sub(1, Ordering::SeqCst);
                if item.is_async() {
                    queue.async_waiters -= 1;
                }
                self.rearm(&mut queue);

                (item, offer)
            };

            if item.try_complete(offer, handoff) {
                tracing::trace!(
                    generation = offer.generation(),
                    waited_us = item.arrival.elapsed().as_micros() as u64,
                    "lock handed off",
                );
                return;
            }
        }
    }

    /// Best-effort removal of a blocking waiter's own record.
    ///
    /// Returns `false` if the record was already popped by someone else.
    fn remove_blocking(&self, waiter: &Arc<BlockingWaiter>) -> bool {
        let mut queue = self.queue.lock();

        let Some(pos) = queue.items.iter().position(|item| item.is_blocking(waiter)) else {
            return false;
        };

        queue.items.remove(pos);
        self.queued.fetch_sub(1, Ordering::SeqCst);
        self.rearm(&mut queue);

        true
    }

    /// Fails every expired record at the head of the queue.
    ///
    /// The timeout is uniform and the queue is FIFO, so deadlines never
    /// decrease along the queue and the first live record ends the sweep.
    fn sweep(&self) {
        let now = Instant::now();
        let mut expired = 0usize;

        loop {
            let item = {
                let mut queue = self.queue.lock();

                if queue.timer.as_ref().is_some_and(|timer| timer.deadline() <= now) {
                    queue.timer = None;
                }

                match queue.items.front() {
                    Some(head) if head.is_expired(now) => {}
                    _ => {
                        self.rearm(&mut queue);
                        break;
                    }
                }

                let Some(item) = queue.items.pop_front() else {
                    break;
                };
                self.queued.fetch_sub(1, Ordering::SeqCst);
                if item.is_async() {
                    queue.async_waiters -= 1;
                }

                item
            };

            if item.expire() {
                expired += 1;
            }
        }

        if expired > 0 {
            tracing::debug!(expired, "timed out queued waiters");
        }
    }

    /// Makes sure a timer is armed no later than the head's deadline while
    /// async waiters are queued.
    ///
    /// An armed timer is kept while it fires no later than the head's
    /// deadline and left to lapse once nothing needs it. Deadlines never
    /// decrease along the queue, so an early fire only costs a sweep that
    /// re-arms.
    fn rearm(&self, queue: &mut Queue) {
        if queue.async_waiters == 0 {
            return;
        }

        let Some(deadline) = queue.items.front().and_then(|head| head.deadline) else {
            return;
        };

        if queue.timer.as_ref().is_some_and(|timer| timer.deadline() <= deadline) {
            return;
        }

        if let Some(timer) = queue.timer.take() {
            timer.cancel();
        }

        tracing::trace!("sweep timer armed");
        let waker = Waker::from(self.sweeper.clone());
        queue.timer = Some(driver::handle().set_timer(deadline, waker));
    }

    #[cfg(test)]
    fn sweep_timers_outstanding(&self) -> usize {
        Arc::strong_count(&self.sweeper) - 1
    }
}

impl Drop for Core {
    fn drop(&mut self) {
        if let Some(timer) = self.queue.get_mut().timer.take() {
            timer.cancel();
        }
    }
}

impl fmt::Debug for Core {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Core")
            .field("state", &self.state)
            .field("queued", &self.queued())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Runs the timeout sweep when the timer fires.
struct Sweeper(Weak<Core>);

impl Wake for Sweeper {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        if let Some(core) = self.0.upgrade() {
            core.sweep();
        }
    }
}
