use super::acquire::Acquire;
use super::cancel::CancellationToken;
use super::core::Core;
use super::error::MutexError;
use super::options::WaitOptions;
use super::state::LockState;
use super::token::LockToken;
use super::waiter::Handoff;
use crate::runtime::{Scheduler, SharedScheduler};

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default cap on nested inline hand-offs per thread.
pub const DEFAULT_INLINE_DEPTH: usize = 8;

/// A fair mutex that blocking threads and async tasks can share.
///
/// Waiters are served strictly in arrival order whichever way they wait,
/// and a release hands the lock directly to the next waiter instead of
/// letting newcomers race for it. Every wait is bounded by the timeout the
/// mutex was built with.
///
/// The mutex guards no data of its own. Acquisition yields a
/// [`LockToken`], which either owns the lock or explains why it does not.
///
/// `Mutex` is a cheap handle; clones refer to the same lock.
///
/// # Examples
///
/// ```rust,ignore
/// use tandem::sync::{Mutex, WaitOptions};
/// use std::time::Duration;
///
/// let mutex = Mutex::new(Duration::from_secs(1));
///
/// let token = mutex.try_acquire(WaitOptions::empty());
/// assert!(token.is_success());
/// drop(token);
///
/// let token = mutex.try_acquire_async(None, WaitOptions::empty()).await;
/// assert!(token.is_success());
/// ```
#[derive(Clone)]
pub struct Mutex {
    core: Arc<Core>,
}

impl Mutex {
    /// Creates a mutex whose waits give up after `timeout`.
    ///
    /// A zero timeout never queues: contended acquisitions fail at once.
    /// `Duration::MAX` waits forever. Continuations run on the shared
    /// runtime.
    pub fn new(timeout: Duration) -> Self {
        MutexBuilder::new(timeout).build()
    }

    /// Creates a mutex with a timeout in milliseconds.
    pub fn from_millis(timeout_ms: u64) -> Self {
        Self::new(Duration::from_millis(timeout_ms))
    }

    pub fn builder(timeout: Duration) -> MutexBuilder {
        MutexBuilder::new(timeout)
    }

    /// Acquires the lock, blocking the current thread.
    ///
    /// Returns a token whose status is `Success` if the lock was granted
    /// and `Timeout` otherwise. With [`WaitOptions::NO_DELAY`] a contended
    /// lock fails immediately.
    pub fn try_acquire(&self, options: WaitOptions) -> LockToken {
        self.core.acquire(options)
    }

    /// Acquires the lock without blocking the current thread.
    ///
    /// The returned future resolves to a token that is `Success`,
    /// `Timeout`, or `Canceled` if `cancel` fired first. Dropping the future
    /// withdraws from the queue.
    pub fn try_acquire_async(
        &self,
        cancel: Option<&CancellationToken>,
        options: WaitOptions,
    ) -> Acquire {
        self.core.acquire_async(cancel, options)
    }

    /// Releases a raw word obtained from [`LockToken::into_state`].
    ///
    /// # Errors
    ///
    /// Returns [`MutexError::InvalidLockHolder`] if `state` does not own the
    /// mutex, for instance because it was already released.
    pub fn release(&self, state: LockState) -> Result<(), MutexError> {
        self.core.release(state, true, Handoff::Schedule)
    }

    /// Returns `true` while someone holds the lock.
    pub fn is_locked(&self) -> bool {
        self.core.current().is_success()
    }

    /// Number of queued waiters, including ones that already gave up but
    /// were not yet removed.
    pub fn queued(&self) -> usize {
        self.core.queued()
    }

    pub fn timeout(&self) -> Duration {
        self.core.timeout()
    }
}

impl fmt::Debug for Mutex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.core, f)
    }
}

/// Builder for a [`Mutex`] with a custom scheduler or inline budget.
///
/// # Examples
///
/// ```rust,ignore
/// let mutex = Mutex::builder(Duration::from_millis(500))
///     .scheduler(Arc::new(runtime.handle()))
///     .inline_depth(4)
///     .build();
/// ```
pub struct MutexBuilder {
    timeout: Duration,
    scheduler: Option<Arc<dyn Scheduler>>,
    inline_depth: usize,
}

impl MutexBuilder {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            scheduler: None,
            inline_depth: DEFAULT_INLINE_DEPTH,
        }
    }

    /// Sets the scheduler that runs async continuations.
    ///
    /// Defaults to the process-wide shared runtime, started on first use. A
    /// [`Handle`](crate::Handle) whose runtime has shut down forwards to that
    /// shared runtime as well.
    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Sets how many inline hand-offs may nest on one thread before
    /// continuations go through the scheduler again.
    ///
    /// Zero disables inline hand-off.
    pub fn inline_depth(mut self, depth: usize) -> Self {
        self.inline_depth = depth;
        self
    }

    pub fn build(self) -> Mutex {
        let scheduler = self
            .scheduler
            .unwrap_or_else(|| Arc::new(SharedScheduler));

        Mutex {
            core: Core::new(self.timeout, scheduler, self.inline_depth),
        }
    }
}

impl fmt::Debug for MutexBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutexBuilder")
            .field("timeout", &self.timeout)
            .field("inline_depth", &self.inline_depth)
            .finish_non_exhaustive()
    }
}
