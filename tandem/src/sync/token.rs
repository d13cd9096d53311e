use super::core::Core;
use super::error::MutexError;
use super::state::{LockState, Status};
use super::waiter::Handoff;

use std::fmt;
use std::sync::Arc;

/// The outcome of an acquisition attempt, and the right to release.
///
/// A token always carries a [`LockState`]. If its status is
/// [`Status::Success`] the token owns the lock and releases it when
/// dropped; otherwise it is inert and dropping it does nothing.
///
/// Tokens cannot be cloned, so a lock cannot be released twice through
/// them. [`into_state`](Self::into_state) hands the raw word out for
/// callers that manage release themselves through
/// [`Mutex::release`](super::Mutex::release).
///
/// # Panics
///
/// Dropping a successful token whose word no longer matches the mutex
/// panics, since it means the lock was released behind the token's back.
/// During unwinding the mismatch is logged instead.
#[must_use = "dropping a successful token releases the lock immediately"]
pub struct LockToken {
    core: Arc<Core>,
    state: LockState,
}

impl LockToken {
    pub(crate) fn new(core: Arc<Core>, state: LockState) -> Self {
        Self { core, state }
    }

    /// Returns `true` if this token owns the lock.
    pub fn is_success(&self) -> bool {
        self.state.is_success()
    }

    pub fn status(&self) -> Status {
        self.state.status()
    }

    /// Returns the lock-state word this token carries.
    pub fn state(&self) -> LockState {
        self.state
    }

    /// Releases the lock, handing it to the next waiter through the
    /// scheduler.
    ///
    /// A token that does not own the lock releases nothing and returns
    /// `Ok(())`.
    pub fn release(self) -> Result<(), MutexError> {
        self.release_with(Handoff::Schedule)
    }

    /// Releases the lock, allowing the next waiter's continuation to run on
    /// this thread.
    ///
    /// Only waiters that asked for [`WaitOptions::ALLOW_INLINE`] are resumed
    /// inline, and only while the inline nesting depth stays under the
    /// mutex's budget. Everyone else goes through the scheduler as usual.
    ///
    /// [`WaitOptions::ALLOW_INLINE`]: super::WaitOptions::ALLOW_INLINE
    pub fn release_inline(self) -> Result<(), MutexError> {
        self.release_with(Handoff::Inline { budget: 0 })
    }

    fn release_with(self, handoff: Handoff) -> Result<(), MutexError> {
        let (core, state) = self.into_parts();

        if !state.is_success() {
            return Ok(());
        }

        core.release(state, true, handoff)
    }

    /// Converts the token into a `Result`.
    ///
    /// A successful token is returned as is; a timed-out or canceled one
    /// becomes the matching error.
    pub fn into_result(self) -> Result<LockToken, MutexError> {
        match self.status() {
            Status::Success => Ok(self),
            Status::Canceled => Err(MutexError::Canceled),
            Status::Timeout | Status::Pending => Err(MutexError::Timeout),
        }
    }

    /// Surrenders the raw word without releasing.
    ///
    /// The lock, if owned, stays held until the word is passed to
    /// [`Mutex::release`](super::Mutex::release).
    pub fn into_state(self) -> LockState {
        self.into_parts().1
    }

    /// Disarms the token; the drop that follows is a no-op.
    fn into_parts(mut self) -> (Arc<Core>, LockState) {
        let state = std::mem::take(&mut self.state);
        (self.core.clone(), state)
    }
}

impl Drop for LockToken {
    fn drop(&mut self) {
        if !self.state.is_success() {
            return;
        }

        if let Err(err) = self.core.release(self.state, true, Handoff::Schedule) {
            if std::thread::panicking() {
                tracing::error!(%err, "lock token dropped during unwinding");
            } else {
                panic!("{err}");
            }
        }
    }
}

impl fmt::Debug for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockToken")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
