use super::state::LockState;

/// Errors surfaced by the mutex.
///
/// `Timeout` and `Canceled` are ordinary outcomes: acquisition reports them
/// through the token's status and they only become errors through
/// [`LockToken::into_result`](super::LockToken::into_result). The other two
/// variants are caller contract violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MutexError {
    /// The lock was not granted within the configured timeout.
    #[error("timed out waiting for the mutex")]
    Timeout,

    /// The wait was canceled before the lock was granted.
    #[error("mutex acquisition canceled")]
    Canceled,

    /// A release named a word that does not own the mutex.
    ///
    /// Happens when a token is released twice, or when a raw word taken from
    /// a token is released after its owner already gave the lock back.
    #[error("invalid lock holder: released {expected} but the mutex is {actual}")]
    InvalidLockHolder {
        expected: LockState,
        actual: LockState,
    },

    /// A waiter was handed a second continuation.
    #[error("a continuation is already registered for this waiter")]
    MultipleContinuations,
}
