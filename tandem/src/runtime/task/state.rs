//! Task lifecycle states.
//!
//! `QUEUED -> RUNNING -> IDLE | COMPLETED`, with `NOTIFIED` recording a
//! wake-up that arrived while the task was running.

/// Not scheduled; waiting for a wake-up.
pub(crate) const IDLE: usize = 0;

/// Sitting in a run queue.
pub(crate) const QUEUED: usize = 1;

/// Being polled. At most one worker observes this state at a time.
pub(crate) const RUNNING: usize = 2;

/// The future returned `Ready` or panicked. Terminal.
pub(crate) const COMPLETED: usize = 3;

/// Woken while running; re-queued once the current poll returns.
pub(crate) const NOTIFIED: usize = 4;
