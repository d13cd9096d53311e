//! A fair mutex shared by blocking threads and async tasks.
//!
//! [`Mutex`] serves both kinds of callers from one FIFO queue. A blocked
//! thread parks on a condition variable; an async task parks at its await
//! point and is resumed through a [`Scheduler`](crate::Scheduler). Neither
//! pays for the other: releasing threads are not hijacked to run unrelated
//! continuations, and steady-state async waits can avoid allocation
//! entirely through [`WaitOptions::DISABLE_CONTEXT`].
//!
//! ## Design notes
//!
//! - Ownership lives in one packed [`LockState`] word, changed only by
//!   compare-and-swap. Every grant mints a new generation, so a stale word
//!   can never release a later owner.
//! - The queue has its own lock, held only for constant-time operations.
//! - All waiters share one timeout, so one timer armed for the queue head
//!   covers every async waiter.
//! - Cancellation and hand-off race on the waiter's own word. Whoever loses
//!   does nothing.

mod acquire;
mod cancel;
mod core;
mod error;
mod mutex;
mod options;
mod spin;
mod state;
mod token;
mod waiter;

pub use acquire::Acquire;
pub use cancel::CancellationToken;
pub use error::MutexError;
pub use mutex::{DEFAULT_INLINE_DEPTH, Mutex, MutexBuilder};
pub use options::WaitOptions;
pub use state::{LockState, Status};
pub use token::LockToken;
