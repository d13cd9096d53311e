//! # Tandem
//!
//! **Tandem** provides a fair mutex that blocking threads and async tasks can
//! share, along with the small runtime it schedules async continuations on.
//!
//! Generic semaphores that serve both styles tend to hijack releasing
//! threads to run unrelated continuations, allocate on every wait, and let
//! newcomers barge past queued waiters. [`sync::Mutex`] avoids all three:
//!
//! - Waiters are served strictly in arrival order, and a release hands the
//!   lock straight to the next waiter.
//! - Async continuations run on a [`Scheduler`], never on the releasing
//!   thread unless both sides opt in to inline hand-off.
//! - Blocking waiters are cached per thread, and async waiters can use
//!   pooled slots, so steady-state waits do not allocate.
//! - One timer per mutex enforces the timeout of every queued async waiter.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tandem::sync::{Mutex, WaitOptions};
//! use std::time::Duration;
//!
//! let mutex = Mutex::new(Duration::from_secs(1));
//!
//! // From a thread:
//! let token = mutex.try_acquire(WaitOptions::empty());
//! assert!(token.is_success());
//! drop(token);
//!
//! // From a task:
//! let token = mutex.try_acquire_async(None, WaitOptions::empty()).await;
//! if token.is_success() {
//!     // critical section
//! }
//! ```
//!
//! ## Modules
//!
//! - [`sync`]: the mutex, its tokens, options and cancellation
//! - [`task`]: spawning tasks on a runtime
//! - [`time`]: `sleep` and the shared timer driver

mod runtime;

pub mod sync;
pub mod time;

pub use runtime::task;
pub use runtime::{Handle, Runtime, RuntimeBuilder, Scheduler, shared};

pub use tandem_macros::test;
