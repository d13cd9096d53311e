//! Work-stealing runtime and the scheduler seam.
//!
//! The mutex never runs an async waiter's continuation on the releasing
//! thread unless both sides opted in. Everything else is handed to a
//! [`Scheduler`]. Any type implementing the trait can be injected through
//! [`MutexBuilder::scheduler`](crate::sync::MutexBuilder::scheduler); by
//! default continuations go to the process-wide [`shared`] runtime, which
//! is only started the first time something is scheduled on it.
//!
//! The runtime itself is a small work-stealing executor: a global
//! injector, one local queue per worker, and round-robin stealing.

mod core;
mod executor;
mod work_stealing;

pub(crate) mod builder;
pub(crate) mod context;

pub mod task;

pub use self::builder::RuntimeBuilder;
pub use self::core::{Handle, Runtime};

use std::sync::OnceLock;
use std::task::Waker;

/// Runs continuations off the caller's stack.
///
/// `schedule` must arrange for `continuation.wake()` to be called exactly
/// once, later, and not on the calling stack. The mutex assumes nothing
/// else: no ordering between submissions and no particular thread.
///
/// # Examples
///
/// ```rust,ignore
/// struct Spawner;
///
/// impl Scheduler for Spawner {
///     fn schedule(&self, continuation: Waker) {
///         std::thread::spawn(move || continuation.wake());
///     }
/// }
/// ```
pub trait Scheduler: Send + Sync {
    fn schedule(&self, continuation: Waker);
}

static SHARED: OnceLock<Runtime> = OnceLock::new();

/// Returns the process-wide runtime, starting it on first use.
///
/// It uses one worker per logical CPU and lives until the process exits.
pub fn shared() -> &'static Runtime {
    SHARED.get_or_init(|| RuntimeBuilder::new().thread_name("tandem-shared").build())
}

/// Scheduler that forwards to the [`shared`] runtime.
///
/// The runtime is resolved on the first `schedule`, so a mutex only used by
/// blocking threads never starts it.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SharedScheduler;

impl Scheduler for SharedScheduler {
    fn schedule(&self, continuation: Waker) {
        shared().schedule(continuation);
    }
}
