//! Spawned tasks.
//!
//! [`spawn`] puts a future on a runtime and returns a [`JoinHandle`] for its
//! output. Tasks are woken through the standard [`Wake`](std::task::Wake)
//! machinery; the lifecycle states live in `state`.

mod core;
mod handle;
mod state;

pub(crate) use self::core::{Runnable, Task, spawn_on};

pub use self::core::spawn;
pub use handle::JoinHandle;
