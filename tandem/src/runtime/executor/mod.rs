//! Task executor.
//!
//! - [`core`]: worker thread lifecycle and shutdown,
//! - [`worker`]: the per-thread work-stealing loop.

pub(crate) mod core;
pub(crate) mod worker;
