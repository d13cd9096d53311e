//! Time utilities backed by a shared timer driver.
//!
//! One background thread keeps a heap of deadlines and wakes whoever armed
//! them. [`sleep`] uses it directly; the mutex uses it for its single
//! timeout sweep timer per lock.

pub(crate) mod driver;

mod entry;
mod sleep;

#[doc(inline)]
pub use sleep::{Sleep, sleep};
