use std::hint::spin_loop;
use std::thread;

/// Number of backoff rounds before giving up on spinning.
const SPIN_LIMIT: u32 = 10;

/// Rounds that busy-wait before switching to yielding the thread.
const BUSY_ROUNDS: u32 = 3;

/// Bounded exponential backoff for the uncontended fast path.
///
/// The first rounds burn a few CPU cycles with a spin hint, later rounds
/// yield to the OS. Once the limit is reached the caller is expected to
/// queue instead.
#[derive(Debug, Default)]
pub(crate) struct SpinWait {
    counter: u32,
}

impl SpinWait {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Backs off once. Returns `false` when spinning has stopped paying off.
    pub(crate) fn spin(&mut self) -> bool {
        if self.counter >= SPIN_LIMIT {
            return false;
        }

        self.counter += 1;
        if self.counter <= BUSY_ROUNDS {
            for _ in 0..(1 << self.counter) {
                spin_loop();
            }
        } else {
            thread::yield_now();
        }

        true
    }
}
