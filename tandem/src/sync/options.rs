use bitflags::bitflags;

bitflags! {
    /// Per-call acquisition options.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct WaitOptions: u8 {
        /// Fail immediately instead of queuing when the lock is taken.
        const NO_DELAY = 1 << 0;

        /// Skip the uncontended fast path. Only honored in debug builds,
        /// where it forces every acquisition through the queue.
        const DISABLE_FAST_PATH = 1 << 1;

        /// Async only: do not carry the caller's `tracing` span into the
        /// continuation. Waits use a pooled slab slot instead of a fresh
        /// allocation.
        const DISABLE_CONTEXT = 1 << 2;

        /// Async only: allow a releaser that opts in through
        /// [`LockToken::release_inline`](super::LockToken::release_inline)
        /// to run this waiter's continuation on its own stack. Implies
        /// [`DISABLE_CONTEXT`](Self::DISABLE_CONTEXT).
        const ALLOW_INLINE = 1 << 3;
    }
}

impl WaitOptions {
    pub(crate) fn fast_path_enabled(self) -> bool {
        !(cfg!(debug_assertions) && self.contains(WaitOptions::DISABLE_FAST_PATH))
    }

    pub(crate) fn uses_slab(self) -> bool {
        self.intersects(WaitOptions::DISABLE_CONTEXT | WaitOptions::ALLOW_INLINE)
    }
}
