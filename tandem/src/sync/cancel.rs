use parking_lot::Mutex;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::Waker;

/// A cooperative cancellation signal for async acquisitions.
///
/// Clones share the same signal. Once [`cancel`](Self::cancel) is called every
/// pending acquisition registered with the token is resolved as canceled,
/// unless the lock was granted to it first.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    hooks: Mutex<Hooks>,
}

#[derive(Debug, Default)]
struct Hooks {
    next_id: u64,
    entries: Vec<(u64, Waker)>,
}

impl CancellationToken {
    /// Creates a token that is not canceled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals cancellation and runs every registered hook.
    ///
    /// Hooks run on the calling thread, outside the registry lock.
    /// Calling this more than once has no further effect.
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }

        let hooks = std::mem::take(&mut self.inner.hooks.lock().entries);

        tracing::debug!(hooks = hooks.len(), "cancellation requested");

        for (_, hook) in hooks {
            hook.wake();
        }
    }

    /// Returns `true` once [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Registers `hook` to be woken on cancellation.
    ///
    /// Returns `None` without registering if the token is already canceled.
    /// Dropping the returned registration unregisters the hook.
    pub(crate) fn register(&self, hook: Waker) -> Option<CancelRegistration> {
        let mut hooks = self.inner.hooks.lock();

        if self.is_cancelled() {
            return None;
        }

        let id = hooks.next_id;
        hooks.next_id += 1;
        hooks.entries.push((id, hook));

        Some(CancelRegistration {
            inner: self.inner.clone(),
            id,
        })
    }
}

/// Keeps a cancellation hook registered until dropped.
#[derive(Debug)]
pub(crate) struct CancelRegistration {
    inner: Arc<Inner>,
    id: u64,
}

impl Drop for CancelRegistration {
    fn drop(&mut self) {
        let mut hooks = self.inner.hooks.lock();
        if let Some(pos) = hooks.entries.iter().position(|(id, _)| *id == self.id) {
            hooks.entries.swap_remove(pos);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::task::Wake;

    struct Counter(AtomicUsize);

    impl Wake for Counter {
        fn wake(self: Arc<Self>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn hooks_run_once_on_cancel() {
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        let token = CancellationToken::new();

        let _registration = token.register(Waker::from(counter.clone())).unwrap();
        token.cancel();
        token.cancel();

        assert!(token.is_cancelled());
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropped_registration_is_not_run() {
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        let token = CancellationToken::new();

        drop(token.register(Waker::from(counter.clone())));
        token.clone().cancel();

        assert_eq!(counter.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn register_after_cancel_is_refused() {
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        let token = CancellationToken::new();
        token.cancel();

        assert!(token.register(Waker::from(counter)).is_none());
    }
}
