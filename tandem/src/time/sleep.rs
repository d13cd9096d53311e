use super::driver::{self, Timer};

use parking_lot::Mutex;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll, Wake, Waker};
use std::time::{Duration, Instant};

/// Creates a future that completes after the given duration.
///
/// The timer is registered with the shared timer driver on first poll, so
/// the future works under any executor.
///
/// # Examples
///
/// ```rust,ignore
/// use std::time::Duration;
///
/// tandem::time::sleep(Duration::from_millis(10)).await;
/// ```
pub fn sleep(duration: Duration) -> Sleep {
    Sleep::new(duration)
}

/// Future returned by [`sleep`].
///
/// Dropping it before completion cancels the timer.
#[must_use = "futures do nothing unless polled"]
pub struct Sleep {
    /// `None` when the duration overflows the clock; such a sleep never ends.
    deadline: Option<Instant>,
    shared: Arc<Shared>,
    timer: Option<Timer>,
}

/// State shared with the driver; the driver wakes it when the deadline
/// passes, and it forwards to the most recently registered task waker.
struct Shared {
    fired: AtomicBool,
    waker: Mutex<Option<Waker>>,
}

impl Sleep {
    pub(crate) fn new(duration: Duration) -> Self {
        Self {
            deadline: Instant::now().checked_add(duration),
            shared: Arc::new(Shared {
                fired: AtomicBool::new(false),
                waker: Mutex::new(None),
            }),
            timer: None,
        }
    }

    /// Returns when the sleep completes, or `None` if it never does.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    fn is_elapsed(&self) -> bool {
        self.shared.fired.load(Ordering::Acquire)
            || self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

impl Future for Sleep {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();

        if this.is_elapsed() {
            return Poll::Ready(());
        }

        *this.shared.waker.lock() = Some(cx.waker().clone());

        if let (None, Some(deadline)) = (&this.timer, this.deadline) {
            let waker = Waker::from(this.shared.clone());
            this.timer = Some(driver::handle().set_timer(deadline, waker));
        }

        if this.shared.fired.load(Ordering::Acquire) {
            return Poll::Ready(());
        }

        Poll::Pending
    }
}

impl Drop for Sleep {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
    }
}

impl Wake for Shared {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.fired.store(true, Ordering::Release);

        let waker = self.waker.lock().take();
        if let Some(waker) = waker {
            waker.wake();
        }
    }
}
