use super::Job;

use parking_lot::{Condvar, Mutex};

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Upper bound on a worker's sleep, so work pushed to another worker's
/// local queue gets stolen even without a notification.
const PARK_TIMEOUT: Duration = Duration::from_millis(1);

/// Global job queue shared by all workers of one runtime.
///
/// Also coordinates parking: idle workers sleep on the condition variable
/// and every push wakes one of them.
pub(crate) struct Injector {
    queue: Mutex<VecDeque<Job>>,
    condvar: Condvar,
    shutdown: AtomicBool,
}

impl Injector {
    pub(crate) fn new() -> Self {
        Injector {
            queue: Mutex::new(VecDeque::new()),
            condvar: Condvar::new(),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Refuses further jobs and wakes every parked worker.
    pub(crate) fn shutdown(&self) {
        let _queue = self.queue.lock();
        self.shutdown.store(true, Ordering::Release);
        self.condvar.notify_all();
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Queues a job, or hands it back if the runtime is shutting down.
    pub(crate) fn push(&self, job: Job) -> Result<(), Job> {
        let mut queue = self.queue.lock();

        if self.is_shutdown() {
            return Err(job);
        }

        queue.push_back(job);
        self.condvar.notify_one();
        Ok(())
    }

    /// Parks the calling worker until a job arrives, shutdown begins, or
    /// [`PARK_TIMEOUT`] elapses.
    pub(crate) fn park(&self) {
        let mut queue = self.queue.lock();

        if self.is_shutdown() || !queue.is_empty() {
            return;
        }

        let _ = self.condvar.wait_for(&mut queue, PARK_TIMEOUT);
    }

    pub(crate) fn steal(&self) -> Option<Job> {
        self.queue.lock().pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::task::{Wake, Waker};

    struct Count(AtomicUsize);

    impl Wake for Count {
        fn wake(self: Arc<Self>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn jobs_come_out_in_push_order() {
        let injector = Injector::new();
        let first = Arc::new(Count(AtomicUsize::new(0)));
        let second = Arc::new(Count(AtomicUsize::new(0)));

        assert!(injector.push(Job::Wake(Waker::from(first.clone()))).is_ok());
        assert!(injector.push(Job::Wake(Waker::from(second.clone()))).is_ok());

        injector.steal().unwrap().run();
        assert_eq!(first.0.load(Ordering::SeqCst), 1);
        assert_eq!(second.0.load(Ordering::SeqCst), 0);

        injector.steal().unwrap().run();
        assert_eq!(second.0.load(Ordering::SeqCst), 1);
        assert!(injector.steal().is_none());
    }

    #[test]
    fn push_after_shutdown_hands_the_job_back() {
        let injector = Injector::new();
        injector.shutdown();

        let count = Arc::new(Count(AtomicUsize::new(0)));
        let rejected = injector.push(Job::Wake(Waker::from(count.clone())));

        assert!(rejected.is_err());
        assert!(injector.steal().is_none());
        // Parking after shutdown returns immediately.
        injector.park();
    }
}
