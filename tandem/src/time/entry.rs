use std::cmp::Ordering;
use std::sync::Arc;
use std::sync::atomic::{self, AtomicBool};
use std::task::Waker;
use std::time::Instant;

/// A scheduled wake-up in the driver's deadline heap.
///
/// Ordered by deadline, reversed, so a `BinaryHeap<TimerEntry>` pops the
/// earliest deadline first.
pub(crate) struct TimerEntry {
    pub(crate) deadline: Instant,
    pub(crate) waker: Waker,
    /// Shared with the [`Timer`](super::driver::Timer) that armed it.
    pub(crate) cancelled: Arc<AtomicBool>,
}

impl TimerEntry {
    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(atomic::Ordering::Acquire)
    }
}

impl Eq for TimerEntry {}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline.eq(&other.deadline)
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other.deadline.cmp(&self.deadline)
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BinaryHeap;
    use std::time::Duration;

    fn entry(deadline: Instant) -> TimerEntry {
        TimerEntry {
            deadline,
            waker: Waker::noop().clone(),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    #[test]
    fn heap_pops_earliest_deadline_first() {
        let now = Instant::now();
        let mut heap = BinaryHeap::new();

        heap.push(entry(now + Duration::from_millis(30)));
        heap.push(entry(now + Duration::from_millis(10)));
        heap.push(entry(now + Duration::from_millis(20)));

        let order: Vec<_> = std::iter::from_fn(|| heap.pop())
            .map(|e| e.deadline.duration_since(now).as_millis())
            .collect();

        assert_eq!(order, vec![10, 20, 30]);
    }
}
