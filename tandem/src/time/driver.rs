use super::entry::TimerEntry;

use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, channel};
use std::sync::{Arc, OnceLock};
use std::task::Waker;
use std::thread;
use std::time::Instant;

static DRIVER: OnceLock<TimerHandle> = OnceLock::new();

pub(crate) enum Command {
    SetTimer {
        deadline: Instant,
        waker: Waker,
        cancelled: Arc<AtomicBool>,
    },
}

/// Returns the process-wide timer driver, starting its thread on first use.
pub(crate) fn handle() -> &'static TimerHandle {
    DRIVER.get_or_init(TimerHandle::start)
}

/// Sender side of the timer driver thread.
pub(crate) struct TimerHandle {
    sender: Sender<Command>,
}

impl TimerHandle {
    fn start() -> Self {
        let (sender, receiver) = channel();

        let spawned = thread::Builder::new()
            .name("tandem-timer".into())
            .spawn(move || Driver::new(receiver).run());

        if let Err(err) = spawned {
            panic!("failed to start the timer driver: {err}");
        }

        tracing::debug!("timer driver started");
        Self { sender }
    }

    /// Arms a timer that wakes `waker` once `deadline` has passed.
    ///
    /// The waker runs on the driver thread and must not block it for long.
    pub(crate) fn set_timer(&self, deadline: Instant, waker: Waker) -> Timer {
        let cancelled = Arc::new(AtomicBool::new(false));

        // The driver never exits, so the receiver outlives every sender.
        let _ = self.sender.send(Command::SetTimer {
            deadline,
            waker,
            cancelled: cancelled.clone(),
        });

        Timer {
            deadline,
            cancelled,
        }
    }
}

/// An armed timer. Cancelling it keeps its waker from firing.
#[derive(Debug)]
pub(crate) struct Timer {
    deadline: Instant,
    cancelled: Arc<AtomicBool>,
}

impl Timer {
    pub(crate) fn deadline(&self) -> Instant {
        self.deadline
    }

    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }
}

struct Driver {
    receiver: Receiver<Command>,
    timers: BinaryHeap<TimerEntry>,
}

impl Driver {
    fn new(receiver: Receiver<Command>) -> Self {
        Self {
            receiver,
            timers: BinaryHeap::new(),
        }
    }

    fn run(mut self) {
        loop {
            let command = match self.timers.peek() {
                Some(next) => {
                    let wait = next.deadline.saturating_duration_since(Instant::now());
                    match self.receiver.recv_timeout(wait) {
                        Ok(command) => Some(command),
                        Err(RecvTimeoutError::Timeout) => None,
                        Err(RecvTimeoutError::Disconnected) => return,
                    }
                }
                None => match self.receiver.recv() {
                    Ok(command) => Some(command),
                    Err(_) => return,
                },
            };

            if let Some(command) = command {
                self.apply(command);
                while let Ok(command) = self.receiver.try_recv() {
                    self.apply(command);
                }
            }

            self.fire_expired();
        }
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::SetTimer {
                deadline,
                waker,
                cancelled,
            } => self.timers.push(TimerEntry {
                deadline,
                waker,
                cancelled,
            }),
        }
    }

    fn fire_expired(&mut self) {
        let now = Instant::now();
        let mut fired = 0usize;

        while self.timers.peek().is_some_and(|next| next.deadline <= now) {
            let Some(timer) = self.timers.pop() else {
                break;
            };

            if timer.is_cancelled() {
                continue;
            }

            timer.waker.wake();
            fired += 1;
        }

        if fired > 0 {
            tracing::trace!(fired, pending = self.timers.len(), "timers fired");
        }
    }
}
