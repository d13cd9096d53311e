mod common;

use common::{init_test_logging, wait_until};
use tandem::sync::{Mutex, MutexError, Status, WaitOptions};

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn uncontended_acquire_and_release() {
    init_test_logging();
    let mutex = Mutex::new(Duration::from_secs(1));

    let token = mutex.try_acquire(WaitOptions::empty());
    assert!(token.is_success());
    assert!(mutex.is_locked());

    drop(token);
    assert!(!mutex.is_locked());
    assert_eq!(mutex.queued(), 0);
}

#[test]
fn every_grant_mints_a_new_generation() {
    let mutex = Mutex::new(Duration::from_secs(1));

    let first = mutex.try_acquire(WaitOptions::empty()).into_state();
    mutex.release(first).unwrap();
    let second = mutex.try_acquire(WaitOptions::empty());

    assert!(second.is_success());
    assert_eq!(second.state().generation(), first.generation() + 1);
}

#[test]
fn waiters_are_served_in_arrival_order() {
    init_test_logging();
    const WAITERS: usize = 8;

    let mutex = Mutex::new(Duration::from_secs(10));
    let order = Arc::new(StdMutex::new(Vec::new()));
    let held = mutex.try_acquire(WaitOptions::empty());

    let threads: Vec<_> = (0..WAITERS)
        .map(|index| {
            let mutex_clone = mutex.clone();
            let order = order.clone();

            let handle = thread::spawn(move || {
                let token = mutex_clone.try_acquire(WaitOptions::empty());
                assert!(token.is_success());
                order.lock().unwrap().push(index);
            });

            // Queue the next thread only once this one is in line.
            wait_until(|| mutex.queued() == index + 1);
            handle
        })
        .collect();

    drop(held);

    for handle in threads {
        handle.join().unwrap();
    }

    assert_eq!(*order.lock().unwrap(), (0..WAITERS).collect::<Vec<_>>());
    assert!(!mutex.is_locked());
}

#[test]
fn no_delay_fails_without_queuing() {
    let mutex = Mutex::new(Duration::from_secs(10));
    let _held = mutex.try_acquire(WaitOptions::empty());

    let started = Instant::now();
    let token = mutex.try_acquire(WaitOptions::NO_DELAY);

    assert_eq!(token.status(), Status::Timeout);
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(mutex.queued(), 0);
}

#[test]
fn zero_timeout_never_queues() {
    let mutex = Mutex::new(Duration::ZERO);
    let held = mutex.try_acquire(WaitOptions::empty());
    assert!(held.is_success());

    let contender = mutex.clone();
    let status = thread::spawn(move || contender.try_acquire(WaitOptions::empty()).status())
        .join()
        .unwrap();

    assert_eq!(status, Status::Timeout);
    assert_eq!(mutex.queued(), 0);
}

#[test]
fn blocking_wait_times_out_and_leaves_the_queue() {
    init_test_logging();
    let mutex = Mutex::from_millis(50);
    let held = mutex.try_acquire(WaitOptions::empty());

    let contender = mutex.clone();
    let waited = thread::spawn(move || {
        let started = Instant::now();
        let token = contender.try_acquire(WaitOptions::empty());
        assert_eq!(token.status(), Status::Timeout);
        assert_eq!(token.into_result().unwrap_err(), MutexError::Timeout);
        started.elapsed()
    })
    .join()
    .unwrap();

    assert!(waited >= Duration::from_millis(50));
    assert_eq!(mutex.queued(), 0);

    drop(held);
    assert!(!mutex.is_locked());

    // The thread-cached waiter is reused after a timeout.
    let again = mutex.clone();
    let succeeded = thread::spawn(move || again.try_acquire(WaitOptions::empty()).is_success())
        .join()
        .unwrap();
    assert!(succeeded);
}

#[test]
fn timed_out_waiter_does_not_block_the_next_one() {
    let mutex = Mutex::from_millis(100);
    let held = mutex.try_acquire(WaitOptions::empty());

    let early = mutex.clone();
    let early = thread::spawn(move || early.try_acquire(WaitOptions::empty()).status());
    wait_until(|| mutex.queued() == 1);

    assert_eq!(early.join().unwrap(), Status::Timeout);

    let late = mutex.clone();
    let late = thread::spawn(move || late.try_acquire(WaitOptions::empty()).is_success());
    wait_until(|| mutex.queued() == 1);

    drop(held);
    assert!(late.join().unwrap());
}

#[test]
fn at_most_one_holder_at_a_time() {
    const THREADS: usize = 8;
    const ROUNDS: usize = 2_000;

    let mutex = Mutex::new(Duration::from_secs(30));
    let inside = Arc::new(AtomicBool::new(false));
    let granted = Arc::new(AtomicUsize::new(0));

    let threads: Vec<_> = (0..THREADS)
        .map(|_| {
            let mutex = mutex.clone();
            let inside = inside.clone();
            let granted = granted.clone();

            thread::spawn(move || {
                for _ in 0..ROUNDS {
                    let token = mutex.try_acquire(WaitOptions::empty());
                    assert!(token.is_success());

                    assert!(!inside.swap(true, Ordering::SeqCst), "two holders at once");
                    granted.fetch_add(1, Ordering::Relaxed);
                    inside.store(false, Ordering::SeqCst);
                }
            })
        })
        .collect();

    for handle in threads {
        handle.join().unwrap();
    }

    assert_eq!(granted.load(Ordering::Relaxed), THREADS * ROUNDS);
    assert!(!mutex.is_locked());
}

#[test]
fn stress_one_million_acquisitions() {
    const THREADS: usize = 10;
    const ROUNDS: usize = 100_000;

    let mutex = Mutex::new(Duration::from_secs(60));
    let granted = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let started = Instant::now();

    let threads: Vec<_> = (0..THREADS)
        .map(|_| {
            let mutex = mutex.clone();
            let granted = granted.clone();
            let failed = failed.clone();

            thread::spawn(move || {
                for _ in 0..ROUNDS {
                    let token = mutex.try_acquire(WaitOptions::empty());
                    if token.is_success() {
                        granted.fetch_add(1, Ordering::Relaxed);
                    } else {
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
        })
        .collect();

    for handle in threads {
        handle.join().unwrap();
    }

    assert_eq!(granted.load(Ordering::Relaxed), THREADS * ROUNDS);
    assert_eq!(failed.load(Ordering::Relaxed), 0);
    assert!(started.elapsed() < Duration::from_secs(300));
    assert_eq!(mutex.queued(), 0);
}

#[cfg(debug_assertions)]
#[test]
fn disabled_fast_path_still_acquires() {
    init_test_logging();
    let mutex = Mutex::new(Duration::from_secs(5));

    let token = mutex.try_acquire(WaitOptions::DISABLE_FAST_PATH);
    assert!(token.is_success());

    let mutex_clone = mutex.clone();
    let contender = thread::spawn(move || {
        let token = mutex_clone.try_acquire(WaitOptions::DISABLE_FAST_PATH);
        (token.is_success(), token.state().generation())
    });

    wait_until(|| mutex.queued() == 1);
    let held_generation = token.state().generation();
    drop(token);

    let (granted, generation) = contender.join().unwrap();
    assert!(granted);
    assert_eq!(generation, held_generation + 1);
    assert!(!mutex.is_locked());
}

#[cfg(debug_assertions)]
#[test]
fn disabled_fast_path_with_no_delay_takes_a_free_lock() {
    let mutex = Mutex::new(Duration::from_secs(1));
    let options = WaitOptions::DISABLE_FAST_PATH | WaitOptions::NO_DELAY;

    let token = mutex.try_acquire(options);
    assert!(token.is_success());

    let contended = mutex.try_acquire(options);
    assert_eq!(contended.status(), Status::Timeout);
}
