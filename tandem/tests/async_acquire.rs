mod common;

use common::{init_test_logging, wait_until_async};
use tandem::sync::{CancellationToken, Mutex, MutexError, Status, WaitOptions};
use tandem::task;

use std::future::Future;
use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll, Waker};
use std::thread;
use std::time::{Duration, Instant};

#[tandem::test]
async fn uncontended_async_acquire() {
    init_test_logging();
    let mutex = Mutex::new(Duration::from_secs(1));

    let token = mutex.try_acquire_async(None, WaitOptions::empty()).await;
    assert!(token.is_success());
    assert!(mutex.is_locked());

    drop(token);
    assert!(!mutex.is_locked());
}

#[tandem::test]
async fn release_hands_off_to_a_queued_task() {
    init_test_logging();
    let mutex = Mutex::new(Duration::from_secs(10));
    let held = mutex.try_acquire(WaitOptions::empty());

    let contender = mutex.clone();
    let waiter = task::spawn(async move {
        let token = contender.try_acquire_async(None, WaitOptions::empty()).await;
        token.status()
    });

    let probe = mutex.clone();
    wait_until_async(move || probe.queued() == 1).await;

    drop(held);
    assert_eq!(waiter.await, Status::Success);
    assert!(!mutex.is_locked());
}

#[tandem::test]
async fn cancel_after_queuing_resolves_as_canceled() {
    init_test_logging();
    let mutex = Mutex::new(Duration::from_secs(10));
    let held = mutex.try_acquire(WaitOptions::empty());
    let cancel = CancellationToken::new();

    let acquire = mutex.try_acquire_async(Some(&cancel), WaitOptions::empty());
    assert_eq!(mutex.queued(), 1);

    cancel.cancel();
    let token = acquire.await;

    assert_eq!(token.status(), Status::Canceled);
    assert_eq!(token.into_result().unwrap_err(), MutexError::Canceled);

    // The canceled record is skipped and the lock ends up free.
    drop(held);
    assert!(!mutex.is_locked());
    assert_eq!(mutex.queued(), 0);
}

#[tandem::test]
async fn already_canceled_token_never_queues() {
    let mutex = Mutex::new(Duration::from_secs(10));
    let _held = mutex.try_acquire(WaitOptions::empty());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let token = mutex
        .try_acquire_async(Some(&cancel), WaitOptions::empty())
        .await;

    assert_eq!(token.status(), Status::Canceled);
    assert_eq!(mutex.queued(), 0);
}

#[tandem::test]
async fn queued_async_waiter_times_out() {
    init_test_logging();
    let mutex = Mutex::from_millis(50);
    let held = mutex.try_acquire(WaitOptions::empty());

    let started = Instant::now();
    let token = mutex.try_acquire_async(None, WaitOptions::empty()).await;

    assert_eq!(token.status(), Status::Timeout);
    assert!(started.elapsed() >= Duration::from_millis(50));
    assert_eq!(mutex.queued(), 0);

    drop(held);
    assert!(!mutex.is_locked());
}

#[tandem::test]
async fn one_timer_expires_a_whole_batch() {
    let mutex = Mutex::from_millis(50);
    let _held = mutex.try_acquire(WaitOptions::empty());

    let waits: Vec<_> = (0..5)
        .map(|_| mutex.try_acquire_async(None, WaitOptions::empty()))
        .collect();
    assert_eq!(mutex.queued(), 5);

    for wait in waits {
        assert_eq!(wait.await.status(), Status::Timeout);
    }
    assert_eq!(mutex.queued(), 0);
}

#[tandem::test]
async fn zero_timeout_async_fails_immediately() {
    let mutex = Mutex::new(Duration::ZERO);
    let _held = mutex.try_acquire(WaitOptions::empty());

    let acquire = mutex.try_acquire_async(None, WaitOptions::empty());
    assert!(acquire.is_ready());
    assert_eq!(acquire.await.status(), Status::Timeout);
    assert_eq!(mutex.queued(), 0);
}

#[test]
fn dropping_a_granted_wait_releases_the_lock() {
    let mutex = Mutex::new(Duration::from_secs(10));
    let held = mutex.try_acquire(WaitOptions::empty());

    let acquire = mutex.try_acquire_async(None, WaitOptions::empty());
    drop(held);

    // Granted to the future, which nobody polled.
    assert!(acquire.is_ready());
    assert!(mutex.is_locked());

    drop(acquire);
    assert!(!mutex.is_locked());
    assert_eq!(mutex.queued(), 0);
}

#[test]
fn dropping_a_queued_wait_withdraws_it() {
    let mutex = Mutex::new(Duration::from_secs(10));
    let held = mutex.try_acquire(WaitOptions::DISABLE_CONTEXT);

    let acquire = mutex.try_acquire_async(None, WaitOptions::DISABLE_CONTEXT);
    drop(acquire);

    drop(held);
    assert!(!mutex.is_locked());
    assert_eq!(mutex.queued(), 0);
}

#[tandem::test]
async fn pooled_waits_are_served_in_order() {
    init_test_logging();
    // More waits than one slab holds, so a second slab gets started.
    const WAITS: usize = 40;

    let mutex = Mutex::new(Duration::from_secs(10));
    let held = mutex.try_acquire(WaitOptions::empty());

    let waits: Vec<_> = (0..WAITS)
        .map(|_| mutex.try_acquire_async(None, WaitOptions::DISABLE_CONTEXT))
        .collect();
    assert_eq!(mutex.queued(), WAITS);

    drop(held);

    let mut last_generation = 0;
    for wait in waits {
        let token = wait.await;
        assert!(token.is_success());
        assert!(token.state().generation() > last_generation);
        last_generation = token.state().generation();
    }

    assert!(!mutex.is_locked());
}

#[tandem::test]
async fn blocking_and_async_waiters_share_one_queue() {
    let mutex = Mutex::new(Duration::from_secs(10));
    let sequence = Arc::new(AtomicUsize::new(0));
    let held = mutex.try_acquire(WaitOptions::empty());

    let blocking = {
        let mutex = mutex.clone();
        let sequence = sequence.clone();
        thread::spawn(move || {
            let token = mutex.try_acquire(WaitOptions::empty());
            assert!(token.is_success());
            let turn = sequence.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(20));
            turn
        })
    };

    let probe = mutex.clone();
    wait_until_async(move || probe.queued() == 1).await;

    let acquire = mutex.try_acquire_async(None, WaitOptions::empty());
    drop(held);

    let token = acquire.await;
    assert!(token.is_success());
    let async_turn = sequence.fetch_add(1, Ordering::SeqCst);
    drop(token);

    assert_eq!(blocking.join().unwrap(), 0);
    assert_eq!(async_turn, 1);
}

#[tandem::test]
async fn cancellation_racing_release_has_one_outcome() {
    for _ in 0..200 {
        let mutex = Mutex::new(Duration::from_secs(10));
        let held = mutex.try_acquire(WaitOptions::empty());
        let cancel = CancellationToken::new();

        let acquire = mutex.try_acquire_async(Some(&cancel), WaitOptions::empty());

        let canceller = {
            let cancel = cancel.clone();
            thread::spawn(move || cancel.cancel())
        };
        drop(held);
        canceller.join().unwrap();

        let token = acquire.await;
        match token.status() {
            Status::Success => assert!(mutex.is_locked()),
            Status::Canceled => assert!(!mutex.is_locked()),
            other => panic!("unexpected outcome {other}"),
        }

        drop(token);
        assert!(!mutex.is_locked());
        assert_eq!(mutex.queued(), 0);
    }
}

#[test]
#[should_panic(expected = "already registered")]
fn polling_a_finished_wait_panics() {
    let mutex = Mutex::new(Duration::from_secs(1));
    let mut acquire = pin!(mutex.try_acquire_async(None, WaitOptions::empty()));
    let mut cx = Context::from_waker(Waker::noop());

    let Poll::Ready(_token) = acquire.as_mut().poll(&mut cx) else {
        panic!("uncontended acquisition must be ready");
    };

    let _ = acquire.as_mut().poll(&mut cx);
}
