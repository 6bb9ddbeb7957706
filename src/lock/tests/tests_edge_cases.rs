use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::lock::{LockError, LockManager};

#[test]
fn waiter_times_out_if_holder_never_releases() {
    let mgr = Arc::new(LockManager::new(Duration::from_millis(500)));
    let _g1 = mgr.acquire("users", 1, Duration::from_secs(5)).unwrap();

    let result = mgr.acquire("users", 2, Duration::from_millis(50));
    assert!(matches!(result, Err(LockError::Timeout(_))));
}

#[test]
fn fifo_ordering_is_respected_across_multiple_waiters() {
    let mgr = Arc::new(LockManager::new(Duration::from_secs(5)));
    let g1 = mgr.acquire("users", 1, Duration::from_secs(5)).unwrap();

    let order = Arc::new(std::sync::Mutex::new(Vec::new()));

    let mut handles = Vec::new();
    for id in [2u128, 3u128] {
        let mgr = Arc::clone(&mgr);
        let order = Arc::clone(&order);
        handles.push(thread::spawn(move || {
            let guard = mgr.acquire("users", id, Duration::from_secs(5)).unwrap();
            order.lock().unwrap().push(id);
            thread::sleep(Duration::from_millis(20));
            guard.release();
        }));
        // Give each waiter a chance to enqueue before the next one arrives.
        thread::sleep(Duration::from_millis(20));
    }

    thread::sleep(Duration::from_millis(20));
    g1.release();

    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(*order.lock().unwrap(), vec![2, 3]);
}

#[test]
fn timed_out_waiter_is_removed_from_the_queue() {
    let mgr = Arc::new(LockManager::new(Duration::from_millis(500)));
    let g1 = mgr.acquire("users", 1, Duration::from_secs(5)).unwrap();

    assert!(mgr.acquire("users", 2, Duration::from_millis(30)).is_err());

    g1.release();
    // A fresh acquire should not be stuck behind the expired waiter.
    let guard = mgr.acquire("users", 3, Duration::from_millis(200)).unwrap();
    drop(guard);
}
