// Integration tests for starting, stopping and dropping a BoundedThreadPool

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use btpool::{BoundedThreadPool, Lifecycle, LifecycleState, PoolConfig, ThreadPool};

mod test_helpers;
use test_helpers::{counting_job, started_pool, test_config, wait_until, Gate, DEFAULT_TIMEOUT};

#[test]
fn test_start_spawns_min_threads() {
    let pool = started_pool(test_config().with_min_threads(3).with_max_threads(5));

    assert!(pool.is_started());
    assert_eq!(pool.threads(), 3);
    assert!(wait_until(DEFAULT_TIMEOUT, || pool.idle_threads() == 3));

    pool.stop().unwrap();
    assert_eq!(pool.threads(), 0);
    assert_eq!(pool.idle_threads(), 0);
    assert_eq!(pool.state(), LifecycleState::Stopped);
}

#[test]
fn test_dispatch_before_start_returns_job() {
    let pool = BoundedThreadPool::new(test_config()).unwrap();
    let counter = Arc::new(AtomicUsize::new(0));

    let err = pool.execute(counting_job(&counter)).unwrap_err();
    assert!(err.is_not_ready());

    // The rejected job is handed back intact
    err.into_job().run().unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert_eq!(pool.threads(), 0);
}

#[test]
fn test_dispatch_after_stop_is_not_ready() {
    let pool = started_pool(test_config());
    pool.stop().unwrap();

    let err = pool.execute(|| Ok(())).unwrap_err();
    assert!(err.is_not_ready());
}

#[test]
fn test_stop_waits_for_busy_workers() {
    let pool = started_pool(test_config().with_max_threads(2));
    let finished = Arc::new(AtomicUsize::new(0));

    for _ in 0..2 {
        let finished = finished.clone();
        pool.execute(move || {
            thread::sleep(Duration::from_millis(100));
            finished.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
    }

    pool.stop().unwrap();
    assert_eq!(finished.load(Ordering::SeqCst), 2);
    assert_eq!(pool.threads(), 0);
}

#[test]
fn test_stop_drains_backlog() {
    let pool = started_pool(test_config().with_min_threads(1).with_max_threads(1).with_queue_size(8));
    let gate = Gate::new();
    let counter = Arc::new(AtomicUsize::new(0));
    assert!(wait_until(DEFAULT_TIMEOUT, || pool.idle_threads() == 1));

    let blocker = gate.clone();
    pool.execute(move || {
        blocker.wait();
        Ok(())
    })
    .unwrap();
    for _ in 0..5 {
        pool.execute(counting_job(&counter)).unwrap();
    }
    assert_eq!(pool.backlog_len(), 5);

    let stopper = thread::spawn({
        let gate = gate.clone();
        move || {
            thread::sleep(Duration::from_millis(50));
            gate.open();
        }
    });
    pool.stop().unwrap();
    stopper.join().unwrap();

    assert_eq!(counter.load(Ordering::SeqCst), 5);
    assert_eq!(pool.backlog_len(), 0);
    assert_eq!(pool.threads(), 0);
}

#[test]
fn test_pool_can_be_restarted() {
    let pool = started_pool(test_config().with_min_threads(2));
    pool.stop().unwrap();
    assert!(pool.is_stopped());

    pool.start().unwrap();
    assert!(pool.is_started());
    assert_eq!(pool.threads(), 2);

    let counter = Arc::new(AtomicUsize::new(0));
    pool.execute(counting_job(&counter)).unwrap();
    assert!(wait_until(DEFAULT_TIMEOUT, || counter.load(Ordering::SeqCst) == 1));
    pool.stop().unwrap();
}

#[test]
fn test_join_returns_after_stop_from_other_thread() {
    let pool = Arc::new(started_pool(test_config().with_min_threads(2)));

    let stopper = {
        let pool = pool.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            pool.stop().unwrap();
        })
    };

    pool.join();
    assert!(pool.is_stopped());
    assert_eq!(pool.threads(), 0);
    stopper.join().unwrap();
}

#[test]
fn test_join_on_stopped_pool_returns_immediately() {
    let pool = BoundedThreadPool::new(test_config()).unwrap();
    pool.join();
    assert!(pool.is_stopped());
}

#[test]
fn test_stop_from_own_job_does_not_deadlock() {
    let pool = Arc::new(started_pool(test_config().with_min_threads(2).with_max_threads(4)));
    let result = Arc::new(Mutex::new(None));

    {
        let handle = pool.clone();
        let result = result.clone();
        pool.execute(move || {
            *result.lock().unwrap() = Some(handle.stop().is_ok());
            Ok(())
        })
        .unwrap();
    }

    assert!(wait_until(DEFAULT_TIMEOUT, || result.lock().unwrap().is_some()));
    assert_eq!(*result.lock().unwrap(), Some(true));
    assert!(pool.is_stopped());
    assert!(wait_until(DEFAULT_TIMEOUT, || pool.threads() == 0));
}

#[test]
fn test_job_calling_stop_during_outer_stop_does_not_deadlock() {
    let pool = Arc::new(started_pool(test_config().with_min_threads(1).with_max_threads(1)));
    assert!(wait_until(DEFAULT_TIMEOUT, || pool.idle_threads() == 1));
    let gate = Gate::new();
    let result = Arc::new(Mutex::new(None));

    {
        let handle = pool.clone();
        let blocker = gate.clone();
        let result = result.clone();
        pool.execute(move || {
            blocker.wait();
            *result.lock().unwrap() = Some(handle.stop().is_ok());
            Ok(())
        })
        .unwrap();
    }

    let opener = {
        let pool = pool.clone();
        let gate = gate.clone();
        thread::spawn(move || {
            assert!(wait_until(DEFAULT_TIMEOUT, || pool.is_stopping()));
            gate.open();
        })
    };
    pool.stop().unwrap();
    opener.join().unwrap();

    assert_eq!(*result.lock().unwrap(), Some(true));
    assert!(pool.is_stopped());
    assert_eq!(pool.threads(), 0);
}

#[test]
fn test_dropping_non_daemon_pool_drains_workers() {
    let finished = Arc::new(AtomicUsize::new(0));
    {
        let pool = started_pool(test_config().with_max_threads(3));
        for _ in 0..3 {
            let finished = finished.clone();
            pool.execute(move || {
                thread::sleep(Duration::from_millis(50));
                finished.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        }
    }
    assert_eq!(finished.load(Ordering::SeqCst), 3);
}

#[test]
fn test_dropping_daemon_pool_detaches() {
    let gate = Gate::new();
    let finished = Arc::new(AtomicUsize::new(0));
    {
        let pool = started_pool(test_config().with_daemon(true));
        assert!(pool.daemon());

        let blocker = gate.clone();
        let finished = finished.clone();
        pool.execute(move || {
            blocker.wait();
            finished.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
    }

    // Drop returned while the job was still blocked
    assert_eq!(finished.load(Ordering::SeqCst), 0);
    gate.open();
    assert!(wait_until(DEFAULT_TIMEOUT, || finished.load(Ordering::SeqCst) == 1));
}

#[test]
fn test_default_pool_names_are_unique() {
    let first = BoundedThreadPool::with_defaults();
    let second = BoundedThreadPool::default();

    assert!(first.name().starts_with("btpool"));
    assert!(second.name().starts_with("btpool"));
    assert_ne!(first.name(), second.name());
    assert_eq!(first.min_threads(), 1);
    assert_eq!(first.max_threads(), 255);
    assert_eq!(first.queue_size(), 255);
    assert_eq!(first.max_idle_time_ms(), 60_000);
    assert!(!first.daemon());
}

#[test]
fn test_worker_threads_carry_pool_name() {
    let pool = started_pool(test_config().with_name("named").with_min_threads(0));
    let seen = Arc::new(Mutex::new(String::new()));

    let recorded = seen.clone();
    pool.execute(move || {
        *recorded.lock().unwrap() = thread::current().name().unwrap_or_default().to_string();
        Ok(())
    })
    .unwrap();
    pool.stop().unwrap();

    assert_eq!(*seen.lock().unwrap(), "named-1");
    assert_eq!(pool.to_string(), "named");
}

#[test]
fn test_invalid_config_is_rejected() {
    let err = BoundedThreadPool::new(PoolConfig::default().with_min_threads(10).with_max_threads(2))
        .unwrap_err();
    assert!(err.to_string().contains("min_threads"));
}

#[test]
fn test_dropping_daemon_pool_still_runs_backlog() {
    let gate = Gate::new();
    let counter = Arc::new(AtomicUsize::new(0));
    {
        let pool = started_pool(
            test_config()
                .with_daemon(true)
                .with_min_threads(1)
                .with_max_threads(1)
                .with_queue_size(4),
        );
        assert!(wait_until(DEFAULT_TIMEOUT, || pool.idle_threads() == 1));

        let blocker = gate.clone();
        pool.execute(move || {
            blocker.wait();
            Ok(())
        })
        .unwrap();
        for _ in 0..3 {
            pool.execute(counting_job(&counter)).unwrap();
        }
        assert_eq!(pool.backlog_len(), 3);
    }

    assert_eq!(counter.load(Ordering::SeqCst), 0);
    gate.open();
    assert!(wait_until(DEFAULT_TIMEOUT, || counter.load(Ordering::SeqCst) == 3));
}
