#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use btpool::{BoundedThreadPool, PoolConfig};

/// Upper bound for anything the tests wait on
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Backlog poll interval used by test pools, short enough to keep tests fast
pub const TEST_POLL_INTERVAL_MS: u64 = 10;

/// Polls `predicate` until it holds or `timeout` elapses. Returns the final
/// result of the predicate.
pub fn wait_until(timeout: Duration, mut predicate: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if predicate() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(2));
    }
}

/// Configuration with a short poll interval for tests
pub fn test_config() -> PoolConfig {
    PoolConfig::default().with_poll_interval_ms(TEST_POLL_INTERVAL_MS)
}

/// Builds and starts a pool
pub fn started_pool(config: PoolConfig) -> BoundedThreadPool {
    let pool = BoundedThreadPool::new(config).expect("valid test configuration");
    btpool::Lifecycle::start(&pool).expect("pool starts");
    pool
}

/// Closure job that bumps `counter` once it has run
pub fn counting_job(counter: &Arc<AtomicUsize>) -> impl FnOnce() -> anyhow::Result<()> + Send + 'static {
    let counter = counter.clone();
    move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A gate that jobs block on until the test opens it
#[derive(Clone, Default)]
pub struct Gate {
    inner: Arc<(std::sync::Mutex<bool>, std::sync::Condvar)>,
}

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wait(&self) {
        let (open, cond) = &*self.inner;
        let mut open = open.lock().unwrap();
        while !*open {
            open = cond.wait(open).unwrap();
        }
    }

    pub fn open(&self) {
        let (open, cond) = &*self.inner;
        *open.lock().unwrap() = true;
        cond.notify_all();
    }
}
