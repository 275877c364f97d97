use std::fmt;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context as _;
use flume::{Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};

use btpool_api::errors::{DispatchError, LifecycleError};
use btpool_api::job::{BoxedJob, ErrorSink, Job};
use btpool_api::lifecycle::{Lifecycle, LifecycleState};
use btpool_api::pool::ThreadPool;

use super::idle::IdleRegistry;
use super::sink::TracingErrorSink;
use super::worker::{self, Worker, WorkerSlot};
use crate::component::ComponentLifecycle;
use crate::config::PoolConfig;
use crate::error::ConfigError;
use crate::logging::{self, info, warn};
use crate::{log_dispatch, log_error, pool_span};

static NEXT_POOL_ID: AtomicUsize = AtomicUsize::new(0);

/// What a worker does after finishing a job or waking up empty-handed.
pub(crate) enum Step {
    Run(BoxedJob),
    Park,
    Retire,
}

/// Mutable pool bookkeeping, guarded by the pool lock.
struct PoolState {
    name: String,
    daemon: bool,
    low_threads: usize,
    max_idle_time_ms: u64,
    thread_count: usize,
    idle: IdleRegistry,
    last_shrink: Instant,
    next_worker_id: usize,
    warned: bool,
}

/// Shared core of a `BoundedThreadPool`. Workers reach it through a weak
/// reference.
pub(crate) struct PoolCore {
    id: usize,
    lifecycle: ComponentLifecycle,
    min_threads: usize,
    max_threads: usize,
    queue_size: usize,
    poll_interval: Duration,
    stack_size: Option<usize>,
    backlog_tx: Sender<BoxedJob>,
    backlog_rx: Receiver<BoxedJob>,
    state: Mutex<PoolState>,
    drained: Condvar,
    sink: Arc<dyn ErrorSink>,
}

impl PoolCore {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_running(&self) -> bool {
        self.lifecycle.state().is_running()
    }

    /// Admit a job: idle hand-off, then a new worker, then the backlog. The
    /// whole decision is taken under the pool lock.
    pub(crate) fn dispatch(self: &Arc<Self>, job: BoxedJob) -> Result<(), DispatchError> {
        let mut state = self.lock();

        if !self.is_running() {
            log_dispatch!(state.name, "not_ready");
            return Err(DispatchError::NotReady(job));
        }

        if let Some(slot) = state.idle.pop() {
            state.warned = false;
            log_dispatch!(state.name, "idle", worker = slot.name());
            slot.assign(job);
            return Ok(());
        }

        let job = if state.thread_count < self.max_threads {
            match self.spawn_worker(&mut state, Some(job)) {
                Ok(()) => {
                    log_dispatch!(state.name, "spawn", threads = state.thread_count);
                    return Ok(());
                }
                Err((err, reclaimed)) => {
                    log_error!(err, pool = %state.name, "failed to spawn worker, falling back to backlog");
                    // No thread ever saw the slot, so the job is still in it.
                    match reclaimed {
                        Some(job) => job,
                        None => return Ok(()),
                    }
                }
            }
        } else {
            job
        };

        match self.backlog_tx.try_send(job) {
            Ok(()) => {
                log_dispatch!(state.name, "backlog", queued = self.backlog_rx.len());
                Ok(())
            }
            Err(TrySendError::Full(job)) | Err(TrySendError::Disconnected(job)) => {
                if !state.warned {
                    state.warned = true;
                    warn!(
                        pool = %state.name,
                        threads = state.thread_count,
                        queue_size = self.queue_size,
                        "out of threads, rejecting jobs"
                    );
                }
                log_dispatch!(state.name, "overload");
                Err(DispatchError::Overload(job))
            }
        }
    }

    /// Start a worker thread, optionally pre-loaded with a job. On failure
    /// the job is handed back and the count is left untouched.
    fn spawn_worker(
        self: &Arc<Self>,
        state: &mut PoolState,
        job: Option<BoxedJob>,
    ) -> Result<(), (io::Error, Option<BoxedJob>)> {
        state.next_worker_id += 1;
        let id = state.next_worker_id;
        let name = format!("{}-{}", state.name, id);
        let slot = Arc::new(WorkerSlot::new(id, name.clone()));
        if let Some(job) = job {
            slot.assign(job);
        }

        let worker = Worker::new(
            self.id,
            Arc::downgrade(self),
            slot.clone(),
            self.backlog_rx.clone(),
            self.sink.clone(),
        );
        let dispatch = logging::current_subscriber();
        let mut builder = thread::Builder::new().name(name);
        if let Some(stack_size) = self.stack_size {
            builder = builder.stack_size(stack_size);
        }
        let spawned =
            builder.spawn(move || tracing::dispatcher::with_default(&dispatch, || worker.run()));

        match spawned {
            Ok(_) => {
                state.thread_count += 1;
                Ok(())
            }
            Err(err) => Err((err, slot.take_assigned())),
        }
    }

    /// Decide a worker's next move. `poll` waits on the backlog first, which
    /// a worker does right after finishing a job.
    pub(crate) fn next_step(&self, slot: &Arc<WorkerSlot>, poll: bool) -> Step {
        if poll && self.is_running() {
            match self.backlog_rx.recv_timeout(self.poll_interval) {
                Ok(job) => return Step::Run(job),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return self.retire(&mut self.lock(), slot),
            }
        }

        let mut state = self.lock();
        match self.backlog_rx.try_recv() {
            Ok(job) => return Step::Run(job),
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => return self.retire(&mut state, slot),
        }

        if !self.is_running() {
            return self.retire(&mut state, slot);
        }

        let now = Instant::now();
        if now.duration_since(state.last_shrink) > Duration::from_millis(state.max_idle_time_ms)
            && state.thread_count > self.min_threads
        {
            state.last_shrink = now;
            info!(pool = %state.name, worker = slot.name(), threads = state.thread_count - 1, "shrinking idle pool");
            return self.retire(&mut state, slot);
        }

        state.idle.register(slot.clone());
        Step::Park
    }

    /// Only called from `next_step`, by a worker that is running and so is
    /// not registered idle.
    fn retire(&self, state: &mut PoolState, slot: &WorkerSlot) -> Step {
        debug_assert!(!state.idle.contains(slot.id()), "{} retired while idle", slot.name());
        state.thread_count -= 1;
        self.drained.notify_all();
        Step::Retire
    }

    fn do_start(self: &Arc<Self>) -> anyhow::Result<()> {
        let mut state = self.lock();
        state.last_shrink = Instant::now();
        state.warned = false;

        for _ in 0..self.min_threads {
            self.spawn_worker(&mut state, None)
                .map_err(|(err, _)| err)
                .with_context(|| format!("failed to spawn worker for {}", state.name))?;
        }
        info!(pool = %state.name, threads = state.thread_count, "pool started");
        Ok(())
    }

    fn do_stop(&self) -> anyhow::Result<()> {
        // A job stopping its own pool keeps its worker alive until it returns.
        let own = usize::from(worker::current_pool() == Some(self.id));

        let mut state = self.lock();
        for slot in state.idle.drain() {
            slot.cancel();
        }
        while state.thread_count > own {
            state = self
                .drained
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        info!(pool = %state.name, "pool stopped");
        Ok(())
    }

    /// Wake every parked worker so it re-reads the lifecycle state.
    fn release_idle(&self) {
        let mut state = self.lock();
        for slot in state.idle.drain() {
            slot.cancel();
        }
        self.drained.notify_all();
    }

    fn start(self: &Arc<Self>) -> Result<(), LifecycleError> {
        let name = self.lock().name.clone();
        let span = pool_span!(name);
        let _enter = span.enter();

        let result = self.lifecycle.start(&name, || self.do_start());
        if result.is_err() {
            self.release_idle();
        }
        result
    }

    fn stop(&self) -> Result<(), LifecycleError> {
        let name = self.lock().name.clone();
        let span = pool_span!(name);
        let _enter = span.enter();

        let result = self.lifecycle.stop(&name, || self.do_stop());
        self.release_idle();
        result
    }

    fn join(&self) {
        let own = usize::from(worker::current_pool() == Some(self.id));
        let mut state = self.lock();
        while !matches!(self.lifecycle.state(), LifecycleState::Stopped | LifecycleState::Failed)
            || state.thread_count > own
        {
            state = self
                .drained
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

impl Drop for PoolCore {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        for slot in state.idle.drain() {
            slot.cancel();
        }
    }
}

/// # Bounded Thread Pool
///
/// A pool of reusable worker threads that grows on demand up to
/// `max_threads`, queues up to `queue_size` jobs once every worker is busy,
/// and rejects work beyond that.
///
/// ## Dispatch
/// Under one lock, in order of preference:
/// 1. Hand the job to a parked worker
/// 2. Spawn a new worker pre-loaded with the job, while below `max_threads`
/// 3. Append the job to the backlog, or reject it with
///    `DispatchError::Overload` when the backlog is full
///
/// ## Shrinking
/// A worker that finds no work after its backlog poll exits if more than
/// `max_idle_time_ms` passed since the last such exit and the pool has more
/// than `min_threads` workers. At most one worker exits per idle window.
/// Parked workers wait for a hand-off indefinitely.
///
/// ## Shutdown
/// `stop()` wakes parked workers, lets busy ones finish their current job and
/// drain the backlog, and returns once every worker has exited. A pool can be
/// started again afterwards. Dropping a daemon pool does not wait, but its
/// workers still run every job accepted before the drop.
///
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// use btpool::{BoundedThreadPool, Lifecycle, PoolConfig, ThreadPool};
///
/// let pool = BoundedThreadPool::new(PoolConfig::default().with_max_threads(4)).unwrap();
/// pool.start().unwrap();
///
/// let counter = Arc::new(AtomicUsize::new(0));
/// for _ in 0..10 {
///     let counter = counter.clone();
///     pool.execute(move || {
///         counter.fetch_add(1, Ordering::SeqCst);
///         Ok(())
///     })
///     .unwrap();
/// }
///
/// pool.stop().unwrap();
/// assert_eq!(counter.load(Ordering::SeqCst), 10);
/// assert_eq!(pool.threads(), 0);
/// ```
pub struct BoundedThreadPool {
    core: Arc<PoolCore>,
}

impl BoundedThreadPool {
    /// Build a stopped pool from a validated configuration. Failures of jobs
    /// are logged through `TracingErrorSink`.
    pub fn new(config: PoolConfig) -> Result<Self, ConfigError> {
        Self::with_error_sink(config, TracingErrorSink)
    }

    /// Build a stopped pool that reports job failures to `sink`.
    pub fn with_error_sink(
        config: PoolConfig,
        sink: impl ErrorSink + 'static,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config, Arc::new(sink)))
    }

    /// A pool with the default configuration.
    pub fn with_defaults() -> Self {
        Self::build(PoolConfig::default(), Arc::new(TracingErrorSink))
    }

    fn build(config: PoolConfig, sink: Arc<dyn ErrorSink>) -> Self {
        let id = NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed);
        let name = config.name.clone().unwrap_or_else(|| format!("btpool{}", id));
        let (backlog_tx, backlog_rx) = flume::bounded(config.queue_size);

        let core = PoolCore {
            id,
            lifecycle: ComponentLifecycle::new(),
            min_threads: config.min_threads,
            max_threads: config.max_threads,
            queue_size: config.queue_size,
            poll_interval: config.poll_interval(),
            stack_size: config.stack_size,
            backlog_tx,
            backlog_rx,
            state: Mutex::new(PoolState {
                name,
                daemon: config.daemon,
                low_threads: config.low_threads,
                max_idle_time_ms: config.max_idle_time_ms,
                thread_count: 0,
                idle: IdleRegistry::with_capacity(config.max_threads),
                last_shrink: Instant::now(),
                next_worker_id: 0,
                warned: false,
            }),
            drained: Condvar::new(),
            sink,
        };

        Self { core: Arc::new(core) }
    }

    /// Dispatch a closure.
    pub fn execute<F>(&self, f: F) -> Result<(), DispatchError>
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.dispatch(Box::new(f))
    }

    /// Dispatch any `Job` without boxing it first.
    pub fn submit(&self, job: impl Job) -> Result<(), DispatchError> {
        self.dispatch(Box::new(job))
    }

    pub fn name(&self) -> String {
        self.core.lock().name.clone()
    }

    /// Rename the pool. Threads spawned afterwards use the new prefix.
    pub fn set_name(&self, name: impl Into<String>) -> Result<(), ConfigError> {
        let name = name.into();
        if name.contains('\0') {
            return Err(ConfigError::Invalid("name must not contain NUL bytes".to_string()));
        }
        self.core.lock().name = name;
        Ok(())
    }

    pub fn daemon(&self) -> bool {
        self.core.lock().daemon
    }

    pub fn set_daemon(&self, daemon: bool) {
        self.core.lock().daemon = daemon;
    }

    pub fn low_threads(&self) -> usize {
        self.core.lock().low_threads
    }

    pub fn set_low_threads(&self, low_threads: usize) {
        self.core.lock().low_threads = low_threads;
    }

    pub fn max_idle_time_ms(&self) -> u64 {
        self.core.lock().max_idle_time_ms
    }

    pub fn set_max_idle_time_ms(&self, max_idle_time_ms: u64) {
        self.core.lock().max_idle_time_ms = max_idle_time_ms;
    }

    pub fn min_threads(&self) -> usize {
        self.core.min_threads
    }

    pub fn max_threads(&self) -> usize {
        self.core.max_threads
    }

    pub fn queue_size(&self) -> usize {
        self.core.queue_size
    }

    /// Jobs waiting in the backlog.
    pub fn backlog_len(&self) -> usize {
        self.core.backlog_rx.len()
    }
}

impl Default for BoundedThreadPool {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl Lifecycle for BoundedThreadPool {
    /// Spawn `min_threads` idle workers.
    fn start(&self) -> Result<(), LifecycleError> {
        self.core.start()
    }

    /// Wake idle workers and block until every worker has exited.
    fn stop(&self) -> Result<(), LifecycleError> {
        self.core.stop()
    }

    fn state(&self) -> LifecycleState {
        self.core.lifecycle.state()
    }
}

impl ThreadPool for BoundedThreadPool {
    fn dispatch(&self, job: BoxedJob) -> Result<(), DispatchError> {
        self.core.dispatch(job)
    }

    fn join(&self) {
        self.core.join()
    }

    fn threads(&self) -> usize {
        self.core.lock().thread_count
    }

    fn idle_threads(&self) -> usize {
        self.core.lock().idle.len()
    }

    fn is_low_on_threads(&self) -> bool {
        let state = self.core.lock();
        state.idle.len() < state.low_threads
    }
}

impl Drop for BoundedThreadPool {
    fn drop(&mut self) {
        // Daemon pools detach. Workers that can no longer reach the core run
        // what is left in the backlog, then exit.
        if self.daemon() {
            return;
        }
        if let Err(err) = self.stop() {
            log_error!(err, pool = %self.name(), "failed to stop pool on drop");
        }
    }
}

impl fmt::Debug for BoundedThreadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.core.lock();
        f.debug_struct("BoundedThreadPool")
            .field("name", &state.name)
            .field("state", &self.core.lifecycle.state())
            .field("threads", &state.thread_count)
            .field("idle", &state.idle.len())
            .field("backlog", &self.core.backlog_rx.len())
            .field("min_threads", &self.core.min_threads)
            .field("max_threads", &self.core.max_threads)
            .field("queue_size", &self.core.queue_size)
            .finish()
    }
}

impl fmt::Display for BoundedThreadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}
