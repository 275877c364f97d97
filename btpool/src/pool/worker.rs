use std::cell::Cell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};

use flume::Receiver;

use btpool_api::errors::JobFailure;
use btpool_api::job::{BoxedJob, ErrorSink};

use super::bounded::{PoolCore, Step};
use crate::component::panic_message;
use crate::logging::warn;
use crate::{log_worker, worker_span};

thread_local! {
    static CURRENT_POOL: Cell<Option<usize>> = const { Cell::new(None) };
}

/// Id of the pool owning the current thread, if it is a pool worker.
pub(crate) fn current_pool() -> Option<usize> {
    CURRENT_POOL.with(Cell::get)
}

#[derive(Default)]
struct Handoff {
    job: Option<BoxedJob>,
    cancelled: bool,
}

/// # Worker Hand-off Slot
///
/// The private wait condition of one worker. `dispatch` assigns a job to a
/// parked worker through its slot; `stop` cancels it.
///
/// The slot lock is only ever taken alone or nested inside the pool lock,
/// never the other way round.
pub(crate) struct WorkerSlot {
    id: usize,
    name: String,
    handoff: Mutex<Handoff>,
    wakeup: Condvar,
}

impl WorkerSlot {
    pub(crate) fn new(id: usize, name: String) -> Self {
        Self {
            id,
            name,
            handoff: Mutex::new(Handoff::default()),
            wakeup: Condvar::new(),
        }
    }

    pub(crate) fn id(&self) -> usize {
        self.id
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Hand a job to the worker and wake it.
    pub(crate) fn assign(&self, job: BoxedJob) {
        let mut handoff = self.lock();
        debug_assert!(handoff.job.is_none(), "{} already holds a job", self.name);
        handoff.job = Some(job);
        self.wakeup.notify_one();
    }

    /// Wake the worker without a job.
    pub(crate) fn cancel(&self) {
        self.lock().cancelled = true;
        self.wakeup.notify_one();
    }

    /// Take back a job that was assigned but not picked up.
    pub(crate) fn take_assigned(&self) -> Option<BoxedJob> {
        self.lock().job.take()
    }

    /// Block until assigned a job or cancelled. An assigned job wins over a
    /// pending cancellation; the cancellation is consumed either way.
    fn park(&self) -> Option<BoxedJob> {
        let mut handoff = self.lock();
        while handoff.job.is_none() && !handoff.cancelled {
            handoff = self
                .wakeup
                .wait(handoff)
                .unwrap_or_else(PoisonError::into_inner);
        }
        handoff.cancelled = false;
        handoff.job.take()
    }

    fn lock(&self) -> MutexGuard<'_, Handoff> {
        self.handoff.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for WorkerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerSlot")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

/// # Worker Thread
///
/// One OS thread bound to one pool. Holds only a weak reference to the pool:
/// the pool is upgraded while deciding what to do next and released before
/// running a job or parking. The worker's own backlog receiver outlives the
/// pool, so jobs queued in a dropped daemon pool still run.
///
/// ## Core Algorithm
/// 1. Run the job it holds, if any, reporting failures to the error sink
/// 2. Pull from the backlog with the poll interval as timeout
/// 3. Under the pool lock: take a queued job, retire if the pool stopped or
///    the shrink window elapsed, otherwise register idle
/// 4. Park until handed a job or cancelled, then go back to 1
///
/// Once the pool is gone the worker empties the backlog and exits.
pub(crate) struct Worker {
    pool_id: usize,
    pool: Weak<PoolCore>,
    slot: Arc<WorkerSlot>,
    backlog: Receiver<BoxedJob>,
    sink: Arc<dyn ErrorSink>,
}

impl Worker {
    pub(crate) fn new(
        pool_id: usize,
        pool: Weak<PoolCore>,
        slot: Arc<WorkerSlot>,
        backlog: Receiver<BoxedJob>,
        sink: Arc<dyn ErrorSink>,
    ) -> Self {
        Self {
            pool_id,
            pool,
            slot,
            backlog,
            sink,
        }
    }

    /// Thread body.
    pub(crate) fn run(self) {
        CURRENT_POOL.with(|current| current.set(Some(self.pool_id)));
        let span = worker_span!(self.slot.name(), pool = self.pool_id);
        let _enter = span.enter();
        log_worker!(self.slot.name(), "started");

        let mut pending = self.slot.take_assigned();
        loop {
            let polled = match pending.take() {
                Some(job) => {
                    self.execute(job);
                    true
                }
                None => false,
            };

            let Some(pool) = self.pool.upgrade() else {
                log_worker!(self.slot.name(), "orphaned");
                self.drain_backlog();
                break;
            };

            match pool.next_step(&self.slot, polled) {
                Step::Run(job) => pending = Some(job),
                Step::Park => {
                    drop(pool);
                    log_worker!(self.slot.name(), "parked");
                    pending = self.slot.park();
                }
                Step::Retire => break,
            }
        }

        self.reclaim_pending();
        log_worker!(self.slot.name(), "retired");
        CURRENT_POOL.with(|current| current.set(None));
    }

    fn execute(&self, job: BoxedJob) {
        let job_name = job.name().to_string();
        let failure = match panic::catch_unwind(AssertUnwindSafe(move || job.run())) {
            Ok(Ok(())) => return,
            Ok(Err(source)) => JobFailure::Errored {
                job: job_name,
                worker: self.slot.name().to_string(),
                source,
            },
            Err(payload) => JobFailure::Panicked {
                job: job_name,
                worker: self.slot.name().to_string(),
                message: panic_message(payload.as_ref()),
            },
        };

        let sink = &self.sink;
        if panic::catch_unwind(AssertUnwindSafe(|| sink.report(&failure))).is_err() {
            warn!(worker = %self.slot.name(), "error sink panicked while reporting: {}", failure);
        }
    }

    /// Run the jobs a dropped pool left queued. The senders are gone with the
    /// pool, so this ends once the channel is empty.
    fn drain_backlog(&self) {
        for job in self.backlog.try_iter() {
            self.execute(job);
        }
    }

    /// A job assigned after this worker decided to exit is handed back to the
    /// pool, or run here if the pool no longer accepts it.
    pub(crate) fn reclaim_pending(&self) {
        let Some(job) = self.slot.take_assigned() else {
            return;
        };

        let job = match self.pool.upgrade() {
            Some(pool) => match pool.dispatch(job) {
                Ok(()) => {
                    log_worker!(self.slot.name(), "redispatched");
                    return;
                }
                Err(rejected) => rejected.into_job(),
            },
            None => job,
        };

        warn!(worker = %self.slot.name(), job = job.name(), "pool rejected reclaimed job, running it inline");
        self.execute(job);
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("pool", &self.pool_id)
            .field("slot", &self.slot)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    fn closed_backlog() -> Receiver<BoxedJob> {
        flume::bounded(1).1
    }

    fn counting_sink(count: &Arc<AtomicUsize>) -> Arc<dyn ErrorSink> {
        let count = count.clone();
        Arc::new(move |_: &JobFailure| {
            count.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_park_prefers_assigned_job_over_cancel() {
        let slot = Arc::new(WorkerSlot::new(1, "test-1".to_string()));
        slot.cancel();
        slot.assign(Box::new(|| -> anyhow::Result<()> { Ok(()) }));

        assert!(slot.park().is_some());
        assert!(slot.take_assigned().is_none());
    }

    #[test]
    fn test_park_wakes_on_assign_from_other_thread() {
        let slot = Arc::new(WorkerSlot::new(1, "test-1".to_string()));
        let assigner = {
            let slot = slot.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                slot.assign(Box::new(|| -> anyhow::Result<()> { Ok(()) }));
            })
        };

        assert!(slot.park().is_some());
        assigner.join().unwrap();
    }

    #[test]
    fn test_orphaned_worker_runs_reclaimed_job_inline() {
        let ran = Arc::new(AtomicUsize::new(0));
        let failures = Arc::new(AtomicUsize::new(0));
        let slot = Arc::new(WorkerSlot::new(1, "test-1".to_string()));
        let worker = Worker::new(0, Weak::new(), slot.clone(), closed_backlog(), counting_sink(&failures));

        let counter = ran.clone();
        slot.assign(Box::new(move || -> anyhow::Result<()> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));
        worker.reclaim_pending();

        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(failures.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_orphaned_worker_empties_backlog_before_exiting() {
        let ran = Arc::new(AtomicUsize::new(0));
        let failures = Arc::new(AtomicUsize::new(0));
        let (backlog_tx, backlog_rx) = flume::bounded::<BoxedJob>(4);
        for _ in 0..3 {
            let counter = ran.clone();
            backlog_tx
                .send(Box::new(move || -> anyhow::Result<()> {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }))
                .unwrap();
        }
        drop(backlog_tx);

        let slot = Arc::new(WorkerSlot::new(1, "test-1".to_string()));
        Worker::new(0, Weak::new(), slot, backlog_rx, counting_sink(&failures)).run();

        assert_eq!(ran.load(Ordering::SeqCst), 3);
        assert_eq!(failures.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_execute_reports_errors_and_panics() {
        let failures = Arc::new(AtomicUsize::new(0));
        let slot = Arc::new(WorkerSlot::new(1, "test-1".to_string()));
        let worker = Worker::new(0, Weak::new(), slot, closed_backlog(), counting_sink(&failures));

        worker.execute(Box::new(|| -> anyhow::Result<()> { Err(anyhow::anyhow!("failed")) }));
        worker.execute(Box::new(|| -> anyhow::Result<()> { panic!("boom") }));
        worker.execute(Box::new(|| -> anyhow::Result<()> { Ok(()) }));

        assert_eq!(failures.load(Ordering::SeqCst), 2);
    }
}
