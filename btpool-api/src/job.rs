//! # Jobs
//!
//! A job is the unit of work accepted by a thread pool. Jobs are unordered,
//! homogeneous and fire-and-forget: they produce no value and the pool keeps
//! no reference to them once they have run.
//!
//! Any `FnOnce() -> anyhow::Result<()>` closure that is `Send + 'static` is a
//! job, so most callers never implement the trait by hand.

use crate::errors::JobFailure;

/// A unit of work executed by a pool worker.
///
/// `run` consumes the job, so a job runs at most once. Errors returned from
/// `run` are reported to the pool's [`ErrorSink`] and never reach the caller
/// that dispatched the job.
pub trait Job: Send + 'static {
    /// Perform the work.
    fn run(self: Box<Self>) -> anyhow::Result<()>;

    /// Name used in diagnostics when the job fails.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Type-erased job as stored in backlogs and worker hand-off slots.
pub type BoxedJob = Box<dyn Job>;

impl<F> Job for F
where
    F: FnOnce() -> anyhow::Result<()> + Send + 'static,
{
    fn run(self: Box<Self>) -> anyhow::Result<()> {
        (*self)()
    }
}

/// Destination for job failures caught inside workers.
///
/// Sinks are called from worker threads, after the failing job has been
/// unwound, and must not block for long.
pub trait ErrorSink: Send + Sync {
    fn report(&self, failure: &JobFailure);
}

impl<F> ErrorSink for F
where
    F: Fn(&JobFailure) + Send + Sync,
{
    fn report(&self, failure: &JobFailure) {
        self(failure)
    }
}
