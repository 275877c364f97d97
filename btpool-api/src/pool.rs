//! # Thread Pool Contract
//!
//! Admission and accounting interface shared by thread pool implementations.

use crate::errors::DispatchError;
use crate::job::BoxedJob;
use crate::lifecycle::Lifecycle;

/// A pool of reusable worker threads governed by a [`Lifecycle`].
pub trait ThreadPool: Lifecycle + Send + Sync {
    /// Hand a job to the pool.
    ///
    /// On success the job will run exactly once. On rejection the job is
    /// returned inside the error and the caller decides whether to drop it,
    /// retry later or route it elsewhere.
    fn dispatch(&self, job: BoxedJob) -> Result<(), DispatchError>;

    /// Block until the pool is fully stopped and every worker has exited.
    fn join(&self);

    /// Number of live worker threads.
    fn threads(&self) -> usize;

    /// Number of workers parked waiting for work.
    fn idle_threads(&self) -> usize;

    /// Whether fewer workers are idle than the configured low-threads
    /// watermark. A capacity planning hint only.
    fn is_low_on_threads(&self) -> bool;
}
