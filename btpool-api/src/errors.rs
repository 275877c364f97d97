//! # Error Types
//!
//! ## Taxonomy
//!
//! - `DispatchError::NotReady`: a job was dispatched while the pool was not
//!   running. The caller may retry after `start()` or discard the job.
//! - `DispatchError::Overload`: the thread cap is reached and the backlog is
//!   full. The job is rejected outright; nothing is retried internally.
//! - `JobFailure`: a job returned an error or panicked. Caught inside the
//!   worker and routed to an error sink, never to the dispatcher.
//! - `LifecycleError`: a start or stop hook failed. Returned to the caller of
//!   `start()`/`stop()`; the component is left `Failed`.
//!
//! Rejected jobs travel back inside [`DispatchError`] so that a rejection
//! never silently drops work.

use std::fmt;

use thiserror::Error;

use crate::job::BoxedJob;

/// Admission failure returned by `dispatch`.
#[derive(Error)]
pub enum DispatchError {
    #[error("thread pool is not running")]
    NotReady(BoxedJob),

    #[error("thread pool is overloaded: all threads busy and backlog full")]
    Overload(BoxedJob),
}

impl DispatchError {
    /// Take back the rejected job.
    pub fn into_job(self) -> BoxedJob {
        match self {
            DispatchError::NotReady(job) | DispatchError::Overload(job) => job,
        }
    }

    pub fn is_not_ready(&self) -> bool {
        matches!(self, DispatchError::NotReady(_))
    }

    pub fn is_overload(&self) -> bool {
        matches!(self, DispatchError::Overload(_))
    }
}

impl fmt::Debug for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::NotReady(job) => f.debug_tuple("NotReady").field(&job.name()).finish(),
            DispatchError::Overload(job) => f.debug_tuple("Overload").field(&job.name()).finish(),
        }
    }
}

/// Failure of a start or stop hook.
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("{component} failed to start: {source}")]
    StartFailed {
        component: String,
        source: anyhow::Error,
    },

    #[error("{component} failed to stop: {source}")]
    StopFailed {
        component: String,
        source: anyhow::Error,
    },
}

impl LifecycleError {
    /// Name of the component whose hook failed.
    pub fn component(&self) -> &str {
        match self {
            LifecycleError::StartFailed { component, .. }
            | LifecycleError::StopFailed { component, .. } => component,
        }
    }
}

/// A job that failed while running on a worker.
#[derive(Error, Debug)]
pub enum JobFailure {
    /// `run` returned an error.
    #[error("job `{job}` failed on {worker}: {source}")]
    Errored {
        job: String,
        worker: String,
        source: anyhow::Error,
    },

    /// `run` panicked. The panic was caught and the worker kept running.
    #[error("job `{job}` panicked on {worker}: {message}")]
    Panicked {
        job: String,
        worker: String,
        message: String,
    },
}

impl JobFailure {
    /// Name of the failed job.
    pub fn job(&self) -> &str {
        match self {
            JobFailure::Errored { job, .. } | JobFailure::Panicked { job, .. } => job,
        }
    }

    /// Name of the worker thread the job ran on.
    pub fn worker(&self) -> &str {
        match self {
            JobFailure::Errored { worker, .. } | JobFailure::Panicked { worker, .. } => worker,
        }
    }

    pub fn is_panic(&self) -> bool {
        matches!(self, JobFailure::Panicked { .. })
    }
}
