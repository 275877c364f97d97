// Bounded thread pool implementation
//
// This crate implements the btpool API: a worker-thread pool that grows on
// demand up to a hard cap, shrinks back after idle periods and rejects work
// when saturated, governed by an idempotent start/stop lifecycle.

pub mod component;
pub mod config;
pub mod error;
pub mod logging;
pub mod pool;

// Re-export commonly used types
pub use btpool_api::{
    BoxedJob, DispatchError, ErrorSink, Job, JobFailure, Lifecycle, LifecycleError, LifecycleHooks,
    LifecycleState, ThreadPool,
};
pub use component::{ComponentLifecycle, Managed};
pub use config::PoolConfig;
pub use error::ConfigError;
pub use pool::{BoundedThreadPool, TracingErrorSink};
