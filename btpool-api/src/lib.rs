//! # btpool API
//!
//! Abstract contracts for a bounded, elastic worker-thread pool and the
//! start/stop lifecycle that governs it. This crate owns no threads; the
//! `btpool` crate provides the implementation.
//!
//! ## Core Components
//!
//! - **Jobs**: fire-and-forget units of work with a single fallible `run`
//! - **Lifecycle**: a five state machine (`Stopped`, `Starting`, `Started`,
//!   `Stopping`, `Failed`) with idempotent `start`/`stop`
//! - **Thread pools**: admission of jobs, worker accounting and shutdown
//! - **Errors**: dispatch rejections, lifecycle failures and job failures
//!
//! ## Usage Example
//!
//! ```rust
//! use btpool_api::{BoxedJob, Job};
//!
//! struct Hello;
//!
//! impl Job for Hello {
//!     fn run(self: Box<Self>) -> anyhow::Result<()> {
//!         println!("Hello");
//!         Ok(())
//!     }
//! }
//!
//! let jobs: Vec<BoxedJob> = vec![
//!     Box::new(Hello),
//!     Box::new(|| -> anyhow::Result<()> { Ok(()) }),
//! ];
//! for job in jobs {
//!     job.run().unwrap();
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`job`]: the job capability and the job failure sink
//! - [`lifecycle`]: lifecycle states, the lifecycle contract and component hooks
//! - [`pool`]: the thread pool contract
//! - [`errors`]: error types

pub mod errors;
pub mod job;
pub mod lifecycle;
pub mod pool;

pub use errors::{DispatchError, JobFailure, LifecycleError};
pub use job::{BoxedJob, ErrorSink, Job};
pub use lifecycle::{Lifecycle, LifecycleHooks, LifecycleState};
pub use pool::ThreadPool;
