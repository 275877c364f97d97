//! # Thread Pool
//!
//! The bounded coordinator, its worker loop and the idle-worker registry.
//!
//! ## Key Concepts
//! - **Backlog**: bounded FIFO (`flume`) of jobs waiting for a busy worker
//! - **Idle registry**: workers parked on their private hand-off slot
//! - **Shrink window**: one idle worker may exit per `max_idle_time_ms`
//!
//! Job failures never reach the dispatcher; they go to an [`ErrorSink`],
//! [`TracingErrorSink`] by default.
//!
//! [`ErrorSink`]: btpool_api::ErrorSink

mod bounded;
mod idle;
mod sink;
mod worker;

pub use bounded::BoundedThreadPool;
pub use sink::TracingErrorSink;
