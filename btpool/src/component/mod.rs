//! # Components
//!
//! Lifecycle machinery for components with expensive setup and teardown.
//! The thread pool is one such component; `Managed` adapts any other type
//! that implements `LifecycleHooks`.

pub mod lifecycle;

pub use lifecycle::{ComponentLifecycle, Managed};

use std::any::Any;

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "Unknown panic".to_string()
    }
}
