//! # Component Lifecycle
//!
//! Start/stop contract for components with expensive setup and teardown.
//!
//! ## State Machine
//!
//! ```text
//! Stopped ── start() ──▶ Starting ── do_start ok ──▶ Started
//!                           │                          │
//!                     do_start err                  stop()
//!                           ▼                          ▼
//!                        Failed ◀── do_stop err ── Stopping ── do_stop ok ──▶ Stopped
//! ```
//!
//! `start()` is a no-op when already `Started`; `stop()` is a no-op when
//! `Stopping` or `Stopped`. A failing hook drives the state to `Failed` and
//! the failure is returned to the caller. Nothing is retried automatically.

use std::fmt;

use crate::errors::LifecycleError;

/// Lifecycle states. Discriminants are stable and used as the atomic state
/// word by implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i8)]
pub enum LifecycleState {
    Failed = -1,
    Stopped = 0,
    Starting = 1,
    Started = 2,
    Stopping = 3,
}

impl LifecycleState {
    /// Numeric code of this state.
    pub const fn code(self) -> i8 {
        self as i8
    }

    /// Decode a state code. Unknown codes decode to `Failed`.
    pub const fn from_code(code: i8) -> Self {
        match code {
            0 => LifecycleState::Stopped,
            1 => LifecycleState::Starting,
            2 => LifecycleState::Started,
            3 => LifecycleState::Stopping,
            _ => LifecycleState::Failed,
        }
    }

    /// `Starting` or `Started`.
    pub const fn is_running(self) -> bool {
        matches!(self, LifecycleState::Starting | LifecycleState::Started)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Failed => "failed",
            LifecycleState::Stopped => "stopped",
            LifecycleState::Starting => "starting",
            LifecycleState::Started => "started",
            LifecycleState::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// Idempotent start/stop with read-only state queries.
pub trait Lifecycle {
    /// Start the component. No-op if already started.
    fn start(&self) -> Result<(), LifecycleError>;

    /// Stop the component. No-op if already stopping or stopped.
    fn stop(&self) -> Result<(), LifecycleError>;

    /// Current state snapshot.
    fn state(&self) -> LifecycleState;

    fn is_running(&self) -> bool {
        self.state().is_running()
    }

    fn is_started(&self) -> bool {
        self.state() == LifecycleState::Started
    }

    fn is_starting(&self) -> bool {
        self.state() == LifecycleState::Starting
    }

    fn is_stopping(&self) -> bool {
        self.state() == LifecycleState::Stopping
    }

    fn is_stopped(&self) -> bool {
        self.state() == LifecycleState::Stopped
    }

    fn is_failed(&self) -> bool {
        self.state() == LifecycleState::Failed
    }
}

/// Setup and teardown hooks sequenced by a lifecycle state machine.
///
/// Hooks are invoked at most once per `start()`/`stop()` call and never
/// concurrently with each other.
pub trait LifecycleHooks: Send + Sync {
    fn do_start(&self) -> anyhow::Result<()>;

    fn do_stop(&self) -> anyhow::Result<()>;

    /// Name used in lifecycle errors and log records.
    fn component_name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}
