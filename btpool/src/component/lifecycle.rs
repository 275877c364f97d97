use std::fmt;
use std::ops::Deref;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicI8, Ordering};
use std::sync::{Mutex, PoisonError};

use anyhow::anyhow;

use btpool_api::errors::LifecycleError;
use btpool_api::lifecycle::{Lifecycle, LifecycleHooks, LifecycleState};

use crate::component::panic_message;
use crate::{log_error, log_lifecycle};

/// # Lifecycle State Machine
///
/// Sequences a component's start and stop hooks through the five lifecycle
/// states.
///
/// ## Key Responsibilities
/// - Idempotent `start`/`stop`
/// - Mutual exclusion of transitions
/// - Lock-free state reads
///
/// ## Implementation Details
/// The state lives in an atomic word holding `LifecycleState::code()`, so
/// queries never block. `start()` on a `Started` component and `stop()` on a
/// `Stopping` or `Stopped` one return straight from the atomic word.
/// Otherwise transitions are serialized by a separate mutex that is held for
/// the whole duration of a hook: a second `start()` racing a first one waits,
/// then observes `Started` and returns without running the hook again.
///
/// A hook that returns an error or panics leaves the state `Failed`. The
/// failure is logged and returned. `start()` from `Failed` is attempted again
/// like a start from `Stopped`.
pub struct ComponentLifecycle {
    state: AtomicI8,
    transition: Mutex<()>,
}

impl ComponentLifecycle {
    pub fn new() -> Self {
        Self {
            state: AtomicI8::new(LifecycleState::Stopped.code()),
            transition: Mutex::new(()),
        }
    }

    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_code(self.state.load(Ordering::Acquire))
    }

    /// Run `hook` as the start hook of `component` unless already started.
    pub fn start<F>(&self, component: &str, hook: F) -> Result<(), LifecycleError>
    where
        F: FnOnce() -> anyhow::Result<()>,
    {
        if self.state() == LifecycleState::Started {
            return Ok(());
        }

        let _transition = self.transition.lock().unwrap_or_else(PoisonError::into_inner);
        if self.state() == LifecycleState::Started {
            return Ok(());
        }

        self.set(component, LifecycleState::Starting);
        match run_hook(hook) {
            Ok(()) => {
                self.set(component, LifecycleState::Started);
                Ok(())
            }
            Err(source) => {
                self.set(component, LifecycleState::Failed);
                let error = LifecycleError::StartFailed {
                    component: component.to_string(),
                    source,
                };
                log_error!(error, component = %component);
                Err(error)
            }
        }
    }

    /// Run `hook` as the stop hook of `component` unless already stopping or
    /// stopped.
    pub fn stop<F>(&self, component: &str, hook: F) -> Result<(), LifecycleError>
    where
        F: FnOnce() -> anyhow::Result<()>,
    {
        // Returns without waiting while another stop drains, which also lets
        // a job call stop() on its own pool during an outer stop().
        if self.is_stopping_or_stopped() {
            return Ok(());
        }

        let _transition = self.transition.lock().unwrap_or_else(PoisonError::into_inner);
        if self.is_stopping_or_stopped() {
            return Ok(());
        }

        self.set(component, LifecycleState::Stopping);
        match run_hook(hook) {
            Ok(()) => {
                self.set(component, LifecycleState::Stopped);
                Ok(())
            }
            Err(source) => {
                self.set(component, LifecycleState::Failed);
                let error = LifecycleError::StopFailed {
                    component: component.to_string(),
                    source,
                };
                log_error!(error, component = %component);
                Err(error)
            }
        }
    }

    fn is_stopping_or_stopped(&self) -> bool {
        matches!(self.state(), LifecycleState::Stopping | LifecycleState::Stopped)
    }

    fn set(&self, component: &str, next: LifecycleState) {
        let previous = LifecycleState::from_code(self.state.swap(next.code(), Ordering::AcqRel));
        log_lifecycle!(component, previous, next);
    }
}

impl Default for ComponentLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ComponentLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentLifecycle")
            .field("state", &self.state())
            .finish()
    }
}

fn run_hook<F>(hook: F) -> anyhow::Result<()>
where
    F: FnOnce() -> anyhow::Result<()>,
{
    match panic::catch_unwind(AssertUnwindSafe(hook)) {
        Ok(result) => result,
        Err(payload) => Err(anyhow!("hook panicked: {}", panic_message(payload.as_ref()))),
    }
}

/// A component driven by its [`LifecycleHooks`].
///
/// ```rust
/// use btpool::{Lifecycle, LifecycleHooks, LifecycleState, Managed};
///
/// struct Connection;
///
/// impl LifecycleHooks for Connection {
///     fn do_start(&self) -> anyhow::Result<()> { Ok(()) }
///     fn do_stop(&self) -> anyhow::Result<()> { Ok(()) }
/// }
///
/// let connection = Managed::new(Connection);
/// connection.start().unwrap();
/// assert_eq!(connection.state(), LifecycleState::Started);
/// connection.stop().unwrap();
/// assert!(connection.is_stopped());
/// ```
pub struct Managed<C> {
    lifecycle: ComponentLifecycle,
    component: C,
}

impl<C: LifecycleHooks> Managed<C> {
    pub fn new(component: C) -> Self {
        Self {
            lifecycle: ComponentLifecycle::new(),
            component,
        }
    }

    pub fn component(&self) -> &C {
        &self.component
    }

    pub fn into_inner(self) -> C {
        self.component
    }
}

impl<C: LifecycleHooks> Lifecycle for Managed<C> {
    fn start(&self) -> Result<(), LifecycleError> {
        self.lifecycle
            .start(self.component.component_name(), || self.component.do_start())
    }

    fn stop(&self) -> Result<(), LifecycleError> {
        self.lifecycle
            .stop(self.component.component_name(), || self.component.do_stop())
    }

    fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }
}

impl<C> Deref for Managed<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.component
    }
}

impl<C: fmt::Debug> fmt::Debug for Managed<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Managed")
            .field("state", &self.lifecycle.state())
            .field("component", &self.component)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_then_stop_walks_through_states() {
        let lifecycle = ComponentLifecycle::new();
        assert_eq!(lifecycle.state(), LifecycleState::Stopped);

        lifecycle
            .start("test", || {
                assert_eq!(lifecycle.state(), LifecycleState::Starting);
                Ok(())
            })
            .unwrap();
        assert_eq!(lifecycle.state(), LifecycleState::Started);

        lifecycle
            .stop("test", || {
                assert_eq!(lifecycle.state(), LifecycleState::Stopping);
                Ok(())
            })
            .unwrap();
        assert_eq!(lifecycle.state(), LifecycleState::Stopped);
    }

    #[test]
    fn test_stop_while_stopping_does_not_wait() {
        use std::sync::Arc;
        use std::thread;
        use std::time::{Duration, Instant};

        let lifecycle = Arc::new(ComponentLifecycle::new());
        lifecycle.start("test", || Ok(())).unwrap();

        let slow = {
            let lifecycle = lifecycle.clone();
            thread::spawn(move || {
                lifecycle.stop("test", || {
                    thread::sleep(Duration::from_millis(300));
                    Ok(())
                })
            })
        };
        while lifecycle.state() != LifecycleState::Stopping {
            thread::yield_now();
        }

        let begun = Instant::now();
        lifecycle.stop("test", || panic!("second stop hook ran")).unwrap();
        assert!(begun.elapsed() < Duration::from_millis(200));
        assert_eq!(lifecycle.state(), LifecycleState::Stopping);

        slow.join().unwrap().unwrap();
        assert_eq!(lifecycle.state(), LifecycleState::Stopped);
    }

    #[test]
    fn test_panicking_hook_fails_component() {
        let lifecycle = ComponentLifecycle::new();
        let err = lifecycle.start("test", || panic!("boom")).unwrap_err();

        assert_eq!(lifecycle.state(), LifecycleState::Failed);
        assert!(err.to_string().contains("boom"));
    }
}
