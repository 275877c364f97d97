use std::cell::Cell;

use btpool_api::errors::LifecycleError;
use btpool_api::lifecycle::{Lifecycle, LifecycleState};

/// Minimal single-threaded component used to exercise the provided predicates
struct Switch {
    state: Cell<LifecycleState>,
}

impl Lifecycle for Switch {
    fn start(&self) -> Result<(), LifecycleError> {
        self.state.set(LifecycleState::Started);
        Ok(())
    }

    fn stop(&self) -> Result<(), LifecycleError> {
        self.state.set(LifecycleState::Stopped);
        Ok(())
    }

    fn state(&self) -> LifecycleState {
        self.state.get()
    }
}

#[test]
fn test_predicates_follow_state() {
    let switch = Switch {
        state: Cell::new(LifecycleState::Stopped),
    };
    assert!(switch.is_stopped());
    assert!(!switch.is_running());

    switch.start().unwrap();
    assert!(switch.is_started());
    assert!(switch.is_running());

    switch.state.set(LifecycleState::Starting);
    assert!(switch.is_starting());
    assert!(switch.is_running());

    switch.state.set(LifecycleState::Stopping);
    assert!(switch.is_stopping());
    assert!(!switch.is_running());

    switch.state.set(LifecycleState::Failed);
    assert!(switch.is_failed());
    assert!(!switch.is_running());
}

#[test]
fn test_state_codes_round_trip() {
    for state in [
        LifecycleState::Failed,
        LifecycleState::Stopped,
        LifecycleState::Starting,
        LifecycleState::Started,
        LifecycleState::Stopping,
    ] {
        assert_eq!(LifecycleState::from_code(state.code()), state);
    }
    assert_eq!(LifecycleState::from_code(-7), LifecycleState::Failed);
}

#[test]
fn test_state_display() {
    assert_eq!(LifecycleState::Started.to_string(), "started");
    assert_eq!(LifecycleState::Failed.to_string(), "failed");
}
