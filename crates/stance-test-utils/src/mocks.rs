//! Simulated joint handles for driving the control cycle in tests.

use std::sync::{Arc, Mutex, PoisonError};

use stance_core::JointHandle;

/// Shared state of one simulated joint.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SimJointState {
    pub position: f64,
    pub velocity: f64,
    /// Last effort command written by the controller.
    pub command: f64,
    /// Number of commands written so far.
    pub writes: u64,
}

/// A joint whose state lives behind a shared handle.
///
/// Cloning yields a second handle onto the same state, so a test can move
/// one copy into the controller and keep another for inspection.
#[derive(Debug, Clone)]
pub struct SimJoint {
    name: String,
    state: Arc<Mutex<SimJointState>>,
}

impl SimJoint {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::default(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimJointState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Overwrite the measured position and velocity.
    pub fn set_state(&self, position: f64, velocity: f64) {
        let mut s = self.lock();
        s.position = position;
        s.velocity = velocity;
    }

    pub fn state(&self) -> SimJointState {
        *self.lock()
    }

    pub fn command(&self) -> f64 {
        self.lock().command
    }
}

impl JointHandle for SimJoint {
    fn name(&self) -> &str {
        &self.name
    }

    fn position(&self) -> f64 {
        self.lock().position
    }

    fn velocity(&self) -> f64 {
        self.lock().velocity
    }

    fn set_command(&mut self, effort: f64) {
        let mut s = self.lock();
        s.command = effort;
        s.writes += 1;
    }
}

/// One simulated joint per name, in order.
pub fn sim_joints<S: AsRef<str>>(names: &[S]) -> Vec<SimJoint> {
    names.iter().map(|n| SimJoint::new(n.as_ref())).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
