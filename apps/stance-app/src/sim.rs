//! Compliant loopback joints standing in for the actuator bank.
//!
//! Each joint is a rotor held at its start position by a stiff torsional
//! spring. A written effort is integrated for one control period, so the
//! controller sees its own commands reflected in the next measurement.

use stance_core::JointHandle;
use stance_model::RobotModel;

const ROTOR_INERTIA: f64 = 0.05;
const HOLDING_STIFFNESS: f64 = 2_000.0;
const HOLDING_DAMPING: f64 = 40.0;

#[derive(Debug, Clone)]
pub struct LoopbackJoint {
    name: String,
    rest: f64,
    position: f64,
    velocity: f64,
    dt: f64,
}

impl LoopbackJoint {
    pub fn new(name: impl Into<String>, rest: f64, dt: f64) -> Self {
        Self {
            name: name.into(),
            rest,
            position: rest,
            velocity: 0.0,
            dt,
        }
    }
}

impl JointHandle for LoopbackJoint {
    fn name(&self) -> &str {
        &self.name
    }

    fn position(&self) -> f64 {
        self.position
    }

    fn velocity(&self) -> f64 {
        self.velocity
    }

    fn set_command(&mut self, effort: f64) {
        let spring = HOLDING_STIFFNESS * (self.rest - self.position);
        let accel = (effort + spring - HOLDING_DAMPING * self.velocity) / ROTOR_INERTIA;
        // Semi-implicit Euler.
        self.velocity += accel * self.dt;
        self.position += self.velocity * self.dt;
    }
}

/// One loopback joint per model joint, resting at the zero configuration.
/// Returned in reverse model order; the control cycle matches them by name.
pub fn loopback_joints(model: &RobotModel, dt: f64) -> Vec<LoopbackJoint> {
    model
        .joint_names()
        .iter()
        .rev()
        .map(|name| LoopbackJoint::new(*name, 0.0, dt))
        .collect()
}
