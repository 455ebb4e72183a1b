//! Fixed-size value types shared by every stance crate.

use std::fmt;

use nalgebra::{Matrix3, Rotation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Number of legs. Fixed for the lifetime of the controller.
pub const N_LEGS: usize = 4;
/// Revolute joints per leg: hip abduction/adduction, hip flexion, knee.
pub const JOINTS_PER_LEG: usize = 3;
/// Total actuated joints.
pub const N_JOINTS: usize = N_LEGS * JOINTS_PER_LEG;

// ---------------------------------------------------------------------------
// Leg
// ---------------------------------------------------------------------------

/// Leg identifier, in joint-vector order.
///
/// Joint `i` of the 12-vector belongs to leg `i / 3` with local index `i % 3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Leg {
    LeftFront,
    RightFront,
    LeftHind,
    RightHind,
}

impl Leg {
    pub const ALL: [Self; N_LEGS] = [
        Self::LeftFront,
        Self::RightFront,
        Self::LeftHind,
        Self::RightHind,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    /// Position of local joint `local` of this leg in the 12-vector.
    pub const fn joint_index(self, local: usize) -> usize {
        self.index() * JOINTS_PER_LEG + local
    }

    pub const fn short_name(self) -> &'static str {
        match self {
            Self::LeftFront => "lf",
            Self::RightFront => "rf",
            Self::LeftHind => "lh",
            Self::RightHind => "rh",
        }
    }
}

impl fmt::Display for Leg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

// ---------------------------------------------------------------------------
// JointMeasurement
// ---------------------------------------------------------------------------

/// Joint positions (rad) and velocities (rad/s) read at the start of a cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointMeasurement {
    pub position: [f64; N_JOINTS],
    pub velocity: [f64; N_JOINTS],
}

impl JointMeasurement {
    pub const fn zeros() -> Self {
        Self {
            position: [0.0; N_JOINTS],
            velocity: [0.0; N_JOINTS],
        }
    }

    /// Joint positions of one leg in chain order.
    pub fn leg_position(&self, leg: Leg) -> Vector3<f64> {
        let base = leg.joint_index(0);
        Vector3::new(
            self.position[base],
            self.position[base + 1],
            self.position[base + 2],
        )
    }

    /// Joint velocities of one leg in chain order.
    pub fn leg_velocity(&self, leg: Leg) -> Vector3<f64> {
        let base = leg.joint_index(0);
        Vector3::new(
            self.velocity[base],
            self.velocity[base + 1],
            self.velocity[base + 2],
        )
    }
}

impl Default for JointMeasurement {
    fn default() -> Self {
        Self::zeros()
    }
}

// ---------------------------------------------------------------------------
// LegFrame / LegDynamics
// ---------------------------------------------------------------------------

/// Per-leg kinematic quantities, expressed in the leg's hip frame.
///
/// The hip frame is the body frame translated to the first joint origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LegFrame {
    /// Foot position relative to the hip origin (m).
    pub foot_position: Vector3<f64>,
    /// Foot linear velocity (m/s).
    pub foot_velocity: Vector3<f64>,
    /// Linear Jacobian: `foot_velocity = jacobian * qdot`.
    pub jacobian: Matrix3<f64>,
}

impl Default for LegFrame {
    fn default() -> Self {
        Self {
            foot_position: Vector3::zeros(),
            foot_velocity: Vector3::zeros(),
            jacobian: Matrix3::zeros(),
        }
    }
}

/// Joint-space dynamics terms of one leg.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LegDynamics {
    /// Joint-space inertia matrix `M(q)`.
    pub inertia: Matrix3<f64>,
    /// Coriolis and centrifugal torque `C(q, qdot) qdot`.
    pub coriolis: Vector3<f64>,
    /// Torque required to hold the leg against gravity, `G(q)`.
    pub gravity: Vector3<f64>,
}

impl Default for LegDynamics {
    fn default() -> Self {
        Self {
            inertia: Matrix3::zeros(),
            coriolis: Vector3::zeros(),
            gravity: Vector3::zeros(),
        }
    }
}

// ---------------------------------------------------------------------------
// BodyState
// ---------------------------------------------------------------------------

/// Floating-base state supplied by the external estimator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyState {
    /// Body origin in world frame (m).
    pub position: Vector3<f64>,
    /// Body linear velocity in world frame (m/s).
    pub linear_velocity: Vector3<f64>,
    /// Body orientation (body to world).
    pub orientation: UnitQuaternion<f64>,
    /// Angular velocity in world frame (rad/s).
    pub angular_velocity: Vector3<f64>,
}

impl BodyState {
    /// Body at rest at `position` with identity orientation.
    pub fn at_rest(position: Vector3<f64>) -> Self {
        Self {
            position,
            linear_velocity: Vector3::zeros(),
            orientation: UnitQuaternion::identity(),
            angular_velocity: Vector3::zeros(),
        }
    }

    /// Orientation as a 3x3 rotation matrix.
    pub fn rotation(&self) -> Rotation3<f64> {
        self.orientation.to_rotation_matrix()
    }
}

impl Default for BodyState {
    fn default() -> Self {
        Self::at_rest(Vector3::zeros())
    }
}

// ---------------------------------------------------------------------------
// ControllerMode
// ---------------------------------------------------------------------------

/// Which force generator is authoritative this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerMode {
    /// Virtual spring-damper settling phase.
    #[default]
    Settling,
    /// Predictive balance control.
    Balancing,
}

impl fmt::Display for ControllerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Settling => f.write_str("settling"),
            Self::Balancing => f.write_str("balancing"),
        }
    }
}

// ---------------------------------------------------------------------------
// LegForces
// ---------------------------------------------------------------------------

/// Cartesian force commanded at each foot, in the hip frame (N).
///
/// This is the output of whichever controller is active and the input of
/// torque conversion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LegForces(pub [Vector3<f64>; N_LEGS]);

impl LegForces {
    pub fn zeros() -> Self {
        Self([Vector3::zeros(); N_LEGS])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Vector3<f64>> {
        self.0.iter()
    }

    /// Sum of all leg forces.
    pub fn total(&self) -> Vector3<f64> {
        self.0.iter().sum()
    }

    /// Whether every component is finite.
    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|f| f.iter().all(|c| c.is_finite()))
    }
}

impl Default for LegForces {
    fn default() -> Self {
        Self::zeros()
    }
}

impl std::ops::Index<Leg> for LegForces {
    type Output = Vector3<f64>;
    fn index(&self, leg: Leg) -> &Vector3<f64> {
        &self.0[leg.index()]
    }
}

impl std::ops::IndexMut<Leg> for LegForces {
    fn index_mut(&mut self, leg: Leg) -> &mut Vector3<f64> {
        &mut self.0[leg.index()]
    }
}

// ---------------------------------------------------------------------------
// Joint-space vectors
// ---------------------------------------------------------------------------

/// Final per-joint effort command (Nm), already saturated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointTorqueCommand(pub [f64; N_JOINTS]);

impl JointTorqueCommand {
    pub const fn zeros() -> Self {
        Self([0.0; N_JOINTS])
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Torques of one leg in chain order.
    pub fn leg(&self, leg: Leg) -> Vector3<f64> {
        let base = leg.joint_index(0);
        Vector3::new(self.0[base], self.0[base + 1], self.0[base + 2])
    }
}

impl Default for JointTorqueCommand {
    fn default() -> Self {
        Self::zeros()
    }
}

/// External joint-space command vector, validated to length [`N_JOINTS`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointCommand(pub [f64; N_JOINTS]);

impl Default for JointCommand {
    fn default() -> Self {
        Self([0.0; N_JOINTS])
    }
}

/// Proportional/derivative gain pair of one joint.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct JointGain {
    pub p: f64,
    pub d: f64,
}

/// Gains of all joints in joint-vector order.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct JointGains(pub [JointGain; N_JOINTS]);

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn joint_indices_follow_leg_order() {
        assert_eq!(Leg::LeftFront.joint_index(0), 0);
        assert_eq!(Leg::RightFront.joint_index(2), 5);
        assert_eq!(Leg::LeftHind.joint_index(1), 7);
        assert_eq!(Leg::RightHind.joint_index(2), N_JOINTS - 1);
        for (i, leg) in Leg::ALL.iter().enumerate() {
            assert_eq!(leg.index(), i);
        }
    }

    #[test]
    fn leg_slices_of_measurement() {
        let mut m = JointMeasurement::zeros();
        for i in 0..N_JOINTS {
            m.position[i] = i as f64;
            m.velocity[i] = -(i as f64);
        }
        assert_eq!(m.leg_position(Leg::LeftHind), Vector3::new(6.0, 7.0, 8.0));
        assert_eq!(m.leg_velocity(Leg::RightFront), Vector3::new(-3.0, -4.0, -5.0));
    }

    #[test]
    fn leg_forces_total_and_index() {
        let mut f = LegForces::zeros();
        f[Leg::LeftFront] = Vector3::new(1.0, 0.0, 10.0);
        f[Leg::RightHind] = Vector3::new(-1.0, 2.0, 20.0);
        assert_relative_eq!(f.total(), Vector3::new(0.0, 2.0, 30.0));
        assert!(f.is_finite());

        f[Leg::LeftHind].z = f64::NAN;
        assert!(!f.is_finite());
    }

    #[test]
    fn body_state_rotation_is_identity_at_rest() {
        let body = BodyState::at_rest(Vector3::new(0.0, 0.0, 0.6));
        assert_relative_eq!(body.rotation().into_inner(), Matrix3::identity());
    }

    #[test]
    fn mode_display() {
        assert_eq!(ControllerMode::Settling.to_string(), "settling");
        assert_eq!(ControllerMode::Balancing.to_string(), "balancing");
        assert_eq!(ControllerMode::default(), ControllerMode::Settling);
    }
}
