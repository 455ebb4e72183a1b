//! Force-generation strategies selected by the arbiter.

use nalgebra::Vector3;
use thiserror::Error;

use stance_core::{BodyState, LegForces, N_LEGS};
use stance_model::ModelOutput;
use stance_mpc::MpcError;

// ---------------------------------------------------------------------------
// ModelSnapshot
// ---------------------------------------------------------------------------

/// Everything a strategy may read during one cycle.
///
/// Built once per cycle from the joint measurement and the input snapshots;
/// borrowed immutably by whichever strategy is active.
#[derive(Debug, Clone, Copy)]
pub struct ModelSnapshot<'a> {
    /// Cycle index since start (0-based).
    pub cycle: u64,
    /// Per-leg kinematics and dynamics, hip frame.
    pub model: &'a ModelOutput,
    /// Externally estimated floating-base state.
    pub body: &'a BodyState,
    /// Contact flags in leg order.
    pub contacts: [bool; N_LEGS],
    /// Hip origins in the body frame.
    pub hip_offsets: [Vector3<f64>; N_LEGS],
}

impl ModelSnapshot<'_> {
    /// Foot positions relative to the body origin, body frame.
    pub fn feet_in_body(&self) -> [Vector3<f64>; N_LEGS] {
        std::array::from_fn(|i| self.hip_offsets[i] + self.model.frames[i].foot_position)
    }
}

// ---------------------------------------------------------------------------
// ForceStrategy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StrategyError {
    #[error(transparent)]
    Mpc(#[from] MpcError),

    #[error("{0} produced a non-finite leg force")]
    NonFinite(String),
}

/// Capability shared by every controller that produces per-leg foot forces.
///
/// Strategies are dispatched dynamically so new ones can be plugged into
/// the arbiter without touching the control cycle.
pub trait ForceStrategy: Send {
    /// Called once when the strategy becomes authoritative.
    fn activate(&mut self, _snapshot: &ModelSnapshot<'_>) {}

    /// Foot force each leg should apply, hip frame.
    fn compute_leg_forces(&mut self, snapshot: &ModelSnapshot<'_>)
    -> Result<LegForces, StrategyError>;

    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Duration of the last optimization, if the strategy runs one.
    fn solve_time_us(&self) -> Option<u64> {
        None
    }

    /// World-frame ground-reaction forces of the last successful plan.
    fn reaction_forces(&self) -> Option<LegForces> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn feet_in_body_adds_hip_offset() {
        let mut model = ModelOutput::default();
        model.frames[1].foot_position = Vector3::new(0.08, 0.0, -0.6);
        let body = BodyState::default();
        let mut hips = [Vector3::zeros(); N_LEGS];
        hips[1] = Vector3::new(0.37, -0.2, 0.0);

        let snap = ModelSnapshot {
            cycle: 0,
            model: &model,
            body: &body,
            contacts: [true; N_LEGS],
            hip_offsets: hips,
        };
        let feet = snap.feet_in_body();
        assert_relative_eq!(feet[1], Vector3::new(0.45, -0.2, -0.6));
        assert_relative_eq!(feet[0], Vector3::zeros());
    }

    #[test]
    fn mpc_errors_pass_through() {
        let err: StrategyError = MpcError::SingularInertia.into();
        assert_eq!(err.to_string(), MpcError::SingularInertia.to_string());
    }
}
