//! Virtual spring-damper settling controller.
//!
//! Each foot is pulled towards a fixed standing position in its hip frame:
//!
//! ```text
//! f = Kp ∘ (p_des − p) + Kd ∘ (0 − v) + G
//! ```
//!
//! with per-axis gains and the leg's gravity torque `G` added per axis as
//! feed-forward. The controller is stateless.

use nalgebra::Vector3;

use stance_core::{LegDynamics, LegForces, LegFrame, N_LEGS};

use crate::config::VsdConfig;
use crate::strategy::{ForceStrategy, ModelSnapshot, StrategyError};

#[derive(Debug, Clone)]
pub struct VirtualSpringDamper {
    stiffness: [Vector3<f64>; N_LEGS],
    damping: [Vector3<f64>; N_LEGS],
    standing_foot: [Vector3<f64>; N_LEGS],
}

impl VirtualSpringDamper {
    pub fn new(config: &VsdConfig) -> Self {
        Self {
            stiffness: config.stiffness.map(Vector3::from),
            damping: config.damping.map(Vector3::from),
            standing_foot: config.standing_foot.map(Vector3::from),
        }
    }

    /// Desired foot positions in the hip frame.
    pub const fn standing_foot(&self) -> &[Vector3<f64>; N_LEGS] {
        &self.standing_foot
    }

    pub fn compute(
        &self,
        frames: &[LegFrame; N_LEGS],
        dynamics: &[LegDynamics; N_LEGS],
    ) -> LegForces {
        LegForces(std::array::from_fn(|leg| {
            let frame = &frames[leg];
            let spring = self.stiffness[leg].component_mul(&(self.standing_foot[leg] - frame.foot_position));
            let damper = self.damping[leg].component_mul(&(-frame.foot_velocity));
            spring + damper + dynamics[leg].gravity
        }))
    }
}

impl ForceStrategy for VirtualSpringDamper {
    fn compute_leg_forces(
        &mut self,
        snapshot: &ModelSnapshot<'_>,
    ) -> Result<LegForces, StrategyError> {
        Ok(self.compute(&snapshot.model.frames, &snapshot.model.dynamics))
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "vsd"
    }
}
