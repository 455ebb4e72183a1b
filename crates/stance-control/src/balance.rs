//! Predictive balance strategy built on [`BalanceMpc`].

use nalgebra::Rotation3;
use tracing::info;

use stance_core::{ConfigError, LegForces};
use stance_mpc::{BalanceMpc, MpcConfig, MpcSolution, RigidBody};

use crate::strategy::{ForceStrategy, ModelSnapshot, StrategyError};

/// Convert world-frame ground-reaction forces on the body into the force
/// each foot must exert, expressed in the body (hip) frame: `f = −Rᵀ F`.
pub fn reaction_to_leg_forces(rotation: &Rotation3<f64>, reaction: &LegForces) -> LegForces {
    let inverse = rotation.inverse();
    LegForces(reaction.0.map(|f| -(inverse * f)))
}

/// Receding-horizon balance controller.
///
/// The reference pose is latched from the measured state when the strategy
/// is activated and held for the rest of the session.
#[derive(Debug)]
pub struct MpcBalance {
    mpc: BalanceMpc,
    last: Option<MpcSolution>,
}

impl MpcBalance {
    pub fn new(config: MpcConfig, body: &RigidBody, dt: f64) -> Result<Self, ConfigError> {
        Ok(Self {
            mpc: BalanceMpc::new(config, body, dt)?,
            last: None,
        })
    }

    pub const fn mpc(&self) -> &BalanceMpc {
        &self.mpc
    }

    /// Last successful solve.
    pub const fn last_solution(&self) -> Option<&MpcSolution> {
        self.last.as_ref()
    }
}

impl ForceStrategy for MpcBalance {
    fn activate(&mut self, snapshot: &ModelSnapshot<'_>) {
        let feet = snapshot.feet_in_body();
        self.mpc.set_reference(snapshot.body, &feet);
        info!(
            cycle = snapshot.cycle,
            x = snapshot.body.position.x,
            y = snapshot.body.position.y,
            z = snapshot.body.position.z,
            "Balance reference latched"
        );
    }

    fn compute_leg_forces(
        &mut self,
        snapshot: &ModelSnapshot<'_>,
    ) -> Result<LegForces, StrategyError> {
        self.mpc.set_state(snapshot.body, &snapshot.feet_in_body());
        self.mpc.set_contacts(snapshot.contacts);

        let solution = self.mpc.solve()?;
        let forces = reaction_to_leg_forces(&snapshot.body.rotation(), &solution.forces);
        self.last = Some(solution);
        Ok(forces)
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "mpc"
    }

    fn solve_time_us(&self) -> Option<u64> {
        self.last.as_ref().map(|s| s.solve_time_us)
    }

    fn reaction_forces(&self) -> Option<LegForces> {
        self.last.as_ref().map(|s| s.forces)
    }
}
