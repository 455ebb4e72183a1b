//! Whole-robot model: four leg chains evaluated together each cycle.

use nalgebra::Vector3;

use stance_core::{InitError, JointMeasurement, Leg, LegDynamics, LegFrame, N_JOINTS, N_LEGS};

use crate::chain::{LegChain, LegChainSpec};
use crate::dynamics::leg_dynamics;

/// Per-cycle output of [`RobotModel::evaluate`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelOutput {
    pub frames: [LegFrame; N_LEGS],
    pub dynamics: [LegDynamics; N_LEGS],
}

/// Kinematics and dynamics of all four legs.
///
/// Evaluation is a pure function of the joint measurement and the static
/// chain parameters captured at construction.
#[derive(Debug, Clone)]
pub struct RobotModel {
    chains: [LegChain; N_LEGS],
    gravity: Vector3<f64>,
}

impl RobotModel {
    /// Build the model from one chain description per leg.
    ///
    /// `gravity` is the gravitational acceleration magnitude; it acts along
    /// `-z` of the body frame.
    ///
    /// # Errors
    ///
    /// - [`InitError::LegCountMismatch`] if `specs` does not describe
    ///   exactly [`N_LEGS`] legs.
    /// - [`InitError::MissingJoint`] if a leg is missing or duplicated.
    /// - [`InitError::ChainConstruction`] if a chain is malformed.
    pub fn from_specs(specs: &[LegChainSpec], gravity: f64) -> Result<Self, InitError> {
        if specs.len() != N_LEGS {
            return Err(InitError::LegCountMismatch {
                expected: N_LEGS,
                got: specs.len(),
            });
        }

        let mut slots: [Option<LegChain>; N_LEGS] = Default::default();
        for spec in specs {
            let slot = &mut slots[spec.leg.index()];
            if slot.is_some() {
                return Err(InitError::ChainConstruction {
                    leg: spec.leg.to_string(),
                    reason: "leg described more than once".into(),
                });
            }
            *slot = Some(LegChain::from_spec(spec)?);
        }

        let [lf, rf, lh, rh] = slots;
        let missing = |leg: Leg| InitError::MissingJoint(format!("no chain for leg {leg}"));
        let chains = [
            lf.ok_or_else(|| missing(Leg::LeftFront))?,
            rf.ok_or_else(|| missing(Leg::RightFront))?,
            lh.ok_or_else(|| missing(Leg::LeftHind))?,
            rh.ok_or_else(|| missing(Leg::RightHind))?,
        ];

        Ok(Self {
            chains,
            gravity: Vector3::new(0.0, 0.0, -gravity),
        })
    }

    pub const fn chains(&self) -> &[LegChain; N_LEGS] {
        &self.chains
    }

    pub fn chain(&self, leg: Leg) -> &LegChain {
        &self.chains[leg.index()]
    }

    /// Gravity vector in the body frame.
    pub const fn gravity(&self) -> &Vector3<f64> {
        &self.gravity
    }

    /// Joint names in joint-vector order.
    pub fn joint_names(&self) -> [&str; N_JOINTS] {
        let mut names = [""; N_JOINTS];
        for chain in &self.chains {
            for (local, name) in chain.joint_names().into_iter().enumerate() {
                names[chain.leg().joint_index(local)] = name;
            }
        }
        names
    }

    /// Symmetric effort limits in joint-vector order.
    pub fn effort_limits(&self) -> [f64; N_JOINTS] {
        let mut limits = [0.0; N_JOINTS];
        for chain in &self.chains {
            for (local, joint) in chain.joints().iter().enumerate() {
                limits[chain.leg().joint_index(local)] = joint.effort_limit;
            }
        }
        limits
    }

    /// Hip origins in the body frame, by leg.
    pub fn hip_offsets(&self) -> [Vector3<f64>; N_LEGS] {
        self.chains.each_ref().map(LegChain::hip_offset)
    }

    /// Evaluate kinematics and dynamics for every leg.
    pub fn evaluate(&self, measurement: &JointMeasurement) -> ModelOutput {
        let mut out = ModelOutput::default();

        for chain in &self.chains {
            let leg = chain.leg();
            let q = measurement.leg_position(leg);
            let qd = measurement.leg_velocity(leg);

            let frames = chain.joint_frames(&q);
            let jacobian = LegChain::jacobian(&frames);

            out.frames[leg.index()] = LegFrame {
                foot_position: frames.foot - chain.hip_offset(),
                foot_velocity: jacobian * qd,
                jacobian,
            };
            out.dynamics[leg.index()] = leg_dynamics(chain, &frames, &qd, &self.gravity);
        }

        out
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;
    use stance_core::JOINTS_PER_LEG;

    use crate::presets;

    fn hyq() -> RobotModel {
        RobotModel::from_specs(&presets::hyq_legs(), 9.81).unwrap()
    }

    #[test]
    fn joint_names_in_vector_order() {
        let model = hyq();
        let names = model.joint_names();
        assert_eq!(names[0], "lf_haa_joint");
        assert_eq!(names[4], "rf_hfe_joint");
        assert_eq!(names[11], "rh_kfe_joint");
    }

    #[test]
    fn specs_in_any_order_map_to_legs() {
        let mut specs = presets::hyq_legs();
        specs.reverse();
        let model = RobotModel::from_specs(&specs, 9.81).unwrap();
        assert_eq!(model.chain(Leg::LeftFront).leg(), Leg::LeftFront);
        assert_eq!(model.joint_names()[0], "lf_haa_joint");
    }

    #[test]
    fn missing_leg_is_fatal() {
        let specs = presets::hyq_legs();
        let err = RobotModel::from_specs(&specs[..3], 9.81).unwrap_err();
        assert!(matches!(err, InitError::LegCountMismatch { expected: 4, got: 3 }));
    }

    #[test]
    fn leg_count_error_names_legs() {
        // Three legs with an extra joint each still carry twelve joints.
        let mut specs = presets::hyq_legs()[..3].to_vec();
        for spec in &mut specs {
            let extra = spec.joints[2].clone();
            spec.joints.push(extra);
        }
        let err = RobotModel::from_specs(&specs, 9.81).unwrap_err();
        assert_eq!(err.to_string(), "Leg count mismatch: expected 4, got 3");
    }

    #[test]
    fn duplicated_leg_is_fatal() {
        let mut specs = presets::hyq_legs();
        specs[3] = specs[0].clone();
        assert!(matches!(
            RobotModel::from_specs(&specs, 9.81),
            Err(InitError::ChainConstruction { .. })
        ));
    }

    #[test]
    fn zero_configuration_is_home_pose() {
        let model = hyq();
        let out = model.evaluate(&JointMeasurement::zeros());
        for (leg, frame) in Leg::ALL.iter().zip(&out.frames) {
            let sx = if matches!(leg, Leg::LeftFront | Leg::RightFront) { 1.0 } else { -1.0 };
            assert_relative_eq!(
                frame.foot_position,
                Vector3::new(sx * 0.08, 0.0, -0.68),
                epsilon = 1e-12
            );
            assert_relative_eq!(frame.foot_velocity, Vector3::zeros());
        }
    }

    #[test]
    fn foot_velocity_is_jacobian_times_qdot() {
        let model = hyq();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut m = JointMeasurement::zeros();
        for i in 0..N_JOINTS {
            m.position[i] = rng.gen_range(-1.0..1.0);
            m.velocity[i] = rng.gen_range(-2.0..2.0);
        }
        let out = model.evaluate(&m);

        // Compare against a finite difference of foot position along qdot.
        let h = 1e-6;
        let mut ahead = m;
        let mut behind = m;
        for i in 0..N_JOINTS {
            ahead.position[i] += h * m.velocity[i];
            behind.position[i] -= h * m.velocity[i];
        }
        let fa = model.evaluate(&ahead);
        let fb = model.evaluate(&behind);
        for leg in 0..N_LEGS {
            let numeric = (fa.frames[leg].foot_position - fb.frames[leg].foot_position) / (2.0 * h);
            assert_relative_eq!(out.frames[leg].foot_velocity, numeric, epsilon = 1e-6);
        }
    }

    #[test]
    fn jacobian_matches_numeric_at_random_configurations() {
        let model = hyq();
        let mut rng = ChaCha8Rng::seed_from_u64(2024);
        let h = 1e-6;

        for _ in 0..20 {
            let mut m = JointMeasurement::zeros();
            for q in &mut m.position {
                *q = rng.gen_range(-1.5..1.5);
            }
            let out = model.evaluate(&m);

            for leg in Leg::ALL {
                for local in 0..JOINTS_PER_LEG {
                    let idx = leg.joint_index(local);
                    let mut plus = m;
                    let mut minus = m;
                    plus.position[idx] += h;
                    minus.position[idx] -= h;
                    let col = (model.evaluate(&plus).frames[leg.index()].foot_position
                        - model.evaluate(&minus).frames[leg.index()].foot_position)
                        / (2.0 * h);
                    assert_relative_eq!(
                        out.frames[leg.index()].jacobian.column(local).into_owned(),
                        col,
                        epsilon = 1e-7
                    );
                }
            }
        }
    }

    #[test]
    fn evaluation_is_deterministic() {
        let model = hyq();
        let mut m = JointMeasurement::zeros();
        m.position[1] = 0.6;
        m.position[2] = -1.2;
        m.velocity[2] = 0.4;
        let a = model.evaluate(&m);
        let b = model.evaluate(&m);
        assert_eq!(a.frames, b.frames);
        assert_eq!(a.dynamics, b.dynamics);
    }

    #[test]
    fn effort_limits_follow_joint_order() {
        let limits = hyq().effort_limits();
        assert!(limits.iter().all(|&l| (l - 150.0).abs() < 1e-12));
    }

    #[test]
    fn nan_input_propagates() {
        let model = hyq();
        let mut m = JointMeasurement::zeros();
        m.position[0] = f64::NAN;
        let out = model.evaluate(&m);
        assert!(out.frames[0].foot_position.iter().any(|v| v.is_nan()));
        assert!(out.frames[1].foot_position.iter().all(|v| v.is_finite()));
    }
}
