//! Foot force to joint torque mapping with actuator saturation.

use nalgebra::{Matrix3, Vector3};

use stance_core::{JOINTS_PER_LEG, JointTorqueCommand, LegForces, LegFrame, N_JOINTS, N_LEGS};

/// Joint torques that produce `force` at the foot: `τ = Jᵀ f`.
pub fn jacobian_transpose_torques(jacobian: &Matrix3<f64>, force: &Vector3<f64>) -> Vector3<f64> {
    jacobian.tr_mul(force)
}

/// Saturated torques plus the number of joints that were clamped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TorqueOutput {
    pub torques: JointTorqueCommand,
    /// Joints clamped to their effort limit (or zeroed for a non-finite value).
    pub saturated: usize,
}

#[derive(Debug, Clone)]
pub struct ForceToTorqueConverter {
    effort_limits: [f64; N_JOINTS],
}

impl ForceToTorqueConverter {
    /// `effort_limits` are symmetric per-joint bounds in joint-vector order.
    pub fn new(effort_limits: [f64; N_JOINTS]) -> Self {
        Self {
            effort_limits: effort_limits.map(f64::abs),
        }
    }

    pub const fn effort_limits(&self) -> &[f64; N_JOINTS] {
        &self.effort_limits
    }

    pub fn to_torque(&self, forces: &LegForces, frames: &[LegFrame; N_LEGS]) -> TorqueOutput {
        let mut torques = [0.0; N_JOINTS];
        for (leg, (force, frame)) in forces.iter().zip(frames).enumerate() {
            let tau = jacobian_transpose_torques(&frame.jacobian, force);
            torques[leg * JOINTS_PER_LEG..(leg + 1) * JOINTS_PER_LEG].copy_from_slice(tau.as_slice());
        }

        let mut saturated = 0;
        for (tau, &limit) in torques.iter_mut().zip(&self.effort_limits) {
            if !tau.is_finite() {
                *tau = 0.0;
                saturated += 1;
            } else if tau.abs() > limit {
                *tau = tau.clamp(-limit, limit);
                saturated += 1;
            }
        }

        TorqueOutput {
            torques: JointTorqueCommand(torques),
            saturated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::Rng;
    use stance_core::Leg;
    use stance_test_utils::{hyq_model, random_measurement, seeded_rng};

    #[test]
    fn transpose_of_planar_leg() {
        // Two links of 0.3 m along -z rotating about y: J = [[-0.6, -0.3, 0], [0, 0, 0], [0, 0, 0]]
        let mut j = Matrix3::zeros();
        j[(0, 1)] = -0.6;
        j[(0, 2)] = -0.3;
        let tau = jacobian_transpose_torques(&j, &Vector3::new(10.0, 0.0, 5.0));
        assert_relative_eq!(tau, Vector3::new(0.0, -6.0, -3.0));
    }

    #[test]
    fn maps_each_leg_into_its_slice() {
        let mut frames = [LegFrame::default(); N_LEGS];
        frames[2].jacobian = Matrix3::identity();
        let mut forces = LegForces::zeros();
        forces[Leg::LeftHind] = Vector3::new(1.0, 2.0, 3.0);

        let out = ForceToTorqueConverter::new([100.0; N_JOINTS]).to_torque(&forces, &frames);
        assert_eq!(out.saturated, 0);
        assert_relative_eq!(out.torques.leg(Leg::LeftHind), Vector3::new(1.0, 2.0, 3.0));
        assert_relative_eq!(out.torques.leg(Leg::LeftFront), Vector3::zeros());
    }

    #[test]
    fn clamps_and_counts() {
        let mut frames = [LegFrame::default(); N_LEGS];
        frames[0].jacobian = Matrix3::identity();
        let mut forces = LegForces::zeros();
        forces[Leg::LeftFront] = Vector3::new(500.0, -500.0, 20.0);

        let out = ForceToTorqueConverter::new([150.0; N_JOINTS]).to_torque(&forces, &frames);
        assert_eq!(out.saturated, 2);
        assert_eq!(&out.torques.0[..3], &[150.0, -150.0, 20.0]);
    }

    #[test]
    fn non_finite_torque_is_zeroed() {
        // A NaN Jacobian entry poisons only the joint whose column holds it.
        let mut frames = [LegFrame::default(); N_LEGS];
        frames[1].jacobian = Matrix3::identity();
        frames[1].jacobian[(0, 1)] = f64::NAN;
        let mut forces = LegForces::zeros();
        forces[Leg::RightFront] = Vector3::new(1.0, 2.0, 3.0);

        let out = ForceToTorqueConverter::new([150.0; N_JOINTS]).to_torque(&forces, &frames);
        assert_eq!(out.saturated, 1);
        assert_eq!(out.torques.leg(Leg::RightFront), Vector3::new(1.0, 0.0, 3.0));
    }

    #[test]
    fn non_finite_force_zeroes_the_whole_leg() {
        // 0 · NaN is NaN, so every joint of the leg sees it.
        let mut frames = [LegFrame::default(); N_LEGS];
        frames[1].jacobian = Matrix3::identity();
        let mut forces = LegForces::zeros();
        forces[Leg::RightFront] = Vector3::new(f64::NAN, f64::INFINITY, 1.0);

        let out = ForceToTorqueConverter::new([150.0; N_JOINTS]).to_torque(&forces, &frames);
        assert_eq!(out.saturated, 3);
        assert_eq!(out.torques.leg(Leg::RightFront), Vector3::zeros());
        assert_eq!(out.torques.leg(Leg::LeftFront), Vector3::zeros());
    }

    #[test]
    fn never_exceeds_effort_limits() {
        let model = hyq_model();
        let converter = ForceToTorqueConverter::new(model.effort_limits());
        let mut rng = seeded_rng(11);

        for _ in 0..200 {
            let measurement = random_measurement(&mut rng, 1.0, 2.0);
            let output = model.evaluate(&measurement);
            let scale = 10f64.powi(rng.gen_range(0..7));
            let forces = LegForces(std::array::from_fn(|_| {
                Vector3::new(
                    rng.gen_range(-scale..scale),
                    rng.gen_range(-scale..scale),
                    rng.gen_range(-scale..scale),
                )
            }));

            let out = converter.to_torque(&forces, &output.frames);
            for (tau, limit) in out.torques.0.iter().zip(converter.effort_limits()) {
                assert!(tau.abs() <= *limit, "{tau} exceeds {limit}");
            }
        }
    }
}
