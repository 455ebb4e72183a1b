//! Joint-space dynamics of one leg via recursive Newton-Euler.
//!
//! The leg base (the body) is treated as fixed; gravity enters as a uniform
//! upward acceleration of the base, so
//!
//! ```text
//! τ = M(q) q̈ + C(q, q̇) q̇ + G(q)
//! ```
//!
//! is obtained from a single forward/backward sweep. The individual terms
//! are recovered by evaluating the sweep with selected inputs zeroed:
//!
//! - `G(q)        = rnea(q, 0, 0, g)`
//! - `C(q, q̇) q̇  = rnea(q, q̇, 0, 0)`
//! - `M(q) e_j    = rnea(q, 0, e_j, 0)`

use nalgebra::{Matrix3, Vector3};

use stance_core::{JOINTS_PER_LEG, LegDynamics};

use crate::chain::{JointFrames, LegChain};

/// Joint torques required to realize `qdd` at `(frames, qd)` under `gravity`.
///
/// `gravity` is the gravitational acceleration in the body frame, e.g.
/// `(0, 0, -9.81)`. All quantities are expressed in the body frame.
pub fn inverse_dynamics(
    chain: &LegChain,
    frames: &JointFrames,
    qd: &Vector3<f64>,
    qdd: &Vector3<f64>,
    gravity: &Vector3<f64>,
) -> Vector3<f64> {
    let joints = chain.joints();

    let mut omega = [Vector3::zeros(); JOINTS_PER_LEG];
    let mut alpha = [Vector3::zeros(); JOINTS_PER_LEG];
    let mut com = [Vector3::zeros(); JOINTS_PER_LEG];
    let mut com_acc = [Vector3::zeros(); JOINTS_PER_LEG];
    let mut inertia = [Matrix3::zeros(); JOINTS_PER_LEG];

    // --- Forward sweep: link velocities and accelerations ---
    let mut prev_omega = Vector3::zeros();
    let mut prev_alpha = Vector3::zeros();
    let mut prev_origin = Vector3::zeros();
    let mut origin_acc = -gravity;

    for i in 0..JOINTS_PER_LEG {
        let z = frames.axes[i];
        let origin = frames.origins[i];

        // Joint origin as a point of the parent link.
        let r = origin - prev_origin;
        origin_acc += prev_alpha.cross(&r) + prev_omega.cross(&prev_omega.cross(&r));

        omega[i] = prev_omega + z * qd[i];
        alpha[i] = prev_alpha + z * qdd[i] + prev_omega.cross(&(z * qd[i]));

        let rotation = frames.link_rotations[i].to_rotation_matrix();
        com[i] = origin + rotation * joints[i].com;
        let rc = com[i] - origin;
        com_acc[i] = origin_acc + alpha[i].cross(&rc) + omega[i].cross(&omega[i].cross(&rc));
        inertia[i] = rotation * joints[i].inertia * rotation.transpose();

        prev_omega = omega[i];
        prev_alpha = alpha[i];
        prev_origin = origin;
    }

    // --- Backward sweep: link wrenches, projected on joint axes ---
    let mut tau = Vector3::zeros();
    let mut child_force = Vector3::zeros();
    let mut child_moment = Vector3::zeros();
    let mut child_origin = frames.foot;

    for i in (0..JOINTS_PER_LEG).rev() {
        let origin = frames.origins[i];
        let inertial_force = joints[i].mass * com_acc[i];

        let force = inertial_force + child_force;
        let moment = inertia[i] * alpha[i]
            + omega[i].cross(&(inertia[i] * omega[i]))
            + (com[i] - origin).cross(&inertial_force)
            + child_moment
            + (child_origin - origin).cross(&child_force);

        tau[i] = frames.axes[i].dot(&moment);

        child_force = force;
        child_moment = moment;
        child_origin = origin;
    }

    tau
}

/// Inertia matrix, Coriolis torque and gravity torque of one leg.
pub fn leg_dynamics(
    chain: &LegChain,
    frames: &JointFrames,
    qd: &Vector3<f64>,
    gravity: &Vector3<f64>,
) -> LegDynamics {
    let zero = Vector3::zeros();

    let mut inertia = Matrix3::zeros();
    for j in 0..JOINTS_PER_LEG {
        let mut unit = Vector3::zeros();
        unit[j] = 1.0;
        inertia.set_column(j, &inverse_dynamics(chain, frames, &zero, &unit, &zero));
    }

    LegDynamics {
        inertia,
        coriolis: inverse_dynamics(chain, frames, qd, &zero, &zero),
        gravity: inverse_dynamics(chain, frames, &zero, &zero, gravity),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
