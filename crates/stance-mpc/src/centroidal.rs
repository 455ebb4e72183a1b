//! Linearized centroidal dynamics of the trunk.
//!
//! The state vector is 13-dimensional:
//!
//! ```text
//! x = [θ(3), p(3), ω(3), v(3), g(1)]
//! ```
//!
//! where `θ` is the world-frame rotation vector of the orientation error
//! `R R_refᵀ`, `p` the center of mass and `ω`, `v` the world-frame angular
//! and linear velocity. With the leg forces `f_i` acting on the body at
//! `r_i` (foot relative to the center of mass, world frame):
//!
//! - θ̇ = ω
//! - ṗ = v
//! - ω̇ = I_world⁻¹ Σ r_i × f_i,   I_world = R I_body Rᵀ
//! - v̇ = Σ f_i / m − g e_z
//! - ġ = 0
//!
//! Both the rotation and the foot geometry are frozen at the current
//! measurement, which makes the model linear in the forces.

use nalgebra::{Matrix3, SMatrix, Vector3};

use stance_core::N_LEGS;

use crate::types::{CONTROL_DIM, Discretization, InputMatrix, MpcError, STATE_DIM, StateMatrix};

/// Side of the augmented `[A B; 0 0]` matrix.
const AUG_DIM: usize = STATE_DIM + CONTROL_DIM;

type AugmentedMatrix = SMatrix<f64, AUG_DIM, AUG_DIM>;

/// Build the continuous-time matrices `A_c` (13×13) and `B_c` (13×12).
///
/// # Arguments
/// * `rotation` - current body-to-world rotation
/// * `feet_from_com` - world-frame foot positions relative to the center of mass
/// * `body_inertia` - body-frame inertia about the center of mass
/// * `mass` - total mass
pub fn build_continuous_dynamics(
    rotation: &Matrix3<f64>,
    feet_from_com: &[Vector3<f64>; N_LEGS],
    body_inertia: &Matrix3<f64>,
    mass: f64,
) -> Result<(StateMatrix, InputMatrix), MpcError> {
    let i_world = rotation * body_inertia * rotation.transpose();
    let i_world_inv = i_world.try_inverse().ok_or(MpcError::SingularInertia)?;

    let mut a_c = StateMatrix::zeros();
    let mut b_c = InputMatrix::zeros();

    let eye = Matrix3::<f64>::identity();
    a_c.fixed_view_mut::<3, 3>(0, 6).copy_from(&eye);
    a_c.fixed_view_mut::<3, 3>(3, 9).copy_from(&eye);
    a_c[(11, 12)] = -1.0;

    let inv_mass = eye / mass;
    for (leg, r) in feet_from_com.iter().enumerate() {
        let col = 3 * leg;
        b_c.fixed_view_mut::<3, 3>(6, col)
            .copy_from(&(i_world_inv * skew_symmetric(r)));
        b_c.fixed_view_mut::<3, 3>(9, col).copy_from(&inv_mass);
    }

    Ok((a_c, b_c))
}

/// Discretize with the configured method.
pub fn discretize(
    method: Discretization,
    a_c: &StateMatrix,
    b_c: &InputMatrix,
    dt: f64,
) -> (StateMatrix, InputMatrix) {
    match method {
        Discretization::MatrixExp => discretize_matrix_exp(a_c, b_c, dt),
        Discretization::Euler => discretize_euler(a_c, b_c, dt),
    }
}

/// Zero-order-hold discretization via the augmented matrix exponential:
///
/// ```text
/// [A_d  B_d] = expm(dt · [A_c  B_c])
/// [ 0    I ]             [ 0    0 ]
/// ```
pub fn discretize_matrix_exp(
    a_c: &StateMatrix,
    b_c: &InputMatrix,
    dt: f64,
) -> (StateMatrix, InputMatrix) {
    let mut aug = AugmentedMatrix::zeros();
    aug.fixed_view_mut::<STATE_DIM, STATE_DIM>(0, 0).copy_from(a_c);
    aug.fixed_view_mut::<STATE_DIM, CONTROL_DIM>(0, STATE_DIM)
        .copy_from(b_c);
    aug *= dt;

    let exp = matrix_exp(&aug);
    (
        exp.fixed_view::<STATE_DIM, STATE_DIM>(0, 0).into_owned(),
        exp.fixed_view::<STATE_DIM, CONTROL_DIM>(0, STATE_DIM)
            .into_owned(),
    )
}

/// First-order discretization: `A_d = I + A_c dt`, `B_d = B_c dt`.
pub fn discretize_euler(
    a_c: &StateMatrix,
    b_c: &InputMatrix,
    dt: f64,
) -> (StateMatrix, InputMatrix) {
    (StateMatrix::identity() + a_c * dt, b_c * dt)
}

/// Cross-product matrix: `skew_symmetric(v) * w == v × w`.
pub fn skew_symmetric(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
}

/// Matrix exponential by scaling and squaring of a truncated Taylor series.
///
/// Fixed-size, so it runs on the stack.
#[allow(clippy::cast_possible_truncation)]
fn matrix_exp(m: &AugmentedMatrix) -> AugmentedMatrix {
    // Infinity norm: largest absolute row sum.
    let norm = m
        .row_iter()
        .map(|row| row.iter().map(|v| v.abs()).sum::<f64>())
        .fold(0.0, f64::max);
    let squarings = if norm > 0.5 {
        (norm.log2().ceil() as i32 + 1).max(0)
    } else {
        0
    };
    let scaled = m / 2f64.powi(squarings);

    let mut result = AugmentedMatrix::identity();
    let mut term = AugmentedMatrix::identity();
    for k in 1..=16 {
        term = term * scaled / f64::from(k);
        result += term;
        if term.amax() < 1e-18 {
            break;
        }
    }

    for _ in 0..squarings {
        result = result * result;
    }
    result
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
