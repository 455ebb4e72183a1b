//! Configuration, solution and error types of the balance MPC.

use nalgebra::{Matrix3, SMatrix, SVector, Vector3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use stance_core::{ConfigError, LegForces, N_LEGS};

/// Centroidal state: [θ(3), p(3), ω(3), v(3), g(1)].
pub const STATE_DIM: usize = 13;

/// Forces of one horizon step: 3 components for each of the 4 legs.
pub const CONTROL_DIM: usize = 3 * N_LEGS;

/// Centroidal state vector.
pub type StateVector = SVector<f64, STATE_DIM>;

/// State transition matrix, continuous or discrete.
pub type StateMatrix = SMatrix<f64, STATE_DIM, STATE_DIM>;

/// Input matrix mapping one step of leg forces into the state.
pub type InputMatrix = SMatrix<f64, STATE_DIM, CONTROL_DIM>;

// ---------------------------------------------------------------------------
// Serde default functions
// ---------------------------------------------------------------------------

const fn default_horizon() -> usize {
    3
}
const fn default_friction() -> f64 {
    0.6
}
const fn default_f_min() -> f64 {
    10.0
}
const fn default_f_max() -> f64 {
    666.0
}
const fn default_gravity() -> f64 {
    9.81
}
const fn default_regularization() -> [f64; 3] {
    [1e-9; 3]
}
const fn default_max_iter() -> u32 {
    50
}
const fn default_mass() -> f64 {
    83.282
}
const fn default_com_offset() -> [f64; 3] {
    [0.056, 0.0215, 0.00358]
}
const fn default_inertia() -> [[f64; 3]; 3] {
    [
        [1.572_593_7, 0.0, 0.0],
        [0.0, 8.501_592_8, 0.0],
        [0.0, 0.0, 9.195_491_1],
    ]
}

// ---------------------------------------------------------------------------
// TrackingWeights
// ---------------------------------------------------------------------------

/// Diagonal state-error weights, one value per axis of each state block.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingWeights {
    pub orientation: [f64; 3],
    pub position: [f64; 3],
    pub angular_velocity: [f64; 3],
    pub linear_velocity: [f64; 3],
}

impl Default for TrackingWeights {
    fn default() -> Self {
        Self {
            orientation: [100.0; 3],
            position: [1000.0, 1000.0, 4000.0],
            angular_velocity: [100.0; 3],
            linear_velocity: [100.0; 3],
        }
    }
}

impl TrackingWeights {
    /// Weights in state-vector order. The gravity state is not penalized.
    pub fn diagonal(&self) -> [f64; STATE_DIM] {
        let mut d = [0.0; STATE_DIM];
        d[0..3].copy_from_slice(&self.orientation);
        d[3..6].copy_from_slice(&self.position);
        d[6..9].copy_from_slice(&self.angular_velocity);
        d[9..12].copy_from_slice(&self.linear_velocity);
        d
    }
}

// ---------------------------------------------------------------------------
// Discretization
// ---------------------------------------------------------------------------

/// How the continuous dynamics are turned into a per-step transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Discretization {
    /// Exact zero-order hold via the augmented matrix exponential.
    #[default]
    MatrixExp,
    /// `A_d = I + A_c dt`, `B_d = B_c dt`.
    Euler,
}

// ---------------------------------------------------------------------------
// MpcConfig
// ---------------------------------------------------------------------------

/// Horizon, constraint and weighting parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MpcConfig {
    /// Number of predicted steps.
    #[serde(default = "default_horizon")]
    pub horizon: usize,

    /// Coulomb friction coefficient of the friction pyramid.
    #[serde(default = "default_friction")]
    pub friction_coeff: f64,

    /// Minimum normal force per leg (N).
    #[serde(default = "default_f_min")]
    pub f_min: f64,

    /// Maximum normal force per leg (N).
    #[serde(default = "default_f_max")]
    pub f_max: f64,

    /// Gravitational acceleration magnitude (m/s^2).
    #[serde(default = "default_gravity")]
    pub gravity: f64,

    #[serde(default)]
    pub tracking: TrackingWeights,

    /// Force regularization per axis (x, y, z), identical for every leg.
    #[serde(default = "default_regularization")]
    pub regularization: [f64; 3],

    #[serde(default)]
    pub discretization: Discretization,

    /// Iteration cap of the interior-point solver.
    #[serde(default = "default_max_iter")]
    pub max_solver_iters: u32,
}

impl Default for MpcConfig {
    fn default() -> Self {
        Self {
            horizon: default_horizon(),
            friction_coeff: default_friction(),
            f_min: default_f_min(),
            f_max: default_f_max(),
            gravity: default_gravity(),
            tracking: TrackingWeights::default(),
            regularization: default_regularization(),
            discretization: Discretization::default(),
            max_solver_iters: default_max_iter(),
        }
    }
}

impl MpcConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.horizon == 0 {
            return Err(ConfigError::invalid("mpc.horizon", "must be at least 1"));
        }
        if self.friction_coeff.is_nan() || self.friction_coeff < 0.0 {
            return Err(ConfigError::invalid(
                "mpc.friction_coeff",
                format!("must be non-negative, got {}", self.friction_coeff),
            ));
        }
        if self.f_min.is_nan() || self.f_max.is_nan() || self.f_min > self.f_max {
            return Err(ConfigError::invalid(
                "mpc.f_min",
                format!("f_min {} exceeds f_max {}", self.f_min, self.f_max),
            ));
        }
        if self.gravity.is_nan() || self.gravity <= 0.0 {
            return Err(ConfigError::invalid("mpc.gravity", "must be positive"));
        }
        let weights = self.tracking.diagonal();
        if weights.iter().chain(&self.regularization).any(|w| w.is_nan() || *w < 0.0) {
            return Err(ConfigError::invalid(
                "mpc.tracking",
                "weights must be non-negative",
            ));
        }
        if self.max_solver_iters == 0 {
            return Err(ConfigError::invalid("mpc.max_solver_iters", "must be at least 1"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RigidBody
// ---------------------------------------------------------------------------

/// Lumped inertial parameters of the trunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RigidBody {
    /// Total mass (kg).
    #[serde(default = "default_mass")]
    pub mass: f64,

    /// Center of mass in the body frame (m).
    #[serde(default = "default_com_offset")]
    pub com_offset: [f64; 3],

    /// Inertia about the center of mass, body frame, row-major (kg m^2).
    #[serde(default = "default_inertia")]
    pub inertia: [[f64; 3]; 3],
}

impl Default for RigidBody {
    fn default() -> Self {
        Self {
            mass: default_mass(),
            com_offset: default_com_offset(),
            inertia: default_inertia(),
        }
    }
}

impl RigidBody {
    pub fn com_offset(&self) -> Vector3<f64> {
        Vector3::from(self.com_offset)
    }

    pub fn inertia(&self) -> Matrix3<f64> {
        let i = &self.inertia;
        Matrix3::new(
            i[0][0], i[0][1], i[0][2], i[1][0], i[1][1], i[1][2], i[2][0], i[2][1], i[2][2],
        )
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mass.is_nan() || self.mass <= 0.0 {
            return Err(ConfigError::invalid(
                "body.mass",
                format!("must be positive, got {}", self.mass),
            ));
        }
        if self.com_offset.iter().any(|c| !c.is_finite()) {
            return Err(ConfigError::invalid("body.com_offset", "must be finite"));
        }
        let inertia = self.inertia();
        if (inertia - inertia.transpose()).abs().max() > 1e-9 {
            return Err(ConfigError::invalid("body.inertia", "must be symmetric"));
        }
        if inertia.cholesky().is_none() {
            return Err(ConfigError::invalid(
                "body.inertia",
                "must be positive definite",
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MpcSolution
// ---------------------------------------------------------------------------

/// Result of one successful solve.
///
/// The full force sequence stays in the solver, see
/// [`BalanceMpc::force_trajectory`](crate::BalanceMpc::force_trajectory).
#[derive(Debug, Clone, Copy)]
pub struct MpcSolution {
    /// First-step ground-reaction forces on the body, world frame (N).
    pub forces: LegForces,
    /// Interior-point iterations used.
    pub iterations: u32,
    /// Wall-clock time spent building and solving the QP.
    pub solve_time_us: u64,
}

// ---------------------------------------------------------------------------
// MpcError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MpcError {
    /// The solver terminated without a usable optimum.
    #[error("QP solve failed: {status}")]
    SolveFailed { status: String },

    /// The problem data was rejected before solving.
    #[error("QP setup failed: {0}")]
    Setup(String),

    #[error("world-frame inertia is singular")]
    SingularInertia,
}
