//! Receding-horizon balance controller for a quadruped.
//!
//! The body is modeled as a single rigid body driven by the four
//! ground-reaction forces ("centroidal dynamics"). Every call to
//! [`BalanceMpc::solve`]:
//!
//! 1. linearizes the dynamics around the current orientation and foot
//!    geometry ([`centroidal`]),
//! 2. discretizes them at the control period,
//! 3. condenses the horizon into one QP over the stacked forces ([`qp`]),
//! 4. solves it with Clarabel and keeps only the first step ([`solver`]).

pub mod centroidal;
pub mod qp;
pub mod solver;
pub mod types;

pub use centroidal::{
    build_continuous_dynamics, discretize, discretize_euler, discretize_matrix_exp,
    skew_symmetric,
};
pub use qp::{BalanceQp, ConstraintSet, Prediction};
pub use solver::BalanceMpc;
pub use types::{
    CONTROL_DIM, Discretization, InputMatrix, MpcConfig, MpcError, MpcSolution, RigidBody,
    STATE_DIM, StateMatrix, StateVector, TrackingWeights,
};
