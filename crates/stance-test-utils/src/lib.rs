//! Shared test fixtures and utilities for stance crates.
//!
//! Provides simulated joint handles, standard robot fixtures and
//! deterministic RNG setup.

pub mod fixtures;
pub mod mocks;
pub mod rng;

// ---------------------------------------------------------------------------
// Re-exports for convenience
// ---------------------------------------------------------------------------

pub use fixtures::{GRAVITY, hyq_joint_names, hyq_model, standing_body};
pub use mocks::{SimJoint, SimJointState, sim_joints};
pub use rng::{random_measurement, seeded_rng};
