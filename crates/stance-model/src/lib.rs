//! Per-leg kinematics and dynamics for a four-legged robot.
//!
//! Each leg is a serial chain of three revolute joints rooted at the body.
//! Given the joint measurement of one cycle, [`RobotModel::evaluate`]
//! produces for every leg:
//!
//! - foot position and velocity in the hip frame,
//! - the 3x3 linear Jacobian,
//! - the joint-space inertia matrix, Coriolis torque and gravity torque.
//!
//! ```text
//! LegChainSpec ──► LegChain ──► RobotModel::evaluate ──► LegFrame + LegDynamics
//! ```
//!
//! Kinematics is a forward recursion along the chain; dynamics uses the
//! recursive Newton-Euler algorithm, with the inertia matrix assembled column
//! by column from unit joint accelerations.

pub mod chain;
pub mod dynamics;
pub mod model;
pub mod presets;

pub use chain::{ChainJoint, JointFrames, JointSpec, LegChain, LegChainSpec, LinkInertial, Origin};
pub use dynamics::{inverse_dynamics, leg_dynamics};
pub use model::{ModelOutput, RobotModel};
