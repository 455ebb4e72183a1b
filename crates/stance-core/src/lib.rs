// stance-core: data model, errors and cross-thread snapshot channels for the stance controller.

pub mod actuator;
pub mod channel;
pub mod error;
pub mod types;

pub use actuator::JointHandle;
pub use channel::{Snapshot, SnapshotReader, SnapshotWriter, snapshot_channel};
pub use error::{CommandError, ConfigError, GainError, InitError};
pub use types::{
    BodyState, ControllerMode, JOINTS_PER_LEG, JointCommand, JointGain, JointGains,
    JointMeasurement, JointTorqueCommand, Leg, LegDynamics, LegForces, LegFrame, N_JOINTS, N_LEGS,
};
