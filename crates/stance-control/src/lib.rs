//! Real-time balance control for a four-legged robot.
//!
//! [`ControlCycle`] runs once per control period:
//!
//! ```text
//! CycleInputs ─┐
//! JointHandle ─┴─► RobotModel ─► ControllerArbiter ─► ForceToTorqueConverter ─► JointHandle
//!                                 ├─ VirtualSpringDamper (settling)
//!                                 └─ MpcBalance          (balancing)
//! ```
//!
//! Non-real-time code feeds the cycle through [`InputPorts`]; the cycle
//! pushes decimated [`TelemetrySample`]s to a [`TelemetrySink`].

pub mod arbiter;
pub mod balance;
pub mod config;
pub mod cycle;
pub mod diagnostics;
pub mod inputs;
pub mod strategy;
pub mod telemetry;
pub mod torque;
pub mod trigger;
pub mod vsd;

pub use arbiter::{ArbiterOutput, ControllerArbiter, SolveFailurePolicy};
pub use balance::{MpcBalance, reaction_to_leg_forces};
pub use config::{ControlConfig, ControllerConfig, NamedGain, VsdConfig};
pub use cycle::{ControlCycle, CycleReport};
pub use diagnostics::{Counters, CycleRecord, Diagnostics};
pub use inputs::{
    BodyStatePort, CONTACT_FORCE_THRESHOLD, CommandPort, ContactPort, CycleInputs, GainPort,
    InputPorts, InputSnapshot, input_channels,
};
pub use strategy::{ForceStrategy, ModelSnapshot, StrategyError};
pub use telemetry::{
    NullSink, SnapshotSink, TelemetryPublisher, TelemetrySample, TelemetrySink, telemetry_channel,
};
pub use torque::{ForceToTorqueConverter, TorqueOutput, jacobian_transpose_torques};
pub use trigger::{CycleCountTrigger, TransitionPolicy};
pub use vsd::VirtualSpringDamper;
