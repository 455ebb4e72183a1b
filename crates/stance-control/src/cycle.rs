//! The fixed-period control cycle.
//!
//! One [`ControlCycle::update`] call:
//!
//! 1. snapshots every input slot once
//! 2. reads position and velocity of every joint
//! 3. evaluates the robot model
//! 4. lets the arbiter pick and run a force strategy
//! 5. maps foot forces to saturated joint torques and writes them out
//! 6. records diagnostics and offers telemetry
//!
//! Nothing in the cycle returns an error; every failure degrades to a
//! bounded output.

use nalgebra::Vector3;
use tracing::info;

use stance_core::{
    ControllerMode, InitError, JointCommand, JointGains, JointHandle, JointMeasurement,
    JointTorqueCommand, LegForces, N_JOINTS, N_LEGS,
};
use stance_model::RobotModel;

use crate::arbiter::ControllerArbiter;
use crate::balance::MpcBalance;
use crate::config::ControllerConfig;
use crate::diagnostics::{Counters, CycleRecord, Diagnostics};
use crate::inputs::CycleInputs;
use crate::strategy::ModelSnapshot;
use crate::telemetry::{TelemetryPublisher, TelemetrySample, TelemetrySink};
use crate::torque::ForceToTorqueConverter;
use crate::trigger::CycleCountTrigger;
use crate::vsd::VirtualSpringDamper;

/// Summary of one cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleReport {
    pub cycle: u64,
    pub mode: ControllerMode,
    pub transitioned: bool,
    pub solve_failed: bool,
    /// Joints clamped this cycle.
    pub saturated: usize,
    pub forces: LegForces,
    pub torques: JointTorqueCommand,
    /// Write sequence numbers of the input snapshots used.
    pub input_versions: [u64; 3 + N_LEGS],
}

pub struct ControlCycle<H: JointHandle> {
    joints: Vec<H>,
    model: RobotModel,
    hip_offsets: [Vector3<f64>; N_LEGS],
    arbiter: ControllerArbiter,
    converter: ForceToTorqueConverter,
    inputs: CycleInputs,
    telemetry: TelemetryPublisher,
    diagnostics: Diagnostics,
    measurement: JointMeasurement,
    gains: JointGains,
    command: JointCommand,
    cycle: u64,
}

/// Arrange `joints` in model order by name.
fn order_joints<H: JointHandle>(
    names: &[&str; N_JOINTS],
    joints: Vec<H>,
) -> Result<Vec<H>, InitError> {
    if joints.len() != N_JOINTS {
        return Err(InitError::JointCountMismatch {
            expected: N_JOINTS,
            got: joints.len(),
        });
    }
    let mut pool: Vec<Option<H>> = joints.into_iter().map(Some).collect();
    names
        .iter()
        .map(|name| {
            pool.iter_mut()
                .find(|slot| matches!(slot, Some(h) if h.name() == *name))
                .and_then(Option::take)
                .ok_or_else(|| InitError::MissingJoint((*name).to_owned()))
        })
        .collect()
}

impl<H: JointHandle> ControlCycle<H> {
    /// Build the standard settling-then-balancing controller.
    ///
    /// # Errors
    ///
    /// Any [`InitError`]: invalid configuration, malformed chains, joint
    /// handles that do not match the chain joint names.
    pub fn new(
        config: &ControllerConfig,
        joints: Vec<H>,
        inputs: CycleInputs,
        sink: Box<dyn TelemetrySink>,
    ) -> Result<Self, InitError> {
        config.validate()?;
        let balance = MpcBalance::new(config.mpc.clone(), &config.body, config.control.period)?;
        let arbiter = ControllerArbiter::new(
            Box::new(VirtualSpringDamper::new(&config.vsd)),
            Box::new(balance),
            Box::new(CycleCountTrigger::new(config.control.settle_cycles)),
            config.control.failure_policy,
        );
        Self::with_arbiter(config, joints, inputs, sink, arbiter)
    }

    /// Like [`ControlCycle::new`] with caller-supplied strategies.
    pub fn with_arbiter(
        config: &ControllerConfig,
        joints: Vec<H>,
        inputs: CycleInputs,
        sink: Box<dyn TelemetrySink>,
        arbiter: ControllerArbiter,
    ) -> Result<Self, InitError> {
        config.validate()?;
        let model = RobotModel::from_specs(&config.legs, config.mpc.gravity)?;
        let joints = order_joints(&model.joint_names(), joints)?;
        let gains = *inputs.read().gains;

        info!(
            joints = N_JOINTS,
            period = config.control.period,
            settle_cycles = config.control.settle_cycles,
            arbiter = ?arbiter,
            "Control cycle initialized"
        );

        Ok(Self {
            joints,
            hip_offsets: model.hip_offsets(),
            converter: ForceToTorqueConverter::new(model.effort_limits()),
            model,
            arbiter,
            inputs,
            telemetry: TelemetryPublisher::new(sink, config.control.telemetry_divisor),
            diagnostics: Diagnostics::new(config.control.log_every),
            measurement: JointMeasurement::zeros(),
            gains,
            command: JointCommand::default(),
            cycle: 0,
        })
    }

    /// Run one control period.
    pub fn update(&mut self) -> CycleReport {
        let inputs = self.inputs.read();
        self.gains = *inputs.gains;
        self.command = *inputs.command;

        for (i, joint) in self.joints.iter().enumerate() {
            self.measurement.position[i] = joint.position();
            self.measurement.velocity[i] = joint.velocity();
        }
        let output = self.model.evaluate(&self.measurement);

        let snapshot = ModelSnapshot {
            cycle: self.cycle,
            model: &output,
            body: &*inputs.body,
            contacts: inputs.contact_flags(),
            hip_offsets: self.hip_offsets,
        };
        let decision = self.arbiter.step(&snapshot);

        let torque = self.converter.to_torque(&decision.forces, &output.frames);
        for (joint, &tau) in self.joints.iter_mut().zip(&torque.torques.0) {
            joint.set_command(tau);
        }

        let balancing = decision.mode == ControllerMode::Balancing;
        let solve_time_us = if balancing && !decision.solve_failed {
            self.arbiter.balancing().solve_time_us()
        } else {
            None
        };
        self.diagnostics.record(&CycleRecord {
            cycle: self.cycle,
            mode: decision.mode,
            forces: &decision.forces,
            saturated: torque.saturated,
            solve_failed: decision.solve_failed,
            solve_time_us,
        });

        if self.telemetry.is_due(self.cycle) {
            self.telemetry.offer(&TelemetrySample {
                cycle: self.cycle,
                mode: decision.mode,
                forces: decision.forces,
                reaction_forces: self.arbiter.balancing().reaction_forces(),
                torques: torque.torques,
                saturated: torque.saturated,
                solve_failed: decision.solve_failed,
            });
        }

        let report = CycleReport {
            cycle: self.cycle,
            mode: decision.mode,
            transitioned: decision.transitioned,
            solve_failed: decision.solve_failed,
            saturated: torque.saturated,
            forces: decision.forces,
            torques: torque.torques,
            input_versions: inputs.versions(),
        };
        self.cycle += 1;
        report
    }

    /// Cycles completed so far.
    pub const fn cycle(&self) -> u64 {
        self.cycle
    }

    pub const fn mode(&self) -> ControllerMode {
        self.arbiter.mode()
    }

    pub const fn arbiter(&self) -> &ControllerArbiter {
        &self.arbiter
    }

    pub const fn model(&self) -> &RobotModel {
        &self.model
    }

    pub const fn counters(&self) -> &Counters {
        self.diagnostics.counters()
    }

    /// Joint measurement of the last cycle.
    pub const fn measurement(&self) -> &JointMeasurement {
        &self.measurement
    }

    /// Gains in effect during the last cycle.
    pub const fn active_gains(&self) -> &JointGains {
        &self.gains
    }

    /// External command in effect during the last cycle.
    pub const fn active_command(&self) -> &JointCommand {
        &self.command
    }

    pub const fn telemetry(&self) -> &TelemetryPublisher {
        &self.telemetry
    }

    /// Joint handles in model order.
    pub fn joints(&self) -> &[H] {
        &self.joints
    }
}

impl<H: JointHandle> std::fmt::Debug for ControlCycle<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlCycle")
            .field("cycle", &self.cycle)
            .field("arbiter", &self.arbiter)
            .field("telemetry", &self.telemetry)
            .finish_non_exhaustive()
    }
}
