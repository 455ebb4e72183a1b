//! Non-real-time input ports and their real-time counterpart.
//!
//! Each independent input stream (joint command, gains, body state, one
//! contact flag per leg) has its own snapshot slot. Ports validate and
//! publish from any non-real-time context; [`CycleInputs::read`] takes one
//! snapshot of every slot at the start of a cycle.

use nalgebra::Vector3;
use tracing::warn;

use stance_core::{
    BodyState, CommandError, GainError, JointCommand, JointGain, JointGains, Leg, N_JOINTS, N_LEGS,
    Snapshot, SnapshotReader, SnapshotWriter, snapshot_channel,
};

/// Contact force magnitude (N) above which a foot counts as loaded.
pub const CONTACT_FORCE_THRESHOLD: f64 = 10.0;

// ---------------------------------------------------------------------------
// Ports
// ---------------------------------------------------------------------------

/// External joint-space command.
#[derive(Debug)]
pub struct CommandPort {
    writer: SnapshotWriter<JointCommand>,
}

impl CommandPort {
    /// Publish a command. A vector of the wrong length is rejected and the
    /// previous command stays in effect.
    pub fn submit(&mut self, command: &[f64]) -> Result<(), CommandError> {
        let values: [f64; N_JOINTS] = command.try_into().map_err(|_| {
            warn!(got = command.len(), "Rejected joint command");
            CommandError::DimensionMismatch {
                expected: N_JOINTS,
                got: command.len(),
            }
        })?;
        self.writer.write(JointCommand(values));
        Ok(())
    }
}

/// Per-joint gain updates, matched by joint name.
#[derive(Debug)]
pub struct GainPort {
    names: Vec<String>,
    current: JointGains,
    writer: SnapshotWriter<JointGains>,
}

impl GainPort {
    /// Apply a set of named gains.
    ///
    /// Either every entry is applied or none is: an unknown name rejects
    /// the whole update.
    pub fn update(&mut self, updates: &[(&str, JointGain)]) -> Result<(), GainError> {
        let mut next = self.current;
        for (name, gain) in updates {
            let Some(index) = self.names.iter().position(|n| n == name) else {
                warn!(joint = *name, "Rejected gain update");
                return Err(GainError::MissingJoint((*name).to_owned()));
            };
            next.0[index] = *gain;
        }
        self.current = next;
        self.writer.write(next);
        Ok(())
    }

    /// Gains as last published.
    pub const fn current(&self) -> &JointGains {
        &self.current
    }
}

#[derive(Debug)]
pub struct BodyStatePort {
    writer: SnapshotWriter<BodyState>,
}

impl BodyStatePort {
    pub fn submit(&mut self, state: BodyState) {
        self.writer.write(state);
    }
}

/// Contact flag of one leg.
#[derive(Debug)]
pub struct ContactPort {
    leg: Leg,
    writer: SnapshotWriter<bool>,
}

impl ContactPort {
    pub const fn leg(&self) -> Leg {
        self.leg
    }

    pub fn submit(&mut self, in_contact: bool) {
        self.writer.write(in_contact);
    }

    /// Derive the flag from a measured contact force and publish it.
    pub fn submit_force(&mut self, force: &Vector3<f64>) -> bool {
        let in_contact = force.norm() > CONTACT_FORCE_THRESHOLD;
        self.submit(in_contact);
        in_contact
    }
}

/// Writing halves of every input stream, owned by non-real-time code.
#[derive(Debug)]
pub struct InputPorts {
    pub command: CommandPort,
    pub gains: GainPort,
    pub body: BodyStatePort,
    pub contacts: [ContactPort; N_LEGS],
}

// ---------------------------------------------------------------------------
// Cycle side
// ---------------------------------------------------------------------------

/// Reading halves, owned by the control cycle.
#[derive(Debug)]
pub struct CycleInputs {
    command: SnapshotReader<JointCommand>,
    gains: SnapshotReader<JointGains>,
    body: SnapshotReader<BodyState>,
    contacts: [SnapshotReader<bool>; N_LEGS],
}

/// One consistent view of all inputs for the duration of a cycle.
#[derive(Debug, Clone)]
pub struct InputSnapshot {
    pub command: Snapshot<JointCommand>,
    pub gains: Snapshot<JointGains>,
    pub body: Snapshot<BodyState>,
    pub contacts: [Snapshot<bool>; N_LEGS],
}

impl InputSnapshot {
    pub fn contact_flags(&self) -> [bool; N_LEGS] {
        std::array::from_fn(|i| *self.contacts[i])
    }

    /// Write sequence numbers: command, gains, body, then contacts in leg order.
    pub fn versions(&self) -> [u64; 3 + N_LEGS] {
        let mut v = [0; 3 + N_LEGS];
        v[0] = self.command.version();
        v[1] = self.gains.version();
        v[2] = self.body.version();
        for (slot, contact) in v[3..].iter_mut().zip(&self.contacts) {
            *slot = contact.version();
        }
        v
    }
}

impl CycleInputs {
    /// Snapshot every slot once.
    pub fn read(&self) -> InputSnapshot {
        InputSnapshot {
            command: self.command.read(),
            gains: self.gains.read(),
            body: self.body.read(),
            contacts: std::array::from_fn(|i| self.contacts[i].read()),
        }
    }
}

/// Create all input slots.
///
/// `joint_names` fixes the order of the gain vector. Contacts start
/// closed: the robot is assumed to start standing.
pub fn input_channels(
    joint_names: &[&str; N_JOINTS],
    initial_gains: JointGains,
    initial_body: BodyState,
) -> (InputPorts, CycleInputs) {
    let (command_w, command_r) = snapshot_channel(JointCommand::default());
    let (gains_w, gains_r) = snapshot_channel(initial_gains);
    let (body_w, body_r) = snapshot_channel(initial_body);

    let [(lf_w, lf_r), (rf_w, rf_r), (lh_w, lh_r), (rh_w, rh_r)] =
        std::array::from_fn(|_| snapshot_channel(true));
    let [lf, rf, lh, rh] = Leg::ALL;

    let ports = InputPorts {
        command: CommandPort { writer: command_w },
        gains: GainPort {
            names: joint_names.iter().map(|n| (*n).to_owned()).collect(),
            current: initial_gains,
            writer: gains_w,
        },
        body: BodyStatePort { writer: body_w },
        contacts: [
            ContactPort { leg: lf, writer: lf_w },
            ContactPort { leg: rf, writer: rf_w },
            ContactPort { leg: lh, writer: lh_w },
            ContactPort { leg: rh, writer: rh_w },
        ],
    };
    let inputs = CycleInputs {
        command: command_r,
        gains: gains_r,
        body: body_r,
        contacts: [lf_r, rf_r, lh_r, rh_r],
    };
    (ports, inputs)
}
