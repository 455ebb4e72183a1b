//! Decimated, push-only telemetry.
//!
//! The cycle offers a sample every cycle; the publisher forwards every
//! `divisor`-th one to a [`TelemetrySink`]. Sinks must not block.

use stance_core::{
    ControllerMode, JointTorqueCommand, LegForces, SnapshotReader, SnapshotWriter,
    snapshot_channel,
};

/// State published for external monitoring.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetrySample {
    pub cycle: u64,
    pub mode: ControllerMode,
    /// Foot forces handed to torque conversion, hip frame.
    pub forces: LegForces,
    /// World-frame ground-reaction forces of the last balance solve.
    pub reaction_forces: Option<LegForces>,
    pub torques: JointTorqueCommand,
    pub saturated: usize,
    pub solve_failed: bool,
}

pub trait TelemetrySink: Send {
    fn publish(&mut self, sample: &TelemetrySample);

    fn name(&self) -> &str;
}

/// Publishes into a snapshot slot; the reader sees the latest sample.
#[derive(Debug)]
pub struct SnapshotSink {
    writer: SnapshotWriter<Option<TelemetrySample>>,
}

/// Sink plus the reader for the non-real-time publishing side.
pub fn telemetry_channel() -> (SnapshotSink, SnapshotReader<Option<TelemetrySample>>) {
    let (writer, reader) = snapshot_channel(None);
    (SnapshotSink { writer }, reader)
}

impl TelemetrySink for SnapshotSink {
    fn publish(&mut self, sample: &TelemetrySample) {
        self.writer.write(Some(*sample));
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "snapshot"
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl TelemetrySink for NullSink {
    fn publish(&mut self, _sample: &TelemetrySample) {}

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "null"
    }
}

pub struct TelemetryPublisher {
    sink: Box<dyn TelemetrySink>,
    divisor: u64,
    published: u64,
}

impl TelemetryPublisher {
    /// A `divisor` of 0 is treated as 1.
    pub fn new(sink: Box<dyn TelemetrySink>, divisor: u32) -> Self {
        Self {
            sink,
            divisor: u64::from(divisor.max(1)),
            published: 0,
        }
    }

    /// Whether the sample of `cycle` will be forwarded.
    pub const fn is_due(&self, cycle: u64) -> bool {
        cycle % self.divisor == 0
    }

    /// Forward the sample if its cycle is due. Returns whether it was published.
    pub fn offer(&mut self, sample: &TelemetrySample) -> bool {
        if !self.is_due(sample.cycle) {
            return false;
        }
        self.sink.publish(sample);
        self.published += 1;
        true
    }

    pub const fn published(&self) -> u64 {
        self.published
    }
}

impl std::fmt::Debug for TelemetryPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryPublisher")
            .field("sink", &self.sink.name())
            .field("divisor", &self.divisor)
            .field("published", &self.published)
            .finish()
    }
}
