//! Per-session counters and throttled state logging.

use tracing::debug;

use stance_core::{ControllerMode, LegForces};

/// Accumulated counters since start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Counters {
    pub cycles: u64,
    pub solve_failures: u64,
    /// Cycles in which at least one joint was clamped.
    pub saturation_events: u64,
    /// Total clamped joint commands.
    pub saturated_joints: u64,
    pub last_solve_us: Option<u64>,
    pub max_solve_us: u64,
}

/// What the cycle reports to diagnostics once per period.
#[derive(Debug, Clone, Copy)]
pub struct CycleRecord<'a> {
    pub cycle: u64,
    pub mode: ControllerMode,
    pub forces: &'a LegForces,
    pub saturated: usize,
    pub solve_failed: bool,
    pub solve_time_us: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct Diagnostics {
    log_every: u64,
    counters: Counters,
}

impl Diagnostics {
    /// `log_every` of 0 is treated as 1.
    pub fn new(log_every: u64) -> Self {
        Self {
            log_every: log_every.max(1),
            counters: Counters::default(),
        }
    }

    pub const fn counters(&self) -> &Counters {
        &self.counters
    }

    pub fn record(&mut self, record: &CycleRecord<'_>) {
        let c = &mut self.counters;
        c.cycles += 1;
        if record.solve_failed {
            c.solve_failures += 1;
        }
        if record.saturated > 0 {
            c.saturation_events += 1;
            c.saturated_joints += record.saturated as u64;
        }
        if let Some(us) = record.solve_time_us {
            c.last_solve_us = Some(us);
            c.max_solve_us = c.max_solve_us.max(us);
        }

        if record.cycle % self.log_every == 0 {
            let total = record.forces.total();
            debug!(
                cycle = record.cycle,
                mode = %record.mode,
                fx = total.x,
                fy = total.y,
                fz = total.z,
                saturated = record.saturated,
                solve_us = record.solve_time_us,
                failures = c.solve_failures,
                "cycle state"
            );
        }
    }
}
