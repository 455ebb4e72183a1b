//! Settling/balancing state machine.
//!
//! The arbiter starts in [`ControllerMode::Settling`] and moves to
//! [`ControllerMode::Balancing`] exactly once, when its
//! [`TransitionPolicy`] fires. On that cycle the balancing strategy is
//! activated (latching its reference) before it computes. Every cycle
//! exactly one strategy is authoritative and its output is forwarded
//! unchanged, except when it fails.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use stance_core::{ControllerMode, LegForces};

use crate::strategy::{ForceStrategy, ModelSnapshot, StrategyError};
use crate::trigger::TransitionPolicy;

/// Output used for a cycle whose strategy failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveFailurePolicy {
    /// Repeat the last successful output.
    #[default]
    HoldLastForce,
    /// Use the settling controller for this cycle.
    FallBackToSettling,
    /// Command zero force.
    ZeroForce,
}

/// Result of one arbiter step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArbiterOutput {
    pub mode: ControllerMode,
    pub forces: LegForces,
    /// The mode switch happened on this cycle.
    pub transitioned: bool,
    /// The authoritative strategy failed; `forces` comes from the policy.
    pub solve_failed: bool,
}

pub struct ControllerArbiter {
    settling: Box<dyn ForceStrategy>,
    balancing: Box<dyn ForceStrategy>,
    trigger: Box<dyn TransitionPolicy>,
    policy: SolveFailurePolicy,
    mode: ControllerMode,
    settled_cycles: u64,
    transitioned_at: Option<u64>,
    last_forces: LegForces,
    failure_streak: u64,
}

impl ControllerArbiter {
    pub fn new(
        settling: Box<dyn ForceStrategy>,
        balancing: Box<dyn ForceStrategy>,
        trigger: Box<dyn TransitionPolicy>,
        policy: SolveFailurePolicy,
    ) -> Self {
        Self {
            settling,
            balancing,
            trigger,
            policy,
            mode: ControllerMode::Settling,
            settled_cycles: 0,
            transitioned_at: None,
            last_forces: LegForces::zeros(),
            failure_streak: 0,
        }
    }

    pub const fn mode(&self) -> ControllerMode {
        self.mode
    }

    /// Cycle index of the mode switch, once it happened.
    pub const fn transitioned_at(&self) -> Option<u64> {
        self.transitioned_at
    }

    /// Cycles spent in the settling phase.
    pub const fn settled_cycles(&self) -> u64 {
        self.settled_cycles
    }

    pub const fn policy(&self) -> SolveFailurePolicy {
        self.policy
    }

    /// Strategy that is authoritative in the current mode.
    pub fn active(&self) -> &dyn ForceStrategy {
        match self.mode {
            ControllerMode::Settling => self.settling.as_ref(),
            ControllerMode::Balancing => self.balancing.as_ref(),
        }
    }

    pub fn balancing(&self) -> &dyn ForceStrategy {
        self.balancing.as_ref()
    }

    /// Advance one cycle.
    pub fn step(&mut self, snapshot: &ModelSnapshot<'_>) -> ArbiterOutput {
        let transitioned = self.mode == ControllerMode::Settling
            && self.trigger.should_switch(self.settled_cycles, snapshot);
        if transitioned {
            self.mode = ControllerMode::Balancing;
            self.transitioned_at = Some(snapshot.cycle);
            self.balancing.activate(snapshot);
            info!(
                cycle = snapshot.cycle,
                trigger = self.trigger.name(),
                settled_cycles = self.settled_cycles,
                "Switching from {} to {}",
                self.settling.name(),
                self.balancing.name()
            );
        }

        let mode = self.mode;
        let strategy = match mode {
            ControllerMode::Settling => &mut self.settling,
            ControllerMode::Balancing => &mut self.balancing,
        };
        let result = compute_checked(strategy.as_mut(), snapshot);

        if mode == ControllerMode::Settling {
            self.settled_cycles += 1;
        }

        match result {
            Ok(forces) => {
                if self.failure_streak > 0 {
                    info!(
                        cycle = snapshot.cycle,
                        failed_cycles = self.failure_streak,
                        "Strategy recovered"
                    );
                    self.failure_streak = 0;
                }
                self.last_forces = forces;
                ArbiterOutput {
                    mode,
                    forces,
                    transitioned,
                    solve_failed: false,
                }
            }
            Err(err) => {
                self.failure_streak += 1;
                if self.failure_streak == 1 {
                    warn!(cycle = snapshot.cycle, policy = ?self.policy, "Strategy failed: {err}");
                } else {
                    debug!(cycle = snapshot.cycle, streak = self.failure_streak, "Strategy failed: {err}");
                }
                ArbiterOutput {
                    mode,
                    forces: self.fallback_forces(snapshot),
                    transitioned,
                    solve_failed: true,
                }
            }
        }
    }

    fn fallback_forces(&mut self, snapshot: &ModelSnapshot<'_>) -> LegForces {
        match self.policy {
            SolveFailurePolicy::HoldLastForce => self.last_forces,
            SolveFailurePolicy::ZeroForce => LegForces::zeros(),
            SolveFailurePolicy::FallBackToSettling => {
                compute_checked(self.settling.as_mut(), snapshot).unwrap_or_default()
            }
        }
    }
}

fn compute_checked(
    strategy: &mut dyn ForceStrategy,
    snapshot: &ModelSnapshot<'_>,
) -> Result<LegForces, StrategyError> {
    let forces = strategy.compute_leg_forces(snapshot)?;
    if forces.is_finite() {
        Ok(forces)
    } else {
        Err(StrategyError::NonFinite(strategy.name().to_owned()))
    }
}

impl std::fmt::Debug for ControllerArbiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerArbiter")
            .field("settling", &self.settling.name())
            .field("balancing", &self.balancing.name())
            .field("trigger", &self.trigger.name())
            .field("policy", &self.policy)
            .field("mode", &self.mode)
            .field("settled_cycles", &self.settled_cycles)
            .field("transitioned_at", &self.transitioned_at)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::*;
    use crate::trigger::CycleCountTrigger;
    use nalgebra::Vector3;
    use stance_core::{BodyState, N_LEGS};
    use stance_model::ModelOutput;
    use stance_mpc::MpcError;

    /// Emits a constant force; optionally fails on selected cycles.
    struct Constant {
        value: f64,
        fail_from: Option<u64>,
        activations: Arc<AtomicU64>,
    }

    impl Constant {
        fn new(value: f64) -> Self {
            Self {
                value,
                fail_from: None,
                activations: Arc::new(AtomicU64::new(0)),
            }
        }
    }

    impl ForceStrategy for Constant {
        fn activate(&mut self, _snapshot: &ModelSnapshot<'_>) {
            self.activations.fetch_add(1, Ordering::Relaxed);
        }

        fn compute_leg_forces(
            &mut self,
            snapshot: &ModelSnapshot<'_>,
        ) -> Result<LegForces, StrategyError> {
            if self.fail_from.is_some_and(|from| snapshot.cycle >= from) {
                return Err(MpcError::SolveFailed {
                    status: "MaxIterations".into(),
                }
                .into());
            }
            Ok(LegForces([Vector3::new(0.0, 0.0, self.value); N_LEGS]))
        }

        fn name(&self) -> &str {
            "constant"
        }
    }

    fn run(arbiter: &mut ControllerArbiter, cycle: u64) -> ArbiterOutput {
        let model = ModelOutput::default();
        let body = BodyState::default();
        let snap = ModelSnapshot {
            cycle,
            model: &model,
            body: &body,
            contacts: [true; N_LEGS],
            hip_offsets: [Vector3::zeros(); N_LEGS],
        };
        arbiter.step(&snap)
    }

    fn arbiter(threshold: u64, balancing: Constant, policy: SolveFailurePolicy) -> ControllerArbiter {
        ControllerArbiter::new(
            Box::new(Constant::new(1.0)),
            Box::new(balancing),
            Box::new(CycleCountTrigger::new(threshold)),
            policy,
        )
    }

    #[test]
    fn switches_exactly_once_at_threshold() {
        let balancing = Constant::new(2.0);
        let activations = Arc::clone(&balancing.activations);
        let mut arb = arbiter(5, balancing, SolveFailurePolicy::default());

        let mut switches = 0;
        for cycle in 0..50 {
            let out = run(&mut arb, cycle);
            if cycle < 5 {
                assert_eq!(out.mode, ControllerMode::Settling, "cycle {cycle}");
                assert_eq!(out.forces.0[0].z, 1.0);
            } else {
                assert_eq!(out.mode, ControllerMode::Balancing, "cycle {cycle}");
                assert_eq!(out.forces.0[0].z, 2.0);
            }
            switches += u32::from(out.transitioned);
            if out.transitioned {
                assert_eq!(cycle, 5);
            }
        }
        assert_eq!(switches, 1);
        assert_eq!(activations.load(Ordering::Relaxed), 1);
        assert_eq!(arb.transitioned_at(), Some(5));
        assert_eq!(arb.settled_cycles(), 5);
    }

    #[test]
    fn hold_last_force_repeats_previous_output() {
        let mut balancing = Constant::new(2.0);
        balancing.fail_from = Some(3);
        let mut arb = arbiter(1, balancing, SolveFailurePolicy::HoldLastForce);

        for cycle in 0..3 {
            assert!(!run(&mut arb, cycle).solve_failed);
        }
        let out = run(&mut arb, 3);
        assert!(out.solve_failed);
        assert_eq!(out.mode, ControllerMode::Balancing);
        assert_eq!(out.forces.0[2].z, 2.0);
    }

    #[test]
    fn fall_back_to_settling_uses_settling_output() {
        let mut balancing = Constant::new(2.0);
        balancing.fail_from = Some(0);
        let mut arb = arbiter(0, balancing, SolveFailurePolicy::FallBackToSettling);

        let out = run(&mut arb, 0);
        assert!(out.transitioned);
        assert!(out.solve_failed);
        assert_eq!(out.mode, ControllerMode::Balancing);
        assert_eq!(out.forces.0[1].z, 1.0);
    }

    #[test]
    fn zero_force_policy() {
        let mut balancing = Constant::new(2.0);
        balancing.fail_from = Some(2);
        let mut arb = arbiter(0, balancing, SolveFailurePolicy::ZeroForce);
        run(&mut arb, 0);
        run(&mut arb, 1);
        let out = run(&mut arb, 2);
        assert!(out.solve_failed);
        assert_eq!(out.forces, LegForces::zeros());
    }

    #[test]
    fn non_finite_output_counts_as_failure() {
        let mut arb = arbiter(0, Constant::new(f64::NAN), SolveFailurePolicy::ZeroForce);
        let out = run(&mut arb, 0);
        assert!(out.solve_failed);
        assert!(out.forces.is_finite());
    }

    #[test]
    fn failure_policy_parses_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            policy: SolveFailurePolicy,
        }
        let w: Wrapper = toml::from_str("policy = \"fall_back_to_settling\"").unwrap();
        assert_eq!(w.policy, SolveFailurePolicy::FallBackToSettling);
    }
}
