//! Settling-to-balancing transition predicates.

use crate::strategy::ModelSnapshot;

/// Decides when the arbiter leaves the settling phase.
///
/// Queried once per settling cycle; never again after it returns `true`.
pub trait TransitionPolicy: Send {
    /// `elapsed_cycles` counts completed settling cycles before this one.
    fn should_switch(&mut self, elapsed_cycles: u64, snapshot: &ModelSnapshot<'_>) -> bool;

    fn name(&self) -> &str;
}

/// Switches after a fixed number of settling cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleCountTrigger {
    threshold: u64,
}

impl CycleCountTrigger {
    pub const fn new(threshold: u64) -> Self {
        Self { threshold }
    }

    pub const fn threshold(&self) -> u64 {
        self.threshold
    }
}

impl TransitionPolicy for CycleCountTrigger {
    fn should_switch(&mut self, elapsed_cycles: u64, _snapshot: &ModelSnapshot<'_>) -> bool {
        elapsed_cycles >= self.threshold
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "cycle_count"
    }
}
