//! Deterministic RNG utilities for reproducible tests.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use stance_core::{JointMeasurement, N_JOINTS};

/// Create a deterministic `ChaCha8Rng` from a seed.
///
/// All test randomization should go through this to ensure reproducibility.
pub fn seeded_rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

/// Joint measurement with positions in `±position_range` and velocities in
/// `±velocity_range`.
pub fn random_measurement(
    rng: &mut impl Rng,
    position_range: f64,
    velocity_range: f64,
) -> JointMeasurement {
    let mut m = JointMeasurement::zeros();
    for i in 0..N_JOINTS {
        m.position[i] = rng.gen_range(-position_range..=position_range);
        m.velocity[i] = rng.gen_range(-velocity_range..=velocity_range);
    }
    m
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
