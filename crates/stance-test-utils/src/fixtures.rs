//! Standard robot fixtures.

use nalgebra::Vector3;

use stance_core::BodyState;
use stance_model::{RobotModel, presets};

/// Standard gravity used by all fixtures (m/s^2).
pub const GRAVITY: f64 = 9.81;

/// Four-leg HyQ model under standard gravity.
pub fn hyq_model() -> RobotModel {
    RobotModel::from_specs(&presets::hyq_legs(), GRAVITY)
        .unwrap_or_else(|e| panic!("HyQ preset must build: {e}"))
}

/// HyQ joint names in joint-vector order.
pub fn hyq_joint_names() -> Vec<String> {
    presets::hyq_legs()
        .into_iter()
        .flat_map(|leg| leg.joints.into_iter().map(|j| j.name))
        .collect()
}

/// Trunk at rest, level, with the feet of the zero configuration on the
/// ground.
pub fn standing_body() -> BodyState {
    BodyState::at_rest(Vector3::new(0.0, 0.0, 0.68))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joint_names_match_model() {
        let model = hyq_model();
        let names = hyq_joint_names();
        assert_eq!(names.len(), 12);
        for (a, b) in names.iter().zip(model.joint_names()) {
            assert_eq!(a, b);
        }
    }
}
