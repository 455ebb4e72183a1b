//! Leg chain descriptions for common robots.
//!
//! Geometry and inertial values approximate the HyQ hydraulic quadruped.
//! Legs are ordered LF, RF, LH, RH; each leg has hip abduction/adduction
//! (HAA, about x), hip flexion/extension (HFE, about y) and knee
//! flexion/extension (KFE, about y).

use stance_core::Leg;

use crate::chain::{JointSpec, LegChainSpec, LinkInertial, Origin};

/// Hip origin x offset from the body origin (m).
pub const HYQ_HIP_X: f64 = 0.3735;
/// Hip origin y offset from the body origin (m).
pub const HYQ_HIP_Y: f64 = 0.207;

const HIP_LINK: f64 = 0.08;
const UPPER_LEG: f64 = 0.35;
const LOWER_LEG: f64 = 0.33;

const HAA_EFFORT: f64 = 150.0;
const HFE_EFFORT: f64 = 150.0;
const KFE_EFFORT: f64 = 150.0;

/// Chain descriptions of all four HyQ legs.
pub fn hyq_legs() -> Vec<LegChainSpec> {
    Leg::ALL.iter().map(|&leg| hyq_leg(leg)).collect()
}

/// Chain description of one HyQ leg.
pub fn hyq_leg(leg: Leg) -> LegChainSpec {
    let (sx, sy) = match leg {
        Leg::LeftFront => (1.0, 1.0),
        Leg::RightFront => (1.0, -1.0),
        Leg::LeftHind => (-1.0, 1.0),
        Leg::RightHind => (-1.0, -1.0),
    };
    let prefix = leg.short_name();

    LegChainSpec {
        leg,
        joints: vec![
            JointSpec {
                name: format!("{prefix}_haa_joint"),
                origin: Origin {
                    xyz: [sx * HYQ_HIP_X, sy * HYQ_HIP_Y, 0.0],
                    rpy: [0.0; 3],
                },
                axis: [1.0, 0.0, 0.0],
                effort_limit: HAA_EFFORT,
                lower: Some(-1.22),
                upper: Some(0.44),
                link: LinkInertial {
                    mass: 2.93,
                    com: [0.043, 0.0, 0.0],
                    inertia: [0.0028, 0.0, 0.0, 0.0068, 0.0, 0.0065],
                },
            },
            JointSpec {
                name: format!("{prefix}_hfe_joint"),
                origin: Origin {
                    xyz: [sx * HIP_LINK, 0.0, 0.0],
                    rpy: [0.0; 3],
                },
                axis: [0.0, 1.0, 0.0],
                effort_limit: HFE_EFFORT,
                lower: Some(-0.87),
                upper: Some(1.22),
                link: LinkInertial {
                    mass: 2.64,
                    com: [0.0, 0.0, -0.15],
                    inertia: [0.0283, 0.0, 0.0, 0.0285, 0.0, 0.0023],
                },
            },
            JointSpec {
                name: format!("{prefix}_kfe_joint"),
                origin: Origin {
                    xyz: [0.0, 0.0, -UPPER_LEG],
                    rpy: [0.0; 3],
                },
                axis: [0.0, 1.0, 0.0],
                effort_limit: KFE_EFFORT,
                lower: Some(-2.44),
                upper: Some(-0.36),
                link: LinkInertial {
                    mass: 0.88,
                    com: [0.0, 0.0, -0.125],
                    inertia: [0.0106, 0.0, 0.0, 0.0107, 0.0, 0.0004],
                },
            },
        ],
        foot_offset: [0.0, 0.0, -LOWER_LEG],
    }
}
