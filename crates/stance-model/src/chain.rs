//! Serial leg chain: three revolute joints from the body to the foot.
//!
//! A [`LegChainSpec`] is the serde-facing description supplied once at
//! initialization by the robot-description provider. [`LegChain::from_spec`]
//! validates it into fixed-size per-joint records holding the static
//! transform, joint axis, limits and the inertial parameters of the link the
//! joint drives.

use nalgebra::{Isometry3, Matrix3, Translation3, UnitQuaternion, UnitVector3, Vector3};
use serde::{Deserialize, Serialize};

use stance_core::{InitError, JOINTS_PER_LEG, Leg};

// ---------------------------------------------------------------------------
// Description types
// ---------------------------------------------------------------------------

/// A pose given as translation + roll-pitch-yaw, relative to the parent frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Origin {
    /// Translation `[x, y, z]` in meters.
    #[serde(default)]
    pub xyz: [f64; 3],
    /// Rotation `[roll, pitch, yaw]` in radians.
    #[serde(default)]
    pub rpy: [f64; 3],
}

/// Inertial parameters of a link, in the link frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LinkInertial {
    /// Mass in kilograms.
    pub mass: f64,
    /// Center of mass in the link frame (m).
    #[serde(default)]
    pub com: [f64; 3],
    /// Inertia about the center of mass: `[ixx, ixy, ixz, iyy, iyz, izz]`.
    #[serde(default)]
    pub inertia: [f64; 6],
}

/// One revolute joint and the link it drives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointSpec {
    pub name: String,
    /// Static transform from the parent link frame to this joint's frame.
    #[serde(default)]
    pub origin: Origin,
    /// Rotation axis in the joint frame.
    pub axis: [f64; 3],
    /// Symmetric effort limit (Nm).
    pub effort_limit: f64,
    /// Lower position limit (rad). `None` means unbounded.
    #[serde(default)]
    pub lower: Option<f64>,
    /// Upper position limit (rad). `None` means unbounded.
    #[serde(default)]
    pub upper: Option<f64>,
    /// Child link inertial parameters.
    pub link: LinkInertial,
}

/// Description of one leg chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegChainSpec {
    pub leg: Leg,
    /// Joints from body to foot. Must contain exactly three entries.
    pub joints: Vec<JointSpec>,
    /// Foot contact point in the last link frame (m).
    pub foot_offset: [f64; 3],
}

// ---------------------------------------------------------------------------
// LegChain
// ---------------------------------------------------------------------------

/// A validated joint of a [`LegChain`].
#[derive(Debug, Clone)]
pub struct ChainJoint {
    pub name: String,
    /// Static transform from the parent link frame to this joint frame.
    pub origin: Isometry3<f64>,
    /// Joint axis in the joint frame.
    pub axis: UnitVector3<f64>,
    pub effort_limit: f64,
    pub lower_limit: f64,
    pub upper_limit: f64,
    /// Child link mass (kg).
    pub mass: f64,
    /// Child link center of mass in the link frame.
    pub com: Vector3<f64>,
    /// Child link inertia about its center of mass, in the link frame.
    pub inertia: Matrix3<f64>,
}

/// Joint origins, axes and link orientations of one configuration, all in
/// the body frame.
#[derive(Debug, Clone, Copy)]
pub struct JointFrames {
    pub origins: [Vector3<f64>; JOINTS_PER_LEG],
    pub axes: [Vector3<f64>; JOINTS_PER_LEG],
    /// Orientation of each child link frame after the joint rotation.
    pub link_rotations: [UnitQuaternion<f64>; JOINTS_PER_LEG],
    /// Foot position in the body frame.
    pub foot: Vector3<f64>,
}

/// A three-joint serial chain from the body to one foot.
#[derive(Debug, Clone)]
pub struct LegChain {
    leg: Leg,
    joints: [ChainJoint; JOINTS_PER_LEG],
    foot_offset: Vector3<f64>,
}

impl LegChain {
    /// Validate a chain description.
    ///
    /// # Errors
    ///
    /// Returns [`InitError::ChainConstruction`] if the chain does not have
    /// exactly three joints, or a joint has a degenerate axis, a non-positive
    /// effort limit, inverted position limits or non-finite inertial values.
    pub fn from_spec(spec: &LegChainSpec) -> Result<Self, InitError> {
        let fail = |reason: String| InitError::ChainConstruction {
            leg: spec.leg.to_string(),
            reason,
        };

        if spec.joints.len() != JOINTS_PER_LEG {
            return Err(fail(format!(
                "expected {JOINTS_PER_LEG} joints, got {}",
                spec.joints.len()
            )));
        }

        let mut built = Vec::with_capacity(JOINTS_PER_LEG);
        for joint in &spec.joints {
            built.push(build_joint(joint).map_err(&fail)?);
        }

        let joints: [ChainJoint; JOINTS_PER_LEG] = built
            .try_into()
            .map_err(|_| fail("joint count changed during construction".into()))?;

        let foot_offset = Vector3::from(spec.foot_offset);
        if !foot_offset.iter().all(|v| v.is_finite()) {
            return Err(fail("foot offset is not finite".into()));
        }

        Ok(Self {
            leg: spec.leg,
            joints,
            foot_offset,
        })
    }

    pub const fn leg(&self) -> Leg {
        self.leg
    }

    pub const fn joints(&self) -> &[ChainJoint; JOINTS_PER_LEG] {
        &self.joints
    }

    /// Joint names in chain order.
    pub fn joint_names(&self) -> [&str; JOINTS_PER_LEG] {
        [
            self.joints[0].name.as_str(),
            self.joints[1].name.as_str(),
            self.joints[2].name.as_str(),
        ]
    }

    pub const fn foot_offset(&self) -> &Vector3<f64> {
        &self.foot_offset
    }

    /// Hip origin in the body frame: the first joint's origin.
    pub fn hip_offset(&self) -> Vector3<f64> {
        self.joints[0].origin.translation.vector
    }

    /// Joint origins, axes and foot position for configuration `q`.
    pub fn joint_frames(&self, q: &Vector3<f64>) -> JointFrames {
        let mut transform = Isometry3::identity();
        let mut origins = [Vector3::zeros(); JOINTS_PER_LEG];
        let mut axes = [Vector3::zeros(); JOINTS_PER_LEG];
        let mut link_rotations = [UnitQuaternion::identity(); JOINTS_PER_LEG];

        for (i, joint) in self.joints.iter().enumerate() {
            transform *= joint.origin;

            // Origin and axis are recorded before the joint's own rotation.
            origins[i] = transform.translation.vector;
            axes[i] = transform.rotation * joint.axis.into_inner();

            transform *= Isometry3::from_parts(
                Translation3::identity(),
                UnitQuaternion::from_axis_angle(&joint.axis, q[i]),
            );
            link_rotations[i] = transform.rotation;
        }

        let foot = transform * nalgebra::Point3::from(self.foot_offset);

        JointFrames {
            origins,
            axes,
            link_rotations,
            foot: foot.coords,
        }
    }

    /// Foot position relative to the hip origin.
    pub fn forward_kinematics(&self, q: &Vector3<f64>) -> Vector3<f64> {
        self.joint_frames(q).foot - self.hip_offset()
    }

    /// Linear Jacobian from the joint frames: column `i` is `axis_i × (foot − origin_i)`.
    pub fn jacobian(frames: &JointFrames) -> Matrix3<f64> {
        let mut j = Matrix3::zeros();
        for i in 0..JOINTS_PER_LEG {
            let col = frames.axes[i].cross(&(frames.foot - frames.origins[i]));
            j.set_column(i, &col);
        }
        j
    }

    /// Clamp a position command for local joint `index` to its limits.
    pub fn enforce_position_limit(&self, index: usize, command: f64) -> f64 {
        let joint = &self.joints[index];
        command.clamp(joint.lower_limit, joint.upper_limit)
    }
}

fn build_joint(spec: &JointSpec) -> Result<ChainJoint, String> {
    let axis = Vector3::from(spec.axis);
    let axis = UnitVector3::try_new(axis, 1e-9)
        .ok_or_else(|| format!("joint {} has a zero-length axis", spec.name))?;

    if spec.effort_limit.is_nan() || spec.effort_limit <= 0.0 {
        return Err(format!(
            "joint {} effort limit must be > 0, got {}",
            spec.name, spec.effort_limit
        ));
    }

    let lower = spec.lower.unwrap_or(f64::NEG_INFINITY);
    let upper = spec.upper.unwrap_or(f64::INFINITY);
    if lower > upper {
        return Err(format!(
            "joint {} lower limit {lower} exceeds upper limit {upper}",
            spec.name
        ));
    }

    let link = &spec.link;
    let finite = link.mass.is_finite()
        && link.com.iter().all(|v| v.is_finite())
        && link.inertia.iter().all(|v| v.is_finite());
    if !finite || link.mass < 0.0 {
        return Err(format!("joint {} has invalid link inertial values", spec.name));
    }

    let [ixx, ixy, ixz, iyy, iyz, izz] = link.inertia;

    Ok(ChainJoint {
        name: spec.name.clone(),
        origin: origin_to_isometry(&spec.origin),
        axis,
        effort_limit: spec.effort_limit,
        lower_limit: lower,
        upper_limit: upper,
        mass: link.mass,
        com: Vector3::from(link.com),
        inertia: Matrix3::new(ixx, ixy, ixz, ixy, iyy, iyz, ixz, iyz, izz),
    })
}

/// Convert an [`Origin`] (xyz + rpy) to an [`Isometry3`].
fn origin_to_isometry(origin: &Origin) -> Isometry3<f64> {
    let [x, y, z] = origin.xyz;
    let [roll, pitch, yaw] = origin.rpy;
    Isometry3::from_parts(
        Translation3::new(x, y, z),
        UnitQuaternion::from_euler_angles(roll, pitch, yaw),
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
