//! Controller configuration loaded from TOML.
//!
//! ```toml
//! [control]
//! period = 0.001
//! settle_cycles = 5000
//!
//! [mpc]
//! horizon = 3
//! friction_coeff = 0.6
//!
//! [vsd]
//! stiffness = [[3000.0, 3000.0, 3000.0], ...]
//!
//! [body]
//! mass = 83.282
//!
//! [[legs]]
//! leg = "left_front"
//! ...
//! ```
//!
//! Every section and field is optional; missing values take the defaults of
//! the HyQ quadruped.

use std::path::Path;

use serde::{Deserialize, Serialize};

use stance_core::{ConfigError, InitError, JointGain, JointGains, N_JOINTS, N_LEGS};
use stance_model::{LegChainSpec, presets};
use stance_mpc::{MpcConfig, RigidBody};

use crate::arbiter::SolveFailurePolicy;

// ---------------------------------------------------------------------------
// Serde default functions
// ---------------------------------------------------------------------------

const fn default_period() -> f64 {
    0.001
}
const fn default_settle_cycles() -> u64 {
    5000
}
const fn default_telemetry_divisor() -> u32 {
    10
}
const fn default_log_every() -> u64 {
    100
}
const fn default_stiffness() -> [[f64; 3]; N_LEGS] {
    [[3000.0; 3]; N_LEGS]
}
const fn default_damping() -> [[f64; 3]; N_LEGS] {
    [[300.0; 3]; N_LEGS]
}
const fn default_standing_foot() -> [[f64; 3]; N_LEGS] {
    [[0.0, 0.0, -0.4]; N_LEGS]
}
fn default_gains() -> Vec<NamedGain> {
    presets::hyq_legs()
        .into_iter()
        .flat_map(|leg| leg.joints)
        .map(|joint| NamedGain {
            joint: joint.name,
            p: 0.0,
            d: 0.0,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// ControlConfig
// ---------------------------------------------------------------------------

/// Gain pair of one named joint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedGain {
    pub joint: String,
    #[serde(default)]
    pub p: f64,
    #[serde(default)]
    pub d: f64,
}

/// Cycle timing, mode switching and failure handling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Control period in seconds (default: 0.001 = 1 kHz).
    #[serde(default = "default_period")]
    pub period: f64,

    /// Settling cycles before switching to predictive balance.
    #[serde(default = "default_settle_cycles")]
    pub settle_cycles: u64,

    /// Telemetry is published every `telemetry_divisor` cycles.
    #[serde(default = "default_telemetry_divisor")]
    pub telemetry_divisor: u32,

    /// Throttle of the per-cycle debug log, in cycles.
    #[serde(default = "default_log_every")]
    pub log_every: u64,

    /// Output used when the balance solve fails.
    #[serde(default)]
    pub failure_policy: SolveFailurePolicy,

    /// Initial per-joint gains. Every joint of the robot needs an entry.
    #[serde(default = "default_gains")]
    pub gains: Vec<NamedGain>,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            period: default_period(),
            settle_cycles: default_settle_cycles(),
            telemetry_divisor: default_telemetry_divisor(),
            log_every: default_log_every(),
            failure_policy: SolveFailurePolicy::default(),
            gains: default_gains(),
        }
    }
}

// ---------------------------------------------------------------------------
// VsdConfig
// ---------------------------------------------------------------------------

/// Per-leg, per-axis spring-damper gains and standing pose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VsdConfig {
    /// Stiffness (N/m) by leg and axis.
    #[serde(default = "default_stiffness")]
    pub stiffness: [[f64; 3]; N_LEGS],

    /// Damping (N s/m) by leg and axis.
    #[serde(default = "default_damping")]
    pub damping: [[f64; 3]; N_LEGS],

    /// Desired foot position in the hip frame (m), by leg.
    #[serde(default = "default_standing_foot")]
    pub standing_foot: [[f64; 3]; N_LEGS],
}

impl Default for VsdConfig {
    fn default() -> Self {
        Self {
            stiffness: default_stiffness(),
            damping: default_damping(),
            standing_foot: default_standing_foot(),
        }
    }
}

// ---------------------------------------------------------------------------
// ControllerConfig
// ---------------------------------------------------------------------------

/// Complete controller configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    #[serde(default)]
    pub control: ControlConfig,

    #[serde(default)]
    pub mpc: MpcConfig,

    #[serde(default)]
    pub vsd: VsdConfig,

    #[serde(default)]
    pub body: RigidBody,

    /// One chain description per leg.
    #[serde(default = "presets::hyq_legs")]
    pub legs: Vec<LegChainSpec>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            control: ControlConfig::default(),
            mpc: MpcConfig::default(),
            vsd: VsdConfig::default(),
            body: RigidBody::default(),
            legs: presets::hyq_legs(),
        }
    }
}

impl ControllerConfig {
    /// Validate configuration. Returns Err on the first invalid value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.control;
        if !c.period.is_finite() || c.period <= 0.0 {
            return Err(ConfigError::invalid(
                "control.period",
                format!("must be positive, got {}", c.period),
            ));
        }
        if c.telemetry_divisor == 0 {
            return Err(ConfigError::invalid(
                "control.telemetry_divisor",
                "must be at least 1",
            ));
        }
        if c.log_every == 0 {
            return Err(ConfigError::invalid("control.log_every", "must be at least 1"));
        }
        if let Some(g) = c.gains.iter().find(|g| !g.p.is_finite() || !g.d.is_finite()) {
            return Err(ConfigError::invalid(
                "control.gains",
                format!("non-finite gain for {}", g.joint),
            ));
        }

        self.mpc.validate()?;
        self.body.validate()?;

        let vsd = &self.vsd;
        let gains = vsd.stiffness.iter().chain(&vsd.damping).flatten();
        if gains.copied().any(|k| !k.is_finite() || k < 0.0) {
            return Err(ConfigError::invalid(
                "vsd",
                "stiffness and damping must be finite and non-negative",
            ));
        }
        if vsd.standing_foot.iter().flatten().any(|v| !v.is_finite()) {
            return Err(ConfigError::invalid("vsd.standing_foot", "must be finite"));
        }

        if self.legs.len() != N_LEGS {
            return Err(ConfigError::invalid(
                "legs",
                format!("expected {N_LEGS} legs, got {}", self.legs.len()),
            ));
        }
        let joints: usize = self.legs.iter().map(|l| l.joints.len()).sum();
        if joints != N_JOINTS {
            return Err(ConfigError::invalid(
                "legs",
                format!("expected {N_JOINTS} joints, got {joints}"),
            ));
        }
        Ok(())
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Initial gains in the order of `joint_names`.
    ///
    /// # Errors
    ///
    /// [`InitError::MissingGain`] if a joint has no gain entry.
    pub fn initial_gains(&self, joint_names: &[&str; N_JOINTS]) -> Result<JointGains, InitError> {
        let mut gains = JointGains::default();
        for (slot, name) in gains.0.iter_mut().zip(joint_names) {
            let entry = self
                .control
                .gains
                .iter()
                .find(|g| g.joint == *name)
                .ok_or_else(|| InitError::MissingGain((*name).to_owned()))?;
            *slot = JointGain {
                p: entry.p,
                d: entry.d,
            };
        }
        Ok(gains)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        ControllerConfig::default().validate().unwrap();
    }

    #[test]
    fn empty_document_gives_defaults() {
        let cfg = ControllerConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, ControllerConfig::default());
        assert_eq!(cfg.control.settle_cycles, 5000);
        assert_eq!(cfg.legs.len(), 4);
    }

    #[test]
    fn partial_sections_override_fields() {
        let cfg = ControllerConfig::from_toml_str(
            r#"
            [control]
            settle_cycles = 200
            failure_policy = "zero_force"

            [mpc]
            f_max = 500.0

            [body]
            mass = 40.0
            "#,
        )
        .unwrap();
        assert_eq!(cfg.control.settle_cycles, 200);
        assert_eq!(cfg.control.failure_policy, SolveFailurePolicy::ZeroForce);
        assert_eq!(cfg.control.period, 0.001);
        assert_eq!(cfg.mpc.f_max, 500.0);
        assert_eq!(cfg.mpc.f_min, 10.0);
        assert_eq!(cfg.body.mass, 40.0);
    }

    #[test]
    fn serialized_default_parses_back() {
        let cfg = ControllerConfig::default();
        let text = cfg.to_toml().unwrap();
        assert!(text.contains("[[legs]]"));
        assert_eq!(ControllerConfig::from_toml_str(&text).unwrap(), cfg);
    }

    #[test]
    fn rejects_bad_period() {
        let mut cfg = ControllerConfig::default();
        cfg.control.period = 0.0;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("control.period"));
    }

    #[test]
    fn rejects_wrong_leg_count() {
        let mut cfg = ControllerConfig::default();
        cfg.legs.pop();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_negative_stiffness() {
        let mut cfg = ControllerConfig::default();
        cfg.vsd.stiffness[2][1] = -1.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn propagates_mpc_validation() {
        let mut cfg = ControllerConfig::default();
        cfg.mpc.f_min = 1000.0;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("mpc.f_min"));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = ControllerConfig::from_toml_str("[control\nperiod = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn gains_follow_joint_order() {
        let mut cfg = ControllerConfig::default();
        cfg.control.gains[4].p = 80.0;
        cfg.control.gains[4].d = 2.0;
        let names: Vec<String> = cfg.control.gains.iter().map(|g| g.joint.clone()).collect();
        let names: [&str; N_JOINTS] = std::array::from_fn(|i| names[i].as_str());
        let gains = cfg.initial_gains(&names).unwrap();
        assert_eq!(gains.0[4], JointGain { p: 80.0, d: 2.0 });
    }

    #[test]
    fn missing_gain_is_fatal() {
        let mut cfg = ControllerConfig::default();
        let removed = cfg.control.gains.remove(7);
        let names: [&str; N_JOINTS] = std::array::from_fn(|_| removed.joint.as_str());
        let err = cfg.initial_gains(&names).unwrap_err();
        assert!(matches!(err, InitError::MissingGain(name) if name == removed.joint));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = ControllerConfig::from_file("/nonexistent/stance.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
