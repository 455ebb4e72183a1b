use thiserror::Error;

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Fatal initialization errors. Startup aborts; there is no partial operation.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Missing joint configuration: {0}")]
    MissingJoint(String),

    #[error("Chain construction failed for leg {leg}: {reason}")]
    ChainConstruction { leg: String, reason: String },

    #[error("Joint count mismatch: expected {expected}, got {got}")]
    JointCountMismatch { expected: usize, got: usize },

    #[error("Leg count mismatch: expected {expected}, got {got}")]
    LegCountMismatch { expected: usize, got: usize },

    #[error("Missing gain parameter: {0}")]
    MissingGain(String),
}

/// Rejected external joint command. The previous command stays in effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Command dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Rejected gain update. The previous gains stay in effect.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GainError {
    #[error("Cannot find gain for joint {0}")]
    MissingJoint(String),
}
