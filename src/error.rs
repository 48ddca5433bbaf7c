//! Error types for workspace visualization

use thiserror::Error;

pub type Result<T> = std::result::Result<T, VizError>;

/// How far an error is allowed to travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Broken deployment: bad configuration, transport connect failure.
    /// Propagates to the process boundary.
    Fatal,
    /// One telemetry message is unusable. Logged and dropped by the router.
    PerMessage,
    /// Programming-contract violation found during a draw pass. Logged
    /// loudly, the affected entity is skipped for that frame.
    Contract,
}

#[derive(Error, Debug)]
pub enum VizError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Value is not scalable: {0}")]
    InvalidScaleInput(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Malformed telemetry on {binding}: {reason}")]
    MalformedTelemetry { binding: String, reason: String },

    #[error("Identity mismatch: binding {binding} names '{expected}' but payload id is '{actual}'")]
    IdentityMismatch {
        binding: String,
        expected: String,
        actual: String,
    },

    #[error("No route for binding key: {0}")]
    UnroutableBinding(String),

    #[error("Stale telemetry for '{id}': timestamp {received} older than {latest}")]
    StaleTelemetry { id: String, received: f64, latest: f64 },

    #[error("Invalid route pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Tokio task error: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl VizError {
    pub fn class(&self) -> ErrorClass {
        match self {
            VizError::InvalidPayload(_)
            | VizError::MalformedTelemetry { .. }
            | VizError::IdentityMismatch { .. }
            | VizError::UnroutableBinding(_)
            | VizError::StaleTelemetry { .. } => ErrorClass::PerMessage,
            VizError::InvalidScaleInput(_) => ErrorClass::Contract,
            VizError::Config(_)
            | VizError::Connection(_)
            | VizError::Pattern(_)
            | VizError::Task(_)
            | VizError::Io(_)
            | VizError::Yaml(_) => ErrorClass::Fatal,
        }
    }

    pub(crate) fn malformed(binding: &str, reason: impl Into<String>) -> Self {
        VizError::MalformedTelemetry {
            binding: binding.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        assert_eq!(VizError::InvalidPayload("x".into()).class(), ErrorClass::PerMessage);
        assert_eq!(VizError::malformed("telemetry.robot.a", "missing base").class(), ErrorClass::PerMessage);
        assert_eq!(VizError::InvalidScaleInput("\"x\"".into()).class(), ErrorClass::Contract);
        assert_eq!(VizError::Config("missing id".into()).class(), ErrorClass::Fatal);
    }

    #[test]
    fn test_identity_mismatch_display() {
        let err = VizError::IdentityMismatch {
            binding: "telemetry.robot.R7".into(),
            expected: "R7".into(),
            actual: "R3".into(),
        };
        let text = err.to_string();
        assert!(text.contains("R7"));
        assert!(text.contains("R3"));
    }
}
