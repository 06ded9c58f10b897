// Error taxonomy shared by the engine.
//
// Actions return `anyhow::Result`; these types ride inside the `anyhow::Error`
// (as the error itself or as context) so callers can classify a failure by
// downcasting without losing the underlying cause.

use std::fmt;

/// Context attached to the error of the first action that failed, so the
/// surfaced message always names it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionFailure {
    pub action: String,
}

impl fmt::Display for ActionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Action '{}' failed", self.action)
    }
}

/// Context attached to a cleanup error that surfaced because `run` itself
/// succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupFailure {
    pub action: String,
}

impl fmt::Display for CleanupFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cleanup of action '{}' failed", self.action)
    }
}

/// Contract or configuration violations. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Required environment variable '{0}' is not set")]
    MissingEnvironment(String),

    #[error("No CI platform detected among candidates: {}", .candidates.join(", "))]
    NoPlatformDetected { candidates: Vec<String> },

    #[error("Platform '{0}' was forced but is not a known candidate")]
    UnknownPlatform(String),

    #[error("Invalid value '{value}' for setting '{setting}'")]
    InvalidSetting { setting: String, value: String },
}

/// Whether `err`, or anything in its cause chain, is a `ConfigurationError`.
pub fn is_configuration_error(err: &anyhow::Error) -> bool {
    err.downcast_ref::<ConfigurationError>().is_some()
        || err
            .chain()
            .any(|cause| cause.downcast_ref::<ConfigurationError>().is_some())
}

/// Name of the action that originally failed, if the engine recorded one.
pub fn failed_action(err: &anyhow::Error) -> Option<&str> {
    err.downcast_ref::<ActionFailure>()
        .map(|failure| failure.action.as_str())
}
