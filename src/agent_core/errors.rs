//! Agent Core error types.
//!
//! Turn-level failures never surface here: provider errors, skill failures
//! and cancellations are folded into the transcript by the engine. These are
//! the setup-time errors (configuration, prompt files, logging).

use thiserror::Error;

/// Errors that can occur while setting up or configuring the agent.
#[derive(Debug, Error)]
pub enum AgentError {
    /// No configuration file at the given path.
    #[error("config file not found: {path}")]
    ConfigNotFound { path: String },

    /// The configuration file exists but doesn't parse.
    #[error("failed to parse config {path}: {reason}")]
    ConfigParseError { path: String, reason: String },

    /// A configuration value is out of range.
    #[error("invalid config value for '{field}': {reason}")]
    InvalidConfig { field: String, reason: String },

    /// Reading or writing a file failed.
    #[error("I/O error on {path}: {reason}")]
    Io { path: String, reason: String },

    /// The tracing subscriber could not be installed.
    #[error("logging setup failed: {reason}")]
    LoggingError { reason: String },

    /// Serialization error.
    #[error("serialization error: {reason}")]
    SerializationError { reason: String },
}

impl AgentError {
    pub(crate) fn io(path: &std::path::Path, e: std::io::Error) -> Self {
        AgentError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(e: serde_json::Error) -> Self {
        AgentError::SerializationError {
            reason: e.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for AgentError {
    fn from(e: serde_yaml::Error) -> Self {
        AgentError::SerializationError {
            reason: e.to_string(),
        }
    }
}
