//! Skill error types.
//!
//! The Display strings double as the `error` text fed back to the model, so
//! they are phrased for a reader rather than a log grep.

use thiserror::Error;

/// Errors that can occur while loading or executing skills.
#[derive(Debug, Error)]
pub enum SkillError {
    /// No skill with this name is registered.
    #[error("Skill not found: {name}")]
    NotFound { name: String },

    /// The skill is registered but disabled.
    #[error("Skill is disabled: {name}")]
    Disabled { name: String },

    /// The definition names a handler that was never bound.
    #[error("Skill has no implementation: {name}")]
    NoImplementation { name: String },

    /// Arguments don't match the parameter schema.
    #[error("Invalid arguments for {name}: {reason}")]
    InvalidArguments { name: String, reason: String },

    /// The handler panicked.
    #[error("Skill {name} panicked: {message}")]
    Panicked { name: String, message: String },

    /// A definition document could not be turned into a skill.
    #[error("invalid skill definition '{source_name}': {reason}")]
    InvalidDefinition { source_name: String, reason: String },

    /// A definition file could not be read or parsed.
    #[error("failed to load skill file {path}: {reason}")]
    LoadFailed { path: String, reason: String },
}
