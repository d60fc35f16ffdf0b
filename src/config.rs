//! Agent configuration.
//!
//! Loaded from `deskagent.yaml`. Every field has a default, so an empty file
//! (or no file at all) is a valid configuration.
//!
//! ```yaml
//! max_history: 50
//! max_iterations: 10
//! confirmation_timeout_secs: 60
//! skills_dir: ${DESKAGENT_SKILLS:-~/deskagent/skills}
//! experience_file: experience.txt
//! ```
//!
//! String values may reference environment variables as `${VAR}` or
//! `${VAR:-default}`; a default starting with `~` is expanded to the home
//! directory. Relative paths are resolved against the config file's
//! directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::agent_core::errors::AgentError;
use crate::agent_core::prompt::DEFAULT_SYSTEM_PROMPT;

/// File name searched for by [`find_config_path`].
pub const CONFIG_FILE_NAME: &str = "deskagent.yaml";

/// Env var naming a directory that holds `deskagent.yaml`.
pub const CONFIG_HOME_ENV: &str = "DESKAGENT_HOME";

// ─── AgentConfig ─────────────────────────────────────────────────────────────

fn default_max_history() -> usize {
    50
}
fn default_max_iterations() -> usize {
    10
}
fn default_confirmation_timeout_secs() -> u64 {
    60
}
fn default_confirmation_queue_capacity() -> usize {
    32
}
fn default_confirmation_poll_interval_ms() -> u64 {
    100
}
fn default_max_tool_result_chars() -> usize {
    6_000
}
fn default_skills_dir() -> PathBuf {
    PathBuf::from("skills")
}
fn default_experience_file() -> PathBuf {
    PathBuf::from("experience.txt")
}
fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

/// Runtime settings for one agent instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Messages kept in the conversation window.
    #[serde(default = "default_max_history")]
    pub max_history: usize,

    /// Tool-use rounds allowed per turn.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// How long a dangerous call waits for the user before it is denied.
    #[serde(default = "default_confirmation_timeout_secs")]
    pub confirmation_timeout_secs: u64,

    /// Pending confirmations allowed before requesters wait for space.
    #[serde(default = "default_confirmation_queue_capacity")]
    pub confirmation_queue_capacity: usize,

    /// Drain period for polling confirmation consumers.
    #[serde(default = "default_confirmation_poll_interval_ms")]
    pub confirmation_poll_interval_ms: u64,

    /// Cap on tool-result text fed back to the model. 0 disables the cap.
    #[serde(default = "default_max_tool_result_chars")]
    pub max_tool_result_chars: usize,

    /// Root of the skill manifest tree.
    #[serde(default = "default_skills_dir")]
    pub skills_dir: PathBuf,

    /// Experience notes appended to the system prompt.
    #[serde(default = "default_experience_file")]
    pub experience_file: PathBuf,

    /// Base system prompt.
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_history: default_max_history(),
            max_iterations: default_max_iterations(),
            confirmation_timeout_secs: default_confirmation_timeout_secs(),
            confirmation_queue_capacity: default_confirmation_queue_capacity(),
            confirmation_poll_interval_ms: default_confirmation_poll_interval_ms(),
            max_tool_result_chars: default_max_tool_result_chars(),
            skills_dir: default_skills_dir(),
            experience_file: default_experience_file(),
            system_prompt: default_system_prompt(),
        }
    }
}

impl AgentConfig {
    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    pub fn confirmation_poll_interval(&self) -> Duration {
        Duration::from_millis(self.confirmation_poll_interval_ms)
    }

    /// Reject values the engine can't run with.
    pub fn validate(&self) -> Result<(), AgentError> {
        let positive = [
            ("max_history", self.max_history),
            ("max_iterations", self.max_iterations),
            ("confirmation_queue_capacity", self.confirmation_queue_capacity),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(AgentError::InvalidConfig {
                    field: field.into(),
                    reason: "must be at least 1".into(),
                });
            }
        }
        Ok(())
    }

    /// Make relative paths relative to `base` (normally the config file's
    /// directory).
    pub fn resolve_paths(&mut self, base: &Path) {
        if self.skills_dir.is_relative() {
            self.skills_dir = base.join(&self.skills_dir);
        }
        if self.experience_file.is_relative() {
            self.experience_file = base.join(&self.experience_file);
        }
    }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Locate `deskagent.yaml`.
///
/// Search order:
/// 1. `$DESKAGENT_HOME/deskagent.yaml`
/// 2. `start` and each of its ancestors
pub fn find_config_path(start: &Path) -> Result<PathBuf, AgentError> {
    if let Ok(home) = std::env::var(CONFIG_HOME_ENV) {
        let candidate = PathBuf::from(expand_tilde(&home)).join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            return Ok(candidate);
        }
    }

    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            return Ok(candidate);
        }
        if !dir.pop() {
            break;
        }
    }

    Err(AgentError::ConfigNotFound {
        path: start.join(CONFIG_FILE_NAME).display().to_string(),
    })
}

/// Read, interpolate, parse and validate a config file.
pub fn load_config(path: &Path) -> Result<AgentConfig, AgentError> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            AgentError::ConfigNotFound {
                path: path.display().to_string(),
            }
        } else {
            AgentError::io(path, e)
        }
    })?;

    let mut config = parse_config(&raw).map_err(|reason| AgentError::ConfigParseError {
        path: path.display().to_string(),
        reason,
    })?;

    if let Some(base) = path.parent() {
        config.resolve_paths(base);
    }
    config.validate()?;

    tracing::info!(
        path = %path.display(),
        max_history = config.max_history,
        max_iterations = config.max_iterations,
        skills_dir = %config.skills_dir.display(),
        "loaded agent config"
    );
    Ok(config)
}

/// Parse config text (after env interpolation). Empty text gives defaults.
pub fn parse_config(raw: &str) -> Result<AgentConfig, String> {
    let interpolated = interpolate_env_vars(raw);
    if interpolated.trim().is_empty() {
        return Ok(AgentConfig::default());
    }
    serde_yaml::from_str(&interpolated).map_err(|e| e.to_string())
}

/// Replace `${VAR}` / `${VAR:-default}` with environment values.
fn interpolate_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut expr = String::new();
            let mut closed = false;
            for c in chars.by_ref() {
                if c == '}' {
                    closed = true;
                    break;
                }
                expr.push(c);
            }
            if closed {
                result.push_str(&resolve_var_expr(&expr));
            } else {
                // Unterminated: keep it literally.
                result.push_str("${");
                result.push_str(&expr);
            }
        } else {
            result.push(ch);
        }
    }

    result
}

fn resolve_var_expr(expr: &str) -> String {
    match expr.split_once(":-") {
        Some((name, default)) => std::env::var(name)
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| expand_tilde(default)),
        None => std::env::var(expr).unwrap_or_default(),
    }
}

/// Expand a leading `~` to the home directory.
fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.display());
        }
    }
    path.to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
