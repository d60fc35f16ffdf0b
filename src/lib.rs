//! Orchestration core for a desktop AI agent.
//!
//! A turn goes: user message → LLM → tool calls (risk-checked, confirmed when
//! dangerous, dispatched through the skill registry) → results back to the
//! LLM → … → final answer. See [`agent_core::OrchestrationEngine`].
//!
//! The embedding application supplies the LLM ([`inference::LlmProvider`]),
//! the skill implementations ([`skills::HandlerTable`]), a confirmation
//! decision function and a progress sink.

pub mod agent_core;
pub mod config;
pub mod inference;
pub mod skills;

pub use agent_core::{
    confirmation_channel, AgentError, ConfirmationBridge, ConfirmationQueue, ConversationContext,
    OrchestrationEngine, ProgressEvent, ProgressSink, SafetyClassifier, TurnOutcome, TurnState,
};
pub use config::{find_config_path, load_config, AgentConfig};
pub use inference::{LlmProvider, LlmResponse, ProviderError, ToolCall};
pub use skills::{HandlerTable, SkillRegistry, SkillResult};

use std::path::{Path, PathBuf};

/// Number of rotated log files kept next to `agent.log`.
const KEEP_LOGS: u32 = 3;

/// Platform data directory for the agent.
///
/// - macOS: `~/Library/Application Support/deskagent/`
/// - Windows: `{FOLDERID_RoamingAppData}\deskagent\`
/// - Linux: `$XDG_DATA_HOME/deskagent/` (fallback `~/.local/share/deskagent/`)
///
/// Falls back to `~/.deskagent/` when none of those resolve.
pub fn data_dir() -> PathBuf {
    if let Some(dir) = dirs::data_dir() {
        return dir.join("deskagent");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".deskagent")
}

/// Install the global tracing subscriber, logging to `<log_dir>/agent.log`.
///
/// On each call:
/// 1. Rotates existing logs (agent.log → agent.log.1 → .2 → .3).
/// 2. Opens a fresh agent.log behind a line-flushing writer.
/// 3. Logs a startup banner.
///
/// The filter comes from `RUST_LOG`, defaulting to `deskagent=info,warn`.
pub fn init_tracing(log_dir: &Path) -> Result<(), AgentError> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    std::fs::create_dir_all(log_dir).map_err(|e| AgentError::io(log_dir, e))?;
    let log_path = log_dir.join("agent.log");
    rotate_log_file(&log_path, KEEP_LOGS);

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .map_err(|e| AgentError::io(&log_path, e))?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("deskagent=info,warn"));

    fmt::fmt()
        .with_env_filter(filter)
        .with_writer(FlushingWriter::new(log_file))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .try_init()
        .map_err(|e| AgentError::LoggingError {
            reason: e.to_string(),
        })?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        log_file = %log_path.display(),
        pid = std::process::id(),
        "=== deskagent starting ==="
    );
    Ok(())
}

/// Rotate `agent.log` → `agent.log.1` → … → `.{keep}`; the oldest is deleted.
fn rotate_log_file(base_path: &Path, keep: u32) {
    let oldest = format!("{}.{keep}", base_path.display());
    let _ = std::fs::remove_file(&oldest);

    for i in (1..keep).rev() {
        let from = format!("{}.{i}", base_path.display());
        let to = format!("{}.{}", base_path.display(), i + 1);
        let _ = std::fs::rename(&from, &to);
    }

    if base_path.exists() {
        let to = format!("{}.1", base_path.display());
        let _ = std::fs::rename(base_path, &to);
    }
}

/// File writer that flushes after every write so log lines survive a crash.
#[derive(Clone)]
struct FlushingWriter {
    file: std::sync::Arc<std::sync::Mutex<std::fs::File>>,
}

impl FlushingWriter {
    fn new(file: std::fs::File) -> Self {
        Self {
            file: std::sync::Arc::new(std::sync::Mutex::new(file)),
        }
    }
}

impl std::io::Write for FlushingWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("lock poisoned: {e}")))?;
        let n = std::io::Write::write(&mut *f, buf)?;
        std::io::Write::flush(&mut *f)?;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("lock poisoned: {e}")))?;
        std::io::Write::flush(&mut *f)
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for FlushingWriter {
    type Writer = FlushingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotate_shifts_and_drops_oldest() {
        let tmp = tempfile::tempdir().unwrap();
        let base = tmp.path().join("agent.log");
        std::fs::write(&base, "current").unwrap();
        std::fs::write(tmp.path().join("agent.log.1"), "one").unwrap();
        std::fs::write(tmp.path().join("agent.log.3"), "three").unwrap();

        rotate_log_file(&base, 3);

        assert!(!base.exists());
        let read = |name: &str| std::fs::read_to_string(tmp.path().join(name)).unwrap();
        assert_eq!(read("agent.log.1"), "current");
        assert_eq!(read("agent.log.2"), "one");
        assert!(!tmp.path().join("agent.log.3").exists());
    }

    #[test]
    fn test_flushing_writer_writes_through() {
        use std::io::Write;
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("out.log");
        let file = std::fs::File::create(&path).unwrap();
        let mut writer = FlushingWriter::new(file);
        writer.write_all(b"line\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "line\n");
    }

    #[test]
    fn test_data_dir_is_named_for_crate() {
        let dir = data_dir();
        let name = dir.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name == "deskagent" || name == ".deskagent");
    }
}
