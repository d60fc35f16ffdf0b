//! System prompt assembly.
//!
//! The prompt is a base text (built in, or overridden from config) plus the
//! optional "experience notes": free-form lessons from earlier sessions kept
//! in a plain text file next to the config.

use std::path::Path;

use super::errors::AgentError;

/// Built-in base prompt.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are a desktop assistant running on the user's computer.

You can:
1. Run shell commands
2. Work with files on the local file system
3. Process spreadsheets and documents
4. Read data from web pages
5. Control the mouse and keyboard when nothing else works
6. Call any of the skills listed as tools

Talk to the user in natural language and pick the most suitable tool for each task.
Operations that destroy data, such as deleting files, need the user's confirmation first.";

const EXPERIENCE_HEADER: &str =
    "Lessons from earlier sessions. Use them to do the task better:";

/// Read the experience notes. Missing, empty or unreadable files all yield
/// `None`; only the reason is logged.
pub fn load_experience(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let trimmed = content.trim();
            if trimmed.is_empty() {
                tracing::debug!(path = %path.display(), "experience file is empty");
                None
            } else {
                tracing::info!(
                    path = %path.display(),
                    bytes = trimmed.len(),
                    "loaded experience notes"
                );
                Some(trimmed.to_string())
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no experience file");
            None
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to read experience file");
            None
        }
    }
}

/// Overwrite the experience notes.
pub fn save_experience(path: &Path, content: &str) -> Result<(), AgentError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| AgentError::io(parent, e))?;
    }
    std::fs::write(path, content).map_err(|e| AgentError::io(path, e))?;
    tracing::info!(path = %path.display(), bytes = content.len(), "saved experience notes");
    Ok(())
}

/// Base prompt plus experience notes, if any.
pub fn build_system_prompt(base: &str, experience: Option<&str>) -> String {
    match experience.map(str::trim).filter(|e| !e.is_empty()) {
        Some(notes) => format!("{base}\n\n{EXPERIENCE_HEADER}\n{notes}"),
        None => base.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_without_experience_is_base() {
        assert_eq!(build_system_prompt("base", None), "base");
        assert_eq!(build_system_prompt("base", Some("  \n")), "base");
    }

    #[test]
    fn test_prompt_appends_experience() {
        let prompt =
            build_system_prompt(DEFAULT_SYSTEM_PROMPT, Some("Use -LiteralPath for odd names."));
        assert!(prompt.starts_with(DEFAULT_SYSTEM_PROMPT));
        assert!(prompt.ends_with("Use -LiteralPath for odd names."));
        assert!(prompt.contains(EXPERIENCE_HEADER));
    }

    #[test]
    fn test_save_then_load_experience() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("notes").join("experience.txt");
        assert!(load_experience(&path).is_none());

        save_experience(&path, "  Prefer Get-ChildItem over dir.\n").unwrap();
        assert_eq!(
            load_experience(&path).as_deref(),
            Some("Prefer Get-ChildItem over dir.")
        );

        save_experience(&path, "\n").unwrap();
        assert!(load_experience(&path).is_none());
    }
}
