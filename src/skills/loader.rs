//! Skill discovery: scan a skills directory tree for manifest files.
//!
//! Every `*.json`, `*.yaml` and `*.yml` file below the root is a candidate
//! manifest. Directories starting with `_` or `.` are skipped. A file that
//! can't be read or parsed is logged and skipped; discovery never fails as a
//! whole.

use std::path::{Path, PathBuf};

use serde_json::Value;

use super::errors::SkillError;

/// Manifest file extensions, in the order they are tried.
const MANIFEST_EXTENSIONS: [&str; 3] = ["json", "yaml", "yml"];

/// A parsed-but-unvalidated manifest document.
#[derive(Debug, Clone)]
pub struct SkillDocument {
    /// Where it came from (for logs).
    pub source: String,
    /// Name to use when the manifest has no `name` (the file stem).
    pub fallback_name: String,
    /// The document body.
    pub body: Value,
}

impl SkillDocument {
    /// Build a document from an in-memory value.
    pub fn from_value(fallback_name: impl Into<String>, body: Value) -> Self {
        let fallback_name = fallback_name.into();
        Self {
            source: format!("<inline:{fallback_name}>"),
            fallback_name,
            body,
        }
    }
}

// ─── Discovery ──────────────────────────────────────────────────────────────

/// Recursively collect manifest documents under `skills_dir`.
///
/// Returns an empty list if the directory doesn't exist. Order is
/// deterministic (sorted by path) so duplicate names resolve the same way on
/// every load.
pub fn discover_skills(skills_dir: &Path) -> Vec<SkillDocument> {
    if !skills_dir.is_dir() {
        tracing::warn!(
            path = %skills_dir.display(),
            "skills directory not found, no skills loaded"
        );
        return Vec::new();
    }

    let mut files = Vec::new();
    collect_manifest_paths(skills_dir, &mut files);
    files.sort();

    let mut documents = Vec::with_capacity(files.len());
    for path in files {
        match read_document(&path) {
            Ok(doc) => documents.push(doc),
            Err(e) => {
                tracing::warn!(error = %e, "skipping skill file");
            }
        }
    }

    tracing::info!(
        path = %skills_dir.display(),
        count = documents.len(),
        "discovered skill manifests"
    );
    documents
}

/// Walk `dir`, pushing every manifest file path into `out`.
fn collect_manifest_paths(dir: &Path, out: &mut Vec<PathBuf>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(path = %dir.display(), error = %e, "failed to read skills directory");
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let file_name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name.to_string(),
            None => continue,
        };

        // `DirEntry::file_type` does not follow symlinks.
        let file_type = match entry.file_type() {
            Ok(file_type) => file_type,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to stat skill entry");
                continue;
            }
        };

        if file_type.is_symlink() && path.is_dir() {
            tracing::debug!(path = %path.display(), "skipping symlinked skills directory");
            continue;
        }

        if file_type.is_dir() {
            if file_name.starts_with('_') || file_name.starts_with('.') {
                continue;
            }
            collect_manifest_paths(&path, out);
        } else if is_manifest_file(&path) && path.is_file() {
            out.push(path);
        }
    }
}

fn is_manifest_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| MANIFEST_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Read and parse one manifest file into a JSON value.
pub fn read_document(path: &Path) -> Result<SkillDocument, SkillError> {
    let load_err = |reason: String| SkillError::LoadFailed {
        path: path.display().to_string(),
        reason,
    };

    let raw = std::fs::read_to_string(path).map_err(|e| load_err(e.to_string()))?;

    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let body: Value = if is_json {
        serde_json::from_str(&raw).map_err(|e| load_err(e.to_string()))?
    } else {
        serde_yaml::from_str(&raw).map_err(|e| load_err(e.to_string()))?
    };

    if !body.is_object() {
        return Err(load_err("manifest must be a mapping".into()));
    }

    let fallback_name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();

    Ok(SkillDocument {
        source: path.display().to_string(),
        fallback_name,
        body,
    })
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_discover_recurses_and_mixes_formats() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "file_operations/read_file.yaml", "name: read_file\ndescription: Read\n");
        write(
            tmp.path(),
            "powershell_executor/nested/execute.json",
            r#"{"name": "execute_powershell", "description": "Run"}"#,
        );
        write(tmp.path(), "notes/readme.md", "# not a manifest");

        let docs = discover_skills(tmp.path());
        assert_eq!(docs.len(), 2);
        let names: Vec<&str> = docs
            .iter()
            .map(|d| d.body["name"].as_str().unwrap())
            .collect();
        assert!(names.contains(&"read_file"));
        assert!(names.contains(&"execute_powershell"));
    }

    #[test]
    fn test_discover_skips_hidden_and_underscore_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "_disabled/a.yaml", "name: a\n");
        write(tmp.path(), ".cache/b.yaml", "name: b\n");
        write(tmp.path(), "ok/c.yml", "name: c\n");

        let docs = discover_skills(tmp.path());
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].fallback_name, "c");
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_directory_is_not_followed() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "tools/list_dir.yaml", "name: list_dir\n");
        std::os::unix::fs::symlink(tmp.path(), tmp.path().join("tools").join("loop")).unwrap();

        let docs = discover_skills(tmp.path());
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].fallback_name, "list_dir");
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_manifest_file_is_loaded() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "shared/echo.json", r#"{"name": "echo"}"#);
        let skills = tmp.path().join("skills");
        std::fs::create_dir_all(&skills).unwrap();
        std::os::unix::fs::symlink(tmp.path().join("shared/echo.json"), skills.join("echo.json"))
            .unwrap();

        let docs = discover_skills(&skills);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].body["name"], "echo");
    }

    #[test]
    fn test_unparseable_file_is_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "broken.json", "{ not json");
        write(tmp.path(), "list.yaml", "- just\n- a list\n");
        write(tmp.path(), "good.yaml", "description: fine\n");

        let docs = discover_skills(tmp.path());
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].fallback_name, "good");
    }

    #[test]
    fn test_missing_directory_returns_empty() {
        let docs = discover_skills(Path::new("/definitely/not/here"));
        assert!(docs.is_empty());
    }

    #[test]
    fn test_read_document_reports_path() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "bad.yaml", "key: [unclosed");
        let err = read_document(&tmp.path().join("bad.yaml")).unwrap_err();
        assert!(err.to_string().contains("bad.yaml"));
    }
}
