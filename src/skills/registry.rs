//! Skill registry: the named catalog of operations the agent may invoke.
//!
//! Provides:
//! - Loading definitions (from documents or a directory tree) and binding
//!   them to handlers from a [`HandlerTable`]
//! - The list of enabled skills as tool schemas for the LLM
//! - Execution by name, with argument checks and failure containment
//! - Atomic reload: a fresh catalog is built, then swapped in
//!
//! `execute` never fails: every error (unknown skill, disabled, unbound,
//! bad arguments, handler error, handler panic) comes back as a
//! `SkillResult { success: false, error }`.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use futures::FutureExt;
use serde_json::{Map, Value};

use super::errors::SkillError;
use super::handler::HandlerTable;
use super::loader::{self, SkillDocument};
use super::types::{SkillDefinition, SkillManifest, SkillResult};
use crate::inference::types::ToolSchema;

type Catalog = HashMap<String, Arc<SkillDefinition>>;

// ─── SkillRegistry ───────────────────────────────────────────────────────────

/// Catalog of skills, keyed by unique name.
///
/// Readers take a snapshot (`Arc` of the map), so an in-flight `execute`
/// keeps using the catalog it started with even if `reload` swaps it.
#[derive(Debug)]
pub struct SkillRegistry {
    /// Directory loaded by `load_dir`; `reload` re-reads it.
    source: RwLock<Option<PathBuf>>,
    handlers: HandlerTable,
    skills: RwLock<Arc<Catalog>>,
}

impl SkillRegistry {
    /// Create an empty registry that binds against `handlers`.
    pub fn new(handlers: HandlerTable) -> Self {
        Self {
            source: RwLock::new(None),
            handlers,
            skills: RwLock::new(Arc::new(HashMap::new())),
        }
    }

    /// Create a registry and load every manifest under `dir`.
    pub fn from_dir(dir: impl Into<PathBuf>, handlers: HandlerTable) -> Self {
        let registry = Self::new(handlers);
        registry.load_dir(dir);
        registry
    }

    /// Replace the catalog with `documents`.
    ///
    /// Invalid documents are skipped with a warning. Returns the number of
    /// skills now registered.
    pub fn load(&self, documents: Vec<SkillDocument>) -> usize {
        let catalog = self.build_catalog(documents);
        let count = catalog.len();
        self.swap(catalog);
        count
    }

    /// Remember `dir` as the skill source and load it.
    pub fn load_dir(&self, dir: impl Into<PathBuf>) -> usize {
        let dir = dir.into();
        let documents = loader::discover_skills(&dir);
        match self.source.write() {
            Ok(mut guard) => *guard = Some(dir),
            Err(poisoned) => *poisoned.into_inner() = Some(dir),
        }
        self.load(documents)
    }

    /// Rebuild the catalog from the remembered directory.
    ///
    /// With no directory (documents were loaded directly), re-binds the
    /// current definitions against the handler table.
    pub fn reload(&self) -> usize {
        let source = match self.source.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };

        let count = match source {
            Some(dir) => self.load(loader::discover_skills(&dir)),
            None => {
                let rebound: Catalog = self
                    .snapshot()
                    .values()
                    .map(|def| {
                        let mut def = (**def).clone();
                        def.handler = self.handlers.get(def.handler_key());
                        (def.name.clone(), Arc::new(def))
                    })
                    .collect();
                let count = rebound.len();
                self.swap(rebound);
                count
            }
        };

        tracing::info!(count, "skills reloaded");
        count
    }

    /// The directory skills were loaded from, if any.
    pub fn source_dir(&self) -> Option<PathBuf> {
        match self.source.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Look up a definition by name (enabled or not).
    pub fn get(&self, name: &str) -> Option<Arc<SkillDefinition>> {
        self.snapshot().get(name).cloned()
    }

    /// Tool schemas for every enabled skill, sorted by name.
    pub fn list(&self) -> Vec<ToolSchema> {
        let catalog = self.snapshot();
        let mut schemas: Vec<ToolSchema> = catalog
            .values()
            .filter(|def| def.enabled)
            .map(|def| ToolSchema {
                name: def.name.clone(),
                description: def.description.clone(),
                parameter_schema: def.parameters.as_value().clone(),
            })
            .collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    /// All registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.snapshot().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered skills (enabled or not).
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Run a skill, folding every failure into the result.
    pub async fn execute(&self, name: &str, args: &Value) -> SkillResult {
        match self.try_execute(name, args).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(skill = %name, error = %e, "skill execution failed");
                SkillResult::failure(e.to_string())
            }
        }
    }

    /// Run a skill, surfacing registry-level failures as `SkillError`.
    ///
    /// A handler that returns `Err` is still an `Ok(SkillResult)` with
    /// `success: false`; only lookup, argument and panic failures are `Err`.
    pub async fn try_execute(&self, name: &str, args: &Value) -> Result<SkillResult, SkillError> {
        let def = self.get(name).ok_or_else(|| SkillError::NotFound {
            name: name.to_string(),
        })?;

        if !def.enabled {
            return Err(SkillError::Disabled {
                name: name.to_string(),
            });
        }

        let handler = def
            .handler
            .clone()
            .ok_or_else(|| SkillError::NoImplementation {
                name: name.to_string(),
            })?;

        let prepared = prepare_arguments(&def, args)?;

        tracing::debug!(skill = %name, "executing skill");
        let outcome = AssertUnwindSafe(handler.call(prepared)).catch_unwind().await;

        match outcome {
            Ok(Ok(value)) => Ok(SkillResult::from_value(value)),
            Ok(Err(e)) => Ok(SkillResult::failure(format!("{e:#}"))),
            Err(payload) => Err(SkillError::Panicked {
                name: name.to_string(),
                message: panic_message(payload.as_ref()),
            }),
        }
    }

    // ── internals ──

    fn snapshot(&self) -> Arc<Catalog> {
        match self.skills.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    fn swap(&self, catalog: Catalog) {
        let catalog = Arc::new(catalog);
        match self.skills.write() {
            Ok(mut guard) => *guard = catalog,
            Err(poisoned) => *poisoned.into_inner() = catalog,
        }
    }

    fn build_catalog(&self, documents: Vec<SkillDocument>) -> Catalog {
        let mut catalog = HashMap::with_capacity(documents.len());

        for doc in documents {
            let def = match self.bind(doc.body, &doc.fallback_name) {
                Ok(def) => def,
                Err(e) => {
                    tracing::warn!(source = %doc.source, error = %e, "skipping skill definition");
                    continue;
                }
            };

            if def.handler.is_none() {
                tracing::warn!(
                    skill = %def.name,
                    handler = %def.handler_key(),
                    "no handler registered for skill"
                );
            }

            if catalog.contains_key(&def.name) {
                tracing::warn!(
                    skill = %def.name,
                    source = %doc.source,
                    "duplicate skill name, replacing"
                );
            }
            catalog.insert(def.name.clone(), Arc::new(def));
        }

        tracing::info!(
            count = catalog.len(),
            enabled = catalog.values().filter(|d| d.enabled).count(),
            "skills loaded"
        );
        catalog
    }

    fn bind(&self, body: Value, fallback_name: &str) -> Result<SkillDefinition, SkillError> {
        let manifest: SkillManifest =
            serde_json::from_value(body).map_err(|e| SkillError::InvalidDefinition {
                source_name: fallback_name.to_string(),
                reason: e.to_string(),
            })?;
        let mut def = SkillDefinition::from_manifest(manifest, fallback_name, None)?;
        def.handler = self.handlers.get(def.handler_key());
        Ok(def)
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Check `args` against the skill's schema and fill declared defaults.
fn prepare_arguments(
    def: &SkillDefinition,
    args: &Value,
) -> Result<Map<String, Value>, SkillError> {
    let mut prepared = match args {
        Value::Object(obj) => obj.clone(),
        Value::Null => Map::new(),
        other => {
            return Err(SkillError::InvalidArguments {
                name: def.name.clone(),
                reason: format!("expected an object, got {other}"),
            })
        }
    };

    for field in def.parameters.required() {
        if prepared.get(field).map_or(true, Value::is_null) {
            return Err(SkillError::InvalidArguments {
                name: def.name.clone(),
                reason: format!("missing required field: '{field}'"),
            });
        }
    }

    if let Some(props) = def.parameters.properties() {
        for (field, prop) in props {
            if prepared.contains_key(field) {
                continue;
            }
            if let Some(default) = prop.get("default") {
                prepared.insert(field.clone(), default.clone());
            }
        }
    }

    Ok(prepared)
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn handlers() -> HandlerTable {
        let mut table = HandlerTable::new();
        table
            .register_fn("file_operations.read_file", |args| {
                Ok(json!({
                    "success": true,
                    "path": args.get("file_path").cloned().unwrap_or(Value::Null),
                    "encoding": args.get("encoding").cloned().unwrap_or(Value::Null),
                }))
            })
            .register_fn("broken", |_| Err(anyhow::anyhow!("disk on fire")))
            .register_fn("panicky", |_| -> anyhow::Result<Value> { panic!("kaboom") });
        table
    }

    fn docs() -> Vec<SkillDocument> {
        vec![
            SkillDocument::from_value(
                "read_file",
                json!({
                    "name": "read_file",
                    "description": "Read a text file",
                    "handler": "file_operations.read_file",
                    "parameters": {
                        "type": "object",
                        "properties": {
                            "file_path": {"type": "string"},
                            "encoding": {"type": "string", "default": "utf-8"}
                        },
                        "required": ["file_path"]
                    }
                }),
            ),
            SkillDocument::from_value(
                "off",
                json!({"name": "off", "handler": "file_operations.read_file", "enabled": false}),
            ),
            SkillDocument::from_value("unbound", json!({"name": "unbound", "handler": "nowhere"})),
            SkillDocument::from_value("broken", json!({"name": "broken", "handler": "broken"})),
            SkillDocument::from_value("panicky", json!({"name": "panicky", "handler": "panicky"})),
            SkillDocument::from_value("bad", json!({"name": "bad", "parameters": "nope"})),
        ]
    }

    fn registry() -> SkillRegistry {
        let registry = SkillRegistry::new(handlers());
        registry.load(docs());
        registry
    }

    #[test]
    fn test_invalid_definitions_are_skipped() {
        let registry = registry();
        assert_eq!(registry.len(), 5);
        assert!(registry.get("bad").is_none());
    }

    #[test]
    fn test_list_returns_only_enabled_sorted() {
        let names: Vec<String> = registry().list().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["broken", "panicky", "read_file", "unbound"]);
    }

    #[tokio::test]
    async fn test_execute_fills_defaults() {
        let result = registry()
            .execute("read_file", &json!({"file_path": "/tmp/a.txt"}))
            .await;
        assert!(result.success);
        assert_eq!(result.data["encoding"], "utf-8");
        assert_eq!(result.data["path"], "/tmp/a.txt");
    }

    #[tokio::test]
    async fn test_execute_unknown_skill() {
        let result = registry().execute("foo", &json!({})).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Skill not found: foo"));
    }

    #[tokio::test]
    async fn test_execute_disabled_skill() {
        let result = registry().execute("off", &json!({})).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("disabled"));
    }

    #[tokio::test]
    async fn test_execute_unbound_skill() {
        let err = registry().try_execute("unbound", &json!({})).await.unwrap_err();
        assert!(matches!(err, SkillError::NoImplementation { .. }));
    }

    #[tokio::test]
    async fn test_missing_required_argument() {
        let result = registry().execute("read_file", &json!({})).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("missing required field: 'file_path'"));
    }

    #[tokio::test]
    async fn test_non_object_arguments_rejected() {
        let err = registry()
            .try_execute("read_file", &json!(["a"]))
            .await
            .unwrap_err();
        assert!(matches!(err, SkillError::InvalidArguments { .. }));
    }

    #[tokio::test]
    async fn test_handler_error_becomes_failed_result() {
        let result = registry().execute("broken", &json!({})).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("disk on fire"));
    }

    #[tokio::test]
    async fn test_handler_panic_is_contained() {
        let result = registry().execute("panicky", &json!({})).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("kaboom"));
    }

    #[tokio::test]
    async fn test_reload_from_directory_swaps_catalog() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("read_file.yaml"),
            "description: Read\nhandler: file_operations.read_file\n",
        )
        .unwrap();

        let registry = SkillRegistry::from_dir(tmp.path(), handlers());
        assert_eq!(registry.names(), vec!["read_file"]);

        std::fs::write(
            tmp.path().join("second.json"),
            r#"{"name": "second", "handler": "broken"}"#,
        )
        .unwrap();
        std::fs::remove_file(tmp.path().join("read_file.yaml")).unwrap();

        assert_eq!(registry.reload(), 1);
        assert_eq!(registry.names(), vec!["second"]);
        assert_eq!(registry.source_dir().as_deref(), Some(tmp.path()));
    }

    #[tokio::test]
    async fn test_reload_without_directory_rebinds() {
        let registry = registry();
        assert_eq!(registry.reload(), 5);
        let result = registry
            .execute("read_file", &json!({"file_path": "x"}))
            .await;
        assert!(result.success);
    }

    #[tokio::test]
    async fn test_snapshot_survives_reload() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut table = HandlerTable::new();
        table.register_fn("count", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(json!({"success": true}))
        });

        let registry = SkillRegistry::new(table);
        registry.load(vec![SkillDocument::from_value("count", json!({"handler": "count"}))]);
        let held = registry.get("count").unwrap();
        registry.load(Vec::new());

        assert!(registry.get("count").is_none());
        assert_eq!(held.name, "count");
        let result = registry.execute("count", &json!({})).await;
        assert!(!result.success);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
