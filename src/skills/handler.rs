//! Skill handlers and the explicit registration table.
//!
//! Manifests refer to handlers by string (`handler: file_operations.read_file`).
//! The application builds a [`HandlerTable`] at startup mapping those strings
//! to implementations; the registry binds manifests against it on every load.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

/// A side-effecting operation the agent can invoke.
///
/// Receives keyword-style arguments already checked against the parameter
/// schema (required present, defaults filled). Returns a structured result
/// that should carry a boolean `success`; an `Err` becomes a failed result.
#[async_trait]
pub trait SkillHandler: Send + Sync {
    async fn call(&self, args: Map<String, Value>) -> anyhow::Result<Value>;
}

// ─── Function adapters ───────────────────────────────────────────────────────

/// Runs a synchronous function inline on the engine's task.
///
/// Use for quick operations; anything that blocks for long should go through
/// [`blocking_fn`].
pub struct FnHandler<F> {
    func: F,
}

#[async_trait]
impl<F> SkillHandler for FnHandler<F>
where
    F: Fn(Map<String, Value>) -> anyhow::Result<Value> + Send + Sync,
{
    async fn call(&self, args: Map<String, Value>) -> anyhow::Result<Value> {
        (self.func)(args)
    }
}

/// Runs a synchronous function on tokio's blocking pool.
pub struct BlockingFnHandler<F> {
    func: Arc<F>,
}

#[async_trait]
impl<F> SkillHandler for BlockingFnHandler<F>
where
    F: Fn(Map<String, Value>) -> anyhow::Result<Value> + Send + Sync + 'static,
{
    async fn call(&self, args: Map<String, Value>) -> anyhow::Result<Value> {
        let func = Arc::clone(&self.func);
        match tokio::task::spawn_blocking(move || func(args)).await {
            Ok(result) => result,
            Err(e) if e.is_panic() => {
                let message = super::registry::panic_message(e.into_panic().as_ref());
                Err(anyhow::anyhow!("handler panicked: {message}"))
            }
            Err(e) => Err(anyhow::anyhow!("handler task failed: {e}")),
        }
    }
}

/// Wrap a synchronous function as an inline handler.
pub fn handler_fn<F>(func: F) -> Arc<dyn SkillHandler>
where
    F: Fn(Map<String, Value>) -> anyhow::Result<Value> + Send + Sync + 'static,
{
    Arc::new(FnHandler { func })
}

/// Wrap a synchronous function as a handler that runs on the blocking pool.
pub fn blocking_fn<F>(func: F) -> Arc<dyn SkillHandler>
where
    F: Fn(Map<String, Value>) -> anyhow::Result<Value> + Send + Sync + 'static,
{
    Arc::new(BlockingFnHandler {
        func: Arc::new(func),
    })
}

// ─── HandlerTable ────────────────────────────────────────────────────────────

/// Handler reference → implementation.
#[derive(Clone, Default)]
pub struct HandlerTable {
    handlers: HashMap<String, Arc<dyn SkillHandler>>,
}

impl fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = self.names();
        names.sort_unstable();
        f.debug_struct("HandlerTable").field("handlers", &names).finish()
    }
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a handler under `reference`.
    pub fn register(
        &mut self,
        reference: impl Into<String>,
        handler: Arc<dyn SkillHandler>,
    ) -> &mut Self {
        let reference = reference.into();
        if self.handlers.insert(reference.clone(), handler).is_some() {
            tracing::debug!(handler = %reference, "replaced skill handler");
        }
        self
    }

    /// Register a synchronous function inline.
    pub fn register_fn<F>(&mut self, reference: impl Into<String>, func: F) -> &mut Self
    where
        F: Fn(Map<String, Value>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.register(reference, handler_fn(func))
    }

    pub fn get(&self, reference: &str) -> Option<Arc<dyn SkillHandler>> {
        self.handlers.get(reference).cloned()
    }

    pub fn contains(&self, reference: &str) -> bool {
        self.handlers.contains_key(reference)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.handlers.keys().map(|k| k.as_str()).collect()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_fn_handler_passes_arguments() {
        let handler = handler_fn(|args| {
            let path = args.get("path").and_then(|v| v.as_str()).unwrap_or_default();
            Ok(json!({"success": true, "path": path}))
        });
        let mut args = Map::new();
        args.insert("path".into(), json!("/tmp/a.txt"));
        let out = handler.call(args).await.unwrap();
        assert_eq!(out["path"], "/tmp/a.txt");
    }

    #[tokio::test]
    async fn test_blocking_handler_converts_panic_to_error() {
        let handler = blocking_fn(|_args| -> anyhow::Result<Value> { panic!("boom") });
        let err = handler.call(Map::new()).await.unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_table_register_and_lookup() {
        let mut table = HandlerTable::new();
        table
            .register_fn("file_operations.read_file", |_| Ok(json!({"success": true})))
            .register_fn("file_operations.write_file", |_| Ok(json!({"success": true})));
        assert_eq!(table.len(), 2);
        assert!(table.contains("file_operations.read_file"));
        assert!(table.get("missing").is_none());
    }
}
