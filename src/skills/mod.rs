//! Skills: the catalog of side-effecting operations the agent can invoke.
//!
//! - `loader`: discovers JSON/YAML manifests under a skills directory
//! - `handler`: the `SkillHandler` trait and the name → handler table
//! - `registry`: load, list, execute, reload
//! - `types`: manifests, definitions and the structured `SkillResult`

pub mod errors;
pub mod handler;
pub mod loader;
pub mod registry;
pub mod types;

pub use errors::SkillError;
pub use handler::{blocking_fn, handler_fn, HandlerTable, SkillHandler};
pub use loader::{discover_skills, SkillDocument};
pub use registry::SkillRegistry;
pub use types::{ParameterSchema, SkillDefinition, SkillManifest, SkillResult};
