//! Inference boundary: the contract between the engine and an LLM.
//!
//! This module defines:
//! - The message/content shapes the engine sends
//! - The tool schema and tool call shapes exchanged with the model
//! - The `LlmProvider` trait implemented by the embedding application
//!
//! No vendor client lives here; swapping Claude for a local Ollama model is a
//! matter of handing the engine a different `LlmProvider`.

pub mod errors;
pub mod provider;
pub mod types;

// Re-exports for convenience
pub use errors::ProviderError;
pub use provider::LlmProvider;
pub use types::{ChatMessage, ContentBlock, LlmResponse, MessageContent, Role, ToolCall, ToolSchema};
