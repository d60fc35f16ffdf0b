//! The LLM provider seam.

use std::sync::Arc;

use async_trait::async_trait;

use super::errors::ProviderError;
use super::types::{ChatMessage, LlmResponse, ToolSchema};

/// Sends the conversation plus tool schemas to a model and returns either a
/// final text answer or a set of tool calls.
///
/// `tools` is `None` when no skill is enabled.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[ToolSchema]>,
    ) -> Result<LlmResponse, ProviderError>;

    /// Short name for logs.
    fn name(&self) -> &str {
        "llm"
    }
}

#[async_trait]
impl<P: LlmProvider + ?Sized> LlmProvider for Arc<P> {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[ToolSchema]>,
    ) -> Result<LlmResponse, ProviderError> {
        (**self).chat(messages, tools).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
