//! Shared types for the LLM provider boundary.
//!
//! These describe what the engine hands to an [`LlmProvider`] and what it
//! expects back. Vendor wire encoding is the provider's concern; the shapes
//! here follow the content-block convention (tool use on the assistant side,
//! tool results on the user side).
//!
//! [`LlmProvider`]: super::provider::LlmProvider

use serde::{Deserialize, Serialize};

// ─── Roles & Content ─────────────────────────────────────────────────────────

/// Message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// Lowercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single structured content block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text.
    Text { text: String },
    /// The model asked for a tool to be invoked.
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    /// The outcome of a tool invocation, correlated by `tool_use_id`.
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

/// Message content: either a plain string or a list of blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl MessageContent {
    /// The text if this is plain text content.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessageContent::Text(s) => Some(s),
            MessageContent::Blocks(_) => None,
        }
    }

    /// The blocks if this is structured content.
    pub fn blocks(&self) -> &[ContentBlock] {
        match self {
            MessageContent::Text(_) => &[],
            MessageContent::Blocks(blocks) => blocks,
        }
    }

    /// Render the content as a single human-readable string.
    pub fn to_plain_text(&self) -> String {
        match self {
            MessageContent::Text(s) => s.clone(),
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .map(|block| match block {
                    ContentBlock::Text { text } => text.clone(),
                    ContentBlock::ToolUse { name, input, .. } => {
                        format!("[tool_use {name}] {input}")
                    }
                    ContentBlock::ToolResult { content, is_error, .. } => {
                        if *is_error {
                            format!("[tool_result error] {content}")
                        } else {
                            format!("[tool_result] {content}")
                        }
                    }
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

impl From<String> for MessageContent {
    fn from(s: String) -> Self {
        MessageContent::Text(s)
    }
}

impl From<&str> for MessageContent {
    fn from(s: &str) -> Self {
        MessageContent::Text(s.to_string())
    }
}

impl From<Vec<ContentBlock>> for MessageContent {
    fn from(blocks: Vec<ContentBlock>) -> Self {
        MessageContent::Blocks(blocks)
    }
}

// ─── Request Types ───────────────────────────────────────────────────────────

/// A message as presented to the provider: role and content, nothing else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.into()),
        }
    }
}

/// Tool description sent alongside the history for one enabled skill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameter_schema: serde_json::Value,
}

// ─── Response Types ──────────────────────────────────────────────────────────

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Opaque correlation token echoed back in the tool result.
    pub id: String,
    /// Skill name.
    pub name: String,
    /// Structured arguments.
    pub input: serde_json::Value,
}

impl ToolCall {
    /// Build a call with a generated id (for providers that don't supply one).
    pub fn new(name: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            id: format!("call_{}", uuid::Uuid::new_v4().simple()),
            name: name.into(),
            input,
        }
    }
}

/// What a provider returns for one chat call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LlmResponse {
    /// Final text answer.
    Text { text: String },
    /// One or more tool invocations to run before asking again.
    ToolUse { tool_calls: Vec<ToolCall> },
}

impl LlmResponse {
    pub fn text(text: impl Into<String>) -> Self {
        LlmResponse::Text { text: text.into() }
    }

    pub fn tool_use(tool_calls: Vec<ToolCall>) -> Self {
        LlmResponse::ToolUse { tool_calls }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
        assert_eq!(Role::User.as_str(), "user");
    }

    #[test]
    fn test_text_content_serializes_as_plain_string() {
        let msg = ChatMessage::user("hello");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["content"], "hello");
        assert_eq!(json["role"], "user");
    }

    #[test]
    fn test_block_content_is_tagged() {
        let content = MessageContent::Blocks(vec![ContentBlock::ToolResult {
            tool_use_id: "call_1".into(),
            content: "{\"success\":true}".into(),
            is_error: false,
        }]);
        let json = serde_json::to_string(&content).unwrap();
        assert!(json.contains(r#""type":"tool_result""#));
        assert!(json.contains(r#""tool_use_id":"call_1""#));
    }

    #[test]
    fn test_plain_text_rendering_of_blocks() {
        let content = MessageContent::Blocks(vec![ContentBlock::ToolUse {
            id: "call_1".into(),
            name: "read_file".into(),
            input: serde_json::json!({"file_path": "a.txt"}),
        }]);
        let text = content.to_plain_text();
        assert!(text.starts_with("[tool_use read_file]"));
        assert!(text.contains("a.txt"));
        assert!(content.as_text().is_none());
        assert_eq!(content.blocks().len(), 1);
    }

    #[test]
    fn test_tool_call_new_generates_unique_ids() {
        let a = ToolCall::new("x", serde_json::json!({}));
        let b = ToolCall::new("x", serde_json::json!({}));
        assert!(a.id.starts_with("call_"));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_llm_response_tagging() {
        let resp: LlmResponse =
            serde_json::from_str(r#"{"type":"text","text":"done"}"#).unwrap();
        assert_eq!(resp, LlmResponse::text("done"));
    }
}
