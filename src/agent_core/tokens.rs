//! Size helpers for what goes into the context.
//!
//! - UTF-8 safe truncation of tool results before they are fed back to the
//!   model (one huge directory listing shouldn't crowd out the conversation)
//! - Rough token estimates for logging how large the history is getting

use crate::inference::types::{ChatMessage, ContentBlock, MessageContent};

// ─── Constants ──────────────────────────────────────────────────────────────

/// Average characters per token for English prose.
///
/// Conservative: most tokenizers land at 3.5-4.0 for English.
const CHARS_PER_TOKEN: f64 = 3.2;

/// Average characters per token for JSON content (tool inputs and results).
const JSON_CHARS_PER_TOKEN: f64 = 2.8;

/// Per-message overhead (role label, formatting tokens).
const MESSAGE_OVERHEAD_TOKENS: u32 = 4;

/// Overhead for a tool-use or tool-result block.
const TOOL_BLOCK_OVERHEAD_TOKENS: u32 = 10;

// ─── UTF-8 Safe Truncation ──────────────────────────────────────────────────

/// Truncate a string to at most `max_bytes` bytes on a char boundary.
pub(crate) fn truncate_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Cap a serialized tool result at `max_chars` bytes.
///
/// Over-long results keep their head and gain a marker naming the original
/// length. `max_chars == 0` disables the cap.
pub fn truncate_tool_result(result: &str, tool_name: &str, max_chars: usize) -> String {
    if max_chars == 0 || result.len() <= max_chars {
        return result.to_string();
    }

    let truncated = truncate_utf8(result, max_chars);
    tracing::warn!(
        tool = %tool_name,
        original_len = result.len(),
        truncated_to = truncated.len(),
        "tool result truncated"
    );
    format!(
        "{truncated}\n\n[... truncated: showing first {} of {} chars]",
        truncated.len(),
        result.len()
    )
}

// ─── Estimates ──────────────────────────────────────────────────────────────

/// Estimate the token count for natural language text.
pub fn estimate_tokens(text: &str) -> u32 {
    (text.len() as f64 / CHARS_PER_TOKEN).ceil() as u32
}

/// Estimate the token count for JSON text.
pub fn estimate_json_tokens(json_text: &str) -> u32 {
    (json_text.len() as f64 / JSON_CHARS_PER_TOKEN).ceil() as u32
}

/// Estimate the token count for one message.
pub fn estimate_message_tokens(message: &ChatMessage) -> u32 {
    let content = match &message.content {
        MessageContent::Text(text) => estimate_tokens(text),
        MessageContent::Blocks(blocks) => blocks
            .iter()
            .map(|block| match block {
                ContentBlock::Text { text } => estimate_tokens(text),
                ContentBlock::ToolUse { name, input, .. } => {
                    TOOL_BLOCK_OVERHEAD_TOKENS
                        + estimate_tokens(name)
                        + estimate_json_tokens(&input.to_string())
                }
                ContentBlock::ToolResult { content, .. } => {
                    TOOL_BLOCK_OVERHEAD_TOKENS + estimate_json_tokens(content)
                }
            })
            .sum(),
    };
    MESSAGE_OVERHEAD_TOKENS + content
}

/// Estimate the token count for a whole history.
pub fn estimate_history_tokens<'a>(messages: impl IntoIterator<Item = &'a ChatMessage>) -> u32 {
    messages.into_iter().map(estimate_message_tokens).sum()
}

// ─── Tests ──────────────────────────────────────────────────────────────────
