//! Shared types for the agent core.
//!
//! Stored conversation messages, per-turn execution records and the turn
//! state machine's states and outcome.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::progress::TurnProgress;
use crate::inference::types::{ChatMessage, MessageContent, Role};
use crate::skills::types::SkillResult;

// ─── Conversation Messages ──────────────────────────────────────────────────

/// A single message stored in conversation history. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
    /// When the message was appended.
    pub timestamp: DateTime<Utc>,
    /// Caller-supplied annotations; never sent to the LLM.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Message {
    pub fn new(
        role: Role,
        content: impl Into<MessageContent>,
        metadata: Map<String, Value>,
    ) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            metadata,
        }
    }

    /// The role/content pair presented to the LLM.
    pub fn to_chat_message(&self) -> ChatMessage {
        ChatMessage {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

// ─── Execution Records ──────────────────────────────────────────────────────

/// How one tool call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Ran and reported `success: true`.
    Completed,
    /// Ran (or failed to dispatch) and reported `success: false`.
    Failed,
    /// Never ran: the confirmation was denied or timed out.
    Cancelled,
}

impl StepStatus {
    /// Status for an executed result.
    pub fn from_result(result: &SkillResult) -> Self {
        if result.success {
            StepStatus::Completed
        } else {
            StepStatus::Failed
        }
    }
}

/// A tool call the model asked for, as shown in the plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedCall {
    pub tool_name: String,
    pub tool_args: Value,
}

/// Append-only record of one tool call within a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStep {
    pub tool_name: String,
    pub tool_args: Value,
    pub result: SkillResult,
    pub status: StepStatus,
}

// ─── Turn State ─────────────────────────────────────────────────────────────

/// States of the per-turn state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TurnState {
    Analyzing,
    Executing,
    Complete,
    Error,
    IterationLimit,
}

impl TurnState {
    /// Whether the turn has ended.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TurnState::Complete | TurnState::Error | TurnState::IterationLimit
        )
    }
}

/// What `chat` returns: the terminal state, the text shown to the user, and
/// the accumulated trace of the turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnOutcome {
    pub state: TurnState,
    pub response: String,
    pub progress: TurnProgress,
}

impl TurnOutcome {
    pub fn is_complete(&self) -> bool {
        self.state == TurnState::Complete
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
