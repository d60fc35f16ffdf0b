//! Agent Core: the orchestration layer.
//!
//! Submodules:
//! - `engine`: the per-turn tool-use state machine
//! - `conversation`: bounded conversation history
//! - `safety`: danger classification of tool calls
//! - `confirmation`: worker → UI confirmation handshake with a fail-safe timeout
//! - `progress`: stage events and the per-turn trace
//! - `prompt`: system prompt and experience notes
//! - `tokens`: tool-result truncation and size estimates
//! - `types`: shared types across the agent core
//! - `errors`: setup-time error types

pub mod confirmation;
pub mod conversation;
pub mod engine;
pub mod errors;
pub mod progress;
pub mod prompt;
pub mod safety;
pub mod tokens;
pub mod types;

// Re-exports for convenience
pub use confirmation::{
    confirmation_channel, ConfirmationBridge, ConfirmationHandler, ConfirmationQueue,
    ConfirmationRequest, DenyAll, TerminalPrompt,
};
pub use conversation::ConversationContext;
pub use engine::{EngineBuilder, OrchestrationEngine};
pub use errors::AgentError;
pub use progress::{
    ChannelSink, NullSink, ProgressEmitter, ProgressEvent, ProgressSink, TurnProgress,
};
pub use safety::{
    DangerRule, DestructiveNameRule, PatternRule, SafetyClassifier, ShellCommandRule, Verdict,
};
pub use types::{ExecutionStep, Message, PlannedCall, StepStatus, TurnOutcome, TurnState};
