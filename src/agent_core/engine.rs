//! OrchestrationEngine: the per-turn tool-use state machine.
//!
//! One call to [`OrchestrationEngine::chat`] is one turn:
//!
//! ```text
//! ANALYZING ──text──────────────▶ COMPLETE
//!     │ ▲
//!     │ └──results fed back─┐
//!     ▼                     │
//!  tool_use ──▶ EXECUTING ──┘      (at most max_iterations rounds)
//!     │
//!     ├──over the cap────────────▶ ITERATION_LIMIT
//! provider error ────────────────▶ ERROR
//! ```
//!
//! Tool calls within a round run strictly one after another, in the order
//! the model listed them. Dangerous calls go through the confirmation bridge
//! first; a denial cancels only that call. Skill failures are fed back to the
//! model as data. Only a provider error or the iteration cap ends a turn
//! early, and both leave an explanation in the transcript.

use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use super::confirmation::{confirmation_channel, ConfirmationBridge, ConfirmationQueue};
use super::conversation::ConversationContext;
use super::errors::AgentError;
use super::progress::{NullSink, ProgressEmitter, ProgressEvent, ProgressSink};
use super::prompt;
use super::safety::SafetyClassifier;
use super::tokens;
use super::types::{ExecutionStep, Message, PlannedCall, StepStatus, TurnOutcome, TurnState};
use crate::config::AgentConfig;
use crate::inference::errors::ProviderError;
use crate::inference::provider::LlmProvider;
use crate::inference::types::{
    ChatMessage, ContentBlock, LlmResponse, MessageContent, Role, ToolCall, ToolSchema,
};
use crate::skills::handler::HandlerTable;
use crate::skills::registry::SkillRegistry;
use crate::skills::types::SkillResult;

// ─── Builder ────────────────────────────────────────────────────────────────

/// Assembles an engine. Anything not set gets a safe default: default
/// config, default danger rules, a bridge that denies every confirmation,
/// and a sink that drops progress events.
pub struct EngineBuilder {
    provider: Arc<dyn LlmProvider>,
    registry: Arc<SkillRegistry>,
    config: AgentConfig,
    classifier: Option<SafetyClassifier>,
    confirmation: Option<ConfirmationBridge>,
    sink: Option<Arc<dyn ProgressSink>>,
    system_prompt: Option<String>,
}

impl EngineBuilder {
    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn classifier(mut self, classifier: SafetyClassifier) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn confirmation(mut self, bridge: ConfirmationBridge) -> Self {
        self.confirmation = Some(bridge);
        self
    }

    pub fn progress_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Use this exact system prompt instead of building one from the config
    /// and the experience file.
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn build(self) -> OrchestrationEngine {
        let system_prompt = self.system_prompt.unwrap_or_else(|| {
            let experience = prompt::load_experience(&self.config.experience_file);
            prompt::build_system_prompt(&self.config.system_prompt, experience.as_deref())
        });

        let confirmation = self.confirmation.unwrap_or_else(|| {
            tracing::info!(
                "no confirmation consumer attached, dangerous operations will be denied"
            );
            ConfirmationBridge::deny_all()
        });

        OrchestrationEngine {
            provider: self.provider,
            registry: self.registry,
            context: Arc::new(Mutex::new(ConversationContext::new(self.config.max_history))),
            classifier: self.classifier.unwrap_or_default(),
            confirmation,
            sink: self.sink.unwrap_or_else(|| Arc::new(NullSink)),
            system_prompt: RwLock::new(system_prompt),
            turn_gate: tokio::sync::Mutex::new(()),
            config: self.config,
        }
    }
}

// ─── OrchestrationEngine ────────────────────────────────────────────────────

/// Drives turns against an LLM provider and the skill registry.
///
/// Shared state (`context`, `registry`) may be read from the UI thread while a
/// turn runs. Turns themselves are serialized: a second `chat` waits for the
/// first to finish.
pub struct OrchestrationEngine {
    provider: Arc<dyn LlmProvider>,
    registry: Arc<SkillRegistry>,
    context: Arc<Mutex<ConversationContext>>,
    classifier: SafetyClassifier,
    confirmation: ConfirmationBridge,
    sink: Arc<dyn ProgressSink>,
    system_prompt: RwLock<String>,
    turn_gate: tokio::sync::Mutex<()>,
    config: AgentConfig,
}

impl OrchestrationEngine {
    pub fn builder(provider: Arc<dyn LlmProvider>, registry: Arc<SkillRegistry>) -> EngineBuilder {
        EngineBuilder {
            provider,
            registry,
            config: AgentConfig::default(),
            classifier: None,
            confirmation: None,
            sink: None,
            system_prompt: None,
        }
    }

    /// Wire an engine from configuration: load skills from `skills_dir`,
    /// build the system prompt, and create the confirmation channel.
    ///
    /// The returned queue must be drained on the UI-affine thread (or handed
    /// to [`ConfirmationQueue::run_polling`]).
    pub fn from_config(
        config: AgentConfig,
        provider: Arc<dyn LlmProvider>,
        handlers: HandlerTable,
    ) -> Result<(Self, ConfirmationQueue), AgentError> {
        config.validate()?;
        let registry = Arc::new(SkillRegistry::from_dir(config.skills_dir.clone(), handlers));
        let (bridge, queue) = confirmation_channel(
            config.confirmation_queue_capacity,
            config.confirmation_timeout(),
        );
        let engine = Self::builder(provider, registry)
            .config(config)
            .confirmation(bridge)
            .build();
        Ok((engine, queue))
    }

    // ─── Turn ───────────────────────────────────────────────────────────

    /// Run one turn for `user_message`. Never fails: every outcome, including
    /// provider errors and the iteration cap, is a [`TurnOutcome`].
    pub async fn chat(&self, user_message: &str) -> TurnOutcome {
        let _turn = self.turn_gate.lock().await;
        let mut emitter = ProgressEmitter::new(Arc::clone(&self.sink));

        tracing::info!(
            provider = self.provider.name(),
            chars = user_message.len(),
            "turn started"
        );
        self.lock_context().add_message(Role::User, user_message, None);

        let tools = self.registry.list();

        emitter.emit(ProgressEvent::Analyzing {
            message: "Analyzing the request...".into(),
        });
        let mut response = match self.call_provider(&tools).await {
            Ok(response) => response,
            Err(e) => return self.fail(emitter, e),
        };
        emitter.emit(ProgressEvent::AnalysisComplete {
            analysis: describe_analysis(&response),
        });

        let mut iteration = 0;
        loop {
            let calls = match response {
                LlmResponse::Text { text } => return self.complete(emitter, text),
                LlmResponse::ToolUse { tool_calls } if tool_calls.is_empty() => {
                    tracing::warn!("tool-use response without calls, treating as empty answer");
                    return self.complete(emitter, String::new());
                }
                LlmResponse::ToolUse { tool_calls } => tool_calls,
            };

            if iteration >= self.config.max_iterations {
                return self.iteration_limit(emitter, calls.len());
            }
            iteration += 1;

            tracing::info!(iteration, calls = calls.len(), "executing tool round");
            emitter.emit(ProgressEvent::Planning {
                plan: calls
                    .iter()
                    .map(|call| PlannedCall {
                        tool_name: call.name.clone(),
                        tool_args: call.input.clone(),
                    })
                    .collect(),
            });

            for call in &calls {
                self.run_tool_call(call, &mut emitter).await;
            }

            emitter.emit(ProgressEvent::ProcessingResults {
                message: "Processing results...".into(),
                iteration,
            });
            response = match self.call_provider(&tools).await {
                Ok(response) => response,
                Err(e) => return self.fail(emitter, e),
            };
        }
    }

    /// Execute one tool call: classify, confirm if needed, dispatch, record.
    async fn run_tool_call(&self, call: &ToolCall, emitter: &mut ProgressEmitter) {
        emitter.emit(ProgressEvent::Executing {
            tool_name: call.name.clone(),
            tool_args: call.input.clone(),
        });
        self.lock_context().add_message(
            Role::Assistant,
            vec![ContentBlock::ToolUse {
                id: call.id.clone(),
                name: call.name.clone(),
                input: call.input.clone(),
            }],
            None,
        );

        let verdict = self.classifier.classify(&call.name, &call.input);
        let approved = if verdict.dangerous {
            tracing::info!(
                tool = %call.name,
                description = %verdict.description,
                "dangerous operation, requesting confirmation"
            );
            self.confirmation
                .request(&call.name, &verdict.description)
                .await
        } else {
            true
        };

        let (result, status) = if approved {
            let result = self.registry.execute(&call.name, &call.input).await;
            let status = StepStatus::from_result(&result);
            (result, status)
        } else {
            tracing::info!(tool = %call.name, "operation cancelled, not confirmed");
            let reason = format!(
                "Operation cancelled: the user did not confirm ({})",
                verdict.description
            );
            (SkillResult::cancelled(reason), StepStatus::Cancelled)
        };

        tracing::info!(tool = %call.name, status = ?status, "tool call finished");

        let rendered = serde_json::to_string(&result.to_value()).unwrap_or_else(|e| {
            format!("{{\"success\":false,\"error\":\"unserializable result: {e}\"}}")
        });
        let content = tokens::truncate_tool_result(
            &rendered,
            &call.name,
            self.config.max_tool_result_chars,
        );
        let is_error = !result.success;

        emitter.emit(ProgressEvent::StepComplete {
            step: ExecutionStep {
                tool_name: call.name.clone(),
                tool_args: call.input.clone(),
                result,
                status,
            },
        });

        self.lock_context().add_message(
            Role::User,
            vec![ContentBlock::ToolResult {
                tool_use_id: call.id.clone(),
                content,
                is_error,
            }],
            None,
        );
    }

    async fn call_provider(&self, tools: &[ToolSchema]) -> Result<LlmResponse, ProviderError> {
        let messages = self.build_messages();
        tracing::debug!(
            messages = messages.len(),
            est_tokens = tokens::estimate_history_tokens(&messages),
            tools = tools.len(),
            "calling provider"
        );
        let tools = if tools.is_empty() { None } else { Some(tools) };
        self.provider.chat(&messages, tools).await
    }

    /// System prompt followed by the context window.
    ///
    /// Tool results at the very front of the window lost their tool-use
    /// message to eviction; they are skipped so every result the model sees
    /// has its call.
    fn build_messages(&self) -> Vec<ChatMessage> {
        let system = ChatMessage::system(self.system_prompt());
        let ctx = self.lock_context();
        let messages = std::iter::once(system)
            .chain(ctx.get_messages().skip_while(is_tool_result))
            .collect();
        messages
    }

    // ─── Terminal states ────────────────────────────────────────────────

    fn complete(&self, mut emitter: ProgressEmitter, text: String) -> TurnOutcome {
        self.lock_context()
            .add_message(Role::Assistant, text.as_str(), None);
        emitter.emit(ProgressEvent::Complete {
            final_result: text.clone(),
        });
        tracing::info!(
            steps = emitter.progress().execution_steps.len(),
            "turn complete"
        );
        TurnOutcome {
            state: TurnState::Complete,
            response: text,
            progress: emitter.into_progress(),
        }
    }

    fn fail(&self, mut emitter: ProgressEmitter, error: ProviderError) -> TurnOutcome {
        tracing::error!(error = %error, "provider call failed, turn aborted");
        let message = format!("An error occurred: {error}");
        self.lock_context()
            .add_message(Role::Assistant, message.as_str(), None);
        emitter.emit(ProgressEvent::Error {
            error: message.clone(),
        });
        TurnOutcome {
            state: TurnState::Error,
            response: message,
            progress: emitter.into_progress(),
        }
    }

    fn iteration_limit(&self, mut emitter: ProgressEmitter, pending_calls: usize) -> TurnOutcome {
        tracing::warn!(
            max_iterations = self.config.max_iterations,
            pending_calls,
            "iteration limit reached, remaining tool calls dropped"
        );
        let message = format!(
            "Error: tool calls exceeded the maximum of {} iterations",
            self.config.max_iterations
        );
        self.lock_context()
            .add_message(Role::Assistant, message.as_str(), None);
        emitter.emit(ProgressEvent::Error {
            error: message.clone(),
        });
        TurnOutcome {
            state: TurnState::IterationLimit,
            response: message,
            progress: emitter.into_progress(),
        }
    }

    // ─── Conveniences ───────────────────────────────────────────────────

    /// Forget the conversation.
    pub fn clear_context(&self) {
        self.lock_context().clear();
    }

    /// The current history as sent to the model (without the system prompt).
    pub fn context_messages(&self) -> Vec<ChatMessage> {
        self.lock_context().get_messages().collect()
    }

    /// The stored history with timestamps and metadata.
    pub fn history(&self) -> Vec<Message> {
        self.lock_context().messages().cloned().collect()
    }

    /// Shared handle for readers on other threads.
    pub fn context(&self) -> Arc<Mutex<ConversationContext>> {
        Arc::clone(&self.context)
    }

    /// Reload skill definitions. Must not be called while a turn is running.
    pub fn reload_skills(&self) -> usize {
        self.registry.reload()
    }

    /// Enabled skills as presented to the model.
    pub fn skills(&self) -> Vec<ToolSchema> {
        self.registry.list()
    }

    pub fn registry(&self) -> &Arc<SkillRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn system_prompt(&self) -> String {
        match self.system_prompt.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Write new experience notes and rebuild the system prompt from them.
    pub fn save_experience(&self, notes: &str) -> Result<(), AgentError> {
        prompt::save_experience(&self.config.experience_file, notes)?;
        let rebuilt = prompt::build_system_prompt(&self.config.system_prompt, Some(notes));
        match self.system_prompt.write() {
            Ok(mut guard) => *guard = rebuilt,
            Err(poisoned) => *poisoned.into_inner() = rebuilt,
        }
        Ok(())
    }

    fn lock_context(&self) -> MutexGuard<'_, ConversationContext> {
        self.context.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("conversation context lock poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────────

fn is_tool_result(message: &ChatMessage) -> bool {
    match &message.content {
        MessageContent::Blocks(blocks) => blocks
            .iter()
            .any(|b| matches!(b, ContentBlock::ToolResult { .. })),
        MessageContent::Text(_) => false,
    }
}

/// Analysis text for the first response.
fn describe_analysis(response: &LlmResponse) -> String {
    match response {
        LlmResponse::Text { text } => text.clone(),
        LlmResponse::ToolUse { tool_calls } => {
            let mut analysis = String::from("Analysis complete, will run:\n");
            for call in tool_calls {
                analysis.push_str(&format!("- Call tool: {}\n", call.name));
            }
            analysis
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
