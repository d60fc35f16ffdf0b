//! Progress events: a live trace of each turn for an observer (usually a UI).
//!
//! The engine raises a [`ProgressEvent`] at every state change. Events go
//! through a [`ProgressEmitter`], which:
//! - folds them into the turn's [`TurnProgress`]
//! - hands them to the installed [`ProgressSink`], synchronously, with any
//!   panic in the sink caught and logged
//!
//! Sinks must not block; [`ChannelSink`] forwards over an unbounded channel
//! for observers living on another thread.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use super::types::{ExecutionStep, PlannedCall};
use crate::skills::registry::panic_message;

// ─── Events ─────────────────────────────────────────────────────────────────

/// One stage change within a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// The request went to the model.
    Analyzing { message: String },
    /// The model's first answer is in.
    AnalysisComplete { analysis: String },
    /// The model asked for these tool calls.
    Planning { plan: Vec<PlannedCall> },
    /// A tool call is starting.
    Executing { tool_name: String, tool_args: Value },
    /// A tool call finished (or was cancelled).
    StepComplete { step: ExecutionStep },
    /// Tool results are going back to the model.
    ProcessingResults { message: String, iteration: usize },
    /// The turn ended with a text answer.
    Complete { final_result: String },
    /// The turn ended with an error or hit the iteration cap.
    Error { error: String },
}

impl ProgressEvent {
    /// Wire name of the stage.
    pub fn stage(&self) -> &'static str {
        match self {
            ProgressEvent::Analyzing { .. } => "analyzing",
            ProgressEvent::AnalysisComplete { .. } => "analysis_complete",
            ProgressEvent::Planning { .. } => "planning",
            ProgressEvent::Executing { .. } => "executing",
            ProgressEvent::StepComplete { .. } => "step_complete",
            ProgressEvent::ProcessingResults { .. } => "processing_results",
            ProgressEvent::Complete { .. } => "complete",
            ProgressEvent::Error { .. } => "error",
        }
    }
}

// ─── TurnProgress ───────────────────────────────────────────────────────────

/// Accumulated trace of one turn. Reset at the start of every turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnProgress {
    pub analysis: String,
    pub plan: Vec<PlannedCall>,
    pub execution_steps: Vec<ExecutionStep>,
    pub final_result: String,
}

impl TurnProgress {
    /// Fold one event in. Events must be applied in emission order.
    pub fn apply(&mut self, event: &ProgressEvent) {
        match event {
            ProgressEvent::AnalysisComplete { analysis } => self.analysis = analysis.clone(),
            ProgressEvent::Planning { plan } => self.plan.extend(plan.iter().cloned()),
            ProgressEvent::StepComplete { step } => self.execution_steps.push(step.clone()),
            ProgressEvent::Complete { final_result } => self.final_result = final_result.clone(),
            ProgressEvent::Error { error } => self.final_result = error.clone(),
            ProgressEvent::Analyzing { .. }
            | ProgressEvent::Executing { .. }
            | ProgressEvent::ProcessingResults { .. } => {}
        }
    }

    /// Rebuild a trace from a recorded event sequence.
    pub fn from_events<'a>(events: impl IntoIterator<Item = &'a ProgressEvent>) -> Self {
        let mut progress = Self::default();
        for event in events {
            progress.apply(event);
        }
        progress
    }
}

// ─── Sinks ──────────────────────────────────────────────────────────────────

/// Receives events synchronously on the worker. Must return promptly.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: &ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    fn emit(&self, event: &ProgressEvent) {
        self(event)
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&self, _event: &ProgressEvent) {}
}

/// Forwards events to an unbounded channel. A dropped receiver is ignored.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        Self { tx }
    }

    /// A sink and the receiver the observer reads from.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelSink {
    fn emit(&self, event: &ProgressEvent) {
        if self.tx.send(event.clone()).is_err() {
            tracing::trace!(stage = event.stage(), "progress receiver dropped");
        }
    }
}

// ─── ProgressEmitter ────────────────────────────────────────────────────────

/// Per-turn emitter: accumulates [`TurnProgress`] and shields the turn from
/// a misbehaving sink.
pub struct ProgressEmitter {
    sink: Arc<dyn ProgressSink>,
    progress: TurnProgress,
}

impl ProgressEmitter {
    /// Start a fresh turn trace.
    pub fn new(sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            sink,
            progress: TurnProgress::default(),
        }
    }

    pub fn emit(&mut self, event: ProgressEvent) {
        self.progress.apply(&event);

        let sink = &self.sink;
        if let Err(payload) = std::panic::catch_unwind(AssertUnwindSafe(|| sink.emit(&event))) {
            tracing::warn!(
                stage = event.stage(),
                panic = %panic_message(payload.as_ref()),
                "progress sink panicked, event dropped"
            );
        }
    }

    pub fn progress(&self) -> &TurnProgress {
        &self.progress
    }

    pub fn into_progress(self) -> TurnProgress {
        self.progress
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
