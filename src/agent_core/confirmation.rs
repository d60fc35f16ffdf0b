//! Confirmation handshake between the engine's worker and the UI thread.
//!
//! The engine runs a turn on a worker task; only the UI-affine thread can ask
//! the user anything. The two halves:
//!
//! - [`ConfirmationBridge`] (worker side, cloneable): `request(tool, description)`
//!   enqueues a [`ConfirmationRequest`] on a bounded channel and waits on its
//!   one-shot reply for at most the configured timeout. Timeout, a closed
//!   queue or an unanswered reply all mean "deny".
//! - [`ConfirmationQueue`] (UI side): `drain()` pops every pending request in
//!   arrival order and resolves each through a [`ConfirmationHandler`]. It
//!   never blocks on the worker, so it can be called from a UI timer.
//!
//! A request whose waiter has already timed out is still resolved by the
//! next drain; the answer is simply discarded.

use std::io::{BufRead, Write};
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::skills::registry::panic_message;

// ─── Constants ──────────────────────────────────────────────────────────────

/// Default wait for a decision.
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(60);

/// Default number of requests that may be queued before `request` waits.
pub const DEFAULT_QUEUE_CAPACITY: usize = 32;

/// Default drain period for polling consumers.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

// ─── ConfirmationRequest ────────────────────────────────────────────────────

/// A pending question for the user. Consumed exactly once.
#[derive(Debug)]
pub struct ConfirmationRequest {
    pub tool_name: String,
    pub description: String,
    pub requested_at: DateTime<Utc>,
    reply: oneshot::Sender<bool>,
}

impl ConfirmationRequest {
    /// Deliver the decision. Returns `false` if the waiter is gone (timed
    /// out); that is not an error.
    pub fn respond(self, approved: bool) -> bool {
        match self.reply.send(approved) {
            Ok(()) => true,
            Err(_) => {
                tracing::debug!(
                    tool = %self.tool_name,
                    approved,
                    "confirmation answered after the requester stopped waiting"
                );
                false
            }
        }
    }

    /// Whether the requester is still waiting for an answer.
    pub fn is_waiting(&self) -> bool {
        !self.reply.is_closed()
    }
}

// ─── Handlers ───────────────────────────────────────────────────────────────

/// Synchronous decision function run on the UI-affine thread.
pub trait ConfirmationHandler: Send {
    fn decide(&mut self, tool_name: &str, description: &str) -> bool;
}

impl<F> ConfirmationHandler for F
where
    F: FnMut(&str, &str) -> bool + Send,
{
    fn decide(&mut self, tool_name: &str, description: &str) -> bool {
        self(tool_name, description)
    }
}

/// Denies everything. The policy when no UI handler is installed.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAll;

impl ConfirmationHandler for DenyAll {
    fn decide(&mut self, tool_name: &str, description: &str) -> bool {
        tracing::info!(
            tool = %tool_name,
            description = %description,
            "no confirmation handler, denying"
        );
        false
    }
}

/// Line-oriented yes/no prompt. "No" is pre-selected: only an explicit
/// `y`/`yes` approves; empty input, EOF and I/O errors deny.
pub struct TerminalPrompt<R, W> {
    input: R,
    output: W,
}

impl TerminalPrompt<std::io::StdinLock<'static>, std::io::Stderr> {
    /// Prompt on stderr, read answers from stdin.
    pub fn stdio() -> Self {
        Self::new(std::io::stdin().lock(), std::io::stderr())
    }
}

impl<R: BufRead, W: Write> TerminalPrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn ask(&mut self, tool_name: &str, description: &str) -> std::io::Result<bool> {
        write!(
            self.output,
            "Dangerous operation detected: {description}\nTool: {tool_name}\nProceed? [y/N] "
        )?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(false);
        }
        let answer = line.trim().to_ascii_lowercase();
        Ok(answer == "y" || answer == "yes")
    }
}

impl<R: BufRead + Send, W: Write + Send> ConfirmationHandler for TerminalPrompt<R, W> {
    fn decide(&mut self, tool_name: &str, description: &str) -> bool {
        match self.ask(tool_name, description) {
            Ok(approved) => approved,
            Err(e) => {
                tracing::warn!(
                    tool = %tool_name,
                    error = %e,
                    "confirmation prompt failed, denying"
                );
                false
            }
        }
    }
}

// ─── Channel ────────────────────────────────────────────────────────────────

/// Create a connected bridge/queue pair.
///
/// The queue starts with [`DenyAll`]; install a real handler with
/// [`ConfirmationQueue::set_handler`].
pub fn confirmation_channel(
    capacity: usize,
    timeout: Duration,
) -> (ConfirmationBridge, ConfirmationQueue) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        ConfirmationBridge { tx, timeout },
        ConfirmationQueue {
            rx,
            handler: Box::new(DenyAll),
            disconnected: false,
        },
    )
}

// ─── ConfirmationBridge ─────────────────────────────────────────────────────

/// Worker-side handle. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ConfirmationBridge {
    tx: mpsc::Sender<ConfirmationRequest>,
    timeout: Duration,
}

impl ConfirmationBridge {
    /// A bridge with no consumer: every request is denied immediately.
    pub fn deny_all() -> Self {
        let (bridge, _queue) = confirmation_channel(1, DEFAULT_CONFIRMATION_TIMEOUT);
        bridge
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Ask the user whether `tool_name` may run. `true` only on an explicit
    /// approval that arrives within the timeout.
    ///
    /// Does not assume anyone is draining: if the queue is full, waiting for
    /// space counts against the same timeout.
    pub async fn request(&self, tool_name: &str, description: &str) -> bool {
        let deadline = Instant::now() + self.timeout;
        let (reply_tx, reply_rx) = oneshot::channel();
        let request = ConfirmationRequest {
            tool_name: tool_name.to_string(),
            description: description.to_string(),
            requested_at: Utc::now(),
            reply: reply_tx,
        };

        match tokio::time::timeout_at(deadline, self.tx.send(request)).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => {
                tracing::warn!(tool = %tool_name, "confirmation queue closed, denying");
                return false;
            }
            Err(_) => {
                tracing::warn!(tool = %tool_name, "confirmation queue full until timeout, denying");
                return false;
            }
        }

        tracing::info!(
            tool = %tool_name,
            timeout_secs = self.timeout.as_secs(),
            "waiting for confirmation"
        );
        match tokio::time::timeout_at(deadline, reply_rx).await {
            Ok(Ok(approved)) => {
                tracing::info!(tool = %tool_name, approved, "confirmation received");
                approved
            }
            Ok(Err(_)) => {
                tracing::warn!(tool = %tool_name, "confirmation dropped unanswered, denying");
                false
            }
            Err(_) => {
                tracing::warn!(
                    tool = %tool_name,
                    timeout_secs = self.timeout.as_secs(),
                    "confirmation timed out, denying"
                );
                false
            }
        }
    }
}

// ─── ConfirmationQueue ──────────────────────────────────────────────────────

/// UI-side consumer of confirmation requests.
pub struct ConfirmationQueue {
    rx: mpsc::Receiver<ConfirmationRequest>,
    handler: Box<dyn ConfirmationHandler>,
    disconnected: bool,
}

impl std::fmt::Debug for ConfirmationQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfirmationQueue")
            .field("disconnected", &self.disconnected)
            .finish()
    }
}

impl ConfirmationQueue {
    /// Replace the decision function.
    pub fn set_handler(&mut self, handler: impl ConfirmationHandler + 'static) {
        self.handler = Box::new(handler);
    }

    /// Whether every bridge has been dropped and the queue is empty.
    pub fn is_disconnected(&self) -> bool {
        self.disconnected
    }

    /// Resolve every pending request in arrival order. Never blocks.
    ///
    /// Returns how many requests were resolved.
    pub fn drain(&mut self) -> usize {
        let mut resolved = 0;
        loop {
            match self.rx.try_recv() {
                Ok(request) => {
                    self.resolve(request);
                    resolved += 1;
                }
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    self.disconnected = true;
                    break;
                }
            }
        }
        resolved
    }

    /// Wait for the next request without resolving it, for consumers that
    /// answer asynchronously. `None` once every bridge is gone.
    pub async fn recv(&mut self) -> Option<ConfirmationRequest> {
        let next = self.rx.recv().await;
        if next.is_none() {
            self.disconnected = true;
        }
        next
    }

    /// Drain every `interval` until every bridge is dropped.
    pub async fn run_polling(mut self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.drain();
            if self.disconnected {
                tracing::debug!("confirmation queue disconnected, polling stopped");
                break;
            }
        }
    }

    fn resolve(&mut self, request: ConfirmationRequest) {
        if !request.is_waiting() {
            tracing::debug!(tool = %request.tool_name, "resolving orphaned confirmation");
        }

        let handler = &mut self.handler;
        let tool_name = request.tool_name.as_str();
        let description = request.description.as_str();
        let approved = match std::panic::catch_unwind(AssertUnwindSafe(|| {
            handler.decide(tool_name, description)
        })) {
            Ok(approved) => approved,
            Err(payload) => {
                tracing::error!(
                    tool = %tool_name,
                    panic = %panic_message(payload.as_ref()),
                    "confirmation handler panicked, denying"
                );
                false
            }
        };

        request.respond(approved);
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    const SHORT: Duration = Duration::from_millis(200);

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn test_approval_round_trip() {
        let (bridge, mut queue) = confirmation_channel(4, Duration::from_secs(5));
        queue.set_handler(|_: &str, _: &str| true);

        let worker =
            tokio::spawn(async move { bridge.request("execute_powershell", "rm x").await });
        settle().await;
        assert_eq!(queue.drain(), 1);
        assert!(worker.await.unwrap());
    }

    #[tokio::test]
    async fn test_default_handler_denies() {
        let (bridge, mut queue) = confirmation_channel(4, Duration::from_secs(5));
        let worker = tokio::spawn(async move { bridge.request("delete_file", "C:\\data").await });
        settle().await;
        queue.drain();
        assert!(!worker.await.unwrap());
    }

    #[tokio::test]
    async fn test_timeout_denies_and_late_drain_is_tolerated() {
        let (bridge, mut queue) = confirmation_channel(4, SHORT);
        let asked = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&asked);
        queue.set_handler(move |_: &str, _: &str| {
            *counter.lock().unwrap() += 1;
            true
        });

        let started = std::time::Instant::now();
        assert!(!bridge.request("delete_file", "C:\\data").await);
        assert!(started.elapsed() >= SHORT);

        // The orphaned request is still drained without error.
        assert_eq!(queue.drain(), 1);
        assert_eq!(*asked.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_closed_queue_denies_immediately() {
        let (bridge, queue) = confirmation_channel(4, Duration::from_secs(30));
        drop(queue);
        let started = std::time::Instant::now();
        assert!(!bridge.request("delete_file", "x").await);
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(!ConfirmationBridge::deny_all().request("delete_file", "x").await);
    }

    #[tokio::test]
    async fn test_drain_resolves_in_arrival_order() {
        let (bridge, mut queue) = confirmation_channel(8, Duration::from_secs(5));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        queue.set_handler(move |tool: &str, _: &str| {
            log.lock().unwrap().push(tool.to_string());
            tool != "b"
        });

        let mut workers = Vec::new();
        for name in ["a", "b", "c"] {
            let bridge = bridge.clone();
            workers.push(tokio::spawn(async move { bridge.request(name, "").await }));
            settle().await;
        }

        assert_eq!(queue.drain(), 3);
        assert_eq!(*seen.lock().unwrap(), vec!["a", "b", "c"]);
        let mut answers = Vec::new();
        for worker in workers {
            answers.push(worker.await.unwrap());
        }
        assert_eq!(answers, vec![true, false, true]);
    }

    #[tokio::test]
    async fn test_panicking_handler_denies() {
        let (bridge, mut queue) = confirmation_channel(4, Duration::from_secs(5));
        queue.set_handler(|_: &str, _: &str| -> bool { panic!("dialog crashed") });
        let worker = tokio::spawn(async move { bridge.request("rm", "").await });
        settle().await;
        assert_eq!(queue.drain(), 1);
        assert!(!worker.await.unwrap());
    }

    #[tokio::test]
    async fn test_run_polling_answers_and_stops() {
        let (bridge, mut queue) = confirmation_channel(4, Duration::from_secs(5));
        queue.set_handler(|_: &str, _: &str| true);
        let poller = tokio::spawn(queue.run_polling(Duration::from_millis(10)));

        assert!(bridge.request("delete_file", "x").await);
        drop(bridge);
        tokio::time::timeout(Duration::from_secs(2), poller)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_terminal_prompt_defaults_to_no() {
        let mut out = Vec::new();
        let mut prompt = TerminalPrompt::new(&b"\n"[..], &mut out);
        assert!(!prompt.decide("delete_file", "Run delete_file: path=C:\\data"));
        drop(prompt);
        let shown = String::from_utf8(out).unwrap();
        assert!(shown.contains("[y/N]"));
        assert!(shown.contains("path=C:\\data"));

        let mut sink = Vec::new();
        assert!(TerminalPrompt::new(&b"Yes\n"[..], &mut sink).decide("t", "d"));
        assert!(!TerminalPrompt::new(&b""[..], &mut sink).decide("t", "d"));
        assert!(!TerminalPrompt::new(&b"maybe\n"[..], &mut sink).decide("t", "d"));
    }
}
