//! Editor-side run action.
//!
//! Requests may complete out of order, so every run is tagged with a
//! [`RequestToken`] and only the result for the most recently issued token
//! reaches the terminal. Older results are dropped on arrival.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::RwLock;

use crate::engine::{CancelSignal, ExecutionEngine, ExecutionRequest};
use crate::outcome::{ExecutionOutcome, TerminalText};

/// Identity of one run, strictly increasing per controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestToken(u64);

impl RequestToken {
    pub fn value(self) -> u64 {
        self.0
    }
}

/// Reasons a run action is refused before dispatch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunError {
    #[error("Please write some code before executing.")]
    EmptySource,
    #[error("The editor has been closed")]
    Closed,
}

/// How a run ended from the editor's point of view.
#[derive(Debug, Clone, PartialEq)]
pub enum RunResult {
    /// Latest request; the terminal now shows this outcome.
    Completed(ExecutionOutcome),
    /// A newer run was issued while this one was in flight.
    Superseded(RequestToken),
    /// The controller was shut down mid-flight.
    Cancelled,
}

/// Per-editor run state: token issuing, pending indicator, terminal text.
pub struct RunController {
    engine: Arc<ExecutionEngine>,
    next_token: AtomicU64,
    /// Highest token issued so far.
    latest: AtomicU64,
    /// Highest token whose result has been settled (delivered or cancelled).
    settled: AtomicU64,
    cancel: CancelSignal,
    terminal: RwLock<TerminalText>,
}

impl RunController {
    pub fn new(engine: Arc<ExecutionEngine>) -> Self {
        Self {
            engine,
            next_token: AtomicU64::new(1),
            latest: AtomicU64::new(0),
            settled: AtomicU64::new(0),
            cancel: CancelSignal::new(),
            terminal: RwLock::new(TerminalText::idle()),
        }
    }

    fn issue(&self) -> RequestToken {
        let token = self.next_token.fetch_add(1, Ordering::SeqCst);
        self.latest.fetch_max(token, Ordering::SeqCst);
        RequestToken(token)
    }

    /// Whether `token` is still the newest request.
    pub fn is_latest(&self, token: RequestToken) -> bool {
        self.latest.load(Ordering::SeqCst) == token.0
    }

    /// Running indicator: the latest request has not settled yet.
    pub fn is_executing(&self) -> bool {
        self.latest.load(Ordering::SeqCst) > self.settled.load(Ordering::SeqCst)
    }

    /// Current terminal pane text.
    pub async fn terminal(&self) -> TerminalText {
        self.terminal.read().await.clone()
    }

    /// Dispatch `source` and deliver the outcome if it is still current.
    pub async fn run(&self, source: &str, language_id: &str) -> Result<RunResult, RunError> {
        if self.cancel.is_cancelled() {
            return Err(RunError::Closed);
        }
        if source.trim().is_empty() {
            return Err(RunError::EmptySource);
        }

        // Issue under the terminal lock so an older run's pending text can
        // never land after a newer run's result.
        let token = {
            let mut terminal = self.terminal.write().await;
            let token = self.issue();
            *terminal = TerminalText::pending();
            token
        };
        log::debug!("Run #{} issued for {language_id}", token.0);

        let request = ExecutionRequest::new(source, language_id);
        let Some(outcome) = self.engine.execute_cancellable(request, &self.cancel).await else {
            self.settled.fetch_max(token.0, Ordering::SeqCst);
            return Ok(RunResult::Cancelled);
        };

        if self.cancel.is_cancelled() {
            log::debug!("Discarding run #{} after shutdown", token.0);
            return Ok(RunResult::Cancelled);
        }

        // Hold the terminal lock while checking so a newer result cannot be
        // overwritten by this one.
        let mut terminal = self.terminal.write().await;
        if !self.is_latest(token) {
            log::warn!("Dropping stale result for run #{}", token.0);
            return Ok(RunResult::Superseded(token));
        }
        *terminal = TerminalText::from_outcome(&outcome);
        self.settled.fetch_max(token.0, Ordering::SeqCst);
        Ok(RunResult::Completed(outcome))
    }

    /// Abandon in-flight runs without waiting for them.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        self.settled
            .fetch_max(self.latest.load(Ordering::SeqCst), Ordering::SeqCst);
        log::info!("Run controller shut down");
    }
}
