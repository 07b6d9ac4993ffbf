//! Execution dispatch: registry check, simulated round trip, evaluator call.
//!
//! ```text
//! ExecutionRequest ──► registry lookup ──unknown──► "not supported yet" (0ms)
//!                           │
//!                           ▼
//!                    latency (500–1500ms) ──cancel──► None
//!                           │
//!                           ▼
//!              blocking pool + timeout ──► evaluator ──► ExecutionOutcome
//! ```
//!
//! The engine holds no per-request state; concurrent calls do not interact.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use uuid::Uuid;

use crate::evaluator::EvaluatorSet;
use crate::language::LanguageId;
use crate::outcome::{ExecutionOutcome, UNKNOWN_ERROR};

/// Bounds of the simulated network round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatencyConfig {
    pub min: Duration,
    pub max: Duration,
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            min: Duration::from_millis(500),
            max: Duration::from_millis(1500),
        }
    }
}

impl LatencyConfig {
    /// No delay at all.
    pub fn none() -> Self {
        Self::fixed(Duration::ZERO)
    }

    pub fn fixed(delay: Duration) -> Self {
        Self {
            min: delay,
            max: delay,
        }
    }

    /// Draw a delay uniformly from `[min, max]` at millisecond resolution.
    pub fn sample(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let span = (self.max - self.min).as_millis() as u64;
        let jitter = (Uuid::new_v4().as_u128() as u64) % (span + 1);
        self.min + Duration::from_millis(jitter)
    }
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub latency: LatencyConfig,
    /// Upper bound on a single evaluator call.
    pub evaluation_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            latency: LatencyConfig::default(),
            evaluation_timeout: Duration::from_secs(5),
        }
    }
}

impl EngineConfig {
    /// Config for testing (no simulated latency).
    pub fn for_testing() -> Self {
        Self {
            latency: LatencyConfig::none(),
            evaluation_timeout: Duration::from_secs(5),
        }
    }
}

/// One run action. `language_id` is unvalidated on purpose so that unknown
/// ids can be reported back to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    pub source: String,
    pub language_id: String,
}

impl ExecutionRequest {
    pub fn new(source: impl Into<String>, language_id: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            language_id: language_id.into(),
        }
    }

    pub fn for_language(source: impl Into<String>, language: LanguageId) -> Self {
        Self::new(source, language.as_str())
    }
}

/// Teardown signal for in-flight requests.
///
/// Cloning shares the signal. Once cancelled it stays cancelled.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`CancelSignal::cancel`] has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

/// Counters for monitoring the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub requests: u64,
    pub unsupported: u64,
    pub failures: u64,
    pub cancelled: u64,
}

#[derive(Default)]
struct AtomicEngineStats {
    requests: AtomicU64,
    unsupported: AtomicU64,
    failures: AtomicU64,
    cancelled: AtomicU64,
}

/// Routes requests to evaluators.
pub struct ExecutionEngine {
    evaluators: EvaluatorSet,
    config: EngineConfig,
    stats: AtomicEngineStats,
}

impl ExecutionEngine {
    pub fn new(evaluators: EvaluatorSet, config: EngineConfig) -> Self {
        log::info!(
            "Execution engine ready: {} evaluators, latency {:?}..{:?}",
            evaluators.len(),
            config.latency.min,
            config.latency.max
        );
        Self {
            evaluators,
            config,
            stats: AtomicEngineStats::default(),
        }
    }

    /// Standard evaluators with default latency.
    pub fn with_defaults() -> Self {
        Self::new(EvaluatorSet::standard(), EngineConfig::default())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run one request to completion.
    pub async fn execute(&self, request: ExecutionRequest) -> ExecutionOutcome {
        self.dispatch(request, None)
            .await
            .unwrap_or_else(|| ExecutionOutcome::failure(UNKNOWN_ERROR, 0.0))
    }

    /// Like [`ExecutionEngine::execute`], but returns `None` if `cancel`
    /// fires before the evaluator is reached. Callers never wait for an
    /// abandoned request.
    pub async fn execute_cancellable(
        &self,
        request: ExecutionRequest,
        cancel: &CancelSignal,
    ) -> Option<ExecutionOutcome> {
        self.dispatch(request, Some(cancel)).await
    }

    async fn dispatch(
        &self,
        request: ExecutionRequest,
        cancel: Option<&CancelSignal>,
    ) -> Option<ExecutionOutcome> {
        self.stats.requests.fetch_add(1, Ordering::Relaxed);

        let evaluator = request
            .language_id
            .parse::<LanguageId>()
            .ok()
            .and_then(|id| self.evaluators.get(id));
        let Some(evaluator) = evaluator else {
            log::debug!("Rejecting request for unsupported language '{}'", request.language_id);
            self.stats.unsupported.fetch_add(1, Ordering::Relaxed);
            return Some(ExecutionOutcome::unsupported(&request.language_id));
        };

        let delay = self.config.latency.sample();
        if let Some(cancel) = cancel {
            if cancel.is_cancelled() {
                self.stats.cancelled.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => {
                    log::debug!("Request for {} cancelled during round trip", request.language_id);
                    self.stats.cancelled.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
            }
        } else if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let language = evaluator.language();
        let source = request.source;
        let started = Instant::now();
        let handle = tokio::task::spawn_blocking(move || evaluator.evaluate(&source));

        let outcome = match tokio::time::timeout(self.config.evaluation_timeout, handle).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                log::warn!("Evaluator for {language} failed: {e}");
                ExecutionOutcome::failure(UNKNOWN_ERROR, elapsed_ms(started))
            }
            Err(_) => {
                let limit = self.config.evaluation_timeout.as_millis();
                log::warn!("Evaluator for {language} exceeded {limit}ms");
                ExecutionOutcome::failure(
                    format!("Execution timed out after {limit}ms"),
                    elapsed_ms(started),
                )
            }
        };

        if outcome.is_error() {
            self.stats.failures.fetch_add(1, Ordering::Relaxed);
        }
        log::debug!(
            "Executed {language} request in {:.2}ms (error: {})",
            outcome.elapsed_millis,
            outcome.is_error()
        );
        Some(outcome)
    }

    /// Snapshot of the engine counters.
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            requests: self.stats.requests.load(Ordering::Relaxed),
            unsupported: self.stats.unsupported.load(Ordering::Relaxed),
            failures: self.stats.failures.load(Ordering::Relaxed),
            cancelled: self.stats.cancelled.load(Ordering::Relaxed),
        }
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}
