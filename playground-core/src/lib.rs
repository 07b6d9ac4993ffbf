//! # playground-core — execution side of the code playground
//!
//! Turns a `(source, language)` pair into a displayable result without
//! running anything: every language has a static-scan evaluator that lifts
//! literal output out of the snippet.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐   request    ┌─────────────────┐   lookup   ┌──────────────┐
//! │ RunController │ ───────────► │ ExecutionEngine │ ─────────► │ EvaluatorSet │
//! │ (per editor)  │ ◄─────────── │ (latency+bound) │ ◄───────── │ (per lang)   │
//! └───────┬───────┘   outcome    └─────────────────┘            └──────┬───────┘
//!         │                                                            │
//!         ▼                                                            ▼
//!   TerminalText                                               language registry
//! ```
//!
//! ## Modules
//!
//! - [`language`] — closed catalog of languages and starter snippets
//! - [`evaluator`] — static-scan evaluators, one per language
//! - [`engine`] — dispatch with simulated latency, timeout and cancellation
//! - [`runner`] — request tokens so stale results never reach the terminal
//! - [`outcome`] — normalized result and terminal rendering
//! - [`project`] — persistence and identity collaborators

pub mod language;
pub(crate) mod scan;
pub mod evaluator;
pub mod outcome;
pub mod engine;
pub mod runner;
pub mod project;

pub use language::{
    LanguageDescriptor, LanguageId, RegistryError, default_language, find_language,
    find_language_or_default, is_default_source, list_languages,
};
pub use scan::{EvaluationError, Interpolation, LiteralSyntax};
pub use evaluator::{
    Evaluator, EvaluatorSet, Idiom, LineBreak, OutputBuffer, StaticScanEvaluator,
};
pub use outcome::{ExecutionOutcome, TerminalText};
pub use engine::{
    CancelSignal, EngineConfig, EngineStats, ExecutionEngine, ExecutionRequest, LatencyConfig,
};
pub use runner::{RequestToken, RunController, RunError, RunResult};
pub use project::{
    Identity, InMemoryProjectStore, OpenProject, Project, ProjectDraft, ProjectId,
    ProjectStore, ProjectSummary, ProjectWorkspace, SaveError, StaticIdentity, StoreError, User,
};
