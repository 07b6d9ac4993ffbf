//! Normalized result of one execution attempt and its terminal rendering.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Output pane text before anything has run.
pub const IDLE_TEXT: &str = "// Output will appear here when you run your code";
/// Output pane text while a request is in flight.
pub const PENDING_TEXT: &str = "Executing code...";
/// Shown in place of an empty successful output.
pub const EMPTY_OUTPUT_TEXT: &str = "// No output generated";
/// Generic message for failures the evaluator could not describe.
pub const UNKNOWN_ERROR: &str = "An unknown error occurred";

/// What an evaluator (or the dispatch layer) reports back.
///
/// A successful outcome has `error_message == None`; `output` may still be
/// empty. `elapsed_millis` is zero only for outcomes that never reached an
/// evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub output: String,
    pub error_message: Option<String>,
    pub elapsed_millis: f64,
}

impl ExecutionOutcome {
    pub fn success(output: impl Into<String>, elapsed_millis: f64) -> Self {
        Self {
            output: output.into(),
            error_message: None,
            elapsed_millis,
        }
    }

    pub fn failure(message: impl Into<String>, elapsed_millis: f64) -> Self {
        Self {
            output: String::new(),
            error_message: Some(message.into()),
            elapsed_millis,
        }
    }

    /// Outcome for a language id outside the registry.
    pub fn unsupported(language_id: &str) -> Self {
        Self::failure(format!("Language '{language_id}' is not supported yet"), 0.0)
    }

    pub fn is_error(&self) -> bool {
        self.error_message.is_some()
    }
}

/// Text for the terminal pane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalText(String);

impl TerminalText {
    pub fn idle() -> Self {
        Self(IDLE_TEXT.to_string())
    }

    pub fn pending() -> Self {
        Self(PENDING_TEXT.to_string())
    }

    pub fn from_outcome(outcome: &ExecutionOutcome) -> Self {
        if let Some(message) = &outcome.error_message {
            return Self(format!("Error: {message}"));
        }
        let body = if outcome.output.is_empty() {
            EMPTY_OUTPUT_TEXT
        } else {
            outcome.output.as_str()
        };
        Self(format!(
            "{body}\n\nExecution completed in {:.2}ms",
            outcome.elapsed_millis
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TerminalText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_outcome_shape() {
        let o = ExecutionOutcome::unsupported("ruby");
        assert_eq!(o.output, "");
        assert_eq!(
            o.error_message.as_deref(),
            Some("Language 'ruby' is not supported yet")
        );
        assert_eq!(o.elapsed_millis, 0.0);
    }

    #[test]
    fn test_terminal_error() {
        let o = ExecutionOutcome::failure("boom", 1.0);
        assert_eq!(TerminalText::from_outcome(&o).as_str(), "Error: boom");
    }

    #[test]
    fn test_terminal_success_has_timing_footer() {
        let o = ExecutionOutcome::success("Hi\n", 1.234);
        assert_eq!(
            TerminalText::from_outcome(&o).as_str(),
            "Hi\n\n\nExecution completed in 1.23ms"
        );
    }

    #[test]
    fn test_terminal_empty_output() {
        let o = ExecutionOutcome::success("", 0.5);
        assert_eq!(
            TerminalText::from_outcome(&o).to_string(),
            "// No output generated\n\nExecution completed in 0.50ms"
        );
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(TerminalText::idle().as_str(), IDLE_TEXT);
        assert_eq!(TerminalText::pending().as_str(), PENDING_TEXT);
    }
}
