//! Pattern matching over snippet text used by the evaluators.
//!
//! Call sites, stream heads, `SELECT` keywords and quoted literals are found
//! with `regex`. Literal bodies are captured raw and decoded afterwards,
//! which is also where interpolation holes are detected.
//!
//! Single- and double-quoted literals never span a line break; backtick
//! literals may.

use std::ops::Range;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use thiserror::Error;

/// Malformed input found while scanning an output statement.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvaluationError {
    #[error("Unterminated string literal at line {line}, column {column}")]
    UnterminatedLiteral { line: usize, column: usize },

    #[error("Invalid scan pattern: {0}")]
    Pattern(String),
}

/// Interpolation syntax inside string literals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    None,
    /// `${expr}` inside backtick templates.
    Template,
    /// `$name` or `${expr}` inside double quotes.
    Dollar,
    /// `\(expr)`.
    Paren,
}

/// How string literals are written in one language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiteralSyntax {
    pub quotes: &'static [char],
    pub interpolation: Interpolation,
}

impl LiteralSyntax {
    pub const fn plain(quotes: &'static [char]) -> Self {
        Self {
            quotes,
            interpolation: Interpolation::None,
        }
    }

    pub const fn with_interpolation(quotes: &'static [char], interpolation: Interpolation) -> Self {
        Self {
            quotes,
            interpolation,
        }
    }

    fn accepts(&self, quote: char) -> bool {
        self.quotes.contains(&quote)
    }

    /// Decode a captured literal body. Backtick bodies are raw.
    pub(crate) fn decode(&self, quote: char, body: &str) -> Literal {
        if quote == '`' {
            let is_static = !(self.interpolation == Interpolation::Template && body.contains("${"));
            return Literal {
                text: body.to_string(),
                is_static,
            };
        }

        let mut text = String::with_capacity(body.len());
        let mut is_static = true;
        let mut chars = body.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some('r') => text.push('\r'),
                    Some('0') => text.push('\0'),
                    Some(e @ ('\\' | '"' | '\'')) => text.push(e),
                    Some('$') if self.interpolation == Interpolation::Dollar => text.push('$'),
                    Some('(') if self.interpolation == Interpolation::Paren => {
                        is_static = false;
                        text.push_str("\\(");
                    }
                    Some(other) => {
                        text.push('\\');
                        text.push(other);
                    }
                    None => text.push('\\'),
                },
                '$' if self.interpolation == Interpolation::Dollar
                    && quote == '"'
                    && chars
                        .peek()
                        .is_some_and(|n| *n == '{' || *n == '_' || n.is_alphabetic()) =>
                {
                    is_static = false;
                    text.push(c);
                }
                c => text.push(c),
            }
        }
        Literal { text, is_static }
    }
}

/// A quoted literal lifted out of the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Literal {
    pub text: String,
    /// False when the literal has interpolation holes.
    pub is_static: bool,
}

/// What sits where an argument is expected.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Arg {
    /// A complete literal and the offset just past its closing quote.
    Literal(Literal, usize),
    /// A quoted literal cut off by a line break; scanning resumes at the
    /// next line.
    Broken(usize),
    Other,
}

const DOUBLE: &str = r#""((?:[^"\\\n]|\\.)*)""#;
const SINGLE: &str = r#"'((?:[^'\\\n]|\\.)*)'"#;
const BACKTICK: &str = r"`([^`]*)`";
const QUOTED: &str = r#""(?:[^"\\\n]|\\.)*"|'(?:[^'\\\n]|\\.)*'"#;

pub(crate) struct Patterns {
    /// A dotted identifier followed by `(`.
    pub call_site: Regex,
    pub stream_head: Regex,
    pub stream_op: Regex,
    pub endl: Regex,
    /// One `<<` operand we cannot resolve.
    pub operand: Regex,
    pub select: Regex,
    pub alias: Regex,
    /// One `SELECT` column that is not a literal.
    pub column: Regex,
    pub comma: Regex,
    pub close_paren: Regex,
    string: Regex,
    string_here: Regex,
}

impl Patterns {
    fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            call_site: Regex::new(r"([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*)\s*\(")?,
            stream_head: Regex::new(r"std::cout\b")?,
            stream_op: Regex::new(r"^\s*<<\s*")?,
            endl: Regex::new(r"^(?:std::)?endl\b")?,
            operand: Regex::new(&format!(r"^(?:{QUOTED}|[^;<\n]|<[^<;\n])*"))?,
            select: Regex::new(r"(?i)\bselect\b")?,
            alias: Regex::new(&format!(
                r"^\s*(?i:as)\s+(?:{QUOTED}|[A-Za-z_][A-Za-z0-9_]*)"
            ))?,
            column: Regex::new(&format!(r"^(?:{QUOTED}|[^,;])*"))?,
            comma: Regex::new(r"^\s*,")?,
            close_paren: Regex::new(r"^\s*\)")?,
            string: Regex::new(&format!("{DOUBLE}|{SINGLE}|{BACKTICK}"))?,
            string_here: Regex::new(&format!("^(?:{DOUBLE}|{SINGLE}|{BACKTICK})"))?,
        })
    }

    /// Byte ranges of every string literal in `src`, in order.
    pub fn string_spans(&self, src: &str, syntax: LiteralSyntax) -> Vec<Range<usize>> {
        let mut spans = Vec::new();
        let mut from = 0;
        while let Some(caps) = self.string.captures_at(src, from) {
            let Some(whole) = caps.get(0) else {
                break;
            };
            if quoted_body(&caps).is_some_and(|(q, _)| syntax.accepts(q)) {
                from = whole.end();
                spans.push(whole.range());
            } else {
                // Not a quote in this language; look again past it.
                from = whole.start() + 1;
            }
        }
        spans
    }

    /// Read the argument starting at byte offset `at`.
    ///
    /// End of input inside a literal is the one malformed-input condition
    /// evaluators report.
    pub fn literal_at(
        &self,
        src: &str,
        at: usize,
        syntax: LiteralSyntax,
    ) -> Result<Arg, EvaluationError> {
        let rest = &src[at..];
        let Some(open) = rest.chars().next().filter(|c| syntax.accepts(*c)) else {
            return Ok(Arg::Other);
        };

        if let Some(caps) = self.string_here.captures(rest) {
            if let (Some(whole), Some((quote, body))) = (caps.get(0), quoted_body(&caps)) {
                return Ok(Arg::Literal(syntax.decode(quote, body), at + whole.end()));
            }
        }

        if open != '`' {
            if let Some(nl) = rest.find('\n') {
                return Ok(Arg::Broken(at + nl + 1));
            }
        }
        let (line, column) = line_col(src, at);
        Err(EvaluationError::UnterminatedLiteral { line, column })
    }
}

static PATTERNS: LazyLock<Result<Patterns, regex::Error>> = LazyLock::new(Patterns::compile);

pub(crate) fn patterns() -> Result<&'static Patterns, EvaluationError> {
    PATTERNS
        .as_ref()
        .map_err(|e| EvaluationError::Pattern(e.to_string()))
}

fn quoted_body<'h>(caps: &Captures<'h>) -> Option<(char, &'h str)> {
    [('"', 1), ('\'', 2), ('`', 3)]
        .into_iter()
        .find_map(|(quote, group)| caps.get(group).map(|m| (quote, m.as_str())))
}

/// Whether the match at `at` continues a longer name (`myprint`,
/// `foo.print`, `x::cout`).
pub(crate) fn continues_name(src: &str, at: usize) -> bool {
    src[..at]
        .chars()
        .next_back()
        .is_some_and(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | ':' | '$'))
}

pub(crate) fn in_spans(spans: &[Range<usize>], at: usize) -> bool {
    let i = spans.partition_point(|span| span.end <= at);
    spans.get(i).is_some_and(|span| span.start <= at)
}

pub(crate) fn skip_ws(src: &str, at: usize) -> usize {
    let rest = &src[at..];
    at + (rest.len() - rest.trim_start().len())
}

/// 1-based line and column of a byte offset.
fn line_col(src: &str, offset: usize) -> (usize, usize) {
    let before = &src[..offset];
    let line = before.matches('\n').count() + 1;
    let column = before
        .rsplit('\n')
        .next()
        .map_or(0, |l| l.chars().count())
        + 1;
    (line, column)
}
