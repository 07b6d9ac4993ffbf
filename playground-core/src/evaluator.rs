//! Per-language evaluators.
//!
//! Nothing is ever executed. Each evaluator scans the snippet for the one
//! output statement its language is known for and collects the string
//! literals passed to it, in source order. Arguments that are not plain
//! literals are skipped.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::language::LanguageId;
use crate::outcome::ExecutionOutcome;
use crate::scan::{
    continues_name, in_spans, patterns, skip_ws, Arg, EvaluationError, Interpolation,
    LiteralSyntax,
};

/// A pure, total mapping from source text to an outcome.
pub trait Evaluator: Send + Sync {
    fn language(&self) -> LanguageId;

    fn evaluate(&self, source: &str) -> ExecutionOutcome;
}

/// Collected program output.
#[derive(Debug, Default)]
pub struct OutputBuffer {
    text: String,
}

impl OutputBuffer {
    pub fn write(&mut self, s: &str) {
        self.text.push_str(s);
    }

    pub fn write_line(&mut self, s: &str) {
        self.text.push_str(s);
        self.text.push('\n');
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

/// Where a line break goes after an extracted `Call` literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineBreak {
    /// `println`-style: one per call.
    Always,
    /// `printf`-style: one per call unless the text already ends with one.
    IfMissing,
}

/// The output statement shape an evaluator looks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Idiom {
    /// `callee(<literal>)`.
    Call {
        callee: &'static str,
        syntax: LiteralSyntax,
        line_break: LineBreak,
        /// Collapse `%%` to `%` (printf format strings).
        printf_escapes: bool,
    },
    /// `std::cout << <literal> << ... [<< std::endl];`, one line per chain.
    StreamChain,
    /// `SELECT <literal> [AS alias], ...;`, one row per statement.
    Select,
}

const C_QUOTES: &[char] = &['"', '\''];
const PLAIN: LiteralSyntax = LiteralSyntax::plain(C_QUOTES);

const fn println_call(callee: &'static str, syntax: LiteralSyntax) -> Idiom {
    Idiom::Call {
        callee,
        syntax,
        line_break: LineBreak::Always,
        printf_escapes: false,
    }
}

impl Idiom {
    /// The canonical idiom for a language.
    pub fn for_language(id: LanguageId) -> Self {
        match id {
            LanguageId::JavaScript => println_call(
                "console.log",
                LiteralSyntax::with_interpolation(&['"', '\'', '`'], Interpolation::Template),
            ),
            LanguageId::Python => println_call("print", PLAIN),
            LanguageId::Java => println_call("System.out.println", PLAIN),
            LanguageId::Cpp => Idiom::StreamChain,
            LanguageId::CSharp => println_call("Console.WriteLine", PLAIN),
            LanguageId::C => Idiom::Call {
                callee: "printf",
                syntax: LiteralSyntax::plain(&['"']),
                line_break: LineBreak::IfMissing,
                printf_escapes: true,
            },
            LanguageId::Kotlin => println_call(
                "println",
                LiteralSyntax::with_interpolation(C_QUOTES, Interpolation::Dollar),
            ),
            LanguageId::Swift => println_call(
                "print",
                LiteralSyntax::with_interpolation(&['"'], Interpolation::Paren),
            ),
            LanguageId::Sql => Idiom::Select,
            LanguageId::Go => println_call("fmt.Println", LiteralSyntax::plain(&['"', '`'])),
        }
    }

    /// How the advisory refers to the statement, e.g. `print()`.
    pub fn label(&self) -> String {
        match self {
            Idiom::Call { callee, .. } => format!("{callee}()"),
            Idiom::StreamChain => "std::cout".to_string(),
            Idiom::Select => "SELECT".to_string(),
        }
    }

    /// Scan `source` and write every statically known output into `out`.
    pub fn scan(&self, source: &str, out: &mut OutputBuffer) -> Result<(), EvaluationError> {
        match *self {
            Idiom::Call {
                callee,
                syntax,
                line_break,
                printf_escapes,
            } => scan_calls(source, callee, syntax, line_break, printf_escapes, out),
            Idiom::StreamChain => scan_stream_chains(source, out),
            Idiom::Select => scan_selects(source, out),
        }
    }
}

fn scan_calls(
    source: &str,
    callee: &str,
    syntax: LiteralSyntax,
    line_break: LineBreak,
    printf_escapes: bool,
    out: &mut OutputBuffer,
) -> Result<(), EvaluationError> {
    let p = patterns()?;
    let strings = p.string_spans(source, syntax);
    let mut cursor = 0;

    while let Some(caps) = p.call_site.captures_at(source, cursor) {
        let (Some(site), Some(name)) = (caps.get(0), caps.get(1)) else {
            break;
        };
        cursor = site.end();
        if name.as_str() != callee
            || continues_name(source, site.start())
            || in_spans(&strings, site.start())
        {
            continue;
        }

        let at = skip_ws(source, site.end());
        let (lit, end) = match p.literal_at(source, at, syntax)? {
            Arg::Literal(lit, end) => (lit, end),
            Arg::Broken(resume) => {
                cursor = resume;
                continue;
            }
            Arg::Other => continue,
        };
        cursor = end;
        if !lit.is_static || !p.close_paren.is_match(&source[end..]) {
            continue;
        }

        let text = if printf_escapes {
            lit.text.replace("%%", "%")
        } else {
            lit.text
        };
        match line_break {
            LineBreak::IfMissing if text.ends_with('\n') => out.write(&text),
            _ => out.write_line(&text),
        }
    }
    Ok(())
}

fn scan_stream_chains(source: &str, out: &mut OutputBuffer) -> Result<(), EvaluationError> {
    let p = patterns()?;
    let strings = p.string_spans(source, PLAIN);
    let mut cursor = 0;

    while let Some(head) = p.stream_head.find_at(source, cursor) {
        cursor = head.end();
        if continues_name(source, head.start()) || in_spans(&strings, head.start()) {
            continue;
        }

        let mut line = String::new();
        let mut any_literal = false;
        while let Some(op) = p.stream_op.find(&source[cursor..]) {
            let at = cursor + op.end();
            match p.literal_at(source, at, PLAIN)? {
                Arg::Literal(lit, end) => {
                    line.push_str(&lit.text);
                    any_literal = true;
                    cursor = end;
                }
                Arg::Broken(resume) => {
                    any_literal = false;
                    cursor = resume;
                    break;
                }
                Arg::Other => {
                    if let Some(endl) = p.endl.find(&source[at..]) {
                        line.push('\n');
                        cursor = at + endl.end();
                    } else {
                        // Operand we cannot resolve statically.
                        cursor = at + p.operand.find(&source[at..]).map_or(0, |m| m.end());
                    }
                }
            }
        }

        if any_literal {
            if !line.ends_with('\n') {
                line.push('\n');
            }
            out.write(&line);
        }
    }
    Ok(())
}

fn scan_selects(source: &str, out: &mut OutputBuffer) -> Result<(), EvaluationError> {
    let p = patterns()?;
    let strings = p.string_spans(source, PLAIN);
    let mut next = 0;

    // Column skipping may run past the statement, so the keyword search
    // resumes right after each keyword.
    while let Some(keyword) = p.select.find_at(source, next) {
        next = keyword.end();
        if continues_name(source, keyword.start()) || in_spans(&strings, keyword.start()) {
            continue;
        }

        let mut columns: Vec<String> = Vec::new();
        let mut cursor = keyword.end();
        loop {
            let at = skip_ws(source, cursor);
            match p.literal_at(source, at, PLAIN)? {
                Arg::Literal(lit, end) => {
                    columns.push(lit.text);
                    cursor = end + p.alias.find(&source[end..]).map_or(0, |m| m.end());
                }
                Arg::Broken(resume) => {
                    columns.clear();
                    next = resume;
                    break;
                }
                Arg::Other => {
                    cursor = at + p.column.find(&source[at..]).map_or(0, |m| m.end());
                }
            }
            match p.comma.find(&source[cursor..]) {
                Some(comma) => cursor += comma.end(),
                None => break,
            }
        }
        if !columns.is_empty() {
            out.write_line(&columns.join(" | "));
        }
    }
    Ok(())
}

/// Evaluator built from one [`Idiom`].
pub struct StaticScanEvaluator {
    language: LanguageId,
    idiom: Idiom,
    advisory: String,
}

impl StaticScanEvaluator {
    pub fn new(language: LanguageId, idiom: Idiom) -> Self {
        let advisory = format!(
            "No output detected. Make sure you use {} statements.",
            idiom.label()
        );
        Self {
            language,
            idiom,
            advisory,
        }
    }

    pub fn for_language(language: LanguageId) -> Self {
        Self::new(language, Idiom::for_language(language))
    }

    /// Output returned when the snippet prints nothing recognizable.
    pub fn advisory(&self) -> &str {
        &self.advisory
    }
}

impl Evaluator for StaticScanEvaluator {
    fn language(&self) -> LanguageId {
        self.language
    }

    fn evaluate(&self, source: &str) -> ExecutionOutcome {
        let start = Instant::now();
        let mut out = OutputBuffer::default();
        let scanned = self.idiom.scan(source, &mut out);
        let elapsed = start.elapsed().as_secs_f64() * 1000.0;

        match scanned {
            Ok(()) if out.is_empty() => ExecutionOutcome::success(self.advisory.clone(), elapsed),
            Ok(()) => ExecutionOutcome::success(out.into_string(), elapsed),
            Err(e) => ExecutionOutcome::failure(e.to_string(), elapsed),
        }
    }
}

/// Language → evaluator table used by the dispatch engine.
#[derive(Clone, Default)]
pub struct EvaluatorSet {
    evaluators: HashMap<LanguageId, Arc<dyn Evaluator>>,
}

impl EvaluatorSet {
    /// An empty set; every lookup misses.
    pub fn empty() -> Self {
        Self::default()
    }

    /// One static-scan evaluator per registry language.
    pub fn standard() -> Self {
        let mut set = Self::empty();
        for id in LanguageId::ALL {
            set.register(Arc::new(StaticScanEvaluator::for_language(id)));
        }
        set
    }

    /// Register (or replace) the evaluator for its language.
    pub fn register(&mut self, evaluator: Arc<dyn Evaluator>) {
        self.evaluators.insert(evaluator.language(), evaluator);
    }

    pub fn get(&self, id: LanguageId) -> Option<Arc<dyn Evaluator>> {
        self.evaluators.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.evaluators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.evaluators.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::list_languages;

    fn eval(id: LanguageId, src: &str) -> ExecutionOutcome {
        StaticScanEvaluator::for_language(id).evaluate(src)
    }

    #[test]
    fn test_default_sources_evaluate_cleanly() {
        for lang in list_languages() {
            let outcome = eval(lang.id, lang.default_source);
            assert!(outcome.error_message.is_none(), "{} failed", lang.id);
            assert!(
                outcome.output.contains("Hello, World!"),
                "{} produced {:?}",
                lang.id,
                outcome.output
            );
        }
    }

    #[test]
    fn test_default_sources_print_exactly_one_line() {
        for lang in list_languages() {
            assert_eq!(eval(lang.id, lang.default_source).output, "Hello, World!\n");
        }
    }

    #[test]
    fn test_kotlin_println_sequence() {
        let outcome = eval(
            LanguageId::Kotlin,
            "fun main() {\n println(\"Hello\")\n println(\"World\")\n}",
        );
        assert_eq!(outcome.output, "Hello\nWorld\n");
        assert_eq!(outcome.error_message, None);
    }

    #[test]
    fn test_empty_source_gives_advisory() {
        let outcome = eval(LanguageId::Python, "");
        assert_eq!(
            outcome.output,
            "No output detected. Make sure you use print() statements."
        );
        assert!(!outcome.is_error());
    }

    #[test]
    fn test_advisory_names_the_idiom() {
        assert_eq!(
            eval(LanguageId::Java, "int x = 1;").output,
            "No output detected. Make sure you use System.out.println() statements."
        );
        assert_eq!(
            eval(LanguageId::Cpp, "").output,
            "No output detected. Make sure you use std::cout statements."
        );
        assert_eq!(
            eval(LanguageId::Sql, "DROP TABLE t;").output,
            "No output detected. Make sure you use SELECT statements."
        );
    }

    #[test]
    fn test_order_preserved_and_not_deduplicated() {
        let outcome = eval(
            LanguageId::Python,
            "print(\"A\")\nprint('B')\nprint(\"A\")",
        );
        assert_eq!(outcome.output, "A\nB\nA\n");
    }

    #[test]
    fn test_non_literal_arguments_skipped() {
        let outcome = eval(
            LanguageId::JavaScript,
            "const x = 1;\nconsole.log(x);\nconsole.log(\"a\" + x);\nconsole.log(`v=${x}`);\nconsole.log('ok');",
        );
        assert_eq!(outcome.output, "ok\n");
    }

    #[test]
    fn test_javascript_is_never_executed() {
        let outcome = eval(
            LanguageId::JavaScript,
            "while (true) {}\nconsole.log(\"after\");",
        );
        assert_eq!(outcome.output, "after\n");
    }

    #[test]
    fn test_unterminated_literal_is_evaluation_failure() {
        let outcome = eval(LanguageId::Python, "print(\"oops)");
        assert_eq!(outcome.output, "");
        assert_eq!(
            outcome.error_message.as_deref(),
            Some("Unterminated string literal at line 1, column 7")
        );
    }

    #[test]
    fn test_valid_code_mentioning_callee_in_string() {
        let outcome = eval(LanguageId::Python, "x = 'print('");
        assert_eq!(outcome.error_message, None);
        assert_eq!(
            outcome.output,
            "No output detected. Make sure you use print() statements."
        );
    }

    #[test]
    fn test_broken_literal_does_not_swallow_next_line() {
        let outcome = eval(LanguageId::Python, "print(\"oops)\nprint(\"ok\")");
        assert_eq!(outcome.error_message, None);
        assert_eq!(outcome.output, "ok\n");
    }

    #[test]
    fn test_js_template_may_span_lines() {
        let outcome = eval(LanguageId::JavaScript, "console.log(`a\nb`);");
        assert_eq!(outcome.output, "a\nb\n");

        let open = eval(LanguageId::JavaScript, "console.log(`a\nb");
        assert_eq!(
            open.error_message.as_deref(),
            Some("Unterminated string literal at line 1, column 13")
        );
    }

    #[test]
    fn test_cpp_chain_concatenates_and_ends_line() {
        let outcome = eval(
            LanguageId::Cpp,
            "std::cout << \"a\" << \"b\" << std::endl;\nstd::cout << \"c\";\nstd::cout << n << std::endl;",
        );
        assert_eq!(outcome.output, "ab\nc\n");
    }

    #[test]
    fn test_cpp_statements_each_end_a_line() {
        let outcome = eval(LanguageId::Cpp, "std::cout << \"A\";\nstd::cout << \"B\";");
        assert_eq!(outcome.output, "A\nB\n");

        let outcome = eval(
            LanguageId::Cpp,
            "std::cout << \"a\" << std::endl << \"b\" << endl;",
        );
        assert_eq!(outcome.output, "a\nb\n");
    }

    #[test]
    fn test_cpp_skips_unknown_operands() {
        let outcome = eval(LanguageId::Cpp, "std::cout << \"x=\" << x << std::endl;");
        assert_eq!(outcome.output, "x=\n");
    }

    #[test]
    fn test_c_printf_one_line_per_call() {
        let outcome = eval(
            LanguageId::C,
            "printf(\"a\");\nprintf(\"b\\n\");\nprintf(\"%d\\n\", n);\nprintf(\"100%%\\n\");",
        );
        assert_eq!(outcome.output, "a\nb\n100%\n");

        let outcome = eval(LanguageId::C, "printf(\"A\");\nprintf(\"B\");");
        assert_eq!(outcome.output, "A\nB\n");
    }

    #[test]
    fn test_interpolated_strings_skipped() {
        let kotlin = eval(
            LanguageId::Kotlin,
            "println(\"Hi $name\")\nprintln(\"${a + b}\")\nprintln(\"ok\")",
        );
        assert_eq!(kotlin.output, "ok\n");

        let swift = eval(LanguageId::Swift, "print(\"Hi \\(name)\")\nprint(\"ok\")");
        assert_eq!(swift.output, "ok\n");
    }

    #[test]
    fn test_sql_keyword_inside_string_ignored() {
        let outcome = eval(LanguageId::Sql, "SELECT 'select me' AS s;\nSELECT x\nFROM t\nSELECT 'z'");
        assert_eq!(outcome.output, "select me\nz\n");
    }

    #[test]
    fn test_sql_columns_and_rows() {
        let outcome = eval(
            LanguageId::Sql,
            "select 'a' as x, \"b\";\nSELECT name FROM users;\nSELECT 'c';",
        );
        assert_eq!(outcome.output, "a | b\nc\n");
    }

    #[test]
    fn test_swift_print_vs_println() {
        let swift = StaticScanEvaluator::for_language(LanguageId::Swift);
        assert_eq!(swift.evaluate("println(\"no\")").output, swift.advisory());

        let kotlin = StaticScanEvaluator::for_language(LanguageId::Kotlin);
        assert_eq!(kotlin.evaluate("print(\"no\")").output, kotlin.advisory());
    }

    #[test]
    fn test_go_raw_string() {
        let outcome = eval(LanguageId::Go, "fmt.Println(`raw\\n`)");
        assert_eq!(outcome.output, "raw\\n\n");
    }

    #[test]
    fn test_idempotent() {
        let src = "Console.WriteLine(\"x\");\nConsole.WriteLine(\"y\");";
        let a = eval(LanguageId::CSharp, src);
        let b = eval(LanguageId::CSharp, src);
        assert_eq!(a.output, b.output);
        assert_eq!(a.error_message, b.error_message);
    }

    #[test]
    fn test_elapsed_is_measured() {
        let outcome = eval(LanguageId::Python, "print('x')");
        assert!(outcome.elapsed_millis >= 0.0);
    }

    #[test]
    fn test_standard_set_covers_registry() {
        let set = EvaluatorSet::standard();
        assert_eq!(set.len(), list_languages().len());
        for lang in list_languages() {
            assert_eq!(set.get(lang.id).unwrap().language(), lang.id);
        }
        assert!(EvaluatorSet::empty().get(LanguageId::Go).is_none());
    }
}
