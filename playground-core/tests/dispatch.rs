//! End-to-end checks of the dispatch path through the public API.

use std::sync::Arc;
use std::time::Duration;

use playground_core::{
    find_language, list_languages, EngineConfig, EvaluatorSet, ExecutionEngine,
    ExecutionOutcome, ExecutionRequest, LanguageId, LatencyConfig, RunController, RunResult,
    TerminalText,
};

fn engine() -> ExecutionEngine {
    ExecutionEngine::new(EvaluatorSet::standard(), EngineConfig::for_testing())
}

#[tokio::test]
async fn test_every_default_snippet_runs_without_error() {
    let engine = engine();
    for lang in list_languages() {
        let found = find_language(lang.id.as_str()).unwrap();
        let outcome = engine
            .execute(ExecutionRequest::new(found.default_source, lang.id.as_str()))
            .await;
        assert!(
            outcome.error_message.is_none(),
            "{} default snippet failed: {:?}",
            lang.id,
            outcome.error_message
        );
    }
}

#[tokio::test]
async fn test_empty_source_gives_language_advisory() {
    let engine = engine();
    for lang in list_languages() {
        let outcome = engine.execute(ExecutionRequest::new("", lang.id.as_str())).await;
        assert!(outcome.error_message.is_none());
        assert!(
            outcome.output.starts_with("No output detected. Make sure you use "),
            "{}: {:?}",
            lang.id,
            outcome.output
        );
    }
}

#[tokio::test]
async fn test_unregistered_language_ignores_source() {
    let engine = engine();
    for source in ["", "garbage", "print('x')", "\"unterminated"] {
        let outcome = engine
            .execute(ExecutionRequest::new(source, "ruby-not-registered"))
            .await;
        assert_eq!(
            outcome,
            ExecutionOutcome {
                output: String::new(),
                error_message: Some(
                    "Language 'ruby-not-registered' is not supported yet".to_string()
                ),
                elapsed_millis: 0.0,
            }
        );
    }
}

#[tokio::test]
async fn test_kotlin_scenario() {
    let outcome = engine()
        .execute(ExecutionRequest::for_language(
            "fun main() {\n println(\"Hello\")\n println(\"World\")\n}",
            LanguageId::Kotlin,
        ))
        .await;
    assert_eq!(outcome.output, "Hello\nWorld\n");
    assert_eq!(outcome.error_message, None);
}

#[tokio::test]
async fn test_a_before_b_in_every_language() {
    let cases = [
        (LanguageId::JavaScript, "console.log('A');\nconsole.log('B');"),
        (LanguageId::Python, "print('A')\nprint('B')"),
        (LanguageId::Java, "System.out.println(\"A\");\nSystem.out.println(\"B\");"),
        (LanguageId::Cpp, "std::cout << \"A\" << std::endl;\nstd::cout << \"B\" << std::endl;"),
        (LanguageId::CSharp, "Console.WriteLine(\"A\");\nConsole.WriteLine(\"B\");"),
        (LanguageId::C, "printf(\"A\\n\");\nprintf(\"B\\n\");"),
        (LanguageId::Kotlin, "println(\"A\")\nprintln(\"B\")"),
        (LanguageId::Swift, "print(\"A\")\nprint(\"B\")"),
        (LanguageId::Sql, "SELECT 'A';\nSELECT 'B';"),
        (LanguageId::Go, "fmt.Println(\"A\")\nfmt.Println(\"B\")"),
    ];
    let engine = engine();
    for (lang, src) in cases {
        let outcome = engine.execute(ExecutionRequest::for_language(src, lang)).await;
        assert_eq!(outcome.output, "A\nB\n", "{lang}");
    }
}

#[tokio::test]
async fn test_malformed_input_keeps_engine_usable() {
    let engine = engine();
    let bad = engine
        .execute(ExecutionRequest::for_language("Console.WriteLine(\"x", LanguageId::CSharp))
        .await;
    assert!(bad.is_error());
    assert_eq!(bad.output, "");

    let good = engine
        .execute(ExecutionRequest::for_language("Console.WriteLine(\"x\");", LanguageId::CSharp))
        .await;
    assert_eq!(good.output, "x\n");
}

#[tokio::test]
async fn test_concurrent_requests_do_not_interfere() {
    let engine = Arc::new(ExecutionEngine::new(
        EvaluatorSet::standard(),
        EngineConfig {
            latency: LatencyConfig {
                min: Duration::from_millis(1),
                max: Duration::from_millis(40),
            },
            ..EngineConfig::for_testing()
        },
    ));

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let engine = engine.clone();
            tokio::spawn(async move {
                let src = format!("print(\"{i}\")");
                (i, engine.execute(ExecutionRequest::new(src, "python")).await)
            })
        })
        .collect();

    for handle in handles {
        let (i, outcome) = handle.await.unwrap();
        assert_eq!(outcome.output, format!("{i}\n"));
    }
    assert_eq!(engine.stats().requests, 16);
}

#[tokio::test]
async fn test_run_controller_renders_terminal() {
    let ctl = RunController::new(Arc::new(engine()));
    assert_eq!(ctl.terminal().await, TerminalText::idle());

    let result = ctl.run("SELECT 'row';", "sql").await.unwrap();
    let RunResult::Completed(outcome) = result else {
        panic!("expected a completed run");
    };
    assert_eq!(ctl.terminal().await, TerminalText::from_outcome(&outcome));
}
