//! `playground` — terminal front end for the code playground.

mod demo;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use playground_core::{
    list_languages, EngineConfig, EvaluatorSet, ExecutionEngine, LanguageId, LatencyConfig,
    RunController, RunResult, TerminalText,
};

#[derive(Parser)]
#[command(name = "playground")]
#[command(about = "Evaluate snippets and try out shared editing rooms")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List supported languages
    Languages {
        /// Print the catalog as JSON
        #[arg(long)]
        json: bool,
    },
    /// Evaluate a source file
    Run {
        /// Path to the source file
        file: PathBuf,
        /// Language id; inferred from the file extension when omitted
        #[arg(long, short)]
        language: Option<String>,
        #[command(flatten)]
        exec: ExecArgs,
    },
    /// Evaluate inline code
    Eval {
        /// The code to evaluate
        code: String,
        /// Language id
        #[arg(long, short, default_value = "javascript")]
        language: String,
        #[command(flatten)]
        exec: ExecArgs,
    },
    /// Simulate several participants editing in one room
    RoomDemo {
        /// Room to join; a fresh id is generated when omitted
        #[arg(long)]
        room: Option<String>,
        /// Number of participants
        #[arg(long, default_value_t = 2)]
        participants: usize,
        /// Language everyone edits in
        #[arg(long, default_value = "python")]
        language: String,
    },
}

#[derive(clap::Args)]
struct ExecArgs {
    /// Skip the simulated round-trip delay
    #[arg(long)]
    no_latency: bool,
    /// Print the raw outcome as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Languages { json } => print_languages(json),
        Commands::Run {
            file,
            language,
            exec,
        } => run_file(&file, language.as_deref(), &exec).await,
        Commands::Eval {
            code,
            language,
            exec,
        } => execute(&code, &language, &exec).await,
        Commands::RoomDemo {
            room,
            participants,
            language,
        } => demo::run(room.as_deref(), participants, &language).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn print_languages(json: bool) -> Result<()> {
    let catalog = list_languages();
    if json {
        println!("{}", serde_json::to_string_pretty(catalog)?);
        return Ok(());
    }
    for descriptor in catalog {
        println!("{:<12} {}", descriptor.id.as_str(), descriptor.display_name);
    }
    Ok(())
}

/// Language for a file extension.
fn language_for_path(path: &Path) -> Option<LanguageId> {
    let language = match path.extension()?.to_str()? {
        "js" | "mjs" => LanguageId::JavaScript,
        "py" => LanguageId::Python,
        "java" => LanguageId::Java,
        "cpp" | "cc" | "cxx" | "hpp" => LanguageId::Cpp,
        "cs" => LanguageId::CSharp,
        "c" | "h" => LanguageId::C,
        "kt" | "kts" => LanguageId::Kotlin,
        "swift" => LanguageId::Swift,
        "sql" => LanguageId::Sql,
        "go" => LanguageId::Go,
        _ => return None,
    };
    Some(language)
}

async fn run_file(file: &Path, language: Option<&str>, exec: &ExecArgs) -> Result<()> {
    let source = fs::read_to_string(file)
        .with_context(|| format!("reading {}", file.display()))?;
    let language = match language {
        Some(id) => id.to_string(),
        None => match language_for_path(file) {
            Some(id) => id.as_str().to_string(),
            None => bail!(
                "cannot infer a language for {}; pass --language",
                file.display()
            ),
        },
    };
    log::info!("Running {} as {language}", file.display());
    execute(&source, &language, exec).await
}

async fn execute(source: &str, language: &str, exec: &ExecArgs) -> Result<()> {
    let mut config = EngineConfig::default();
    if exec.no_latency {
        config.latency = LatencyConfig::none();
    }
    let engine = Arc::new(ExecutionEngine::new(EvaluatorSet::standard(), config));
    let controller = RunController::new(engine);

    if !exec.json {
        eprintln!("{}", TerminalText::pending());
    }
    let outcome = match controller.run(source, language).await? {
        RunResult::Completed(outcome) => outcome,
        other => bail!("run did not complete: {other:?}"),
    };

    if exec.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!("{}", controller.terminal().await);
    }
    if outcome.is_error() {
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_language_for_path() {
        assert_eq!(language_for_path(Path::new("a/b.py")), Some(LanguageId::Python));
        assert_eq!(language_for_path(Path::new("main.kt")), Some(LanguageId::Kotlin));
        assert_eq!(language_for_path(Path::new("query.sql")), Some(LanguageId::Sql));
        assert_eq!(language_for_path(Path::new("x.rb")), None);
        assert_eq!(language_for_path(Path::new("Makefile")), None);
    }

    #[test]
    fn test_parse_eval_args() {
        let cli = Cli::parse_from(["playground", "eval", "print(1)", "-l", "python", "--no-latency"]);
        match cli.command {
            Commands::Eval { code, language, exec } => {
                assert_eq!(code, "print(1)");
                assert_eq!(language, "python");
                assert!(exec.no_latency);
                assert!(!exec.json);
            }
            _ => panic!("expected eval"),
        }
    }
}
