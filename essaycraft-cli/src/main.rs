//! # essaycraft CLI
//!
//! Command-line interface for the essay agent.
//!
//! Usage:
//!   essaycraft write <TOPIC>... [-r N]
//!   essaycraft resume <SESSION>
//!   essaycraft sessions
//!   essaycraft show <SESSION>
//!
//! Examples:
//!   essaycraft write "The history of the printing press"
//!   essaycraft write -r 3 Why do cats purr
//!   essaycraft --store file sessions

use clap::{Parser, Subcommand, ValueEnum};
use essaycraft_agent::{Transcript, Workflow, WorkflowConfig};
use essaycraft_core::error::{self, Result};
use essaycraft_core::{
    CheckpointStore, ConfiguredProvider, LlmProvider, RunStatus, SearchProvider, Settings,
    TavilyProvider,
};
use futures_util::StreamExt;
use std::io::Write;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "essaycraft")]
#[command(author, version, about = "essaycraft - plan, research, draft and revise essays")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Where checkpoints are kept
    #[arg(long, global = true, value_enum, default_value_t = StoreKind::Sqlite)]
    store: StoreKind,

    /// SQLite database for the sqlite store
    #[arg(long, global = true, env = "ESSAYCRAFT_CHECKPOINT_DB")]
    checkpoint_db: Option<PathBuf>,

    /// Directory for the file store
    #[arg(long, global = true, default_value = ".essaycraft_sessions")]
    session_dir: PathBuf,

    /// Show debug logs on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode - only print the final essay
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write an essay on a topic
    Write {
        /// The essay topic
        #[arg(required = true, num_args = 1..)]
        topic: Vec<String>,

        /// Revisions after the first draft
        #[arg(short = 'r', long, default_value_t = 1, allow_negative_numbers = true)]
        max_revisions: i64,
    },
    /// Continue a failed or interrupted run
    Resume {
        /// Session ID printed when the run was created
        session: String,
    },
    /// List stored sessions
    Sessions,
    /// Show the state of a session
    Show {
        session: String,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum StoreKind {
    Sqlite,
    File,
    Memory,
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if verbose {
        tracing_subscriber::EnvFilter::new("info,essaycraft_core=debug,essaycraft_agent=debug")
    } else if quiet {
        tracing_subscriber::EnvFilter::new("error")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
    };

    // stdout carries the essay only
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn open_store(cli: &Cli, settings: &Settings) -> Result<CheckpointStore> {
    match cli.store {
        StoreKind::Sqlite => {
            let path = cli.checkpoint_db.as_ref().unwrap_or(&settings.checkpoint_db);
            CheckpointStore::sqlite(path)
        }
        StoreKind::File => CheckpointStore::file(&cli.session_dir),
        StoreKind::Memory => Ok(CheckpointStore::in_memory()),
    }
}

fn build_workflow(
    settings: &Settings,
    store: CheckpointStore,
) -> Result<Workflow<ConfiguredProvider, TavilyProvider>> {
    let provider = ConfiguredProvider::from_config(settings.provider_config()?)
        .map_err(|e| error::from_provider("model", e))?;
    let search = TavilyProvider::new(settings.tavily_api_key()?)
        .map_err(|e| error::from_provider("search", e))?;

    tracing::debug!(
        provider = provider.name(),
        model = provider.default_model(),
        store = store.backend_name(),
        "workflow ready"
    );
    Ok(Workflow::with_config(
        provider,
        search,
        store,
        WorkflowConfig::from_settings(settings),
    ))
}

/// Stream a session to stdout, one block per step
async fn stream_session<P: LlmProvider, S: SearchProvider>(
    workflow: &Workflow<P, S>,
    session_id: &str,
    quiet: bool,
) -> Result<()> {
    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\nInterrupted - abandoning the current step");
                cancel.cancel();
            }
        })
    };

    let stream = workflow.stream_run_with_cancel(session_id, cancel);
    futures_util::pin_mut!(stream);

    let mut transcript = Transcript::new();
    let mut outcome = Ok(());
    while let Some(item) = stream.next().await {
        let block = match item {
            Ok(event) => transcript.push(&event),
            Err(e) => {
                let block = transcript.fail(&e);
                outcome = Err(e);
                block
            }
        };
        if !quiet {
            print!("{}", block);
            let _ = std::io::stdout().flush();
        }
    }
    ctrl_c.abort();

    match &outcome {
        Ok(()) if quiet => {
            let checkpoint = workflow.checkpoint(session_id)?;
            println!("{}", checkpoint.state.draft);
        }
        Ok(()) => {}
        Err(_) => {
            if let Ok(checkpoint) = workflow.checkpoint(session_id) {
                if matches!(checkpoint.status, RunStatus::Failed | RunStatus::Cancelled) {
                    eprintln!("Resume with: essaycraft resume {}", session_id);
                }
            }
        }
    }
    outcome
}

fn list_sessions(store: &CheckpointStore) -> Result<()> {
    let ids = store.list()?;
    if ids.is_empty() {
        println!("(no sessions found)");
        return Ok(());
    }

    println!("Sessions in {} store:", store.backend_name());
    for id in ids {
        let checkpoint = match store.load(&id) {
            Ok(checkpoint) => checkpoint,
            Err(e) => {
                tracing::warn!(session_id = %id, error = %e, "skipping unreadable checkpoint");
                continue;
            }
        };
        println!(
            "  {}  {:<9}  rev {}/{}  next {:<17}  {}",
            checkpoint.session_id,
            checkpoint.status,
            checkpoint.state.revision_number,
            checkpoint.state.max_revisions,
            checkpoint.next,
            truncate(&checkpoint.state.task, 50)
        );
    }
    Ok(())
}

fn show_session(store: &CheckpointStore, session_id: &str) -> Result<()> {
    let checkpoint = store.load(session_id)?;
    let state = &checkpoint.state;

    println!("Session:   {}", checkpoint.session_id);
    println!("Topic:     {}", state.task);
    println!("Status:    {}", checkpoint.status);
    println!("Revisions: {}/{}", state.revision_number, state.max_revisions);
    println!("Next step: {}", checkpoint.next);
    println!("Research:  {} snippets", state.content.len());
    if let Some(err) = &checkpoint.last_error {
        println!("Error:     {}", err);
    }

    for (title, text) in [("Plan", &state.plan), ("Critique", &state.critique), ("Draft", &state.draft)] {
        if !text.is_empty() {
            println!("\n### {}\n{}", title, text);
        }
    }
    Ok(())
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars).collect();
        format!("{}…", head)
    }
}

async fn run(cli: Cli) -> Result<()> {
    let settings = Settings::load()?;
    let store = open_store(&cli, &settings)?;

    match cli.command {
        Commands::Sessions => list_sessions(&store),
        Commands::Show { session } => show_session(&store, &session),
        Commands::Write { topic, max_revisions } => {
            let workflow = build_workflow(&settings, store)?;
            let session_id = workflow.start_run(&topic.join(" "), max_revisions)?;
            if !cli.quiet {
                eprintln!("Session: {}\n", session_id);
            }
            stream_session(&workflow, &session_id, cli.quiet).await
        }
        Commands::Resume { session } => {
            let workflow = build_workflow(&settings, store)?;
            stream_session(&workflow, &session, cli.quiet).await
        }
    }
}

#[tokio::main]
async fn main() {
    // Let clap's env fallbacks see .env values
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    let verbose = cli.verbose;
    init_logging(verbose, cli.quiet);

    if let Err(e) = run(cli).await {
        if verbose {
            eprintln!("Error: {:?}", e);
        } else {
            eprintln!("Error: {}", e);
        }
        std::process::exit(1);
    }
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
    fn test_parse_write() {
        let cli = Cli::try_parse_from(["essaycraft", "write", "-r", "3", "Why", "cats", "purr"]).unwrap();
        match cli.command {
            Commands::Write { topic, max_revisions } => {
                assert_eq!(topic.join(" "), "Why cats purr");
                assert_eq!(max_revisions, 3);
            }
            _ => panic!("expected write"),
        }
        assert_eq!(cli.store, StoreKind::Sqlite);
    }

    #[test]
    fn test_parse_write_flag_after_topic() {
        let cli = Cli::try_parse_from(["essaycraft", "write", "Why", "cats", "purr", "-r", "3"]).unwrap();
        match cli.command {
            Commands::Write { topic, max_revisions } => {
                assert_eq!(topic, vec!["Why", "cats", "purr"]);
                assert_eq!(max_revisions, 3);
            }
            _ => panic!("expected write"),
        }

        let cli = Cli::try_parse_from(["essaycraft", "write", "Tea", "--max-revisions", "0"]).unwrap();
        assert!(matches!(cli.command, Commands::Write { max_revisions: 0, .. }));
    }

    #[test]
    fn test_parse_global_store() {
        let cli = Cli::try_parse_from(["essaycraft", "sessions", "--store", "memory"]).unwrap();
        assert!(matches!(cli.command, Commands::Sessions));
        assert_eq!(cli.store, StoreKind::Memory);

        assert!(Cli::try_parse_from(["essaycraft", "write"]).is_err());
        assert!(Cli::try_parse_from(["essaycraft", "-v", "-q", "sessions"]).is_err());
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc…");
    }

    #[test]
    fn test_sessions_skip_stray_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::file(dir.path()).unwrap();
        std::fs::write(dir.path().join("notes.json"), "{\"todo\": []}").unwrap();
        assert_eq!(store.list().unwrap(), vec!["notes"]);
        assert!(list_sessions(&store).is_ok());
    }

    #[test]
    fn test_sessions_on_empty_store() {
        let store = CheckpointStore::in_memory();
        assert!(list_sessions(&store).is_ok());
        assert_eq!(
            show_session(&store, "missing").unwrap_err().kind(),
            essaycraft_core::ErrorKind::StateNotFound
        );
    }
}
