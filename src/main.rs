//! lightning - GitHub issue ideas in one command
//!
//! Point it at a repository URL; a search-grounded model studies the project
//! and proposes issues you can open with one click.

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use lightning_issues::config::{self, Config};
use lightning_issues::github::{self, RepositoryIdentifier};
use lightning_issues::history::{HistoryEntry, HistoryStore};
use lightning_issues::suggest::llm::{GeminiClient, Model, RetryingClient};
use lightning_issues::suggest::{GenerationRequest, IssueSuggestion};
use lightning_issues::util::truncate;
use lightning_issues::{GenerationError, Generator, Stage};
use serde::Serialize;
use std::io::{self, Write};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Checked before `RUST_LOG`.
const LOG_ENV: &str = "LIGHTNING_LOG";

#[derive(Parser, Debug)]
#[command(
    name = "lightning",
    about = "Turn a GitHub repository URL into ready-to-file issue suggestions",
    version
)]
struct Args {
    /// Show debug logs on stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Research a repository and suggest issues
    Generate(GenerateArgs),
    /// Browse or prune past generations
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
    /// Store a Gemini API key in the system keychain
    Setup,
}

#[derive(ClapArgs, Debug)]
struct GenerateArgs {
    /// Repository URL, e.g. https://github.com/octocat/Hello-World
    url: String,

    /// Project goals at least one suggestion should align with
    #[arg(long)]
    goals: Option<String>,

    /// Look for TODO/FIXME/HACK comments and turn them into issues
    #[arg(long)]
    scan_todos: bool,

    /// Don't record this run in history
    #[arg(long)]
    no_history: bool,

    /// Print suggestions as JSON
    #[arg(long)]
    json: bool,

    /// Model tier (defaults to the configured one)
    #[arg(long, value_enum)]
    model: Option<Model>,
}

#[derive(Subcommand, Debug)]
enum HistoryAction {
    /// List past generations, newest first
    List {
        #[arg(long)]
        json: bool,
    },
    /// Show the suggestions of one generation
    Show {
        id: String,
        #[arg(long)]
        json: bool,
    },
    /// Delete one generation
    Delete { id: String },
    /// Delete every generation
    Clear {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    match run(args.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<GenerationError>() {
                Some(gen_err) => eprintln!("  {}", gen_err.user_message()),
                None => eprintln!("  Error: {:#}", err),
            }
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

async fn run(command: Command) -> Result<()> {
    match command {
        Command::Generate(args) => generate(args).await,
        Command::History { action } => history(action),
        Command::Setup => config::setup_api_key_interactive().map(|_| ()),
    }
}

// ============================================================================
// generate
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SuggestionOut<'a> {
    #[serde(flatten)]
    suggestion: &'a IssueSuggestion,
    issue_url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationOut<'a> {
    repository: &'a RepositoryIdentifier,
    #[serde(skip_serializing_if = "Option::is_none")]
    history_id: Option<&'a str>,
    suggestions: Vec<SuggestionOut<'a>>,
}

fn with_links<'a>(
    repo: &RepositoryIdentifier,
    suggestions: &'a [IssueSuggestion],
) -> Vec<SuggestionOut<'a>> {
    suggestions
        .iter()
        .map(|suggestion| SuggestionOut {
            suggestion,
            issue_url: github::new_issue_url(repo, suggestion),
        })
        .collect()
}

fn report_stage(stage: Stage) {
    match stage {
        Stage::Invoking => {
            eprintln!("  Researching the repository (this can take a minute, Ctrl-C to cancel)...")
        }
        Stage::Extracting => eprintln!("  Reading suggestions..."),
        _ => {}
    }
}

async fn generate(args: GenerateArgs) -> Result<()> {
    let config = Config::load();
    let mut settings = config.client_settings(Config::resolve_api_key());
    if let Some(model) = args.model {
        settings.model = model;
    }
    let client = RetryingClient::new(GeminiClient::new(settings)?, config.max_retries);

    let quiet = args.json;
    let generator = Generator::new(client).with_observer(move |stage| {
        if !quiet {
            report_stage(stage);
        }
    });

    let mut request = GenerationRequest::new(args.url).with_scan_todos(args.scan_todos);
    if let Some(goals) = args.goals {
        request = request.with_goals(goals);
    }

    let cancel = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };
    let result = generator.generate_until(&request, cancel).await?;

    let mut history_id = None;
    if !args.no_history {
        history_id = record(&config, HistoryEntry::from_generation(&request, result.clone()));
    }

    if args.json {
        let out = GenerationOut {
            repository: &result.repository,
            history_id: history_id.as_deref(),
            suggestions: with_links(&result.repository, &result.suggestions),
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if result.suggestions.is_empty() {
        println!();
        println!("  No suggestions for {}. Try again or add goals.", result.repository);
        return Ok(());
    }
    print_suggestions(&result.repository, &result.suggestions);
    if let Some(id) = history_id {
        println!("  Saved to history as {}", id);
        println!();
    }
    Ok(())
}

/// Save a successful run. Failing to save never fails the generation.
fn record(config: &Config, entry: HistoryEntry) -> Option<String> {
    let mut store = match open_history(config) {
        Ok(store) => store,
        Err(err) => {
            tracing::warn!(error = %err, "history unavailable");
            eprintln!("  Warning: Couldn't save to history: {:#}", err);
            return None;
        }
    };
    let id = entry.id.clone();
    match store.add(entry) {
        Ok(_) => Some(id),
        Err(err) => {
            tracing::warn!(error = %err, "failed to save history");
            eprintln!("  Warning: Couldn't save to history: {:#}", err);
            None
        }
    }
}

fn print_suggestions(repo: &RepositoryIdentifier, suggestions: &[IssueSuggestion]) {
    print!("{}", render_suggestions(repo, suggestions));
}

/// Numbered suggestions with their reasoning, body and prefilled issue link.
fn render_suggestions(repo: &RepositoryIdentifier, suggestions: &[IssueSuggestion]) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "\n  {}: {} suggestion{}\n",
        repo,
        suggestions.len(),
        if suggestions.len() == 1 { "" } else { "s" }
    ));
    for (idx, linked) in with_links(repo, suggestions).iter().enumerate() {
        let suggestion = linked.suggestion;
        out.push_str(&format!(
            "\n  {}. [{}] {}\n",
            idx + 1,
            suggestion.kind,
            suggestion.title
        ));
        out.push_str(&format!("     Why: {}\n\n", suggestion.reasoning));
        for line in suggestion.body.lines() {
            out.push_str(&format!("     {}\n", line));
        }
        out.push_str(&format!("\n     Open: {}\n", linked.issue_url));
    }
    out.push('\n');
    out
}

// ============================================================================
// history
// ============================================================================

fn open_history(config: &Config) -> Result<HistoryStore> {
    let path = config
        .history_path()
        .context("Could not determine data directory for history")?;
    Ok(HistoryStore::open(path))
}

fn format_timestamp(entry: &HistoryEntry) -> String {
    entry
        .created_at()
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| entry.timestamp.to_string())
}

fn history(action: HistoryAction) -> Result<()> {
    let config = Config::load();
    let mut store = open_history(&config)?;

    match action {
        HistoryAction::List { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(store.list())?);
                return Ok(());
            }
            if store.is_empty() {
                println!("  No history yet.");
                return Ok(());
            }
            for entry in store.list() {
                let goals = entry
                    .goals
                    .as_deref()
                    .map(|g| format!("  goals: {}", truncate(g, 40)))
                    .unwrap_or_default();
                println!(
                    "  {}  {}  {:<30}  {} suggestion(s){}",
                    entry.id,
                    format_timestamp(entry),
                    entry.repository.to_string(),
                    entry.suggestions.len(),
                    goals
                );
            }
        }
        HistoryAction::Show { id, json } => {
            let entry = store
                .get(&id)
                .with_context(|| format!("No history entry with id {}", id))?;
            if json {
                let out = GenerationOut {
                    repository: &entry.repository,
                    history_id: Some(entry.id.as_str()),
                    suggestions: with_links(&entry.repository, &entry.suggestions),
                };
                println!("{}", serde_json::to_string_pretty(&out)?);
                return Ok(());
            }
            println!();
            println!("  {}  {}", format_timestamp(entry), entry.repository_url);
            if let Some(goals) = &entry.goals {
                println!("  Goals: {}", goals);
            }
            print_suggestions(&entry.repository, &entry.suggestions);
        }
        HistoryAction::Delete { id } => {
            if store.get(&id).is_none() {
                anyhow::bail!("No history entry with id {}", id);
            }
            store.delete(&id)?;
            println!("  Deleted {}", id);
        }
        HistoryAction::Clear { yes } => {
            if store.is_empty() {
                println!("  History is already empty.");
                return Ok(());
            }
            if !yes && !confirm(&format!("Clear all {} history entries?", store.len()))? {
                println!("  Cancelled.");
                return Ok(());
            }
            store.clear()?;
            println!("  History cleared.");
        }
    }
    Ok(())
}

fn confirm(question: &str) -> Result<bool> {
    print!("  {} [y/N] ", question);
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}
