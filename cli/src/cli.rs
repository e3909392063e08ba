use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::info;

use replykit_conversations::{ConversationStore, ImportProgress, IncomingRecord, StoreError};
use replykit_suggestions::{
    ChatTurn, SuggestionConfig, SuggestionKind, SuggestionRequest, SuggestionService,
    default_config_path,
};

#[derive(Parser)]
#[command(name = "replykit")]
#[command(about = "Reply suggestions grounded in your past conversations")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Suggest replies to a fan message
    Suggest {
        /// The message to reply to
        message: String,
        /// JSON file with earlier turns: [{"role": "user"|"assistant", "content": "..."}]
        #[arg(long)]
        history: Option<PathBuf>,
        /// Ask for suggestions different from the last ones
        #[arg(long)]
        regenerate: bool,
        /// Print suggestions as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show stored conversations similar to a message
    Similar {
        /// The message to look up
        message: String,
    },
    /// Import conversations from a JSON file
    Import {
        /// JSON array of conversations, or an object with a "conversations" array
        file: PathBuf,
    },
    /// Remove all stored conversations
    Clear,
    /// Show store statistics
    Stats,
}

/// Load the configuration from `path`, or from the default location.
pub fn load_config(path: Option<&Path>) -> Result<SuggestionConfig> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => match default_config_path() {
            Some(path) => path,
            None => {
                return Ok(SuggestionConfig::default()
                    .with_env_fallback(std::env::var(replykit_suggestions::config::API_KEY_ENV).ok()));
            }
        },
    };
    Ok(SuggestionConfig::load(&path)?)
}

pub async fn handle_command(command: Commands, config: SuggestionConfig) -> Result<()> {
    let service = SuggestionService::from_config(config).await?;
    let store = service
        .store()
        .cloned()
        .ok_or_else(|| anyhow!("no conversation store configured"))?;

    let result = match command {
        Commands::Suggest {
            message,
            history,
            regenerate,
            json,
        } => suggest(&service, message, history, regenerate, json).await,
        Commands::Similar { message } => similar(&store, &message).await,
        Commands::Import { file } => import(&store, &file).await,
        Commands::Clear => clear(&store).await,
        Commands::Stats => stats(&store).await,
    };

    // The runtime goes away when we return; let pending writes finish.
    service.drain().await;
    result
}

async fn clear(store: &ConversationStore) -> Result<()> {
    store.clear().await?;
    println!("Cleared all stored conversations.");
    Ok(())
}

async fn suggest(
    service: &SuggestionService,
    message: String,
    history: Option<PathBuf>,
    regenerate: bool,
    json: bool,
) -> Result<()> {
    let history = match history {
        Some(path) => read_history(&path).await?,
        None => Vec::new(),
    };

    let mut request = SuggestionRequest::new(message).with_history(history);
    if regenerate {
        request = request.regenerate();
    }

    let cancel = cancel_on_ctrl_c();
    let suggestions = match service.suggest_with_cancel(&request, &cancel).await {
        Ok(suggestions) => suggestions,
        Err(e) => {
            let report = e.report();
            bail!("{:?}: {}", report.kind, report.message);
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&suggestions)?);
        return Ok(());
    }

    for (i, suggestion) in suggestions.iter().enumerate() {
        let label = match suggestion.kind {
            SuggestionKind::Single => "single",
            SuggestionKind::Multi => "multi",
        };
        println!("{}. [{label}]", i + 1);
        for message in &suggestion.messages {
            println!("   {message}");
        }
    }
    Ok(())
}

async fn similar(store: &ConversationStore, message: &str) -> Result<()> {
    let examples = store.query(message).await;
    if examples.is_empty() {
        println!("No similar conversations found.");
        return Ok(());
    }

    for example in examples {
        println!("{:.3}  {}", example.similarity, example.record.fan_message);
        for response in &example.record.creator_responses {
            println!("       -> {response}");
        }
    }
    Ok(())
}

async fn import(store: &Arc<ConversationStore>, file: &Path) -> Result<()> {
    let content = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;
    let records = parse_import(&content)?;
    info!("Read {} conversations from {}", records.len(), file.display());

    let cancel = cancel_on_ctrl_c();
    let result = store
        .bulk_merge(records, print_progress, &cancel)
        .await;
    eprintln!();

    match result {
        Ok(summary) => {
            println!(
                "Imported {} conversations ({} embedded, {} skipped as already stored, {} dropped). Store now holds {}.",
                summary.imported_count,
                summary.embedded_count,
                summary.superseded_count,
                summary.dropped_count,
                summary.total_conversations
            );
            Ok(())
        }
        Err(StoreError::Cancelled { processed, total }) => {
            println!("Import cancelled after {processed} of {total} embeddings; nothing was saved.");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

async fn stats(store: &ConversationStore) -> Result<()> {
    let stats = store.stats().await;
    println!("Conversations: {} / {}", stats.conversations, stats.capacity);
    if let Some(path) = store.path() {
        println!("File:          {}", path.display());
    }
    if let Some(oldest) = stats.oldest_timestamp {
        println!("Oldest:        {}", format_timestamp(oldest));
    }
    if let Some(newest) = stats.newest_timestamp {
        println!("Newest:        {}", format_timestamp(newest));
    }
    Ok(())
}

fn print_progress(progress: ImportProgress) {
    eprint!("\r{} ({}%)", progress.status_text, progress.percent);
}

fn format_timestamp(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| millis.to_string())
}

/// Cancel the returned token on the first Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });
    cancel
}

async fn read_history(path: &Path) -> Result<Vec<ChatTurn>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("invalid history in {}", path.display()))
}

/// Accept a bare array or `{"conversations": [...]}`.
pub fn parse_import(content: &str) -> Result<Vec<IncomingRecord>> {
    let value: Value = serde_json::from_str(content).context("import file is not valid JSON")?;
    let items = match value {
        Value::Array(_) => value,
        Value::Object(mut map) => map
            .remove("conversations")
            .ok_or_else(|| anyhow!("expected an array or a \"conversations\" field"))?,
        _ => bail!("expected an array or a \"conversations\" field"),
    };
    serde_json::from_value(items).context("invalid conversation records")
}
