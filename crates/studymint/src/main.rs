use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use studymint_common::logger::{self, LogTarget};
use studymint_common::{AppConfig, LlmSettings, StudyMintError};
use studymint_llm::{provider_chain, Gateway, StudyMode, StudyService, Summarizer};
use tokio_util::sync::CancellationToken;

/// Find project root by looking for .git directory
fn find_project_root() -> Option<PathBuf> {
    let mut current_dir = std::env::current_dir().ok()?;

    loop {
        if current_dir.join(".git").exists() {
            return Some(current_dir);
        }

        if !current_dir.pop() {
            break;
        }
    }

    None
}

/// Load .env file from project root
fn load_dotenv_from_project_root() {
    if let Some(root) = find_project_root() {
        let env_path = root.join(".env");
        if env_path.exists() {
            dotenv::from_path(&env_path).ok();
        }
    } else {
        dotenv::dotenv().ok();
    }
}

#[derive(Parser)]
#[command(name = "studymint")]
#[command(about = "StudyMint - LLM summaries and study material from plain text", long_about = None)]
struct Cli {
    /// Primary LLM provider (overrides LLM_PROVIDER)
    #[arg(long, global = true)]
    provider: Option<String>,

    /// Log to stderr only
    #[arg(long, global = true)]
    no_log_file: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize a text file with map-reduce
    Summarize {
        file: PathBuf,

        /// Document token budget (overrides DOCUMENT_TOKEN_BUDGET)
        #[arg(long)]
        document_tokens: Option<usize>,

        /// Chunk token budget (overrides CHUNK_TOKEN_BUDGET)
        #[arg(long)]
        chunk_tokens: Option<usize>,
    },

    /// Summary, concept map, flashcards, quiz and review list
    Analyze { file: PathBuf },

    /// Mode-specific study material
    Study {
        file: PathBuf,

        /// memorization, contextual_association or interactive_evaluation
        #[arg(long)]
        mode: StudyMode,
    },

    /// Markdown course outline
    Course { file: PathBuf },

    /// Show the provider chain the gateway would use
    Providers,
}

#[derive(Debug, Serialize)]
struct ProviderReport {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    base_url: Option<String>,
    ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    problem: Option<String>,
}

fn provider_report(settings: &LlmSettings) -> Vec<ProviderReport> {
    provider_chain(settings)
        .into_iter()
        .map(|slot| match slot.kind {
            Ok(kind) => {
                let provider = kind.settings(settings);
                let missing_key = kind.requires_api_key() && provider.api_key.is_none();
                ProviderReport {
                    name: kind.to_string(),
                    model: Some(provider.model.clone()),
                    base_url: Some(provider.base_url.clone()),
                    ready: !missing_key,
                    problem: missing_key.then(|| format!("{} is not set", kind.api_key_var())),
                }
            }
            Err(e) => ProviderReport {
                name: slot.name,
                model: None,
                base_url: None,
                ready: false,
                problem: Some(e.to_string()),
            },
        })
        .collect()
}

/// Read an input file, refusing anything over the upload limit
async fn read_input(path: &Path, max_bytes: u64) -> Result<String> {
    let size = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("Cannot open {}", path.display()))?
        .len();
    if size > max_bytes {
        return Err(StudyMintError::invalid_input(format!(
            "{} is {} bytes, the limit is {} bytes",
            path.display(),
            size,
            max_bytes
        ))
        .into());
    }

    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("{} is not valid UTF-8 text", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load environment variables from .env at project root
    load_dotenv_from_project_root();

    if let Some(provider) = &cli.provider {
        std::env::set_var("LLM_PROVIDER", provider);
    }

    let config = AppConfig::from_env()?;

    let target = if cli.no_log_file {
        LogTarget::Console
    } else {
        LogTarget::ConsoleAndFile(config.log_dir.clone())
    };
    logger::init(&config, target)?;

    tracing::info!("StudyMint starting...");
    tracing::debug!("Log file: {}", config.get_log_path(logger::LOG_FILE_NAME).display());
    tracing::info!(
        "Budgets: document {} tokens, chunk {} tokens, concurrency {}",
        config.budgets.document_tokens,
        config.budgets.chunk_tokens,
        config.budgets.map_concurrency
    );

    let gateway = Arc::new(Gateway::from_env()?);
    let summarizer = Arc::new(Summarizer::new(gateway, config.budgets));

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, cancelling the current request");
                cancel.cancel();
            }
        });
    }

    match cli.command {
        Commands::Summarize {
            file,
            document_tokens,
            chunk_tokens,
        } => {
            let text = read_input(&file, config.max_upload_bytes).await?;
            let summary = summarizer
                .summarize_document_with(
                    &text,
                    document_tokens.unwrap_or(config.budgets.document_tokens),
                    chunk_tokens.unwrap_or(config.budgets.chunk_tokens),
                    &cancel,
                )
                .await?;
            print_json(&summary)?;
        }
        Commands::Analyze { file } => {
            let text = read_input(&file, config.max_upload_bytes).await?;
            let output = StudyService::new(summarizer).analyze(&text, &cancel).await?;
            print_json(&output)?;
        }
        Commands::Study { file, mode } => {
            let text = read_input(&file, config.max_upload_bytes).await?;
            let output = StudyService::new(summarizer).study(&text, mode, &cancel).await?;
            print_json(&output)?;
        }
        Commands::Course { file } => {
            let text = read_input(&file, config.max_upload_bytes).await?;
            let output = StudyService::new(summarizer).course(&text, &cancel).await?;
            print_json(&output)?;
        }
        Commands::Providers => {
            print_json(&provider_report(&config.llm))?;
        }
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

        let cli = Cli::try_parse_from(["studymint", "study", "notes.txt", "--mode", "memorization"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Study {
                mode: StudyMode::Memorization,
                ..
            }
        ));
        assert!(Cli::try_parse_from(["studymint", "study", "notes.txt", "--mode", "cramming"]).is_err());
    }

    #[test]
    fn test_provider_report_flags_missing_key() {
        let settings = LlmSettings {
            provider: "openai".to_string(),
            fallback_provider: Some("mystery".to_string()),
            ..Default::default()
        };
        let report = provider_report(&settings);

        assert_eq!(report.len(), 2);
        assert_eq!(report[0].name, "openai");
        assert!(!report[0].ready);
        assert_eq!(report[0].problem.as_deref(), Some("OPENAI_API_KEY is not set"));
        assert_eq!(report[1].name, "mystery");
        assert!(report[1].problem.is_some());
    }

    #[tokio::test]
    async fn test_read_input_enforces_limit() {
        let path = std::env::temp_dir().join(format!("studymint-input-{}.txt", std::process::id()));
        std::fs::write(&path, "twelve bytes").unwrap();

        assert_eq!(read_input(&path, 12).await.unwrap(), "twelve bytes");
        let err = read_input(&path, 11).await.unwrap_err();
        assert!(err.to_string().contains("limit"));

        std::fs::remove_file(&path).ok();
    }
}
