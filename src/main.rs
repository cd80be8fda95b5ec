//! Memoria - Personal memory assistant
//!
//! Command-line entry point: HTTP gateway, one-shot ingest and
//! classification, key generation and configuration display.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use memoria::{
    classifier::Classifier,
    config::{MemoriaConfig, StorageBackend},
    crypto::EncryptionKey,
    gateway,
    memory::Id,
    router::IngestRequest,
    AssistantBuilder,
};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "memoria")]
#[command(version)]
#[command(about = "Personal memory assistant with intent routing and encrypted recall")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "MEMORIA_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Route one message and print the result
    Ingest {
        /// Owner id
        #[arg(short, long, default_value = "1")]
        user: i64,

        /// Message text
        text: String,
    },

    /// Classify a message without acting on it
    Classify {
        /// Use keyword rules only
        #[arg(long)]
        offline: bool,

        /// Message text
        text: String,
    },

    /// Print a fresh encryption key
    Keygen,

    /// Show configuration
    Config {
        /// Show default configuration
        #[arg(long)]
        default: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json_logs);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { host, port } => {
            let host = host.unwrap_or_else(|| config.gateway.host.clone());
            let port = port.unwrap_or(config.gateway.port);
            run_serve(config, host, port).await?;
        }
        Commands::Ingest { user, text } => {
            run_ingest(config, Id(user), text).await?;
        }
        Commands::Classify { offline, text } => {
            run_classify(config, offline, &text).await?;
        }
        Commands::Keygen => {
            println!("{}", EncryptionKey::generate().to_hex());
        }
        Commands::Config { default } => {
            let shown = if default { MemoriaConfig::default() } else { config };
            println!("{}", toml::to_string_pretty(&shown)?);
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool, json: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("memoria={},tower_http=info", level).into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Explicit path first, then the per-user config file if present.
fn load_config(path: Option<&std::path::Path>) -> Result<MemoriaConfig> {
    if let Some(path) = path {
        return MemoriaConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()));
    }

    let default_path = dirs_next::config_dir().map(|p| p.join("memoria").join("config.toml"));
    match default_path {
        Some(path) if path.exists() => {
            tracing::debug!(path = %path.display(), "Using per-user config");
            Ok(MemoriaConfig::from_file(&path)?)
        }
        _ => Ok(MemoriaConfig::default()),
    }
}

fn build_assistant(config: MemoriaConfig) -> Result<memoria::Assistant> {
    let key_env = config.crypto.key_env.clone();
    AssistantBuilder::new().config(config).build().with_context(|| {
        format!(
            "Failed to start assistant (is {} set to a 64-char hex key? `memoria keygen` prints one)",
            key_env
        )
    })
}

async fn run_serve(config: MemoriaConfig, host: String, port: u16) -> Result<()> {
    let assistant = build_assistant(config)?;
    tracing::info!("Memoria is running. Press Ctrl+C to stop.");
    gateway::serve(assistant, &host, port, gateway::ctrl_c()).await?;
    Ok(())
}

async fn run_ingest(config: MemoriaConfig, owner: Id, text: String) -> Result<()> {
    let assistant = build_assistant(config)?;
    let response = assistant
        .router()
        .ingest(IngestRequest::text(owner, text))
        .await?;
    println!("{}", response.summary);
    println!("{}", serde_json::to_string_pretty(&response)?);
    assistant.shutdown().await;
    Ok(())
}

async fn run_classify(mut config: MemoriaConfig, offline: bool, text: &str) -> Result<()> {
    let intent = if offline {
        Classifier::offline().classify(text).await
    } else {
        // Classification never touches stored text: throwaway key, no database.
        config.storage.backend = StorageBackend::Memory;
        let assistant = AssistantBuilder::new()
            .config(config)
            .key(EncryptionKey::generate())
            .build()?;
        let intent = assistant.classifier().classify(text).await;
        assistant.shutdown().await;
        intent
    };
    println!("{}", serde_json::to_string_pretty(&intent)?);
    Ok(())
}
