//! # rag-sentinel CLI (`sentinel`)
//!
//! ## Usage
//!
//! ```bash
//! sentinel --config ./config/sentinel.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `sentinel serve` | Watch the document source and serve queries over HTTP |
//! | `sentinel ask "<query>"` | Index the current documents and answer one query |
//! | `sentinel check-config` | Validate the configuration and print a summary |

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rag_sentinel::config::{load_config, Config};
use rag_sentinel::error::SentinelError;
use rag_sentinel::ingest::{document_channel, scan_once, Indexer, SourceWatcher};
use rag_sentinel::logging::init_logging;
use rag_sentinel::pipeline::build_services_from_config;
use rag_sentinel::server::{run_server, AppState};
use rag_sentinel_core::prompt::format_result;
use std::path::PathBuf;
use tracing::{error, info};

/// rag-sentinel: answers questions from a live document stream and alerts
/// when a watched answer changes.
#[derive(Parser)]
#[command(name = "sentinel", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/sentinel.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the source watcher, the indexer and the HTTP server.
    Serve {
        /// Override `[server].bind`.
        #[arg(long)]
        bind: Option<String>,
    },

    /// Index the documents currently in the source and answer one query.
    ///
    /// Alerting runs before the command exits, so a watched query still
    /// notifies on a single-shot run.
    Ask {
        query: String,

        #[arg(long, default_value = "")]
        user: String,
    },

    /// Load and validate the configuration.
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    init_logging(&config.logging)?;

    match cli.command {
        Commands::Serve { bind } => serve(config, bind).await,
        Commands::Ask { query, user } => ask(&config, &user, &query).await,
        Commands::CheckConfig => {
            print_summary(&config);
            Ok(())
        }
    }
}

async fn serve(mut config: Config, bind: Option<String>) -> Result<()> {
    if let Some(bind) = bind {
        config.server.bind = bind;
    }
    let services = build_services_from_config(&config).await?;

    let (tx, rx) = document_channel();
    let watcher = SourceWatcher::new(&config.source, services.stats.clone())?;
    let indexer = Indexer::new(
        services.embedder.clone(),
        services.index.clone(),
        config.embedding.batch_size,
        services.stats.clone(),
    );

    let watcher_task = tokio::spawn(watcher.run(tx.clone()));
    let indexer_task = tokio::spawn(indexer.run(rx));

    let mut fatal = services.pipeline.fatal_errors();

    let state = AppState {
        pipeline: services.pipeline.clone(),
        documents: tx,
    };

    tokio::select! {
        res = run_server(&config.server.bind, state) => res,
        res = indexer_task => {
            let res = res.context("indexer task panicked")?;
            error!("indexer stopped");
            res.map_err(anyhow::Error::from)
        }
        res = watcher_task => {
            res.context("watcher task panicked")?
        }
        res = fatal.wait_for(|e| e.is_some()) => {
            let message = res.ok().and_then(|e| e.clone()).unwrap_or_default();
            error!(error = %message, "stopping on configuration error");
            Err(SentinelError::Configuration(message).into())
        }
    }
}

async fn ask(config: &Config, user: &str, query: &str) -> Result<()> {
    let services = build_services_from_config(config).await?;

    let records = scan_once(&config.source, services.stats.clone())?;
    let indexer = Indexer::new(
        services.embedder.clone(),
        services.index.clone(),
        config.embedding.batch_size,
        services.stats.clone(),
    );
    let indexed = indexer.index_records(&records).await?;
    info!(documents = indexed, "indexed source snapshot");

    let answer = services.pipeline.answer(user, query).await?;
    if let Err(e) = services.pipeline.watcher().observe(&answer).await {
        error!(error = %e, "dedup baseline store failed");
    }

    println!("{}", format_result(&answer.response, answer.alert_enabled));
    info!(stats = ?services.stats.snapshot(), "done");
    Ok(())
}

fn print_summary(config: &Config) {
    println!("config ok");
    println!("  source:     {}", config.source.path.display());
    println!("  bind:       {}", config.server.bind);
    println!(
        "  embedding:  {} {} ({} dims)",
        config.embedding.provider, config.embedding.model, config.embedding.dims
    );
    println!(
        "  chat:       {} {} (max_tokens {}, temperature {})",
        config.chat.provider, config.chat.model, config.chat.max_tokens, config.chat.temperature
    );
    println!(
        "  retrieval:  k={} metric={}",
        config.retrieval.k, config.retrieval.metric
    );
    println!("  alerts:     {}", config.alerts.sink);
    println!("  dedup:      {}", config.dedup.store);
}
