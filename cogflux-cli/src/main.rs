//! Cogflux CLI - Command-line tools for the tri-layer memory manager

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cogflux_core::prelude::*;

#[derive(Parser)]
#[command(name = "cogflux")]
#[command(about = "Cogflux tri-layer memory manager CLI", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to cogflux.toml plus COGFLUX_* variables)
    #[arg(short, long, global = true, env = "COGFLUX_CONFIG_PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an append workload against an in-memory archive
    Simulate {
        /// Agent ID
        #[arg(short, long, default_value = "sim-agent")]
        agent: String,
        /// Hot token budget (configured default when omitted)
        #[arg(long)]
        max_tokens: Option<usize>,
        /// Number of messages to append
        #[arg(short, long, default_value_t = 50)]
        messages: usize,
        /// Tokens per message
        #[arg(short, long, default_value_t = 500)]
        tokens: usize,
        /// Query to load context for once the workload is done
        #[arg(short, long)]
        query: Option<String>,
    },
    /// Print the effective configuration
    Config,
    /// Version information
    Version,
}

fn load_config(path: Option<&PathBuf>) -> Result<FluxConfig> {
    let config = match path {
        Some(path) => FluxConfig::from_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => FluxConfig::load()?,
    };
    Ok(config)
}

async fn simulate(
    config: FluxConfig,
    agent: &str,
    max_tokens: Option<usize>,
    messages: usize,
    tokens: usize,
    query: Option<&str>,
) -> Result<()> {
    let max_tokens = max_tokens.unwrap_or(config.hot.default_max_tokens);
    let flux = CognitiveFluxOrchestrator::builder()
        .config(config)
        .cold_archive(std::sync::Arc::new(InMemoryColdArchive::new()))
        .build()?;
    flux.start_monitor().await;

    flux.initialize(agent, "simulation", max_tokens).await?;
    flux.set_active_agent(agent).await?;

    let mut archives = 0;
    for i in 0..messages {
        let role = if i % 2 == 0 {
            MessageRole::User
        } else {
            MessageRole::Assistant
        };
        let message = HotMessage::new(role, format!("simulated message {}", i), tokens);
        let outcome = flux.append_message(agent, message).await?;
        if outcome.archive.is_some() {
            archives += 1;
        }
    }
    tracing::info!(messages, archives, "Workload complete");

    if let Some(query) = query {
        let context = flux.execute_flux(agent, Some(query)).await?;
        tracing::info!(
            query,
            summaries = context.summaries.len(),
            total_tokens = context.total_tokens,
            "Loaded context"
        );
    }

    flux.shutdown().await;
    let metrics = flux.metrics().await;
    println!("{}", serde_json::to_string_pretty(&metrics)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Version => {
            println!("cogflux {}", env!("CARGO_PKG_VERSION"));
            println!("cogflux-core {}", cogflux_core::VERSION);
        }
        Commands::Config => {
            let config = load_config(cli.config.as_ref())?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::Simulate {
            agent,
            max_tokens,
            messages,
            tokens,
            query,
        } => {
            let config = load_config(cli.config.as_ref())?;
            simulate(config, &agent, max_tokens, messages, tokens, query.as_deref()).await?;
        }
    }

    Ok(())
}
