//! Chainwatch - Portfolio Rule Engine CLI
//!
//! This is the main entry point for running the evaluation scheduler and for
//! one-off operator commands.

use anyhow::{Context, Result};
use chainwatch::config::ChainwatchConfig;
use chainwatch::core::Chainwatch;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::signal;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path; chainwatch.toml and config/chainwatch.toml are read when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Evaluate all active rules on the configured interval until Ctrl+C
    Run,
    /// Run a single evaluation tick and print its report
    Tick,
    /// Compile a natural-language rule and store it
    Compile {
        /// Owner of the new rule
        #[arg(long)]
        user: String,
        /// Rule description, e.g. "Alert me if daily PnL drops below -5%"
        #[arg(long)]
        text: String,
        /// Rule name; derived from the text when omitted
        #[arg(long)]
        name: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    init_tracing(&args.log_level)?;

    info!("Starting Chainwatch v{}", env!("CARGO_PKG_VERSION"));

    let config = ChainwatchConfig::load_from(args.config.as_deref())
        .context("failed to load configuration")?;

    // Initialize Prometheus metrics recorder
    let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
    let metrics_handle = recorder.handle();
    metrics::set_boxed_recorder(Box::new(recorder))
        .map_err(|e| anyhow::anyhow!("failed to set metrics recorder: {}", e))?;

    let engine = Chainwatch::from_config(&config)
        .await
        .context("failed to initialize engine")?;

    match args.command {
        Command::Run => {
            let scheduler = engine.start_scheduler();
            info!(
                "Scheduler running every {}s",
                engine.engine_config().tick_interval_secs
            );

            setup_shutdown_handler().await;

            info!("Shutting down Chainwatch...");
            scheduler.stop().await;
            info!(metrics = %metrics_handle.render(), "Final metrics");
            info!("Chainwatch shut down gracefully");
        }
        Command::Tick => {
            let outcome = engine.run_tick().await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::Compile { user, text, name } => {
            let rule = engine.compile_rule(&user, &text, name.as_deref()).await?;
            println!("{}", serde_json::to_string_pretty(&rule)?);
        }
    }

    Ok(())
}

fn init_tracing(log_level: &str) -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    // Define log file appender (rolling daily)
    let file_appender = tracing_appender::rolling::daily("logs", "chainwatch.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let level_filter = match log_level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };

    // Command output goes to stdout, so logs go to stderr
    let stderr_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(std::io::stderr)
        .with_current_span(true)
        .with_span_list(true)
        .with_filter(EnvFilter::from_default_env().add_directive(level_filter.into()));

    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_current_span(true)
        .with_span_list(true)
        .with_filter(EnvFilter::from_default_env().add_directive(level_filter.into()));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()?;

    // The writer guard must outlive every log call
    Box::leak(Box::new(guard));

    Ok(())
}

/// Setup graceful shutdown handler
async fn setup_shutdown_handler() {
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received shutdown signal (Ctrl+C)");
        }
        Err(err) => {
            error!("Failed to listen for shutdown signal: {:?}", err);
        }
    }
}
