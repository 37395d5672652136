//! net-analyzer: UDP-ingest streaming analyzer for network-telemetry
//! records.
//!
//! # Usage
//!
//! ```bash
//! # Run against a live companion sender
//! ./net_logger data/merged.jsonl &
//! cargo run --release
//!
//! # Headless (no terminal dashboard), useful under CI
//! cargo run --release -- --no-ui
//! ```
//!
//! # Environment Variables
//!
//! - `OPENAI_API_KEY`: enables the representer's optional LLM interpretation.
//! - `RUST_LOG`: tracing `EnvFilter` directive (default: info).
//! - `NET_ANALYZER_BIND`, `NET_ANALYZER_DATA_DIR`, `NET_ANALYZER_HIDDEN`,
//!   `NET_ANALYZER_LEARNING_RATE`, `NET_ANALYZER_NO_UI`: env fallbacks for
//!   the matching CLI flags.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use net_analyzer::channel::Channel;
use net_analyzer::config::{CliArgs, Config, LogFormat};
use net_analyzer::predictor::PredictorConfig;
use net_analyzer::preprocess::PreprocessConfig;
use net_analyzer::stats::StatsRegistry;
use net_analyzer::{ingest, llm, predictor, preprocess, representer, ui};

fn init_logging(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Spawns a dedicated single-threaded `tokio` runtime on its own OS thread
/// whose only job is awaiting `ctrl_c()` and then closing `raw`, which
/// propagates shutdown downstream through ordinary channel closure — the
/// pipeline stages themselves are plain OS threads, not `tokio` tasks.
fn spawn_shutdown_watcher(raw: Arc<Channel>, running: Arc<AtomicBool>) {
    std::thread::Builder::new()
        .name("shutdown-watcher".into())
        .spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                Ok(rt) => rt,
                Err(e) => {
                    tracing::error!(error = %e, "failed to build shutdown-watcher runtime");
                    return;
                }
            };
            rt.block_on(async {
                tokio::signal::ctrl_c().await.ok();
            });
            tracing::warn!("received Ctrl+C, initiating shutdown");
            running.store(false, Ordering::SeqCst);
            raw.close();
        })
        .expect("failed to spawn shutdown-watcher thread");
}

fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_logging(args.log_format);
    let config: Config = args.into_config().context("invalid configuration")?;

    tracing::info!(bind = %config.bind, data_dir = %config.data_dir.display(), hidden = ?config.hidden_layers, "net-analyzer starting");

    let raw = Arc::new(Channel::new());
    let proc = Arc::new(Channel::new());
    let repr = Arc::new(Channel::new());
    let error = Arc::new(Channel::new());
    let stats = Arc::new(StatsRegistry::new());
    let running = Arc::new(AtomicBool::new(true));

    let socket = ingest::bind(&config.bind).context("failed to bind ingest UDP socket")?;

    spawn_shutdown_watcher(raw.clone(), running.clone());

    let mut handles = Vec::new();

    {
        let raw = raw.clone();
        let stats = stats.clone();
        handles.push(
            std::thread::Builder::new()
                .name("ingest".into())
                .spawn(move || ingest::run(socket, raw, stats))
                .context("failed to spawn ingest thread")?,
        );
    }

    {
        let raw = raw.clone();
        let proc = proc.clone();
        let error = error.clone();
        let stats = stats.clone();
        let preprocess_config = PreprocessConfig { data_dir: config.data_dir.clone() };
        handles.push(
            std::thread::Builder::new()
                .name("preprocess".into())
                .spawn(move || preprocess::run(preprocess_config, raw, proc, error, stats))
                .context("failed to spawn preprocess thread")?,
        );
    }

    {
        let proc = proc.clone();
        let repr = repr.clone();
        let stats = stats.clone();
        let predictor_config = PredictorConfig {
            data_dir: config.data_dir.clone(),
            hidden_sizes: config.hidden_layers.clone(),
            learning_rate: config.learning_rate,
        };
        handles.push(
            std::thread::Builder::new()
                .name("predictor".into())
                .spawn(move || predictor::run(predictor_config, proc, repr, stats))
                .context("failed to spawn predictor thread")?,
        );
    }

    {
        let repr = repr.clone();
        let error = error.clone();
        let llm_client = llm::LlmClient::from_env();
        if llm_client.is_some() {
            tracing::info!("OPENAI_API_KEY present, representer LLM interpretation enabled");
        }
        handles.push(
            std::thread::Builder::new()
                .name("representer".into())
                .spawn(move || representer::run(repr, error, llm_client))
                .context("failed to spawn representer thread")?,
        );
    }

    if !config.no_ui {
        let queues = ui::Queues {
            raw: raw.clone(),
            proc: proc.clone(),
            repr: repr.clone(),
            error: error.clone(),
        };
        let stats = stats.clone();
        let running = running.clone();
        handles.push(
            std::thread::Builder::new()
                .name("ui".into())
                .spawn(move || ui::run(queues, stats, running))
                .context("failed to spawn ui thread")?,
        );
    }

    for handle in handles {
        if let Err(panic) = handle.join() {
            tracing::error!(?panic, "a pipeline stage panicked");
            running.store(false, Ordering::SeqCst);
            raw.close();
            proc.close();
            repr.close();
            error.close();
            anyhow::bail!("pipeline stage panicked");
        }
    }

    tracing::info!("net-analyzer shutdown complete");
    Ok(())
}
