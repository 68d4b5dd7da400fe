//! UCG News Relay: binary entrypoint
//! Loads config, wires sources, the SQLite dedup store and Discord delivery,
//! then runs one pass (cron style) or loops on the poll interval.
//!
//! Exit codes: 0 clean, 1 fatal (config, store), 2 run finished with item failures.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ucg_news_relay::config::LogFormat;
use ucg_news_relay::http::HttpClient;
use ucg_news_relay::ingest::build_sources;
use ucg_news_relay::ingest::scheduler::{watch, WatchCfg};
use ucg_news_relay::metrics::TextfileExporter;
use ucg_news_relay::{
    DedupStore, DiscordDelivery, Relay, RelayConfig, RetentionSweeper, RunSummary, SqliteStore,
};

#[derive(Parser)]
#[command(name = "ucg-news-relay")]
#[command(about = "Relay new X, YouTube and Ultraman Card Game posts to Discord", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to a TOML config file (overrides RELAY_CONFIG_PATH)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one relay pass and exit (default)
    Run,

    /// Run relay passes on the poll interval until Ctrl-C
    Watch {
        /// Stop after this many runs
        #[arg(long)]
        max_runs: Option<u64>,
    },

    /// Only prune dedup records older than the retention horizon
    Prune,

    /// Validate configuration and print the effective (redacted) settings
    CheckConfig,
}

fn init_tracing(level: &str, format: LogFormat) {
    // RUST_LOG wins over LOG_LEVEL when both are present.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_ascii_lowercase()));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Compact => registry.with(fmt::layer().compact()).init(),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env in local/dev; no-op when the file is absent.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let cfg = match RelayConfig::load(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            init_tracing(
                &std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
                LogFormat::Compact,
            );
            tracing::error!(error = %format!("{e:#}"), "failed to load configuration");
            return ExitCode::from(1);
        }
    };
    init_tracing(&cfg.log_level, cfg.log_format);

    match dispatch(cli.command.unwrap_or(Commands::Run), cfg).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "fatal");
            ExitCode::from(1)
        }
    }
}

async fn dispatch(command: Commands, cfg: RelayConfig) -> Result<ExitCode> {
    if let Commands::CheckConfig = command {
        cfg.validate()?;
        for (key, value) in cfg.redacted_summary() {
            println!("{key:<24} {value}");
        }
        return Ok(ExitCode::SUCCESS);
    }

    for (key, value) in cfg.redacted_summary() {
        tracing::info!(key, value = %value, "config");
    }

    let exporter = match cfg.metrics_textfile.as_deref() {
        Some(path) => match TextfileExporter::install(path) {
            Ok(exp) => Some(exp),
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "metrics textfile disabled");
                None
            }
        },
        None => None,
    };
    let flush = |exporter: &Option<TextfileExporter>| {
        if let Some(exp) = exporter {
            if let Err(e) = exp.flush() {
                tracing::warn!(error = %format!("{e:#}"), "metrics textfile flush failed");
            }
        }
    };

    let sweeper = RetentionSweeper::from_config(&cfg)?;

    if let Commands::Prune = command {
        let store = SqliteStore::open(&cfg.database_path)
            .await
            .context("opening dedup store")?;
        let removed = sweeper.sweep(&store, Utc::now()).await;
        store.close().await;
        flush(&exporter);
        let removed = removed.context("pruning dedup store")?;
        println!("pruned {removed} record(s)");
        return Ok(ExitCode::SUCCESS);
    }

    cfg.validate()?;
    let store = SqliteStore::open(&cfg.database_path)
        .await
        .context("opening dedup store")?;
    let http = HttpClient::new(cfg.http_timeout(), cfg.retry_policy()).context("building HTTP client")?;
    let sources = build_sources(&cfg, &http);
    let delivery = DiscordDelivery::new(&http, &cfg.discord);
    let relay = Relay::new(sources, store, delivery).with_retention(sweeper);

    let code = match command {
        Commands::Watch { max_runs } => {
            let wcfg = WatchCfg {
                interval: cfg.poll_interval(),
                max_runs,
            };
            tracing::info!(interval_secs = cfg.poll_interval_secs, "watching");
            watch(&relay, wcfg, shutdown_signal(), |_| flush(&exporter)).await;
            ExitCode::SUCCESS
        }
        _ => {
            let summary = relay.run_once().await;
            flush(&exporter);
            println!("{}", serde_json::to_string(&summary)?);
            exit_code(&summary)
        }
    };

    relay.shutdown().await;
    Ok(code)
}

fn exit_code(summary: &RunSummary) -> ExitCode {
    if summary.has_failures() {
        ExitCode::from(2)
    } else {
        ExitCode::SUCCESS
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "cannot listen for Ctrl-C; watch runs until killed");
        std::future::pending::<()>().await;
    }
}
