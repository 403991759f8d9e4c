#![forbid(unsafe_code)]

//! `lark-agent-gateway` — Lark/Feishu gateway binary for ACP coding agents.
//!
//! Bootstraps configuration, the `SQLite` store, the Lark event webhook,
//! and the session orchestrator, then runs until SIGINT/SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use lark_agent_gateway::config::{GlobalConfig, CONFIG_TEMPLATE};
use lark_agent_gateway::lark::client::{HttpLarkClient, LarkApi};
use lark_agent_gateway::lark::webhook;
use lark_agent_gateway::orchestrator::Orchestrator;
use lark_agent_gateway::persistence::{db, retention};
use lark_agent_gateway::process::{ProcessManager, MOCK_AGENT_ARG};
use lark_agent_gateway::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "lark-agent-gateway",
    about = "Lark/Feishu IM gateway for ACP coding agents",
    version,
    long_about = None
)]
struct Cli {
    /// Path to the TOML configuration file.
    ///
    /// Falls back to the `CONFIG_PATH` environment variable, then to
    /// `config.toml` in the current working directory.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log verbosity; the `LOG_LEVEL` environment variable wins when set.
    #[arg(short = 'l', long, value_enum)]
    log_level: Option<LogLevel>,

    /// Write a commented default config file and exit.
    #[arg(short = 'i', long)]
    init: bool,
}

fn main() {
    // Hidden re-invocation: `lark-agent-gateway mock-agent` runs the
    // built-in mock agent on stdio (USE_MOCK_AGENT test hook).
    if std::env::args().nth(1).as_deref() == Some(MOCK_AGENT_ARG) {
        let code = run_mock_agent();
        std::process::exit(code);
    }

    let args = Cli::parse();

    if let Err(err) = boot(args) {
        eprintln!("startup failed: {err}");
        std::process::exit(1);
    }
}

fn run_mock_agent() -> i32 {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("mock agent runtime failed: {err}");
            return 1;
        }
    };
    match runtime.block_on(lark_agent_gateway::acp::mock::run_mock_agent()) {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("mock agent failed: {err}");
            1
        }
    }
}

fn boot(args: Cli) -> Result<()> {
    init_tracing(args.log_level)?;

    let config_path = args
        .config
        .or_else(|| std::env::var("CONFIG_PATH").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    if args.init {
        return write_config_template(&config_path);
    }

    info!("lark-agent-gateway bootstrap");
    let config = Arc::new(GlobalConfig::load_from_path(&config_path).map_err(|err| {
        AppError::Config(format!(
            "cannot load config '{}': {err} — run with --init to create a template",
            config_path.display()
        ))
    })?);
    info!("configuration loaded");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(config))
}

/// Write the config template, refusing to clobber an existing file.
fn write_config_template(path: &std::path::Path) -> Result<()> {
    if path.exists() {
        return Err(AppError::Config(format!(
            "config file '{}' already exists — edit it directly or remove it first",
            path.display()
        )));
    }
    std::fs::write(path, CONFIG_TEMPLATE)
        .map_err(|err| AppError::Config(format!("failed to write config template: {err}")))?;
    println!("wrote {}", path.display());
    Ok(())
}

async fn run(config: Arc<GlobalConfig>) -> Result<()> {
    // ── Database ────────────────────────────────────────
    let db_path = config.db_path().to_string_lossy().to_string();
    let db = Arc::new(db::connect(&db_path).await?);
    info!("database connected");

    let ct = CancellationToken::new();

    // ── Retention ───────────────────────────────────────
    let retention_handle = retention::spawn_retention_task(
        Arc::clone(&db),
        config.timeouts.event_max_age_seconds,
        ct.clone(),
    );

    // ── Lark client + webhook ingress ───────────────────
    let lark: Arc<dyn LarkApi> = Arc::new(HttpLarkClient::new(config.lark.clone())?);
    let (event_tx, event_rx) = mpsc::channel(256);

    let webhook_config = config.lark.clone();
    let webhook_ct = ct.clone();
    let webhook_shutdown_ct = ct.clone();
    let webhook_handle = tokio::spawn(async move {
        if let Err(err) = webhook::serve(&webhook_config, event_tx, webhook_ct).await {
            error!(%err, "webhook server failed — initiating shutdown");
            webhook_shutdown_ct.cancel();
        }
    });

    // ── Orchestrator ────────────────────────────────────
    let (procs, exit_rx) = ProcessManager::new(config.agent.clone());
    let orchestrator = Orchestrator::new(
        Arc::clone(&config),
        lark,
        db,
        Arc::new(procs),
        ct.clone(),
    );

    let run_handle = tokio::spawn(Arc::clone(&orchestrator).run(event_rx, exit_rx));
    info!("gateway ready");

    // ── Wait for first shutdown signal ──────────────────
    shutdown_signal().await;
    info!("shutdown signal received — starting graceful shutdown");
    ct.cancel();

    // A second signal force-exits.
    tokio::spawn(async {
        shutdown_signal().await;
        error!("second shutdown signal received — forcing exit");
        std::process::exit(1);
    });

    // ── Graceful shutdown with timeout ──────────────────
    let shutdown_fut = async {
        orchestrator.shutdown().await;
        let _ = run_handle.await;
        let _ = webhook_handle.await;
        let _ = retention_handle.await;
    };
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, shutdown_fut)
        .await
        .is_err()
    {
        error!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "graceful shutdown timed out — exiting"
        );
    }

    info!("lark-agent-gateway shut down");
    Ok(())
}

/// Maximum time to wait for graceful shutdown before force-exiting.
const SHUTDOWN_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(cli_level: Option<LogLevel>) -> Result<()> {
    // Precedence: LOG_LEVEL env var, then -l flag, then info.
    let fallback = cli_level.map_or("info", LogLevel::as_str);
    let env_filter = EnvFilter::try_from_env("LOG_LEVEL")
        .unwrap_or_else(|_| EnvFilter::new(fallback));

    fmt()
        .with_env_filter(env_filter)
        .try_init()
        .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?;

    Ok(())
}
