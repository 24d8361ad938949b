#![forbid(unsafe_code)]

//! `hostwatch-agent`: host monitoring agent binary.
//!
//! Loads configuration and the shared key, starts the resolver helper
//! (delegated mode), drops privileges, then keeps an authenticated
//! session with a collector until SIGINT/SIGTERM. The same executable run
//! with `--resolver-helper` is the helper itself.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use hostwatch_agent::agent::{self, Agent};
use hostwatch_agent::audit::{AuditEntry, AuditEventType};
use hostwatch_agent::config::AgentConfig;
use hostwatch_agent::connection::Connector;
use hostwatch_agent::mode::ResolverMode;
use hostwatch_agent::privileges::drop_privileges;
use hostwatch_agent::protocol::control;
use hostwatch_agent::resolver::{helper, spawner, DelegatedConnector, InlineConnector, ResolverChannel};
use hostwatch_agent::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    fn as_arg(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Json => "json",
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "hostwatch-agent", about = "Host monitoring agent", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, required_unless_present = "resolver_helper")]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override `resolver.mode` from the configuration file.
    #[arg(long, value_enum)]
    resolver: Option<ResolverMode>,

    /// Serve resolver requests on stdin/stdout instead of running the agent.
    #[arg(long, hide = true)]
    resolver_helper: bool,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    // One dispatcher thread: the control flow and the resolver callback
    // never run concurrently.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?;

    if args.resolver_helper {
        return runtime.block_on(run_helper());
    }

    runtime.block_on(run(args)).inspect_err(|err| {
        error!(%err, "agent terminated");
    })
}

async fn run_helper() -> Result<()> {
    let channel = ResolverChannel::new(tokio::io::stdin(), tokio::io::stdout());
    helper::serve(channel).await.inspect_err(|err| {
        error!(%err, "resolver helper terminated");
    })
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let config_path = args
        .config
        .ok_or_else(|| AppError::Config("--config is required".into()))?;
    let mut config = AgentConfig::load_from_path(&config_path)?;

    if let Some(mode) = args.resolver {
        config.resolver.mode = mode;
    }

    config.load_credentials().await?;
    info!(
        servers = config.servers.len(),
        port = %config.port,
        mode = ?config.resolver.mode,
        "configuration loaded"
    );

    // ── Resolver strategy ───────────────────────────────
    let connector: Box<dyn Connector> = match config.resolver.mode {
        ResolverMode::Delegated => {
            let helper = spawner::spawn_helper(args.log_format.as_arg())?;
            Box::new(DelegatedConnector::with_helper(helper.channel, helper.child))
        }
        ResolverMode::Inline => Box::new(InlineConnector),
    };

    drop_privileges(&config.privileges)?;

    // ── Run until shutdown ──────────────────────────────
    let audit = agent::audit_logger(&config)?;
    let mut agent = Agent::from_config(&config, connector, Arc::clone(&audit))?;

    let outcome = tokio::select! {
        result = agent.run() => result,
        () = shutdown_signal() => {
            info!("shutdown signal received");
            Ok(())
        }
    };

    if outcome.is_ok() && config.startup_audit {
        let entry = AuditEntry::new(
            AuditEventType::AgentStopped,
            control::agent_stopped_message(&config.agent.name, &config.agent.ip),
        );
        if let Err(err) = audit.log_entry(entry) {
            warn!(%err, "failed to emit shutdown audit record");
        }
    }

    info!("hostwatch-agent shut down");
    outcome
}

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
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // stdout belongs to the resolver channel in helper mode.
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
