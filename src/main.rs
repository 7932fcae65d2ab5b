use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use toolbridge_server::ServerConfig;
use toolbridge_telemetry::{init_telemetry, TelemetryConfig};
use tracing::Level;

/// Serve the code tool catalog to MCP-style clients over SSE.
#[derive(Debug, Parser)]
#[command(name = "toolbridge", version)]
struct Args {
    /// JSON config file, merged over the defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    /// Seconds of silence before a keepalive frame.
    #[arg(long)]
    keepalive_secs: Option<u64>,

    /// Per-session queue capacity.
    #[arg(long)]
    max_queue: Option<usize>,

    #[arg(long)]
    max_sessions: Option<usize>,

    /// Close sessions with no traffic for this many seconds.
    #[arg(long)]
    idle_timeout_secs: Option<u64>,

    #[arg(long, default_value = "info")]
    log_level: Level,

    /// Per-module override, e.g. `toolbridge_server=debug`. Repeatable.
    #[arg(long = "log-module", value_parser = parse_module_level)]
    log_modules: Vec<(String, Level)>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    log_json: bool,
}

impl Args {
    fn apply(&self, config: &mut ServerConfig) {
        if let Some(host) = &self.host {
            config.host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(secs) = self.keepalive_secs {
            config.keepalive_interval_secs = secs;
        }
        if let Some(n) = self.max_queue {
            config.max_queue = n;
        }
        if let Some(n) = self.max_sessions {
            config.max_sessions = n;
        }
        if let Some(secs) = self.idle_timeout_secs {
            config.idle_timeout_secs = Some(secs);
        }
    }
}

fn parse_module_level(s: &str) -> Result<(String, Level), String> {
    let (module, level) = s
        .split_once('=')
        .ok_or_else(|| format!("expected MODULE=LEVEL, got `{s}`"))?;
    let level = level.parse::<Level>().map_err(|e| e.to_string())?;
    Ok((module.to_string(), level))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let telemetry = init_telemetry(&TelemetryConfig {
        log_level: args.log_level,
        module_levels: args.log_modules.clone(),
        json: args.log_json,
    });

    let mut config = toolbridge_server::load_config(args.config.as_deref())
        .context("failed to load config")?;
    args.apply(&mut config);
    config.validate().context("invalid configuration")?;

    tracing::info!(
        filter = telemetry.filter(),
        subscriber_installed = telemetry.installed(),
        "starting toolbridge"
    );

    let tools = toolbridge_tools::create_default_registry();
    tracing::info!(tools = ?tools.names(), "tool catalog ready");

    let handle = toolbridge_server::start(&config, Arc::new(tools))
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr()))?;

    tracing::info!(port = handle.port, "toolbridge ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl+c")?;

    handle.shutdown().await;
    tracing::info!("stopped");
    Ok(())
}
