//! Binary entry point for the ArqonBus broker.
//!
//! Wiring only: load and validate configuration, install a tracing
//! subscriber, build the metrics recorder and [`arqon_gateway::GatewayState`],
//! then hand off to [`arqon_gateway::server::serve`] until it returns on
//! graceful shutdown.

use std::process::ExitCode;

use arqon_gateway::GatewayState;
use arqon_metrics::MetricsRecorderConfig;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "arqonbus", about = "ArqonBus — real-time message bus and task broker")]
struct Cli {
    /// Log level used when `RUST_LOG` is unset (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON instead of human-readable text.
    #[arg(long, default_value_t = false)]
    json_logs: bool,

    /// Address to bind to (overrides `ARQONBUS_HOST`/config).
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides `ARQONBUS_PORT`/config).
    #[arg(long)]
    port: Option<u16>,

    /// Disable the Prometheus metrics recorder for this run.
    #[arg(long, default_value_t = false)]
    no_metrics: bool,
}

fn init_telemetry(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry.with(fmt::layer().with_target(false)).init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "arqonbus exited with an error");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = arqon_config::load()?;

    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = config.environment.as_str(),
        "arqonbus starting"
    );

    let metrics = arqon_metrics::init_metrics(MetricsRecorderConfig {
        enabled: !cli.no_metrics,
        global_labels: vec![("environment".to_string(), config.environment.as_str().to_string())],
    })?;

    let state = GatewayState::new(config).await?;
    arqon_gateway::server::serve(state, std::sync::Arc::new(metrics)).await?;

    info!("arqonbus stopped");
    Ok(())
}
