use clap::Parser;
use std::future::Future;
use switchboard::config::AppConfig;
use switchboard::logging::init_logging;
use switchboard::Coordinator;
use tokio::signal;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "switchboard")]
#[command(version)]
#[command(about = "Coordinate remote A2A agents: discovery, health and task routing", long_about = None)]
struct Cli {
    /// Configuration directory (default.toml plus the SWITCHBOARD_ENV file)
    #[arg(short, long, default_value = "config", env = "SWITCHBOARD_CONFIG_DIR")]
    config: String,

    /// Agent base URL to register at startup (repeatable)
    #[arg(short, long = "agent")]
    agents: Vec<String>,

    /// Override the configured log level
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load_from(&cli.config)?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    init_logging(&config.logging);

    info!(
        name = %config.platform.name,
        version = %config.platform.version,
        config_dir = %cli.config,
        "Starting switchboard"
    );

    let coordinator = Coordinator::new(config)?;
    coordinator.start().await;

    for url in &cli.agents {
        let response = coordinator.register_agent_response(url, false).await;
        if response.success {
            info!(agent_id = %response.agent_id, url = %url, "{}", response.message);
        } else {
            warn!(url = %url, "Could not register agent: {}", response.message);
        }
    }

    shutdown_signal().await;
    info!("Shutdown signal received");
    coordinator.stop().await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = on_signal("Ctrl+C", signal::ctrl_c());

    #[cfg(unix)]
    let terminate = on_signal("SIGTERM", async {
        let mut stream = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        stream.recv().await;
        Ok::<(), std::io::Error>(())
    });

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Resolves when `signal` fires. A handler that failed to install never
/// resolves, so the other signal still decides when to shut down.
async fn on_signal<F>(name: &str, signal: F)
where
    F: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = signal.await {
        error!("Failed to install {} handler: {}", name, e);
        std::future::pending::<()>().await;
    }
}
