use std::sync::Arc;

use telehub::start_server;
use telehub::CommandProbe;
use telehub::CoreBuilder;
use telehub::Error;
use telehub::ResourceKey;
use telehub::Result;
use telehub::Settings;
use telehub::SystemError;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    init_observability();

    let settings = Settings::new()?.validate()?;
    let shutdown = CancellationToken::new();

    if settings.monitoring.prometheus_enabled {
        tokio::spawn(start_server(
            settings.monitoring.prometheus_port,
            shutdown.clone(),
        ));
    }

    let probes = settings.probes.clone();
    let core = CoreBuilder::new(settings).shutdown_token(shutdown.clone()).build()?;

    for config in &probes {
        let key = ResourceKey::parse(&config.key)?;
        let probe = Arc::new(CommandProbe::from_config(config));
        core.register_probe(key, probe, config.interval(), config.timeout())?;
    }
    core.warm_up().await;
    core.start();
    info!(probes = probes.len(), "telehubd started. Waiting for shutdown signal...");

    if let Err(e) = wait_for_signal().await {
        error!("Failed to listen for shutdown signal: {:?}", e);
    }

    if !core.shutdown().await {
        error!("background tasks did not finish within the grace period");
    }
    info!("Exiting program.");
    Ok(())
}

async fn wait_for_signal() -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt()).map_err(signal_error)?;
    let mut sigterm = signal(SignalKind::terminate()).map_err(signal_error)?;
    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT detected.");
        },
        _ = sigterm.recv() => {
            info!("SIGTERM detected.");
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C detected.");
        },
    }
    Ok(())
}

fn signal_error(e: std::io::Error) -> Error {
    Error::System(SystemError::SignalSendFailed(format!(
        "failed to install signal handler: {e}"
    )))
}

fn init_observability() {
    let stdout = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")));
    tracing_subscriber::registry().with(stdout).init();
}
