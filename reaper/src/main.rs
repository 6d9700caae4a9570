//! Pod Reaper
//!
//! Kubernetes controller deleting pods that stayed in a non-running phase
//! longer than a maximum age. The maximum age is read from a ConfigMap and
//! picked up at runtime without a restart.

mod cli;
mod config;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::Cli;
use config::Config;
use reaper_core::metrics::MetricsRegistry;
use reaper_core::{ConfigSyncReconciler, SharedConfig};
use reaper_k8s::{
    run_config_controller, run_pod_controller, sweep_once, ConfigContext, K8sClient,
    KubeConfigMapStore, KubePodStore, PodControllerSettings,
};

/// Initialize the tracing/logging subsystem
fn init_logging(log_level: &str, json_format: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    if json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }
}

/// Merge CLI overrides into the file configuration
fn apply_overrides(mut config: Config, cli: &Cli) -> Result<Config> {
    if cli.dry_run {
        config.dry_run = true;
    }
    if let Some(namespace) = &cli.protected_namespace {
        config.protected_namespace = namespace.clone();
    }
    if let Some(full_name) = &cli.config_map {
        config = config
            .with_config_map(full_name)
            .context("Invalid --config-map")?;
    }
    Ok(config)
}

/// Build both reconcilers and run them until shutdown, or sweep once
async fn run(config: Config, once: bool, shutdown_rx: watch::Receiver<bool>) -> Result<()> {
    let shared = Arc::new(SharedConfig::new(config.default_max_pod_age));
    let metrics = Arc::new(MetricsRegistry::new());
    metrics.set_max_pod_age(config.default_max_pod_age.as_secs_f64());

    let client = K8sClient::new().await?;
    client
        .health_check()
        .await
        .context("Kubernetes API is not reachable")?;

    let settings = PodControllerSettings {
        protected_namespace: config.protected_namespace.clone(),
        dry_run: config.dry_run,
        delete_failure_requeue: config.delete_failure_requeue,
        error_requeue: config.error_requeue,
    };

    let config_sync = ConfigSyncReconciler::new(
        Arc::new(KubeConfigMapStore::new(client.clone())),
        shared.clone(),
        metrics.clone(),
        config.config_map.key(),
    );

    if once {
        info!("Running single sweep (--once mode)");
        let store = Arc::new(KubePodStore::new(client.clone(), config.dry_run));
        let pods = settings.reconciler(store, shared, metrics);
        let summary = sweep_once(&client, &pods, &config_sync).await?;
        if summary.failed > 0 {
            anyhow::bail!("{} of {} pods failed to reconcile", summary.failed, summary.examined);
        }
        return Ok(());
    }

    if config.metrics.enabled {
        let port = config.metrics.port;
        tokio::spawn(async move {
            if let Err(e) = start_metrics_server(port).await {
                error!(error = %e, "Metrics server failed");
            }
        });
    }

    let config_ctx = Arc::new(ConfigContext {
        reconciler: config_sync,
        error_requeue: config.error_requeue,
    });

    tokio::join!(
        run_config_controller(client.clone(), config_ctx, shutdown_rx.clone()),
        run_pod_controller(client, settings, shared, metrics, shutdown_rx),
    );

    info!("Pod Reaper shutdown complete");
    Ok(())
}

/// Start the Prometheus metrics HTTP server
async fn start_metrics_server(port: u16) -> Result<()> {
    use std::net::SocketAddr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!(port = port, "Metrics server listening");

    loop {
        let (mut socket, _) = listener.accept().await?;

        tokio::spawn(async move {
            // The request line fits in the first read
            let mut buf = [0; 1024];
            let n = socket.read(&mut buf).await.unwrap_or(0);
            let request = String::from_utf8_lossy(&buf[..n]);

            let response = metrics_response(&request, || {
                prometheus::TextEncoder::new()
                    .encode_to_string(&prometheus::gather())
                    .unwrap_or_default()
            });

            let _ = socket.write_all(response.as_bytes()).await;
        });
    }
}

/// Build the HTTP response for a metrics endpoint request
fn metrics_response(request: &str, render: impl FnOnce() -> String) -> String {
    let mut request_line = request.lines().next().unwrap_or_default().split_whitespace();
    let method = request_line.next();
    let path = request_line.next();

    let (status, body) = match (method, path) {
        (Some("GET"), Some("/metrics")) => ("200 OK", render()),
        (Some("GET"), Some(_)) => ("404 Not Found", "not found\n".to_string()),
        _ => ("400 Bad Request", "bad request\n".to_string()),
    };

    format!(
        "HTTP/1.1 {}\r\nContent-Type: text/plain; version=0.0.4\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    )
}

/// Resolve once Ctrl+C or SIGTERM arrives
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating shutdown"),
        _ = terminate => info!("Received SIGTERM, initiating shutdown"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    init_logging(&cli.log_level, cli.log_json);

    info!(version = env!("CARGO_PKG_VERSION"), "Pod Reaper starting");

    let config = if cli.config.exists() {
        Config::from_file(&cli.config)
            .with_context(|| format!("Failed to load config from {:?}", cli.config))?
    } else {
        warn!(path = ?cli.config, "Config file not found, using defaults");
        Config::default()
    };

    let config = apply_overrides(config, &cli)?;
    config.validate().context("Invalid configuration")?;

    info!(
        dry_run = config.dry_run,
        protected_namespace = %config.protected_namespace,
        config_map = %config.config_map.key(),
        default_max_pod_age = ?config.default_max_pod_age,
        "Configuration loaded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    run(config, cli.once, shutdown_rx).await
}
