//! Instrumented synthetic-weather service.
//!
//! # Architecture Overview
//!
//! ```text
//!   Client Request
//!   ──────────────▶ http (axum, request id, trace span, timeout)
//!                        │
//!                        ▼
//!                   forecast service ──▶ pipeline ──▶ generator
//!                                           │
//!              ┌────────────────────────────┼─────────────────────┐
//!              ▼                            ▼                     ▼
//!        metric registry              span tracker          fault injector
//!     (atomics + metrics facade)   (task-local parents)   (seeded latency and
//!              │                            │              failure draws)
//!              ▼                            ▼
//!      Prometheus recorder        log / in-memory exporters
//!        (GET /metrics)              (GET /debug/spans)
//!
//!   health aggregator (GET /health, /health/ready, /health/live)
//!   config (TOML + WEATHER_* env, file watcher) · lifecycle (signals)
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use weather_telemetry::config::{load_with_env, ConfigWatcher};
use weather_telemetry::lifecycle::{spawn_signal_handler, Shutdown};
use weather_telemetry::observability::{export, logging};
use weather_telemetry::HttpServer;

#[derive(Parser)]
#[command(name = "weather-telemetry")]
#[command(about = "Synthetic weather API with metrics, spans and fault injection", long_about = None)]
struct Args {
    /// TOML configuration file; watched for fault profile changes.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = load_with_env(args.config.as_deref(), std::env::vars())?;
    logging::init(&config.observability)?;

    tracing::info!(
        version = %config.service.version,
        environment = %config.service.environment,
        "weather-telemetry starting"
    );
    tracing::info!(
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.timeouts.request_secs,
        faults_enabled = config.faults.enabled,
        failure_probability = config.faults.failure_probability,
        metrics_prefix = %config.metrics.prefix,
        "Configuration loaded"
    );

    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone());

    // The recorder has to exist before the registry is built.
    let prometheus = if config.metrics.enabled {
        Some(export::install_prometheus()?)
    } else {
        None
    };

    let mut server = HttpServer::new(config.clone())?;
    if let Some(handle) = prometheus {
        tokio::spawn(export::run_upkeep(handle.clone(), shutdown.subscribe()));
        server = server.with_prometheus(handle);
    }

    let (_watcher, config_updates) = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (Some(watcher.run()?), updates)
        }
        None => {
            let (_tx, updates) = mpsc::unbounded_channel();
            (None, updates)
        }
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    server.run(listener, config_updates, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
