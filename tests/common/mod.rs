//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};

use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use weather_telemetry::config::ServiceConfig;
use weather_telemetry::observability::{export, InMemoryExporter, MetricRegistry, SpanTracker};
use weather_telemetry::resilience::{FaultInjector, FaultProfile};
use weather_telemetry::{HttpServer, InstrumentedPipeline, Shutdown};

/// Install the process-wide Prometheus recorder once per test binary.
///
/// Call before building anything that creates metrics, or those metrics
/// never reach the recorder.
pub fn prometheus() -> PrometheusHandle {
    static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
    HANDLE
        .get_or_init(|| export::install_prometheus().expect("install prometheus recorder"))
        .clone()
}

/// A pipeline with a seeded fault injector and an in-memory span buffer.
pub fn pipeline(profile: FaultProfile) -> (InstrumentedPipeline, Arc<InMemoryExporter>) {
    let buffer = Arc::new(InMemoryExporter::new(1024));
    let spans = SpanTracker::builder("weather-test").exporter(buffer.clone()).build();
    let metrics = Arc::new(MetricRegistry::standard("weather"));
    let faults = Arc::new(FaultInjector::seeded(profile, 42).expect("valid fault profile"));
    (InstrumentedPipeline::new(metrics, spans).with_faults(faults), buffer)
}

/// Never delays, never fails.
pub fn no_faults() -> FaultProfile {
    FaultProfile::disabled()
}

/// Never delays, always fails.
pub fn always_fail() -> FaultProfile {
    FaultProfile {
        failure_probability: 1.0,
        ..FaultProfile::disabled()
    }
}

/// Defaults with faults off, span logging off and an ephemeral port.
pub fn quiet_config() -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.faults.enabled = false;
    config.faults.seed = Some(7);
    config.tracing.log_spans = false;
    config
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub client: reqwest::Client,
    handle: JoinHandle<Result<(), std::io::Error>>,
}

impl TestServer {
    /// Bind an ephemeral port and serve `server` on it.
    pub async fn start(server: HttpServer) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let shutdown = Shutdown::new();
        let server_shutdown = shutdown.subscribe();
        let (_, config_updates) = mpsc::unbounded_channel();
        let handle = tokio::spawn(server.run(listener, config_updates, server_shutdown));

        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(0)
            .no_proxy()
            .build()
            .unwrap();

        Self {
            addr,
            shutdown,
            client,
            handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("server unreachable")
    }

    /// Trigger shutdown and wait for the server to drain.
    pub async fn stop(self) {
        self.shutdown.trigger();
        self.handle.await.unwrap().unwrap();
    }
}
