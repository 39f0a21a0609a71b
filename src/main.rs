use clap::Parser;
use engine_proxy::config::{DEFAULT_LISTEN_ADDR, ProxyConfig};
use engine_proxy::engine::connection::HttpEngineConnector;
use engine_proxy::proxy::handlers;
use engine_proxy::proxy::service::ProxyService;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Proxy between the control plane and volume engine processes")]
struct Cli {
    /// Address the HTTP surface listens on
    #[arg(long, env = "ENGINE_PROXY_LISTEN", default_value = DEFAULT_LISTEN_ADDR)]
    listen: SocketAddr,

    #[arg(long, env = "ENGINE_PROXY_DIAL_TIMEOUT_SECS", default_value_t = 5)]
    dial_timeout_secs: u64,

    #[arg(long, env = "ENGINE_PROXY_FORWARD_TIMEOUT_SECS", default_value_t = 30)]
    forward_timeout_secs: u64,

    /// Delay between two status queries of one replica
    #[arg(long, env = "ENGINE_PROXY_POLL_INTERVAL_MS", default_value_t = 1000)]
    poll_interval_ms: u64,

    /// Consecutive unreachable status queries before a replica is marked errored
    #[arg(long, env = "ENGINE_PROXY_POLL_FAILURE_THRESHOLD", default_value_t = 10)]
    poll_failure_threshold: u32,

    /// How long a finished operation stays queryable
    #[arg(long, env = "ENGINE_PROXY_RETENTION_SECS", default_value_t = 600)]
    retention_secs: u64,

    #[arg(long, env = "ENGINE_PROXY_SWEEP_INTERVAL_SECS", default_value_t = 30)]
    sweep_interval_secs: u64,

    #[arg(long, env = "ENGINE_PROXY_V2_DATA_ENGINE")]
    v2_data_engine: bool,

    /// Log filter, e.g. `debug` or `engine_proxy=trace` (overrides RUST_LOG)
    #[arg(long, env = "ENGINE_PROXY_LOG_LEVEL")]
    log_level: Option<String>,
}

impl Cli {
    fn proxy_config(&self) -> ProxyConfig {
        ProxyConfig {
            listen_addr: self.listen,
            dial_timeout: Duration::from_secs(self.dial_timeout_secs),
            forward_timeout: Duration::from_secs(self.forward_timeout_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            poll_failure_threshold: self.poll_failure_threshold,
            retention: Duration::from_secs(self.retention_secs),
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
            v2_data_engine_enabled: self.v2_data_engine,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match &cli.log_level {
        Some(level) => EnvFilter::try_new(level)?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = cli.proxy_config();
    let listen_addr = config.listen_addr;

    // 1. Engine connections:
    let connector = Arc::new(HttpEngineConnector::new(config.dial_timeout));

    // 2. Proxy service (registry, router, trackers, sweeper):
    let service = ProxyService::new(config, connector)?;

    // 3. HTTP router:
    let app = handlers::router(service.clone());

    // 4. Start HTTP server:
    tracing::info!("Engine proxy listening on {}", listen_addr);
    tracing::info!("Press Ctrl+C to shutdown");

    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
            }
            tracing::info!("Shutting down");
        })
        .await?;

    service.shutdown().await;

    Ok(())
}
