use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use vtscan::config::AppConfig;
use vtscan::history::{HistoryStore, MemoryHistory};
use vtscan::server::{serve, Api};
use vtscan::transport::UreqTransport;
use vtscan::ScanOrchestrator;

fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load().context("failed to load configuration")?;
    let service = config
        .service_config()
        .context("analysis service credential missing")?;
    info!(config = ?config, "configuration loaded");

    let transport = UreqTransport::new(service.request_timeout);
    let orchestrator = ScanOrchestrator::new(service, transport);

    let history: Arc<dyn HistoryStore> = match &config.history_path {
        Some(path) => Arc::new(
            MemoryHistory::open(path)
                .with_context(|| format!("failed to open history at {}", path.display()))?,
        ),
        None => Arc::new(MemoryHistory::new()),
    };

    let api = Api::new(orchestrator, history)
        .with_limits(config.max_file_size, config.history_limit);

    info!(addr = %config.bind_addr, "starting scan service");
    serve(&config.bind_addr, Arc::new(api))
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .init();
}
