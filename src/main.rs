use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use switchline::config::Config;
use switchline::domain::transport::ProviderTransport;
use switchline::infrastructure::metrics::init_metrics;
use switchline::infrastructure::realtime::{BridgeConfig, RealtimeEventBridge, WebSocketChannel};
use switchline::infrastructure::transport::HttpTransport;
use switchline::SessionCore;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config_path = std::env::var("SWITCHLINE_CONFIG").ok().map(PathBuf::from);
    let config = Config::load(config_path.as_deref())?;

    // Initialize tracing; RUST_LOG takes precedence over the configured filter
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting Switchline");
    info!("Backend: {}, push channel: {}", config.api.base_url, config.realtime.ws_url);

    if config.metrics.enabled {
        let listen: SocketAddr = config.metrics.listen.parse()?;
        init_metrics(listen)?;
        info!("Prometheus metrics available on http://{}/metrics", listen);
    }

    let transport: Arc<dyn ProviderTransport> = Arc::new(HttpTransport::new(
        &config.api.base_url,
        config.api.request_timeout(),
    )?);

    let core = Arc::new(SessionCore::new(transport.clone(), &config));
    match core.sync_numbers().await {
        Ok(count) => info!("Loaded {} phone numbers", count),
        Err(e) => warn!("Phone number sync failed, continuing with an empty pool: {}", e),
    }

    // Start the realtime bridge and the dispatch loop
    let channel = Arc::new(WebSocketChannel::new(config.realtime.ws_url.clone()));
    let bridge = Arc::new(RealtimeEventBridge::new(
        channel,
        transport,
        BridgeConfig::from(&config.realtime),
    ));
    let events = bridge.subscribe();
    let bridge_handle = bridge.start();
    let dispatch = tokio::spawn(core.clone().run(events));

    let mut call_events = core.subscribe_calls();
    let call_log = tokio::spawn(async move {
        loop {
            match call_events.recv().await {
                Ok(event) => info!("Call {}: {}", event.call_id(), event.event_type()),
                Err(RecvError::Lagged(skipped)) => warn!("Call event log skipped {} events", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    });

    info!("Switchline running, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;

    info!("Shutting down...");
    bridge_handle.shutdown();
    dispatch.abort();
    call_log.abort();

    Ok(())
}
