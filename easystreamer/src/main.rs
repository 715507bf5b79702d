mod session;

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::info;

use easystreamer_core::{
    bootstrap::load_config,
    logging,
    poller::{spawn_catalog_poller, spawn_stats_poller},
    ApiClient, ClientId,
};
use easystreamer_rtc::{StreamManager, WebRtcConnection};

use session::Session;

#[derive(Parser, Debug)]
#[command(name = "easystreamer")]
#[command(about = "EasyStreamer subscription client", long_about = None)]
struct Args {
    /// Config file (YAML, TOML or JSON)
    #[arg(long, env = "EASYSTREAMER_CONFIG_PATH")]
    config: Option<String>,

    /// Streaming server base URL, overrides `server.base_url`
    #[arg(long)]
    server: Option<String>,

    /// Stream to subscribe to on startup (repeatable)
    #[arg(long = "stream", value_name = "ID")]
    streams: Vec<String>,

    /// Log level, overrides `logging.level`
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 1. Load configuration
    let mut config = load_config(args.config.as_deref())?;
    if let Some(server) = args.server {
        config.server.base_url = server;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    if let Err(errors) = config.validate() {
        return Err(anyhow::anyhow!(
            "Configuration validation failed with {} error(s): {}",
            errors.len(),
            errors.join("; ")
        ));
    }

    // 2. Initialize logging
    logging::init_logging(&config.logging)?;
    info!("EasyStreamer client starting...");

    // 3. Server API
    let api = Arc::new(ApiClient::new(&config.server)?);
    let client_id = ClientId::generate();
    info!(server = %api.base_url(), client_id = %client_id, "Using streaming server");

    // 4. Peer connection and subscription manager
    let connection = Arc::new(WebRtcConnection::new(&config.webrtc).await?);
    let manager = StreamManager::start(connection, api.clone(), client_id)?;

    // 5. Pollers
    let (catalog_poller, catalog_rx) =
        spawn_catalog_poller(api.clone(), config.poll_interval());
    let stats = config
        .catalog
        .poll_stats
        .then(|| spawn_stats_poller(api.clone(), config.stats_poll_interval()));

    for stream in &args.streams {
        manager.add(stream.as_str());
    }
    // Explicit streams win over the server's defaults
    let auto_select = config.auto_select_defaults && args.streams.is_empty();

    let (stats_poller, stats_rx) = match stats {
        Some((poller, rx)) => (Some(poller), Some(rx)),
        None => (None, None),
    };

    Session::new(&manager, catalog_rx, stats_rx, auto_select)
        .run()
        .await;

    // 6. Teardown
    info!("Shutting down...");
    catalog_poller.shutdown().await;
    if let Some(poller) = stats_poller {
        poller.shutdown().await;
    }
    manager.shutdown().await?;
    info!("EasyStreamer client stopped");

    Ok(())
}
