//! prcast server
//!
//! Relays Bitbucket pull request webhooks to connected clients over
//! WebSocket, so authors and reviewers see changes as they happen.

mod api;
mod config;
mod server;
mod shutdown;
mod state;

use clap::Parser;
use config::ConfigLoader;
use prcast_core::delivery::{ChannelRegistry, Notifier};
use prcast_core::entities::PullRequestRepository;
use prcast_core::events::{EventBus, ResyncRequest, TransitionBus, resync_channel};
use prcast_core::handlers::{EventClassifier, PullRequestHandler};
use prcast_core::processors::BitbucketSync;
use server::run_server;
use shutdown::{ShutdownHandle, spawn_config_reload_handler};
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// prcast - Bitbucket pull request notification relay
#[derive(Parser, Debug)]
#[command(name = "prcast-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "PRCAST_CONFIG", default_value = "./prcast.toml")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:8765)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Do not load open pull requests from Bitbucket on startup
    #[arg(long, default_value = "false")]
    skip_fetch: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    init_tracing();

    // Parse command line arguments
    let args = Args::parse();

    tracing::info!("Starting prcast-server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_loader = Arc::new(ConfigLoader::new(&args.config, args.listen));
    let loaded_config = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;

    let listen_addr = loaded_config.server.listen;
    tracing::info!("Configuration loaded from {:?}", args.config);
    let shared_config = loaded_config.into_shared();

    // Core components
    let registry = PullRequestRepository::new();
    let bus: TransitionBus = EventBus::new();
    let notifier = Notifier::new(registry.clone(), ChannelRegistry::new());
    notifier.subscribe_to(&bus).await;
    let classifier = EventClassifier::new(bus.clone())
        .with_handler(Arc::new(PullRequestHandler::new(registry.clone())));

    // Background Bitbucket sync
    let shutdown = ShutdownHandle::new();
    let (resync_tx, resync_rx) = resync_channel();
    let sync = BitbucketSync::new(
        registry.clone(),
        shared_config.bitbucket.clone(),
        resync_rx,
        shutdown.subscribe(),
    );
    let sync_handle = tokio::spawn(sync.run());

    if args.skip_fetch {
        tracing::info!("Skipping initial pull request fetch");
    } else {
        resync_tx.send(ResyncRequest::Startup).await?;
    }

    // Create application state
    let state = AppState::new(
        shared_config,
        registry,
        classifier,
        notifier,
        shutdown.clone(),
    );

    // Spawn config reload handler (listens for SIGHUP)
    let reload_notify = spawn_config_reload_handler(state.clone(), config_loader, resync_tx);

    // Run the server
    tracing::info!("Starting HTTP server on {}", listen_addr);
    let result = run_server(state, listen_addr).await;

    // Stop background tasks; also covers a failed bind
    if !shutdown.is_triggered() {
        tracing::warn!("Server stopped without a shutdown signal");
    }
    shutdown.trigger();
    reload_notify.notify_one();
    if let Err(e) = sync_handle.await {
        tracing::error!(error = %e, "BitbucketSync task failed");
    }
    bus.clear().await;
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
