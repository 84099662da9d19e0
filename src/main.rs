//! FaderDeck GW - Rust implementation
//!
//! Gateway bridging a serial multi-channel fader deck to named application
//! volume targets.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, trace, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod config;
mod drivers;
mod paths;
mod protocol;
mod reconcile;
mod router;
mod serial;

use crate::api::ApiState;
use crate::config::{watcher::ConfigWatcher, DeckConfig};
use crate::drivers::{ConsoleDriver, MediaControl, VolumeSink};
use crate::protocol::Record;
use crate::reconcile::Reconciler;
use crate::router::Router;
use crate::serial::{DeckEvent, DeckLink};

/// FaderDeck Gateway - drive application volumes from a serial fader deck
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (defaults to the platform config dir)
    #[arg(short, long)]
    config: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// List available serial ports
    #[arg(long)]
    list_ports: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(&args.log_level)?;

    info!("Starting FaderDeck GW...");

    // Handle list ports
    if args.list_ports {
        serial::list_ports_formatted();
        return Ok(());
    }

    let config_path = paths::config_path(args.config.as_deref());
    info!("Configuration file: {}", config_path.display());

    let initial_config = DeckConfig::load_or_init(&config_path).await?;
    let config_watcher = ConfigWatcher::new(config_path.clone())?;
    info!("Configuration loaded successfully with hot-reload enabled");

    // Set up shutdown signal
    let shutdown_signal = shutdown_signal();

    run_app(initial_config, config_path, config_watcher, shutdown_signal).await?;

    info!("FaderDeck GW shutdown complete");
    Ok(())
}

async fn run_app(
    initial_config: DeckConfig,
    config_path: PathBuf,
    mut config_watcher: ConfigWatcher,
    shutdown: impl std::future::Future<Output = ()>,
) -> Result<()> {
    info!("Starting main application loop...");

    let config = Arc::new(RwLock::new(initial_config.clone()));

    // The console driver stands in for a native mixer backend and serves
    // both the volume-sink and media-control roles.
    let console = Arc::new(ConsoleDriver::new("console"));
    let sink: Arc<dyn VolumeSink> = console.clone();
    let media: Arc<dyn MediaControl> = console;

    let (mut reconciler, override_handle) =
        Reconciler::new(initial_config.slider_count);

    let router = Router::new(config.clone(), config_path, sink, media.clone());

    // Start the remote API if enabled
    if initial_config.api.enabled {
        let state = Arc::new(ApiState {
            snapshot: router.snapshot_handle(),
            config: config.clone(),
            overrides: override_handle.clone(),
            media,
            update_tx: router.update_sender(),
        });
        let port = initial_config.api.port;
        tokio::spawn(async move {
            if let Err(e) = api::start_server(state, port).await {
                warn!("Remote API server stopped: {}", e);
            }
        });
    }

    // Open the serial link (keeps retrying in the background)
    let mut link = DeckLink::connect(initial_config.port_name.clone(), initial_config.baud_rate);

    info!("✅ FaderDeck GW ready");

    // Main event loop
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            // Handle deck events
            Some(event) = link.next_event() => match event {
                DeckEvent::Connected => {
                    info!("🎛  Fader deck connected");
                }
                DeckEvent::Line(line) => {
                    match protocol::decode(&line) {
                        Record::Readings(raw) => {
                            router.on_readings(&mut reconciler, &raw).await;

                            // Let the mixer settle before re-evaluating a
                            // held override-driven increase.
                            if reconciler.holding_increases() {
                                let ms = config.read().await.decrease_before_increase_timeout_ms;
                                tokio::time::sleep(Duration::from_millis(ms)).await;
                            }
                        }
                        Record::Command(cmd) => {
                            router.on_command(&mut reconciler, cmd).await;
                        }
                        Record::NoData => {
                            trace!("Unusable record: {:?}", line);
                        }
                    }
                }
                DeckEvent::Disconnected => {
                    warn!("Fader deck unavailable, waiting for reconnect...");
                }
            },

            // Handle config reload
            Some(new_config) = config_watcher.next_config() => {
                info!("📝 Configuration file changed, reloading...");
                let serial_changed = {
                    let mut current = config.write().await;
                    let changed = new_config.port_name != current.port_name
                        || new_config.baud_rate != current.baud_rate;
                    *current = new_config;
                    changed
                };
                if serial_changed {
                    warn!("Serial port settings changed; restart to apply them");
                }
                info!("✅ Configuration reloaded");
            }

            // Handle shutdown signal
            _ = &mut shutdown => {
                info!("Shutdown signal received, stopping event loop");
                break;
            }
        }
    }

    // Cleanup
    info!("Shutting down...");
    link.shutdown();
    router.shutdown().await?;
    info!("All drivers shut down");

    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C signal handler");
    info!("Shutdown signal received");
}
