//! Coordinator Core (C7) binary: subscribes to the lifecycle, sensor, and
//! trigger-control channels and dispatches each event to its handler.
//! Grounded in `coordinator.py`'s top-level `main()` loop.

mod handlers;

use bluse_core::bus::{ChatNotifier, Subscription, LIFECYCLE_ALERTS_CHANNEL, SENSOR_ALERTS_CHANNEL, TRIGGER_CONTROL_CHANNEL};
use bluse_core::config::load_config;
use bluse_core::event::{parse_event, Event};
use bluse_core::store::Store;
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "bluse-coordinator")]
struct Cli {
    /// Redis port for the event bus / key-value store.
    #[arg(short, long, default_value_t = 6379)]
    port: u16,

    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "config.yml")]
    config: PathBuf,

    /// Default trigger mode for newly configured subarrays.
    #[arg(short, long, default_value = "idle")]
    triggermode: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config).unwrap_or_else(|| {
        error!("Could not load configuration from {:?}; continuing with an empty default config", cli.config);
        bluse_core::config::Config::default()
    });

    let redis_url = format!("redis://127.0.0.1:{}", cli.port);
    let store = Store::connect(&redis_url).await?;
    let notifier = ChatNotifier::new(redis_url.clone());
    store.set_default_trigger_mode(&cli.triggermode).await?;

    // Startup recovery (§4.1.1): only seeds the free pool if it's empty, so
    // a restart never clobbers in-flight allocations.
    store.seed_free_pool(&config.hashpipe_instances).await?;

    let mut subscription = Subscription::connect(
        &redis_url,
        &[LIFECYCLE_ALERTS_CHANNEL, SENSOR_ALERTS_CHANNEL, TRIGGER_CONTROL_CHANNEL],
    )
    .await?;

    info!("Coordinator started on port {}", cli.port);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested; exiting event loop");
                break;
            }
            payload = subscription.next_payload() => {
                let Some(payload) = payload else {
                    warn!("Event bus connection closed; exiting");
                    break;
                };
                dispatch(&store, &notifier, &config, &payload).await;
            }
        }
    }

    Ok(())
}

async fn dispatch(store: &Store, notifier: &ChatNotifier, config: &bluse_core::config::Config, payload: &str) {
    let event = match parse_event(payload) {
        Ok(Some(event)) => event,
        Ok(None) => return,
        Err(e) => {
            error!("Malformed event payload: {e}");
            return;
        }
    };

    match event {
        Event::ConfComplete { product_id } => handlers::conf_complete(store, config, &product_id).await,
        Event::Tracking { product_id } => handlers::tracking(store, notifier, &product_id).await,
        Event::NotTracking { product_id } => handlers::not_tracking(store, &product_id).await,
        Event::Deconfigure { product_id } => handlers::deconfigure(store, notifier, &product_id).await,
        Event::DataSuspect { product_id, mask } => handlers::data_suspect(store, &product_id, &mask).await,
        Event::Pointing { product_id, axis, value } => handlers::pointing(store, &product_id, axis, value).await,
        Event::TriggerModeChange { value } => handlers::trigger_mode_change(store, &value).await,
        // Configure/CaptureInit/CaptureStart/CaptureStop/CaptureDone are
        // consumed by the metadata fetcher (C8), which owns CAM's sensor
        // subscription lifecycle; the coordinator only reacts from
        // conf_complete onward.
        Event::Configure { .. }
        | Event::CaptureInit { .. }
        | Event::CaptureStart { .. }
        | Event::CaptureStop { .. }
        | Event::CaptureDone { .. } => {}
    }
}
