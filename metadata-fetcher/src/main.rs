//! Metadata Fetcher (C8) binary: owns one websocket session per active
//! subarray and feeds sensor snapshots and classified updates back
//! through the shared store and event bus. Grounded in
//! `katportal_start.py`'s standalone entry point.

mod classify;
mod sensors;
mod session;
mod subarray;

use bluse_core::bus::{Subscription, LIFECYCLE_ALERTS_CHANNEL};
use bluse_core::config::load_config;
use bluse_core::event::{parse_event, Event};
use bluse_core::store::Store;
use clap::Parser;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "bluse-metadata-fetcher")]
struct Cli {
    /// Redis port for the event bus / key-value store.
    #[arg(short, long, default_value_t = 6379)]
    port: u16,

    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "config.yml")]
    config: PathBuf,
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
    let mut subscription = Subscription::connect(&redis_url, &[LIFECYCLE_ALERTS_CHANNEL]).await?;

    let mut sessions: HashMap<String, mpsc::Sender<subarray::Control>> = HashMap::new();

    info!("Metadata fetcher started on port {}", cli.port);

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
                dispatch(&store, &config, &payload, &mut sessions).await;
            }
        }
    }

    Ok(())
}

async fn dispatch(
    store: &Store,
    config: &bluse_core::config::Config,
    payload: &str,
    sessions: &mut HashMap<String, mpsc::Sender<subarray::Control>>,
) {
    let event = match parse_event(payload) {
        Ok(Some(event)) => event,
        Ok(None) => return,
        Err(e) => {
            error!("Malformed event payload: {e}");
            return;
        }
    };

    match event {
        Event::Configure { product_id } => {
            let (tx, rx) = mpsc::channel(8);
            let store = store.clone();
            let config = config.clone();
            let spawned_id = product_id.clone();
            tokio::spawn(async move {
                subarray::run(spawned_id, store, config, rx).await;
            });
            sessions.insert(product_id, tx);
        }
        Event::CaptureInit { product_id } => {
            send_control(sessions, &product_id, subarray::Control::CaptureInit).await;
        }
        Event::CaptureStart { product_id } => {
            send_control(sessions, &product_id, subarray::Control::CaptureStart).await;
        }
        Event::Deconfigure { product_id } => {
            if let Some(tx) = sessions.remove(&product_id) {
                let _ = tx.send(subarray::Control::Deconfigure).await;
            } else {
                warn!("Failed to deconfigure a non-existent product_id: {product_id}");
            }
        }
        // Capture-stop/done and conf_complete/tracking changes are either
        // no-ops for this component or consumed by the coordinator core.
        Event::CaptureStop { .. }
        | Event::CaptureDone { .. }
        | Event::ConfComplete { .. }
        | Event::Tracking { .. }
        | Event::NotTracking { .. }
        | Event::DataSuspect { .. }
        | Event::Pointing { .. }
        | Event::TriggerModeChange { .. } => {}
    }
}

async fn send_control(sessions: &HashMap<String, mpsc::Sender<subarray::Control>>, product_id: &str, control: subarray::Control) {
    match sessions.get(product_id) {
        Some(tx) => {
            let _ = tx.send(control).await;
        }
        None => warn!("No active metadata session for {product_id}"),
    }
}
