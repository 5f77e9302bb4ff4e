//! Per-subarray task: owns one websocket session and reacts to lifecycle
//! control messages from the dispatch loop in `main.rs`. Grounded in
//! `katportal_server.py`'s per-product `_configure`/`_capture_init`/
//! `_capture_start`/`_deconfigure` methods, now run as an independent
//! task instead of a shared Tornado ioloop callback.

use crate::classify::{classify, Action};
use crate::sensors;
use crate::session::Session;
use bluse_core::config::Config;
use bluse_core::retry::retry_with_backoff;
use bluse_core::store::Store;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

pub enum Control {
    CaptureInit,
    CaptureStart,
    Deconfigure,
}

const RETRY_BASE_TIMEOUT: Duration = Duration::from_secs(2);
const RETRY_COUNT: u32 = 3;
const RETRY_FACTOR: f64 = 0.5;

pub async fn run(product_id: String, store: Store, config: Config, mut control_rx: mpsc::Receiver<Control>) {
    let Ok(Some(cam_url)) = store.get_sensor(&product_id, "cam:url").await else {
        warn!("No cam:url cached for {product_id}; cannot start a metadata session");
        return;
    };

    let mut session = match retry_with_backoff(
        || Session::connect(&cam_url),
        RETRY_BASE_TIMEOUT,
        RETRY_COUNT,
        RETRY_FACTOR,
    )
    .await
    {
        Ok(session) => session,
        Err(e) => {
            warn!("Could not connect metadata session for {product_id}: {e}");
            return;
        }
    };

    let (cbf_name, cbf_prefix, antennas) = run_configure_fetch(&mut session, &store, &config, &product_id).await;
    let _ = store.publish_message(bluse_core::bus::LIFECYCLE_ALERTS_CHANNEL, &format!("conf_complete:{product_id}")).await;
    info!("Configure fetch complete for {product_id}");

    let mut subscribed: Vec<String> = Vec::new();
    loop {
        tokio::select! {
            control = control_rx.recv() => {
                match control {
                    Some(Control::CaptureInit) => run_capture_init(&mut session, &store, &product_id).await,
                    Some(Control::CaptureStart) => {
                        subscribed = sensors::build_sub_sensors(&config, &product_id, &antennas, &cbf_name, &cbf_prefix);
                        if !subscribed.is_empty() {
                            if let Err(e) = session.subscribe(&subscribed).await {
                                warn!("Failed to subscribe sensors for {product_id}: {e}");
                                subscribed.clear();
                            }
                        }
                    }
                    Some(Control::Deconfigure) | None => {
                        let _ = session.unsubscribe(&subscribed).await;
                        info!("Metadata session for {product_id} torn down");
                        return;
                    }
                }
            }
            update = session.next_update(), if !subscribed.is_empty() => {
                match update {
                    Some(update) => handle_update(&store, &product_id, &update).await,
                    None => {
                        warn!("Metadata session for {product_id} closed unexpectedly");
                        return;
                    }
                }
            }
        }
    }
}

/// Returns `(cbf_name, cbf_prefix, antennas)` for use by the subsequent
/// capture-start subscription list.
async fn run_configure_fetch(
    session: &mut Session,
    store: &Store,
    config: &Config,
    product_id: &str,
) -> (String, String, Vec<String>) {
    let antennas = store.list(&format!("{product_id}:antennas")).await.unwrap_or_default();
    let _ = store.save_history(product_id, "antennas", &timestamp_now(), &format!("{antennas:?}")).await;

    let subarray_nr = product_id.chars().last().unwrap_or('0');
    if !config.sensors_on_configure.is_empty() {
        let targets: Vec<String> =
            config.sensors_on_configure.iter().map(|s| format!("subarray_{subarray_nr}_{s}")).collect();
        fetch_and_store(session, store, product_id, &targets).await;
    }

    let pool_resources = store
        .get_sensor(product_id, &format!("subarray_{subarray_nr}_pool_resources"))
        .await
        .ok()
        .flatten()
        .map(|raw| raw.split(',').map(str::to_string).collect::<Vec<_>>())
        .unwrap_or_default();
    let cbf_name = sensors::component_name("cbf", &pool_resources).unwrap_or("cbf_1").to_string();
    if sensors::component_name("cbf", &pool_resources).is_none() {
        warn!("Could not find component: cbf for {product_id}");
    }
    let _ = store.set_sensor(product_id, "cbf_name", &cbf_name).await;

    let cbf_prefix = store.get_sensor(product_id, "cbf_prefix").await.ok().flatten().unwrap_or_default();
    if !config.cbf_sensors_on_configure.is_empty() {
        let targets = sensors::cbf_sensor_list(&config.cbf_sensors_on_configure, &cbf_name, &cbf_prefix);
        fetch_and_store(session, store, product_id, &targets).await;

        let labelling_key = format!("{cbf_name}_{cbf_prefix}_input_labelling");
        if let Ok(Some(labelling)) = store.get_sensor(product_id, &labelling_key).await {
            if let Some((mapped_antennas, feng_ids)) = sensors::parse_antenna_mapping(&labelling) {
                let _ = store.set_sensor(product_id, "antenna_names", &format!("{mapped_antennas:?}")).await;
                let _ = store.set_sensor(product_id, "feng_ids", &format!("{feng_ids:?}")).await;
            } else {
                warn!("Could not parse input_labelling for {product_id}");
            }
        }
    }

    if !config.stream_sensors_on_configure.is_empty() {
        let targets = sensors::stream_sensor_list(product_id, &config.stream_sensors_on_configure, &cbf_prefix);
        fetch_and_store(session, store, product_id, &targets).await;
    }

    (cbf_name, cbf_prefix, antennas)
}

async fn fetch_and_store(session: &mut Session, store: &Store, product_id: &str, targets: &[String]) {
    match fetch_with_backoff(session, targets).await {
        Ok(values) => {
            for (name, value) in values {
                if let Err(e) = store.set_sensor(product_id, &name, &value).await {
                    warn!("Failed to store sensor {name} for {product_id}: {e}");
                }
            }
        }
        Err(e) => warn!("Sensor fetch failed for {product_id}: {e}"),
    }
}

/// Same bounded-retry-with-widening-timeout policy as
/// [`retry_with_backoff`], hand-unrolled because the closure form can't
/// reborrow `session` across attempts without a lifetime escape.
async fn fetch_with_backoff(session: &mut Session, targets: &[String]) -> bluse_core::Result<Vec<(String, String)>> {
    let mut attempt = 0;
    loop {
        let timeout = RETRY_BASE_TIMEOUT.mul_f64(1.0 + RETRY_FACTOR * attempt as f64);
        match tokio::time::timeout(timeout, session.sensor_values(targets)).await {
            Ok(result) => match result {
                Ok(values) => return Ok(values),
                Err(e) => {
                    attempt += 1;
                    if attempt >= RETRY_COUNT {
                        return Err(e);
                    }
                    warn!("attempt {attempt}/{RETRY_COUNT} failed: {e}; retrying with widened timeout");
                }
            },
            Err(_elapsed) => {
                attempt += 1;
                if attempt >= RETRY_COUNT {
                    return session.sensor_values(targets).await;
                }
                warn!("attempt {attempt}/{RETRY_COUNT} timed out after {timeout:?}; retrying with widened timeout");
            }
        }
    }
}

async fn run_capture_init(session: &mut Session, store: &Store, product_id: &str) {
    let result = async {
        let sb_ids = session.schedule_blocks_assigned().await?;
        let mut blocks = Vec::with_capacity(sb_ids.len());
        for sb_id in &sb_ids {
            blocks.push(session.future_targets(sb_id).await?);
        }
        bluse_core::Result::Ok(blocks)
    }
    .await;

    match result {
        Ok(blocks) => {
            if let Err(e) = store.set_json(&format!("{product_id}:schedule_blocks"), &blocks).await {
                warn!("Failed to store schedule blocks for {product_id}: {e}");
                return;
            }
            let _ = store
                .publish_message(bluse_core::bus::SENSOR_ALERTS_CHANNEL, &format!("{product_id}:schedule_blocks"))
                .await;
        }
        Err(e) => warn!("Could not retrieve schedule blocks for {product_id}: {e}"),
    }
}

async fn handle_update(store: &Store, product_id: &str, update: &crate::session::SensorUpdate) {
    if let Err(e) = store.set_sensor(product_id, &update.name, &update.value).await {
        warn!("Failed to store sensor update {} for {product_id}: {e}", update.name);
    }

    match classify(&update.name, &update.value, &update.status) {
        Action::DataSuspect { mask } => {
            let _ = store
                .publish_message(bluse_core::bus::SENSOR_ALERTS_CHANNEL, &format!("data-suspect:{product_id}:{mask}"))
                .await;
        }
        Action::Tracking { tracking } => {
            let kind = if tracking { "tracking" } else { "not-tracking" };
            let _ = store.publish_message(bluse_core::bus::SENSOR_ALERTS_CHANNEL, &format!("{kind}:{product_id}")).await;
        }
        Action::PosRequest => {
            let _ = store
                .publish_message(
                    bluse_core::bus::SENSOR_ALERTS_CHANNEL,
                    &format!("{product_id}:{}:{}", update.name, update.value),
                )
                .await;
        }
        Action::Target => {
            let _ = store
                .publish_message(
                    bluse_core::bus::SENSOR_ALERTS_CHANNEL,
                    &format!("{product_id}:{}:{}", update.name, update.value),
                )
                .await;
            let _ = store.save_history(product_id, "target", &timestamp_now(), &update.value).await;
        }
        Action::Unsubscribe => {
            info!("script_status left busy for {product_id}; letting the session idle");
        }
        Action::None => {}
    }
}

fn timestamp_now() -> String {
    chrono::Utc::now().format("%Y%m%dT%H%M%S.000Z").to_string()
}
