//! Coordinator Core (C7): one handler per event variant, grounded in
//! `coordinator.py`'s `conf_complete`, `tracking_start`, `tracking_stop`,
//! `deconfigure`, `data_suspect`, and pointing-update methods.

use bluse_core::bus::ChatNotifier;
use bluse_core::config::{Config, HPGDOMAIN, PKTIDX_MARGIN, SLACK_CHANNEL};
use bluse_core::event::PointingAxis;
use bluse_core::start_index::{select_start_index, ActivePacketIndex};
use bluse_core::store::Store;
use bluse_core::{naming, plan, streams, target};
use tracing::{info, warn};

pub async fn conf_complete(store: &Store, config: &Config, product_id: &str) {
    let streams_map: serde_json::Value = match store.get_sensor(product_id, "streams").await {
        Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or(serde_json::Value::Null),
        _ => {
            warn!("No stream descriptor cached for {product_id}; cannot configure");
            return;
        }
    };
    let Some(feng_url) = streams::resolve_feng_url(&streams_map) else {
        warn!("No F-engine stream URL found for {product_id}");
        return;
    };

    let ip_offset: u32 = store
        .get_sensor(product_id, "ip_offset")
        .await
        .ok()
        .flatten()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    let (prefix, base_octet, n_addrs, _port) = match plan::parse_spead_url(&feng_url) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!("Failed to parse stream URL for {product_id}: {e}");
            return;
        }
    };

    let n_nodes = store.free_pool_len().await.unwrap_or(0) as u32;
    let streams_per_instance = config.streams_per_instance();
    let groups = match plan::build_plan(&prefix, base_octet, n_addrs, n_nodes, streams_per_instance, ip_offset) {
        Ok(g) => g,
        Err(e) => {
            warn!("Stream plan failed for {product_id}: {e}");
            return;
        }
    };

    let hosts = match store.allocate_hosts(product_id, groups.len()).await {
        Ok(h) => h,
        Err(e) => {
            warn!("Failed to allocate hosts for {product_id}: {e}");
            return;
        }
    };
    if hosts.len() < groups.len() {
        warn!(
            "Only {} of {} required nodes available for {product_id}; proceeding with partial-band recording",
            hosts.len(),
            groups.len()
        );
    }

    let hnchan = sensor_u64(store, product_id, "hnchan").await;
    let node_plans = plan::attach_schan(groups, ip_offset, hnchan.max(1));

    let sync_time = sensor_str(store, product_id, "sync_time").await;
    let adc_sample_rate = sensor_f64(store, product_id, "adc_sample_rate").await;
    let n_freq_chans = sensor_f64(store, product_id, "n_freq_chans").await.max(1.0);
    let chan_bw = bluse_core::numeric::format_g17(adc_sample_rate / 2.0 / n_freq_chans / 1e6);
    let centre_freq = sensor_f64(store, product_id, "centre_frequency").await;
    let fecenter = bluse_core::numeric::format_g17(centre_freq / 1e6);
    let hntime = sensor_str(store, product_id, "spectra_per_heap").await;
    let spectra_per_heap: f64 = hntime.parse().unwrap_or(0.0);
    let adc_per_spectra = sensor_f64(store, product_id, "adc_per_spectra").await;
    let hclocks = bluse_core::numeric::format_g17(adc_per_spectra * spectra_per_heap);
    let nants = sensor_str(store, product_id, "antennas").await;

    for (i, host) in hosts.iter().enumerate() {
        let Some(node_plan) = node_plans.get(i) else { continue };
        let params: &[(&str, String)] = &[
            ("BINDPORT", "7148".to_string()),
            ("FENSTRM", feng_url.clone()),
            ("SYNCTIME", sync_time.clone()),
            ("FECENTER", fecenter.clone()),
            ("FENCHAN", n_freq_chans.to_string()),
            ("CHAN_BW", chan_bw.clone()),
            ("HNCHAN", hnchan.to_string()),
            ("HNTIME", hntime.clone()),
            ("HCLOCKS", hclocks.clone()),
            ("NANTS", nants.clone()),
            ("PKTSTART", "0".to_string()),
            ("NSTRM", node_plan.group.nstrm().to_string()),
            ("SCHAN", node_plan.schan.to_string()),
            ("DESTIP", node_plan.group.to_destip()),
        ];
        for (key, value) in params {
            if let Err(e) = store.publish_param(HPGDOMAIN, host, key, value).await {
                warn!("Failed to publish {key} to {host}: {e}");
            }
        }
    }

    let trigger_mode = store.get_default_trigger_mode().await.unwrap_or_else(|_| "idle".to_string());
    if let Err(e) = store.set_trigger_mode(product_id, &trigger_mode).await {
        warn!("Failed to set trigger mode for {product_id}: {e}");
    }
    if let Err(e) = store.set_tracking(product_id, false).await {
        warn!("Failed to reset tracking state for {product_id}: {e}");
    }
    info!("Configured {product_id}: {} nodes allocated", hosts.len());
}

pub async fn tracking(store: &Store, notifier: &ChatNotifier, product_id: &str) {
    if store.is_tracking(product_id).await.unwrap_or(false) {
        return;
    }
    let trigger_mode = store.get_trigger_mode(product_id).await.unwrap_or_else(|_| "idle".to_string());
    if trigger_mode == "idle" {
        return;
    }

    let hosts = store.allocated_hosts(product_id).await.unwrap_or_default();
    if hosts.is_empty() {
        warn!("No allocated hosts for {product_id}; cannot start tracking");
        return;
    }

    let target_str = sensor_str(store, product_id, "target").await;
    let formatted = target::format_target(&target_str);
    let sb_id = store.get_sensor(product_id, "sched_observation_schedule_1").await.ok().flatten();
    let upper_dir = match store.status_hash(HPGDOMAIN, &hosts[0]).await {
        Ok(status) => status.get("DATADIR").cloned(),
        Err(_) => None,
    };
    let data_dir = naming::datadir(upper_dir.as_deref(), sb_id.as_deref());

    for host in &hosts {
        if let Err(e) = store.publish_param(HPGDOMAIN, host, "DATADIR", &data_dir).await {
            warn!("Failed to publish DATADIR to {host}: {e}");
        }
        if let Some(ref t) = formatted {
            for (key, value) in [("SRC_NAME", &t.src_name), ("RA_STR", &t.ra_str), ("DEC_STR", &t.dec_str)] {
                if let Err(e) = store.publish_param(HPGDOMAIN, host, key, value).await {
                    warn!("Failed to publish {key} to {host}: {e}");
                }
            }
        } else {
            warn!("Could not parse target string for {product_id}; skipping SRC_NAME/RA_STR/DEC_STR");
        }
    }

    // PKTSTART is issued strictly after the metadata above (§4.1 ordering barrier).
    if let Some(pktstart) = select_pkt_start(store, &hosts).await {
        for host in &hosts {
            if let Err(e) = store.publish_param(HPGDOMAIN, host, "PKTSTART", &pktstart.to_string()).await {
                warn!("Failed to publish PKTSTART to {host}: {e}");
            }
        }
    }

    let _ = notifier.notify(SLACK_CHANNEL, &format!("meerkat:: New recording started for {product_id}!")).await;

    let next_mode = match trigger_mode.as_str() {
        "armed" => "idle".to_string(),
        mode if mode.starts_with("nshot:") => {
            let k: i64 = mode.trim_start_matches("nshot:").parse().unwrap_or(0);
            if k <= 1 { "idle".to_string() } else { format!("nshot:{}", k - 1) }
        }
        other => other.to_string(),
    };
    if let Err(e) = store.set_trigger_mode(product_id, &next_mode).await {
        warn!("Failed to update trigger mode for {product_id}: {e}");
    }
    if let Err(e) = store.set_tracking(product_id, true).await {
        warn!("Failed to set tracking state for {product_id}: {e}");
    }
    info!("Tracking started for {product_id}");
}

pub async fn not_tracking(store: &Store, product_id: &str) {
    if !store.is_tracking(product_id).await.unwrap_or(false) {
        return;
    }
    let hosts = store.allocated_hosts(product_id).await.unwrap_or_default();
    for host in &hosts {
        let dwell = store
            .status_hash(HPGDOMAIN, host)
            .await
            .ok()
            .and_then(|h| h.get("DWELL").cloned())
            .unwrap_or_else(|| "0".to_string());

        let _ = store.publish_param(HPGDOMAIN, host, "DWELL", "0").await;
        let _ = store.publish_param(HPGDOMAIN, host, "PKTSTART", "0").await;
        tokio::time::sleep(bluse_core::config::NOT_TRACKING_SETTLE).await;
        let _ = store.publish_param(HPGDOMAIN, host, "DWELL", &dwell).await;
    }
    if let Err(e) = store.set_tracking(product_id, false).await {
        warn!("Failed to clear tracking state for {product_id}: {e}");
    }
    info!("Tracking stopped for {product_id}");
}

pub async fn deconfigure(store: &Store, notifier: &ChatNotifier, product_id: &str) {
    let hosts = store.allocated_hosts(product_id).await.unwrap_or_default();
    for host in &hosts {
        if let Err(e) = store.publish_param(HPGDOMAIN, host, "DESTIP", "0.0.0.0").await {
            warn!("Failed to publish DESTIP to {host}: {e}");
        }
    }
    match store.release_hosts(product_id).await {
        Ok(released) => info!("Deconfigured {product_id}: released {} hosts", released.len()),
        Err(e) => warn!("Failed to release hosts for {product_id}: {e}"),
    }
    if let Err(e) = store.clear_subarray_state(product_id).await {
        warn!("Failed to clear subarray state for {product_id}: {e}");
    }
    let _ = notifier.notify(SLACK_CHANNEL, &format!("meerkat:: Subarray {product_id} deconfigured")).await;
}

pub async fn data_suspect(store: &Store, product_id: &str, mask: &str) {
    let value = u64::from_str_radix(mask, 2).unwrap_or(0);
    let hex_mask = format!("#{value:x}");
    let hosts = store.allocated_hosts(product_id).await.unwrap_or_default();
    for host in &hosts {
        if let Err(e) = store.publish_param(HPGDOMAIN, host, "FESTATUS", &hex_mask).await {
            warn!("Failed to publish FESTATUS to {host}: {e}");
        }
    }
}

pub async fn pointing(store: &Store, product_id: &str, axis: PointingAxis, value: f64) {
    let (key, published) = match axis {
        PointingAxis::Ra => ("RA", target::ra_hours_to_degrees(value)),
        PointingAxis::Dec => ("DEC", value),
        PointingAxis::Azim => ("AZ", value),
        PointingAxis::Elev => ("EL", value),
    };
    let hosts = store.allocated_hosts(product_id).await.unwrap_or_default();
    for host in &hosts {
        if let Err(e) = store.publish_param(HPGDOMAIN, host, key, &published.to_string()).await {
            warn!("Failed to publish {key} to {host}: {e}");
        }
    }
}

pub async fn trigger_mode_change(store: &Store, value: &str) {
    if let Err(e) = store.set_default_trigger_mode(value).await {
        warn!("Failed to persist default trigger mode: {e}");
    } else {
        info!("Default trigger mode set to {value}");
    }
}

async fn select_pkt_start(store: &Store, hosts: &[String]) -> Option<i64> {
    let mut active = Vec::new();
    for host in hosts {
        let Ok(status) = store.status_hash(HPGDOMAIN, host).await else {
            warn!("Failed to read status hash for {host}; skipping for PKTSTART selection");
            continue;
        };
        let netstat = status.get("NETSTAT").cloned().unwrap_or_else(|| "idle".to_string());
        if netstat == "idle" {
            continue;
        }
        if let Some(pktidx) = status.get("PKTIDX").and_then(|v| v.parse().ok()) {
            active.push(ActivePacketIndex { pktidx });
        }
    }
    select_start_index(&active, PKTIDX_MARGIN)
}

async fn sensor_str(store: &Store, product_id: &str, sensor: &str) -> String {
    store.get_sensor(product_id, sensor).await.ok().flatten().unwrap_or_default()
}

async fn sensor_f64(store: &Store, product_id: &str, sensor: &str) -> f64 {
    sensor_str(store, product_id, sensor).await.parse().unwrap_or(0.0)
}

async fn sensor_u64(store: &Store, product_id: &str, sensor: &str) -> u64 {
    sensor_str(store, product_id, sensor).await.parse().unwrap_or(0)
}
