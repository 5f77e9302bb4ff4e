//! Builds the full sensor-name lists the session queries or subscribes
//! to, and parses the CBF antenna-to-F-engine mapping. Grounded in
//! `katportal_server.py`'s `gen_ant_sensor_list`, `gen_stream_sensor_list`,
//! `gen_cbf_sensor_list`, `build_sub_sensors`, and `antenna_mapping`.

use bluse_core::config::Config;
use bluse_core::naming::{cbf_sensor_name, stream_sensor_name};

pub fn ant_sensor_list(antennas: &[String], ant_sensors: &[String]) -> Vec<String> {
    antennas
        .iter()
        .flat_map(|ant| ant_sensors.iter().map(move |sensor| format!("{ant}_{sensor}")))
        .collect()
}

pub fn stream_sensor_list(product_id: &str, stream_sensors: &[String], cbf_prefix: &str) -> Vec<String> {
    stream_sensors
        .iter()
        .filter_map(|sensor| stream_sensor_name(product_id, cbf_prefix, sensor))
        .collect()
}

pub fn cbf_sensor_list(cbf_sensors: &[String], cbf_name: &str, cbf_prefix: &str) -> Vec<String> {
    cbf_sensors.iter().map(|sensor| cbf_sensor_name(cbf_name, cbf_prefix, sensor)).collect()
}

/// The continuous-update subscription set: per-antenna, per-stream,
/// per-subarray, and per-CBF sensors.
pub fn build_sub_sensors(
    config: &Config,
    product_id: &str,
    antennas: &[String],
    cbf_name: &str,
    cbf_prefix: &str,
) -> Vec<String> {
    let subarray_nr = product_id.chars().last().unwrap_or('0');
    let mut sensors = ant_sensor_list(antennas, &config.sensors_per_antenna);
    sensors.extend(stream_sensor_list(product_id, &config.stream_sensors, cbf_prefix));
    sensors.extend(config.array_sensors.iter().map(|s| format!("subarray_{subarray_nr}_{s}")));
    sensors.extend(cbf_sensor_list(&config.cbf_sensors, cbf_name, cbf_prefix));
    sensors
}

/// Resolves the first `pool_resources` entry containing `short_name`
/// (e.g. `"cbf"` matching `"cbf_dev_2"`), the full CBF component name.
pub fn component_name<'a>(short_name: &str, pool_resources: &'a [String]) -> Option<&'a str> {
    pool_resources.iter().rev().find(|c| c.contains(short_name)).map(String::as_str)
}

/// Parses the CBF `input_labelling` sensor value — a list of
/// `[antenna, feng_input, ...]` tuples rendered as JSON — into parallel
/// antenna-name and F-engine-ID lists. The F-engine ID is the input
/// index halved and floored, matching `antenna_mapping`'s
/// `floor(input / 2)` (two polarizations share one F-engine).
pub fn parse_antenna_mapping(labelling_json: &str) -> Option<(Vec<String>, Vec<u32>)> {
    let entries: Vec<serde_json::Value> = serde_json::from_str(labelling_json).ok()?;
    let mut antennas = Vec::with_capacity(entries.len());
    let mut feng_ids = Vec::with_capacity(entries.len());
    for entry in entries {
        let arr = entry.as_array()?;
        let antenna = arr.first()?.as_str()?.to_string();
        let input: u32 = arr.get(1)?.as_str().and_then(|s| s.parse().ok()).or_else(|| arr.get(1)?.as_u64().map(|n| n as u32))?;
        antennas.push(antenna);
        feng_ids.push(input / 2);
    }
    Some((antennas, feng_ids))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_ant_sensor_names() {
        let antennas = vec!["m000".to_string(), "m001".to_string()];
        let sensors = vec!["data_suspect".to_string()];
        assert_eq!(ant_sensor_list(&antennas, &sensors), vec!["m000_data_suspect", "m001_data_suspect"]);
    }

    #[test]
    fn component_name_prefers_last_match() {
        let resources = vec!["fbfuse_1".to_string(), "cbf_dev_2".to_string(), "cbf_1".to_string()];
        assert_eq!(component_name("cbf", &resources), Some("cbf_1"));
    }

    #[test]
    fn component_name_missing_is_none() {
        let resources = vec!["fbfuse_1".to_string()];
        assert_eq!(component_name("cbf", &resources), None);
    }

    #[test]
    fn parses_antenna_mapping() {
        let json = r#"[["m000", "0"], ["m000", "1"], ["m001", "2"]]"#;
        let (antennas, feng_ids) = parse_antenna_mapping(json).unwrap();
        assert_eq!(antennas, vec!["m000", "m000", "m001"]);
        assert_eq!(feng_ids, vec![0, 0, 1]);
    }
}
