//! Sensor and path naming conventions shared by the coordinator and the
//! metadata fetcher, grounded in `coordinator.py`'s `cbf_sensor_name`,
//! `stream_sensor_name`, and `datadir`/`get_datadir_root`.

/// Extracts the subarray ordinal from a `product_id` — its last
/// character, e.g. `"array_1"` → `1`.
pub fn subarray_ordinal(product_id: &str) -> Option<char> {
    product_id.chars().last()
}

pub fn cbf_sensor_name(cbf_name: &str, cbf_prefix: &str, short: &str) -> String {
    format!("{cbf_name}_{cbf_prefix}_{short}")
}

pub fn stream_sensor_name(product_id: &str, cbf_prefix: &str, short: &str) -> Option<String> {
    let ordinal = subarray_ordinal(product_id)?;
    Some(format!("subarray_{ordinal}_streams_{cbf_prefix}_{short}"))
}

/// Builds the recording root directory from the schedule-block id
/// (dashes become path separators) and the per-host `DATADIR` root
/// reported in its status hash, defaulting to `buf0`/`Unknown_SB`.
pub fn datadir(upper_dir: Option<&str>, sb_id: Option<&str>) -> String {
    let upper_dir = upper_dir.filter(|s| !s.is_empty()).unwrap_or("buf0");
    let sb_id = sb_id.filter(|s| !s.is_empty()).unwrap_or("Unknown_SB");
    let first_sb_id = sb_id.split(',').next().unwrap_or(sb_id);
    format!("/{upper_dir}/{}", first_sb_id.replace('-', "/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cbf_name_is_namespaced() {
        assert_eq!(cbf_sensor_name("cbf_1", "wide", "adc_sample_rate"), "cbf_1_wide_adc_sample_rate");
    }

    #[test]
    fn stream_name_uses_trailing_ordinal() {
        assert_eq!(
            stream_sensor_name("array_1", "wide", "bandwidth").unwrap(),
            "subarray_1_streams_wide_bandwidth"
        );
    }

    #[test]
    fn datadir_defaults_when_missing() {
        assert_eq!(datadir(None, None), "/buf0/Unknown_SB");
        assert_eq!(datadir(Some(""), Some("20240101-0007")), "/buf0/20240101/0007");
        assert_eq!(datadir(Some("buf1"), Some("20240101-0007")), "/buf1/20240101/0007");
    }

    #[test]
    fn datadir_uses_only_the_first_scheduled_block_id() {
        assert_eq!(datadir(Some("buf0"), Some("20240101-0007,20240101-0008")), "/buf0/20240101/0007");
    }
}
