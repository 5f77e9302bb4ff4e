//! Resolves the `FENG_TYPE` multicast URL out of a subarray's stream
//! descriptor map, accepting both map shapes CAM has used over time
//! (§3.1, §9 Open Question: resolved by preferring the keyed form).

use crate::config::{FENG_TYPE, STREAM_TYPE};
use serde_json::Value;

/// `streams_map` is the JSON value stored at `<product_id>:streams`.
/// Legacy CAM output keys `STREAM_TYPE -> FENG_TYPE -> url`; older still
/// flattens straight to `STREAM_TYPE -> { <anything> -> url }` and takes
/// the first value. This prefers the keyed form when present.
pub fn resolve_feng_url(streams_map: &Value) -> Option<String> {
    let stream_type = streams_map.get(STREAM_TYPE)?;
    if let Some(url) = stream_type.get(FENG_TYPE).and_then(Value::as_str) {
        return Some(url.to_string());
    }
    stream_type.as_object()?.values().next()?.as_str().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prefers_keyed_feng_type() {
        let map = json!({
            STREAM_TYPE: { FENG_TYPE: "spead://239.0.0.0+31:7148" }
        });
        assert_eq!(resolve_feng_url(&map).as_deref(), Some("spead://239.0.0.0+31:7148"));
    }

    #[test]
    fn falls_back_to_first_value_for_legacy_shape() {
        let map = json!({
            STREAM_TYPE: { "some_other_key": "spead://10.0.0.0+7:7148" }
        });
        assert_eq!(resolve_feng_url(&map).as_deref(), Some("spead://10.0.0.0+7:7148"));
    }

    #[test]
    fn missing_stream_type_is_none() {
        assert_eq!(resolve_feng_url(&json!({})), None);
    }
}
