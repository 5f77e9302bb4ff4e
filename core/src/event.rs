//! Closed, tagged-variant event dispatch.
//!
//! Every channel in §6 (lifecycle-alerts, sensor-alerts, trigger-control)
//! carries `<type>:<description>[:<value>]` messages (colon-delimited,
//! split into at most three fields). `parse_event` turns that wire format
//! into one exhaustive enum so handlers match on variants, never on
//! strings.

use crate::error::{CoordinatorError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointingAxis {
    Ra,
    Dec,
    Azim,
    Elev,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Configure { product_id: String },
    CaptureInit { product_id: String },
    CaptureStart { product_id: String },
    CaptureStop { product_id: String },
    CaptureDone { product_id: String },
    Deconfigure { product_id: String },
    ConfComplete { product_id: String },
    Tracking { product_id: String },
    NotTracking { product_id: String },
    DataSuspect { product_id: String, mask: String },
    Pointing { product_id: String, axis: PointingAxis, value: f64 },
    TriggerModeChange { value: String },
}

/// Parses a raw pub/sub payload. Returns `Ok(None)` for a well-formed but
/// unrecognized message type (log and skip, per §7). Returns `Err` only
/// for messages with fewer than two colon-delimited fields.
pub fn parse_event(raw: &str) -> Result<Option<Event>> {
    let parts: Vec<&str> = raw.splitn(3, ':').collect();
    if parts.len() < 2 {
        return Err(CoordinatorError::MalformedEvent(raw.to_string()));
    }

    let event = match parts[0] {
        "configure" => Event::Configure { product_id: parts[1].to_string() },
        "capture-init" => Event::CaptureInit { product_id: parts[1].to_string() },
        "capture-start" => Event::CaptureStart { product_id: parts[1].to_string() },
        "capture-stop" => Event::CaptureStop { product_id: parts[1].to_string() },
        "capture-done" => Event::CaptureDone { product_id: parts[1].to_string() },
        "deconfigure" => Event::Deconfigure { product_id: parts[1].to_string() },
        "conf_complete" => Event::ConfComplete { product_id: parts[1].to_string() },
        "tracking" => Event::Tracking { product_id: parts[1].to_string() },
        "not-tracking" => Event::NotTracking { product_id: parts[1].to_string() },
        "data-suspect" => {
            let mask = parts.get(2).copied().unwrap_or("").to_string();
            Event::DataSuspect { product_id: parts[1].to_string(), mask }
        }
        "coordinator" => {
            if parts[1] != "trigger_mode" {
                return Ok(None);
            }
            let value = parts.get(2).copied().unwrap_or("idle").to_string();
            Event::TriggerModeChange { value }
        }
        product_id if parts.len() == 3 && parts[1].contains("pos_request_base") => {
            let axis = if parts[1].ends_with("ra") {
                PointingAxis::Ra
            } else if parts[1].ends_with("dec") {
                PointingAxis::Dec
            } else if parts[1].ends_with("azim") {
                PointingAxis::Azim
            } else if parts[1].ends_with("elev") {
                PointingAxis::Elev
            } else {
                return Ok(None);
            };
            let value: f64 = parts[2]
                .parse()
                .map_err(|_| CoordinatorError::MalformedEvent(raw.to_string()))?;
            Event::Pointing { product_id: product_id.to_string(), axis, value }
        }
        _ => return Ok(None),
    };

    Ok(Some(event))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_conf_complete() {
        assert_eq!(
            parse_event("conf_complete:array_1").unwrap(),
            Some(Event::ConfComplete { product_id: "array_1".into() })
        );
    }

    #[test]
    fn parses_data_suspect_with_mask() {
        assert_eq!(
            parse_event("data-suspect:array_1:1010").unwrap(),
            Some(Event::DataSuspect { product_id: "array_1".into(), mask: "1010".into() })
        );
    }

    #[test]
    fn parses_trigger_mode_change() {
        assert_eq!(
            parse_event("coordinator:trigger_mode:armed").unwrap(),
            Some(Event::TriggerModeChange { value: "armed".into() })
        );
    }

    #[test]
    fn parses_pointing_update_with_product_id_first() {
        assert_eq!(
            parse_event("array_1:pos_request_base_ra:12.5").unwrap(),
            Some(Event::Pointing { product_id: "array_1".into(), axis: PointingAxis::Ra, value: 12.5 })
        );
    }

    #[test]
    fn malformed_message_is_an_error() {
        assert!(parse_event("justonefield").is_err());
    }

    #[test]
    fn unrecognized_type_is_skipped() {
        assert_eq!(parse_event("unknown:array_1").unwrap(), None);
    }
}
