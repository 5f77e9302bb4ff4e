//! Classifies a single continuous-update sensor frame and decides what,
//! if anything, to republish onto sensor-alerts. Grounded in
//! `katportal_server.py::on_update_callback_fn`'s `elif` chain.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    DataSuspect { mask: String },
    Tracking { tracking: bool },
    PosRequest,
    Target,
    Unsubscribe,
    None,
}

pub fn classify(sensor_name: &str, value: &str, status: &str) -> Action {
    if sensor_name.contains("script_status") && value != "busy" {
        return Action::Unsubscribe;
    }
    if sensor_name.contains("data_suspect") {
        return if status == "nominal" {
            Action::DataSuspect { mask: value.to_string() }
        } else {
            Action::None
        };
    }
    if sensor_name.contains("pos_request_base") {
        return Action::PosRequest;
    }
    if sensor_name.contains("target") {
        return Action::Target;
    }
    if sensor_name.contains("activity") {
        return Action::Tracking { tracking: value == "track" };
    }
    Action::None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_suspect_requires_nominal_status() {
        assert_eq!(classify("m000_data_suspect", "1", "nominal"), Action::DataSuspect { mask: "1".into() });
        assert_eq!(classify("m000_data_suspect", "1", "warn"), Action::None);
    }

    #[test]
    fn activity_track_is_tracking() {
        assert_eq!(classify("subarray_1_observation_activity", "track", "nominal"), Action::Tracking { tracking: true });
        assert_eq!(classify("subarray_1_observation_activity", "slew", "nominal"), Action::Tracking { tracking: false });
    }

    #[test]
    fn pos_request_base_is_passed_through() {
        assert_eq!(classify("m000_pos_request_base_ra", "3.1", "nominal"), Action::PosRequest);
    }

    #[test]
    fn non_busy_script_status_triggers_unsubscribe() {
        assert_eq!(classify("subarray_1_script_status", "done", "nominal"), Action::Unsubscribe);
        assert_eq!(classify("subarray_1_script_status", "busy", "nominal"), Action::None);
    }
}
