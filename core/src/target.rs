//! Target Formatter (pure, no I/O).
//!
//! Parses a CAM target string such as
//! `"J0918-1205 | Hyd A, radec, 9:18:05.28, -12:05:48.9"` into a
//! sanitized source name (suitable for a fixed-length file header field)
//! and RA/Dec strings.

const PUNCTUATION_TO_UNDERSCORE: &str = "!\"#$%&'()*,./:;<=>?@[\\]^_`{|}~";
const NAME_MAX_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedTarget {
    pub src_name: String,
    pub ra_str: String,
    pub dec_str: String,
}

/// Returns `None` if the target string contains neither `radec target,`
/// nor `radec,` — the two delimiter forms CAM emits.
pub fn format_target(target: &str) -> Option<FormattedTarget> {
    let (name_part, coord_part) = split_on_delimiter(target)?;

    let raw_name = name_part.split('|').next().unwrap_or("").trim();
    let raw_name = raw_name.trim_end_matches(',').trim();
    let src_name = sanitize_name(raw_name);

    let mut coords = coord_part.splitn(2, ',');
    let ra_str = coords.next().unwrap_or("").trim().to_string();
    let dec_str = coords.next().unwrap_or("").trim().to_string();

    Some(FormattedTarget { src_name, ra_str, dec_str })
}

fn split_on_delimiter(target: &str) -> Option<(&str, &str)> {
    if let Some(pos) = target.find("radec target,") {
        let (name, rest) = target.split_at(pos);
        Some((name, &rest["radec target,".len()..]))
    } else if let Some(pos) = target.find("radec,") {
        let (name, rest) = target.split_at(pos);
        Some((name, &rest["radec,".len()..]))
    } else {
        None
    }
}

fn sanitize_name(raw: &str) -> String {
    if raw.is_empty() {
        return "NOT_PROVIDED".to_string();
    }
    let replaced: String = raw
        .chars()
        .map(|c| if PUNCTUATION_TO_UNDERSCORE.contains(c) { '_' } else { c })
        .collect();
    replaced.chars().take(NAME_MAX_LEN).collect()
}

/// Converts an RA value in hours (as published by `pos_request_base_ra`)
/// to degrees.
pub fn ra_hours_to_degrees(hours: f64) -> f64 {
    hours * 15.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_target_string() {
        let t = format_target("J0918-1205 | Hyd A, radec, 9:18:05.28, -12:05:48.9").unwrap();
        assert_eq!(t.src_name, "J0918-1205");
        assert_eq!(t.ra_str, "9:18:05.28");
        assert_eq!(t.dec_str, "-12:05:48.9");
    }

    #[test]
    fn prefers_radec_target_delimiter() {
        let t = format_target("3c286 | J1331+3030, radec target, 13:31:08.29, 30:30:33.0").unwrap();
        assert_eq!(t.src_name, "3c286");
    }

    #[test]
    fn empty_name_becomes_not_provided() {
        let t = format_target(" | , radec, 1:00:00.0, 2:00:00.0").unwrap();
        assert_eq!(t.src_name, "NOT_PROVIDED");
    }

    #[test]
    fn punctuation_is_sanitized_and_truncated() {
        let t = format_target("name:with/punct&chars-that-is-long | x, radec, 1:00:00.0, 2:00:00.0").unwrap();
        assert_eq!(t.src_name.len(), 16);
        assert!(!t.src_name.contains(':'));
        assert!(!t.src_name.contains('/'));
    }

    #[test]
    fn non_sidereal_target_without_delimiter_is_none() {
        assert_eq!(format_target("azel, 10.0, 20.0"), None);
    }

    #[test]
    fn ra_hours_converts_to_degrees() {
        assert!((ra_hours_to_degrees(12.5) - 187.5).abs() < 1e-9);
    }
}
