//! Start-Index Selector (pure, no I/O).
//!
//! Picks a single safe `PKTSTART` from packet counters reported by the
//! active nodes of a subarray: take the median, flag anything more than
//! `margin` away from it as an outlier, then choose the largest
//! non-outlier value and add the margin as a safety cushion.

use tracing::warn;

/// `PKTIDX` reported by a single active node.
#[derive(Debug, Clone, Copy)]
pub struct ActivePacketIndex {
    pub pktidx: i64,
}

/// Returns `None` ("no active processing nodes") if `active` is empty,
/// matching the original's "Cannot set PKTIDX" warning and skip.
pub fn select_start_index(active: &[ActivePacketIndex], margin: i64) -> Option<i64> {
    if active.is_empty() {
        warn!("No active processing nodes. Cannot set PKTIDX");
        return None;
    }

    let mut values: Vec<i64> = active.iter().map(|a| a.pktidx).collect();
    let median = median_of(&mut values);

    let outlier_count = values.iter().filter(|&&x| (x - median).abs() > margin).count();
    if outlier_count > 0 {
        warn!("{outlier_count} of {} PKTIDX readings are outliers (median={median})", values.len());
    }
    if outlier_count * 2 > values.len() {
        warn!("More than half of PKTIDX readings are outliers; start index may be unreliable");
    }

    let best = values
        .iter()
        .copied()
        .filter(|&x| (x - median).abs() <= margin)
        .max()
        .unwrap_or(median);

    Some(best + margin)
}

fn median_of(values: &mut [i64]) -> i64 {
    values.sort_unstable();
    let mid = values.len() / 2;
    if values.len().is_multiple_of(2) {
        (values[mid - 1] + values[mid]) / 2
    } else {
        values[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idx(v: i64) -> ActivePacketIndex {
        ActivePacketIndex { pktidx: v }
    }

    #[test]
    fn no_active_nodes_returns_none() {
        assert_eq!(select_start_index(&[], 1024), None);
    }

    #[test]
    fn scenario_outlier_is_excluded() {
        let active = vec![idx(1000), idx(1005), idx(999_999)];
        assert_eq!(select_start_index(&active, 1024), Some(1005 + 1024));
    }

    #[test]
    fn agreeing_nodes_pick_the_largest() {
        let active = vec![idx(500), idx(510), idx(505)];
        assert_eq!(select_start_index(&active, 1024), Some(510 + 1024));
    }

    #[test]
    fn single_node_uses_its_own_value() {
        let active = vec![idx(42)];
        assert_eq!(select_start_index(&active, 1024), Some(42 + 1024));
    }
}
