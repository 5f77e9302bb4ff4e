//! Stream Plan Builder (pure, no I/O).
//!
//! Parses a SPEAD multicast stream descriptor and partitions its address
//! range across a set of processing nodes, fill-first: every node but
//! the last gets a full `streams_per_instance` share, the last node gets
//! the remainder. If the range holds more streams than the fleet can
//! take, every node is filled and the excess is dropped with a warning.

use crate::error::{CoordinatorError, Result};
use tracing::warn;

/// One node's share of a multicast stream range: `base_addr+count-1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamGroup {
    pub addr_prefix: String,
    pub start_octet: u8,
    /// Number of streams in this group, i.e. `n_addrs` (0-based range is
    /// `start_octet..=start_octet+count-1`).
    pub count: u32,
}

impl StreamGroup {
    /// Renders the `DESTIP` gateway value, e.g. `239.0.0.8+3`.
    pub fn to_destip(&self) -> String {
        if self.count <= 1 {
            format!("{}.{}", self.addr_prefix, self.start_octet)
        } else {
            format!("{}.{}+{}", self.addr_prefix, self.start_octet, self.count - 1)
        }
    }

    /// `NSTRM` as published to the node: `int(addr[-1]) + 1` in the
    /// original, i.e. the stream count itself.
    pub fn nstrm(&self) -> u32 {
        self.count
    }
}

/// A fully resolved stream plan: one group per allocated node, plus the
/// starting absolute channel index for that node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodePlan {
    pub group: StreamGroup,
    pub schan: u64,
}

/// Parses `spead://A.B.C.D[+N]:PORT` into `(prefix, last_octet, n_addrs, port)`.
/// The degenerate form with no `+N` yields `n_addrs = 1`.
pub fn parse_spead_url(url: &str) -> Result<(String, u8, u32, u16)> {
    let rest = url
        .strip_prefix("spead://")
        .ok_or_else(|| CoordinatorError::Plan(format!("not a spead:// url: {url}")))?;
    let (addrs, port) = rest
        .split_once(':')
        .ok_or_else(|| CoordinatorError::Plan(format!("missing port in url: {url}")))?;
    let port: u16 = port
        .parse()
        .map_err(|_| CoordinatorError::Plan(format!("invalid port in url: {url}")))?;

    let (addr0, n_extra) = match addrs.split_once('+') {
        Some((addr, n)) => {
            let n: u32 = n
                .parse()
                .map_err(|_| CoordinatorError::Plan(format!("invalid group count in url: {url}")))?;
            (addr, n)
        }
        None => (addrs, 0),
    };

    let (prefix, last) = addr0
        .rsplit_once('.')
        .ok_or_else(|| CoordinatorError::Plan(format!("invalid ipv4 address: {addr0}")))?;
    let last: u16 = last
        .parse()
        .map_err(|_| CoordinatorError::Plan(format!("invalid ipv4 address: {addr0}")))?;
    if last > 255 {
        return Err(CoordinatorError::Plan(format!("address octet out of range: {addr0}")));
    }

    Ok((prefix.to_string(), last as u8, n_extra + 1, port))
}

/// Fill-first partition of `n_addrs` (after `offset` is skipped) across
/// `n_nodes` nodes with `streams_per_instance` capacity each.
pub fn build_plan(
    addr_prefix: &str,
    base_octet: u8,
    n_addrs: u32,
    n_nodes: u32,
    streams_per_instance: u32,
    offset: u32,
) -> Result<Vec<StreamGroup>> {
    if streams_per_instance == 0 {
        return Err(CoordinatorError::Plan("streams_per_instance must be > 0".into()));
    }
    if offset > n_addrs {
        return Err(CoordinatorError::Plan("offset exceeds address range".into()));
    }
    let remaining = n_addrs - offset;
    let max_octet = base_octet as u32 + offset + remaining.saturating_sub(1);
    if remaining > 0 && max_octet > 255 {
        return Err(CoordinatorError::Plan(format!(
            "address range overflows final octet: base={base_octet} offset={offset} n_addrs={n_addrs}"
        )));
    }

    let mut groups = Vec::new();
    let total_capacity = n_nodes * streams_per_instance;

    if remaining > total_capacity {
        warn!(
            "Stream descriptor has {remaining} streams but fleet capacity is only {total_capacity}; {} streams dropped",
            remaining - total_capacity
        );
        let mut octet = base_octet as u32 + offset;
        for _ in 0..n_nodes {
            groups.push(StreamGroup {
                addr_prefix: addr_prefix.to_string(),
                start_octet: octet as u8,
                count: streams_per_instance,
            });
            octet += streams_per_instance;
        }
    } else {
        let n_instances_req = remaining.div_ceil(streams_per_instance).max(1);
        let mut octet = base_octet as u32 + offset;
        let mut left = remaining;
        for i in 0..n_instances_req {
            let count = if i == n_instances_req - 1 {
                left
            } else {
                streams_per_instance
            };
            groups.push(StreamGroup {
                addr_prefix: addr_prefix.to_string(),
                start_octet: octet as u8,
                count,
            });
            octet += count;
            left -= count;
        }
    }

    Ok(groups)
}

/// Attaches the starting absolute channel index to each group:
/// `SCHAN_i = (offset + i*streams_per_instance) * hnchan`.
pub fn attach_schan(groups: Vec<StreamGroup>, offset: u32, hnchan: u64) -> Vec<NodePlan> {
    groups
        .into_iter()
        .enumerate()
        .map(|(i, group)| NodePlan {
            schan: (offset as u64 + i as u64 * group.count as u64) * hnchan,
            group,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parses_grouped_url() {
        let (prefix, octet, n_addrs, port) = parse_spead_url("spead://239.0.0.0+31:7148").unwrap();
        assert_eq!(prefix, "239.0.0");
        assert_eq!(octet, 0);
        assert_eq!(n_addrs, 32);
        assert_eq!(port, 7148);
    }

    #[test]
    fn degenerate_url_has_one_address() {
        let (_, octet, n_addrs, _) = parse_spead_url("spead://10.0.0.5:7148").unwrap();
        assert_eq!(octet, 5);
        assert_eq!(n_addrs, 1);
    }

    #[test]
    fn scenario_configure_with_offset() {
        // 32 addresses total, ip_offset=8 skips the first 8, leaving 24 to
        // place across an 8-node, 4-per-node fleet: 6 nodes get filled,
        // 2 stay free (fill-first never pads unused capacity).
        let groups = build_plan("239.0.0", 0, 32, 8, 4, 8).unwrap();
        assert_eq!(groups.len(), 6);
        for (i, g) in groups.iter().enumerate() {
            assert_eq!(g.start_octet, 8 + 4 * i as u8);
            assert_eq!(g.count, 4);
        }
    }

    #[test]
    fn partial_band_fills_and_warns() {
        let groups = build_plan("239.0.0", 0, 32, 4, 4, 0).unwrap();
        assert_eq!(groups.len(), 4);
        assert!(groups.iter().all(|g| g.count == 4));
    }

    #[test]
    fn degenerate_single_group() {
        let groups = build_plan("10.0.0", 5, 1, 4, 4, 0).unwrap();
        assert_eq!(groups, vec![StreamGroup { addr_prefix: "10.0.0".into(), start_octet: 5, count: 1 }]);
        assert_eq!(groups[0].to_destip(), "10.0.0.5");
    }

    #[test]
    fn overflowing_octet_is_rejected() {
        let err = build_plan("239.0.0", 250, 32, 8, 4, 0);
        assert!(err.is_err());
    }

    #[test]
    fn schan_uses_offset_and_group_size() {
        let groups = build_plan("239.0.0", 0, 32, 8, 4, 8).unwrap();
        let plans = attach_schan(groups, 8, 256);
        assert_eq!(plans[0].schan, 8 * 256);
        assert_eq!(plans[1].schan, 12 * 256);
    }

    proptest::proptest! {
        #[test]
        fn total_assigned_never_exceeds_capacity_or_demand(
            n_addrs in 1u32..64,
            n_nodes in 1u32..16,
            spi in 1u32..16,
        ) {
            let groups = build_plan("239.0.0", 0, n_addrs, n_nodes, spi, 0).unwrap();
            let assigned: u32 = groups.iter().map(|g| g.count).sum();
            let capacity = n_nodes * spi;
            prop_assert!(assigned <= capacity);
            prop_assert!(assigned <= n_addrs);
            prop_assert!(assigned == n_addrs.min(capacity));
        }
    }
}
