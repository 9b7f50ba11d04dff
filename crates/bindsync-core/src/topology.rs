// # Cluster Topology
//
// Computed view of which unit is the active (primary) name server and
// which units are standbys (secondaries).
//
// ## Rules
//
// - `units_ip`: every peer that reported a non-empty address
// - `active_unit_ip`: the address published by the externally elected
//   active marker, absent before the first election
// - `standby_units_ip`: `units_ip` minus the active unit
// - `current_unit_ip`: the address this process is bound to
//
// The topology is recomputed on every pass and is never the persisted
// truth; only the last applied snapshot is stored, for diffing.

use crate::error::{Error, Result};
use crate::traits::PeerRegistry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::time::Instant;
use tracing::debug;

/// Raw peer group data as read from the peer registry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerView {
    /// Addresses reported by every unit of the peer group, possibly empty
    /// for units that have not published one yet
    #[serde(default)]
    pub unit_addresses: Vec<String>,

    /// Address published under the active-unit marker
    #[serde(default)]
    pub active_unit: Option<String>,

    /// Address of the local network binding
    #[serde(default)]
    pub bind_address: Option<String>,
}

/// Role and address view of the cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterTopology {
    units_ip: BTreeSet<IpAddr>,
    active_unit_ip: Option<IpAddr>,
    standby_units_ip: BTreeSet<IpAddr>,
    current_unit_ip: IpAddr,
}

impl ClusterTopology {
    /// Build a topology, deriving the standby set
    pub fn new(
        units_ip: impl IntoIterator<Item = IpAddr>,
        active_unit_ip: Option<IpAddr>,
        current_unit_ip: IpAddr,
    ) -> Self {
        let units_ip: BTreeSet<IpAddr> = units_ip.into_iter().collect();
        let standby_units_ip = units_ip
            .iter()
            .filter(|ip| Some(**ip) != active_unit_ip)
            .copied()
            .collect();

        Self {
            units_ip,
            active_unit_ip,
            standby_units_ip,
            current_unit_ip,
        }
    }

    pub fn units_ip(&self) -> &BTreeSet<IpAddr> {
        &self.units_ip
    }

    pub fn active_unit_ip(&self) -> Option<IpAddr> {
        self.active_unit_ip
    }

    pub fn standby_units_ip(&self) -> &BTreeSet<IpAddr> {
        &self.standby_units_ip
    }

    pub fn current_unit_ip(&self) -> IpAddr {
        self.current_unit_ip
    }

    pub fn is_current_unit_active(&self) -> bool {
        Some(self.current_unit_ip) == self.active_unit_ip
    }

    /// Addresses published as name servers
    ///
    /// The active unit stays hidden: standbys answer queries and receive
    /// NOTIFYs. A single-unit deployment has no standby and falls back to
    /// the current unit. Operator-provided public addresses take precedence
    /// when the private ones are not reachable from outside.
    pub fn nameserver_ips(&self, public_ips: &[IpAddr]) -> BTreeSet<IpAddr> {
        if !public_ips.is_empty() {
            return public_ips.iter().copied().collect();
        }
        if !self.standby_units_ip.is_empty() {
            return self.standby_units_ip.clone();
        }
        BTreeSet::from([self.current_unit_ip])
    }

    /// Addresses advertised to upstream authorities and secondary servers
    pub fn advertised_addresses(&self) -> BTreeSet<IpAddr> {
        if self.standby_units_ip.is_empty() {
            self.units_ip.clone()
        } else {
            self.standby_units_ip.clone()
        }
    }
}

/// Compute a topology from raw peer data
///
/// Fails with [`Error::TopologyUnavailable`] when the network binding is
/// missing or an address cannot be parsed.
pub fn compute(view: &PeerView) -> Result<ClusterTopology> {
    let bind_address = view
        .bind_address
        .as_deref()
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .ok_or_else(|| Error::topology("peer network binding not available"))?;
    let current_unit_ip = parse_ip(bind_address, "bind address")?;

    let mut units_ip = Vec::new();
    for address in view.unit_addresses.iter().map(|a| a.trim()) {
        if address.is_empty() {
            continue;
        }
        units_ip.push(parse_ip(address, "unit address")?);
    }

    let active_unit_ip = match view.active_unit.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(address) => Some(parse_ip(address, "active unit address")?),
    };

    let topology = ClusterTopology::new(units_ip, active_unit_ip, current_unit_ip);
    debug!(
        "Topology: units={:?} active={:?} current={} (active: {})",
        topology.units_ip,
        topology.active_unit_ip,
        topology.current_unit_ip,
        topology.is_current_unit_active()
    );
    Ok(topology)
}

/// Read the peer registry and compute the current topology
pub async fn current(registry: &dyn PeerRegistry) -> Result<ClusterTopology> {
    let start = Instant::now();
    let view = registry.peer_view().await?;
    let topology = compute(&view)?;
    debug!(
        "Topology retrieval took {} ms",
        start.elapsed().as_secs_f64() * 1000.0
    );
    Ok(topology)
}

fn parse_ip(address: &str, what: &str) -> Result<IpAddr> {
    address
        .parse()
        .map_err(|e| Error::topology(format!("invalid {} '{}': {}", what, address, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn view(units: &[&str], active: Option<&str>, bind: Option<&str>) -> PeerView {
        PeerView {
            unit_addresses: units.iter().map(|s| s.to_string()).collect(),
            active_unit: active.map(str::to_string),
            bind_address: bind.map(str::to_string),
        }
    }

    #[test]
    fn derives_standbys_and_role() {
        let topology = compute(&view(
            &["1.1.1.1", "2.2.2.2", "3.3.3.3"],
            Some("1.1.1.1"),
            Some("2.2.2.2"),
        ))
        .unwrap();

        assert_eq!(
            topology.standby_units_ip(),
            &BTreeSet::from([ip("2.2.2.2"), ip("3.3.3.3")])
        );
        assert!(!topology.is_current_unit_active());
        assert_eq!(topology.active_unit_ip(), Some(ip("1.1.1.1")));
    }

    #[test]
    fn current_unit_can_be_active() {
        let topology = compute(&view(&["1.1.1.1", "2.2.2.2"], Some("2.2.2.2"), Some("2.2.2.2")))
            .unwrap();
        assert!(topology.is_current_unit_active());
        assert_eq!(topology.standby_units_ip(), &BTreeSet::from([ip("1.1.1.1")]));
    }

    #[test]
    fn skips_units_without_address() {
        let topology = compute(&view(&["1.1.1.1", "", " "], None, Some("1.1.1.1"))).unwrap();
        assert_eq!(topology.units_ip().len(), 1);
    }

    #[test]
    fn no_active_unit_before_election() {
        let topology =
            compute(&view(&["1.1.1.1", "2.2.2.2"], Some(""), Some("1.1.1.1"))).unwrap();
        assert_eq!(topology.active_unit_ip(), None);
        assert!(!topology.is_current_unit_active());
        assert_eq!(topology.standby_units_ip().len(), 2);
    }

    #[test]
    fn missing_binding_is_unavailable() {
        let err = compute(&view(&["1.1.1.1"], None, None)).unwrap_err();
        assert!(matches!(err, Error::TopologyUnavailable(_)));
    }

    #[test]
    fn malformed_address_is_unavailable() {
        let err = compute(&view(&["1.1.1"], None, Some("1.1.1.1"))).unwrap_err();
        assert!(matches!(err, Error::TopologyUnavailable(_)));
    }

    #[test]
    fn nameserver_ips_precedence() {
        let topology = ClusterTopology::new(
            [ip("1.1.1.1"), ip("2.2.2.2"), ip("3.3.3.3")],
            Some(ip("1.1.1.1")),
            ip("2.2.2.2"),
        );
        assert_eq!(
            topology.nameserver_ips(&[]),
            BTreeSet::from([ip("2.2.2.2"), ip("3.3.3.3")])
        );
        assert_eq!(
            topology.nameserver_ips(&[ip("203.0.113.2"), ip("203.0.113.1")]),
            BTreeSet::from([ip("203.0.113.1"), ip("203.0.113.2")])
        );

        let single = ClusterTopology::new([ip("1.1.1.1")], Some(ip("1.1.1.1")), ip("1.1.1.1"));
        assert_eq!(single.nameserver_ips(&[]), BTreeSet::from([ip("1.1.1.1")]));
        assert_eq!(single.advertised_addresses(), BTreeSet::from([ip("1.1.1.1")]));
    }
}
