//! Change detection
//!
//! Decides whether the state computed by a pass differs from the snapshot
//! that was last applied. This is what keeps the name server from being
//! reloaded on every trigger, so the comparison is exact: zones, topology
//! and the transfer allowlist are compared as sets, independent of the
//! order they were built in. Zone rendering settings (mailbox, nameserver
//! names and addresses, default ttl) are compared as well, so an engine
//! rebuilt with new settings regenerates without being forced.
//!
//! A missing or unreadable snapshot always counts as a change.

use crate::aggregate::ZoneSet;
use crate::config::ZoneConfig;
use crate::snapshot::ReconciliationSnapshot;
use crate::topology::ClusterTopology;
use std::collections::BTreeSet;
use std::net::IpAddr;
use tracing::debug;

/// State computed by the current pass
#[derive(Debug, Clone, Copy)]
pub struct DesiredState<'a> {
    pub zones: &'a ZoneSet,
    pub topology: &'a ClusterTopology,
    pub secondary_transfer_ips: &'a BTreeSet<IpAddr>,
    pub settings: &'a ZoneConfig,
}

/// Return true when the configuration must be regenerated
pub fn has_changed(current: &DesiredState<'_>, previous: Option<&ReconciliationSnapshot>) -> bool {
    let Some(previous) = previous else {
        debug!("No previous snapshot, assuming change");
        return true;
    };

    if current.zones != &previous.zones {
        debug!("Zones changed since last snapshot");
        return true;
    }

    if previous.topology.as_ref() != Some(current.topology) {
        debug!("Topology changed since last snapshot");
        return true;
    }

    if current.secondary_transfer_ips != &previous.secondary_transfer_ips {
        debug!("Secondary transfer addresses changed since last snapshot");
        return true;
    }

    if previous.settings.as_ref() != Some(current.settings) {
        debug!("Zone settings changed since last snapshot");
        return true;
    }

    false
}
