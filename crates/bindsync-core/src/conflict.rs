//! Conflict resolution
//!
//! Partitions every entry of a zone set into non-conflicting and conflicting
//! entries. Entries are grouped by [`ConflictKey`]; a key holding a single
//! distinct entry is accepted, a key holding two or more structurally
//! different entries rejects the whole group. Nobody arbitrates between
//! requesters, so neither side of a conflict wins.
//!
//! Grouping goes through an explicit `BTreeMap<ConflictKey, Vec<_>>`, so the
//! result does not depend on the order zones or entries are visited in.

use crate::aggregate::{RejectedRequest, ZoneSet};
use crate::model::{ConflictKey, DnsRecordEntry, RequesterSubmission};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Approval status relayed to each requester for each ask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// The entry is served
    Approved,
    /// Another requester asked for a different answer for the same name
    Conflict,
    /// The ask failed validation
    InvalidData,
    /// The ask is not part of the computed zone set
    Unknown,
}

/// Status of one ask, keyed by requester and request id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestStatus {
    pub requester: String,
    pub request_id: String,
    pub status: Status,
}

/// Output of [`resolve`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub non_conflicting: BTreeSet<DnsRecordEntry>,
    pub conflicting: BTreeSet<DnsRecordEntry>,
    groups: BTreeMap<ConflictKey, Vec<DnsRecordEntry>>,
}

impl Resolution {
    /// Conflicting entries grouped by the name they compete for
    pub fn conflict_groups(&self) -> &BTreeMap<ConflictKey, Vec<DnsRecordEntry>> {
        &self.groups
    }

    pub fn has_conflicts(&self) -> bool {
        !self.conflicting.is_empty()
    }

    /// Status of a single validated entry
    pub fn status_of(&self, entry: &DnsRecordEntry) -> Status {
        if self.non_conflicting.contains(entry) {
            Status::Approved
        } else if self.conflicting.contains(entry) {
            Status::Conflict
        } else {
            Status::Unknown
        }
    }

    /// Keep only the non-conflicting entries of every zone
    ///
    /// Zones whose every entry is in conflict are kept (empty) so that the
    /// domain stays registered.
    pub fn accepted_zones(&self, zones: &ZoneSet) -> ZoneSet {
        zones
            .iter()
            .map(|(domain, zone)| {
                (
                    domain.clone(),
                    zone.filtered(|e| self.non_conflicting.contains(e)),
                )
            })
            .collect()
    }
}

/// Split the entries of `zones` into non-conflicting and conflicting sets
pub fn resolve(zones: &ZoneSet) -> Resolution {
    let mut look_alikes: BTreeMap<ConflictKey, BTreeSet<DnsRecordEntry>> = BTreeMap::new();
    for zone in zones.values() {
        for entry in zone.entries() {
            look_alikes
                .entry(entry.conflict_key())
                .or_default()
                .insert(entry.clone());
        }
    }

    let mut resolution = Resolution::default();
    for (key, entries) in look_alikes {
        if entries.len() == 1 {
            resolution.non_conflicting.extend(entries);
            continue;
        }

        warn!(
            "Conflicting requests for {}: {} different answers",
            key,
            entries.len()
        );
        resolution.conflicting.extend(entries.iter().cloned());
        resolution.groups.insert(key, entries.into_iter().collect());
    }

    debug!(
        "Resolved {} non-conflicting and {} conflicting entries",
        resolution.non_conflicting.len(),
        resolution.conflicting.len()
    );

    resolution
}

/// Map every ask of every requester to its approval status
///
/// Asks listed in `rejected` are reported as [`Status::InvalidData`]; the
/// others are parsed again and looked up in `resolution`.
pub fn request_statuses(
    submissions: &[RequesterSubmission],
    resolution: &Resolution,
    rejected: &[RejectedRequest],
) -> Vec<RequestStatus> {
    let rejected: BTreeSet<(&str, &str)> = rejected
        .iter()
        .map(|r| (r.requester.as_str(), r.request_id.as_str()))
        .collect();

    let mut statuses = Vec::new();
    for submission in submissions {
        for request in &submission.requests {
            let status = if rejected.contains(&(submission.requester.as_str(), request.id.as_str()))
            {
                Status::InvalidData
            } else {
                match DnsRecordEntry::from_request(request) {
                    Ok(entry) => resolution.status_of(&entry),
                    Err(_) => Status::InvalidData,
                }
            };
            statuses.push(RequestStatus {
                requester: submission.requester.clone(),
                request_id: request.id.clone(),
                status,
            });
        }
    }
    statuses
}
