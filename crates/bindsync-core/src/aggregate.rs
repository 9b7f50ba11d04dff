//! Zone aggregation
//!
//! Turns every requester's raw asks into [`Zone`]s and merges them across
//! requesters. There is no last-writer-wins: zones sharing a domain are
//! unioned, identical entries collapse, and two different answers for the
//! same name both survive here so that [`crate::conflict`] can flag them.

use crate::model::{DnsRecordEntry, RequesterSubmission, ValidationError, Zone};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Zones keyed by domain
pub type ZoneSet = BTreeMap<String, Zone>;

/// An ask that failed validation and was left out of its zone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedRequest {
    pub requester: String,
    pub request_id: String,
    pub error: ValidationError,
}

/// Output of [`aggregate`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Aggregation {
    /// Merged zones of every requester
    pub zones: ZoneSet,
    /// Asks excluded because they failed validation
    pub rejected: Vec<RejectedRequest>,
}

impl Aggregation {
    /// Total number of distinct entries across all zones
    pub fn entry_count(&self) -> usize {
        self.zones.values().map(Zone::len).sum()
    }
}

/// Group one requester's asks by domain
///
/// Invalid asks are returned alongside the zones; they never abort the rest
/// of the batch.
pub fn requester_zones(
    submission: &RequesterSubmission,
) -> (Vec<Zone>, Vec<RejectedRequest>) {
    let mut zones: BTreeMap<String, Zone> = BTreeMap::new();
    let mut rejected = Vec::new();

    for request in &submission.requests {
        match DnsRecordEntry::from_request(request) {
            Ok(entry) => {
                zones
                    .entry(entry.domain().to_string())
                    .or_insert_with(|| Zone::new(entry.domain()))
                    .insert(entry);
            }
            Err(error) => {
                warn!(
                    "Rejected request {} from {}: {}",
                    request.id, submission.requester, error
                );
                rejected.push(RejectedRequest {
                    requester: submission.requester.clone(),
                    request_id: request.id.clone(),
                    error,
                });
            }
        }
    }

    (zones.into_values().collect(), rejected)
}

/// Build the merged zone set of all requesters
pub fn aggregate(submissions: &[RequesterSubmission]) -> Aggregation {
    let mut aggregation = Aggregation::default();

    for submission in submissions {
        let (zones, rejected) = requester_zones(submission);
        for zone in zones {
            match aggregation.zones.get_mut(zone.domain()) {
                Some(existing) => existing.merge(zone),
                None => {
                    aggregation.zones.insert(zone.domain().to_string(), zone);
                }
            }
        }
        aggregation.rejected.extend(rejected);
    }

    debug!(
        "Aggregated {} requester(s) into {} zone(s), {} entries, {} rejected",
        submissions.len(),
        aggregation.zones.len(),
        aggregation.entry_count(),
        aggregation.rejected.len()
    );

    aggregation
}
