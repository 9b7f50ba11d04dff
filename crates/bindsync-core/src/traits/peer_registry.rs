// # Peer Registry Trait
//
// Source of the raw peer group data a topology is computed from: the
// address every unit reported, the elected active-unit marker and the local
// network binding. Leader election itself happens elsewhere; the registry
// only exposes its outcome.

use crate::topology::PeerView;
use async_trait::async_trait;

/// Trait for peer registry implementations
#[async_trait]
pub trait PeerRegistry: Send + Sync {
    /// Read the current peer group
    ///
    /// # Returns
    ///
    /// - `Ok(PeerView)`: The peer group data
    /// - `Err(Error::TopologyUnavailable)`: The peer group is not established
    ///   yet or cannot be read
    async fn peer_view(&self) -> Result<PeerView, crate::Error>;
}
