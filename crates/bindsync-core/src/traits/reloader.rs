// # Reloader Trait
//
// Defines the interface to the process supervisor running the name server.
//
// ## Implementations
//
// - systemd: `bindsync-reload-systemd` crate

use async_trait::async_trait;

/// Result of a reload request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// The service was running (or was force-started) and picked up the
    /// new configuration
    Reloaded,
    /// The service was stopped and was left stopped
    NotRunning,
}

/// Trait for name-server process control
///
/// # Rules
///
/// - `reload(false)` must only restart a service that is already running.
///   A server an operator stopped on purpose is never resurrected by a
///   reconciliation pass.
/// - `start()` is a separate, explicitly triggered operation.
/// - No retries: return the error, the next trigger decides what happens.
#[async_trait]
pub trait Reloader: Send + Sync {
    /// Reload the name-server configuration
    ///
    /// # Parameters
    ///
    /// - `force_start`: start the service even if it is currently inactive
    async fn reload(&self, force_start: bool) -> Result<ReloadOutcome, crate::Error>;

    /// Start the name server
    async fn start(&self) -> Result<(), crate::Error>;

    /// Name of the managed service (for logging)
    fn service_name(&self) -> &str;
}
