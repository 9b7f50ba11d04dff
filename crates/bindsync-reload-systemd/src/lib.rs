// # systemd Reloader
//
// Controls the name server through `systemctl`.
//
// ## Behaviour
//
// - `reload(false)`: `systemctl is-active --quiet <unit>`; when active,
//   `systemctl reload-or-restart <unit>`. An inactive unit is left alone.
// - `reload(true)`: `systemctl reload-or-restart <unit>` unconditionally,
//   which also starts an inactive unit.
// - `start()`: `systemctl start <unit>`.
//
// Every call runs a single command and reports its failure as
// `Error::Reload`. There are no retries here; the caller owns that decision.

use async_trait::async_trait;
use bindsync_core::traits::{ReloadOutcome, Reloader};
use bindsync_core::{Error, Result};
use std::ffi::OsString;
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;
use tracing::debug;

/// Default unit name of the name server
pub const DEFAULT_UNIT: &str = "named.service";

/// Default `systemctl` binary, resolved through `PATH`
pub const DEFAULT_SYSTEMCTL: &str = "systemctl";

/// Reloader backed by `systemctl`
#[derive(Debug, Clone)]
pub struct SystemdReloader {
    /// Managed unit, e.g. `named.service`
    unit: String,

    /// `systemctl` binary to invoke
    systemctl: OsString,
}

impl SystemdReloader {
    /// Create a reloader for `unit`
    pub fn new(unit: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            systemctl: OsString::from(DEFAULT_SYSTEMCTL),
        }
    }

    /// Use another `systemctl` binary
    pub fn with_systemctl(mut self, systemctl: impl Into<OsString>) -> Self {
        self.systemctl = systemctl.into();
        self
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Whether the unit is currently active
    pub async fn is_active(&self) -> Result<bool> {
        let status = self.run(&["is-active", "--quiet"]).await?;
        Ok(status.success())
    }

    async fn run(&self, args: &[&str]) -> Result<ExitStatus> {
        debug!(
            "Running {} {} {}",
            self.systemctl.to_string_lossy(),
            args.join(" "),
            self.unit
        );

        Command::new(&self.systemctl)
            .args(args)
            .arg(&self.unit)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| {
                Error::reload(format!(
                    "Failed to run {}: {}",
                    self.systemctl.to_string_lossy(),
                    e
                ))
            })
    }

    async fn run_checked(&self, action: &str) -> Result<()> {
        let status = self.run(&[action]).await?;
        if status.success() {
            Ok(())
        } else {
            Err(Error::reload(format!(
                "systemctl {} {} failed: {}",
                action, self.unit, status
            )))
        }
    }
}

impl Default for SystemdReloader {
    fn default() -> Self {
        Self::new(DEFAULT_UNIT)
    }
}

#[async_trait]
impl Reloader for SystemdReloader {
    async fn reload(&self, force_start: bool) -> Result<ReloadOutcome> {
        if !force_start && !self.is_active().await? {
            debug!("{} is inactive, not reloading", self.unit);
            return Ok(ReloadOutcome::NotRunning);
        }

        self.run_checked("reload-or-restart").await?;
        Ok(ReloadOutcome::Reloaded)
    }

    async fn start(&self) -> Result<()> {
        self.run_checked("start").await
    }

    fn service_name(&self) -> &str {
        &self.unit
    }
}
