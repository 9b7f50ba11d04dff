// # bindsyncd - bindsync Daemon
//
// Thin integration layer around bindsync-core. It contains no
// reconciliation logic:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Wiring the peer registry, snapshot store and reloader into the engine
// 4. Running one pass per tick until SIGTERM/SIGINT
//
// ## Configuration
//
// ### Zones
// - `BINDSYNC_MAILBOX`: SOA mailbox local part (required)
// - `BINDSYNC_NAMES`: Comma-separated nameserver host labels (default `ns`)
// - `BINDSYNC_PUBLIC_IPS`: Comma-separated public nameserver addresses
// - `BINDSYNC_SECONDARY_TRANSFER_IPS`: Comma-separated extra secondaries
//
// ### Paths
// - `BINDSYNC_CONFIG_DIR`: Live BIND configuration directory (default `/etc/bind`)
// - `BINDSYNC_STAGING_DIR`: Where staging directories are created
// - `BINDSYNC_REQUESTS_PATH`: JSON document with the requesters' submissions (required)
// - `BINDSYNC_PEERS_PATH`: JSON document describing the peer group (required)
// - `BINDSYNC_STATUS_PATH`: Where request statuses are published (optional)
//
// ### State Store
// - `BINDSYNC_STATE_STORE_TYPE`: Type of snapshot store (file, memory)
// - `BINDSYNC_STATE_STORE_PATH`: Path to the snapshot file (for file store)
//
// ### Service
// - `BINDSYNC_SERVICE`: systemd unit of the name server (default `named.service`)
// - `BINDSYNC_START_SERVER`: Start the name server once at startup (default false)
// - `BINDSYNC_INTERVAL_SECS`: Seconds between passes (default 60)
// - `BINDSYNC_LOG_LEVEL`: trace, debug, info, warn, error
//
// ## Example
//
// ```bash
// export BINDSYNC_MAILBOX=hostmaster
// export BINDSYNC_REQUESTS_PATH=/run/bindsync/requests.json
// export BINDSYNC_PEERS_PATH=/run/bindsync/peers.json
// export BINDSYNC_STATE_STORE_PATH=/var/lib/bindsync/state.json
//
// bindsyncd
// ```

use anyhow::Result;
use bindsync_core::config::{BindSyncConfig, PathsConfig, StateStoreConfig, ZoneConfig};
use bindsync_core::engine::{ReconcileEngine, ReconcileRequest};
use bindsync_core::traits::Reloader;
use bindsync_core::{FilePeerRegistry, snapshot};
use std::env;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::IntervalStream;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum BindSyncExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<BindSyncExitCode> for ExitCode {
    fn from(code: BindSyncExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
#[derive(Debug)]
struct Config {
    mailbox: String,
    names: Vec<String>,
    public_ips: Vec<IpAddr>,
    secondary_transfer_ips: Vec<IpAddr>,
    config_dir: PathBuf,
    staging_dir: Option<PathBuf>,
    requests_path: PathBuf,
    peers_path: PathBuf,
    status_path: Option<PathBuf>,
    state_store_type: String,
    state_store_path: Option<PathBuf>,
    service: String,
    start_server: bool,
    interval_secs: u64,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Ok(Self {
            mailbox: env::var("BINDSYNC_MAILBOX").unwrap_or_default(),
            names: split_list(&env::var("BINDSYNC_NAMES").unwrap_or_default()),
            public_ips: parse_ips(
                "BINDSYNC_PUBLIC_IPS",
                &env::var("BINDSYNC_PUBLIC_IPS").unwrap_or_default(),
            )?,
            secondary_transfer_ips: parse_ips(
                "BINDSYNC_SECONDARY_TRANSFER_IPS",
                &env::var("BINDSYNC_SECONDARY_TRANSFER_IPS").unwrap_or_default(),
            )?,
            config_dir: env::var("BINDSYNC_CONFIG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(bindsync_core::config::DEFAULT_CONFIG_DIR)),
            staging_dir: env::var("BINDSYNC_STAGING_DIR").ok().map(PathBuf::from),
            requests_path: env::var("BINDSYNC_REQUESTS_PATH")
                .map(PathBuf::from)
                .unwrap_or_default(),
            peers_path: env::var("BINDSYNC_PEERS_PATH")
                .map(PathBuf::from)
                .unwrap_or_default(),
            status_path: env::var("BINDSYNC_STATUS_PATH").ok().map(PathBuf::from),
            state_store_type: env::var("BINDSYNC_STATE_STORE_TYPE")
                .unwrap_or_else(|_| "file".to_string()),
            state_store_path: Some(
                env::var("BINDSYNC_STATE_STORE_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("/var/lib/bindsync/state.json")),
            ),
            service: env::var("BINDSYNC_SERVICE").unwrap_or_else(|_| "named.service".to_string()),
            start_server: env::var("BINDSYNC_START_SERVER")
                .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            interval_secs: match env::var("BINDSYNC_INTERVAL_SECS") {
                Ok(v) => v.parse().map_err(|e| {
                    anyhow::anyhow!("BINDSYNC_INTERVAL_SECS '{}' is not a number: {}", v, e)
                })?,
                Err(_) => 60,
            },
            log_level: env::var("BINDSYNC_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        if self.requests_path.as_os_str().is_empty() {
            anyhow::bail!(
                "BINDSYNC_REQUESTS_PATH is required. \
                Set it via: export BINDSYNC_REQUESTS_PATH=/run/bindsync/requests.json"
            );
        }

        if self.peers_path.as_os_str().is_empty() {
            anyhow::bail!(
                "BINDSYNC_PEERS_PATH is required. \
                Set it via: export BINDSYNC_PEERS_PATH=/run/bindsync/peers.json"
            );
        }

        match self.state_store_type.as_str() {
            "file" | "memory" => {}
            _ => anyhow::bail!(
                "BINDSYNC_STATE_STORE_TYPE '{}' is not supported. \
                Supported types: file, memory",
                self.state_store_type
            ),
        }

        if !(10..=3600).contains(&self.interval_secs) {
            anyhow::bail!(
                "BINDSYNC_INTERVAL_SECS must be between 10 and 3600 seconds. Got: {}",
                self.interval_secs
            );
        }

        if self.service.trim().is_empty() {
            anyhow::bail!("BINDSYNC_SERVICE cannot be empty");
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "BINDSYNC_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        self.to_core_config()
            .validate()
            .map_err(|e| anyhow::anyhow!("{}", e))?;

        Ok(())
    }

    /// Build the library configuration
    fn to_core_config(&self) -> BindSyncConfig {
        let mut config = BindSyncConfig::new(self.mailbox.clone());
        config.zone = ZoneConfig::new(self.mailbox.clone())
            .with_names(self.names.iter().cloned())
            .with_public_ips(self.public_ips.iter().copied())
            .with_secondary_transfer_ips(self.secondary_transfer_ips.iter().copied());
        config.paths = PathsConfig {
            config_dir: self.config_dir.clone(),
            staging_root: self.staging_dir.clone(),
        };
        config.state_store = match (self.state_store_type.as_str(), &self.state_store_path) {
            ("file", Some(path)) => StateStoreConfig::File { path: path.clone() },
            _ => StateStoreConfig::Memory,
        };
        config
    }
}

/// Split a comma-separated list, dropping blanks
fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_ips(var: &str, value: &str) -> Result<Vec<IpAddr>> {
    split_list(value)
        .iter()
        .map(|s| {
            s.parse()
                .map_err(|e| anyhow::anyhow!("{} contains invalid address '{}': {}", var, s, e))
        })
        .collect()
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return BindSyncExitCode::ConfigError.into();
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return BindSyncExitCode::ConfigError.into();
    }

    // Initialize tracing
    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return BindSyncExitCode::ConfigError.into();
    }

    info!("Starting bindsyncd daemon");
    info!(
        "Configuration loaded: config dir {}, pass every {}s",
        config.config_dir.display(),
        config.interval_secs
    );

    // Enter tokio runtime
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return BindSyncExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(config).await {
            error!("Daemon error: {}", e);
            BindSyncExitCode::RuntimeError
        } else {
            BindSyncExitCode::CleanShutdown
        }
    });

    result.into()
}

#[cfg(feature = "systemd")]
fn build_reloader(config: &Config) -> Result<Box<dyn Reloader>> {
    info!("Using systemd reloader for {}", config.service);
    Ok(Box::new(bindsync_reload_systemd::SystemdReloader::new(
        config.service.clone(),
    )))
}

#[cfg(not(feature = "systemd"))]
fn build_reloader(_config: &Config) -> Result<Box<dyn Reloader>> {
    anyhow::bail!("No reloader available: bindsyncd was built without the systemd feature")
}

/// Run the daemon
async fn run_daemon(config: Config) -> Result<()> {
    let core_config = config.to_core_config();

    let store = snapshot::open(&core_config.state_store).await?;
    let registry = FilePeerRegistry::new(&config.peers_path);
    let reloader = build_reloader(&config)?;

    let (engine, mut events) =
        ReconcileEngine::new(Box::new(registry), store, reloader, core_config)?;

    if config.start_server {
        engine.start_server().await?;
    }

    #[cfg(unix)]
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    #[cfg(unix)]
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    let mut ticks = IntervalStream::new(tokio::time::interval(Duration::from_secs(
        config.interval_secs,
    )));

    // The live directory may have been edited or replaced while the daemon
    // was down, so the first pass after startup always regenerates.
    let mut force = true;

    info!("Daemon initialized successfully");

    loop {
        #[cfg(unix)]
        let shutdown = async {
            tokio::select! {
                _ = sigterm.recv() => "SIGTERM",
                _ = sigint.recv() => "SIGINT",
            }
        };
        #[cfg(not(unix))]
        let shutdown = async {
            let _ = tokio::signal::ctrl_c().await;
            "SIGINT"
        };

        tokio::select! {
            Some(_) = ticks.next() => {
                if run_pass(&engine, &config, force).await {
                    force = false;
                }
            }

            Some(event) = events.recv() => {
                debug!("Engine event: {:?}", event);
            }

            name = shutdown => {
                info!("Received shutdown signal: {}", name);
                break;
            }
        }
    }

    info!("Shutting down daemon");
    Ok(())
}

/// Run one pass, returning whether it completed
async fn run_pass(engine: &ReconcileEngine, config: &Config, force: bool) -> bool {
    let mut request = match read_request(&config.requests_path).await {
        Ok(request) => request,
        Err(e) => {
            warn!("Skipping pass: {}", e);
            return false;
        }
    };
    request.force |= force;

    match engine.reconcile(&request).await {
        Ok(report) => {
            if report.is_degraded() {
                warn!(
                    "Pass degraded: {} conflicting names, {} invalid requests",
                    report.conflicts.len(),
                    report.rejected.len()
                );
            }
            if let Some(path) = &config.status_path {
                let published = serde_json::json!({
                    "statuses": report.statuses,
                    "authority": report.authority,
                });
                if let Err(e) = tokio::fs::write(path, published.to_string()).await {
                    warn!("Failed to publish statuses to {}: {}", path.display(), e);
                }
            }
            true
        }
        Err(e) if e.is_commit_failure() => {
            error!(
                "Configuration commit failed, operator attention required: {}",
                e
            );
            true
        }
        Err(e) => {
            warn!("Pass abandoned: {}", e);
            false
        }
    }
}

async fn read_request(path: &Path) -> Result<ReconcileRequest> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
    serde_json::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path.display(), e))
}
