// # Zone Compiler
//
// Turns accepted zones and the cluster topology into the name server's
// configuration files.
//
// ## Output
//
// - `db.<zone>` for every zone, only on the active unit. Standby units are
//   secondaries and receive zone data by transfer.
// - `db.service.test`, a fixed liveness zone answering `status IN TXT "ok"`.
// - `named.conf.local` registering the liveness zone and every zone as
//   primary (active unit) or secondary (standby unit).
//
// ## Determinism
//
// Compilation is a pure function of its inputs. The SOA serial is the
// number of minutes since the epoch, so two compilations within the same
// minute are byte-identical. Nameserver names and addresses are sorted
// independently before their cross product is rendered and records follow
// the entry ordering of the zone.

use crate::aggregate::ZoneSet;
use crate::config::ZoneConfig;
use crate::model::Zone;
use crate::topology::ClusterTopology;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Write as _};
use std::net::IpAddr;
use std::path::Path;

/// Name of the zone registration file
pub const NAMED_CONF_LOCAL: &str = "named.conf.local";

pub use crate::model::HEALTH_ZONE;

/// File included at the top of `named.conf.local` when enabled
pub const RFC1918_ZONES_FILE: &str = "zones.rfc1918";

/// File name holding the data of `domain`
pub fn zone_file_name(domain: &str) -> String {
    format!("db.{}", domain)
}

/// SOA serial, minutes since the Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Serial(u32);

impl Serial {
    /// Serial for the minute containing `time`
    pub fn from_time(time: DateTime<Utc>) -> Self {
        let minutes = time.timestamp().max(0) / 60;
        Self(u32::try_from(minutes).unwrap_or(u32::MAX))
    }

    pub fn now() -> Self {
        Self::from_time(Utc::now())
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl From<u32> for Serial {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl fmt::Display for Serial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A compiled configuration set, file name to content
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompiledConfig {
    files: BTreeMap<String, String>,
}

impl CompiledConfig {
    pub fn files(&self) -> &BTreeMap<String, String> {
        &self.files
    }

    pub fn get(&self, file_name: &str) -> Option<&str> {
        self.files.get(file_name).map(String::as_str)
    }

    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Everything besides the zones that shapes the generated files
#[derive(Debug, Clone, Copy)]
pub struct CompileContext<'a> {
    pub topology: &'a ClusterTopology,
    pub settings: &'a ZoneConfig,
    /// Addresses allowed to transfer zones besides the standby units
    pub secondary_transfer_ips: &'a BTreeSet<IpAddr>,
    /// Live directory the files are referenced from in `named.conf.local`
    pub config_dir: &'a Path,
    pub serial: Serial,
}

/// Compile the full configuration set
pub fn compile(zones: &ZoneSet, ctx: &CompileContext<'_>) -> CompiledConfig {
    let mut files = BTreeMap::new();

    files.insert(
        zone_file_name(HEALTH_ZONE),
        render_health_zone(&ctx.settings.mailbox, ctx.settings.default_ttl, ctx.serial),
    );

    if ctx.topology.is_current_unit_active() {
        let names = ctx.settings.nameserver_names();
        let ips = ctx.topology.nameserver_ips(&ctx.settings.public_ips);
        for zone in zones.values() {
            let content = render_zone(
                zone,
                &names,
                &ips,
                &ctx.settings.mailbox,
                ctx.settings.default_ttl,
                ctx.serial,
            );
            files.insert(zone_file_name(zone.domain()), content);
        }
    }

    let domains: Vec<&str> = zones.keys().map(String::as_str).collect();
    files.insert(
        NAMED_CONF_LOCAL.to_string(),
        render_named_conf_local(&domains, ctx),
    );

    tracing::debug!(
        "Compiled {} files for {} zones (serial {})",
        files.len(),
        zones.len(),
        ctx.serial
    );

    CompiledConfig { files }
}

fn render_header(out: &mut String, zone: &str, mailbox: &str, ttl: u32, serial: Serial) {
    let _ = writeln!(out, "$ORIGIN {}.", zone);
    let _ = writeln!(out, "$TTL {}", ttl);
    let _ = writeln!(
        out,
        "@ IN SOA {zone}. {mailbox}.{zone}. ( {serial} 1d 1h 1h 10m )"
    );
}

/// Render the data file of one zone
///
/// # Parameters
///
/// - `names`: nameserver host labels, rendered relative to the zone
/// - `ips`: nameserver addresses; every name is paired with every address
///
/// # Returns
///
/// The zone file content, newline-terminated
pub fn render_zone(
    zone: &Zone,
    names: &[String],
    ips: &BTreeSet<IpAddr>,
    mailbox: &str,
    default_ttl: u32,
    serial: Serial,
) -> String {
    let mut out = String::new();
    render_header(&mut out, zone.domain(), mailbox, default_ttl, serial);

    let names: BTreeSet<&str> = names.iter().map(String::as_str).collect();
    for name in &names {
        for ip in ips {
            let address_type = if ip.is_ipv6() { "AAAA" } else { "A" };
            let _ = writeln!(out, "@ IN NS {}", name);
            let _ = writeln!(out, "{} IN {} {}", name, address_type, ip);
        }
    }

    for entry in zone.entries() {
        let _ = writeln!(
            out,
            "{} {} {} {}",
            entry.host_label(),
            entry.record_class(),
            entry.record_type(),
            entry.record_data()
        );
    }

    out
}

/// Render the liveness zone
pub fn render_health_zone(mailbox: &str, default_ttl: u32, serial: Serial) -> String {
    let mut out = String::new();
    render_header(&mut out, HEALTH_ZONE, mailbox, default_ttl, serial);
    out.push_str("@ IN NS localhost.\n");
    out.push_str("status IN TXT \"ok\"\n");
    out
}

/// `a;b;` list used in BIND address match lists, empty when there are none
fn ip_list<'a>(ips: impl IntoIterator<Item = &'a IpAddr>) -> String {
    ips.into_iter().map(|ip| format!("{};", ip)).collect()
}

fn primary_stanza(out: &mut String, name: &str, config_dir: &Path, transfer_ips: &str) {
    let _ = writeln!(
        out,
        "zone \"{name}\" IN {{ type primary; file \"{dir}/{file}\"; allow-update {{ none; }}; \
         also-notify {{ {ips} }}; allow-transfer {{ {ips} }}; }};",
        name = name,
        dir = config_dir.display(),
        file = zone_file_name(name),
        ips = transfer_ips,
    );
}

fn secondary_stanza(out: &mut String, name: &str, config_dir: &Path, primary_ip: IpAddr) {
    let _ = writeln!(
        out,
        "zone \"{name}\" IN {{ type secondary; file \"{dir}/{file}\"; masterfile-format text; \
         masterfile-style full; primaries {{ {primary}; }}; }};",
        name = name,
        dir = config_dir.display(),
        file = zone_file_name(name),
        primary = primary_ip,
    );
}

/// Render `named.conf.local`
///
/// Zones are only registered once an active unit exists: a primary needs
/// to know its secondaries and a secondary needs a primary to pull from.
pub fn render_named_conf_local(domains: &[&str], ctx: &CompileContext<'_>) -> String {
    let mut out = String::new();

    if ctx.settings.include_rfc1918 {
        let _ = writeln!(
            out,
            "include \"{}/{}\";",
            ctx.config_dir.display(),
            RFC1918_ZONES_FILE
        );
    }

    primary_stanza(&mut out, HEALTH_ZONE, ctx.config_dir, "");

    let Some(active_ip) = ctx.topology.active_unit_ip() else {
        if !domains.is_empty() {
            tracing::debug!(
                "No active unit elected, {} zones left unregistered",
                domains.len()
            );
        }
        return out;
    };

    if ctx.topology.is_current_unit_active() {
        let transfer_ips: BTreeSet<IpAddr> = ctx
            .topology
            .standby_units_ip()
            .iter()
            .chain(ctx.secondary_transfer_ips)
            .copied()
            .collect();
        let transfer_ips = ip_list(&transfer_ips);
        for name in domains {
            primary_stanza(&mut out, name, ctx.config_dir, &transfer_ips);
        }
    } else {
        for name in domains {
            secondary_stanza(&mut out, name, ctx.config_dir, active_ip);
        }
    }

    out
}
