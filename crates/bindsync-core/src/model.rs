// # Record Model
//
// Canonical DNS record representation shared by every stage of a pass.
//
// ## Validation
//
// Raw asks arrive as loosely typed [`RecordRequest`]s. Each field is checked
// by a pure validation function returning `Result<_, ValidationError>`; only
// when every check passes is an immutable [`DnsRecordEntry`] constructed.
// Nothing in this module mutates an entry after construction.
//
// ## Equality
//
// - Identity: full structural equality over all six fields (set membership,
//   deduplication).
// - Conflict key: `(domain, host_label, record_class, record_type)`, which
//   leaves out `ttl` and `record_data` so that two different answers for
//   the same name can be detected.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;
use thiserror::Error;

/// Maximum length of a domain name in octets
pub const MAX_DOMAIN_OCTETS: usize = 255;

/// Maximum length of a single label in octets
pub const MAX_LABEL_OCTETS: usize = 63;

/// Liveness zone served by every unit; requesters cannot ask for records
/// in it or below it
pub const HEALTH_ZONE: &str = "service.test";

/// Largest TTL accepted (RFC 2181 §8)
pub const MAX_TTL: i64 = i32::MAX as i64;

/// Reasons an ask is rejected before it reaches a zone
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationError {
    #[error("invalid domain '{domain}': {reason}")]
    InvalidDomain { domain: String, reason: String },

    #[error("invalid host label '{label}': {reason}")]
    InvalidHostLabel { label: String, reason: String },

    #[error("invalid ttl {0}: must be between 1 and 2147483647")]
    InvalidTtl(i64),

    #[error("unsupported record class '{0}'")]
    UnsupportedClass(String),

    #[error("unsupported record type '{0}'")]
    UnsupportedType(String),

    #[error("invalid data '{data}' for {record_type} record: {reason}")]
    InvalidRecordData {
        record_type: RecordType,
        data: String,
        reason: String,
    },
}

/// DNS record class
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RecordClass {
    IN,
}

impl RecordClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordClass::IN => "IN",
        }
    }
}

impl fmt::Display for RecordClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordClass {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "IN" => Ok(RecordClass::IN),
            _ => Err(ValidationError::UnsupportedClass(s.to_string())),
        }
    }
}

/// DNS record type
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordType {
    A,
    Aaaa,
    Cname,
    Mx,
    Dkim,
    Spf,
    Dmarc,
    Txt,
    Caa,
    Srv,
    Svcb,
    Https,
    Ptr,
    Soa,
    Ns,
    Ds,
    Dnskey,
}

impl RecordType {
    /// All supported record types
    pub const ALL: [RecordType; 17] = [
        RecordType::A,
        RecordType::Aaaa,
        RecordType::Cname,
        RecordType::Mx,
        RecordType::Dkim,
        RecordType::Spf,
        RecordType::Dmarc,
        RecordType::Txt,
        RecordType::Caa,
        RecordType::Srv,
        RecordType::Svcb,
        RecordType::Https,
        RecordType::Ptr,
        RecordType::Soa,
        RecordType::Ns,
        RecordType::Ds,
        RecordType::Dnskey,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
            RecordType::Cname => "CNAME",
            RecordType::Mx => "MX",
            RecordType::Dkim => "DKIM",
            RecordType::Spf => "SPF",
            RecordType::Dmarc => "DMARC",
            RecordType::Txt => "TXT",
            RecordType::Caa => "CAA",
            RecordType::Srv => "SRV",
            RecordType::Svcb => "SVCB",
            RecordType::Https => "HTTPS",
            RecordType::Ptr => "PTR",
            RecordType::Soa => "SOA",
            RecordType::Ns => "NS",
            RecordType::Ds => "DS",
            RecordType::Dnskey => "DNSKEY",
        }
    }

    /// Whether record data for this type must be an IP address
    pub fn is_address(&self) -> bool {
        matches!(self, RecordType::A | RecordType::Aaaa)
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        RecordType::ALL
            .into_iter()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| ValidationError::UnsupportedType(s.to_string()))
    }
}

/// A raw record ask as submitted by a requester
///
/// Fields are kept loosely typed so that an unparseable ask can still be
/// reported back under its `id`. Deserialization never fails on the shape
/// of a single ask: missing or mistyped fields become empty strings or a
/// zero ttl, which validation then rejects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordRequest {
    /// Requester-chosen identifier (usually a uuid) used to relay the status
    pub id: String,
    pub domain: String,
    pub host_label: String,
    pub ttl: i64,
    pub record_class: String,
    pub record_type: String,
    pub record_data: String,
}

impl RecordRequest {
    /// Read an ask out of an arbitrary JSON value
    ///
    /// Numeric strings are accepted for `ttl`; `record_class` defaults to
    /// `IN` when absent.
    pub fn from_value(value: &serde_json::Value) -> Self {
        let text = |key: &str| match value.get(key) {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => String::new(),
        };

        let ttl = match value.get("ttl") {
            Some(serde_json::Value::Number(n)) => n.as_i64().unwrap_or(0),
            Some(serde_json::Value::String(s)) => s.trim().parse().unwrap_or(0),
            _ => 0,
        };

        let record_class = match value.get("record_class") {
            None | Some(serde_json::Value::Null) => default_record_class(),
            Some(_) => text("record_class"),
        };

        Self {
            id: text("id"),
            domain: text("domain"),
            host_label: text("host_label"),
            ttl,
            record_class,
            record_type: text("record_type"),
            record_data: text("record_data"),
        }
    }
}

impl<'de> Deserialize<'de> for RecordRequest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(Self::from_value(&value))
    }
}

fn default_record_class() -> String {
    RecordClass::IN.as_str().to_string()
}

/// Every ask published by one requester
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequesterSubmission {
    /// Requester identity (application or relation name)
    pub requester: String,
    #[serde(default)]
    pub requests: Vec<RecordRequest>,
}

impl RequesterSubmission {
    pub fn new(requester: impl Into<String>, requests: Vec<RecordRequest>) -> Self {
        Self {
            requester: requester.into(),
            requests,
        }
    }
}

/// Grouping key used to detect two answers for the same name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConflictKey {
    pub domain: String,
    pub host_label: String,
    pub record_class: RecordClass,
    pub record_type: RecordType,
}

impl fmt::Display for ConflictKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} {} {}",
            self.host_label, self.domain, self.record_class, self.record_type
        )
    }
}

/// A validated DNS record
///
/// Field order matters: the derived `Ord` sorts entries by domain, then
/// host label, class, type, data and ttl, which is the order records are
/// rendered in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DnsRecordEntry {
    domain: String,
    host_label: String,
    record_class: RecordClass,
    record_type: RecordType,
    record_data: String,
    ttl: u32,
}

impl DnsRecordEntry {
    /// Validate every field and build an entry
    pub fn new(
        domain: &str,
        host_label: &str,
        ttl: i64,
        record_class: RecordClass,
        record_type: RecordType,
        record_data: &str,
    ) -> Result<Self, ValidationError> {
        let domain = validate_domain(domain)?;
        let host_label = validate_host_label(host_label)?;
        let ttl = validate_ttl(ttl)?;
        let record_data = validate_record_data(record_type, record_data)?;

        Ok(Self {
            domain,
            host_label,
            record_class,
            record_type,
            record_data,
            ttl,
        })
    }

    /// Parse and validate a raw ask
    pub fn from_request(request: &RecordRequest) -> Result<Self, ValidationError> {
        let record_class: RecordClass = request.record_class.parse()?;
        let record_type: RecordType = request.record_type.parse()?;
        Self::new(
            &request.domain,
            &request.host_label,
            request.ttl,
            record_class,
            record_type,
            &request.record_data,
        )
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn host_label(&self) -> &str {
        &self.host_label
    }

    pub fn ttl(&self) -> u32 {
        self.ttl
    }

    pub fn record_class(&self) -> RecordClass {
        self.record_class
    }

    pub fn record_type(&self) -> RecordType {
        self.record_type
    }

    pub fn record_data(&self) -> &str {
        &self.record_data
    }

    pub fn conflict_key(&self) -> ConflictKey {
        ConflictKey {
            domain: self.domain.clone(),
            host_label: self.host_label.clone(),
            record_class: self.record_class,
            record_type: self.record_type,
        }
    }
}

impl fmt::Display for DnsRecordEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} {} {} {} {}",
            self.host_label,
            self.domain,
            self.ttl,
            self.record_class,
            self.record_type,
            self.record_data
        )
    }
}

/// The authoritative record set for one domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    domain: String,
    entries: BTreeSet<DnsRecordEntry>,
}

impl Zone {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            entries: BTreeSet::new(),
        }
    }

    /// Build a zone from entries, all of which must belong to `domain`
    pub fn with_entries(
        domain: impl Into<String>,
        entries: impl IntoIterator<Item = DnsRecordEntry>,
    ) -> Self {
        let mut zone = Self::new(domain);
        for entry in entries {
            zone.insert(entry);
        }
        zone
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Entries in rendering order
    pub fn entries(&self) -> impl Iterator<Item = &DnsRecordEntry> {
        self.entries.iter()
    }

    pub fn contains(&self, entry: &DnsRecordEntry) -> bool {
        self.entries.contains(entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add an entry; returns false when an identical entry was already present
    pub(crate) fn insert(&mut self, entry: DnsRecordEntry) -> bool {
        debug_assert_eq!(entry.domain(), self.domain);
        self.entries.insert(entry)
    }

    /// Union another zone of the same domain into this one
    pub(crate) fn merge(&mut self, other: Zone) {
        debug_assert_eq!(other.domain, self.domain);
        self.entries.extend(other.entries);
    }

    /// A copy of this zone keeping only the entries matching `keep`
    pub fn filtered(&self, mut keep: impl FnMut(&DnsRecordEntry) -> bool) -> Zone {
        Zone {
            domain: self.domain.clone(),
            entries: self.entries.iter().filter(|e| keep(e)).cloned().collect(),
        }
    }
}

/// Validate a domain name and return its canonical (lowercase, no trailing
/// dot) form
pub fn validate_domain(domain: &str) -> Result<String, ValidationError> {
    let invalid = |reason: String| ValidationError::InvalidDomain {
        domain: domain.to_string(),
        reason,
    };

    let canonical = domain.strip_suffix('.').unwrap_or(domain).to_ascii_lowercase();
    if canonical.is_empty() {
        return Err(invalid("domain cannot be empty".to_string()));
    }
    if canonical.len() > MAX_DOMAIN_OCTETS {
        return Err(invalid(format!(
            "{} octets (max {})",
            canonical.len(),
            MAX_DOMAIN_OCTETS
        )));
    }

    for label in canonical.split('.') {
        if label.is_empty() {
            return Err(invalid("empty label".to_string()));
        }
        if label.len() > MAX_LABEL_OCTETS {
            return Err(invalid(format!(
                "label '{}' is {} octets (max {})",
                label,
                label.len(),
                MAX_LABEL_OCTETS
            )));
        }
        if !label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-') {
            return Err(invalid(format!(
                "label '{}' may only contain letters, digits and hyphens",
                label
            )));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(invalid(format!(
                "label '{}' cannot start or end with a hyphen",
                label
            )));
        }
    }

    if canonical == HEALTH_ZONE || canonical.ends_with(&format!(".{}", HEALTH_ZONE)) {
        return Err(invalid(format!("'{}' is reserved", HEALTH_ZONE)));
    }

    Ok(canonical)
}

/// Validate a host label relative to its zone and return its canonical
/// (lowercase) form
///
/// Besides plain labels this accepts `@` (zone apex), `*` wildcards,
/// underscore-prefixed service labels and dotted multi-label names.
pub fn validate_host_label(label: &str) -> Result<String, ValidationError> {
    let invalid = |reason: &str| ValidationError::InvalidHostLabel {
        label: label.to_string(),
        reason: reason.to_string(),
    };

    let label = label.trim();
    if label.is_empty() {
        return Err(invalid("host label cannot be empty"));
    }
    if label == "@" {
        return Ok(label.to_string());
    }
    if label.len() > MAX_DOMAIN_OCTETS {
        return Err(invalid("host label is too long"));
    }
    for part in label.split('.') {
        if part.is_empty() {
            return Err(invalid("empty label"));
        }
        if part.len() > MAX_LABEL_OCTETS {
            return Err(invalid("label longer than 63 octets"));
        }
        if !part
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'*')
        {
            return Err(invalid(
                "only letters, digits, '-', '_' and '*' are allowed",
            ));
        }
    }

    Ok(label.to_ascii_lowercase())
}

pub fn validate_ttl(ttl: i64) -> Result<u32, ValidationError> {
    if ttl < 1 || ttl > MAX_TTL {
        return Err(ValidationError::InvalidTtl(ttl));
    }
    Ok(ttl as u32)
}

/// Validate record data for the given type and return its canonical form
///
/// A and AAAA data is normalised to the standard textual address form so
/// that `2001:DB8::1` and `2001:db8::1` compare equal.
pub fn validate_record_data(
    record_type: RecordType,
    data: &str,
) -> Result<String, ValidationError> {
    let invalid = |reason: &str| ValidationError::InvalidRecordData {
        record_type,
        data: data.to_string(),
        reason: reason.to_string(),
    };

    let data = data.trim();
    if data.is_empty() {
        return Err(invalid("record data cannot be empty"));
    }
    // Zone files are line oriented
    if data.chars().any(|c| c.is_control()) {
        return Err(invalid("record data cannot contain control characters"));
    }

    match record_type {
        RecordType::A => data
            .parse::<Ipv4Addr>()
            .map(|ip| ip.to_string())
            .map_err(|_| invalid("must be a valid IPv4 address")),
        RecordType::Aaaa => data
            .parse::<Ipv6Addr>()
            .map(|ip| ip.to_string())
            .map_err(|_| invalid("must be a valid IPv6 address")),
        _ => Ok(data.to_string()),
    }
}
