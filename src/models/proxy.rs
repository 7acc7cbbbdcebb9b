//! The Proxy Record: the authoritative per-proxy entity (spec §3).

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Sentinel used for string fields that have never been determined.
pub const UNKNOWN: &str = "unknown";

/// Sentinel `avg_latency_s` value meaning "never measured".
pub const LATENCY_UNSET: f64 = -1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Socks4,
    Socks5,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Protocol::Http => "http",
            Protocol::Socks4 => "socks4",
            Protocol::Socks5 => "socks5",
        };
        f.write_str(s)
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Protocol::Http),
            "socks4" => Ok(Protocol::Socks4),
            "socks5" => Ok(Protocol::Socks5),
            other => Err(format!("unrecognized protocol: {other}")),
        }
    }
}

/// A protocol hint supplied to the Prober: a concrete protocol, or `auto`
/// to request auto-detection (spec §4.2, P1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolHint {
    Http,
    Socks4,
    Socks5,
    Auto,
}

impl FromStr for ProtocolHint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(ProtocolHint::Http),
            "socks4" => Ok(ProtocolHint::Socks4),
            "socks5" => Ok(ProtocolHint::Socks5),
            "auto" => Ok(ProtocolHint::Auto),
            other => Err(format!("unrecognized protocol hint: {other}")),
        }
    }
}

impl From<Protocol> for ProtocolHint {
    fn from(p: Protocol) -> Self {
        match p {
            Protocol::Http => ProtocolHint::Http,
            Protocol::Socks4 => ProtocolHint::Socks4,
            Protocol::Socks5 => ProtocolHint::Socks5,
        }
    }
}

/// Sticky geo/ASN info (spec §3, §4.2 P4). Populated once, never re-queried
/// while `country` is non-sentinel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub city: String,
    pub region: String,
    pub country: String,
    pub coord: Option<(f64, f64)>,
    pub org: String,
    pub postal: String,
    pub timezone: String,
}

impl Default for Location {
    fn default() -> Self {
        Self {
            city: UNKNOWN.to_string(),
            region: UNKNOWN.to_string(),
            country: UNKNOWN.to_string(),
            coord: None,
            org: UNKNOWN.to_string(),
            postal: UNKNOWN.to_string(),
            timezone: UNKNOWN.to_string(),
        }
    }
}

impl Location {
    pub fn is_unknown(&self) -> bool {
        self.country == UNKNOWN
    }
}

/// Tri-state headless-browser validity (spec §3, §4.2 P5): `Some(true)` /
/// `Some(false)` / `None` ("never probed") are all distinguishable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BrowserProfile {
    pub valid: Option<bool>,
    pub checked_at: Option<i64>,
    pub latency_ms: Option<u64>,
}

/// One sub-check's verdict string (spec §4.2 P6, §3): `pass`, `failed:<reason>`,
/// `error:<reason>`, or `unknown`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckVerdict(pub String);

impl CheckVerdict {
    pub fn pass() -> Self {
        Self("pass".to_string())
    }
    pub fn failed(reason: impl AsRef<str>) -> Self {
        Self(format!("failed:{}", reason.as_ref()))
    }
    pub fn error(reason: impl AsRef<str>) -> Self {
        Self(format!("error:{}", reason.as_ref()))
    }
    pub fn unknown() -> Self {
        Self(UNKNOWN.to_string())
    }
    pub fn is_pass(&self) -> bool {
        self.0 == "pass"
    }
}

impl Default for CheckVerdict {
    fn default() -> Self {
        Self::unknown()
    }
}

/// The five independent security sub-checks (spec §4.2 P6).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecurityProfile {
    pub dns_ok: CheckVerdict,
    pub tls_ok: CheckVerdict,
    pub clean_content: CheckVerdict,
    pub data_intact: CheckVerdict,
    pub behaviour_ok: CheckVerdict,
    pub checked_at: Option<i64>,
}

impl SecurityProfile {
    /// Aggregate verdict: `passed` iff at least 80% of sub-checks are
    /// `pass`. A DNS baseline that came back `unknown` counts toward the
    /// pass side (spec §4.2 P6).
    pub fn aggregate_passed(&self) -> bool {
        let dns_counts = self.dns_ok.is_pass() || self.dns_ok == CheckVerdict::unknown();
        let others_passing = [&self.tls_ok, &self.clean_content, &self.data_intact, &self.behaviour_ok]
            .iter()
            .filter(|c| c.is_pass())
            .count();
        let passing = others_passing + dns_counts as usize;
        (passing as f64) / 5.0 >= 0.8
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Performance {
    /// Seconds, or `LATENCY_UNSET` if never measured.
    pub avg_latency_s: f64,
    /// In `[0, 1]`.
    pub success_rate: f64,
    pub last_checked: Option<i64>,
}

impl Default for Performance {
    fn default() -> Self {
        Self {
            avg_latency_s: LATENCY_UNSET,
            success_rate: 0.5,
            last_checked: None,
        }
    }
}

/// The authoritative per-proxy record. One per `(host, port)` pair (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyRecord {
    pub endpoint: String,
    pub score: i32,
    pub protocols: BTreeSet<Protocol>,
    pub supports_cn: bool,
    pub supports_intl: bool,
    pub transparent: bool,
    pub observed_egress_ip: String,
    pub location: Location,
    pub browser: BrowserProfile,
    pub security: SecurityProfile,
    pub performance: Performance,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ProxyRecord {
    /// A brand-new record for a candidate that has never been scored.
    pub fn new_candidate(endpoint: impl Into<String>, now: i64) -> Self {
        Self {
            endpoint: endpoint.into(),
            score: 0,
            protocols: BTreeSet::new(),
            supports_cn: false,
            supports_intl: false,
            transparent: false,
            observed_egress_ip: UNKNOWN.to_string(),
            location: Location::default(),
            browser: BrowserProfile::default(),
            security: SecurityProfile::default(),
            performance: Performance::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn clamp_score(&mut self, max_score: i32) {
        self.score = self.score.clamp(0, max_score);
    }
}

/// Parse `host:port`, validating the port is in `[1, 65535]`. Hosts are not
/// resolved or otherwise validated here; the store's primary key is the
/// literal string.
pub fn validate_endpoint(endpoint: &str) -> Result<(), String> {
    let (host, port) = endpoint
        .rsplit_once(':')
        .ok_or_else(|| format!("endpoint missing ':port': {endpoint}"))?;
    if host.is_empty() {
        return Err(format!("endpoint missing host: {endpoint}"));
    }
    let port: u32 = port
        .parse()
        .map_err(|_| format!("endpoint has non-numeric port: {endpoint}"))?;
    if port == 0 || port > 65535 {
        return Err(format!("endpoint port out of range [1,65535]: {endpoint}"));
    }
    Ok(())
}
