//! Probe dispatch and verdicts (spec §4.2, §9).
//!
//! Probes are modeled as a sum type with a single dispatcher
//! (`prober::run`); the Scoring Engine consumes `Verdict`s, never probe
//! identities.

use super::proxy::{Location, Protocol, ProtocolHint, CheckVerdict};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeKind {
    Reachability,
    Dual,
    Anonymity,
    Info,
    Browser,
    Security,
}

/// P1: single reachability probe against one target URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReachabilityVerdict {
    pub ok: bool,
    pub elapsed_s: f64,
    pub detected_protocol: Protocol,
}

/// P2: two P1 runs, one domestic and one international.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DualVerdict {
    pub cn_ok: bool,
    pub cn_elapsed_s: f64,
    pub intl_ok: bool,
    pub intl_elapsed_s: f64,
    /// The protocol that worked (first successful leg), or the last tried
    /// if both legs failed and the hint was `auto`.
    pub detected_protocol: Protocol,
}

impl DualVerdict {
    pub fn any_ok(&self) -> bool {
        self.cn_ok || self.intl_ok
    }

    /// Mean elapsed time over the legs that succeeded, if any.
    pub fn successful_leg_avg(&self) -> Option<f64> {
        let mut sum = 0.0;
        let mut count = 0u32;
        if self.cn_ok {
            sum += self.cn_elapsed_s;
            count += 1;
        }
        if self.intl_ok {
            sum += self.intl_elapsed_s;
            count += 1;
        }
        if count == 0 {
            None
        } else {
            Some(sum / count as f64)
        }
    }

    pub fn success_rate(&self) -> f64 {
        let successes = self.cn_ok as u8 + self.intl_ok as u8;
        successes as f64 / 2.0
    }
}

/// P3: anonymity / transparency probe. Skipped unless P2 produced at least
/// one success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnonymityVerdict {
    pub check_ok: bool,
    pub is_transparent: bool,
    pub observed_ip: String,
}

/// P4: geo/ASN info probe. Skipped if the record already has sticky
/// location data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfoVerdict {
    pub location: Option<Location>,
}

/// P5: headless-browser rendering probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserVerdict {
    pub ok: bool,
    pub latency_ms: u64,
    pub error_summary: Option<String>,
}

/// P6: the five independent security sub-checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityVerdict {
    pub dns_ok: CheckVerdict,
    pub tls_ok: CheckVerdict,
    pub clean_content: CheckVerdict,
    pub data_intact: CheckVerdict,
    pub behaviour_ok: CheckVerdict,
}

/// The outputs of the probes actually run in one round against one
/// endpoint. Any field left `None` means that probe did not run this
/// round; the Scoring Engine carries the corresponding record fields
/// forward unchanged (spec §4.5, §8: "idempotent w.r.t. a null verdict").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProbeBundle {
    pub reachability: Option<ReachabilityVerdict>,
    pub dual: Option<DualVerdict>,
    pub anonymity: Option<AnonymityVerdict>,
    pub info: Option<InfoVerdict>,
    pub browser: Option<BrowserVerdict>,
    pub security: Option<SecurityVerdict>,
}

impl ProbeBundle {
    pub fn is_empty(&self) -> bool {
        self.reachability.is_none()
            && self.dual.is_none()
            && self.anonymity.is_none()
            && self.info.is_none()
            && self.browser.is_none()
            && self.security.is_none()
    }
}

/// Which probe(s) a Batch Runner invocation should run against each
/// candidate, and the protocol hint to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeSelection {
    pub dual: bool,
    pub anonymity: bool,
    pub info: bool,
    pub browser: bool,
    pub security: bool,
    pub protocol_hint: ProtocolHint,
}

impl ProbeSelection {
    pub fn validation_default(protocol_hint: ProtocolHint) -> Self {
        Self {
            dual: true,
            anonymity: true,
            info: true,
            browser: false,
            security: false,
            protocol_hint,
        }
    }

    pub fn browser_only(protocol_hint: ProtocolHint) -> Self {
        Self {
            dual: false,
            anonymity: false,
            info: false,
            browser: true,
            security: false,
            protocol_hint,
        }
    }

    pub fn security_only(protocol_hint: ProtocolHint) -> Self {
        Self {
            dual: false,
            anonymity: false,
            info: false,
            browser: false,
            security: true,
            protocol_hint,
        }
    }
}
