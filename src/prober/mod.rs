//! The Prober (component B, spec §4.2): a stateless collection of probe
//! functions, each `(endpoint, protocol_hint, context) -> verdict`. None
//! hold mutable state and all are safe to call concurrently, mirroring the
//! per-call `reqwest::Client` construction in `replay/mod.rs`.

mod anonymity;
pub mod browser;
pub mod client;
mod dual_region;
mod info;
mod reachability;
mod security;

use crate::config::MainConfig;
use crate::models::{ProbeBundle, ProbeSelection, ProtocolHint};
use rand::seq::SliceRandom;

pub use browser::BrowserRenderer;

/// Shared read-only context passed to every probe: configuration and the
/// host's cached egress IP, plus the capability used by P5 (opaque per
/// spec §1 "treated as an opaque capability").
#[derive(Clone)]
pub struct ProbeContext<'a> {
    pub config: &'a MainConfig,
    pub own_ip: &'a str,
    pub browser: &'a dyn BrowserRenderer,
}

/// Run the probes selected by `selection` against one candidate, in the
/// dependency order the Scoring Engine expects (P2 before P3, since P3 is
/// skipped unless P2 produced a success).
pub async fn run(selection: &ProbeSelection, endpoint: &str, ctx: &ProbeContext<'_>) -> ProbeBundle {
    let mut bundle = ProbeBundle::default();
    let mut effective_protocol = resolved_protocol(selection);

    if selection.dual {
        let dual = dual_region::probe(endpoint, selection.protocol_hint, ctx).await;
        effective_protocol = dual.detected_protocol;
        if selection.anonymity && dual.any_ok() {
            bundle.anonymity = Some(anonymity::probe(endpoint, dual.detected_protocol, ctx).await);
        }
        bundle.dual = Some(dual);
    }

    if selection.info {
        bundle.info = Some(info::probe(endpoint, effective_protocol, ctx).await);
    }

    if selection.browser {
        bundle.browser = Some(browser::probe(endpoint, effective_protocol, ctx).await);
    }

    if selection.security {
        bundle.security = Some(security::probe(endpoint, effective_protocol, ctx).await);
    }

    bundle
}

fn resolved_protocol(selection: &ProbeSelection) -> crate::models::Protocol {
    match selection.protocol_hint {
        ProtocolHint::Http => crate::models::Protocol::Http,
        ProtocolHint::Socks4 => crate::models::Protocol::Socks4,
        ProtocolHint::Socks5 => crate::models::Protocol::Socks5,
        ProtocolHint::Auto => crate::models::Protocol::Http,
    }
}

/// Pick one URL at random from a configured list (spec §4.2 P2, §6: "one
/// chosen at random per probe"). Falls back to an empty string (handled by
/// callers as `ConfigurationMissing`) if the list is empty.
pub(crate) fn pick_random_url(urls: &[String]) -> String {
    urls.choose(&mut rand::thread_rng())
        .cloned()
        .unwrap_or_default()
}
