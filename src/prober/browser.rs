//! P5 headless-browser probe (spec §4.2, §1: "the headless-browser driver:
//! treated as an opaque capability `render(url, proxy) -> (ok, latency_ms,
//! error)`"). No concrete browser automation crate is driven here; callers
//! supply an implementation (a real driver in production, a canned one in
//! tests).

use super::ProbeContext;
use crate::models::{BrowserVerdict, Protocol};
use async_trait::async_trait;

/// The opaque rendering capability named in spec §1. Implementations own
/// whatever browser-automation stack they use; this crate only consumes
/// the `(ok, latency_ms, error)` result.
#[async_trait]
pub trait BrowserRenderer: Send + Sync {
    async fn render(&self, url: &str, proxy_url: &str, timeout_ms: u64) -> RenderOutcome;
}

pub struct RenderOutcome {
    pub ok: bool,
    pub latency_ms: u64,
    pub error: Option<String>,
}

/// A renderer that always reports "not configured" without attempting any
/// navigation; the default when no real driver is wired in, so probing
/// never panics for lack of a browser.
pub struct UnconfiguredRenderer;

#[async_trait]
impl BrowserRenderer for UnconfiguredRenderer {
    async fn render(&self, _url: &str, _proxy_url: &str, _timeout_ms: u64) -> RenderOutcome {
        RenderOutcome {
            ok: false,
            latency_ms: 0,
            error: Some("error:browser_driver_not_configured".to_string()),
        }
    }
}

pub async fn probe(endpoint: &str, protocol: Protocol, ctx: &ProbeContext<'_>) -> BrowserVerdict {
    if ctx.config.test_url_browser.is_empty() {
        return BrowserVerdict {
            ok: false,
            latency_ms: 0,
            error_summary: Some("error:test_url_browser_not_configured".to_string()),
        };
    }
    let proxy_url = format!("{protocol}://{endpoint}");
    let outcome = ctx
        .browser
        .render(
            &ctx.config.test_url_browser,
            &proxy_url,
            ctx.config.timeout_browser as u64,
        )
        .await;

    BrowserVerdict {
        ok: outcome.ok,
        latency_ms: outcome.latency_ms,
        error_summary: outcome.error.map(|e| normalize_error(&e)),
    }
}

/// Normalise a browser driver error string: keep the shortest prefix
/// containing a recognisable code (e.g. `net::ERR_*`), truncated to 50
/// characters (spec §4.2 P5).
fn normalize_error(raw: &str) -> String {
    let candidate = if let Some(idx) = raw.find("net::ERR_") {
        let rest = &raw[idx..];
        let end = rest
            .find(|c: char| c.is_whitespace() || c == '"')
            .unwrap_or(rest.len());
        &rest[..end]
    } else {
        raw
    };
    candidate.chars().take(50).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_error_extracts_net_err_code() {
        let raw = "navigation failed: net::ERR_CONNECTION_REFUSED at line 12";
        assert_eq!(normalize_error(raw), "net::ERR_CONNECTION_REFUSED");
    }

    #[test]
    fn normalize_error_truncates_long_messages() {
        let raw = "x".repeat(200);
        assert_eq!(normalize_error(&raw).len(), 50);
    }
}
