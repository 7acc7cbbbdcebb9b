//! Shared `reqwest` client construction, routed through a candidate proxy
//! (grounded on the client-builder + per-request proxy pattern in
//! `replay/mod.rs`'s `replay_request`).

use crate::models::Protocol;
use std::time::Duration;

/// Build a client that routes all traffic through `endpoint` over
/// `protocol`, with redirects disabled (P1 requires `allow_redirects =
/// false`) and the given timeout.
pub fn proxied_client(
    endpoint: &str,
    protocol: Protocol,
    timeout: Duration,
) -> reqwest::Result<reqwest::Client> {
    let proxy_url = match protocol {
        Protocol::Http => format!("http://{endpoint}"),
        Protocol::Socks4 => format!("socks4://{endpoint}"),
        Protocol::Socks5 => format!("socks5h://{endpoint}"),
    };
    let proxy = reqwest::Proxy::all(&proxy_url)?;
    reqwest::Client::builder()
        .proxy(proxy)
        .redirect(reqwest::redirect::Policy::none())
        .timeout(timeout)
        .danger_accept_invalid_certs(true)
        .build()
}

/// A direct (no-proxy) client, used for the DNS baseline query and for
/// determining the host's own egress IP.
pub fn direct_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .no_proxy()
        .timeout(timeout)
        .build()
}
