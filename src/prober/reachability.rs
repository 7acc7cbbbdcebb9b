//! P1 reachability probe (spec §4.2).

use super::client::proxied_client;
use super::ProbeContext;
use crate::models::{Protocol, ReachabilityVerdict};
use std::time::{Duration, Instant};

/// The order protocol auto-detection tries candidates in, per spec §4.2:
/// "tries HTTP, SOCKS5, SOCKS4 in that order and returns on the first
/// success".
const AUTO_DETECT_ORDER: [Protocol; 3] = [Protocol::Http, Protocol::Socks5, Protocol::Socks4];

/// Strict single-status reachability check against one URL with an
/// explicit expected status code (spec §4.2 P1 default 204).
pub async fn probe_one_with_status(
    endpoint: &str,
    protocol: Protocol,
    url: &str,
    expected_status: u16,
    timeout: Duration,
) -> ReachabilityVerdict {
    let started = Instant::now();
    let client = match proxied_client(endpoint, protocol, timeout) {
        Ok(c) => c,
        Err(_) => {
            return ReachabilityVerdict {
                ok: false,
                elapsed_s: started.elapsed().as_secs_f64(),
                detected_protocol: protocol,
            }
        }
    };
    let result = client.get(url).send().await;
    let elapsed_s = started.elapsed().as_secs_f64();
    match result {
        Ok(resp) if resp.status().as_u16() == expected_status => ReachabilityVerdict {
            ok: true,
            elapsed_s,
            detected_protocol: protocol,
        },
        _ => ReachabilityVerdict {
            ok: false,
            elapsed_s,
            detected_protocol: protocol,
        },
    }
}

/// Run P1 with protocol auto-detection when `hint` is `auto`: try HTTP,
/// SOCKS5, SOCKS4 in order, returning the first success, or the last
/// attempt's verdict if every protocol failed.
pub async fn probe(
    endpoint: &str,
    hint: crate::models::ProtocolHint,
    url: &str,
    expected_status: u16,
    timeout: Duration,
    ctx: &ProbeContext<'_>,
) -> ReachabilityVerdict {
    let _ = ctx;
    match hint {
        crate::models::ProtocolHint::Auto => {
            let mut last = ReachabilityVerdict {
                ok: false,
                elapsed_s: 0.0,
                detected_protocol: AUTO_DETECT_ORDER[0],
            };
            for protocol in AUTO_DETECT_ORDER {
                let verdict =
                    probe_one_with_status(endpoint, protocol, url, expected_status, timeout).await;
                if verdict.ok {
                    return verdict;
                }
                last = verdict;
            }
            last
        }
        other => {
            let protocol = match other {
                crate::models::ProtocolHint::Http => Protocol::Http,
                crate::models::ProtocolHint::Socks4 => Protocol::Socks4,
                crate::models::ProtocolHint::Socks5 => Protocol::Socks5,
                crate::models::ProtocolHint::Auto => unreachable!(),
            };
            probe_one_with_status(endpoint, protocol, url, expected_status, timeout).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_proxy_host_fails_closed() {
        let verdict = probe_one_with_status(
            "127.0.0.1:1",
            Protocol::Http,
            "https://example.com/generate_204",
            204,
            Duration::from_millis(200),
        )
        .await;
        assert!(!verdict.ok);
    }
}
