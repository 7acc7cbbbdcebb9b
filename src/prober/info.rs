//! P4 geo/ASN info probe (spec §4.2). The dispatcher only calls this when
//! the record's location is still sentinel `unknown` (stickiness is
//! enforced by the Scoring Engine, not here, so this probe is a pure
//! fetch-and-parse).

use super::client::proxied_client;
use super::ProbeContext;
use crate::models::{InfoVerdict, Location, Protocol};
use serde::Deserialize;
use std::time::Duration;

/// Shape of a typical IP-info JSON API response. Fields are all optional
/// since providers vary; missing fields fall back to sentinel `unknown`.
#[derive(Debug, Deserialize, Default)]
struct InfoResponse {
    city: Option<String>,
    region: Option<String>,
    country: Option<String>,
    loc: Option<String>,
    org: Option<String>,
    postal: Option<String>,
    timezone: Option<String>,
}

pub async fn probe(endpoint: &str, protocol: Protocol, ctx: &ProbeContext<'_>) -> InfoVerdict {
    if ctx.config.test_url_info.is_empty() {
        return InfoVerdict { location: None };
    }
    let timeout = Duration::from_secs_f64(ctx.config.timeout_ipinfo);
    let client = match proxied_client(endpoint, protocol, timeout) {
        Ok(c) => c,
        Err(_) => return InfoVerdict { location: None },
    };

    let response = match client.get(&ctx.config.test_url_info).send().await {
        Ok(resp) if resp.status().is_success() => resp,
        _ => return InfoVerdict { location: None },
    };
    let parsed: InfoResponse = match response.json().await {
        Ok(p) => p,
        Err(_) => return InfoVerdict { location: None },
    };

    let coord = parsed.loc.as_deref().and_then(parse_coord);
    let location = Location {
        city: parsed.city.unwrap_or_else(|| crate::models::UNKNOWN.to_string()),
        region: parsed.region.unwrap_or_else(|| crate::models::UNKNOWN.to_string()),
        country: parsed.country.unwrap_or_else(|| crate::models::UNKNOWN.to_string()),
        coord,
        org: parsed.org.unwrap_or_else(|| crate::models::UNKNOWN.to_string()),
        postal: parsed.postal.unwrap_or_else(|| crate::models::UNKNOWN.to_string()),
        timezone: parsed.timezone.unwrap_or_else(|| crate::models::UNKNOWN.to_string()),
    };

    if location.is_unknown() {
        InfoVerdict { location: None }
    } else {
        InfoVerdict {
            location: Some(location),
        }
    }
}

fn parse_coord(loc: &str) -> Option<(f64, f64)> {
    let (lat, lon) = loc.split_once(',')?;
    Some((lat.trim().parse().ok()?, lon.trim().parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_coord_splits_lat_lon() {
        assert_eq!(parse_coord("37.751,-97.822"), Some((37.751, -97.822)));
        assert_eq!(parse_coord("garbage"), None);
    }
}
