//! The Scoring Engine (component E, spec §4.5): a pure, deterministic
//! function from `(current record, probe bundle) -> new record`. No I/O,
//! no clock reads beyond the `now` passed in by the caller.

use crate::models::{ProbeBundle, Protocol, ProxyRecord};

/// `clamp(S + delta, 0, max_score)` for the dual-region adjustment rule.
fn dual_region_delta(dual_ok_count: u8) -> i32 {
    match dual_ok_count {
        2 => 2,
        1 => 1,
        _ => -1,
    }
}

/// Apply one round of probe results to a (possibly absent) current record,
/// returning the new record. `now` is the caller-supplied current
/// timestamp (unix seconds); the engine never reads the clock itself.
pub fn apply(
    current: Option<&ProxyRecord>,
    endpoint: &str,
    bundle: &ProbeBundle,
    max_score: i32,
    now: i64,
) -> ProxyRecord {
    match current {
        None => new_candidate(endpoint, bundle, max_score, now),
        Some(existing) => refresh(existing, bundle, max_score, now),
    }
}

fn new_candidate(endpoint: &str, bundle: &ProbeBundle, max_score: i32, now: i64) -> ProxyRecord {
    let mut record = ProxyRecord::new_candidate(endpoint, now);

    if let Some(dual) = &bundle.dual {
        if dual.any_ok() {
            record.score = 98;
            record.protocols.insert(dual.detected_protocol);
            if let Some(avg) = dual.successful_leg_avg() {
                record.performance.avg_latency_s = avg;
            }
        } else {
            record.score = 0;
        }
        record.supports_cn = dual.cn_ok;
        record.supports_intl = dual.intl_ok;
        record.performance.success_rate = 0.3 * dual.success_rate() + 0.7 * 0.5;
    }

    if let Some(anonymity) = &bundle.anonymity {
        if anonymity.check_ok {
            record.transparent = anonymity.is_transparent;
            record.observed_egress_ip = anonymity.observed_ip.clone();
        }
    }

    if let Some(info) = &bundle.info {
        if let Some(location) = &info.location {
            record.location = location.clone();
        }
    }

    apply_browser_and_security(&mut record, bundle, now);
    record.clamp_score(max_score);
    record.updated_at = now;
    record
}

fn refresh(existing: &ProxyRecord, bundle: &ProbeBundle, max_score: i32, now: i64) -> ProxyRecord {
    let mut record = existing.clone();

    if let Some(dual) = &bundle.dual {
        let ok_count = dual.cn_ok as u8 + dual.intl_ok as u8;
        let delta = dual_region_delta(ok_count);
        record.score = (existing.score + delta).clamp(0, max_score);

        if dual.any_ok() {
            record.protocols.insert(dual.detected_protocol);
        }
        record.supports_cn = dual.cn_ok;
        record.supports_intl = dual.intl_ok;

        if let Some(cur_avg) = dual.successful_leg_avg() {
            record.performance.avg_latency_s = if existing.performance.avg_latency_s > 0.0 {
                0.3 * cur_avg + 0.7 * existing.performance.avg_latency_s
            } else {
                cur_avg
            };
        }
        let cur_rate = dual.success_rate();
        record.performance.success_rate = 0.3 * cur_rate + 0.7 * existing.performance.success_rate;
    }

    if existing.location.is_unknown() {
        if let Some(info) = &bundle.info {
            if let Some(location) = &info.location {
                record.location = location.clone();
            }
        }
    }

    if let Some(anonymity) = &bundle.anonymity {
        if anonymity.check_ok {
            record.transparent = anonymity.is_transparent;
            record.observed_egress_ip = anonymity.observed_ip.clone();
        }
    }

    apply_browser_and_security(&mut record, bundle, now);
    record.clamp_score(max_score);
    record.updated_at = now;
    record
}

fn apply_browser_and_security(record: &mut ProxyRecord, bundle: &ProbeBundle, now: i64) {
    if let Some(browser) = &bundle.browser {
        record.browser.valid = Some(browser.ok);
        record.browser.checked_at = Some(now);
        record.browser.latency_ms = Some(browser.latency_ms);
    }

    if let Some(security) = &bundle.security {
        record.security.dns_ok = security.dns_ok.clone();
        record.security.tls_ok = security.tls_ok.clone();
        record.security.clean_content = security.clean_content.clone();
        record.security.data_intact = security.data_intact.clone();
        record.security.behaviour_ok = security.behaviour_ok.clone();
        record.security.checked_at = Some(now);
    }
}

/// Lightweight score/latency adjustment for a lease outcome (spec §4.7
/// `/proxy/release`): no probe bundle runs here, just a `+1`/`-1` score
/// nudge and the same 0.3/0.7 latency blend the Scoring Engine uses for
/// a probe round.
pub fn apply_release_outcome(
    existing: &ProxyRecord,
    success: bool,
    response_s: Option<f64>,
    max_score: i32,
    now: i64,
) -> ProxyRecord {
    let mut record = existing.clone();
    record.score = (existing.score + if success { 2 } else { -1 }).clamp(0, max_score);
    if let Some(elapsed) = response_s {
        record.performance.avg_latency_s = if existing.performance.avg_latency_s > 0.0 {
            0.3 * elapsed + 0.7 * existing.performance.avg_latency_s
        } else {
            elapsed
        };
    }
    record.performance.success_rate = 0.3 * (success as i32 as f64) + 0.7 * existing.performance.success_rate;
    record.performance.last_checked = Some(now);
    record.updated_at = now;
    record
}

/// Merge one GitHub-mirror CSV row into the local record (spec §6: "the
/// local record absorbs the fields column-by-column, protocols are
/// unioned, success_rate is recomputed as `max(0.3, old*0.7 +
/// (score/100)*0.3)`").
pub fn merge_mirror_row(
    existing: Option<&ProxyRecord>,
    endpoint: &str,
    protocol: Protocol,
    score: i32,
    supports_cn: bool,
    supports_intl: bool,
    transparent: bool,
    observed_egress_ip: &str,
    now: i64,
) -> ProxyRecord {
    let mut record = match existing {
        Some(r) => r.clone(),
        None => ProxyRecord::new_candidate(endpoint, now),
    };
    record.protocols.insert(protocol);
    record.score = score;
    record.supports_cn = supports_cn;
    record.supports_intl = supports_intl;
    record.transparent = transparent;
    record.observed_egress_ip = observed_egress_ip.to_string();
    let old_rate = record.performance.success_rate;
    record.performance.success_rate = (old_rate * 0.7 + (score as f64 / 100.0) * 0.3).max(0.3);
    record.updated_at = now;
    record
}
