//! P2 dual-region reachability probe (spec §4.2).

use super::{pick_random_url, reachability, ProbeContext};
use crate::models::{DualVerdict, ProtocolHint};
use std::time::Duration;

pub async fn probe(endpoint: &str, hint: ProtocolHint, ctx: &ProbeContext<'_>) -> DualVerdict {
    let cn_url = pick_random_url(&ctx.config.test_url_cn);
    let intl_url = pick_random_url(&ctx.config.test_url_intl);
    let expected = ctx.config.reachability_expected_status;

    let cn = reachability::probe(
        endpoint,
        hint,
        &cn_url,
        expected,
        Duration::from_secs_f64(ctx.config.timeout_cn),
        ctx,
    )
    .await;
    let intl = reachability::probe(
        endpoint,
        hint,
        &intl_url,
        expected,
        Duration::from_secs_f64(ctx.config.timeout_intl),
        ctx,
    )
    .await;

    let detected_protocol = if cn.ok {
        cn.detected_protocol
    } else if intl.ok {
        intl.detected_protocol
    } else {
        intl.detected_protocol
    };

    DualVerdict {
        cn_ok: cn.ok,
        cn_elapsed_s: cn.elapsed_s,
        intl_ok: intl.ok,
        intl_elapsed_s: intl.elapsed_s,
        detected_protocol,
    }
}
