//! P6 security probe (spec §4.2): five independent sub-checks run
//! sequentially for one proxy. Regex patterns and the base64 fixed-body
//! literal are grounded on `original_source/validators/security_checker.py`.

use super::client::{direct_client, proxied_client};
use super::ProbeContext;
use crate::models::{CheckVerdict, Protocol, SecurityVerdict};
use once_cell::sync::Lazy;
use regex::RegexSet;
use serde::Deserialize;
use std::time::Duration;

static MALICIOUS_PATTERNS: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([
        r#"(?i)<script[^>]*src=["']?[^>]*\.min\.js"#,
        r"(?i)eval\(",
        r"(?i)document\.write",
        r"(?i)<iframe",
        r"(?i)javascript:",
    ])
    .expect("malicious content pattern set compiles")
});

const EXPECTED_BASE64_BODY: &str = "Hello World";
const RESPONSE_TIME_THRESHOLD_S: f64 = 5.0;

pub async fn probe(endpoint: &str, protocol: Protocol, ctx: &ProbeContext<'_>) -> SecurityVerdict {
    let timeout = Duration::from_secs_f64(ctx.config.timeout_safety);
    let client = match proxied_client(endpoint, protocol, timeout) {
        Ok(c) => c,
        Err(e) => {
            let err = CheckVerdict::error(e.to_string());
            return SecurityVerdict {
                dns_ok: err.clone(),
                tls_ok: err.clone(),
                clean_content: err.clone(),
                data_intact: err.clone(),
                behaviour_ok: err,
            };
        }
    };
    let urls = &ctx.config.test_urls_safety;

    let html_body = fetch_body(&client, &urls.html).await;
    let json_body = fetch_body(&client, &urls.json).await;
    let clean_content = check_malicious_content(&html_body, &json_body);

    let tls_ok = check_tls(&client, &urls.https).await;

    let dns_ok = check_dns_integrity(&client, ctx).await;

    let data_intact = check_data_integrity(&client, &urls.base64).await;

    let behaviour_ok = check_behaviour(&client, &urls.headers, &urls.delay).await;

    SecurityVerdict {
        dns_ok,
        tls_ok,
        clean_content,
        data_intact,
        behaviour_ok,
    }
}

async fn fetch_body(client: &reqwest::Client, url: &str) -> Option<String> {
    if url.is_empty() {
        return None;
    }
    client.get(url).send().await.ok()?.text().await.ok()
}

fn check_malicious_content(html_body: &Option<String>, json_body: &Option<String>) -> CheckVerdict {
    for body in [html_body, json_body].into_iter().flatten() {
        if MALICIOUS_PATTERNS.is_match(body) {
            return CheckVerdict::failed("malicious_content_detected");
        }
    }
    CheckVerdict::pass()
}

async fn check_tls(client: &reqwest::Client, url: &str) -> CheckVerdict {
    if url.is_empty() {
        return CheckVerdict::unknown();
    }
    match client.get(url).send().await {
        Ok(resp) if resp.status().as_u16() == 200 => CheckVerdict::pass(),
        Ok(resp) => CheckVerdict::failed(format!("status_{}", resp.status().as_u16())),
        Err(e) => CheckVerdict::error(e.to_string()),
    }
}

#[derive(Debug, Deserialize)]
struct DohResponse {
    #[serde(rename = "Answer", default)]
    answer: Vec<DohAnswer>,
}

#[derive(Debug, Deserialize)]
struct DohAnswer {
    data: String,
}

async fn query_doh(client: &reqwest::Client, doh_server: &str, domain: &str) -> Option<Vec<String>> {
    if doh_server.is_empty() || domain.is_empty() {
        return None;
    }
    let resp = client
        .get(doh_server)
        .query(&[("name", domain), ("type", "A")])
        .header("accept", "application/dns-json")
        .send()
        .await
        .ok()?;
    let parsed: DohResponse = resp.json().await.ok()?;
    let mut records: Vec<String> = parsed.answer.into_iter().map(|a| a.data).collect();
    records.sort();
    Some(records)
}

async fn check_dns_integrity(proxied: &reqwest::Client, ctx: &ProbeContext<'_>) -> CheckVerdict {
    let baseline_client = match direct_client(Duration::from_secs_f64(ctx.config.timeout_safety)) {
        Ok(c) => c,
        Err(_) => return CheckVerdict::unknown(),
    };
    let mut baseline = query_doh(&baseline_client, &ctx.config.doh_server, &ctx.config.dns_test_domain).await;
    if baseline.is_none() {
        baseline = query_doh(&baseline_client, &ctx.config.doh_server, &ctx.config.dns_test_domain).await;
    }
    let baseline = match baseline {
        Some(records) => records,
        None => return CheckVerdict::unknown(),
    };
    let via_proxy = query_doh(proxied, &ctx.config.doh_server, &ctx.config.dns_test_domain).await;
    match via_proxy {
        Some(records) if records == baseline => CheckVerdict::pass(),
        Some(_) => CheckVerdict::failed("dns_record_mismatch"),
        None => CheckVerdict::error("doh_query_via_proxy_failed"),
    }
}

async fn check_data_integrity(client: &reqwest::Client, url: &str) -> CheckVerdict {
    if url.is_empty() {
        return CheckVerdict::unknown();
    }
    match client.get(url).send().await {
        Ok(resp) => match resp.text().await {
            Ok(body) if body.trim() == EXPECTED_BASE64_BODY => CheckVerdict::pass(),
            Ok(_) => CheckVerdict::failed("body_mismatch"),
            Err(e) => CheckVerdict::error(e.to_string()),
        },
        Err(e) => CheckVerdict::error(e.to_string()),
    }
}

async fn check_behaviour(client: &reqwest::Client, headers_url: &str, delay_url: &str) -> CheckVerdict {
    let mut flags = Vec::new();

    if !headers_url.is_empty() {
        match client.get(headers_url).send().await {
            Ok(resp) => {
                for suspicious in ["via", "x-forwarded-by", "x-proxy-modified"] {
                    if resp.headers().keys().any(|k| k.as_str().eq_ignore_ascii_case(suspicious)) {
                        flags.push(format!("suspicious_header:{suspicious}"));
                    }
                }
            }
            Err(e) => return CheckVerdict::error(e.to_string()),
        }
    }

    if !delay_url.is_empty() {
        let started = std::time::Instant::now();
        match client.get(delay_url).send().await {
            Ok(_) => {
                if started.elapsed().as_secs_f64() > RESPONSE_TIME_THRESHOLD_S {
                    flags.push("response_time_exceeded".to_string());
                }
            }
            Err(e) => return CheckVerdict::error(e.to_string()),
        }
    }

    if flags.is_empty() {
        CheckVerdict::pass()
    } else {
        CheckVerdict::failed(flags.join("|"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malicious_patterns_catch_eval_and_iframe() {
        assert!(MALICIOUS_PATTERNS.is_match("<script>eval('x')</script>"));
        assert!(MALICIOUS_PATTERNS.is_match("<iframe src=\"evil\"></iframe>"));
        assert!(!MALICIOUS_PATTERNS.is_match("<p>hello world</p>"));
    }

    #[test]
    fn check_malicious_content_passes_clean_bodies() {
        let verdict = check_malicious_content(&Some("<html>ok</html>".to_string()), &None);
        assert!(verdict.is_pass());
    }

    #[test]
    fn check_malicious_content_fails_on_script_injection() {
        let verdict = check_malicious_content(
            &Some("<script src=\"evil.min.js\"></script>".to_string()),
            &None,
        );
        assert!(!verdict.is_pass());
    }
}
