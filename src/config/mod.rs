//! Strongly-typed configuration (spec §6, §9 "replace dynamic typing of
//! configuration").
//!
//! Loaded from TOML the way `MaurUppi-CCstatus`, `pks-os-neon`, and
//! `Alb-O-xeno` load their own configuration in the retrieved pack. Unknown
//! keys are tolerated and ignored (no `deny_unknown_fields`); the two
//! legacy string-form booleans called out in spec §6 deserialize from
//! either a TOML bool or the strings `"true"`/`"false"`.

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;

fn bool_or_legacy_string<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum BoolOrString {
        Bool(bool),
        Str(String),
    }
    match BoolOrString::deserialize(deserializer)? {
        BoolOrString::Bool(b) => Ok(b),
        BoolOrString::Str(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(D::Error::custom(format!(
                "expected boolean or \"true\"/\"false\", got {other:?}"
            ))),
        },
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyTestUrls {
    #[serde(default = "default_safety_html")]
    pub html: String,
    #[serde(default = "default_safety_json")]
    pub json: String,
    #[serde(default = "default_safety_https")]
    pub https: String,
    #[serde(default = "default_safety_headers")]
    pub headers: String,
    #[serde(default = "default_safety_delay")]
    pub delay: String,
    #[serde(default = "default_safety_base64")]
    pub base64: String,
}

fn default_safety_html() -> String {
    "https://httpbin.org/html".to_string()
}
fn default_safety_json() -> String {
    "https://httpbin.org/json".to_string()
}
fn default_safety_https() -> String {
    "https://httpbin.org/get".to_string()
}
fn default_safety_headers() -> String {
    "https://httpbin.org/headers".to_string()
}
fn default_safety_delay() -> String {
    "https://httpbin.org/delay/3".to_string()
}
fn default_safety_base64() -> String {
    "https://httpbin.org/base64/cHJveHlwb29s".to_string()
}

impl Default for SafetyTestUrls {
    fn default() -> Self {
        Self {
            html: default_safety_html(),
            json: default_safety_json(),
            https: default_safety_https(),
            headers: default_safety_headers(),
            delay: default_safety_delay(),
            base64: default_safety_base64(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MainConfig {
    pub timeout_cn: f64,
    pub timeout_intl: f64,
    pub timeout_transparent: f64,
    pub timeout_ipinfo: f64,
    pub timeout_safety: f64,
    /// Milliseconds (browser timeouts are ms-scale, spec §4.2 P5).
    pub timeout_browser: f64,

    pub test_url_cn: Vec<String>,
    pub test_url_intl: Vec<String>,
    pub test_url_transparent: Vec<String>,
    pub test_url_info: String,
    pub test_url_browser: String,
    pub test_urls_safety: SafetyTestUrls,
    pub dns_test_domain: String,
    pub doh_server: String,

    /// Expected status code for the captive-portal-style reachability
    /// probe (spec §4.2 P1); default 204.
    pub reachability_expected_status: u16,

    /// Services to ask "what is my IP"; one is chosen at random per
    /// attempt, up to `own_ip_retries` times, at batch start.
    pub own_ip_services: Vec<String>,
    pub own_ip_retries: u32,
    /// Cache of the host's own egress IP, refreshed at batch start.
    pub own_ip: Option<String>,

    #[serde(deserialize_with = "bool_or_legacy_string")]
    pub check_transparent: bool,
    #[serde(deserialize_with = "bool_or_legacy_string")]
    pub get_ip_info: bool,

    pub max_workers: usize,
    pub max_score: i32,
    pub high_score_agency_scope: i32,
    pub number_of_items_per_row: usize,

    pub db_file: String,
}

impl Default for MainConfig {
    fn default() -> Self {
        Self {
            timeout_cn: 5.0,
            timeout_intl: 8.0,
            timeout_transparent: 8.0,
            timeout_ipinfo: 8.0,
            timeout_safety: 8.0,
            timeout_browser: 15_000.0,
            test_url_cn: vec!["https://www.baidu.com/generate_204".to_string()],
            test_url_intl: vec!["https://www.gstatic.com/generate_204".to_string()],
            test_url_transparent: vec!["https://httpbin.org/ip".to_string()],
            test_url_info: "https://ipinfo.io/json".to_string(),
            test_url_browser: "https://example.com/".to_string(),
            test_urls_safety: SafetyTestUrls::default(),
            dns_test_domain: "www.example.com".to_string(),
            doh_server: "https://cloudflare-dns.com/dns-query".to_string(),
            reachability_expected_status: 204,
            own_ip_services: vec![
                "https://api.ipify.org".to_string(),
                "https://ifconfig.me/ip".to_string(),
            ],
            own_ip_retries: 3,
            own_ip: None,
            check_transparent: true,
            get_ip_info: true,
            max_workers: 100,
            max_score: 100,
            high_score_agency_scope: 80,
            number_of_items_per_row: 3,
            db_file: "proxypool.sqlite".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InterruptConfig {
    pub interrupt_dir: String,
    pub interrupt_file_crawl: String,
    pub interrupt_file_load: String,
    pub interrupt_file_existing: String,
    pub interrupt_file_safety: String,
    pub interrupt_file_browser: String,
}

impl Default for InterruptConfig {
    fn default() -> Self {
        Self {
            interrupt_dir: "checkpoints".to_string(),
            interrupt_file_crawl: "crawl.ckpt".to_string(),
            interrupt_file_load: "load.ckpt".to_string(),
            interrupt_file_existing: "existing.ckpt".to_string(),
            interrupt_file_safety: "security.ckpt".to_string(),
            interrupt_file_browser: "browser.ckpt".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 7070,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GithubConfig {
    pub token: Option<String>,
    pub down_url: Option<String>,
    pub actions_repo_api: Option<String>,
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub main: MainConfig,
    pub interrupt: InterruptConfig,
    pub api: ApiConfig,
    pub github: GithubConfig,
}

impl Config {
    /// Load from a TOML file, falling back to defaults for any section or
    /// field that is absent. Unknown top-level keys or table entries are
    /// ignored.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::warn!(
                "config file {} not found, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&raw)?;
        Ok(config)
    }
}
