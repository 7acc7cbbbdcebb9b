//! Request/response bodies for the HTTP API surface (spec §4.7).

use super::proxy::ProxyRecord;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// `{code, message, data}` envelope used by every API response; the HTTP
/// status mirrors `code`.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope<T> {
    pub code: u16,
    pub message: String,
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            code: 200,
            message: "ok".to_string(),
            data: Some(data),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AcquireRequest {
    pub proxy_type: Option<String>,
    pub support_region: Option<String>,
    pub min_score: Option<i32>,
    #[serde(default)]
    pub exclude_proxies: Vec<String>,
    pub task_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AcquireData {
    pub proxy: String,
    pub task_id: String,
    pub proxy_info: ProxyRecord,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseRequest {
    pub proxy: String,
    pub task_id: String,
    pub success: bool,
    pub response_time: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HeartbeatRequest {
    pub proxy: String,
    pub task_id: String,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct StatsData {
    pub total: usize,
    pub idle: usize,
    pub busy: usize,
    pub dead: usize,
    pub by_protocol: HashMap<String, usize>,
    /// Count of records whose `SecurityProfile::aggregate_passed` is true,
    /// `None` until computed by the handler (the Lease Manager itself has
    /// no Store access).
    pub security_passed: Option<usize>,
    /// Lease-outcome history from `proxy_usage`, `None` until computed by
    /// the handler (the Lease Manager itself has no Store access).
    pub usage: Option<UsageSummary>,
}

/// Lease-outcome aggregate surfaced by `/proxy/stats` (spec supplement,
/// `original_source/storage/database.py`'s `proxy_usage` table).
#[derive(Debug, Clone, Default, Serialize)]
pub struct UsageSummary {
    pub total_recorded: u64,
    pub successes: u64,
    pub avg_response_s: Option<f64>,
}
