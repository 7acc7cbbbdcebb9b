//! The Lease Record: volatile per-endpoint lease bookkeeping (spec §3, §4.6).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeaseStatus {
    Idle,
    Busy,
    Dead,
}

impl LeaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaseStatus::Idle => "idle",
            LeaseStatus::Busy => "busy",
            LeaseStatus::Dead => "dead",
        }
    }
}

/// `busy => task_id.is_some() && acquired_at.is_some()`. An endpoint present
/// in the Proxy Record store but absent from the lease table is implicitly
/// `Idle`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseRecord {
    pub endpoint: String,
    pub status: LeaseStatus,
    pub task_id: Option<String>,
    pub acquired_at: Option<i64>,
    pub heartbeat_at: Option<i64>,
}

impl LeaseRecord {
    pub fn idle(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            status: LeaseStatus::Idle,
            task_id: None,
            acquired_at: None,
            heartbeat_at: None,
        }
    }
}
