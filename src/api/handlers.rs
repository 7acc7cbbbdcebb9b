//! Thin handlers: parse, delegate to the Lease Manager / Store, envelope
//! the result (spec §4.7).

use super::state::ApiState;
use crate::error::ApiError;
use crate::lease::{AcquireFilters, Region};
use crate::models::{
    AcquireData, AcquireRequest, Envelope, HeartbeatRequest, Protocol, ProxyRecord,
    ReleaseRequest, StatsData,
};
use crate::scoring;
use axum::extract::{Path, State};
use axum::Json;
use std::str::FromStr;

pub async fn acquire(
    State(state): State<ApiState>,
    Json(req): Json<AcquireRequest>,
) -> Result<Json<Envelope<AcquireData>>, ApiError> {
    let filters = AcquireFilters {
        protocol: req
            .proxy_type
            .as_deref()
            .map(Protocol::from_str)
            .transpose()
            .map_err(ApiError::BadRequest)?,
        region: Region::parse(req.support_region.as_deref()),
        min_score: req.min_score,
        excluded: req.exclude_proxies.into_iter().collect(),
    };
    let task_id = req.task_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let now = state.now();
    let result = state.leases.acquire(filters, task_id, now).await?;
    Ok(Json(Envelope::ok(AcquireData {
        proxy: result.endpoint,
        task_id: result.task_id,
        proxy_info: result.record,
    })))
}

/// Releases the lease synchronously, then schedules the score/latency
/// update as a detached background task so the caller isn't held up
/// waiting on the Store (spec §4.7).
pub async fn release(
    State(state): State<ApiState>,
    Json(req): Json<ReleaseRequest>,
) -> Result<Json<Envelope<()>>, ApiError> {
    let now = state.now();
    state.leases.release(&req.proxy, &req.task_id, req.success, now).await?;

    let store = state.store.clone();
    let leases = state.leases.clone();
    let max_score = state.config.main.max_score;
    let endpoint = req.proxy.clone();
    let task_id = req.task_id.clone();
    let success = req.success;
    let response_time = req.response_time;
    tokio::spawn(async move {
        store.record_usage(&endpoint, &task_id, success, response_time, now).await;
        let Ok(Some(existing)) = store.get(&endpoint).await else {
            return;
        };
        let updated = scoring::apply_release_outcome(&existing, success, response_time, max_score, now);
        if store.upsert(vec![updated.clone()]).await.is_ok() {
            leases.sync_attributes(&updated).await;
        }
    });

    Ok(Json(Envelope::ok(())))
}

pub async fn heartbeat(
    State(state): State<ApiState>,
    Json(req): Json<HeartbeatRequest>,
) -> Result<Json<Envelope<()>>, ApiError> {
    let now = state.now();
    state.leases.heartbeat(&req.proxy, &req.task_id, now).await?;
    Ok(Json(Envelope::ok(())))
}

pub async fn stats(State(state): State<ApiState>) -> Json<Envelope<StatsData>> {
    let mut data = state.leases.stats();
    data.usage = state.store.usage_summary().await.ok();
    data.security_passed = state
        .store
        .load_all()
        .await
        .ok()
        .map(|records| records.iter().filter(|r| r.security.aggregate_passed()).count());
    Json(Envelope::ok(data))
}

/// `GET /proxy/info_<endpoint>` — deliberately not a generic
/// `/proxy/<endpoint>` route; any other candidate string 404s.
pub async fn info(
    State(state): State<ApiState>,
    Path(candidate): Path<String>,
) -> Result<Json<Envelope<ProxyRecord>>, ApiError> {
    let endpoint = candidate
        .strip_prefix("info_")
        .ok_or_else(|| ApiError::NotFound(candidate.clone()))?;
    let record = state
        .store
        .get(endpoint)
        .await?
        .ok_or_else(|| ApiError::NotFound(endpoint.to_string()))?;
    Ok(Json(Envelope::ok(record)))
}

pub async fn reload(State(state): State<ApiState>) -> Result<Json<Envelope<StatsData>>, ApiError> {
    state.leases.load().await?;
    Ok(Json(Envelope::ok(state.leases.stats())))
}
