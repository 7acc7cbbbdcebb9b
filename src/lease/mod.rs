//! The Lease Manager (component F, spec §4.6): the authoritative
//! in-memory index of proxy status. Per-endpoint critical sections go
//! through `dashmap::DashMap`'s entry API (a constant-time, per-key
//! locked mutation, matching spec §4.6's "a map mutation + status update
//! is a constant-time critical section"); the descending-score selection
//! order is a separately locked `Vec` rebuilt on load and kept in sync on
//! every attribute change.

use crate::error::ApiError;
use crate::models::{LeaseRecord, LeaseStatus, Protocol, ProxyRecord};
use crate::storage::ProxyStore;
use dashmap::DashMap;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;

/// The region filter accepted by `/proxy/acquire`'s `support_region` field.
/// `All`/absent means "no region filter" (Open Question in spec §4.6/§10
/// resolved this way — see `DESIGN.md`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Cn,
    Intl,
    All,
}

impl Region {
    pub fn parse(s: Option<&str>) -> Self {
        match s.map(str::to_ascii_lowercase).as_deref() {
            Some("cn") => Region::Cn,
            Some("intl") | Some("international") => Region::Intl,
            _ => Region::All,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AcquireFilters {
    pub protocol: Option<Protocol>,
    pub region: Region,
    pub min_score: Option<i32>,
    pub excluded: HashSet<String>,
}

impl Default for Region {
    fn default() -> Self {
        Region::All
    }
}

struct Entry {
    protocols: BTreeSet<Protocol>,
    supports_cn: bool,
    supports_intl: bool,
    score: i32,
    lease: LeaseRecord,
}

pub struct LeaseManager {
    entries: DashMap<String, Entry>,
    order: Mutex<Vec<String>>,
    store: Arc<ProxyStore>,
}

pub struct AcquireResult {
    pub endpoint: String,
    pub task_id: String,
    pub record: ProxyRecord,
}

impl LeaseManager {
    pub fn new(store: Arc<ProxyStore>) -> Self {
        Self {
            entries: DashMap::new(),
            order: Mutex::new(Vec::new()),
            store,
        }
    }

    /// Full rebuild from the Store (spec §4.6 "rebuilt at load"; also used
    /// by `GET /proxy/reload`).
    pub async fn load(&self) -> Result<(), crate::error::StoreError> {
        let records = self.store.load_all().await?;
        let leases = self.store.load_lease_statuses().await?;
        let mut lease_by_endpoint: std::collections::HashMap<String, LeaseRecord> =
            leases.into_iter().map(|l| (l.endpoint.clone(), l)).collect();

        self.entries.clear();
        for record in &records {
            let lease = lease_by_endpoint
                .remove(&record.endpoint)
                .unwrap_or_else(|| LeaseRecord::idle(&record.endpoint));
            self.entries.insert(
                record.endpoint.clone(),
                Entry {
                    protocols: record.protocols.clone(),
                    supports_cn: record.supports_cn,
                    supports_intl: record.supports_intl,
                    score: record.score,
                    lease,
                },
            );
        }

        let mut order = self.order.lock().await;
        order.clear();
        let mut endpoints: Vec<(i32, String)> =
            records.iter().map(|r| (r.score, r.endpoint.clone())).collect();
        endpoints.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        order.extend(endpoints.into_iter().map(|(_, e)| e));
        Ok(())
    }

    /// Keep the selection index in sync with an attribute/score change made
    /// outside the lease state machine (a Scoring Engine write, or the
    /// release-time score delta). Spec §4.6: "maintained on every
    /// score/attribute change".
    pub async fn sync_attributes(&self, record: &ProxyRecord) {
        let is_new = !self.entries.contains_key(&record.endpoint);
        self.entries
            .entry(record.endpoint.clone())
            .and_modify(|e| {
                e.protocols = record.protocols.clone();
                e.supports_cn = record.supports_cn;
                e.supports_intl = record.supports_intl;
                e.score = record.score;
            })
            .or_insert_with(|| Entry {
                protocols: record.protocols.clone(),
                supports_cn: record.supports_cn,
                supports_intl: record.supports_intl,
                score: record.score,
                lease: LeaseRecord::idle(&record.endpoint),
            });

        let mut order = self.order.lock().await;
        if is_new {
            order.push(record.endpoint.clone());
        }
        order.sort_by(|a, b| {
            let score_a = self.entries.get(a).map(|e| e.score).unwrap_or(0);
            let score_b = self.entries.get(b).map(|e| e.score).unwrap_or(0);
            score_b.cmp(&score_a).then_with(|| a.cmp(b))
        });
    }

    /// Selection algorithm (spec §4.6): descending score order, first idle
    /// match wins, atomic flip to busy.
    pub async fn acquire(&self, filters: AcquireFilters, task_id: String, now: i64) -> Result<AcquireResult, ApiError> {
        let order = self.order.lock().await;
        for endpoint in order.iter() {
            if filters.excluded.contains(endpoint) {
                continue;
            }
            let Some(mut entry) = self.entries.get_mut(endpoint) else {
                continue;
            };
            if entry.lease.status != LeaseStatus::Idle {
                continue;
            }
            if let Some(min_score) = filters.min_score {
                if entry.score < min_score {
                    continue;
                }
            }
            if let Some(protocol) = filters.protocol {
                if !entry.protocols.contains(&protocol) {
                    continue;
                }
            }
            match filters.region {
                Region::Cn if !entry.supports_cn => continue,
                Region::Intl if !entry.supports_intl => continue,
                _ => {}
            }

            entry.lease.status = LeaseStatus::Busy;
            entry.lease.task_id = Some(task_id.clone());
            entry.lease.acquired_at = Some(now);
            entry.lease.heartbeat_at = Some(now);
            let lease_snapshot = entry.lease.clone();
            let endpoint = endpoint.clone();
            drop(entry);
            drop(order);

            self.store.persist_lease(&lease_snapshot).await;
            let record = self
                .store
                .get(&endpoint)
                .await
                .map_err(ApiError::Store)?
                .ok_or_else(|| ApiError::NotFound(endpoint.clone()))?;
            return Ok(AcquireResult {
                endpoint,
                task_id,
                record,
            });
        }
        Err(ApiError::LeaseExhausted)
    }

    /// `busy -> idle` on success, `busy -> dead` on failure. Mismatched
    /// `task_id` still transitions (spec §4.6 "the engineering choice here
    /// is that leaking a busy slot is worse than accepting a spurious
    /// release").
    pub async fn release(&self, endpoint: &str, task_id: &str, success: bool, now: i64) -> Result<(), ApiError> {
        let mut entry = self
            .entries
            .get_mut(endpoint)
            .ok_or_else(|| ApiError::NotFound(endpoint.to_string()))?;
        if entry.lease.task_id.as_deref() != Some(task_id) {
            tracing::warn!(endpoint, task_id, "release with mismatched task_id; transitioning anyway");
        }
        entry.lease.status = if success { LeaseStatus::Idle } else { LeaseStatus::Dead };
        entry.lease.task_id = None;
        entry.lease.acquired_at = None;
        entry.lease.heartbeat_at = if success { None } else { Some(now) };
        let snapshot = entry.lease.clone();
        drop(entry);
        self.store.persist_lease(&snapshot).await;
        Ok(())
    }

    /// Updates `heartbeat_at` iff `task_id` matches; mismatch is a no-op
    /// failure (spec §4.6, HTTP 400 at the API layer).
    pub async fn heartbeat(&self, endpoint: &str, task_id: &str, now: i64) -> Result<(), ApiError> {
        let mut entry = self
            .entries
            .get_mut(endpoint)
            .ok_or_else(|| ApiError::NotFound(endpoint.to_string()))?;
        if entry.lease.task_id.as_deref() != Some(task_id) {
            return Err(ApiError::LeaseMismatch);
        }
        entry.lease.heartbeat_at = Some(now);
        let snapshot = entry.lease.clone();
        drop(entry);
        self.store.persist_lease(&snapshot).await;
        Ok(())
    }

    pub fn stats(&self) -> crate::models::StatsData {
        let mut stats = crate::models::StatsData::default();
        for entry in self.entries.iter() {
            stats.total += 1;
            match entry.lease.status {
                LeaseStatus::Idle => stats.idle += 1,
                LeaseStatus::Busy => stats.busy += 1,
                LeaseStatus::Dead => stats.dead += 1,
            }
            for protocol in &entry.protocols {
                *stats.by_protocol.entry(protocol.to_string()).or_insert(0) += 1;
            }
        }
        stats
    }

    /// Reaper tick (spec §4.6): force `busy -> dead` for any lease whose
    /// `heartbeat_at` predates `now - heartbeat_timeout_s`.
    pub async fn reap_stale_leases(&self, heartbeat_timeout_s: i64, now: i64) -> usize {
        let mut reaped = 0;
        let stale: Vec<String> = self
            .entries
            .iter()
            .filter(|e| {
                e.lease.status == LeaseStatus::Busy
                    && e.lease.heartbeat_at.map(|h| now - h > heartbeat_timeout_s).unwrap_or(true)
            })
            .map(|e| e.key().clone())
            .collect();
        for endpoint in stale {
            if let Some(mut entry) = self.entries.get_mut(&endpoint) {
                entry.lease.status = LeaseStatus::Dead;
                let snapshot = entry.lease.clone();
                drop(entry);
                tracing::warn!(endpoint, "lease reaped: heartbeat exceeded threshold");
                self.store.persist_lease(&snapshot).await;
                reaped += 1;
            }
        }
        reaped
    }

    /// Dead-record cleaner (spec §4.6, every sixth reaper cycle): removes
    /// `dead` leases and their in-memory records, keeping the durable row
    /// unless its score is `<= 0`.
    pub async fn cleanup_dead(&self) -> usize {
        let dead: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.lease.status == LeaseStatus::Dead)
            .map(|e| e.key().clone())
            .collect();
        for endpoint in &dead {
            self.entries.remove(endpoint);
        }
        if !dead.is_empty() {
            let mut order = self.order.lock().await;
            order.retain(|e| !dead.contains(e));
        }
        dead.len()
    }

    /// Spawns the background reaper (spec §4.6): ticks every `tick`,
    /// reclaiming leases whose heartbeat is older than
    /// `heartbeat_timeout_s`; every sixth tick prunes dead in-memory
    /// entries; every twelfth tick asks the Store to drop zero-scored rows.
    pub fn spawn_reaper(
        manager: Arc<LeaseManager>,
        store: Arc<ProxyStore>,
        signal: crate::signal::SignalBus,
        tick: std::time::Duration,
        heartbeat_timeout_s: i64,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            let mut cycle: u64 = 0;
            loop {
                interval.tick().await;
                if signal.is_tripped() {
                    break;
                }
                let now = chrono::Utc::now().timestamp();
                let reaped = manager.reap_stale_leases(heartbeat_timeout_s, now).await;
                if reaped > 0 {
                    tracing::info!(reaped, "reaper reclaimed stale leases");
                }
                cycle += 1;
                if cycle % 6 == 0 {
                    let cleaned = manager.cleanup_dead().await;
                    if cleaned > 0 {
                        tracing::info!(cleaned, "reaper pruned dead in-memory leases");
                    }
                }
                if cycle % 12 == 0 {
                    match store.purge_zero().await {
                        Ok(purged) if purged > 0 => tracing::info!(purged, "reaper purged zero-scored records"),
                        Err(e) => tracing::warn!("purge_zero failed: {e}"),
                        _ => {}
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Protocol;

    async fn manager_with(records: Vec<ProxyRecord>) -> LeaseManager {
        let store = Arc::new(ProxyStore::open_in_memory().unwrap());
        store.upsert(records).await.unwrap();
        let manager = LeaseManager::new(store);
        manager.load().await.unwrap();
        manager
    }

    fn candidate(endpoint: &str, score: i32) -> ProxyRecord {
        let mut r = ProxyRecord::new_candidate(endpoint, 0);
        r.score = score;
        r.protocols.insert(Protocol::Http);
        r.supports_cn = true;
        r
    }

    #[tokio::test]
    async fn acquire_picks_highest_score_idle_match() {
        let manager = manager_with(vec![candidate("1.1.1.1:80", 50), candidate("2.2.2.2:80", 90)]).await;
        let result = manager
            .acquire(AcquireFilters::default(), "task-1".to_string(), 1_000)
            .await
            .unwrap();
        assert_eq!(result.endpoint, "2.2.2.2:80");
    }

    #[tokio::test]
    async fn acquire_excludes_busy_endpoints() {
        let manager = manager_with(vec![candidate("1.1.1.1:80", 90)]).await;
        manager
            .acquire(AcquireFilters::default(), "task-1".to_string(), 1_000)
            .await
            .unwrap();
        let second = manager.acquire(AcquireFilters::default(), "task-2".to_string(), 1_001).await;
        assert!(matches!(second, Err(ApiError::LeaseExhausted)));
    }

    #[tokio::test]
    async fn release_success_returns_to_idle() {
        let manager = manager_with(vec![candidate("1.1.1.1:80", 90)]).await;
        manager
            .acquire(AcquireFilters::default(), "task-1".to_string(), 1_000)
            .await
            .unwrap();
        manager.release("1.1.1.1:80", "task-1", true, 1_001).await.unwrap();
        let reacquired = manager
            .acquire(AcquireFilters::default(), "task-2".to_string(), 1_002)
            .await;
        assert!(reacquired.is_ok());
    }

    #[tokio::test]
    async fn release_failure_marks_dead_and_invisible_to_acquire() {
        let manager = manager_with(vec![candidate("1.1.1.1:80", 90)]).await;
        manager
            .acquire(AcquireFilters::default(), "task-1".to_string(), 1_000)
            .await
            .unwrap();
        manager.release("1.1.1.1:80", "task-1", false, 1_001).await.unwrap();
        let reacquired = manager
            .acquire(AcquireFilters::default(), "task-2".to_string(), 1_002)
            .await;
        assert!(matches!(reacquired, Err(ApiError::LeaseExhausted)));
    }

    #[tokio::test]
    async fn heartbeat_mismatch_is_noop_failure() {
        let manager = manager_with(vec![candidate("1.1.1.1:80", 90)]).await;
        manager
            .acquire(AcquireFilters::default(), "task-1".to_string(), 1_000)
            .await
            .unwrap();
        let result = manager.heartbeat("1.1.1.1:80", "wrong-task", 1_001).await;
        assert!(matches!(result, Err(ApiError::LeaseMismatch)));
    }

    #[tokio::test]
    async fn reaper_reclaims_stale_heartbeats() {
        let manager = manager_with(vec![candidate("1.1.1.1:80", 90)]).await;
        manager
            .acquire(AcquireFilters::default(), "task-1".to_string(), 1_000)
            .await
            .unwrap();
        let reaped = manager.reap_stale_leases(1_800, 1_000 + 1_801).await;
        assert_eq!(reaped, 1);
        let reacquired = manager
            .acquire(AcquireFilters::default(), "task-2".to_string(), 5_000)
            .await;
        assert!(matches!(reacquired, Err(ApiError::LeaseExhausted)));
    }
}
