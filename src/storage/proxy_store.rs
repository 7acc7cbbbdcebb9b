use crate::error::StoreError;
use crate::models::{
    BrowserProfile, CheckVerdict, LeaseRecord, LeaseStatus, Location, Performance, Protocol,
    ProxyRecord, SecurityProfile, UsageSummary,
};
use rusqlite::{params, Connection};
use std::collections::BTreeSet;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

/// The durable Store: one `proxies` row per `ProxyRecord`, one
/// `proxy_status` row per lease (best-effort, write-behind — crash
/// recovery treats a missing/stale row as `idle`), and a `proxy_usage`
/// row per successful lease cycle for the usage-history surfaced by
/// `/proxy/info_<endpoint>` (spec §4.1, §4.6; supplemented from
/// `original_source/storage/database.py`'s `proxy_usage` table).
pub struct ProxyStore {
    db: Arc<Mutex<Connection>>,
}

/// Row shape written by `upsert`; fields beyond `endpoint`/`score` mirror
/// `ProxyRecord` exactly so callers round-trip through the Scoring Engine.
pub struct UpsertOutcome {
    pub inserted: usize,
    pub updated: usize,
    pub skipped_nonpositive: usize,
}

impl ProxyStore {
    pub fn open(db_file: &str) -> Result<Self, StoreError> {
        if let Some(parent) = Path::new(db_file).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_file)?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS proxies (
                endpoint            TEXT PRIMARY KEY,
                score               INTEGER NOT NULL,
                protocols           TEXT NOT NULL,
                supports_cn         INTEGER NOT NULL,
                supports_intl       INTEGER NOT NULL,
                transparent         INTEGER NOT NULL,
                observed_egress_ip  TEXT NOT NULL,
                city                TEXT NOT NULL,
                region              TEXT NOT NULL,
                country             TEXT NOT NULL,
                coord_lat           REAL,
                coord_lon           REAL,
                org                 TEXT NOT NULL,
                postal              TEXT NOT NULL,
                timezone            TEXT NOT NULL,
                browser_valid       INTEGER,
                browser_checked_at  INTEGER,
                browser_latency_ms  INTEGER,
                dns_ok              TEXT NOT NULL,
                tls_ok              TEXT NOT NULL,
                clean_content       TEXT NOT NULL,
                data_intact         TEXT NOT NULL,
                behaviour_ok        TEXT NOT NULL,
                security_checked_at INTEGER,
                avg_latency_s       REAL NOT NULL,
                success_rate        REAL NOT NULL,
                last_checked        INTEGER,
                created_at          INTEGER NOT NULL,
                updated_at          INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_proxies_score ON proxies(score DESC);
            CREATE INDEX IF NOT EXISTS idx_proxies_supports_cn ON proxies(supports_cn);
            CREATE INDEX IF NOT EXISTS idx_proxies_supports_intl ON proxies(supports_intl);

            CREATE TABLE IF NOT EXISTS proxy_status (
                endpoint     TEXT PRIMARY KEY,
                status       TEXT NOT NULL,
                task_id      TEXT,
                acquired_at  INTEGER,
                heartbeat_at INTEGER
            );

            CREATE TABLE IF NOT EXISTS proxy_usage (
                endpoint     TEXT NOT NULL,
                task_id      TEXT NOT NULL,
                success      INTEGER NOT NULL,
                response_s   REAL,
                recorded_at  INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_proxy_usage_endpoint ON proxy_usage(endpoint);
            ",
        )?;
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    /// An in-memory database, for tests and for the in-process examples in
    /// `tests/`.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(
            "
            CREATE TABLE proxies (
                endpoint TEXT PRIMARY KEY, score INTEGER NOT NULL, protocols TEXT NOT NULL,
                supports_cn INTEGER NOT NULL, supports_intl INTEGER NOT NULL,
                transparent INTEGER NOT NULL, observed_egress_ip TEXT NOT NULL,
                city TEXT NOT NULL, region TEXT NOT NULL, country TEXT NOT NULL,
                coord_lat REAL, coord_lon REAL, org TEXT NOT NULL, postal TEXT NOT NULL,
                timezone TEXT NOT NULL, browser_valid INTEGER, browser_checked_at INTEGER,
                browser_latency_ms INTEGER, dns_ok TEXT NOT NULL, tls_ok TEXT NOT NULL,
                clean_content TEXT NOT NULL, data_intact TEXT NOT NULL,
                behaviour_ok TEXT NOT NULL, security_checked_at INTEGER,
                avg_latency_s REAL NOT NULL, success_rate REAL NOT NULL, last_checked INTEGER,
                created_at INTEGER NOT NULL, updated_at INTEGER NOT NULL
            );
            CREATE TABLE proxy_status (
                endpoint TEXT PRIMARY KEY, status TEXT NOT NULL, task_id TEXT,
                acquired_at INTEGER, heartbeat_at INTEGER
            );
            CREATE TABLE proxy_usage (
                endpoint TEXT NOT NULL, task_id TEXT NOT NULL, success INTEGER NOT NULL,
                response_s REAL, recorded_at INTEGER NOT NULL
            );
            ",
        )?;
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    /// Load every record, for use at process startup (spec §4.4 "Startup").
    pub async fn load_all(&self) -> Result<Vec<ProxyRecord>, StoreError> {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let conn = db.lock().expect("db mutex poisoned");
            let mut stmt = conn.prepare("SELECT * FROM proxies")?;
            let mut rows = stmt.query([])?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                out.push(row_to_record(row)?);
            }
            Ok(out)
        })
        .await?
    }

    pub async fn get(&self, endpoint: &str) -> Result<Option<ProxyRecord>, StoreError> {
        let db = Arc::clone(&self.db);
        let endpoint = endpoint.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = db.lock().expect("db mutex poisoned");
            let mut stmt = conn.prepare("SELECT * FROM proxies WHERE endpoint = ?1")?;
            let mut rows = stmt.query(params![endpoint])?;
            match rows.next()? {
                Some(row) => Ok(Some(row_to_record(row)?)),
                None => Ok(None),
            }
        })
        .await?
    }

    /// Upsert a batch of records, preserving `created_at` across updates.
    /// Records scoring to zero or below are skipped (spec §4.5 "a record
    /// that scores to zero is dropped on the next write, not deleted
    /// in-place").
    pub async fn upsert(&self, records: Vec<ProxyRecord>) -> Result<UpsertOutcome, StoreError> {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let mut conn = db.lock().expect("db mutex poisoned");
            let tx = conn.transaction()?;
            let mut inserted = 0;
            let mut updated = 0;
            let mut skipped = 0;
            for record in records {
                if record.score <= 0 {
                    skipped += 1;
                    continue;
                }
                let existing_created_at: Option<i64> = tx
                    .query_row(
                        "SELECT created_at FROM proxies WHERE endpoint = ?1",
                        params![record.endpoint],
                        |row| row.get(0),
                    )
                    .ok();
                let created_at = existing_created_at.unwrap_or(record.created_at);
                if existing_created_at.is_some() {
                    updated += 1;
                } else {
                    inserted += 1;
                }
                write_record(&tx, &record, created_at)?;
            }
            tx.commit()?;
            Ok(UpsertOutcome {
                inserted,
                updated,
                skipped_nonpositive: skipped,
            })
        })
        .await?
    }

    /// Delete every record whose score is `<= 0`, plus its lease status and
    /// usage history. Returns the number of proxy records removed.
    pub async fn purge_zero(&self) -> Result<u64, StoreError> {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let mut conn = db.lock().expect("db mutex poisoned");
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM proxy_usage WHERE endpoint IN (SELECT endpoint FROM proxies WHERE score <= 0)",
                [],
            )?;
            tx.execute(
                "DELETE FROM proxy_status WHERE endpoint IN (SELECT endpoint FROM proxies WHERE score <= 0)",
                [],
            )?;
            let deleted = tx.execute("DELETE FROM proxies WHERE score <= 0", [])?;
            tx.commit()?;
            Ok(deleted as u64)
        })
        .await?
    }

    /// Best-effort lease-status write-through (spec §4.1: "lease-status
    /// writes ... may be dropped under contention without compromising
    /// correctness, since the Lease Manager's in-memory state is
    /// authoritative"). Logs and swallows errors rather than propagating.
    pub async fn persist_lease(&self, lease: &LeaseRecord) {
        let db = Arc::clone(&self.db);
        let lease = lease.clone();
        let result = tokio::task::spawn_blocking(move || {
            let conn = db.lock().expect("db mutex poisoned");
            conn.execute(
                "INSERT OR REPLACE INTO proxy_status
                   (endpoint, status, task_id, acquired_at, heartbeat_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    lease.endpoint,
                    lease.status.as_str(),
                    lease.task_id,
                    lease.acquired_at,
                    lease.heartbeat_at,
                ],
            )
        })
        .await;
        if let Err(e) = result {
            tracing::warn!("lease-status persist join error: {e}");
        } else if let Err(e) = result.unwrap() {
            tracing::warn!("lease-status persist failed: {e}");
        }
    }

    pub async fn load_lease_statuses(&self) -> Result<Vec<LeaseRecord>, StoreError> {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let conn = db.lock().expect("db mutex poisoned");
            let mut stmt = conn.prepare(
                "SELECT endpoint, status, task_id, acquired_at, heartbeat_at FROM proxy_status",
            )?;
            let mut rows = stmt.query([])?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let status_str: String = row.get(1)?;
                let status = match status_str.as_str() {
                    "busy" => LeaseStatus::Busy,
                    "dead" => LeaseStatus::Dead,
                    _ => LeaseStatus::Idle,
                };
                out.push(LeaseRecord {
                    endpoint: row.get(0)?,
                    status,
                    task_id: row.get(2)?,
                    acquired_at: row.get(3)?,
                    heartbeat_at: row.get(4)?,
                });
            }
            Ok(out)
        })
        .await?
    }

    /// Append one usage record (spec supplement: `proxy_usage`), best-effort.
    pub async fn record_usage(
        &self,
        endpoint: &str,
        task_id: &str,
        success: bool,
        response_s: Option<f64>,
        now: i64,
    ) {
        let db = Arc::clone(&self.db);
        let endpoint = endpoint.to_string();
        let task_id = task_id.to_string();
        let result = tokio::task::spawn_blocking(move || {
            let conn = db.lock().expect("db mutex poisoned");
            conn.execute(
                "INSERT INTO proxy_usage (endpoint, task_id, success, response_s, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![endpoint, task_id, success as i64, response_s, now],
            )
        })
        .await;
        if let Err(e) = result {
            tracing::warn!("usage-record join error: {e}");
        } else if let Err(e) = result.unwrap() {
            tracing::warn!("usage-record insert failed: {e}");
        }
    }

    /// Aggregate lease-outcome history for `/proxy/stats` (spec supplement,
    /// `original_source/storage/database.py`'s `proxy_usage` table).
    pub async fn usage_summary(&self) -> Result<UsageSummary, StoreError> {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let conn = db.lock().expect("db mutex poisoned");
            let total: i64 = conn.query_row("SELECT COUNT(*) FROM proxy_usage", [], |r| r.get(0))?;
            let successes: i64 = conn.query_row(
                "SELECT COUNT(*) FROM proxy_usage WHERE success = 1",
                [],
                |r| r.get(0),
            )?;
            let avg_response_s: Option<f64> = conn
                .query_row(
                    "SELECT AVG(response_s) FROM proxy_usage WHERE response_s IS NOT NULL",
                    [],
                    |r| r.get(0),
                )
                .unwrap_or(None);
            Ok(UsageSummary {
                total_recorded: total.max(0) as u64,
                successes: successes.max(0) as u64,
                avg_response_s,
            })
        })
        .await?
    }

    pub async fn count(&self) -> Result<u64, StoreError> {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let conn = db.lock().expect("db mutex poisoned");
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM proxies", [], |r| r.get(0))?;
            Ok(count.max(0) as u64)
        })
        .await?
    }
}

fn write_record(
    tx: &rusqlite::Transaction<'_>,
    record: &ProxyRecord,
    created_at: i64,
) -> rusqlite::Result<()> {
    let protocols = record
        .protocols
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(",");
    tx.execute(
        "INSERT OR REPLACE INTO proxies (
            endpoint, score, protocols, supports_cn, supports_intl, transparent,
            observed_egress_ip, city, region, country, coord_lat, coord_lon, org,
            postal, timezone, browser_valid, browser_checked_at, browser_latency_ms,
            dns_ok, tls_ok, clean_content, data_intact, behaviour_ok, security_checked_at,
            avg_latency_s, success_rate, last_checked, created_at, updated_at
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
            ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29
        )",
        params![
            record.endpoint,
            record.score,
            protocols,
            record.supports_cn as i64,
            record.supports_intl as i64,
            record.transparent as i64,
            record.observed_egress_ip,
            record.location.city,
            record.location.region,
            record.location.country,
            record.location.coord.map(|c| c.0),
            record.location.coord.map(|c| c.1),
            record.location.org,
            record.location.postal,
            record.location.timezone,
            record.browser.valid.map(|v| v as i64),
            record.browser.checked_at,
            record.browser.latency_ms.map(|v| v as i64),
            record.security.dns_ok.0,
            record.security.tls_ok.0,
            record.security.clean_content.0,
            record.security.data_intact.0,
            record.security.behaviour_ok.0,
            record.security.checked_at,
            record.performance.avg_latency_s,
            record.performance.success_rate,
            record.performance.last_checked,
            created_at,
            record.updated_at,
        ],
    )?;
    Ok(())
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<ProxyRecord> {
    let protocols_str: String = row.get("protocols")?;
    let protocols: BTreeSet<Protocol> = protocols_str
        .split(',')
        .filter(|s| !s.is_empty())
        .filter_map(|s| Protocol::from_str(s).ok())
        .collect();
    let coord_lat: Option<f64> = row.get("coord_lat")?;
    let coord_lon: Option<f64> = row.get("coord_lon")?;
    let browser_valid: Option<i64> = row.get("browser_valid")?;
    Ok(ProxyRecord {
        endpoint: row.get("endpoint")?,
        score: row.get("score")?,
        protocols,
        supports_cn: row.get::<_, i64>("supports_cn")? != 0,
        supports_intl: row.get::<_, i64>("supports_intl")? != 0,
        transparent: row.get::<_, i64>("transparent")? != 0,
        observed_egress_ip: row.get("observed_egress_ip")?,
        location: Location {
            city: row.get("city")?,
            region: row.get("region")?,
            country: row.get("country")?,
            coord: coord_lat.zip(coord_lon),
            org: row.get("org")?,
            postal: row.get("postal")?,
            timezone: row.get("timezone")?,
        },
        browser: BrowserProfile {
            valid: browser_valid.map(|v| v != 0),
            checked_at: row.get("browser_checked_at")?,
            latency_ms: row
                .get::<_, Option<i64>>("browser_latency_ms")?
                .map(|v| v as u64),
        },
        security: SecurityProfile {
            dns_ok: CheckVerdict(row.get("dns_ok")?),
            tls_ok: CheckVerdict(row.get("tls_ok")?),
            clean_content: CheckVerdict(row.get("clean_content")?),
            data_intact: CheckVerdict(row.get("data_intact")?),
            behaviour_ok: CheckVerdict(row.get("behaviour_ok")?),
            checked_at: row.get("security_checked_at")?,
        },
        performance: Performance {
            avg_latency_s: row.get("avg_latency_s")?,
            success_rate: row.get("success_rate")?,
            last_checked: row.get("last_checked")?,
        },
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProxyRecord;

    fn sample(endpoint: &str, score: i32, now: i64) -> ProxyRecord {
        let mut r = ProxyRecord::new_candidate(endpoint, now);
        r.score = score;
        r.protocols.insert(Protocol::Http);
        r
    }

    #[tokio::test]
    async fn upsert_then_load_round_trips() {
        let store = ProxyStore::open_in_memory().expect("store opens");
        let outcome = store
            .upsert(vec![sample("1.2.3.4:8080", 98, 1_000)])
            .await
            .expect("upsert ok");
        assert_eq!(outcome.inserted, 1);
        let loaded = store.load_all().await.expect("load ok");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].endpoint, "1.2.3.4:8080");
        assert_eq!(loaded[0].score, 98);
        assert!(loaded[0].protocols.contains(&Protocol::Http));
    }

    #[tokio::test]
    async fn upsert_skips_nonpositive_scores() {
        let store = ProxyStore::open_in_memory().expect("store opens");
        let outcome = store
            .upsert(vec![sample("1.2.3.4:8080", 0, 1_000)])
            .await
            .expect("upsert ok");
        assert_eq!(outcome.skipped_nonpositive, 1);
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn upsert_preserves_created_at_on_update() {
        let store = ProxyStore::open_in_memory().expect("store opens");
        store
            .upsert(vec![sample("1.2.3.4:8080", 98, 1_000)])
            .await
            .unwrap();
        let mut second = sample("1.2.3.4:8080", 99, 2_000);
        second.created_at = 2_000;
        store.upsert(vec![second]).await.unwrap();
        let loaded = store.get("1.2.3.4:8080").await.unwrap().unwrap();
        assert_eq!(loaded.created_at, 1_000, "created_at preserved across updates");
        assert_eq!(loaded.score, 99);
    }

    #[tokio::test]
    async fn purge_zero_cascades() {
        let store = ProxyStore::open_in_memory().expect("store opens");
        store
            .upsert(vec![sample("1.2.3.4:8080", 98, 1_000)])
            .await
            .unwrap();
        {
            let db = Arc::clone(&store.db);
            tokio::task::spawn_blocking(move || {
                let conn = db.lock().unwrap();
                conn.execute(
                    "UPDATE proxies SET score = 0 WHERE endpoint = '1.2.3.4:8080'",
                    [],
                )
                .unwrap();
            })
            .await
            .unwrap();
        }
        let deleted = store.purge_zero().await.unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn usage_summary_aggregates_recorded_outcomes() {
        let store = ProxyStore::open_in_memory().expect("store opens");
        store.record_usage("1.2.3.4:8080", "task-1", true, Some(0.2), 1_000).await;
        store.record_usage("1.2.3.4:8080", "task-2", false, Some(0.4), 1_001).await;
        let summary = store.usage_summary().await.unwrap();
        assert_eq!(summary.total_recorded, 2);
        assert_eq!(summary.successes, 1);
        assert_eq!(summary.avg_response_s, Some(0.3));
    }
}
