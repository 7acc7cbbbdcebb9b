//! The Batch Runner (component C, spec §4.3): runs a set of probes over a
//! candidate list with a bounded concurrency budget, emitting incremental
//! results and honouring cancellation. Concurrency is bounded with a
//! `tokio::sync::Semaphore`, the same primitive `verifier.rs`'s
//! `verify_pool_with_limit` uses for its probe pool.

use crate::checkpoint::CheckpointManager;
use crate::config::Config;
use crate::models::{CheckpointKind, CheckpointRecord, ProbeSelection, ProxyRecord};
use crate::prober::{self, ProbeContext};
use crate::scoring;
use crate::signal::SignalBus;
use crate::storage::ProxyStore;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;

pub struct BatchRunner<'a> {
    pub store: &'a ProxyStore,
    pub checkpoints: &'a CheckpointManager,
    pub signal: &'a SignalBus,
    pub config: &'a Config,
}

pub struct BatchOutcome {
    pub results: HashMap<String, ProxyRecord>,
    pub cancelled: bool,
}

impl<'a> BatchRunner<'a> {
    /// Run `selection` against every candidate in `candidates`, with at most
    /// `ctx.config.main.max_workers` probes in flight at once. Every
    /// completion triggers scoring, an incremental upsert, and a checkpoint
    /// rewrite (spec §4.3 step 3) before the next candidate is considered.
    pub async fn run(
        &self,
        kind: CheckpointKind,
        checkpoint_head: String,
        mut candidates: Vec<String>,
        selection: ProbeSelection,
        browser: &dyn prober::BrowserRenderer,
        now: i64,
    ) -> BatchOutcome {
        let mut checkpoint = CheckpointRecord::new(kind, checkpoint_head, candidates.clone());
        let _ = self.checkpoints.rewrite(&checkpoint);

        let max_workers = self.config.main.max_workers.max(1);
        let semaphore = Arc::new(Semaphore::new(max_workers));
        let mut in_flight = FuturesUnordered::new();
        let mut results = HashMap::new();
        let mut cancelled = false;

        loop {
            while !candidates.is_empty() && in_flight.len() < max_workers {
                if self.signal.is_tripped() {
                    cancelled = true;
                    break;
                }
                let endpoint = candidates.remove(0);
                let permit = Arc::clone(&semaphore).acquire_owned().await.expect("semaphore open");
                let ctx = ProbeContext {
                    config: &self.config.main,
                    own_ip: self.config.main.own_ip.as_deref().unwrap_or(""),
                    browser,
                };
                in_flight.push(async move {
                    let bundle = prober::run(&selection, &endpoint, &ctx).await;
                    drop(permit);
                    (endpoint, bundle)
                });
            }

            if cancelled && in_flight.is_empty() {
                break;
            }
            if candidates.is_empty() && in_flight.is_empty() {
                break;
            }

            match in_flight.next().await {
                Some((endpoint, bundle)) => {
                    let existing = self.store.get(&endpoint).await.ok().flatten();
                    let new_record = scoring::apply(
                        existing.as_ref(),
                        &endpoint,
                        &bundle,
                        self.config.main.max_score,
                        now,
                    );
                    let _ = self.store.upsert(vec![new_record.clone()]).await;
                    results.insert(endpoint.clone(), new_record);

                    checkpoint.remainder.retain(|e| e != &endpoint);
                    let _ = self.checkpoints.rewrite(&checkpoint);

                    if self.signal.is_tripped() {
                        cancelled = true;
                    }
                }
                None => {
                    if candidates.is_empty() {
                        break;
                    }
                }
            }
        }

        if cancelled {
            tracing::warn!(kind = %kind, "batch cancelled with {} candidates still unvisited", checkpoint.remainder.len());
        } else {
            let _ = self.checkpoints.finish(kind);
        }

        BatchOutcome { results, cancelled }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InterruptConfig;
    use crate::models::ProtocolHint;
    use crate::prober::browser::UnconfiguredRenderer;
    use tempfile::tempdir;

    #[tokio::test]
    async fn cancellation_before_submission_stops_new_work() {
        let tmp = tempdir().unwrap();
        let mut config = Config::default();
        config.interrupt = InterruptConfig {
            interrupt_dir: tmp.path().to_string_lossy().to_string(),
            ..InterruptConfig::default()
        };
        config.main.max_workers = 2;
        let store = ProxyStore::open_in_memory().unwrap();
        let checkpoints = CheckpointManager::new(&config.interrupt).unwrap();
        let signal = SignalBus::new();
        signal.trip();

        let runner = BatchRunner {
            store: &store,
            checkpoints: &checkpoints,
            signal: &signal,
            config: &config,
        };

        let outcome = runner
            .run(
                CheckpointKind::Crawl,
                "auto".to_string(),
                vec!["1.1.1.1:80".to_string(), "2.2.2.2:80".to_string()],
                ProbeSelection::validation_default(ProtocolHint::Http),
                &UnconfiguredRenderer,
                1_000,
            )
            .await;

        assert!(outcome.cancelled);
        assert!(outcome.results.is_empty());
    }

    #[tokio::test]
    async fn completed_candidates_are_scored_and_upserted() {
        let tmp = tempdir().unwrap();
        let mut config = Config::default();
        config.interrupt = InterruptConfig {
            interrupt_dir: tmp.path().to_string_lossy().to_string(),
            ..InterruptConfig::default()
        };
        config.main.max_workers = 4;
        config.main.test_url_cn = vec!["http://127.0.0.1:1/never".to_string()];
        config.main.test_url_intl = vec!["http://127.0.0.1:1/never".to_string()];
        config.main.timeout_cn = 0.2;
        config.main.timeout_intl = 0.2;
        let store = ProxyStore::open_in_memory().unwrap();
        let checkpoints = CheckpointManager::new(&config.interrupt).unwrap();
        let signal = SignalBus::new();

        let runner = BatchRunner {
            store: &store,
            checkpoints: &checkpoints,
            signal: &signal,
            config: &config,
        };

        let outcome = runner
            .run(
                CheckpointKind::Crawl,
                "auto".to_string(),
                vec!["127.0.0.1:1".to_string()],
                ProbeSelection::validation_default(ProtocolHint::Http),
                &UnconfiguredRenderer,
                1_000,
            )
            .await;

        assert!(!outcome.cancelled);
        assert_eq!(outcome.results.len(), 1);
        assert!(!checkpoints.dir().join("crawl.ckpt").exists());
    }
}
