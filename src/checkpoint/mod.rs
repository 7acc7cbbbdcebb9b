//! The Checkpoint Manager (component D, spec §4.4): one file per batch
//! kind, rewritten in full on every completion so the on-disk remainder is
//! always authoritative.

use crate::config::InterruptConfig;
use crate::error::StoreError;
use crate::models::{CheckpointKind, CheckpointRecord};
use crate::storage::ProxyStore;
use std::collections::HashSet;
use std::path::PathBuf;
#[cfg(test)]
use std::path::Path;

pub struct CheckpointManager {
    dir: PathBuf,
}

/// What `startup()` found and, after filtering, recommends.
pub struct StartupOutcome {
    pub record: Option<CheckpointRecord>,
    pub dropped: Vec<String>,
}

impl CheckpointManager {
    pub fn new(config: &InterruptConfig) -> std::io::Result<Self> {
        let dir = PathBuf::from(&config.interrupt_dir);
        if !dir.exists() {
            std::fs::create_dir_all(&dir)?;
        }
        Ok(Self { dir })
    }

    fn path_for(&self, kind: CheckpointKind) -> PathBuf {
        self.dir.join(format!("{}.ckpt", kind.file_stem()))
    }

    /// Start of batch, not resuming: write the full candidate list.
    pub fn start(&self, kind: CheckpointKind, head: impl Into<String>, candidates: Vec<String>) -> std::io::Result<CheckpointRecord> {
        let record = CheckpointRecord::new(kind, head, candidates);
        self.write(&record)?;
        Ok(record)
    }

    /// During batch: rewrite the file with the still-unvisited subset. Full
    /// rewrite, never an append (spec §4.4).
    pub fn rewrite(&self, record: &CheckpointRecord) -> std::io::Result<()> {
        self.write(record)
    }

    fn write(&self, record: &CheckpointRecord) -> std::io::Result<()> {
        std::fs::write(self.path_for(record.kind), record.to_file_contents())
    }

    /// End of batch, clean: delete the file.
    pub fn finish(&self, kind: CheckpointKind) -> std::io::Result<()> {
        let path = self.path_for(kind);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    /// Startup: load the file for `kind` if present, filter its remainder
    /// against the live Store, and report what was dropped. Deletes the
    /// file outright if the filtered remainder is empty.
    pub async fn startup(&self, kind: CheckpointKind, store: &ProxyStore) -> Result<StartupOutcome, StoreError> {
        let path = self.path_for(kind);
        if !path.exists() {
            return Ok(StartupOutcome {
                record: None,
                dropped: Vec::new(),
            });
        }
        let contents = std::fs::read_to_string(&path).map_err(StoreError::Io)?;
        let mut record = match CheckpointRecord::parse(kind, &contents) {
            Ok(r) => r,
            Err(_) => {
                let _ = std::fs::remove_file(&path);
                return Ok(StartupOutcome {
                    record: None,
                    dropped: Vec::new(),
                });
            }
        };

        let live: HashSet<String> = store.load_all().await?.into_iter().map(|r| r.endpoint).collect();
        let refines_existing = kind.refines_existing();
        let mut dropped = Vec::new();
        let filtered: Vec<String> = record
            .remainder
            .drain(..)
            .filter(|endpoint| {
                let present = live.contains(endpoint);
                let keep = if refines_existing {
                    present
                } else {
                    true
                };
                if !keep {
                    dropped.push(endpoint.clone());
                }
                keep
            })
            .collect();
        record.remainder = filtered;

        if record.remainder.is_empty() {
            let _ = std::fs::remove_file(&path);
            return Ok(StartupOutcome {
                record: None,
                dropped,
            });
        }

        Ok(StartupOutcome {
            record: Some(record),
            dropped,
        })
    }

    #[cfg(test)]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ProxyStore;
    use tempfile::tempdir;

    fn config_for(dir: &Path) -> InterruptConfig {
        InterruptConfig {
            interrupt_dir: dir.to_string_lossy().to_string(),
            ..InterruptConfig::default()
        }
    }

    #[test]
    fn start_then_rewrite_then_finish_round_trips() {
        let tmp = tempdir().unwrap();
        let manager = CheckpointManager::new(&config_for(tmp.path())).unwrap();
        let record = manager
            .start(CheckpointKind::Crawl, "auto", vec!["1.1.1.1:80".into(), "2.2.2.2:80".into()])
            .unwrap();
        assert!(manager.path_for(CheckpointKind::Crawl).exists());

        let mut remaining = record;
        remaining.remainder.remove(0);
        manager.rewrite(&remaining).unwrap();
        let contents = std::fs::read_to_string(manager.path_for(CheckpointKind::Crawl)).unwrap();
        assert!(contents.contains("2.2.2.2:80"));
        assert!(!contents.contains("1.1.1.1:80"));

        manager.finish(CheckpointKind::Crawl).unwrap();
        assert!(!manager.path_for(CheckpointKind::Crawl).exists());
    }

    #[tokio::test]
    async fn startup_drops_endpoints_no_longer_in_store_for_refining_kinds() {
        let tmp = tempdir().unwrap();
        let manager = CheckpointManager::new(&config_for(tmp.path())).unwrap();
        manager
            .start(CheckpointKind::Security, "{}", vec!["1.1.1.1:80".into(), "2.2.2.2:80".into()])
            .unwrap();

        let store = ProxyStore::open_in_memory().unwrap();
        let mut record = crate::models::ProxyRecord::new_candidate("1.1.1.1:80", 0);
        record.score = 50;
        store.upsert(vec![record]).await.unwrap();

        let outcome = manager.startup(CheckpointKind::Security, &store).await.unwrap();
        let record = outcome.record.expect("some remainder left");
        assert_eq!(record.remainder, vec!["1.1.1.1:80".to_string()]);
        assert_eq!(outcome.dropped, vec!["2.2.2.2:80".to_string()]);
    }

    #[tokio::test]
    async fn startup_deletes_file_when_remainder_empty_after_filtering() {
        let tmp = tempdir().unwrap();
        let manager = CheckpointManager::new(&config_for(tmp.path())).unwrap();
        manager
            .start(CheckpointKind::Security, "{}", vec!["2.2.2.2:80".into()])
            .unwrap();

        let store = ProxyStore::open_in_memory().unwrap();
        let outcome = manager.startup(CheckpointKind::Security, &store).await.unwrap();
        assert!(outcome.record.is_none());
        assert!(!manager.path_for(CheckpointKind::Security).exists());
    }

    #[tokio::test]
    async fn startup_keeps_non_refining_remainder_even_if_absent_from_store() {
        let tmp = tempdir().unwrap();
        let manager = CheckpointManager::new(&config_for(tmp.path())).unwrap();
        manager
            .start(CheckpointKind::Crawl, "auto", vec!["9.9.9.9:80".into()])
            .unwrap();

        let store = ProxyStore::open_in_memory().unwrap();
        let outcome = manager.startup(CheckpointKind::Crawl, &store).await.unwrap();
        let record = outcome.record.expect("crawl candidates are not filtered by store presence");
        assert_eq!(record.remainder, vec!["9.9.9.9:80".to_string()]);
    }
}
