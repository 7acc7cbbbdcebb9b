//! The Checkpoint Record: on-disk remainder of an in-progress probe batch
//! (spec §3, §4.4, §6).

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointKind {
    Crawl,
    Load,
    Existing,
    Browser,
    Security,
}

impl CheckpointKind {
    pub fn file_stem(&self) -> &'static str {
        match self {
            CheckpointKind::Crawl => "crawl",
            CheckpointKind::Load => "load",
            CheckpointKind::Existing => "existing",
            CheckpointKind::Browser => "browser",
            CheckpointKind::Security => "security",
        }
    }

    /// `browser`/`security` refine existing store records, so their
    /// remainder is also dropped when a listed endpoint's score has fallen
    /// to zero (spec §4.4 "Startup").
    pub fn refines_existing(&self) -> bool {
        matches!(self, CheckpointKind::Browser | CheckpointKind::Security)
    }
}

impl fmt::Display for CheckpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_stem())
    }
}

/// One file per batch kind: a header line `<kind_or_config>,<original_count>`
/// followed by one remaining endpoint per line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub kind: CheckpointKind,
    /// A protocol hint (`http`, `socks5`, `auto`, `already_have`) for
    /// `crawl`/`load`/`existing`, or a serialized filter-criteria JSON
    /// object for `browser`/`security`.
    pub head: String,
    pub original_count: usize,
    pub remainder: Vec<String>,
}

impl CheckpointRecord {
    pub fn new(kind: CheckpointKind, head: impl Into<String>, candidates: Vec<String>) -> Self {
        Self {
            kind,
            head: head.into(),
            original_count: candidates.len(),
            remainder: candidates,
        }
    }

    pub fn to_file_contents(&self) -> String {
        let mut out = format!("{},{}\n", self.head, self.original_count);
        for endpoint in &self.remainder {
            out.push_str(endpoint);
            out.push('\n');
        }
        out
    }

    pub fn parse(kind: CheckpointKind, contents: &str) -> Result<Self, String> {
        let mut lines = contents.lines();
        let header = lines
            .next()
            .ok_or_else(|| "checkpoint file is empty".to_string())?;
        let (head, count_str) = header
            .rsplit_once(',')
            .ok_or_else(|| format!("malformed checkpoint header: {header}"))?;
        let original_count: usize = count_str
            .trim()
            .parse()
            .map_err(|_| format!("malformed checkpoint count: {count_str}"))?;
        let remainder = lines
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        Ok(Self {
            kind,
            head: head.to_string(),
            original_count,
            remainder,
        })
    }
}
