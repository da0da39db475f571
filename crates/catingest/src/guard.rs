//! Reingestion guard
//!
//! Before a file is read, the ledger is asked how many rows (or identifier
//! groups) it already contributed to its destination table. Zero means go
//! ahead, a matching count means the file is done and can be skipped, and
//! anything else needs an operator.

use catingest_common::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::store::{CountMode, LedgerOracle};

/// Whether the ledger is consulted at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardMode {
    /// Query the ledger and act on the result.
    #[default]
    Enforce,
    /// Skip the query and treat every file as not loaded.
    AssumeNotLoaded,
}

impl FromStr for GuardMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "enforce" => Ok(GuardMode::Enforce),
            "assume_not_loaded" | "off" => Ok(GuardMode::AssumeNotLoaded),
            other => Err(format!(
                "unknown guard mode '{}', expected 'enforce' or 'assume_not_loaded'",
                other
            )),
        }
    }
}

impl fmt::Display for GuardMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardMode::Enforce => f.write_str("enforce"),
            GuardMode::AssumeNotLoaded => f.write_str("assume_not_loaded"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LoadState {
    NotLoaded,
    LoadedMatching { rows: u64 },
    LoadedMismatched { existing: u64, expected: u64 },
}

impl LoadState {
    /// Classify an existing count against the file's own record count.
    pub fn classify(existing: u64, expected: u64) -> Self {
        if existing == 0 {
            LoadState::NotLoaded
        } else if existing == expected {
            LoadState::LoadedMatching { rows: existing }
        } else {
            LoadState::LoadedMismatched { existing, expected }
        }
    }
}

/// What the ledger needs to know to identify a file's rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileIdentity<'a> {
    pub table: &'a str,
    pub short_name: &'a str,
    pub count_mode: &'a CountMode,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReingestionGuard {
    policy: RetryPolicy,
    mode: GuardMode,
}

impl ReingestionGuard {
    pub fn new(policy: RetryPolicy, mode: GuardMode) -> Self {
        Self { policy, mode }
    }

    pub fn mode(&self) -> GuardMode {
        self.mode
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Compare what the ledger holds for `file` with `expected` records.
    ///
    /// Transient ledger failures are retried per the policy; the last error
    /// is returned once attempts run out.
    pub async fn check_loaded<L>(
        &self,
        ledger: &L,
        file: &FileIdentity<'_>,
        expected: u64,
    ) -> Result<LoadState, StoreError>
    where
        L: LedgerOracle + ?Sized,
    {
        if self.mode == GuardMode::AssumeNotLoaded {
            warn!(file = file.short_name, table = file.table, "Reingestion check disabled, assuming not loaded");
            return Ok(LoadState::NotLoaded);
        }

        let existing = self
            .policy
            .run("ingested_count", StoreError::is_transient, || {
                ledger.ingested_count(file.table, file.short_name, file.count_mode)
            })
            .await?;

        let state = LoadState::classify(existing, expected);
        debug!(
            file = file.short_name,
            table = file.table,
            existing,
            expected,
            state = ?state,
            "Reingestion check"
        );
        Ok(state)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::memory::{MemoryDatabase, StoredRow};
    use crate::store::FILENAME_COLUMN;
    use crate::value::Value;
    use std::time::Duration;

    fn stored(file: &str, n: usize) -> Vec<StoredRow> {
        (0..n)
            .map(|i| {
                StoredRow::from([
                    (FILENAME_COLUMN.to_string(), Value::from(file)),
                    ("COADD_OBJECT_ID".to_string(), Value::Int(i as i64)),
                ])
            })
            .collect()
    }

    fn identity<'a>(mode: &'a CountMode) -> FileIdentity<'a> {
        FileIdentity {
            table: "coadd_object",
            short_name: "tile_det.csv",
            count_mode: mode,
        }
    }

    #[test]
    fn test_classify() {
        assert_eq!(LoadState::classify(0, 100), LoadState::NotLoaded);
        assert_eq!(LoadState::classify(100, 100), LoadState::LoadedMatching { rows: 100 });
        assert_eq!(
            LoadState::classify(50, 100),
            LoadState::LoadedMismatched { existing: 50, expected: 100 }
        );
    }

    #[tokio::test]
    async fn test_mismatch_is_reported() {
        let db = MemoryDatabase::new();
        db.insert_rows("coadd_object", stored("tile_det.csv", 50));

        let guard = ReingestionGuard::new(RetryPolicy::none(), GuardMode::Enforce);
        let state = guard.check_loaded(&db, &identity(&CountMode::Rows), 100).await.unwrap();
        assert_eq!(state, LoadState::LoadedMismatched { existing: 50, expected: 100 });
    }

    #[tokio::test]
    async fn test_idempotent_after_ingest() {
        let db = MemoryDatabase::new();
        let guard = ReingestionGuard::default();
        let mode = CountMode::Rows;

        assert_eq!(guard.check_loaded(&db, &identity(&mode), 3).await.unwrap(), LoadState::NotLoaded);
        db.insert_rows("coadd_object", stored("tile_det.csv", 3));
        assert_eq!(
            guard.check_loaded(&db, &identity(&mode), 3).await.unwrap(),
            LoadState::LoadedMatching { rows: 3 }
        );
    }

    #[tokio::test]
    async fn test_distinct_groups() {
        let db = MemoryDatabase::new();
        let mut rows = stored("tile_det.csv", 2);
        rows.extend(stored("tile_det.csv", 2));
        db.insert_rows("coadd_object", rows);

        let mode = CountMode::DistinctGroups {
            column: "COADD_OBJECT_ID".into(),
        };
        let guard = ReingestionGuard::default();
        assert_eq!(
            guard.check_loaded(&db, &identity(&mode), 2).await.unwrap(),
            LoadState::LoadedMatching { rows: 2 }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried() {
        let db = MemoryDatabase::new();
        db.fail_ledger_times(2);
        let guard = ReingestionGuard::new(RetryPolicy::new(5, Duration::from_secs(10)), GuardMode::Enforce);
        let started = tokio::time::Instant::now();

        let state = guard.check_loaded(&db, &identity(&CountMode::Rows), 10).await.unwrap();
        assert_eq!(state, LoadState::NotLoaded);
        assert_eq!(db.ledger_calls(), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhausted() {
        let db = MemoryDatabase::new();
        db.fail_ledger_times(10);
        let guard = ReingestionGuard::new(RetryPolicy::new(3, Duration::from_secs(1)), GuardMode::Enforce);

        let err = guard.check_loaded(&db, &identity(&CountMode::Rows), 10).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(db.ledger_calls(), 3);
    }

    #[tokio::test]
    async fn test_assume_not_loaded_skips_ledger() {
        let db = MemoryDatabase::new();
        db.insert_rows("coadd_object", stored("tile_det.csv", 50));
        let guard = ReingestionGuard::new(RetryPolicy::none(), GuardMode::AssumeNotLoaded);

        let state = guard.check_loaded(&db, &identity(&CountMode::Rows), 100).await.unwrap();
        assert_eq!(state, LoadState::NotLoaded);
        assert_eq!(db.ledger_calls(), 0);
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("enforce".parse::<GuardMode>().unwrap(), GuardMode::Enforce);
        assert_eq!("assume-not-loaded".parse::<GuardMode>().unwrap(), GuardMode::AssumeNotLoaded);
        assert!("sometimes".parse::<GuardMode>().is_err());
    }
}
