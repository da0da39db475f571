//! In-memory backend
//!
//! Implements every store trait against process memory. Backs `--dry-run`
//! and the test-suite; can inject transient ledger failures and a failing
//! batch emission.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::StoreError;
use crate::store::{
    CountMode, IdentifierSequence, LedgerOracle, MetadataRow, MetadataStore, RowSink, FILENAME_COLUMN,
};
use crate::value::Value;

/// A stored row, keyed by upper-cased column name.
pub type StoredRow = BTreeMap<String, Value>;

#[derive(Debug)]
struct Inner {
    mappings: HashMap<String, Vec<MetadataRow>>,
    destinations: HashMap<String, String>,
    next_id: i64,
    tables: HashMap<String, Vec<StoredRow>>,
    ledger_failures: u32,
    ledger_calls: u32,
    emit_calls: usize,
    fail_emit_call: Option<usize>,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            mappings: HashMap::new(),
            destinations: HashMap::new(),
            next_id: 1,
            tables: HashMap::new(),
            ledger_failures: 0,
            ledger_calls: 0,
            emit_calls: 0,
            fail_emit_call: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryDatabase {
    inner: Mutex<Inner>,
}

fn table_key(table: &str) -> String {
    table.trim().to_lowercase()
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register the mapping rows and destination table for a catalog type.
    pub fn with_mapping(self, catalog_type: &str, destination: &str, rows: Vec<MetadataRow>) -> Self {
        {
            let mut inner = self.lock();
            inner.mappings.insert(catalog_type.to_string(), rows);
            inner
                .destinations
                .insert(catalog_type.to_string(), destination.to_string());
        }
        self
    }

    /// First identifier the sequence will issue.
    pub fn with_sequence_start(self, start: i64) -> Self {
        self.lock().next_id = start;
        self
    }

    /// Make the next `times` ledger queries fail with a transient error.
    pub fn fail_ledger_times(&self, times: u32) {
        self.lock().ledger_failures = times;
    }

    /// Make the `call`-th emission (1-based, counted from now) fail.
    pub fn fail_emit_call(&self, call: usize) {
        let mut inner = self.lock();
        inner.fail_emit_call = Some(inner.emit_calls + call);
    }

    /// Store rows directly, bypassing the sink.
    pub fn insert_rows(&self, table: &str, rows: Vec<StoredRow>) {
        self.lock().tables.entry(table_key(table)).or_default().extend(rows);
    }

    pub fn rows(&self, table: &str) -> Vec<StoredRow> {
        self.lock().tables.get(&table_key(table)).cloned().unwrap_or_default()
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.lock().tables.get(&table_key(table)).map_or(0, Vec::len)
    }

    pub fn ledger_calls(&self) -> u32 {
        self.lock().ledger_calls
    }

    pub fn emit_calls(&self) -> usize {
        self.lock().emit_calls
    }
}

fn rows_for_file<'a>(rows: &'a [StoredRow], file: &'a str) -> impl Iterator<Item = &'a StoredRow> {
    rows.iter()
        .filter(move |r| matches!(r.get(FILENAME_COLUMN), Some(Value::Text(f)) if f == file))
}

#[async_trait]
impl MetadataStore for MemoryDatabase {
    async fn mapping_rows(&self, catalog_type: &str) -> Result<Vec<MetadataRow>, StoreError> {
        Ok(self.lock().mappings.get(catalog_type).cloned().unwrap_or_default())
    }

    async fn destination_table(&self, catalog_type: &str) -> Result<Option<String>, StoreError> {
        Ok(self.lock().destinations.get(catalog_type).cloned())
    }
}

#[async_trait]
impl IdentifierSequence for MemoryDatabase {
    async fn next_block(&self, count: usize) -> Result<Vec<i64>, StoreError> {
        let mut inner = self.lock();
        let start = inner.next_id;
        let count = i64::try_from(count).map_err(|_| StoreError::Invalid(format!("block of {count}")))?;
        inner.next_id += count;
        Ok((start..start + count).collect())
    }
}

#[async_trait]
impl LedgerOracle for MemoryDatabase {
    async fn ingested_count(&self, table: &str, file: &str, mode: &CountMode) -> Result<u64, StoreError> {
        let mut inner = self.lock();
        inner.ledger_calls += 1;
        if inner.ledger_failures > 0 {
            inner.ledger_failures -= 1;
            return Err(StoreError::Transient("connection reset by peer".to_string()));
        }

        let Some(rows) = inner.tables.get(&table_key(table)) else {
            return Ok(0);
        };
        let count = match mode {
            CountMode::Rows => rows_for_file(rows, file).count(),
            CountMode::DistinctGroups { column } => {
                let column = column.to_uppercase();
                rows_for_file(rows, file)
                    .filter_map(|r| r.get(&column).and_then(Value::as_i64))
                    .collect::<HashSet<_>>()
                    .len()
            },
        };
        Ok(count as u64)
    }

    async fn existing_identifiers(
        &self,
        table: &str,
        file: &str,
        key_column: &str,
        id_column: &str,
    ) -> Result<Vec<(i64, i64)>, StoreError> {
        let inner = self.lock();
        let Some(rows) = inner.tables.get(&table_key(table)) else {
            return Ok(Vec::new());
        };
        let (key_column, id_column) = (key_column.to_uppercase(), id_column.to_uppercase());
        Ok(rows_for_file(rows, file)
            .filter_map(|r| {
                let key = r.get(&key_column)?.as_i64()?;
                let id = r.get(&id_column)?.as_i64()?;
                Some((key, id))
            })
            .collect())
    }
}

#[async_trait]
impl RowSink for MemoryDatabase {
    async fn emit(&self, table: &str, columns: &[String], rows: &[Vec<Value>]) -> Result<u64, StoreError> {
        let mut inner = self.lock();
        inner.emit_calls += 1;
        if inner.fail_emit_call == Some(inner.emit_calls) {
            return Err(StoreError::Query(format!("insert into {} rejected", table)));
        }
        if let Some(bad) = rows.iter().position(|r| r.len() != columns.len()) {
            return Err(StoreError::Invalid(format!(
                "row {} has {} values for {} columns",
                bad,
                rows[bad].len(),
                columns.len()
            )));
        }

        let stored = rows.iter().map(|values| {
            columns
                .iter()
                .map(|c| c.to_uppercase())
                .zip(values.iter().cloned())
                .collect::<StoredRow>()
        });
        inner.tables.entry(table_key(table)).or_default().extend(stored);
        Ok(rows.len() as u64)
    }
}
