//! Collaborator interfaces
//!
//! The engine never talks to a database directly. These traits describe the
//! four things it needs from one: mapping metadata, an identifier sequence,
//! a ledger of already-ingested rows, and a place to write rows. The Postgres
//! adapter (`db`) and the in-memory adapter (`memory`) implement all four.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::value::Value;

/// Destination column holding the source file's short name. The ledger
/// counts rows by it.
pub const FILENAME_COLUMN: &str = "FILENAME";

/// One metadata row as stored. Every field may be null; the resolver applies
/// defaults and rejects what it cannot repair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataRow {
    pub section: Option<String>,
    pub attribute: Option<String>,
    pub position: Option<i64>,
    pub column: Option<String>,
    pub kind: Option<String>,
    pub datatype: Option<String>,
    pub date_format: Option<String>,
}

impl MetadataRow {
    /// Convenience constructor for a fully-populated row.
    pub fn new(
        section: &str,
        attribute: &str,
        position: i64,
        column: &str,
        kind: &str,
        datatype: &str,
    ) -> Self {
        Self {
            section: Some(section.to_string()),
            attribute: Some(attribute.to_string()),
            position: Some(position),
            column: Some(column.to_string()),
            kind: Some(kind.to_string()),
            datatype: Some(datatype.to_string()),
            date_format: None,
        }
    }

    pub fn with_date_format(mut self, format: &str) -> Self {
        self.date_format = Some(format.to_string());
        self
    }
}

/// Read side of the mapping metadata.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// All mapping rows for a catalog type, in any order.
    async fn mapping_rows(&self, catalog_type: &str) -> Result<Vec<MetadataRow>, StoreError>;

    /// Destination table registered for a catalog type.
    async fn destination_table(&self, catalog_type: &str) -> Result<Option<String>, StoreError>;
}

/// Source of fresh surrogate identifiers.
#[async_trait]
pub trait IdentifierSequence: Send + Sync {
    /// Issue `count` previously unused identifiers.
    async fn next_block(&self, count: usize) -> Result<Vec<i64>, StoreError>;
}

/// How the ledger counts what a file already contributed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CountMode {
    /// Plain row count
    Rows,
    /// Distinct values of an identifier column (one group per object)
    DistinctGroups { column: String },
}

/// Count oracle over destination tables.
#[async_trait]
pub trait LedgerOracle: Send + Sync {
    /// Rows (or identifier groups) already stored for `file` in `table`.
    async fn ingested_count(&self, table: &str, file: &str, mode: &CountMode) -> Result<u64, StoreError>;

    /// `(natural key, identifier)` pairs already stored for `file`, used to
    /// rebuild the identifier map when the assigning file is skipped.
    async fn existing_identifiers(
        &self,
        table: &str,
        file: &str,
        key_column: &str,
        id_column: &str,
    ) -> Result<Vec<(i64, i64)>, StoreError>;
}

/// Bulk row writer.
#[async_trait]
pub trait RowSink: Send + Sync {
    /// Insert `rows` (each laid out as `columns`) into `table`, all or
    /// nothing. Returns the number of rows written.
    async fn emit(&self, table: &str, columns: &[String], rows: &[Vec<Value>]) -> Result<u64, StoreError>;
}

/// Everything the orchestrator needs from a backend.
pub trait CatalogStore: MetadataStore + IdentifierSequence + LedgerOracle + RowSink {}

impl<T: MetadataStore + IdentifierSequence + LedgerOracle + RowSink> CatalogStore for T {}
