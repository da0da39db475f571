//! Error types for catalog ingestion
//!
//! Each collaborator has its own enum; `IngestError` is what a single file
//! ingest fails with, and `FileFailure` is the flattened report handed back to
//! the caller.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::mapping::Datatype;

/// Failure talking to the metadata store, sequence, ledger or sink backend.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// Connectivity problem worth retrying
    #[error("transient store failure: {0}")]
    Transient(String),

    /// The query ran and failed; retrying will not help
    #[error("store query failed: {0}")]
    Query(String),

    /// Refused before reaching the backend (bad identifier, bad argument)
    #[error("invalid store request: {0}")]
    Invalid(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StoreError::Transient(err.to_string()),
            other => StoreError::Query(other.to_string()),
        }
    }
}

/// The mapping metadata for a catalog type is unusable.
#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("no mapping rows for catalog type '{catalog_type}'")]
    NoRows { catalog_type: String },

    #[error("no destination table registered for catalog type '{catalog_type}'")]
    MissingDestinationTable { catalog_type: String },

    #[error("catalog type '{catalog_type}': null section for attribute '{attribute}'")]
    MissingSection { catalog_type: String, attribute: String },

    #[error("catalog type '{catalog_type}': null column name for attribute '{attribute}'")]
    MissingColumnName { catalog_type: String, attribute: String },

    #[error("catalog type '{catalog_type}': column '{column}' claimed by both '{first}' and '{second}'")]
    DuplicateColumn {
        catalog_type: String,
        column: String,
        first: String,
        second: String,
    },

    #[error("attribute '{attribute}' repeats position {position}")]
    DuplicatePosition { attribute: String, position: usize },

    #[error("attribute '{attribute}' has {columns} column(s) but {positions} position(s)")]
    PositionMismatch {
        attribute: String,
        columns: usize,
        positions: usize,
    },

    #[error("catalog type '{catalog_type}': negative position {position} for attribute '{attribute}'")]
    NegativePosition {
        catalog_type: String,
        attribute: String,
        position: i64,
    },

    #[error("catalog type '{catalog_type}': unknown value kind '{kind}' for attribute '{attribute}'")]
    UnknownValueKind {
        catalog_type: String,
        attribute: String,
        kind: String,
    },

    #[error("catalog type '{catalog_type}': unknown datatype '{datatype}' for attribute '{attribute}'")]
    UnknownDatatype {
        catalog_type: String,
        attribute: String,
        datatype: String,
    },

    #[error("catalog type '{catalog_type}': no derivation registered for column '{column}'")]
    UnknownDerivation { catalog_type: String, column: String },

    #[error("catalog type '{catalog_type}': array attribute '{attribute}' mixes value kinds or datatypes")]
    InconsistentArray { catalog_type: String, attribute: String },

    #[error("catalog type '{catalog_type}': attribute '{attribute}' spans several file columns in a positional file")]
    PositionalArray { catalog_type: String, attribute: String },

    #[error("catalog type '{catalog_type}': data section '{section}' has no mapping entries")]
    MissingDataSection { catalog_type: String, section: String },

    #[error("invalid attribute pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Reading a catalog file failed.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("XML error in {path}: {message}")]
    Xml { path: String, message: String },

    #[error("{path}: no section '{section}'")]
    UnknownSection { path: String, section: String },

    #[error("{path}: no column '{column}' in section '{section}'")]
    UnknownColumn {
        path: String,
        section: String,
        column: String,
    },

    #[error("{path}: rows {start}..{end} out of range (file has {total})")]
    RowRange {
        path: String,
        start: usize,
        end: usize,
        total: usize,
    },

    #[error("{path}: malformed content: {message}")]
    Malformed { path: String, message: String },

    #[error("{path}: unsupported catalog format")]
    Unsupported { path: String },
}

/// Errors from the identifier coordinator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentifierError {
    #[error("natural key {key} has no assigned identifier")]
    Unresolved { key: i64 },

    #[error("identifier block exhausted after {reserved} assignment(s)")]
    Exhausted { reserved: usize },

    #[error("identifier assignment is closed for this run")]
    AssignmentClosed,

    #[error("requested {requested} identifier(s) but sequence returned {received}")]
    BlockSize { requested: usize, received: usize },

    #[error("identifier {id} returned by sequence is already in use")]
    DuplicateIdentifier { id: i64 },

    #[error("natural key field '{field}' holds a non-integer value '{value}'")]
    InvalidKey { field: String, value: String },

    #[error("identifier sequence failed: {0}")]
    Sequence(String),
}

/// Errors raised while projecting one source record.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProjectionError {
    #[error("missing source field '{field}'")]
    MissingField { field: String },

    #[error("field '{field}': expected {expected} value(s), received {received}")]
    ValueCount {
        field: String,
        expected: usize,
        received: usize,
    },

    #[error("column '{column}': cannot coerce '{value}' to {datatype}")]
    Coercion {
        column: String,
        datatype: Datatype,
        value: String,
    },

    #[error("column '{column}': derivation failed: {reason}")]
    Derivation { column: String, reason: String },

    #[error("no constant supplied for column '{column}'")]
    MissingConstant { column: String },

    #[error(transparent)]
    Identifier(#[from] IdentifierError),
}

impl ProjectionError {
    pub fn natural_key(&self) -> Option<i64> {
        match self {
            ProjectionError::Identifier(IdentifierError::Unresolved { key }) => Some(*key),
            _ => None,
        }
    }
}

/// Row emission failed.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("row {row} has {received} column(s), batch layout has {expected}")]
    ColumnMismatch {
        row: usize,
        expected: usize,
        received: usize,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Phase of a file ingest, used when reporting failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Resolve,
    Guard,
    Read,
    Project,
    Emit,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Resolve => "resolve",
            Phase::Guard => "guard",
            Phase::Read => "read",
            Phase::Project => "project",
            Phase::Emit => "emit",
        };
        f.write_str(name)
    }
}

/// Why one file's ingest stopped.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error("reingestion count query failed: {0}")]
    Guard(StoreError),

    #[error("already ingested with a different row count: catalog={expected}, database={existing}")]
    LoadedMismatched { existing: u64, expected: u64 },

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("record {record_index}: {source}")]
    Projection {
        record_index: usize,
        #[source]
        source: ProjectionError,
    },

    #[error("header projection failed: {0}")]
    Header(#[source] ProjectionError),

    #[error(transparent)]
    Identifier(#[from] IdentifierError),

    #[error("batch starting at record {first_record}: {source}")]
    Emission {
        first_record: usize,
        #[source]
        source: SinkError,
    },

    #[error("cancelled")]
    Cancelled,
}

impl IngestError {
    pub fn phase(&self) -> Phase {
        match self {
            IngestError::Metadata(_) => Phase::Resolve,
            IngestError::Guard(_) | IngestError::LoadedMismatched { .. } => Phase::Guard,
            IngestError::Source(_) => Phase::Read,
            IngestError::Projection { .. } | IngestError::Header(_) | IngestError::Identifier(_) => {
                Phase::Project
            },
            IngestError::Emission { .. } => Phase::Emit,
            // the orchestrator reports the phase it was in instead
            IngestError::Cancelled => Phase::Read,
        }
    }

    pub fn record_index(&self) -> Option<usize> {
        match self {
            IngestError::Projection { record_index, .. } => Some(*record_index),
            IngestError::Emission { first_record, .. } => Some(*first_record),
            _ => None,
        }
    }

    pub fn natural_key(&self) -> Option<i64> {
        match self {
            IngestError::Projection { source, .. } => source.natural_key(),
            IngestError::Identifier(IdentifierError::Unresolved { key }) => Some(*key),
            _ => None,
        }
    }
}

/// Report for a failed file: which file, which phase, and where.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileFailure {
    pub file: String,
    pub phase: Phase,
    pub record_index: Option<usize>,
    pub natural_key: Option<i64>,
    pub message: String,
}

impl FileFailure {
    pub fn new(file: impl Into<String>, phase: Phase, error: &IngestError) -> Self {
        Self {
            file: file.into(),
            phase,
            record_index: error.record_index(),
            natural_key: error.natural_key(),
            message: error.to_string(),
        }
    }
}

impl fmt::Display for FileFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.file, self.phase)?;
        if let Some(index) = self.record_index {
            write!(f, " record {}", index)?;
        }
        if let Some(key) = self.natural_key {
            write!(f, " key {}", key)?;
        }
        write!(f, ": {}", self.message)
    }
}
