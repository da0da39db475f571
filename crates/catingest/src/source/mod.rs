//! Catalog file readers
//!
//! A [`CatalogSource`] gives record counts without a full read, column
//! names, ranged reads of selected columns, and header key/value pairs.
//! [`ChunkedReader`] walks the data section in fixed-size batches so memory
//! stays bounded whatever the file size.

mod csv_table;
mod memory;
mod votable;

pub use self::csv_table::CsvCatalog;
pub use self::memory::{MemoryCatalog, MemoryOpener};
pub use self::votable::VoTableCatalog;

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

use crate::error::SourceError;
use crate::mapping::Section;
use crate::value::Value;

/// Named access to values, case-insensitive.
pub trait FieldLookup {
    fn field(&self, name: &str) -> Option<&Value>;
}

/// Case-insensitive column positions shared by every record of a batch.
#[derive(Debug, Clone, Default)]
pub struct ColumnIndex {
    names: Vec<String>,
    lookup: HashMap<String, usize>,
}

impl ColumnIndex {
    pub fn new(names: Vec<String>) -> Self {
        let lookup = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.trim().to_uppercase(), i))
            .collect();
        Self { names, lookup }
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.lookup.get(&name.trim().to_uppercase()).copied()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// One source row. Dropped as soon as it has been projected.
#[derive(Debug, Clone)]
pub struct SourceRecord {
    columns: Arc<ColumnIndex>,
    values: Vec<Value>,
}

impl SourceRecord {
    pub fn new(columns: Arc<ColumnIndex>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

impl FieldLookup for SourceRecord {
    fn field(&self, name: &str) -> Option<&Value> {
        self.columns.position(name).and_then(|i| self.values.get(i))
    }
}

/// Header keyword/value pairs of one section, keys upper-cased.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Header(BTreeMap<String, Value>);

impl Header {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, value: Value) {
        self.0.insert(key.trim().to_uppercase(), value);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl FieldLookup for Header {
    fn field(&self, name: &str) -> Option<&Value> {
        self.0.get(&name.trim().to_uppercase())
    }
}

impl<K: AsRef<str>, V: Into<Value>> FromIterator<(K, V)> for Header {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut header = Header::new();
        for (k, v) in iter {
            header.insert(k.as_ref(), v.into());
        }
        header
    }
}

/// An open catalog file. Owned by one file ingest at a time.
#[async_trait]
pub trait CatalogSource: Send {
    /// Path the source was opened from, for error reports.
    fn path(&self) -> &str;

    /// Number of records in `section`, without reading them all.
    async fn record_count(&mut self, section: &Section) -> Result<usize, SourceError>;

    /// Column names of `section`, in file order.
    async fn column_names(&mut self, section: &Section) -> Result<Vec<String>, SourceError>;

    /// Records `range` of `section`, holding only `columns`.
    async fn read_rows(
        &mut self,
        section: &Section,
        columns: &[String],
        range: Range<usize>,
    ) -> Result<Vec<SourceRecord>, SourceError>;

    /// Header keywords of `section`.
    async fn header(&mut self, section: &Section) -> Result<Header, SourceError>;
}

/// Opens catalog files by path.
#[async_trait]
pub trait SourceOpener: Send + Sync {
    async fn open(&self, path: &Path) -> Result<Box<dyn CatalogSource>, SourceError>;

    /// Open a file without a header row, naming its columns `columns` in
    /// file order.
    async fn open_positional(&self, path: &Path, columns: &[String]) -> Result<Box<dyn CatalogSource>, SourceError> {
        let _ = columns;
        Err(SourceError::Unsupported {
            path: path.display().to_string(),
        })
    }
}

/// Picks a reader by file extension.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSourceOpener;

#[async_trait]
impl SourceOpener for FileSourceOpener {
    async fn open(&self, path: &Path) -> Result<Box<dyn CatalogSource>, SourceError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        match extension.as_str() {
            "csv" => Ok(Box::new(CsvCatalog::open(path)?)),
            "xml" | "vot" | "votable" => Ok(Box::new(VoTableCatalog::open(path).await?)),
            _ => Err(SourceError::Unsupported {
                path: path.display().to_string(),
            }),
        }
    }

    /// Positional files are always comma-separated text.
    async fn open_positional(&self, path: &Path, columns: &[String]) -> Result<Box<dyn CatalogSource>, SourceError> {
        Ok(Box::new(CsvCatalog::open_positional(path, columns.to_vec())?))
    }
}

/// File name without directories, trimmed; the identity the ledger uses.
pub fn short_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().trim().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Reads one section in batches of at most `batch_size` records.
pub struct ChunkedReader<'a> {
    source: &'a mut dyn CatalogSource,
    section: Section,
    columns: Vec<String>,
    batch_size: usize,
    total: usize,
    next: usize,
}

impl<'a> ChunkedReader<'a> {
    pub fn new(
        source: &'a mut dyn CatalogSource,
        section: Section,
        columns: Vec<String>,
        total: usize,
        batch_size: usize,
    ) -> Self {
        Self {
            source,
            section,
            columns,
            batch_size: batch_size.max(1),
            total,
            next: 0,
        }
    }

    /// Next batch and the index of its first record, or `None` when done.
    pub async fn next_batch(&mut self) -> Result<Option<(usize, Vec<SourceRecord>)>, SourceError> {
        if self.next >= self.total {
            return Ok(None);
        }
        let start = self.next;
        let end = (start + self.batch_size).min(self.total);
        let records = self
            .source
            .read_rows(&self.section, &self.columns, start..end)
            .await?;
        if records.len() != end - start {
            return Err(SourceError::RowRange {
                path: self.source.path().to_string(),
                start,
                end,
                total: start + records.len(),
            });
        }
        self.next = end;
        Ok(Some((start, records)))
    }

    pub fn position(&self) -> usize {
        self.next
    }

    pub fn total(&self) -> usize {
        self.total
    }
}

/// Resolve requested column names against a file's columns, case-insensitively.
pub(crate) fn select_columns(
    path: &str,
    section: &Section,
    available: &ColumnIndex,
    requested: &[String],
) -> Result<Vec<usize>, SourceError> {
    requested
        .iter()
        .map(|name| {
            available.position(name).ok_or_else(|| SourceError::UnknownColumn {
                path: path.to_string(),
                section: section.to_string(),
                column: name.clone(),
            })
        })
        .collect()
}
