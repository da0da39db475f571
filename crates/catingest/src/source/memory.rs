use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

use super::{select_columns, CatalogSource, ColumnIndex, Header, SourceOpener, SourceRecord};
use crate::error::SourceError;
use crate::mapping::Section;
use crate::value::Value;

#[derive(Debug, Clone, Default)]
struct MemoryTable {
    columns: Arc<ColumnIndex>,
    rows: Vec<Vec<Value>>,
}

/// Catalog held entirely in memory.
#[derive(Debug, Clone)]
pub struct MemoryCatalog {
    path: String,
    tables: BTreeMap<Section, MemoryTable>,
    headers: BTreeMap<Section, Header>,
}

impl MemoryCatalog {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            tables: BTreeMap::new(),
            headers: BTreeMap::new(),
        }
    }

    pub fn with_table(mut self, section: Section, columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        self.tables.insert(
            section,
            MemoryTable {
                columns: Arc::new(ColumnIndex::new(columns)),
                rows,
            },
        );
        self
    }

    pub fn with_header(mut self, section: Section, header: Header) -> Self {
        self.headers.insert(section, header);
        self
    }

    fn table(&self, section: &Section) -> Result<&MemoryTable, SourceError> {
        self.tables.get(section).ok_or_else(|| SourceError::UnknownSection {
            path: self.path.clone(),
            section: section.to_string(),
        })
    }
}

#[async_trait]
impl CatalogSource for MemoryCatalog {
    fn path(&self) -> &str {
        &self.path
    }

    async fn record_count(&mut self, section: &Section) -> Result<usize, SourceError> {
        Ok(self.table(section)?.rows.len())
    }

    async fn column_names(&mut self, section: &Section) -> Result<Vec<String>, SourceError> {
        Ok(self.table(section)?.columns.names().to_vec())
    }

    async fn read_rows(
        &mut self,
        section: &Section,
        columns: &[String],
        range: Range<usize>,
    ) -> Result<Vec<SourceRecord>, SourceError> {
        let table = self.table(section)?;
        let selected = select_columns(&self.path, section, &table.columns, columns)?;
        let rows = table.rows.get(range.clone()).ok_or_else(|| SourceError::RowRange {
            path: self.path.clone(),
            start: range.start,
            end: range.end,
            total: table.rows.len(),
        })?;

        let index = Arc::new(ColumnIndex::new(
            selected.iter().map(|i| table.columns.names()[*i].clone()).collect(),
        ));
        Ok(rows
            .iter()
            .map(|row| {
                let values = selected
                    .iter()
                    .map(|i| row.get(*i).cloned().unwrap_or(Value::Null))
                    .collect();
                SourceRecord::new(Arc::clone(&index), values)
            })
            .collect())
    }

    async fn header(&mut self, section: &Section) -> Result<Header, SourceError> {
        Ok(self.headers.get(section).cloned().unwrap_or_default())
    }
}

/// Hands out copies of registered in-memory catalogs by path.
#[derive(Debug, Clone, Default)]
pub struct MemoryOpener {
    catalogs: HashMap<String, MemoryCatalog>,
}

impl MemoryOpener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, catalog: MemoryCatalog) {
        self.catalogs.insert(catalog.path.clone(), catalog);
    }

    pub fn with(mut self, catalog: MemoryCatalog) -> Self {
        self.insert(catalog);
        self
    }
}

#[async_trait]
impl SourceOpener for MemoryOpener {
    async fn open(&self, path: &Path) -> Result<Box<dyn CatalogSource>, SourceError> {
        let key = path.display().to_string();
        self.catalogs
            .get(&key)
            .cloned()
            .map(|c| Box::new(c) as Box<dyn CatalogSource>)
            .ok_or_else(|| SourceError::Io {
                path: key,
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such catalog"),
            })
    }
}
