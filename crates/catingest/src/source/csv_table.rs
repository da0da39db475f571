//! CSV catalog exports
//!
//! The header row names the columns, or for positional files the caller
//! does and every line is a record. Cells stay text until projection coerces
//! them to the declared datatype; a cell written as `[a, b, c]` or `[a b c]`
//! is a fixed-length array of text elements. A CSV file has a single table
//! and no header keywords, so every section reads the same rows.

use async_trait::async_trait;
use csv::{ReaderBuilder, StringRecordsIntoIter, Trim};
use std::fs::File;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use super::{select_columns, CatalogSource, ColumnIndex, Header, SourceRecord};
use crate::error::SourceError;
use crate::mapping::Section;
use crate::value::Value;

pub struct CsvCatalog {
    path: PathBuf,
    display: String,
    columns: Arc<ColumnIndex>,
    has_headers: bool,
    record_count: Option<usize>,
    cursor: Option<Cursor>,
}

/// Open reader positioned before record `next`.
struct Cursor {
    records: StringRecordsIntoIter<File>,
    next: usize,
}

impl CsvCatalog {
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let display = path.display().to_string();
        let mut reader = Self::reader(path, &display, true)?;
        let headers = reader.headers().map_err(|source| SourceError::Csv {
            path: display.clone(),
            source,
        })?;
        let names: Vec<String> = headers.iter().map(|h| h.trim().to_string()).collect();
        if names.iter().all(String::is_empty) {
            return Err(SourceError::Malformed {
                path: display,
                message: "missing header row".to_string(),
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            display,
            columns: Arc::new(ColumnIndex::new(names)),
            has_headers: true,
            record_count: None,
            cursor: None,
        })
    }

    /// Open a file without a header row; `columns` names its cells in order.
    pub fn open_positional(path: &Path, columns: Vec<String>) -> Result<Self, SourceError> {
        let display = path.display().to_string();
        if columns.is_empty() {
            return Err(SourceError::Malformed {
                path: display,
                message: "no column names for a positional file".to_string(),
            });
        }
        // fail early on a missing or unreadable file
        Self::reader(path, &display, false)?;
        debug!(path = %path.display(), columns = columns.len(), "Opened positional CSV");

        Ok(Self {
            path: path.to_path_buf(),
            display,
            columns: Arc::new(ColumnIndex::new(columns)),
            has_headers: false,
            record_count: None,
            cursor: None,
        })
    }

    fn reader(path: &Path, display: &str, has_headers: bool) -> Result<csv::Reader<File>, SourceError> {
        ReaderBuilder::new()
            .has_headers(has_headers)
            .flexible(!has_headers)
            .trim(Trim::All)
            .comment(Some(b'#'))
            .from_path(path)
            .map_err(|source| SourceError::Csv {
                path: display.to_string(),
                source,
            })
    }

    fn csv_error(&self, source: csv::Error) -> SourceError {
        SourceError::Csv {
            path: self.display.clone(),
            source,
        }
    }

    fn count_records(&self) -> Result<usize, SourceError> {
        let reader = Self::reader(&self.path, &self.display, self.has_headers)?;
        let mut count = 0;
        for record in reader.into_records() {
            record.map_err(|e| self.csv_error(e))?;
            count += 1;
        }
        Ok(count)
    }

    /// Reuse the open reader when reading forward; reopen otherwise.
    fn cursor_at(&mut self, start: usize) -> Result<&mut Cursor, SourceError> {
        let reusable = self.cursor.as_ref().is_some_and(|c| c.next <= start);
        if !reusable {
            debug!(path = %self.display, start, "Opening CSV cursor");
            let reader = Self::reader(&self.path, &self.display, self.has_headers)?;
            self.cursor = Some(Cursor {
                records: reader.into_records(),
                next: 0,
            });
        }

        let display = self.display.clone();
        let cursor = self.cursor.as_mut().ok_or_else(|| SourceError::Malformed {
            path: display.clone(),
            message: "reader not open".to_string(),
        })?;
        while cursor.next < start {
            match cursor.records.next() {
                Some(Ok(_)) => cursor.next += 1,
                Some(Err(source)) => return Err(SourceError::Csv { path: display, source }),
                None => {
                    return Err(SourceError::RowRange {
                        path: display,
                        start,
                        end: start,
                        total: cursor.next,
                    })
                },
            }
        }
        Ok(cursor)
    }
}

/// Split one CSV cell into text, or an array of text elements. Typing is
/// left to the mapping's declared datatype.
pub(crate) fn parse_cell(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    match trimmed.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
        Some(inner) => Value::Array(
            inner
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|s| !s.is_empty())
                .map(Value::from)
                .collect(),
        ),
        None => Value::Text(trimmed.to_string()),
    }
}

#[async_trait]
impl CatalogSource for CsvCatalog {
    fn path(&self) -> &str {
        &self.display
    }

    async fn record_count(&mut self, _section: &Section) -> Result<usize, SourceError> {
        if let Some(count) = self.record_count {
            return Ok(count);
        }
        let count = self.count_records()?;
        self.record_count = Some(count);
        Ok(count)
    }

    async fn column_names(&mut self, _section: &Section) -> Result<Vec<String>, SourceError> {
        Ok(self.columns.names().to_vec())
    }

    async fn read_rows(
        &mut self,
        section: &Section,
        columns: &[String],
        range: Range<usize>,
    ) -> Result<Vec<SourceRecord>, SourceError> {
        let selected = select_columns(&self.display, section, &self.columns, columns)?;
        let index = Arc::new(ColumnIndex::new(
            selected.iter().map(|i| self.columns.names()[*i].clone()).collect(),
        ));

        let display = self.display.clone();
        let (start, end) = (range.start, range.end);
        let cursor = self.cursor_at(start)?;
        let mut records = Vec::with_capacity(end.saturating_sub(start));
        while cursor.next < end {
            let row = match cursor.records.next() {
                Some(Ok(row)) => row,
                Some(Err(source)) => return Err(SourceError::Csv { path: display, source }),
                None => {
                    return Err(SourceError::RowRange {
                        path: display,
                        start,
                        end,
                        total: cursor.next,
                    })
                },
            };
            cursor.next += 1;
            let values = selected
                .iter()
                .map(|i| row.get(*i).map(parse_cell).unwrap_or(Value::Null))
                .collect();
            records.push(SourceRecord::new(Arc::clone(&index), values));
        }
        Ok(records)
    }

    async fn header(&mut self, _section: &Section) -> Result<Header, SourceError> {
        Ok(Header::new())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::source::FieldLookup;
    use std::io::Write;

    fn fixture(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_parse_cell() {
        assert_eq!(parse_cell("12"), Value::from("12"));
        assert_eq!(parse_cell("007"), Value::from("007"));
        assert_eq!(parse_cell("1e5"), Value::from("1e5"));
        assert_eq!(parse_cell("  "), Value::Null);
        assert_eq!(parse_cell("[1.5, 2.5 ,3]"), Value::from(vec!["1.5", "2.5", "3"]));
        assert_eq!(parse_cell("[1 2]"), Value::from(vec!["1", "2"]));
        assert_eq!(parse_cell("r DECam"), Value::Text("r DECam".into()));
    }

    #[tokio::test]
    async fn test_counts_and_reads_ranges() {
        let file = fixture("NUMBER,ALPHA,FILTER\n1,10.5,g\n2,11.0,r\n3,12.25,i\n4,13.0,z\n");
        let mut catalog = CsvCatalog::open(file.path()).unwrap();
        let section = Section::Index(1);

        assert_eq!(catalog.record_count(&section).await.unwrap(), 4);
        assert_eq!(catalog.column_names(&section).await.unwrap(), vec!["NUMBER", "ALPHA", "FILTER"]);

        let columns = vec!["number".to_string(), "filter".to_string()];
        let rows = catalog.read_rows(&section, &columns, 1..3).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].field("NUMBER"), Some(&Value::from("2")));
        assert_eq!(rows[1].field("filter"), Some(&Value::Text("i".into())));
        assert_eq!(rows[0].field("ALPHA"), None);

        // going backwards reopens the file
        let rows = catalog.read_rows(&section, &columns, 0..1).await.unwrap();
        assert_eq!(rows[0].field("NUMBER"), Some(&Value::from("1")));
    }

    #[tokio::test]
    async fn test_positional_file_counts_every_line() {
        let file = fixture("101,0.25,0.5\n102,0.75,1.0\n103,1.25,1.5\n");
        let names = vec!["COADD_OBJECT_ID".to_string(), "WEIGHT_G".to_string(), "WEIGHT_R".to_string()];
        let mut catalog = CsvCatalog::open_positional(file.path(), names).unwrap();
        let section = Section::Index(1);

        assert_eq!(catalog.record_count(&section).await.unwrap(), 3);
        let rows = catalog
            .read_rows(&section, &["COADD_OBJECT_ID".to_string(), "WEIGHT_R".to_string()], 0..3)
            .await
            .unwrap();
        assert_eq!(rows[0].field("COADD_OBJECT_ID"), Some(&Value::from("101")));
        assert_eq!(rows[2].field("WEIGHT_R"), Some(&Value::from("1.5")));
    }

    #[tokio::test]
    async fn test_unknown_column_and_short_file() {
        let file = fixture("NUMBER\n1\n");
        let mut catalog = CsvCatalog::open(file.path()).unwrap();
        let section = Section::Index(1);

        let err = catalog
            .read_rows(&section, &["MAG_AUTO".to_string()], 0..1)
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::UnknownColumn { .. }));

        let err = catalog
            .read_rows(&section, &["NUMBER".to_string()], 0..5)
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::RowRange { total: 1, .. }));
    }
}
