//! VOTable XML catalogs (TABLEDATA serialization)
//!
//! Sections follow the FITS convention: `PRIMARY`/`0` is the document-level
//! header (root and resource `PARAM`s), `n` is the n-th `TABLE` in document
//! order, and a name selects a `TABLE` by `ID` or `name`. Table `PARAM`s form
//! that table's header. Fields with an `arraysize` (other than character
//! fields) hold whitespace-separated arrays.
//!
//! The whole document is deserialized when the file is opened, so reader
//! memory grows with the file. Ranged reads only bound the projected batch;
//! very large tables belong in a format with a streaming reader.

use async_trait::async_trait;
use serde::Deserialize;
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use super::{select_columns, CatalogSource, ColumnIndex, Header, SourceRecord};
use crate::error::SourceError;
use crate::mapping::Section;
use crate::value::Value;

#[derive(Debug, Deserialize)]
struct Document {
    #[serde(rename = "PARAM", default)]
    params: Vec<Param>,
    #[serde(rename = "RESOURCE", default)]
    resources: Vec<Resource>,
}

#[derive(Debug, Deserialize)]
struct Resource {
    #[serde(rename = "PARAM", default)]
    params: Vec<Param>,
    #[serde(rename = "TABLE", default)]
    tables: Vec<Table>,
    #[serde(rename = "RESOURCE", default)]
    resources: Vec<Resource>,
}

#[derive(Debug, Deserialize)]
struct Table {
    #[serde(rename = "@ID")]
    id: Option<String>,
    #[serde(rename = "@name")]
    name: Option<String>,
    #[serde(rename = "PARAM", default)]
    params: Vec<Param>,
    #[serde(rename = "FIELD", default)]
    fields: Vec<Field>,
    #[serde(rename = "DATA")]
    data: Option<Data>,
}

#[derive(Debug, Deserialize)]
struct Field {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@datatype")]
    datatype: Option<String>,
    #[serde(rename = "@arraysize")]
    arraysize: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Param {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@value")]
    value: Option<String>,
    #[serde(rename = "@datatype")]
    datatype: Option<String>,
    #[serde(rename = "@arraysize")]
    arraysize: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Data {
    #[serde(rename = "TABLEDATA")]
    table_data: Option<TableData>,
}

#[derive(Debug, Deserialize)]
struct TableData {
    #[serde(rename = "TR", default)]
    rows: Vec<Tr>,
}

#[derive(Debug, Deserialize)]
struct Tr {
    #[serde(rename = "TD", default)]
    cells: Vec<Td>,
}

#[derive(Debug, Deserialize)]
struct Td {
    #[serde(rename = "$text", default)]
    text: String,
}

/// How a field's text is typed.
#[derive(Debug, Clone, Copy, PartialEq)]
enum FieldKind {
    Int,
    Float,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct FieldType {
    kind: FieldKind,
    array: bool,
}

impl FieldType {
    fn new(datatype: Option<&str>, arraysize: Option<&str>) -> Self {
        let kind = match datatype.map(str::to_lowercase).as_deref() {
            Some("unsignedbyte" | "short" | "int" | "long") => FieldKind::Int,
            Some("float" | "double") => FieldKind::Float,
            _ => FieldKind::Text,
        };
        let array = kind != FieldKind::Text
            && arraysize.is_some_and(|a| !a.trim().is_empty() && a.trim() != "1");
        Self { kind, array }
    }

    fn parse(self, raw: &str) -> Value {
        let raw = raw.trim();
        if raw.is_empty() {
            return Value::Null;
        }
        if self.array {
            return Value::Array(raw.split_whitespace().map(|t| self.scalar(t)).collect());
        }
        self.scalar(raw)
    }

    fn scalar(self, raw: &str) -> Value {
        match self.kind {
            FieldKind::Int => raw
                .parse::<i64>()
                .map(Value::Int)
                .unwrap_or_else(|_| Value::infer(raw)),
            FieldKind::Float => raw
                .parse::<f64>()
                .map(Value::Float)
                .unwrap_or_else(|_| Value::infer(raw)),
            FieldKind::Text => Value::Text(raw.to_string()),
        }
    }
}

struct LoadedTable {
    id: Option<String>,
    name: Option<String>,
    columns: Arc<ColumnIndex>,
    types: Vec<FieldType>,
    rows: Vec<Vec<String>>,
    header: Header,
}

pub struct VoTableCatalog {
    display: String,
    header: Header,
    tables: Vec<LoadedTable>,
}

impl VoTableCatalog {
    pub async fn open(path: &Path) -> Result<Self, SourceError> {
        let display = path.display().to_string();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| SourceError::Io {
                path: display.clone(),
                source,
            })?;
        Self::parse(&display, &content)
    }

    /// Parse a document already in memory; `origin` names it in errors.
    pub fn parse(origin: &str, content: &str) -> Result<Self, SourceError> {
        let document: Document =
            quick_xml::de::from_str(content).map_err(|e| SourceError::Xml {
                path: origin.to_string(),
                message: e.to_string(),
            })?;

        let mut header = params_header(&document.params);
        let mut tables = Vec::new();
        collect_resources(origin, document.resources, &mut header, &mut tables)?;
        debug!(path = origin, tables = tables.len(), "Loaded VOTable");

        Ok(Self {
            display: origin.to_string(),
            header,
            tables,
        })
    }

    fn table(&self, section: &Section) -> Result<&LoadedTable, SourceError> {
        let found = match section {
            Section::Index(0) => None,
            Section::Index(n) => self.tables.get(*n as usize - 1),
            Section::Named(name) => self.tables.iter().find(|t| {
                [&t.id, &t.name]
                    .into_iter()
                    .flatten()
                    .any(|label| label.eq_ignore_ascii_case(name))
            }),
        };
        found.ok_or_else(|| SourceError::UnknownSection {
            path: self.display.clone(),
            section: section.to_string(),
        })
    }
}

fn params_header(params: &[Param]) -> Header {
    let mut header = Header::new();
    for param in params {
        let kind = FieldType::new(param.datatype.as_deref(), param.arraysize.as_deref());
        let value = param.value.as_deref().map_or(Value::Null, |v| kind.parse(v));
        header.insert(&param.name, value);
    }
    header
}

fn collect_resources(
    origin: &str,
    resources: Vec<Resource>,
    header: &mut Header,
    tables: &mut Vec<LoadedTable>,
) -> Result<(), SourceError> {
    for resource in resources {
        for (key, value) in params_header(&resource.params).iter() {
            header.insert(key, value.clone());
        }
        for table in resource.tables {
            tables.push(load_table(origin, table)?);
        }
        collect_resources(origin, resource.resources, header, tables)?;
    }
    Ok(())
}

fn load_table(origin: &str, table: Table) -> Result<LoadedTable, SourceError> {
    let names: Vec<String> = table.fields.iter().map(|f| f.name.trim().to_string()).collect();
    let types: Vec<FieldType> = table
        .fields
        .iter()
        .map(|f| FieldType::new(f.datatype.as_deref(), f.arraysize.as_deref()))
        .collect();

    let rows: Vec<Vec<String>> = table
        .data
        .and_then(|d| d.table_data)
        .map(|td| td.rows)
        .unwrap_or_default()
        .into_iter()
        .map(|tr| tr.cells.into_iter().map(|td| td.text).collect())
        .collect();

    if let Some((index, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != names.len()) {
        return Err(SourceError::Malformed {
            path: origin.to_string(),
            message: format!(
                "table row {} has {} cell(s), {} field(s) declared",
                index,
                row.len(),
                names.len()
            ),
        });
    }

    Ok(LoadedTable {
        id: table.id,
        name: table.name,
        columns: Arc::new(ColumnIndex::new(names)),
        types,
        rows,
        header: params_header(&table.params),
    })
}

#[async_trait]
impl CatalogSource for VoTableCatalog {
    fn path(&self) -> &str {
        &self.display
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
        let selected = select_columns(&self.display, section, &table.columns, columns)?;
        let rows = table.rows.get(range.clone()).ok_or_else(|| SourceError::RowRange {
            path: self.display.clone(),
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
                let values = selected.iter().map(|i| table.types[*i].parse(&row[*i])).collect();
                SourceRecord::new(Arc::clone(&index), values)
            })
            .collect())
    }

    async fn header(&mut self, section: &Section) -> Result<Header, SourceError> {
        match section {
            Section::Index(0) => Ok(self.header.clone()),
            other => Ok(self.table(other)?.header.clone()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::source::FieldLookup;

    const DOCUMENT: &str = r#"<?xml version="1.0"?>
<VOTABLE version="1.3">
  <RESOURCE name="coadd">
    <PARAM name="TILENAME" datatype="char" arraysize="*" value="DES0215-0458"/>
    <PARAM name="EXPTIME" datatype="double" value="900.0"/>
    <TABLE ID="objects" name="LDAC_OBJECTS">
      <PARAM name="FILTER" datatype="char" arraysize="*" value="r DECam SDSS c0002"/>
      <FIELD name="NUMBER" datatype="int"/>
      <FIELD name="FLUX_APER" datatype="float" arraysize="3"/>
      <FIELD name="FLAGS_NOTE" datatype="char" arraysize="*"/>
      <DATA>
        <TABLEDATA>
          <TR><TD>1</TD><TD>1.0 2.0 3.0</TD><TD>ok</TD></TR>
          <TR><TD>2</TD><TD>4.0 5.0 6.0</TD><TD/></TR>
        </TABLEDATA>
      </DATA>
    </TABLE>
  </RESOURCE>
</VOTABLE>"#;

    #[tokio::test]
    async fn test_reads_tabledata() {
        let mut catalog = VoTableCatalog::parse("coadd.xml", DOCUMENT).unwrap();
        let section = Section::named("ldac_objects");

        assert_eq!(catalog.record_count(&section).await.unwrap(), 2);
        assert_eq!(catalog.record_count(&Section::Index(1)).await.unwrap(), 2);

        let columns = vec!["NUMBER".to_string(), "FLUX_APER".to_string(), "FLAGS_NOTE".to_string()];
        let rows = catalog.read_rows(&section, &columns, 0..2).await.unwrap();
        assert_eq!(rows[0].field("number"), Some(&Value::Int(1)));
        assert_eq!(
            rows[1].field("FLUX_APER"),
            Some(&Value::from(vec![4.0, 5.0, 6.0]))
        );
        assert_eq!(rows[1].field("FLAGS_NOTE"), Some(&Value::Null));
    }

    #[tokio::test]
    async fn test_headers() {
        let mut catalog = VoTableCatalog::parse("coadd.xml", DOCUMENT).unwrap();

        let primary = catalog.header(&Section::PRIMARY).await.unwrap();
        assert_eq!(primary.field("tilename"), Some(&Value::Text("DES0215-0458".into())));
        assert_eq!(primary.field("EXPTIME"), Some(&Value::Float(900.0)));

        let table = catalog.header(&Section::named("objects")).await.unwrap();
        assert_eq!(table.field("FILTER"), Some(&Value::Text("r DECam SDSS c0002".into())));
    }

    #[tokio::test]
    async fn test_unknown_section() {
        let mut catalog = VoTableCatalog::parse("coadd.xml", DOCUMENT).unwrap();
        let err = catalog.record_count(&Section::Index(4)).await.unwrap_err();
        assert!(matches!(err, SourceError::UnknownSection { .. }));
    }

    #[test]
    fn test_malformed_xml() {
        let err = VoTableCatalog::parse("bad.xml", "<VOTABLE><RESOURCE>").err().unwrap();
        assert!(matches!(err, SourceError::Xml { .. }));
    }
}
