//! Record projection
//!
//! Turns one source record (or one header) into destination column values
//! according to a [`ColumnMappingTable`]. The only collaborator consulted is
//! the identifier coordinator, through [`IdentifierAccess`].

use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::{IdentifierError, MetadataError, ProjectionError};
use crate::identifiers::IdentifierAccess;
use crate::mapping::{ColumnMappingTable, MappingEntry, Section, ValueKind};
use crate::source::{FieldLookup, Header};
use crate::value::Value;

/// File-level values keyed by upper-cased column name.
pub type Constants = BTreeMap<String, Value>;

/// Normalise caller-supplied constants: upper-case, trimmed keys.
pub fn constants_from<I, K, V>(pairs: I) -> Constants
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<Value>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.as_ref().trim().to_uppercase(), v.into()))
        .collect()
}

/// Column name -> scalar value, ready for emission.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DestinationRow(BTreeMap<String, Value>);

impl DestinationRow {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(&column.trim().to_uppercase())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    fn insert(&mut self, column: &str, value: Value) {
        self.0.insert(column.to_string(), value);
    }

    /// Values in `layout` order; absent columns are null.
    pub fn into_values(mut self, layout: &[String]) -> Vec<Value> {
        layout
            .iter()
            .map(|c| self.0.remove(c).unwrap_or(Value::Null))
            .collect()
    }
}

/// Routes the natural-key field through the identifier coordinator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdentifierBinding {
    /// Source field holding the natural key, e.g. `NUMBER`
    pub key_field: String,
    /// Destination column receiving the surrogate identifier
    pub id_column: String,
    /// Destination column that keeps the natural key, e.g. `OBJECT_NUMBER`
    pub key_column: Option<String>,
    /// Skip and count records whose key was never assigned
    pub skip_unresolved: bool,
}

impl IdentifierBinding {
    pub fn new(key_field: &str, id_column: &str) -> Self {
        Self {
            key_field: key_field.trim().to_uppercase(),
            id_column: id_column.trim().to_uppercase(),
            key_column: None,
            skip_unresolved: false,
        }
    }

    pub fn keep_key_in(mut self, column: &str) -> Self {
        self.key_column = Some(column.trim().to_uppercase());
        self
    }

    pub fn skip_unresolved(mut self, skip: bool) -> Self {
        self.skip_unresolved = skip;
        self
    }
}

/// Outcome of projecting one record.
#[derive(Debug, Clone, PartialEq)]
pub enum Projected {
    Row(DestinationRow),
    /// Natural key absent from the identifier map, tolerated by the binding
    Skipped { key: i64 },
}

/// Project every entry of `section` from `source`.
pub fn project_section(
    table: &ColumnMappingTable,
    section: &Section,
    source: &dyn FieldLookup,
    constants: &Constants,
) -> Result<DestinationRow, ProjectionError> {
    let mut row = DestinationRow::default();
    for entry in table.section(section) {
        project_entry(entry, source, constants, &mut row)?;
    }
    Ok(row)
}

/// Values shared by every row of a file: the projected header sections
/// (every mapped section except `data_section`) and the constant entries of
/// the data section. Caller constants that no constant entry claims, by
/// column or attribute name, are carried through unchanged.
pub fn file_constants(
    table: &ColumnMappingTable,
    data_section: &Section,
    headers: &BTreeMap<Section, Header>,
    caller: &Constants,
) -> Result<Constants, ProjectionError> {
    let empty = Header::new();
    let mut row = DestinationRow::default();
    let mut claimed: Vec<&str> = Vec::new();
    for (section, entries) in table.sections() {
        for entry in entries.iter().filter(|e| e.kind() == ValueKind::Constant) {
            claimed.push(entry.attribute());
            claimed.extend(entry.columns().iter().map(String::as_str));
        }
        if section == data_section {
            for entry in entries.iter().filter(|e| e.kind() == ValueKind::Constant) {
                project_entry(entry, &empty, caller, &mut row)?;
            }
        } else {
            let header = headers.get(section).unwrap_or(&empty);
            row.0.extend(project_section(table, section, header, caller)?.0);
        }
    }

    for (column, value) in caller {
        if !claimed.contains(&column.as_str()) && !row.0.contains_key(column) {
            row.insert(column, value.clone());
        }
    }
    Ok(row.0)
}

fn project_entry(
    entry: &MappingEntry,
    source: &dyn FieldLookup,
    constants: &Constants,
    row: &mut DestinationRow,
) -> Result<(), ProjectionError> {
    match entry.kind() {
        ValueKind::Constant => {
            for column in entry.columns() {
                let value = constants
                    .get(column)
                    .or_else(|| constants.get(entry.attribute()))
                    .ok_or_else(|| ProjectionError::MissingConstant {
                        column: column.clone(),
                    })?;
                row.insert(column, value.coerce(entry.datatype(), entry.date_format(), column)?);
            }
        },
        ValueKind::Direct => {
            let value = required_field(entry, source)?;
            check_shape(entry, value)?;
            for (column, position) in entry.columns().iter().zip(entry.positions()) {
                let element = element(entry, value, *position)?;
                row.insert(column, element.coerce(entry.datatype(), entry.date_format(), column)?);
            }
        },
        ValueKind::Derived => {
            let value = required_field(entry, source)?;
            check_shape(entry, value)?;
            let steps = entry.columns().iter().zip(entry.positions()).zip(entry.derivations());
            for ((column, position), derivation) in steps {
                let input = element(entry, value, *position)?;
                let derived = derivation
                    .apply(input)
                    .map_err(|reason| ProjectionError::Derivation {
                        column: column.clone(),
                        reason,
                    })?;
                row.insert(column, derived.coerce(entry.datatype(), entry.date_format(), column)?);
            }
        },
    }
    Ok(())
}

fn required_field<'r>(entry: &MappingEntry, source: &'r dyn FieldLookup) -> Result<&'r Value, ProjectionError> {
    source
        .field(entry.attribute())
        .ok_or_else(|| ProjectionError::MissingField {
            field: entry.attribute().to_string(),
        })
}

/// Arrays must have exactly the length the entry's positions span, and only
/// array entries take arrays.
fn check_shape(entry: &MappingEntry, value: &Value) -> Result<(), ProjectionError> {
    let (expected, received) = match value {
        Value::Null => return Ok(()),
        Value::Array(items) if entry.is_array() => (entry.required_len(), items.len()),
        Value::Array(items) => (1, items.len()),
        _ if entry.is_array() => (entry.required_len(), 1),
        _ => return Ok(()),
    };
    if expected == received {
        return Ok(());
    }
    Err(ProjectionError::ValueCount {
        field: entry.attribute().to_string(),
        expected,
        received,
    })
}

fn element<'v>(entry: &MappingEntry, value: &'v Value, position: usize) -> Result<&'v Value, ProjectionError> {
    if value.is_null() {
        return Ok(value);
    }
    value.element(position).ok_or_else(|| ProjectionError::ValueCount {
        field: entry.attribute().to_string(),
        expected: entry.required_len(),
        received: value.len(),
    })
}

/// Projects records of one data section, with file constants and an
/// optional identifier binding fixed for the whole file.
#[derive(Debug)]
pub struct RecordProjector<'t> {
    table: &'t ColumnMappingTable,
    section: Section,
    constants: Constants,
    binding: Option<IdentifierBinding>,
    layout: Vec<String>,
}

impl<'t> RecordProjector<'t> {
    pub fn new(
        table: &'t ColumnMappingTable,
        section: Section,
        constants: Constants,
        binding: Option<IdentifierBinding>,
    ) -> Result<Self, MetadataError> {
        let mut layout: Vec<String> = Vec::new();
        let mut claim = |column: &str, owner: &str| -> Result<(), MetadataError> {
            if layout.iter().any(|c| c == column) {
                return Err(MetadataError::DuplicateColumn {
                    catalog_type: table.catalog_type().to_string(),
                    column: column.to_string(),
                    first: "mapping".to_string(),
                    second: owner.to_string(),
                });
            }
            layout.push(column.to_string());
            Ok(())
        };

        if let Some(binding) = &binding {
            claim(&binding.id_column, "identifier binding")?;
            if let Some(key_column) = &binding.key_column {
                claim(key_column, "identifier binding")?;
            }
        }
        for entry in table.section(&section) {
            if is_key_entry(binding.as_ref(), entry) {
                continue;
            }
            for column in entry.columns() {
                claim(column, entry.attribute())?;
            }
        }
        for column in constants.keys() {
            if !layout.contains(column) {
                layout.push(column.clone());
            }
        }

        Ok(Self {
            table,
            section,
            constants,
            binding,
            layout,
        })
    }

    /// Destination columns, in emission order.
    pub fn layout(&self) -> &[String] {
        &self.layout
    }

    pub fn section(&self) -> &Section {
        &self.section
    }

    pub fn binding(&self) -> Option<&IdentifierBinding> {
        self.binding.as_ref()
    }

    /// Source fields a chunked read must fetch, in mapping order.
    pub fn source_fields(&self) -> Vec<String> {
        let mut fields: Vec<String> = Vec::new();
        if let Some(binding) = &self.binding {
            fields.push(binding.key_field.clone());
        }
        for entry in self.table.section(&self.section) {
            let reads_source = entry.kind() != ValueKind::Constant;
            if reads_source && !fields.iter().any(|f| f == entry.attribute()) {
                fields.push(entry.attribute().to_string());
            }
        }
        fields
    }

    pub fn project(
        &self,
        record: &dyn FieldLookup,
        ids: &mut IdentifierAccess<'_>,
    ) -> Result<Projected, ProjectionError> {
        let mut row = DestinationRow(self.constants.clone());

        if let Some(binding) = &self.binding {
            let raw = record
                .field(&binding.key_field)
                .ok_or_else(|| ProjectionError::MissingField {
                    field: binding.key_field.clone(),
                })?;
            let key = raw.as_i64().ok_or_else(|| IdentifierError::InvalidKey {
                field: binding.key_field.clone(),
                value: raw.to_string(),
            })?;

            let id = match ids.identify(key) {
                Ok(id) => id,
                Err(IdentifierError::Unresolved { key }) if binding.skip_unresolved && !ids.can_assign() => {
                    return Ok(Projected::Skipped { key });
                },
                Err(e) => return Err(e.into()),
            };
            row.insert(&binding.id_column, Value::Int(id));
            if let Some(key_column) = &binding.key_column {
                row.insert(key_column, Value::Int(key));
            }
        }

        for entry in self.table.section(&self.section) {
            if is_key_entry(self.binding.as_ref(), entry) {
                continue;
            }
            project_entry(entry, record, &self.constants, &mut row)?;
        }
        Ok(Projected::Row(row))
    }
}

fn is_key_entry(binding: Option<&IdentifierBinding>, entry: &MappingEntry) -> bool {
    binding.is_some_and(|b| b.key_field == entry.attribute())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::identifiers::IdentifierCoordinator;
    use crate::mapping::{build_table, ResolverOptions};
    use crate::source::{ColumnIndex, SourceRecord};
    use crate::store::MetadataRow;
    use std::sync::Arc;

    fn objects() -> Section {
        Section::named("OBJECTS")
    }

    fn table(rows: Vec<MetadataRow>) -> ColumnMappingTable {
        let options = ResolverOptions {
            default_section: None,
            regroup_arrays: false,
        };
        build_table("coadd_cat", "coadd_object", rows, Some(&objects()), &options).unwrap()
    }

    fn record(fields: Vec<(&str, Value)>) -> SourceRecord {
        let (names, values): (Vec<String>, Vec<Value>) =
            fields.into_iter().map(|(n, v)| (n.to_string(), v)).unzip();
        SourceRecord::new(Arc::new(ColumnIndex::new(names)), values)
    }

    fn project(projector: &RecordProjector<'_>, rec: &SourceRecord) -> Result<Projected, ProjectionError> {
        let ids = IdentifierCoordinator::new();
        projector.project(rec, &mut IdentifierAccess::Resolve(&ids))
    }

    #[test]
    fn test_array_fans_out_by_position() {
        let t = table(vec![
            MetadataRow::new("OBJECTS", "FLUX_APER", 0, "FLUX_APER_1", "h", "float"),
            MetadataRow::new("OBJECTS", "FLUX_APER", 1, "FLUX_APER_2", "h", "float"),
            MetadataRow::new("OBJECTS", "FLUX_APER", 2, "FLUX_APER_3", "h", "float"),
        ]);
        let projector = RecordProjector::new(&t, objects(), Constants::new(), None).unwrap();
        let rec = record(vec![("flux_aper", Value::from(vec![1.5, 2.5, 3.5]))]);

        let Projected::Row(row) = project(&projector, &rec).unwrap() else { panic!("skipped") };
        assert_eq!(row.get("FLUX_APER_1"), Some(&Value::Float(1.5)));
        assert_eq!(row.get("FLUX_APER_2"), Some(&Value::Float(2.5)));
        assert_eq!(row.get("FLUX_APER_3"), Some(&Value::Float(3.5)));
    }

    #[test]
    fn test_short_array_is_value_count_error() {
        let t = table(vec![
            MetadataRow::new("OBJECTS", "MAG_APER", 0, "MAG_APER_1", "h", "float"),
            MetadataRow::new("OBJECTS", "MAG_APER", 4, "MAG_APER_5", "h", "float"),
        ]);
        let projector = RecordProjector::new(&t, objects(), Constants::new(), None).unwrap();
        let rec = record(vec![("MAG_APER", Value::from(vec![20.1, 20.2]))]);

        let err = project(&projector, &rec).unwrap_err();
        assert_eq!(
            err,
            ProjectionError::ValueCount {
                field: "MAG_APER".into(),
                expected: 5,
                received: 2,
            }
        );
    }

    #[test]
    fn test_long_array_is_value_count_error() {
        let t = table(vec![
            MetadataRow::new("OBJECTS", "FLUX_APER", 0, "FLUX_APER_1", "h", "float"),
            MetadataRow::new("OBJECTS", "FLUX_APER", 1, "FLUX_APER_2", "h", "float"),
            MetadataRow::new("OBJECTS", "FLUX_APER", 2, "FLUX_APER_3", "h", "float"),
        ]);
        let projector = RecordProjector::new(&t, objects(), Constants::new(), None).unwrap();
        let rec = record(vec![("FLUX_APER", Value::from(vec![1.0, 2.0, 3.0, 4.0, 5.0]))]);

        assert_eq!(
            project(&projector, &rec).unwrap_err(),
            ProjectionError::ValueCount {
                field: "FLUX_APER".into(),
                expected: 3,
                received: 5,
            }
        );
    }

    #[test]
    fn test_array_into_scalar_column_rejected() {
        let t = table(vec![MetadataRow::new("OBJECTS", "MAG_AUTO", 0, "MAG_AUTO", "h", "float")]);
        let projector = RecordProjector::new(&t, objects(), Constants::new(), None).unwrap();
        let rec = record(vec![("MAG_AUTO", Value::from(vec![21.0, 22.0]))]);

        assert_eq!(
            project(&projector, &rec).unwrap_err(),
            ProjectionError::ValueCount {
                field: "MAG_AUTO".into(),
                expected: 1,
                received: 2,
            }
        );
    }

    #[test]
    fn test_missing_field() {
        let t = table(vec![MetadataRow::new("OBJECTS", "SPREAD_MODEL", 0, "SPREAD_MODEL", "h", "float")]);
        let projector = RecordProjector::new(&t, objects(), Constants::new(), None).unwrap();
        let rec = record(vec![("ALPHA", Value::Float(1.0))]);

        assert_eq!(
            project(&projector, &rec).unwrap_err(),
            ProjectionError::MissingField {
                field: "SPREAD_MODEL".into()
            }
        );
    }

    #[test]
    fn test_coercion_and_char_trim() {
        let t = table(vec![
            MetadataRow::new("OBJECTS", "FLAGS", 0, "FLAGS", "h", "integer"),
            MetadataRow::new("OBJECTS", "TILENAME", 0, "TILENAME", "h", "char"),
        ]);
        let projector = RecordProjector::new(&t, objects(), Constants::new(), None).unwrap();

        let ok = record(vec![("FLAGS", Value::Float(3.0)), ("TILENAME", Value::from(" DES0215 "))]);
        let Projected::Row(row) = project(&projector, &ok).unwrap() else { panic!("skipped") };
        assert_eq!(row.get("FLAGS"), Some(&Value::Int(3)));
        assert_eq!(row.get("TILENAME"), Some(&Value::Text("DES0215".into())));

        let bad = record(vec![("FLAGS", Value::from("x")), ("TILENAME", Value::from("t"))]);
        assert!(matches!(project(&projector, &bad), Err(ProjectionError::Coercion { .. })));
    }

    #[test]
    fn test_derived_and_constant_entries() {
        let t = table(vec![
            MetadataRow::new("OBJECTS", "NUMBER", 0, "OBJECT_NUMBER", "h", "integer"),
            MetadataRow::new("PRIMARY", "FILTER", 0, "BAND", "c", "char"),
            MetadataRow::new("PRIMARY", "DATE-OBS", 0, "NITE", "c", "char"),
            MetadataRow::new("PRIMARY", "FILENAME", 0, "FILENAME", "k", "char"),
        ]);
        let caller = constants_from([("filename", "DES0215_r_cat.fits")]);
        let header: Header = [
            ("FILTER", Value::from("r DECam SDSS c0002")),
            ("DATE-OBS", Value::from("2013-09-02T04:10:00")),
        ]
        .into_iter()
        .collect();
        let headers = BTreeMap::from([(Section::PRIMARY, header)]);

        let constants = file_constants(&t, &objects(), &headers, &caller).unwrap();
        assert_eq!(constants.get("BAND"), Some(&Value::Text("r".into())));
        assert_eq!(constants.get("NITE"), Some(&Value::Text("20130901".into())));
        assert_eq!(constants.get("FILENAME"), Some(&Value::Text("DES0215_r_cat.fits".into())));

        let projector = RecordProjector::new(&t, objects(), constants, None).unwrap();
        let rec = record(vec![("NUMBER", Value::Int(17))]);
        let Projected::Row(row) = project(&projector, &rec).unwrap() else { panic!("skipped") };
        assert_eq!(row.get("OBJECT_NUMBER"), Some(&Value::Int(17)));
        assert_eq!(row.get("BAND"), Some(&Value::Text("r".into())));
        assert_eq!(projector.layout().len(), row.len());
    }

    #[test]
    fn test_missing_constant() {
        let t = table(vec![
            MetadataRow::new("OBJECTS", "NUMBER", 0, "OBJECT_NUMBER", "h", "integer"),
            MetadataRow::new("PRIMARY", "PFW_ATTEMPT_ID", 0, "PFW_ATTEMPT_ID", "k", "integer"),
        ]);
        let err = file_constants(&t, &objects(), &BTreeMap::new(), &Constants::new()).unwrap_err();
        assert!(matches!(err, ProjectionError::MissingConstant { .. }));
    }

    #[test]
    fn test_unclaimed_constants_written_to_every_row() {
        let t = table(vec![
            MetadataRow::new("OBJECTS", "NUMBER", 0, "OBJECT_NUMBER", "h", "integer"),
            MetadataRow::new("OBJECTS", "REQNUM", 0, "REQNUM", "k", "integer"),
            MetadataRow::new("PRIMARY", "PFW_ID", 0, "PFW_ATTEMPT_ID", "k", "integer"),
        ]);
        let caller = constants_from([
            ("FILENAME", Value::from("tile_g.cat")),
            ("REQNUM", Value::from("12")),
            ("PFW_ID", Value::from("88")),
            ("TILENAME", Value::from("DES0215-0458")),
        ]);

        let constants = file_constants(&t, &objects(), &BTreeMap::new(), &caller).unwrap();
        assert_eq!(constants.get("REQNUM"), Some(&Value::Int(12)));
        assert_eq!(constants.get("PFW_ATTEMPT_ID"), Some(&Value::Int(88)));
        assert_eq!(constants.get("FILENAME"), Some(&Value::from("tile_g.cat")));
        assert_eq!(constants.get("TILENAME"), Some(&Value::from("DES0215-0458")));
        // claimed by attribute name, stored under the mapped column only
        assert!(!constants.contains_key("PFW_ID"));

        let projector = RecordProjector::new(&t, objects(), constants, None).unwrap();
        let rec = record(vec![("NUMBER", Value::Int(4))]);
        let Projected::Row(row) = project(&projector, &rec).unwrap() else { panic!("skipped") };
        assert_eq!(row.get("TILENAME"), Some(&Value::from("DES0215-0458")));
        assert_eq!(row.get("FILENAME"), Some(&Value::from("tile_g.cat")));
        assert_eq!(projector.layout().len(), row.len());
    }

    #[test]
    fn test_identifier_binding_assigns_then_resolves() {
        let t = table(vec![
            MetadataRow::new("OBJECTS", "NUMBER", 0, "NUMBER", "h", "integer"),
            MetadataRow::new("OBJECTS", "ALPHA", 0, "RA", "h", "float"),
        ]);
        let binding = IdentifierBinding::new("NUMBER", "COADD_OBJECT_ID").keep_key_in("OBJECT_NUMBER");
        let projector = RecordProjector::new(&t, objects(), Constants::new(), Some(binding)).unwrap();
        assert_eq!(projector.layout(), &["COADD_OBJECT_ID", "OBJECT_NUMBER", "RA"]);
        assert_eq!(projector.source_fields(), vec!["NUMBER", "ALPHA"]);

        let mut ids = IdentifierCoordinator::new();
        ids.seed(vec![(5, 9000)]).unwrap();
        let rec = record(vec![("NUMBER", Value::Int(5)), ("ALPHA", Value::Float(34.5))]);
        let Projected::Row(row) = projector.project(&rec, &mut IdentifierAccess::Resolve(&ids)).unwrap() else {
            panic!("skipped")
        };
        assert_eq!(row.get("COADD_OBJECT_ID"), Some(&Value::Int(9000)));
        assert_eq!(row.get("OBJECT_NUMBER"), Some(&Value::Int(5)));
        assert!(row.get("NUMBER").is_none());

        let stranger = record(vec![("NUMBER", Value::Int(9999)), ("ALPHA", Value::Float(1.0))]);
        let err = projector
            .project(&stranger, &mut IdentifierAccess::Resolve(&ids))
            .unwrap_err();
        assert_eq!(err.natural_key(), Some(9999));
    }

    #[test]
    fn test_skip_unresolved_only_when_resolving() {
        let t = table(vec![MetadataRow::new("OBJECTS", "ALPHA", 0, "RA", "h", "float")]);
        let binding = IdentifierBinding::new("NUMBER", "COADD_OBJECT_ID").skip_unresolved(true);
        let projector = RecordProjector::new(&t, objects(), Constants::new(), Some(binding)).unwrap();

        let ids = IdentifierCoordinator::new();
        let rec = record(vec![("NUMBER", Value::Int(3)), ("ALPHA", Value::Float(1.0))]);
        assert_eq!(
            projector.project(&rec, &mut IdentifierAccess::Resolve(&ids)).unwrap(),
            Projected::Skipped { key: 3 }
        );
    }

    #[test]
    fn test_binding_column_clash_rejected() {
        let t = table(vec![MetadataRow::new("OBJECTS", "ALPHA", 0, "COADD_OBJECT_ID", "h", "float")]);
        let binding = IdentifierBinding::new("NUMBER", "COADD_OBJECT_ID");
        assert!(RecordProjector::new(&t, objects(), Constants::new(), Some(binding)).is_err());
    }

    #[test]
    fn test_into_values_follows_layout() {
        let t = table(vec![
            MetadataRow::new("OBJECTS", "A", 0, "A", "h", "integer"),
            MetadataRow::new("OBJECTS", "B", 0, "B", "h", "integer"),
        ]);
        let projector =
            RecordProjector::new(&t, objects(), constants_from([("REQNUM", Value::Int(7))]), None).unwrap();
        let rec = record(vec![("B", Value::Int(2)), ("A", Value::Int(1))]);
        let Projected::Row(row) = project(&projector, &rec).unwrap() else { panic!("skipped") };
        assert_eq!(
            row.into_values(projector.layout()),
            vec![Value::Int(1), Value::Int(2), Value::Int(7)]
        );
    }
}
