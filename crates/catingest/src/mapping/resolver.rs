use tracing::{debug, info};

use super::{ColumnMappingTable, Datatype, MappingEntry, Section, ValueKind};
use crate::error::MetadataError;
use crate::store::{MetadataRow, MetadataStore};

/// Knobs for turning metadata rows into a mapping table.
#[derive(Debug, Clone)]
pub struct ResolverOptions {
    /// Section used when a row has none; `None` makes a null section an error
    pub default_section: Option<Section>,
    /// Fold `NAME_<n>` attributes of the data section into arrays
    pub regroup_arrays: bool,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            default_section: None,
            regroup_arrays: true,
        }
    }
}

/// Loads mapping metadata and builds validated [`ColumnMappingTable`]s.
pub struct MetadataResolver<'a, M: MetadataStore + ?Sized> {
    store: &'a M,
    options: ResolverOptions,
}

impl<'a, M: MetadataStore + ?Sized> MetadataResolver<'a, M> {
    pub fn new(store: &'a M, options: ResolverOptions) -> Self {
        Self { store, options }
    }

    /// Resolve the mapping for `catalog_type`.
    ///
    /// When `data_section` is given it must be mapped, and it is the section
    /// the array regrouping applies to.
    pub async fn resolve(
        &self,
        catalog_type: &str,
        data_section: Option<&Section>,
    ) -> Result<ColumnMappingTable, MetadataError> {
        let rows = self.store.mapping_rows(catalog_type).await?;
        if rows.is_empty() {
            return Err(MetadataError::NoRows {
                catalog_type: catalog_type.to_string(),
            });
        }

        let destination = self
            .store
            .destination_table(catalog_type)
            .await?
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| MetadataError::MissingDestinationTable {
                catalog_type: catalog_type.to_string(),
            })?;

        let table = build_table(catalog_type, &destination, rows, data_section, &self.options)?;
        info!(
            catalog_type,
            destination_table = %table.destination_table(),
            sections = table.sections().count(),
            entries = table.entry_count(),
            columns = table.destination_columns().len(),
            "Resolved column mapping"
        );
        Ok(table)
    }
}

/// A metadata row after defaults are applied and every field is checked.
struct ResolvedRow {
    section: Section,
    attribute: String,
    position: usize,
    column: String,
    kind: ValueKind,
    datatype: Datatype,
    date_format: Option<String>,
}

/// Build a mapping table from raw rows. Rows may arrive in any order; they
/// are sorted by section, attribute and position first.
pub fn build_table(
    catalog_type: &str,
    destination_table: &str,
    rows: Vec<MetadataRow>,
    data_section: Option<&Section>,
    options: &ResolverOptions,
) -> Result<ColumnMappingTable, MetadataError> {
    if rows.is_empty() {
        return Err(MetadataError::NoRows {
            catalog_type: catalog_type.to_string(),
        });
    }

    let mut resolved = rows
        .into_iter()
        .map(|row| resolve_row(catalog_type, row, options))
        .collect::<Result<Vec<_>, _>>()?;
    resolved.sort_by(|a, b| {
        (&a.section, &a.attribute, a.position).cmp(&(&b.section, &b.attribute, b.position))
    });

    let mut table = ColumnMappingTable::new(catalog_type, destination_table.trim().to_lowercase());
    for row in resolved {
        let entry = MappingEntry::new(row.attribute, vec![row.column], vec![row.position], row.kind, row.datatype)?
            .with_date_format(row.date_format);
        table.insert(row.section, entry)?;
    }

    if let Some(section) = data_section {
        if options.regroup_arrays {
            table.regroup_arrays(section)?;
        }
        if !table.has_section(section) {
            return Err(MetadataError::MissingDataSection {
                catalog_type: catalog_type.to_string(),
                section: section.to_string(),
            });
        }
    }

    table.check_unique_columns()?;

    for entry in table.entries_mut() {
        entry
            .bind_derivations()
            .map_err(|column| MetadataError::UnknownDerivation {
                catalog_type: catalog_type.to_string(),
                column,
            })?;
    }

    debug!(catalog_type, entries = table.entry_count(), "Built column mapping table");
    Ok(table)
}

fn resolve_row(
    catalog_type: &str,
    row: MetadataRow,
    options: &ResolverOptions,
) -> Result<ResolvedRow, MetadataError> {
    let column = non_blank(row.column).map(|c| c.to_uppercase());
    let attribute = non_blank(row.attribute)
        .map(|a| a.to_uppercase())
        .or_else(|| column.clone());

    let Some(column) = column else {
        return Err(MetadataError::MissingColumnName {
            catalog_type: catalog_type.to_string(),
            attribute: attribute.unwrap_or_default(),
        });
    };
    let attribute = attribute.unwrap_or_else(|| column.clone());

    let section = match non_blank(row.section) {
        Some(s) => Section::named(&s),
        None => options
            .default_section
            .clone()
            .ok_or_else(|| MetadataError::MissingSection {
                catalog_type: catalog_type.to_string(),
                attribute: attribute.clone(),
            })?,
    };

    let position = match row.position {
        None => 0,
        Some(p) => usize::try_from(p).map_err(|_| MetadataError::NegativePosition {
            catalog_type: catalog_type.to_string(),
            attribute: attribute.clone(),
            position: p,
        })?,
    };

    let kind = match non_blank(row.kind) {
        None => ValueKind::Direct,
        Some(k) => ValueKind::parse(&k).ok_or_else(|| MetadataError::UnknownValueKind {
            catalog_type: catalog_type.to_string(),
            attribute: attribute.clone(),
            kind: k,
        })?,
    };

    let datatype = match non_blank(row.datatype) {
        None => Datatype::Char,
        Some(d) => Datatype::parse(&d).ok_or_else(|| MetadataError::UnknownDatatype {
            catalog_type: catalog_type.to_string(),
            attribute: attribute.clone(),
            datatype: d,
        })?,
    };

    Ok(ResolvedRow {
        section,
        attribute,
        position,
        column,
        kind,
        datatype,
        date_format: non_blank(row.date_format),
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
