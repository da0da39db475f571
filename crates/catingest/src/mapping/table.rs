use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use super::{MappingEntry, Section, ValueKind};
use crate::error::MetadataError;

/// Section -> ordered mapping entries for one catalog type.
///
/// Immutable once the resolver hands it out.
#[derive(Debug, Clone, Serialize)]
pub struct ColumnMappingTable {
    catalog_type: String,
    destination_table: String,
    sections: BTreeMap<Section, Vec<MappingEntry>>,
}

impl ColumnMappingTable {
    pub(crate) fn new(catalog_type: impl Into<String>, destination_table: impl Into<String>) -> Self {
        Self {
            catalog_type: catalog_type.into(),
            destination_table: destination_table.into(),
            sections: BTreeMap::new(),
        }
    }

    /// Add one column of an attribute, merging into an existing entry for the
    /// same attribute rather than replacing it.
    pub(crate) fn insert(
        &mut self,
        section: Section,
        entry: MappingEntry,
    ) -> Result<(), MetadataError> {
        let entries = self.sections.entry(section).or_default();
        match entries.iter_mut().find(|e| e.attribute() == entry.attribute()) {
            Some(existing) => {
                if existing.kind() != entry.kind() || existing.datatype() != entry.datatype() {
                    return Err(MetadataError::InconsistentArray {
                        catalog_type: self.catalog_type.clone(),
                        attribute: entry.attribute().to_string(),
                    });
                }
                for (column, position) in entry.columns().iter().zip(entry.positions()) {
                    existing.push(column.clone(), *position)?;
                }
                existing.sort_by_position();
            },
            None => entries.push(entry),
        }
        Ok(())
    }

    /// Fold implicitly indexed single-column attributes (`FLUX_APER_1`,
    /// `FLUX_APER_2`, ...) in `section` into one array entry per base name,
    /// at position `suffix - 1`. Returns how many entries were folded.
    pub(crate) fn regroup_arrays(&mut self, section: &Section) -> Result<usize, MetadataError> {
        // implicit 1-based array index, e.g. FLUX_APER_3
        let pattern = Regex::new(r"^(.*)_(\d+)$")?;
        let Some(entries) = self.sections.remove(section) else {
            return Ok(0);
        };

        let mut regrouped = Self::new(self.catalog_type.clone(), self.destination_table.clone());
        let mut folded = 0;
        for entry in entries {
            let indexed = (entry.kind() == ValueKind::Direct && entry.columns().len() == 1)
                .then(|| pattern.captures(entry.attribute()))
                .flatten()
                .and_then(|caps| {
                    let base = caps.get(1)?.as_str().to_string();
                    let suffix: usize = caps.get(2)?.as_str().parse().ok()?;
                    (suffix > 0 && !base.is_empty()).then_some((base, suffix - 1))
                });

            if let Some((base, position)) = indexed {
                let column = entry.columns()[0].clone();
                let mut array = MappingEntry::new(
                    base,
                    vec![column],
                    vec![position],
                    entry.kind(),
                    entry.datatype(),
                )?
                .with_date_format(entry.date_format().map(str::to_string));
                array.sort_by_position();
                regrouped.insert(section.clone(), array)?;
                folded += 1;
            } else {
                regrouped.insert(section.clone(), entry)?;
            }
        }

        let entries = regrouped.sections.remove(section).unwrap_or_default();
        self.sections.insert(section.clone(), entries);
        if folded > 0 {
            debug!(
                catalog_type = %self.catalog_type,
                section = %section,
                folded,
                "Regrouped indexed attributes into arrays"
            );
        }
        Ok(folded)
    }

    /// Column names of a headerless file, in file order.
    ///
    /// Each source-reading entry of `section` names the file column at its
    /// position, and becomes a scalar entry. Gaps get placeholder names.
    pub fn positional_columns(&mut self, section: &Section) -> Result<Vec<String>, MetadataError> {
        let catalog_type = self.catalog_type.clone();
        let entries = self
            .sections
            .get_mut(section)
            .ok_or_else(|| MetadataError::MissingDataSection {
                catalog_type: catalog_type.clone(),
                section: section.to_string(),
            })?;

        let mut names: Vec<Option<String>> = Vec::new();
        for entry in entries.iter_mut().filter(|e| e.kind() != ValueKind::Constant) {
            let &[position] = entry.positions() else {
                return Err(MetadataError::PositionalArray {
                    catalog_type,
                    attribute: entry.attribute().to_string(),
                });
            };
            if names.len() <= position {
                names.resize(position + 1, None);
            }
            if names[position].is_some() {
                return Err(MetadataError::DuplicatePosition {
                    attribute: entry.attribute().to_string(),
                    position,
                });
            }
            names[position] = Some(entry.attribute().to_string());
            entry.reset_position();
        }

        Ok(names
            .into_iter()
            .enumerate()
            .map(|(index, name)| name.unwrap_or_else(|| format!("COLUMN_{}", index)))
            .collect())
    }

    /// Reject two attributes writing the same destination column.
    pub(crate) fn check_unique_columns(&self) -> Result<(), MetadataError> {
        let mut owners: HashMap<&str, String> = HashMap::new();
        for (section, entries) in &self.sections {
            for entry in entries {
                let owner = format!("{}.{}", section, entry.attribute());
                for column in entry.columns() {
                    if let Some(first) = owners.insert(column, owner.clone()) {
                        return Err(MetadataError::DuplicateColumn {
                            catalog_type: self.catalog_type.clone(),
                            column: column.clone(),
                            first,
                            second: owner,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    pub(crate) fn entries_mut(&mut self) -> impl Iterator<Item = &mut MappingEntry> {
        self.sections.values_mut().flatten()
    }

    pub fn catalog_type(&self) -> &str {
        &self.catalog_type
    }

    pub fn destination_table(&self) -> &str {
        &self.destination_table
    }

    /// Entries of `section`, empty when the section is not mapped.
    pub fn section(&self, section: &Section) -> &[MappingEntry] {
        self.sections.get(section).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn sections(&self) -> impl Iterator<Item = (&Section, &[MappingEntry])> {
        self.sections.iter().map(|(s, e)| (s, e.as_slice()))
    }

    pub fn has_section(&self, section: &Section) -> bool {
        self.sections.get(section).is_some_and(|e| !e.is_empty())
    }

    pub fn entry(&self, section: &Section, attribute: &str) -> Option<&MappingEntry> {
        let attribute = attribute.trim().to_uppercase();
        self.section(section).iter().find(|e| e.attribute() == attribute)
    }

    pub fn entry_count(&self) -> usize {
        self.sections.values().map(Vec::len).sum()
    }

    /// Every destination column, in section, entry and position order.
    pub fn destination_columns(&self) -> Vec<String> {
        self.sections
            .values()
            .flatten()
            .flat_map(|e| e.columns().iter().cloned())
            .collect()
    }
}
