use serde::Serialize;

use super::{Datatype, ValueKind};
use crate::derived::DerivedFn;
use crate::error::MetadataError;

/// Resolved rule for one attribute within one section.
///
/// `columns[i]` receives element `positions[i]` of the source value. A scalar
/// attribute is a one-column entry at position 0.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MappingEntry {
    attribute: String,
    columns: Vec<String>,
    positions: Vec<usize>,
    kind: ValueKind,
    datatype: Datatype,
    #[serde(skip_serializing_if = "Option::is_none")]
    date_format: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    derivations: Vec<DerivedFn>,
}

impl MappingEntry {
    pub fn new(
        attribute: impl Into<String>,
        columns: Vec<String>,
        positions: Vec<usize>,
        kind: ValueKind,
        datatype: Datatype,
    ) -> Result<Self, MetadataError> {
        let attribute = attribute.into().trim().to_uppercase();
        if columns.len() != positions.len() {
            return Err(MetadataError::PositionMismatch {
                attribute,
                columns: columns.len(),
                positions: positions.len(),
            });
        }

        let mut entry = Self {
            attribute,
            columns: Vec::with_capacity(columns.len()),
            positions: Vec::with_capacity(positions.len()),
            kind,
            datatype,
            date_format: None,
            derivations: Vec::new(),
        };
        for (column, position) in columns.into_iter().zip(positions) {
            entry.push(column, position)?;
        }
        Ok(entry)
    }

    /// Single-column entry at position 0.
    pub fn scalar(
        attribute: impl Into<String>,
        column: impl Into<String>,
        kind: ValueKind,
        datatype: Datatype,
    ) -> Result<Self, MetadataError> {
        Self::new(attribute, vec![column.into()], vec![0], kind, datatype)
    }

    pub fn with_date_format(mut self, format: Option<String>) -> Self {
        self.date_format = format;
        self
    }

    /// Append one more column for this attribute.
    pub(crate) fn push(&mut self, column: String, position: usize) -> Result<(), MetadataError> {
        if self.positions.contains(&position) {
            return Err(MetadataError::DuplicatePosition {
                attribute: self.attribute.clone(),
                position,
            });
        }
        self.columns.push(column.trim().to_uppercase());
        self.positions.push(position);
        Ok(())
    }

    /// Collapse a single-column entry back to position 0.
    pub(crate) fn reset_position(&mut self) {
        if self.positions.len() == 1 {
            self.positions[0] = 0;
        }
    }

    /// Reorder columns by ascending position.
    pub(crate) fn sort_by_position(&mut self) {
        let mut pairs: Vec<(usize, String)> = self
            .positions
            .drain(..)
            .zip(self.columns.drain(..))
            .collect();
        pairs.sort_by_key(|(position, _)| *position);
        for (position, column) in pairs {
            self.positions.push(position);
            self.columns.push(column);
        }
    }

    /// Look up the derivation for every column. Returns the first column
    /// with nothing registered.
    pub(crate) fn bind_derivations(&mut self) -> Result<(), String> {
        if self.kind != ValueKind::Derived {
            return Ok(());
        }
        self.derivations = self
            .columns
            .iter()
            .map(|column| DerivedFn::for_column(column).ok_or_else(|| column.clone()))
            .collect::<Result<_, _>>()?;
        Ok(())
    }

    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn positions(&self) -> &[usize] {
        &self.positions
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn datatype(&self) -> Datatype {
        self.datatype
    }

    pub fn date_format(&self) -> Option<&str> {
        self.date_format.as_deref()
    }

    /// Derivation for each column; empty unless the entry is derived.
    pub fn derivations(&self) -> &[DerivedFn] {
        &self.derivations
    }

    /// Number of source elements the attribute must provide.
    pub fn required_len(&self) -> usize {
        self.positions.iter().max().map_or(0, |p| p + 1)
    }

    pub fn is_array(&self) -> bool {
        self.columns.len() > 1 || self.positions.iter().any(|p| *p > 0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let err = MappingEntry::new(
            "flux_aper",
            cols(&["FLUX_APER_1", "FLUX_APER_2"]),
            vec![0],
            ValueKind::Direct,
            Datatype::Float,
        )
        .unwrap_err();
        assert!(matches!(err, MetadataError::PositionMismatch { columns: 2, positions: 1, .. }));
    }

    #[test]
    fn test_duplicate_position_rejected() {
        let err = MappingEntry::new(
            "MAG",
            cols(&["MAG_1", "MAG_2"]),
            vec![1, 1],
            ValueKind::Direct,
            Datatype::Float,
        )
        .unwrap_err();
        assert!(matches!(err, MetadataError::DuplicatePosition { position: 1, .. }));
    }

    #[test]
    fn test_sort_by_position() {
        let mut entry = MappingEntry::new(
            "FLUX_APER",
            cols(&["C", "A", "B"]),
            vec![2, 0, 1],
            ValueKind::Direct,
            Datatype::Float,
        )
        .unwrap();
        entry.sort_by_position();
        assert_eq!(entry.columns(), &cols(&["A", "B", "C"])[..]);
        assert_eq!(entry.positions(), &[0, 1, 2]);
        assert_eq!(entry.required_len(), 3);
        assert!(entry.is_array());
    }

    #[test]
    fn test_bind_derivations() {
        let mut entry = MappingEntry::scalar("FILTER", "band", ValueKind::Derived, Datatype::Char).unwrap();
        entry.bind_derivations().unwrap();
        assert_eq!(entry.derivations(), &[DerivedFn::Band]);

        let mut unknown =
            MappingEntry::scalar("FILTER", "FILTNAME", ValueKind::Derived, Datatype::Char).unwrap();
        assert_eq!(unknown.bind_derivations().unwrap_err(), "FILTNAME");
    }
}
