//! Column mapping: how source attributes become destination columns
//!
//! The [`MetadataResolver`] turns loosely-typed metadata rows into a validated
//! [`ColumnMappingTable`]. Nothing downstream re-checks nulls or strings; an
//! invalid mapping never gets past construction.

mod entry;
mod resolver;
mod table;

pub use entry::MappingEntry;
pub use resolver::{build_table, MetadataResolver, ResolverOptions};
pub use table::ColumnMappingTable;

use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A logical group of source fields: one table extension or one header.
///
/// `PRIMARY` and `0` are the same section. Names compare case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Section {
    Index(u32),
    Named(String),
}

impl Section {
    pub const PRIMARY: Section = Section::Index(0);

    /// `PRIMARY` or an integer selects by index; anything else by name.
    pub fn named(name: &str) -> Self {
        let trimmed = name.trim();
        if trimmed.eq_ignore_ascii_case("PRIMARY") {
            return Section::PRIMARY;
        }
        match trimmed.parse::<u32>() {
            Ok(index) => Section::Index(index),
            Err(_) => Section::Named(trimmed.to_uppercase()),
        }
    }
}

impl FromStr for Section {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Section::named(s))
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Section::Index(0) => f.write_str("PRIMARY"),
            Section::Index(i) => write!(f, "{}", i),
            Section::Named(name) => f.write_str(name),
        }
    }
}

impl Serialize for Section {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Where a destination value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    /// Copied from a source column or header keyword
    Direct,
    /// Computed by a registered function from the source value
    Derived,
    /// Supplied by the caller for the whole file
    Constant,
}

impl ValueKind {
    /// Accepts the long names and the single-letter codes used in the
    /// metadata tables (`h`, `c`, `k`).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "direct" | "h" => Some(ValueKind::Direct),
            "derived" | "c" => Some(ValueKind::Derived),
            "constant" | "k" => Some(ValueKind::Constant),
            _ => None,
        }
    }
}

/// Declared type of a destination column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Datatype {
    Integer,
    Float,
    Decimal,
    Char,
    Date,
}

impl Datatype {
    /// Only the first word counts, so loader spellings such as
    /// `integer external` are accepted.
    pub fn parse(s: &str) -> Option<Self> {
        let word = s.split_whitespace().next()?.to_lowercase();
        match word.as_str() {
            "int" | "integer" | "bigint" => Some(Datatype::Integer),
            "float" | "real" => Some(Datatype::Float),
            "double" | "decimal" | "number" | "numeric" => Some(Datatype::Decimal),
            "char" | "varchar" | "varchar2" | "string" | "text" => Some(Datatype::Char),
            "date" | "timestamp" => Some(Datatype::Date),
            _ => None,
        }
    }
}

impl fmt::Display for Datatype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Datatype::Integer => "integer",
            Datatype::Float => "float",
            Datatype::Decimal => "decimal",
            Datatype::Char => "char",
            Datatype::Date => "date",
        };
        f.write_str(name)
    }
}
