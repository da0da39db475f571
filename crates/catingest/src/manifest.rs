//! Run manifests
//!
//! A JSON document naming the assigning file and the groups of dependent
//! files of one run. A group lists its files inline or points at a list file
//! with one `path[,band]` per line; the band becomes the `BAND` constant.
//!
//! ```json
//! {
//!   "id_column": "COADD_OBJECT_ID",
//!   "constants": { "TILENAME": "DES0215-0458" },
//!   "assigning": {
//!     "path": "DES0215-0458_det_cat.csv",
//!     "catalog_type": "coadd_det_cat",
//!     "section": "OBJECTS",
//!     "key_column": "OBJECT_NUMBER"
//!   },
//!   "dependents": [
//!     { "catalog_type": "coadd_cat", "section": "OBJECTS", "list": "bands.list" },
//!     { "catalog_type": "coadd_mangle_csv", "section": "CSV", "positional": true,
//!       "files": ["DES0215-0458_molys_weight.csv"] }
//!   ]
//! }
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::mapping::Section;
use crate::orchestrator::{FileSpec, RunPlan};
use crate::projector::IdentifierBinding;
use crate::store::CountMode;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunManifest {
    /// Natural-key field; the configured default when absent
    #[serde(default)]
    pub key_field: Option<String>,
    pub id_column: String,
    /// Constants applied to every file of the run
    #[serde(default)]
    pub constants: BTreeMap<String, serde_json::Value>,
    pub assigning: Option<AssigningEntry>,
    #[serde(default)]
    pub dependents: Vec<DependentGroup>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssigningEntry {
    pub path: PathBuf,
    pub catalog_type: String,
    #[serde(default)]
    pub section: Option<String>,
    /// Destination column that keeps the natural key
    #[serde(default)]
    pub key_column: Option<String>,
    /// Headerless CSV named by mapping position
    #[serde(default)]
    pub positional: bool,
    #[serde(default)]
    pub constants: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DependentGroup {
    pub catalog_type: String,
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default)]
    pub files: Vec<PathBuf>,
    /// File with one `path[,band]` per line
    #[serde(default)]
    pub list: Option<PathBuf>,
    #[serde(default)]
    pub count_mode: Option<CountMode>,
    #[serde(default)]
    pub key_column: Option<String>,
    /// Skip records whose natural key was never assigned
    #[serde(default)]
    pub skip_unresolved: bool,
    /// Ingest without identifier resolution
    #[serde(default)]
    pub unbound: bool,
    #[serde(default)]
    pub positional: bool,
    #[serde(default)]
    pub constants: BTreeMap<String, serde_json::Value>,
}

/// One line of a list file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedFile {
    pub path: PathBuf,
    pub band: Option<String>,
}

/// Parse list-file content: `path[,band]` per line, blank lines and `#`
/// comments ignored.
pub fn parse_file_list(content: &str) -> Vec<ListedFile> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| {
            let mut parts = line.splitn(2, ',').map(str::trim);
            let path = PathBuf::from(parts.next().unwrap_or_default());
            let band = parts.next().filter(|b| !b.is_empty()).map(str::to_string);
            ListedFile { path, band }
        })
        .collect()
}

fn json_constant(value: &serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Int(i64::from(*b)),
        serde_json::Value::Number(n) => n
            .as_i64()
            .map(Value::Int)
            .or_else(|| n.as_f64().map(Value::Float))
            .unwrap_or(Value::Null),
        serde_json::Value::String(s) => Value::Text(s.clone()),
        other => Value::Text(other.to_string()),
    }
}

fn section_or_default(section: Option<&str>) -> Section {
    section.map(Section::named).unwrap_or(Section::Index(1))
}

fn resolve_path(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

impl RunManifest {
    pub fn parse(content: &str) -> Result<Self> {
        let manifest: Self = serde_json::from_str(content).context("Failed to parse run manifest")?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read run manifest {}", path.display()))?;
        Self::parse(&content)
    }

    fn validate(&self) -> Result<()> {
        if self.id_column.trim().is_empty() {
            anyhow::bail!("Run manifest: id_column cannot be empty");
        }
        for group in &self.dependents {
            if group.files.is_empty() && group.list.is_none() {
                anyhow::bail!(
                    "Run manifest: dependent group '{}' names neither files nor a list",
                    group.catalog_type
                );
            }
        }
        Ok(())
    }

    /// Expand into a run plan. Relative paths, including those inside list
    /// files, are taken relative to `base_dir`.
    pub async fn to_plan(&self, base_dir: &Path, default_key_field: &str) -> Result<RunPlan> {
        let key_field = self.key_field.as_deref().unwrap_or(default_key_field);
        let binding = IdentifierBinding::new(key_field, &self.id_column);

        let mut plan = RunPlan::default();

        if let Some(entry) = &self.assigning {
            let mut binding = binding.clone();
            if let Some(column) = &entry.key_column {
                binding = binding.keep_key_in(column);
            }
            let spec = self.file_spec(
                resolve_path(base_dir, &entry.path),
                &entry.catalog_type,
                entry.section.as_deref(),
                &entry.constants,
            )
            .positional(entry.positional);
            plan.assigning = Some(spec.with_binding(binding));
        }

        for group in &self.dependents {
            let mut listed: Vec<ListedFile> = group
                .files
                .iter()
                .map(|p| ListedFile {
                    path: p.clone(),
                    band: None,
                })
                .collect();
            if let Some(list) = &group.list {
                let list_path = resolve_path(base_dir, list);
                let content = tokio::fs::read_to_string(&list_path)
                    .await
                    .with_context(|| format!("Failed to read file list {}", list_path.display()))?;
                listed.extend(parse_file_list(&content));
            }

            for file in listed {
                let mut spec = self.file_spec(
                    resolve_path(base_dir, &file.path),
                    &group.catalog_type,
                    group.section.as_deref(),
                    &group.constants,
                )
                .positional(group.positional);
                if let Some(band) = &file.band {
                    spec = spec.with_constant("BAND", band.as_str());
                }
                if let Some(mode) = &group.count_mode {
                    spec = spec.with_count_mode(mode.clone());
                }
                if !group.unbound {
                    let mut binding = binding.clone().skip_unresolved(group.skip_unresolved);
                    if let Some(column) = &group.key_column {
                        binding = binding.keep_key_in(column);
                    }
                    spec = spec.with_binding(binding);
                }
                plan.dependents.push(spec);
            }
        }

        Ok(plan)
    }

    fn file_spec(
        &self,
        path: PathBuf,
        catalog_type: &str,
        section: Option<&str>,
        constants: &BTreeMap<String, serde_json::Value>,
    ) -> FileSpec {
        let mut spec = FileSpec::new(path, catalog_type).with_section(section_or_default(section));
        for (name, value) in self.constants.iter().chain(constants) {
            spec = spec.with_constant(name, json_constant(value));
        }
        spec
    }
}
