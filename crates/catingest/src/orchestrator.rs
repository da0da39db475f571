//! Ingest orchestrator
//!
//! Drives one file at a time through resolve -> read -> guard -> project -> emit.
//! A run ingests the assigning file first, seals the identifier coordinator,
//! then ingests each dependent file against the finished identifier map,
//! counting failures instead of stopping on them.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::{FileFailure, IngestError, Phase, SinkError, StoreError};
use crate::guard::{FileIdentity, LoadState, ReingestionGuard};
use crate::identifiers::{IdentifierAccess, IdentifierCoordinator};
use crate::mapping::{MetadataResolver, ResolverOptions, Section};
use crate::progress::record_progress;
use crate::projector::{file_constants, Constants, IdentifierBinding, Projected, RecordProjector};
use crate::source::{short_name, ChunkedReader, Header, SourceOpener};
use crate::store::{CatalogStore, CountMode, FILENAME_COLUMN};
use crate::value::Value;

/// Records per chunked read when nothing else is configured.
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// One catalog file to ingest.
#[derive(Debug, Clone, PartialEq)]
pub struct FileSpec {
    pub path: PathBuf,
    pub catalog_type: String,
    /// Section holding the records; every other mapped section is a header
    pub section: Section,
    pub constants: Constants,
    pub count_mode: CountMode,
    pub binding: Option<IdentifierBinding>,
    /// Headerless file whose columns are named by mapping position
    pub positional: bool,
}

impl FileSpec {
    pub fn new(path: impl Into<PathBuf>, catalog_type: &str) -> Self {
        Self {
            path: path.into(),
            catalog_type: catalog_type.to_string(),
            section: Section::Index(1),
            constants: Constants::new(),
            count_mode: CountMode::Rows,
            binding: None,
            positional: false,
        }
    }

    pub fn with_section(mut self, section: Section) -> Self {
        self.section = section;
        self
    }

    pub fn with_constant(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.constants.insert(name.trim().to_uppercase(), value.into());
        self
    }

    pub fn with_count_mode(mut self, mode: CountMode) -> Self {
        self.count_mode = mode;
        self
    }

    pub fn with_binding(mut self, binding: IdentifierBinding) -> Self {
        self.binding = Some(binding);
        self
    }

    pub fn positional(mut self, positional: bool) -> Self {
        self.positional = positional;
        self
    }

    pub fn short_name(&self) -> String {
        short_name(&self.path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileRole {
    /// Mints identifiers for first-seen natural keys
    Assigning,
    /// Resolves natural keys against the finished identifier map
    Dependent,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FileOutcome {
    /// Already in the ledger with a matching count
    Skipped { rows: u64 },
    Committed { rows: u64, skipped_records: usize },
    Failed(FileFailure),
}

impl FileOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, FileOutcome::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileReport {
    pub file: String,
    pub catalog_type: String,
    pub role: FileRole,
    pub outcome: FileOutcome,
}

/// Files of a multi-file run, in execution order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunPlan {
    pub assigning: Option<FileSpec>,
    pub dependents: Vec<FileSpec>,
}

impl RunPlan {
    pub fn new(assigning: FileSpec) -> Self {
        Self {
            assigning: Some(assigning),
            dependents: Vec::new(),
        }
    }

    /// A plan without identifier assignment, e.g. a single standalone file.
    pub fn standalone(files: Vec<FileSpec>) -> Self {
        Self {
            assigning: None,
            dependents: files,
        }
    }

    pub fn with_dependent(mut self, spec: FileSpec) -> Self {
        self.dependents.push(spec);
        self
    }

    pub fn file_count(&self) -> usize {
        self.dependents.len() + usize::from(self.assigning.is_some())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub files: Vec<FileReport>,
    /// Natural keys in the identifier map at the end of the run
    pub identifiers: usize,
    /// Set when the run stopped before the dependent files
    pub aborted: Option<String>,
    pub cancelled: bool,
    /// Files never started because of an abort or cancellation
    pub not_started: Vec<String>,
    pub duration_seconds: f64,
}

impl RunSummary {
    pub fn failures(&self) -> impl Iterator<Item = &FileFailure> {
        self.files.iter().filter_map(|r| match &r.outcome {
            FileOutcome::Failed(failure) => Some(failure),
            _ => None,
        })
    }

    pub fn failure_count(&self) -> usize {
        self.failures().count()
    }

    pub fn rows_written(&self) -> u64 {
        self.files
            .iter()
            .map(|r| match r.outcome {
                FileOutcome::Committed { rows, .. } => rows,
                _ => 0,
            })
            .sum()
    }

    /// Process exit status: failed files, plus one for an aborted and one for
    /// a cancelled run, capped at 255.
    pub fn exit_code(&self) -> i32 {
        let code = self.failure_count() + usize::from(self.aborted.is_some()) + usize::from(self.cancelled);
        code.min(255) as i32
    }

    pub fn outcome(&self, file: &str) -> Option<&FileOutcome> {
        self.files.iter().find(|r| r.file == file).map(|r| &r.outcome)
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub batch_size: usize,
    pub guard: ReingestionGuard,
    pub resolver: ResolverOptions,
    pub show_progress: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            guard: ReingestionGuard::default(),
            resolver: ResolverOptions::default(),
            show_progress: false,
        }
    }
}

pub struct IngestPipeline {
    store: Arc<dyn CatalogStore>,
    opener: Arc<dyn SourceOpener>,
    options: PipelineOptions,
    cancel: CancellationToken,
}

/// Successful end states of a single file.
enum Completed {
    Skipped { rows: u64 },
    Committed { rows: u64, skipped_records: usize },
}

impl IngestPipeline {
    pub fn new(store: Arc<dyn CatalogStore>, opener: Arc<dyn SourceOpener>, options: PipelineOptions) -> Self {
        Self {
            store,
            opener,
            options,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Run every file of `plan`. Never fails as a whole; per-file failures
    /// are reported in the summary.
    pub async fn run(&self, plan: &RunPlan) -> RunSummary {
        let started = Instant::now();
        let run_id = Uuid::new_v4();
        let mut summary = RunSummary {
            run_id,
            files: Vec::with_capacity(plan.file_count()),
            identifiers: 0,
            aborted: None,
            cancelled: false,
            not_started: Vec::new(),
            duration_seconds: 0.0,
        };
        let mut ids = IdentifierCoordinator::new();

        info!(
            %run_id,
            files = plan.file_count(),
            assigning = ?plan.assigning.as_ref().map(FileSpec::short_name),
            "Starting ingest run"
        );

        // Step 1: assigning file, then close assignment for good
        if let Some(spec) = &plan.assigning {
            let report = self.ingest(run_id, spec, FileRole::Assigning, &mut ids).await;
            ids.seal();
            let failed = report.outcome.is_failed();
            summary.files.push(report);

            if self.cancel.is_cancelled() {
                summary.cancelled = true;
            } else if failed {
                summary.aborted = Some(format!("assigning file {} failed", spec.short_name()));
            } else if ids.is_empty() && !plan.dependents.is_empty() {
                summary.aborted = Some(format!(
                    "identifier map is empty after assigning file {}",
                    spec.short_name()
                ));
            }
        }

        // Step 2: dependent files, continuing past failures
        if summary.aborted.is_none() && !summary.cancelled {
            for (index, spec) in plan.dependents.iter().enumerate() {
                if self.cancel.is_cancelled() {
                    summary.cancelled = true;
                    summary
                        .not_started
                        .extend(plan.dependents[index..].iter().map(FileSpec::short_name));
                    break;
                }
                let report = self.ingest(run_id, spec, FileRole::Dependent, &mut ids).await;
                summary.files.push(report);
            }
        } else {
            summary
                .not_started
                .extend(plan.dependents.iter().map(FileSpec::short_name));
        }

        summary.identifiers = ids.len();
        summary.duration_seconds = started.elapsed().as_secs_f64();

        if let Some(reason) = &summary.aborted {
            error!(%run_id, reason = %reason, not_started = summary.not_started.len(), "Ingest run aborted");
        }
        info!(
            %run_id,
            files = summary.files.len(),
            failures = summary.failure_count(),
            rows = summary.rows_written(),
            identifiers = summary.identifiers,
            cancelled = summary.cancelled,
            duration_secs = summary.duration_seconds,
            "Ingest run finished"
        );
        summary
    }

    /// Ingest one file without identifier coordination.
    pub async fn ingest_standalone(&self, spec: &FileSpec) -> FileReport {
        let mut ids = IdentifierCoordinator::new();
        ids.seal();
        self.ingest(Uuid::new_v4(), spec, FileRole::Dependent, &mut ids).await
    }

    async fn ingest(
        &self,
        run_id: Uuid,
        spec: &FileSpec,
        role: FileRole,
        ids: &mut IdentifierCoordinator,
    ) -> FileReport {
        let file = spec.short_name();
        let span = info_span!(
            "ingest_file",
            file = %file,
            catalog_type = %spec.catalog_type,
            %run_id,
            role = ?role
        );

        let mut phase = Phase::Resolve;
        let result = self.ingest_file(spec, role, ids, &mut phase).instrument(span.clone()).await;

        let _entered = span.enter();
        let outcome = match result {
            Ok(Completed::Skipped { rows }) => {
                info!(rows, "Already ingested, skipping");
                FileOutcome::Skipped { rows }
            },
            Ok(Completed::Committed { rows, skipped_records }) => {
                info!(rows, skipped_records, "File committed");
                FileOutcome::Committed { rows, skipped_records }
            },
            Err(err) => {
                let failure = FileFailure::new(&file, phase, &err);
                error!(
                    phase = %failure.phase,
                    record_index = failure.record_index,
                    natural_key = failure.natural_key,
                    error = %err,
                    "File ingest failed"
                );
                FileOutcome::Failed(failure)
            },
        };

        FileReport {
            file,
            catalog_type: spec.catalog_type.clone(),
            role,
            outcome,
        }
    }

    async fn ingest_file(
        &self,
        spec: &FileSpec,
        role: FileRole,
        ids: &mut IdentifierCoordinator,
        phase: &mut Phase,
    ) -> Result<Completed, IngestError> {
        let store = &*self.store;
        let file = spec.short_name();

        // Resolve
        *phase = Phase::Resolve;
        let mut options = self.options.resolver.clone();
        if spec.positional {
            // positions are file columns, not array elements
            options.regroup_arrays = false;
        }
        let resolver = MetadataResolver::new(store, options);
        let mut mapping = resolver.resolve(&spec.catalog_type, Some(&spec.section)).await?;
        let columns = if spec.positional {
            Some(mapping.positional_columns(&spec.section)?)
        } else {
            None
        };
        let table = mapping.destination_table();

        // Open and count without a full read
        *phase = Phase::Read;
        let mut source = match &columns {
            Some(columns) => self.opener.open_positional(&spec.path, columns).await?,
            None => self.opener.open(&spec.path).await?,
        };
        let total = source.record_count(&spec.section).await?;

        // Guard
        *phase = Phase::Guard;
        let identity = FileIdentity {
            table,
            short_name: &file,
            count_mode: &spec.count_mode,
        };
        match self
            .options
            .guard
            .check_loaded(store, &identity, total as u64)
            .await
            .map_err(IngestError::Guard)?
        {
            LoadState::NotLoaded => {},
            LoadState::LoadedMatching { rows } => {
                if role == FileRole::Assigning {
                    self.seed_from_ledger(spec, table, &file, ids).await?;
                }
                return Ok(Completed::Skipped { rows });
            },
            LoadState::LoadedMismatched { existing, expected } => {
                return Err(IngestError::LoadedMismatched { existing, expected });
            },
        }

        // Header sections become file-level constants
        *phase = Phase::Read;
        let mut headers = BTreeMap::<Section, Header>::new();
        for (section, _) in mapping.sections().filter(|(s, _)| **s != spec.section) {
            headers.insert(section.clone(), source.header(section).await?);
        }

        *phase = Phase::Project;
        let mut caller = spec.constants.clone();
        caller
            .entry(FILENAME_COLUMN.to_string())
            .or_insert_with(|| Value::Text(file.clone()));
        let constants = file_constants(&mapping, &spec.section, &headers, &caller).map_err(IngestError::Header)?;

        *phase = Phase::Resolve;
        let projector = RecordProjector::new(&mapping, spec.section.clone(), constants, spec.binding.clone())?;
        let layout = projector.layout().to_vec();

        *phase = Phase::Project;
        let mut access = match role {
            FileRole::Assigning => {
                ids.reserve(store, total).await?;
                IdentifierAccess::Assign(ids)
            },
            FileRole::Dependent => IdentifierAccess::Resolve(&*ids),
        };

        debug!(
            table,
            records = total,
            columns = layout.len(),
            batch_size = self.options.batch_size,
            "Reading records"
        );

        let progress = record_progress(total as u64, &file, self.options.show_progress);
        let mut reader = ChunkedReader::new(
            source.as_mut(),
            spec.section.clone(),
            projector.source_fields(),
            total,
            self.options.batch_size,
        );
        let mut rows_written = 0u64;
        let mut skipped_records = 0usize;

        loop {
            if self.cancel.is_cancelled() {
                progress.abandon();
                warn!(committed = rows_written, "Cancelled, keeping committed batches");
                return Err(IngestError::Cancelled);
            }

            *phase = Phase::Read;
            let Some((first_record, records)) = reader.next_batch().await? else {
                break;
            };

            *phase = Phase::Project;
            let mut batch = Vec::with_capacity(records.len());
            for (offset, record) in records.iter().enumerate() {
                let record_index = first_record + offset;
                let row = match projector.project(record, &mut access) {
                    Ok(Projected::Row(row)) => row,
                    Ok(Projected::Skipped { key }) => {
                        debug!(record_index, key, "Skipping record with unresolved key");
                        skipped_records += 1;
                        continue;
                    },
                    Err(source) => return Err(IngestError::Projection { record_index, source }),
                };
                if row.len() != layout.len() {
                    return Err(IngestError::Emission {
                        first_record,
                        source: SinkError::ColumnMismatch {
                            row: record_index,
                            expected: layout.len(),
                            received: row.len(),
                        },
                    });
                }
                batch.push(row.into_values(&layout));
            }

            *phase = Phase::Emit;
            if !batch.is_empty() {
                let written = store
                    .emit(table, &layout, &batch)
                    .await
                    .map_err(|e| IngestError::Emission {
                        first_record,
                        source: e.into(),
                    })?;
                rows_written += written;
                debug!(first_record, rows = written, "Batch committed");
            }
            progress.inc(records.len() as u64);
        }

        progress.finish_and_clear();
        if skipped_records > 0 {
            warn!(skipped_records, "Records with unresolved natural keys were skipped");
        }
        Ok(Completed::Committed {
            rows: rows_written,
            skipped_records,
        })
    }

    /// Rebuild the identifier map from what an earlier run stored for the
    /// assigning file.
    async fn seed_from_ledger(
        &self,
        spec: &FileSpec,
        table: &str,
        file: &str,
        ids: &mut IdentifierCoordinator,
    ) -> Result<(), IngestError> {
        let Some(binding) = &spec.binding else {
            return Ok(());
        };
        let Some(key_column) = &binding.key_column else {
            warn!(
                file,
                "Assigning file skipped but its natural keys are not stored; dependent files cannot resolve"
            );
            return Ok(());
        };

        let pairs = self
            .options
            .guard
            .policy()
            .run("existing_identifiers", StoreError::is_transient, || {
                self.store
                    .existing_identifiers(table, file, key_column, &binding.id_column)
            })
            .await
            .map_err(IngestError::Guard)?;
        ids.seed(pairs)?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::memory::MemoryDatabase;
    use crate::source::{MemoryCatalog, MemoryOpener};
    use crate::store::MetadataRow;

    fn detection_rows() -> Vec<MetadataRow> {
        vec![
            MetadataRow::new("OBJECTS", "NUMBER", 0, "OBJECT_NUMBER", "direct", "int"),
            MetadataRow::new("OBJECTS", "ALPHA", 0, "RA", "direct", "float"),
            MetadataRow::new("PRIMARY", "FILENAME", 0, "FILENAME", "constant", "char"),
        ]
    }

    fn catalog(path: &str, keys: &[i64]) -> MemoryCatalog {
        MemoryCatalog::new(path).with_table(
            Section::named("OBJECTS"),
            vec!["NUMBER".into(), "ALPHA".into()],
            keys.iter().map(|k| vec![Value::Int(*k), Value::Float(*k as f64 / 10.0)]).collect(),
        )
    }

    fn pipeline(db: Arc<MemoryDatabase>, opener: MemoryOpener, batch_size: usize) -> IngestPipeline {
        let options = PipelineOptions {
            batch_size,
            ..PipelineOptions::default()
        };
        IngestPipeline::new(db, Arc::new(opener), options)
    }

    fn spec(path: &str) -> FileSpec {
        FileSpec::new(path, "coadd_cat")
            .with_section(Section::named("OBJECTS"))
            .with_binding(IdentifierBinding::new("NUMBER", "COADD_OBJECT_ID"))
    }

    #[tokio::test]
    async fn test_standalone_file_commits_in_batches() {
        let db = Arc::new(MemoryDatabase::new().with_mapping("coadd_cat", "coadd_object", detection_rows()));
        let opener = MemoryOpener::new().with(catalog("tile_det.cat", &[1, 2, 3, 4, 5]));
        let pipeline = pipeline(db.clone(), opener, 2);

        let spec = FileSpec::new("tile_det.cat", "coadd_cat").with_section(Section::named("OBJECTS"));
        let report = pipeline.ingest_standalone(&spec).await;

        assert_eq!(
            report.outcome,
            FileOutcome::Committed {
                rows: 5,
                skipped_records: 0
            }
        );
        assert_eq!(db.emit_calls(), 3);
        let rows = db.rows("coadd_object");
        assert_eq!(rows[0].get("FILENAME"), Some(&Value::from("tile_det.cat")));
        assert_eq!(rows[4].get("OBJECT_NUMBER"), Some(&Value::Int(5)));
    }

    #[tokio::test]
    async fn test_assigning_then_dependent() {
        let db = Arc::new(
            MemoryDatabase::new()
                .with_mapping("coadd_cat", "coadd_object", detection_rows())
                .with_sequence_start(1000),
        );
        let opener = MemoryOpener::new()
            .with(catalog("det.cat", &[1, 2, 3]))
            .with(catalog("r.cat", &[3, 2, 1]));
        let pipeline = pipeline(db.clone(), opener, 10);

        let plan = RunPlan::new(spec("det.cat")).with_dependent(spec("r.cat"));
        let summary = pipeline.run(&plan).await;

        assert_eq!(summary.exit_code(), 0);
        assert_eq!(summary.identifiers, 3);
        let rows = db.rows("coadd_object");
        let det: Vec<_> = rows[..3].iter().map(|r| r.get("COADD_OBJECT_ID").cloned()).collect();
        let band: Vec<_> = rows[3..].iter().map(|r| r.get("COADD_OBJECT_ID").cloned()).collect();
        assert_eq!(det, vec![Some(Value::Int(1000)), Some(Value::Int(1001)), Some(Value::Int(1002))]);
        assert_eq!(band, vec![Some(Value::Int(1002)), Some(Value::Int(1001)), Some(Value::Int(1000))]);
    }

    #[tokio::test]
    async fn test_failed_assigning_file_aborts_run() {
        let db = Arc::new(MemoryDatabase::new().with_mapping("coadd_cat", "coadd_object", detection_rows()));
        let opener = MemoryOpener::new().with(catalog("r.cat", &[1]));
        let pipeline = pipeline(db, opener, 10);

        let plan = RunPlan::new(spec("missing.cat")).with_dependent(spec("r.cat"));
        let summary = pipeline.run(&plan).await;

        assert_eq!(summary.failure_count(), 1);
        assert!(summary.aborted.is_some());
        assert_eq!(summary.not_started, vec!["r.cat".to_string()]);
        assert_eq!(summary.exit_code(), 2);
        let Some(FileOutcome::Failed(failure)) = summary.outcome("missing.cat") else {
            panic!("expected failure");
        };
        assert_eq!(failure.phase, Phase::Read);
    }

    #[tokio::test]
    async fn test_empty_identifier_map_aborts_dependents() {
        let db = Arc::new(MemoryDatabase::new().with_mapping("coadd_cat", "coadd_object", detection_rows()));
        let opener = MemoryOpener::new()
            .with(catalog("det.cat", &[]))
            .with(catalog("r.cat", &[1]));
        let pipeline = pipeline(db, opener, 10);

        let summary = pipeline.run(&RunPlan::new(spec("det.cat")).with_dependent(spec("r.cat"))).await;
        assert_eq!(summary.failure_count(), 0);
        assert!(summary.aborted.unwrap().contains("empty"));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let db = Arc::new(MemoryDatabase::new().with_mapping("coadd_cat", "coadd_object", detection_rows()));
        let opener = MemoryOpener::new().with(catalog("det.cat", &[1, 2]));
        let pipeline = pipeline(db.clone(), opener, 1);
        pipeline.cancellation_token().cancel();

        let summary = pipeline.run(&RunPlan::new(spec("det.cat"))).await;
        assert!(summary.cancelled);
        let Some(FileOutcome::Failed(failure)) = summary.outcome("det.cat") else {
            panic!("expected failure");
        };
        assert!(failure.message.contains("cancelled"));
        assert_eq!(db.row_count("coadd_object"), 0);
    }

    #[tokio::test]
    async fn test_emission_failure_keeps_committed_batches() {
        let db = Arc::new(MemoryDatabase::new().with_mapping("coadd_cat", "coadd_object", detection_rows()));
        db.fail_emit_call(2);
        let opener = MemoryOpener::new().with(catalog("det.cat", &[1, 2, 3, 4]));
        let pipeline = pipeline(db.clone(), opener, 2);

        let spec = FileSpec::new("det.cat", "coadd_cat").with_section(Section::named("OBJECTS"));
        let report = pipeline.ingest_standalone(&spec).await;

        let FileOutcome::Failed(failure) = report.outcome else {
            panic!("expected failure");
        };
        assert_eq!(failure.phase, Phase::Emit);
        assert_eq!(failure.record_index, Some(2));
        assert_eq!(db.row_count("coadd_object"), 2);
    }

    #[test]
    fn test_exit_code_is_capped() {
        let failure = FileFailure {
            file: "x".into(),
            phase: Phase::Project,
            record_index: None,
            natural_key: None,
            message: "boom".into(),
        };
        let summary = RunSummary {
            run_id: Uuid::nil(),
            files: (0..300)
                .map(|i| FileReport {
                    file: format!("f{i}"),
                    catalog_type: "t".into(),
                    role: FileRole::Dependent,
                    outcome: FileOutcome::Failed(failure.clone()),
                })
                .collect(),
            identifiers: 0,
            aborted: None,
            cancelled: false,
            not_started: Vec::new(),
            duration_seconds: 0.0,
        };
        assert_eq!(summary.exit_code(), 255);
    }
}
