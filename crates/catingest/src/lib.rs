//! Catalog Ingest Library
//!
//! Metadata-driven loading of astronomical catalog files into relational
//! tables. A per-catalog-type mapping, stored in the database, says which
//! source field lands in which destination column; an identifier coordinator
//! gives every object one surrogate identifier shared by all the files of a
//! run.
//!
//! # Layout
//!
//! - [`mapping`]: metadata rows to a validated [`ColumnMappingTable`]
//! - [`projector`]: source records to destination rows
//! - [`identifiers`]: reserve, assign and resolve surrogate identifiers
//! - [`guard`]: skip files that are already ingested, refuse divergent ones
//! - [`orchestrator`]: per-file state machine and multi-file runs
//! - [`source`]: CSV, VOTable and in-memory catalog readers
//! - [`store`], [`db`], [`memory`]: collaborator traits and their Postgres
//!   and in-memory implementations
//!
//! # Example
//!
//! ```no_run
//! use catingest::{FileSpec, IngestPipeline, MemoryDatabase, PipelineOptions, RunPlan};
//! use catingest::source::FileSourceOpener;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = Arc::new(MemoryDatabase::new());
//!     let pipeline = IngestPipeline::new(store, Arc::new(FileSourceOpener), PipelineOptions::default());
//!
//!     let plan = RunPlan::standalone(vec![FileSpec::new("tile_cat.csv", "coadd_cat")]);
//!     let summary = pipeline.run(&plan).await;
//!     std::process::exit(summary.exit_code());
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod config;
pub mod db;
pub mod derived;
pub mod error;
pub mod guard;
pub mod identifiers;
pub mod manifest;
pub mod mapping;
pub mod memory;
pub mod orchestrator;
pub mod progress;
pub mod projector;
pub mod source;
pub mod store;
pub mod value;

pub use config::IngestConfig;
pub use error::{FileFailure, IngestError, Phase};
pub use guard::{GuardMode, LoadState, ReingestionGuard};
pub use identifiers::{IdentifierAccess, IdentifierCoordinator};
pub use mapping::{ColumnMappingTable, MappingEntry, MetadataResolver, Section};
pub use memory::MemoryDatabase;
pub use orchestrator::{FileOutcome, FileSpec, IngestPipeline, PipelineOptions, RunPlan, RunSummary};
pub use projector::{DestinationRow, IdentifierBinding, RecordProjector};
pub use store::{CatalogStore, CountMode};
pub use value::Value;
