//! Catalog Ingest - metadata-driven catalog loader

use anyhow::{Context, Result};
use catingest::db::{create_pool, PgCatalogStore};
use catingest::manifest::RunManifest;
use catingest::mapping::{MetadataResolver, Section};
use catingest::orchestrator::{FileOutcome, RunPlan};
use catingest::source::FileSourceOpener;
use catingest::store::{CatalogStore, MetadataStore};
use catingest::{GuardMode, IngestConfig, IngestPipeline, MemoryDatabase, RunSummary, Value};
use catingest_common::logging::{LogConfig, LogFormat, LogLevel};
use catingest_common::init_logging;
use clap::{Parser, Subcommand};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "catingest")]
#[command(author, version, about = "Metadata-driven astronomical catalog ingest")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log line format (text or json)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    /// Records per chunked read
    #[arg(long, global = true)]
    batch_size: Option<usize>,

    /// Reingestion check: enforce or assume_not_loaded
    #[arg(long, global = true)]
    guard_mode: Option<GuardMode>,

    /// Hide progress bars
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Database holding the mapping metadata and destination tables
    #[arg(long, global = true, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest an assigning file and its dependent files from a run manifest
    Run {
        /// Run manifest (JSON)
        #[arg(short, long, env = "CATINGEST_MANIFEST")]
        manifest: PathBuf,

        /// Write to an in-memory database instead of the real tables
        #[arg(long)]
        dry_run: bool,
    },

    /// Ingest a single file without identifier coordination
    File {
        /// Catalog type (filetype) whose mapping to use
        #[arg(short = 't', long = "type")]
        catalog_type: String,

        /// Catalog file
        #[arg(short, long)]
        path: PathBuf,

        /// Data section (PRIMARY, an index, or a table name)
        #[arg(short, long, default_value = "1")]
        section: String,

        /// File-level constant, repeatable
        #[arg(short = 'c', long = "const", value_parser = parse_constant)]
        constants: Vec<(String, String)>,

        /// Headerless CSV whose columns follow the mapping positions
        #[arg(long)]
        positional: bool,

        /// Write to an in-memory database instead of the real tables
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the resolved column mapping of a catalog type as JSON
    Mapping {
        #[arg(short = 't', long = "type")]
        catalog_type: String,

        /// Data section to validate and regroup arrays in
        #[arg(short, long)]
        section: Option<String>,
    },
}

fn parse_constant(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", raw))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("empty constant name in '{}'", raw));
    }
    Ok((name.to_uppercase(), value.trim().to_string()))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut log_config = LogConfig::builder()
        .level(if cli.verbose { LogLevel::Debug } else { LogLevel::Info })
        .log_file_prefix("catingest")
        .build();
    if let Some(format) = cli.log_format {
        log_config.format = format;
    }

    // Environment variables take precedence
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);
    let _guard = match init_logging(&log_config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: logging disabled: {e:#}");
            None
        },
    };

    match execute(cli).await {
        Ok(code) => process::exit(code),
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {e:#}");
            process::exit(1);
        },
    }
}

async fn execute(cli: Cli) -> Result<i32> {
    let mut config = IngestConfig::load().context("Failed to load configuration")?;
    if let Some(url) = &cli.database_url {
        config.database.url = url.clone();
    }
    if let Some(batch_size) = cli.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(mode) = cli.guard_mode {
        config.guard_mode = mode;
    }
    config.validate()?;

    let pool = create_pool(&config.database)
        .await
        .context("Failed to connect to database")?;
    let pg = Arc::new(PgCatalogStore::new(pool, &config.sequence)?);

    match cli.command {
        Command::Run { manifest, dry_run } => {
            let base_dir = manifest.parent().map(Path::to_path_buf).unwrap_or_default();
            let plan = RunManifest::load(&manifest)
                .await?
                .to_plan(&base_dir, &config.key_field)
                .await?;
            info!(manifest = %manifest.display(), files = plan.file_count(), dry_run, "Loaded run manifest");

            let store = select_store(pg, &plan, dry_run).await?;
            let summary = run_plan(&config, store, &plan, cli.quiet).await;
            report(&summary)?;
            Ok(summary.exit_code())
        },

        Command::File {
            catalog_type,
            path,
            section,
            constants,
            positional,
            dry_run,
        } => {
            let mut spec = catingest::FileSpec::new(path, &catalog_type)
                .with_section(Section::named(&section))
                .positional(positional);
            for (name, value) in &constants {
                spec = spec.with_constant(name, Value::infer(value));
            }
            let plan = RunPlan::standalone(vec![spec]);

            let store = select_store(pg, &plan, dry_run).await?;
            let summary = run_plan(&config, store, &plan, cli.quiet).await;
            report(&summary)?;
            Ok(summary.exit_code())
        },

        Command::Mapping { catalog_type, section } => {
            let section = section.as_deref().map(Section::named);
            let resolver = MetadataResolver::new(pg.as_ref(), config.pipeline_options(false).resolver);
            let table = resolver.resolve(&catalog_type, section.as_ref()).await?;
            println!("{}", serde_json::to_string_pretty(&table)?);
            Ok(0)
        },
    }
}

/// The Postgres store, or for a dry run an in-memory one carrying the
/// mappings the plan needs.
async fn select_store(pg: Arc<PgCatalogStore>, plan: &RunPlan, dry_run: bool) -> Result<Arc<dyn CatalogStore>> {
    if !dry_run {
        return Ok(pg);
    }

    let catalog_types: BTreeSet<&str> = plan
        .assigning
        .iter()
        .chain(&plan.dependents)
        .map(|spec| spec.catalog_type.as_str())
        .collect();

    let mut memory = MemoryDatabase::new();
    for catalog_type in catalog_types {
        let rows = pg.mapping_rows(catalog_type).await?;
        match pg.destination_table(catalog_type).await? {
            Some(table) => memory = memory.with_mapping(catalog_type, &table, rows),
            None => warn!(catalog_type, "No destination table registered"),
        }
    }
    warn!("Dry run: rows go to an in-memory database and are discarded");
    Ok(Arc::new(memory))
}

async fn run_plan(config: &IngestConfig, store: Arc<dyn CatalogStore>, plan: &RunPlan, quiet: bool) -> RunSummary {
    let cancel = CancellationToken::new();
    let pipeline = IngestPipeline::new(store, Arc::new(FileSourceOpener), config.pipeline_options(!quiet))
        .with_cancellation(cancel.clone());

    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling after the current batch");
            cancel.cancel();
        }
    });

    let summary = pipeline.run(plan).await;
    watcher.abort();
    summary
}

fn report(summary: &RunSummary) -> Result<()> {
    for file in &summary.files {
        match &file.outcome {
            FileOutcome::Skipped { rows } => eprintln!("skipped   {} ({} rows already loaded)", file.file, rows),
            FileOutcome::Committed { rows, skipped_records } if *skipped_records > 0 => eprintln!(
                "committed {} ({} rows, {} records skipped)",
                file.file, rows, skipped_records
            ),
            FileOutcome::Committed { rows, .. } => eprintln!("committed {} ({} rows)", file.file, rows),
            FileOutcome::Failed(failure) => eprintln!("FAILED    {}", failure),
        }
    }
    if let Some(reason) = &summary.aborted {
        eprintln!("run aborted: {}", reason);
    }
    println!("{}", serde_json::to_string_pretty(summary)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_constant() {
        assert_eq!(
            parse_constant("pfw_attempt_id=1234").unwrap(),
            ("PFW_ATTEMPT_ID".to_string(), "1234".to_string())
        );
        assert_eq!(parse_constant("BAND= r ").unwrap(), ("BAND".to_string(), "r".to_string()));
        assert!(parse_constant("BAND").is_err());
        assert!(parse_constant("=r").is_err());
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from([
            "catingest",
            "--batch-size",
            "500",
            "--guard-mode",
            "assume_not_loaded",
            "file",
            "-t",
            "coadd_cat",
            "-p",
            "tile.csv",
            "-c",
            "BAND=r",
            "--positional",
        ])
        .unwrap();
        assert_eq!(cli.batch_size, Some(500));
        assert_eq!(cli.guard_mode, Some(GuardMode::AssumeNotLoaded));
        let Command::File {
            constants,
            section,
            positional,
            ..
        } = cli.command
        else {
            panic!("expected file command");
        };
        assert!(positional);
        assert_eq!(constants, vec![("BAND".to_string(), "r".to_string())]);
        assert_eq!(section, "1");
    }
}
