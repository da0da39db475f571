//! Shared fixtures for the catalog ingest integration tests.

#![allow(dead_code)]

use catingest::mapping::Section;
use catingest::memory::MemoryDatabase;
use catingest::source::{Header, MemoryCatalog, MemoryOpener};
use catingest::store::MetadataRow;
use catingest::{FileSpec, IdentifierBinding, IngestPipeline, PipelineOptions, Value};
use std::sync::Arc;

pub const DETECTION_TYPE: &str = "coadd_det_cat";
pub const BAND_TYPE: &str = "coadd_cat";
pub const DETECTION_TABLE: &str = "coadd_object";
pub const BAND_TABLE: &str = "coadd_object_band";

/// Detection catalog: positions plus a three-aperture flux array.
pub fn detection_mapping() -> Vec<MetadataRow> {
    vec![
        MetadataRow::new("OBJECTS", "NUMBER", 0, "OBJECT_NUMBER", "direct", "int"),
        MetadataRow::new("OBJECTS", "ALPHA_J2000", 0, "RA", "direct", "float"),
        MetadataRow::new("OBJECTS", "DELTA_J2000", 0, "DEC", "direct", "float"),
        MetadataRow::new("OBJECTS", "FLUX_APER", 0, "FLUX_APER_1", "direct", "float"),
        MetadataRow::new("OBJECTS", "FLUX_APER", 1, "FLUX_APER_2", "direct", "float"),
        MetadataRow::new("OBJECTS", "FLUX_APER", 2, "FLUX_APER_3", "direct", "float"),
        MetadataRow::new("PRIMARY", "FILENAME", 0, "FILENAME", "constant", "char"),
        MetadataRow::new("PRIMARY", "TILENAME", 0, "TILENAME", "constant", "char"),
    ]
}

/// Band catalog: magnitudes, with band and night derived from the header.
pub fn band_mapping() -> Vec<MetadataRow> {
    vec![
        MetadataRow::new("OBJECTS", "NUMBER", 0, "OBJECT_NUMBER", "direct", "int"),
        MetadataRow::new("OBJECTS", "MAG_AUTO", 0, "MAG_AUTO", "direct", "float"),
        MetadataRow::new("PRIMARY", "FILTER", 0, "BAND", "derived", "char"),
        MetadataRow::new("PRIMARY", "DATE-OBS", 0, "NITE", "derived", "int"),
        MetadataRow::new("PRIMARY", "FILENAME", 0, "FILENAME", "constant", "char"),
    ]
}

pub fn database() -> Arc<MemoryDatabase> {
    Arc::new(
        MemoryDatabase::new()
            .with_mapping(DETECTION_TYPE, DETECTION_TABLE, detection_mapping())
            .with_mapping(BAND_TYPE, BAND_TABLE, band_mapping())
            .with_sequence_start(5_000_000),
    )
}

pub fn objects() -> Section {
    Section::named("OBJECTS")
}

pub fn detection_catalog(path: &str, keys: impl IntoIterator<Item = i64>) -> MemoryCatalog {
    let rows = keys
        .into_iter()
        .map(|k| {
            let flux = k as f64;
            vec![
                Value::Int(k),
                Value::Float(30.0 + flux / 1000.0),
                Value::Float(-5.0 - flux / 1000.0),
                Value::from(vec![flux, flux * 2.0, flux * 3.0]),
            ]
        })
        .collect();
    MemoryCatalog::new(path).with_table(
        objects(),
        vec![
            "NUMBER".into(),
            "ALPHA_J2000".into(),
            "DELTA_J2000".into(),
            "FLUX_APER".into(),
        ],
        rows,
    )
}

pub fn band_catalog(path: &str, filter: &str, keys: impl IntoIterator<Item = i64>) -> MemoryCatalog {
    let rows = keys
        .into_iter()
        .map(|k| vec![Value::Int(k), Value::Float(20.0 + k as f64 / 100.0)])
        .collect();
    let header: Header = [
        ("FILTER", Value::from(filter)),
        ("DATE-OBS", Value::from("2013-09-02T04:10:00")),
    ]
    .into_iter()
    .collect();
    MemoryCatalog::new(path)
        .with_table(objects(), vec!["NUMBER".into(), "MAG_AUTO".into()], rows)
        .with_header(Section::PRIMARY, header)
}

pub fn binding() -> IdentifierBinding {
    IdentifierBinding::new("NUMBER", "COADD_OBJECT_ID")
}

pub fn detection_spec(path: &str) -> FileSpec {
    FileSpec::new(path, DETECTION_TYPE)
        .with_section(objects())
        .with_constant("TILENAME", "DES0215-0458")
        .with_binding(binding().keep_key_in("OBJECT_NUMBER"))
}

pub fn band_spec(path: &str) -> FileSpec {
    FileSpec::new(path, BAND_TYPE)
        .with_section(objects())
        .with_binding(binding().keep_key_in("OBJECT_NUMBER"))
}

pub fn pipeline(db: &Arc<MemoryDatabase>, opener: MemoryOpener, options: PipelineOptions) -> IngestPipeline {
    IngestPipeline::new(db.clone(), Arc::new(opener), options)
}

pub fn small_batches() -> PipelineOptions {
    PipelineOptions {
        batch_size: 16,
        ..PipelineOptions::default()
    }
}
