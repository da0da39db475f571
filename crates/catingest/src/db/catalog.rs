//! Postgres implementation of the store traits
//!
//! Mapping metadata lives in ops_datafile_metadata / ops_datafile_table,
//! identifiers come from a sequence, and every destination table carries a
//! `filename` column the ledger counts by.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::debug;

use super::{checked_identifier, rows_per_statement};
use crate::error::StoreError;
use crate::store::{
    CountMode, IdentifierSequence, LedgerOracle, MetadataRow, MetadataStore, RowSink, FILENAME_COLUMN,
};
use crate::value::Value;

#[derive(Debug, Clone)]
pub struct PgCatalogStore {
    pool: PgPool,
    sequence: String,
}

impl PgCatalogStore {
    /// `sequence` issues the surrogate identifiers.
    pub fn new(pool: PgPool, sequence: &str) -> Result<Self, StoreError> {
        Ok(Self {
            pool,
            sequence: checked_identifier(sequence)?,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for PgCatalogStore {
    async fn mapping_rows(&self, catalog_type: &str) -> Result<Vec<MetadataRow>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT hdu, UPPER(attribute_name) AS attribute_name, position, column_name,
                   derived, datafile_datatype, date_format
            FROM ops_datafile_metadata
            WHERE filetype = $1
            ORDER BY hdu, UPPER(attribute_name), position
            "#,
        )
        .bind(catalog_type)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(MetadataRow {
                    section: row.try_get("hdu")?,
                    attribute: row.try_get("attribute_name")?,
                    position: row.try_get::<Option<i32>, _>("position")?.map(i64::from),
                    column: row.try_get("column_name")?,
                    kind: row.try_get("derived")?,
                    datatype: row.try_get("datafile_datatype")?,
                    date_format: row.try_get("date_format")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(StoreError::from)
    }

    async fn destination_table(&self, catalog_type: &str) -> Result<Option<String>, StoreError> {
        let table: Option<Option<String>> =
            sqlx::query_scalar("SELECT table_name FROM ops_datafile_table WHERE filetype = $1")
                .bind(catalog_type)
                .fetch_optional(&self.pool)
                .await?;
        Ok(table.flatten())
    }
}

#[async_trait]
impl IdentifierSequence for PgCatalogStore {
    async fn next_block(&self, count: usize) -> Result<Vec<i64>, StoreError> {
        let count = i64::try_from(count).map_err(|_| StoreError::Invalid(format!("block of {count}")))?;
        let ids: Vec<i64> = sqlx::query_scalar("SELECT nextval($1::regclass) FROM generate_series(1, $2)")
            .bind(&self.sequence)
            .bind(count)
            .fetch_all(&self.pool)
            .await?;
        debug!(sequence = %self.sequence, count = ids.len(), "Fetched identifier block");
        Ok(ids)
    }
}

#[async_trait]
impl LedgerOracle for PgCatalogStore {
    async fn ingested_count(&self, table: &str, file: &str, mode: &CountMode) -> Result<u64, StoreError> {
        let table = checked_identifier(table)?;
        let filename = checked_identifier(FILENAME_COLUMN)?;
        let counted = match mode {
            CountMode::Rows => "*".to_string(),
            CountMode::DistinctGroups { column } => format!("DISTINCT {}", checked_identifier(column)?),
        };
        let sql = format!("SELECT COUNT({}) FROM {} WHERE {} = $1", counted, table, filename);

        let count: i64 = sqlx::query_scalar(&sql).bind(file).fetch_one(&self.pool).await?;
        u64::try_from(count).map_err(|_| StoreError::Query(format!("negative count {} from {}", count, table)))
    }

    async fn existing_identifiers(
        &self,
        table: &str,
        file: &str,
        key_column: &str,
        id_column: &str,
    ) -> Result<Vec<(i64, i64)>, StoreError> {
        let sql = format!(
            "SELECT {key}::bigint, {id}::bigint FROM {table} WHERE {filename} = $1 AND {key} IS NOT NULL",
            key = checked_identifier(key_column)?,
            id = checked_identifier(id_column)?,
            table = checked_identifier(table)?,
            filename = checked_identifier(FILENAME_COLUMN)?,
        );
        let pairs: Vec<(i64, i64)> = sqlx::query_as(&sql).bind(file).fetch_all(&self.pool).await?;
        Ok(pairs)
    }
}

#[async_trait]
impl RowSink for PgCatalogStore {
    async fn emit(&self, table: &str, columns: &[String], rows: &[Vec<Value>]) -> Result<u64, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let table = checked_identifier(table)?;
        let columns = columns
            .iter()
            .map(|c| checked_identifier(c))
            .collect::<Result<Vec<_>, _>>()?;
        if let Some(bad) = rows.iter().position(|r| r.len() != columns.len()) {
            return Err(StoreError::Invalid(format!(
                "row {} has {} values for {} columns",
                bad,
                rows[bad].len(),
                columns.len()
            )));
        }

        let mut tx = self.pool.begin().await?;
        let mut written = 0u64;

        for chunk in rows.chunks(rows_per_statement(columns.len())) {
            let mut query_builder: QueryBuilder<Postgres> =
                QueryBuilder::new(format!("INSERT INTO {} ({}) ", table, columns.join(", ")));

            query_builder.push_values(chunk.iter(), |mut b, row| {
                for value in row {
                    match value {
                        Value::Null => {
                            b.push("NULL");
                        },
                        Value::Int(v) => {
                            b.push_bind(*v);
                        },
                        Value::Float(v) => {
                            b.push_bind(*v);
                        },
                        Value::Text(v) => {
                            b.push_bind(v.clone());
                        },
                        Value::Timestamp(v) => {
                            b.push_bind(*v);
                        },
                        Value::Array(_) => {
                            b.push_bind(value.to_string());
                        },
                    }
                }
            });

            written += query_builder.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        debug!(table = %table, rows = written, "Inserted batch");
        Ok(written)
    }
}
