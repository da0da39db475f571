//! Postgres connection pool and store adapter

mod catalog;

pub use catalog::PgCatalogStore;

use regex::Regex;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

use crate::config::DbConfig;
use crate::error::StoreError;

/// Postgres caps bind parameters per statement at 65,535.
pub const MAX_BIND_PARAMS: usize = 65_535;

pub async fn create_pool(config: &DbConfig) -> Result<PgPool, StoreError> {
    let mut options = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs));

    if let Some(idle_timeout) = config.idle_timeout_secs {
        options = options.idle_timeout(Duration::from_secs(idle_timeout));
    }

    let pool = options.connect(&config.url).await?;

    tracing::info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "Database connection pool created"
    );

    Ok(pool)
}

/// Table, column and sequence names are interpolated into SQL, so they must
/// be plain (optionally schema-qualified) identifiers.
pub(crate) fn checked_identifier(name: &str) -> Result<String, StoreError> {
    let pattern = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$")
        .map_err(|e| StoreError::Invalid(e.to_string()))?;
    let name = name.trim();
    if pattern.is_match(name) {
        Ok(name.to_lowercase())
    } else {
        Err(StoreError::Invalid(format!("'{}' is not a valid SQL identifier", name)))
    }
}

/// Rows per INSERT so that `columns` bind parameters per row stay under the limit.
pub(crate) fn rows_per_statement(columns: usize) -> usize {
    (MAX_BIND_PARAMS / columns.max(1)).max(1)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_identifier() {
        assert_eq!(checked_identifier("COADD_OBJECT").unwrap(), "coadd_object");
        assert_eq!(checked_identifier(" des.coadd_object ").unwrap(), "des.coadd_object");
        assert!(checked_identifier("coadd_object; drop table x").is_err());
        assert!(checked_identifier("1table").is_err());
        assert!(checked_identifier("a.b.c").is_err());
        assert!(checked_identifier("").is_err());
    }

    #[test]
    fn test_rows_per_statement() {
        assert_eq!(rows_per_statement(1), 65_535);
        assert_eq!(rows_per_statement(100), 655);
        assert_eq!(rows_per_statement(0), 65_535);
        assert_eq!(rows_per_statement(100_000), 1);
    }
}
