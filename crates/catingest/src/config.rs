//! Configuration management

use anyhow::Context;
use catingest_common::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::guard::{GuardMode, ReingestionGuard};
use crate::mapping::ResolverOptions;
use crate::orchestrator::{PipelineOptions, DEFAULT_BATCH_SIZE};

// ============================================================================
// Defaults
// ============================================================================

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/catingest";

pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 5;

pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 1;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Largest accepted batch size.
pub const MAX_BATCH_SIZE: usize = 1_000_000;

/// Default natural-key source field.
pub const DEFAULT_KEY_FIELD: &str = "NUMBER";

/// Default surrogate identifier sequence.
pub const DEFAULT_SEQUENCE: &str = "coadd_object_seq";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: Option<u64>,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
            min_connections: DEFAULT_DATABASE_MIN_CONNECTIONS,
            connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
            idle_timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestConfig {
    pub database: DbConfig,
    pub batch_size: usize,
    pub guard_max_attempts: u32,
    pub guard_retry_delay_secs: u64,
    pub guard_mode: GuardMode,
    pub key_field: String,
    pub sequence: String,
    pub regroup_arrays: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            database: DbConfig::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            guard_max_attempts: retry.max_attempts,
            guard_retry_delay_secs: retry.delay.as_secs(),
            guard_mode: GuardMode::Enforce,
            key_field: DEFAULT_KEY_FIELD.to_string(),
            sequence: DEFAULT_SEQUENCE.to_string(),
            regroup_arrays: true,
        }
    }
}

impl IngestConfig {
    /// Load configuration from `.env`, the environment and defaults.
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any variable source; unset variables take defaults, set
    /// but unparsable ones are errors.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let config = Self {
            database: DbConfig {
                url: var("DATABASE_URL").unwrap_or(defaults.database.url),
                max_connections: parsed(&var, "DB_MAX_CONNECTIONS")?
                    .unwrap_or(defaults.database.max_connections),
                min_connections: parsed(&var, "DB_MIN_CONNECTIONS")?
                    .unwrap_or(defaults.database.min_connections),
                connect_timeout_secs: parsed(&var, "DB_CONNECT_TIMEOUT")?
                    .unwrap_or(defaults.database.connect_timeout_secs),
                idle_timeout_secs: parsed(&var, "DB_IDLE_TIMEOUT")?,
            },
            batch_size: parsed(&var, "CATINGEST_BATCH_SIZE")?.unwrap_or(defaults.batch_size),
            guard_max_attempts: parsed(&var, "CATINGEST_GUARD_MAX_ATTEMPTS")?
                .unwrap_or(defaults.guard_max_attempts),
            guard_retry_delay_secs: parsed(&var, "CATINGEST_GUARD_RETRY_DELAY_SECS")?
                .unwrap_or(defaults.guard_retry_delay_secs),
            guard_mode: match var("CATINGEST_GUARD_MODE") {
                Some(mode) => mode
                    .parse()
                    .map_err(|e: String| anyhow::anyhow!(e))
                    .context("Invalid CATINGEST_GUARD_MODE")?,
                None => defaults.guard_mode,
            },
            key_field: var("CATINGEST_KEY_FIELD")
                .map(|k| k.to_uppercase())
                .unwrap_or(defaults.key_field),
            sequence: var("CATINGEST_SEQUENCE").unwrap_or(defaults.sequence),
            regroup_arrays: parsed(&var, "CATINGEST_REGROUP_ARRAYS")?.unwrap_or(defaults.regroup_arrays),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }
        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }
        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "Database min_connections ({}) cannot exceed max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }
        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            anyhow::bail!("Batch size must be between 1 and {}, got {}", MAX_BATCH_SIZE, self.batch_size);
        }
        if self.guard_max_attempts == 0 {
            anyhow::bail!("Guard max attempts must be greater than 0");
        }
        if self.key_field.is_empty() {
            anyhow::bail!("Natural-key field cannot be empty");
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.guard_max_attempts, Duration::from_secs(self.guard_retry_delay_secs))
    }

    pub fn pipeline_options(&self, show_progress: bool) -> PipelineOptions {
        PipelineOptions {
            batch_size: self.batch_size,
            guard: ReingestionGuard::new(self.retry_policy(), self.guard_mode),
            resolver: ResolverOptions {
                regroup_arrays: self.regroup_arrays,
                ..ResolverOptions::default()
            },
            show_progress,
        }
    }
}

fn parsed<T, V>(var: &V, key: &str) -> anyhow::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    V: Fn(&str) -> Option<String>,
{
    var(key)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|e| anyhow::anyhow!("Invalid {}='{}': {}", key, raw, e))
        })
        .transpose()
}
