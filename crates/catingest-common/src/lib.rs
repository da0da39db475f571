//! Catalog Ingest Common Library
//!
//! Ambient pieces shared by the catalog ingest tools:
//!
//! - **Logging**: `tracing` subscriber setup driven by environment or builder
//! - **Retry**: bounded, fixed-delay retry for flaky infrastructure calls
//!
//! # Example
//!
//! ```no_run
//! use catingest_common::logging::{init_logging, LogConfig};
//! use catingest_common::retry::RetryPolicy;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let _guard = init_logging(&LogConfig::from_env()?)?;
//!
//!     let policy = RetryPolicy::default();
//!     let rows = policy
//!         .run("count_rows", |_| true, || async { Ok::<_, std::io::Error>(42u64) })
//!         .await?;
//!     tracing::info!(rows, "done");
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod logging;
pub mod retry;

pub use logging::{init_logging, LogConfig, LoggingGuard};
pub use retry::RetryPolicy;
