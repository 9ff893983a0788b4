//! # oracle-mysql-migrate
//!
//! Full-load migration engine moving table data from Oracle to MySQL.
//!
//! The engine splits every source table into row-id chunks, persists
//! per-chunk progress in a MySQL metadata store, and applies chunks with
//! bounded two-level parallelism:
//!
//! - **Consistent snapshot**: every chunk of a table reads `AS OF SCN` at
//!   one snapshot id captured at chunk-creation time
//! - **Resume**: interrupted runs pick up their recorded chunk set exactly
//!   where the prior run stopped
//! - **Chunk isolation**: a failed chunk is recorded and skipped; sibling
//!   chunks and tables keep going
//!
//! The low-level Oracle driver is supplied by the embedding application via
//! the [`SourceClient`] trait; everything MySQL-side uses SQLx.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use oracle_mysql_migrate::{Config, Orchestrator, Result, SourceClient};
//! use tokio_util::sync::CancellationToken;
//!
//! async fn run(source: Arc<dyn SourceClient>) -> Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let orchestrator = Orchestrator::connect(config, source).await?;
//!     let report = orchestrator.run(CancellationToken::new()).await?;
//!     println!("{} tables migrated", report.tables_success);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod drivers;
pub mod error;
pub mod orchestrator;
pub mod state;

// Re-exports for convenient access
pub use config::{Config, FullConfig, MetaConfig, SourceConfig, TargetConfig};
pub use crate::core::{
    ChunkQuery, ChunkRows, ColumnDesc, ColumnInfo, ColumnKind, RawRow, RawStream, RawTable,
    ScanKind, SinkWriter, SourceClient, SourceReader,
};
pub use drivers::{MysqlWriter, OracleReader};
pub use error::{MigrateError, Result};
pub use orchestrator::{MigrationReport, Orchestrator};
pub use state::{
    FullSyncMeta, MetaStore, MysqlMetaStore, TaskScope, TaskStatus, WaitSyncMeta, WaitSyncPatch,
};
