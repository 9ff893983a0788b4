//! Core traits at the engine's external seams.
//!
//! - [`SourceClient`]: the low-level source driver (execute / query / stream)
//! - [`SourceReader`]: source-side operations the planner and orchestrator use
//! - [`SinkWriter`]: destination-side truncate and batch apply
//!
//! The engine never talks to the source database directly; it builds SQL and
//! hands it to a `SourceClient` supplied by the embedding application. The
//! reader and writer traits exist so the orchestration layers can be driven
//! against in-memory fakes in tests.

use async_trait::async_trait;
use std::collections::HashSet;
use tokio::sync::mpsc;

use super::schema::ColumnInfo;
use super::value::ScanKind;
use crate::error::Result;

/// One result column as reported by the source driver.
#[derive(Debug, Clone)]
pub struct ColumnDesc {
    /// Column name from the result metadata.
    pub name: String,
    /// Driver scan kind, decided once per result set.
    pub scan: ScanKind,
    /// Declared database type name, e.g. `NUMBER`, `VARCHAR2`.
    pub declared: String,
}

/// One row of raw driver bytes; `None` is SQL NULL.
pub type RawRow = Vec<Option<Vec<u8>>>;

/// A fully buffered query result. Used for catalog and metadata queries.
#[derive(Debug, Default)]
pub struct RawTable {
    pub columns: Vec<ColumnDesc>,
    pub rows: Vec<RawRow>,
}

impl RawTable {
    /// First row, first field, decoded as UTF-8. Convenience for single-value
    /// catalog queries.
    pub fn scalar(&self) -> Option<String> {
        self.rows
            .first()
            .and_then(|r| r.first())
            .and_then(|f| f.as_deref())
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }
}

/// A streaming query result: column metadata up front, rows over a channel.
///
/// The producing task stops when the receiver is dropped, so cancelling the
/// consuming future aborts the in-flight query.
pub struct RawStream {
    pub columns: Vec<ColumnDesc>,
    pub rows: mpsc::Receiver<Result<RawRow>>,
}

/// Low-level source database driver.
///
/// This is the only interface the engine has to the source DBMS. The
/// concrete implementation (network protocol, session handling) is supplied
/// by the embedding application; the engine only requires that the driver
/// can execute literal SQL and report per-column scan kinds.
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Execute a statement (DDL or PL/SQL block), returning affected rows.
    async fn exec(&self, sql: &str) -> Result<u64>;

    /// Run a query and buffer the full result.
    async fn query(&self, sql: &str) -> Result<RawTable>;

    /// Run a query and stream rows through a bounded channel.
    async fn query_stream(&self, sql: &str) -> Result<RawStream>;
}

/// The source side of one chunk's extract query.
#[derive(Debug, Clone, Copy)]
pub struct ChunkQuery<'a> {
    /// Source schema (owner).
    pub schema: &'a str,
    /// Source table.
    pub table: &'a str,
    /// SELECT list built at planning time.
    pub projection: &'a str,
    /// WHERE fragment identifying the chunk (`ROWID BETWEEN ...` or `1 = 1`).
    pub predicate: &'a str,
    /// Consistent read point shared by every chunk of the table.
    pub snapshot_id: u64,
}

/// Extracted rows of one chunk, already encoded for the destination.
#[derive(Debug, Default)]
pub struct ChunkRows {
    /// Back-quoted column headers for the destination INSERT.
    pub columns: Vec<String>,
    /// Comma-joined tuple literals, at most `batch_size` tuples each.
    pub batches: Vec<String>,
}

/// Source-side operations used by the planner, chunker and orchestrator.
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// Source server version string.
    async fn version(&self) -> Result<String>;

    /// Minimum current snapshot id visible cluster-wide.
    async fn current_snapshot(&self) -> Result<u64>;

    /// All table names in a schema.
    async fn schema_tables(&self, schema: &str) -> Result<Vec<String>>;

    /// Names of partitioned tables in a schema.
    async fn list_partitioned_tables(&self, schema: &str) -> Result<HashSet<String>>;

    /// Approximate row count from the optimizer statistics.
    async fn row_statistic(&self, schema: &str, table: &str) -> Result<u64>;

    /// Ordered column metadata for a table.
    async fn describe_columns(
        &self,
        schema: &str,
        table: &str,
        collation_aware: bool,
    ) -> Result<Vec<ColumnInfo>>;

    /// Split a table into row-id range predicates of roughly
    /// `rows_per_chunk` rows each, ordered by chunk index.
    ///
    /// Idempotent: a stale task with the same name is dropped first, and the
    /// task is dropped again once the chunk list has been fetched.
    async fn create_row_chunks(
        &self,
        task_name: &str,
        schema: &str,
        table: &str,
        rows_per_chunk: u64,
    ) -> Result<Vec<String>>;

    /// Stream one chunk's rows at the table's snapshot, encoding them into
    /// destination-ready tuple batches of `batch_size` rows.
    async fn stream_rows(&self, query: ChunkQuery<'_>, batch_size: usize) -> Result<ChunkRows>;
}

/// Destination-side operations used by the planner and orchestrator.
#[async_trait]
pub trait SinkWriter: Send + Sync {
    /// Truncate a destination table. Idempotent; called only when resume is
    /// disabled.
    async fn truncate_table(&self, schema: &str, table: &str) -> Result<()>;

    /// Apply one pre-formatted batch via a multi-row INSERT. `batch` is a
    /// comma-joined list of tuple literals; no additional quoting happens
    /// here.
    async fn apply_batch(
        &self,
        schema: &str,
        table: &str,
        columns: &[String],
        batch: &str,
    ) -> Result<u64>;
}
