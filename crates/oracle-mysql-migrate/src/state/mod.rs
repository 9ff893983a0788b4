//! Migration state persisted in the metadata store.
//!
//! Two tables carry all durable state: `wait_sync_meta` holds one row per
//! table task and `full_sync_meta` one row per chunk. The store is the sole
//! synchronization point between workers - there is no shared in-memory
//! state across chunks.

pub mod mysql;

use async_trait::async_trait;
use std::fmt;

use crate::error::{MigrateError, Result};

pub use mysql::MysqlMetaStore;

/// Source database kind recorded in metadata keys.
pub const DB_KIND_ORACLE: &str = "ORACLE";

/// Target database kind recorded in metadata keys.
pub const DB_KIND_MYSQL: &str = "MYSQL";

/// Sentinel snapshot id of a table task that has never been chunked.
pub const DEFAULT_SNAPSHOT_ID: u64 = 0;

/// Sentinel chunk total of a table task that has never been chunked.
pub const DEFAULT_CHUNK_TOTAL: i64 = 0;

/// Task status literals shared by table and chunk records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    Waiting,
    Running,
    Success,
    Failed,
}

impl TaskStatus {
    /// The literal stored in the metadata tables.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Waiting => "WAITING",
            TaskStatus::Running => "RUNNING",
            TaskStatus::Success => "SUCCESS",
            TaskStatus::Failed => "FAILED",
        }
    }

    /// Parse a stored literal.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "WAITING" => Ok(TaskStatus::Waiting),
            "RUNNING" => Ok(TaskStatus::Running),
            "SUCCESS" => Ok(TaskStatus::Success),
            "FAILED" => Ok(TaskStatus::Failed),
            _ => Err(MigrateError::Meta {
                message: format!("invalid task status: {}", s),
                context: "parsing task status".to_string(),
            }),
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The key prefix shared by every metadata row of one migration workflow:
/// database kinds, source schema and task mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskScope {
    pub db_kind_s: String,
    pub db_kind_t: String,
    pub schema_s: String,
    pub task_mode: String,
}

impl TaskScope {
    /// Scope for an Oracle to MySQL workflow.
    pub fn oracle_to_mysql(schema_s: impl Into<String>, task_mode: impl Into<String>) -> Self {
        Self {
            db_kind_s: DB_KIND_ORACLE.to_string(),
            db_kind_t: DB_KIND_MYSQL.to_string(),
            schema_s: schema_s.into().to_uppercase(),
            task_mode: task_mode.into(),
        }
    }
}

/// One table task (`wait_sync_meta` row).
#[derive(Debug, Clone)]
pub struct WaitSyncMeta {
    pub table_s: String,
    pub status: TaskStatus,
    pub snapshot_id: u64,
    pub chunk_total: i64,
    pub chunk_success: i64,
    pub chunk_failed: i64,
    pub is_partition: bool,
}

impl WaitSyncMeta {
    /// A freshly registered table: WAITING with the never-chunked sentinels.
    pub fn waiting(table_s: impl Into<String>) -> Self {
        Self {
            table_s: table_s.into().to_uppercase(),
            status: TaskStatus::Waiting,
            snapshot_id: DEFAULT_SNAPSHOT_ID,
            chunk_total: DEFAULT_CHUNK_TOTAL,
            chunk_success: 0,
            chunk_failed: 0,
            is_partition: false,
        }
    }

    /// True when the table has never been chunked.
    pub fn is_fresh(&self) -> bool {
        self.status == TaskStatus::Waiting
            && self.snapshot_id == DEFAULT_SNAPSHOT_ID
            && self.chunk_total == DEFAULT_CHUNK_TOTAL
    }
}

/// One chunk task (`full_sync_meta` row).
#[derive(Debug, Clone)]
pub struct FullSyncMeta {
    pub table_s: String,
    pub schema_t: String,
    pub table_t: String,
    pub snapshot_id: u64,
    pub column_projection: String,
    pub chunk_predicate: String,
    pub status: TaskStatus,
    pub info_detail: String,
    pub error_detail: String,
    pub is_partition: bool,
}

impl FullSyncMeta {
    /// Human-readable chunk identity, recorded as `info_detail` on failure.
    pub fn describe(&self, scope: &TaskScope) -> String {
        format!(
            "schema_s={} table_s={} schema_t={} table_t={} snapshot_id={} predicate=[{}] task_mode={}",
            scope.schema_s,
            self.table_s,
            self.schema_t,
            self.table_t,
            self.snapshot_id,
            self.chunk_predicate,
            scope.task_mode
        )
    }
}

/// Partial update of a `wait_sync_meta` row. `None` fields are untouched.
#[derive(Debug, Clone, Default)]
pub struct WaitSyncPatch {
    pub status: Option<TaskStatus>,
    pub snapshot_id: Option<u64>,
    pub chunk_total: Option<i64>,
    pub chunk_success: Option<i64>,
    pub chunk_failed: Option<i64>,
    pub is_partition: Option<bool>,
}

impl WaitSyncPatch {
    /// Patch that only moves the status.
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.snapshot_id.is_none()
            && self.chunk_total.is_none()
            && self.chunk_success.is_none()
            && self.chunk_failed.is_none()
            && self.is_partition.is_none()
    }
}

/// Metadata store operations.
///
/// The three compound operations run in a single transaction each; every
/// other method is a single statement. Implementations must be shareable
/// across the worker pools.
#[async_trait]
pub trait MetaStore: Send + Sync {
    /// Create the metadata tables if they do not exist. Idempotent.
    async fn init_schema(&self) -> Result<()>;

    // ===== wait_sync_meta =====

    /// Register a table task.
    async fn create_wait_table(&self, scope: &TaskScope, meta: &WaitSyncMeta) -> Result<()>;

    /// Fetch one table task.
    async fn wait_table(&self, scope: &TaskScope, table: &str) -> Result<Option<WaitSyncMeta>>;

    /// All table tasks in a status.
    async fn wait_tables_by_status(
        &self,
        scope: &TaskScope,
        status: TaskStatus,
    ) -> Result<Vec<WaitSyncMeta>>;

    /// Table tasks that are WAITING and were never chunked.
    async fn fresh_wait_tables(&self, scope: &TaskScope) -> Result<Vec<WaitSyncMeta>>;

    /// Delete the named table tasks.
    async fn delete_wait_tables(&self, scope: &TaskScope, tables: &[String]) -> Result<()>;

    /// Apply a partial update to one table task.
    async fn update_wait_table(
        &self,
        scope: &TaskScope,
        table: &str,
        patch: &WaitSyncPatch,
    ) -> Result<()>;

    /// Number of FAILED table tasks in the scope. Used by the gate.
    async fn count_failed_tables(&self, scope: &TaskScope) -> Result<i64>;

    // ===== full_sync_meta =====

    /// Insert chunk tasks in batches of `insert_batch_size` rows.
    async fn batch_insert_chunks(
        &self,
        scope: &TaskScope,
        chunks: &[FullSyncMeta],
        insert_batch_size: usize,
    ) -> Result<()>;

    /// WAITING chunks of one table.
    async fn waiting_chunks(&self, scope: &TaskScope, table: &str) -> Result<Vec<FullSyncMeta>>;

    /// Distinct tables that still have WAITING chunks.
    async fn waiting_chunk_tables(&self, scope: &TaskScope) -> Result<Vec<String>>;

    /// Total chunk rows recorded for one table.
    async fn count_chunks(&self, scope: &TaskScope, table: &str) -> Result<i64>;

    /// FAILED chunk rows recorded for one table.
    async fn count_failed_chunks(&self, scope: &TaskScope, table: &str) -> Result<i64>;

    /// Move one chunk (identified by table + predicate) to a new status,
    /// optionally recording failure details.
    async fn update_chunk_status(
        &self,
        scope: &TaskScope,
        table: &str,
        predicate: &str,
        status: TaskStatus,
        info_detail: Option<&str>,
        error_detail: Option<&str>,
    ) -> Result<()>;

    /// Delete every chunk row in the scope. Used by the checkpoint-off wipe.
    async fn delete_chunks_by_schema(&self, scope: &TaskScope) -> Result<()>;

    // ===== compound (single transaction) =====

    /// Insert chunk rows and patch the owning table task atomically.
    async fn create_chunks_and_update_table(
        &self,
        scope: &TaskScope,
        chunks: &[FullSyncMeta],
        table: &str,
        patch: &WaitSyncPatch,
    ) -> Result<()>;

    /// Delete one table's chunk rows and patch its table task atomically.
    /// Used on table completion with zero failures.
    async fn delete_chunks_and_update_table(
        &self,
        scope: &TaskScope,
        table: &str,
        patch: &WaitSyncPatch,
    ) -> Result<()>;
}
