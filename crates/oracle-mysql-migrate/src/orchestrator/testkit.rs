//! In-memory test doubles for driving the planner, chunker and
//! orchestrator without databases.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::EngineContext;
use crate::config::{Config, FullConfig, SourceConfig, TargetConfig};
use crate::core::schema::ColumnInfo;
use crate::core::traits::{ChunkQuery, ChunkRows, SinkWriter, SourceReader};
use crate::error::{MigrateError, Result};
use crate::state::{
    FullSyncMeta, MetaStore, TaskScope, TaskStatus, WaitSyncMeta, WaitSyncPatch,
};

pub(crate) fn test_config() -> Config {
    Config {
        source: SourceConfig {
            host: "localhost".to_string(),
            port: 1521,
            service_name: "ORCLPDB1".to_string(),
            user: "marvin".to_string(),
            password: "password".to_string(),
            schema: "marvin".to_string(),
        },
        target: TargetConfig {
            host: "localhost".to_string(),
            port: 3306,
            user: "root".to_string(),
            password: "password".to_string(),
            schema: "marvin".to_string(),
            ssl_mode: "disable".to_string(),
        },
        meta: None,
        full: FullConfig {
            insert_batch_size: 2,
            rows_per_chunk: 100_000,
            ..FullConfig::default()
        },
        task_mode: "FULL".to_string(),
    }
}

pub(crate) fn context(
    config: Config,
    reader: Arc<MockReader>,
    writer: Arc<MockWriter>,
    meta: Arc<MemoryMetaStore>,
) -> EngineContext {
    let scope = TaskScope::oracle_to_mysql(config.source.schema_upper(), config.task_mode.clone());
    EngineContext {
        config: Arc::new(config),
        reader,
        writer,
        meta,
        cancel: CancellationToken::new(),
        scope,
    }
}

// ===== metadata store =====

#[derive(Default)]
pub(crate) struct MemoryMetaStore {
    pub waits: Mutex<Vec<(TaskScope, WaitSyncMeta)>>,
    pub chunks: Mutex<Vec<(TaskScope, FullSyncMeta)>>,
}

impl MemoryMetaStore {
    pub fn seed_wait(&self, scope: &TaskScope, meta: WaitSyncMeta) {
        self.waits.lock().unwrap().push((scope.clone(), meta));
    }

    pub fn seed_chunk(&self, scope: &TaskScope, chunk: FullSyncMeta) {
        self.chunks.lock().unwrap().push((scope.clone(), chunk));
    }

    pub fn wait_rows(&self) -> Vec<WaitSyncMeta> {
        self.waits.lock().unwrap().iter().map(|(_, m)| m.clone()).collect()
    }

    pub fn chunk_rows(&self) -> Vec<FullSyncMeta> {
        self.chunks.lock().unwrap().iter().map(|(_, c)| c.clone()).collect()
    }
}

fn apply_patch(meta: &mut WaitSyncMeta, patch: &WaitSyncPatch) {
    if let Some(status) = patch.status {
        meta.status = status;
    }
    if let Some(snapshot_id) = patch.snapshot_id {
        meta.snapshot_id = snapshot_id;
    }
    if let Some(chunk_total) = patch.chunk_total {
        meta.chunk_total = chunk_total;
    }
    if let Some(chunk_success) = patch.chunk_success {
        meta.chunk_success = chunk_success;
    }
    if let Some(chunk_failed) = patch.chunk_failed {
        meta.chunk_failed = chunk_failed;
    }
    if let Some(is_partition) = patch.is_partition {
        meta.is_partition = is_partition;
    }
}

#[async_trait]
impl MetaStore for MemoryMetaStore {
    async fn init_schema(&self) -> Result<()> {
        Ok(())
    }

    async fn create_wait_table(&self, scope: &TaskScope, meta: &WaitSyncMeta) -> Result<()> {
        self.waits
            .lock()
            .unwrap()
            .push((scope.clone(), meta.clone()));
        Ok(())
    }

    async fn wait_table(&self, scope: &TaskScope, table: &str) -> Result<Option<WaitSyncMeta>> {
        Ok(self
            .waits
            .lock()
            .unwrap()
            .iter()
            .find(|(s, m)| s == scope && m.table_s == table)
            .map(|(_, m)| m.clone()))
    }

    async fn wait_tables_by_status(
        &self,
        scope: &TaskScope,
        status: TaskStatus,
    ) -> Result<Vec<WaitSyncMeta>> {
        let mut rows: Vec<WaitSyncMeta> = self
            .waits
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, m)| s == scope && m.status == status)
            .map(|(_, m)| m.clone())
            .collect();
        rows.sort_by(|a, b| a.table_s.cmp(&b.table_s));
        Ok(rows)
    }

    async fn fresh_wait_tables(&self, scope: &TaskScope) -> Result<Vec<WaitSyncMeta>> {
        let mut rows: Vec<WaitSyncMeta> = self
            .waits
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, m)| s == scope && m.is_fresh())
            .map(|(_, m)| m.clone())
            .collect();
        rows.sort_by(|a, b| a.table_s.cmp(&b.table_s));
        Ok(rows)
    }

    async fn delete_wait_tables(&self, scope: &TaskScope, tables: &[String]) -> Result<()> {
        self.waits
            .lock()
            .unwrap()
            .retain(|(s, m)| s != scope || !tables.contains(&m.table_s));
        Ok(())
    }

    async fn update_wait_table(
        &self,
        scope: &TaskScope,
        table: &str,
        patch: &WaitSyncPatch,
    ) -> Result<()> {
        let mut waits = self.waits.lock().unwrap();
        for (s, m) in waits.iter_mut() {
            if s == scope && m.table_s == table {
                apply_patch(m, patch);
            }
        }
        Ok(())
    }

    async fn count_failed_tables(&self, scope: &TaskScope) -> Result<i64> {
        Ok(self
            .waits
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, m)| s == scope && m.status == TaskStatus::Failed)
            .count() as i64)
    }

    async fn batch_insert_chunks(
        &self,
        scope: &TaskScope,
        chunks: &[FullSyncMeta],
        _insert_batch_size: usize,
    ) -> Result<()> {
        let mut store = self.chunks.lock().unwrap();
        for chunk in chunks {
            store.push((scope.clone(), chunk.clone()));
        }
        Ok(())
    }

    async fn waiting_chunks(&self, scope: &TaskScope, table: &str) -> Result<Vec<FullSyncMeta>> {
        Ok(self
            .chunks
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, c)| {
                s == scope && c.table_s == table && c.status == TaskStatus::Waiting
            })
            .map(|(_, c)| c.clone())
            .collect())
    }

    async fn waiting_chunk_tables(&self, scope: &TaskScope) -> Result<Vec<String>> {
        let mut tables: Vec<String> = self
            .chunks
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, c)| s == scope && c.status == TaskStatus::Waiting)
            .map(|(_, c)| c.table_s.clone())
            .collect();
        tables.sort();
        tables.dedup();
        Ok(tables)
    }

    async fn count_chunks(&self, scope: &TaskScope, table: &str) -> Result<i64> {
        Ok(self
            .chunks
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, c)| s == scope && c.table_s == table)
            .count() as i64)
    }

    async fn count_failed_chunks(&self, scope: &TaskScope, table: &str) -> Result<i64> {
        Ok(self
            .chunks
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, c)| s == scope && c.table_s == table && c.status == TaskStatus::Failed)
            .count() as i64)
    }

    async fn update_chunk_status(
        &self,
        scope: &TaskScope,
        table: &str,
        predicate: &str,
        status: TaskStatus,
        info_detail: Option<&str>,
        error_detail: Option<&str>,
    ) -> Result<()> {
        let mut chunks = self.chunks.lock().unwrap();
        for (s, c) in chunks.iter_mut() {
            if s == scope && c.table_s == table && c.chunk_predicate == predicate {
                c.status = status;
                if let Some(info) = info_detail {
                    c.info_detail = info.to_string();
                }
                if let Some(error) = error_detail {
                    c.error_detail = error.to_string();
                }
            }
        }
        Ok(())
    }

    async fn delete_chunks_by_schema(&self, scope: &TaskScope) -> Result<()> {
        self.chunks.lock().unwrap().retain(|(s, _)| s != scope);
        Ok(())
    }

    async fn create_chunks_and_update_table(
        &self,
        scope: &TaskScope,
        chunks: &[FullSyncMeta],
        table: &str,
        patch: &WaitSyncPatch,
    ) -> Result<()> {
        self.batch_insert_chunks(scope, chunks, 1).await?;
        self.update_wait_table(scope, table, patch).await
    }

    async fn delete_chunks_and_update_table(
        &self,
        scope: &TaskScope,
        table: &str,
        patch: &WaitSyncPatch,
    ) -> Result<()> {
        self.chunks
            .lock()
            .unwrap()
            .retain(|(s, c)| s != scope || c.table_s != table);
        self.update_wait_table(scope, table, patch).await
    }
}

// ===== source reader =====

#[derive(Clone)]
pub(crate) struct MockTable {
    pub columns: Vec<ColumnInfo>,
    pub statistic_rows: u64,
    pub predicates: Vec<String>,
    /// Encoded tuple literals per predicate.
    pub rows: HashMap<String, Vec<String>>,
    pub partitioned: bool,
}

impl Default for MockTable {
    fn default() -> Self {
        Self {
            columns: vec![
                ColumnInfo::new(1, "ID", "NUMBER"),
                ColumnInfo::new(2, "NAME", "VARCHAR2"),
            ],
            statistic_rows: 0,
            predicates: Vec::new(),
            rows: HashMap::new(),
            partitioned: false,
        }
    }
}

pub(crate) struct MockReader {
    pub version: String,
    pub snapshot: u64,
    pub tables: BTreeMap<String, MockTable>,
    pub chunk_task_calls: Mutex<Vec<String>>,
}

impl Default for MockReader {
    fn default() -> Self {
        Self {
            version: "19.3.0.0.0".to_string(),
            snapshot: 470394,
            tables: BTreeMap::new(),
            chunk_task_calls: Mutex::new(Vec::new()),
        }
    }
}

impl MockReader {
    fn table(&self, name: &str) -> Result<&MockTable> {
        self.tables
            .get(name)
            .ok_or_else(|| MigrateError::source("unknown table", name.to_string()))
    }
}

#[async_trait]
impl SourceReader for MockReader {
    async fn version(&self) -> Result<String> {
        Ok(self.version.clone())
    }

    async fn current_snapshot(&self) -> Result<u64> {
        Ok(self.snapshot)
    }

    async fn schema_tables(&self, _schema: &str) -> Result<Vec<String>> {
        Ok(self.tables.keys().cloned().collect())
    }

    async fn list_partitioned_tables(
        &self,
        _schema: &str,
    ) -> Result<std::collections::HashSet<String>> {
        Ok(self
            .tables
            .iter()
            .filter(|(_, t)| t.partitioned)
            .map(|(name, _)| name.clone())
            .collect())
    }

    async fn row_statistic(&self, _schema: &str, table: &str) -> Result<u64> {
        Ok(self.table(table)?.statistic_rows)
    }

    async fn describe_columns(
        &self,
        _schema: &str,
        table: &str,
        _collation_aware: bool,
    ) -> Result<Vec<ColumnInfo>> {
        Ok(self.table(table)?.columns.clone())
    }

    async fn create_row_chunks(
        &self,
        task_name: &str,
        _schema: &str,
        table: &str,
        _rows_per_chunk: u64,
    ) -> Result<Vec<String>> {
        self.chunk_task_calls
            .lock()
            .unwrap()
            .push(task_name.to_string());
        Ok(self.table(table)?.predicates.clone())
    }

    async fn stream_rows(&self, query: ChunkQuery<'_>, batch_size: usize) -> Result<ChunkRows> {
        let table = self.table(query.table)?;
        let columns = table
            .columns
            .iter()
            .map(|c| format!("`{}`", c.name))
            .collect();
        let tuples = table
            .rows
            .get(query.predicate)
            .cloned()
            .unwrap_or_default();
        let batches = tuples
            .chunks(batch_size.max(1))
            .map(|chunk| chunk.join(","))
            .collect();
        Ok(ChunkRows { columns, batches })
    }
}

// ===== sink writer =====

#[derive(Default)]
pub(crate) struct MockWriter {
    /// (schema, table, batch) triples in apply order.
    pub applied: Mutex<Vec<(String, String, String)>>,
    pub truncated: Mutex<Vec<String>>,
    /// Batches containing this marker fail, to exercise the chunk-failure
    /// path.
    pub fail_batches_containing: Option<String>,
}

impl MockWriter {
    pub fn failing_on(marker: &str) -> Self {
        Self {
            fail_batches_containing: Some(marker.to_string()),
            ..Default::default()
        }
    }

    pub fn applied_batches(&self, table: &str) -> Vec<String> {
        self.applied
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, t, _)| t == table)
            .map(|(_, _, b)| b.clone())
            .collect()
    }

    pub fn truncated_tables(&self) -> Vec<String> {
        self.truncated.lock().unwrap().clone()
    }
}

#[async_trait]
impl SinkWriter for MockWriter {
    async fn truncate_table(&self, schema: &str, table: &str) -> Result<()> {
        self.truncated
            .lock()
            .unwrap()
            .push(format!("{}.{}", schema, table));
        Ok(())
    }

    async fn apply_batch(
        &self,
        schema: &str,
        table: &str,
        _columns: &[String],
        batch: &str,
    ) -> Result<u64> {
        if let Some(marker) = &self.fail_batches_containing {
            if batch.contains(marker.as_str()) {
                return Err(MigrateError::chunk(table, "simulated insert failure"));
            }
        }
        self.applied
            .lock()
            .unwrap()
            .push((schema.to_string(), table.to_string(), batch.to_string()));
        Ok(1)
    }
}
