//! MySQL-backed metadata store.
//!
//! Owns the metadata database (default `_oracle_mysql_migrate`) holding
//! `wait_sync_meta` and `full_sync_meta`. All writes carrying operator data
//! are parametrized; the compound operations run in one transaction each.

use async_trait::async_trait;
use sqlx::mysql::{MySqlPool, MySqlRow};
use sqlx::Row;
use tracing::{debug, info};

use super::{FullSyncMeta, MetaStore, TaskScope, TaskStatus, WaitSyncMeta, WaitSyncPatch};
use crate::config::MetaConfig;
use crate::drivers::mysql::writer::build_pool;
use crate::error::{MigrateError, Result};

const SCOPE_WHERE: &str = "db_kind_s = ? AND db_kind_t = ? AND schema_s = ? AND task_mode = ?";

/// MySQL metadata store.
pub struct MysqlMetaStore {
    pool: MySqlPool,
    database: String,
}

impl MysqlMetaStore {
    /// Connect to the metadata endpoint.
    pub async fn connect(config: &MetaConfig, max_conns: usize) -> Result<Self> {
        let pool = build_pool(
            &config.host,
            config.port,
            &config.user,
            &config.password,
            None,
            &config.ssl_mode,
            max_conns,
        )
        .await?;

        info!(
            "Connected to metadata store: {}:{}/{}",
            config.host, config.port, config.database
        );

        Ok(Self::new(pool, config.database.clone()))
    }

    /// Wrap an existing pool.
    pub fn new(pool: MySqlPool, database: String) -> Self {
        Self { pool, database }
    }

    fn wait_table_ref(&self) -> String {
        format!("`{}`.`wait_sync_meta`", self.database)
    }

    fn full_table_ref(&self) -> String {
        format!("`{}`.`full_sync_meta`", self.database)
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "YES"
    } else {
        "NO"
    }
}

fn row_to_wait(row: &MySqlRow) -> Result<WaitSyncMeta> {
    let status: String = row.try_get("task_status")?;
    let is_partition: String = row.try_get("is_partition")?;
    Ok(WaitSyncMeta {
        table_s: row.try_get("table_s")?,
        status: TaskStatus::parse(&status)?,
        snapshot_id: row.try_get("snapshot_id")?,
        chunk_total: row.try_get("chunk_total")?,
        chunk_success: row.try_get("chunk_success")?,
        chunk_failed: row.try_get("chunk_failed")?,
        is_partition: is_partition == "YES",
    })
}

fn row_to_chunk(row: &MySqlRow) -> Result<FullSyncMeta> {
    let status: String = row.try_get("task_status")?;
    let is_partition: String = row.try_get("is_partition")?;
    Ok(FullSyncMeta {
        table_s: row.try_get("table_s")?,
        schema_t: row.try_get("schema_t")?,
        table_t: row.try_get("table_t")?,
        snapshot_id: row.try_get("snapshot_id")?,
        column_projection: row.try_get("column_projection")?,
        chunk_predicate: row.try_get("chunk_predicate")?,
        status: TaskStatus::parse(&status)?,
        info_detail: row.try_get("info_detail")?,
        error_detail: row.try_get("error_detail")?,
        is_partition: is_partition == "YES",
    })
}

/// SET clause for a wait_sync_meta patch. Patch values are program-generated
/// (status literals, counters), so they are inlined; row keys stay bound.
fn patch_set_clause(patch: &WaitSyncPatch) -> String {
    let mut set = Vec::new();
    if let Some(status) = patch.status {
        set.push(format!("task_status = '{}'", status.as_str()));
    }
    if let Some(snapshot_id) = patch.snapshot_id {
        set.push(format!("snapshot_id = {}", snapshot_id));
    }
    if let Some(chunk_total) = patch.chunk_total {
        set.push(format!("chunk_total = {}", chunk_total));
    }
    if let Some(chunk_success) = patch.chunk_success {
        set.push(format!("chunk_success = {}", chunk_success));
    }
    if let Some(chunk_failed) = patch.chunk_failed {
        set.push(format!("chunk_failed = {}", chunk_failed));
    }
    if let Some(is_partition) = patch.is_partition {
        set.push(format!("is_partition = '{}'", yes_no(is_partition)));
    }
    set.join(", ")
}

#[async_trait]
impl MetaStore for MysqlMetaStore {
    async fn init_schema(&self) -> Result<()> {
        let sql = format!("CREATE DATABASE IF NOT EXISTS `{}`", self.database);
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| MigrateError::meta(e, "creating metadata database"))?;

        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                db_kind_s VARCHAR(16) NOT NULL,
                db_kind_t VARCHAR(16) NOT NULL,
                schema_s VARCHAR(128) NOT NULL,
                table_s VARCHAR(128) NOT NULL,
                task_mode VARCHAR(64) NOT NULL,
                task_status VARCHAR(16) NOT NULL DEFAULT 'WAITING',
                snapshot_id BIGINT UNSIGNED NOT NULL DEFAULT 0,
                chunk_total BIGINT NOT NULL DEFAULT 0,
                chunk_success BIGINT NOT NULL DEFAULT 0,
                chunk_failed BIGINT NOT NULL DEFAULT 0,
                is_partition VARCHAR(3) NOT NULL DEFAULT 'NO',
                created_at DATETIME(6) NOT NULL DEFAULT CURRENT_TIMESTAMP(6),
                updated_at DATETIME(6) NOT NULL DEFAULT CURRENT_TIMESTAMP(6) ON UPDATE CURRENT_TIMESTAMP(6),
                PRIMARY KEY (db_kind_s, db_kind_t, schema_s, table_s, task_mode)
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4",
            self.wait_table_ref()
        );
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| MigrateError::meta(e, "creating wait_sync_meta"))?;

        // chunk_predicate length keeps the composite key under the InnoDB
        // 3072-byte index limit at utf8mb4.
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                db_kind_s VARCHAR(16) NOT NULL,
                db_kind_t VARCHAR(16) NOT NULL,
                schema_s VARCHAR(128) NOT NULL,
                table_s VARCHAR(128) NOT NULL,
                task_mode VARCHAR(64) NOT NULL,
                chunk_predicate VARCHAR(384) NOT NULL,
                schema_t VARCHAR(128) NOT NULL,
                table_t VARCHAR(128) NOT NULL,
                snapshot_id BIGINT UNSIGNED NOT NULL DEFAULT 0,
                column_projection LONGTEXT NOT NULL,
                task_status VARCHAR(16) NOT NULL DEFAULT 'WAITING',
                info_detail LONGTEXT,
                error_detail LONGTEXT,
                is_partition VARCHAR(3) NOT NULL DEFAULT 'NO',
                created_at DATETIME(6) NOT NULL DEFAULT CURRENT_TIMESTAMP(6),
                updated_at DATETIME(6) NOT NULL DEFAULT CURRENT_TIMESTAMP(6) ON UPDATE CURRENT_TIMESTAMP(6),
                PRIMARY KEY (db_kind_s, db_kind_t, schema_s, table_s, task_mode, chunk_predicate),
                INDEX idx_schema_status (schema_s, task_mode, task_status)
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4",
            self.full_table_ref()
        );
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| MigrateError::meta(e, "creating full_sync_meta"))?;

        Ok(())
    }

    async fn create_wait_table(&self, scope: &TaskScope, meta: &WaitSyncMeta) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} (db_kind_s, db_kind_t, schema_s, table_s, task_mode,
                task_status, snapshot_id, chunk_total, chunk_success, chunk_failed, is_partition)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            self.wait_table_ref()
        );
        sqlx::query(&sql)
            .bind(&scope.db_kind_s)
            .bind(&scope.db_kind_t)
            .bind(&scope.schema_s)
            .bind(&meta.table_s)
            .bind(&scope.task_mode)
            .bind(meta.status.as_str())
            .bind(meta.snapshot_id)
            .bind(meta.chunk_total)
            .bind(meta.chunk_success)
            .bind(meta.chunk_failed)
            .bind(yes_no(meta.is_partition))
            .execute(&self.pool)
            .await
            .map_err(|e| MigrateError::meta(e, "creating wait_sync_meta record"))?;
        Ok(())
    }

    async fn wait_table(&self, scope: &TaskScope, table: &str) -> Result<Option<WaitSyncMeta>> {
        let sql = format!(
            "SELECT table_s, task_status, snapshot_id, chunk_total, chunk_success, chunk_failed, is_partition
             FROM {} WHERE {} AND table_s = ?",
            self.wait_table_ref(),
            SCOPE_WHERE
        );
        let row = sqlx::query(&sql)
            .bind(&scope.db_kind_s)
            .bind(&scope.db_kind_t)
            .bind(&scope.schema_s)
            .bind(&scope.task_mode)
            .bind(table)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| MigrateError::meta(e, "loading wait_sync_meta record"))?;
        row.as_ref().map(row_to_wait).transpose()
    }

    async fn wait_tables_by_status(
        &self,
        scope: &TaskScope,
        status: TaskStatus,
    ) -> Result<Vec<WaitSyncMeta>> {
        let sql = format!(
            "SELECT table_s, task_status, snapshot_id, chunk_total, chunk_success, chunk_failed, is_partition
             FROM {} WHERE {} AND task_status = ? ORDER BY table_s",
            self.wait_table_ref(),
            SCOPE_WHERE
        );
        let rows = sqlx::query(&sql)
            .bind(&scope.db_kind_s)
            .bind(&scope.db_kind_t)
            .bind(&scope.schema_s)
            .bind(&scope.task_mode)
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MigrateError::meta(e, "listing wait_sync_meta by status"))?;
        rows.iter().map(row_to_wait).collect()
    }

    async fn fresh_wait_tables(&self, scope: &TaskScope) -> Result<Vec<WaitSyncMeta>> {
        let sql = format!(
            "SELECT table_s, task_status, snapshot_id, chunk_total, chunk_success, chunk_failed, is_partition
             FROM {} WHERE {} AND task_status = 'WAITING' AND snapshot_id = 0 AND chunk_total = 0
             ORDER BY table_s",
            self.wait_table_ref(),
            SCOPE_WHERE
        );
        let rows = sqlx::query(&sql)
            .bind(&scope.db_kind_s)
            .bind(&scope.db_kind_t)
            .bind(&scope.schema_s)
            .bind(&scope.task_mode)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MigrateError::meta(e, "listing fresh wait_sync_meta"))?;
        rows.iter().map(row_to_wait).collect()
    }

    async fn delete_wait_tables(&self, scope: &TaskScope, tables: &[String]) -> Result<()> {
        for table in tables {
            let sql = format!(
                "DELETE FROM {} WHERE {} AND table_s = ?",
                self.wait_table_ref(),
                SCOPE_WHERE
            );
            sqlx::query(&sql)
                .bind(&scope.db_kind_s)
                .bind(&scope.db_kind_t)
                .bind(&scope.schema_s)
                .bind(&scope.task_mode)
                .bind(table)
                .execute(&self.pool)
                .await
                .map_err(|e| MigrateError::meta(e, "deleting wait_sync_meta record"))?;
        }
        Ok(())
    }

    async fn update_wait_table(
        &self,
        scope: &TaskScope,
        table: &str,
        patch: &WaitSyncPatch,
    ) -> Result<()> {
        if patch.is_empty() {
            return Ok(());
        }
        let sql = format!(
            "UPDATE {} SET {} WHERE {} AND table_s = ?",
            self.wait_table_ref(),
            patch_set_clause(patch),
            SCOPE_WHERE
        );
        sqlx::query(&sql)
            .bind(&scope.db_kind_s)
            .bind(&scope.db_kind_t)
            .bind(&scope.schema_s)
            .bind(&scope.task_mode)
            .bind(table)
            .execute(&self.pool)
            .await
            .map_err(|e| MigrateError::meta(e, "updating wait_sync_meta record"))?;
        Ok(())
    }

    async fn count_failed_tables(&self, scope: &TaskScope) -> Result<i64> {
        let sql = format!(
            "SELECT COUNT(*) AS cnt FROM {} WHERE {} AND task_status = 'FAILED'",
            self.wait_table_ref(),
            SCOPE_WHERE
        );
        let row = sqlx::query(&sql)
            .bind(&scope.db_kind_s)
            .bind(&scope.db_kind_t)
            .bind(&scope.schema_s)
            .bind(&scope.task_mode)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MigrateError::meta(e, "counting failed wait_sync_meta"))?;
        Ok(row.try_get("cnt")?)
    }

    async fn batch_insert_chunks(
        &self,
        scope: &TaskScope,
        chunks: &[FullSyncMeta],
        insert_batch_size: usize,
    ) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        let batch_size = insert_batch_size.max(1);

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| MigrateError::meta(e, "starting chunk insert transaction"))?;

        for batch in chunks.chunks(batch_size) {
            let placeholders: Vec<&str> = std::iter::repeat_n(
                "(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                batch.len(),
            )
            .collect();
            let sql = format!(
                "INSERT INTO {} (db_kind_s, db_kind_t, schema_s, table_s, task_mode,
                    chunk_predicate, schema_t, table_t, snapshot_id, column_projection,
                    task_status, info_detail, error_detail, is_partition)
                 VALUES {}",
                self.full_table_ref(),
                placeholders.join(", ")
            );

            let mut query = sqlx::query(&sql);
            for chunk in batch {
                query = query
                    .bind(&scope.db_kind_s)
                    .bind(&scope.db_kind_t)
                    .bind(&scope.schema_s)
                    .bind(&chunk.table_s)
                    .bind(&scope.task_mode)
                    .bind(&chunk.chunk_predicate)
                    .bind(&chunk.schema_t)
                    .bind(&chunk.table_t)
                    .bind(chunk.snapshot_id)
                    .bind(&chunk.column_projection)
                    .bind(chunk.status.as_str())
                    .bind(&chunk.info_detail)
                    .bind(&chunk.error_detail)
                    .bind(yes_no(chunk.is_partition));
            }
            query
                .execute(&mut *tx)
                .await
                .map_err(|e| MigrateError::meta(e, "batch inserting full_sync_meta"))?;
        }

        tx.commit()
            .await
            .map_err(|e| MigrateError::meta(e, "committing chunk insert transaction"))?;

        debug!("inserted {} full_sync_meta records", chunks.len());
        Ok(())
    }

    async fn waiting_chunks(&self, scope: &TaskScope, table: &str) -> Result<Vec<FullSyncMeta>> {
        let sql = format!(
            "SELECT table_s, schema_t, table_t, snapshot_id, column_projection, chunk_predicate,
                    task_status, COALESCE(info_detail, '') AS info_detail,
                    COALESCE(error_detail, '') AS error_detail, is_partition
             FROM {} WHERE {} AND table_s = ? AND task_status = 'WAITING'",
            self.full_table_ref(),
            SCOPE_WHERE
        );
        let rows = sqlx::query(&sql)
            .bind(&scope.db_kind_s)
            .bind(&scope.db_kind_t)
            .bind(&scope.schema_s)
            .bind(&scope.task_mode)
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MigrateError::meta(e, "listing waiting full_sync_meta"))?;
        rows.iter().map(row_to_chunk).collect()
    }

    async fn waiting_chunk_tables(&self, scope: &TaskScope) -> Result<Vec<String>> {
        let sql = format!(
            "SELECT DISTINCT table_s FROM {} WHERE {} AND task_status = 'WAITING' ORDER BY table_s",
            self.full_table_ref(),
            SCOPE_WHERE
        );
        let rows = sqlx::query(&sql)
            .bind(&scope.db_kind_s)
            .bind(&scope.db_kind_t)
            .bind(&scope.schema_s)
            .bind(&scope.task_mode)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MigrateError::meta(e, "listing tables with waiting chunks"))?;
        rows.iter()
            .map(|r| r.try_get::<String, _>("table_s").map_err(Into::into))
            .collect()
    }

    async fn count_chunks(&self, scope: &TaskScope, table: &str) -> Result<i64> {
        let sql = format!(
            "SELECT COUNT(*) AS cnt FROM {} WHERE {} AND table_s = ?",
            self.full_table_ref(),
            SCOPE_WHERE
        );
        let row = sqlx::query(&sql)
            .bind(&scope.db_kind_s)
            .bind(&scope.db_kind_t)
            .bind(&scope.schema_s)
            .bind(&scope.task_mode)
            .bind(table)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MigrateError::meta(e, "counting full_sync_meta"))?;
        Ok(row.try_get("cnt")?)
    }

    async fn count_failed_chunks(&self, scope: &TaskScope, table: &str) -> Result<i64> {
        let sql = format!(
            "SELECT COUNT(*) AS cnt FROM {} WHERE {} AND table_s = ? AND task_status = 'FAILED'",
            self.full_table_ref(),
            SCOPE_WHERE
        );
        let row = sqlx::query(&sql)
            .bind(&scope.db_kind_s)
            .bind(&scope.db_kind_t)
            .bind(&scope.schema_s)
            .bind(&scope.task_mode)
            .bind(table)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MigrateError::meta(e, "counting failed full_sync_meta"))?;
        Ok(row.try_get("cnt")?)
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
        let sql = format!(
            "UPDATE {} SET task_status = ?, info_detail = COALESCE(?, info_detail),
                    error_detail = COALESCE(?, error_detail)
             WHERE {} AND table_s = ? AND chunk_predicate = ?",
            self.full_table_ref(),
            SCOPE_WHERE
        );
        sqlx::query(&sql)
            .bind(status.as_str())
            .bind(info_detail)
            .bind(error_detail)
            .bind(&scope.db_kind_s)
            .bind(&scope.db_kind_t)
            .bind(&scope.schema_s)
            .bind(&scope.task_mode)
            .bind(table)
            .bind(predicate)
            .execute(&self.pool)
            .await
            .map_err(|e| MigrateError::meta(e, "updating full_sync_meta record"))?;
        Ok(())
    }

    async fn delete_chunks_by_schema(&self, scope: &TaskScope) -> Result<()> {
        let sql = format!(
            "DELETE FROM {} WHERE {}",
            self.full_table_ref(),
            SCOPE_WHERE
        );
        sqlx::query(&sql)
            .bind(&scope.db_kind_s)
            .bind(&scope.db_kind_t)
            .bind(&scope.schema_s)
            .bind(&scope.task_mode)
            .execute(&self.pool)
            .await
            .map_err(|e| MigrateError::meta(e, "deleting full_sync_meta by schema"))?;
        Ok(())
    }

    async fn create_chunks_and_update_table(
        &self,
        scope: &TaskScope,
        chunks: &[FullSyncMeta],
        table: &str,
        patch: &WaitSyncPatch,
    ) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| MigrateError::meta(e, "starting create-and-update transaction"))?;

        for chunk in chunks {
            let sql = format!(
                "INSERT INTO {} (db_kind_s, db_kind_t, schema_s, table_s, task_mode,
                    chunk_predicate, schema_t, table_t, snapshot_id, column_projection,
                    task_status, info_detail, error_detail, is_partition)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                self.full_table_ref()
            );
            sqlx::query(&sql)
                .bind(&scope.db_kind_s)
                .bind(&scope.db_kind_t)
                .bind(&scope.schema_s)
                .bind(&chunk.table_s)
                .bind(&scope.task_mode)
                .bind(&chunk.chunk_predicate)
                .bind(&chunk.schema_t)
                .bind(&chunk.table_t)
                .bind(chunk.snapshot_id)
                .bind(&chunk.column_projection)
                .bind(chunk.status.as_str())
                .bind(&chunk.info_detail)
                .bind(&chunk.error_detail)
                .bind(yes_no(chunk.is_partition))
                .execute(&mut *tx)
                .await
                .map_err(|e| MigrateError::meta(e, "inserting full_sync_meta record"))?;
        }

        if !patch.is_empty() {
            let sql = format!(
                "UPDATE {} SET {} WHERE {} AND table_s = ?",
                self.wait_table_ref(),
                patch_set_clause(patch),
                SCOPE_WHERE
            );
            sqlx::query(&sql)
                .bind(&scope.db_kind_s)
                .bind(&scope.db_kind_t)
                .bind(&scope.schema_s)
                .bind(&scope.task_mode)
                .bind(table)
                .execute(&mut *tx)
                .await
                .map_err(|e| MigrateError::meta(e, "updating wait_sync_meta record"))?;
        }

        tx.commit()
            .await
            .map_err(|e| MigrateError::meta(e, "committing create-and-update transaction"))?;
        Ok(())
    }

    async fn delete_chunks_and_update_table(
        &self,
        scope: &TaskScope,
        table: &str,
        patch: &WaitSyncPatch,
    ) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| MigrateError::meta(e, "starting delete-and-update transaction"))?;

        let sql = format!(
            "DELETE FROM {} WHERE {} AND table_s = ?",
            self.full_table_ref(),
            SCOPE_WHERE
        );
        sqlx::query(&sql)
            .bind(&scope.db_kind_s)
            .bind(&scope.db_kind_t)
            .bind(&scope.schema_s)
            .bind(&scope.task_mode)
            .bind(table)
            .execute(&mut *tx)
            .await
            .map_err(|e| MigrateError::meta(e, "deleting full_sync_meta records"))?;

        if !patch.is_empty() {
            let sql = format!(
                "UPDATE {} SET {} WHERE {} AND table_s = ?",
                self.wait_table_ref(),
                patch_set_clause(patch),
                SCOPE_WHERE
            );
            sqlx::query(&sql)
                .bind(&scope.db_kind_s)
                .bind(&scope.db_kind_t)
                .bind(&scope.schema_s)
                .bind(&scope.task_mode)
                .bind(table)
                .execute(&mut *tx)
                .await
                .map_err(|e| MigrateError::meta(e, "updating wait_sync_meta record"))?;
        }

        tx.commit()
            .await
            .map_err(|e| MigrateError::meta(e, "committing delete-and-update transaction"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yes_no() {
        assert_eq!(yes_no(true), "YES");
        assert_eq!(yes_no(false), "NO");
    }

    #[test]
    fn test_patch_set_clause() {
        let patch = WaitSyncPatch {
            status: Some(TaskStatus::Failed),
            chunk_success: Some(7),
            chunk_failed: Some(3),
            ..Default::default()
        };
        assert_eq!(
            patch_set_clause(&patch),
            "task_status = 'FAILED', chunk_success = 7, chunk_failed = 3"
        );
    }

    #[test]
    fn test_patch_set_clause_snapshot_and_partition() {
        let patch = WaitSyncPatch {
            snapshot_id: Some(470394),
            chunk_total: Some(10),
            is_partition: Some(true),
            ..Default::default()
        };
        assert_eq!(
            patch_set_clause(&patch),
            "snapshot_id = 470394, chunk_total = 10, is_partition = 'YES'"
        );
    }
}
