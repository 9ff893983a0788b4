//! Migration orchestrator - full-load workflow coordinator.
//!
//! Drives the planned tables through two nested bounded-parallel groups:
//! one task per table (outer, `table_threads`), one task per WAITING chunk
//! of that table (inner, `chunk_threads`). Every state transition lands in
//! the metadata store, which is the sole synchronization point; chunk
//! failures are recorded there and swallowed so sibling chunks keep going.

mod chunker;
mod planner;
#[cfg(test)]
pub(crate) mod testkit;

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::core::traits::{ChunkQuery, SinkWriter, SourceClient, SourceReader};
use crate::drivers::mysql::MysqlWriter;
use crate::drivers::oracle::OracleReader;
use crate::error::{MigrateError, Result};
use crate::state::{FullSyncMeta, MetaStore, MysqlMetaStore, TaskScope, TaskStatus, WaitSyncPatch};

/// Shared, explicit context plumbed through planner, chunker and driver.
/// No process-wide state exists outside this value.
#[derive(Clone)]
pub(crate) struct EngineContext {
    pub config: Arc<Config>,
    pub reader: Arc<dyn SourceReader>,
    pub writer: Arc<dyn SinkWriter>,
    pub meta: Arc<dyn MetaStore>,
    pub cancel: CancellationToken,
    pub scope: TaskScope,
}

/// Migration orchestrator.
pub struct Orchestrator {
    config: Arc<Config>,
    reader: Arc<dyn SourceReader>,
    writer: Arc<dyn SinkWriter>,
    meta: Arc<dyn MetaStore>,
}

/// Result of a full-load run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationReport {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status: "success" or "failed".
    pub status: String,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the run completed.
    pub completed_at: DateTime<Utc>,

    /// Configured tables after filtering.
    pub tables_total: usize,

    /// Tables in SUCCESS at the end of the run.
    pub tables_success: usize,

    /// Tables in FAILED at the end of the run.
    pub tables_failed: usize,

    /// Names of failed tables.
    pub failed_tables: Vec<String>,
}

impl MigrationReport {
    /// Convert to a JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Orchestrator {
    /// Create an orchestrator over already-constructed components.
    pub fn new(
        config: Config,
        reader: Arc<dyn SourceReader>,
        writer: Arc<dyn SinkWriter>,
        meta: Arc<dyn MetaStore>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            reader,
            writer,
            meta,
        }
    }

    /// Connect the MySQL sink and metadata store and wrap the supplied
    /// source driver in the Oracle reader.
    pub async fn connect(config: Config, source: Arc<dyn SourceClient>) -> Result<Self> {
        let sink_conns = config.full.table_threads * config.full.chunk_threads + 4;
        let writer = MysqlWriter::connect(&config.target, sink_conns).await?;
        let meta_conns = config.full.table_threads + config.full.task_threads + 4;
        let meta = MysqlMetaStore::connect(&config.meta_config(), meta_conns).await?;
        let reader = OracleReader::new(source);
        Ok(Self::new(
            config,
            Arc::new(reader),
            Arc::new(writer),
            Arc::new(meta),
        ))
    }

    /// Run the full load: plan, chunk fresh tables, drive everything.
    ///
    /// Interrupted tables (prior RUNNING) are driven first - they already
    /// have chunks on record. The cancellation token is raced against every
    /// chunk's extract and apply.
    pub async fn run(&self, cancel: CancellationToken) -> Result<MigrationReport> {
        let started_at = Utc::now();
        let start = Instant::now();
        let run_id = Uuid::new_v4().to_string();

        let ctx = EngineContext {
            config: self.config.clone(),
            reader: self.reader.clone(),
            writer: self.writer.clone(),
            meta: self.meta.clone(),
            cancel,
            scope: TaskScope::oracle_to_mysql(
                self.config.source.schema_upper(),
                self.config.task_mode.clone(),
            ),
        };

        info!(
            run_id = %run_id,
            schema = %ctx.scope.schema_s,
            "source schema full table data sync start"
        );

        ctx.meta.init_schema().await?;
        let plan = planner::plan(&ctx).await?;

        if !plan.part_tables.is_empty() {
            drive_tables(&ctx, &plan.part_tables).await?;
        }
        if !plan.wait_tables.is_empty() {
            chunker::init_chunks(&ctx, &plan.wait_tables, plan.collation_aware).await?;
            drive_tables(&ctx, &plan.wait_tables).await?;
        }

        let success = ctx
            .meta
            .wait_tables_by_status(&ctx.scope, TaskStatus::Success)
            .await?;
        let failed = ctx
            .meta
            .wait_tables_by_status(&ctx.scope, TaskStatus::Failed)
            .await?;
        let completed_at = Utc::now();

        info!(
            schema = %ctx.scope.schema_s,
            tables_total = plan.exporters.len(),
            tables_success = success.len(),
            tables_failed = failed.len(),
            cost = ?start.elapsed(),
            "all full table data sync finished, failed tables are kept in wait_sync_meta/full_sync_meta"
        );

        Ok(MigrationReport {
            run_id,
            status: if failed.is_empty() {
                "success".to_string()
            } else {
                "failed".to_string()
            },
            duration_seconds: start.elapsed().as_secs_f64(),
            started_at,
            completed_at,
            tables_total: plan.exporters.len(),
            tables_success: success.len(),
            tables_failed: failed.len(),
            failed_tables: failed.into_iter().map(|m| m.table_s).collect(),
        })
    }
}

/// Outer group: one task per table, bounded by `table_threads`. A
/// table-scoped error cancels the siblings and propagates.
async fn drive_tables(ctx: &EngineContext, tables: &[String]) -> Result<()> {
    let start = Instant::now();
    let semaphore = Arc::new(Semaphore::new(ctx.config.full.table_threads));
    let mut workers: JoinSet<Result<()>> = JoinSet::new();

    for table in tables {
        if ctx.cancel.is_cancelled() {
            return Err(MigrateError::Cancelled);
        }
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| MigrateError::meta(e, "acquiring table permit"))?;
        let ctx = ctx.clone();
        let table = table.clone();
        workers.spawn(async move {
            let _permit = permit;
            drive_table(&ctx, &table).await
        });
    }

    let mut first_err: Option<MigrateError> = None;
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                ctx.cancel.cancel();
                workers.abort_all();
                first_err.get_or_insert(e);
            }
            Err(e) if e.is_cancelled() => {}
            Err(e) => std::panic::resume_unwind(e.into_panic()),
        }
    }
    if let Some(e) = first_err {
        return Err(e);
    }

    info!(
        schema = %ctx.scope.schema_s,
        tables = tables.len(),
        cost = ?start.elapsed(),
        "table group finished"
    );
    Ok(())
}

/// Per-table task: mark RUNNING, run the WAITING chunks in the inner group,
/// then settle the table from the recorded chunk outcomes.
async fn drive_table(ctx: &EngineContext, table: &str) -> Result<()> {
    let start = Instant::now();
    let scope = &ctx.scope;

    ctx.meta
        .update_wait_table(scope, table, &WaitSyncPatch::status(TaskStatus::Running))
        .await?;

    let wait = ctx
        .meta
        .wait_table(scope, table)
        .await?
        .ok_or_else(|| MigrateError::meta("wait_sync_meta record vanished", table.to_string()))?;
    let chunks = ctx.meta.waiting_chunks(scope, table).await?;

    let semaphore = Arc::new(Semaphore::new(ctx.config.full.chunk_threads));
    let mut workers: JoinSet<Result<()>> = JoinSet::new();
    for chunk in chunks {
        if ctx.cancel.is_cancelled() {
            return Err(MigrateError::Cancelled);
        }
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| MigrateError::meta(e, "acquiring chunk permit"))?;
        let ctx = ctx.clone();
        workers.spawn(async move {
            let _permit = permit;
            run_chunk(&ctx, &chunk).await
        });
    }

    let mut first_err: Option<MigrateError> = None;
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                // Only metadata failures and cancellation surface here;
                // they abort the table and, upstream, the run.
                workers.abort_all();
                first_err.get_or_insert(e);
            }
            Err(e) if e.is_cancelled() => {}
            Err(e) => std::panic::resume_unwind(e.into_panic()),
        }
    }
    if let Some(e) = first_err {
        return Err(e);
    }

    let failed = ctx.meta.count_failed_chunks(scope, table).await?;
    if failed == 0 {
        // Chunk rows are garbage-collected together with the SUCCESS flip.
        ctx.meta
            .delete_chunks_and_update_table(
                scope,
                table,
                &WaitSyncPatch {
                    status: Some(TaskStatus::Success),
                    chunk_success: Some(wait.chunk_total),
                    chunk_failed: Some(0),
                    ..Default::default()
                },
            )
            .await?;
        info!(
            schema = %scope.schema_s,
            table,
            cost = ?start.elapsed(),
            "full single table data sync finished"
        );
    } else {
        ctx.meta
            .update_wait_table(
                scope,
                table,
                &WaitSyncPatch {
                    status: Some(TaskStatus::Failed),
                    chunk_success: Some(wait.chunk_total - failed),
                    chunk_failed: Some(failed),
                    ..Default::default()
                },
            )
            .await?;
        warn!(
            schema = %scope.schema_s,
            table,
            chunk_failed = failed,
            cost = ?start.elapsed(),
            "table finished with failed chunks, full_sync_meta rows kept for inspection"
        );
    }
    Ok(())
}

/// One chunk: Extract -> Translate -> Apply, with the outcome recorded.
///
/// An extract/apply failure is written to the chunk's record and swallowed.
/// A failure while writing that record aborts the table - resume would
/// otherwise lose track of the chunk.
async fn run_chunk(ctx: &EngineContext, chunk: &FullSyncMeta) -> Result<()> {
    let scope = &ctx.scope;
    ctx.meta
        .update_chunk_status(
            scope,
            &chunk.table_s,
            &chunk.chunk_predicate,
            TaskStatus::Running,
            None,
            None,
        )
        .await?;

    match extract_and_apply(ctx, chunk).await {
        Ok(()) => {
            ctx.meta
                .update_chunk_status(
                    scope,
                    &chunk.table_s,
                    &chunk.chunk_predicate,
                    TaskStatus::Success,
                    None,
                    None,
                )
                .await?;
            Ok(())
        }
        Err(MigrateError::Cancelled) => {
            // Best effort: a cancelled chunk that reaches the store is
            // FAILED, others stay RUNNING/WAITING for the resume path.
            let info = chunk.describe(scope);
            let _ = ctx
                .meta
                .update_chunk_status(
                    scope,
                    &chunk.table_s,
                    &chunk.chunk_predicate,
                    TaskStatus::Failed,
                    Some(info.as_str()),
                    Some("migration cancelled"),
                )
                .await;
            Err(MigrateError::Cancelled)
        }
        Err(e) => {
            warn!(
                schema = %scope.schema_s,
                table = %chunk.table_s,
                predicate = %chunk.chunk_predicate,
                error = %e,
                "chunk failed, sibling chunks continue"
            );
            let info = chunk.describe(scope);
            let error = e.to_string();
            ctx.meta
                .update_chunk_status(
                    scope,
                    &chunk.table_s,
                    &chunk.chunk_predicate,
                    TaskStatus::Failed,
                    Some(info.as_str()),
                    Some(error.as_str()),
                )
                .await
                .map_err(|errf| {
                    MigrateError::meta(
                        errf,
                        format!("recording chunk failure for table {}", chunk.table_s),
                    )
                })?;
            Ok(())
        }
    }
}

async fn extract_and_apply(ctx: &EngineContext, chunk: &FullSyncMeta) -> Result<()> {
    let scope = &ctx.scope;

    // Extract
    let query = ChunkQuery {
        schema: &scope.schema_s,
        table: &chunk.table_s,
        projection: &chunk.column_projection,
        predicate: &chunk.chunk_predicate,
        snapshot_id: chunk.snapshot_id,
    };
    let extracted = tokio::select! {
        _ = ctx.cancel.cancelled() => return Err(MigrateError::Cancelled),
        res = ctx
            .reader
            .stream_rows(query, ctx.config.full.insert_batch_size) => res?,
    };

    // Translate
    let batches = translate(extracted.batches);

    // Apply
    for batch in &batches {
        tokio::select! {
            _ = ctx.cancel.cancelled() => return Err(MigrateError::Cancelled),
            res = ctx
                .writer
                .apply_batch(&chunk.schema_t, &chunk.table_t, &extracted.columns, batch) => {
                res?;
            }
        }
    }
    Ok(())
}

/// Identity pass today; kept as a named stage so transforms can slot in
/// between extract and apply.
fn translate(batches: Vec<String>) -> Vec<String> {
    batches
}
