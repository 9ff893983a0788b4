//! Chunk initialization for fresh tables.
//!
//! Each fresh table gets its projection, partition stamp and snapshot id,
//! then is split into row-id ranges. Everything is recorded in the metadata
//! store before the table becomes eligible for driving; the snapshot
//! captured here is the read point for every later chunk of the table.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use super::EngineContext;
use crate::drivers::oracle::dialect::build_projection;
use crate::error::{MigrateError, Result};
use crate::state::{FullSyncMeta, TaskStatus, WaitSyncPatch};

/// Chunk every fresh table, bounded by `task_threads`.
pub async fn init_chunks(ctx: &EngineContext, tables: &[String], collation_aware: bool) -> Result<()> {
    let start = Instant::now();
    let partitioned = ctx
        .reader
        .list_partitioned_tables(&ctx.scope.schema_s)
        .await?;

    let semaphore = Arc::new(Semaphore::new(ctx.config.full.task_threads));
    let mut workers: JoinSet<Result<()>> = JoinSet::new();

    for (worker_idx, table) in tables.iter().enumerate() {
        if ctx.cancel.is_cancelled() {
            return Err(MigrateError::Cancelled);
        }
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| MigrateError::meta(e, "acquiring chunker permit"))?;
        let ctx = ctx.clone();
        let table = table.clone();
        let is_partition = partitioned.contains(&table);
        workers.spawn(async move {
            let _permit = permit;
            init_table_chunks(&ctx, &table, worker_idx, collation_aware, is_partition).await
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
        "chunk metadata initialized"
    );
    Ok(())
}

/// Chunk one fresh table and record the result.
async fn init_table_chunks(
    ctx: &EngineContext,
    table: &str,
    worker_idx: usize,
    collation_aware: bool,
    is_partition: bool,
) -> Result<()> {
    let start = Instant::now();
    let scope = &ctx.scope;
    let schema_t = ctx.config.target.schema_upper();
    let target_table = ctx.config.full.target_table_name(table);

    let columns = ctx
        .reader
        .describe_columns(&scope.schema_s, table, collation_aware)
        .await?;
    let projection = build_projection(&columns);

    let snapshot_id = ctx.reader.current_snapshot().await?;

    let chunk = |predicate: String| FullSyncMeta {
        table_s: table.to_string(),
        schema_t: schema_t.clone(),
        table_t: target_table.clone(),
        snapshot_id,
        column_projection: projection.clone(),
        chunk_predicate: predicate,
        status: TaskStatus::Waiting,
        info_detail: String::new(),
        error_detail: String::new(),
        is_partition,
    };
    let table_patch = |chunk_total: i64| WaitSyncPatch {
        snapshot_id: Some(snapshot_id),
        chunk_total: Some(chunk_total),
        chunk_success: Some(0),
        chunk_failed: Some(0),
        is_partition: Some(is_partition),
        ..Default::default()
    };

    // Statistics report no rows: one full-scan chunk.
    let statistic_rows = ctx.reader.row_statistic(&scope.schema_s, table).await?;
    if statistic_rows == 0 {
        warn!(
            schema = %scope.schema_s,
            table,
            "no rows in statistics, using a single full-scan chunk"
        );
        ctx.meta
            .create_chunks_and_update_table(scope, &[chunk("1 = 1".to_string())], table, &table_patch(1))
            .await?;
        return Ok(());
    }

    let task_name = format!("{}_{}_TASK{}", scope.schema_s, table, worker_idx);
    let predicates = ctx
        .reader
        .create_row_chunks(
            &task_name,
            &scope.schema_s,
            table,
            ctx.config.full.rows_per_chunk,
        )
        .await?;

    // The chunk task found no rows either.
    if predicates.is_empty() {
        warn!(
            schema = %scope.schema_s,
            table,
            "row-id chunking produced no ranges, using a single full-scan chunk"
        );
        ctx.meta
            .create_chunks_and_update_table(scope, &[chunk("1 = 1".to_string())], table, &table_patch(1))
            .await?;
        return Ok(());
    }

    let chunks: Vec<FullSyncMeta> = predicates.into_iter().map(chunk).collect();
    let total = chunks.len() as i64;
    ctx.meta
        .batch_insert_chunks(scope, &chunks, ctx.config.full.insert_batch_size)
        .await?;
    ctx.meta
        .update_wait_table(scope, table, &table_patch(total))
        .await?;

    info!(
        schema = %scope.schema_s,
        table,
        chunks = total,
        snapshot_id,
        cost = ?start.elapsed(),
        "table chunk metadata recorded"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::testkit::{context, test_config, MemoryMetaStore, MockReader, MockTable, MockWriter};
    use super::*;
    use crate::state::{TaskScope, WaitSyncMeta};
    use std::collections::HashSet;
    use std::sync::Arc;

    fn scope() -> TaskScope {
        TaskScope::oracle_to_mysql("MARVIN", "FULL")
    }

    #[tokio::test]
    async fn test_fresh_table_split_into_row_chunks() {
        let predicates: Vec<String> = (0..10)
            .map(|i| format!("ROWID BETWEEN 'A{}' AND 'A{}'", i, i + 1))
            .collect();
        let mut reader = MockReader::default();
        reader.tables.insert(
            "T1".to_string(),
            MockTable {
                statistic_rows: 1_000_000,
                predicates: predicates.clone(),
                ..MockTable::default()
            },
        );

        let meta = Arc::new(MemoryMetaStore::default());
        meta.seed_wait(&scope(), WaitSyncMeta::waiting("T1"));
        let reader = Arc::new(reader);
        let ctx = context(
            test_config(),
            reader.clone(),
            Arc::new(MockWriter::default()),
            meta.clone(),
        );

        init_chunks(&ctx, &["T1".to_string()], true).await.unwrap();

        let chunks = meta.chunk_rows();
        assert_eq!(chunks.len(), 10);
        // Every chunk of the table reads at one snapshot.
        let snapshots: HashSet<u64> = chunks.iter().map(|c| c.snapshot_id).collect();
        assert_eq!(snapshots.len(), 1);
        assert!(snapshots.contains(&470394));
        assert!(chunks.iter().all(|c| c.status == TaskStatus::Waiting));
        let recorded: Vec<String> = chunks.iter().map(|c| c.chunk_predicate.clone()).collect();
        assert_eq!(recorded, predicates);

        let wait = meta.wait_rows().into_iter().next().unwrap();
        assert_eq!(wait.chunk_total, 10);
        assert_eq!(wait.snapshot_id, 470394);
        assert_eq!(wait.chunk_success, 0);
        assert_eq!(wait.chunk_failed, 0);

        let calls = reader.chunk_task_calls.lock().unwrap().clone();
        assert_eq!(calls, vec!["MARVIN_T1_TASK0".to_string()]);
    }

    #[tokio::test]
    async fn test_empty_table_gets_full_scan_chunk() {
        let mut reader = MockReader::default();
        reader.tables.insert("EMPTY".to_string(), MockTable::default());

        let meta = Arc::new(MemoryMetaStore::default());
        meta.seed_wait(&scope(), WaitSyncMeta::waiting("EMPTY"));
        let reader = Arc::new(reader);
        let ctx = context(
            test_config(),
            reader.clone(),
            Arc::new(MockWriter::default()),
            meta.clone(),
        );

        init_chunks(&ctx, &["EMPTY".to_string()], false).await.unwrap();

        let chunks = meta.chunk_rows();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_predicate, "1 = 1");
        let wait = meta.wait_rows().into_iter().next().unwrap();
        assert_eq!(wait.chunk_total, 1);
        // No chunk task is created for a statistically empty table.
        assert!(reader.chunk_task_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_chunk_list_falls_back_to_full_scan() {
        let mut reader = MockReader::default();
        reader.tables.insert(
            "T1".to_string(),
            MockTable {
                statistic_rows: 42,
                predicates: Vec::new(),
                ..MockTable::default()
            },
        );

        let meta = Arc::new(MemoryMetaStore::default());
        meta.seed_wait(&scope(), WaitSyncMeta::waiting("T1"));
        let ctx = context(
            test_config(),
            Arc::new(reader),
            Arc::new(MockWriter::default()),
            meta.clone(),
        );

        init_chunks(&ctx, &["T1".to_string()], false).await.unwrap();

        let chunks = meta.chunk_rows();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_predicate, "1 = 1");
    }

    #[tokio::test]
    async fn test_partitioned_table_is_stamped() {
        let mut reader = MockReader::default();
        reader.tables.insert(
            "PART".to_string(),
            MockTable {
                partitioned: true,
                ..MockTable::default()
            },
        );

        let meta = Arc::new(MemoryMetaStore::default());
        meta.seed_wait(&scope(), WaitSyncMeta::waiting("PART"));
        let ctx = context(
            test_config(),
            Arc::new(reader),
            Arc::new(MockWriter::default()),
            meta.clone(),
        );

        init_chunks(&ctx, &["PART".to_string()], false).await.unwrap();

        assert!(meta.chunk_rows()[0].is_partition);
        assert!(meta.wait_rows()[0].is_partition);
    }

    #[tokio::test]
    async fn test_target_table_rename_rule_applies() {
        let mut reader = MockReader::default();
        reader.tables.insert("ORDERS".to_string(), MockTable::default());

        let mut config = test_config();
        config
            .full
            .table_name_rules
            .insert("orders".to_string(), "orders_new".to_string());

        let meta = Arc::new(MemoryMetaStore::default());
        meta.seed_wait(&scope(), WaitSyncMeta::waiting("ORDERS"));
        let ctx = context(config, Arc::new(reader), Arc::new(MockWriter::default()), meta.clone());

        init_chunks(&ctx, &["ORDERS".to_string()], false).await.unwrap();

        let chunks = meta.chunk_rows();
        assert_eq!(chunks[0].table_t, "ORDERS_NEW");
        assert_eq!(chunks[0].schema_t, "MARVIN");
    }
}
