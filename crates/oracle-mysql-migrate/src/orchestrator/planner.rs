//! Full-load planner.
//!
//! Runs once at start, strictly before any table is driven. The step order
//! is load-bearing: version gate, exporter filtering, prior-state
//! reconciliation, failure gate, bootstrap, optional checkpoint wipe, then
//! classification of resumable and fresh tables.

use std::collections::HashSet;

use tracing::{info, warn};

use super::EngineContext;
use crate::drivers::oracle::dialect::{
    version_at_least, COLLATION_ORACLE_VERSION, REQUIRED_ORACLE_VERSION,
};
use crate::error::{MigrateError, Result};
use crate::state::{TaskStatus, WaitSyncMeta};

/// Outcome of planning: what to resume and what to chunk fresh.
#[derive(Debug)]
pub struct Plan {
    /// Catalog reports per-column collation (12.2+).
    pub collation_aware: bool,

    /// Configured table set after include/exclude filtering.
    pub exporters: Vec<String>,

    /// Tables interrupted mid-apply; they already have chunks and are driven
    /// first.
    pub part_tables: Vec<String>,

    /// Tables never chunked; the chunker runs before they are driven.
    pub wait_tables: Vec<String>,
}

/// Execute planner steps 1-8.
pub async fn plan(ctx: &EngineContext) -> Result<Plan> {
    let scope = &ctx.scope;
    let schema_s = scope.schema_s.clone();

    // 1. Source version baseline.
    let version = ctx.reader.version().await?;
    if !version_at_least(&version, REQUIRED_ORACLE_VERSION) {
        return Err(MigrateError::Config(format!(
            "source version [{}] is below the required baseline [{}]",
            version, REQUIRED_ORACLE_VERSION
        )));
    }
    let collation_aware = version_at_least(&version, COLLATION_ORACLE_VERSION);

    // 2. Configured table set.
    let all_tables = ctx.reader.schema_tables(&schema_s).await?;
    let exporters = filter_tables(
        &all_tables,
        &ctx.config.full.include_tables,
        &ctx.config.full.exclude_tables,
    )?;
    let exporter_set: HashSet<&String> = exporters.iter().collect();

    // 3. Reconcile prior SUCCESS records: tables no longer configured are
    // cleared, still-configured ones are skipped this run.
    let prior_success: Vec<String> = ctx
        .meta
        .wait_tables_by_status(scope, TaskStatus::Success)
        .await?
        .into_iter()
        .map(|m| m.table_s)
        .collect();
    let clear_tables: Vec<String> = prior_success
        .iter()
        .filter(|t| !exporter_set.contains(t))
        .cloned()
        .collect();
    let skip_tables: Vec<String> = prior_success
        .iter()
        .filter(|t| exporter_set.contains(t))
        .cloned()
        .collect();
    if !clear_tables.is_empty() {
        ctx.meta.delete_wait_tables(scope, &clear_tables).await?;
    }
    warn!(
        schema = %schema_s,
        cleared = ?clear_tables,
        skipped = ?skip_tables,
        "reconciled prior successful tables"
    );

    // 4. Gate: any FAILED table task blocks the whole run.
    let failed_totals = ctx.meta.count_failed_tables(scope).await?;
    if failed_totals > 0 {
        return Err(MigrateError::Gate(format!(
            "schema [{}] task mode [{}] has {} failed table record(s) in wait_sync_meta. \
             Check the logs, reset task_status to WAITING (or delete the record) in \
             wait_sync_meta, clear the matching full_sync_meta rows and the destination \
             table data, then rerun",
            schema_s, scope.task_mode, failed_totals
        )));
    }

    // 5. Register every configured table that has no record yet.
    for table in &exporters {
        if ctx.meta.wait_table(scope, table).await?.is_none() {
            ctx.meta
                .create_wait_table(scope, &WaitSyncMeta::waiting(table.clone()))
                .await?;
        }
    }

    // 6. Checkpoint disabled: wipe metadata, truncate destinations, start over.
    if !ctx.config.full.enable_checkpoint {
        info!(schema = %schema_s, "checkpoint disabled, wiping prior state");
        ctx.meta.delete_chunks_by_schema(scope).await?;
        let schema_t = ctx.config.target.schema_upper();
        for table in &exporters {
            ctx.meta
                .delete_wait_tables(scope, std::slice::from_ref(table))
                .await?;
            let target_table = ctx.config.full.target_table_name(table);
            ctx.writer.truncate_table(&schema_t, &target_table).await?;
            ctx.meta
                .create_wait_table(scope, &WaitSyncMeta::waiting(table.clone()))
                .await?;
        }
    }

    // 7. Classify.
    let wait_tables: Vec<String> = ctx
        .meta
        .fresh_wait_tables(scope)
        .await?
        .into_iter()
        .map(|m| m.table_s)
        .collect();
    let part_metas = ctx
        .meta
        .wait_tables_by_status(scope, TaskStatus::Running)
        .await?;
    let part_tables: Vec<String> = part_metas.iter().map(|m| m.table_s.clone()).collect();
    let waiting_chunk_tables = ctx.meta.waiting_chunk_tables(scope).await?;
    let waiting_chunk_set: HashSet<&String> = waiting_chunk_tables.iter().collect();

    // 8. Resumability: every interrupted table must still have its full
    // chunk set on record.
    let mut inconsistent: Vec<String> = Vec::new();
    for meta in &part_metas {
        if !waiting_chunk_set.contains(&meta.table_s) {
            inconsistent.push(meta.table_s.clone());
            continue;
        }
        let counts = ctx.meta.count_chunks(scope, &meta.table_s).await?;
        if counts != meta.chunk_total {
            inconsistent.push(meta.table_s.clone());
        }
    }
    if !inconsistent.is_empty() || part_tables.len() != waiting_chunk_tables.len() {
        return Err(MigrateError::CheckpointInconsistent(format!(
            "schema [{}] interrupted tables {:?} cannot be resumed (tables with waiting chunks: {:?})",
            schema_s, inconsistent, waiting_chunk_tables
        )));
    }

    info!(
        schema = %schema_s,
        exporters = exporters.len(),
        resumable = part_tables.len(),
        fresh = wait_tables.len(),
        "full load planned"
    );

    Ok(Plan {
        collation_aware,
        exporters,
        part_tables,
        wait_tables,
    })
}

/// Apply include/exclude filtering to the schema's table list. Names are
/// compared upper-cased. An include entry naming an unknown table is a
/// configuration error.
fn filter_tables(all: &[String], include: &[String], exclude: &[String]) -> Result<Vec<String>> {
    let all_upper: Vec<String> = all.iter().map(|t| t.to_uppercase()).collect();
    let all_set: HashSet<&String> = all_upper.iter().collect();
    let exclude_set: HashSet<String> = exclude.iter().map(|t| t.to_uppercase()).collect();

    let mut selected: Vec<String> = if include.is_empty() {
        all_upper.clone()
    } else {
        let mut picked = Vec::with_capacity(include.len());
        for table in include {
            let upper = table.to_uppercase();
            if !all_set.contains(&upper) {
                return Err(MigrateError::Config(format!(
                    "include table [{}] does not exist in the source schema",
                    table
                )));
            }
            picked.push(upper);
        }
        picked
    };

    selected.retain(|t| !exclude_set.contains(t));
    Ok(selected)
}
