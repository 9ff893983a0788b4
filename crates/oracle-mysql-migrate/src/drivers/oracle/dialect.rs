//! Oracle SQL text: catalog queries, chunk-task blocks, projections.
//!
//! Everything here is literal SQL by necessity - the catalog and
//! DBMS_PARALLEL_EXECUTE interfaces take identifiers and sizes inline, and
//! the projection embeds column expressions.

use tracing::warn;

use crate::core::schema::ColumnInfo;

/// Minimum supported source version.
pub const REQUIRED_ORACLE_VERSION: &str = "11";

/// First version whose catalog reports per-column collation.
pub const COLLATION_ORACLE_VERSION: &str = "12.2";

/// Server version string.
pub fn version_sql() -> String {
    "SELECT VALUE FROM NLS_DATABASE_PARAMETERS WHERE PARAMETER = 'NLS_RDBMS_VERSION'".to_string()
}

/// Minimum current SCN across all nodes.
pub fn current_snapshot_sql() -> String {
    "SELECT MIN(CURRENT_SCN) CURRENT_SCN FROM GV$DATABASE".to_string()
}

/// All tables owned by a schema.
pub fn schema_tables_sql(schema: &str) -> String {
    format!(
        "SELECT TABLE_NAME FROM DBA_TABLES WHERE OWNER = '{}' ORDER BY TABLE_NAME",
        schema
    )
}

/// Partitioned tables owned by a schema.
pub fn partitioned_tables_sql(schema: &str) -> String {
    format!(
        "SELECT TABLE_NAME FROM DBA_PART_TABLES WHERE OWNER = '{}'",
        schema
    )
}

/// Optimizer row-count statistic for one table.
pub fn row_statistic_sql(schema: &str, table: &str) -> String {
    format!(
        "SELECT NVL(NUM_ROWS, 0) NUM_ROWS FROM DBA_TABLES WHERE OWNER = '{}' AND TABLE_NAME = '{}'",
        schema, table
    )
}

/// Ordered column metadata for one table. The collation column only exists
/// on 12.2+ catalogs.
pub fn describe_columns_sql(schema: &str, table: &str, collation_aware: bool) -> String {
    let collation_col = if collation_aware { ", T.COLLATION" } else { "" };
    format!(
        "SELECT T.COLUMN_ID, T.COLUMN_NAME, T.DATA_TYPE, T.DATA_SCALE{} \
         FROM DBA_TAB_COLUMNS T WHERE T.OWNER = '{}' AND T.TABLE_NAME = '{}' \
         ORDER BY T.COLUMN_ID",
        collation_col, schema, table
    )
}

/// Count chunk-task rows for a task name (stale-task detection).
pub fn chunk_task_count_sql(task_name: &str) -> String {
    format!(
        "SELECT COUNT(1) COUNT FROM USER_PARALLEL_EXECUTE_CHUNKS WHERE TASK_NAME = '{}'",
        task_name
    )
}

/// Create a DBMS_PARALLEL_EXECUTE task.
pub fn create_chunk_task_sql(task_name: &str) -> String {
    format!(
        "BEGIN\n  DBMS_PARALLEL_EXECUTE.CREATE_TASK (task_name => '{}');\nEND;",
        task_name
    )
}

/// Split a table into row-id chunks of roughly `rows_per_chunk` rows.
pub fn create_chunks_by_rowid_sql(
    task_name: &str,
    schema: &str,
    table: &str,
    rows_per_chunk: u64,
) -> String {
    format!(
        "BEGIN\n  DBMS_PARALLEL_EXECUTE.CREATE_CHUNKS_BY_ROWID (task_name   => '{}',\n\
         \x20                                              table_owner => '{}',\n\
         \x20                                              table_name  => '{}',\n\
         \x20                                              by_row      => TRUE,\n\
         \x20                                              chunk_size  => {});\nEND;",
        task_name, schema, table, rows_per_chunk
    )
}

/// Fetch the generated chunk predicates, ordered by chunk index.
pub fn fetch_chunks_sql(task_name: &str) -> String {
    format!(
        "SELECT 'ROWID BETWEEN ''' || START_ROWID || ''' AND ''' || END_ROWID || '''' CMD \
         FROM USER_PARALLEL_EXECUTE_CHUNKS WHERE TASK_NAME = '{}' ORDER BY CHUNK_ID",
        task_name
    )
}

/// Drop a DBMS_PARALLEL_EXECUTE task.
pub fn drop_chunk_task_sql(task_name: &str) -> String {
    format!(
        "BEGIN\n  DBMS_PARALLEL_EXECUTE.DROP_TASK ('{}');\nEND;",
        task_name
    )
}

/// The consistent-snapshot extract query for one chunk.
pub fn chunk_select_sql(
    schema: &str,
    table: &str,
    projection: &str,
    snapshot_id: u64,
    predicate: &str,
) -> String {
    format!(
        "SELECT {} FROM {}.{} AS OF SCN {} WHERE {}",
        projection, schema, table, snapshot_id, predicate
    )
}

/// Build the SELECT projection for a table.
///
/// Numeric, character and binary columns pass through unchanged. Date,
/// interval and timestamp columns are rendered to text on the source side so
/// the destination receives a stable literal; XMLTYPE is serialized to CLOB.
/// Timestamp fractional precision follows the declared scale, capped at 6.
pub fn build_projection(columns: &[ColumnInfo]) -> String {
    let fragments: Vec<String> = columns.iter().map(projection_fragment).collect();
    fragments.join(",")
}

fn projection_fragment(col: &ColumnInfo) -> String {
    let name = col.name.as_str();
    match col.data_type.to_uppercase().as_str() {
        "NUMBER" | "DECIMAL" | "DEC" | "DOUBLE PRECISION" | "FLOAT" | "INTEGER" | "INT"
        | "REAL" | "NUMERIC" | "BINARY_FLOAT" | "BINARY_DOUBLE" | "SMALLINT" => name.to_string(),
        "BFILE" | "CHARACTER" | "LONG" | "NCHAR VARYING" | "ROWID" | "UROWID" | "VARCHAR"
        | "VARCHAR2" | "CHAR" | "NCHAR" | "NVARCHAR2" | "NCLOB" | "CLOB" => name.to_string(),
        "BLOB" | "LONG RAW" | "RAW" => name.to_string(),
        "XMLTYPE" => format!("XMLSERIALIZE(CONTENT {} AS CLOB) AS {}", name, name),
        "DATE" => format!("TO_CHAR({},'yyyy-MM-dd HH24:mi:ss') AS {}", name, name),
        upper => {
            if upper.contains("INTERVAL") {
                format!("TO_CHAR({}) AS {}", name, name)
            } else if upper.contains("TIMESTAMP") {
                if upper.contains("TIME ZONE") {
                    // Zone information is lost in the rendered text.
                    warn!(
                        column = name,
                        data_type = %col.data_type,
                        "timestamp with time zone rendered without zone offset"
                    );
                }
                timestamp_fragment(name, col.data_scale.unwrap_or(6))
            } else {
                name.to_string()
            }
        }
    }
}

fn timestamp_fragment(name: &str, scale: i32) -> String {
    if scale == 0 {
        format!("TO_CHAR({},'yyyy-mm-dd hh24:mi:ss') AS {}", name, name)
    } else if (1..=6).contains(&scale) {
        format!(
            "TO_CHAR({},'yyyy-mm-dd hh24:mi:ss.ff{}') AS {}",
            name, scale, name
        )
    } else {
        format!("TO_CHAR({},'yyyy-mm-dd hh24:mi:ss.ff6') AS {}", name, name)
    }
}

/// Compare dotted version strings segment by segment.
///
/// Returns true when `version` is at least `baseline`. Non-numeric noise in
/// a segment ends the numeric prefix for that segment.
pub fn version_at_least(version: &str, baseline: &str) -> bool {
    let v = version_segments(version);
    let b = version_segments(baseline);
    for i in 0..v.len().max(b.len()) {
        let lhs = v.get(i).copied().unwrap_or(0);
        let rhs = b.get(i).copied().unwrap_or(0);
        if lhs != rhs {
            return lhs > rhs;
        }
    }
    true
}

fn version_segments(version: &str) -> Vec<u64> {
    version
        .split('.')
        .map(|seg| {
            let digits: String = seg.chars().take_while(|c| c.is_ascii_digit()).collect();
            digits.parse().unwrap_or(0)
        })
        .collect()
}
