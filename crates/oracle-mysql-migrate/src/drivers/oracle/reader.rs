//! Oracle source reader.
//!
//! Implements the [`SourceReader`] operations on top of a [`SourceClient`]
//! supplied by the embedding application. All SQL text lives in the sibling
//! dialect module; this file owns result parsing, the chunk-task lifecycle
//! and the per-chunk row encoding.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::dialect;
use crate::core::schema::ColumnInfo;
use crate::core::traits::{
    ChunkQuery, ChunkRows, RawRow, RawTable, SourceClient, SourceReader,
};
use crate::core::value::{encode_row, ColumnKind};
use crate::error::{MigrateError, Result};

/// Oracle implementation of the source-side operations.
pub struct OracleReader {
    client: Arc<dyn SourceClient>,
}

impl OracleReader {
    /// Create a reader over a connected source driver.
    pub fn new(client: Arc<dyn SourceClient>) -> Self {
        Self { client }
    }

    async fn query_scalar_u64(&self, sql: &str, context: &str) -> Result<u64> {
        let table = self.client.query(sql).await?;
        let text = table
            .scalar()
            .ok_or_else(|| MigrateError::source("empty result", context.to_string()))?;
        text.trim()
            .parse()
            .map_err(|e| MigrateError::source(format!("{:?}: {}", text, e), context.to_string()))
    }

    /// First field of every row, decoded as text.
    fn first_column(table: &RawTable) -> Vec<String> {
        table
            .rows
            .iter()
            .filter_map(|row| field_text(row, 0))
            .collect()
    }
}

fn field_text(row: &RawRow, idx: usize) -> Option<String> {
    row.get(idx)
        .and_then(|f| f.as_deref())
        .map(|b| String::from_utf8_lossy(b).into_owned())
}

#[async_trait]
impl SourceReader for OracleReader {
    async fn version(&self) -> Result<String> {
        let table = self.client.query(&dialect::version_sql()).await?;
        table
            .scalar()
            .ok_or_else(|| MigrateError::source("empty result", "reading source version"))
    }

    async fn current_snapshot(&self) -> Result<u64> {
        self.query_scalar_u64(
            &dialect::current_snapshot_sql(),
            "reading current snapshot scn",
        )
        .await
    }

    async fn schema_tables(&self, schema: &str) -> Result<Vec<String>> {
        let table = self.client.query(&dialect::schema_tables_sql(schema)).await?;
        Ok(Self::first_column(&table))
    }

    async fn list_partitioned_tables(&self, schema: &str) -> Result<HashSet<String>> {
        let table = self
            .client
            .query(&dialect::partitioned_tables_sql(schema))
            .await?;
        Ok(Self::first_column(&table).into_iter().collect())
    }

    async fn row_statistic(&self, schema: &str, table: &str) -> Result<u64> {
        self.query_scalar_u64(
            &dialect::row_statistic_sql(schema, table),
            "reading table row statistics",
        )
        .await
    }

    async fn describe_columns(
        &self,
        schema: &str,
        table: &str,
        collation_aware: bool,
    ) -> Result<Vec<ColumnInfo>> {
        let sql = dialect::describe_columns_sql(schema, table, collation_aware);
        let result = self.client.query(&sql).await?;

        let mut columns = Vec::with_capacity(result.rows.len());
        for row in &result.rows {
            let ordinal: i32 = field_text(row, 0)
                .and_then(|t| t.trim().parse().ok())
                .unwrap_or(0);
            let name = field_text(row, 1).ok_or_else(|| {
                MigrateError::source("missing column name", "describing table columns")
            })?;
            let data_type = field_text(row, 2).unwrap_or_default();
            let data_scale = field_text(row, 3).and_then(|t| t.trim().parse().ok());
            let collation = if collation_aware {
                field_text(row, 4)
            } else {
                None
            };
            columns.push(ColumnInfo {
                ordinal,
                name,
                data_type,
                data_scale,
                collation,
            });
        }
        Ok(columns)
    }

    async fn create_row_chunks(
        &self,
        task_name: &str,
        schema: &str,
        table: &str,
        rows_per_chunk: u64,
    ) -> Result<Vec<String>> {
        // A stale task with the same name blocks CREATE_TASK.
        let existing = self
            .client
            .query(&dialect::chunk_task_count_sql(task_name))
            .await?;
        if existing.scalar().as_deref().map(str::trim) != Some("0") {
            debug!(task = task_name, "dropping stale chunk task");
            self.client
                .exec(&dialect::drop_chunk_task_sql(task_name))
                .await?;
        }

        self.client
            .exec(&dialect::create_chunk_task_sql(task_name))
            .await?;
        self.client
            .exec(&dialect::create_chunks_by_rowid_sql(
                task_name,
                schema,
                table,
                rows_per_chunk,
            ))
            .await?;

        let fetched = self.client.query(&dialect::fetch_chunks_sql(task_name)).await?;
        let predicates = Self::first_column(&fetched);

        self.client
            .exec(&dialect::drop_chunk_task_sql(task_name))
            .await?;

        Ok(predicates)
    }

    async fn stream_rows(&self, query: ChunkQuery<'_>, batch_size: usize) -> Result<ChunkRows> {
        let sql = dialect::chunk_select_sql(
            query.schema,
            query.table,
            query.projection,
            query.snapshot_id,
            query.predicate,
        );
        let mut stream = self.client.query_stream(&sql).await?;

        let names: Vec<String> = stream.columns.iter().map(|c| c.name.clone()).collect();
        // Destination column names are back-quoted unconditionally so reserved
        // words survive.
        let headers: Vec<String> = names.iter().map(|n| format!("`{}`", n)).collect();
        let kinds: Vec<ColumnKind> = stream
            .columns
            .iter()
            .map(|c| ColumnKind::from_scan(c.scan))
            .collect();

        let mut batches = Vec::new();
        let mut tuples: Vec<String> = Vec::with_capacity(batch_size);
        while let Some(row) = stream.rows.recv().await {
            let row = row?;
            tuples.push(encode_row(&kinds, &names, &row)?);
            if tuples.len() == batch_size {
                batches.push(tuples.join(","));
                tuples.clear();
            }
        }
        if !tuples.is_empty() {
            batches.push(tuples.join(","));
        }

        Ok(ChunkRows {
            columns: headers,
            batches,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::traits::{ColumnDesc, RawStream};
    use crate::core::value::ScanKind;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    /// Scripted driver: canned results matched by SQL substring, plus a log
    /// of every executed statement.
    #[derive(Default)]
    struct MockClient {
        results: HashMap<&'static str, RawTable>,
        stream_columns: Vec<ColumnDesc>,
        stream_rows: Vec<RawRow>,
        executed: Mutex<Vec<String>>,
    }

    impl MockClient {
        fn with_result(mut self, needle: &'static str, table: RawTable) -> Self {
            self.results.insert(needle, table);
            self
        }

        fn executed(&self) -> Vec<String> {
            self.executed.lock().unwrap().clone()
        }
    }

    fn raw(rows: Vec<Vec<Option<&str>>>) -> RawTable {
        RawTable {
            columns: Vec::new(),
            rows: rows
                .into_iter()
                .map(|r| r.into_iter().map(|f| f.map(|s| s.as_bytes().to_vec())).collect())
                .collect(),
        }
    }

    #[async_trait]
    impl SourceClient for MockClient {
        async fn exec(&self, sql: &str) -> Result<u64> {
            self.executed.lock().unwrap().push(sql.to_string());
            Ok(0)
        }

        async fn query(&self, sql: &str) -> Result<RawTable> {
            self.executed.lock().unwrap().push(sql.to_string());
            for (needle, table) in &self.results {
                if sql.contains(needle) {
                    return Ok(RawTable {
                        columns: table.columns.clone(),
                        rows: table.rows.clone(),
                    });
                }
            }
            Ok(RawTable::default())
        }

        async fn query_stream(&self, sql: &str) -> Result<RawStream> {
            self.executed.lock().unwrap().push(sql.to_string());
            let (tx, rx) = mpsc::channel(self.stream_rows.len().max(1));
            for row in self.stream_rows.clone() {
                tx.try_send(Ok(row)).unwrap();
            }
            Ok(RawStream {
                columns: self.stream_columns.clone(),
                rows: rx,
            })
        }
    }

    #[tokio::test]
    async fn test_current_snapshot_parses_scalar() {
        let client = MockClient::default()
            .with_result("GV$DATABASE", raw(vec![vec![Some("470394")]]));
        let reader = OracleReader::new(Arc::new(client));
        assert_eq!(reader.current_snapshot().await.unwrap(), 470394);
    }

    #[tokio::test]
    async fn test_current_snapshot_rejects_garbage() {
        let client = MockClient::default()
            .with_result("GV$DATABASE", raw(vec![vec![Some("not-a-number")]]));
        let reader = OracleReader::new(Arc::new(client));
        assert!(reader.current_snapshot().await.is_err());
    }

    #[tokio::test]
    async fn test_create_row_chunks_lifecycle() {
        let client = MockClient::default()
            .with_result("SELECT COUNT(1)", raw(vec![vec![Some("0")]]))
            .with_result(
                "'ROWID BETWEEN",
                raw(vec![
                    vec![Some("ROWID BETWEEN 'AAA' AND 'AAB'")],
                    vec![Some("ROWID BETWEEN 'AAB' AND 'AAC'")],
                ]),
            );
        let reader = OracleReader::new(Arc::new(client));
        let preds = reader
            .create_row_chunks("MARVIN_T1_TASK0", "MARVIN", "T1", 100_000)
            .await
            .unwrap();
        assert_eq!(
            preds,
            vec![
                "ROWID BETWEEN 'AAA' AND 'AAB'",
                "ROWID BETWEEN 'AAB' AND 'AAC'",
            ]
        );
    }

    #[tokio::test]
    async fn test_create_row_chunks_drops_stale_task_first() {
        let client = MockClient::default()
            .with_result("SELECT COUNT(1)", raw(vec![vec![Some("3")]]));
        let reader_client = Arc::new(client);
        let reader = OracleReader::new(reader_client.clone());
        reader
            .create_row_chunks("MARVIN_T1_TASK0", "MARVIN", "T1", 100_000)
            .await
            .unwrap();

        let executed = reader_client.executed();
        let drops: Vec<usize> = executed
            .iter()
            .enumerate()
            .filter(|(_, s)| s.contains("DROP_TASK"))
            .map(|(i, _)| i)
            .collect();
        let create = executed
            .iter()
            .position(|s| s.contains("CREATE_TASK"))
            .unwrap();
        // Stale drop before CREATE_TASK, final drop after the fetch.
        assert_eq!(drops.len(), 2);
        assert!(drops[0] < create);
        assert!(drops[1] > create);
    }

    #[tokio::test]
    async fn test_stream_rows_batches_and_backquotes() {
        let mut client = MockClient::default();
        client.stream_columns = vec![
            ColumnDesc {
                name: "ID".into(),
                scan: ScanKind::Number,
                declared: "NUMBER".into(),
            },
            ColumnDesc {
                name: "NAME".into(),
                scan: ScanKind::Bytes,
                declared: "VARCHAR2".into(),
            },
        ];
        client.stream_rows = vec![
            vec![Some(b"1".to_vec()), Some(b"a".to_vec())],
            vec![Some(b"2".to_vec()), None],
            vec![Some(b"3".to_vec()), Some(b"c".to_vec())],
        ];
        let reader = OracleReader::new(Arc::new(client));
        let query = ChunkQuery {
            schema: "MARVIN",
            table: "T1",
            projection: "ID,NAME",
            predicate: "1 = 1",
            snapshot_id: 470394,
        };
        let rows = reader.stream_rows(query, 2).await.unwrap();
        assert_eq!(rows.columns, vec!["`ID`", "`NAME`"]);
        assert_eq!(rows.batches, vec!["(1,'a'),(2,NULL)", "(3,'c')"]);
    }

    #[tokio::test]
    async fn test_stream_rows_empty_result() {
        let mut client = MockClient::default();
        client.stream_columns = vec![ColumnDesc {
            name: "ID".into(),
            scan: ScanKind::Number,
            declared: "NUMBER".into(),
        }];
        let reader = OracleReader::new(Arc::new(client));
        let query = ChunkQuery {
            schema: "MARVIN",
            table: "EMPTY",
            projection: "ID",
            predicate: "1 = 1",
            snapshot_id: 1,
        };
        let rows = reader.stream_rows(query, 10).await.unwrap();
        assert_eq!(rows.columns, vec!["`ID`"]);
        assert!(rows.batches.is_empty());
    }

    #[tokio::test]
    async fn test_describe_columns_parses_scale() {
        let client = MockClient::default().with_result(
            "DBA_TAB_COLUMNS",
            raw(vec![
                vec![Some("1"), Some("ID"), Some("NUMBER"), None],
                vec![Some("2"), Some("TS"), Some("TIMESTAMP(3)"), Some("3")],
            ]),
        );
        let reader = OracleReader::new(Arc::new(client));
        let cols = reader.describe_columns("MARVIN", "T1", false).await.unwrap();
        assert_eq!(cols.len(), 2);
        assert_eq!(cols[0].name, "ID");
        assert_eq!(cols[0].data_scale, None);
        assert_eq!(cols[1].data_type, "TIMESTAMP(3)");
        assert_eq!(cols[1].data_scale, Some(3));
    }
}
