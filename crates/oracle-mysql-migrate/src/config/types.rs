//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source database configuration (Oracle).
    pub source: SourceConfig,

    /// Target database configuration (MySQL).
    pub target: TargetConfig,

    /// Metadata store endpoint. Defaults to the target endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<MetaConfig>,

    /// Full-load behavior configuration.
    #[serde(default)]
    pub full: FullConfig,

    /// Task mode string namespacing wait_sync_meta/full_sync_meta records,
    /// so multiple migration workflows can share one metadata store.
    #[serde(default = "default_task_mode")]
    pub task_mode: String,
}

/// Source database (Oracle) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Database host.
    pub host: String,

    /// Listener port (default: 1521).
    #[serde(default = "default_oracle_port")]
    pub port: u16,

    /// Service name.
    pub service_name: String,

    /// Username.
    pub user: String,

    /// Password.
    pub password: String,

    /// Source schema (owner) whose tables are migrated.
    pub schema: String,
}

impl SourceConfig {
    /// Source schema name, upper-cased the way Oracle stores it.
    pub fn schema_upper(&self) -> String {
        self.schema.to_uppercase()
    }
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("service_name", &self.service_name)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .finish()
    }
}

/// Target database (MySQL) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 3306).
    #[serde(default = "default_mysql_port")]
    pub port: u16,

    /// Username.
    pub user: String,

    /// Password.
    pub password: String,

    /// Target schema (database) receiving the data.
    pub schema: String,

    /// SSL mode (default: "prefer").
    #[serde(default = "default_prefer")]
    pub ssl_mode: String,
}

impl TargetConfig {
    /// Target schema name, upper-cased for metadata comparisons.
    pub fn schema_upper(&self) -> String {
        self.schema.to_uppercase()
    }
}

impl fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

/// Metadata store endpoint configuration.
///
/// The metadata store is a MySQL endpoint holding `wait_sync_meta` and
/// `full_sync_meta`. When this section is absent the target endpoint is
/// reused with the default metadata database.
#[derive(Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 3306).
    #[serde(default = "default_mysql_port")]
    pub port: u16,

    /// Username.
    pub user: String,

    /// Password.
    pub password: String,

    /// Database holding the metadata tables.
    #[serde(default = "default_meta_database")]
    pub database: String,

    /// SSL mode (default: "prefer").
    #[serde(default = "default_prefer")]
    pub ssl_mode: String,
}

impl fmt::Debug for MetaConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetaConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("database", &self.database)
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

/// Full-load behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FullConfig {
    /// Resume from prior metadata on re-run. When false every run wipes the
    /// metadata rows for the schema/task-mode and truncates the destination
    /// tables before chunking afresh.
    #[serde(default = "default_true")]
    pub enable_checkpoint: bool,

    /// Tables migrated in parallel (outer pool).
    #[serde(default = "default_table_threads")]
    pub table_threads: usize,

    /// Chunks applied in parallel per table (inner pool).
    #[serde(default = "default_chunk_threads")]
    pub chunk_threads: usize,

    /// Reserved for intra-chunk apply parallelism.
    #[serde(default = "default_apply_threads")]
    pub apply_threads: usize,

    /// Tables chunked in parallel during planning.
    #[serde(default = "default_task_threads")]
    pub task_threads: usize,

    /// Rows per multi-row INSERT batch.
    #[serde(default = "default_insert_batch_size")]
    pub insert_batch_size: usize,

    /// Target rows per row-id chunk.
    #[serde(default = "default_rows_per_chunk")]
    pub rows_per_chunk: u64,

    /// Tables to include (exact names, compared upper-cased). Empty = all.
    #[serde(default)]
    pub include_tables: Vec<String>,

    /// Tables to exclude (exact names, compared upper-cased).
    #[serde(default)]
    pub exclude_tables: Vec<String>,

    /// Source table -> target table renames. Absent entries default to the
    /// upper-cased source name.
    #[serde(default)]
    pub table_name_rules: HashMap<String, String>,
}

impl Default for FullConfig {
    fn default() -> Self {
        Self {
            enable_checkpoint: true,
            table_threads: default_table_threads(),
            chunk_threads: default_chunk_threads(),
            apply_threads: default_apply_threads(),
            task_threads: default_task_threads(),
            insert_batch_size: default_insert_batch_size(),
            rows_per_chunk: default_rows_per_chunk(),
            include_tables: Vec::new(),
            exclude_tables: Vec::new(),
            table_name_rules: HashMap::new(),
        }
    }
}

impl FullConfig {
    /// Resolve the target table name for a source table via the rule map.
    pub fn target_table_name(&self, source_table: &str) -> String {
        let upper = source_table.to_uppercase();
        self.table_name_rules
            .iter()
            .find(|(s, _)| s.to_uppercase() == upper)
            .map(|(_, t)| t.to_uppercase())
            .unwrap_or(upper)
    }
}

// Default value functions for serde

fn default_task_mode() -> String {
    "FULL".to_string()
}

fn default_oracle_port() -> u16 {
    1521
}

fn default_mysql_port() -> u16 {
    3306
}

fn default_prefer() -> String {
    "prefer".to_string()
}

fn default_meta_database() -> String {
    "_oracle_mysql_migrate".to_string()
}

fn default_true() -> bool {
    true
}

fn default_table_threads() -> usize {
    4
}

fn default_chunk_threads() -> usize {
    8
}

fn default_apply_threads() -> usize {
    4
}

fn default_task_threads() -> usize {
    4
}

fn default_insert_batch_size() -> usize {
    500
}

fn default_rows_per_chunk() -> u64 {
    100_000
}
