//! MySQL sink writer.
//!
//! Implements the [`SinkWriter`] trait for the destination database. Uses
//! SQLx for connection pooling. Batches arrive pre-formatted from the value
//! codec, so apply is a single literal multi-row INSERT per batch.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlSslMode};
use tracing::{debug, info, warn};

use crate::config::TargetConfig;
use crate::core::traits::SinkWriter;
use crate::error::{MigrateError, Result};

/// Connection pool timeout.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// MySQL sink writer implementation.
pub struct MysqlWriter {
    pool: MySqlPool,
}

impl MysqlWriter {
    /// Create a new MySQL writer from configuration.
    pub async fn connect(config: &TargetConfig, max_conns: usize) -> Result<Self> {
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
            "Connected to MySQL target: {}:{}",
            config.host, config.port
        );

        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Get a clone of the underlying connection pool.
    pub fn pool(&self) -> MySqlPool {
        self.pool.clone()
    }

    /// Quote a MySQL identifier.
    fn quote_ident(name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    /// Qualify a table name with its schema.
    fn qualify_table(schema: &str, table: &str) -> String {
        format!("{}.{}", Self::quote_ident(schema), Self::quote_ident(table))
    }

    /// Build the multi-row INSERT for one batch. Column names arrive already
    /// back-quoted and `batch` is a comma-joined list of tuple literals.
    fn build_insert_sql(schema: &str, table: &str, columns: &[String], batch: &str) -> String {
        format!(
            "INSERT INTO {} ({}) VALUES {}",
            Self::qualify_table(schema, table),
            columns.join(","),
            batch
        )
    }
}

#[async_trait]
impl SinkWriter for MysqlWriter {
    async fn truncate_table(&self, schema: &str, table: &str) -> Result<()> {
        let sql = format!("TRUNCATE TABLE {}", Self::qualify_table(schema, table));
        sqlx::query(&sql).execute(&self.pool).await?;

        debug!("Truncated table {}.{}", schema, table);
        Ok(())
    }

    async fn apply_batch(
        &self,
        schema: &str,
        table: &str,
        columns: &[String],
        batch: &str,
    ) -> Result<u64> {
        if batch.is_empty() {
            return Ok(0);
        }

        let sql = Self::build_insert_sql(schema, table, columns, batch);
        let result = sqlx::query(&sql).execute(&self.pool).await.map_err(|e| {
            MigrateError::chunk(
                format!("{}.{}", schema, table),
                format!("INSERT batch: {}", e),
            )
        })?;

        Ok(result.rows_affected())
    }
}

/// Build a MySQL pool with ssl-mode mapping and utf8mb4, testing the
/// connection before handing it back. Shared by the sink writer and the
/// metadata store.
pub(crate) async fn build_pool(
    host: &str,
    port: u16,
    user: &str,
    password: &str,
    database: Option<&str>,
    ssl_mode: &str,
    max_conns: usize,
) -> Result<MySqlPool> {
    let ssl_mode = match ssl_mode.to_lowercase().as_str() {
        "disable" => {
            warn!("MySQL TLS is disabled. Credentials will be transmitted in plaintext.");
            MySqlSslMode::Disabled
        }
        "prefer" => MySqlSslMode::Preferred,
        "require" => MySqlSslMode::Required,
        "verify-ca" | "verify_ca" => MySqlSslMode::VerifyCa,
        "verify-full" | "verify_identity" => MySqlSslMode::VerifyIdentity,
        other => {
            warn!("Unknown ssl_mode '{}', defaulting to Preferred", other);
            MySqlSslMode::Preferred
        }
    };

    let mut options = MySqlConnectOptions::new()
        .host(host)
        .port(port)
        .username(user)
        .password(password)
        .ssl_mode(ssl_mode)
        // Enforce utf8mb4 for full Unicode support
        .charset("utf8mb4");
    if let Some(db) = database {
        options = options.database(db);
    }

    let pool = MySqlPoolOptions::new()
        .max_connections(max_conns as u32)
        .acquire_timeout(POOL_CONNECTION_TIMEOUT)
        .connect_with(options)
        .await
        .map_err(|e| MigrateError::meta(e, "creating MySQL pool"))?;

    // Test connection
    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .map_err(|e| MigrateError::meta(e, "testing MySQL connection"))?;

    Ok(pool)
}
