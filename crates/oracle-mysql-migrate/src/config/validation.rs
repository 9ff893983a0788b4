//! Configuration validation.

use super::Config;
use crate::error::{MigrateError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Source validation
    if config.source.host.is_empty() {
        return Err(MigrateError::Config("source.host is required".into()));
    }
    if config.source.service_name.is_empty() {
        return Err(MigrateError::Config(
            "source.service_name is required".into(),
        ));
    }
    if config.source.user.is_empty() {
        return Err(MigrateError::Config("source.user is required".into()));
    }
    if config.source.schema.is_empty() {
        return Err(MigrateError::Config("source.schema is required".into()));
    }

    // Target validation
    if config.target.host.is_empty() {
        return Err(MigrateError::Config("target.host is required".into()));
    }
    if config.target.user.is_empty() {
        return Err(MigrateError::Config("target.user is required".into()));
    }
    if config.target.schema.is_empty() {
        return Err(MigrateError::Config("target.schema is required".into()));
    }

    if config.task_mode.trim().is_empty() {
        return Err(MigrateError::Config("task_mode must not be blank".into()));
    }

    // Pool and batch sizes must be positive
    for (name, value) in [
        ("full.table_threads", config.full.table_threads),
        ("full.chunk_threads", config.full.chunk_threads),
        ("full.apply_threads", config.full.apply_threads),
        ("full.task_threads", config.full.task_threads),
        ("full.insert_batch_size", config.full.insert_batch_size),
    ] {
        if value == 0 {
            return Err(MigrateError::Config(format!(
                "{} must be at least 1",
                name
            )));
        }
    }
    if config.full.rows_per_chunk == 0 {
        return Err(MigrateError::Config(
            "full.rows_per_chunk must be at least 1".into(),
        ));
    }

    Ok(())
}
