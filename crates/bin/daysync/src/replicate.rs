//! The per-window copy.
//!
//! Each statement runs in its own implicit transaction, so a window is
//! committed table by table rather than atomically. A crash between table
//! commits leaves a torn window; `repair` rolls it back on the next startup.
//! The trade-off keeps every transaction bounded to one table's worth of a
//! single day.

use std::time::Instant;

use sqlx::PgPool;
use tracing::info;

use crate::{
    sql,
    tables::{APPEND_ONLY_TABLES, MUTABLE_TABLES},
    window::Window,
};

/// Errors that occur while replicating a window.
#[derive(Debug, thiserror::Error)]
pub enum ReplicateError {
    /// Failed to copy the window's timestamp range into an append-only table
    #[error("Failed to copy timestamp range [{from_timestamp}, {to_timestamp}) into '{table}'")]
    CopyTimeRange {
        table: &'static str,
        from_timestamp: i64,
        to_timestamp: i64,
        #[source]
        source: sqlx::Error,
    },

    /// Failed to drop stale soft-deleted rows from a mutable table
    #[error("Failed to drop rows soft-deleted in heights [{from_height}, {to_height}) from '{table}'")]
    DropSoftDeleted {
        table: &'static str,
        from_height: i64,
        to_height: i64,
        #[source]
        source: sqlx::Error,
    },

    /// Failed to copy the window's height range into a mutable table
    #[error("Failed to copy height range [{from_height}, {to_height}) into '{table}'")]
    CopyHeightRange {
        table: &'static str,
        from_height: i64,
        to_height: i64,
        #[source]
        source: sqlx::Error,
    },
}

/// Copies one window of rows into every append-only table.
///
/// `INSERT ... SELECT` over `[from_timestamp, to_timestamp)`, one commit per
/// table.
pub async fn copy_append_only(
    pool: &PgPool,
    source_schema: &str,
    window: &Window,
) -> Result<(), ReplicateError> {
    for &table in APPEND_ONLY_TABLES {
        let started = Instant::now();
        let query = sql::copy_time_range(table, source_schema);
        let result = sqlx::query(&query)
            .bind(window.from_timestamp)
            .bind(window.to_timestamp)
            .execute(pool)
            .await
            .map_err(|err| ReplicateError::CopyTimeRange {
                table,
                from_timestamp: window.from_timestamp,
                to_timestamp: window.to_timestamp,
                source: err,
            })?;

        info!(
            table,
            rows_copied = result.rows_affected(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "append_only_table_copied"
        );
    }

    Ok(())
}

/// Re-syncs every mutable table for one window of heights.
///
/// Destination rows whose soft-deletion became visible in
/// `[from_height, to_height)` are dropped first, then source rows created
/// *or* deleted in that range are inserted. A row created in an earlier
/// window and deleted in this one is thereby replaced with its latest state,
/// deletion marker included. Delete and insert commit separately; repair
/// covers the gap.
pub async fn copy_mutable(
    pool: &PgPool,
    source_schema: &str,
    window: &Window,
) -> Result<(), ReplicateError> {
    for &table in MUTABLE_TABLES {
        let started = Instant::now();

        let query = sql::delete_soft_deleted_in_range(table);
        let dropped = sqlx::query(&query)
            .bind(window.from_height)
            .bind(window.to_height)
            .execute(pool)
            .await
            .map_err(|err| ReplicateError::DropSoftDeleted {
                table,
                from_height: window.from_height,
                to_height: window.to_height,
                source: err,
            })?;

        let query = sql::copy_height_range(table, source_schema);
        let copied = sqlx::query(&query)
            .bind(window.from_height)
            .bind(window.to_height)
            .execute(pool)
            .await
            .map_err(|err| ReplicateError::CopyHeightRange {
                table,
                from_height: window.from_height,
                to_height: window.to_height,
                source: err,
            })?;

        info!(
            table,
            rows_dropped = dropped.rows_affected(),
            rows_copied = copied.rows_affected(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "mutable_table_resynced"
        );
    }

    Ok(())
}
