//! Startup crash repair.
//!
//! Replication commits per table, so a crash mid-window leaves some
//! append-only tables holding rows the checkpoint does not cover. Before any
//! new work, the destination is rolled back to the checkpoint: append-only
//! rows by timestamp, mutable rows by creation height.
//!
//! Mutable rows whose *deletion* landed in the torn window are left alone on
//! purpose; the next `copy_mutable` pass recomputes deletions for the height
//! range from source truth, so over-deleting by creation height is the only
//! cleanup repair needs.

use sqlx::PgPool;
use tracing::{info, instrument};

use crate::{
    checkpoint::Checkpoint,
    sql,
    tables::{APPEND_ONLY_TABLES, MUTABLE_TABLES},
    window::BlockTimestamp,
};

/// Errors that occur during crash repair.
#[derive(Debug, thiserror::Error)]
pub enum RepairError {
    /// Failed to scan a destination table for data past the checkpoint
    #[error("Failed to scan '{table}' for data past the checkpoint")]
    ScanTable {
        table: &'static str,
        #[source]
        source: sqlx::Error,
    },

    /// Failed to delete append-only rows past the checkpoint
    #[error("Failed to delete rows past timestamp {from_timestamp} from '{table}'")]
    PurgeAppendOnly {
        table: &'static str,
        from_timestamp: BlockTimestamp,
        #[source]
        source: sqlx::Error,
    },

    /// Failed to delete mutable rows created past the checkpoint
    #[error("Failed to delete rows created at or above height {from_height} from '{table}'")]
    PurgeMutable {
        table: &'static str,
        from_height: i64,
        #[source]
        source: sqlx::Error,
    },
}

/// True when any destination append-only table holds rows newer than the
/// checkpoint, i.e. a previous run died between a table commit and the
/// checkpoint write.
pub async fn partial_window_exists(
    pool: &PgPool,
    checkpoint_timestamp: BlockTimestamp,
) -> Result<bool, RepairError> {
    for &table in APPEND_ONLY_TABLES {
        let query = sql::newest_timestamp(table);
        let newest: Option<BlockTimestamp> = sqlx::query_scalar(&query)
            .fetch_optional(pool)
            .await
            .map_err(|err| RepairError::ScanTable {
                table,
                source: err,
            })?;

        if newest.is_some_and(|ts| ts > checkpoint_timestamp) {
            return Ok(true);
        }
    }

    Ok(false)
}

/// Deletes every destination row the checkpoint does not cover.
///
/// Idempotent: running it against an already-clean destination deletes
/// nothing.
#[instrument(skip(pool), err)]
pub async fn rollback_to_checkpoint(
    pool: &PgPool,
    checkpoint: &Checkpoint,
) -> Result<(), RepairError> {
    for &table in APPEND_ONLY_TABLES {
        let query = sql::delete_from_timestamp(table);
        let result = sqlx::query(&query)
            .bind(checkpoint.block_timestamp)
            .execute(pool)
            .await
            .map_err(|err| RepairError::PurgeAppendOnly {
                table,
                from_timestamp: checkpoint.block_timestamp,
                source: err,
            })?;

        info!(
            table,
            rows_deleted = result.rows_affected(),
            "incomplete_window_rows_purged"
        );
    }

    for &table in MUTABLE_TABLES {
        let query = sql::delete_created_from_height(table);
        let result = sqlx::query(&query)
            .bind(checkpoint.block_height)
            .execute(pool)
            .await
            .map_err(|err| RepairError::PurgeMutable {
                table,
                from_height: checkpoint.block_height,
                source: err,
            })?;

        info!(
            table,
            rows_deleted = result.rows_affected(),
            "incomplete_window_rows_purged"
        );
    }

    Ok(())
}
