//! Durable record of replication progress.
//!
//! Every checkpoint access in the program goes through [`CheckpointStore`].
//! The log is append-only: one row per completed window, the live checkpoint
//! being the row with the greatest `block_timestamp`. Keeping this surface
//! narrow leaves a single seam to extend if the single-writer assumption ever
//! changes.

use sqlx::PgPool;
use tracing::instrument;

use crate::{
    conn::DbConnPool,
    sql,
    tables::{BLOCKS_TABLE, CHECKPOINT_TABLE},
    window::{BlockHeight, BlockTimestamp, round_down_to_window},
};

/// A `(block_height, block_timestamp)` pair strictly bounding the prefix of
/// data known to be fully replicated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct Checkpoint {
    /// _last_successful_load.block_height
    pub block_height: BlockHeight,
    /// _last_successful_load.block_timestamp
    pub block_timestamp: BlockTimestamp,
}

/// Errors that occur on the checkpoint read/write path.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// Failed to create the checkpoint table
    #[error("Failed to create checkpoint table '{CHECKPOINT_TABLE}'")]
    InitTable(#[source] sqlx::Error),

    /// Failed to read the latest checkpoint
    #[error("Failed to read the latest checkpoint")]
    ReadLast(#[source] sqlx::Error),

    /// Failed to append a checkpoint row
    #[error("Failed to append checkpoint (height {block_height}, timestamp {block_timestamp})")]
    Append {
        block_height: BlockHeight,
        block_timestamp: BlockTimestamp,
        #[source]
        source: sqlx::Error,
    },

    /// Failed to read the earliest source block during bootstrap
    #[error("Failed to read the earliest source block")]
    EarliestBlock(#[source] sqlx::Error),

    /// The source blocks table has no rows, so no starting window can be derived
    #[error("Source table '{source_schema}.{BLOCKS_TABLE}' is empty; nothing to bootstrap from")]
    EmptySource { source_schema: String },
}

/// Reads and writes the checkpoint log.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    pool: PgPool,
}

impl CheckpointStore {
    pub fn new(pool: &DbConnPool) -> Self {
        Self { pool: (**pool).clone() }
    }

    /// Creates the checkpoint table when it does not exist yet. Idempotent.
    #[instrument(skip_all, err)]
    pub async fn init(&self) -> Result<(), CheckpointError> {
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {CHECKPOINT_TABLE} \
             (block_height BIGINT NOT NULL, block_timestamp BIGINT NOT NULL)"
        );
        sqlx::query(&ddl)
            .execute(&self.pool)
            .await
            .map_err(CheckpointError::InitTable)?;
        Ok(())
    }

    /// The checkpoint with the greatest timestamp, or `None` when the log is
    /// empty.
    pub async fn last(&self) -> Result<Option<Checkpoint>, CheckpointError> {
        let query = format!(
            "SELECT block_height, block_timestamp FROM {CHECKPOINT_TABLE} \
             ORDER BY block_timestamp DESC LIMIT 1"
        );
        sqlx::query_as::<_, Checkpoint>(&query)
            .fetch_optional(&self.pool)
            .await
            .map_err(CheckpointError::ReadLast)
    }

    /// Appends a checkpoint row.
    ///
    /// Only called once the window's replication has fully committed; a
    /// failure here aborts the run and the window is redone next time.
    pub async fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let query = format!(
            "INSERT INTO {CHECKPOINT_TABLE} (block_height, block_timestamp) VALUES ($1, $2)"
        );
        sqlx::query(&query)
            .bind(checkpoint.block_height)
            .bind(checkpoint.block_timestamp)
            .execute(&self.pool)
            .await
            .map_err(|err| CheckpointError::Append {
                block_height: checkpoint.block_height,
                block_timestamp: checkpoint.block_timestamp,
                source: err,
            })?;
        Ok(())
    }

    /// Derives the starting point when no checkpoint exists yet.
    ///
    /// Takes the earliest source block and rounds its timestamp down to a
    /// whole window boundary, so every later window starts at the same
    /// day mark even if the chain began mid-day. The result is not
    /// persisted; the first real checkpoint lands after the first window
    /// replicates.
    #[instrument(skip(self), err)]
    pub async fn bootstrap(
        &self,
        source_schema: &str,
        window_duration: i64,
    ) -> Result<Checkpoint, CheckpointError> {
        let query = sql::earliest_block(source_schema, BLOCKS_TABLE);
        let earliest: Option<(BlockHeight, BlockTimestamp)> = sqlx::query_as(&query)
            .fetch_optional(&self.pool)
            .await
            .map_err(CheckpointError::EarliestBlock)?;

        let (block_height, block_timestamp) =
            earliest.ok_or_else(|| CheckpointError::EmptySource {
                source_schema: source_schema.to_string(),
            })?;

        Ok(Checkpoint {
            block_height,
            block_timestamp: round_down_to_window(block_timestamp, window_duration),
        })
    }
}
