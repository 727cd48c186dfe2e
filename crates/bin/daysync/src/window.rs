//! Window planning: deciding the next time slice to replicate.

use chrono::{DateTime, NaiveDate};
use sqlx::PgPool;

use crate::{
    checkpoint::Checkpoint,
    conn::DbConnPool,
    sql,
    tables::BLOCKS_TABLE,
};

/// Block height as stored in the indexer schema.
pub type BlockHeight = i64;
/// Nanosecond-resolution block timestamp.
pub type BlockTimestamp = i64;

/// One loop iteration's slice of work: a half-open timestamp interval and the
/// matching half-open height interval. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub from_timestamp: BlockTimestamp,
    pub to_timestamp: BlockTimestamp,
    pub from_height: BlockHeight,
    pub to_height: BlockHeight,
}

/// Errors that occur while planning a window.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    /// Failed to read the newest source block timestamp
    #[error("Failed to read the newest source block timestamp")]
    NewestTimestamp(#[source] sqlx::Error),

    /// Failed to resolve the block height for a window boundary
    #[error("Failed to resolve the block height below timestamp {to_timestamp}")]
    HeightLookup {
        to_timestamp: BlockTimestamp,
        #[source]
        source: sqlx::Error,
    },

    /// No source block exists below the window boundary
    ///
    /// Cannot happen once the closure guard has passed; surfaced instead of
    /// panicking in case the source is mutated underneath a run.
    #[error("No source block below timestamp {to_timestamp}")]
    NoBlockBelow { to_timestamp: BlockTimestamp },
}

/// Plans consecutive windows on top of the source schema.
#[derive(Debug, Clone)]
pub struct WindowPlanner {
    pool: PgPool,
    source_schema: String,
    window_duration: i64,
}

impl WindowPlanner {
    pub fn new(pool: &DbConnPool, source_schema: &str, window_duration: i64) -> Self {
        Self {
            pool: (**pool).clone(),
            source_schema: source_schema.to_string(),
            window_duration,
        }
    }

    /// The window following `last`, or `None` when the source cannot close it
    /// yet.
    ///
    /// A window is only attempted once the source holds a block strictly past
    /// its end; that makes the height lookup unambiguous and guarantees no
    /// more blocks will ever land inside the window upstream.
    pub async fn next_window(&self, last: &Checkpoint) -> Result<Option<Window>, PlanError> {
        let to_timestamp = last.block_timestamp + self.window_duration;

        if !self.has_enough_source_data(to_timestamp).await? {
            return Ok(None);
        }

        let to_height = self.height_below(to_timestamp).await?;

        Ok(Some(Window {
            from_timestamp: last.block_timestamp,
            to_timestamp,
            from_height: last.block_height,
            to_height,
        }))
    }

    /// True when the newest source block is strictly past `to_timestamp`.
    async fn has_enough_source_data(
        &self,
        to_timestamp: BlockTimestamp,
    ) -> Result<bool, PlanError> {
        let query = sql::newest_source_timestamp(&self.source_schema, BLOCKS_TABLE);
        let newest: Option<BlockTimestamp> = sqlx::query_scalar(&query)
            .fetch_optional(&self.pool)
            .await
            .map_err(PlanError::NewestTimestamp)?;

        Ok(newest.is_some_and(|ts| ts > to_timestamp))
    }

    /// Height of the latest source block with `block_timestamp < to_timestamp`.
    async fn height_below(&self, to_timestamp: BlockTimestamp) -> Result<BlockHeight, PlanError> {
        let query = sql::height_below_timestamp(&self.source_schema, BLOCKS_TABLE);
        let height: Option<BlockHeight> = sqlx::query_scalar(&query)
            .bind(to_timestamp)
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| PlanError::HeightLookup {
                to_timestamp,
                source: err,
            })?;

        height.ok_or(PlanError::NoBlockBelow { to_timestamp })
    }
}

/// Round a timestamp down to the nearest window boundary.
///
/// Bootstrap uses this so the very first window starts at a whole-day mark
/// even when the first block landed mid-day.
pub fn round_down_to_window(timestamp: BlockTimestamp, window_duration: i64) -> BlockTimestamp {
    timestamp - timestamp % window_duration
}

/// UTC calendar date of a nanosecond timestamp, for progress logs.
pub fn timestamp_date(timestamp: BlockTimestamp) -> NaiveDate {
    DateTime::from_timestamp_nanos(timestamp).date_naive()
}
