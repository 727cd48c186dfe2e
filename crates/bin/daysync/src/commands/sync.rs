use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::{
    checkpoint::{Checkpoint, CheckpointStore},
    config::SyncConfig,
    conn::DbConnPool,
    repair, replicate, sql,
    window::{WindowPlanner, timestamp_date},
};

/// Summary of one invocation of the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Windows replicated and checkpointed in this run.
    pub windows_completed: u64,
    /// Whether startup found and rolled back a torn window.
    pub repaired: bool,
}

pub async fn run(config: SyncConfig) -> Result<()> {
    info!("Starting daysync");

    sql::validate_identifier(&config.source_schema)
        .with_context(|| format!("Invalid source schema name: {}", config.source_schema))?;

    let db = DbConnPool::connect(&config.database_url, config.max_db_connections)
        .await
        .context("Failed to connect to database")?;
    info!("Database connection established");

    let outcome = sync_to_present(&db, &config.source_schema, config.window_duration_ns).await?;

    info!(
        windows = outcome.windows_completed,
        repaired = outcome.repaired,
        "Daysync finished"
    );
    Ok(())
}

/// Replicates every window the source can close, then returns.
///
/// Repair runs once up front; after that the loop is
/// plan -> copy -> checkpoint until the source runs out of closed windows.
/// Any database error aborts the run; the checkpoint guarantees the next
/// invocation resumes without loss.
pub async fn sync_to_present(
    db: &DbConnPool,
    source_schema: &str,
    window_duration: i64,
) -> Result<SyncOutcome> {
    let store = CheckpointStore::new(db);
    store
        .init()
        .await
        .context("Failed to initialize the checkpoint table")?;

    let mut last = match store.last().await.context("Failed to load the checkpoint")? {
        Some(checkpoint) => checkpoint,
        None => {
            let checkpoint = store
                .bootstrap(source_schema, window_duration)
                .await
                .context("Failed to bootstrap from the earliest source block")?;
            info!(
                block_height = checkpoint.block_height,
                date = %timestamp_date(checkpoint.block_timestamp),
                "No checkpoint found, starting from the earliest source block"
            );
            checkpoint
        }
    };

    let repaired = repair::partial_window_exists(db, last.block_timestamp)
        .await
        .context("Failed to check the destination for a torn window")?;
    if repaired {
        warn!(
            block_height = last.block_height,
            date = %timestamp_date(last.block_timestamp),
            "Last run left a partial window, rolling back to the checkpoint"
        );
        repair::rollback_to_checkpoint(db, &last)
            .await
            .context("Failed to roll back the partial window")?;
    }

    let planner = WindowPlanner::new(db, source_schema, window_duration);
    let mut windows_completed = 0u64;

    loop {
        let window = match planner
            .next_window(&last)
            .await
            .context("Failed to plan the next window")?
        {
            Some(window) => window,
            None => {
                info!(
                    date = %timestamp_date(last.block_timestamp + window_duration),
                    "Not enough source data to close the next window, done"
                );
                break;
            }
        };

        info!(
            date = %timestamp_date(window.from_timestamp),
            from_height = window.from_height,
            to_height = window.to_height,
            "Replicating window"
        );

        replicate::copy_append_only(db, source_schema, &window)
            .await
            .context("Failed to copy append-only tables")?;
        replicate::copy_mutable(db, source_schema, &window)
            .await
            .context("Failed to re-sync mutable tables")?;

        last = Checkpoint {
            block_height: window.to_height,
            block_timestamp: window.to_timestamp,
        };
        store
            .save(&last)
            .await
            .context("Failed to save the checkpoint")?;
        windows_completed += 1;

        info!(
            date = %timestamp_date(window.from_timestamp),
            to_date = %timestamp_date(window.to_timestamp),
            from_height = window.from_height,
            to_height = window.to_height,
            "Window replicated"
        );
    }

    Ok(SyncOutcome {
        windows_completed,
        repaired,
    })
}
