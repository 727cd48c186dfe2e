use daysync::{Checkpoint, CheckpointStore, DbConnPool, checkpoint::CheckpointError};
use pgtemp::PgTempDB;

/// Helper to create a test database pool
/// Returns (DbConnPool, sqlx::PgPool, PgTempDB) - the PgTempDB must be kept alive
async fn create_test_pool() -> (DbConnPool, sqlx::PgPool, PgTempDB) {
    // Set C locale for pgtemp
    unsafe {
        std::env::set_var("LANG", "C");
    }

    let pg_temp = PgTempDB::new();
    let connection_string = pg_temp.connection_uri();

    let db_pool = DbConnPool::connect(&connection_string, 1)
        .await
        .expect("Failed to create DbConnPool");

    // Also create a raw pool for verification queries
    let raw_pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(1)
        .connect(&connection_string)
        .await
        .expect("Failed to connect to test database");

    (db_pool, raw_pool, pg_temp)
}

/// Helper to create the staging blocks table and seed it with (height, timestamp) rows
async fn seed_source_blocks(pool: &sqlx::PgPool, blocks: &[(i64, i64)]) {
    sqlx::query("CREATE SCHEMA apg")
        .execute(pool)
        .await
        .expect("Failed to create staging schema");
    sqlx::query("CREATE TABLE apg.blocks (block_height BIGINT NOT NULL, block_timestamp BIGINT NOT NULL)")
        .execute(pool)
        .await
        .expect("Failed to create staging blocks table");

    for &(height, timestamp) in blocks {
        sqlx::query("INSERT INTO apg.blocks VALUES ($1, $2)")
            .bind(height)
            .bind(timestamp)
            .execute(pool)
            .await
            .expect("Failed to seed block");
    }
}

#[tokio::test]
async fn test_init_creates_checkpoint_table() {
    let (db_pool, pool, _pg_temp) = create_test_pool().await;
    let store = CheckpointStore::new(&db_pool);

    store.init().await.expect("Failed to initialize checkpoint table");

    // Verify table exists
    let table_exists: Option<(bool,)> = sqlx::query_as(
        "SELECT EXISTS (
            SELECT 1 FROM information_schema.tables
            WHERE table_name = '_last_successful_load'
        )",
    )
    .fetch_optional(&pool)
    .await
    .expect("Failed to check table existence");

    assert_eq!(table_exists, Some((true,)));

    // Verify columns exist
    let columns: Vec<(String,)> = sqlx::query_as(
        "SELECT column_name FROM information_schema.columns
         WHERE table_name = '_last_successful_load'
         ORDER BY ordinal_position",
    )
    .fetch_all(&pool)
    .await
    .expect("Failed to query columns");

    assert_eq!(columns.len(), 2);
    assert_eq!(columns[0].0, "block_height");
    assert_eq!(columns[1].0, "block_timestamp");

    // Idempotent: a second init is a no-op
    store.init().await.expect("Second init should succeed");
}

#[tokio::test]
async fn test_last_checkpoint_none_when_empty() {
    let (db_pool, _pool, _pg_temp) = create_test_pool().await;
    let store = CheckpointStore::new(&db_pool);

    store.init().await.expect("Failed to initialize checkpoint table");

    let checkpoint = store.last().await.expect("Failed to read checkpoint");

    assert_eq!(checkpoint, None);
}

#[tokio::test]
async fn test_last_checkpoint_is_max_timestamp() {
    let (db_pool, _pool, _pg_temp) = create_test_pool().await;
    let store = CheckpointStore::new(&db_pool);

    store.init().await.expect("Failed to initialize checkpoint table");

    // Append out of order; the live checkpoint is by timestamp, not insertion
    for (block_height, block_timestamp) in [(5, 100), (9, 200), (7, 150)] {
        store
            .save(&Checkpoint {
                block_height,
                block_timestamp,
            })
            .await
            .expect("Failed to save checkpoint");
    }

    let checkpoint = store.last().await.expect("Failed to read checkpoint");

    assert_eq!(
        checkpoint,
        Some(Checkpoint {
            block_height: 9,
            block_timestamp: 200,
        })
    );
}

#[tokio::test]
async fn test_bootstrap_rounds_down_to_window_boundary() {
    let (db_pool, pool, _pg_temp) = create_test_pool().await;
    let store = CheckpointStore::new(&db_pool);

    // Earliest block lands mid-window
    seed_source_blocks(&pool, &[(1, 2_500_000), (2, 2_600_000), (3, 3_700_000)]).await;

    let checkpoint = store
        .bootstrap("apg", 1_000_000)
        .await
        .expect("Failed to bootstrap");

    assert_eq!(
        checkpoint,
        Checkpoint {
            block_height: 1,
            block_timestamp: 2_000_000,
        }
    );
}

#[tokio::test]
async fn test_bootstrap_already_on_boundary_is_unchanged() {
    let (db_pool, pool, _pg_temp) = create_test_pool().await;
    let store = CheckpointStore::new(&db_pool);

    seed_source_blocks(&pool, &[(10, 4_000_000)]).await;

    let checkpoint = store
        .bootstrap("apg", 1_000_000)
        .await
        .expect("Failed to bootstrap");

    assert_eq!(
        checkpoint,
        Checkpoint {
            block_height: 10,
            block_timestamp: 4_000_000,
        }
    );
}

#[tokio::test]
async fn test_bootstrap_fails_on_empty_source() {
    let (db_pool, pool, _pg_temp) = create_test_pool().await;
    let store = CheckpointStore::new(&db_pool);

    seed_source_blocks(&pool, &[]).await;

    let err = store
        .bootstrap("apg", 1_000_000)
        .await
        .expect_err("Bootstrap should fail with no source blocks");

    assert!(matches!(err, CheckpointError::EmptySource { .. }));
}
