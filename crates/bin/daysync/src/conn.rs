//! Connection to the postgres database holding both schemas.
//!
//! One pool serves the whole run. Establishing it retries with backoff,
//! since a scheduler-invoked batch job routinely fires while its database is
//! still starting up; once established, replication statements are never
//! retried and any failure aborts the run.

use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use sqlx::{Pool, Postgres, postgres::PgPoolOptions};
use tracing::{instrument, warn};

/// Errors that can occur when connecting to the database.
#[derive(Debug, thiserror::Error)]
pub enum ConnError {
    /// Error connecting to the DB.
    #[error("Error connecting to db: {0}")]
    ConnectionError(#[source] sqlx::Error),
}

/// Postgres error codes worth waiting out at connection time.
fn is_transient_connect_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| {
            matches!(
                code.as_ref(),
                "57P03" | // The database system is starting up
                "53300" | // Too many connections
                "08006" | // Connection failure
                "08001" | // Unable to connect to server
                "08004" // Server rejected the connection
            )
        }),
        sqlx::Error::Io(_) | sqlx::Error::Tls(_) => true,
        sqlx::Error::PoolTimedOut => true,
        _ => false,
    }
}

/// The connection pool shared by every component of the run.
#[derive(Debug, Clone)]
pub struct DbConnPool(Pool<Postgres>);

impl DbConnPool {
    /// Set up the pool, waiting out transient connection failures with
    /// exponential backoff.
    #[instrument(skip_all, err)]
    pub async fn connect(url: &str, pool_size: u32) -> Result<Self, ConnError> {
        let pool_options = PgPoolOptions::new()
            .max_connections(pool_size)
            .acquire_timeout(Duration::from_secs(5));

        let connect = || {
            let pool_options = pool_options.clone();
            let url = url.to_string();
            async move { pool_options.connect(&url).await }
        };

        connect
            .retry(
                ExponentialBuilder::default()
                    .with_min_delay(Duration::from_millis(250))
                    .with_max_delay(Duration::from_secs(10))
                    .with_max_times(8),
            )
            .when(is_transient_connect_error)
            .notify(|err: &sqlx::Error, dur: Duration| {
                warn!(
                    error = %err,
                    retry_delay_secs = dur.as_secs_f32(),
                    "db_connection_retry"
                );
            })
            .await
            .map(Self)
            .map_err(ConnError::ConnectionError)
    }
}

impl std::ops::Deref for DbConnPool {
    type Target = Pool<Postgres>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
