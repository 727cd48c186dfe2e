use clap::{Parser, Subcommand};

/// One day of nanosecond-resolution block time, the mainnet window size.
///
/// Referenced in `--help` text only; the window duration is always an
/// explicit input so testnets and backfills pick their own value.
pub const MAINNET_DAY_NS: i64 = 24 * 60 * 60 * 1_000_000_000;

#[derive(Parser, Debug, Clone)]
#[command(name = "daysync")]
#[command(version)]
#[command(about = "Replicates indexer tables from a staging schema into production, one day at a time", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Replicate every closed window past the last checkpoint, then exit
    Sync(SyncConfig),
}

#[derive(clap::Args, Debug, Clone)]
pub struct SyncConfig {
    /// PostgreSQL connection URL (required)
    ///
    /// Format: postgresql://[user]:[password]@[host]:[port]/[database]
    /// Can also be set via DATABASE_URL environment variable
    #[arg(long, env = "DATABASE_URL", required = true)]
    pub database_url: String,

    /// Schema holding the staging copy of the indexer tables (default: "apg")
    ///
    /// Can also be set via SOURCE_SCHEMA environment variable
    #[arg(long, env = "SOURCE_SCHEMA", default_value = "apg")]
    pub source_schema: String,

    /// Replication window length in nanoseconds (required; one mainnet day is 86400000000000)
    ///
    /// Can also be set via WINDOW_DURATION_NS environment variable
    #[arg(long, env = "WINDOW_DURATION_NS", required = true, value_parser = clap::value_parser!(i64).range(1..))]
    pub window_duration_ns: i64,

    /// Maximum database connections (default: 2, valid range: 1-100)
    ///
    /// The loop is sequential, so a small pool is enough.
    /// Can also be set via MAX_DB_CONNECTIONS environment variable
    #[arg(long, env = "MAX_DB_CONNECTIONS", default_value_t = 2, value_parser = clap::value_parser!(u32).range(1..=100))]
    pub max_db_connections: u32,
}
