//! SQL utilities for safe identifier handling and query building.
//!
//! Every statement the replicator issues is built here, giving one auditable
//! boundary for SQL text. Table names come from the compile-time registry in
//! [`crate::tables`]; the source schema is the only identifier that arrives
//! from configuration and must pass [`validate_identifier`] before use.
//!
//! Range bounds are never interpolated; they bind as `$n` parameters.

use pg_escape::quote_identifier;
use sqlparser::{dialect::PostgreSqlDialect, parser::Parser};

/// Errors that occur during SQL identifier validation.
#[derive(Debug, thiserror::Error)]
pub enum ValidateIdentifierError {
    /// Identifier is empty
    #[error("Identifier cannot be empty")]
    Empty,

    /// Identifier exceeds PostgreSQL's 63-byte limit
    #[error("Identifier exceeds PostgreSQL limit of 63 bytes (got {length})")]
    TooLong { length: usize },

    /// Identifier contains invalid characters
    #[error("Identifier contains invalid character: '{character}'")]
    InvalidCharacter { character: char },

    /// Identifier must start with letter or underscore
    #[error("Identifier must start with letter or underscore, got '{first_char}'")]
    InvalidFirstCharacter { first_char: char },

    /// Identifier failed SQL parser validation
    #[error("Not a valid SQL identifier: {reason}")]
    ParserError { reason: String },

    /// Identifier parsed as multiple SQL statements (injection attempt)
    #[error("Identifier parsed as multiple SQL statements")]
    MultipleStatements,
}

/// Validate that a string is a safe, simple PostgreSQL identifier.
///
/// Checks character restrictions and the 63-byte limit first, then runs the
/// candidate through sqlparser to catch anything the character rules miss.
pub fn validate_identifier(name: &str) -> Result<(), ValidateIdentifierError> {
    if name.is_empty() {
        return Err(ValidateIdentifierError::Empty);
    }

    // PostgreSQL truncates identifiers beyond 63 bytes; reject instead
    if name.len() > 63 {
        return Err(ValidateIdentifierError::TooLong { length: name.len() });
    }

    // Only simple, unqualified identifiers are accepted
    for ch in name.chars() {
        if !ch.is_ascii_alphanumeric() && ch != '_' && ch != '$' {
            return Err(ValidateIdentifierError::InvalidCharacter { character: ch });
        }
    }

    let first_char = name.chars().next().unwrap(); // Safe: we checked for empty above
    if !first_char.is_ascii_alphabetic() && first_char != '_' {
        return Err(ValidateIdentifierError::InvalidFirstCharacter { first_char });
    }

    let sql = format!("SELECT * FROM {}", name);
    let dialect = PostgreSqlDialect {};

    match Parser::parse_sql(&dialect, &sql) {
        Ok(statements) => {
            if statements.len() != 1 {
                return Err(ValidateIdentifierError::MultipleStatements);
            }
            Ok(())
        }
        Err(e) => Err(ValidateIdentifierError::ParserError {
            reason: e.to_string(),
        }),
    }
}

/// Quote a `schema.table` reference.
fn qualified(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_identifier(schema), quote_identifier(table))
}

/// `INSERT ... SELECT` for one append-only table over a half-open timestamp
/// range.
///
/// Bind `$1` = from_timestamp (inclusive), `$2` = to_timestamp (exclusive).
pub fn copy_time_range(table: &str, source_schema: &str) -> String {
    format!(
        "INSERT INTO {} SELECT * FROM {} WHERE block_timestamp >= $1 AND block_timestamp < $2",
        quote_identifier(table),
        qualified(source_schema, table),
    )
}

/// `INSERT ... SELECT` for one mutable table: rows created or soft-deleted in
/// a half-open height range.
///
/// Bind `$1` = from_height (inclusive), `$2` = to_height (exclusive).
pub fn copy_height_range(table: &str, source_schema: &str) -> String {
    format!(
        "INSERT INTO {} SELECT * FROM {} \
         WHERE (created_by_block_height >= $1 AND created_by_block_height < $2) \
         OR (deleted_by_block_height >= $1 AND deleted_by_block_height < $2)",
        quote_identifier(table),
        qualified(source_schema, table),
    )
}

/// Delete destination rows whose soft-deletion height falls in a half-open
/// range. These rows are stale and get re-inserted with their deletion marker
/// by [`copy_height_range`].
///
/// Bind `$1` = from_height (inclusive), `$2` = to_height (exclusive).
pub fn delete_soft_deleted_in_range(table: &str) -> String {
    format!(
        "DELETE FROM {} WHERE deleted_by_block_height >= $1 AND deleted_by_block_height < $2",
        quote_identifier(table),
    )
}

/// Delete destination rows at or past a timestamp (append-only crash repair).
///
/// Bind `$1` = timestamp (inclusive).
pub fn delete_from_timestamp(table: &str) -> String {
    format!(
        "DELETE FROM {} WHERE block_timestamp >= $1",
        quote_identifier(table),
    )
}

/// Delete destination rows created at or past a height (mutable crash repair).
///
/// Bind `$1` = height (inclusive).
pub fn delete_created_from_height(table: &str) -> String {
    format!(
        "DELETE FROM {} WHERE created_by_block_height >= $1",
        quote_identifier(table),
    )
}

/// Newest `block_timestamp` in a destination table, if any.
pub fn newest_timestamp(table: &str) -> String {
    format!(
        "SELECT block_timestamp FROM {} ORDER BY block_timestamp DESC LIMIT 1",
        quote_identifier(table),
    )
}

/// Newest `block_timestamp` in a source-schema table, if any.
pub fn newest_source_timestamp(source_schema: &str, table: &str) -> String {
    format!(
        "SELECT block_timestamp FROM {} ORDER BY block_timestamp DESC LIMIT 1",
        qualified(source_schema, table),
    )
}

/// Height of the latest source block strictly before a timestamp.
///
/// Bind `$1` = to_timestamp (exclusive).
pub fn height_below_timestamp(source_schema: &str, blocks_table: &str) -> String {
    format!(
        "SELECT block_height FROM {} WHERE block_timestamp < $1 \
         ORDER BY block_timestamp DESC LIMIT 1",
        qualified(source_schema, blocks_table),
    )
}

/// Height and timestamp of the earliest source block.
pub fn earliest_block(source_schema: &str, blocks_table: &str) -> String {
    format!(
        "SELECT block_height, block_timestamp FROM {} ORDER BY block_timestamp LIMIT 1",
        qualified(source_schema, blocks_table),
    )
}
