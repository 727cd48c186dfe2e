//! The fixed registry of replicated tables.
//!
//! Both schemas carry the same table shapes; the staging schema name is the
//! only thing that differs between source and destination.

/// Append-only tables. Rows are immutable once written and belong to a window
/// by `block_timestamp`.
pub const APPEND_ONLY_TABLES: &[&str] = &[
    "account_changes",
    "action_receipts__actions",
    "action_receipts__outputs",
    "action_receipts",
    "blocks",
    "chunks",
    "data_receipts",
    "execution_outcomes__receipts",
    "execution_outcomes",
    "transactions",
];

/// Tables whose rows carry soft-deletion markers. A row belongs to a window by
/// `created_by_block_height` or `deleted_by_block_height`, and is always
/// deleted and re-inserted to pick up a deletion that landed after its
/// creation window.
pub const MUTABLE_TABLES: &[&str] = &["accounts", "access_keys"];

/// The canonical block table, used to resolve window boundaries.
pub const BLOCKS_TABLE: &str = "blocks";

/// Destination-side log of completed windows.
pub const CHECKPOINT_TABLE: &str = "_last_successful_load";
