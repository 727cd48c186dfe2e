// Core modules
pub mod checkpoint;
pub mod commands;
pub mod config;
pub mod conn;
pub mod repair;
pub mod replicate;
pub mod sql;
pub mod tables;
pub mod window;

// Re-export for convenience
pub use checkpoint::{Checkpoint, CheckpointStore};
pub use conn::DbConnPool;
pub use window::{Window, WindowPlanner};
