//! Logging setup shared by the workspace binaries.

pub mod logging;
