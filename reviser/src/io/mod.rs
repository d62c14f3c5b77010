//! I/O adapters for reviser commands.

pub mod config;
pub mod feedback;
pub mod human;
pub mod init;
pub mod model;
pub mod persist;
pub mod process;
pub mod prompt;
pub mod run_log;
pub mod scan;
pub mod session;
pub mod terminal;
