//! Stable exit codes for reviser CLI commands.

/// Command succeeded; every queued file was persisted.
pub const OK: i32 = 0;
/// Command failed due to invalid config, I/O errors or bad arguments.
pub const INVALID: i32 = 1;
/// The workflow stopped before finishing (user exit, backend failure, retry limit).
pub const ABORTED: i32 = 2;
/// No candidate files were found.
pub const NOTHING_TO_DO: i32 = 3;
