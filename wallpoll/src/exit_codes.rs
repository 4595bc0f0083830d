//! Stable exit codes for wallpoll CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Command failed due to invalid config, unreachable source, failed apply or other errors.
pub const FAILED: i32 = 1;
/// `wallpoll status` found no state record (nothing applied yet).
pub const NO_STATE: i32 = 2;
