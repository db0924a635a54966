//! Stable exit codes for `apprunner` CLI commands.

/// Command succeeded (for `run`: the application exited successfully).
pub const OK: i32 = 0;
/// The project could not be built or started, or the config was invalid.
pub const CANNOT_START: i32 = 1;
/// No known build tool applies to the project.
pub const NOT_APPLICABLE: i32 = 2;
/// The application started but exited unsuccessfully.
pub const APP_FAILED: i32 = 3;
