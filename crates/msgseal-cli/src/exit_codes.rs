//! Process exit codes. Part of the CLI contract.

pub const SUCCESS: i32 = 0;
pub const VALIDATION_FAILED: i32 = 1; // Message or container rejected
pub const CONFIG_ERROR: i32 = 2; // Bad arguments, unreadable input or config
