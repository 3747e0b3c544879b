//! Stable exit codes for decider CLI commands.

/// Command succeeded; definitions parsed and validated.
pub const OK: i32 = 0;
/// Definition files failed to parse or validate, or another error occurred.
pub const INVALID: i32 = 1;
