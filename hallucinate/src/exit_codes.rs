//! Stable exit codes for the `hallucinate` CLI.

/// A response body was produced.
pub const OK: i32 = 0;
/// Invalid config, malformed agent output, agent failure or other errors.
pub const INVALID: i32 = 1;
/// The turn budget or the prerecording ran out before a final answer.
pub const EXHAUSTED: i32 = 2;
