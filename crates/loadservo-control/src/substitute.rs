//! Macro substitution in the load command's argument vector.
//!
//! The operator marks one argument with a placeholder token (default
//! `%`); every cycle that slot is rewritten with the current MV so the
//! load generator picks it up as, say, its concurrency level.

use crate::error::{ControlError, ControlResult};

/// Find the argument slot holding the macro token.
///
/// First exact match wins. Resolved exactly once, at worker
/// initialization; an absent token is a fatal validation error since
/// the controller would have no way to inject the MV.
pub fn resolve_macro(args: &[String], token: &str) -> ControlResult<usize> {
    args.iter()
        .position(|arg| arg == token)
        .ok_or_else(|| ControlError::MacroNotFound(token.to_string()))
}

/// Overwrite the macro slot with the signed decimal form of `mv`.
///
/// Called once per cycle, strictly before that cycle's process is
/// started.
pub fn apply_macro(args: &mut [String], index: usize, mv: i64) {
    args[index] = mv.to_string();
}
