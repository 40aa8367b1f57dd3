//! Control-loop error types.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during a control run.
///
/// None of these are recovered internally: validation variants abort
/// before the loop starts, the rest abort the run in flight (after the
/// current process group has been killed). Cancellation is not an
/// error; a cancelled run returns `Ok(())`.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("set point must be in 0 to 100, got {0}")]
    SetPointOutOfRange(u8),

    #[error("buffer length must be at least 1")]
    EmptyBuffer,

    #[error("sampling interval must be positive")]
    ZeroInterval,

    #[error("macro token `{0}` not found in the load command arguments")]
    MacroNotFound(String),

    #[error("failed to send reporter request: {0}")]
    Transport(#[from] hyper_util::client::legacy::Error),

    #[error("reporter request timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to read reporter response body: {0}")]
    Body(#[from] hyper::Error),

    #[error("reporter response is not an unsigned integer: {body:?}")]
    Protocol {
        body: String,
        #[source]
        source: std::num::ParseIntError,
    },

    #[error("process variable must be in 0 to 100, got {0}")]
    PvOutOfRange(u64),

    #[error("failed to start load command `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to kill load process group {pgid}: {source}")]
    Kill {
        pgid: i32,
        #[source]
        source: std::io::Error,
    },
}

pub type ControlResult<T> = Result<T, ControlError>;
