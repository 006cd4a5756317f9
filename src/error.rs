//! Typed failure domains shared across the library.

use std::time::Duration;

use thiserror::Error;

/// Structural problems with provider output. These are fatal and surface at
/// load time, before any detection, planning or retrieval runs.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("required column `{column}` is missing from {table}")]
    MissingIdentifierColumn { table: String, column: String },

    #[error("order id `{0}` appears more than once")]
    DuplicateOrderId(String),

    #[error("row {row} of {table} has an empty identifier")]
    EmptyIdentifier { table: String, row: usize },
}

/// Failure of the external answer synthesizer.
///
/// Always recoverable: callers downgrade to the local summary.
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("synthesizer returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not parse synthesizer response: {0}")]
    Parse(String),

    #[error("synthesizer returned no text")]
    EmptyResponse,

    #[error("synthesizer did not answer within {0:?}")]
    Timeout(Duration),
}

impl From<reqwest::Error> for SynthesisError {
    fn from(err: reqwest::Error) -> Self {
        SynthesisError::Transport(err.to_string())
    }
}
