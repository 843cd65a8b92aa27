use std::io;

use thiserror::Error;

use crate::types::EntityId;

/// Error type for fetch configuration, transport, and response failures.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection, timeout, body read, or non-2xx status failure.
    #[error("request to '{endpoint}' failed: {reason}")]
    Transport {
        /// Endpoint the request was sent to.
        endpoint: String,
        /// Underlying failure.
        reason: String,
    },
    /// The endpoint answered, but the body was not a JSON array of rows.
    #[error("response from '{endpoint}' was not a JSON array of rows: {details}")]
    MalformedResponse {
        /// Endpoint the request was sent to.
        endpoint: String,
        /// What was wrong with the body.
        details: String,
    },
    /// Settings that cannot produce a meaningful fetch.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// A time range that could not be parsed or is reversed.
    #[error("invalid time range: {0}")]
    InvalidRange(String),
    /// A row source panicked while serving one task.
    #[error("worker panicked while fetching rows for '{entity_id}'")]
    WorkerPanicked {
        /// Entity of the task being served.
        entity_id: EntityId,
    },
    /// Local I/O failure, such as writing CLI output.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl FetchError {
    /// Returns `true` for connection, timeout, and non-2xx status failures.
    pub fn is_transport(&self) -> bool {
        matches!(self, FetchError::Transport { .. })
    }

    /// Returns `true` when the endpoint answered but the body held no usable rows.
    pub fn is_malformed(&self) -> bool {
        matches!(self, FetchError::MalformedResponse { .. })
    }
}
