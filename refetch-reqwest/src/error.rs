use reqwest::StatusCode;
use thiserror::Error;

/// Failure of one HTTP attempt.
#[derive(Debug, Error)]
pub enum HttpError {
    /// The request could not be sent or the body could not be read.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// The server answered with a non-success status.
    #[error("server responded with {status}")]
    Status {
        /// Response status.
        status: StatusCode,
        /// Response body, if it could be read as text.
        body: String,
    },
    /// The body was not valid JSON for the expected payload.
    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
    /// The attempt was abandoned because its request was cancelled.
    #[error("request cancelled")]
    Cancelled,
}

impl HttpError {
    /// Status code of the response, when one was received.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            HttpError::Status { status, .. } => Some(*status),
            HttpError::Transport(error) => error.status(),
            _ => None,
        }
    }
}
