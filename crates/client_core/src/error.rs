use shared::error::ValidationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to reach backend at {url}: {message}")]
    Connect { url: String, message: String },
    #[error("backend at {url} did not answer in time")]
    Timeout { url: String },
    #[error("backend returned status {status} for {url}")]
    Status { url: String, status: u16 },
    #[error("stream read failed: {0}")]
    Read(String),
    #[error("event payload is not valid UTF-8")]
    InvalidEncoding,
    #[error("malformed response body from {url}: {message}")]
    Body { url: String, message: String },
}

impl TransportError {
    /// Fatal errors end the stream; the rest only drop the offending event.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, TransportError::InvalidEncoding)
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("could not open ticket stream: {0}")]
    Connectivity(#[source] TransportError),
    #[error("search was cancelled before its stream opened")]
    Cancelled,
}
