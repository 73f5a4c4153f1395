use thiserror::Error;

/// A search request rejected before any network call is made.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("invalid date `{0}`, expected YYYY-MM-DD")]
    InvalidDate(String),
    #[error("unknown seat class `{0}`")]
    UnknownSeatClass(String),
}

/// A stream event that could not be decoded. Never fatal to the session.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("malformed ticket batch: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("unexpected object payload: {0}")]
    UnexpectedObject(String),
    #[error("unexpected payload shape: {0}")]
    UnexpectedShape(String),
}
