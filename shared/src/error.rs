use crate::schema::{ErrorCode, RequestError};
use alloc::string::String;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SharedError {
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("malformed request: {0}")]
    Request(#[from] RequestError),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid input: {0}")]
    Usage(String),
    #[error("device reported {code:?}: {message}")]
    Device { code: Option<ErrorCode>, message: String },
}

impl From<io::Error> for SharedError {
    fn from(value: io::Error) -> Self {
        SharedError::Transport(value.to_string())
    }
}
