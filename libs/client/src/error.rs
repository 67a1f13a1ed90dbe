use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("driver configuration error: {0}")]
    Config(String),
    #[error("driver transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("driver returned {status}: {message}")]
    Remote { status: StatusCode, message: String },
    #[error("failed to decode driver response: {0}")]
    Decode(String),
    #[error("{0}")]
    Rejected(String),
}

impl ClientError {
    pub fn rejected(message: impl Into<String>) -> Self {
        ClientError::Rejected(message.into())
    }
}
