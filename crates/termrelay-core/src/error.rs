use thiserror::Error;

/// Errors produced by the relay protocol and transport layers.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("codec error: {0}")]
    Codec(String),

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for RelayError {
    fn from(e: serde_json::Error) -> Self {
        RelayError::Codec(e.to_string())
    }
}

pub type RelayResult<T> = Result<T, RelayError>;
