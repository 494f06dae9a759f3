use thiserror::Error;

#[derive(Debug, Error)]
pub enum VerbaError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Authentication error: {0}")]
    Auth(String),
}

impl VerbaError {
    /// Returns `true` when the error came from talking to the completion
    /// service rather than from local state or client input.
    pub fn is_external(&self) -> bool {
        matches!(self, Self::Llm(_) | Self::Http(_))
    }

    /// Returns `true` for errors caused by what the client sent.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidInput(_) | Self::Auth(_))
    }
}

pub type Result<T> = std::result::Result<T, VerbaError>;
