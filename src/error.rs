use thiserror::Error;

/// Failures that can occur while talking to the chat service.
///
/// Every variant ends up as the same error bubble in the conversation; the
/// distinction only matters for the diagnostic log.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("chat session not initialized")]
    SessionNotInitialized,

    #[error("GEMINI_API_KEY environment variable not set")]
    MissingApiKey,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("request to Gemini API failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Gemini API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("malformed stream payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("response blocked: {0}")]
    Blocked(String),

    #[error("invalid UTF-8 in response stream")]
    InvalidUtf8(#[from] std::str::Utf8Error),
}

pub type Result<T, E = ChatError> = std::result::Result<T, E>;
