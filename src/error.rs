//! Top-level error types for Relaybot.

use std::sync::Arc;

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error enum wrapping domain-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Messaging(#[from] MessagingError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Short category name that is safe to show to end users.
    ///
    /// Never carries provider messages, URLs or other internal detail.
    pub fn category(&self) -> &'static str {
        match self {
            Error::Config(_) => "ConfigError",
            Error::Store(_) => "StoreError",
            Error::Llm(error) => error.category(),
            Error::Messaging(_) => "MessagingError",
            Error::Io(_) => "IoError",
            Error::Other(_) => "InternalError",
        }
    }
}

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load config from {path}: {source}")]
    Load {
        path: String,
        source: Arc<std::io::Error>,
    },

    #[error("failed to parse config file {path}: {message}")]
    Parse { path: String, message: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("missing required config keys: {}", .0.join(", "))]
    MissingKeys(Vec<String>),
}

/// Conversation store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] redb::Error),

    #[error("corrupt conversation record {key}: {source}")]
    Corrupt {
        key: String,
        source: serde_json::Error,
    },

    #[error("failed to encode conversation record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("store task failed: {0}")]
    Task(String),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("provider request failed: {0}")]
    Transport(String),

    #[error("provider API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("empty response from provider")]
    EmptyResponse,
}

impl LlmError {
    pub fn category(&self) -> &'static str {
        match self {
            LlmError::Transport(_) => "TransportError",
            LlmError::Api { .. } => "ApiError",
            LlmError::InvalidResponse(_) => "InvalidResponse",
            LlmError::EmptyResponse => "EmptyResponse",
        }
    }
}

/// Outbound delivery and platform API errors.
#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    #[error("failed to send message: {0}")]
    SendFailed(String),

    #[error("failed to read channel history: {0}")]
    HistoryUnavailable(String),

    #[error("platform client error: {0}")]
    Client(String),
}
