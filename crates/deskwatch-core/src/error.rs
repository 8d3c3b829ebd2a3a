//! Unified error types for DeskWatch.

use thiserror::Error;

/// Result type alias using DeskWatchError.
pub type Result<T> = std::result::Result<T, DeskWatchError>;

#[derive(Error, Debug)]
pub enum DeskWatchError {
    // Config errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Local notification history (SQLite)
    #[error("Database error: {0}")]
    Database(String),

    // FreeScout ticket source
    #[error("Ticket source error: {0}")]
    Source(String),

    // Outbound chat webhook
    #[error("Transport error: {0}")]
    Transport(String),

    // General errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DeskWatchError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    pub fn source(msg: impl Into<String>) -> Self {
        Self::Source(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DeskWatchError::Transport("status 500".into());
        assert!(err.to_string().contains("status 500"));
    }

    #[test]
    fn test_error_constructors() {
        assert!(matches!(DeskWatchError::config("x"), DeskWatchError::Config(_)));
        assert!(matches!(DeskWatchError::database("x"), DeskWatchError::Database(_)));
        assert!(matches!(DeskWatchError::source("x"), DeskWatchError::Source(_)));
        assert!(matches!(DeskWatchError::transport("x"), DeskWatchError::Transport(_)));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: DeskWatchError = json_err.into();
        assert!(matches!(err, DeskWatchError::Serialization(_)));
    }
}
