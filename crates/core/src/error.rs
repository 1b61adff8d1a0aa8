//! Error types for the kitbot domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all kitbot operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Generator errors ---
    #[error("Generator error: {0}")]
    Generator(#[from] GeneratorError),

    // --- Transport errors ---
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures from a response generator (AI provider, command handler).
///
/// All variants are transient to the provider chain: it logs a warning and
/// consults the next generator. Nothing here ever reaches a chat conversation.
#[derive(Debug, Clone, Error)]
pub enum GeneratorError {
    #[error("API request failed: {message} (status: {status_code})")]
    Api { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Failures at the platform transport boundary.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Message delivery failed to {conversation_id}: {reason}")]
    Send {
        conversation_id: String,
        reason: String,
    },

    #[error("Failed to acknowledge event: {0}")]
    Ack(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generator_error_displays_correctly() {
        let err = Error::Generator(GeneratorError::Api {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn transport_error_displays_correctly() {
        let err = Error::Transport(TransportError::Send {
            conversation_id: "C123".into(),
            reason: "channel_not_found".into(),
        });
        assert!(err.to_string().contains("C123"));
        assert!(err.to_string().contains("channel_not_found"));
    }
}
