//! Chat platform error types

use thiserror::Error;

/// Chat platform error with classification
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct ChatError {
    pub kind: ChatErrorKind,
    pub message: String,
}

impl ChatError {
    pub fn new(kind: ChatErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ChatErrorKind::Transport, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(ChatErrorKind::InvalidResponse, message)
    }

    /// Classify an `ok: false` API error code
    pub fn from_api_code(operation: &str, code: &str) -> Self {
        let kind = match code {
            "invalid_auth" | "not_authed" | "account_inactive" | "token_revoked"
            | "token_expired" | "missing_scope" => ChatErrorKind::Auth,
            "ratelimited" => ChatErrorKind::RateLimit,
            _ => ChatErrorKind::Api,
        };
        Self::new(kind, format!("{operation} failed: {code}"))
    }

    /// Classify a non-success HTTP status
    pub fn from_status(operation: &str, status: u16, body: &str) -> Self {
        let kind = match status {
            401 | 403 => ChatErrorKind::Auth,
            429 => ChatErrorKind::RateLimit,
            _ => ChatErrorKind::Transport,
        };
        Self::new(kind, format!("{operation} failed with status {status}: {body}"))
    }
}

/// Error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ChatErrorKind {
    /// Network failure, timeout or unexpected HTTP status
    #[error("transport")]
    Transport,
    /// Bad or revoked token, missing scope
    #[error("auth")]
    Auth,
    /// Platform throttled the request
    #[error("rate limited")]
    RateLimit,
    /// Platform rejected the call
    #[error("api")]
    Api,
    /// Response body did not match the expected shape
    #[error("invalid response")]
    InvalidResponse,
}
