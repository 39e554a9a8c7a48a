//! Error taxonomy for the publish path
//!
//! Runtime failures never escape as `Err` from the public surface: they are
//! classified into an [`ErrorKind`] and carried inside a
//! [`Response`](crate::publish::Response). [`PublishError`] holds the
//! human-readable detail for each failing kind.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;

/// Longest error message kept in the health record or diagnostics
pub const MAX_ERROR_MESSAGE_LEN: usize = 500;

/// Outcome classification attached to every response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    None,
    NotInitialized,
    LinkDown,
    InvalidPayload,
    AuthRejected,
    BadRequest,
    ServiceUnavailable,
    Transport,
    ServerError,
}

impl ErrorKind {
    /// Whether another attempt may change the outcome
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::ServiceUnavailable | ErrorKind::Transport | ErrorKind::ServerError
        )
    }

    /// Whether the failure came back from the wire (as opposed to a local precondition)
    pub fn is_wire_failure(self) -> bool {
        matches!(
            self,
            ErrorKind::AuthRejected
                | ErrorKind::BadRequest
                | ErrorKind::ServiceUnavailable
                | ErrorKind::Transport
                | ErrorKind::ServerError
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::None => "none",
            ErrorKind::NotInitialized => "not_initialized",
            ErrorKind::LinkDown => "link_down",
            ErrorKind::InvalidPayload => "invalid_payload",
            ErrorKind::AuthRejected => "auth_rejected",
            ErrorKind::BadRequest => "bad_request",
            ErrorKind::ServiceUnavailable => "service_unavailable",
            ErrorKind::Transport => "transport",
            ErrorKind::ServerError => "server_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified publish failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    #[error("client not initialized")]
    NotInitialized,

    #[error("link not connected")]
    LinkDown,

    #[error("invalid JSON payload structure: {reason}")]
    InvalidPayload { reason: String },

    #[error("authentication failed - check API key")]
    AuthRejected,

    #[error("invalid data format")]
    BadRequest,

    #[error("service unavailable")]
    ServiceUnavailable,

    #[error("network error - check connection (code {code})")]
    Transport { code: i32 },

    #[error("server error (HTTP {code})")]
    ServerError { code: i32 },
}

impl PublishError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PublishError::NotInitialized => ErrorKind::NotInitialized,
            PublishError::LinkDown => ErrorKind::LinkDown,
            PublishError::InvalidPayload { .. } => ErrorKind::InvalidPayload,
            PublishError::AuthRejected => ErrorKind::AuthRejected,
            PublishError::BadRequest => ErrorKind::BadRequest,
            PublishError::ServiceUnavailable => ErrorKind::ServiceUnavailable,
            PublishError::Transport { .. } => ErrorKind::Transport,
            PublishError::ServerError { .. } => ErrorKind::ServerError,
        }
    }

    /// Create invalid payload error
    pub fn invalid_payload<S: Into<String>>(reason: S) -> Self {
        Self::InvalidPayload {
            reason: reason.into(),
        }
    }

    /// Detail text once the retry budget is spent on this failure
    pub fn exhausted_detail(&self) -> String {
        format!("{self} - all retries exhausted")
    }
}

/// Why the link could not be brought up
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("client not initialized")]
    NotPrimed,

    #[error("WiFi connection timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

static SECRET_ASSIGNMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(password|token|key|secret)[=:]\s*\S+").expect("static regex is valid")
});

/// Redact credentials from a message before it is stored or rendered
///
/// Removes `key=value` style secrets, every literal occurrence of the given
/// secrets, and truncates to [`MAX_ERROR_MESSAGE_LEN`] bytes.
pub fn sanitize_error_message(message: &str, secrets: &[&str]) -> String {
    let mut sanitized = SECRET_ASSIGNMENT
        .replace_all(message, "${1}=***")
        .to_string();

    for secret in secrets.iter().filter(|s| !s.is_empty()) {
        sanitized = sanitized.replace(secret, "***");
    }

    if sanitized.len() > MAX_ERROR_MESSAGE_LEN {
        let truncate_suffix = "...[truncated]";
        let mut cut = MAX_ERROR_MESSAGE_LEN - truncate_suffix.len();
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized = format!("{}{}", &sanitized[..cut], truncate_suffix);
    }

    sanitized
}
