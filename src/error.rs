use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Broad failure category used for retry/UX decisions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorKind {
    /// Transient network or server-side failure; retrying may help.
    Network,
    /// Authentication/authorization failure.
    Auth,
    /// Rate-limited by the service.
    RateLimited,
    /// The referenced entity does not exist remotely.
    NotFound,
    /// Invalid input rejected before or by the service.
    Validation,
    /// Local persistence failure.
    Storage,
    /// Internal bug or invariant break.
    Internal,
}

/// Stable error payload carried on messages and ledger slots.
///
/// Failed operations leave one of these behind in state for the presentation
/// layer to render; the same shape doubles as the transport error type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[error("{kind:?}: {message}")]
pub struct ChatError {
    pub kind: ErrorKind,
    /// HTTP-style status when the transport had one.
    pub status: Option<u16>,
    /// Human-readable message.
    pub message: String,
}

impl ChatError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
        }
    }

    /// Attach the HTTP-style status the service answered with.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Build an error from a raw status code, classifying the kind from it.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        Self::new(classify_http_status(status), message).with_status(status)
    }
}

/// Map HTTP-style status codes to failure kinds.
pub fn classify_http_status(status: u16) -> ErrorKind {
    match status {
        401 | 403 => ErrorKind::Auth,
        404 => ErrorKind::NotFound,
        408 | 429 => ErrorKind::RateLimited,
        400..=499 => ErrorKind::Validation,
        500..=599 => ErrorKind::Network,
        _ => ErrorKind::Internal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_http_status_kinds() {
        assert_eq!(classify_http_status(401), ErrorKind::Auth);
        assert_eq!(classify_http_status(404), ErrorKind::NotFound);
        assert_eq!(classify_http_status(429), ErrorKind::RateLimited);
        assert_eq!(classify_http_status(422), ErrorKind::Validation);
        assert_eq!(classify_http_status(503), ErrorKind::Network);
        assert_eq!(classify_http_status(700), ErrorKind::Internal);
    }

    #[test]
    fn from_status_keeps_the_raw_status() {
        let err = ChatError::from_status(429, "slow down");
        assert_eq!(err.kind, ErrorKind::RateLimited);
        assert_eq!(err.status, Some(429));
        assert_eq!(err.to_string(), "RateLimited: slow down");
    }
}
