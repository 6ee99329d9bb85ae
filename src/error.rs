use thiserror::Error;

/// Main error type for storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// Authentication handshake rejected. Repeating the handshake with the
    /// same identity will not self-heal, so this is never retried.
    #[error("authentication failed with status {status}")]
    Auth { status: u16 },

    /// Storage request returned 401. Absorbed once by the refresh-and-retry
    /// wrapper; surfaced verbatim when the replayed attempt fails again.
    #[error("storage token rejected (401 unauthorized)")]
    Unauthorized,

    /// Any other non-2xx response, or a 2xx status outside the operation's
    /// contract
    #[error("HTTP error {status}: {body}")]
    Http { status: u16, body: String },

    /// Connection-level failure from the HTTP client
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing error
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Timestamp in a listing or metadata response failed to parse
    #[error("timestamp parse error: {0}")]
    Time(#[from] chrono::ParseError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Response lacked a header the server contract requires
    #[error("missing response header: {0}")]
    MissingHeader(&'static str),

    /// Response header value was not readable as the contracted type
    #[error("invalid response header: {0}")]
    InvalidHeader(&'static str),
}

impl StorageError {
    /// Get the HTTP status code if this error carries one
    pub fn status_code(&self) -> Option<u16> {
        match self {
            StorageError::Auth { status } => Some(*status),
            StorageError::Unauthorized => Some(401),
            StorageError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Check if this error is a not found error (404)
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::Http { status: 404, .. })
    }
}

/// Result type for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let auth = StorageError::Auth { status: 403 };
        assert_eq!(auth.status_code(), Some(403));

        assert_eq!(StorageError::Unauthorized.status_code(), Some(401));

        let http = StorageError::Http {
            status: 500,
            body: "server error".to_string(),
        };
        assert_eq!(http.status_code(), Some(500));

        let missing = StorageError::MissingHeader("X-Auth-Token");
        assert_eq!(missing.status_code(), None);
    }

    #[test]
    fn test_error_not_found() {
        let error = StorageError::Http {
            status: 404,
            body: String::new(),
        };
        assert!(error.is_not_found());

        let error = StorageError::Http {
            status: 409,
            body: String::new(),
        };
        assert!(!error.is_not_found());
        assert!(!StorageError::Unauthorized.is_not_found());
    }
}
