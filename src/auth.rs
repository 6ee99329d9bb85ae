use chrono::{DateTime, Duration, Utc};

/// Safety margin in seconds subtracted from the token's actual expiry.
/// A token inside this margin is treated as expired so that no request is
/// dispatched with a token that could lapse mid-flight.
pub const EXPIRY_THRESHOLD_SECS: i64 = 300;

/// Credential issued by the authentication endpoint.
/// Immutable once constructed; a refresh replaces the whole value.
#[derive(Debug, Clone)]
pub struct Credential {
    /// Bearer token sent as X-Auth-Token on every storage request
    pub token: String,

    /// Base URL of the storage endpoint, trailing slashes stripped
    pub storage_url: String,

    /// Absolute instant at which the server invalidates the token
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    /// Create a new Credential from handshake response values
    pub fn new(
        token: String,
        storage_url: &str,
        ttl_seconds: i64,
        issued_at: DateTime<Utc>,
    ) -> Self {
        Credential {
            token,
            storage_url: storage_url.trim_end_matches('/').to_string(),
            expires_at: issued_at + Duration::seconds(ttl_seconds),
        }
    }

    /// Check whether less than the safety margin remains before expiry.
    /// Pure function of the stored expiry and the supplied clock reading.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - now < Duration::seconds(EXPIRY_THRESHOLD_SECS)
    }
}
