use reqwest::blocking::{Client, ClientBuilder};
use std::time::Duration;

/// Default token-issuing endpoint
pub const DEFAULT_AUTH_URL: &str = "https://auth.selcdn.ru/";

/// Create the default HTTP client for storage API requests
/// with optimized settings for connection pooling and timeouts
pub fn create_storage_client() -> Client {
    ClientBuilder::new()
        .pool_max_idle_per_host(50)
        .timeout(Duration::from_secs(300)) // 5 minutes
        .connect_timeout(Duration::from_secs(10))
        .build()
        .expect("Failed to create HTTP client")
}

/// Create the HTTP client for streamed transfers with longer timeout
pub fn create_transfer_client() -> Client {
    ClientBuilder::new()
        .pool_max_idle_per_host(50)
        .timeout(Duration::from_secs(3600)) // 1 hour
        .connect_timeout(Duration::from_secs(10))
        .build()
        .expect("Failed to create transfer HTTP client")
}

/// Configuration for the storage client
#[derive(Debug, Clone)]
pub struct Config {
    /// URL of the token-issuing endpoint
    pub auth_url: String,
    /// Account identity user
    pub user: String,
    /// Account identity key
    pub key: String,
}

impl Config {
    /// Create a new configuration for the given account identity
    pub fn new(user: &str, key: &str) -> Self {
        Config {
            auth_url: DEFAULT_AUTH_URL.to_string(),
            user: user.to_string(),
            key: key.to_string(),
        }
    }

    /// Point the client at a different token-issuing endpoint
    pub fn with_auth_url(mut self, auth_url: &str) -> Self {
        self.auth_url = auth_url.to_string();
        self
    }
}
