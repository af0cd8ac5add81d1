//! Configuration management for the client.

use std::env;

/// Client configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the remote store, without a trailing `/api`
    pub base_url: String,
    /// Basic-auth username
    pub username: String,
    /// Basic-auth password
    pub password: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url = env::var("METASYNC_BASE_URL").map_err(|_| ConfigError::MissingBaseUrl)?;
        let username = env::var("METASYNC_USERNAME").map_err(|_| ConfigError::MissingCredentials)?;
        let password = env::var("METASYNC_PASSWORD").map_err(|_| ConfigError::MissingCredentials)?;

        Ok(Self {
            base_url,
            username,
            password,
        })
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("METASYNC_BASE_URL environment variable is required")]
    MissingBaseUrl,

    #[error("METASYNC_USERNAME and METASYNC_PASSWORD environment variables are required")]
    MissingCredentials,
}
