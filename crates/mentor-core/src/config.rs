//! Backend endpoint configuration.

use url::Url;

use crate::error::{Error, Result};

/// Environment variable overriding the backend base URL.
pub const API_URL_ENV: &str = "MENTOR_API_URL";

/// Base URL used when no override is configured.
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Where the tutoring backend lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub base_url: Url,
}

impl BackendConfig {
    pub fn new(base_url: Url) -> Self {
        Self { base_url }
    }

    /// Resolve the backend base URL from `MENTOR_API_URL`, falling back to
    /// the local development default.
    pub fn from_env() -> Result<Self> {
        let raw = std::env::var(API_URL_ENV).unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let base_url = Url::parse(raw)
            .map_err(|e| Error::Configuration(format!("invalid backend URL '{raw}': {e}")))?;
        Ok(Self { base_url })
    }
}
