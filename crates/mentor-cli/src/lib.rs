pub mod cli;
pub mod commands;

use std::sync::Arc;

use eyre::{Result, eyre};
use url::Url;

use mentor_core::api::{HttpTutorBackend, TutorBackend};
use mentor_core::auth::BearerToken;
use mentor_core::config::BackendConfig;

/// Build the HTTP backend from the `--api-url` flag, falling back to the
/// environment and the local development default.
pub fn build_backend(api_url: Option<Url>) -> Result<Arc<dyn TutorBackend>> {
    let config = match api_url {
        Some(base_url) => BackendConfig::new(base_url),
        None => BackendConfig::from_env()?,
    };
    tracing::debug!(target: "mentor::cli", "Using backend at {}", config.base_url);
    let backend = HttpTutorBackend::new(config)?;
    Ok(Arc::new(backend))
}

/// Every subcommand talks to the backend as a signed-in student.
pub fn resolve_token(token: Option<String>) -> Result<BearerToken> {
    token
        .map(BearerToken::new)
        .ok_or_else(|| eyre!("Not signed in. Pass --token or set MENTOR_TOKEN."))
}
