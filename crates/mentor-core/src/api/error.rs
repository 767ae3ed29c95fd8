use thiserror::Error;

/// Failures talking to the tutoring backend.
///
/// Non-2xx responses are classified by status; the `details` strings carry
/// the backend's own explanation when its error body could be parsed.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Authentication failed: {details}")]
    AuthenticationFailed { details: String },

    #[error("Not found: {details}")]
    NotFound { details: String },

    #[error("Invalid request: {details}")]
    InvalidRequest { details: String },

    #[error("Server error (Status: {status_code}): {details}")]
    Server { status_code: u16, details: String },

    #[error("Stream error: {details}")]
    Stream { details: String },

    #[error("Unknown API error (Status: {status_code}): {details}")]
    Unknown { status_code: u16, details: String },
}
