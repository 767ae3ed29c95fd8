//! Credential types for the tutoring backend.
//!
//! The backend authenticates every request with a bearer token issued by its
//! login flow. Acquiring and persisting that token is out of scope here; the
//! session layer receives one explicitly on each call that talks to the
//! network, so nothing in this crate holds ambient credential state.

/// An opaque bearer token for the tutoring backend.
///
/// `Debug` is redacted so tokens never leak into logs.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for BearerToken {
    fn from(token: String) -> Self {
        Self(token)
    }
}

impl From<&str> for BearerToken {
    fn from(token: &str) -> Self {
        Self(token.to_string())
    }
}

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BearerToken(***)")
    }
}
