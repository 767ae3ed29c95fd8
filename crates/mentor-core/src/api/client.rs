//! HTTP implementation of the tutoring backend surface.

use async_trait::async_trait;
use futures_core::Stream;
use futures_util::StreamExt;
use reqwest::StatusCode;
use serde::Deserialize;
use std::pin::Pin;
use tokio_util::bytes::Bytes;
use tracing::debug;
use url::Url;

use crate::api::error::ApiError;
use crate::api::types::{AskRequest, ConversationRecord, MessageRecord};
use crate::auth::BearerToken;
use crate::config::BackendConfig;

/// Raw chunked response body of the ask endpoint, before decoding.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ApiError>> + Send>>;

/// The backend operations the chat session depends on.
///
/// `ask` hands back the raw byte stream rather than decoded events so the
/// session drives the same decoder against real responses and test fixtures
/// alike, chunk boundaries included.
#[async_trait]
pub trait TutorBackend: Send + Sync + 'static {
    /// Fetch the student's conversations, most recently updated first.
    async fn list_conversations(
        &self,
        token: &BearerToken,
    ) -> Result<Vec<ConversationRecord>, ApiError>;

    /// Fetch the full message history of one conversation in chronological
    /// order.
    async fn conversation_messages(
        &self,
        token: &BearerToken,
        conversation_id: i64,
    ) -> Result<Vec<MessageRecord>, ApiError>;

    /// Submit a question and open the streaming answer body.
    async fn ask(&self, token: &BearerToken, request: AskRequest) -> Result<ByteStream, ApiError>;
}

/// Error body shape the backend emits on non-2xx responses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: String,
}

pub struct HttpTutorBackend {
    http_client: reqwest::Client,
    base_url: Url,
}

impl HttpTutorBackend {
    pub fn new(config: BackendConfig) -> Result<Self, ApiError> {
        let http_client = reqwest::Client::builder().build()?;
        Ok(Self {
            http_client,
            base_url: config.base_url,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.as_str().trim_end_matches('/'), path)
    }

    async fn get_json<T>(&self, token: &BearerToken, path: &str) -> Result<T, ApiError>
    where
        T: serde::de::DeserializeOwned,
    {
        let response = self
            .http_client
            .get(self.endpoint(path))
            .bearer_auth(token.as_str())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            return Err(classify_status(status, &error_text));
        }

        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl TutorBackend for HttpTutorBackend {
    async fn list_conversations(
        &self,
        token: &BearerToken,
    ) -> Result<Vec<ConversationRecord>, ApiError> {
        self.get_json(token, "rag/conversations").await
    }

    async fn conversation_messages(
        &self,
        token: &BearerToken,
        conversation_id: i64,
    ) -> Result<Vec<MessageRecord>, ApiError> {
        self.get_json(token, &format!("rag/conversations/{conversation_id}/messages"))
            .await
    }

    async fn ask(&self, token: &BearerToken, request: AskRequest) -> Result<ByteStream, ApiError> {
        debug!(
            target: "mentor::api",
            "Submitting question (conversation: {:?})",
            request.conversation_id
        );

        let response = self
            .http_client
            .post(self.endpoint("rag/ask"))
            .bearer_auth(token.as_str())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            return Err(classify_status(status, &error_text));
        }

        let byte_stream = response
            .bytes_stream()
            .map(|item| item.map_err(ApiError::Network));
        Ok(Box::pin(byte_stream))
    }
}

/// Map a non-2xx response onto the error taxonomy, preferring the backend's
/// own `detail` explanation when the body carries one.
fn classify_status(status: StatusCode, body: &str) -> ApiError {
    let details = extract_detail(body);
    match status.as_u16() {
        401 | 403 => ApiError::AuthenticationFailed { details },
        404 => ApiError::NotFound { details },
        400..=499 => ApiError::InvalidRequest { details },
        500..=599 => ApiError::Server {
            status_code: status.as_u16(),
            details,
        },
        _ => ApiError::Unknown {
            status_code: status.as_u16(),
            details,
        },
    }
}

fn extract_detail(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => parsed.detail,
        Err(_) if body.trim().is_empty() => "no error detail provided".to_string(),
        Err(_) => body.to_string(),
    }
}
