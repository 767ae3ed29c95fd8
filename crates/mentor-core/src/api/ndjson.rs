//! Decoder for the backend's newline-delimited JSON answer stream.
//!
//! The ask endpoint responds with a chunked body where each line is one JSON
//! record. Chunk boundaries carry no meaning: a single read may contain
//! several records, a fraction of one, or even split a multi-byte UTF-8
//! sequence. Bytes are therefore accumulated across chunks and records are
//! only parsed once their terminating newline has arrived.

use futures_core::Stream;
use futures_util::StreamExt;
use serde::Deserialize;
use std::pin::Pin;
use tokio_util::bytes::Bytes;
use tracing::debug;

use crate::api::error::ApiError;

/// One decoded record from the answer stream, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerEvent {
    /// The backend reports which conversation this exchange belongs to.
    /// Arrives first, before any answer text, and carries the freshly
    /// created id when the question started a new conversation.
    ConversationAssigned { conversation_id: i64 },
    /// An incremental fragment of the tutor's answer.
    AnswerChunk { text: String },
    /// The backend failed mid-generation. Terminal; no further answer
    /// text follows.
    Error { message: String },
}

/// Line shapes on the wire. Exactly one key per record.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawRecord {
    Assigned { conversation_id: i64 },
    Chunk { message_chunk: String },
    Failure { error: String },
}

pub type AnswerStream = Pin<Box<dyn Stream<Item = Result<AnswerEvent, ApiError>> + Send>>;

/// Convert a raw chunked byte stream into decoded answer events.
///
/// Transport failures surface as a single `ApiError::Stream` item and end
/// the sequence. Lines that do not parse as a known record are skipped;
/// the stream itself is never poisoned by noise.
pub fn decode_answer_stream<S, E>(byte_stream: S) -> AnswerStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::error::Error + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut byte_stream = std::pin::pin!(byte_stream);
        let mut buf: Vec<u8> = Vec::new();

        while let Some(item) = byte_stream.next().await {
            match item {
                Ok(chunk) => {
                    buf.extend_from_slice(&chunk);
                    while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                        let line = buf.drain(..=pos).collect::<Vec<u8>>();
                        let line = &line[..line.len().saturating_sub(1)];
                        if let Some(event) = parse_line(line) {
                            yield Ok(event);
                        }
                    }
                }
                Err(e) => {
                    yield Err(ApiError::Stream {
                        details: e.to_string(),
                    });
                    return;
                }
            }
        }

        // The backend does not terminate its final record with a newline
        // (the in-stream error report in particular), so a non-empty
        // remainder is still one logical line.
        if let Some(event) = parse_line(&buf) {
            yield Ok(event);
        }
    };

    Box::pin(stream)
}

fn parse_line(line: &[u8]) -> Option<AnswerEvent> {
    let line = match line.split_last() {
        Some((&b'\r', rest)) => rest,
        _ => line,
    };
    if line.is_empty() {
        return None;
    }
    match serde_json::from_slice::<RawRecord>(line) {
        Ok(RawRecord::Assigned { conversation_id }) => {
            Some(AnswerEvent::ConversationAssigned { conversation_id })
        }
        Ok(RawRecord::Chunk { message_chunk }) => Some(AnswerEvent::AnswerChunk {
            text: message_chunk,
        }),
        Ok(RawRecord::Failure { error }) => Some(AnswerEvent::Error { message: error }),
        Err(e) => {
            debug!(target: "mentor::stream", "Skipping undecodable stream line: {} line: {}", e, String::from_utf8_lossy(line));
            None
        }
    }
}
