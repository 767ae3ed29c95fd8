pub mod client;
pub mod error;
pub mod ndjson;
pub mod types;

pub use client::{ByteStream, HttpTutorBackend, TutorBackend};
pub use error::ApiError;
pub use ndjson::{AnswerEvent, AnswerStream, decode_answer_stream};
pub use types::{AskRequest, ConversationRecord, MessageRecord, Sender};
