use thiserror::Error;

use crate::{api::ApiError, session::ChatError};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Chat(#[from] ChatError),
    #[error("Configuration error: {0}")]
    Configuration(String),
}
