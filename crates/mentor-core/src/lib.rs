// Client-side core for the Mentor tutoring chat: backend API surface,
// streaming answer decoder, and the session state machine.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod session;

pub use error::{Error, Result};
