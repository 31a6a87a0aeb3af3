//! Markdown conversation history, one file per chat session.

mod models;
mod storage;

pub use models::{Exchange, SessionSummary};
pub use storage::{HistoryError, HistoryLog};
