//! mnemo: ask questions about a folder of Markdown notes.
//!
//! Notes are split into chunks, embedded and stored in a local SQLite vector
//! index. Questions retrieve the closest chunks, which are sent together with
//! the question to a hosted language model. Every exchange is appended to a
//! Markdown history log.

pub mod assistant;
pub mod config;
pub mod history;
pub mod llm;
pub mod markdown;
pub mod notes;
pub mod prompt;
pub mod rag;
