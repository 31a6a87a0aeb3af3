pub mod ask;
pub mod chat;
pub mod history;
pub mod index;
pub mod search;
