//! Loading Markdown notes from a folder.

mod loader;

pub use loader::{load_and_split, load_notes, LoaderError};
