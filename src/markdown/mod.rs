//! Markdown note parsing: frontmatter metadata and plain-text extraction.

mod import;

pub use import::{parse_frontmatter, parse_note, ParsedNote};
