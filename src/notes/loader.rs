use std::fs;
use std::path::{Component, Path, PathBuf};

use glob::MatchOptions;
use thiserror::Error;

use crate::markdown::parse_note;
use crate::rag::{Chunk, Document, MetadataValue, TextSplitter, SOURCE_KEY};

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("Notes folder not found: {0}")]
    FolderNotFound(PathBuf),

    #[error("Invalid glob pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
}

pub type Result<T> = std::result::Result<T, LoaderError>;

/// Load every note under `folder` matching `pattern` (e.g. `**/*.md`).
///
/// Notes are returned sorted by path. Hidden files and directories are
/// skipped, as are notes that cannot be read or contain no text.
pub fn load_notes(folder: &Path, pattern: &str) -> Result<Vec<Document>> {
    if !folder.is_dir() {
        return Err(LoaderError::FolderNotFound(folder.to_path_buf()));
    }

    let full_pattern = format!(
        "{}/{}",
        glob::Pattern::escape(&folder.to_string_lossy()).trim_end_matches('/'),
        pattern.trim_start_matches('/')
    );
    let options = MatchOptions {
        require_literal_leading_dot: true,
        ..MatchOptions::new()
    };

    let entries = glob::glob_with(&full_pattern, options).map_err(|source| LoaderError::Pattern {
        pattern: pattern.to_string(),
        source,
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                log::warn!("Skipping unreadable path {:?}: {}", e.path(), e.error());
                None
            }
        })
        .filter(|path| path.is_file())
        .collect();
    files.sort();
    files.dedup();

    let mut documents = Vec::with_capacity(files.len());
    for path in &files {
        match load_note(folder, path) {
            Ok(Some(doc)) => documents.push(doc),
            Ok(None) => log::debug!("Skipping empty note {:?}", path),
            Err(e) => log::warn!("Skipping note {:?}: {}", path, e),
        }
    }

    log::info!(
        "Loaded {} notes ({} files matched) from {}",
        documents.len(),
        files.len(),
        folder.display()
    );

    Ok(documents)
}

/// Load and split notes in one go.
pub fn load_and_split(folder: &Path, pattern: &str, splitter: &TextSplitter) -> Result<Vec<Chunk>> {
    let documents = load_notes(folder, pattern)?;
    let chunks = splitter.split_documents(&documents);
    log::info!("Split {} notes into {} chunks", documents.len(), chunks.len());
    Ok(chunks)
}

fn load_note(folder: &Path, path: &Path) -> std::io::Result<Option<Document>> {
    let raw = fs::read_to_string(path)?;
    let parsed = parse_note(&raw);
    if parsed.text.trim().is_empty() {
        return Ok(None);
    }

    let mut metadata = parsed.metadata;
    metadata.insert(SOURCE_KEY.to_string(), MetadataValue::Text(relative_source(folder, path)));
    if let Some(name) = path.file_name() {
        metadata.insert(
            "file_name".to_string(),
            MetadataValue::Text(name.to_string_lossy().to_string()),
        );
    }

    Ok(Some(Document::new(parsed.text, metadata)))
}

/// Path relative to the notes folder, always with `/` separators.
fn relative_source(folder: &Path, path: &Path) -> String {
    let folder = without_cur_dir(folder);
    let path = without_cur_dir(path);
    let relative = path.strip_prefix(&folder).unwrap_or(&path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Glob drops a leading `./` from matches, so both sides are compared without it
fn without_cur_dir(path: &Path) -> PathBuf {
    path.components().filter(|c| !matches!(c, Component::CurDir)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, content: &[u8]) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn notes_fixture() -> TempDir {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write(root, "b.md", b"# Bee\n\nBuzzing along.");
        write(root, "a.md", b"---\ntags: [garden]\n---\nPlanted tomatoes.");
        write(root, "journal/2024/day.md", b"Long walk today.");
        write(root, "journal/empty.md", b"   \n");
        write(root, "todo.txt", b"not markdown");
        write(root, ".trash/old.md", b"deleted note");
        write(root, "broken.md", &[0xff, 0xfe, 0x00, 0x41]);
        temp
    }

    #[test]
    fn test_loads_matching_notes_sorted() {
        let temp = notes_fixture();
        let docs = load_notes(temp.path(), "**/*.md").unwrap();

        let sources: Vec<&str> = docs.iter().map(|d| d.source()).collect();
        assert_eq!(sources, vec!["a.md", "b.md", "journal/2024/day.md"]);
    }

    #[test]
    fn test_metadata_is_attached() {
        let temp = notes_fixture();
        let docs = load_notes(temp.path(), "**/*.md").unwrap();

        let a = &docs[0];
        assert_eq!(a.content, "Planted tomatoes.");
        assert_eq!(a.metadata.get("tags"), Some(&MetadataValue::from("garden")));
        assert_eq!(a.metadata.get("file_name"), Some(&MetadataValue::from("a.md")));

        let b = &docs[1];
        assert_eq!(b.metadata.get("title"), Some(&MetadataValue::from("Bee")));
    }

    #[test]
    fn test_custom_pattern() {
        let temp = notes_fixture();
        let docs = load_notes(temp.path(), "journal/**/*.md").unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].source(), "journal/2024/day.md");

        let docs = load_notes(temp.path(), "*.txt").unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].content, "not markdown");
    }

    #[test]
    fn test_folder_with_glob_characters() {
        let temp = TempDir::new().unwrap();
        let folder = temp.path().join("notes [2024]");
        write(&folder, "x.md", b"bracketed");

        let docs = load_notes(&folder, "**/*.md").unwrap();
        assert_eq!(docs.len(), 1);
    }

    #[test]
    fn test_source_ignores_leading_cur_dir() {
        let folder = Path::new("./notes");
        assert_eq!(relative_source(folder, Path::new("notes/sub/a.md")), "sub/a.md");
        assert_eq!(relative_source(folder, Path::new("./notes/sub/a.md")), "sub/a.md");
        assert_eq!(relative_source(Path::new("notes"), Path::new("./notes/b.md")), "b.md");
        assert_eq!(relative_source(Path::new("."), Path::new("c.md")), "c.md");
    }

    #[test]
    fn test_dotted_folder_gives_relative_sources() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "notes/sub/a.md", b"Nested note.");
        let folder = temp.path().join(".").join("notes");

        let docs = load_notes(&folder, "**/*.md").unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].source(), "sub/a.md");
    }

    #[test]
    fn test_missing_folder() {
        let temp = TempDir::new().unwrap();
        let err = load_notes(&temp.path().join("nope"), "**/*.md").unwrap_err();
        assert!(matches!(err, LoaderError::FolderNotFound(_)));
    }

    #[test]
    fn test_invalid_pattern() {
        let temp = notes_fixture();
        let err = load_notes(temp.path(), "[").unwrap_err();
        assert!(matches!(err, LoaderError::Pattern { .. }));
    }

    #[test]
    fn test_load_and_split() {
        let temp = notes_fixture();
        let splitter = TextSplitter::new(10, 2).unwrap();
        let chunks = load_and_split(temp.path(), "**/*.md", &splitter).unwrap();

        assert!(chunks.len() > 3);
        assert!(chunks.iter().all(|c| c.content.chars().count() <= 10));
        assert_eq!(chunks[0].source(), "a.md");
    }
}
