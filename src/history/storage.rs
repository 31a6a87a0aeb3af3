use std::fmt::Write as _;
use std::cmp::Ordering;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDateTime, SecondsFormat};
use thiserror::Error;

use super::models::{Exchange, SessionSummary};

const FILE_TIME_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";
const QUESTION_MARKER: &str = "**You:**";

#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("History I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

type Result<T> = std::result::Result<T, HistoryError>;

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> HistoryError + '_ {
    move |source| HistoryError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Append-only Markdown log of a chat session.
///
/// The session file is created on the first exchange, so sessions that end
/// without a question leave nothing behind.
pub struct HistoryLog {
    dir: PathBuf,
    session_path: Option<PathBuf>,
}

impl HistoryLog {
    /// Open the history directory, creating it if needed
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(io_err(&dir))?;
        Ok(Self {
            dir,
            session_path: None,
        })
    }

    /// The current session's file, once something has been logged
    pub fn session_path(&self) -> Option<&Path> {
        self.session_path.as_deref()
    }

    pub fn append(&mut self, exchange: &Exchange) -> Result<()> {
        let path = match &self.session_path {
            Some(path) => path.clone(),
            None => {
                let path = self.create_session_file()?;
                self.session_path = Some(path.clone());
                path
            }
        };

        let mut file = OpenOptions::new().append(true).open(&path).map_err(io_err(&path))?;
        file.write_all(render_exchange(exchange).as_bytes())
            .map_err(io_err(&path))?;
        Ok(())
    }

    /// Logged sessions, newest first
    pub fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        let mut sessions = Vec::new();

        for entry in fs::read_dir(&self.dir).map_err(io_err(&self.dir))? {
            let entry = entry.map_err(io_err(&self.dir))?;
            let path = entry.path();

            if !path.is_file() || path.extension().map(|e| e != "md").unwrap_or(true) {
                continue;
            }
            match fs::read_to_string(&path) {
                Ok(content) => sessions.push(SessionSummary {
                    started_at: parse_session_time(&path),
                    exchange_count: count_exchanges(&content),
                    path,
                }),
                Err(e) => log::warn!("Skipping history file {:?}: {}", path, e),
            }
        }

        sessions.sort_by(|a, b| match (session_key(&a.path), session_key(&b.path)) {
            (Some(x), Some(y)) => y.cmp(&x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => a.path.cmp(&b.path),
        });
        Ok(sessions)
    }

    fn create_session_file(&self) -> Result<PathBuf> {
        self.create_session_file_at(Local::now())
    }

    fn create_session_file_at(&self, now: DateTime<Local>) -> Result<PathBuf> {
        let stamp = now.format(FILE_TIME_FORMAT).to_string();
        let header = format!("# Session {}\n", now.format("%Y-%m-%d %H:%M:%S"));

        // Two sessions started in the same second get a numeric suffix
        let mut path = self.dir.join(format!("{}.md", stamp));
        let mut n = 2;
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(header.as_bytes()).map_err(io_err(&path))?;
                    log::info!("Logging conversation to {}", path.display());
                    return Ok(path);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    path = self.dir.join(format!("{}_{}.md", stamp, n));
                    n += 1;
                }
                Err(e) => return Err(io_err(&path)(e)),
            }
        }
    }
}

fn render_exchange(exchange: &Exchange) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "\n## {}\n",
        exchange.timestamp.to_rfc3339_opts(SecondsFormat::Secs, false)
    );
    let _ = writeln!(out, "{} {}\n", QUESTION_MARKER, exchange.question.trim());
    let _ = writeln!(out, "**Assistant:**\n\n{}", exchange.answer.trim());
    if !exchange.sources.is_empty() {
        out.push_str("\nSources:\n");
        for source in &exchange.sources {
            let _ = writeln!(out, "- {}", source);
        }
    }
    out
}

/// Counts timestamp headings directly followed by a question line.
fn count_exchanges(content: &str) -> usize {
    let mut count = 0;
    let mut after_heading = false;
    for line in content.lines() {
        if let Some(rest) = line.strip_prefix("## ") {
            after_heading = DateTime::parse_from_rfc3339(rest.trim()).is_ok();
        } else if !line.trim().is_empty() {
            if after_heading && line.starts_with(QUESTION_MARKER) {
                count += 1;
            }
            after_heading = false;
        }
    }
    count
}

/// Session time and same-second suffix (`_2`, `_3`, ...; none counts as 1).
fn session_key(path: &Path) -> Option<(NaiveDateTime, u32)> {
    let stem = path.file_stem()?.to_str()?;
    let time = NaiveDateTime::parse_from_str(stem.get(..19)?, FILE_TIME_FORMAT).ok()?;
    let suffix = match stem.get(19..)? {
        "" => 1,
        rest => rest.strip_prefix('_')?.parse().ok()?,
    };
    Some((time, suffix))
}

fn parse_session_time(path: &Path) -> Option<NaiveDateTime> {
    session_key(path).map(|(time, _)| time)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn exchange(question: &str, answer: &str, sources: &[&str]) -> Exchange {
        Exchange::new(question, answer, sources.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_session_file_created_lazily() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("history");
        let log = HistoryLog::new(&dir).unwrap();

        assert!(dir.is_dir());
        assert!(log.session_path().is_none());
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 0);
    }

    #[test]
    fn test_append_writes_markdown() {
        let temp = TempDir::new().unwrap();
        let mut log = HistoryLog::new(temp.path()).unwrap();

        log.append(&exchange("How are the tomatoes?", "Thriving.", &["garden.md"]))
            .unwrap();
        log.append(&exchange("And running?", "Keep going.\n", &[])).unwrap();

        let path = log.session_path().unwrap().to_path_buf();
        let content = fs::read_to_string(&path).unwrap();

        assert!(content.starts_with("# Session "));
        assert!(content.contains("**You:** How are the tomatoes?\n"));
        assert!(content.contains("**Assistant:**\n\nThriving.\n"));
        assert!(content.contains("\nSources:\n- garden.md\n"));
        assert!(content.contains("**Assistant:**\n\nKeep going.\n"));
        assert_eq!(count_exchanges(&content), 2);

        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.ends_with(".md"));
        assert!(parse_session_time(&path).is_some());
    }

    #[test]
    fn test_list_sessions_newest_first() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path();
        fs::write(
            dir.join("2024-01-01_09-00-00.md"),
            "# Session\n\n## 2024-01-01T09:00:00+00:00\n\n**You:** a\n\n## 2024-01-01T09:01:00+00:00\n\n**You:** b\n",
        )
        .unwrap();
        fs::write(
            dir.join("2024-03-05_21-30-00.md"),
            "# Session\n\n## 2024-03-05T21:30:00+00:00\n\n**You:** a\n",
        )
        .unwrap();
        fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let log = HistoryLog::new(dir).unwrap();
        let sessions = log.list_sessions().unwrap();

        assert_eq!(sessions.len(), 2);
        assert!(sessions[0].path.ends_with("2024-03-05_21-30-00.md"));
        assert_eq!(sessions[0].exchange_count, 1);
        assert_eq!(sessions[1].exchange_count, 2);
        assert_eq!(
            sessions[1].started_at,
            NaiveDateTime::parse_from_str("2024-01-01 09:00:00", "%Y-%m-%d %H:%M:%S").ok()
        );
    }

    #[test]
    fn test_headings_inside_answers_are_not_counted() {
        let content = "# Session\n\n## 2024-01-01T09:00:00+01:00\n\n**You:** q\n\n**Assistant:**\n\n\
                       ## Summary\n\n**You:** said this earlier\n\nText\n";
        assert_eq!(count_exchanges(content), 1);
    }

    #[test]
    fn test_logged_sessions_count_every_exchange() {
        let temp = TempDir::new().unwrap();
        let mut log = HistoryLog::new(temp.path()).unwrap();
        log.append(&exchange("q1", "## Plan\n\n**You:** quoted", &[])).unwrap();
        log.append(&exchange("q2", "a2", &["x.md"])).unwrap();

        let sessions = log.list_sessions().unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].exchange_count, 2);
    }

    #[test]
    fn test_same_second_suffixes_sort_numerically() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path();
        for name in [
            "notes.md",
            "2024-01-01_09-00-00.md",
            "2024-01-01_09-00-00_2.md",
            "2024-01-01_09-00-00_10.md",
            "2023-12-31_23-59-59.md",
        ] {
            fs::write(dir.join(name), "# Session\n").unwrap();
        }

        let log = HistoryLog::new(dir).unwrap();
        let names: Vec<String> = log
            .list_sessions()
            .unwrap()
            .iter()
            .map(|s| s.path.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "2024-01-01_09-00-00_10.md",
                "2024-01-01_09-00-00_2.md",
                "2024-01-01_09-00-00.md",
                "2023-12-31_23-59-59.md",
                "notes.md",
            ]
        );
    }

    #[test]
    fn test_existing_session_file_is_not_overwritten() {
        let temp = TempDir::new().unwrap();
        let log = HistoryLog::new(temp.path()).unwrap();
        let now = Local::now();
        let taken = temp.path().join(format!("{}.md", now.format(FILE_TIME_FORMAT)));
        fs::write(&taken, "keep me").unwrap();

        let path = log.create_session_file_at(now).unwrap();
        assert_ne!(path, taken);
        assert!(path.file_stem().unwrap().to_str().unwrap().ends_with("_2"));
        assert_eq!(fs::read_to_string(&taken).unwrap(), "keep me");
        assert!(fs::read_to_string(&path).unwrap().starts_with("# Session "));
    }

    #[test]
    fn test_same_second_sessions_do_not_collide() {
        let temp = TempDir::new().unwrap();
        let mut first = HistoryLog::new(temp.path()).unwrap();
        let mut second = HistoryLog::new(temp.path()).unwrap();

        first.append(&exchange("q1", "a1", &[])).unwrap();
        second.append(&exchange("q2", "a2", &[])).unwrap();

        assert_ne!(first.session_path(), second.session_path());
        assert_eq!(second.list_sessions().unwrap().len(), 2);
    }
}
