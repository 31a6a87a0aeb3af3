use std::path::PathBuf;

use anyhow::{Context, Result};

use mnemo_lib::assistant::Assistant;
use mnemo_lib::config::{clean_notes_path, Settings};
use mnemo_lib::history::HistoryLog;
use mnemo_lib::notes::load_and_split;
use mnemo_lib::rag::{load_or_build, CacheOutcome, Chunk, EmbeddingProvider, VectorIndex};

/// Values given on the command line, applied over file and env settings
pub struct Overrides {
    pub config: Option<PathBuf>,
    pub notes: Option<String>,
    pub glob: Option<String>,
    pub store: Option<PathBuf>,
    pub history_dir: Option<PathBuf>,
}

/// Shared application state for CLI commands
pub struct App {
    pub settings: Settings,
}

/// An opened vector store and what it took to get there
pub struct OpenedIndex {
    pub index: VectorIndex,
    pub outcome: CacheOutcome,
    pub chunk_count: usize,
}

/// The assistant plus how its index was obtained
pub struct ReadyAssistant {
    pub assistant: Assistant,
    pub outcome: CacheOutcome,
    pub chunk_count: usize,
}

impl App {
    pub fn new(overrides: &Overrides) -> Result<Self> {
        let mut settings = Settings::load(overrides.config.as_deref()).context("Failed to load configuration")?;

        if let Some(notes) = &overrides.notes {
            settings.notes_path = clean_notes_path(notes);
        }
        if let Some(glob) = &overrides.glob {
            settings.notes_glob = glob.clone();
        }
        if let Some(store) = &overrides.store {
            settings.vector_store_path = store.clone();
        }
        if let Some(dir) = &overrides.history_dir {
            settings.history_dir = dir.clone();
        }

        settings.validate()?;
        Ok(Self { settings })
    }

    /// Load and split every note in the configured folder
    pub fn load_chunks(&self) -> Result<Vec<Chunk>> {
        let splitter = self.settings.splitter()?;
        load_and_split(&self.settings.notes_path, &self.settings.notes_glob, &splitter)
            .with_context(|| format!("Failed to load notes from {}", self.settings.notes_path.display()))
    }

    /// Load the notes and reuse or rebuild the vector store for them
    pub fn open_index(&self, embedder: &dyn EmbeddingProvider, force_rebuild: bool) -> Result<OpenedIndex> {
        let chunks = self.load_chunks()?;
        let (index, outcome) = load_or_build(&self.settings.vector_store_path, &chunks, embedder, force_rebuild)
            .with_context(|| {
                format!(
                    "Failed to prepare vector store at {}",
                    self.settings.vector_store_path.display()
                )
            })?;
        Ok(OpenedIndex {
            index,
            outcome,
            chunk_count: chunks.len(),
        })
    }

    /// Build the full question-answering pipeline.
    ///
    /// The language model is set up first so a missing key fails before
    /// any embedding work is done.
    pub fn assistant(&self) -> Result<ReadyAssistant> {
        let llm = self.settings.build_llm()?;
        let embedder = self.settings.build_embedder()?;
        let OpenedIndex {
            index,
            outcome,
            chunk_count,
        } = self.open_index(&embedder, false)?;

        let assistant = Assistant::new(
            index,
            self.settings.retriever(),
            Box::new(embedder),
            llm,
            self.settings.prompt(),
        );
        Ok(ReadyAssistant {
            assistant,
            outcome,
            chunk_count,
        })
    }

    pub fn history(&self) -> Result<HistoryLog> {
        HistoryLog::new(&self.settings.history_dir).with_context(|| {
            format!(
                "Failed to open history directory {}",
                self.settings.history_dir.display()
            )
        })
    }
}
