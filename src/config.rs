//! Layered settings: built-in defaults, an optional TOML file, then
//! environment variables (after loading `.env`). CLI flags are applied on
//! top by the binary.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;

use crate::llm::{
    GeminiProvider, GenerationConfig, LlmError, LlmProvider, OpenAiChatProvider, GEMINI_DEFAULT_MODEL,
    OPENAI_DEFAULT_MODEL,
};
use crate::prompt::{PromptTemplate, DEFAULT_ASSISTANT_NAME};
use crate::rag::{
    EmbeddingError, OpenAiEmbeddings, Retriever, SearchMode, TextSplitter, DEFAULT_CHUNK_OVERLAP,
    DEFAULT_CHUNK_SIZE,
};

const APP_DIR: &str = "mnemo";
const LOCAL_CONFIG_FILE: &str = "mnemo.toml";

pub const DEFAULT_NOTES_GLOB: &str = "**/*.md";
pub const DEFAULT_RETRIEVAL_K: usize = 5;
pub const DEFAULT_MMR_FETCH_K: usize = 20;
pub const DEFAULT_MMR_LAMBDA: f32 = 0.5;
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Missing API key: set {0}")]
    MissingKey(&'static str),

    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Llm(#[from] LlmError),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    #[default]
    Similarity,
    Mmr,
}

impl FromStr for SearchType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "similarity" => Ok(Self::Similarity),
            "mmr" => Ok(Self::Mmr),
            other => Err(ConfigError::Invalid(format!(
                "unknown search type '{}' (expected similarity or mmr)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProviderKind {
    #[default]
    Gemini,
    #[serde(rename = "openai")]
    OpenAi,
}

impl LlmProviderKind {
    pub fn default_model(self) -> &'static str {
        match self {
            Self::Gemini => GEMINI_DEFAULT_MODEL,
            Self::OpenAi => OPENAI_DEFAULT_MODEL,
        }
    }

    fn key_var(self) -> &'static str {
        match self {
            Self::Gemini => "GEMINI_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
        }
    }
}

impl FromStr for LlmProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" | "google" => Ok(Self::Gemini),
            "openai" => Ok(Self::OpenAi),
            other => Err(ConfigError::Invalid(format!(
                "unknown LLM provider '{}' (expected gemini or openai)",
                other
            ))),
        }
    }
}

impl fmt::Display for LlmProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gemini => f.write_str("gemini"),
            Self::OpenAi => f.write_str("openai"),
        }
    }
}

#[derive(Debug)]
pub struct EmbeddingSettings {
    pub model: String,
    pub base_url: String,
    pub api_key: Option<SecretString>,
}

#[derive(Debug)]
pub struct LlmSettings {
    pub provider: LlmProviderKind,
    /// `None` means the provider's default model.
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<SecretString>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl LlmSettings {
    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or_else(|| self.provider.default_model())
    }
}

/// Fully resolved settings.
#[derive(Debug)]
pub struct Settings {
    pub notes_path: PathBuf,
    pub notes_glob: String,
    pub vector_store_path: PathBuf,
    pub history_dir: PathBuf,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub retrieval_k: usize,
    pub search_type: SearchType,
    pub mmr_fetch_k: usize,
    pub mmr_lambda: f32,
    pub embedding: EmbeddingSettings,
    pub llm: LlmSettings,
    pub assistant_name: String,
}

impl Default for Settings {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let data = dirs::data_dir()
            .map(|d| d.join(APP_DIR))
            .unwrap_or_else(|| PathBuf::from(".").join(APP_DIR));

        Self {
            notes_path: home.join("notes"),
            notes_glob: DEFAULT_NOTES_GLOB.to_string(),
            vector_store_path: data.join("vector_store.db"),
            history_dir: data.join("history"),
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            retrieval_k: DEFAULT_RETRIEVAL_K,
            search_type: SearchType::default(),
            mmr_fetch_k: DEFAULT_MMR_FETCH_K,
            mmr_lambda: DEFAULT_MMR_LAMBDA,
            embedding: EmbeddingSettings {
                model: DEFAULT_EMBEDDING_MODEL.to_string(),
                base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
                api_key: None,
            },
            llm: LlmSettings {
                provider: LlmProviderKind::default(),
                model: None,
                base_url: None,
                api_key: None,
                temperature: GenerationConfig::default().temperature,
                max_tokens: GenerationConfig::default().max_output_tokens,
            },
            assistant_name: DEFAULT_ASSISTANT_NAME.to_string(),
        }
    }
}

impl Settings {
    /// Defaults, then the config file, then `.env` and the process
    /// environment. The result is not yet validated, since CLI flags may
    /// still override it.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut settings = Self::default();

        let file_path = match config_path {
            Some(path) => Some(path.to_path_buf()),
            None => default_config_path(),
        };
        if let Some(path) = file_path {
            log::info!("Loading config from {}", path.display());
            settings.apply_file(FileConfig::read(&path)?);
        }

        if let Ok(path) = dotenvy::dotenv() {
            log::debug!("Loaded environment from {}", path.display());
        }
        settings.apply_env(|name| std::env::var(name).ok())?;

        Ok(settings)
    }

    pub fn apply_file(&mut self, file: FileConfig) {
        if let Some(path) = file.notes.path {
            self.notes_path = clean_notes_path(&path);
        }
        if let Some(glob) = file.notes.glob {
            self.notes_glob = glob;
        }
        if let Some(path) = file.index.path {
            self.vector_store_path = expand_home(&path);
        }
        if let Some(size) = file.index.chunk_size {
            self.chunk_size = size;
        }
        if let Some(overlap) = file.index.chunk_overlap {
            self.chunk_overlap = overlap;
        }
        if let Some(k) = file.retrieval.k {
            self.retrieval_k = k;
        }
        if let Some(search_type) = file.retrieval.search_type {
            self.search_type = search_type;
        }
        if let Some(fetch_k) = file.retrieval.fetch_k {
            self.mmr_fetch_k = fetch_k;
        }
        if let Some(lambda) = file.retrieval.lambda {
            self.mmr_lambda = lambda;
        }
        if let Some(model) = file.embedding.model {
            self.embedding.model = model;
        }
        if let Some(base_url) = file.embedding.base_url {
            self.embedding.base_url = base_url;
        }
        if let Some(key) = file.embedding.api_key {
            self.embedding.api_key = Some(SecretString::new(key));
        }
        if let Some(provider) = file.llm.provider {
            self.llm.provider = provider;
        }
        if let Some(model) = file.llm.model {
            self.llm.model = Some(model);
        }
        if let Some(base_url) = file.llm.base_url {
            self.llm.base_url = Some(base_url);
        }
        if let Some(key) = file.llm.api_key {
            self.llm.api_key = Some(SecretString::new(key));
        }
        if let Some(temperature) = file.llm.temperature {
            self.llm.temperature = temperature;
        }
        if let Some(max_tokens) = file.llm.max_tokens {
            self.llm.max_tokens = max_tokens;
        }
        if let Some(dir) = file.history.dir {
            self.history_dir = expand_home(&dir);
        }
        if let Some(name) = file.assistant.name {
            self.assistant_name = name;
        }
    }

    /// Apply environment overrides read through `var`. Empty values are
    /// treated as unset.
    pub fn apply_env<F>(&mut self, var: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| var(name).filter(|v| !v.trim().is_empty());

        if let Some(path) = get("NOTES_PATH") {
            self.notes_path = clean_notes_path(&path);
        }
        if let Some(glob) = get("NOTES_GLOB") {
            self.notes_glob = glob;
        }
        if let Some(path) = get("VECTOR_STORE_PATH") {
            self.vector_store_path = expand_home(&path);
        }
        if let Some(dir) = get("HISTORY_DIR") {
            self.history_dir = expand_home(&dir);
        }
        if let Some(v) = get("CHUNK_SIZE") {
            self.chunk_size = parse_var("CHUNK_SIZE", &v)?;
        }
        if let Some(v) = get("CHUNK_OVERLAP") {
            self.chunk_overlap = parse_var("CHUNK_OVERLAP", &v)?;
        }
        if let Some(v) = get("RETRIEVAL_K") {
            self.retrieval_k = parse_var("RETRIEVAL_K", &v)?;
        }
        if let Some(v) = get("SEARCH_TYPE") {
            self.search_type = v.parse()?;
        }
        if let Some(v) = get("MMR_FETCH_K") {
            self.mmr_fetch_k = parse_var("MMR_FETCH_K", &v)?;
        }
        if let Some(v) = get("MMR_LAMBDA") {
            self.mmr_lambda = parse_var("MMR_LAMBDA", &v)?;
        }
        if let Some(model) = get("EMBEDDING_MODEL") {
            self.embedding.model = model;
        }
        if let Some(base_url) = get("OPENAI_BASE_URL") {
            self.embedding.base_url = base_url;
        }
        let openai_key = get("OPENAI_API_KEY");
        if let Some(key) = &openai_key {
            self.embedding.api_key = Some(SecretString::new(key.clone()));
        }
        if let Some(v) = get("LLM_PROVIDER") {
            self.llm.provider = v.parse()?;
        }
        if let Some(model) = get("LLM_MODEL") {
            self.llm.model = Some(model);
        }
        if let Some(base_url) = get("LLM_BASE_URL") {
            self.llm.base_url = Some(base_url);
        }
        let llm_key = match self.llm.provider {
            LlmProviderKind::Gemini => get("GEMINI_API_KEY"),
            LlmProviderKind::OpenAi => openai_key,
        };
        if let Some(key) = llm_key {
            self.llm.api_key = Some(SecretString::new(key));
        }
        if let Some(v) = get("LLM_TEMPERATURE") {
            self.llm.temperature = parse_var("LLM_TEMPERATURE", &v)?;
        }
        if let Some(v) = get("LLM_MAX_TOKENS") {
            self.llm.max_tokens = parse_var("LLM_MAX_TOKENS", &v)?;
        }
        if let Some(name) = get("ASSISTANT_NAME") {
            self.assistant_name = name;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunk size must be at least 1".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::Invalid(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.retrieval_k == 0 {
            return Err(ConfigError::Invalid("retrieval k must be at least 1".to_string()));
        }
        if self.search_type == SearchType::Mmr && self.mmr_fetch_k < self.retrieval_k {
            return Err(ConfigError::Invalid(format!(
                "MMR fetch_k ({}) must be at least k ({})",
                self.mmr_fetch_k, self.retrieval_k
            )));
        }
        if !(0.0..=1.0).contains(&self.mmr_lambda) {
            return Err(ConfigError::Invalid(format!(
                "MMR lambda ({}) must be between 0 and 1",
                self.mmr_lambda
            )));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::Invalid(format!(
                "temperature ({}) must be between 0 and 2",
                self.llm.temperature
            )));
        }
        if self.notes_glob.trim().is_empty() {
            return Err(ConfigError::Invalid("notes glob must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn search_mode(&self) -> SearchMode {
        match self.search_type {
            SearchType::Similarity => SearchMode::Similarity,
            SearchType::Mmr => SearchMode::Mmr {
                fetch_k: self.mmr_fetch_k,
                lambda: self.mmr_lambda,
            },
        }
    }

    pub fn retriever(&self) -> Retriever {
        Retriever::new(self.retrieval_k, self.search_mode())
    }

    pub fn splitter(&self) -> Result<TextSplitter> {
        TextSplitter::new(self.chunk_size, self.chunk_overlap).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn prompt(&self) -> PromptTemplate {
        PromptTemplate::with_name(&self.assistant_name)
    }

    pub fn generation(&self) -> GenerationConfig {
        GenerationConfig {
            temperature: self.llm.temperature,
            max_output_tokens: self.llm.max_tokens,
        }
    }

    pub fn build_embedder(&self) -> Result<OpenAiEmbeddings> {
        let key = self
            .embedding
            .api_key
            .as_ref()
            .ok_or(ConfigError::MissingKey("OPENAI_API_KEY"))?;
        Ok(OpenAiEmbeddings::new(
            copy_secret(key),
            self.embedding.model.clone(),
            &self.embedding.base_url,
        )?)
    }

    pub fn build_llm(&self) -> Result<Box<dyn LlmProvider>> {
        let key = self
            .llm
            .api_key
            .as_ref()
            .ok_or(ConfigError::MissingKey(self.llm.provider.key_var()))?;
        let model = self.llm.model().to_string();
        let base_url = self.llm.base_url.as_deref();

        log::info!("Using {} model {}", self.llm.provider, model);

        let provider: Box<dyn LlmProvider> = match self.llm.provider {
            LlmProviderKind::Gemini => Box::new(GeminiProvider::new(copy_secret(key), model, base_url, self.generation())?),
            LlmProviderKind::OpenAi => Box::new(OpenAiChatProvider::new(
                copy_secret(key),
                model,
                base_url,
                self.generation(),
            )?),
        };
        Ok(provider)
    }
}

/// On-disk config. Every field is optional; missing ones keep their defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub notes: NotesSection,
    pub index: IndexSection,
    pub retrieval: RetrievalSection,
    pub embedding: EmbeddingSection,
    pub llm: LlmSection,
    pub history: HistorySection,
    pub assistant: AssistantSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NotesSection {
    pub path: Option<String>,
    pub glob: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IndexSection {
    pub path: Option<String>,
    pub chunk_size: Option<usize>,
    pub chunk_overlap: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrievalSection {
    pub k: Option<usize>,
    pub search_type: Option<SearchType>,
    pub fetch_k: Option<usize>,
    pub lambda: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EmbeddingSection {
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LlmSection {
    pub provider: Option<LlmProviderKind>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HistorySection {
    pub dir: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AssistantSection {
    pub name: Option<String>,
}

impl FileConfig {
    pub fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

/// `mnemo.toml` in the working directory, else the user config file.
fn default_config_path() -> Option<PathBuf> {
    let local = PathBuf::from(LOCAL_CONFIG_FILE);
    if local.is_file() {
        return Some(local);
    }
    dirs::config_dir()
        .map(|d| d.join(APP_DIR).join("config.toml"))
        .filter(|p| p.is_file())
}

/// Remove shell escapes (`My\ Notes`) and expand a leading `~`.
pub fn clean_notes_path(raw: &str) -> PathBuf {
    let unescaped: String = raw.trim().chars().filter(|c| *c != '\\').collect();
    expand_home(&unescaped)
}

fn expand_home(path: &str) -> PathBuf {
    let path = path.trim();
    if path == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from(path));
    }
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

fn parse_var<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{} has an invalid value '{}'", name, value)))
}

fn copy_secret(secret: &SecretString) -> SecretString {
    SecretString::new(secret.expose_secret().clone())
}
