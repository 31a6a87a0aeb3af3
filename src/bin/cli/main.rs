mod app;
mod commands;
mod render;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "mnemo", about = "Ask questions about your Markdown notes", version)]
struct Cli {
    /// Config file (default: ./mnemo.toml, then the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Notes folder (overrides NOTES_PATH)
    #[arg(long, global = true)]
    notes: Option<String>,

    /// Glob pattern for notes, relative to the notes folder
    #[arg(long, global = true)]
    glob: Option<String>,

    /// Vector store file (overrides VECTOR_STORE_PATH)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Directory for conversation logs (overrides HISTORY_DIR)
    #[arg(long, global = true)]
    history_dir: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, default_value = "plain")]
    format: OutputFormat,

    /// Disable ANSI colors
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Plain,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive session (default)
    Chat,

    /// Ask a single question
    Ask {
        /// The question (words are joined with spaces)
        #[arg(required = true)]
        question: Vec<String>,
    },

    /// Build or refresh the vector store
    Index {
        /// Re-embed all notes even if nothing changed
        #[arg(long)]
        rebuild: bool,
    },

    /// Show the passages retrieved for a query, without asking the model
    Search {
        /// Search query
        query: String,
        /// Number of passages
        #[arg(long)]
        limit: Option<usize>,
        /// Use maximal marginal relevance instead of plain similarity
        #[arg(long)]
        mmr: bool,
    },

    /// List logged conversation sessions
    History,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let use_color = !cli.no_color && atty_check();

    let overrides = app::Overrides {
        config: cli.config,
        notes: cli.notes,
        glob: cli.glob,
        store: cli.store,
        history_dir: cli.history_dir,
    };
    let app = app::App::new(&overrides)?;

    match cli.command.unwrap_or(Command::Chat) {
        Command::Chat => commands::chat::run(&app, use_color)?,
        Command::Ask { question } => {
            commands::ask::run(&app, &question.join(" "), &cli.format, use_color)?;
        }
        Command::Index { rebuild } => commands::index::run(&app, rebuild, &cli.format, use_color)?,
        Command::Search { query, limit, mmr } => {
            commands::search::run(&app, &query, limit, mmr, &cli.format, use_color)?;
        }
        Command::History => commands::history::run(&app, &cli.format, use_color)?,
    }

    Ok(())
}

/// Check if stdout is a terminal (for color support)
fn atty_check() -> bool {
    unsafe { libc_isatty(1) != 0 }
}

extern "C" {
    #[link_name = "isatty"]
    fn libc_isatty(fd: i32) -> i32;
}
