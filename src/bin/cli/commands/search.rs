use anyhow::Result;

use mnemo_lib::rag::{EmbeddingProvider, SearchMode};

use crate::app::App;
use crate::render::terminal::{paint, wrap_lines, Color};
use crate::OutputFormat;

const PREVIEW_CHARS: usize = 300;

pub fn run(
    app: &App,
    query: &str,
    limit: Option<usize>,
    mmr: bool,
    format: &OutputFormat,
    use_color: bool,
) -> Result<()> {
    let embedder = app.settings.build_embedder()?;
    let opened = app.open_index(&embedder, false)?;

    let mut retriever = app.settings.retriever();
    if let Some(limit) = limit {
        anyhow::ensure!(limit > 0, "--limit must be at least 1");
        retriever = retriever.with_k(limit);
    }
    if mmr {
        let fetch_k = app.settings.mmr_fetch_k.max(retriever.k());
        retriever = retriever.with_mode(SearchMode::Mmr {
            fetch_k,
            lambda: app.settings.mmr_lambda,
        });
    }

    let query_embedding = embedder.embed(query)?;
    let results = retriever.retrieve(&opened.index, &query_embedding)?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        OutputFormat::Plain => {
            if results.is_empty() {
                println!("No passages found for '{}'.", query);
                return Ok(());
            }

            for (rank, chunk) in results.iter().enumerate() {
                let header = format!(
                    "{}. {} #{}  (score {:.3})",
                    rank + 1,
                    chunk.source,
                    chunk.chunk_index,
                    chunk.score
                );
                println!("{}", paint(&header, Color::BOLD, use_color));
                for line in wrap_lines(&preview(&chunk.content), "   ", 80) {
                    println!("{}", line);
                }
                println!();
            }

            println!("{} passages", results.len());
        }
    }

    Ok(())
}

/// First `PREVIEW_CHARS` characters of a passage, on a single line
fn preview(content: &str) -> String {
    let flat = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= PREVIEW_CHARS {
        return flat;
    }
    let cut: String = flat.chars().take(PREVIEW_CHARS).collect();
    format!("{}...", cut.trim_end())
}
