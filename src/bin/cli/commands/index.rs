use anyhow::Result;

use mnemo_lib::rag::CacheOutcome;

use crate::app::App;
use crate::render::terminal::{paint, Color};
use crate::OutputFormat;

pub fn run(app: &App, rebuild: bool, format: &OutputFormat, use_color: bool) -> Result<()> {
    let embedder = app.settings.build_embedder()?;
    let opened = app.open_index(&embedder, rebuild)?;
    let stats = opened.index.stats()?;

    let (rebuilt, reason) = match &opened.outcome {
        CacheOutcome::Reused => (false, None),
        CacheOutcome::Rebuilt { reason } => (true, Some(reason.to_string())),
    };

    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "path": app.settings.vector_store_path,
                "notesPath": app.settings.notes_path,
                "rebuilt": rebuilt,
                "reason": reason,
                "stats": stats,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain => {
            match reason {
                Some(reason) => println!(
                    "{}",
                    paint(&format!("Vector store rebuilt: {}", reason), Color::GREEN, use_color)
                ),
                None => println!(
                    "{}",
                    paint("Vector store is up to date", Color::GREEN, use_color)
                ),
            }
            println!("  Store:   {}", app.settings.vector_store_path.display());
            println!("  Notes:   {}", app.settings.notes_path.display());
            println!("  Chunks:  {}", stats.chunk_count);
            println!("  Sources: {}", stats.source_count);
            println!(
                "  Model:   {} ({} dimensions)",
                stats.model.as_deref().unwrap_or("-"),
                stats.dimensions
            );
        }
    }

    Ok(())
}
