use anyhow::Result;

use crate::app::App;
use crate::render::terminal::{paint, Color};
use crate::OutputFormat;

pub fn run(app: &App, format: &OutputFormat, use_color: bool) -> Result<()> {
    let sessions = app.history()?.list_sessions()?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&sessions)?);
        }
        OutputFormat::Plain => {
            if sessions.is_empty() {
                println!("No conversations logged in {}", app.settings.history_dir.display());
                return Ok(());
            }

            println!("{:<20} {:>9}  {}", "Started", "Exchanges", "File");
            println!("{} {} {}", "\u{2500}".repeat(20), "\u{2500}".repeat(9), "\u{2500}".repeat(30));

            for session in &sessions {
                let started = session
                    .started_at
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "?".to_string());
                let file = session
                    .path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                println!(
                    "{:<20} {:>9}  {}",
                    started,
                    session.exchange_count,
                    paint(&file, Color::DIM, use_color)
                );
            }

            println!("\n{} sessions in {}", sessions.len(), app.settings.history_dir.display());
        }
    }

    Ok(())
}
