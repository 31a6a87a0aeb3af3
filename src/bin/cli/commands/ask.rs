use anyhow::Result;

use mnemo_lib::history::Exchange;

use crate::app::App;
use crate::render::terminal::{paint, render_markdown, Color};
use crate::OutputFormat;

pub fn run(app: &App, question: &str, format: &OutputFormat, use_color: bool) -> Result<()> {
    let question = question.trim();
    if question.is_empty() {
        anyhow::bail!("Question is empty");
    }

    let ready = app.assistant()?;
    let answer = ready.assistant.ask(question)?;

    let mut history = app.history()?;
    if let Err(e) = history.append(&Exchange::from_answer(&answer)) {
        log::warn!("Failed to write history: {}", e);
    }

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&answer)?);
        }
        OutputFormat::Plain => {
            println!("{}", render_markdown(&answer.text, use_color));

            let sources = answer.source_paths();
            if !sources.is_empty() {
                println!("\n{}", paint("Sources:", Color::DIM, use_color));
                for source in sources {
                    println!("{}", paint(&format!("  - {}", source), Color::DIM, use_color));
                }
            }
        }
    }

    Ok(())
}
