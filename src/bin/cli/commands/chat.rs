use std::io::{self, BufRead, Write};

use anyhow::Result;

use mnemo_lib::history::Exchange;
use mnemo_lib::rag::CacheOutcome;

use crate::app::App;
use crate::render::terminal::{paint, render_markdown, Color};

pub fn run(app: &App, use_color: bool) -> Result<()> {
    println!("{}", paint("Loading notes and vector store...", Color::YELLOW, use_color));
    let ready = app.assistant()?;
    let assistant = ready.assistant;
    let mut history = app.history()?;

    if let CacheOutcome::Rebuilt { reason } = &ready.outcome {
        println!("{}", paint(&format!("Vector store rebuilt ({})", reason), Color::GREEN, use_color));
    }
    println!(
        "\n{}",
        paint(
            &format!("Notes assistant ready with {} note chunks", ready.chunk_count),
            Color::GREEN,
            use_color
        )
    );
    println!(
        "{} {}",
        paint("Your notes at:", Color::BLUE, use_color),
        app.settings.notes_path.display()
    );
    let llm = assistant.llm();
    println!(
        "{} {} ({})",
        paint("Answering with:", Color::BLUE, use_color),
        llm.model(),
        llm.name()
    );
    println!(
        "\n{}",
        paint(
            &format!("Welcome! Ask {} anything about your notes.", app.settings.assistant_name),
            Color::BOLD,
            use_color
        )
    );
    println!("Type 'exit' or 'quit' to end the session.");

    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut line = String::new();

    loop {
        print!("\n[You]: ");
        io::stdout().flush()?;

        line.clear();
        if input.read_line(&mut line)? == 0 {
            // EOF (Ctrl-D)
            println!();
            break;
        }

        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if is_exit_command(question) {
            break;
        }

        if use_color {
            print!("{}", paint("Thinking...", Color::DIM, use_color));
            io::stdout().flush()?;
        } else {
            println!("Thinking...");
        }

        let result = assistant.ask(question);
        if use_color {
            // Clear the "Thinking..." line
            print!("\r\x1b[2K");
        }

        match result {
            Ok(answer) => {
                println!("\n{}", paint("[Assistant]:", Color::BOLD, use_color));
                println!("{}", render_markdown(&answer.text, use_color));

                if let Err(e) = history.append(&Exchange::from_answer(&answer)) {
                    log::warn!("Failed to write history: {}", e);
                }
            }
            Err(e) => {
                println!(
                    "\n{}",
                    paint(&format!("Error: Something went wrong - {}", e), Color::RED, use_color)
                );
                println!("Let's try again with a different question.");
            }
        }
    }

    println!("\n{}\n", paint("Thank you for the conversation. Take care!", Color::BOLD, use_color));
    if let Some(path) = history.session_path() {
        println!("Conversation saved to {}", path.display());
    }

    Ok(())
}

fn is_exit_command(input: &str) -> bool {
    input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_commands() {
        assert!(is_exit_command("exit"));
        assert!(is_exit_command("QUIT"));
        assert!(is_exit_command("Exit"));
        assert!(!is_exit_command("exit now"));
        assert!(!is_exit_command("quitting"));
    }
}
