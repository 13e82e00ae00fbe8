//! Interactive chat with a local Ollama-style model.
//!
//! This binary provides a streaming REPL that remembers the conversation between runs.
//!
//! # Usage
//!
//! ```bash
//! # Everything from the environment (or a .env file)
//! MODEL=llama3 OLLAMA_URL=http://localhost:11434/api/chat HISTORY_FILE=chat_history.json \
//!     ollama-chat
//!
//! # Flags take precedence over the environment
//! ollama-chat --model qwen2.5-coder --budget 1500
//!
//! # Disable colors (useful for piping output)
//! ollama-chat --no-color
//! ```
//!
//! # Commands
//!
//! - `/reset` - Clear the saved conversation
//! - `/stats` - Show session statistics
//! - `/help` - Show available commands
//! - `/exit` - Exit the application

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing_subscriber::EnvFilter;

use ollama_chat::Interrupt;
use ollama_chat::chat::{
    ChatArgs, ChatCommand, ChatConfig, ChatSession, PlainTextRenderer, Renderer, help_text,
    parse_command,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let (args, _) = ChatArgs::from_command_line_relaxed("ollama-chat [OPTIONS]");
    let config = match ChatConfig::from_env(args) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(2);
        }
    };
    let use_color = config.use_color;

    let mut session = ChatSession::new(config)?;
    let interrupt = Interrupt::new();
    let mut renderer = PlainTextRenderer::with_color(use_color).with_interrupt(interrupt.clone());
    let mut rl = DefaultEditor::new()?;

    // SIGINT abandons a reply in progress.  Anywhere else it ends the process, as it would
    // without a handler; a terminal prompt sees Ctrl+C through rustyline instead.
    let handler_interrupt = interrupt.clone();
    ctrlc::set_handler(move || {
        if !handler_interrupt.trigger() {
            println!("\nBye!");
            std::process::exit(130);
        }
    })?;

    println!(
        "Chatting with {} ({} turns loaded from {})",
        session.model(),
        session.message_count(),
        session.history_path().display()
    );
    println!("Commands: /reset to clear history, /exit to quit.\n");

    loop {
        match rl.readline("You: ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line);

                if let Some(cmd) = parse_command(line) {
                    match cmd {
                        ChatCommand::Quit => {
                            println!("Bye!");
                            break;
                        }
                        ChatCommand::Reset => match session.reset() {
                            Ok(()) => renderer.print_info("History cleared."),
                            Err(err) => {
                                renderer.print_error(&format!("Failed to clear history: {err}"))
                            }
                        },
                        ChatCommand::Help => {
                            for line in help_text().lines() {
                                println!("    {}", line);
                            }
                        }
                        ChatCommand::Stats => print_stats(&session),
                    }
                    continue;
                }

                interrupt.arm();
                let result = session.send_streaming(line, &mut renderer).await;
                interrupt.disarm();
                if let Err(err) = result {
                    if !err.is_abort() {
                        renderer.print_error(&err.to_string());
                    }
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                println!("\nBye!");
                break;
            }
            Err(err) => {
                renderer.print_error(&format!("Input error: {}", err));
                break;
            }
        }
    }

    Ok(())
}

fn print_stats(session: &ChatSession) {
    let stats = session.stats();
    println!("    Session Statistics:");
    println!("      Model: {}", stats.model);
    println!("      Endpoint: {}", stats.endpoint);
    println!("      History file: {}", stats.history_path.display());
    println!("      Messages: {}", stats.message_count);
    println!(
        "      Estimated tokens: {} (budget {})",
        stats.estimated_tokens, stats.history_budget
    );
    println!(
        "      Replies: {} completed, {} failed",
        stats.completed_turns, stats.failed_turns
    );
}
