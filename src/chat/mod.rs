//! Interactive chat with a local model.
//!
//! This module provides the pieces of the streaming REPL built on top of the client library:
//!
//! - [`config`]: CLI argument parsing and configuration resolution
//! - [`session`]: Conversation state, trimming, and persistence around each request
//! - [`commands`]: Slash command parsing

mod commands;
mod config;
mod session;

pub use crate::render::{PlainTextRenderer, Renderer};
pub use commands::{ChatCommand, help_text, parse_command};
pub use config::{ChatArgs, ChatConfig, ENDPOINT_ENV, HISTORY_FILE_ENV, MODEL_ENV};
pub use session::{ChatSession, SessionStats};
