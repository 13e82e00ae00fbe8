// Public modules
pub mod accumulating_stream;
pub mod chat;
pub mod client;
pub mod error;
pub mod history;
pub mod interrupt;
pub mod ndjson;
pub mod render;
pub mod tokens;
pub mod types;

mod observability;

// Re-exports
pub use accumulating_stream::{Accumulator, consume_stream};
pub use client::{ChatBackend, DEFAULT_TIMEOUT, LineStream, Ollama};
pub use error::{Error, Result};
pub use history::{DEFAULT_HISTORY_BUDGET, DEFAULT_SYSTEM_PROMPT, History, HistoryStore, trim};
pub use interrupt::Interrupt;
pub use ndjson::process_ndjson;
pub use observability::register_biometrics;
pub use render::{PlainTextRenderer, Renderer};
pub use tokens::estimate_tokens;
pub use types::*;
