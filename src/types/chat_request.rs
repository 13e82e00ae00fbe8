use serde::{Deserialize, Serialize};

use crate::types::Turn;

/// Sampling temperature sent with every request.
pub const DEFAULT_TEMPERATURE: f64 = 0.3;

/// Nucleus-sampling threshold sent with every request.
pub const DEFAULT_TOP_P: f64 = 0.9;

/// Context window size, in tokens, sent with every request.
pub const DEFAULT_NUM_CTX: u32 = 4096;

/// Fixed generation parameters attached to each chat request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GenerationOptions {
    /// Sampling temperature.
    pub temperature: f64,

    /// Nucleus-sampling threshold.
    pub top_p: f64,

    /// Context window size.
    pub num_ctx: u32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
            num_ctx: DEFAULT_NUM_CTX,
        }
    }
}

/// Body of a streaming chat-completion request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatRequest {
    /// Model identifier.
    pub model: String,

    /// The (already trimmed) conversation, oldest first.
    pub messages: Vec<Turn>,

    /// Always true; the client only speaks the streaming protocol.
    pub stream: bool,

    /// Generation parameters.
    pub options: GenerationOptions,
}

impl ChatRequest {
    /// Create a new streaming `ChatRequest` with the default generation options.
    pub fn new(model: impl Into<String>, messages: Vec<Turn>) -> Self {
        Self {
            model: model.into(),
            messages,
            stream: true,
            options: GenerationOptions::default(),
        }
    }

    /// Replace the generation options.
    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }
}
