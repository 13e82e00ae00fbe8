//! Configuration types for the chat application.
//!
//! This module provides CLI argument parsing via `arrrg` and the resolved configuration that
//! drives a chat session.  Every required value can come from a flag or, failing that, from the
//! environment.

use std::path::PathBuf;
use std::time::Duration;

use arrrg_derive::CommandLine;
use url::Url;

use crate::client::DEFAULT_TIMEOUT;
use crate::error::{Error, Result};
use crate::history::{DEFAULT_HISTORY_BUDGET, DEFAULT_SYSTEM_PROMPT};
use crate::types::GenerationOptions;

/// Environment variable naming the model.
pub const MODEL_ENV: &str = "MODEL";

/// Environment variable naming the chat endpoint URL.
pub const ENDPOINT_ENV: &str = "OLLAMA_URL";

/// Environment variable naming the history file.
pub const HISTORY_FILE_ENV: &str = "HISTORY_FILE";

/// Command-line arguments for the ollama-chat tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Model to use for chat.
    #[arrrg(optional, "Model to use (default: $MODEL)", "MODEL")]
    pub model: Option<String>,

    /// Chat endpoint URL.
    #[arrrg(optional, "Chat endpoint URL (default: $OLLAMA_URL)", "URL")]
    pub endpoint: Option<String>,

    /// History file path.
    #[arrrg(optional, "File that stores the conversation (default: $HISTORY_FILE)", "PATH")]
    pub history: Option<String>,

    /// Approximate token budget for the history sent with each request.
    #[arrrg(optional, "Approximate history token budget (default: 3000)", "TOKENS")]
    pub budget: Option<usize>,

    /// Instruction for the system turn of a fresh history.
    #[arrrg(optional, "System prompt for fresh conversations", "PROMPT")]
    pub system: Option<String>,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,
}

/// Configuration for a chat session.
///
/// This struct holds the resolved configuration values after processing command-line arguments
/// and the environment with appropriate defaults.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// The model to use for generating responses.
    pub model: String,

    /// The endpoint chat requests are posted to.
    pub endpoint: Url,

    /// Where the conversation is saved between runs.
    pub history_path: PathBuf,

    /// Approximate token budget for the history sent with each request.
    pub history_budget: usize,

    /// Instruction carried by the system turn of a fresh history.
    pub system_prompt: String,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,

    /// Overall time bound for a single request.
    pub timeout: Duration,

    /// Generation parameters sent with every request.
    pub options: GenerationOptions,
}

impl ChatConfig {
    /// Creates a new ChatConfig with default values for everything but the required settings.
    ///
    /// Defaults:
    /// - History budget: 3000 approximate tokens
    /// - System prompt: [`DEFAULT_SYSTEM_PROMPT`]
    /// - Color: enabled
    /// - Timeout: 600 seconds
    pub fn new(model: impl Into<String>, endpoint: Url, history_path: impl Into<PathBuf>) -> Self {
        Self {
            model: model.into(),
            endpoint,
            history_path: history_path.into(),
            history_budget: DEFAULT_HISTORY_BUDGET,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            use_color: true,
            timeout: DEFAULT_TIMEOUT,
            options: GenerationOptions::default(),
        }
    }

    /// Resolves configuration from arguments, falling back to the process environment.
    pub fn from_env(args: ChatArgs) -> Result<Self> {
        Self::resolve(args, |key| std::env::var(key).ok())
    }

    /// Resolves configuration from arguments, falling back to `lookup` for unset values.
    ///
    /// Missing model, endpoint, or history path, or an endpoint that is not an absolute
    /// `http`/`https` URL, is a configuration error.
    pub fn resolve<F>(args: ChatArgs, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |flag: Option<String>, key: &str, what: &str| {
            flag.or_else(|| lookup(key))
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .ok_or_else(|| {
                    Error::configuration(
                        format!("{what} is not set; pass it as a flag or set ${key}"),
                        Some(key.to_string()),
                    )
                })
        };
        let model = required(args.model, MODEL_ENV, "model")?;
        let endpoint = required(args.endpoint, ENDPOINT_ENV, "endpoint URL")?;
        let history_path = required(args.history, HISTORY_FILE_ENV, "history file")?;
        let endpoint = parse_endpoint(&endpoint)?;

        let mut config = ChatConfig::new(model, endpoint, history_path);
        if let Some(budget) = args.budget {
            config = config.with_history_budget(budget);
        }
        if let Some(system) = args.system {
            config = config.with_system_prompt(system);
        }
        if args.no_color {
            config = config.without_color();
        }
        Ok(config)
    }

    /// Sets the model to use.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the history token budget.
    pub fn with_history_budget(mut self, budget: usize) -> Self {
        self.history_budget = budget;
        self
    }

    /// Sets the system prompt for fresh histories.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

fn parse_endpoint(value: &str) -> Result<Url> {
    let invalid = |reason: String| {
        Error::configuration(
            format!("invalid endpoint URL {value:?}: {reason}"),
            Some(ENDPOINT_ENV.to_string()),
        )
    };
    let url = Url::parse(value).map_err(|err| invalid(err.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(invalid(format!("unsupported scheme {scheme:?}"))),
    }
}
