//! Core chat session management.
//!
//! This module provides the `ChatSession` struct which owns the conversation, keeps it within
//! its token budget, and drives one streamed request per user message.

use std::path::Path;

use url::Url;

use crate::accumulating_stream::consume_stream;
use crate::chat::config::ChatConfig;
use crate::client::{ChatBackend, Ollama};
use crate::error::{Error, Result};
use crate::history::{History, HistoryStore};
use crate::render::Renderer;
use crate::types::{ChatRequest, Turn};

/// A chat session that manages conversation state and endpoint interactions.
///
/// The history is loaded from the store when the session starts and saved after every
/// completed reply.
pub struct ChatSession<B: ChatBackend = Ollama> {
    backend: B,
    config: ChatConfig,
    store: HistoryStore,
    history: History,
    completed_turns: u64,
    failed_turns: u64,
}

/// Snapshot of a chat session.
#[derive(Debug, Clone)]
pub struct SessionStats {
    /// The model used for the session.
    pub model: String,
    /// The endpoint requests go to.
    pub endpoint: Url,
    /// Where the history is saved.
    pub history_path: std::path::PathBuf,
    /// The number of turns in the conversation, system turn included.
    pub message_count: usize,
    /// Approximate token cost of the conversation.
    pub estimated_tokens: usize,
    /// The history token budget.
    pub history_budget: usize,
    /// Replies completed in this session.
    pub completed_turns: u64,
    /// Turns that failed in this session.
    pub failed_turns: u64,
}

impl ChatSession<Ollama> {
    /// Creates a new chat session talking to the configured endpoint.
    pub fn new(config: ChatConfig) -> Result<Self> {
        let backend = Ollama::with_options(config.endpoint.clone(), Some(config.timeout))?;
        Ok(Self::with_backend(backend, config))
    }
}

impl<B: ChatBackend> ChatSession<B> {
    /// Creates a new chat session with a custom backend.
    pub fn with_backend(backend: B, config: ChatConfig) -> Self {
        let store =
            HistoryStore::with_system_prompt(config.history_path.clone(), config.system_prompt.clone());
        let history = store.load();
        Self {
            backend,
            config,
            store,
            history,
            completed_turns: 0,
            failed_turns: 0,
        }
    }

    /// Sends a user message and streams the response.
    ///
    /// This method:
    /// 1. Adds the user message to history
    /// 2. Trims the history to the configured budget
    /// 3. Sends a streaming request with the trimmed history
    /// 4. Renders response fragments as they arrive
    /// 5. Adds the complete assistant reply, even an empty one, and saves the history
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, times out, or is interrupted, or if the history
    /// cannot be saved.  The user message is not rolled back on failure: it stays in memory
    /// for the rest of the session.  An assistant reply that could not be saved also stays in
    /// memory.
    pub async fn send_streaming(
        &mut self,
        user_input: &str,
        renderer: &mut dyn Renderer,
    ) -> Result<String> {
        self.history.append(Turn::user(user_input));
        self.history = self.history.trimmed(self.config.history_budget);

        let request = ChatRequest::new(self.config.model.clone(), self.history.turns().to_vec())
            .with_options(self.config.options);

        let reply = match self.stream_reply(&request, renderer).await {
            Ok(reply) => reply,
            Err(err) => {
                self.failed_turns += 1;
                return Err(err);
            }
        };
        renderer.finish_response();

        self.history.append(Turn::assistant(reply.clone()));
        self.completed_turns += 1;
        self.store.persist(&self.history)?;
        Ok(reply)
    }

    async fn stream_reply(
        &self,
        request: &ChatRequest,
        renderer: &mut dyn Renderer,
    ) -> Result<String> {
        let lines = match renderer.interrupt() {
            Some(interrupt) => {
                tokio::select! {
                    biased;
                    () = interrupt.triggered() => {
                        renderer.print_interrupted();
                        return Err(Error::abort("interrupted while connecting"));
                    }
                    lines = self.backend.stream_chat(request) => lines?,
                }
            }
            None => self.backend.stream_chat(request).await?,
        };
        renderer.start_response();
        consume_stream(lines, renderer).await
    }

    /// Clears the saved conversation back to the system turn and reloads it.
    pub fn reset(&mut self) -> Result<()> {
        self.store.reset()?;
        self.history = self.store.load();
        Ok(())
    }

    /// Returns the in-memory conversation.
    pub fn history(&self) -> &History {
        &self.history
    }

    /// Returns the number of turns in the conversation.
    pub fn message_count(&self) -> usize {
        self.history.len()
    }

    /// Returns the current model.
    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Returns the history file path.
    pub fn history_path(&self) -> &Path {
        self.store.path()
    }

    /// Returns the active configuration.
    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// Returns the current session statistics snapshot.
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            model: self.config.model.clone(),
            endpoint: self.config.endpoint.clone(),
            history_path: self.store.path().to_path_buf(),
            message_count: self.history.len(),
            estimated_tokens: self.history.estimated_tokens(),
            history_budget: self.config.history_budget,
            completed_turns: self.completed_turns,
            failed_turns: self.failed_turns,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use futures::stream;

    use super::*;
    use crate::client::LineStream;
    use crate::history::DEFAULT_SYSTEM_PROMPT;
    use crate::{Error, Role};

    /// Replays canned lines and remembers every request it saw.
    struct ScriptedBackend {
        replies: Mutex<Vec<Result<Vec<String>>>>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedBackend {
        fn new(replies: Vec<Result<Vec<&str>>>) -> Self {
            let replies = replies
                .into_iter()
                .rev()
                .map(|reply| reply.map(|lines| lines.into_iter().map(String::from).collect()))
                .collect();
            Self {
                replies: Mutex::new(replies),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl ChatBackend for ScriptedBackend {
        async fn stream_chat(&self, request: &ChatRequest) -> Result<LineStream> {
            self.requests.lock().unwrap().push(request.clone());
            let lines = self.replies.lock().unwrap().pop().expect("no scripted reply")?;
            Ok(Box::pin(stream::iter(lines.into_iter().map(Ok))))
        }
    }

    #[derive(Default)]
    struct Recorder {
        fragments: Vec<String>,
        started: usize,
        finished: usize,
        interrupt: Option<crate::Interrupt>,
    }

    impl Renderer for Recorder {
        fn start_response(&mut self) {
            self.started += 1;
        }

        fn print_text(&mut self, text: &str) {
            self.fragments.push(text.to_string());
        }

        fn print_error(&mut self, _: &str) {}

        fn print_info(&mut self, _: &str) {}

        fn finish_response(&mut self) {
            self.finished += 1;
        }

        fn interrupt(&self) -> Option<crate::Interrupt> {
            self.interrupt.clone()
        }
    }

    fn config(dir: &Path) -> ChatConfig {
        ChatConfig::new(
            "llama3",
            Url::parse("http://localhost:11434/api/chat").unwrap(),
            dir.join("history.json"),
        )
    }

    #[tokio::test]
    async fn successful_turn_is_saved() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::new(vec![Ok(vec![
            r#"{"message":{"role":"assistant","content":"4"}}"#,
            r#"{"done":true}"#,
        ])]);
        let mut session = ChatSession::with_backend(backend, config(dir.path()));
        let mut recorder = Recorder::default();

        let reply = session.send_streaming("2+2?", &mut recorder).await.unwrap();
        assert_eq!(reply, "4");
        assert_eq!(recorder.fragments, vec!["4"]);
        assert_eq!((recorder.started, recorder.finished), (1, 1));

        let saved = HistoryStore::new(dir.path().join("history.json")).load();
        assert_eq!(
            saved.turns(),
            &[
                Turn::system(DEFAULT_SYSTEM_PROMPT),
                Turn::user("2+2?"),
                Turn::assistant("4"),
            ]
        );
        assert_eq!(session.history(), &saved);
        assert_eq!(session.stats().completed_turns, 1);
    }

    #[tokio::test]
    async fn request_carries_trimmed_history_and_options() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::new(vec![
            Ok(vec![r#"{"response":"first"}"#]),
            Ok(vec![r#"{"response":"second"}"#]),
        ]);
        let config = config(dir.path())
            .with_system_prompt("sys")
            .with_history_budget(12);
        let mut session = ChatSession::with_backend(backend, config);
        let mut recorder = Recorder::default();

        session
            .send_streaming(&"a".repeat(40), &mut recorder)
            .await
            .unwrap();
        session.send_streaming("short", &mut recorder).await.unwrap();

        let requests = session.backend.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        let second = &requests[1];
        assert_eq!(second.model, "llama3");
        assert!(second.stream);
        assert_eq!(second.options, crate::GenerationOptions::default());
        // sys(1) + "short"(1) + "first"(1) fit; the 40-char user turn (10) does not.
        let roles: Vec<Role> = second.messages.iter().map(|turn| turn.role).collect();
        assert_eq!(roles, vec![Role::System, Role::Assistant, Role::User]);
        assert_eq!(second.messages[1].content, "first");
        assert_eq!(second.messages[2].content, "short");
    }

    #[tokio::test]
    async fn failed_request_keeps_user_turn_in_memory_only() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::new(vec![Err(Error::api(500, "boom"))]);
        let mut session = ChatSession::with_backend(backend, config(dir.path()));
        let mut recorder = Recorder::default();

        let err = session
            .send_streaming("hello", &mut recorder)
            .await
            .unwrap_err();
        assert!(err.is_request_failed());
        assert!(recorder.fragments.is_empty());
        assert_eq!(recorder.started, 0);
        assert_eq!(session.message_count(), 2);
        assert_eq!(session.history().turns()[1], Turn::user("hello"));
        assert!(!dir.path().join("history.json").exists());
        assert_eq!(session.stats().failed_turns, 1);
    }

    #[tokio::test]
    async fn unwritable_history_keeps_reply_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::new(vec![Ok(vec![r#"{"response":"4"}"#])]);
        let config = config(&dir.path().join("no/such/dir"));
        let mut session = ChatSession::with_backend(backend, config);
        let mut recorder = Recorder::default();

        let err = session
            .send_streaming("2+2?", &mut recorder)
            .await
            .unwrap_err();
        assert!(err.is_io(), "{err}");
        assert_eq!(recorder.fragments, vec!["4"]);
        let turns = session.history().turns();
        assert_eq!(
            &turns[turns.len() - 2..],
            &[Turn::user("2+2?"), Turn::assistant("4")]
        );
        let stats = session.stats();
        assert_eq!(stats.completed_turns, 1);
        assert_eq!(stats.failed_turns, 0);
    }

    #[tokio::test]
    async fn interrupt_before_connect_abandons_turn() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::new(Vec::new());
        let mut session = ChatSession::with_backend(backend, config(dir.path()));
        let interrupt = crate::Interrupt::new();
        interrupt.arm();
        interrupt.trigger();
        let mut recorder = Recorder {
            interrupt: Some(interrupt),
            ..Recorder::default()
        };

        let err = session.send_streaming("hi", &mut recorder).await.unwrap_err();
        assert!(err.is_abort());
        assert_eq!(recorder.started, 0);
        assert!(session.backend.requests.lock().unwrap().is_empty());
        assert!(!dir.path().join("history.json").exists());
    }

    #[tokio::test]
    async fn empty_reply_is_still_appended() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::new(vec![Ok(vec!["noise", r#"{"done":true}"#])]);
        let mut session = ChatSession::with_backend(backend, config(dir.path()));
        let mut recorder = Recorder::default();

        let reply = session.send_streaming("hi", &mut recorder).await.unwrap();
        assert_eq!(reply, "");
        let saved = HistoryStore::new(dir.path().join("history.json")).load();
        assert_eq!(saved.turns().last(), Some(&Turn::assistant("")));
    }

    #[tokio::test]
    async fn reset_restores_system_turn() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::new(vec![Ok(vec![r#"{"response":"hey"}"#])]);
        let mut session = ChatSession::with_backend(backend, config(dir.path()));
        let mut recorder = Recorder::default();
        session.send_streaming("hi", &mut recorder).await.unwrap();
        assert_eq!(session.message_count(), 3);

        session.reset().unwrap();
        assert_eq!(
            session.history().turns(),
            &[Turn::system(DEFAULT_SYSTEM_PROMPT)]
        );
        let saved = HistoryStore::new(dir.path().join("history.json")).load();
        assert_eq!(saved.turns(), &[Turn::system(DEFAULT_SYSTEM_PROMPT)]);
    }

    #[tokio::test]
    async fn resumes_saved_conversation() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("history.json"));
        let mut history = store.fresh();
        history.append(Turn::user("earlier"));
        history.append(Turn::assistant("reply"));
        store.persist(&history).unwrap();

        let backend = ScriptedBackend::new(Vec::new());
        let session = ChatSession::with_backend(backend, config(dir.path()));
        assert_eq!(session.history(), &history);
        assert_eq!(session.stats().message_count, 3);
    }
}
