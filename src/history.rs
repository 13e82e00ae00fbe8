//! Conversation history and its on-disk store.
//!
//! A [`History`] is the ordered transcript sent to the endpoint.  A [`HistoryStore`] owns the
//! file the transcript is saved to: it is the only thing that reads or writes that file.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{from_reader, to_writer_pretty};

use crate::error::{Error, Result};
use crate::estimate_tokens;
use crate::observability::{HISTORY_LOAD_FALLBACKS, HISTORY_SAVES, HISTORY_TRIMMED_TURNS};
use crate::types::Turn;

/// Instruction carried by the system turn of a fresh history.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful, concise coding assistant. \
Prefer short, correct answers with code examples when appropriate.";

/// Default approximate-token budget for the history sent with each request.
pub const DEFAULT_HISTORY_BUDGET: usize = 3000;

///////////////////////////////////////////// History ////////////////////////////////////////////

/// An ordered conversation transcript, oldest turn first.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct History {
    turns: Vec<Turn>,
}

impl History {
    /// Creates an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a history holding a single system turn.
    pub fn with_system_prompt(prompt: impl Into<String>) -> Self {
        Self {
            turns: vec![Turn::system(prompt)],
        }
    }

    /// Adds `turn` at the end of the transcript.
    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Returns a copy of this history trimmed to `budget`.  See [`trim`].
    pub fn trimmed(&self, budget: usize) -> History {
        History {
            turns: trim(&self.turns, budget),
        }
    }

    /// The turns, oldest first.
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// The leading system turn, if there is one.
    pub fn system_turn(&self) -> Option<&Turn> {
        self.turns.first().filter(|turn| turn.is_system())
    }

    /// Number of turns.
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// True if there are no turns.
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Sum of the approximate token cost of every turn.
    pub fn estimated_tokens(&self) -> usize {
        self.turns.iter().map(Turn::estimated_tokens).sum()
    }

    /// Consumes the history, returning its turns.
    pub fn into_turns(self) -> Vec<Turn> {
        self.turns
    }
}

impl From<Vec<Turn>> for History {
    fn from(turns: Vec<Turn>) -> Self {
        Self { turns }
    }
}

/// Trims `turns` so that their approximate token cost fits `budget`.
///
/// A leading system turn is always kept and charged first, even when it alone exceeds the
/// budget.  Non-system turns are then taken newest first while the running total stays within
/// the budget.  The newest non-system turn is always kept so that the conversation never loses
/// its latest message; no other turn gets that guarantee.  Kept turns stay in their original
/// order.
pub fn trim(turns: &[Turn], budget: usize) -> Vec<Turn> {
    let Some(first) = turns.first() else {
        return Vec::new();
    };
    let (system, rest) = if first.is_system() {
        (Some(first), &turns[1..])
    } else {
        (None, turns)
    };

    let mut total = system.map(Turn::estimated_tokens).unwrap_or(0);
    let mut kept: Vec<&Turn> = Vec::new();
    for turn in rest.iter().rev() {
        let cost = estimate_tokens(&turn.content);
        if total + cost > budget && !kept.is_empty() {
            break;
        }
        kept.push(turn);
        total += cost;
    }
    HISTORY_TRIMMED_TURNS.count((rest.len() - kept.len()) as u64);

    system
        .into_iter()
        .chain(kept.into_iter().rev())
        .cloned()
        .collect()
}

/////////////////////////////////////////// HistoryStore ///////////////////////////////////////////

/// Loads and saves a [`History`] at a fixed path.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
    system_prompt: String,
}

impl HistoryStore {
    /// Creates a store for `path` whose fresh histories use [`DEFAULT_SYSTEM_PROMPT`].
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_system_prompt(path, DEFAULT_SYSTEM_PROMPT)
    }

    /// Creates a store for `path` whose fresh histories use `system_prompt`.
    pub fn with_system_prompt(path: impl Into<PathBuf>, system_prompt: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            system_prompt: system_prompt.into(),
        }
    }

    /// The file this store reads and writes.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The instruction used for fresh histories.
    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// A history holding only the system turn.
    pub fn fresh(&self) -> History {
        History::with_system_prompt(self.system_prompt.clone())
    }

    /// Loads the saved history.
    ///
    /// A missing, unreadable, or malformed file yields a fresh history; this never fails.
    pub fn load(&self) -> History {
        match self.try_load() {
            Ok(history) => {
                tracing::debug!(path = %self.path.display(), turns = history.len(), "loaded history");
                history
            }
            Err(err) => {
                HISTORY_LOAD_FALLBACKS.click();
                tracing::info!(
                    path = %self.path.display(),
                    error = %err,
                    "starting with a fresh history"
                );
                self.fresh()
            }
        }
    }

    fn try_load(&self) -> Result<History> {
        let file = File::open(&self.path)
            .map_err(|err| Error::io("failed to open history file", err))?;
        let reader = BufReader::new(file);
        from_reader(reader).map_err(|err| {
            Error::serialization("failed to parse history file", Some(Box::new(err)))
        })
    }

    /// Saves `history`, replacing whatever the file held before.
    ///
    /// The history is written to a sibling temporary file which is then renamed over the
    /// target, so a reader sees either the old or the new contents and never a partial write.
    pub fn persist(&self, history: &History) -> Result<()> {
        let tmp_path = self.temporary_path();
        let result = self.write_to(&tmp_path, history).and_then(|()| {
            fs::rename(&tmp_path, &self.path)
                .map_err(|err| Error::io("failed to replace history file", err))
        });
        match result {
            Ok(()) => {
                HISTORY_SAVES.click();
                tracing::debug!(path = %self.path.display(), turns = history.len(), "saved history");
                Ok(())
            }
            Err(err) => {
                let _ = fs::remove_file(&tmp_path);
                tracing::warn!(path = %self.path.display(), error = %err, "could not save history");
                Err(err)
            }
        }
    }

    /// Replaces the saved history with a fresh one.
    pub fn reset(&self) -> Result<()> {
        self.persist(&self.fresh())
    }

    fn write_to(&self, path: &Path, history: &History) -> Result<()> {
        let file =
            File::create(path).map_err(|err| Error::io("failed to create history file", err))?;
        let mut writer = BufWriter::new(file);
        to_writer_pretty(&mut writer, history).map_err(|err| {
            Error::serialization("failed to serialize history", Some(Box::new(err)))
        })?;
        writer
            .flush()
            .map_err(|err| Error::io("failed to write history file", err))?;
        writer
            .get_ref()
            .sync_all()
            .map_err(|err| Error::io("failed to sync history file", err))
    }

    fn temporary_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(tokens: usize) -> String {
        "x".repeat(tokens * 4)
    }

    fn contents(turns: &[Turn]) -> Vec<&str> {
        turns.iter().map(|turn| turn.content.as_str()).collect()
    }

    #[test]
    fn trim_empty() {
        assert!(trim(&[], 100).is_empty());
        assert!(trim(&[], 0).is_empty());
    }

    #[test]
    fn trim_system_only_is_unchanged() {
        let turns = vec![Turn::system(text(50))];
        for budget in [0, 1, 49, 50, 1000] {
            assert_eq!(trim(&turns, budget), turns);
        }
    }

    #[test]
    fn trim_keeps_everything_within_budget() {
        let turns = vec![
            Turn::system(text(10)),
            Turn::user(text(10)),
            Turn::assistant(text(10)),
            Turn::user(text(10)),
        ];
        assert_eq!(trim(&turns, 40), turns);
    }

    #[test]
    fn trim_drops_oldest_first() {
        let turns = vec![
            Turn::system("sys"),
            Turn::user(format!("u1{}", text(10))),
            Turn::assistant(format!("a1{}", text(10))),
            Turn::user(format!("u2{}", text(10))),
            Turn::assistant(format!("a2{}", text(10))),
        ];
        // System costs 1, each other turn costs 10.
        let kept = trim(&turns, 21);
        assert_eq!(kept.len(), 3);
        assert_eq!(kept[0], turns[0]);
        assert_eq!(kept[1], turns[3]);
        assert_eq!(kept[2], turns[4]);
    }

    #[test]
    fn trim_without_system_turn_uses_recency() {
        let turns = vec![
            Turn::user(text(10)),
            Turn::assistant(text(10)),
            Turn::user(text(10)),
        ];
        let kept = trim(&turns, 20);
        assert_eq!(kept, turns[1..].to_vec());
    }

    #[test]
    fn trim_always_keeps_newest_turn() {
        let turns = vec![
            Turn::system(text(5)),
            Turn::user(text(3)),
            Turn::assistant(text(100)),
        ];
        let kept = trim(&turns, 10);
        assert_eq!(kept, vec![turns[0].clone(), turns[2].clone()]);
    }

    #[test]
    fn trim_guard_applies_to_newest_only() {
        let turns = vec![
            Turn::system("s"),
            Turn::user(text(100)),
            Turn::assistant(text(100)),
        ];
        // The newest turn is over budget and kept; the one before it is not forced in.
        let kept = trim(&turns, 10);
        assert_eq!(kept, vec![turns[0].clone(), turns[2].clone()]);
    }

    #[test]
    fn trim_keeps_system_when_budget_below_its_cost() {
        let turns = vec![
            Turn::system(text(50)),
            Turn::user(text(1)),
            Turn::assistant(text(1)),
        ];
        let kept = trim(&turns, 10);
        assert_eq!(kept, vec![turns[0].clone(), turns[2].clone()]);
    }

    #[test]
    fn trim_stops_at_first_turn_that_does_not_fit() {
        let turns = vec![
            Turn::system("s"),
            Turn::user("tiny"),
            Turn::assistant(text(30)),
            Turn::user(text(5)),
        ];
        // An older small turn that would fit is not reached past a turn that does not.
        let kept = trim(&turns, 10);
        assert_eq!(contents(&kept), contents(&[turns[0].clone(), turns[3].clone()]));
    }

    #[test]
    fn trim_respects_budget_when_newest_fits() {
        let mut turns = vec![Turn::system(text(7))];
        for i in 0..20 {
            turns.push(Turn::user(text(i % 5 + 1)));
            turns.push(Turn::assistant(text(i % 3 + 2)));
        }
        for budget in [10, 20, 33, 50, 80] {
            let kept = trim(&turns, budget);
            let total: usize = kept.iter().map(Turn::estimated_tokens).sum();
            assert_eq!(kept[0], turns[0]);
            assert!(total <= budget, "budget {budget} exceeded: {total}");
            // Kept turns are a suffix of the original, in order, without duplicates.
            let tail = &turns[turns.len() - (kept.len() - 1)..];
            assert_eq!(&kept[1..], tail);
        }
    }

    #[test]
    fn history_append_and_trimmed() {
        let mut history = History::with_system_prompt("sys");
        history.append(Turn::user("hello"));
        history.append(Turn::assistant("hi"));
        assert_eq!(history.len(), 3);
        assert_eq!(history.system_turn(), Some(&Turn::system("sys")));
        assert_eq!(history.trimmed(DEFAULT_HISTORY_BUDGET), history);
        assert_eq!(history.estimated_tokens(), 3);
    }

    #[test]
    fn history_serializes_as_array() {
        let mut history = History::new();
        history.append(Turn::user("a"));
        assert_eq!(
            serde_json::to_string(&history).unwrap(),
            r#"[{"role":"user","content":"a"}]"#
        );
    }

    #[test]
    fn load_missing_file_is_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::with_system_prompt(dir.path().join("absent.json"), "sys");
        assert_eq!(store.load(), History::with_system_prompt("sys"));
        assert!(!store.path().exists());
    }

    #[test]
    fn load_empty_array_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("h.json");
        fs::write(&path, "[]").unwrap();
        assert!(HistoryStore::new(&path).load().is_empty());
    }

    #[test]
    fn load_wrong_shape_is_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("h.json");
        fs::write(&path, r#"{"role":"user","content":"not a list"}"#).unwrap();
        let store = HistoryStore::new(&path);
        assert_eq!(store.load(), store.fresh());
    }

    #[test]
    fn persist_overwrites_and_leaves_no_temporary() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("h.json"));
        let mut history = store.fresh();
        history.append(Turn::user("one"));
        store.persist(&history).unwrap();
        history.append(Turn::assistant("two"));
        store.persist(&history).unwrap();

        assert_eq!(store.load(), history);
        assert!(!store.temporary_path().exists());
    }

    #[test]
    fn persist_to_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path().join("no/such/dir/h.json"));
        let err = store.persist(&store.fresh()).unwrap_err();
        assert!(err.is_io());
    }

    #[test]
    fn temporary_path_is_sibling() {
        let store = HistoryStore::new("/var/tmp/chat_history.json");
        assert_eq!(
            store.temporary_path(),
            PathBuf::from("/var/tmp/chat_history.json.tmp")
        );
    }
}
