use serde::{Deserialize, Serialize};

use crate::estimate_tokens;
use crate::types::Role;

/// A single message in the conversation.
///
/// Turns are never edited after they are appended to a history; they are only appended or
/// dropped wholesale when the history is trimmed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Turn {
    /// The author of the turn.
    pub role: Role,

    /// The text of the turn.  May be empty.
    pub content: String,
}

impl Turn {
    /// Create a new `Turn` with the given role and content.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a new system `Turn`.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a new user `Turn`.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create a new assistant `Turn`.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Returns true if this is a system turn.
    pub fn is_system(&self) -> bool {
        self.role == Role::System
    }

    /// Approximate token cost of the turn's content.
    pub fn estimated_tokens(&self) -> usize {
        estimate_tokens(&self.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_shape() {
        let turn = Turn::user("2+2?");
        assert_eq!(
            serde_json::to_value(&turn).unwrap(),
            json!({"role": "user", "content": "2+2?"})
        );
    }

    #[test]
    fn requires_both_fields() {
        assert!(serde_json::from_value::<Turn>(json!({"role": "user"})).is_err());
        assert!(serde_json::from_value::<Turn>(json!({"content": "hi"})).is_err());
    }

    #[test]
    fn empty_content_still_costs_one() {
        assert_eq!(Turn::assistant("").estimated_tokens(), 1);
    }
}
