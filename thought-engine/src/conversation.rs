//! Conversation window types.
//!
//! A window is an ordered list of typed turns handed to a generation engine
//! in one call. It is built fresh per generation cycle and never persisted.

use serde::{Deserialize, Serialize};

/// Role of a turn in the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// Wire name used by chat-completion APIs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single turn in the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// Who produced the turn
    pub role: Role,
    /// Text of the turn
    pub content: String,
}

impl Turn {
    /// Create a user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create an assistant turn.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    /// Create a system turn.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// Ordered conversation handed to the engine.
///
/// The system preamble is kept apart from the turns so that the history
/// portion can be inspected and bounded independently.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationWindow {
    /// System preamble (persona)
    pub system_prompt: Option<String>,
    /// Exchanges, oldest first
    pub turns: Vec<Turn>,
}

impl ConversationWindow {
    /// Start a window with a system preamble.
    pub fn with_system(prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: Some(prompt.into()),
            turns: Vec::new(),
        }
    }

    /// Append one answered exchange.
    pub fn push_exchange(&mut self, prompt: impl Into<String>, response: impl Into<String>) {
        self.turns.push(Turn::user(prompt));
        self.turns.push(Turn::assistant(response));
    }

    /// Append the final, unanswered prompt.
    pub fn push_prompt(&mut self, prompt: impl Into<String>) {
        self.turns.push(Turn::user(prompt));
    }

    /// Number of assistant turns (answered exchanges).
    pub fn answered(&self) -> usize {
        self.turns
            .iter()
            .filter(|t| t.role == Role::Assistant)
            .count()
    }

    /// The trailing unanswered prompt, if the window ends with one.
    pub fn pending_prompt(&self) -> Option<&str> {
        match self.turns.last() {
            Some(turn) if turn.role == Role::User => Some(turn.content.as_str()),
            _ => None,
        }
    }

    /// Turns including the system preamble, as sent on the wire.
    pub fn messages(&self) -> Vec<Turn> {
        let mut out = Vec::with_capacity(self.turns.len() + 1);
        if let Some(system) = &self.system_prompt {
            out.push(Turn::system(system.clone()));
        }
        out.extend(self.turns.iter().cloned());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exchange_and_pending_prompt() {
        let mut window = ConversationWindow::with_system("You are a poet.");
        window.push_exchange("first", "roses");
        window.push_exchange("second", "violets");
        assert_eq!(window.answered(), 2);
        assert!(window.pending_prompt().is_none());

        window.push_prompt("third");
        assert_eq!(window.pending_prompt(), Some("third"));
        assert_eq!(window.answered(), 2);
    }

    #[test]
    fn test_messages_prepend_system() {
        let mut window = ConversationWindow::with_system("persona");
        window.push_prompt("go");

        let messages = window.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].role.as_str(), "user");
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&Turn::assistant("hi")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hi"}"#);
    }
}
