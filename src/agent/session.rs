//! Conversation session owned by the session manager
//!
//! A session lives only as long as the process; restarting it discards the
//! history and opens a fresh agent-service thread.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::types::ChatMessage;

/// Greeting shown at the start of every session
pub const DEFAULT_INTRO: &str = "Hello! I'm your network assistant. I can run show and configuration \
commands on your routers and look up device, BGP, ARP and syslog data in LibreNMS. How can I help?";

/// One operator conversation with the agent
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSession {
    /// Agent-service thread id
    pub id: String,
    /// Run currently being driven, if any
    pub current_run: Option<String>,
    /// Operator-visible history
    pub messages: Vec<ChatMessage>,
    /// Model override for runs on this session
    pub model: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ConversationSession {
    pub fn new(thread_id: impl Into<String>, model: Option<String>) -> Self {
        Self {
            id: thread_id.into(),
            current_run: None,
            messages: Vec::new(),
            model,
            created_at: Utc::now(),
        }
    }

    pub fn add_message(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Most recent assistant reply
    pub fn last_reply(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == "assistant")
            .map(|m| m.content.as_str())
    }
}

/// Truncate to at most `max_chars` characters, adding an ellipsis if cut
pub(crate) fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_creation() {
        let session = ConversationSession::new("thread_abc", Some("gpt-4o-mini".to_string()));
        assert_eq!(session.id, "thread_abc");
        assert!(session.current_run.is_none());
        assert!(session.messages.is_empty());
        assert_eq!(session.model.as_deref(), Some("gpt-4o-mini"));
    }

    #[test]
    fn test_last_reply() {
        let mut session = ConversationSession::new("t", None);
        assert_eq!(session.last_reply(), None);
        session.add_message(ChatMessage::assistant("first"));
        session.add_message(ChatMessage::user("question"));
        session.add_message(ChatMessage::assistant("second"));
        assert_eq!(session.last_reply(), Some("second"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("this is a long string", 10), "this is...");
        assert_eq!(truncate("éééééééééééé", 5), "éé...");
    }
}
