//! Rolling chat history with token-budget eviction

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::Result;

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One role-tagged message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    /// Build a message for the given role
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Ordered message history owned by the chat backend
///
/// The system prompt sits at index 0 and is never evicted. After each turn
/// the front of the history is trimmed while the backend-reported token count
/// exceeds the configured threshold.
#[derive(Debug)]
pub struct ChatHistory {
    messages: Vec<Message>,
    system_prompt: String,
    token_threshold: u32,
    path: PathBuf,
}

impl ChatHistory {
    /// Create a fresh history seeded with the system prompt
    #[must_use]
    pub fn new(system_prompt: impl Into<String>, token_threshold: u32, path: PathBuf) -> Self {
        let system_prompt = system_prompt.into();
        Self {
            messages: vec![Message::new(Role::System, system_prompt.clone())],
            system_prompt,
            token_threshold,
            path,
        }
    }

    /// Load history from disk, re-initializing on a missing file
    #[must_use]
    pub fn load(system_prompt: impl Into<String>, token_threshold: u32, path: PathBuf) -> Self {
        let mut history = Self::new(system_prompt, token_threshold, path);
        if !history.path.exists() {
            tracing::info!("no saved chat history, starting fresh");
            return history;
        }

        match std::fs::read_to_string(&history.path)
            .map_err(crate::Error::from)
            .and_then(|s| serde_json::from_str::<Vec<Message>>(&s).map_err(crate::Error::from))
        {
            Ok(messages) if !messages.is_empty() => {
                tracing::info!(messages = messages.len(), "loaded chat history");
                history.messages = messages;
            }
            Ok(_) => {
                tracing::info!("saved chat history empty, starting fresh");
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to load chat history, starting fresh");
            }
        }
        history
    }

    /// Persist the full history to disk
    ///
    /// # Errors
    ///
    /// Returns error if serialization or the write fails
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string(&self.messages)?;
        std::fs::write(&self.path, json)?;
        tracing::info!(path = %self.path.display(), "chat history saved");
        Ok(())
    }

    /// Append a user message
    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(Message::new(Role::User, content));
    }

    /// Append an assistant message
    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(Message::new(Role::Assistant, content));
    }

    /// Trim the front of the history after a turn
    ///
    /// Removes up to two of the oldest non-system messages while the reported
    /// token total exceeds the threshold. The system message is never removed.
    pub fn trim(&mut self, total_tokens: u32) {
        for _ in 0..2 {
            if self.messages.len() <= 1 || total_tokens <= self.token_threshold {
                return;
            }
            let removed = self.messages.remove(1);
            tracing::warn!(role = ?removed.role, "evicted oldest history message");
        }
    }

    /// Current ordered message sequence
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Reset to just the system prompt
    pub fn reset(&mut self) {
        self.messages = vec![Message::new(Role::System, self.system_prompt.clone())];
    }

    /// Number of messages including the system prompt
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether only the system prompt remains
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.len() <= 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_history(threshold: u32) -> (tempfile::TempDir, ChatHistory) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("message.data");
        (dir, ChatHistory::new("you are a friend", threshold, path))
    }

    #[test]
    fn save_load_round_trip() {
        let (dir, mut history) = temp_history(1200);
        history.push_user("现在几点了");
        history.push_assistant("现在是下午三点");
        history.save().unwrap();

        let reloaded = ChatHistory::load(
            "you are a friend",
            1200,
            dir.path().join("message.data"),
        );
        assert_eq!(reloaded.messages(), history.messages());
    }

    #[test]
    fn load_missing_file_reinitializes_with_system_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let history = ChatHistory::load("prompt", 1200, dir.path().join("absent.data"));
        assert_eq!(history.len(), 1);
        assert_eq!(history.messages()[0].role, Role::System);
        assert_eq!(history.messages()[0].content, "prompt");
    }

    #[test]
    fn trim_evicts_oldest_non_system_first() {
        let (_dir, mut history) = temp_history(100);
        history.push_user("first");
        history.push_assistant("second");
        history.push_user("third");

        history.trim(500);
        // Two evicted per trim call, system message untouched
        assert_eq!(history.len(), 2);
        assert_eq!(history.messages()[0].role, Role::System);
        assert_eq!(history.messages()[1].content, "third");
    }

    #[test]
    fn trim_never_removes_system_message() {
        let (_dir, mut history) = temp_history(100);
        history.push_user("only");

        history.trim(10_000);
        history.trim(10_000);
        assert_eq!(history.len(), 1);
        assert_eq!(history.messages()[0].role, Role::System);
    }

    #[test]
    fn trim_under_threshold_is_noop() {
        let (_dir, mut history) = temp_history(1200);
        history.push_user("a");
        history.push_assistant("b");
        history.trim(800);
        assert_eq!(history.len(), 3);
    }
}
