//! Conversation state for one user session.
//!
//! `SessionState` is a plain value: the assistant takes it, appends to it and
//! hands it back. Nothing about a conversation lives in a global.

use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use uuid::Uuid;

use crate::ui::Fragment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    Function,
    System,
}

/// One entry of the model's context window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    /// Tool name, set on function messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            name: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            name: None,
        }
    }

    pub fn function(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Function,
            content: content.into(),
            name: Some(name.into()),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
            name: None,
        }
    }
}

/// A rendered item of the transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiEntry {
    pub id: String,
    pub display: Fragment,
}

impl UiEntry {
    pub fn new(display: Fragment) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            display,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    /// Identity the session acts for.
    pub username: String,
    pub messages: Vec<Message>,
    pub ui: Vec<UiEntry>,
}

impl SessionState {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Default::default()
        }
    }

    pub fn user_turns(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.role == MessageRole::User)
            .count()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read session file {}", path.display()))?;
        let state: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse session file {}", path.display()))?;
        debug!(
            "Loaded session for {} with {} messages",
            state.username,
            state.messages.len()
        );
        Ok(state)
    }

    /// Loads the session at `path`, or starts a fresh one for `username` when
    /// there is no file or it belongs to someone else.
    pub fn load_or_new(path: &Path, username: &str) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new(username));
        }
        let state = Self::load(path)?;
        if state.username != username {
            debug!("Session file belongs to {}, starting fresh", state.username);
            return Ok(Self::new(username));
        }
        Ok(state)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let raw = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, raw)
            .with_context(|| format!("Failed to write session file {}", tmp.display()))?;
        fs::rename(&tmp, path)
            .with_context(|| format!("Failed to replace session file {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_serialize_lowercase_and_names_are_optional() {
        let json = serde_json::to_string(&Message::user("hi")).unwrap();
        assert_eq!(json, r#"{"role":"user","content":"hi"}"#);

        let f = serde_json::to_value(Message::function("add_sets", "done")).unwrap();
        assert_eq!(f["role"], "function");
        assert_eq!(f["name"], "add_sets");
    }

    #[test]
    fn entries_get_unique_ids() {
        let a = UiEntry::new(Fragment::system("a"));
        let b = UiEntry::new(Fragment::system("a"));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn sessions_survive_a_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let mut state = SessionState::new("ana");
        state.messages.push(Message::user("Show me all of my workouts"));
        state.ui.push(UiEntry::new(Fragment::system("Here are all of your workouts!")));
        state.save(&path).unwrap();

        assert_eq!(SessionState::load_or_new(&path, "ana").unwrap(), state);
        let other = SessionState::load_or_new(&path, "ben").unwrap();
        assert!(other.messages.is_empty());
        assert_eq!(other.user_turns(), 0);
    }

    #[test]
    fn missing_session_files_start_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");
        let state = SessionState::load_or_new(&path, "ana").unwrap();
        assert_eq!(state.username, "ana");
        assert!(state.ui.is_empty());
    }
}
