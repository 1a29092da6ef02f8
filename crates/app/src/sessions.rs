//! Session state and persisted chat history.
//!
//! A [`Session`] is the conversation currently on screen; a
//! [`Conversation`] is its saved form. History keeps the most recent
//! [`HISTORY_LIMIT`] conversations, newest first, and only changes
//! through [`ChatHistory::save`] and [`ChatHistory::delete`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::api::{ChatMessage, Role};
use std::path::PathBuf;

/// Most recent conversations kept; the oldest is evicted past this.
pub const HISTORY_LIMIT: usize = 50;

const TITLE_MAX_CHARS: usize = 30;

/// Which backend route replies to the active session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Agent {
    /// Multi-model chat through `/api/chat`.
    #[default]
    Default,
    /// Alternate persona through `/api/agent-completion`.
    Counselor,
}

/// The in-memory conversation being displayed and edited.
#[derive(Debug, Default)]
pub struct Session {
    pub messages: Vec<ChatMessage>,
    pub agent: Agent,
    /// `None` until the first successful exchange is saved.
    pub current_chat_id: Option<String>,
}

impl Session {
    /// Back to an empty default-agent session.
    pub fn reset(&mut self) {
        self.messages.clear();
        self.agent = Agent::Default;
        self.current_chat_id = None;
    }

    /// The only message mutator. Order is conversation order.
    pub fn append(&mut self, role: Role, content: impl Into<String>) {
        self.messages.push(ChatMessage::new(role, content));
    }

    /// Start a fresh session bound to `agent`.
    pub fn select_agent(&mut self, agent: Agent) {
        self.reset();
        self.agent = agent;
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// A saved conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub messages: Vec<ChatMessage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Title from the first user message, truncated on a char boundary.
fn derive_title(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.chars().take(TITLE_MAX_CHARS).collect())
        .unwrap_or_else(|| "新对话".to_string())
}

/// Saved conversations, newest first, capped at [`HISTORY_LIMIT`].
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ChatHistory {
    conversations: Vec<Conversation>,
}

impl ChatHistory {
    pub fn iter(&self) -> impl Iterator<Item = &Conversation> {
        self.conversations.iter()
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    /// Create or update the conversation backing `session`, returning its
    /// id. Empty sessions are never persisted. A session whose id no
    /// longer exists (deleted meanwhile) is left alone rather than
    /// resurrected.
    pub fn save(&mut self, session: &Session) -> Option<String> {
        if session.messages.is_empty() {
            return None;
        }

        let now = Utc::now();
        if let Some(id) = &session.current_chat_id {
            if let Some(conv) = self.conversations.iter_mut().find(|c| c.id == *id) {
                conv.messages = session.messages.clone();
                conv.title = derive_title(&session.messages);
                conv.updated_at = now;
            }
            return Some(id.clone());
        }

        let id = self.mint_id(now);
        self.conversations.insert(
            0,
            Conversation {
                id: id.clone(),
                title: derive_title(&session.messages),
                messages: session.messages.clone(),
                created_at: now,
                updated_at: now,
            },
        );
        self.conversations.truncate(HISTORY_LIMIT);
        Some(id)
    }

    /// A copy of the stored messages, or `None` for an unknown id.
    pub fn load(&self, id: &str) -> Option<Vec<ChatMessage>> {
        self.get(id).map(|c| c.messages.clone())
    }

    pub fn delete(&mut self, id: &str) {
        self.conversations.retain(|c| c.id != id);
    }

    /// Time-based id in the shape the web client minted. Nudged forward
    /// when two saves land on the same millisecond so every id names
    /// exactly one conversation.
    fn mint_id(&self, now: DateTime<Utc>) -> String {
        let mut millis = now.timestamp_millis();
        loop {
            let id = millis.to_string();
            if !self.conversations.iter().any(|c| c.id == id) {
                return id;
            }
            millis += 1;
        }
    }
}

/// Storage behind the history list. File-backed in the app; tests swap
/// in an in-memory fake.
pub trait HistoryStore {
    fn load(&self) -> ChatHistory;
    fn persist(&self, history: &ChatHistory);
}

/// JSON file under the user's config directory. Read and write failures
/// are logged and otherwise ignored; history is best-effort storage.
pub struct JsonHistoryStore {
    path: PathBuf,
}

impl JsonHistoryStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("com.local", "Multi-Cloud Chat", "MultiCloudChat")
            .map(|p| p.config_dir().join("history.json"))
            .unwrap_or_else(|| PathBuf::from("./history.json"))
    }

    fn read(&self) -> anyhow::Result<ChatHistory> {
        let contents = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}

impl HistoryStore for JsonHistoryStore {
    fn load(&self) -> ChatHistory {
        self.read().unwrap_or_default()
    }

    fn persist(&self, history: &ChatHistory) {
        if let Some(parent) = self.path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match serde_json::to_string_pretty(history) {
            Ok(json) => {
                if let Err(err) = std::fs::write(&self.path, json) {
                    tracing::warn!(%err, "failed to write chat history");
                }
            }
            Err(err) => tracing::warn!(%err, "failed to serialize chat history"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_with(text: &str) -> Session {
        let mut session = Session::default();
        session.append(Role::User, text);
        session.append(Role::Assistant, "reply");
        session
    }

    #[test]
    fn reset_clears_everything() {
        let mut session = session_with("hi");
        session.current_chat_id = Some("1".to_string());
        session.agent = Agent::Counselor;
        session.reset();
        assert!(session.is_empty());
        assert_eq!(session.agent, Agent::Default);
        assert!(session.current_chat_id.is_none());
    }

    #[test]
    fn select_agent_starts_fresh() {
        let mut session = session_with("hi");
        session.select_agent(Agent::Counselor);
        assert!(session.is_empty());
        assert_eq!(session.agent, Agent::Counselor);
    }

    #[test]
    fn empty_session_is_not_saved() {
        let mut history = ChatHistory::default();
        assert_eq!(history.save(&Session::default()), None);
        assert!(history.is_empty());
    }

    #[test]
    fn first_save_creates_one_titled_conversation() {
        let mut history = ChatHistory::default();
        let id = history.save(&session_with("Hello")).unwrap();
        assert_eq!(history.len(), 1);
        let conv = history.get(&id).unwrap();
        assert_eq!(conv.title, "Hello");
        assert_eq!(conv.messages.len(), 2);
    }

    #[test]
    fn save_with_id_updates_in_place() {
        let mut history = ChatHistory::default();
        let mut session = session_with("Hello");
        let id = history.save(&session).unwrap();
        session.current_chat_id = Some(id.clone());

        session.append(Role::User, "and another thing");
        let second = history.save(&session).unwrap();

        assert_eq!(second, id);
        assert_eq!(history.len(), 1);
        assert_eq!(history.get(&id).unwrap().messages.len(), 3);
    }

    #[test]
    fn stale_id_is_not_resurrected() {
        let mut history = ChatHistory::default();
        let mut session = session_with("Hello");
        session.current_chat_id = Some("gone".to_string());
        history.save(&session);
        assert!(history.is_empty());
    }

    #[test]
    fn overflow_evicts_the_oldest() {
        let mut history = ChatHistory::default();
        let mut first_id = None;
        for i in 0..HISTORY_LIMIT + 1 {
            let id = history.save(&session_with(&format!("message {i}"))).unwrap();
            first_id.get_or_insert(id);
        }
        assert_eq!(history.len(), HISTORY_LIMIT);
        // Newest first; the very first conversation fell off the end.
        assert!(history.get(&first_id.unwrap()).is_none());
        assert_eq!(history.iter().next().unwrap().title, "message 50");
    }

    #[test]
    fn titles_truncate_on_char_boundaries() {
        let long = "一".repeat(40);
        let mut history = ChatHistory::default();
        let id = history.save(&session_with(&long)).unwrap();
        assert_eq!(history.get(&id).unwrap().title.chars().count(), 30);
    }

    #[test]
    fn load_copies_and_delete_removes() {
        let mut history = ChatHistory::default();
        let id = history.save(&session_with("Hello")).unwrap();

        let messages = history.load(&id).unwrap();
        assert_eq!(messages.len(), 2);
        assert!(history.load("missing").is_none());

        history.delete(&id);
        assert!(history.is_empty());
        history.delete(&id); // already gone: no-op
    }

    #[test]
    fn minted_ids_stay_unique() {
        let mut history = ChatHistory::default();
        let a = history.save(&session_with("a")).unwrap();
        let b = history.save(&session_with("b")).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn file_store_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonHistoryStore::new(dir.path().join("history.json"));

        let mut history = ChatHistory::default();
        history.save(&session_with("Hello"));
        store.persist(&history);

        let loaded = store.load();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.iter().next().unwrap().title, "Hello");
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonHistoryStore::new(dir.path().join("nope.json"));
        assert!(store.load().is_empty());
    }
}
