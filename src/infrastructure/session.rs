//! In-memory conversation session store with bounded retention

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::llm::{ChatRole, Message};
use crate::domain::session::{SessionLimits, SessionMessage};

#[derive(Debug)]
struct SessionEntry {
    messages: Vec<SessionMessage>,
    last_touched: Instant,
}

/// Thread-safe per-conversation message history. Bounded by message
/// count and wall-clock age; expired sessions evict on the next write.
#[derive(Debug)]
pub struct SessionStore {
    limits: SessionLimits,
    sessions: RwLock<HashMap<String, SessionEntry>>,
}

impl SessionStore {
    pub fn new(limits: SessionLimits) -> Self {
        Self {
            limits,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn new_session_id() -> String {
        Uuid::new_v4().simple().to_string()
    }

    /// Append one turn; creates the session if needed.
    pub async fn append(&self, session_id: &str, role: ChatRole, content: impl Into<String>) {
        let mut sessions = self.sessions.write().await;
        Self::prune_expired(&mut sessions, self.limits.ttl_seconds);

        let entry = sessions.entry(session_id.to_string()).or_insert_with(|| SessionEntry {
            messages: Vec::new(),
            last_touched: Instant::now(),
        });
        entry.messages.push(SessionMessage::new(role, content));
        let cap = self.limits.max_messages;
        if entry.messages.len() > cap {
            let excess = entry.messages.len() - cap;
            entry.messages.drain(..excess);
        }
        entry.last_touched = Instant::now();
    }

    /// Most recent turns as prompt-ready messages, oldest first.
    pub async fn history(&self, session_id: &str, max_turns: usize) -> Vec<Message> {
        let sessions = self.sessions.read().await;
        let Some(entry) = sessions.get(session_id) else {
            return Vec::new();
        };
        let skip = entry.messages.len().saturating_sub(max_turns);
        entry.messages[skip..]
            .iter()
            .map(|m| Message {
                role: m.role,
                content: m.content.clone(),
            })
            .collect()
    }

    pub async fn exists(&self, session_id: &str) -> bool {
        self.sessions.read().await.contains_key(session_id)
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    fn prune_expired(sessions: &mut HashMap<String, SessionEntry>, ttl_seconds: u64) {
        let ttl = Duration::from_secs(ttl_seconds);
        sessions.retain(|_, entry| entry.last_touched.elapsed() <= ttl);
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(SessionLimits::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_append_and_history() {
        let store = SessionStore::default();
        let id = SessionStore::new_session_id();
        store.append(&id, ChatRole::User, "问题一").await;
        store.append(&id, ChatRole::Assistant, "回答一").await;

        let history = store.history(&id, 8).await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, ChatRole::User);
        assert_eq!(history[1].content, "回答一");
    }

    #[tokio::test]
    async fn test_message_cap_evicts_oldest() {
        let store = SessionStore::new(SessionLimits {
            max_messages: 4,
            ttl_seconds: 3600,
        });
        let id = "s1";
        for i in 0..6 {
            store.append(id, ChatRole::User, format!("消息{i}")).await;
        }
        let history = store.history(id, 10).await;
        assert_eq!(history.len(), 4);
        assert_eq!(history[0].content, "消息2");
    }

    #[tokio::test]
    async fn test_expired_sessions_evicted_on_write() {
        let store = SessionStore::new(SessionLimits {
            max_messages: 8,
            ttl_seconds: 0,
        });
        store.append("old", ChatRole::User, "旧会话").await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        store.append("new", ChatRole::User, "新会话").await;
        assert!(!store.exists("old").await);
        assert!(store.exists("new").await);
    }

    #[tokio::test]
    async fn test_history_limits_turns() {
        let store = SessionStore::default();
        for i in 0..10 {
            store.append("s", ChatRole::User, format!("m{i}")).await;
        }
        let history = store.history("s", 3).await;
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].content, "m7");
    }

    #[tokio::test]
    async fn test_unknown_session_empty() {
        let store = SessionStore::default();
        assert!(store.history("missing", 8).await.is_empty());
    }
}
