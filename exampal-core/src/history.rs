//! Session chat logs.
//!
//! Each session owns a bounded [`ChatHistory`]. The [`SessionStore`] hands
//! out one mutex per session so that a whole chat turn (read window, call
//! the model, append both entries) runs without interleaving.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::ChatConfig;
use crate::types::ChatMessage;

/// Ordered, size-bounded chat log. Oldest entries are dropped first.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ChatHistory {
    entries: Vec<ChatMessage>,
    #[serde(skip)]
    limit: usize,
}

impl ChatHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: Vec::new(),
            limit,
        }
    }

    /// Append one entry, evicting the oldest beyond the limit.
    pub fn push(&mut self, message: ChatMessage) {
        self.entries.push(message);
        if self.entries.len() > self.limit {
            let excess = self.entries.len() - self.limit;
            self.entries.drain(..excess);
        }
    }

    /// Append a user entry followed by the assistant's reply.
    pub fn record_turn(&mut self, user: impl Into<String>, assistant: impl Into<String>) {
        self.push(ChatMessage::user(user));
        self.push(ChatMessage::assistant(assistant));
    }

    /// The last `n` entries in chronological order.
    pub fn recent(&self, n: usize) -> &[ChatMessage] {
        &self.entries[self.entries.len().saturating_sub(n)..]
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

struct SessionEntry {
    history: Arc<Mutex<ChatHistory>>,
    last_used: Instant,
}

/// Session id to chat log.
///
/// Bounded two ways: sessions idle longer than `idle_ttl` are dropped, and
/// creating a session beyond `max_sessions` evicts the least recently used.
pub struct SessionStore {
    sessions: Mutex<HashMap<String, SessionEntry>>,
    history_limit: usize,
    max_sessions: usize,
    idle_ttl: Duration,
}

impl SessionStore {
    pub fn new(history_limit: usize, max_sessions: usize, idle_ttl: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            history_limit,
            max_sessions: max_sessions.max(1),
            idle_ttl,
        }
    }

    pub fn from_config(config: &ChatConfig) -> Self {
        Self::new(
            config.history_limit,
            config.max_sessions,
            config.session_idle_ttl(),
        )
    }

    /// The log for `session_id`, created empty on first use.
    pub async fn history(&self, session_id: &str) -> Arc<Mutex<ChatHistory>> {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().await;
        if let Some(entry) = sessions.get_mut(session_id) {
            entry.last_used = now;
            return entry.history.clone();
        }

        self.prune(&mut sessions, now);
        debug!(session_id, "Creating chat history");
        let history = Arc::new(Mutex::new(ChatHistory::new(self.history_limit)));
        sessions.insert(
            session_id.to_string(),
            SessionEntry {
                history: history.clone(),
                last_used: now,
            },
        );
        history
    }

    /// Drop idle sessions, then evict least recently used ones until there
    /// is room for one more.
    fn prune(&self, sessions: &mut HashMap<String, SessionEntry>, now: Instant) {
        let before = sessions.len();
        sessions.retain(|_, entry| now.duration_since(entry.last_used) <= self.idle_ttl);

        while sessions.len() >= self.max_sessions {
            let oldest = sessions
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(id, _)| id.clone());
            match oldest {
                Some(id) => {
                    sessions.remove(&id);
                }
                None => break,
            }
        }

        let removed = before - sessions.len();
        if removed > 0 {
            debug!(removed, remaining = sessions.len(), "Pruned chat sessions");
        }
    }

    async fn existing(&self, session_id: &str) -> Option<Arc<Mutex<ChatHistory>>> {
        let mut sessions = self.sessions.lock().await;
        sessions.get_mut(session_id).map(|entry| {
            entry.last_used = Instant::now();
            entry.history.clone()
        })
    }

    /// Copy of the entries for `session_id`; empty for unknown sessions.
    pub async fn snapshot(&self, session_id: &str) -> Vec<ChatMessage> {
        match self.existing(session_id).await {
            Some(history) => history.lock().await.messages().to_vec(),
            None => Vec::new(),
        }
    }

    /// Clear the log for `session_id`.
    pub async fn reset(&self, session_id: &str) {
        if let Some(history) = self.existing(session_id).await {
            history.lock().await.clear();
            debug!(session_id, "Chat history reset");
        }
    }

    /// Number of known sessions.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    fn store(history_limit: usize) -> SessionStore {
        SessionStore::new(history_limit, 1000, Duration::from_secs(3600))
    }

    #[test]
    fn test_push_evicts_oldest() {
        let mut history = ChatHistory::new(3);
        for i in 0..5 {
            history.push(ChatMessage::user(format!("m{i}")));
        }
        let contents: Vec<&str> = history.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);
    }

    #[test]
    fn test_record_turn_order() {
        let mut history = ChatHistory::new(20);
        history.record_turn("What is entropy?", "Arre yaar! Disorder ka measure.");
        assert_eq!(history.len(), 2);
        assert_eq!(history.messages()[0].role, Role::User);
        assert_eq!(history.messages()[1].role, Role::Assistant);
    }

    #[test]
    fn test_eleven_turns_keep_last_twenty() {
        let mut history = ChatHistory::new(20);
        for i in 0..11 {
            history.record_turn(format!("q{i}"), format!("a{i}"));
        }
        assert_eq!(history.len(), 20);
        assert_eq!(history.messages()[0], ChatMessage::user("q1"));
        assert_eq!(history.messages()[19], ChatMessage::assistant("a10"));
    }

    #[test]
    fn test_recent_window() {
        let mut history = ChatHistory::new(20);
        for i in 0..4 {
            history.push(ChatMessage::user(format!("m{i}")));
        }
        assert_eq!(history.recent(2).len(), 2);
        assert_eq!(history.recent(2)[0].content, "m2");
        assert_eq!(history.recent(10).len(), 4);
        assert!(history.recent(0).is_empty());
    }

    #[test]
    fn test_serializes_as_list() {
        let mut history = ChatHistory::new(20);
        history.record_turn("hi", "hello");
        let json = serde_json::to_value(&history).unwrap();
        assert_eq!(
            json,
            serde_json::json!([
                {"role": "user", "content": "hi"},
                {"role": "assistant", "content": "hello"}
            ])
        );
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let store = store(20);
        store.history("alice").await.lock().await.record_turn("q", "a");
        assert_eq!(store.snapshot("alice").await.len(), 2);
        assert!(store.snapshot("bob").await.is_empty());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_same_session_shares_history() {
        let store = store(20);
        let first = store.history("s1").await;
        let second = store.history("s1").await;
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_reset_clears() {
        let store = store(20);
        store.history("s1").await.lock().await.record_turn("q", "a");
        store.reset("s1").await;
        assert!(store.snapshot("s1").await.is_empty());
        store.reset("unknown").await;
        assert!(!store.is_empty().await);
    }

    #[tokio::test]
    async fn test_concurrent_turns_are_not_lost() {
        let store = Arc::new(store(100));
        let mut handles = Vec::new();
        for i in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let history = store.history("shared").await;
                let mut guard = history.lock().await;
                let seen = guard.len();
                tokio::task::yield_now().await;
                guard.record_turn(format!("q{i}"), format!("a{seen}"));
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(store.snapshot("shared").await.len(), 20);
    }

    #[tokio::test]
    async fn test_session_count_is_capped() {
        let store = SessionStore::new(20, 50, Duration::from_secs(3600));
        for i in 0..500 {
            store.history(&format!("visitor-{i}")).await;
        }
        assert_eq!(store.len().await, 50);
        // The most recent sessions survive.
        assert!(store.sessions.lock().await.contains_key("visitor-499"));
        assert!(!store.sessions.lock().await.contains_key("visitor-0"));
    }

    #[tokio::test]
    async fn test_recently_used_session_survives_eviction() {
        let store = SessionStore::new(20, 3, Duration::from_secs(3600));
        let tick = Duration::from_millis(2);
        store.history("a").await.lock().await.record_turn("q", "a");
        tokio::time::sleep(tick).await;
        store.history("b").await;
        tokio::time::sleep(tick).await;
        store.history("c").await;
        tokio::time::sleep(tick).await;
        // Touch "a" so "b" becomes the oldest.
        store.snapshot("a").await;
        tokio::time::sleep(tick).await;
        store.history("d").await;

        let sessions = store.sessions.lock().await;
        assert!(sessions.contains_key("a"));
        assert!(!sessions.contains_key("b"));
        assert_eq!(sessions.len(), 3);
    }

    #[tokio::test]
    async fn test_idle_sessions_expire() {
        let store = SessionStore::new(20, 1000, Duration::from_millis(20));
        store.history("stale").await.lock().await.record_turn("q", "a");
        tokio::time::sleep(Duration::from_millis(60)).await;
        store.history("fresh").await;

        assert_eq!(store.len().await, 1);
        assert!(store.snapshot("stale").await.is_empty());
    }

    #[test]
    fn test_from_config_limits() {
        let store = SessionStore::from_config(&ChatConfig::default());
        assert_eq!(store.max_sessions, 1000);
        assert_eq!(store.idle_ttl, Duration::from_secs(6 * 60 * 60));
    }
}
