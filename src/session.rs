//! Bounded per-conversation memory.
//!
//! Each session keeps at most `2 × max_history` turns (one user and one
//! assistant turn per remembered exchange); older turns are dropped first.
//! The store itself holds at most `max_sessions` sessions and evicts the
//! least recently accessed one when a new session would exceed that.
//!
//! Locking: the session map sits behind a short-lived `std::sync::Mutex`
//! used only to find, insert, or evict entries. Each session has its own
//! `tokio::sync::Mutex`, so appends to one session are serialized while
//! different sessions never contend.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::models::ConversationTurn;

#[derive(Debug, Default)]
struct Session {
    turns: VecDeque<ConversationTurn>,
}

struct Entry {
    session: Arc<tokio::sync::Mutex<Session>>,
    last_access: u64,
}

#[derive(Default)]
struct SessionMap {
    entries: HashMap<String, Entry>,
    tick: u64,
}

pub struct SessionStore {
    max_history: usize,
    max_sessions: usize,
    map: Mutex<SessionMap>,
}

impl SessionStore {
    pub fn new(max_history: usize, max_sessions: usize) -> Self {
        Self {
            max_history,
            max_sessions: max_sessions.max(1),
            map: Mutex::new(SessionMap::default()),
        }
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    /// Turns retained per session.
    pub fn max_turns(&self) -> usize {
        self.max_history * 2
    }

    fn lock_map(&self) -> MutexGuard<'_, SessionMap> {
        self.map.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Mint a new empty session and return its id.
    pub fn create_session(&self) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.entry(&id, true);
        id
    }

    /// Look up a session, touching its access time. Creates it when
    /// `create` is set.
    fn entry(&self, id: &str, create: bool) -> Option<Arc<tokio::sync::Mutex<Session>>> {
        let mut map = self.lock_map();
        map.tick += 1;
        let tick = map.tick;

        if let Some(entry) = map.entries.get_mut(id) {
            entry.last_access = tick;
            return Some(Arc::clone(&entry.session));
        }
        if !create {
            return None;
        }

        let session = Arc::new(tokio::sync::Mutex::new(Session::default()));
        map.entries.insert(
            id.to_string(),
            Entry {
                session: Arc::clone(&session),
                last_access: tick,
            },
        );

        while map.entries.len() > self.max_sessions {
            let oldest = map
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_access)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(key) => {
                    map.entries.remove(&key);
                    tracing::debug!(session_id = %key, "evicted least recently used session");
                }
                None => break,
            }
        }

        Some(session)
    }

    /// Prior turns, oldest first. Unknown sessions have no history.
    pub async fn get_history(&self, id: &str) -> Vec<ConversationTurn> {
        match self.entry(id, false) {
            Some(session) => session.lock().await.turns.iter().cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Record one exchange. `None` mints a new session; an unknown id is
    /// created on first use. Returns the session id.
    pub async fn append(
        &self,
        id: Option<&str>,
        user: impl Into<String>,
        assistant: impl Into<String>,
    ) -> String {
        let id = match id {
            Some(id) => id.to_string(),
            None => uuid::Uuid::new_v4().to_string(),
        };
        if let Some(session) = self.entry(&id, true) {
            let mut session = session.lock().await;
            self.push_locked(&mut session, ConversationTurn::user(user));
            self.push_locked(&mut session, ConversationTurn::assistant(assistant));
        }
        id
    }

    /// Append a single turn, trimming to the bound.
    pub async fn push_turn(&self, id: &str, turn: ConversationTurn) {
        if let Some(session) = self.entry(id, true) {
            let mut session = session.lock().await;
            self.push_locked(&mut session, turn);
        }
    }

    fn push_locked(&self, session: &mut Session, turn: ConversationTurn) {
        session.turns.push_back(turn);
        while session.turns.len() > self.max_turns() {
            session.turns.pop_front();
        }
    }

    /// Drop a session's turns. Returns whether the session existed.
    pub async fn clear(&self, id: &str) -> bool {
        match self.entry(id, false) {
            Some(session) => {
                session.lock().await.turns.clear();
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock_map().entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.lock_map().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    #[tokio::test]
    async fn test_append_without_id_mints_session() {
        let store = SessionStore::new(2, 10);
        let id = store.append(None, "q1", "a1").await;
        assert!(uuid::Uuid::parse_str(&id).is_ok());
        let history = store.get_history(&id).await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0], ConversationTurn::user("q1"));
        assert_eq!(history[1], ConversationTurn::assistant("a1"));
    }

    #[tokio::test]
    async fn test_history_bounded_oldest_dropped() {
        let store = SessionStore::new(2, 10);
        let id = store.create_session();
        for i in 0..5 {
            store
                .append(Some(&id), format!("q{}", i), format!("a{}", i))
                .await;
        }
        let history = store.get_history(&id).await;
        let contents: Vec<&str> = history.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["q3", "a3", "q4", "a4"]);
    }

    #[tokio::test]
    async fn test_odd_push_keeps_most_recent() {
        let store = SessionStore::new(2, 10);
        let id = store.create_session();
        for i in 0..5 {
            store
                .push_turn(&id, ConversationTurn::user(format!("t{}", i)))
                .await;
        }
        let history = store.get_history(&id).await;
        assert_eq!(history.len(), 4);
        assert_eq!(history[0].content, "t1");
        assert_eq!(history[3].content, "t4");
    }

    #[tokio::test]
    async fn test_zero_history_keeps_nothing() {
        let store = SessionStore::new(0, 10);
        let id = store.append(None, "q", "a").await;
        assert!(store.get_history(&id).await.is_empty());
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let store = SessionStore::new(2, 10);
        let a = store.append(None, "qa", "aa").await;
        let b = store.append(None, "qb", "ab").await;
        assert_ne!(a, b);
        assert_eq!(store.get_history(&a).await[0].content, "qa");
        assert_eq!(store.get_history(&b).await[0].content, "qb");
    }

    #[tokio::test]
    async fn test_lru_eviction() {
        let store = SessionStore::new(2, 2);
        let a = store.append(None, "qa", "aa").await;
        let b = store.append(None, "qb", "ab").await;
        // Touch `a` so `b` becomes least recently used.
        store.get_history(&a).await;
        let c = store.append(None, "qc", "ac").await;

        assert_eq!(store.len(), 2);
        assert!(store.contains(&a));
        assert!(!store.contains(&b));
        assert!(store.contains(&c));
    }

    #[tokio::test]
    async fn test_unknown_session_has_empty_history_and_is_created_on_append() {
        let store = SessionStore::new(2, 10);
        assert!(store.get_history("custom-id").await.is_empty());
        assert!(!store.contains("custom-id"));
        let id = store.append(Some("custom-id"), "q", "a").await;
        assert_eq!(id, "custom-id");
        assert_eq!(store.get_history("custom-id").await[0].role, Role::User);
    }

    #[tokio::test]
    async fn test_clear() {
        let store = SessionStore::new(2, 10);
        let id = store.append(None, "q", "a").await;
        assert!(store.clear(&id).await);
        assert!(store.get_history(&id).await.is_empty());
        assert!(!store.clear("missing").await);
    }

    #[tokio::test]
    async fn test_concurrent_appends_same_session() {
        let store = Arc::new(SessionStore::new(100, 10));
        let id = store.create_session();
        let mut handles = Vec::new();
        for i in 0..20 {
            let store = Arc::clone(&store);
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                store
                    .append(Some(&id), format!("q{}", i), format!("a{}", i))
                    .await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let history = store.get_history(&id).await;
        assert_eq!(history.len(), 40);
        for pair in history.chunks(2) {
            assert_eq!(pair[0].role, Role::User);
            assert_eq!(pair[1].role, Role::Assistant);
            assert_eq!(pair[0].content[1..], pair[1].content[1..]);
        }
    }
}
