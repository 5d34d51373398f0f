//! Conversation session tracker and query expander (spec §4.5).

use crate::constants::{DEFAULT_RECENT_QUERIES_CAP, QUERY_EXPANSION_MAX_MULTIPLE};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet, VecDeque};
use uuid::Uuid;

/// A single conversation boundary (§3.1).
#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: Uuid,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub recent_queries: VecDeque<String>,
    pub shown_memory_ids: HashSet<Uuid>,
    pub last_activity: DateTime<Utc>,
}

impl Session {
    fn new(description: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4(),
            description,
            created_at: now,
            recent_queries: VecDeque::new(),
            shown_memory_ids: HashSet::new(),
            last_activity: now,
        }
    }
}

/// Owns every session; no other component mutates them (§3.2).
pub struct ConversationTracker {
    sessions: RwLock<HashMap<Uuid, Session>>,
    recent_queries_cap: usize,
}

impl Default for ConversationTracker {
    fn default() -> Self {
        Self::new(DEFAULT_RECENT_QUERIES_CAP)
    }
}

impl ConversationTracker {
    #[must_use]
    pub fn new(recent_queries_cap: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            recent_queries_cap,
        }
    }

    /// Start a new session, returning its id.
    pub fn start_session(&self, description: Option<String>) -> Uuid {
        let session = Session::new(description);
        let id = session.session_id;
        self.sessions.write().insert(id, session);
        id
    }

    /// Destroy a session. Returns `false` if it did not exist.
    pub fn end_session(&self, session_id: Uuid) -> bool {
        self.sessions.write().remove(&session_id).is_some()
    }

    /// Snapshot every live session (for `list_conversation_sessions`).
    #[must_use]
    pub fn list_sessions(&self) -> Vec<Session> {
        self.sessions.read().values().cloned().collect()
    }

    /// Append `query` to the session's recent-query ring (dropping the
    /// oldest past the cap), union `result_ids` into `shown_memory_ids`, and
    /// refresh `last_activity`.
    ///
    /// Returns `false` if the session does not exist — callers must not
    /// silently create one (§9 Design Notes).
    pub fn track_query(&self, session_id: Uuid, query: &str, result_ids: &[Uuid]) -> bool {
        let mut sessions = self.sessions.write();
        let Some(session) = sessions.get_mut(&session_id) else {
            return false;
        };
        session.recent_queries.push_back(query.to_string());
        while session.recent_queries.len() > self.recent_queries_cap {
            session.recent_queries.pop_front();
        }
        session.shown_memory_ids.extend(result_ids.iter().copied());
        session.last_activity = Utc::now();
        true
    }

    /// The set of ids already shown in this session, for dedup filtering.
    #[must_use]
    pub fn shown_ids(&self, session_id: Uuid) -> Option<HashSet<Uuid>> {
        self.sessions
            .read()
            .get(&session_id)
            .map(|s| s.shown_memory_ids.clone())
    }

    /// Recent queries in insertion order, oldest first.
    #[must_use]
    pub fn recent_queries(&self, session_id: Uuid) -> Option<Vec<String>> {
        self.sessions
            .read()
            .get(&session_id)
            .map(|s| s.recent_queries.iter().cloned().collect())
    }

    /// Reap every session whose `last_activity` is older than `ttl`, for the
    /// scheduler (§9 Design Notes: sessions are bounded and explicit).
    pub fn reap_idle(&self, ttl: chrono::Duration) -> usize {
        let cutoff = Utc::now() - ttl;
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, s| s.last_activity >= cutoff);
        before - sessions.len()
    }
}

/// Augments the current query using a session's recent queries (§4.5).
pub struct QueryExpander;

impl QueryExpander {
    /// Expand `query` using `recent_queries` (oldest first) from the
    /// session. Expansion never drops the original user terms, and the
    /// final string length is bounded to `QUERY_EXPANSION_MAX_MULTIPLE`
    /// times the original.
    #[must_use]
    pub fn expand(query: &str, recent_queries: &[String]) -> String {
        if recent_queries.is_empty() {
            return query.to_string();
        }
        let max_len = query.len() * QUERY_EXPANSION_MAX_MULTIPLE;
        let mut expanded = query.to_string();
        let query_terms: HashSet<&str> = query.split_whitespace().collect();
        for prior in recent_queries.iter().rev() {
            for term in prior.split_whitespace() {
                if query_terms.contains(term) {
                    continue;
                }
                let candidate_len = expanded.len() + 1 + term.len();
                if candidate_len > max_len {
                    return expanded;
                }
                expanded.push(' ');
                expanded.push_str(term);
            }
        }
        expanded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_session_on_unknown_id_is_false() {
        let tracker = ConversationTracker::default();
        assert!(!tracker.end_session(Uuid::new_v4()));
    }

    #[test]
    fn track_query_on_unknown_session_is_false() {
        let tracker = ConversationTracker::default();
        assert!(!tracker.track_query(Uuid::new_v4(), "q", &[]));
    }

    #[test]
    fn track_query_unions_shown_ids_and_caps_recent_queries() {
        let tracker = ConversationTracker::new(2);
        let session = tracker.start_session(None);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        tracker.track_query(session, "first", &[a]);
        tracker.track_query(session, "second", &[b]);
        tracker.track_query(session, "third", &[]);
        let shown = tracker.shown_ids(session).unwrap();
        assert!(shown.contains(&a) && shown.contains(&b));
        let recent = tracker.recent_queries(session).unwrap();
        assert_eq!(recent, vec!["second".to_string(), "third".to_string()]);
    }

    #[test]
    fn expansion_preserves_original_terms_and_bounds_length() {
        let expanded = QueryExpander::expand(
            "auth",
            &["session token refresh".to_string(), "oauth login flow".to_string()],
        );
        assert!(expanded.starts_with("auth"));
        assert!(expanded.len() <= "auth".len() * QUERY_EXPANSION_MAX_MULTIPLE);
    }

    #[test]
    fn expansion_with_no_recent_queries_is_identity() {
        assert_eq!(QueryExpander::expand("auth", &[]), "auth");
    }

    #[test]
    fn reap_idle_removes_only_stale_sessions() {
        let tracker = ConversationTracker::default();
        let fresh = tracker.start_session(None);
        let reaped = tracker.reap_idle(chrono::Duration::seconds(3600));
        assert_eq!(reaped, 0);
        assert!(tracker.shown_ids(fresh).is_some());
    }
}
