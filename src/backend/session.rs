use crate::backend::models::{now_ms, SessionState, SessionStatus};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Per-profile connection lifecycle tracking.
///
/// Backend calls complete in whatever order the backend pleases, so every
/// connect/test issues an attempt token and a completion is applied only
/// while its token is still the latest one issued for that profile.
/// Superseded completions are discarded without touching the status.
pub struct SessionRegistry {
    sessions: DashMap<String, SessionStatus>,
    latest_attempt: DashMap<String, u64>,
    attempt_counter: AtomicU64,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            latest_attempt: DashMap::new(),
            attempt_counter: AtomicU64::new(1),
        }
    }

    /// Creates the disconnected status for a profile if none exists yet.
    pub fn ensure(&self, profile_id: &str) {
        self.sessions
            .entry(profile_id.to_string())
            .or_insert_with(|| SessionStatus::disconnected(profile_id));
    }

    /// Drops all session state for a removed profile.
    pub fn remove(&self, profile_id: &str) {
        self.sessions.remove(profile_id);
        self.latest_attempt.remove(profile_id);
    }

    pub fn status(&self, profile_id: &str) -> Option<SessionStatus> {
        self.sessions.get(profile_id).map(|s| s.clone())
    }

    pub fn statuses(&self) -> Vec<SessionStatus> {
        self.sessions.iter().map(|s| s.clone()).collect()
    }

    /// The backend handle of a connected session, if any.
    pub fn backend_handle(&self, profile_id: &str) -> Option<String> {
        self.sessions.get(profile_id).and_then(|status| {
            if status.state == SessionState::Connected {
                status.backend_handle.clone()
            } else {
                None
            }
        })
    }

    /// Flips the session to `connecting` and returns the attempt token the
    /// eventual completion must present.
    pub fn begin_attempt(&self, profile_id: &str) -> u64 {
        let token = self.next_token(profile_id);
        self.sessions.insert(
            profile_id.to_string(),
            SessionStatus {
                profile_id: profile_id.to_string(),
                state: SessionState::Connecting,
                last_ping_at: None,
                error: None,
                backend_handle: None,
            },
        );
        token
    }

    /// Applies a successful completion. `backend_handle` is `Some` for a
    /// real connect and `None` for a reachability test, which proves the
    /// server is there without establishing a backend session.
    /// Returns false when the attempt was superseded.
    pub fn complete_connected(
        &self,
        profile_id: &str,
        token: u64,
        backend_handle: Option<String>,
    ) -> bool {
        if !self.is_current(profile_id, token) {
            tracing::debug!("Discarding superseded connect result for '{profile_id}'");
            return false;
        }
        self.sessions.insert(
            profile_id.to_string(),
            SessionStatus {
                profile_id: profile_id.to_string(),
                state: SessionState::Connected,
                last_ping_at: Some(now_ms()),
                error: None,
                backend_handle,
            },
        );
        true
    }

    /// Applies a failed completion. Returns false when superseded.
    pub fn fail_attempt(&self, profile_id: &str, token: u64, message: String) -> bool {
        if !self.is_current(profile_id, token) {
            tracing::debug!("Discarding superseded connect failure for '{profile_id}'");
            return false;
        }
        self.sessions.insert(
            profile_id.to_string(),
            SessionStatus {
                profile_id: profile_id.to_string(),
                state: SessionState::Error,
                last_ping_at: None,
                error: Some(message),
                backend_handle: None,
            },
        );
        true
    }

    /// Drops the backend handle and returns to `disconnected`. Also
    /// invalidates any in-flight attempt for the profile.
    pub fn disconnect(&self, profile_id: &str) {
        if !self.sessions.contains_key(profile_id) {
            return;
        }
        self.next_token(profile_id);
        self.sessions.insert(
            profile_id.to_string(),
            SessionStatus::disconnected(profile_id),
        );
    }

    fn next_token(&self, profile_id: &str) -> u64 {
        let token = self.attempt_counter.fetch_add(1, Ordering::SeqCst);
        self.latest_attempt.insert(profile_id.to_string(), token);
        token
    }

    fn is_current(&self, profile_id: &str, token: u64) -> bool {
        self.latest_attempt
            .get(profile_id)
            .map(|latest| *latest == token)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_creates_a_disconnected_status_once() {
        let registry = SessionRegistry::new();
        registry.ensure("c1");
        registry.ensure("c1");
        assert_eq!(registry.statuses().len(), 1);
        let status = registry.status("c1").unwrap();
        assert_eq!(status.state, SessionState::Disconnected);
        assert!(status.backend_handle.is_none());
    }

    #[test]
    fn connect_lifecycle_stores_handle_only_while_connected() {
        let registry = SessionRegistry::new();
        registry.ensure("c1");

        let token = registry.begin_attempt("c1");
        assert_eq!(registry.status("c1").unwrap().state, SessionState::Connecting);
        assert!(registry.backend_handle("c1").is_none());

        assert!(registry.complete_connected("c1", token, Some("h-1".to_string())));
        let status = registry.status("c1").unwrap();
        assert_eq!(status.state, SessionState::Connected);
        assert!(status.last_ping_at.is_some());
        assert_eq!(registry.backend_handle("c1").as_deref(), Some("h-1"));

        registry.disconnect("c1");
        let status = registry.status("c1").unwrap();
        assert_eq!(status.state, SessionState::Disconnected);
        assert!(status.backend_handle.is_none());
    }

    #[test]
    fn superseded_completions_are_discarded() {
        let registry = SessionRegistry::new();
        registry.ensure("c1");

        let stale = registry.begin_attempt("c1");
        let fresh = registry.begin_attempt("c1");

        // The stale completion must not overwrite the newer attempt.
        assert!(!registry.complete_connected("c1", stale, Some("old".to_string())));
        assert_eq!(registry.status("c1").unwrap().state, SessionState::Connecting);

        assert!(registry.complete_connected("c1", fresh, Some("new".to_string())));
        assert_eq!(registry.backend_handle("c1").as_deref(), Some("new"));

        // A failure from the stale attempt is equally ignored.
        assert!(!registry.fail_attempt("c1", stale, "boom".to_string()));
        assert_eq!(registry.status("c1").unwrap().state, SessionState::Connected);
    }

    #[test]
    fn disconnect_invalidates_in_flight_attempts() {
        let registry = SessionRegistry::new();
        registry.ensure("c1");
        let token = registry.begin_attempt("c1");
        registry.disconnect("c1");
        assert!(!registry.complete_connected("c1", token, Some("late".to_string())));
        assert_eq!(registry.status("c1").unwrap().state, SessionState::Disconnected);
    }

    #[test]
    fn failed_attempts_record_the_message() {
        let registry = SessionRegistry::new();
        registry.ensure("c1");
        let token = registry.begin_attempt("c1");
        assert!(registry.fail_attempt("c1", token, "Connection timed out".to_string()));
        let status = registry.status("c1").unwrap();
        assert_eq!(status.state, SessionState::Error);
        assert_eq!(status.error.as_deref(), Some("Connection timed out"));
        assert!(status.backend_handle.is_none());
    }

    #[test]
    fn remove_drops_all_state() {
        let registry = SessionRegistry::new();
        registry.ensure("c1");
        registry.begin_attempt("c1");
        registry.remove("c1");
        assert!(registry.status("c1").is_none());
        assert!(registry.statuses().is_empty());
    }
}
