use crate::backend::client::InfluxClient;
use crate::backend::error::{ConnectionErrorKind, WorkspaceError};
use crate::backend::models::{now_ms, QueryHistoryEntry, QueryResult};
use crate::backend::session::SessionRegistry;
use crate::backend::storage::Storage;
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Instant;

const HISTORY_LIMIT: usize = 100;

static ID_COUNTER: AtomicU64 = AtomicU64::new(1);

fn generate_id() -> String {
    let counter = ID_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("qh-{}-{}", now_ms(), counter)
}

/// Capped, deduplicated record of successfully dispatched queries,
/// most-recent-first, persisted after every mutation.
pub struct HistoryCache {
    entries: RwLock<Vec<QueryHistoryEntry>>,
    storage: Storage,
}

impl HistoryCache {
    pub fn load(storage: Storage) -> Self {
        let entries = storage.load_history();
        Self {
            entries: RwLock::new(entries),
            storage,
        }
    }

    /// Records one successful dispatch. A re-run of the same (query,
    /// database) pair replaces the existing entry in place; new pairs go
    /// to the front and the oldest entries beyond the cap fall off.
    pub fn record(
        &self,
        query: &str,
        database: &str,
        profile_id: &str,
        elapsed_ms: u64,
        result_row_count: usize,
    ) -> Result<QueryHistoryEntry, WorkspaceError> {
        let entry = QueryHistoryEntry {
            id: generate_id(),
            query_text: query.to_string(),
            database: database.to_string(),
            submitted_at: Utc::now(),
            elapsed_ms,
            result_row_count,
            profile_id: profile_id.to_string(),
        };
        {
            let mut entries = self.entries.write().expect("history poisoned");
            match entries
                .iter_mut()
                .find(|e| e.query_text == entry.query_text && e.database == entry.database)
            {
                Some(existing) => *existing = entry.clone(),
                None => entries.insert(0, entry.clone()),
            }
            entries.truncate(HISTORY_LIMIT);
        }
        self.persist()?;
        Ok(entry)
    }

    pub fn list(&self) -> Vec<QueryHistoryEntry> {
        self.entries.read().expect("history poisoned").clone()
    }

    pub fn recent(&self, count: usize) -> Vec<QueryHistoryEntry> {
        let entries = self.entries.read().expect("history poisoned");
        entries.iter().take(count).cloned().collect()
    }

    pub fn remove(&self, id: &str) -> Result<bool, WorkspaceError> {
        let removed = {
            let mut entries = self.entries.write().expect("history poisoned");
            let before = entries.len();
            entries.retain(|e| e.id != id);
            entries.len() != before
        };
        if removed {
            self.persist()?;
        }
        Ok(removed)
    }

    pub fn clear(&self) -> Result<(), WorkspaceError> {
        self.entries.write().expect("history poisoned").clear();
        self.persist()
    }

    fn persist(&self) -> Result<(), WorkspaceError> {
        let entries = self.entries.read().expect("history poisoned");
        self.storage.save_history(&entries)
    }
}

/// Dispatches a validated statement against a connected profile's backend
/// session.
///
/// Pre-flight failures (empty arguments, no connected session) come back
/// as `Err` without a backend call; failures of the dispatched query
/// itself come back as an `Ok` result carrying `error`, and are not
/// recorded in history.
pub async fn execute(
    client: &dyn InfluxClient,
    sessions: &SessionRegistry,
    history: &HistoryCache,
    query: &str,
    database: &str,
    profile_id: &str,
) -> Result<QueryResult, WorkspaceError> {
    if query.trim().is_empty() {
        return Err(WorkspaceError::Validation("Query cannot be empty".into()));
    }
    if database.trim().is_empty() {
        return Err(WorkspaceError::Validation("Database cannot be empty".into()));
    }
    if profile_id.trim().is_empty() {
        return Err(WorkspaceError::Validation(
            "Connection id cannot be empty".into(),
        ));
    }

    let handle = sessions
        .backend_handle(profile_id)
        .ok_or_else(|| WorkspaceError::Connection {
            kind: ConnectionErrorKind::Unknown,
            message: format!("Profile '{profile_id}' is not connected"),
        })?;

    let start = Instant::now();
    let outcome = client.execute_query(&handle, query, database).await;
    let elapsed_ms = start.elapsed().as_millis() as u64;

    match outcome {
        Err(transport) => {
            tracing::error!("Query dispatch failed in transport: {transport}");
            Ok(QueryResult::failure(transport, elapsed_ms))
        }
        Ok(response) if !response.success => {
            let message = response
                .error
                .unwrap_or_else(|| "Query execution failed".to_string());
            Ok(QueryResult::failure(message, elapsed_ms))
        }
        Ok(response) => {
            let mut result = response.data.unwrap_or(QueryResult {
                series: Vec::new(),
                error: None,
                elapsed_ms,
            });
            // The wall clock around the whole call is what history records.
            result.elapsed_ms = elapsed_ms;
            let row_count = result.row_count();
            if let Err(err) = history.record(query, database, profile_id, elapsed_ms, row_count) {
                tracing::warn!("Query succeeded but history was not persisted: {err}");
            }
            Ok(result)
        }
    }
}
