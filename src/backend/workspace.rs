use crate::backend::client::InfluxClient;
use crate::backend::dispatch::{self, HistoryCache};
use crate::backend::error::{ConnectionErrorKind, WorkspaceError};
use crate::backend::models::{
    ConnectionProfile, DatabaseInfo, QueryHistoryEntry, QueryResult, SessionStatus,
};
use crate::backend::profiles::{MigratedProfile, ProfileStore, ProfileUpdate};
use crate::backend::session::SessionRegistry;
use crate::backend::storage::Storage;
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, RwLock};

/// Owns the profile store, the per-profile session registry, the query
/// history and the active-session pointer, and talks to the backend
/// through the injected client. All commands operate on one instance of
/// this; nothing here is a process-wide singleton.
pub struct Workspace {
    profiles: ProfileStore,
    sessions: SessionRegistry,
    history: HistoryCache,
    client: Arc<dyn InfluxClient>,
    active: RwLock<Option<String>>,
}

impl Workspace {
    pub fn new(storage: Storage, client: Arc<dyn InfluxClient>) -> Self {
        let profiles = ProfileStore::load(storage.clone());
        let sessions = SessionRegistry::new();
        for profile in profiles.list_active() {
            sessions.ensure(&profile.id);
        }
        let history = HistoryCache::load(storage);
        Self {
            profiles,
            sessions,
            history,
            client,
            active: RwLock::new(None),
        }
    }

    pub fn open_default(client: Arc<dyn InfluxClient>) -> Result<Self, WorkspaceError> {
        Ok(Self::new(Storage::open_default()?, client))
    }

    // ---- profiles ----

    pub fn add_or_update_profile(
        &self,
        profile: ConnectionProfile,
    ) -> Result<ConnectionProfile, WorkspaceError> {
        let stored = self.profiles.add_or_update(profile)?;
        self.sessions.ensure(&stored.id);
        Ok(stored)
    }

    pub fn update_profile(
        &self,
        id: &str,
        patch: ProfileUpdate,
    ) -> Result<ConnectionProfile, WorkspaceError> {
        self.profiles.update(id, patch)
    }

    /// Removes a profile and cascades: its session status goes away and
    /// the active pointer is cleared if it pointed here.
    pub fn remove_profile(&self, id: &str) -> Result<bool, WorkspaceError> {
        let removed = self.profiles.remove(id)?;
        if removed {
            self.sessions.remove(id);
            self.clear_active_if(id);
        }
        Ok(removed)
    }

    pub fn list_profiles(&self) -> Vec<ConnectionProfile> {
        self.profiles.list_active()
    }

    pub fn get_profile(&self, id: &str) -> Option<ConnectionProfile> {
        self.profiles.get(id)
    }

    pub fn unrecognized_profiles(&self) -> Vec<Value> {
        self.profiles.unrecognized()
    }

    /// Merges an imported profile list; unrecognized rows are counted but
    /// not stored.
    pub fn import_profiles(&self, path: &Path) -> Result<(usize, usize), WorkspaceError> {
        let mut imported = 0;
        let mut skipped = 0;
        for migrated in crate::backend::profiles::import_profiles(path)? {
            match migrated {
                MigratedProfile::V1(profile) | MigratedProfile::V2(profile) => {
                    self.add_or_update_profile(profile)?;
                    imported += 1;
                }
                MigratedProfile::Unrecognized(_) => skipped += 1,
            }
        }
        Ok((imported, skipped))
    }

    pub fn export_profiles(&self, path: &Path) -> Result<(), WorkspaceError> {
        crate::backend::profiles::export_profiles(path, &self.profiles.list_active())
    }

    // ---- sessions ----

    pub fn active_profile_id(&self) -> Option<String> {
        self.active.read().expect("active pointer poisoned").clone()
    }

    fn set_active(&self, id: &str) {
        *self.active.write().expect("active pointer poisoned") = Some(id.to_string());
    }

    fn clear_active_if(&self, id: &str) {
        let mut active = self.active.write().expect("active pointer poisoned");
        if active.as_deref() == Some(id) {
            *active = None;
        }
    }

    pub fn session_status(&self, id: &str) -> Option<SessionStatus> {
        self.sessions.status(id)
    }

    pub fn session_statuses(&self) -> Vec<SessionStatus> {
        self.sessions.statuses()
    }

    /// Establishes a backend session for the profile. On success the
    /// profile becomes the active session. Unknown ids report failure
    /// without creating any session state.
    pub async fn connect(&self, id: &str) -> bool {
        let Some(profile) = self.profiles.get(id) else {
            tracing::warn!("Connect requested for unknown profile '{id}'");
            return false;
        };

        let token = self.sessions.begin_attempt(id);
        match self.client.connect_to_database(&profile).await {
            Ok(response) if response.success => match response.data {
                Some(handle) => {
                    if self.sessions.complete_connected(id, token, Some(handle)) {
                        self.set_active(id);
                        true
                    } else {
                        false
                    }
                }
                None => {
                    self.sessions.fail_attempt(
                        id,
                        token,
                        "Backend reported success without a connection handle".to_string(),
                    );
                    false
                }
            },
            Ok(response) => {
                let message = response
                    .error
                    .unwrap_or_else(|| "Failed to connect".to_string());
                self.sessions.fail_attempt(id, token, message);
                false
            }
            Err(transport) => {
                let classified = WorkspaceError::from_transport_failure(&transport);
                tracing::warn!("Connect transport failure for '{id}': {transport}");
                self.sessions.fail_attempt(id, token, classified.to_string());
                false
            }
        }
    }

    /// Probes reachability without establishing a backend session. Never
    /// touches the active pointer.
    pub async fn test(&self, id: &str) -> bool {
        let Some(profile) = self.profiles.get(id) else {
            tracing::warn!("Test requested for unknown profile '{id}'");
            return false;
        };

        let token = self.sessions.begin_attempt(id);
        match self.client.test_connection(&profile).await {
            Ok(response) if response.success && response.data.unwrap_or(false) => {
                self.sessions.complete_connected(id, token, None)
            }
            Ok(response) => {
                let message = response
                    .error
                    .unwrap_or_else(|| "Connection test failed".to_string());
                self.sessions.fail_attempt(id, token, message);
                false
            }
            Err(transport) => {
                let classified = WorkspaceError::from_transport_failure(&transport);
                tracing::warn!("Test transport failure for '{id}': {transport}");
                self.sessions.fail_attempt(id, token, classified.to_string());
                false
            }
        }
    }

    pub fn disconnect(&self, id: &str) {
        self.sessions.disconnect(id);
        self.clear_active_if(id);
    }

    // ---- dispatch & history ----

    pub async fn execute_query(
        &self,
        query: &str,
        database: &str,
        profile_id: &str,
    ) -> Result<QueryResult, WorkspaceError> {
        dispatch::execute(
            self.client.as_ref(),
            &self.sessions,
            &self.history,
            query,
            database,
            profile_id,
        )
        .await
    }

    pub fn history(&self) -> Vec<QueryHistoryEntry> {
        self.history.list()
    }

    pub fn recent_history(&self, count: usize) -> Vec<QueryHistoryEntry> {
        self.history.recent(count)
    }

    pub fn remove_history_entry(&self, id: &str) -> Result<bool, WorkspaceError> {
        self.history.remove(id)
    }

    pub fn clear_history(&self) -> Result<(), WorkspaceError> {
        self.history.clear()
    }

    // ---- metadata ----

    fn require_handle(&self, profile_id: &str) -> Result<String, WorkspaceError> {
        if self.profiles.get(profile_id).is_none() {
            return Err(WorkspaceError::ProfileNotFound(profile_id.to_string()));
        }
        self.sessions
            .backend_handle(profile_id)
            .ok_or_else(|| WorkspaceError::Connection {
                kind: ConnectionErrorKind::Unknown,
                message: format!("Profile '{profile_id}' is not connected"),
            })
    }

    pub async fn get_databases(&self, profile_id: &str) -> Result<Vec<String>, WorkspaceError> {
        let handle = self.require_handle(profile_id)?;
        match self.client.get_databases(&handle).await {
            Ok(response) if response.success => Ok(response.data.unwrap_or_default()),
            Ok(response) => Err(WorkspaceError::business(
                response.error,
                "Failed to list databases",
            )),
            Err(transport) => Err(WorkspaceError::from_transport_failure(&transport)),
        }
    }

    pub async fn get_database_info(
        &self,
        profile_id: &str,
        database: &str,
    ) -> Result<DatabaseInfo, WorkspaceError> {
        let handle = self.require_handle(profile_id)?;
        match self.client.get_database_info(&handle, database).await {
            Ok(response) if response.success => response.data.ok_or_else(|| {
                WorkspaceError::Business("Failed to load database info".to_string())
            }),
            Ok(response) => Err(WorkspaceError::business(
                response.error,
                "Failed to load database info",
            )),
            Err(transport) => Err(WorkspaceError::from_transport_failure(&transport)),
        }
    }

    pub async fn create_database(
        &self,
        profile_id: &str,
        database: &str,
        retention_policy: Option<&str>,
    ) -> Result<bool, WorkspaceError> {
        let handle = self.require_handle(profile_id)?;
        match self
            .client
            .create_database(&handle, database, retention_policy)
            .await
        {
            Ok(response) if response.success => Ok(response.data.unwrap_or(true)),
            Ok(response) => Err(WorkspaceError::business(
                response.error,
                "Failed to create database",
            )),
            Err(transport) => Err(WorkspaceError::from_transport_failure(&transport)),
        }
    }

    pub async fn drop_database(
        &self,
        profile_id: &str,
        database: &str,
    ) -> Result<bool, WorkspaceError> {
        let handle = self.require_handle(profile_id)?;
        match self.client.drop_database(&handle, database).await {
            Ok(response) if response.success => Ok(response.data.unwrap_or(true)),
            Ok(response) => Err(WorkspaceError::business(
                response.error,
                "Failed to drop database",
            )),
            Err(transport) => Err(WorkspaceError::from_transport_failure(&transport)),
        }
    }

    pub async fn get_measurements(
        &self,
        profile_id: &str,
        database: &str,
    ) -> Result<Vec<String>, WorkspaceError> {
        let handle = self.require_handle(profile_id)?;
        match self.client.get_measurements(&handle, database).await {
            Ok(response) if response.success => Ok(response.data.unwrap_or_default()),
            Ok(response) => Err(WorkspaceError::business(
                response.error,
                "Failed to list measurements",
            )),
            Err(transport) => Err(WorkspaceError::from_transport_failure(&transport)),
        }
    }
}
