use crate::backend::error::WorkspaceError;
use crate::backend::models::{ConnectionProfile, QueryHistoryEntry};
use serde_json::Value;
use std::env;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

// Two independent records in a file-per-key store under the user's home
// directory: stored profiles and the query history.
const CONNECTIONS_FILE: &str = "connections.json";
const HISTORY_FILE: &str = "query-history.json";

#[derive(Debug, Clone)]
pub struct Storage {
    dir: PathBuf,
}

impl Storage {
    pub fn open_default() -> Result<Self, WorkspaceError> {
        let home = home_dir()
            .ok_or_else(|| WorkspaceError::Storage("Failed to resolve home directory".into()))?;
        Ok(Self {
            dir: home.join(".influxworkbench"),
        })
    }

    /// Store rooted at an explicit directory; used by tests.
    pub fn open_at(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Stored connection records, untyped so the caller can migrate legacy
    /// shapes. A corrupt store logs and yields an empty list rather than
    /// failing the whole load.
    pub fn load_raw_connections(&self) -> Vec<Value> {
        let path = self.dir.join(CONNECTIONS_FILE);
        match read_file(&path) {
            Ok(Some(content)) => match serde_json::from_str::<Vec<Value>>(&content) {
                Ok(records) => records,
                Err(err) => {
                    tracing::warn!("Discarding unreadable connection store: {err}");
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(err) => {
                tracing::warn!("Failed to load connection store: {err}");
                Vec::new()
            }
        }
    }

    /// Persists the profile list alongside any unrecognized records so
    /// they survive the round trip untouched.
    pub fn save_connections(
        &self,
        profiles: &[ConnectionProfile],
        unrecognized: &[Value],
    ) -> Result<(), WorkspaceError> {
        let mut records: Vec<Value> = Vec::with_capacity(profiles.len() + unrecognized.len());
        for profile in profiles {
            let value = serde_json::to_value(profile)
                .map_err(|e| WorkspaceError::Storage(format!("Failed to serialize profile: {e}")))?;
            records.push(value);
        }
        records.extend(unrecognized.iter().cloned());
        let json = serde_json::to_string(&records)
            .map_err(|e| WorkspaceError::Storage(format!("Failed to serialize profiles: {e}")))?;
        write_file(&self.dir.join(CONNECTIONS_FILE), &json)
    }

    pub fn load_history(&self) -> Vec<QueryHistoryEntry> {
        let path = self.dir.join(HISTORY_FILE);
        match read_file(&path) {
            Ok(Some(content)) => match serde_json::from_str::<Vec<QueryHistoryEntry>>(&content) {
                Ok(entries) => entries,
                Err(err) => {
                    tracing::warn!("Discarding unreadable query history: {err}");
                    Vec::new()
                }
            },
            _ => Vec::new(),
        }
    }

    pub fn save_history(&self, entries: &[QueryHistoryEntry]) -> Result<(), WorkspaceError> {
        let json = serde_json::to_string(entries)
            .map_err(|e| WorkspaceError::Storage(format!("Failed to serialize history: {e}")))?;
        write_file(&self.dir.join(HISTORY_FILE), &json)
    }
}

fn read_file(path: &Path) -> Result<Option<String>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let mut file = fs::File::open(path).map_err(|e| format!("Failed to open file: {e}"))?;
    let mut content = String::new();
    file.read_to_string(&mut content)
        .map_err(|e| format!("Failed to read file: {e}"))?;
    Ok(Some(content))
}

fn write_file(path: &Path, content: &str) -> Result<(), WorkspaceError> {
    ensure_parent_dir(path)?;
    let mut file = fs::File::create(path)
        .map_err(|e| WorkspaceError::Storage(format!("Failed to write file: {e}")))?;
    file.write_all(content.as_bytes())
        .map_err(|e| WorkspaceError::Storage(format!("Failed to write file: {e}")))
}

fn ensure_parent_dir(path: &Path) -> Result<(), WorkspaceError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| WorkspaceError::Storage(format!("Failed to create directory: {e}")))?;
    }
    Ok(())
}

fn home_dir() -> Option<PathBuf> {
    if let Some(value) = env::var_os("USERPROFILE") {
        return Some(PathBuf::from(value));
    }
    if let Some(value) = env::var_os("HOME") {
        return Some(PathBuf::from(value));
    }
    env::current_dir().ok()
}
