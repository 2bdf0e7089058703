use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Which query-language variant a connection speaks. Only v1.x is
/// understood by the statement validator; v2.x/v3.x profiles can be stored
/// but queries against them are rejected up front.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DialectVersion {
    #[serde(rename = "v1.x")]
    V1,
    #[serde(rename = "v2.x")]
    V2,
    #[serde(rename = "v3.x")]
    V3,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct V1Config {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(rename = "useSsl")]
    pub use_ssl: bool,
    #[serde(rename = "timeoutMs")]
    pub timeout_ms: u64,
}

/// v2.x-style configuration; v3.x connections reuse this shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct V2Config {
    pub host: String,
    pub port: u16,
    pub token: String,
    pub org: String,
    pub bucket: Option<String>,
    #[serde(rename = "useSsl")]
    pub use_ssl: bool,
    #[serde(rename = "timeoutMs")]
    pub timeout_ms: u64,
}

/// Connection settings, discriminated by field shape rather than a tag so
/// that records written by older releases deserialize directly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ProfileConfig {
    V2(V2Config),
    V1(V1Config),
}

impl ProfileConfig {
    pub fn host(&self) -> &str {
        match self {
            ProfileConfig::V1(c) => &c.host,
            ProfileConfig::V2(c) => &c.host,
        }
    }

    pub fn port(&self) -> u16 {
        match self {
            ProfileConfig::V1(c) => c.port,
            ProfileConfig::V2(c) => c.port,
        }
    }

    pub fn base_url(&self) -> String {
        let (use_ssl, host, port) = match self {
            ProfileConfig::V1(c) => (c.use_ssl, &c.host, c.port),
            ProfileConfig::V2(c) => (c.use_ssl, &c.host, c.port),
        };
        let protocol = if use_ssl { "https" } else { "http" };
        format!("{protocol}://{host}:{port}")
    }

    /// Whether this config carries the shape a given dialect version expects.
    pub fn matches_version(&self, version: DialectVersion) -> bool {
        match (self, version) {
            (ProfileConfig::V1(_), DialectVersion::V1) => true,
            (ProfileConfig::V2(_), DialectVersion::V2 | DialectVersion::V3) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionProfile {
    pub id: String,
    pub name: String,
    pub version: DialectVersion,
    pub config: ProfileConfig,
    #[serde(rename = "createdAt")]
    pub created_at: u64,
    #[serde(rename = "updatedAt")]
    pub updated_at: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Runtime connect/disconnect lifecycle for one profile. The backend
/// handle is present only while the state is `Connected`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatus {
    #[serde(rename = "profileId")]
    pub profile_id: String,
    pub state: SessionState,
    #[serde(rename = "lastPingAt")]
    pub last_ping_at: Option<u64>,
    pub error: Option<String>,
    #[serde(rename = "backendHandle")]
    pub backend_handle: Option<String>,
}

impl SessionStatus {
    pub fn disconnected(profile_id: &str) -> Self {
        Self {
            profile_id: profile_id.to_string(),
            state: SessionState::Disconnected,
            last_ping_at: None,
            error: None,
            backend_handle: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Series {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
    pub tags: Option<HashMap<String, String>>,
}

/// One dispatch outcome: either `error` is set or `series` holds the
/// (possibly empty) result set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub series: Vec<Series>,
    pub error: Option<String>,
    #[serde(rename = "elapsedMs")]
    pub elapsed_ms: u64,
}

impl QueryResult {
    pub fn failure(message: impl Into<String>, elapsed_ms: u64) -> Self {
        Self {
            series: Vec::new(),
            error: Some(message.into()),
            elapsed_ms,
        }
    }

    /// Total row count across all series.
    pub fn row_count(&self) -> usize {
        self.series.iter().map(|s| s.rows.len()).sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryHistoryEntry {
    pub id: String,
    #[serde(rename = "queryText")]
    pub query_text: String,
    pub database: String,
    #[serde(rename = "submittedAt")]
    pub submitted_at: DateTime<Utc>,
    #[serde(rename = "elapsedMs")]
    pub elapsed_ms: u64,
    #[serde(rename = "resultRowCount")]
    pub result_row_count: usize,
    #[serde(rename = "profileId")]
    pub profile_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationVerdict {
    #[serde(rename = "isValid")]
    pub is_valid: bool,
    pub error: Option<String>,
    pub suggestion: Option<String>,
    #[serde(rename = "correctedText")]
    pub corrected_text: Option<String>,
}

impl ValidationVerdict {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            error: None,
            suggestion: None,
            corrected_text: None,
        }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            error: Some(error.into()),
            suggestion: None,
            corrected_text: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_corrected_text(mut self, corrected: impl Into<String>) -> Self {
        self.corrected_text = Some(corrected.into());
        self
    }
}

/// Response envelope every backend command resolves with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub name: String,
    pub duration: String,
    pub replication: u32,
    pub default: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasurementInfo {
    pub name: String,
    #[serde(rename = "tagKeys")]
    pub tag_keys: Vec<String>,
    #[serde(rename = "fieldKeys")]
    pub field_keys: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseInfo {
    pub name: String,
    #[serde(rename = "retentionPolicies")]
    pub retention_policies: Vec<RetentionPolicy>,
    pub measurements: Vec<MeasurementInfo>,
}

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
