use crate::backend::models::{
    ApiResponse, ConnectionProfile, DatabaseInfo, MeasurementInfo, ProfileConfig, QueryResult,
    RetentionPolicy, Series,
};
use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::Client;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// `Err` carries a raw transport failure (the call itself broke down);
/// `success == false` inside the envelope is a business rejection.
pub type ClientResult<T> = Result<ApiResponse<T>, String>;

/// The opaque backend boundary. Everything the engine knows about the
/// database goes through these commands; the wire protocol behind them is
/// none of the engine's business.
#[async_trait]
pub trait InfluxClient: Send + Sync {
    async fn test_connection(&self, profile: &ConnectionProfile) -> ClientResult<bool>;
    async fn connect_to_database(&self, profile: &ConnectionProfile) -> ClientResult<String>;
    async fn get_databases(&self, handle: &str) -> ClientResult<Vec<String>>;
    async fn get_database_info(&self, handle: &str, database: &str) -> ClientResult<DatabaseInfo>;
    async fn create_database(
        &self,
        handle: &str,
        database: &str,
        retention_policy: Option<&str>,
    ) -> ClientResult<bool>;
    async fn drop_database(&self, handle: &str, database: &str) -> ClientResult<bool>;
    async fn get_measurements(&self, handle: &str, database: &str) -> ClientResult<Vec<String>>;
    async fn execute_query(
        &self,
        handle: &str,
        query: &str,
        database: &str,
    ) -> ClientResult<QueryResult>;
}

struct V1Session {
    http: Client,
    base_url: String,
    username: Option<String>,
    password: Option<String>,
}

/// InfluxDB v1.x client over the `/ping` and `/query` HTTP endpoints.
/// Connected sessions are keyed by an opaque handle string.
pub struct HttpInfluxClient {
    sessions: DashMap<String, V1Session>,
    handle_counter: AtomicU64,
}

impl Default for HttpInfluxClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpInfluxClient {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            handle_counter: AtomicU64::new(1),
        }
    }

    fn build_session(profile: &ConnectionProfile) -> Result<V1Session, String> {
        let config = match &profile.config {
            ProfileConfig::V1(config) => config,
            ProfileConfig::V2(_) => {
                return Err(
                    "Only InfluxDB v1.x connections are supported; v2.x and v3.x support is \
                     under development"
                        .to_string(),
                );
            }
        };
        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(transport_message)?;
        Ok(V1Session {
            http,
            base_url: profile.config.base_url(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    async fn ping(session: &V1Session) -> ClientResult<bool> {
        let url = format!("{}/ping", session.base_url);
        let response = session
            .http
            .get(&url)
            .send()
            .await
            .map_err(transport_message)?;
        if response.status().is_success() {
            Ok(ApiResponse::ok(true))
        } else {
            let status = response.status();
            let text = response.text().await.unwrap_or_else(|_| "N/A".to_string());
            Ok(ApiResponse::err(format!(
                "Connection failed with status {status}: {text}"
            )))
        }
    }

    /// Runs a raw InfluxQL statement. Reads go over GET, management
    /// statements over POST, matching the v1 HTTP API.
    async fn raw_query(
        &self,
        handle: &str,
        query: &str,
        database: Option<&str>,
        mutating: bool,
    ) -> ClientResult<QueryResult> {
        // Copy what the request needs out of the map so no shard lock is
        // held while the call is in flight.
        let (http, url, username, password) = {
            let Some(session) = self.sessions.get(handle) else {
                return Ok(ApiResponse::err("Connection not found"));
            };
            (
                session.http.clone(),
                format!("{}/query", session.base_url),
                session.username.clone(),
                session.password.clone(),
            )
        };

        let start = Instant::now();
        let mut request = if mutating {
            http.post(&url)
        } else {
            http.get(&url)
        };
        request = request.query(&[("q", query)]);
        if let Some(db) = database {
            request = request.query(&[("db", db)]);
        }
        if let (Some(username), Some(password)) = (&username, &password) {
            request = request.basic_auth(username, Some(password));
        }

        let response = request.send().await.map_err(transport_message)?;
        let status = response.status();
        let text = response.text().await.map_err(transport_message)?;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        if !status.is_success() {
            return Ok(ApiResponse::err(format!("HTTP {status}: {text}")));
        }

        match parse_query_payload(&text) {
            Ok(ParsedPayload::Series(series)) => Ok(ApiResponse::ok(QueryResult {
                series,
                error: None,
                elapsed_ms,
            })),
            Ok(ParsedPayload::StatementError(message)) => Ok(ApiResponse::err(message)),
            Err(message) => Ok(ApiResponse::err(message)),
        }
    }

    fn first_column_values(result: &QueryResult) -> Vec<String> {
        let mut names = Vec::new();
        for series in &result.series {
            for row in &series.rows {
                if let Some(name) = row.first().and_then(Value::as_str) {
                    names.push(name.to_string());
                }
            }
        }
        names
    }
}

#[async_trait]
impl InfluxClient for HttpInfluxClient {
    async fn test_connection(&self, profile: &ConnectionProfile) -> ClientResult<bool> {
        tracing::info!("Testing connection to {}", profile.config.base_url());
        let session = match Self::build_session(profile) {
            Ok(session) => session,
            Err(message) => return Ok(ApiResponse::err(message)),
        };
        Self::ping(&session).await
    }

    async fn connect_to_database(&self, profile: &ConnectionProfile) -> ClientResult<String> {
        tracing::info!("Connecting to {}", profile.config.base_url());
        let session = match Self::build_session(profile) {
            Ok(session) => session,
            Err(message) => return Ok(ApiResponse::err(message)),
        };

        let ping = Self::ping(&session).await?;
        if !ping.success {
            return Ok(ApiResponse {
                success: false,
                data: None,
                error: ping.error,
            });
        }

        let n = self.handle_counter.fetch_add(1, Ordering::SeqCst);
        let handle = format!(
            "{}_{}_{}",
            profile.config.host(),
            profile.config.port(),
            n
        );
        self.sessions.insert(handle.clone(), session);
        Ok(ApiResponse::ok(handle))
    }

    async fn get_databases(&self, handle: &str) -> ClientResult<Vec<String>> {
        let result = self.raw_query(handle, "SHOW DATABASES", None, false).await?;
        Ok(map_envelope(result, Self::first_column_values))
    }

    async fn get_database_info(&self, handle: &str, database: &str) -> ClientResult<DatabaseInfo> {
        let rp_query = format!("SHOW RETENTION POLICIES ON \"{database}\"");
        let rp_result = self.raw_query(handle, &rp_query, None, false).await?;
        if !rp_result.success {
            return Ok(ApiResponse {
                success: false,
                data: None,
                error: rp_result.error,
            });
        }

        let mut retention_policies = Vec::new();
        if let Some(result) = &rp_result.data {
            for series in &result.series {
                for row in &series.rows {
                    if row.len() >= 4 {
                        retention_policies.push(RetentionPolicy {
                            name: row[0].as_str().unwrap_or("").to_string(),
                            duration: row[1].as_str().unwrap_or("").to_string(),
                            replication: row[2].as_u64().unwrap_or(1) as u32,
                            default: row[3].as_bool().unwrap_or(false),
                        });
                    }
                }
            }
        }

        let measurements = self.get_measurements(handle, database).await?;
        if !measurements.success {
            return Ok(ApiResponse {
                success: false,
                data: None,
                error: measurements.error,
            });
        }
        let measurements = measurements
            .data
            .unwrap_or_default()
            .into_iter()
            .map(|name| MeasurementInfo {
                name,
                tag_keys: Vec::new(),
                field_keys: Vec::new(),
            })
            .collect();

        Ok(ApiResponse::ok(DatabaseInfo {
            name: database.to_string(),
            retention_policies,
            measurements,
        }))
    }

    async fn create_database(
        &self,
        handle: &str,
        database: &str,
        retention_policy: Option<&str>,
    ) -> ClientResult<bool> {
        let query = match retention_policy {
            Some(policy) => format!("CREATE DATABASE \"{database}\" WITH NAME \"{policy}\""),
            None => format!("CREATE DATABASE \"{database}\""),
        };
        let result = self.raw_query(handle, &query, None, true).await?;
        Ok(map_envelope(result, |_| true))
    }

    async fn drop_database(&self, handle: &str, database: &str) -> ClientResult<bool> {
        let query = format!("DROP DATABASE \"{database}\"");
        let result = self.raw_query(handle, &query, None, true).await?;
        Ok(map_envelope(result, |_| true))
    }

    async fn get_measurements(&self, handle: &str, database: &str) -> ClientResult<Vec<String>> {
        let query = format!("SHOW MEASUREMENTS ON \"{database}\"");
        let result = self.raw_query(handle, &query, None, false).await?;
        Ok(map_envelope(result, Self::first_column_values))
    }

    async fn execute_query(
        &self,
        handle: &str,
        query: &str,
        database: &str,
    ) -> ClientResult<QueryResult> {
        tracing::info!("Executing query against db '{database}': {query}");
        self.raw_query(handle, query, Some(database), false).await
    }
}

fn map_envelope<T, U>(response: ApiResponse<T>, map: impl FnOnce(&T) -> U) -> ApiResponse<U> {
    match response.data {
        Some(data) if response.success => ApiResponse::ok(map(&data)),
        _ => ApiResponse {
            success: response.success,
            data: None,
            error: response.error,
        },
    }
}

/// Maps a reqwest failure onto a message the session layer can classify
/// by substring.
fn transport_message(err: reqwest::Error) -> String {
    if err.is_timeout() {
        format!("Connection timeout: {err}")
    } else if err.is_connect() {
        format!("Network connect error: {err}")
    } else {
        err.to_string()
    }
}

enum ParsedPayload {
    Series(Vec<Series>),
    StatementError(String),
}

/// Parses the v1 `/query` response body: `{"results": [{"series": [...]}]}`,
/// where a statement-level failure arrives as `{"results": [{"error": ".."}]}`.
fn parse_query_payload(text: &str) -> Result<ParsedPayload, String> {
    let json: Value =
        serde_json::from_str(text).map_err(|e| format!("Failed to parse response JSON: {e}"))?;

    let mut series = Vec::new();
    if let Some(results) = json.get("results").and_then(Value::as_array) {
        for result in results {
            if let Some(message) = result.get("error").and_then(Value::as_str) {
                return Ok(ParsedPayload::StatementError(message.to_string()));
            }
            if let Some(payload) = result.get("series").and_then(Value::as_array) {
                for entry in payload {
                    series.push(parse_series(entry));
                }
            }
        }
    }
    Ok(ParsedPayload::Series(series))
}

fn parse_series(entry: &Value) -> Series {
    let name = entry
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    let columns = entry
        .get("columns")
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let rows = entry
        .get("values")
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(Value::as_array)
                .map(|row| row.to_vec())
                .collect()
        })
        .unwrap_or_default();
    let tags = entry.get("tags").and_then(Value::as_object).map(|object| {
        object
            .iter()
            .filter_map(|(key, value)| value.as_str().map(|v| (key.clone(), v.to_string())))
            .collect()
    });

    Series {
        name,
        columns,
        rows,
        tags,
    }
}
