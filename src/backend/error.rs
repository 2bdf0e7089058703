use serde::{Serialize, Serializer};
use thiserror::Error;

/// Classified connect/test failure, derived from the transport error text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionErrorKind {
    ConnectionRefused,
    Timeout,
    NetworkUnavailable,
    Unknown,
}

impl ConnectionErrorKind {
    pub fn classify(message: &str) -> Self {
        let lower = message.to_ascii_lowercase();
        if lower.contains("connection refused") {
            ConnectionErrorKind::ConnectionRefused
        } else if lower.contains("timeout") {
            ConnectionErrorKind::Timeout
        } else if lower.contains("network") {
            ConnectionErrorKind::NetworkUnavailable
        } else {
            ConnectionErrorKind::Unknown
        }
    }

    /// The user-facing message for this failure class. `raw` is the
    /// transport error text, surfaced verbatim for unclassified failures.
    pub fn user_message(&self, raw: &str) -> String {
        match self {
            ConnectionErrorKind::ConnectionRefused => {
                "Unable to reach the server. Check that the database service is running, \
                 that the host and port are correct, and that no firewall is blocking the \
                 connection."
                    .to_string()
            }
            ConnectionErrorKind::Timeout => {
                "Connection timed out. Check the network and the server status.".to_string()
            }
            ConnectionErrorKind::NetworkUnavailable => {
                "Network is unavailable. Check your network settings.".to_string()
            }
            ConnectionErrorKind::Unknown => raw.to_string(),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum WorkspaceError {
    /// Pre-flight failure; the backend was never called.
    #[error("{0}")]
    Validation(String),

    #[error("{message}")]
    Connection {
        kind: ConnectionErrorKind,
        message: String,
    },

    /// The backend understood the request but rejected it.
    #[error("{0}")]
    Business(String),

    #[error("{0}")]
    Storage(String),

    #[error("No connection profile with id '{0}'")]
    ProfileNotFound(String),
}

impl WorkspaceError {
    /// Builds a classified connection error from a raw transport failure.
    pub fn from_transport_failure(raw: &str) -> Self {
        let kind = ConnectionErrorKind::classify(raw);
        WorkspaceError::Connection {
            kind,
            message: kind.user_message(raw),
        }
    }

    /// Business rejection with a per-command fallback when the backend
    /// supplied no message of its own.
    pub fn business(message: Option<String>, fallback: &str) -> Self {
        WorkspaceError::Business(message.unwrap_or_else(|| fallback.to_string()))
    }
}

// Tauri command errors cross the IPC boundary as their display text.
impl Serialize for WorkspaceError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_refused_timeout_and_network_failures() {
        assert_eq!(
            ConnectionErrorKind::classify("tcp connect error: Connection refused (os error 111)"),
            ConnectionErrorKind::ConnectionRefused
        );
        assert_eq!(
            ConnectionErrorKind::classify("operation Timeout after 5000ms"),
            ConnectionErrorKind::Timeout
        );
        assert_eq!(
            ConnectionErrorKind::classify("Network unreachable"),
            ConnectionErrorKind::NetworkUnavailable
        );
        assert_eq!(
            ConnectionErrorKind::classify("status 500"),
            ConnectionErrorKind::Unknown
        );
    }

    #[test]
    fn unknown_failures_surface_the_raw_message() {
        let err = WorkspaceError::from_transport_failure("status 500: broken pipe");
        assert_eq!(
            err,
            WorkspaceError::Connection {
                kind: ConnectionErrorKind::Unknown,
                message: "status 500: broken pipe".to_string(),
            }
        );
    }

    #[test]
    fn business_errors_fall_back_per_command() {
        assert_eq!(
            WorkspaceError::business(None, "Query execution failed"),
            WorkspaceError::Business("Query execution failed".to_string())
        );
        assert_eq!(
            WorkspaceError::business(Some("db not found".to_string()), "Query execution failed"),
            WorkspaceError::Business("db not found".to_string())
        );
    }
}
