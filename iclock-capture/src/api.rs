use std::collections::HashMap;

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use time::OffsetDateTime;

use crate::parser::{Grammar, ParsedPayload, SkippedLine};
use crate::records::DeviceRecord;

/// Reply to the device's command poll: nothing pending.
pub const NO_COMMANDS: &str = "NO";
/// Reply to a command result upload.
pub const COMMAND_ACK: &str = "OK";

/// The two-line acknowledgment the device expects after each upload.
/// Anything else is treated as a failed upload and retried.
pub fn acknowledgment(stamp_millis: i64) -> String {
    format!("OK\nSTAMP={stamp_millis}")
}

/// Plain text 200 response, the only shape the device understands.
pub fn device_response(body: String) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response()
}

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("No logs found")]
    LogsNotFound,
    #[error("No logs found for today")]
    TodayLogsNotFound,
    #[error("log storage is not enabled")]
    LogsUnavailable,
    #[error("Failed to clear logs")]
    ClearFailed,
}

impl IntoResponse for CaptureError {
    fn into_response(self) -> Response {
        match self {
            CaptureError::LogsNotFound
            | CaptureError::TodayLogsNotFound
            | CaptureError::LogsUnavailable => {
                (StatusCode::NOT_FOUND, self.to_string()).into_response()
            }

            CaptureError::ClearFailed => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": self.to_string() })),
            )
                .into_response(),
        }
    }
}

/// Request headers worth keeping in the audit log.
#[derive(Clone, Debug, Default, Serialize, Eq, PartialEq)]
pub struct DeviceHeaders {
    pub user_agent: Option<String>,
    pub content_type: Option<String>,
    pub content_length: Option<String>,
}

/// One self-contained audit entry per device request.
#[derive(Clone, Debug, Serialize, Eq, PartialEq)]
pub struct LogEntry {
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub endpoint: String,
    pub client_ip: String,
    pub headers: DeviceHeaders,
    pub raw_body: String,
    pub form: Vec<(String, String)>,
    pub grammar: Option<Grammar>,
    pub records: Vec<DeviceRecord>,
    pub skipped: Vec<SkippedLine>,
    pub query: HashMap<String, String>,
}

impl LogEntry {
    pub fn new(
        timestamp: OffsetDateTime,
        endpoint: impl Into<String>,
        client_ip: impl Into<String>,
        headers: DeviceHeaders,
        query: HashMap<String, String>,
    ) -> LogEntry {
        LogEntry {
            timestamp,
            endpoint: endpoint.into(),
            client_ip: client_ip.into(),
            headers,
            raw_body: String::new(),
            form: Vec::new(),
            grammar: None,
            records: Vec::new(),
            skipped: Vec::new(),
            query,
        }
    }

    pub fn with_payload(
        mut self,
        raw_body: String,
        form: Vec<(String, String)>,
        parsed: ParsedPayload,
    ) -> LogEntry {
        self.raw_body = raw_body;
        self.form = form;
        self.grammar = Some(parsed.grammar);
        self.records = parsed.records;
        self.skipped = parsed.skipped;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acknowledgment_is_wire_exact() {
        assert_eq!(acknowledgment(1_705_309_200_123), "OK\nSTAMP=1705309200123");
        assert_eq!(acknowledgment(0), "OK\nSTAMP=0");
    }

    #[test]
    fn log_errors_map_to_status_codes() {
        assert_eq!(
            CaptureError::LogsNotFound.into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            CaptureError::LogsUnavailable.into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            CaptureError::ClearFailed.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
