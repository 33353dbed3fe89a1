use std::collections::{BTreeMap, HashMap};

use axum::extract::{RawQuery, State};
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use axum_client_ip::InsecureClientIp;
use bytes::Bytes;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::instrument;

use crate::api::{
    acknowledgment, device_response, CaptureError, DeviceHeaders, LogEntry, COMMAND_ACK,
    NO_COMMANDS,
};
use crate::parser::{self, ParsedPayload};
use crate::payload::DevicePayload;
use crate::prometheus::{report_payload, report_sink_error};
use crate::router;
use crate::sinks::file::parse_entries;
use crate::sinks::{LogFile, LogStore};
use crate::time::to_rfc3339;

/// Device push paths, all served by [`cdata`].
pub const DATA_ENDPOINTS: &[&str] = &[
    "/cdata",
    "/cdata.php",
    "/iclock/cdata",
    "/iclock/cdata.aspx",
];

const RECENT_LOG_ENTRIES: usize = 50;
const DEVICECMD_ENDPOINT: &str = "/devicecmd";

/// Metric label for a request path. Paths only reachable through the fallback
/// share one label so arbitrary device paths cannot grow the series set.
fn metric_endpoint(path: &str) -> &'static str {
    DATA_ENDPOINTS
        .iter()
        .chain([DEVICECMD_ENDPOINT].iter())
        .find(|known| **known == path)
        .copied()
        .unwrap_or("fallback")
}

fn header_value(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

fn device_headers(headers: &HeaderMap) -> DeviceHeaders {
    DeviceHeaders {
        user_agent: header_value(headers, header::USER_AGENT),
        content_type: header_value(headers, header::CONTENT_TYPE),
        content_length: header_value(headers, header::CONTENT_LENGTH),
    }
}

fn query_params(query: Option<String>) -> HashMap<String, String> {
    query
        .and_then(|q| serde_urlencoded::from_str(&q).ok())
        .unwrap_or_default()
}

fn client_ip(ip: Option<InsecureClientIp>) -> String {
    ip.map_or_else(|| String::from("unknown"), |InsecureClientIp(ip)| ip.to_string())
}

/// Hands the entry to the sink. Sink failures never reach the device.
async fn record(state: &router::State, entry: LogEntry) {
    if let Err(err) = state.sink.send(entry).await {
        report_sink_error();
        tracing::warn!("failed to write device log entry: {}", err);
    }
}

/// Shared path for every upload: decode, parse, log, and return the parse result.
async fn ingest(
    state: &router::State,
    ip: Option<InsecureClientIp>,
    uri: &Uri,
    query: Option<String>,
    headers: &HeaderMap,
    body: &Bytes,
) -> (time::OffsetDateTime, ParsedPayload) {
    let now = state.timesource.now();
    let endpoint = uri.path().to_string();
    let device = device_headers(headers);

    let payload = DevicePayload::from_request(device.content_type.as_deref(), body);
    let parsed = parser::parse(&payload.text);

    tracing::Span::current().record("endpoint", endpoint.as_str());
    tracing::Span::current().record(
        "user_agent",
        device.user_agent.as_deref().unwrap_or("unknown"),
    );
    tracing::Span::current().record("records", parsed.records.len());
    tracing::Span::current().record("skipped", parsed.skipped.len());

    report_payload(metric_endpoint(&endpoint), &parsed);

    let raw_body = String::from_utf8_lossy(body).into_owned();
    let entry = LogEntry::new(now, endpoint, client_ip(ip), device, query_params(query))
        .with_payload(raw_body, payload.form, parsed.clone());

    record(state, entry).await;

    (now, parsed)
}

/// Attendance, user and fingerprint uploads. Always acknowledged, even when
/// nothing in the body could be parsed: the device has no way to handle errors.
#[instrument(skip_all, fields(endpoint, user_agent, records, skipped))]
pub async fn cdata(
    state: State<router::State>,
    ip: Option<InsecureClientIp>,
    uri: Uri,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let (now, parsed) = ingest(&state, ip, &uri, query, &headers, &body).await;

    tracing::debug!(
        grammar = ?parsed.grammar,
        "acknowledging {} records",
        parsed.records.len()
    );

    device_response(acknowledgment(crate::time::unix_millis(now)))
}

/// Command poll. There is never anything queued for the device.
#[instrument(skip_all)]
pub async fn devicecmd_poll(
    state: State<router::State>,
    ip: Option<InsecureClientIp>,
    uri: Uri,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Response {
    let query = query_params(query);
    tracing::info!(
        serial = query.get("SN").map_or("Unknown", String::as_str),
        "device checking for commands"
    );

    let entry = LogEntry::new(
        state.timesource.now(),
        uri.path(),
        client_ip(ip),
        device_headers(&headers),
        query,
    );
    record(&state, entry).await;

    device_response(NO_COMMANDS.to_string())
}

/// Command result upload.
#[instrument(skip_all, fields(endpoint, user_agent, records, skipped))]
pub async fn devicecmd_reply(
    state: State<router::State>,
    ip: Option<InsecureClientIp>,
    uri: Uri,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    ingest(&state, ip, &uri, query, &headers, &body).await;

    device_response(COMMAND_ACK.to_string())
}

/// Any other path. Devices configured with an unexpected upload path still get
/// acknowledged; everything else is a plain 404.
pub async fn fallback(
    state: State<router::State>,
    ip: Option<InsecureClientIp>,
    method: Method,
    uri: Uri,
    raw_query: RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if method != Method::POST {
        return StatusCode::NOT_FOUND.into_response();
    }

    tracing::warn!("unknown endpoint accessed: {}", uri.path());
    cdata(state, ip, uri, raw_query, headers, body).await
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
    pub uptime: f64,
    pub endpoints: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<String>,
    pub version: &'static str,
}

pub async fn index(state: State<router::State>) -> Json<HealthResponse> {
    let mut endpoints = DATA_ENDPOINTS.to_vec();
    endpoints.push(DEVICECMD_ENDPOINT);

    Json(HealthResponse {
        status: "ESS K90 Pro Attendance Server Running",
        timestamp: to_rfc3339(state.timesource.now()),
        uptime: state.started.elapsed().as_secs_f64(),
        endpoints,
        log_file: state.logs.as_ref().map(|logs| logs.location()),
        version: env!("CARGO_PKG_VERSION"),
    })
}

fn log_store(state: &router::State) -> Result<&(dyn LogStore + Send + Sync), CaptureError> {
    state.logs.as_deref().ok_or(CaptureError::LogsUnavailable)
}

fn text_response(contents: String) -> Response {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        contents,
    )
        .into_response()
}

async fn read_logs(
    state: &router::State,
    file: LogFile,
    missing: CaptureError,
) -> Result<String, CaptureError> {
    match log_store(state)?.read(file).await {
        Ok(Some(contents)) => Ok(contents),
        Ok(None) => Err(missing),
        Err(err) => {
            tracing::warn!("failed to read logs: {}", err);
            Err(missing)
        }
    }
}

pub async fn logs(state: State<router::State>) -> Result<Response, CaptureError> {
    let contents = read_logs(&state, LogFile::Main, CaptureError::LogsNotFound).await?;
    Ok(text_response(contents))
}

pub async fn logs_today(state: State<router::State>) -> Result<Response, CaptureError> {
    let today = state.timesource.now().date();
    let contents =
        read_logs(&state, LogFile::Daily(today), CaptureError::TodayLogsNotFound).await?;
    Ok(text_response(contents))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogsResponse {
    pub total_entries: usize,
    pub logs: Vec<BTreeMap<String, String>>,
}

pub async fn logs_json(state: State<router::State>) -> Result<Json<LogsResponse>, CaptureError> {
    let contents = read_logs(&state, LogFile::Main, CaptureError::LogsNotFound).await?;
    let mut entries = parse_entries(&contents);
    let total_entries = entries.len();
    let logs = entries.split_off(total_entries.saturating_sub(RECENT_LOG_ENTRIES));

    Ok(Json(LogsResponse {
        total_entries,
        logs,
    }))
}

pub async fn clear_logs(state: State<router::State>) -> Result<Json<Value>, CaptureError> {
    log_store(&state)?.clear().await.map_err(|err| {
        tracing::error!("failed to clear logs: {}", err);
        CaptureError::ClearFailed
    })?;

    Ok(Json(json!({ "message": "Logs cleared successfully" })))
}
