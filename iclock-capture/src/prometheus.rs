// prometheus exporter setup

use std::time::Instant;

use axum::{
    body::Body, extract::MatchedPath, http::Request, middleware::Next, response::IntoResponse,
};
use metrics::counter;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

use crate::parser::ParsedPayload;

pub const ICLOCK_PAYLOADS_RECEIVED_TOTAL: &str = "iclock_payloads_received_total";
pub const ICLOCK_RECORDS_PARSED_TOTAL: &str = "iclock_records_parsed_total";
pub const ICLOCK_LINES_SKIPPED_TOTAL: &str = "iclock_lines_skipped_total";
pub const ICLOCK_LOG_SINK_ERRORS_TOTAL: &str = "iclock_log_sink_errors_total";

pub fn report_payload(endpoint: &'static str, parsed: &ParsedPayload) {
    counter!(ICLOCK_PAYLOADS_RECEIVED_TOTAL, "endpoint" => endpoint).increment(1);

    for record in &parsed.records {
        counter!(ICLOCK_RECORDS_PARSED_TOTAL, "kind" => record.kind()).increment(1);
    }
    for skipped in &parsed.skipped {
        counter!(ICLOCK_LINES_SKIPPED_TOTAL, "reason" => skipped.error.reason()).increment(1);
    }
}

pub fn report_sink_error() {
    counter!(ICLOCK_LOG_SINK_ERRORS_TOTAL).increment(1);
}

pub fn setup_metrics_recorder() -> PrometheusHandle {
    const EXPONENTIAL_SECONDS: &[f64] = &[
        0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
    ];

    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("http_requests_duration_seconds".to_string()),
            EXPONENTIAL_SECONDS,
        )
        .unwrap()
        .install_recorder()
        .unwrap()
}

/// Middleware to record some common HTTP metrics
/// Someday tower-http might provide a metrics middleware: https://github.com/tower-rs/tower-http/issues/57
pub async fn track_metrics(req: Request<Body>, next: Next) -> impl IntoResponse {
    let start = Instant::now();

    let path = if let Some(matched_path) = req.extensions().get::<MatchedPath>() {
        matched_path.as_str().to_owned()
    } else {
        // unmatched device paths are unbounded, keep the label set small
        "fallback".to_owned()
    };

    let method = req.method().clone();

    // Run the rest of the request handling first, so we can measure it and get response
    // codes.
    let response = next.run(req).await;

    let latency = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    let labels = [
        ("method", method.to_string()),
        ("path", path),
        ("status", status),
    ];

    metrics::counter!("http_requests_total", &labels).increment(1);
    metrics::histogram!("http_requests_duration_seconds", &labels).record(latency);

    response
}
