use std::future::ready;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::DefaultBodyLimit;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::sinks::{LogSink, LogStore};
use crate::time::TimeSource;

use crate::prometheus::{setup_metrics_recorder, track_metrics};

// Fingerprint template uploads can be large, and a rejected upload is retried forever
pub const MAX_BODY_SIZE: usize = 32 * 1024 * 1024;

#[derive(Clone)]
pub struct State {
    pub sink: Arc<dyn LogSink + Send + Sync>,
    pub logs: Option<Arc<dyn LogStore + Send + Sync>>,
    pub timesource: Arc<dyn TimeSource + Send + Sync>,
    pub started: Instant,
}

pub fn router<TZ: TimeSource + Send + Sync + 'static>(
    timesource: TZ,
    sink: Arc<dyn LogSink + Send + Sync>,
    logs: Option<Arc<dyn LogStore + Send + Sync>>,
    metrics: bool,
) -> Router {
    let state = State {
        sink,
        logs,
        timesource: Arc::new(timesource),
        started: Instant::now(),
    };

    let mut router = Router::new()
        // POSTs to read-only paths are still device uploads
        .route("/", get(handlers::index).fallback(handlers::fallback))
        .route(
            "/devicecmd",
            get(handlers::devicecmd_poll).post(handlers::devicecmd_reply),
        )
        .route(
            "/logs",
            get(handlers::logs)
                .delete(handlers::clear_logs)
                .fallback(handlers::fallback),
        )
        .route(
            "/logs/today",
            get(handlers::logs_today).fallback(handlers::fallback),
        )
        .route(
            "/logs/json",
            get(handlers::logs_json).fallback(handlers::fallback),
        );

    for path in handlers::DATA_ENDPOINTS {
        router = router.route(path, post(handlers::cdata));
    }

    let router = router
        .fallback(handlers::fallback)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(track_metrics))
        .with_state(state);

    // Don't install metrics unless asked to
    // Installing a global recorder when used as a library (during tests etc)
    // does not work well.
    if metrics {
        let recorder_handle = setup_metrics_recorder();
        router.route("/metrics", get(move || ready(recorder_handle.render())))
    } else {
        router
    }
}
