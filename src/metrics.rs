//! Prometheus metrics for the recorder
//!
//! Registered in the default registry and served as text on `/metrics`
//! when a metrics address is configured.

use std::convert::Infallible;
use std::net::SocketAddr;

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, register_int_counter,
    CounterVec, Encoder, Gauge, HistogramVec, IntCounter, TextEncoder,
};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

lazy_static! {
    // ─────────────────────────────────────────────────────────────────────────────
    // Event Pipeline
    // ─────────────────────────────────────────────────────────────────────────────

    /// Ring buffer events handled by the pipeline.
    ///
    /// Labels:
    /// - outcome: recorded, no_container, search_timeout, search_failed,
    ///   not_annotated, malformed
    pub static ref EVENTS_TOTAL: CounterVec = register_counter_vec!(
        "bpf_recorder_events_total",
        "New-process events handled by the recorder, by outcome",
        &["outcome"]
    ).expect("failed to register EVENTS_TOTAL metric");

    /// Profiles whose syscalls have been handed out.
    pub static ref PROFILES_EXTRACTED: IntCounter = register_int_counter!(
        "bpf_recorder_profiles_extracted_total",
        "Profiles whose recorded syscalls were returned to a caller"
    ).expect("failed to register PROFILES_EXTRACTED metric");

    // ─────────────────────────────────────────────────────────────────────────────
    // Session
    // ─────────────────────────────────────────────────────────────────────────────

    /// Outstanding recording sessions.
    pub static ref SESSIONS: Gauge = register_gauge!(
        "bpf_recorder_sessions",
        "Number of outstanding start requests"
    ).expect("failed to register SESSIONS metric");

    /// Whether the kernel program is loaded (1) or not (0).
    pub static ref PROGRAM_LOADED: Gauge = register_gauge!(
        "bpf_recorder_program_loaded",
        "Whether the recorder program is loaded (1) or not (0)"
    ).expect("failed to register PROGRAM_LOADED metric");

    // ─────────────────────────────────────────────────────────────────────────────
    // API
    // ─────────────────────────────────────────────────────────────────────────────

    /// gRPC request latency.
    ///
    /// Labels:
    /// - method: start, stop, syscalls_for_profile
    /// - code: ok or the gRPC status code name
    pub static ref GRPC_REQUEST_DURATION: HistogramVec = register_histogram_vec!(
        "bpf_recorder_grpc_request_duration_seconds",
        "Latency of recorder API calls",
        &["method", "code"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]
    ).expect("failed to register GRPC_REQUEST_DURATION metric");
}

/// Pipeline event outcomes.
pub mod outcome {
    pub const RECORDED: &str = "recorded";
    pub const NO_CONTAINER: &str = "no_container";
    pub const SEARCH_TIMEOUT: &str = "search_timeout";
    pub const SEARCH_FAILED: &str = "search_failed";
    pub const NOT_ANNOTATED: &str = "not_annotated";
    pub const MALFORMED: &str = "malformed";
}

/// Count one pipeline event.
pub fn record_event(outcome: &str) {
    EVENTS_TOTAL.with_label_values(&[outcome]).inc();
}

/// Publish the session state.
pub fn set_session(count: u64, loaded: bool) {
    SESSIONS.set(count as f64);
    PROGRAM_LOADED.set(if loaded { 1.0 } else { 0.0 });
}

/// Initialize metrics with default values.
///
/// Called during startup to ensure metrics exist in the registry.
pub fn init() {
    set_session(0, false);
    for outcome in [
        outcome::RECORDED,
        outcome::NO_CONTAINER,
        outcome::SEARCH_TIMEOUT,
        outcome::SEARCH_FAILED,
        outcome::NOT_ANNOTATED,
        outcome::MALFORMED,
    ] {
        EVENTS_TOTAL.with_label_values(&[outcome]);
    }
}

/// Text exposition of every registered metric.
pub fn gather_text() -> Vec<u8> {
    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&prometheus::gather(), &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
    }
    buffer
}

async fn handle(req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    let response = if req.uri().path() == "/metrics" {
        Response::builder()
            .header("Content-Type", TextEncoder::new().format_type())
            .body(Full::new(Bytes::from(gather_text())))
    } else {
        Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::new()))
    };
    Ok(response.unwrap_or_else(|_| Response::new(Full::new(Bytes::new()))))
}

/// Serve `/metrics` on `addr` until the task is dropped.
pub async fn serve_metrics(addr: SocketAddr) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Serving metrics");

    loop {
        let (stream, peer) = listener.accept().await?;
        tokio::spawn(async move {
            if let Err(e) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service_fn(handle))
                .await
            {
                debug!(%peer, error = %e, "Metrics connection closed with error");
            }
        });
    }
}
