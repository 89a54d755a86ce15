//! Prometheus metrics endpoint and metric descriptions.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use metrics::Unit;
use metrics_exporter_prometheus::PrometheusHandle;

/// Registers help text for the metrics the stock engine emits.
///
/// Must run after the recorder is installed.
pub fn describe() {
    metrics::describe_histogram!(
        "stock_transaction_duration_seconds",
        Unit::Seconds,
        "Time spent processing a stock transaction, by kind"
    );
    metrics::describe_counter!(
        "stock_transactions_committed_total",
        "Stock transactions committed, by kind"
    );
    metrics::describe_counter!(
        "stock_transactions_rejected_total",
        "Stock transactions rejected, by kind and reason"
    );
    metrics::describe_counter!(
        "stock_lock_conflicts_total",
        "Balance lock acquisitions that timed out or conflicted"
    );
}

/// GET /metrics — returns Prometheus-formatted metrics.
pub async fn get(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        handle.render(),
    )
}
