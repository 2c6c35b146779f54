use axum::extract::State;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// GET /metrics — Prometheus text exposition.
pub async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    handle.render()
}

/// Register descriptions for every metric the server and worker emit.
pub fn describe_metrics() {
    metrics::describe_counter!("scan_requests_total", "Scan requests received");
    metrics::describe_counter!(
        "scan_rate_limited_total",
        "Scan requests rejected by the per-client rate limit"
    );
    metrics::describe_counter!(
        "scan_jobs_enqueued_total",
        "Analysis jobs enqueued, by job type"
    );
    metrics::describe_counter!(
        "scan_jobs_completed_total",
        "Analysis jobs completed, by job type"
    );
    metrics::describe_counter!(
        "scan_jobs_retried_total",
        "Analysis job attempts that failed and were rescheduled"
    );
    metrics::describe_counter!(
        "scan_jobs_failed_total",
        "Analysis jobs that failed permanently"
    );
    metrics::describe_counter!(
        "scan_jobs_deferred_total",
        "Benchmark jobs deferred while sibling analyses were pending"
    );
    metrics::describe_counter!("scan_reports_generated_total", "Reports written");
    metrics::describe_histogram!(
        "scan_job_duration_seconds",
        "Time to run one analysis job"
    );
    metrics::describe_gauge!(
        "scan_queue_depth",
        "Jobs ready, delayed or leased in the queue"
    );
}
