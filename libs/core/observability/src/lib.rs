//! Metrics for the Atlas services.
//!
//! - Prometheus recorder and `/metrics` handler
//! - Embedding pipeline metrics ([`EmbeddingMetrics`])
//! - Axum middleware for per-request metrics
//!
//! ```rust,ignore
//! use observability::{init_metrics, metrics_handler, EmbeddingMetrics};
//!
//! init_metrics()?;
//! EmbeddingMetrics::record_item("generated");
//!
//! let app = Router::new().route("/metrics", get(metrics_handler));
//! ```

pub mod embeddings;
pub mod middleware;

pub use embeddings::{EmbeddingMetrics, InFlightGuard};
pub use middleware::metrics_middleware;

pub use metrics::{counter, gauge, histogram};

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tracing::info;

static METRICS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the Prometheus recorder once per process.
///
/// Later calls return the handle from the first successful install.
pub fn init_metrics() -> Result<&'static PrometheusHandle, BuildError> {
    METRICS_HANDLE.get_or_try_init(|| {
        let handle = PrometheusBuilder::new().install_recorder()?;

        info!("Prometheus metrics recorder initialized");
        register_metric_descriptions();

        Ok(handle)
    })
}

pub fn get_metrics_handle() -> Option<&'static PrometheusHandle> {
    METRICS_HANDLE.get()
}

/// Axum handler for `/metrics`.
pub async fn metrics_handler() -> String {
    match get_metrics_handle() {
        Some(handle) => handle.render(),
        None => "# Metrics not initialized\n".to_string(),
    }
}

fn register_metric_descriptions() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    // HTTP metrics
    describe_counter!("http_requests_total", "Total number of HTTP requests");
    describe_histogram!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds"
    );
    describe_counter!(
        "http_requests_errors_total",
        "Total number of HTTP request errors"
    );

    // Embedding pipeline
    describe_counter!(
        "photo_embedding_items_total",
        "Photos processed by batch runs, by outcome"
    );
    describe_histogram!(
        "photo_embedding_batch_duration_seconds",
        "Wall time of a batch run by strategy"
    );
    describe_counter!(
        "photo_embedding_batches_total",
        "Batch runs by final status"
    );
    describe_gauge!(
        "photo_embedding_in_flight",
        "Generator calls currently in flight"
    );
    describe_histogram!(
        "photo_embedding_visualization_points",
        "Points returned per visualization request"
    );
}
