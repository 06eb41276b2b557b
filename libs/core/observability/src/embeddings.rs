//! Embedding pipeline metrics.

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Embedding metrics recorder
pub struct EmbeddingMetrics;

impl EmbeddingMetrics {
    /// Count one finished item; `outcome` is `generated` or `failed`.
    pub fn record_item(outcome: &'static str) {
        counter!("photo_embedding_items_total", "outcome" => outcome).increment(1);
    }

    /// Mark a generator call in flight until the guard drops.
    pub fn track_call() -> InFlightGuard {
        gauge!("photo_embedding_in_flight").increment(1.0);
        InFlightGuard { _private: () }
    }

    /// Record a finished batch run.
    ///
    /// `status` is `completed` or `cancelled`.
    pub fn record_batch(
        strategy: &'static str,
        status: &'static str,
        generated: usize,
        failed: usize,
        elapsed: Duration,
    ) {
        counter!("photo_embedding_batches_total", "status" => status).increment(1);
        histogram!("photo_embedding_batch_duration_seconds", "strategy" => strategy)
            .record(elapsed.as_secs_f64());

        tracing::debug!(
            strategy = strategy,
            status = status,
            generated = generated,
            failed = failed,
            duration_ms = elapsed.as_millis() as u64,
            "Recorded batch metrics"
        );
    }

    /// Points returned by one visualization request.
    pub fn record_visualization(points: usize) {
        histogram!("photo_embedding_visualization_points").record(points as f64);
    }
}

/// Decrements `photo_embedding_in_flight` on drop, including when the owning
/// task is aborted.
#[must_use]
pub struct InFlightGuard {
    _private: (),
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        gauge!("photo_embedding_in_flight").decrement(1.0);
    }
}
