//! Bounded-concurrency batch generation.
//!
//! A batch drives the generator over a list of photos, persisting each vector
//! as it arrives. At most `concurrency` generate+store units are in flight at
//! any moment. Two strategies share that bound:
//!
//! - [`BatchStrategy::WorkerPool`]: every item is spawned up front and waits on
//!   a semaphore permit, so a slow item never holds back the rest.
//! - [`BatchStrategy::Chunked`]: items run in waves of `concurrency`; the next
//!   wave starts once the whole previous one has settled.
//!
//! Progress is counted by the single driver loop that joins finished items,
//! which keeps the observed counters strictly increasing.

use futures::FutureExt;
use observability::EmbeddingMetrics;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::{self, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use core_config::{ConfigError, FromEnv, env_parse};

use crate::error::{EmbeddingError, EmbeddingResult};
use crate::generator::EmbeddingGenerator;
use crate::models::{DEFAULT_DIMENSION, MAX_DIMENSION};
use crate::repository::EmbeddingStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchStrategy {
    #[default]
    WorkerPool,
    Chunked,
}

impl BatchStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStrategy::WorkerPool => "pool",
            BatchStrategy::Chunked => "chunked",
        }
    }
}

impl FromStr for BatchStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pool" | "worker_pool" => Ok(BatchStrategy::WorkerPool),
            "chunked" | "chunk" => Ok(BatchStrategy::Chunked),
            other => Err(format!("unknown batch strategy '{}', expected pool or chunked", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Used when a request names no dimension
    pub default_dimension: u32,
    /// Upper bound on in-flight generate+store units
    pub concurrency: usize,
    /// Bound on a single generator call
    pub item_timeout: Duration,
    pub strategy: BatchStrategy,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            default_dimension: DEFAULT_DIMENSION,
            concurrency: 5,
            item_timeout: Duration::from_secs(60),
            strategy: BatchStrategy::WorkerPool,
        }
    }
}

impl FromEnv for BatchConfig {
    /// - EMBEDDING_DEFAULT_DIMENSION: defaults to 512
    /// - EMBEDDING_CONCURRENCY: defaults to 5, must be at least 1
    /// - EMBEDDING_ITEM_TIMEOUT_SECS: defaults to 60
    /// - EMBEDDING_BATCH_STRATEGY: `pool` (default) or `chunked`
    fn from_env() -> Result<Self, ConfigError> {
        let default_dimension = env_parse("EMBEDDING_DEFAULT_DIMENSION", DEFAULT_DIMENSION)?;
        if !(1..=MAX_DIMENSION).contains(&default_dimension) {
            return Err(ConfigError::InvalidValue {
                key: "EMBEDDING_DEFAULT_DIMENSION".to_string(),
                details: format!("must be between 1 and {}", MAX_DIMENSION),
            });
        }

        let concurrency = env_parse("EMBEDDING_CONCURRENCY", 5usize)?;
        if concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                key: "EMBEDDING_CONCURRENCY".to_string(),
                details: "must be at least 1".to_string(),
            });
        }

        let timeout_secs = env_parse("EMBEDDING_ITEM_TIMEOUT_SECS", 60u64)?;
        let strategy = env_parse("EMBEDDING_BATCH_STRATEGY", BatchStrategy::WorkerPool)?;

        Ok(Self {
            default_dimension,
            concurrency,
            item_timeout: Duration::from_secs(timeout_secs),
            strategy,
        })
    }
}

/// One photo to embed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    pub photo_id: Uuid,
    pub image_ref: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BatchStart {
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BatchProgress {
    pub processed: usize,
    pub total: usize,
    pub generated: usize,
    pub failed: usize,
    /// `processed / total` as a rounded percentage
    pub percent: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BatchComplete {
    pub generated: usize,
    pub failed: usize,
    pub total: usize,
}

/// Streamed in order: one `Start`, one `Progress` per settled item, one `Complete`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchEvent {
    Start(BatchStart),
    Progress(BatchProgress),
    Complete(BatchComplete),
}

impl BatchEvent {
    /// Event name on the wire
    pub fn name(&self) -> &'static str {
        match self {
            BatchEvent::Start(_) => "start",
            BatchEvent::Progress(_) => "progress",
            BatchEvent::Complete(_) => "complete",
        }
    }

    /// JSON payload on the wire
    pub fn payload(&self) -> EmbeddingResult<String> {
        let json = match self {
            BatchEvent::Start(start) => serde_json::to_string(start)?,
            BatchEvent::Progress(progress) => serde_json::to_string(progress)?,
            BatchEvent::Complete(complete) => serde_json::to_string(complete)?,
        };
        Ok(json)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BatchSummary {
    pub generated: usize,
    pub failed: usize,
    pub failed_ids: Vec<Uuid>,
    pub total: usize,
    /// The run stopped before every item settled
    pub cancelled: bool,
}

#[derive(Debug, Default)]
struct Tally {
    processed: usize,
    generated: usize,
    failed: usize,
    failed_ids: Vec<Uuid>,
}

/// Shared counters for one batch run.
#[derive(Debug)]
pub struct ProgressCounter {
    total: usize,
    tally: Mutex<Tally>,
}

impl ProgressCounter {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            tally: Mutex::new(Tally::default()),
        }
    }

    /// Count one settled item and return the snapshot after it.
    pub fn record(&self, photo_id: Uuid, succeeded: bool) -> BatchProgress {
        let mut tally = self.tally.lock().unwrap_or_else(|e| e.into_inner());
        tally.processed += 1;
        if succeeded {
            tally.generated += 1;
        } else {
            tally.failed += 1;
            tally.failed_ids.push(photo_id);
        }

        BatchProgress {
            processed: tally.processed,
            total: self.total,
            generated: tally.generated,
            failed: tally.failed,
            percent: percent(tally.processed, self.total),
        }
    }

    pub fn summary(&self, cancelled: bool) -> BatchSummary {
        let tally = self.tally.lock().unwrap_or_else(|e| e.into_inner());
        BatchSummary {
            generated: tally.generated,
            failed: tally.failed,
            failed_ids: tally.failed_ids.clone(),
            total: self.total,
            cancelled,
        }
    }
}

fn percent(processed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((processed as f64 / total as f64) * 100.0).round().min(100.0) as u8
}

/// Optional event channel. A closed receiver counts as a cancelled consumer.
struct EventSink {
    tx: Option<mpsc::Sender<BatchEvent>>,
}

impl EventSink {
    /// Returns false once the consumer has gone away.
    async fn send(&mut self, event: BatchEvent) -> bool {
        let Some(tx) = &self.tx else {
            return true;
        };
        if tx.send(event).await.is_err() {
            self.tx = None;
            return false;
        }
        true
    }

    fn is_attached(&self) -> bool {
        self.tx.is_some()
    }
}

struct ItemOutcome {
    photo_id: Uuid,
    result: EmbeddingResult<()>,
}

/// Spawned item tasks, each mapped back to its photo so a task that dies
/// without an outcome is still counted.
struct ItemTasks {
    set: JoinSet<ItemOutcome>,
    photos: HashMap<task::Id, Uuid>,
}

impl ItemTasks {
    fn new() -> Self {
        Self {
            set: JoinSet::new(),
            photos: HashMap::new(),
        }
    }

    fn spawn<F>(&mut self, photo_id: Uuid, unit: F)
    where
        F: Future<Output = ItemOutcome> + Send + 'static,
    {
        let handle = self.set.spawn(unit);
        self.photos.insert(handle.id(), photo_id);
    }
}

/// Runs batches against one generator and store.
pub struct BatchOrchestrator {
    store: Arc<dyn EmbeddingStore>,
    generator: Arc<dyn EmbeddingGenerator>,
    config: BatchConfig,
}

impl BatchOrchestrator {
    pub fn new(
        store: Arc<dyn EmbeddingStore>,
        generator: Arc<dyn EmbeddingGenerator>,
        config: BatchConfig,
    ) -> Self {
        Self {
            store,
            generator,
            config,
        }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Embed and store every item for `user_id`.
    ///
    /// Per-item failures are counted, never returned. With `events` attached
    /// the run emits `Start`, a `Progress` per settled item, then `Complete`.
    /// Cancelling `cancel`, or dropping the event receiver, aborts in-flight
    /// work and returns the partial summary with `cancelled` set and no
    /// `Complete` event.
    pub async fn run(
        &self,
        user_id: Uuid,
        items: Vec<BatchItem>,
        dimension: u32,
        events: Option<mpsc::Sender<BatchEvent>>,
        cancel: CancellationToken,
    ) -> BatchSummary {
        let started = Instant::now();
        let total = items.len();
        let strategy = self.config.strategy;
        let concurrency = self.config.concurrency.max(1);
        let counter = ProgressCounter::new(total);
        let mut sink = EventSink { tx: events };

        info!(
            user_id = %user_id,
            total,
            dimension,
            concurrency,
            strategy = strategy.as_str(),
            "Starting embedding batch"
        );

        if !sink.send(BatchEvent::Start(BatchStart { total })).await {
            cancel.cancel();
        }

        let permits = Arc::new(Semaphore::new(concurrency));
        let mut cancelled = cancel.is_cancelled();

        if !cancelled {
            match strategy {
                BatchStrategy::WorkerPool => {
                    let mut tasks = ItemTasks::new();
                    for item in items {
                        self.spawn_item(&mut tasks, user_id, item, dimension, &permits);
                    }
                    cancelled = drain(&mut tasks, &counter, &mut sink, &cancel).await;
                }
                BatchStrategy::Chunked => {
                    for chunk in items.chunks(concurrency) {
                        let mut tasks = ItemTasks::new();
                        for item in chunk {
                            self.spawn_item(&mut tasks, user_id, item.clone(), dimension, &permits);
                        }
                        if drain(&mut tasks, &counter, &mut sink, &cancel).await {
                            cancelled = true;
                            break;
                        }
                    }
                }
            }
        }

        let summary = counter.summary(cancelled);

        if !cancelled {
            let complete = BatchComplete {
                generated: summary.generated,
                failed: summary.failed,
                total,
            };
            sink.send(BatchEvent::Complete(complete)).await;
        }

        let status = if cancelled { "cancelled" } else { "completed" };
        EmbeddingMetrics::record_batch(
            strategy.as_str(),
            status,
            summary.generated,
            summary.failed,
            started.elapsed(),
        );
        info!(
            user_id = %user_id,
            generated = summary.generated,
            failed = summary.failed,
            total,
            cancelled,
            streaming = sink.is_attached(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Embedding batch finished"
        );

        summary
    }

    fn spawn_item(
        &self,
        tasks: &mut ItemTasks,
        user_id: Uuid,
        item: BatchItem,
        dimension: u32,
        permits: &Arc<Semaphore>,
    ) {
        let store = Arc::clone(&self.store);
        let generator = Arc::clone(&self.generator);
        let permits = Arc::clone(permits);
        let timeout = self.config.item_timeout;

        let photo_id = item.photo_id;
        tasks.spawn(photo_id, async move {
            let unit = process_item(store, generator, permits, user_id, item, dimension, timeout);
            let result = AssertUnwindSafe(unit)
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(EmbeddingError::Internal("embedding task panicked".into())));
            ItemOutcome { photo_id, result }
        });
    }
}

/// Generate, validate and store one embedding while holding a permit.
async fn process_item(
    store: Arc<dyn EmbeddingStore>,
    generator: Arc<dyn EmbeddingGenerator>,
    permits: Arc<Semaphore>,
    user_id: Uuid,
    item: BatchItem,
    dimension: u32,
    timeout: Duration,
) -> EmbeddingResult<()> {
    let _permit = permits
        .acquire_owned()
        .await
        .map_err(|_| EmbeddingError::Cancelled)?;

    let vector = {
        let _in_flight = EmbeddingMetrics::track_call();
        tokio::time::timeout(timeout, generator.generate(&item.image_ref, dimension))
            .await
            .map_err(|_| EmbeddingError::Timeout(timeout))??
    };

    if vector.len() != dimension as usize {
        return Err(EmbeddingError::MalformedVector {
            expected: dimension as usize,
            actual: vector.len(),
        });
    }
    if let Some(index) = vector.iter().position(|v| !v.is_finite()) {
        return Err(EmbeddingError::NonFiniteVector { index });
    }

    store.upsert(item.photo_id, user_id, vector, dimension).await
}

/// Join every task in `set`, counting and reporting each outcome.
///
/// Returns true when the run was cancelled; remaining tasks are aborted.
async fn drain(
    tasks: &mut ItemTasks,
    counter: &ProgressCounter,
    sink: &mut EventSink,
    cancel: &CancellationToken,
) -> bool {
    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                tasks.set.abort_all();
                while tasks.set.join_next().await.is_some() {}
                return true;
            }
            joined = tasks.set.join_next_with_id() => {
                let (photo_id, result) = match joined {
                    None => return false,
                    Some(Ok((id, outcome))) => {
                        tasks.photos.remove(&id);
                        (outcome.photo_id, outcome.result)
                    }
                    Some(Err(e)) => match tasks.photos.remove(&e.id()) {
                        Some(photo_id) => (
                            photo_id,
                            Err(EmbeddingError::Internal(format!("embedding task failed: {}", e))),
                        ),
                        None => {
                            warn!(error = %e, "Untracked embedding task ended without an outcome");
                            continue;
                        }
                    },
                };

                let succeeded = result.is_ok();
                if let Err(e) = &result {
                    warn!(photo_id = %photo_id, error = %e, "Embedding failed");
                }
                EmbeddingMetrics::record_item(if succeeded { "generated" } else { "failed" });

                let progress = counter.record(photo_id, succeeded);
                if !sink.send(BatchEvent::Progress(progress)).await {
                    cancel.cancel();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::MockEmbeddingGenerator;
    use crate::memory::InMemoryEmbeddingStore;

    fn items(n: usize) -> Vec<BatchItem> {
        (0..n)
            .map(|i| BatchItem {
                photo_id: Uuid::new_v4(),
                image_ref: format!("img-{}", i),
            })
            .collect()
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("pool".parse::<BatchStrategy>().unwrap(), BatchStrategy::WorkerPool);
        assert_eq!("CHUNKED".parse::<BatchStrategy>().unwrap(), BatchStrategy::Chunked);
        assert!("fifo".parse::<BatchStrategy>().is_err());
    }

    #[test]
    fn test_config_from_env_defaults() {
        temp_env::with_vars(
            [
                ("EMBEDDING_DEFAULT_DIMENSION", None::<&str>),
                ("EMBEDDING_CONCURRENCY", None),
                ("EMBEDDING_ITEM_TIMEOUT_SECS", None),
                ("EMBEDDING_BATCH_STRATEGY", None),
            ],
            || {
                let config = BatchConfig::from_env().unwrap();
                assert_eq!(config.default_dimension, 512);
                assert_eq!(config.concurrency, 5);
                assert_eq!(config.item_timeout, Duration::from_secs(60));
                assert_eq!(config.strategy, BatchStrategy::WorkerPool);
            },
        );
    }

    #[test]
    fn test_config_rejects_zero_concurrency() {
        temp_env::with_var("EMBEDDING_CONCURRENCY", Some("0"), || {
            let err = BatchConfig::from_env().unwrap_err();
            assert!(err.to_string().contains("EMBEDDING_CONCURRENCY"));
        });
    }

    #[test]
    fn test_config_rejects_unknown_strategy() {
        temp_env::with_var("EMBEDDING_BATCH_STRATEGY", Some("random"), || {
            assert!(BatchConfig::from_env().is_err());
        });
    }

    #[test]
    fn test_counter_tracks_failures() {
        let counter = ProgressCounter::new(3);
        let bad = Uuid::new_v4();

        counter.record(Uuid::new_v4(), true);
        let progress = counter.record(bad, false);
        assert_eq!(progress.processed, 2);
        assert_eq!(progress.percent, 67);

        let summary = counter.summary(false);
        assert_eq!(summary.generated, 1);
        assert_eq!(summary.failed_ids, vec![bad]);
    }

    #[test]
    fn test_event_wire_format() {
        let event = BatchEvent::Progress(BatchProgress {
            processed: 1,
            total: 2,
            generated: 1,
            failed: 0,
            percent: 50,
        });
        assert_eq!(event.name(), "progress");
        let json: serde_json::Value = serde_json::from_str(&event.payload().unwrap()).unwrap();
        assert_eq!(json["percent"], 50);
    }

    #[tokio::test]
    async fn test_wrong_length_vector_is_item_failure() {
        let mut generator = MockEmbeddingGenerator::new();
        generator
            .expect_generate()
            .returning(|_, _| Ok(vec![0.0; 3]));

        let store = Arc::new(InMemoryEmbeddingStore::new());
        let orchestrator =
            BatchOrchestrator::new(store.clone(), Arc::new(generator), BatchConfig::default());

        let batch = items(2);
        let summary = orchestrator
            .run(Uuid::new_v4(), batch.clone(), 4, None, CancellationToken::new())
            .await;

        assert_eq!(summary.generated, 0);
        assert_eq!(summary.failed, 2);
        assert!(batch.iter().all(|i| summary.failed_ids.contains(&i.photo_id)));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_non_finite_vector_is_item_failure() {
        let mut generator = MockEmbeddingGenerator::new();
        generator.expect_generate().returning(|image_ref, dimension| {
            let mut vector = vec![0.5; dimension as usize];
            match image_ref {
                "img-1" => vector[2] = f32::NAN,
                "img-2" => vector[0] = f32::INFINITY,
                _ => {}
            }
            Ok(vector)
        });

        let store = Arc::new(InMemoryEmbeddingStore::new());
        let orchestrator =
            BatchOrchestrator::new(store.clone(), Arc::new(generator), BatchConfig::default());

        let batch = items(3);
        let summary = orchestrator
            .run(Uuid::new_v4(), batch.clone(), 4, None, CancellationToken::new())
            .await;

        assert_eq!(summary.generated, 1);
        assert_eq!(summary.failed, 2);
        assert!(summary.failed_ids.contains(&batch[1].photo_id));
        assert!(summary.failed_ids.contains(&batch[2].photo_id));
        assert_eq!(store.len().await, 1);
    }

    async fn dying_task() -> ItemOutcome {
        panic!("embedding worker died")
    }

    #[tokio::test]
    async fn test_task_without_outcome_counts_as_failure() {
        let lost = Uuid::new_v4();
        let kept = Uuid::new_v4();
        let mut tasks = ItemTasks::new();
        tasks.spawn(lost, dying_task());
        tasks.spawn(kept, async move {
            ItemOutcome {
                photo_id: kept,
                result: Ok(()),
            }
        });

        let counter = ProgressCounter::new(2);
        let (tx, mut rx) = mpsc::channel(4);
        let mut sink = EventSink { tx: Some(tx) };

        let cancelled = drain(&mut tasks, &counter, &mut sink, &CancellationToken::new()).await;
        drop(sink);

        assert!(!cancelled);
        let summary = counter.summary(cancelled);
        assert_eq!(summary.generated, 1);
        assert_eq!(summary.failed_ids, vec![lost]);
        assert!(tasks.photos.is_empty());

        let mut last = None;
        while let Some(BatchEvent::Progress(progress)) = rx.recv().await {
            last = Some(progress);
        }
        let last = last.unwrap();
        assert_eq!(last.processed, 2);
        assert_eq!(last.percent, 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_generator_times_out() {
        struct Stalled;

        #[async_trait::async_trait]
        impl EmbeddingGenerator for Stalled {
            async fn generate(&self, _: &str, _: u32) -> EmbeddingResult<Vec<f32>> {
                std::future::pending().await
            }
        }

        let config = BatchConfig {
            item_timeout: Duration::from_secs(1),
            ..Default::default()
        };
        let orchestrator =
            BatchOrchestrator::new(Arc::new(InMemoryEmbeddingStore::new()), Arc::new(Stalled), config);

        let summary = orchestrator
            .run(Uuid::new_v4(), items(3), 4, None, CancellationToken::new())
            .await;
        assert_eq!(summary.failed, 3);
        assert!(!summary.cancelled);
    }

    #[tokio::test]
    async fn test_empty_batch_emits_start_and_complete() {
        let orchestrator = BatchOrchestrator::new(
            Arc::new(InMemoryEmbeddingStore::new()),
            Arc::new(MockEmbeddingGenerator::new()),
            BatchConfig::default(),
        );
        let (tx, mut rx) = mpsc::channel(8);

        let summary = orchestrator
            .run(Uuid::new_v4(), vec![], 4, Some(tx), CancellationToken::new())
            .await;
        assert_eq!(summary, BatchSummary::default());

        assert_eq!(rx.recv().await, Some(BatchEvent::Start(BatchStart { total: 0 })));
        assert_eq!(
            rx.recv().await,
            Some(BatchEvent::Complete(BatchComplete {
                generated: 0,
                failed: 0,
                total: 0
            }))
        );
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_precancelled_run_does_nothing() {
        let orchestrator = BatchOrchestrator::new(
            Arc::new(InMemoryEmbeddingStore::new()),
            Arc::new(MockEmbeddingGenerator::new()),
            BatchConfig::default(),
        );
        let token = CancellationToken::new();
        token.cancel();

        let summary = orchestrator
            .run(Uuid::new_v4(), items(4), 4, None, token)
            .await;
        assert!(summary.cancelled);
        assert_eq!(summary.generated + summary.failed, 0);
        assert_eq!(summary.total, 4);
    }
}
