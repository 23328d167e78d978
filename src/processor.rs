//! The claim → dispatch → retry → retire cycle.
//!
//! Any number of processors may run against the same store. They coordinate
//! only through [`OutboxStore::get_pending_with_lock`]; within one processor a
//! batch is handled sequentially and retry backoff blocks that batch.

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use serde::Serialize;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

use crate::{
    dedup::DeduplicationTracker,
    error::{Error, Result},
    message::{MessageStatus, OutboxMessage, Payload},
    metrics::{MetricsSnapshot, OutboxMetrics},
    sink::{Document, EventAction, SearchSink},
    store::OutboxStore,
};

#[derive(Debug, Clone, bon::Builder)]
pub struct ProcessorConfig {
    /// Most records claimed per cycle.
    #[builder(default = 10)]
    pub batch_size: u32,
    /// Attempts allowed after the first one.
    #[builder(default = 3)]
    pub max_retries: u32,
    /// Backoff unit; attempt `n` waits `retry_delay * n`.
    #[builder(default = Duration::from_secs(1))]
    pub retry_delay: Duration,
    /// Wait between cycles once the backlog is drained.
    #[builder(default = Duration::from_secs(1))]
    pub poll_interval: Duration,
    /// Age after which a claim is considered abandoned.
    #[builder(default = Duration::from_secs(5 * 60))]
    pub orphan_threshold: Duration,
    /// How long processed records are kept.
    #[builder(default = Duration::from_secs(24 * 60 * 60))]
    pub retention: Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ProcessorConfig {
    /// Wait before retry `attempt`, saturating at [`Duration::MAX`].
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.retry_delay
            .checked_mul(attempt)
            .unwrap_or(Duration::MAX)
    }
}

/// Outcome of [`OutboxProcessor::process_message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The sink accepted the record after `retries` failed attempts.
    Applied { retries: u32 },
    /// This version was already applied; the sink was not called.
    Duplicate,
}

/// Summary of one [`OutboxProcessor::process`] cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub unlocked: u64,
    pub claimed: usize,
    pub succeeded: usize,
    pub duplicates: usize,
    /// Duplicates that could not be marked processed. They stay claimed
    /// until the orphan pass releases them.
    pub unmarked: usize,
    pub failed: usize,
    pub cleaned: u64,
}

pub struct OutboxProcessor<S, K> {
    store: S,
    sink: K,
    config: ProcessorConfig,
    processor_id: String,
    metrics: Arc<OutboxMetrics>,
    dedup: DeduplicationTracker,
}

impl<S, K> OutboxProcessor<S, K>
where
    S: OutboxStore,
    K: SearchSink,
{
    pub fn new(store: S, sink: K, config: ProcessorConfig) -> Self {
        Self {
            store,
            sink,
            config,
            processor_id: ulid::Ulid::new().to_string(),
            metrics: Arc::new(OutboxMetrics::new()),
            dedup: DeduplicationTracker::new(),
        }
    }

    /// Reports into `metrics` instead of a collector of its own.
    pub fn with_metrics(mut self, metrics: Arc<OutboxMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Identifier stamped into `locked_by` for this processor's claims.
    pub fn processor_id(&self) -> &str {
        &self.processor_id
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn metrics(&self) -> &Arc<OutboxMetrics> {
        &self.metrics
    }

    pub fn get_metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn reset_metrics(&self) {
        self.metrics.reset();
    }

    fn track<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.metrics.record_error(e.category());
        }
        result
    }

    /// Runs one full cycle: unlock orphans, claim a batch, deliver it and
    /// delete expired processed records.
    ///
    /// Failures of individual records are counted in the report. Only store
    /// errors while unlocking, claiming or cleaning up end the cycle early.
    #[tracing::instrument(skip(self), fields(processor_id = %self.processor_id))]
    pub async fn process(&self) -> Result<BatchReport> {
        let started = Instant::now();
        let mut report = BatchReport::default();

        report.unlocked = self.track(
            self.store
                .unlock_orphaned_messages(self.config.orphan_threshold)
                .await,
        )?;
        if report.unlocked > 0 {
            tracing::warn!(count = report.unlocked, "Released orphaned claims");
        }

        let batch = self.track(
            self.store
                .get_pending_with_lock(self.config.batch_size, &self.processor_id)
                .await,
        )?;
        report.claimed = batch.len();

        for message in &batch {
            if self.dedup.is_duplicate(&message.id, message.version).await {
                match self.retire_duplicate(message).await {
                    Ok(()) => report.duplicates += 1,
                    Err(e) => {
                        report.unmarked += 1;
                        tracing::error!(message_id = %message.id, error = %e, "Failed to retire duplicate message");
                    }
                }
                continue;
            }

            match self.deliver(message).await {
                Ok(_) => report.succeeded += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(message_id = %message.id, error = %e, "Failed to process outbox message");
                }
            }
        }

        // The batch is done whatever cleanup does next.
        self.metrics.record_batch_processed(batch.len());
        self.refresh_queue_metrics().await;

        report.cleaned = self.track(
            self.store
                .cleanup_processed_messages(self.config.retention)
                .await,
        )?;

        if report.claimed > 0 || report.cleaned > 0 {
            tracing::info!(
                claimed = report.claimed,
                succeeded = report.succeeded,
                duplicates = report.duplicates,
                unmarked = report.unmarked,
                failed = report.failed,
                cleaned = report.cleaned,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Processed outbox batch"
            );
        }

        Ok(report)
    }

    // Queue depth is informational; a failed count never fails the cycle.
    async fn refresh_queue_metrics(&self) {
        let pending = self.store.count_by_status(MessageStatus::Pending).await;
        let failed = self.store.count_by_status(MessageStatus::Failed).await;

        match (pending, failed) {
            (Ok(pending), Ok(failed)) => self.metrics.update_queue_metrics(pending, failed),
            (Err(e), _) | (_, Err(e)) => {
                self.metrics.record_error(e.category());
                tracing::warn!(error = %e, "Failed to count queued outbox messages");
            }
        }
    }

    /// Delivers one already-claimed record and retires it.
    ///
    /// A record whose version was already applied by this processor is
    /// marked processed without calling the sink. Otherwise delivery is
    /// attempted up to `max_retries + 1` times with linear backoff, and the
    /// record ends `processed` or `failed`. Returns the last delivery error
    /// when the record fails, or the store error when a duplicate could not
    /// be marked processed.
    pub async fn process_message(&self, message: &OutboxMessage) -> Result<Delivery> {
        if self.dedup.is_duplicate(&message.id, message.version).await {
            self.retire_duplicate(message).await?;
            return Ok(Delivery::Duplicate);
        }

        self.deliver(message).await
    }

    // A record that is already terminal needs no mark.
    async fn retire_duplicate(&self, message: &OutboxMessage) -> Result<()> {
        tracing::debug!(message_id = %message.id, version = message.version, "Skipping duplicate message");
        self.metrics.record_duplicate();

        match self.store.mark_as_processed(&message.id, Utc::now()).await {
            Err(e) if e.is_already_final() => Ok(()),
            result => self.track(result),
        }
    }

    async fn deliver(&self, message: &OutboxMessage) -> Result<Delivery> {
        let started = Instant::now();
        let mut attempt: u32 = 0;

        let error = loop {
            match self.dispatch(message).await {
                Ok(()) => {
                    self.dedup.record(&message.id, message.version).await;
                    match self.store.mark_as_processed(&message.id, Utc::now()).await {
                        Ok(()) => {}
                        Err(e) if e.is_already_final() => {
                            tracing::debug!(message_id = %message.id, error = %e, "Message already retired");
                        }
                        Err(e) => {
                            // Delivered; an unmarked record is redelivered
                            // after its claim expires, which the sink tolerates.
                            self.metrics.record_error(e.category());
                            tracing::error!(message_id = %message.id, error = %e, "Failed to mark message as processed");
                        }
                    }

                    let elapsed = started.elapsed();
                    self.metrics.record_message_processed(elapsed, attempt);
                    tracing::debug!(
                        message_id = %message.id,
                        event_type = %message.event_type,
                        retries = attempt,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Delivered outbox message"
                    );
                    return Ok(Delivery::Applied { retries: attempt });
                }
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    tracing::warn!(message_id = %message.id, attempt = attempt + 1, error = %e, "Delivery attempt failed");
                    attempt += 1;
                    sleep(self.config.backoff(attempt)).await;
                }
                Err(e) => break e,
            }
        };

        let attempts = attempt + 1;
        let summary = format!(
            "failed after {attempts} attempt{}: {error}",
            if attempts == 1 { "" } else { "s" }
        );
        match self.store.mark_as_failed(&message.id, &summary).await {
            Ok(()) => {}
            Err(e) if e.is_already_final() => {
                tracing::warn!(message_id = %message.id, error = %e, "Message retired by another processor");
            }
            Err(e) => {
                self.metrics.record_error(e.category());
                tracing::error!(message_id = %message.id, error = %e, "Failed to mark message as failed");
            }
        }

        self.metrics.record_message_failed(error.category());
        tracing::error!(message_id = %message.id, attempts, error = %error, "Outbox message failed");

        Err(error)
    }

    async fn dispatch(&self, message: &OutboxMessage) -> Result<()> {
        let action = EventAction::parse::<K::Document>(&message.event_type).ok_or_else(|| {
            Error::UnknownEventType {
                event_type: message.event_type.clone(),
            }
        })?;

        match action {
            EventAction::Created => {
                let doc = decode::<K::Document>(&message.payload)?;
                self.sink.create(&doc).await
            }
            EventAction::Updated => {
                let doc = decode::<K::Document>(&message.payload)?;
                self.sink.update(&doc).await
            }
            EventAction::Deleted => {
                let id = message
                    .payload
                    .get("id")
                    .and_then(serde_json::Value::as_str)
                    .ok_or(Error::MissingField { field: "id" })?;
                self.sink.delete(id).await
            }
        }
    }

    /// Calls [`process`](Self::process) until `shutdown` is cancelled.
    ///
    /// A full batch is followed immediately by the next cycle; otherwise the
    /// loop waits `poll_interval`. Cycle errors are logged and the loop goes
    /// on. Cancellation is only observed between cycles.
    pub async fn run(&self, shutdown: CancellationToken) {
        tracing::info!(
            processor_id = %self.processor_id,
            batch_size = self.config.batch_size,
            max_retries = self.config.max_retries,
            "Starting outbox processor"
        );

        while !shutdown.is_cancelled() {
            let drained = match self.process().await {
                Ok(report) => report.claimed < self.config.batch_size as usize,
                Err(e) => {
                    tracing::error!(processor_id = %self.processor_id, error = %e, "Outbox cycle failed");
                    true
                }
            };

            if drained {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = sleep(self.config.poll_interval) => {}
                }
            }
        }

        tracing::info!(processor_id = %self.processor_id, "Outbox processor stopped");
    }
}

fn decode<D: Document>(payload: &Payload) -> Result<D> {
    Ok(serde_json::from_value(serde_json::Value::Object(
        payload.clone(),
    ))?)
}
