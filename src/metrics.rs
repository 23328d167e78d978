//! Lock-free counters summarising outbox throughput.
//!
//! Every field is its own atomic, so messages finishing concurrently never
//! contend on a lock. Readers get a [`MetricsSnapshot`]; nothing here exports
//! anywhere by itself.

use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use serde::Serialize;

use crate::error::ErrorCategory;

const NANOS_PER_MILLI: f64 = 1_000_000.0;

#[derive(Debug)]
pub struct OutboxMetrics {
    messages_processed: AtomicU64,
    messages_succeeded: AtomicU64,
    messages_failed: AtomicU64,
    duplicates_skipped: AtomicU64,

    // Nanoseconds. `min` starts at u64::MAX until the first sample.
    processing_time_total: AtomicU64,
    processing_time_min: AtomicU64,
    processing_time_max: AtomicU64,

    batches_processed: AtomicU64,
    last_batch_size: AtomicU64,

    total_retries: AtomicU64,
    max_retries: AtomicU64,

    database_errors: AtomicU64,
    search_index_errors: AtomicU64,
    serialization_errors: AtomicU64,

    pending_messages: AtomicU64,
    failed_messages: AtomicU64,
}

impl Default for OutboxMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl OutboxMetrics {
    pub fn new() -> Self {
        Self {
            messages_processed: AtomicU64::new(0),
            messages_succeeded: AtomicU64::new(0),
            messages_failed: AtomicU64::new(0),
            duplicates_skipped: AtomicU64::new(0),
            processing_time_total: AtomicU64::new(0),
            processing_time_min: AtomicU64::new(u64::MAX),
            processing_time_max: AtomicU64::new(0),
            batches_processed: AtomicU64::new(0),
            last_batch_size: AtomicU64::new(0),
            total_retries: AtomicU64::new(0),
            max_retries: AtomicU64::new(0),
            database_errors: AtomicU64::new(0),
            search_index_errors: AtomicU64::new(0),
            serialization_errors: AtomicU64::new(0),
            pending_messages: AtomicU64::new(0),
            failed_messages: AtomicU64::new(0),
        }
    }

    /// Records a message the sink accepted after `retries` failed attempts.
    pub fn record_message_processed(&self, elapsed: Duration, retries: u32) {
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
        self.messages_succeeded.fetch_add(1, Ordering::Relaxed);

        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.processing_time_total
            .fetch_add(nanos, Ordering::Relaxed);
        self.processing_time_min.fetch_min(nanos, Ordering::Relaxed);
        self.processing_time_max.fetch_max(nanos, Ordering::Relaxed);

        let retries = u64::from(retries);
        self.total_retries.fetch_add(retries, Ordering::Relaxed);
        self.max_retries.fetch_max(retries, Ordering::Relaxed);
    }

    /// Records a message that ended `failed`.
    pub fn record_message_failed(&self, category: ErrorCategory) {
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
        self.messages_failed.fetch_add(1, Ordering::Relaxed);
        self.record_error(category);
    }

    /// Records an error that did not fail a message, e.g. a failed claim.
    pub fn record_error(&self, category: ErrorCategory) {
        let counter = match category {
            ErrorCategory::Database => &self.database_errors,
            ErrorCategory::SearchIndex => &self.search_index_errors,
            ErrorCategory::Serialization => &self.serialization_errors,
            ErrorCategory::Unknown => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate(&self) {
        self.duplicates_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_batch_processed(&self, batch_size: usize) {
        self.batches_processed.fetch_add(1, Ordering::Relaxed);
        self.last_batch_size
            .store(batch_size as u64, Ordering::Relaxed);
    }

    pub fn update_queue_metrics(&self, pending: u64, failed: u64) {
        self.pending_messages.store(pending, Ordering::Relaxed);
        self.failed_messages.store(failed, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let processed = self.messages_processed.load(Ordering::Relaxed);
        let total = self.processing_time_total.load(Ordering::Relaxed);
        let min = self.processing_time_min.load(Ordering::Relaxed);

        let avg_ms = if processed == 0 {
            0.0
        } else {
            total as f64 / processed as f64 / NANOS_PER_MILLI
        };
        let min_ms = if min == u64::MAX {
            0.0
        } else {
            min as f64 / NANOS_PER_MILLI
        };

        MetricsSnapshot {
            messages_processed_total: processed,
            messages_succeeded_total: self.messages_succeeded.load(Ordering::Relaxed),
            messages_failed_total: self.messages_failed.load(Ordering::Relaxed),
            duplicates_skipped_total: self.duplicates_skipped.load(Ordering::Relaxed),
            processing_time_avg_ms: avg_ms,
            processing_time_min_ms: min_ms,
            processing_time_max_ms: self.processing_time_max.load(Ordering::Relaxed) as f64
                / NANOS_PER_MILLI,
            batches_processed_total: self.batches_processed.load(Ordering::Relaxed),
            last_batch_size: self.last_batch_size.load(Ordering::Relaxed),
            total_retries: self.total_retries.load(Ordering::Relaxed),
            max_retries: self.max_retries.load(Ordering::Relaxed),
            database_errors_total: self.database_errors.load(Ordering::Relaxed),
            search_index_errors_total: self.search_index_errors.load(Ordering::Relaxed),
            serialization_errors_total: self.serialization_errors.load(Ordering::Relaxed),
            pending_messages: self.pending_messages.load(Ordering::Relaxed),
            failed_messages: self.failed_messages.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.messages_processed,
            &self.messages_succeeded,
            &self.messages_failed,
            &self.duplicates_skipped,
            &self.processing_time_total,
            &self.processing_time_max,
            &self.batches_processed,
            &self.last_batch_size,
            &self.total_retries,
            &self.max_retries,
            &self.database_errors,
            &self.search_index_errors,
            &self.serialization_errors,
            &self.pending_messages,
            &self.failed_messages,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.processing_time_min
            .store(u64::MAX, Ordering::Relaxed);
    }
}

/// Point-in-time copy of [`OutboxMetrics`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub messages_processed_total: u64,
    pub messages_succeeded_total: u64,
    pub messages_failed_total: u64,
    pub duplicates_skipped_total: u64,
    pub processing_time_avg_ms: f64,
    pub processing_time_min_ms: f64,
    pub processing_time_max_ms: f64,
    pub batches_processed_total: u64,
    pub last_batch_size: u64,
    pub total_retries: u64,
    pub max_retries: u64,
    pub database_errors_total: u64,
    pub search_index_errors_total: u64,
    pub serialization_errors_total: u64,
    pub pending_messages: u64,
    pub failed_messages: u64,
}

impl MetricsSnapshot {
    /// Flattens the snapshot into `name -> value`.
    pub fn to_map(&self) -> BTreeMap<&'static str, f64> {
        BTreeMap::from([
            ("messages_processed_total", self.messages_processed_total as f64),
            ("messages_succeeded_total", self.messages_succeeded_total as f64),
            ("messages_failed_total", self.messages_failed_total as f64),
            ("duplicates_skipped_total", self.duplicates_skipped_total as f64),
            ("processing_time_avg_ms", self.processing_time_avg_ms),
            ("processing_time_min_ms", self.processing_time_min_ms),
            ("processing_time_max_ms", self.processing_time_max_ms),
            ("batches_processed_total", self.batches_processed_total as f64),
            ("last_batch_size", self.last_batch_size as f64),
            ("total_retries", self.total_retries as f64),
            ("max_retries", self.max_retries as f64),
            ("database_errors_total", self.database_errors_total as f64),
            ("search_index_errors_total", self.search_index_errors_total as f64),
            ("serialization_errors_total", self.serialization_errors_total as f64),
            ("pending_messages", self.pending_messages as f64),
            ("failed_messages", self.failed_messages as f64),
        ])
    }
}
