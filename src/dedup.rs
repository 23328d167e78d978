use std::collections::HashMap;

use tokio::sync::RwLock;

/// Highest version already applied to the sink, per outbox message ID.
///
/// Lives for the lifetime of one processor and is never persisted; the sink
/// being idempotent by document ID is what keeps redelivery after a restart
/// safe.
#[derive(Debug, Default)]
pub struct DeduplicationTracker {
    applied: RwLock<HashMap<String, i64>>,
}

impl DeduplicationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `version` of message `id` (or a later one) was already applied.
    pub async fn is_duplicate(&self, id: &str, version: i64) -> bool {
        let applied = self.applied.read().await;
        applied.get(id).is_some_and(|&seen| version <= seen)
    }

    /// Records that `version` of message `id` was applied.
    pub async fn record(&self, id: &str, version: i64) {
        let mut applied = self.applied.write().await;
        applied
            .entry(id.to_owned())
            .and_modify(|seen| *seen = (*seen).max(version))
            .or_insert(version);
    }

    pub async fn len(&self) -> usize {
        self.applied.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.applied.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unseen_messages_are_not_duplicates() {
        let tracker = DeduplicationTracker::new();
        assert!(!tracker.is_duplicate("msg-1", 1).await);
        assert!(tracker.is_empty().await);
    }

    #[tokio::test]
    async fn same_or_older_version_is_a_duplicate() {
        let tracker = DeduplicationTracker::new();
        tracker.record("msg-1", 3).await;

        assert!(tracker.is_duplicate("msg-1", 3).await);
        assert!(tracker.is_duplicate("msg-1", 2).await);
        assert!(!tracker.is_duplicate("msg-1", 4).await);
        assert!(!tracker.is_duplicate("msg-2", 1).await);
    }

    #[tokio::test]
    async fn keeps_the_highest_version() {
        let tracker = DeduplicationTracker::new();
        tracker.record("msg-1", 5).await;
        tracker.record("msg-1", 2).await;

        assert!(tracker.is_duplicate("msg-1", 5).await);
        assert_eq!(tracker.len().await, 1);
    }
}
