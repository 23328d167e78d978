//! Durable outbox table and its claiming primitive.
//!
//! Implementations must guarantee that a claim is exclusive among concurrent
//! callers, and that orphan unlocking and cleanup work from absolute age
//! thresholds rather than anything a caller remembers.

use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;

use crate::{
    error::Result,
    message::{MessageStatus, NewOutboxMessage, OutboxMessage},
};

pub mod sqlite;

pub use sqlite::SqliteOutboxStore;

pub trait OutboxStore: Send + Sync + 'static {
    /// A transaction owned by the business write that appends to the outbox.
    type Tx: Send;

    fn begin(&self) -> BoxFuture<'_, Result<Self::Tx>>;

    /// Appends a record outside of any caller transaction.
    fn create<'a>(&'a self, message: &'a NewOutboxMessage) -> BoxFuture<'a, Result<()>>;

    /// Appends a record inside `tx`, so it commits or rolls back together with
    /// the domain write.
    fn create_in_tx<'a>(
        &'a self,
        tx: &'a mut Self::Tx,
        message: &'a NewOutboxMessage,
    ) -> BoxFuture<'a, Result<()>>;

    fn get<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Option<OutboxMessage>>>;

    /// Pending records in FIFO order, without claiming them.
    fn get_pending(&self, limit: u32) -> BoxFuture<'_, Result<Vec<OutboxMessage>>>;

    /// Claims up to `limit` unclaimed pending records for `processor_id`,
    /// oldest first. Records another caller claimed first are left out.
    fn get_pending_with_lock<'a>(
        &'a self,
        limit: u32,
        processor_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<OutboxMessage>>>;

    fn mark_as_processed<'a>(
        &'a self,
        id: &'a str,
        processed_at: DateTime<Utc>,
    ) -> BoxFuture<'a, Result<()>>;

    fn mark_as_processed_in_tx<'a>(
        &'a self,
        tx: &'a mut Self::Tx,
        id: &'a str,
        processed_at: DateTime<Utc>,
    ) -> BoxFuture<'a, Result<()>>;

    fn mark_as_failed<'a>(
        &'a self,
        id: &'a str,
        error_message: &'a str,
    ) -> BoxFuture<'a, Result<()>>;

    fn mark_as_failed_in_tx<'a>(
        &'a self,
        tx: &'a mut Self::Tx,
        id: &'a str,
        error_message: &'a str,
    ) -> BoxFuture<'a, Result<()>>;

    /// Failed records in FIFO order, for operators to inspect.
    fn get_failed(&self, limit: u32) -> BoxFuture<'_, Result<Vec<OutboxMessage>>>;

    fn count_by_status(&self, status: MessageStatus) -> BoxFuture<'_, Result<u64>>;

    /// Releases every claim taken more than `older_than` ago, whoever holds it.
    fn unlock_orphaned_messages(&self, older_than: Duration) -> BoxFuture<'_, Result<u64>>;

    /// Deletes processed records whose `processed_at` is more than
    /// `older_than` ago.
    fn cleanup_processed_messages(&self, older_than: Duration) -> BoxFuture<'_, Result<u64>>;
}
