//! SQLite implementation of [`OutboxStore`].
//!
//! Claiming is a single `UPDATE … RETURNING` statement. SQLite serialises
//! writers, so two processors racing for the same rows can never both stamp
//! them: the loser's subquery no longer sees them as unclaimed. Timestamps are
//! stored as Unix milliseconds so that age comparisons stay numeric.

use std::{str::FromStr, time::Duration};

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use sqlx::{
    sqlite::{
        SqliteAutoVacuum, SqliteConnectOptions, SqliteJournalMode, SqliteLockingMode,
        SqlitePoolOptions,
    },
    FromRow, Sqlite, SqliteConnection, SqlitePool, Transaction,
};

use super::OutboxStore;
use crate::{
    config::{Config, IN_MEMORY},
    error::{Error, Result},
    message::{MessageStatus, NewOutboxMessage, OutboxMessage},
};

/// Longest error message kept on a failed record.
pub const MAX_ERROR_MESSAGE_LEN: usize = 1000;

const CLAIM_PENDING: &str = "
    UPDATE outbox
    SET locked_at = $1, locked_by = $2
    WHERE id IN (
        SELECT id FROM outbox
        WHERE status = 'pending' AND locked_at IS NULL
        ORDER BY created_at ASC, seq ASC
        LIMIT $3
    )
    RETURNING *
";

#[derive(Clone)]
pub struct SqliteOutboxStore {
    db: SqlitePool,
}

#[derive(FromRow)]
struct OutboxRow {
    seq: i64,
    id: String,
    aggregate_type: String,
    aggregate_id: String,
    event_type: String,
    payload: String,
    created_at: i64,
    processed_at: Option<i64>,
    status: String,
    error_message: Option<String>,
    version: i64,
    locked_at: Option<i64>,
    locked_by: Option<String>,
}

impl TryFrom<OutboxRow> for OutboxMessage {
    type Error = Error;

    fn try_from(row: OutboxRow) -> Result<Self> {
        let status = MessageStatus::from_str(&row.status).map_err(|_| Error::CorruptRow {
            id: row.id.clone(),
            message: format!("unknown status `{}`", row.status),
        })?;

        Ok(Self {
            payload: serde_json::from_str(&row.payload)?,
            created_at: from_millis(&row.id, row.created_at)?,
            processed_at: row
                .processed_at
                .map(|ms| from_millis(&row.id, ms))
                .transpose()?,
            locked_at: row
                .locked_at
                .map(|ms| from_millis(&row.id, ms))
                .transpose()?,
            status,
            id: row.id,
            aggregate_type: row.aggregate_type,
            aggregate_id: row.aggregate_id,
            event_type: row.event_type,
            error_message: row.error_message,
            version: row.version,
            locked_by: row.locked_by,
        })
    }
}

fn from_millis(id: &str, ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| Error::CorruptRow {
        id: id.to_owned(),
        message: format!("timestamp {ms} out of range"),
    })
}

fn cutoff_millis(older_than: Duration) -> i64 {
    let age = i64::try_from(older_than.as_millis()).unwrap_or(i64::MAX);
    Utc::now().timestamp_millis().saturating_sub(age)
}

fn truncate_error(message: &str) -> String {
    message.chars().take(MAX_ERROR_MESSAGE_LEN).collect()
}

impl SqliteOutboxStore {
    pub async fn connect_with(config: &Config) -> Result<Self> {
        match config.db_path() {
            IN_MEMORY => Self::connect(None).await,
            path => Self::connect(Some(path)).await,
        }
    }

    pub async fn connect_in_memory() -> Result<Self> {
        Self::connect(None).await
    }

    /// Opens (or creates) the database at `path` and runs migrations. With no
    /// path the database lives in memory on a single pooled connection.
    pub async fn connect(path: Option<&str>) -> Result<Self> {
        let opts = match path {
            Some(path) => SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true),
            None => SqliteConnectOptions::new().in_memory(true),
        }
        .journal_mode(SqliteJournalMode::Wal)
        .locking_mode(SqliteLockingMode::Normal)
        .busy_timeout(Duration::from_secs(5))
        .optimize_on_close(true, None)
        .auto_vacuum(SqliteAutoVacuum::Full);

        let pool_opts = match path {
            Some(_) => SqlitePoolOptions::new(),
            // Every new connection would see a fresh, empty database.
            None => SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None),
        };

        let db = pool_opts.connect_with(opts).await?;

        sqlx::migrate!("./migrations").run(&db).await?;

        tracing::debug!(path = path.unwrap_or(":memory:"), "Connected outbox store");

        Ok(Self { db })
    }

    pub fn db(&self) -> &SqlitePool {
        &self.db
    }

    pub async fn insert(db: &mut SqliteConnection, message: &NewOutboxMessage) -> Result<()> {
        let payload = serde_json::to_string(&message.payload)?;

        sqlx::query(
            "
            INSERT INTO outbox (id, aggregate_type, aggregate_id, event_type, payload, created_at, status, version)
            VALUES ($1, $2, $3, $4, $5, $6, 'pending', $7)
            ",
        )
        .bind(&message.id)
        .bind(&message.aggregate_type)
        .bind(&message.aggregate_id)
        .bind(&message.event_type)
        .bind(payload)
        .bind(message.created_at.timestamp_millis())
        .bind(message.version)
        .execute(db)
        .await?;

        Ok(())
    }

    /// Moves a pending record to `processed`. Records that are already
    /// terminal are left untouched and yield [`Error::AlreadyFinal`].
    pub async fn set_processed(
        db: &mut SqliteConnection,
        id: &str,
        processed_at: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query(
            "
            UPDATE outbox
            SET status = 'processed', processed_at = $1, locked_at = NULL, locked_by = NULL
            WHERE id = $2 AND status = 'pending'
            ",
        )
        .bind(processed_at.timestamp_millis())
        .bind(id)
        .execute(&mut *db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Self::unmarked(db, id).await?);
        }
        Ok(())
    }

    /// Moves a pending record to `failed`, with the same guard as
    /// [`set_processed`](Self::set_processed).
    pub async fn set_failed(db: &mut SqliteConnection, id: &str, error_message: &str) -> Result<()> {
        let result = sqlx::query(
            "
            UPDATE outbox
            SET status = 'failed', error_message = $1, locked_at = NULL, locked_by = NULL
            WHERE id = $2 AND status = 'pending'
            ",
        )
        .bind(truncate_error(error_message))
        .bind(id)
        .execute(&mut *db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Self::unmarked(db, id).await?);
        }
        Ok(())
    }

    // Why a terminal mark matched no row.
    async fn unmarked(db: &mut SqliteConnection, id: &str) -> Result<Error> {
        let status: Option<String> = sqlx::query_scalar("SELECT status FROM outbox WHERE id = $1")
            .bind(id)
            .fetch_optional(db)
            .await?;

        Ok(match status {
            Some(status) => Error::AlreadyFinal {
                id: id.to_owned(),
                status,
            },
            None => Error::not_found(id),
        })
    }

    async fn fetch_by_status(&self, status: MessageStatus, limit: u32) -> Result<Vec<OutboxMessage>> {
        let rows: Vec<OutboxRow> = sqlx::query_as(
            "
            SELECT * FROM outbox
            WHERE status = $1
            ORDER BY created_at ASC, seq ASC
            LIMIT $2
            ",
        )
        .bind(status.as_ref())
        .bind(i64::from(limit))
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(OutboxMessage::try_from).collect()
    }

    async fn claim(&self, limit: u32, processor_id: &str) -> Result<Vec<OutboxMessage>> {
        let mut rows: Vec<OutboxRow> = sqlx::query_as(CLAIM_PENDING)
            .bind(Utc::now().timestamp_millis())
            .bind(processor_id)
            .bind(i64::from(limit))
            .fetch_all(&self.db)
            .await?;

        // RETURNING makes no ordering promise.
        rows.sort_by_key(|row| (row.created_at, row.seq));

        let mut claimed = Vec::with_capacity(rows.len());
        for row in rows {
            let id = row.id.clone();
            match OutboxMessage::try_from(row) {
                Ok(message) => claimed.push(message),
                Err(e) => {
                    // An unreadable row would otherwise be reclaimed forever.
                    tracing::error!(message_id = %id, error = %e, "Failing unreadable outbox row");
                    if let Err(mark) = self.fail_unreadable(&id, &e).await {
                        // The rest of the batch is already stamped; hand it
                        // out and leave this row to the orphan pass.
                        tracing::error!(message_id = %id, error = %mark, "Failed to mark unreadable row");
                    }
                }
            }
        }

        Ok(claimed)
    }

    async fn fail_unreadable(&self, id: &str, cause: &Error) -> Result<()> {
        let mut conn = self.db.acquire().await?;
        Self::set_failed(&mut conn, id, &format!("unreadable row: {cause}")).await
    }
}

impl OutboxStore for SqliteOutboxStore {
    type Tx = Transaction<'static, Sqlite>;

    fn begin(&self) -> BoxFuture<'_, Result<Self::Tx>> {
        Box::pin(async move { Ok(self.db.begin().await?) })
    }

    fn create<'a>(&'a self, message: &'a NewOutboxMessage) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut conn = self.db.acquire().await?;
            Self::insert(&mut conn, message).await
        })
    }

    fn create_in_tx<'a>(
        &'a self,
        tx: &'a mut Self::Tx,
        message: &'a NewOutboxMessage,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(Self::insert(tx.as_mut(), message))
    }

    fn get<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Option<OutboxMessage>>> {
        Box::pin(async move {
            let row: Option<OutboxRow> = sqlx::query_as("SELECT * FROM outbox WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.db)
                .await?;

            row.map(OutboxMessage::try_from).transpose()
        })
    }

    fn get_pending(&self, limit: u32) -> BoxFuture<'_, Result<Vec<OutboxMessage>>> {
        Box::pin(self.fetch_by_status(MessageStatus::Pending, limit))
    }

    fn get_pending_with_lock<'a>(
        &'a self,
        limit: u32,
        processor_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<OutboxMessage>>> {
        Box::pin(self.claim(limit, processor_id))
    }

    fn mark_as_processed<'a>(
        &'a self,
        id: &'a str,
        processed_at: DateTime<Utc>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut conn = self.db.acquire().await?;
            Self::set_processed(&mut conn, id, processed_at).await
        })
    }

    fn mark_as_processed_in_tx<'a>(
        &'a self,
        tx: &'a mut Self::Tx,
        id: &'a str,
        processed_at: DateTime<Utc>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(Self::set_processed(tx.as_mut(), id, processed_at))
    }

    fn mark_as_failed<'a>(
        &'a self,
        id: &'a str,
        error_message: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut conn = self.db.acquire().await?;
            Self::set_failed(&mut conn, id, error_message).await
        })
    }

    fn mark_as_failed_in_tx<'a>(
        &'a self,
        tx: &'a mut Self::Tx,
        id: &'a str,
        error_message: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(Self::set_failed(tx.as_mut(), id, error_message))
    }

    fn get_failed(&self, limit: u32) -> BoxFuture<'_, Result<Vec<OutboxMessage>>> {
        Box::pin(self.fetch_by_status(MessageStatus::Failed, limit))
    }

    fn count_by_status(&self, status: MessageStatus) -> BoxFuture<'_, Result<u64>> {
        Box::pin(async move {
            let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM outbox WHERE status = $1")
                .bind(status.as_ref())
                .fetch_one(&self.db)
                .await?;

            Ok(count.max(0) as u64)
        })
    }

    fn unlock_orphaned_messages(&self, older_than: Duration) -> BoxFuture<'_, Result<u64>> {
        Box::pin(async move {
            let result = sqlx::query(
                "
                UPDATE outbox
                SET locked_at = NULL, locked_by = NULL
                WHERE locked_at IS NOT NULL AND locked_at < $1
                ",
            )
            .bind(cutoff_millis(older_than))
            .execute(&self.db)
            .await?;

            Ok(result.rows_affected())
        })
    }

    fn cleanup_processed_messages(&self, older_than: Duration) -> BoxFuture<'_, Result<u64>> {
        Box::pin(async move {
            let result = sqlx::query(
                "
                DELETE FROM outbox
                WHERE status = 'processed' AND processed_at IS NOT NULL AND processed_at < $1
                ",
            )
            .bind(cutoff_millis(older_than))
            .execute(&self.db)
            .await?;

            Ok(result.rows_affected())
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;

    async fn setup() -> SqliteOutboxStore {
        SqliteOutboxStore::connect_in_memory().await.unwrap()
    }

    fn message(n: i64, base: DateTime<Utc>) -> NewOutboxMessage {
        NewOutboxMessage::builder()
            .id(format!("msg-{n:02}"))
            .aggregate_type("car")
            .aggregate_id(format!("car-{n}"))
            .event_type("car_created")
            .created_at(base + TimeDelta::seconds(n))
            .build()
    }

    async fn seed(store: &SqliteOutboxStore, count: i64) -> DateTime<Utc> {
        let base = Utc::now() - TimeDelta::hours(1);
        for n in 0..count {
            store.create(&message(n, base)).await.unwrap();
        }
        base
    }

    async fn backdate(store: &SqliteOutboxStore, column: &str, id: &str, age: TimeDelta) {
        let ms = (Utc::now() - age).timestamp_millis();
        sqlx::query(&format!("UPDATE outbox SET {column} = $1 WHERE id = $2"))
            .bind(ms)
            .bind(id)
            .execute(store.db())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn create_and_get_round_trip_the_payload() {
        let store = setup().await;
        let mut msg = message(1, Utc::now());
        msg.payload
            .insert("model".to_owned(), serde_json::json!("Corolla"));
        store.create(&msg).await.unwrap();

        let stored = store.get(&msg.id).await.unwrap().unwrap();
        assert_eq!(stored.status, MessageStatus::Pending);
        assert_eq!(stored.payload["model"], "Corolla");
        assert_eq!(stored.version, 1);
        assert_eq!(
            stored.created_at.timestamp_millis(),
            msg.created_at.timestamp_millis()
        );
        assert!(!stored.is_claimed());

        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn claims_oldest_first_and_stamps_the_claim() {
        let store = setup().await;
        seed(&store, 15).await;

        let first = store.get_pending_with_lock(10, "proc-a").await.unwrap();
        let ids: Vec<_> = first.iter().map(|m| m.id.clone()).collect();
        let expected: Vec<_> = (0..10).map(|n| format!("msg-{n:02}")).collect();
        assert_eq!(ids, expected);
        assert!(first
            .iter()
            .all(|m| m.locked_by.as_deref() == Some("proc-a") && m.locked_at.is_some()));

        let second = store.get_pending_with_lock(10, "proc-b").await.unwrap();
        let ids: Vec<_> = second.iter().map(|m| m.id.clone()).collect();
        let expected: Vec<_> = (10..15).map(|n| format!("msg-{n:02}")).collect();
        assert_eq!(ids, expected);

        assert!(store
            .get_pending_with_lock(10, "proc-c")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn mark_as_processed_clears_the_claim() {
        let store = setup().await;
        seed(&store, 1).await;
        let claimed = store.get_pending_with_lock(1, "proc-a").await.unwrap();

        let now = Utc::now();
        store.mark_as_processed(&claimed[0].id, now).await.unwrap();

        let stored = store.get(&claimed[0].id).await.unwrap().unwrap();
        assert_eq!(stored.status, MessageStatus::Processed);
        assert_eq!(
            stored.processed_at.map(|t| t.timestamp_millis()),
            Some(now.timestamp_millis())
        );
        assert!(stored.locked_at.is_none());
        assert!(stored.locked_by.is_none());
        assert_eq!(store.count_by_status(MessageStatus::Pending).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn mark_as_failed_truncates_and_lists() {
        let store = setup().await;
        seed(&store, 3).await;

        let long = "x".repeat(MAX_ERROR_MESSAGE_LEN + 50);
        store.mark_as_failed("msg-02", &long).await.unwrap();
        store.mark_as_failed("msg-00", "boom").await.unwrap();

        let failed = store.get_failed(10).await.unwrap();
        let ids: Vec<_> = failed.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["msg-00", "msg-02"]);
        assert_eq!(
            failed[1].error_message.as_ref().unwrap().len(),
            MAX_ERROR_MESSAGE_LEN
        );
        assert_eq!(store.count_by_status(MessageStatus::Failed).await.unwrap(), 2);
        assert_eq!(store.get_failed(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn terminal_marks_on_unknown_ids_are_not_found() {
        let store = setup().await;

        let err = store.mark_as_processed("nope", Utc::now()).await.unwrap_err();
        assert!(matches!(err, Error::MessageNotFound { .. }));

        let err = store.mark_as_failed("nope", "boom").await.unwrap_err();
        assert!(matches!(err, Error::MessageNotFound { .. }));
    }

    #[tokio::test]
    async fn get_pending_does_not_claim() {
        let store = setup().await;
        seed(&store, 4).await;

        let pending = store.get_pending(3).await.unwrap();
        assert_eq!(pending.len(), 3);
        assert_eq!(pending[0].id, "msg-00");
        assert!(pending.iter().all(|m| !m.is_claimed()));

        assert_eq!(
            store.get_pending_with_lock(10, "proc-a").await.unwrap().len(),
            4
        );
    }

    #[tokio::test]
    async fn only_stale_claims_are_unlocked() {
        let store = setup().await;
        seed(&store, 2).await;
        store.get_pending_with_lock(2, "proc-a").await.unwrap();

        backdate(&store, "locked_at", "msg-00", TimeDelta::minutes(10)).await;

        let unlocked = store
            .unlock_orphaned_messages(Duration::from_secs(300))
            .await
            .unwrap();
        assert_eq!(unlocked, 1);

        let orphan = store.get("msg-00").await.unwrap().unwrap();
        assert!(orphan.locked_at.is_none() && orphan.locked_by.is_none());
        let fresh = store.get("msg-01").await.unwrap().unwrap();
        assert_eq!(fresh.locked_by.as_deref(), Some("proc-a"));

        let reclaimed = store.get_pending_with_lock(10, "proc-b").await.unwrap();
        assert_eq!(reclaimed.len(), 1);
        assert_eq!(reclaimed[0].id, "msg-00");
        assert_eq!(reclaimed[0].locked_by.as_deref(), Some("proc-b"));
    }

    #[tokio::test]
    async fn cleanup_only_touches_old_processed_records() {
        let store = setup().await;
        seed(&store, 5).await;

        // msg-00: processed long ago, msg-01: processed just now,
        // msg-02: failed, msg-03 / msg-04: pending.
        store.mark_as_processed("msg-00", Utc::now()).await.unwrap();
        backdate(&store, "processed_at", "msg-00", TimeDelta::hours(25)).await;
        store.mark_as_processed("msg-01", Utc::now()).await.unwrap();
        store.mark_as_failed("msg-02", "boom").await.unwrap();
        backdate(&store, "processed_at", "msg-02", TimeDelta::hours(48)).await;

        let deleted = store
            .cleanup_processed_messages(Duration::from_secs(24 * 60 * 60))
            .await
            .unwrap();
        assert_eq!(deleted, 1);

        assert!(store.get("msg-00").await.unwrap().is_none());
        for id in ["msg-01", "msg-02", "msg-03", "msg-04"] {
            assert!(store.get(id).await.unwrap().is_some(), "{id} was deleted");
        }
    }

    #[tokio::test]
    async fn outbox_append_rolls_back_with_the_business_write() {
        let store = setup().await;
        let base = Utc::now();

        let mut tx = store.begin().await.unwrap();
        store.create_in_tx(&mut tx, &message(1, base)).await.unwrap();
        tx.rollback().await.unwrap();
        assert!(store.get("msg-01").await.unwrap().is_none());

        let mut tx = store.begin().await.unwrap();
        store.create_in_tx(&mut tx, &message(2, base)).await.unwrap();
        store
            .mark_as_failed_in_tx(&mut tx, "msg-02", "rejected upstream")
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let stored = store.get("msg-02").await.unwrap().unwrap();
        assert_eq!(stored.status, MessageStatus::Failed);
    }

    #[tokio::test]
    async fn unreadable_rows_are_failed_instead_of_claimed() {
        let store = setup().await;
        seed(&store, 2).await;
        sqlx::query("UPDATE outbox SET payload = 'not json' WHERE id = 'msg-00'")
            .execute(store.db())
            .await
            .unwrap();

        let claimed = store.get_pending_with_lock(10, "proc-a").await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].id, "msg-01");

        assert_eq!(store.count_by_status(MessageStatus::Failed).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn terminal_marks_never_overwrite_a_terminal_record() {
        let store = setup().await;
        seed(&store, 2).await;

        let processed_at = Utc::now() - TimeDelta::seconds(30);
        store.mark_as_processed("msg-00", processed_at).await.unwrap();

        let err = store.mark_as_failed("msg-00", "late failure").await.unwrap_err();
        assert!(err.is_already_final(), "{err:?}");
        let err = store.mark_as_processed("msg-00", Utc::now()).await.unwrap_err();
        assert!(err.is_already_final(), "{err:?}");

        let stored = store.get("msg-00").await.unwrap().unwrap();
        assert_eq!(stored.status, MessageStatus::Processed);
        assert_eq!(
            stored.processed_at.map(|t| t.timestamp_millis()),
            Some(processed_at.timestamp_millis())
        );
        assert!(stored.error_message.is_none());

        store.mark_as_failed("msg-01", "boom").await.unwrap();
        let err = store.mark_as_processed("msg-01", Utc::now()).await.unwrap_err();
        assert!(matches!(
            err,
            Error::AlreadyFinal { ref status, .. } if status == "failed"
        ));

        let stored = store.get("msg-01").await.unwrap().unwrap();
        assert_eq!(stored.status, MessageStatus::Failed);
        assert!(stored.processed_at.is_none());
        assert_eq!(stored.error_message.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn claim_survives_an_unreadable_row_it_cannot_fail() {
        let store = setup().await;
        seed(&store, 3).await;
        sqlx::query("UPDATE outbox SET payload = 'not json' WHERE id = 'msg-01'")
            .execute(store.db())
            .await
            .unwrap();
        sqlx::query(
            "
            CREATE TRIGGER refuse_failures BEFORE UPDATE OF status ON outbox
            WHEN NEW.status = 'failed'
            BEGIN SELECT RAISE(ABORT, 'failures refused'); END
            ",
        )
        .execute(store.db())
        .await
        .unwrap();

        let claimed = store.get_pending_with_lock(10, "proc-a").await.unwrap();
        let ids: Vec<_> = claimed.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["msg-00", "msg-02"]);

        // Still pending and stamped, so the orphan pass will offer it again.
        let (status, locked_by): (String, Option<String>) =
            sqlx::query_as("SELECT status, locked_by FROM outbox WHERE id = 'msg-01'")
                .fetch_one(store.db())
                .await
                .unwrap();
        assert_eq!(status, "pending");
        assert_eq!(locked_by.as_deref(), Some("proc-a"));
    }
}
