//! Outbox records and their lifecycle states.
//!
//! An outbox record is appended by a business write in the same transaction as
//! the domain change it describes. The processor later claims it, replays it
//! against the search index and retires it.
//!
//! # Message Lifecycle
//!
//! 1. Records are created in `Pending` status, unclaimed
//! 2. A processor claims a record by stamping `locked_at` / `locked_by`
//! 3. When successfully replayed, the record moves to `Processed`
//! 4. If every attempt fails, the record moves to `Failed`
//!
//! Both terminal states are final. Failed records stay put until an operator
//! inspects them; processed records are deleted once they age past the
//! retention window.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// The opaque document carried by a record, keyed by field name.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Current status of an outbox record.
///
/// The status transitions follow:
/// `Pending` -> `Processed` (success case)
/// `Pending` -> `Failed`    (retries exhausted)
#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MessageStatus {
    /// Waiting to be replayed, or claimed and currently being replayed
    Pending,
    /// Replayed against the search index
    Processed,
    /// Every delivery attempt failed; needs manual attention
    Failed,
}

/// A record in the outbox table.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct OutboxMessage {
    /// Unique identifier for the record
    pub id: String,
    /// Kind of business entity the event describes, e.g. `car`
    pub aggregate_type: String,
    /// Identifier of that entity
    pub aggregate_id: String,
    /// Tag selecting how the record is replayed, e.g. `car_created`
    pub event_type: String,
    /// Enough data to rebuild the entity for the search index
    pub payload: Payload,

    /// Insertion time; defines FIFO claim order
    pub created_at: DateTime<Utc>,
    /// Set once, when the record is successfully replayed
    pub processed_at: Option<DateTime<Utc>>,

    pub status: MessageStatus,
    /// Attempt count and last error, set when the record fails
    pub error_message: Option<String>,
    /// Monotonic per-ID version, only used for deduplication
    pub version: i64,

    /// When the current claim was taken
    pub locked_at: Option<DateTime<Utc>>,
    /// Processor holding the current claim
    pub locked_by: Option<String>,
}

impl OutboxMessage {
    pub fn is_claimed(&self) -> bool {
        self.locked_at.is_some()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            MessageStatus::Processed | MessageStatus::Failed
        )
    }
}

/// A record about to be appended to the outbox.
#[derive(Debug, Clone, PartialEq, bon::Builder)]
pub struct NewOutboxMessage {
    #[builder(default = ulid::Ulid::new().to_string(), into)]
    pub id: String,
    #[builder(into)]
    pub aggregate_type: String,
    #[builder(into)]
    pub aggregate_id: String,
    #[builder(into)]
    pub event_type: String,
    #[builder(default)]
    pub payload: Payload,
    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default = 1)]
    pub version: i64,
}
