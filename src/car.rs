use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    message::{NewOutboxMessage, Payload},
    sink::{Document, EventAction},
};

/// A car as indexed for search.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Car {
    pub id: String,
    pub tenant_id: String,
    pub model: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document for Car {
    const AGGREGATE_TYPE: &'static str = "car";

    fn document_id(&self) -> &str {
        &self.id
    }
}

impl Car {
    pub fn new(tenant_id: impl Into<String>, model: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            tenant_id: tenant_id.into(),
            model: model.into(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn created_event(&self) -> Result<NewOutboxMessage> {
        self.event(EventAction::Created, 1)
    }

    pub fn updated_event(&self, version: i64) -> Result<NewOutboxMessage> {
        self.event(EventAction::Updated, version)
    }

    pub fn deleted_event(&self, version: i64) -> Result<NewOutboxMessage> {
        self.event(EventAction::Deleted, version)
    }

    fn event(&self, action: EventAction, version: i64) -> Result<NewOutboxMessage> {
        let payload = match serde_json::to_value(self)? {
            serde_json::Value::Object(map) => map,
            _ => Payload::new(),
        };

        Ok(NewOutboxMessage::builder()
            .aggregate_type(Self::AGGREGATE_TYPE)
            .aggregate_id(self.id.clone())
            .event_type(action.event_type::<Self>())
            .payload(payload)
            .version(version)
            .build())
    }
}
