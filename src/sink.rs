//! Downstream search index the outbox is replayed into.
//!
//! A processor targets exactly one sink, and a sink indexes exactly one
//! [`Document`] type. Event tags are derived from the document's aggregate
//! type, so a `Car` sink handles `car_created`, `car_updated` and
//! `car_deleted`.
//!
//! Sinks must be idempotent by document ID: creating or updating resolves to an
//! upsert and deleting an absent document is not an error. The processor's
//! in-memory deduplication is only a shortcut on top of that; it does not
//! survive restarts.

use std::str::FromStr;

use futures_util::future::BoxFuture;
use serde::{de::DeserializeOwned, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::error::Result;

pub mod memory;
pub mod opensearch;

/// An entity that can be rebuilt from an outbox payload and indexed.
pub trait Document: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Aggregate type written by the business side, e.g. `car`.
    const AGGREGATE_TYPE: &'static str;

    fn document_id(&self) -> &str;
}

/// What a record asks the sink to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum EventAction {
    Created,
    Updated,
    Deleted,
}

impl EventAction {
    /// Parses `{aggregate}_{action}` for the given document type.
    pub fn parse<D: Document>(event_type: &str) -> Option<Self> {
        event_type
            .strip_prefix(D::AGGREGATE_TYPE)
            .and_then(|rest| rest.strip_prefix('_'))
            .and_then(|action| Self::from_str(action).ok())
    }

    pub fn event_type<D: Document>(self) -> String {
        format!("{}_{}", D::AGGREGATE_TYPE, self)
    }
}

/// Idempotent write surface of a search index.
pub trait SearchSink: Send + Sync + 'static {
    type Document: Document;

    /// Indexes a new document.
    fn create<'a>(&'a self, doc: &'a Self::Document) -> BoxFuture<'a, Result<()>>;

    /// Replaces an indexed document.
    fn update<'a>(&'a self, doc: &'a Self::Document) -> BoxFuture<'a, Result<()>>;

    /// Removes a document; absent documents are not an error.
    fn delete<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<()>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::car::Car;

    #[test]
    fn parses_actions_for_the_document_type() {
        assert_eq!(
            EventAction::parse::<Car>("car_created"),
            Some(EventAction::Created)
        );
        assert_eq!(
            EventAction::parse::<Car>("car_updated"),
            Some(EventAction::Updated)
        );
        assert_eq!(
            EventAction::parse::<Car>("car_deleted"),
            Some(EventAction::Deleted)
        );
    }

    #[test]
    fn rejects_other_aggregates_and_actions() {
        assert_eq!(EventAction::parse::<Car>("company_created"), None);
        assert_eq!(EventAction::parse::<Car>("car_sold"), None);
        assert_eq!(EventAction::parse::<Car>("carcreated"), None);
        assert_eq!(EventAction::parse::<Car>("car_"), None);
        assert_eq!(EventAction::parse::<Car>(""), None);
    }

    #[test]
    fn formats_event_types() {
        assert_eq!(EventAction::Deleted.event_type::<Car>(), "car_deleted");
    }
}
