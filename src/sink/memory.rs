//! Map-backed sink, used for dry runs and tests.

use std::{collections::HashMap, marker::PhantomData, sync::Arc};

use futures_util::future::BoxFuture;
use tokio::sync::RwLock;

use super::{Document, SearchSink};
use crate::error::Result;

#[derive(Clone)]
pub struct InMemorySink<D> {
    docs: Arc<RwLock<HashMap<String, serde_json::Value>>>,
    _doc: PhantomData<fn() -> D>,
}

impl<D: Document> InMemorySink<D> {
    pub fn new() -> Self {
        Self {
            docs: Arc::new(RwLock::new(HashMap::new())),
            _doc: PhantomData,
        }
    }

    pub async fn get(&self, id: &str) -> Result<Option<D>> {
        let docs = self.docs.read().await;
        match docs.get(id) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    pub async fn len(&self) -> usize {
        self.docs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.docs.read().await.is_empty()
    }

    async fn upsert(&self, doc: &D) -> Result<()> {
        let value = serde_json::to_value(doc)?;
        self.docs
            .write()
            .await
            .insert(doc.document_id().to_owned(), value);
        Ok(())
    }
}

impl<D: Document> Default for InMemorySink<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Document> SearchSink for InMemorySink<D> {
    type Document = D;

    fn create<'a>(&'a self, doc: &'a D) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.upsert(doc))
    }

    fn update<'a>(&'a self, doc: &'a D) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.upsert(doc))
    }

    fn delete<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.docs.write().await.remove(id);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::car::Car;

    #[tokio::test]
    async fn create_update_delete_are_idempotent() {
        let sink = InMemorySink::<Car>::new();
        let mut car = Car::new("tenant-1", "Corolla", Utc::now());

        sink.create(&car).await.unwrap();
        sink.create(&car).await.unwrap();
        assert_eq!(sink.len().await, 1);

        car.model = "Corolla Hybrid".to_owned();
        sink.update(&car).await.unwrap();
        assert_eq!(sink.get(&car.id).await.unwrap().unwrap().model, "Corolla Hybrid");

        sink.delete(&car.id).await.unwrap();
        sink.delete(&car.id).await.unwrap();
        assert!(sink.is_empty().await);
        assert!(sink.get(&car.id).await.unwrap().is_none());
    }
}
