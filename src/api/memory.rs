use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

use crate::api::{DocumentStore, RawDoc, SnapshotCallback, Subscription};
use crate::error::{LmsError, LmsResult};

struct CollectionState {
    docs: Vec<RawDoc>,
    feed: watch::Sender<Vec<RawDoc>>,
}

impl CollectionState {
    fn new() -> Self {
        let (feed, _) = watch::channel(Vec::new());
        Self {
            docs: Vec::new(),
            feed,
        }
    }

    fn publish(&self) {
        self.feed.send_replace(self.docs.clone());
    }
}

/// In-process document store with push notifications. Backs offline mode and
/// the tests.
#[derive(Clone, Default)]
pub struct MemoryStore {
    collections: Arc<Mutex<HashMap<String, CollectionState>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CollectionState>> {
        // A panic while holding the lock cannot leave the map half-written.
        self.collections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Live feeds currently attached to `collection`.
    #[cfg(test)]
    pub fn subscriber_count(&self, collection: &str) -> usize {
        self.lock()
            .get(collection)
            .map(|state| state.feed.receiver_count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create(&self, collection: &str, fields: Map<String, Value>) -> LmsResult<RawDoc> {
        let doc = RawDoc {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            fields,
        };

        let mut collections = self.lock();
        let state = collections
            .entry(collection.to_string())
            .or_insert_with(CollectionState::new);
        state.docs.push(doc.clone());
        state.publish();

        Ok(doc)
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> LmsResult<RawDoc> {
        let mut collections = self.lock();
        let state = collections
            .get_mut(collection)
            .ok_or_else(|| LmsError::not_found(collection, id))?;
        let doc = state
            .docs
            .iter_mut()
            .find(|doc| doc.id == id)
            .ok_or_else(|| LmsError::not_found(collection, id))?;

        doc.fields = fields;
        let updated = doc.clone();
        state.publish();

        Ok(updated)
    }

    async fn delete(&self, collection: &str, id: &str) -> LmsResult<()> {
        let mut collections = self.lock();
        if let Some(state) = collections.get_mut(collection) {
            let before = state.docs.len();
            state.docs.retain(|doc| doc.id != id);
            if state.docs.len() != before {
                state.publish();
            }
        }
        Ok(())
    }

    async fn list(&self, collection: &str) -> LmsResult<Vec<RawDoc>> {
        Ok(self
            .lock()
            .get(collection)
            .map(|state| state.docs.clone())
            .unwrap_or_default())
    }

    async fn subscribe(
        &self,
        collection: &str,
        on_change: SnapshotCallback,
    ) -> LmsResult<Subscription> {
        let (initial, mut feed) = {
            let mut collections = self.lock();
            let state = collections
                .entry(collection.to_string())
                .or_insert_with(CollectionState::new);
            (state.docs.clone(), state.feed.subscribe())
        };

        on_change(initial);

        let task = tokio::spawn(async move {
            while feed.changed().await.is_ok() {
                let snapshot = feed.borrow_and_update().clone();
                on_change(snapshot);
            }
        });

        Ok(Subscription::from_task(task))
    }
}
