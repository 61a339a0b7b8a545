use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::{LmsError, LmsResult};
use crate::models::{Record, Stored};

/// A schema-less document as the remote store hands it back.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDoc {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub fields: Map<String, Value>,
}

/// Receives the full contents of a collection on every change.
pub type SnapshotCallback = Arc<dyn Fn(Vec<RawDoc>) + Send + Sync>;

/// Handle to a live feed. Released exactly once: by `cancel` or on drop.
pub struct Subscription {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Wrap a background feed task; aborting it releases the feed.
    pub fn from_task(task: tokio::task::JoinHandle<()>) -> Self {
        Self::new(move || task.abort())
    }

    pub fn cancel(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.release.is_some())
            .finish()
    }
}

/// Remote document database, addressed by collection name.
///
/// Writes are single-document and never retried here. There are no
/// cross-collection transactions; concurrent updates to the same document are
/// last-write-wins.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn create(&self, collection: &str, fields: Map<String, Value>) -> LmsResult<RawDoc>;

    /// Full overwrite. `NotFound` if the document is gone.
    async fn update(
        &self,
        collection: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> LmsResult<RawDoc>;

    /// Deleting a missing document succeeds.
    async fn delete(&self, collection: &str, id: &str) -> LmsResult<()>;

    /// The whole collection, no paging exposed to the caller.
    async fn list(&self, collection: &str) -> LmsResult<Vec<RawDoc>>;

    /// The callback fires once with the current snapshot before this returns,
    /// then again after every change until the subscription is released.
    async fn subscribe(&self, collection: &str, on_change: SnapshotCallback)
        -> LmsResult<Subscription>;
}

/// Typed gateway over one collection.
pub struct Collection<T> {
    store: Arc<dyn DocumentStore>,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            _record: PhantomData,
        }
    }
}

impl<T: Record> Collection<T> {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            _record: PhantomData,
        }
    }

    pub async fn create(&self, record: &T) -> LmsResult<String> {
        let doc = self.store.create(T::COLLECTION, encode(record)?).await?;
        log::debug!("{}: created {}", T::COLLECTION, doc.id);
        Ok(doc.id)
    }

    pub async fn update(&self, id: &str, record: &T) -> LmsResult<()> {
        self.store.update(T::COLLECTION, id, encode(record)?).await?;
        log::debug!("{}: updated {}", T::COLLECTION, id);
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> LmsResult<()> {
        self.store.delete(T::COLLECTION, id).await?;
        log::debug!("{}: deleted {}", T::COLLECTION, id);
        Ok(())
    }

    pub async fn list_once(&self) -> LmsResult<Vec<Stored<T>>> {
        let docs = self.store.list(T::COLLECTION).await?;
        Ok(decode_all(docs))
    }

    pub async fn subscribe<F>(&self, on_change: F) -> LmsResult<Subscription>
    where
        F: Fn(Vec<Stored<T>>) + Send + Sync + 'static,
    {
        let callback: SnapshotCallback = Arc::new(move |docs| on_change(decode_all::<T>(docs)));
        self.store.subscribe(T::COLLECTION, callback).await
    }
}

fn encode<T: Record>(record: &T) -> LmsResult<Map<String, Value>> {
    match serde_json::to_value(record) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(other) => Err(LmsError::ValidationRejected(format!(
            "{} did not serialize to a document: {}",
            T::LABEL,
            other
        ))),
        Err(e) => Err(LmsError::ValidationRejected(e.to_string())),
    }
}

/// Documents that do not match the record shape are skipped; the store is
/// schema-less and may hold anything.
fn decode_all<T: Record>(docs: Vec<RawDoc>) -> Vec<Stored<T>> {
    docs.into_iter()
        .filter_map(|doc| {
            match serde_json::from_value::<T>(Value::Object(doc.fields)) {
                Ok(record) => Some(Stored {
                    id: doc.id,
                    created_at: doc.created_at,
                    record,
                }),
                Err(e) => {
                    log::warn!("{}: skipping undecodable document {}: {}", T::COLLECTION, doc.id, e);
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MemoryStore;
    use crate::models::Teacher;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn teacher(name: &str) -> Teacher {
        Teacher {
            name: name.to_string(),
            subject: "Maths".to_string(),
            department: "Science".to_string(),
            email: format!("{}@school.edu", name.to_lowercase()),
            password_hash: String::new(),
        }
    }

    #[test]
    fn test_subscription_releases_exactly_once() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&released);
        let sub = Subscription::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        sub.cancel();
        assert_eq!(released.load(Ordering::SeqCst), 1);

        let counter = Arc::clone(&released);
        {
            let _sub = Subscription::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(released.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_collection_round_trips_through_store() {
        let store = Arc::new(MemoryStore::new());
        let teachers: Collection<Teacher> = Collection::new(store.clone());

        let id = teachers.create(&teacher("Ravi")).await.unwrap();
        let listed = teachers.list_once().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, id);
        assert_eq!(listed[0].record, teacher("Ravi"));
    }

    #[tokio::test]
    async fn test_undecodable_documents_are_skipped() {
        let store = Arc::new(MemoryStore::new());
        let mut junk = Map::new();
        junk.insert("unexpected".to_string(), json!(true));
        store.create("teachers", junk).await.unwrap();

        let teachers: Collection<Teacher> = Collection::new(store.clone());
        teachers.create(&teacher("Mina")).await.unwrap();

        let listed = teachers.list_once().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].record.name, "Mina");
    }
}
