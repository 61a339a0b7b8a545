//! Store doubles for the sync tests.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::api::{DocumentStore, MemoryStore, RawDoc, SnapshotCallback, Subscription};
use crate::error::{LmsError, LmsResult};

/// A `MemoryStore` that counts calls and can be told to fail.
#[derive(Default)]
pub struct ScriptedStore {
    pub inner: MemoryStore,
    pub creates: AtomicUsize,
    pub updates: AtomicUsize,
    pub deletes: AtomicUsize,
    pub lists: AtomicUsize,
    /// Returned by the next write instead of touching `inner`.
    pub fail_next_write: Mutex<Option<LmsError>>,
    pub refuse_subscribe: bool,
    pub reverse_listing: bool,
}

impl ScriptedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn without_live_feed() -> Self {
        Self {
            refuse_subscribe: true,
            ..Self::default()
        }
    }

    pub fn fail_next_write(&self, err: LmsError) {
        *self.fail_next_write.lock().unwrap() = Some(err);
    }

    pub fn writes(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
            + self.updates.load(Ordering::SeqCst)
            + self.deletes.load(Ordering::SeqCst)
    }

    fn scripted_failure(&self) -> LmsResult<()> {
        match self.fail_next_write.lock().unwrap().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DocumentStore for ScriptedStore {
    async fn create(&self, collection: &str, fields: Map<String, Value>) -> LmsResult<RawDoc> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.scripted_failure()?;
        self.inner.create(collection, fields).await
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        fields: Map<String, Value>,
    ) -> LmsResult<RawDoc> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.scripted_failure()?;
        self.inner.update(collection, id, fields).await
    }

    async fn delete(&self, collection: &str, id: &str) -> LmsResult<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.scripted_failure()?;
        self.inner.delete(collection, id).await
    }

    async fn list(&self, collection: &str) -> LmsResult<Vec<RawDoc>> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        let mut docs = self.inner.list(collection).await?;
        if self.reverse_listing {
            docs.reverse();
        }
        Ok(docs)
    }

    async fn subscribe(
        &self,
        collection: &str,
        on_change: SnapshotCallback,
    ) -> LmsResult<Subscription> {
        if self.refuse_subscribe {
            return Err(LmsError::BackendUnavailable("live feed refused".to_string()));
        }
        self.inner.subscribe(collection, on_change).await
    }
}
