use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::api::{Collection, Subscription};
use crate::config::SyncMode;
use crate::error::LmsResult;
use crate::models::{Record, Stored};

type Rows<T> = Mutex<Vec<Stored<T>>>;

fn lock<T>(rows: &Rows<T>) -> MutexGuard<'_, Vec<Stored<T>>> {
    rows.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Replace the whole list with a snapshot, ordered by creation time with the
/// id breaking ties. The store itself promises no order.
fn replace<T>(rows: &Rows<T>, mut snapshot: Vec<Stored<T>>) {
    snapshot.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
    *lock(rows) = snapshot;
}

/// Keeps a local copy of one collection in step with the store.
///
/// In `Subscribe` mode the live feed replaces the rows on every change. When
/// the feed cannot be opened, or in `Pull` mode, the rows are re-listed on
/// attach and after every mutation.
pub struct ListReconciler<T: Record> {
    collection: Collection<T>,
    mode: SyncMode,
    rows: Arc<Rows<T>>,
    subscription: Option<Subscription>,
}

impl<T: Record> ListReconciler<T> {
    pub fn new(collection: Collection<T>, mode: SyncMode) -> Self {
        Self {
            collection,
            mode,
            rows: Arc::new(Mutex::new(Vec::new())),
            subscription: None,
        }
    }

    pub fn is_live(&self) -> bool {
        self.subscription.is_some()
    }

    pub async fn attach(&mut self) -> LmsResult<()> {
        self.detach();

        if self.mode == SyncMode::Subscribe {
            // The feed must not keep the rows alive past the screen.
            let rows: Weak<Rows<T>> = Arc::downgrade(&self.rows);
            let feed = self.collection.subscribe(move |snapshot| {
                if let Some(rows) = rows.upgrade() {
                    replace(&rows, snapshot);
                }
            });

            match feed.await {
                Ok(subscription) => {
                    log::debug!("{}: live feed attached", T::COLLECTION);
                    self.subscription = Some(subscription);
                    return Ok(());
                }
                Err(e) => log::warn!(
                    "{}: live feed unavailable, falling back to pull: {}",
                    T::COLLECTION,
                    e
                ),
            }
        }

        self.refresh().await
    }

    /// Point-in-time pull replacing the whole list.
    pub async fn refresh(&self) -> LmsResult<()> {
        let snapshot = self.collection.list_once().await?;
        replace(&self.rows, snapshot);
        Ok(())
    }

    /// Call after a confirmed create, update or delete. Without a live feed
    /// this re-lists on a background task; the listing is dropped if the
    /// reconciler is gone by the time it arrives.
    pub fn after_mutation(&self) {
        if self.is_live() {
            return;
        }

        let collection = self.collection.clone();
        let rows = Arc::downgrade(&self.rows);
        tokio::spawn(async move {
            match collection.list_once().await {
                Ok(snapshot) => {
                    if let Some(rows) = rows.upgrade() {
                        replace(&rows, snapshot);
                    }
                }
                Err(e) => log::warn!("{}: refresh failed: {}", T::COLLECTION, e),
            }
        });
    }

    /// Release the live feed, if any.
    pub fn detach(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.cancel();
            log::debug!("{}: live feed released", T::COLLECTION);
        }
    }

    pub fn rows(&self) -> Vec<Stored<T>> {
        lock(&self.rows).clone()
    }

    pub fn row(&self, index: usize) -> Option<Stored<T>> {
        lock(&self.rows).get(index).cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.rows).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Teacher;
    use crate::sync::testing::ScriptedStore;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn teacher(name: &str) -> Teacher {
        Teacher {
            name: name.to_string(),
            subject: "History".to_string(),
            department: "Humanities".to_string(),
            email: format!("{}@school.edu", name.to_lowercase()),
            password_hash: String::new(),
        }
    }

    fn names(list: &ListReconciler<Teacher>) -> Vec<String> {
        list.rows().into_iter().map(|s| s.record.name).collect()
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_feed_follows_remote_changes() {
        let store = Arc::new(ScriptedStore::new());
        let teachers: Collection<Teacher> = Collection::new(store.clone());
        let mut list = ListReconciler::new(teachers.clone(), SyncMode::Subscribe);

        teachers.create(&teacher("Ravi")).await.unwrap();
        list.attach().await.unwrap();
        assert!(list.is_live());
        assert_eq!(names(&list), vec!["Ravi"]);

        teachers.create(&teacher("Mina")).await.unwrap();
        list.after_mutation();
        settle().await;
        assert_eq!(names(&list), vec!["Ravi", "Mina"]);
        // the feed did the work, nothing was re-listed
        assert_eq!(store.lists.load(Ordering::SeqCst), 0);

        list.detach();
        settle().await;
        assert_eq!(store.inner.subscriber_count("teachers"), 0);
    }

    #[tokio::test]
    async fn test_pull_mode_refreshes_after_mutation() {
        let store = Arc::new(ScriptedStore::new());
        let teachers: Collection<Teacher> = Collection::new(store.clone());
        let mut list = ListReconciler::new(teachers.clone(), SyncMode::Pull);

        list.attach().await.unwrap();
        assert!(!list.is_live());
        assert_eq!(list.len(), 0);

        teachers.create(&teacher("Ravi")).await.unwrap();
        assert_eq!(list.len(), 0);

        list.after_mutation();
        assert_eq!(list.len(), 0);
        settle().await;
        assert_eq!(names(&list), vec!["Ravi"]);
        assert_eq!(store.lists.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_listing_after_drop_is_ignored() {
        let store = Arc::new(ScriptedStore::new());
        let teachers: Collection<Teacher> = Collection::new(store.clone());
        let mut list = ListReconciler::new(teachers.clone(), SyncMode::Pull);
        list.attach().await.unwrap();
        teachers.create(&teacher("Ravi")).await.unwrap();

        let rows = Arc::downgrade(&list.rows);
        list.after_mutation();
        drop(list);
        settle().await;

        // the listing still ran, but nothing was kept alive to receive it
        assert_eq!(store.lists.load(Ordering::SeqCst), 2);
        assert!(rows.upgrade().is_none());
    }

    #[tokio::test]
    async fn test_falls_back_to_pull_when_feed_refused() {
        let store = Arc::new(ScriptedStore::without_live_feed());
        let teachers: Collection<Teacher> = Collection::new(store.clone());
        teachers.create(&teacher("Ravi")).await.unwrap();

        let mut list = ListReconciler::new(teachers.clone(), SyncMode::Subscribe);
        list.attach().await.unwrap();
        assert!(!list.is_live());
        assert_eq!(names(&list), vec!["Ravi"]);
    }

    #[tokio::test]
    async fn test_rows_are_ordered_by_creation() {
        let store = Arc::new(ScriptedStore {
            reverse_listing: true,
            ..ScriptedStore::new()
        });
        let teachers: Collection<Teacher> = Collection::new(store.clone());
        for name in ["Ana", "Ben", "Cai"] {
            teachers.create(&teacher(name)).await.unwrap();
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        let mut list = ListReconciler::new(teachers, SyncMode::Pull);
        list.attach().await.unwrap();
        assert_eq!(names(&list), vec!["Ana", "Ben", "Cai"]);
        assert_eq!(list.row(1).unwrap().record.name, "Ben");
        assert!(list.row(3).is_none());
    }
}
