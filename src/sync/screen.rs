use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::api::{is_reference, upload_file, BlobStore, Collection};
use crate::config::SyncMode;
use crate::error::{LmsError, LmsResult};
use crate::models::{FormContext, Record, Stored};
use crate::sync::form::EntityForm;
use crate::sync::list::ListReconciler;
use crate::sync::notice::Notifier;

static NEXT_MOUNT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteKind {
    Create,
    Update { id: String },
}

/// Result of a background write, addressed to the screen that started it.
#[derive(Debug, Clone)]
pub struct WriteOutcome {
    pub mount_id: u64,
    pub kind: WriteKind,
    /// Form revision at the time of submit.
    pub form_revision: u64,
    /// Id of the created or updated record.
    pub result: LmsResult<String>,
}

#[derive(Debug, Clone)]
pub struct DeleteOutcome {
    pub mount_id: u64,
    pub id: String,
    pub result: LmsResult<()>,
}

/// A validated record on its way to the store. Owns everything it needs so it
/// can run on a spawned task.
pub struct PendingWrite<T: Record> {
    mount_id: u64,
    form_revision: u64,
    kind: WriteKind,
    record: T,
    collection: Collection<T>,
    blobs: Option<Arc<dyn BlobStore>>,
}

impl<T: Record> PendingWrite<T> {
    pub async fn execute(mut self) -> WriteOutcome {
        let result = self.run().await;
        WriteOutcome {
            mount_id: self.mount_id,
            kind: self.kind,
            form_revision: self.form_revision,
            result,
        }
    }

    async fn run(&mut self) -> LmsResult<String> {
        for slot in self.record.attachments_mut() {
            if slot.trim().is_empty() || is_reference(slot) {
                continue;
            }
            let blobs = self
                .blobs
                .as_deref()
                .ok_or_else(|| LmsError::Attachment("No file storage configured".to_string()))?;
            let reference = upload_file(blobs, T::COLLECTION, slot.as_str()).await?;
            *slot = reference;
        }

        match &self.kind {
            WriteKind::Create => self.collection.create(&self.record).await,
            WriteKind::Update { id } => {
                self.collection.update(id, &self.record).await?;
                Ok(id.clone())
            }
        }
    }
}

pub struct PendingDelete<T: Record> {
    mount_id: u64,
    id: String,
    collection: Collection<T>,
}

impl<T: Record> PendingDelete<T> {
    pub async fn execute(self) -> DeleteOutcome {
        let result = self.collection.delete(&self.id).await;
        DeleteOutcome {
            mount_id: self.mount_id,
            id: self.id,
            result,
        }
    }
}

/// One management screen: a form, a reconciled list and the notice banner,
/// all for a single record type.
///
/// Network work is split into `prepare_*` (local, synchronous),
/// `Pending*::execute` (the gateway call) and `finish_*` (apply the outcome),
/// so a UI loop can run the middle step in the background. After a
/// successful `finish_*`, `sync_in_background` brings a pull-mode list up to
/// date.
pub struct Screen<T: Record> {
    mount_id: u64,
    collection: Collection<T>,
    blobs: Option<Arc<dyn BlobStore>>,
    form: EntityForm<T>,
    list: ListReconciler<T>,
    notices: Notifier,
    owner_id: String,
    in_flight: usize,
}

impl<T: Record> Screen<T> {
    pub fn new(
        collection: Collection<T>,
        mode: SyncMode,
        notices: Notifier,
        owner_id: impl Into<String>,
    ) -> Self {
        Self {
            mount_id: NEXT_MOUNT_ID.fetch_add(1, Ordering::Relaxed),
            list: ListReconciler::new(collection.clone(), mode),
            collection,
            blobs: None,
            form: EntityForm::new(),
            notices,
            owner_id: owner_id.into(),
            in_flight: 0,
        }
    }

    pub fn with_blobs(mut self, blobs: Arc<dyn BlobStore>) -> Self {
        self.blobs = Some(blobs);
        self
    }

    pub fn mount_id(&self) -> u64 {
        self.mount_id
    }

    pub fn form(&self) -> &EntityForm<T> {
        &self.form
    }

    pub fn form_mut(&mut self) -> &mut EntityForm<T> {
        &mut self.form
    }

    pub fn list(&self) -> &ListReconciler<T> {
        &self.list
    }

    pub fn rows(&self) -> Vec<Stored<T>> {
        self.list.rows()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    fn report(&self, action: &str, err: &LmsError) {
        match err {
            LmsError::MissingRequiredField { .. } | LmsError::InvalidNumericInput { .. } => {
                log::debug!("{} {}: {}", T::COLLECTION, action, err)
            }
            _ if err.is_transient() => log::warn!("{} {} failed: {}", T::COLLECTION, action, err),
            _ => log::error!("{} {} failed: {}", T::COLLECTION, action, err),
        }
        self.notices.show_error(err.to_string());
    }

    /// Attach the list to its collection.
    pub async fn mount(&mut self) -> LmsResult<()> {
        log::debug!("Mounting {} screen #{}", T::COLLECTION, self.mount_id);
        let attached = self.list.attach().await;
        if let Err(e) = &attached {
            self.report("load", e);
        }
        attached
    }

    /// Release the live feed. Dropping the screen does the same.
    pub fn unmount(&mut self) {
        log::debug!("Unmounting {} screen #{}", T::COLLECTION, self.mount_id);
        self.list.detach();
    }

    // ------------------------------------------------------------------------
    // Submit
    // ------------------------------------------------------------------------

    /// Validate the form and package the gateway call. Validation failures
    /// are reported here and nothing reaches the network.
    pub fn prepare_submit(&mut self) -> LmsResult<PendingWrite<T>> {
        let ctx = FormContext::new(self.owner_id.clone());
        let record = match self.form.validate(&ctx) {
            Ok(record) => record,
            Err(e) => {
                self.report("submit", &e);
                return Err(e);
            }
        };

        let kind = match self.form.edit_target() {
            Some(id) => WriteKind::Update { id: id.to_string() },
            None => WriteKind::Create,
        };

        self.in_flight += 1;
        Ok(PendingWrite {
            mount_id: self.mount_id,
            form_revision: self.form.revision(),
            kind,
            record,
            collection: self.collection.clone(),
            blobs: self.blobs.clone(),
        })
    }

    /// Apply a write outcome. Success empties the form unless it was edited
    /// after submit; failure leaves it as it was. Outcomes for another mount
    /// are ignored.
    pub fn finish_submit(&mut self, outcome: WriteOutcome) -> LmsResult<String> {
        if outcome.mount_id != self.mount_id {
            log::debug!(
                "{}: ignoring write for stale screen #{}",
                T::COLLECTION,
                outcome.mount_id
            );
            return outcome.result;
        }
        self.in_flight = self.in_flight.saturating_sub(1);

        match outcome.result {
            Ok(id) => {
                let verb = match outcome.kind {
                    WriteKind::Create => "added",
                    WriteKind::Update { .. } => "updated",
                };
                log::info!("{} {} {}", T::LABEL, id, verb);
                if outcome.form_revision == self.form.revision() {
                    self.form.reset();
                } else {
                    log::debug!("{}: form changed while saving, keeping it", T::COLLECTION);
                }
                self.notices
                    .show_info(format!("{} {} successfully!", T::LABEL, verb));
                Ok(id)
            }
            Err(e) => {
                self.report("save", &e);
                Err(e)
            }
        }
    }

    // ------------------------------------------------------------------------
    // Row actions
    // ------------------------------------------------------------------------

    fn ensure_editable(&self, action: &str) -> LmsResult<()> {
        if T::EDITABLE {
            return Ok(());
        }
        let err = LmsError::ReadOnlyCollection {
            collection: T::COLLECTION.to_string(),
        };
        self.report(action, &err);
        Err(err)
    }

    /// Load the row at `index` into the form. Returns false if there is no
    /// such row.
    pub fn edit_row(&mut self, index: usize) -> LmsResult<bool> {
        self.ensure_editable("edit")?;
        match self.list.row(index) {
            Some(stored) => {
                self.form.load_for_edit(&stored);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn cancel_edit(&mut self) {
        self.form.cancel();
    }

    pub fn prepare_delete(&mut self, index: usize) -> LmsResult<Option<PendingDelete<T>>> {
        self.ensure_editable("delete")?;
        let Some(stored) = self.list.row(index) else {
            return Ok(None);
        };

        self.in_flight += 1;
        Ok(Some(PendingDelete {
            mount_id: self.mount_id,
            id: stored.id,
            collection: self.collection.clone(),
        }))
    }

    /// A record that is already gone counts as deleted.
    pub fn finish_delete(&mut self, outcome: DeleteOutcome) -> LmsResult<()> {
        if outcome.mount_id != self.mount_id {
            log::debug!(
                "{}: ignoring delete for stale screen #{}",
                T::COLLECTION,
                outcome.mount_id
            );
            return Ok(());
        }
        self.in_flight = self.in_flight.saturating_sub(1);

        match outcome.result {
            Ok(()) | Err(LmsError::NotFound { .. }) => {
                log::info!("{} {} deleted", T::LABEL, outcome.id);
                if self.form.edit_target() == Some(outcome.id.as_str()) {
                    self.form.reset();
                }
                self.notices.show_info(format!("{} deleted", T::LABEL));
                Ok(())
            }
            Err(e) => {
                self.report("delete", &e);
                Err(e)
            }
        }
    }

    /// Re-list in the background after a confirmed mutation. Does nothing
    /// while a live feed is attached.
    pub fn sync_in_background(&self) {
        self.list.after_mutation();
    }
}
