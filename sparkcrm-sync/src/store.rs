/// Record store
///
/// Holds the in-memory, ordered listing of one entity kind for a screen and
/// runs every mutation against the remote collection.
///
/// # Consistency
///
/// The store never splices local changes into its listing. Every confirmed
/// mutation is followed by a full re-list, and the re-list result replaces
/// the snapshot wholesale. The re-list is quiet: its failure is logged and the
/// prior snapshot kept, so each mutation produces exactly one feedback report.
///
/// # Mount Token
///
/// After [`RecordStore::unmount`] no in-flight operation touches the snapshot
/// any more, however late its remote call resolves.
///
/// # Example
///
/// ```no_run
/// use sparkcrm_shared::models::{Contact, NewContact};
/// use sparkcrm_shared::remote::MemoryBackend;
/// use sparkcrm_sync::feedback::FeedbackChannel;
/// use sparkcrm_sync::session::SessionReader;
/// use sparkcrm_sync::store::RecordStore;
///
/// # async fn example(reader: SessionReader) -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MemoryBackend::new();
/// let store: RecordStore<Contact> =
///     RecordStore::new(backend.contacts(), reader, FeedbackChannel::default());
///
/// store.list().await?;
/// let ada = store.create(NewContact::new("Ada Lovelace", "ada@example.com")).await?;
/// store.delete(ada.id).await?;
/// # Ok(())
/// # }
/// ```

use sparkcrm_shared::error::{CrmError, CrmResult};
use sparkcrm_shared::models::{sort_listing, Contact, Record, Session, Task, TaskPatch};
use sparkcrm_shared::remote::RecordCollection;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use validator::Validate;

use crate::feedback::{Action, FeedbackChannel, Outcome};
use crate::session::SessionReader;

/// Synchronization unit for one entity kind
pub struct RecordStore<R: Record> {
    collection: Arc<dyn RecordCollection<R>>,
    session: SessionReader,
    feedback: FeedbackChannel,
    records: watch::Sender<Vec<R>>,
    /// Set once a listing has been applied
    listed: AtomicBool,
    mount: CancellationToken,
}

impl<R: Record> RecordStore<R> {
    pub fn new(
        collection: Arc<dyn RecordCollection<R>>,
        session: SessionReader,
        feedback: FeedbackChannel,
    ) -> Self {
        let (records, _) = watch::channel(Vec::new());

        RecordStore {
            collection,
            session,
            feedback,
            records,
            listed: AtomicBool::new(false),
            mount: CancellationToken::new(),
        }
    }

    /// Fetches the listing and replaces the snapshot
    ///
    /// On failure the prior snapshot stays and one failure is reported.
    pub async fn list(&self) -> CrmResult<Vec<R>> {
        let result = match self.require_session() {
            Ok(session) => self.fetch(&session).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(rows) => {
                self.apply(rows.clone());
                Ok(rows)
            }
            Err(e) => {
                tracing::warn!(collection = R::COLLECTION, error = %e, "List failed");
                if self.is_mounted() {
                    self.feedback
                        .report(Outcome::failure(Action::Loaded, R::LABEL, e.clone()));
                }
                Err(e)
            }
        }
    }

    /// Creates a record from a draft
    ///
    /// Returns the re-listed copy carrying server-assigned fields when it can
    /// be found, otherwise the insert acknowledgment.
    pub async fn create(&self, draft: R::Draft) -> CrmResult<R> {
        let result = self.try_create(draft).await;
        self.feedback
            .report(Outcome::from_result(Action::Created, R::LABEL, &result));
        result
    }

    /// Applies the supplied fields of a patch
    pub async fn update(&self, id: Uuid, patch: R::Patch) -> CrmResult<()> {
        self.update_as(id, patch, Action::Updated).await
    }

    pub async fn delete(&self, id: Uuid) -> CrmResult<()> {
        let result = self.try_delete(id).await;
        self.feedback
            .report(Outcome::from_result(Action::Removed, R::LABEL, &result));
        result
    }

    /// Current listing
    pub fn snapshot(&self) -> Vec<R> {
        self.records.borrow().clone()
    }

    /// Receiver notified whenever the snapshot is replaced
    pub fn subscribe(&self) -> watch::Receiver<Vec<R>> {
        self.records.subscribe()
    }

    /// Detaches the store from its screen
    pub fn unmount(&self) {
        tracing::debug!(collection = R::COLLECTION, "Store unmounted");
        self.mount.cancel();
    }

    pub fn is_mounted(&self) -> bool {
        !self.mount.is_cancelled()
    }

    pub(crate) fn collection(&self) -> Arc<dyn RecordCollection<R>> {
        self.collection.clone()
    }

    pub(crate) fn session_reader(&self) -> SessionReader {
        self.session.clone()
    }

    async fn update_as(&self, id: Uuid, patch: R::Patch, action: Action) -> CrmResult<()> {
        let result = self.try_update(id, patch).await;
        self.feedback
            .report(Outcome::from_result(action, R::LABEL, &result));
        result
    }

    async fn try_create(&self, draft: R::Draft) -> CrmResult<R> {
        draft.validate()?;
        let session = self.require_session()?;
        let known = self.known_ids(&session).await;

        let ack = self.collection.insert(&session, &draft).await?;
        tracing::info!(
            collection = R::COLLECTION,
            user_id = %session.user_id(),
            "Record created"
        );

        let created = match self.relist(&session).await {
            Some(rows) => find_created(&ack, &draft, &rows, &known).unwrap_or(ack),
            None => ack,
        };
        Ok(created)
    }

    /// Ids already present before an insert
    ///
    /// A store that never listed lists first, so rows created elsewhere are not
    /// mistaken for the new one.
    async fn known_ids(&self, session: &Session) -> HashSet<Uuid> {
        if !self.listed.load(Ordering::Acquire) {
            if let Some(rows) = self.relist(session).await {
                return rows.iter().map(|r| r.id()).collect();
            }
        }
        self.records.borrow().iter().map(|r| r.id()).collect()
    }

    async fn try_update(&self, id: Uuid, patch: R::Patch) -> CrmResult<()> {
        if R::patch_is_empty(&patch) {
            return Err(CrmError::Validation("Nothing to update".to_string()));
        }
        patch.validate()?;
        let session = self.require_session()?;

        self.collection.update(&session, id, &patch).await?;
        tracing::info!(collection = R::COLLECTION, record_id = %id, "Record updated");

        self.relist(&session).await;
        Ok(())
    }

    async fn try_delete(&self, id: Uuid) -> CrmResult<()> {
        let session = self.require_session()?;

        self.collection.delete(&session, id).await?;
        tracing::info!(collection = R::COLLECTION, record_id = %id, "Record deleted");

        self.relist(&session).await;
        Ok(())
    }

    async fn fetch(&self, session: &Session) -> CrmResult<Vec<R>> {
        let mut rows = self.collection.list(session, R::list_order()).await?;
        sort_listing(&mut rows);

        tracing::debug!(collection = R::COLLECTION, count = rows.len(), "Listed");
        Ok(rows)
    }

    /// Follow-up re-list after a mutation; failures only logged
    async fn relist(&self, session: &Session) -> Option<Vec<R>> {
        match self.fetch(session).await {
            Ok(rows) => {
                self.apply(rows.clone());
                Some(rows)
            }
            Err(e) => {
                tracing::warn!(
                    collection = R::COLLECTION,
                    error = %e,
                    "Re-list after mutation failed, keeping prior snapshot"
                );
                None
            }
        }
    }

    fn apply(&self, rows: Vec<R>) {
        if !self.is_mounted() {
            tracing::debug!(collection = R::COLLECTION, "Discarding listing for unmounted store");
            return;
        }
        self.records.send_replace(rows);
        self.listed.store(true, Ordering::Release);
    }

    fn require_session(&self) -> CrmResult<Session> {
        self.session.session().ok_or_else(CrmError::no_session)
    }
}

/// Picks the freshly created row out of a re-listing
///
/// Matches the acknowledgment's id first; acknowledgments without one fall
/// back to a row that was not listed before and carries the same fields.
fn find_created<R: Record>(ack: &R, draft: &R::Draft, rows: &[R], known: &HashSet<Uuid>) -> Option<R> {
    if !ack.id().is_nil() {
        if let Some(row) = rows.iter().find(|r| r.id() == ack.id()) {
            return Some(row.clone());
        }
    }

    rows.iter()
        .filter(|r| !known.contains(&r.id()))
        .find(|r| r.to_draft() == *draft)
        .cloned()
}

impl RecordStore<Task> {
    /// Flips a task's completion, nothing else
    pub async fn toggle_completion(&self, task: &Task) -> CrmResult<()> {
        self.update(task.id, TaskPatch::completion(!task.completed)).await
    }

    /// Marks a task done (dashboard "Done" button)
    pub async fn mark_complete(&self, id: Uuid) -> CrmResult<()> {
        self.update_as(id, TaskPatch::completion(true), Action::Completed)
            .await
    }
}

impl RecordStore<Contact> {
    /// Snapshot filtered by a case-insensitive name or email substring
    pub fn search(&self, query: &str) -> Vec<Contact> {
        self.records
            .borrow()
            .iter()
            .filter(|c| c.matches(query))
            .cloned()
            .collect()
    }
}
