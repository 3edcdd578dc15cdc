/// Edit resolver
///
/// Turns the `id` query parameter of the current location into form state.
///
/// # Modes
///
/// - **Creating**: blank draft, submit creates a record
/// - **Editing**: draft pre-filled from a fetched record, submit updates it
///
/// An absent, unparsable or unknown identifier, or a failed fetch, all
/// resolve to a blank draft in creating mode without any feedback report.
///
/// # Superseded Resolutions
///
/// Each resolution takes a generation number when it starts. Only the newest
/// generation may write the draft, and nothing is written after
/// [`EditResolver::unmount`]. Switching from one id to another therefore never
/// lets the slower, older fetch win.
///
/// # Example
///
/// ```no_run
/// use sparkcrm_shared::models::Task;
/// use sparkcrm_sync::edit::{EditResolver, FormMode};
/// use sparkcrm_sync::location::MemoryLocation;
/// use sparkcrm_sync::store::RecordStore;
///
/// # async fn example(store: RecordStore<Task>) -> Result<(), Box<dyn std::error::Error>> {
/// let location = MemoryLocation::new("/tasks?id=42");
/// let resolver = EditResolver::new(&store);
///
/// if let Some(handle) = resolver.sync_with(&location) {
///     handle.await?;
/// }
/// assert_eq!(resolver.draft().mode(), FormMode::Creating);
/// # Ok(())
/// # }
/// ```

use sparkcrm_shared::error::CrmResult;
use sparkcrm_shared::models::{Record, Session};
use sparkcrm_shared::remote::RecordCollection;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::location::Location;
use crate::session::SessionReader;
use crate::store::RecordStore;

/// Query parameter carrying the record to edit
pub const EDIT_PARAM: &str = "id";

/// Whether the form creates or updates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormMode {
    Creating,
    Editing(Uuid),
}

/// Transient form state for one entity kind
#[derive(Debug, Clone, PartialEq)]
pub struct FormDraft<R: Record> {
    pub fields: R::Draft,

    /// Record being edited, `None` when creating
    pub editing: Option<Uuid>,
}

impl<R: Record> FormDraft<R> {
    pub fn blank() -> Self {
        FormDraft {
            fields: R::Draft::default(),
            editing: None,
        }
    }

    pub fn editing(record: &R) -> Self {
        FormDraft {
            fields: record.to_draft(),
            editing: Some(record.id()),
        }
    }

    pub fn mode(&self) -> FormMode {
        match self.editing {
            Some(id) => FormMode::Editing(id),
            None => FormMode::Creating,
        }
    }
}

impl<R: Record> Default for FormDraft<R> {
    fn default() -> Self {
        Self::blank()
    }
}

/// Result of a submit
#[derive(Debug, Clone, PartialEq)]
pub enum Submission<R: Record> {
    Created(R),
    Updated(Uuid),

    /// A save was already in flight
    Ignored,
}

/// Resolves an optional identifier into a draft
pub async fn resolve_edit<R: Record>(
    collection: &dyn RecordCollection<R>,
    session: Option<&Session>,
    id: Option<&str>,
) -> FormDraft<R> {
    let Some(raw) = id.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return FormDraft::blank();
    };

    let Ok(id) = Uuid::parse_str(raw) else {
        tracing::debug!(collection = R::COLLECTION, id = %raw, "Unparsable edit id");
        return FormDraft::blank();
    };

    let Some(session) = session else {
        return FormDraft::blank();
    };

    match collection.get_by_id(session, id).await {
        Ok(Some(record)) => FormDraft::editing(&record),
        Ok(None) => {
            tracing::debug!(collection = R::COLLECTION, record_id = %id, "Edit target not found");
            FormDraft::blank()
        }
        Err(e) => {
            tracing::debug!(collection = R::COLLECTION, record_id = %id, error = %e, "Edit fetch failed");
            FormDraft::blank()
        }
    }
}

struct ResolverInner<R: Record> {
    collection: Arc<dyn RecordCollection<R>>,
    session: SessionReader,
    draft: watch::Sender<FormDraft<R>>,
    generation: AtomicU64,
    saving: AtomicBool,
    /// Last identifier seen by `sync_with`; outer `None` until the first sync
    last_id: Mutex<Option<Option<String>>>,
    mount: CancellationToken,
}

/// Form state driver for one entity screen
pub struct EditResolver<R: Record> {
    inner: Arc<ResolverInner<R>>,
}

impl<R: Record> Clone for EditResolver<R> {
    fn clone(&self) -> Self {
        EditResolver {
            inner: self.inner.clone(),
        }
    }
}

impl<R: Record> EditResolver<R> {
    pub fn new(store: &RecordStore<R>) -> Self {
        let (draft, _) = watch::channel(FormDraft::blank());

        EditResolver {
            inner: Arc::new(ResolverInner {
                collection: store.collection(),
                session: store.session_reader(),
                draft,
                generation: AtomicU64::new(0),
                saving: AtomicBool::new(false),
                last_id: Mutex::new(None),
                mount: CancellationToken::new(),
            }),
        }
    }

    pub fn draft(&self) -> FormDraft<R> {
        self.inner.draft.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<FormDraft<R>> {
        self.inner.draft.subscribe()
    }

    /// Resolves `id` and writes the draft
    ///
    /// Returns `None` when the result was discarded because a newer
    /// resolution or form action superseded it, or the resolver unmounted.
    pub async fn resolve(&self, id: Option<&str>) -> Option<FormDraft<R>> {
        let generation = self.next_generation();
        self.resolve_as(generation, id).await
    }

    /// Runs [`EditResolver::resolve`] on the runtime
    pub fn spawn_resolve(&self, id: Option<String>) -> JoinHandle<Option<FormDraft<R>>> {
        // Taken before spawning so call order decides which resolution is newest
        let generation = self.next_generation();
        let resolver = self.clone();

        tokio::spawn(async move { resolver.resolve_as(generation, id.as_deref()).await })
    }

    /// Re-resolves when the location's identifier changed since the last sync
    pub fn sync_with(&self, location: &dyn Location) -> Option<JoinHandle<Option<FormDraft<R>>>> {
        let id = location.query(EDIT_PARAM);

        {
            let mut last = self.inner.last_id.lock().unwrap_or_else(|e| e.into_inner());
            if last.as_ref() == Some(&id) {
                return None;
            }
            *last = Some(id.clone());
        }

        Some(self.spawn_resolve(id))
    }

    /// Enters edit mode for a record already on screen
    pub fn begin_edit(&self, record: &R) {
        self.next_generation();
        self.write(FormDraft::editing(record));
    }

    /// Replaces the field values, keeping the mode
    pub fn set_fields(&self, fields: R::Draft) {
        self.inner.draft.send_modify(|draft| draft.fields = fields);
    }

    /// Back to a blank draft in creating mode
    pub fn cancel(&self) {
        self.next_generation();
        self.write(FormDraft::blank());
    }

    pub fn is_saving(&self) -> bool {
        self.inner.saving.load(Ordering::SeqCst)
    }

    /// Creates or updates from the current draft
    ///
    /// A submit while another is in flight is ignored. On success the draft
    /// resets to blank; on failure it is kept for correction.
    pub async fn submit(&self, store: &RecordStore<R>) -> CrmResult<Submission<R>> {
        let Some(_saving) = SavingFlag::acquire(&self.inner.saving) else {
            tracing::debug!(collection = R::COLLECTION, "Submit ignored, save in flight");
            return Ok(Submission::Ignored);
        };

        let draft = self.draft();
        let submission = match draft.editing {
            None => Submission::Created(store.create(draft.fields).await?),
            Some(id) => {
                store.update(id, R::patch_from_draft(&draft.fields)).await?;
                Submission::Updated(id)
            }
        };

        self.next_generation();
        self.write(FormDraft::blank());
        Ok(submission)
    }

    /// Stops every pending resolution from writing
    pub fn unmount(&self) {
        self.inner.mount.cancel();
    }

    fn next_generation(&self) -> u64 {
        self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn resolve_as(&self, generation: u64, id: Option<&str>) -> Option<FormDraft<R>> {
        let session = self.inner.session.session();
        let resolved = resolve_edit(self.inner.collection.as_ref(), session.as_ref(), id).await;

        if self.inner.mount.is_cancelled() {
            tracing::debug!(collection = R::COLLECTION, "Discarding resolution after unmount");
            return None;
        }
        if self.inner.generation.load(Ordering::SeqCst) != generation {
            tracing::debug!(collection = R::COLLECTION, generation = generation, "Discarding superseded resolution");
            return None;
        }

        self.write(resolved.clone());
        Some(resolved)
    }

    fn write(&self, draft: FormDraft<R>) {
        if self.inner.mount.is_cancelled() {
            return;
        }
        self.inner.draft.send_replace(draft);
    }
}

/// Holds the saving flag for the duration of a submit
struct SavingFlag<'a>(&'a AtomicBool);

impl<'a> SavingFlag<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        if flag.swap(true, Ordering::SeqCst) {
            None
        } else {
            Some(SavingFlag(flag))
        }
    }
}

impl Drop for SavingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
