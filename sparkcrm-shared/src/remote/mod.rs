/// Remote collaborator contracts
///
/// SparkCRM talks to a backend-as-a-service for authentication and record
/// persistence. This module defines what the synchronization core expects of
/// it and provides two implementations.
///
/// # Backends
///
/// - **Rest**: hosted auth + record API over HTTPS (`reqwest`)
/// - **Memory**: in-process directory and collections for tests and demos
///
/// # Scoping
///
/// Every record call receives the caller's [`Session`]. Backends must only
/// return or mutate rows whose `user_id` equals the session's user.
///
/// # Example
///
/// ```no_run
/// use sparkcrm_shared::models::{Contact, Credentials, NewContact, Record};
/// use sparkcrm_shared::remote::{AuthService, MemoryBackend, RecordCollection};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MemoryBackend::new();
/// backend.auth().register("ada@example.com", "analytical").await?;
///
/// let session = backend
///     .auth()
///     .sign_in(&Credentials::new("ada@example.com", "analytical"))
///     .await?;
///
/// let contacts = backend.contacts();
/// contacts.insert(&session, &NewContact::new("Ada", "ada@example.com")).await?;
/// let listing = contacts.list(&session, Contact::list_order()).await?;
/// assert_eq!(listing.len(), 1);
/// # Ok(())
/// # }
/// ```

pub mod memory;
pub mod rest;

pub use memory::{MemoryAuth, MemoryBackend, MemoryCollection, Operation};
pub use rest::{RestAuth, RestBackend, RestCollection, RestConfig};

use async_trait::async_trait;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::CrmResult;
use crate::models::{Credentials, ListOrder, Record, Session, SessionEvent};

/// Capacity of session change channels
pub const SESSION_EVENT_CAPACITY: usize = 16;

/// Remote auth service
#[async_trait]
pub trait AuthService: Send + Sync {
    /// Exchanges credentials for a session
    async fn sign_in(&self, credentials: &Credentials) -> CrmResult<Session>;

    /// Invalidates the current remote session
    async fn sign_out(&self) -> CrmResult<()>;

    /// Returns the current session if one exists and is still valid
    async fn get_session(&self) -> CrmResult<Option<Session>>;

    /// Subscribes to session changes (sign-in, refresh, external sign-out)
    fn subscribe(&self) -> broadcast::Receiver<SessionEvent>;

    /// Replaces the signed-in user's secret
    async fn update_credential(&self, new_secret: &str) -> CrmResult<()>;
}

/// Remote record collection for one entity kind
#[async_trait]
pub trait RecordCollection<R: Record>: Send + Sync {
    /// Lists the session user's records in the given order
    async fn list(&self, session: &Session, order: ListOrder) -> CrmResult<Vec<R>>;

    /// Fetches one record, `None` if it does not exist for this user
    async fn get_by_id(&self, session: &Session, id: Uuid) -> CrmResult<Option<R>>;

    /// Inserts a draft owned by the session user
    ///
    /// The acknowledgment is not guaranteed to be the full persisted row;
    /// callers reconcile by listing again.
    async fn insert(&self, session: &Session, draft: &R::Draft) -> CrmResult<R>;

    /// Applies the supplied fields of a patch
    async fn update(&self, session: &Session, id: Uuid, patch: &R::Patch) -> CrmResult<()>;

    /// Deletes a record; deleting an already deleted id is not an error
    async fn delete(&self, session: &Session, id: Uuid) -> CrmResult<()>;
}
