/// In-memory backend for testing and demos
///
/// Behaves like the hosted service closely enough to exercise the
/// synchronization core without a network:
///
/// - **Auth**: argon2 password directory, real HS256 session tokens with
///   expiry and refresh, revocation on sign-out, change notifications
/// - **Collections**: per-user scoping, server-assigned ids and timestamps,
///   remote re-validation, idempotent update/delete
///
/// # Fault Injection
///
/// Tests can make the next N calls of an [`Operation`] fail with a remote
/// error, add latency to every call, make the session check fail or hang, or
/// make insert acknowledgments come back without server-assigned fields.
///
/// # Example
///
/// ```no_run
/// use sparkcrm_shared::models::{Credentials, NewTask, Task, Record};
/// use sparkcrm_shared::remote::{AuthService, MemoryBackend, Operation, RecordCollection};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MemoryBackend::new();
/// backend.auth().register("ada@example.com", "analytical").await?;
/// let session = backend.auth().sign_in(&Credentials::new("ada@example.com", "analytical")).await?;
///
/// backend.tasks().fail_next(Operation::List, 1).await;
/// assert!(backend.tasks().list(&session, Task::list_order()).await.is_err());
/// assert!(backend.tasks().list(&session, Task::list_order()).await.is_ok());
/// # Ok(())
/// # }
/// ```

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::time::sleep;
use uuid::Uuid;
use validator::Validate;

use super::{AuthService, RecordCollection, SESSION_EVENT_CAPACITY};
use crate::auth::password::{hash_password, validate_password_length, verify_password};
use crate::auth::token::{create_token, validate_refresh_token, validate_token, Claims, TokenType};
use crate::error::{CrmError, CrmResult};
use crate::models::{
    sort_listing, Contact, Credentials, ListOrder, Record, Session, SessionEvent, Task, User,
};

/// Remote call kinds, used for fault injection and call counting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    List,
    GetById,
    Insert,
    Update,
    Delete,
}

/// Bundle of an auth directory and one collection per entity kind
#[derive(Clone)]
pub struct MemoryBackend {
    auth: Arc<MemoryAuth>,
    contacts: Arc<MemoryCollection<Contact>>,
    tasks: Arc<MemoryCollection<Task>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        let auth = Arc::new(MemoryAuth::new());

        MemoryBackend {
            contacts: Arc::new(MemoryCollection::new(auth.clone())),
            tasks: Arc::new(MemoryCollection::new(auth.clone())),
            auth,
        }
    }

    pub fn auth(&self) -> Arc<MemoryAuth> {
        self.auth.clone()
    }

    pub fn contacts(&self) -> Arc<MemoryCollection<Contact>> {
        self.contacts.clone()
    }

    pub fn tasks(&self) -> Arc<MemoryCollection<Task>> {
        self.tasks.clone()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

struct Account {
    user: User,
    password_hash: String,
}

#[derive(Default)]
struct AuthFaults {
    fail_session_check: bool,
    fail_sign_out: bool,
    session_check_delay: Option<Duration>,
}

/// In-memory auth directory
pub struct MemoryAuth {
    secret: String,
    accounts: RwLock<HashMap<String, Account>>,
    current: RwLock<Option<Session>>,
    revoked: RwLock<HashSet<String>>,
    access_ttl: RwLock<ChronoDuration>,
    faults: Mutex<AuthFaults>,
    events: broadcast::Sender<SessionEvent>,
}

impl MemoryAuth {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(SESSION_EVENT_CAPACITY);

        MemoryAuth {
            secret: format!("memory-{}-{}", Uuid::new_v4(), Uuid::new_v4()),
            accounts: RwLock::new(HashMap::new()),
            current: RwLock::new(None),
            revoked: RwLock::new(HashSet::new()),
            access_ttl: RwLock::new(TokenType::Access.default_expiration()),
            faults: Mutex::new(AuthFaults::default()),
            events,
        }
    }

    /// Creates an account
    pub async fn register(&self, email: &str, password: &str) -> CrmResult<User> {
        let email = email.trim().to_lowercase();
        validate_password_length(password).map_err(CrmError::Validation)?;

        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(&email) {
            return Err(CrmError::Validation("User already registered".to_string()));
        }

        let user = User {
            id: Uuid::new_v4(),
            email: email.clone(),
        };
        accounts.insert(
            email,
            Account {
                user: user.clone(),
                password_hash: hash_password(password)?,
            },
        );

        tracing::debug!(user_id = %user.id, "Registered in-memory account");
        Ok(user)
    }

    /// Lifetime of access tokens issued from now on
    pub async fn set_access_ttl(&self, ttl: ChronoDuration) {
        *self.access_ttl.write().await = ttl;
    }

    /// Makes every session check fail with a remote error
    pub async fn fail_session_checks(&self, fail: bool) {
        self.faults.lock().await.fail_session_check = fail;
    }

    /// Makes every sign-out request fail with a remote error
    ///
    /// The local session is still dropped, as a client library does when
    /// its logout request cannot reach the server; the token is not revoked.
    pub async fn fail_sign_outs(&self, fail: bool) {
        self.faults.lock().await.fail_sign_out = fail;
    }

    /// Delays every session check
    pub async fn delay_session_checks(&self, delay: Option<Duration>) {
        self.faults.lock().await.session_check_delay = delay;
    }

    /// Ends the session from outside this process (admin revoke, other device)
    pub async fn revoke_externally(&self) {
        if let Some(session) = self.current.write().await.take() {
            self.revoked.write().await.insert(session.access_token);
        }
        let _ = self.events.send(SessionEvent::SignedOut);
    }

    /// Checks a session presented by a record call, returning its user id
    pub async fn verify(&self, session: &Session) -> CrmResult<Uuid> {
        if self.revoked.read().await.contains(&session.access_token) {
            return Err(CrmError::Auth("Session has been revoked".to_string()));
        }

        let claims = validate_token(&session.access_token, &self.secret)?;
        if claims.sub != session.user.id || claims.token_type != TokenType::Access {
            return Err(CrmError::Auth("Token does not match session".to_string()));
        }

        Ok(claims.sub)
    }

    async fn issue_session(&self, user: &User) -> CrmResult<Session> {
        let ttl = *self.access_ttl.read().await;
        let access = Claims::with_expiration(user.id, &user.email, TokenType::Access, ttl);
        let refresh = Claims::new(user.id, &user.email, TokenType::Refresh);

        Ok(Session {
            access_token: create_token(&access, &self.secret)?,
            refresh_token: Some(create_token(&refresh, &self.secret)?),
            expires_at: Some(access.expires_at()),
            user: user.clone(),
        })
    }

    async fn refresh(&self, expired: &Session) -> CrmResult<Session> {
        let refresh_token = expired
            .refresh_token
            .as_deref()
            .ok_or_else(|| CrmError::Auth("Session expired".to_string()))?;

        let claims = validate_refresh_token(refresh_token, &self.secret)?;
        let user = User {
            id: claims.sub,
            email: claims.email,
        };

        self.issue_session(&user).await
    }
}

impl Default for MemoryAuth {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthService for MemoryAuth {
    async fn sign_in(&self, credentials: &Credentials) -> CrmResult<Session> {
        credentials.validate()?;
        let email = credentials.email.trim().to_lowercase();

        let user = {
            let accounts = self.accounts.read().await;
            let account = accounts
                .get(&email)
                .ok_or_else(|| CrmError::Auth("Invalid login credentials".to_string()))?;

            if !verify_password(&credentials.password, &account.password_hash)? {
                return Err(CrmError::Auth("Invalid login credentials".to_string()));
            }
            account.user.clone()
        };

        let session = self.issue_session(&user).await?;
        *self.current.write().await = Some(session.clone());
        let _ = self.events.send(SessionEvent::SignedIn(session.clone()));

        tracing::debug!(user_id = %user.id, "In-memory sign-in");
        Ok(session)
    }

    async fn sign_out(&self) -> CrmResult<()> {
        if self.faults.lock().await.fail_sign_out {
            self.current.write().await.take();
            let _ = self.events.send(SessionEvent::SignedOut);
            return Err(CrmError::Remote("Sign-out request failed".to_string()));
        }

        if let Some(session) = self.current.write().await.take() {
            self.revoked.write().await.insert(session.access_token);
        }
        let _ = self.events.send(SessionEvent::SignedOut);
        Ok(())
    }

    async fn get_session(&self) -> CrmResult<Option<Session>> {
        let (fail, delay) = {
            let faults = self.faults.lock().await;
            (faults.fail_session_check, faults.session_check_delay)
        };
        if let Some(delay) = delay {
            sleep(delay).await;
        }
        if fail {
            return Err(CrmError::Remote("Session check failed".to_string()));
        }

        let current = self.current.read().await.clone();
        let Some(session) = current else {
            return Ok(None);
        };

        if !session.is_expired() {
            return Ok(Some(session));
        }

        match self.refresh(&session).await {
            Ok(refreshed) => {
                *self.current.write().await = Some(refreshed.clone());
                let _ = self.events.send(SessionEvent::TokenRefreshed(refreshed.clone()));
                Ok(Some(refreshed))
            }
            Err(e) => {
                tracing::debug!(error = %e, "Refresh failed, dropping session");
                *self.current.write().await = None;
                let _ = self.events.send(SessionEvent::SignedOut);
                Ok(None)
            }
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    async fn update_credential(&self, new_secret: &str) -> CrmResult<()> {
        validate_password_length(new_secret).map_err(CrmError::Validation)?;

        let session = self
            .current
            .read()
            .await
            .clone()
            .ok_or_else(CrmError::no_session)?;
        self.verify(&session).await?;

        {
            let mut accounts = self.accounts.write().await;
            let account = accounts
                .get_mut(&session.user.email)
                .ok_or_else(|| CrmError::Auth("User no longer exists".to_string()))?;
            account.password_hash = hash_password(new_secret)?;
        }

        let _ = self.events.send(SessionEvent::UserUpdated(session));
        Ok(())
    }
}

#[derive(Default)]
struct CollectionFaults {
    fail_next: HashMap<Operation, usize>,
    latency: Option<Duration>,
    partial_insert_ack: bool,
}

/// In-memory record collection
pub struct MemoryCollection<R: Record> {
    auth: Arc<MemoryAuth>,
    rows: RwLock<Vec<R>>,
    last_created_at: Mutex<Option<DateTime<Utc>>>,
    faults: Mutex<CollectionFaults>,
    calls: Mutex<HashMap<Operation, usize>>,
}

impl<R: Record> MemoryCollection<R> {
    pub fn new(auth: Arc<MemoryAuth>) -> Self {
        MemoryCollection {
            auth,
            rows: RwLock::new(Vec::new()),
            last_created_at: Mutex::new(None),
            faults: Mutex::new(CollectionFaults::default()),
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Makes the next `count` calls of `operation` fail with a remote error
    pub async fn fail_next(&self, operation: Operation, count: usize) {
        self.faults.lock().await.fail_next.insert(operation, count);
    }

    /// Adds latency to every call
    pub async fn set_latency(&self, latency: Option<Duration>) {
        self.faults.lock().await.latency = latency;
    }

    /// Insert acknowledgments omit server-assigned fields
    pub async fn set_partial_insert_ack(&self, partial: bool) {
        self.faults.lock().await.partial_insert_ack = partial;
    }

    /// Number of calls made of one operation (failed ones included)
    pub async fn calls(&self, operation: Operation) -> usize {
        self.calls.lock().await.get(&operation).copied().unwrap_or(0)
    }

    /// Every stored row, across all owners
    pub async fn all_rows(&self) -> Vec<R> {
        self.rows.read().await.clone()
    }

    /// Common prelude: count, apply latency and faults, check the session
    async fn enter(&self, operation: Operation, session: &Session) -> CrmResult<Uuid> {
        *self.calls.lock().await.entry(operation).or_insert(0) += 1;

        let latency = self.faults.lock().await.latency;
        if let Some(latency) = latency {
            sleep(latency).await;
        }

        {
            let mut faults = self.faults.lock().await;
            if let Some(remaining) = faults.fail_next.get_mut(&operation) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(CrmError::Remote(format!(
                        "Injected {:?} failure on {}",
                        operation,
                        R::COLLECTION
                    )));
                }
            }
        }

        self.auth.verify(session).await
    }

    async fn next_created_at(&self) -> DateTime<Utc> {
        let mut last = self.last_created_at.lock().await;
        let mut now = Utc::now();
        if let Some(prev) = *last {
            if now <= prev {
                now = prev + ChronoDuration::microseconds(1);
            }
        }
        *last = Some(now);
        now
    }
}

#[async_trait]
impl<R: Record> RecordCollection<R> for MemoryCollection<R> {
    async fn list(&self, session: &Session, _order: ListOrder) -> CrmResult<Vec<R>> {
        let owner = self.enter(Operation::List, session).await?;

        let mut listing: Vec<R> = self
            .rows
            .read()
            .await
            .iter()
            .filter(|r| r.owner_id() == owner)
            .cloned()
            .collect();
        sort_listing(&mut listing);

        Ok(listing)
    }

    async fn get_by_id(&self, session: &Session, id: Uuid) -> CrmResult<Option<R>> {
        let owner = self.enter(Operation::GetById, session).await?;

        Ok(self
            .rows
            .read()
            .await
            .iter()
            .find(|r| r.id() == id && r.owner_id() == owner)
            .cloned())
    }

    async fn insert(&self, session: &Session, draft: &R::Draft) -> CrmResult<R> {
        let owner = self.enter(Operation::Insert, session).await?;
        draft.validate()?;

        let record = R::from_draft(
            Uuid::new_v4(),
            owner,
            self.next_created_at().await,
            draft.clone(),
        );
        self.rows.write().await.push(record.clone());

        if self.faults.lock().await.partial_insert_ack {
            return Ok(R::from_draft(
                Uuid::nil(),
                owner,
                DateTime::<Utc>::default(),
                draft.clone(),
            ));
        }

        Ok(record)
    }

    async fn update(&self, session: &Session, id: Uuid, patch: &R::Patch) -> CrmResult<()> {
        let owner = self.enter(Operation::Update, session).await?;
        patch.validate()?;

        let mut rows = self.rows.write().await;
        if let Some(row) = rows.iter_mut().find(|r| r.id() == id && r.owner_id() == owner) {
            row.apply_patch(patch);
        }

        Ok(())
    }

    async fn delete(&self, session: &Session, id: Uuid) -> CrmResult<()> {
        let owner = self.enter(Operation::Delete, session).await?;

        self.rows
            .write()
            .await
            .retain(|r| !(r.id() == id && r.owner_id() == owner));

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContactPatch, NewContact, NewTask};

    async fn signed_in(backend: &MemoryBackend, email: &str) -> Session {
        backend.auth().register(email, "analytical").await.unwrap();
        backend
            .auth()
            .sign_in(&Credentials::new(email, "analytical"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_sign_in_wrong_password() {
        let backend = MemoryBackend::new();
        backend.auth().register("ada@example.com", "analytical").await.unwrap();

        let result = backend
            .auth()
            .sign_in(&Credentials::new("ada@example.com", "wrong-one"))
            .await;
        assert!(matches!(result, Err(CrmError::Auth(_))));
    }

    #[tokio::test]
    async fn test_register_duplicate_and_short_password() {
        let auth = MemoryAuth::new();
        auth.register("ada@example.com", "analytical").await.unwrap();

        assert!(matches!(
            auth.register("ADA@example.com", "analytical").await,
            Err(CrmError::Validation(_))
        ));
        assert!(matches!(
            auth.register("grace@example.com", "abc").await,
            Err(CrmError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_insert_assigns_server_fields() {
        let backend = MemoryBackend::new();
        let session = signed_in(&backend, "ada@example.com").await;

        let contact = backend
            .contacts()
            .insert(&session, &NewContact::new("Ada Lovelace", "ada@example.com"))
            .await
            .unwrap();

        assert!(!contact.id.is_nil());
        assert_eq!(contact.user_id, session.user_id());
    }

    #[tokio::test]
    async fn test_rows_are_scoped_to_owner() {
        let backend = MemoryBackend::new();
        let ada = signed_in(&backend, "ada@example.com").await;
        let created = backend
            .tasks()
            .insert(&ada, &NewTask::new("Write notes", None))
            .await
            .unwrap();

        let grace = signed_in(&backend, "grace@example.com").await;
        let listing = backend.tasks().list(&grace, Task::list_order()).await.unwrap();
        assert!(listing.is_empty());

        let fetched = backend.tasks().get_by_id(&grace, created.id).await.unwrap();
        assert!(fetched.is_none());

        backend.tasks().delete(&grace, created.id).await.unwrap();
        assert_eq!(backend.tasks().all_rows().await.len(), 1);
    }

    #[tokio::test]
    async fn test_remote_revalidates() {
        let backend = MemoryBackend::new();
        let session = signed_in(&backend, "ada@example.com").await;

        let result = backend
            .contacts()
            .insert(&session, &NewContact::new("", "ada@example.com"))
            .await;
        assert!(matches!(result, Err(CrmError::Validation(_))));

        let result = backend
            .contacts()
            .update(&session, Uuid::new_v4(), &ContactPatch::email("nope"))
            .await;
        assert!(matches!(result, Err(CrmError::Validation(_))));
    }

    #[tokio::test]
    async fn test_update_and_delete_are_idempotent() {
        let backend = MemoryBackend::new();
        let session = signed_in(&backend, "ada@example.com").await;
        let contacts = backend.contacts();

        let c = contacts
            .insert(&session, &NewContact::new("Ada", "ada@example.com"))
            .await
            .unwrap();

        contacts.update(&session, c.id, &ContactPatch::name("Ada L.")).await.unwrap();
        contacts.update(&session, c.id, &ContactPatch::name("Ada L.")).await.unwrap();
        contacts.delete(&session, c.id).await.unwrap();
        contacts.delete(&session, c.id).await.unwrap();
        contacts.update(&session, c.id, &ContactPatch::name("Ghost")).await.unwrap();

        assert!(contacts.all_rows().await.is_empty());
    }

    #[tokio::test]
    async fn test_fail_next_and_call_counts() {
        let backend = MemoryBackend::new();
        let session = signed_in(&backend, "ada@example.com").await;
        let contacts = backend.contacts();

        contacts.fail_next(Operation::List, 2).await;
        assert!(contacts.list(&session, Contact::list_order()).await.is_err());
        assert!(contacts.list(&session, Contact::list_order()).await.is_err());
        assert!(contacts.list(&session, Contact::list_order()).await.is_ok());
        assert_eq!(contacts.calls(Operation::List).await, 3);
        assert_eq!(contacts.calls(Operation::Insert).await, 0);
    }

    #[tokio::test]
    async fn test_signed_out_token_is_rejected() {
        let backend = MemoryBackend::new();
        let session = signed_in(&backend, "ada@example.com").await;

        backend.auth().sign_out().await.unwrap();

        let result = backend.contacts().list(&session, Contact::list_order()).await;
        assert!(matches!(result, Err(CrmError::Auth(_))));
        assert_eq!(backend.auth().get_session().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_failed_sign_out_drops_local_session_only() {
        let backend = MemoryBackend::new();
        let session = signed_in(&backend, "ada@example.com").await;
        backend.auth().fail_sign_outs(true).await;

        let result = backend.auth().sign_out().await;

        assert!(matches!(result, Err(CrmError::Remote(_))));
        assert_eq!(backend.auth().get_session().await.unwrap(), None);
        assert!(backend.auth().verify(&session).await.is_ok());
    }

    #[tokio::test]
    async fn test_expired_session_is_refreshed() {
        let backend = MemoryBackend::new();
        let auth = backend.auth();
        auth.register("ada@example.com", "analytical").await.unwrap();
        auth.set_access_ttl(ChronoDuration::seconds(-5)).await;

        let mut events = auth.subscribe();
        let expired = auth
            .sign_in(&Credentials::new("ada@example.com", "analytical"))
            .await
            .unwrap();
        assert!(expired.is_expired());
        assert!(matches!(events.recv().await.unwrap(), SessionEvent::SignedIn(_)));

        auth.set_access_ttl(ChronoDuration::hours(1)).await;
        let refreshed = auth.get_session().await.unwrap().unwrap();
        assert!(!refreshed.is_expired());
        assert!(matches!(events.recv().await.unwrap(), SessionEvent::TokenRefreshed(_)));
    }

    #[tokio::test]
    async fn test_update_credential() {
        let backend = MemoryBackend::new();
        let _session = signed_in(&backend, "ada@example.com").await;
        let auth = backend.auth();

        assert!(matches!(
            auth.update_credential("abc").await,
            Err(CrmError::Validation(_))
        ));
        auth.update_credential("difference-engine").await.unwrap();
        auth.sign_out().await.unwrap();

        assert!(auth
            .sign_in(&Credentials::new("ada@example.com", "analytical"))
            .await
            .is_err());
        assert!(auth
            .sign_in(&Credentials::new("ada@example.com", "difference-engine"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_partial_insert_ack() {
        let backend = MemoryBackend::new();
        let session = signed_in(&backend, "ada@example.com").await;
        backend.tasks().set_partial_insert_ack(true).await;

        let ack = backend
            .tasks()
            .insert(&session, &NewTask::new("Write notes", None))
            .await
            .unwrap();
        assert!(ack.id.is_nil());

        let stored = backend.tasks().all_rows().await;
        assert_eq!(stored.len(), 1);
        assert!(!stored[0].id.is_nil());
    }
}
