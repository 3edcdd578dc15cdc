/// REST backend for the hosted auth and record API
///
/// Speaks the GoTrue-compatible auth endpoints and the PostgREST-compatible
/// record endpoints exposed by the hosted backend.
///
/// # Endpoints
///
/// - `POST /auth/v1/token?grant_type=password` - Sign in
/// - `POST /auth/v1/token?grant_type=refresh_token` - Refresh an expired session
/// - `GET /auth/v1/user` - Confirm the session is still accepted
/// - `PUT /auth/v1/user` - Update the password
/// - `POST /auth/v1/logout` - Sign out
/// - `GET|POST|PATCH|DELETE /rest/v1/{collection}` - Records
///
/// Every request carries the project `apikey` header. Authenticated requests
/// carry `Authorization: Bearer <access token>`, and record requests are also
/// filtered by `user_id=eq.<user>` so scoping holds even with permissive
/// row-level policies.
///
/// # Errors
///
/// HTTP failures are mapped into [`CrmError`]:
///
/// - `401`, `403` → `Auth`
/// - `404`, `406` → `NotFound`
/// - `400`, `409`, `422` → `Validation` (remote message surfaced verbatim)
/// - anything else → `Remote`

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use super::{AuthService, RecordCollection, SESSION_EVENT_CAPACITY};
use crate::error::{CrmError, CrmResult};
use crate::models::{Contact, Credentials, ListOrder, Record, Session, SessionEvent, Task, User};

/// Connection settings for the hosted backend
#[derive(Debug, Clone)]
pub struct RestConfig {
    /// Project URL, e.g. `https://xyzcompany.example.co`
    pub base_url: String,

    /// Public (anon) API key
    pub anon_key: String,

    /// Per-request timeout
    pub timeout: Duration,
}

impl RestConfig {
    pub fn new(base_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        RestConfig {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Clone)]
struct RestClient {
    http: Client,
    config: RestConfig,
}

impl RestClient {
    fn new(config: RestConfig) -> CrmResult<Self> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(RestClient { http, config })
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.config.base_url, path)
    }

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/rest/v1/{}", self.config.base_url, collection)
    }

    fn with_key(&self, request: RequestBuilder) -> RequestBuilder {
        request.header("apikey", &self.config.anon_key)
    }

    fn with_session(&self, request: RequestBuilder, session: &Session) -> RequestBuilder {
        self.with_key(request).bearer_auth(&session.access_token)
    }
}

/// Error payload shapes returned by the auth and record endpoints
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    msg: Option<String>,
    error_description: Option<String>,
    error: Option<String>,
}

impl ErrorBody {
    fn text(self) -> Option<String> {
        self.message
            .or(self.msg)
            .or(self.error_description)
            .or(self.error)
    }
}

/// Maps a failed HTTP status and body to the closed error enumeration
fn map_status(status: StatusCode, body: &str) -> CrmError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(ErrorBody::text)
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Unexpected response")
                .to_string()
        });

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => CrmError::Auth(message),
        StatusCode::NOT_FOUND | StatusCode::NOT_ACCEPTABLE => CrmError::NotFound(message),
        StatusCode::BAD_REQUEST | StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
            CrmError::Validation(message)
        }
        _ => CrmError::Remote(format!("{}: {}", status, message)),
    }
}

async fn check(response: Response) -> CrmResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(map_status(status, &body))
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: Uuid,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: AuthUser,
}

impl TokenResponse {
    fn into_session(self, now: DateTime<Utc>) -> Session {
        let expires_at = match (self.expires_at, self.expires_in) {
            (Some(at), _) => Utc.timestamp_opt(at, 0).single(),
            (None, Some(seconds)) => Some(now + chrono::Duration::seconds(seconds)),
            (None, None) => None,
        };

        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: User {
                id: self.user.id,
                email: self.user.email.unwrap_or_default(),
            },
        }
    }
}

/// Row sent on insert: the draft's fields plus the owner
#[derive(Serialize)]
struct InsertRow<'a, D: Serialize> {
    #[serde(flatten)]
    fields: &'a D,
    user_id: Uuid,
}

/// Auth and record collections backed by the hosted service
#[derive(Clone)]
pub struct RestBackend {
    auth: Arc<RestAuth>,
    contacts: Arc<RestCollection<Contact>>,
    tasks: Arc<RestCollection<Task>>,
}

impl RestBackend {
    pub fn new(config: RestConfig) -> CrmResult<Self> {
        let client = RestClient::new(config)?;

        Ok(RestBackend {
            auth: Arc::new(RestAuth::new(client.clone())),
            contacts: Arc::new(RestCollection::new(client.clone())),
            tasks: Arc::new(RestCollection::new(client)),
        })
    }

    pub fn auth(&self) -> Arc<RestAuth> {
        self.auth.clone()
    }

    pub fn contacts(&self) -> Arc<RestCollection<Contact>> {
        self.contacts.clone()
    }

    pub fn tasks(&self) -> Arc<RestCollection<Task>> {
        self.tasks.clone()
    }
}

/// Hosted auth service client
pub struct RestAuth {
    client: RestClient,
    current: RwLock<Option<Session>>,
    events: broadcast::Sender<SessionEvent>,
}

impl RestAuth {
    fn new(client: RestClient) -> Self {
        let (events, _) = broadcast::channel(SESSION_EVENT_CAPACITY);
        RestAuth {
            client,
            current: RwLock::new(None),
            events,
        }
    }

    async fn token_grant<B: Serialize + ?Sized>(&self, grant_type: &str, body: &B) -> CrmResult<Session> {
        let request = self
            .client
            .http
            .post(self.client.auth_url("token"))
            .query(&[("grant_type", grant_type)])
            .json(body);

        let response = check(self.client.with_key(request).send().await?).await?;
        let token: TokenResponse = response.json().await?;
        Ok(token.into_session(Utc::now()))
    }

    async fn refresh(&self, expired: &Session) -> CrmResult<Session> {
        let refresh_token = expired
            .refresh_token
            .clone()
            .ok_or_else(|| CrmError::Auth("Session expired".to_string()))?;

        self.token_grant(
            "refresh_token",
            &serde_json::json!({ "refresh_token": refresh_token }),
        )
        .await
    }

    /// Asks the auth service whether the access token is still accepted
    async fn confirm(&self, session: &Session) -> CrmResult<()> {
        let request = self.client.http.get(self.client.auth_url("user"));
        check(self.client.with_session(request, session).send().await?).await?;
        Ok(())
    }

    async fn drop_session(&self) {
        *self.current.write().await = None;
        let _ = self.events.send(SessionEvent::SignedOut);
    }
}

#[async_trait]
impl AuthService for RestAuth {
    async fn sign_in(&self, credentials: &Credentials) -> CrmResult<Session> {
        let session = self
            .token_grant(
                "password",
                &serde_json::json!({
                    "email": credentials.email,
                    "password": credentials.password,
                }),
            )
            .await
            .map_err(|e| match e {
                // The token endpoint answers bad credentials with 400
                CrmError::Validation(msg) => CrmError::Auth(msg),
                other => other,
            })?;

        *self.current.write().await = Some(session.clone());
        let _ = self.events.send(SessionEvent::SignedIn(session.clone()));

        tracing::info!(user_id = %session.user_id(), "Signed in");
        Ok(session)
    }

    async fn sign_out(&self) -> CrmResult<()> {
        let session = self.current.read().await.clone();

        let result = match &session {
            Some(session) => {
                let request = self.client.http.post(self.client.auth_url("logout"));
                match self.client.with_session(request, session).send().await {
                    Ok(response) => check(response).await.map(|_| ()),
                    Err(e) => Err(e.into()),
                }
            }
            None => Ok(()),
        };

        self.drop_session().await;
        result
    }

    async fn get_session(&self) -> CrmResult<Option<Session>> {
        let current = self.current.read().await.clone();
        let Some(session) = current else {
            return Ok(None);
        };

        if session.is_expired() {
            return match self.refresh(&session).await {
                Ok(refreshed) => {
                    *self.current.write().await = Some(refreshed.clone());
                    let _ = self.events.send(SessionEvent::TokenRefreshed(refreshed.clone()));
                    tracing::debug!(user_id = %refreshed.user_id(), "Session refreshed");
                    Ok(Some(refreshed))
                }
                Err(CrmError::Auth(_)) | Err(CrmError::Validation(_)) => {
                    self.drop_session().await;
                    Ok(None)
                }
                Err(e) => Err(e),
            };
        }

        match self.confirm(&session).await {
            Ok(()) => Ok(Some(session)),
            Err(CrmError::Auth(_)) => {
                self.drop_session().await;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    async fn update_credential(&self, new_secret: &str) -> CrmResult<()> {
        let session = self
            .current
            .read()
            .await
            .clone()
            .ok_or_else(CrmError::no_session)?;

        let request = self
            .client
            .http
            .put(self.client.auth_url("user"))
            .json(&serde_json::json!({ "password": new_secret }));
        check(self.client.with_session(request, &session).send().await?).await?;

        let _ = self.events.send(SessionEvent::UserUpdated(session));
        Ok(())
    }
}

/// Hosted record collection for one entity kind
pub struct RestCollection<R: Record> {
    client: RestClient,
    _record: PhantomData<fn() -> R>,
}

impl<R: Record> RestCollection<R> {
    fn new(client: RestClient) -> Self {
        RestCollection {
            client,
            _record: PhantomData,
        }
    }

    fn scoped(&self, request: RequestBuilder, session: &Session) -> RequestBuilder {
        self.client
            .with_session(request, session)
            .query(&[("user_id", format!("eq.{}", session.user_id()))])
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> CrmResult<T> {
        let response = check(request.send().await?).await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl<R: Record> RecordCollection<R> for RestCollection<R> {
    async fn list(&self, session: &Session, order: ListOrder) -> CrmResult<Vec<R>> {
        let request = self
            .client
            .http
            .get(self.client.collection_url(R::COLLECTION))
            .query(&[("select", "*".to_string()), ("order", order.to_query_value())]);

        let rows: Vec<R> = self.fetch(self.scoped(request, session)).await?;
        tracing::debug!(collection = R::COLLECTION, count = rows.len(), "Listed records");
        Ok(rows)
    }

    async fn get_by_id(&self, session: &Session, id: Uuid) -> CrmResult<Option<R>> {
        let request = self
            .client
            .http
            .get(self.client.collection_url(R::COLLECTION))
            .query(&[
                ("select", "*".to_string()),
                ("id", format!("eq.{}", id)),
                ("limit", "1".to_string()),
            ]);

        let rows: Vec<R> = self.fetch(self.scoped(request, session)).await?;
        Ok(rows.into_iter().next())
    }

    async fn insert(&self, session: &Session, draft: &R::Draft) -> CrmResult<R> {
        let row = InsertRow {
            fields: draft,
            user_id: session.user_id(),
        };
        let request = self
            .client
            .http
            .post(self.client.collection_url(R::COLLECTION))
            .header("Prefer", "return=representation")
            .json(&row);

        let rows: Vec<R> = self.fetch(self.client.with_session(request, session)).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| CrmError::Remote("Insert acknowledged without a row".to_string()))
    }

    async fn update(&self, session: &Session, id: Uuid, patch: &R::Patch) -> CrmResult<()> {
        let request = self
            .client
            .http
            .patch(self.client.collection_url(R::COLLECTION))
            .query(&[("id", format!("eq.{}", id))])
            .header("Prefer", "return=minimal")
            .json(patch);

        check(self.scoped(request, session).send().await?).await?;
        Ok(())
    }

    async fn delete(&self, session: &Session, id: Uuid) -> CrmResult<()> {
        let request = self
            .client
            .http
            .delete(self.client.collection_url(R::COLLECTION))
            .query(&[("id", format!("eq.{}", id))]);

        check(self.scoped(request, session).send().await?).await?;
        Ok(())
    }
}
