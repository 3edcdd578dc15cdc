/// Session guard
///
/// Decides whether a screen may render based on authentication state and
/// keeps the process-wide session state current.
///
/// # Lifecycle
///
/// 1. **Loading**: until [`SessionGuard::mount`] finishes its existence check,
///    every route answers [`AccessDecision::Loading`]
/// 2. **Check**: one `get_session` call bounded by the configured timeout.
///    Failure or timeout counts as signed out
/// 3. **Listen**: a background task applies session changes pushed by the
///    auth service and re-evaluates the current location after each one
///
/// # Session State
///
/// The published state has exactly one writer, the [`SessionPublisher`] owned
/// by the guard. Stores and resolvers hold a [`SessionReader`].
///
/// # Example
///
/// ```no_run
/// use sparkcrm_shared::models::Credentials;
/// use sparkcrm_shared::remote::MemoryBackend;
/// use sparkcrm_sync::config::SyncConfig;
/// use sparkcrm_sync::feedback::FeedbackChannel;
/// use sparkcrm_sync::location::MemoryLocation;
/// use sparkcrm_sync::session::{AccessDecision, SessionGuard};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MemoryBackend::new();
/// let location = Arc::new(MemoryLocation::new("/tasks"));
/// let guard = SessionGuard::new(
///     backend.auth(),
///     location.clone(),
///     FeedbackChannel::default(),
///     &SyncConfig::default(),
/// );
///
/// let listener = guard.mount().await;
/// assert_eq!(guard.decision(), AccessDecision::Render);
///
/// guard.sign_in(&Credentials::new("ada@example.com", "analytical")).await?;
/// guard.unmount();
/// listener.await?;
/// # Ok(())
/// # }
/// ```

use sparkcrm_shared::auth::password::validate_password_length;
use sparkcrm_shared::error::{CrmError, CrmResult};
use sparkcrm_shared::models::{Credentials, Session, SessionEvent};
use sparkcrm_shared::remote::AuthService;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use validator::Validate;

use crate::config::SyncConfig;
use crate::feedback::{Action, FeedbackChannel, Outcome};
use crate::location::Location;
use crate::routes::{self, Route};

/// Published authentication state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Existence check still pending
    Loading,
    SignedOut,
    SignedIn(Session),
}

impl SessionState {
    pub fn session(&self) -> Option<&Session> {
        match self {
            SessionState::SignedIn(session) => Some(session),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, SessionState::Loading)
    }
}

/// Sole writer of the session state
pub struct SessionPublisher {
    tx: watch::Sender<SessionState>,
    stale: Arc<Notify>,
}

impl SessionPublisher {
    /// Starts in [`SessionState::Loading`]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(SessionState::Loading);
        SessionPublisher {
            tx,
            stale: Arc::new(Notify::new()),
        }
    }

    /// Replaces the whole state
    pub fn publish(&self, state: SessionState) {
        self.tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }

    pub fn reader(&self) -> SessionReader {
        SessionReader {
            rx: self.tx.subscribe(),
            stale: self.stale.clone(),
        }
    }
}

impl Default for SessionPublisher {
    fn default() -> Self {
        Self::new()
    }
}

/// Read handle on the session state
#[derive(Clone)]
pub struct SessionReader {
    rx: watch::Receiver<SessionState>,
    stale: Arc<Notify>,
}

impl SessionReader {
    pub fn state(&self) -> SessionState {
        self.rx.borrow().clone()
    }

    /// Current session; an expired one counts as absent
    ///
    /// Finding an expired session wakes the guard's listener, which re-checks
    /// with the auth service and publishes the outcome.
    pub fn session(&self) -> Option<Session> {
        let state = self.rx.borrow();
        let session = state.session()?;
        if session.is_expired() {
            self.stale.notify_one();
            return None;
        }
        Some(session.clone())
    }

    /// Waits for the next state change
    pub async fn changed(&mut self) -> Option<SessionState> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }
}

/// Whether a route may render
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    /// Session check pending; protected content must not render
    Loading,
    Render,
    Redirect { to: &'static str },
    NotFound,
}

/// Access table for one route given the current state
pub fn access_for(route: Route, state: &SessionState) -> AccessDecision {
    let signed_in = match state {
        SessionState::Loading => return AccessDecision::Loading,
        SessionState::SignedOut => false,
        SessionState::SignedIn(session) => !session.is_expired(),
    };

    match route {
        Route::NotFound => AccessDecision::NotFound,
        Route::Root => AccessDecision::Redirect {
            to: routes::DASHBOARD,
        },
        Route::Login if signed_in => AccessDecision::Redirect {
            to: routes::DASHBOARD,
        },
        Route::Login | Route::ResetPassword => AccessDecision::Render,
        protected if protected.is_protected() && !signed_in => AccessDecision::Redirect {
            to: routes::LOGIN,
        },
        _ => AccessDecision::Render,
    }
}

struct GuardInner {
    auth: Arc<dyn AuthService>,
    location: Arc<dyn Location>,
    feedback: FeedbackChannel,
    publisher: SessionPublisher,
    check_timeout: Duration,
    shutdown: CancellationToken,
}

impl GuardInner {
    fn state(&self) -> SessionState {
        self.publisher.tx.borrow().clone()
    }

    fn decision(&self) -> AccessDecision {
        access_for(Route::parse(&self.location.path()), &self.state())
    }

    /// Follows a redirect for the current location, if any
    fn enforce(&self) -> AccessDecision {
        let mut decision = self.decision();

        // `/` redirects to a protected route, which may redirect again
        for _ in 0..2 {
            let AccessDecision::Redirect { to } = decision else {
                break;
            };
            tracing::debug!(from = %self.location.path(), to = to, "Redirecting");
            self.location.navigate(to);
            decision = self.decision();
        }

        decision
    }

    fn apply_event(&self, event: &SessionEvent) {
        let state = match event.session() {
            Some(session) if !session.is_expired() => SessionState::SignedIn(session.clone()),
            _ => SessionState::SignedOut,
        };

        tracing::info!(event = event.name(), "Session changed");
        self.publisher.publish(state);
        self.enforce();
    }

    /// Asks the auth service again and enforces whatever it answers
    async fn recheck(&self) {
        let state = self.check().await;
        self.publisher.publish(state);
        self.enforce();
    }

    async fn check(&self) -> SessionState {
        match timeout(self.check_timeout, self.auth.get_session()).await {
            Ok(Ok(Some(session))) if !session.is_expired() => SessionState::SignedIn(session),
            Ok(Ok(_)) => SessionState::SignedOut,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Session check failed, treating as signed out");
                SessionState::SignedOut
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.check_timeout.as_millis() as u64,
                    "Session check timed out, treating as signed out"
                );
                SessionState::SignedOut
            }
        }
    }
}

/// Gate in front of protected screens
#[derive(Clone)]
pub struct SessionGuard {
    inner: Arc<GuardInner>,
}

impl SessionGuard {
    pub fn new(
        auth: Arc<dyn AuthService>,
        location: Arc<dyn Location>,
        feedback: FeedbackChannel,
        config: &SyncConfig,
    ) -> Self {
        SessionGuard {
            inner: Arc::new(GuardInner {
                auth,
                location,
                feedback,
                publisher: SessionPublisher::new(),
                check_timeout: config.session_check_timeout,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Runs the existence check, enforces the current route and starts
    /// listening for session changes
    ///
    /// # Returns
    ///
    /// Join handle for the listener task; it ends after [`SessionGuard::unmount`]
    pub async fn mount(&self) -> JoinHandle<()> {
        // Subscribe first so nothing pushed during the check is missed
        let events = self.inner.auth.subscribe();

        let state = self.inner.check().await;
        tracing::info!(signed_in = state.session().is_some(), "Session check complete");
        self.inner.publisher.publish(state);
        self.inner.enforce();

        let inner = self.inner.clone();
        tokio::spawn(async move {
            listen_loop(inner, events).await;
        })
    }

    /// Stops the listener
    pub fn unmount(&self) {
        self.inner.shutdown.cancel();
    }

    pub fn current_session(&self) -> Option<Session> {
        self.reader().session()
    }

    pub fn state(&self) -> SessionState {
        self.inner.state()
    }

    pub fn reader(&self) -> SessionReader {
        self.inner.publisher.reader()
    }

    pub fn feedback(&self) -> &FeedbackChannel {
        &self.inner.feedback
    }

    /// Access decision for the current location
    pub fn decision(&self) -> AccessDecision {
        self.inner.decision()
    }

    /// Access decision for an arbitrary path
    pub fn authorize(&self, path: &str) -> AccessDecision {
        access_for(Route::parse(path), &self.inner.state())
    }

    /// Navigates, then follows any redirect the route table demands
    pub fn open(&self, target: &str) -> AccessDecision {
        self.inner.location.navigate(target);
        self.inner.enforce()
    }

    /// Exchanges credentials for a session and goes to the dashboard
    pub async fn sign_in(&self, credentials: &Credentials) -> CrmResult<Session> {
        let result = self.try_sign_in(credentials).await;
        self.inner
            .feedback
            .report(Outcome::from_result(Action::SignedIn, "", &result));

        if let Ok(session) = &result {
            tracing::info!(user_id = %session.user_id(), "Signed in");
            self.inner.location.navigate(routes::DASHBOARD);
        }
        result
    }

    async fn try_sign_in(&self, credentials: &Credentials) -> CrmResult<Session> {
        credentials.validate()?;
        let session = self.inner.auth.sign_in(credentials).await?;
        self.inner
            .publisher
            .publish(SessionState::SignedIn(session.clone()));
        Ok(session)
    }

    /// Ends the session
    ///
    /// Local state is cleared and the location moves to the login screen even
    /// when the remote call fails; that failure is still reported and returned.
    pub async fn sign_out(&self) -> CrmResult<()> {
        let result = self.inner.auth.sign_out().await;
        if let Err(e) = &result {
            tracing::warn!(error = %e, "Remote sign-out failed, clearing local session anyway");
        }

        self.inner.publisher.publish(SessionState::SignedOut);
        self.inner.location.navigate(routes::LOGIN);
        self.inner
            .feedback
            .report(Outcome::from_result(Action::SignedOut, "", &result));

        result
    }

    /// Replaces the signed-in user's password and goes to the dashboard
    pub async fn update_credential(&self, new_secret: &str) -> CrmResult<()> {
        let result = self.try_update_credential(new_secret).await;
        self.inner
            .feedback
            .report(Outcome::from_result(Action::CredentialUpdated, "", &result));

        if result.is_ok() {
            self.inner.location.navigate(routes::DASHBOARD);
        }
        result
    }

    async fn try_update_credential(&self, new_secret: &str) -> CrmResult<()> {
        self.current_session().ok_or_else(CrmError::no_session)?;
        validate_password_length(new_secret).map_err(CrmError::Validation)?;
        self.inner.auth.update_credential(new_secret).await
    }
}

/// Background listen loop
async fn listen_loop(inner: Arc<GuardInner>, mut events: broadcast::Receiver<SessionEvent>) {
    tracing::debug!("Starting session listener");

    loop {
        tokio::select! {
            _ = inner.shutdown.cancelled() => {
                tracing::debug!("Session listener unmounted");
                break;
            }
            _ = inner.publisher.stale.notified() => {
                tracing::info!("Published session expired, re-checking");
                inner.recheck().await;
            }
            received = events.recv() => {
                match received {
                    Ok(event) => {
                        let latest = drain_latest(&mut events, event);
                        inner.apply_event(&latest);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped = skipped, "Session listener lagged, re-checking");
                        inner.recheck().await;
                    }
                    Err(RecvError::Closed) => {
                        tracing::debug!("Session change stream ended");
                        break;
                    }
                }
            }
        }
    }

    tracing::debug!("Session listener stopped");
}

/// Collapses queued events into the newest one
///
/// Events are whole-state replacements, so only the last queued one matters.
fn drain_latest(
    events: &mut broadcast::Receiver<SessionEvent>,
    mut latest: SessionEvent,
) -> SessionEvent {
    loop {
        match events.try_recv() {
            Ok(event) => latest = event,
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return latest,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sparkcrm_shared::models::User;
    use uuid::Uuid;

    fn session() -> Session {
        Session {
            access_token: "token".to_string(),
            refresh_token: None,
            expires_at: None,
            user: User {
                id: Uuid::new_v4(),
                email: "ada@example.com".to_string(),
            },
        }
    }

    #[test]
    fn test_access_table_signed_out() {
        let state = SessionState::SignedOut;
        let to_login = AccessDecision::Redirect { to: routes::LOGIN };

        assert_eq!(access_for(Route::Dashboard, &state), to_login);
        assert_eq!(access_for(Route::Contacts, &state), to_login);
        assert_eq!(access_for(Route::Tasks, &state), to_login);
        assert_eq!(access_for(Route::Login, &state), AccessDecision::Render);
        assert_eq!(access_for(Route::ResetPassword, &state), AccessDecision::Render);
        assert_eq!(
            access_for(Route::Root, &state),
            AccessDecision::Redirect { to: routes::DASHBOARD }
        );
        assert_eq!(access_for(Route::NotFound, &state), AccessDecision::NotFound);
    }

    #[test]
    fn test_access_table_signed_in() {
        let state = SessionState::SignedIn(session());

        assert_eq!(access_for(Route::Tasks, &state), AccessDecision::Render);
        assert_eq!(access_for(Route::ResetPassword, &state), AccessDecision::Render);
        assert_eq!(
            access_for(Route::Login, &state),
            AccessDecision::Redirect { to: routes::DASHBOARD }
        );
        assert_eq!(access_for(Route::NotFound, &state), AccessDecision::NotFound);
    }

    #[test]
    fn test_loading_blocks_everything() {
        for route in [Route::Tasks, Route::Login, Route::NotFound, Route::Root] {
            assert_eq!(access_for(route, &SessionState::Loading), AccessDecision::Loading);
        }
    }

    #[test]
    fn test_expired_session_is_absent() {
        let mut expired = session();
        expired.expires_at = Some(chrono::Utc::now() - chrono::Duration::seconds(1));
        let state = SessionState::SignedIn(expired);

        assert_eq!(
            access_for(Route::Tasks, &state),
            AccessDecision::Redirect { to: routes::LOGIN }
        );

        let publisher = SessionPublisher::new();
        publisher.publish(state);
        assert_eq!(publisher.reader().session(), None);
    }

    #[tokio::test]
    async fn test_reading_expired_session_wakes_listener() {
        let mut expired = session();
        expired.expires_at = Some(chrono::Utc::now() - chrono::Duration::seconds(1));
        let publisher = SessionPublisher::new();
        let reader = publisher.reader();

        publisher.publish(SessionState::SignedIn(session()));
        assert!(reader.session().is_some());

        publisher.publish(SessionState::SignedIn(expired));
        assert_eq!(reader.session(), None);
        tokio::time::timeout(Duration::from_secs(1), publisher.stale.notified())
            .await
            .expect("expired read should wake the listener");
    }

    #[tokio::test]
    async fn test_publisher_skips_identical_state() {
        let publisher = SessionPublisher::new();
        let mut reader = publisher.reader();

        publisher.publish(SessionState::SignedOut);
        assert_eq!(reader.changed().await, Some(SessionState::SignedOut));

        publisher.publish(SessionState::SignedOut);
        assert!(!reader.rx.has_changed().unwrap());
    }

    #[test]
    fn test_drain_latest() {
        let (tx, mut rx) = broadcast::channel(4);
        tx.send(SessionEvent::SignedIn(session())).unwrap();
        tx.send(SessionEvent::SignedOut).unwrap();

        let first = rx.try_recv().unwrap();
        assert_eq!(drain_latest(&mut rx, first), SessionEvent::SignedOut);
    }
}
