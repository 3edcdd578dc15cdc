/// Integration tests for session change notifications
///
/// Drives the in-memory auth service through a full session lifecycle and
/// checks what a subscriber observes.
/// Run with: cargo test -p sparkcrm-shared --test session_events_tests

use chrono::Duration as ChronoDuration;
use sparkcrm_shared::error::CrmError;
use sparkcrm_shared::models::{Credentials, SessionEvent};
use sparkcrm_shared::remote::{AuthService, MemoryBackend};

const EMAIL: &str = "ada@example.com";
const PASSWORD: &str = "analytical";

#[tokio::test]
async fn test_lifecycle_event_order() {
    let backend = MemoryBackend::new();
    let auth = backend.auth();
    auth.register(EMAIL, PASSWORD).await.unwrap();
    let mut events = auth.subscribe();

    auth.set_access_ttl(ChronoDuration::seconds(-1)).await;
    let expired = auth.sign_in(&Credentials::new(EMAIL, PASSWORD)).await.unwrap();
    auth.set_access_ttl(ChronoDuration::hours(1)).await;

    let refreshed = auth.get_session().await.unwrap().unwrap();
    assert_ne!(refreshed.access_token, expired.access_token);

    auth.update_credential("difference-engine").await.unwrap();
    auth.sign_out().await.unwrap();

    let mut names = Vec::new();
    while let Ok(event) = events.try_recv() {
        names.push(event.name());
    }
    assert_eq!(
        names,
        vec!["signed_in", "token_refreshed", "user_updated", "signed_out"]
    );
}

#[tokio::test]
async fn test_updated_credential_replaces_old_one() {
    let backend = MemoryBackend::new();
    let auth = backend.auth();
    auth.register(EMAIL, PASSWORD).await.unwrap();
    auth.sign_in(&Credentials::new(EMAIL, PASSWORD)).await.unwrap();

    auth.update_credential("difference-engine").await.unwrap();
    auth.sign_out().await.unwrap();

    let old = auth.sign_in(&Credentials::new(EMAIL, PASSWORD)).await;
    assert!(matches!(old, Err(CrmError::Auth(_))));

    let new = auth
        .sign_in(&Credentials::new(EMAIL, "difference-engine"))
        .await
        .unwrap();
    assert_eq!(new.email(), EMAIL);
}

#[tokio::test]
async fn test_external_revoke_notifies_and_clears() {
    let backend = MemoryBackend::new();
    let auth = backend.auth();
    auth.register(EMAIL, PASSWORD).await.unwrap();
    auth.sign_in(&Credentials::new(EMAIL, PASSWORD)).await.unwrap();
    let mut events = auth.subscribe();

    auth.revoke_externally().await;

    assert_eq!(events.recv().await.unwrap(), SessionEvent::SignedOut);
    assert_eq!(auth.get_session().await.unwrap(), None);
}
