//! Common test utilities for integration tests
//!
//! Builds a signed-in screen stack over the in-memory backend:
//! - Memory backend with one registered user
//! - Mounted session guard on an in-memory location
//! - Contact and task stores sharing one feedback channel

#![allow(dead_code)]

use sparkcrm_shared::models::{Contact, Credentials, Task};
use sparkcrm_shared::remote::MemoryBackend;
use sparkcrm_sync::config::SyncConfig;
use sparkcrm_sync::feedback::FeedbackChannel;
use sparkcrm_sync::location::MemoryLocation;
use sparkcrm_sync::routes;
use sparkcrm_sync::session::SessionGuard;
use sparkcrm_sync::store::RecordStore;
use std::sync::Arc;
use tokio::task::JoinHandle;

pub const EMAIL: &str = "ada@example.com";
pub const PASSWORD: &str = "analytical";

/// Test context containing the whole core
pub struct TestContext {
    pub backend: MemoryBackend,
    pub location: Arc<MemoryLocation>,
    pub feedback: FeedbackChannel,
    pub guard: SessionGuard,
    pub contacts: RecordStore<Contact>,
    pub tasks: RecordStore<Task>,
    pub listener: JoinHandle<()>,
}

impl TestContext {
    /// Registered but signed out, guard mounted at `path`
    pub async fn signed_out(path: &str) -> Self {
        let backend = MemoryBackend::new();
        backend
            .auth()
            .register(EMAIL, PASSWORD)
            .await
            .expect("register test user");

        Self::mount(backend, path).await
    }

    /// Signed in, then moved to `path`, with the feedback queue cleared
    pub async fn signed_in(path: &str) -> Self {
        let ctx = Self::signed_out(routes::LOGIN).await;
        ctx.guard
            .sign_in(&Credentials::new(EMAIL, PASSWORD))
            .await
            .expect("sign in test user");

        ctx.guard.open(path);
        ctx.clear_feedback();
        ctx
    }

    pub async fn mount(backend: MemoryBackend, path: &str) -> Self {
        let config = SyncConfig::default();
        let location = Arc::new(MemoryLocation::new(path));
        let feedback = FeedbackChannel::from_config(&config);

        let guard = SessionGuard::new(backend.auth(), location.clone(), feedback.clone(), &config);
        let listener = guard.mount().await;

        let contacts = RecordStore::new(backend.contacts(), guard.reader(), feedback.clone());
        let tasks = RecordStore::new(backend.tasks(), guard.reader(), feedback.clone());

        TestContext {
            backend,
            location,
            feedback,
            guard,
            contacts,
            tasks,
            listener,
        }
    }

    /// Messages currently visible, oldest first
    pub fn messages(&self) -> Vec<String> {
        self.feedback
            .visible()
            .into_iter()
            .map(|r| r.message)
            .collect()
    }

    pub fn clear_feedback(&self) {
        for report in self.feedback.visible() {
            self.feedback.dismiss(report.id);
        }
    }
}
