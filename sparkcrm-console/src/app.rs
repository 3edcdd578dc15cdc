/// Application wiring
///
/// Builds the remote backend named by the configuration, mounts the session
/// guard on an in-memory location and signs in when no session exists yet.
///
/// # Example
///
/// ```no_run
/// use sparkcrm_console::app::App;
/// use sparkcrm_console::config::Config;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let app = App::connect(&config, "/tasks").await?;
/// let tasks = app.tasks.list().await?;
/// println!("{} tasks", tasks.len());
/// app.shutdown();
/// # Ok(())
/// # }
/// ```

use chrono::{Duration, Utc};
use sparkcrm_shared::models::{Contact, Credentials, NewContact, NewTask, Task};
use sparkcrm_shared::remote::{AuthService, MemoryBackend, RecordCollection, RestBackend};
use sparkcrm_sync::config::SyncConfig;
use sparkcrm_sync::feedback::FeedbackChannel;
use sparkcrm_sync::location::MemoryLocation;
use sparkcrm_sync::routes;
use sparkcrm_sync::session::SessionGuard;
use sparkcrm_sync::store::RecordStore;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::config::{BackendConfig, Config, LoginConfig, DEMO_EMAIL, DEMO_PASSWORD};

/// Remote collaborators behind trait objects
pub struct Remote {
    pub auth: Arc<dyn AuthService>,
    pub contacts: Arc<dyn RecordCollection<Contact>>,
    pub tasks: Arc<dyn RecordCollection<Task>>,
}

impl Remote {
    pub fn rest(backend: &RestBackend) -> Self {
        Remote {
            auth: backend.auth(),
            contacts: backend.contacts(),
            tasks: backend.tasks(),
        }
    }

    pub fn memory(backend: &MemoryBackend) -> Self {
        Remote {
            auth: backend.auth(),
            contacts: backend.contacts(),
            tasks: backend.tasks(),
        }
    }
}

/// Mounted screen stack
pub struct App {
    pub location: Arc<MemoryLocation>,
    pub feedback: FeedbackChannel,
    pub guard: SessionGuard,
    pub contacts: RecordStore<Contact>,
    pub tasks: RecordStore<Task>,
    listener: JoinHandle<()>,
}

impl App {
    /// Connects to the configured backend and lands on `start`
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be built, no session exists and
    /// no credentials are configured, or sign-in fails.
    pub async fn connect(config: &Config, start: &str) -> anyhow::Result<Self> {
        let remote = match &config.backend {
            BackendConfig::Rest(rest) => {
                tracing::info!(url = %rest.base_url, "Using hosted backend");
                Remote::rest(&RestBackend::new(rest.clone())?)
            }
            BackendConfig::Demo => {
                tracing::info!("Using seeded demo backend");
                let login = config.credentials.clone().unwrap_or_else(demo_login);
                Remote::memory(&seeded_demo(&login).await?)
            }
        };

        let app = Self::mount(remote, &config.sync).await;

        if app.guard.current_session().is_none() {
            let Some(login) = &config.credentials else {
                app.shutdown();
                anyhow::bail!("Not signed in: set SPARKCRM_EMAIL and SPARKCRM_PASSWORD");
            };
            if let Err(e) = app
                .guard
                .sign_in(&Credentials::new(login.email.clone(), login.password.clone()))
                .await
            {
                app.shutdown();
                return Err(e.into());
            }
        }

        app.guard.open(start);
        Ok(app)
    }

    /// Mounts the guard at the sign-in screen and builds both stores
    pub async fn mount(remote: Remote, sync: &SyncConfig) -> Self {
        let location = Arc::new(MemoryLocation::new(routes::LOGIN));
        let feedback = FeedbackChannel::from_config(sync);

        let guard = SessionGuard::new(remote.auth, location.clone(), feedback.clone(), sync);
        let listener = guard.mount().await;

        let contacts = RecordStore::new(remote.contacts, guard.reader(), feedback.clone());
        let tasks = RecordStore::new(remote.tasks, guard.reader(), feedback.clone());

        App {
            location,
            feedback,
            guard,
            contacts,
            tasks,
            listener,
        }
    }

    /// Unmounts stores and stops the session listener
    pub fn shutdown(&self) {
        self.contacts.unmount();
        self.tasks.unmount();
        self.guard.unmount();
        self.listener.abort();
    }
}

fn demo_login() -> LoginConfig {
    LoginConfig {
        email: DEMO_EMAIL.to_string(),
        password: DEMO_PASSWORD.to_string(),
    }
}

/// In-memory backend with one account and a few rows
///
/// The account stays signed in so the guard's existence check finds it.
pub async fn seeded_demo(login: &LoginConfig) -> anyhow::Result<MemoryBackend> {
    let backend = MemoryBackend::new();
    let auth = backend.auth();
    auth.register(&login.email, &login.password).await?;
    let session = auth
        .sign_in(&Credentials::new(login.email.clone(), login.password.clone()))
        .await?;

    let contacts = backend.contacts();
    for (name, email) in [
        ("Ada Lovelace", "ada@analytical.example"),
        ("Grace Hopper", "grace@navy.example"),
        ("Katherine Johnson", "katherine@nasa.example"),
    ] {
        contacts.insert(&session, &NewContact::new(name, email)).await?;
    }

    let today = Utc::now().date_naive();
    let tasks = backend.tasks();
    for (title, due) in [
        ("Send proposal to Ada", Some(today + Duration::days(2))),
        ("Follow up with Grace", Some(today - Duration::days(1))),
        ("Plan quarterly review", None),
    ] {
        tasks.insert(&session, &NewTask::new(title, due)).await?;
    }

    tracing::debug!(user = %session.user_id(), "Demo backend seeded");
    Ok(backend)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sparkcrm_sync::session::AccessDecision;

    fn demo_config() -> Config {
        Config {
            backend: BackendConfig::Demo,
            credentials: Some(demo_login()),
            sync: SyncConfig::default(),
        }
    }

    #[tokio::test]
    async fn test_demo_connect_lands_on_start() {
        let app = App::connect(&demo_config(), "/tasks").await.unwrap();

        assert!(app.guard.current_session().is_some());
        assert_eq!(app.guard.decision(), AccessDecision::Render);
        assert_eq!(app.tasks.list().await.unwrap().len(), 3);
        assert_eq!(app.contacts.list().await.unwrap().len(), 3);

        app.shutdown();
        assert!(!app.tasks.is_mounted());
    }

    #[tokio::test]
    async fn test_mount_without_credentials_stays_on_login() {
        let backend = MemoryBackend::new();
        let app = App::mount(Remote::memory(&backend), &SyncConfig::default()).await;

        assert!(app.guard.current_session().is_none());
        assert_eq!(
            app.guard.authorize(routes::TASKS),
            AccessDecision::Redirect { to: routes::LOGIN }
        );
        app.shutdown();
    }
}
