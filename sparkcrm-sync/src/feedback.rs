/// Feedback channel
///
/// Surfaces the outcome of every asynchronous operation as a short, transient
/// report. Reports never block the caller: they are queued, broadcast to
/// subscribers and dismissed automatically once their display interval has
/// passed.
///
/// # Messages
///
/// | Action | Success | Failure |
/// | --- | --- | --- |
/// | Created | `Contact added.` | `Could not save contact: {cause}` |
/// | Updated | `Task updated.` | `Could not save task: {cause}` |
/// | Removed | `Contact removed.` | `Could not remove contact: {cause}` |
/// | Completed | `Task marked as complete.` | `Could not complete task: {cause}` |
/// | Loaded | - | `Unable to load contacts.` |
/// | SignedIn | `Signed in.` | `Could not sign in: {cause}` |
/// | SignedOut | `Signed out.` | `Could not sign out: {cause}` |
/// | CredentialUpdated | `Password updated.` | `Could not update password: {cause}` |
///
/// `{cause}` is [`CrmError::short_cause`]; transport detail never reaches a
/// report.
///
/// # Example
///
/// ```
/// use sparkcrm_sync::feedback::{Action, FeedbackChannel, Outcome};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let feedback = FeedbackChannel::default();
/// feedback.report(Outcome::success(Action::Created, "Contact"));
///
/// let visible = feedback.visible();
/// assert_eq!(visible[0].message, "Contact added.");
/// # }
/// ```

use sparkcrm_shared::error::{CrmError, CrmResult};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::config::{SyncConfig, DEFAULT_FEEDBACK_CAPACITY, DEFAULT_FEEDBACK_DISPLAY};

/// Capacity of the report broadcast channel
const BROADCAST_CAPACITY: usize = 32;

/// What the user did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Created,
    Updated,
    Removed,
    Completed,
    Loaded,
    SignedIn,
    SignedOut,
    CredentialUpdated,
}

/// Report severity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Success,
    Failure,
}

/// Result of one operation, before it becomes a report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub action: Action,

    /// Record label ("Contact", "Task"); ignored by session actions
    pub subject: &'static str,

    pub error: Option<CrmError>,
}

impl Outcome {
    pub fn success(action: Action, subject: &'static str) -> Self {
        Outcome {
            action,
            subject,
            error: None,
        }
    }

    pub fn failure(action: Action, subject: &'static str, error: CrmError) -> Self {
        Outcome {
            action,
            subject,
            error: Some(error),
        }
    }

    pub fn from_result<T>(action: Action, subject: &'static str, result: &CrmResult<T>) -> Self {
        match result {
            Ok(_) => Outcome::success(action, subject),
            Err(e) => Outcome::failure(action, subject, e.clone()),
        }
    }

    pub fn level(&self) -> Level {
        if self.error.is_some() {
            Level::Failure
        } else {
            Level::Success
        }
    }

    /// Human-readable message
    pub fn message(&self) -> String {
        let noun = self.subject.to_lowercase();

        match &self.error {
            None => match self.action {
                Action::Created => format!("{} added.", self.subject),
                Action::Updated => format!("{} updated.", self.subject),
                Action::Removed => format!("{} removed.", self.subject),
                Action::Completed => format!("{} marked as complete.", self.subject),
                Action::Loaded => format!("{}s loaded.", self.subject),
                Action::SignedIn => "Signed in.".to_string(),
                Action::SignedOut => "Signed out.".to_string(),
                Action::CredentialUpdated => "Password updated.".to_string(),
            },
            Some(error) => {
                let cause = error.short_cause();
                match self.action {
                    Action::Created | Action::Updated => {
                        format!("Could not save {}: {}", noun, cause)
                    }
                    Action::Removed => format!("Could not remove {}: {}", noun, cause),
                    Action::Completed => format!("Could not complete {}: {}", noun, cause),
                    Action::Loaded => format!("Unable to load {}s.", noun),
                    Action::SignedIn => match error {
                        CrmError::Auth(_) => "Could not sign in: invalid email or password".to_string(),
                        _ => format!("Could not sign in: {}", cause),
                    },
                    Action::SignedOut => format!("Could not sign out: {}", cause),
                    Action::CredentialUpdated => format!("Could not update password: {}", cause),
                }
            }
        }
    }
}

/// A queued report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    /// Monotonic id, also the emission order
    pub id: u64,
    pub level: Level,
    pub message: String,
    pub emitted_at: Instant,
    pub expires_at: Instant,
}

impl Report {
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

struct Inner {
    queue: Mutex<VecDeque<Report>>,
    next_id: AtomicU64,
    display: Duration,
    capacity: usize,
    events: broadcast::Sender<Report>,
}

/// Shared, cheaply cloneable report queue
#[derive(Clone)]
pub struct FeedbackChannel {
    inner: Arc<Inner>,
}

impl FeedbackChannel {
    pub fn new(display: Duration, capacity: usize) -> Self {
        let (events, _) = broadcast::channel(BROADCAST_CAPACITY);

        FeedbackChannel {
            inner: Arc::new(Inner {
                queue: Mutex::new(VecDeque::new()),
                next_id: AtomicU64::new(1),
                display,
                capacity: capacity.max(1),
                events,
            }),
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.feedback_display, config.feedback_capacity)
    }

    /// Queues and broadcasts a report; never fails
    pub fn report(&self, outcome: Outcome) -> Report {
        let now = Instant::now();
        let report = Report {
            id: self.inner.next_id.fetch_add(1, Ordering::Relaxed),
            level: outcome.level(),
            message: outcome.message(),
            emitted_at: now,
            expires_at: now + self.inner.display,
        };

        match &outcome.error {
            None => tracing::info!(action = ?outcome.action, message = %report.message, "Feedback"),
            Some(e) => tracing::warn!(
                action = ?outcome.action,
                kind = e.kind().as_str(),
                error = %e,
                message = %report.message,
                "Feedback"
            ),
        }

        {
            let mut queue = self.lock_queue();
            queue.retain(|r| !r.is_expired_at(now));
            while queue.len() >= self.inner.capacity {
                queue.pop_front();
            }
            queue.push_back(report.clone());
        }

        // No subscribers is fine
        let _ = self.inner.events.send(report.clone());
        report
    }

    /// Reports still on screen, oldest first
    pub fn visible(&self) -> Vec<Report> {
        let now = Instant::now();
        let mut queue = self.lock_queue();
        queue.retain(|r| !r.is_expired_at(now));
        queue.iter().cloned().collect()
    }

    /// Dismisses a report before its interval ends
    pub fn dismiss(&self, id: u64) {
        self.lock_queue().retain(|r| r.id != id);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Report> {
        self.inner.events.subscribe()
    }

    pub fn display_interval(&self) -> Duration {
        self.inner.display
    }

    fn lock_queue(&self) -> std::sync::MutexGuard<'_, VecDeque<Report>> {
        self.inner.queue.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for FeedbackChannel {
    fn default() -> Self {
        Self::new(DEFAULT_FEEDBACK_DISPLAY, DEFAULT_FEEDBACK_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_messages() {
        assert_eq!(Outcome::success(Action::Created, "Contact").message(), "Contact added.");
        assert_eq!(Outcome::success(Action::Updated, "Task").message(), "Task updated.");
        assert_eq!(Outcome::success(Action::Removed, "Contact").message(), "Contact removed.");
        assert_eq!(
            Outcome::success(Action::Completed, "Task").message(),
            "Task marked as complete."
        );
        assert_eq!(Outcome::success(Action::SignedIn, "").message(), "Signed in.");
    }

    #[test]
    fn test_failure_messages_use_short_cause() {
        let outcome = Outcome::failure(
            Action::Created,
            "Contact",
            CrmError::Remote("tcp connect error 10.0.0.4:443".to_string()),
        );
        assert_eq!(outcome.message(), "Could not save contact: service unavailable");
        assert_eq!(outcome.level(), Level::Failure);

        let outcome = Outcome::failure(
            Action::Loaded,
            "Contact",
            CrmError::Remote("boom".to_string()),
        );
        assert_eq!(outcome.message(), "Unable to load contacts.");

        let outcome = Outcome::failure(
            Action::Updated,
            "Task",
            CrmError::Validation("Title is required".to_string()),
        );
        assert_eq!(outcome.message(), "Could not save task: Title is required");

        let outcome = Outcome::failure(
            Action::SignedIn,
            "",
            CrmError::Auth("Invalid login credentials".to_string()),
        );
        assert_eq!(outcome.message(), "Could not sign in: invalid email or password");
    }

    #[tokio::test(start_paused = true)]
    async fn test_reports_expire() {
        let feedback = FeedbackChannel::new(Duration::from_secs(4), 5);
        feedback.report(Outcome::success(Action::Created, "Contact"));

        tokio::time::advance(Duration::from_secs(2)).await;
        feedback.report(Outcome::success(Action::Removed, "Contact"));
        assert_eq!(feedback.visible().len(), 2);

        tokio::time::advance(Duration::from_secs(2)).await;
        let visible = feedback.visible();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].message, "Contact removed.");

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(feedback.visible().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_drops_oldest() {
        let feedback = FeedbackChannel::new(Duration::from_secs(4), 2);
        let first = feedback.report(Outcome::success(Action::Created, "Task"));
        feedback.report(Outcome::success(Action::Updated, "Task"));
        feedback.report(Outcome::success(Action::Removed, "Task"));

        let visible = feedback.visible();
        assert_eq!(visible.len(), 2);
        assert!(visible.iter().all(|r| r.id != first.id));
        assert!(visible[0].id < visible[1].id);
    }

    #[tokio::test]
    async fn test_broadcast_and_dismiss() {
        let feedback = FeedbackChannel::default();
        let mut rx = feedback.subscribe();

        let report = feedback.report(Outcome::success(Action::SignedOut, ""));
        assert_eq!(rx.recv().await.unwrap(), report);

        feedback.dismiss(report.id);
        assert!(feedback.visible().is_empty());
    }
}
