/// Task model
///
/// An item in the signed-in user's work queue.
///
/// # Completion
///
/// `completed` starts out false and only changes when a patch carries it
/// explicitly. Editing the title or due date never touches it, which is why
/// [`Record::patch_from_draft`] leaves `completed` unset.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE tasks (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     user_id UUID NOT NULL REFERENCES auth.users(id) ON DELETE CASCADE,
///     title TEXT NOT NULL CHECK (length(trim(title)) > 0),
///     due_date DATE,
///     completed BOOLEAN NOT NULL DEFAULT FALSE,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// Listings are ordered by soonest due date, undated tasks last.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use uuid::Uuid;
use validator::Validate;

use super::{non_blank, ListOrder, Record};

/// Persisted task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task ID
    pub id: Uuid,

    /// Owning user
    pub user_id: Uuid,

    /// What needs doing
    pub title: String,

    /// Optional calendar due date
    pub due_date: Option<NaiveDate>,

    /// Whether the task is done
    #[serde(default)]
    pub completed: bool,

    /// When the task was created (immutable)
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn is_open(&self) -> bool {
        !self.completed
    }

    /// Open and due strictly before `today`
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.is_open() && self.due_date.map_or(false, |due| due < today)
    }
}

/// Input for creating a task
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct NewTask {
    #[validate(custom(function = "non_blank", message = "Title is required"))]
    pub title: String,

    pub due_date: Option<NaiveDate>,
}

impl NewTask {
    pub fn new(title: impl Into<String>, due_date: Option<NaiveDate>) -> Self {
        Self {
            title: title.into().trim().to_string(),
            due_date,
        }
    }
}

/// Partial update for a task
///
/// `due_date: Some(None)` clears the due date; `None` leaves it alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(custom(function = "non_blank", message = "Title is required"))]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<Option<NaiveDate>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
}

impl TaskPatch {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into().trim().to_string()),
            ..Default::default()
        }
    }

    pub fn due_date(due_date: Option<NaiveDate>) -> Self {
        Self {
            due_date: Some(due_date),
            ..Default::default()
        }
    }

    pub fn completion(completed: bool) -> Self {
        Self {
            completed: Some(completed),
            ..Default::default()
        }
    }
}

impl Record for Task {
    type Draft = NewTask;
    type Patch = TaskPatch;

    const COLLECTION: &'static str = "tasks";
    const LABEL: &'static str = "Task";

    fn id(&self) -> Uuid {
        self.id
    }

    fn owner_id(&self) -> Uuid {
        self.user_id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn list_order() -> ListOrder {
        ListOrder {
            column: "due_date",
            ascending: true,
            nulls_last: true,
        }
    }

    fn listing_cmp(a: &Self, b: &Self) -> Ordering {
        let by_due = match (a.due_date, b.due_date) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };

        by_due.then_with(|| a.created_at.cmp(&b.created_at))
    }

    fn from_draft(id: Uuid, owner: Uuid, created_at: DateTime<Utc>, draft: NewTask) -> Self {
        Task {
            id,
            user_id: owner,
            title: draft.title,
            due_date: draft.due_date,
            completed: false,
            created_at,
        }
    }

    fn apply_patch(&mut self, patch: &TaskPatch) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(due_date) = patch.due_date {
            self.due_date = due_date;
        }
        if let Some(completed) = patch.completed {
            self.completed = completed;
        }
    }

    fn to_draft(&self) -> NewTask {
        NewTask {
            title: self.title.clone(),
            due_date: self.due_date,
        }
    }

    fn patch_from_draft(draft: &NewTask) -> TaskPatch {
        TaskPatch {
            title: Some(draft.title.clone()),
            due_date: Some(draft.due_date),
            completed: None,
        }
    }

    fn patch_is_empty(patch: &TaskPatch) -> bool {
        patch.title.is_none() && patch.due_date.is_none() && patch.completed.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn task(title: &str, due: Option<NaiveDate>, created_at: DateTime<Utc>) -> Task {
        Task::from_draft(Uuid::new_v4(), Uuid::new_v4(), created_at, NewTask::new(title, due))
    }

    #[test]
    fn test_new_task_defaults_to_open() {
        let t = task("Call Ada", None, Utc::now());
        assert!(!t.completed);
        assert!(t.is_open());
    }

    #[test]
    fn test_new_task_validation() {
        assert!(NewTask::new("Call Ada", None).validate().is_ok());
        assert!(NewTask::new("   ", Some(date(2026, 1, 1))).validate().is_err());

        let untrimmed = NewTask {
            title: "  ".to_string(),
            due_date: None,
        };
        assert!(untrimmed.validate().is_err());

        let patch = TaskPatch {
            title: Some("\n".to_string()),
            ..Default::default()
        };
        assert!(patch.validate().is_err());
    }

    #[test]
    fn test_listing_soonest_due_first_nulls_last() {
        let now = Utc::now();
        let mut listing = vec![
            task("undated-early", None, now - Duration::hours(2)),
            task("later", Some(date(2026, 12, 1)), now),
            task("undated-late", None, now),
            task("sooner", Some(date(2026, 11, 1)), now),
        ];
        crate::models::sort_listing(&mut listing);

        let titles: Vec<_> = listing.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["sooner", "later", "undated-early", "undated-late"]);
    }

    #[test]
    fn test_title_edit_does_not_touch_completion() {
        let mut t = task("Call Ada", None, Utc::now());
        t.apply_patch(&TaskPatch::completion(true));
        t.apply_patch(&Task::patch_from_draft(&NewTask::new("Call Ada again", None)));

        assert_eq!(t.title, "Call Ada again");
        assert!(t.completed);
    }

    #[test]
    fn test_due_date_patch_can_clear() {
        let mut t = task("Ship", Some(date(2026, 10, 20)), Utc::now());
        t.apply_patch(&TaskPatch::due_date(None));
        assert_eq!(t.due_date, None);
    }

    #[test]
    fn test_patch_serialization() {
        let json = serde_json::to_value(TaskPatch::due_date(None)).unwrap();
        assert_eq!(json, serde_json::json!({"due_date": null}));

        let json = serde_json::to_value(TaskPatch::completion(true)).unwrap();
        assert_eq!(json, serde_json::json!({"completed": true}));
    }

    #[test]
    fn test_overdue() {
        let today = date(2026, 10, 18);
        assert!(task("late", Some(date(2026, 10, 17)), Utc::now()).is_overdue(today));
        assert!(!task("today", Some(today), Utc::now()).is_overdue(today));
        assert!(!task("undated", None, Utc::now()).is_overdue(today));
    }
}
