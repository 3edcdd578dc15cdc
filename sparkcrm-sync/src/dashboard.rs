/// Dashboard summary
///
/// Pure derivation over the contact and task snapshots; no remote calls.

use chrono::{DateTime, Utc};
use sparkcrm_shared::models::{Contact, Task};
use std::cmp::Ordering;

/// Rows shown in the "due soon" and "recent contacts" panels
pub const PANEL_SIZE: usize = 5;

/// One column of the pipeline snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineStage {
    pub name: &'static str,
    pub count: usize,
}

/// Figures shown on the dashboard
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardSummary {
    pub total_contacts: usize,
    pub open_tasks: usize,
    pub completed_tasks: usize,

    /// Whole percent of tasks completed, 0 when there are no tasks
    pub completion_rate: u32,

    pub overdue_tasks: usize,
    pub new_contacts_this_month: usize,

    /// Next open tasks by due date, undated last
    pub due_soon: Vec<Task>,

    /// Newest contacts first
    pub recent_contacts: Vec<Contact>,

    pub pipeline: Vec<PipelineStage>,
}

impl DashboardSummary {
    pub fn compute(contacts: &[Contact], tasks: &[Task], now: DateTime<Utc>) -> Self {
        let today = now.date_naive();
        let open: Vec<&Task> = tasks.iter().filter(|t| t.is_open()).collect();
        let completed = tasks.len() - open.len();

        let completion_rate = if tasks.is_empty() {
            0
        } else {
            ((completed as f64 / tasks.len() as f64) * 100.0).round() as u32
        };

        let mut due_soon: Vec<Task> = open.iter().map(|t| (*t).clone()).collect();
        due_soon.sort_by(|a, b| match (a.due_date, b.due_date) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });
        due_soon.truncate(PANEL_SIZE);

        let mut recent_contacts = contacts.to_vec();
        recent_contacts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        recent_contacts.truncate(PANEL_SIZE);

        DashboardSummary {
            total_contacts: contacts.len(),
            open_tasks: open.len(),
            completed_tasks: completed,
            completion_rate,
            overdue_tasks: open.iter().filter(|t| t.is_overdue(today)).count(),
            new_contacts_this_month: contacts
                .iter()
                .filter(|c| c.created_in_month_of(now))
                .count(),
            due_soon,
            recent_contacts,
            pipeline: pipeline(contacts.len()),
        }
    }
}

/// Splits the contact count into lead stages (45% / 30% / rest, at least 1 each)
fn pipeline(contacts: usize) -> Vec<PipelineStage> {
    let (new_leads, nurturing, decision) = if contacts == 0 {
        (0, 0, 0)
    } else {
        let new_leads = ((contacts * 45 + 99) / 100).max(1);
        let nurturing = ((contacts * 30 + 99) / 100).max(1);
        let decision = contacts.saturating_sub(new_leads + nurturing).max(1);
        (new_leads, nurturing, decision)
    };

    vec![
        PipelineStage {
            name: "New leads",
            count: new_leads,
        },
        PipelineStage {
            name: "Nurturing",
            count: nurturing,
        },
        PipelineStage {
            name: "Decision",
            count: decision,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, TimeZone};
    use sparkcrm_shared::models::{NewContact, NewTask, Record};
    use uuid::Uuid;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
    }

    fn task(title: &str, due: Option<NaiveDate>, completed: bool) -> Task {
        let mut t = Task::from_draft(Uuid::new_v4(), Uuid::nil(), Utc::now(), NewTask::new(title, due));
        t.completed = completed;
        t
    }

    fn contact(name: &str, created_at: DateTime<Utc>) -> Contact {
        Contact::from_draft(
            Uuid::new_v4(),
            Uuid::nil(),
            created_at,
            NewContact::new(name, "someone@example.com"),
        )
    }

    #[test]
    fn test_empty() {
        let summary = DashboardSummary::compute(&[], &[], Utc::now());
        assert_eq!(summary.completion_rate, 0);
        assert!(summary.due_soon.is_empty());
        assert!(summary.pipeline.iter().all(|s| s.count == 0));
    }

    #[test]
    fn test_task_figures() {
        let now = Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap();
        let mut tasks = vec![
            task("undated", None, false),
            task("done", Some(date(1)), true),
            task("late", Some(date(10)), false),
        ];
        for day in 20..26 {
            tasks.push(task(&format!("day-{}", day), Some(date(day)), false));
        }

        let summary = DashboardSummary::compute(&[], &tasks, now);
        assert_eq!(summary.open_tasks, 8);
        assert_eq!(summary.completed_tasks, 1);
        assert_eq!(summary.completion_rate, 11);
        assert_eq!(summary.overdue_tasks, 1);

        let titles: Vec<_> = summary.due_soon.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["late", "day-20", "day-21", "day-22", "day-23"]);
    }

    #[test]
    fn test_contact_figures() {
        let now = Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap();
        let contacts: Vec<Contact> = (0..7)
            .map(|i| contact(&format!("c{}", i), now - Duration::days(i * 5)))
            .collect();

        let summary = DashboardSummary::compute(&contacts, &[], now);
        assert_eq!(summary.total_contacts, 7);
        // 18th, 13th, 8th, 3rd of October
        assert_eq!(summary.new_contacts_this_month, 4);
        assert_eq!(summary.recent_contacts.len(), 5);
        assert_eq!(summary.recent_contacts[0].name, "c0");
    }

    #[test]
    fn test_pipeline_split() {
        let counts: Vec<usize> = pipeline(10).iter().map(|s| s.count).collect();
        assert_eq!(counts, vec![5, 3, 2]);

        let counts: Vec<usize> = pipeline(1).iter().map(|s| s.count).collect();
        assert_eq!(counts, vec![1, 1, 1]);
    }
}
