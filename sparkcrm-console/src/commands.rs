/// Command handlers
///
/// Each handler drives the synchronization core the way a screen would and
/// returns the lines to print. Feedback reports are printed separately by the
/// caller from the shared channel.

use chrono::Utc;
use sparkcrm_shared::models::{Contact, NewContact, NewTask, Record, Task};
use sparkcrm_sync::dashboard::DashboardSummary;
use sparkcrm_sync::edit::{EditResolver, FormMode, Submission, EDIT_PARAM};
use sparkcrm_sync::location::Location;
use sparkcrm_sync::routes::{self, Route};
use sparkcrm_sync::session::AccessDecision;
use sparkcrm_sync::store::RecordStore;
use uuid::Uuid;

use crate::app::App;
use crate::cli::{Commands, ContactCommand, TaskCommand};

/// Screen a command starts on
pub fn start_path(command: &Commands) -> String {
    match command {
        Commands::Contacts { .. } => routes::CONTACTS.to_string(),
        Commands::Tasks { .. } => routes::TASKS.to_string(),
        Commands::Open { path } => path.clone(),
        Commands::Dashboard => routes::DASHBOARD.to_string(),
        Commands::Password { .. } => routes::RESET_PASSWORD.to_string(),
    }
}

/// Runs one command against a connected app
pub async fn run(app: &App, command: Commands) -> anyhow::Result<Vec<String>> {
    match command {
        Commands::Contacts { action } => contacts(app, action).await,
        Commands::Tasks { action } => tasks(app, action).await,
        Commands::Open { path } => open(app, &path).await,
        Commands::Dashboard => dashboard(app).await,
        Commands::Password { new_password } => {
            app.guard.update_credential(&new_password).await?;
            let email = app
                .guard
                .current_session()
                .map(|s| s.email().to_string())
                .unwrap_or_default();
            Ok(vec![format!("Password updated for {}", email)])
        }
    }
}

async fn contacts(app: &App, action: ContactCommand) -> anyhow::Result<Vec<String>> {
    let store = &app.contacts;

    match action {
        ContactCommand::List => Ok(store.list().await?.iter().map(contact_line).collect()),
        ContactCommand::Add { name, email } => {
            let contact = store.create(NewContact::new(name, email)).await?;
            Ok(vec![contact_line(&contact)])
        }
        ContactCommand::Edit { id, name, email } => {
            if name.is_none() && email.is_none() {
                anyhow::bail!("Nothing to change: pass --name or --email");
            }

            let resolver = open_for_edit(app, store, routes::CONTACTS, &id).await?;
            let mut fields = resolver.draft().fields;
            if let Some(name) = name {
                fields.name = name;
            }
            if let Some(email) = email {
                fields.email = email;
            }
            resolver.set_fields(fields);

            submitted(resolver.submit(store).await?)
        }
        ContactCommand::Delete { id } => {
            store.delete(id).await?;
            Ok(vec![format!("Deleted {}", id)])
        }
        ContactCommand::Search { query } => {
            store.list().await?;
            Ok(store.search(&query).iter().map(contact_line).collect())
        }
    }
}

async fn tasks(app: &App, action: TaskCommand) -> anyhow::Result<Vec<String>> {
    let store = &app.tasks;

    match action {
        TaskCommand::List => Ok(store.list().await?.iter().map(task_line).collect()),
        TaskCommand::Add { title, due } => {
            let task = store.create(NewTask::new(title, due)).await?;
            Ok(vec![task_line(&task)])
        }
        TaskCommand::Edit {
            id,
            title,
            due,
            clear_due,
        } => {
            if title.is_none() && due.is_none() && !clear_due {
                anyhow::bail!("Nothing to change: pass --title, --due or --clear-due");
            }

            let resolver = open_for_edit(app, store, routes::TASKS, &id).await?;
            let mut fields = resolver.draft().fields;
            if let Some(title) = title {
                fields.title = title;
            }
            if due.is_some() || clear_due {
                fields.due_date = due;
            }
            resolver.set_fields(fields);

            submitted(resolver.submit(store).await?)
        }
        TaskCommand::Toggle { id } => {
            let task = find_task(store, id).await?;
            store.toggle_completion(&task).await?;
            let state = if task.completed { "open" } else { "complete" };
            Ok(vec![format!("{} is now {}", id, state)])
        }
        TaskCommand::Complete { id } => {
            store.mark_complete(id).await?;
            Ok(vec![format!("{} is now complete", id)])
        }
        TaskCommand::Delete { id } => {
            store.delete(id).await?;
            Ok(vec![format!("Deleted {}", id)])
        }
    }
}

async fn open(app: &App, path: &str) -> anyhow::Result<Vec<String>> {
    let decision = app.guard.open(path);
    let landed = app.location.href();

    let mut lines = vec![match decision {
        AccessDecision::Render if landed == path => format!("{}: renders", landed),
        AccessDecision::Render => format!("{}: redirected to {}", path, landed),
        AccessDecision::Redirect { to } => format!("{}: redirect to {} pending", path, to),
        AccessDecision::NotFound => format!("{}: not found", path),
        AccessDecision::Loading => format!("{}: checking session", path),
    }];

    if decision == AccessDecision::Render {
        match Route::parse(&app.location.path()) {
            Route::Contacts => lines.push(form_line(&app.contacts, app).await?),
            Route::Tasks => lines.push(form_line(&app.tasks, app).await?),
            _ => {}
        }
    }

    Ok(lines)
}

async fn dashboard(app: &App) -> anyhow::Result<Vec<String>> {
    let contacts = app.contacts.list().await?;
    let tasks = app.tasks.list().await?;
    let summary = DashboardSummary::compute(&contacts, &tasks, Utc::now());

    let mut lines = vec![
        format!(
            "Contacts: {} ({} new this month)",
            summary.total_contacts, summary.new_contacts_this_month
        ),
        format!(
            "Tasks: {} open, {} completed, {} overdue, {}% complete",
            summary.open_tasks, summary.completed_tasks, summary.overdue_tasks, summary.completion_rate
        ),
        format!(
            "Pipeline: {}",
            summary
                .pipeline
                .iter()
                .map(|stage| format!("{} {}", stage.name, stage.count))
                .collect::<Vec<_>>()
                .join(" | ")
        ),
        "Due soon:".to_string(),
    ];
    lines.extend(summary.due_soon.iter().map(|t| format!("  {}", task_line(t))));
    lines.push("Recent contacts:".to_string());
    lines.extend(summary.recent_contacts.iter().map(|c| format!("  {}", contact_line(c))));

    Ok(lines)
}

/// Navigates to the edit URL for `id` and waits for the form to resolve
async fn open_for_edit<R: Record>(
    app: &App,
    store: &RecordStore<R>,
    screen: &str,
    id: &str,
) -> anyhow::Result<EditResolver<R>> {
    app.guard.open(&format!("{}?{}={}", screen, EDIT_PARAM, id));

    let resolver = EditResolver::new(store);
    if let Some(handle) = resolver.sync_with(app.location.as_ref()) {
        handle.await?;
    }

    if resolver.draft().mode() == FormMode::Creating {
        anyhow::bail!("No {} with id {}", R::LABEL.to_lowercase(), id);
    }
    Ok(resolver)
}

async fn form_line<R: Record>(store: &RecordStore<R>, app: &App) -> anyhow::Result<String> {
    let resolver = EditResolver::new(store);
    if let Some(handle) = resolver.sync_with(app.location.as_ref()) {
        handle.await?;
    }

    let draft = resolver.draft();
    Ok(match draft.mode() {
        FormMode::Creating => format!("Form: new {}", R::LABEL.to_lowercase()),
        FormMode::Editing(id) => format!("Form: editing {} {:?}", id, draft.fields),
    })
}

async fn find_task(store: &RecordStore<Task>, id: Uuid) -> anyhow::Result<Task> {
    store
        .list()
        .await?
        .into_iter()
        .find(|t| t.id == id)
        .ok_or_else(|| anyhow::anyhow!("No task with id {}", id))
}

fn submitted<R: Record>(submission: Submission<R>) -> anyhow::Result<Vec<String>> {
    match submission {
        Submission::Updated(id) => Ok(vec![format!("Updated {}", id)]),
        Submission::Created(record) => Ok(vec![format!("Created {}", record.id())]),
        Submission::Ignored => anyhow::bail!("A save is already in flight"),
    }
}

pub fn contact_line(contact: &Contact) -> String {
    format!(
        "{}  {} <{}>  added {}",
        contact.id,
        contact.name,
        contact.email,
        contact.created_at.format("%Y-%m-%d")
    )
}

pub fn task_line(task: &Task) -> String {
    let mark = if task.completed { "x" } else { " " };
    match task.due_date {
        Some(due) => format!("{}  [{}] {}  due {}", task.id, mark, task.title, due),
        None => format!("{}  [{}] {}", task.id, mark, task.title),
    }
}
