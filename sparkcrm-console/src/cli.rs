// Command-line arguments for the sparkcrm binary

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "sparkcrm")]
#[command(about = "SparkCRM - contacts and tasks from the terminal", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Manage contacts
    Contacts {
        #[command(subcommand)]
        action: ContactCommand,
    },

    /// Manage tasks
    Tasks {
        #[command(subcommand)]
        action: TaskCommand,
    },

    /// Navigate to a screen path and show whether it renders
    Open {
        /// Path such as /tasks or /contacts?id=<uuid>
        path: String,
    },

    /// Show dashboard figures
    Dashboard,

    /// Replace the signed-in user's password
    Password {
        /// New password (at least 6 characters)
        new_password: String,
    },
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum ContactCommand {
    /// List contacts, newest first
    List,

    /// Add a contact
    Add {
        /// Full name
        name: String,

        /// Email address
        email: String,
    },

    /// Edit a contact through the edit form
    Edit {
        /// Contact id
        id: String,

        /// New name
        #[arg(long)]
        name: Option<String>,

        /// New email
        #[arg(long)]
        email: Option<String>,
    },

    /// Delete a contact
    Delete {
        /// Contact id
        id: Uuid,
    },

    /// Filter contacts by name or email
    Search {
        /// Case-insensitive text
        query: String,
    },
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum TaskCommand {
    /// List tasks by due date, undated last
    List,

    /// Add a task
    Add {
        /// Task title
        title: String,

        /// Due date (YYYY-MM-DD)
        #[arg(short, long)]
        due: Option<NaiveDate>,
    },

    /// Edit a task through the edit form
    Edit {
        /// Task id
        id: String,

        /// New title
        #[arg(long)]
        title: Option<String>,

        /// New due date (YYYY-MM-DD)
        #[arg(long, conflicts_with = "clear_due")]
        due: Option<NaiveDate>,

        /// Remove the due date
        #[arg(long)]
        clear_due: bool,
    },

    /// Flip a task between open and complete
    Toggle {
        /// Task id
        id: Uuid,
    },

    /// Mark a task complete
    Complete {
        /// Task id
        id: Uuid,
    },

    /// Delete a task
    Delete {
        /// Task id
        id: Uuid,
    },
}
