//! # SparkCRM Sync
//!
//! Session-gated record synchronization.
//!
//! The core the screens call into:
//!
//! - `session`: session guard, published session state, route access
//! - `store`: per-kind record store (list, create, update, delete, re-list)
//! - `edit`: URL-driven edit mode and form state
//! - `feedback`: transient success and failure reports
//! - `location`: navigable location contract and in-memory implementation
//! - `routes`: the route table
//! - `dashboard`: summary figures over the two snapshots
//! - `config`: timeouts and capacities

pub mod config;
pub mod dashboard;
pub mod edit;
pub mod feedback;
pub mod location;
pub mod routes;
pub mod session;
pub mod store;

pub use config::SyncConfig;
pub use edit::{EditResolver, FormDraft, FormMode, Submission};
pub use feedback::{FeedbackChannel, Outcome, Report};
pub use session::{AccessDecision, SessionGuard, SessionReader, SessionState};
pub use store::RecordStore;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
