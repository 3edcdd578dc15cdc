/// Data model for SparkCRM
///
/// # Models
///
/// - `session`: Signed-in identity, credentials and session change events
/// - `contact`: People the user keeps track of
/// - `task`: The user's work queue
///
/// Contacts and tasks are both [`Record`]s, which is what lets one generic
/// record store and one edit resolver serve both screens.

pub mod contact;
pub mod session;
pub mod task;

pub use contact::{Contact, ContactPatch, NewContact};
pub use session::{Credentials, Session, SessionEvent, User};
pub use task::{NewTask, Task, TaskPatch};

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use std::cmp::Ordering;
use std::fmt::Debug;
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Rejects text that is empty once surrounding whitespace is removed
pub fn non_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

/// Remote ordering of a listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListOrder {
    /// Column to sort by
    pub column: &'static str,

    /// Ascending when true
    pub ascending: bool,

    /// Rows with a null sort value go last
    pub nulls_last: bool,
}

impl ListOrder {
    /// Renders the order the way the record API expects it (`due_date.asc.nullslast`)
    pub fn to_query_value(&self) -> String {
        let direction = if self.ascending { "asc" } else { "desc" };
        if self.nulls_last {
            format!("{}.{}.nullslast", self.column, direction)
        } else {
            format!("{}.{}", self.column, direction)
        }
    }
}

/// A persisted entity kind owned by one user
///
/// `Draft` is the editable projection (no identifier, no server-assigned
/// fields). `Patch` carries one `Option` per mutable field; `None` leaves the
/// field untouched.
pub trait Record: Clone + Debug + PartialEq + Send + Sync + Serialize + DeserializeOwned + 'static {
    type Draft: Clone + Debug + Default + PartialEq + Send + Sync + Serialize + Validate + 'static;
    type Patch: Clone + Debug + Default + PartialEq + Send + Sync + Serialize + Validate + 'static;

    /// Remote collection name
    const COLLECTION: &'static str;

    /// Human label used in feedback ("Contact", "Task")
    const LABEL: &'static str;

    fn id(&self) -> Uuid;

    fn owner_id(&self) -> Uuid;

    fn created_at(&self) -> DateTime<Utc>;

    /// Order requested from the remote collection
    fn list_order() -> ListOrder;

    /// Local comparator matching [`Record::list_order`]
    fn listing_cmp(a: &Self, b: &Self) -> Ordering;

    /// Materializes a draft with server-assigned fields
    fn from_draft(id: Uuid, owner: Uuid, created_at: DateTime<Utc>, draft: Self::Draft) -> Self;

    /// Applies the supplied fields of a patch
    fn apply_patch(&mut self, patch: &Self::Patch);

    /// Projects a record into its editable draft
    fn to_draft(&self) -> Self::Draft;

    /// Patch that overwrites every draft field of an existing record
    fn patch_from_draft(draft: &Self::Draft) -> Self::Patch;

    /// True when the patch would change nothing
    fn patch_is_empty(patch: &Self::Patch) -> bool;
}

/// Sorts a listing by the record's defined sort key
///
/// Stable, so rows the comparator considers equal keep the remote order.
pub fn sort_listing<R: Record>(records: &mut [R]) {
    records.sort_by(R::listing_cmp);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_order_query_value() {
        assert_eq!(Contact::list_order().to_query_value(), "created_at.desc");
        assert_eq!(Task::list_order().to_query_value(), "due_date.asc.nullslast");
    }
}
