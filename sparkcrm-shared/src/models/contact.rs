/// Contact model
///
/// A person the signed-in user keeps track of. Identifier and creation time
/// are assigned by the remote store; a value without them is a [`NewContact`]
/// draft and has never been persisted.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE contacts (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     user_id UUID NOT NULL REFERENCES auth.users(id) ON DELETE CASCADE,
///     name TEXT NOT NULL CHECK (length(trim(name)) > 0),
///     email TEXT NOT NULL,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// Listings are ordered newest first.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use uuid::Uuid;
use validator::Validate;

use super::{non_blank, ListOrder, Record};

/// Persisted contact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// Unique contact ID
    pub id: Uuid,

    /// Owning user
    pub user_id: Uuid,

    /// Display name
    pub name: String,

    /// Email address
    pub email: String,

    /// When the contact was created (immutable)
    pub created_at: DateTime<Utc>,
}

impl Contact {
    /// Case-insensitive substring match on name or email
    ///
    /// An empty query matches everything.
    pub fn matches(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return true;
        }

        self.name.to_lowercase().contains(&query) || self.email.to_lowercase().contains(&query)
    }

    /// True when the contact was created in the same calendar month as `now`
    pub fn created_in_month_of(&self, now: DateTime<Utc>) -> bool {
        self.created_at.year() == now.year() && self.created_at.month() == now.month()
    }
}

/// Input for creating a contact
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct NewContact {
    #[validate(custom(function = "non_blank", message = "Name is required"))]
    pub name: String,

    #[validate(email(message = "Email must be a valid address"))]
    pub email: String,
}

impl NewContact {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into().trim().to_string(),
            email: email.into().trim().to_string(),
        }
    }
}

/// Partial update for a contact
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ContactPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(custom(function = "non_blank", message = "Name is required"))]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(email(message = "Email must be a valid address"))]
    pub email: Option<String>,
}

impl ContactPatch {
    pub fn name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into().trim().to_string()),
            ..Default::default()
        }
    }

    pub fn email(email: impl Into<String>) -> Self {
        Self {
            email: Some(email.into().trim().to_string()),
            ..Default::default()
        }
    }
}

impl Record for Contact {
    type Draft = NewContact;
    type Patch = ContactPatch;

    const COLLECTION: &'static str = "contacts";
    const LABEL: &'static str = "Contact";

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
            column: "created_at",
            ascending: false,
            nulls_last: false,
        }
    }

    fn listing_cmp(a: &Self, b: &Self) -> Ordering {
        b.created_at.cmp(&a.created_at)
    }

    fn from_draft(id: Uuid, owner: Uuid, created_at: DateTime<Utc>, draft: NewContact) -> Self {
        Contact {
            id,
            user_id: owner,
            name: draft.name,
            email: draft.email,
            created_at,
        }
    }

    fn apply_patch(&mut self, patch: &ContactPatch) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(email) = &patch.email {
            self.email = email.clone();
        }
    }

    fn to_draft(&self) -> NewContact {
        NewContact {
            name: self.name.clone(),
            email: self.email.clone(),
        }
    }

    fn patch_from_draft(draft: &NewContact) -> ContactPatch {
        ContactPatch {
            name: Some(draft.name.clone()),
            email: Some(draft.email.clone()),
        }
    }

    fn patch_is_empty(patch: &ContactPatch) -> bool {
        patch.name.is_none() && patch.email.is_none()
    }
}
